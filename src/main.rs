// Copyright (c) 2025 Fabstir
// SPDX-License-Identifier: BUSL-1.1
use anyhow::Result;
use gao_e2ee::cli::{load_config, serve::run_server};
use std::{env, net::SocketAddr, path::PathBuf};

#[tokio::main]
async fn main() -> Result<()> {
    dotenv::dotenv().ok();

    // Initialize tracing subscriber for logging
    if env::var("RUST_LOG").is_err() {
        env::set_var("RUST_LOG", "info");
    }
    tracing_subscriber::fmt::init();

    println!("🚀 Starting GAO E2EE demo server...\n");
    println!("📦 BUILD VERSION: {}", gao_e2ee::version::VERSION);
    println!("📅 Build Date: {}", gao_e2ee::version::BUILD_DATE);
    println!();

    let listen: SocketAddr = env::var("GAO_E2EE_LISTEN")
        .unwrap_or_else(|_| "127.0.0.1:8080".to_string())
        .parse()?;

    let config_path = env::var("GAO_E2EE_CONFIG").ok().map(PathBuf::from);
    let config = load_config(config_path.as_deref())?;

    run_server(config, listen).await
}
