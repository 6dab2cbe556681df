// Copyright (c) 2025 Fabstir
// SPDX-License-Identifier: BUSL-1.1
pub mod probe;
pub mod serve;
pub mod show_config;

use anyhow::Result;
use clap::{Parser, Subcommand};
use std::path::Path;

use crate::config::E2eeConfig;

/// GAO E2EE transport CLI
#[derive(Parser, Debug)]
#[command(name = "gao-cli")]
#[command(version = crate::version::VERSION_NUMBER)]
#[command(about = "Run and probe the GAO end-to-end encrypted transport", long_about = None)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Run the demo server behind the transport
    Serve(serve::ServeArgs),

    /// Handshake with a server and make one encrypted echo request
    Probe(probe::ProbeArgs),

    /// Print the effective configuration as TOML
    Config(show_config::ConfigArgs),
}

/// Execute CLI command
pub async fn execute(cli: Cli) -> Result<()> {
    match cli.command {
        Commands::Serve(args) => serve::serve(args).await,
        Commands::Probe(args) => probe::probe(args).await,
        Commands::Config(args) => show_config::show_config(args),
    }
}

/// Config file (if any) overlaid with `GAO_E2EE_*` environment variables
pub fn load_config(path: Option<&Path>) -> Result<E2eeConfig> {
    let base = match path {
        Some(path) => E2eeConfig::from_file(path)?,
        None => E2eeConfig::default(),
    };
    Ok(base.overlay_env(|key| std::env::var(key).ok())?)
}
