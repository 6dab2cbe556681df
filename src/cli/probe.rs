// Copyright (c) 2025 Fabstir
// SPDX-License-Identifier: BUSL-1.1
use anyhow::{bail, Context, Result};
use clap::Args;
use reqwest::header::CONTENT_TYPE;
use serde_json::{json, Value};
use tracing::info;

use crate::client::E2eeClient;
use crate::config::{DEFAULT_HANDSHAKE_PATH, DEFAULT_MAX_REQUESTS_BEFORE_ROTATION};
use crate::handshake::HandshakeResponse;

/// Arguments for the probe command
#[derive(Args, Debug)]
pub struct ProbeArgs {
    /// Base URL of the server
    #[arg(long, default_value = "http://127.0.0.1:8080")]
    pub url: String,

    /// Handshake path on the server
    #[arg(long, default_value = DEFAULT_HANDSHAKE_PATH)]
    pub handshake_path: String,

    /// Server's max requests before rotation
    #[arg(long, default_value_t = DEFAULT_MAX_REQUESTS_BEFORE_ROTATION)]
    pub max_requests: u64,

    /// Message to send to /api/echo
    #[arg(long, default_value = "hello from gao-cli")]
    pub message: String,
}

/// Handshake, send one sealed echo request, open the reply
pub async fn probe(args: ProbeArgs) -> Result<()> {
    let base = args.url.trim_end_matches('/');
    let http = reqwest::Client::new();
    let mut client = E2eeClient::new(args.max_requests);

    let handshake = client.begin_handshake();
    let response = http
        .post(format!("{}{}", base, args.handshake_path))
        .json(&handshake)
        .send()
        .await
        .context("handshake request failed")?;
    if !response.status().is_success() {
        let status = response.status();
        bail!("handshake rejected with {}: {}", status, response.text().await?);
    }
    let response: HandshakeResponse = response.json().await?;
    client.complete_handshake(&response)?;
    info!("🤝 Session {} established", response.session_id);

    let payload = serde_json::to_vec(&json!({ "message": args.message }))?;
    let sealed = client.seal_request(&payload)?;

    let mut request = http
        .post(format!("{}/api/echo", base))
        .header(CONTENT_TYPE, "application/json")
        .body(sealed.body.clone());
    for (name, value) in sealed.headers() {
        request = request.header(name, value);
    }

    let reply = request.send().await.context("echo request failed")?;
    let status = reply.status();
    let body = reply.text().await?;
    if !status.is_success() {
        bail!("echo rejected with {}: {}", status, body);
    }

    let plaintext = client.open_response(&body, sealed.seq)?;
    let echoed: Value = serde_json::from_slice(&plaintext)?;
    println!("✅ seq {} round trip OK", sealed.seq);
    println!("{}", serde_json::to_string_pretty(&echoed)?);
    Ok(())
}
