// Copyright (c) 2025 Fabstir
// SPDX-License-Identifier: BUSL-1.1
use anyhow::Result;
use clap::Args;
use std::path::PathBuf;

use super::load_config;

/// Arguments for the config command
#[derive(Args, Debug)]
pub struct ConfigArgs {
    /// TOML config file to start from
    #[arg(long, env = "GAO_E2EE_CONFIG")]
    pub config: Option<PathBuf>,
}

pub fn show_config(args: ConfigArgs) -> Result<()> {
    let config = load_config(args.config.as_deref())?;
    print!("{}", config.to_toml_string()?);
    Ok(())
}
