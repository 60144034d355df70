//! TOML configuration file parsing

use super::*;
use crate::config::cli::{Cli, SymmetryMode};
use anyhow::{Context, Result};
use std::fs;
use std::path::Path;

/// Parse TOML configuration file
pub fn parse_toml_file(path: &Path) -> Result<Config> {
    let contents = fs::read_to_string(path)
        .with_context(|| format!("Failed to read config file: {}", path.display()))?;

    parse_toml_string(&contents)
        .with_context(|| format!("Failed to parse config file: {}", path.display()))
}

/// Parse TOML configuration from string
pub fn parse_toml_string(contents: &str) -> Result<Config> {
    let config: Config = ::toml::from_str(contents)
        .context("Failed to parse TOML configuration")?;

    Ok(config)
}

/// Merge CLI arguments with TOML configuration (CLI takes precedence)
pub fn merge_cli_with_config(cli: &Cli, mut config: Config) -> Result<Config> {
    if let Some(ref run_name) = cli.run_name {
        config.main.run_name = run_name.clone();
    }

    if let Some(symmetry) = cli.symmetry {
        config.main.symmetry = match symmetry {
            SymmetryMode::Symmetric => Symmetry::Symmetric,
            SymmetryMode::Positive => Symmetry::Positive,
            SymmetryMode::Negative => Symmetry::Negative,
        };
    }

    // Override output settings
    if let Some(ref dir) = cli.output_dir {
        config.output.dir = dir.clone();
    }
    if let Some(ref path) = cli.json_output {
        config.output.json_output = Some(path.clone());
    }

    // Override runtime settings
    if cli.debug {
        config.runtime.debug = true;
    }
    if cli.dry_run {
        config.runtime.dry_run = true;
    }

    Ok(config)
}
