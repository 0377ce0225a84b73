//! CLI commands

pub mod inspect;
pub mod keygen;
pub mod process;
pub mod resolve;
pub mod seal;

use std::path::Path;

use sealpack_engine::PipelineConfig;

use crate::error::{CliError, Result};

/// Load the configuration file given on the command line, or the default one
pub fn load_config(path: Option<&Path>) -> Result<PipelineConfig> {
    let config = match path {
        Some(path) => PipelineConfig::load_from(path).map_err(|e| {
            CliError::from(e).with_help(format!("while reading {}", path.display()))
        })?,
        None => PipelineConfig::load()?,
    };
    tracing::debug!(
        timeout = ?config.timeout,
        key_service = %config.key_service,
        "Loaded configuration"
    );
    Ok(config)
}
