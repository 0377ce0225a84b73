//! Pipeline configuration
//!
//! Stored in `~/.config/sealpack/config.yaml`

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::error::{EngineError, Result};
use sealpack_core::archive::{ExtractOptions, MAX_FILE_SIZE, PACKAGE_FILE};
use sealpack_core::crypto::SecretIdentity;
use sealpack_core::FileKeyStore;
use sealpack_repo::{DEFAULT_BASE_LABEL_VALUE, RegistryConfig};

/// Pipeline configuration file
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PipelineConfig {
    /// Key store service holding the private key
    #[serde(default = "default_key_service")]
    pub key_service: String,

    /// Key store user holding the private key
    #[serde(default = "default_key_user")]
    pub key_user: String,

    /// Image label value marking the base layer
    #[serde(default = "default_base_label_value")]
    pub base_label_value: String,

    /// Per-file cap on extracted bytes
    #[serde(default = "default_max_file_size")]
    pub max_file_size: u64,

    /// Deadline for a whole pipeline run
    #[serde(default = "default_timeout", with = "humantime_serde")]
    pub timeout: Duration,

    #[serde(default)]
    pub registry: RegistryConfig,

    /// Directory backing the file key store
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub key_dir: Option<PathBuf>,
}

fn default_key_service() -> String {
    "sealpack".to_string()
}

fn default_key_user() -> String {
    "default".to_string()
}

fn default_base_label_value() -> String {
    DEFAULT_BASE_LABEL_VALUE.to_string()
}

fn default_max_file_size() -> u64 {
    MAX_FILE_SIZE
}

fn default_timeout() -> Duration {
    Duration::from_secs(300)
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            key_service: default_key_service(),
            key_user: default_key_user(),
            base_label_value: default_base_label_value(),
            max_file_size: default_max_file_size(),
            timeout: default_timeout(),
            registry: RegistryConfig::default(),
            key_dir: None,
        }
    }
}

impl PipelineConfig {
    /// Load configuration from default location
    pub fn load() -> Result<Self> {
        let path = Self::default_path()?;
        if path.exists() {
            Self::load_from(&path)
        } else {
            Ok(Self::default())
        }
    }

    /// Load configuration from a specific path
    pub fn load_from(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)?;
        let config: Self = serde_yaml::from_str(&content)?;
        config.validate()?;
        Ok(config)
    }

    /// Save configuration to default location
    pub fn save(&self) -> Result<()> {
        let path = Self::default_path()?;
        self.save_to(&path)
    }

    /// Save configuration to a specific path
    pub fn save_to(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let content = serde_yaml::to_string(self)?;
        std::fs::write(path, content)?;
        Ok(())
    }

    /// Get default configuration path
    pub fn default_path() -> Result<PathBuf> {
        let config_dir = dirs::config_dir().ok_or_else(|| EngineError::Config {
            message: "Could not determine config directory".to_string(),
        })?;
        Ok(config_dir.join("sealpack").join("config.yaml"))
    }

    fn validate(&self) -> Result<()> {
        if self.max_file_size == 0 {
            return Err(EngineError::Config {
                message: "maxFileSize must be greater than zero".to_string(),
            });
        }
        if self.timeout.is_zero() {
            return Err(EngineError::Config {
                message: "timeout must be greater than zero".to_string(),
            });
        }
        if self.base_label_value.is_empty() {
            return Err(EngineError::Config {
                message: "baseLabelValue must not be empty".to_string(),
            });
        }
        Ok(())
    }

    /// Identity of the private key in the key store
    pub fn identity(&self) -> SecretIdentity {
        SecretIdentity::new(&self.key_service, &self.key_user)
    }

    pub fn extract_options(&self) -> ExtractOptions {
        ExtractOptions {
            max_file_size: self.max_file_size,
            package_file: PACKAGE_FILE.to_string(),
            ..Default::default()
        }
    }

    /// File key store at `keyDir`, or the default key directory
    pub fn key_store(&self) -> Result<FileKeyStore> {
        match &self.key_dir {
            Some(dir) => Ok(FileKeyStore::new(dir)),
            None => Ok(FileKeyStore::open_default()?),
        }
    }
}
