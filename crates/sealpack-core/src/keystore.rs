//! Per-user secret storage
//!
//! The pipeline only ever reads one secret: the PEM private key used to
//! unwrap the package reference and content key. [`KeyStore`] keeps that
//! lookup behind a trait so the file-backed store can be swapped for an
//! in-memory one in tests.

use std::collections::HashMap;
use std::path::{Component, Path, PathBuf};
use std::sync::{PoisonError, RwLock};

use crate::error::{CoreError, Result};

/// Source of named secrets
pub trait KeyStore: Send + Sync {
    /// Fetch the secret stored for `service`/`user`
    ///
    /// Returns [`CoreError::KeyNotFound`] when nothing is stored.
    fn get_secret(&self, service: &str, user: &str) -> Result<String>;
}

/// File-backed key store
///
/// Secrets live at `<root>/<service>/<user>.pem`, written with `0600`
/// permissions on Unix.
#[derive(Debug, Clone)]
pub struct FileKeyStore {
    root: PathBuf,
}

impl FileKeyStore {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    /// Key store under the user's config directory
    pub fn open_default() -> Result<Self> {
        Ok(Self::new(Self::default_path()?))
    }

    /// Default key directory (`~/.config/sealpack/keys`)
    pub fn default_path() -> Result<PathBuf> {
        let config_dir = dirs::config_dir().ok_or_else(|| CoreError::KeyStore {
            message: "Could not determine config directory".to_string(),
        })?;
        Ok(config_dir.join("sealpack").join("keys"))
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Store a secret, replacing any previous value
    pub fn set_secret(&self, service: &str, user: &str, secret: &str) -> Result<()> {
        let path = self.secret_path(service, user)?;
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }

        #[cfg(unix)]
        {
            use std::os::unix::fs::OpenOptionsExt;
            let mut options = std::fs::OpenOptions::new();
            options.write(true).create(true).truncate(true).mode(0o600);
            std::io::Write::write_all(&mut options.open(&path)?, secret.as_bytes())?;
        }

        #[cfg(not(unix))]
        std::fs::write(&path, secret)?;

        Ok(())
    }

    fn secret_path(&self, service: &str, user: &str) -> Result<PathBuf> {
        for segment in [service, user] {
            if !is_plain_segment(segment) {
                return Err(CoreError::KeyStore {
                    message: format!("invalid key identity segment '{}'", segment),
                });
            }
        }
        Ok(self.root.join(service).join(format!("{}.pem", user)))
    }
}

impl KeyStore for FileKeyStore {
    fn get_secret(&self, service: &str, user: &str) -> Result<String> {
        let path = self.secret_path(service, user)?;
        match std::fs::read_to_string(&path) {
            Ok(secret) => Ok(secret),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Err(CoreError::KeyNotFound {
                service: service.to_string(),
                user: user.to_string(),
            }),
            Err(e) => Err(CoreError::KeyStore {
                message: format!("Failed to read {}: {}", path.display(), e),
            }),
        }
    }
}

fn is_plain_segment(segment: &str) -> bool {
    let mut components = Path::new(segment).components();
    matches!(
        (components.next(), components.next()),
        (Some(Component::Normal(_)), None)
    )
}

/// In-memory key store for tests and embedding
#[derive(Debug, Default)]
pub struct MemoryKeyStore {
    secrets: RwLock<HashMap<(String, String), String>>,
}

impl MemoryKeyStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_secret(service: &str, user: &str, secret: impl Into<String>) -> Self {
        let store = Self::new();
        store.insert(service, user, secret);
        store
    }

    pub fn insert(&self, service: &str, user: &str, secret: impl Into<String>) {
        self.secrets
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .insert((service.to_string(), user.to_string()), secret.into());
    }
}

impl KeyStore for MemoryKeyStore {
    fn get_secret(&self, service: &str, user: &str) -> Result<String> {
        let secrets = self.secrets.read().unwrap_or_else(PoisonError::into_inner);
        secrets
            .get(&(service.to_string(), user.to_string()))
            .cloned()
            .ok_or_else(|| CoreError::KeyNotFound {
                service: service.to_string(),
                user: user.to_string(),
            })
    }
}
