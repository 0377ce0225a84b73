//! Hand-off of repackaged archives
//!
//! A [`Loader`] receives the finished docker-archive tarball and is then asked
//! to apply it. What "apply" means belongs to the embedding application.

use async_trait::async_trait;
use std::path::{Path, PathBuf};
use std::sync::{Arc, PoisonError, RwLock};

use crate::error::{EngineError, Result};

/// Consumer of repackaged archives
#[async_trait]
pub trait Loader: Send + Sync {
    /// Receive the archive for `name`
    async fn load_from_archive_stream(&self, name: &str, archive: &[u8]) -> Result<()>;

    /// Apply a previously loaded archive
    async fn apply(&self, name: &str) -> Result<()>;
}

/// File name for an archive named `name` (`local/app:1` -> `local_app_1.tar`)
pub fn archive_file_name(name: &str) -> String {
    let stem: String = name
        .chars()
        .map(|c| if c.is_ascii_alphanumeric() || c == '.' || c == '-' { c } else { '_' })
        .collect();
    format!("{}.tar", stem)
}

/// Writes archives into a directory
///
/// Apply requests are appended to `applied.log` in the same directory.
#[derive(Debug, Clone)]
pub struct DirectoryLoader {
    dir: PathBuf,
}

impl DirectoryLoader {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    pub fn archive_path(&self, name: &str) -> PathBuf {
        self.dir.join(archive_file_name(name))
    }
}

#[async_trait]
impl Loader for DirectoryLoader {
    async fn load_from_archive_stream(&self, name: &str, archive: &[u8]) -> Result<()> {
        tokio::fs::create_dir_all(&self.dir).await?;
        let path = self.archive_path(name);
        tokio::fs::write(&path, archive).await?;
        tracing::info!(name, path = %path.display(), size = archive.len(), "Wrote archive");
        Ok(())
    }

    async fn apply(&self, name: &str) -> Result<()> {
        use tokio::io::AsyncWriteExt;

        let path = self.archive_path(name);
        if !tokio::fs::try_exists(&path).await? {
            return Err(EngineError::loader(format!("{} was never loaded", name)));
        }

        let mut log = tokio::fs::OpenOptions::new()
            .create(true)
            .append(true)
            .open(self.dir.join("applied.log"))
            .await?;
        log.write_all(format!("{}\n", name).as_bytes()).await?;
        log.flush().await?;
        Ok(())
    }
}

/// An archive captured by [`RecordingLoader`]
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LoadedArchive {
    pub name: String,
    pub data: Vec<u8>,
}

#[derive(Debug, Default)]
struct Recorded {
    loaded: Vec<LoadedArchive>,
    applied: Vec<String>,
    fail_load: bool,
    fail_apply: bool,
}

/// In-memory loader for testing
#[derive(Debug, Clone, Default)]
pub struct RecordingLoader {
    recorded: Arc<RwLock<Recorded>>,
}

impl RecordingLoader {
    pub fn new() -> Self {
        Self::default()
    }

    /// Archives received so far, in order
    pub fn loaded(&self) -> Vec<LoadedArchive> {
        self.read(|r| r.loaded.clone())
    }

    /// Names applied so far, in order
    pub fn applied(&self) -> Vec<String> {
        self.read(|r| r.applied.clone())
    }

    pub fn fail_load(&self, fail: bool) {
        self.write(|r| r.fail_load = fail);
    }

    pub fn fail_apply(&self, fail: bool) {
        self.write(|r| r.fail_apply = fail);
    }

    fn read<T>(&self, f: impl FnOnce(&Recorded) -> T) -> T {
        let recorded = self.recorded.read().unwrap_or_else(PoisonError::into_inner);
        f(&*recorded)
    }

    fn write<T>(&self, f: impl FnOnce(&mut Recorded) -> T) -> T {
        let mut recorded = self.recorded.write().unwrap_or_else(PoisonError::into_inner);
        f(&mut *recorded)
    }
}

#[async_trait]
impl Loader for RecordingLoader {
    async fn load_from_archive_stream(&self, name: &str, archive: &[u8]) -> Result<()> {
        self.write(|r| {
            if r.fail_load {
                return Err(EngineError::loader(format!("injected load failure for {}", name)));
            }
            r.loaded.push(LoadedArchive {
                name: name.to_string(),
                data: archive.to_vec(),
            });
            Ok(())
        })
    }

    async fn apply(&self, name: &str) -> Result<()> {
        self.write(|r| {
            if r.fail_apply {
                return Err(EngineError::loader(format!("injected apply failure for {}", name)));
            }
            r.applied.push(name.to_string());
            Ok(())
        })
    }
}
