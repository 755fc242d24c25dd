//! Durable record of the isolation configuration.
//!
//! The record is a single JSON document rewritten atomically on every
//! mutation. Load never fails the caller: a missing, unreadable or malformed
//! record yields an empty configuration and a warning. Save failures are
//! logged and the in-memory state stays authoritative until the next
//! successful write.

use std::fs;
use std::io;
use std::path::{Path, PathBuf};

use serde_json::Value;
use thiserror::Error;
use tokio::sync::Mutex;

use warden_types::{IsolationConfig, StoredLayout};
use warden_utils::{atomic_write, recover_bak_file};

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("failed to read {}: {source}", path.display())]
    Read { path: PathBuf, source: io::Error },
    #[error("failed to parse {}: {source}", path.display())]
    Parse {
        path: PathBuf,
        source: serde_json::Error,
    },
    #[error("failed to encode isolation store: {0}")]
    Encode(serde_json::Error),
    #[error("failed to write {}: {source}", path.display())]
    Write { path: PathBuf, source: io::Error },
}

/// Read the record at `path`.
///
/// `Ok(None)` when no record exists yet.
pub fn read(path: &Path) -> Result<Option<(IsolationConfig, StoredLayout)>, StoreError> {
    recover_bak_file(path);
    if !path.exists() {
        return Ok(None);
    }
    let raw = fs::read_to_string(path).map_err(|source| StoreError::Read {
        path: path.to_path_buf(),
        source,
    })?;
    let value: Value = serde_json::from_str(&raw).map_err(|source| StoreError::Parse {
        path: path.to_path_buf(),
        source,
    })?;
    Ok(Some(IsolationConfig::from_value(&value)))
}

/// Load the configuration, degrading to an empty one on any problem.
#[must_use]
pub fn load(path: &Path) -> IsolationConfig {
    match read(path) {
        Ok(Some((config, layout))) => {
            match layout {
                StoredLayout::Current => {}
                StoredLayout::LegacyAllowList => tracing::info!(
                    path = %path.display(),
                    "Loaded legacy allow-list isolation store; it will be rewritten on next change"
                ),
                StoredLayout::Unrecognized => tracing::warn!(
                    path = %path.display(),
                    "Isolation store has an unrecognized layout; starting empty"
                ),
            }
            config
        }
        Ok(None) => {
            tracing::debug!(path = %path.display(), "No isolation store yet; starting empty");
            IsolationConfig::default()
        }
        Err(e) => {
            tracing::warn!("Failed to load isolation store: {e}");
            IsolationConfig::default()
        }
    }
}

/// Normalized on-disk encoding.
pub fn encode(config: &IsolationConfig) -> Result<String, StoreError> {
    let mut out = serde_json::to_string_pretty(config).map_err(StoreError::Encode)?;
    out.push('\n');
    Ok(out)
}

/// Write the normalized record, creating the parent directory if needed.
pub fn save(path: &Path, config: &IsolationConfig) -> Result<(), StoreError> {
    let encoded = encode(config)?;
    let write_err = |source| StoreError::Write {
        path: path.to_path_buf(),
        source,
    };
    if let Some(dir) = path.parent().filter(|d| !d.as_os_str().is_empty()) {
        fs::create_dir_all(dir).map_err(write_err)?;
    }
    atomic_write(path, encoded.as_bytes()).map_err(write_err)
}

/// The shared, lock-protected configuration plus its backing file.
///
/// Every mutation is read-modify-write-persist under one lock.
#[derive(Debug)]
pub struct IsolationStore {
    path: PathBuf,
    config: Mutex<IsolationConfig>,
}

impl IsolationStore {
    #[must_use]
    pub fn open(path: impl Into<PathBuf>) -> Self {
        let path = path.into();
        let config = load(&path);
        Self {
            path,
            config: Mutex::new(config),
        }
    }

    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// A copy of the current configuration.
    pub async fn snapshot(&self) -> IsolationConfig {
        self.config.lock().await.clone()
    }

    /// Apply `f` and persist if it succeeded and changed anything. An `Err`
    /// from `f` discards whatever it changed.
    ///
    /// Persistence failures are logged; the in-memory change is kept.
    pub async fn mutate<T, E>(
        &self,
        f: impl FnOnce(&mut IsolationConfig) -> Result<T, E>,
    ) -> Result<T, E> {
        let mut config = self.config.lock().await;
        let before = config.clone();
        match f(&mut config) {
            Ok(result) => {
                if *config != before
                    && let Err(e) = save(&self.path, &config)
                {
                    tracing::error!("Failed to save isolation store: {e}");
                }
                Ok(result)
            }
            Err(e) => {
                *config = before;
                Err(e)
            }
        }
    }
}
