//! TOML-file key/value store.
//!
//! One file holds both the client's settings and the persisted values:
//!
//! ```toml
//! [settings]
//! log_level = "info"
//!
//! [values]
//! server_ip = "192.168.1.1"
//! ```
//!
//! Default location:
//! - Windows:  `%APPDATA%\CamLink\state.toml`
//! - Linux:    `$XDG_CONFIG_HOME/camlink/state.toml` (or `~/.config/camlink/state.toml`)
//! - macOS:    `~/Library/Application Support/CamLink/state.toml`
//!
//! A missing file reads as empty.  Every `set` is a full read-modify-write of
//! the file, so settings edited by hand survive a value update.

use std::collections::BTreeMap;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use std::sync::{Mutex, PoisonError};

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::application::endpoint_store::{KeyValueStore, StoreError};

const FILE_NAME: &str = "state.toml";

/// Client settings read from the `[settings]` table.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ClientSettings {
    /// Log filter used when `RUST_LOG` is not set: "error" | "warn" | "info" | "debug" | "trace".
    #[serde(default = "default_log_level")]
    pub log_level: String,
}

fn default_log_level() -> String {
    "info".to_string()
}

impl Default for ClientSettings {
    fn default() -> Self {
        Self {
            log_level: default_log_level(),
        }
    }
}

#[derive(Debug, Default, Serialize, Deserialize)]
struct StateFile {
    #[serde(default)]
    settings: ClientSettings,
    #[serde(default)]
    values: BTreeMap<String, String>,
}

/// A [`KeyValueStore`] backed by a TOML file.
#[derive(Debug)]
pub struct TomlFileStore {
    path: PathBuf,
    // Serialises read-modify-write cycles from this process.
    write_lock: Mutex<()>,
}

impl TomlFileStore {
    /// Opens the store at the platform default location.
    ///
    /// The file is not touched until the first read or write.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::NoPlatformConfigDir`] when the platform config
    /// base directory cannot be determined from the environment.
    pub fn open_default() -> Result<Self, StoreError> {
        let dir = platform_config_dir().ok_or(StoreError::NoPlatformConfigDir)?;
        Ok(Self::at(dir.join(FILE_NAME)))
    }

    /// Opens the store at an explicit file path.
    pub fn at(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            write_lock: Mutex::new(()),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Returns the `[settings]` table, or defaults when the file is absent.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::Io`] for file-system errors other than "not
    /// found", and [`StoreError::Format`] if the TOML is malformed.
    pub fn load_settings(&self) -> Result<ClientSettings, StoreError> {
        Ok(self.read()?.settings)
    }

    fn read(&self) -> Result<StateFile, StoreError> {
        match std::fs::read_to_string(&self.path) {
            Ok(content) => {
                toml::from_str(&content).map_err(|e| StoreError::Format(e.to_string()))
            }
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(StateFile::default()),
            Err(source) => Err(StoreError::Io {
                path: self.path.clone(),
                source,
            }),
        }
    }

    fn write(&self, state: &StateFile) -> Result<(), StoreError> {
        if let Some(dir) = self.path.parent() {
            std::fs::create_dir_all(dir).map_err(|source| StoreError::Io {
                path: dir.to_path_buf(),
                source,
            })?;
        }

        let content =
            toml::to_string_pretty(state).map_err(|e| StoreError::Format(e.to_string()))?;
        std::fs::write(&self.path, content).map_err(|source| StoreError::Io {
            path: self.path.clone(),
            source,
        })
    }
}

impl KeyValueStore for TomlFileStore {
    fn get(&self, key: &str) -> Result<Option<String>, StoreError> {
        Ok(self.read()?.values.remove(key))
    }

    fn set(&self, key: &str, value: &str) -> Result<(), StoreError> {
        let _guard = self.write_lock.lock().unwrap_or_else(PoisonError::into_inner);
        let mut state = self.read()?;
        state.values.insert(key.to_string(), value.to_string());
        self.write(&state)?;
        debug!("stored {key:?} in {}", self.path.display());
        Ok(())
    }
}

/// Resolves the platform config directory, including the `CamLink` subdirectory.
fn platform_config_dir() -> Option<PathBuf> {
    #[cfg(target_os = "windows")]
    {
        std::env::var_os("APPDATA").map(|p| PathBuf::from(p).join("CamLink"))
    }

    #[cfg(target_os = "linux")]
    {
        let base = std::env::var_os("XDG_CONFIG_HOME")
            .map(PathBuf::from)
            .or_else(|| std::env::var_os("HOME").map(|h| PathBuf::from(h).join(".config")))?;
        Some(base.join("camlink"))
    }

    #[cfg(target_os = "macos")]
    {
        std::env::var_os("HOME")
            .map(|h| PathBuf::from(h).join("Library").join("Application Support").join("CamLink"))
    }

    #[cfg(not(any(target_os = "windows", target_os = "linux", target_os = "macos")))]
    {
        None
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────
