//! Persistence contract for the device endpoint.
//!
//! The session manager never talks to a file or a database directly.  It
//! uses [`EndpointStore`], which stores the endpoint as one string under the
//! well-known key [`STORAGE_KEY`] in whatever [`KeyValueStore`] the host
//! application provides.
//!
//! Reading is forgiving: a missing value, an unreadable backend, or a stored
//! string that is not a valid host all come back as `None` (with a log line),
//! because the caller has a sensible fallback for all three.  Writing reports
//! its error so the caller can surface it, but the caller is expected to keep
//! going with the in-memory value.

use std::path::PathBuf;
use std::sync::Arc;

use camlink_core::Endpoint;
use thiserror::Error;
use tracing::{debug, warn};

/// Key under which the endpoint host is persisted.
pub const STORAGE_KEY: &str = "server_ip";

/// Errors raised by a [`KeyValueStore`] backend.
#[derive(Debug, Error)]
pub enum StoreError {
    /// The platform config directory could not be determined.
    #[error("could not determine platform config directory")]
    NoPlatformConfigDir,

    /// A file system I/O error occurred.
    #[error("I/O error accessing store at {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// The stored data could not be parsed or serialised.
    #[error("store contents are invalid: {0}")]
    Format(String),

    /// The backend is not usable right now.
    #[error("store unavailable: {0}")]
    Unavailable(String),
}

/// A string key/value persistence capability.
///
/// Implementations must be safe to call from any thread; the session manager
/// only calls them while holding its own lock, so they never see concurrent
/// writers from this process.
#[cfg_attr(test, mockall::automock)]
pub trait KeyValueStore: Send + Sync {
    /// Returns the value stored under `key`, or `None` if it was never set.
    fn get(&self, key: &str) -> Result<Option<String>, StoreError>;

    /// Stores `value` under `key`, durably, before returning.
    fn set(&self, key: &str, value: &str) -> Result<(), StoreError>;
}

/// Loads and saves the device [`Endpoint`] through a [`KeyValueStore`].
#[derive(Clone)]
pub struct EndpointStore {
    backend: Arc<dyn KeyValueStore>,
}

impl EndpointStore {
    pub fn new(backend: Arc<dyn KeyValueStore>) -> Self {
        Self { backend }
    }

    /// Returns the previously persisted endpoint, if any.
    ///
    /// Never fails: backend errors and unparsable values are logged and
    /// reported as absence.
    pub fn load(&self) -> Option<Endpoint> {
        match self.backend.get(STORAGE_KEY) {
            Ok(Some(raw)) => match Endpoint::parse(&raw) {
                Ok(endpoint) => Some(endpoint),
                Err(e) => {
                    warn!("ignoring stored endpoint {raw:?}: {e}");
                    None
                }
            },
            Ok(None) => {
                debug!("no endpoint stored under {STORAGE_KEY:?}");
                None
            }
            Err(e) => {
                warn!("could not read stored endpoint: {e}");
                None
            }
        }
    }

    /// Persists `endpoint`.
    ///
    /// # Errors
    ///
    /// Propagates the backend's [`StoreError`].  The caller should keep using
    /// the in-memory value; only durability is lost.
    pub fn save(&self, endpoint: &Endpoint) -> Result<(), StoreError> {
        self.backend.set(STORAGE_KEY, endpoint.host())
    }
}

impl std::fmt::Debug for EndpointStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EndpointStore").finish_non_exhaustive()
    }
}
