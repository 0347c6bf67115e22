use std::fmt;

use serde::{Deserialize, Serialize};

/// Connectivity of one observed resource.
///
/// The session manager keeps two of these side by side: one for the control
/// channel and one for the camera presence the device last reported.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ConnectionState {
    /// Nothing is known yet (before the persisted endpoint has been loaded).
    #[default]
    Loading,
    Connected,
    Disconnected,
}

impl ConnectionState {
    pub fn is_connected(self) -> bool {
        self == ConnectionState::Connected
    }

    /// `Connected` if `flag`, otherwise `Disconnected`.
    pub fn from_flag(flag: bool) -> Self {
        if flag {
            ConnectionState::Connected
        } else {
            ConnectionState::Disconnected
        }
    }
}

impl fmt::Display for ConnectionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            ConnectionState::Loading => "loading",
            ConnectionState::Connected => "connected",
            ConnectionState::Disconnected => "disconnected",
        })
    }
}
