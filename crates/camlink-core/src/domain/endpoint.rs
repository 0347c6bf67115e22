//! The camera device address.
//!
//! An [`Endpoint`] is just a host (`"192.168.1.20"`, `"camera.local"`).  The
//! ports and paths of the two device services are fixed, so both URLs are
//! derived from the host alone:
//!
//! ```text
//! control channel  ws://<host>:8888/ws
//! video stream     http://<host>:8080/live.mjpeg
//! ```

use std::fmt;

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Host used when nothing has been persisted yet.
pub const DEFAULT_HOST: &str = "192.168.1.1";

/// TCP port of the device's WebSocket control server.
pub const CONTROL_PORT: u16 = 8888;

/// HTTP path of the control WebSocket.
pub const CONTROL_PATH: &str = "/ws";

/// TCP port of the device's MJPEG stream server.
pub const STREAM_PORT: u16 = 8080;

/// HTTP path of the MJPEG stream.
pub const STREAM_PATH: &str = "/live.mjpeg";

/// Errors produced when turning user input into an [`Endpoint`].
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum EndpointError {
    #[error("endpoint host is empty")]
    Empty,

    #[error("invalid endpoint host {0:?}: must not contain whitespace")]
    InvalidHost(String),
}

/// A device host address.
///
/// Equality is exact string equality; no DNS resolution or normalisation is
/// performed beyond trimming in [`Endpoint::parse`].
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Endpoint(String);

impl Endpoint {
    /// Parses user-entered text, trimming surrounding whitespace.
    ///
    /// # Errors
    ///
    /// Returns [`EndpointError::Empty`] for blank input and
    /// [`EndpointError::InvalidHost`] when whitespace remains inside the host.
    pub fn parse(input: &str) -> Result<Self, EndpointError> {
        let host = input.trim();
        if host.is_empty() {
            return Err(EndpointError::Empty);
        }
        if host.chars().any(char::is_whitespace) {
            return Err(EndpointError::InvalidHost(host.to_string()));
        }
        Ok(Self(host.to_string()))
    }

    pub fn host(&self) -> &str {
        &self.0
    }

    /// WebSocket URL of the control channel.
    pub fn control_url(&self) -> String {
        format!("ws://{}:{CONTROL_PORT}{CONTROL_PATH}", self.0)
    }

    /// HTTP URL of the MJPEG video stream, for the presentation layer.
    pub fn stream_url(&self) -> String {
        format!("http://{}:{STREAM_PORT}{STREAM_PATH}", self.0)
    }
}

impl Default for Endpoint {
    fn default() -> Self {
        Self(DEFAULT_HOST.to_string())
    }
}

impl fmt::Display for Endpoint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl std::str::FromStr for Endpoint {
    type Err = EndpointError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_trims_surrounding_whitespace() {
        // Arrange / Act
        let endpoint = Endpoint::parse("  10.0.0.5\n").unwrap();

        // Assert
        assert_eq!(endpoint.host(), "10.0.0.5");
    }

    #[test]
    fn test_parse_rejects_blank_input() {
        assert_eq!(Endpoint::parse(""), Err(EndpointError::Empty));
        assert_eq!(Endpoint::parse("   "), Err(EndpointError::Empty));
    }

    #[test]
    fn test_parse_rejects_inner_whitespace() {
        assert!(matches!(
            Endpoint::parse("10.0 .0.5"),
            Err(EndpointError::InvalidHost(_))
        ));
    }

    #[test]
    fn test_default_is_the_factory_address() {
        assert_eq!(Endpoint::default().host(), DEFAULT_HOST);
    }

    #[test]
    fn test_control_url_targets_websocket_port() {
        let endpoint = Endpoint::parse("camera.local").unwrap();
        assert_eq!(endpoint.control_url(), "ws://camera.local:8888/ws");
    }

    #[test]
    fn test_stream_url_targets_mjpeg_port() {
        let endpoint = Endpoint::parse("192.168.1.168").unwrap();
        assert_eq!(endpoint.stream_url(), "http://192.168.1.168:8080/live.mjpeg");
    }

    #[test]
    fn test_from_str_matches_parse() {
        let endpoint: Endpoint = " 10.0.0.9 ".parse().unwrap();
        assert_eq!(endpoint, Endpoint::parse("10.0.0.9").unwrap());
    }
}
