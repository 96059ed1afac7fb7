//! Error types for relay sessions.

use crate::rtp::DecodeError;
use std::io;
use std::time::Duration;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum RelayError {
    /// Malformed `ip:port` target or not a multicast group
    #[error("invalid multicast target `{target}`: {reason}")]
    InvalidTarget { target: String, reason: String },

    #[error("network interface `{0}` has no IPv4 address")]
    InterfaceNotFound(String),

    #[error("failed to enumerate network interfaces: {0}")]
    InterfaceLookup(String),

    #[error("failed to join multicast group {target}: {source}")]
    Join {
        target: String,
        #[source]
        source: io::Error,
    },

    #[error("no datagram received within {0:?}")]
    PresenceTimeout(Duration),

    #[error("error reading datagram: {0}")]
    Receive(#[source] io::Error),

    #[error("malformed RTP packet: {0}")]
    Decode(#[from] DecodeError),

    #[error("error writing to client: {0}")]
    Write(#[source] io::Error),

    #[error("wrote {written} of {expected} payload bytes")]
    ShortWrite { written: usize, expected: usize },

    #[error("relay worker failed: {0}")]
    Worker(String),
}

impl RelayError {
    /// Whether the error only means the HTTP client went away.
    pub fn is_client_gone(&self) -> bool {
        matches!(self, RelayError::Write(_))
    }
}

pub type Result<T> = std::result::Result<T, RelayError>;
