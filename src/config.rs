//! Process-level relay configuration.

use std::time::Duration;
use thiserror::Error;

pub const DEFAULT_INTERFACE: &str = "eth4";
pub const DEFAULT_PRESENCE_TIMEOUT: Duration = Duration::from_secs(30);
/// Datagrams buffered between the receiver and the sender of one session.
pub const DEFAULT_QUEUE_CAPACITY: usize = 700;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum ConfigError {
    #[error("invalid duration `{0}`")]
    InvalidDuration(String),
    #[error("queue capacity must be greater than zero")]
    ZeroQueueCapacity,
}

/// Settings shared by every relay session of the process.
#[derive(Debug, Clone)]
pub struct RelayConfig {
    /// Interface name (or IPv4 address) to join multicast groups on.
    pub interface: String,
    /// Grace period for the first datagram of a session.
    pub presence_timeout: Duration,
    pub queue_capacity: usize,
}

impl Default for RelayConfig {
    fn default() -> Self {
        Self {
            interface: DEFAULT_INTERFACE.to_string(),
            presence_timeout: DEFAULT_PRESENCE_TIMEOUT,
            queue_capacity: DEFAULT_QUEUE_CAPACITY,
        }
    }
}

impl RelayConfig {
    pub fn new(
        interface: &str,
        presence_timeout: &str,
        queue_capacity: usize,
    ) -> Result<Self, ConfigError> {
        if queue_capacity == 0 {
            return Err(ConfigError::ZeroQueueCapacity);
        }
        Ok(Self {
            interface: interface.to_string(),
            presence_timeout: parse_duration(presence_timeout)?,
            queue_capacity,
        })
    }
}

/// Parse durations such as `30s`, `500ms`, `1m30s` or `1.5h`.
pub fn parse_duration(s: &str) -> Result<Duration, ConfigError> {
    let invalid = || ConfigError::InvalidDuration(s.to_string());

    let mut rest = s.trim();
    if rest.is_empty() {
        return Err(invalid());
    }
    if rest == "0" {
        return Ok(Duration::ZERO);
    }

    let mut total = 0f64;
    while !rest.is_empty() {
        let num_len = rest
            .find(|c: char| !(c.is_ascii_digit() || c == '.'))
            .ok_or_else(invalid)?;
        if num_len == 0 {
            return Err(invalid());
        }
        let value: f64 = rest[..num_len].parse().map_err(|_| invalid())?;
        rest = &rest[num_len..];

        let unit_len = rest
            .find(|c: char| c.is_ascii_digit() || c == '.')
            .unwrap_or(rest.len());
        let nanos_per_unit = match &rest[..unit_len] {
            "ns" => 1.0,
            "us" | "µs" => 1e3,
            "ms" => 1e6,
            "s" => 1e9,
            "m" => 60e9,
            "h" => 3600e9,
            _ => return Err(invalid()),
        };
        rest = &rest[unit_len..];
        total += value * nanos_per_unit;
    }

    if !total.is_finite() || total > u64::MAX as f64 {
        return Err(invalid());
    }
    Ok(Duration::from_nanos(total as u64))
}
