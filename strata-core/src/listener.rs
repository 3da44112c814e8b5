use crate::error::ConfigError;
use crate::id::validate_id;
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Published listener timeout defaults, applied during the defaults phase
/// when a field is absent or non-positive.
pub const DEFAULT_READ_TIMEOUT_MS: i64 = 60_000;
pub const DEFAULT_WRITE_TIMEOUT_MS: i64 = 60_000;
pub const DEFAULT_IDLE_TIMEOUT_MS: i64 = 60_000;
pub const DEFAULT_DRAIN_TIMEOUT_MS: i64 = 30_000;

/// A bound socket definition. A listener is destroyed only when a committed
/// config omits its ID or changes its address (remove old, add new).
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Listener {
    pub id: String,

    /// `host:port` bind address.
    pub address: String,

    #[serde(default)]
    pub kind: ListenerKind,

    /// Protocol options; timeouts get library defaults when unset.
    #[serde(default)]
    pub http: HttpListenerOptions,
}

#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum ListenerKind {
    #[default]
    Http,
    /// Reserved; rejected by validation until a gRPC data plane exists.
    Grpc,
}

/// Timeouts in milliseconds. Zero or negative means "unset"; the defaults
/// phase replaces unset values with the published defaults.
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct HttpListenerOptions {
    #[serde(default)]
    pub read_timeout_ms: i64,
    #[serde(default)]
    pub write_timeout_ms: i64,
    #[serde(default)]
    pub idle_timeout_ms: i64,
    #[serde(default)]
    pub drain_timeout_ms: i64,
}

impl HttpListenerOptions {
    pub fn apply_defaults(&mut self) {
        if self.read_timeout_ms <= 0 {
            self.read_timeout_ms = DEFAULT_READ_TIMEOUT_MS;
        }
        if self.write_timeout_ms <= 0 {
            self.write_timeout_ms = DEFAULT_WRITE_TIMEOUT_MS;
        }
        if self.idle_timeout_ms <= 0 {
            self.idle_timeout_ms = DEFAULT_IDLE_TIMEOUT_MS;
        }
        if self.drain_timeout_ms <= 0 {
            self.drain_timeout_ms = DEFAULT_DRAIN_TIMEOUT_MS;
        }
    }

    pub fn read_timeout(&self) -> Duration {
        ms_or(self.read_timeout_ms, DEFAULT_READ_TIMEOUT_MS)
    }

    pub fn write_timeout(&self) -> Duration {
        ms_or(self.write_timeout_ms, DEFAULT_WRITE_TIMEOUT_MS)
    }

    pub fn idle_timeout(&self) -> Duration {
        ms_or(self.idle_timeout_ms, DEFAULT_IDLE_TIMEOUT_MS)
    }

    pub fn drain_timeout(&self) -> Duration {
        ms_or(self.drain_timeout_ms, DEFAULT_DRAIN_TIMEOUT_MS)
    }
}

fn ms_or(ms: i64, fallback: i64) -> Duration {
    let effective = if ms > 0 { ms } else { fallback };
    Duration::from_millis(effective as u64)
}

impl Listener {
    /// Local structural checks only; uniqueness and cross-references are the
    /// validator's job.
    pub fn validate(&self) -> Result<(), ConfigError> {
        validate_id("listener", &self.id)?;
        if !is_valid_bind_address(&self.address) {
            return Err(ConfigError::InvalidAddress {
                id: self.id.clone(),
                address: self.address.clone(),
            });
        }
        if self.kind == ListenerKind::Grpc {
            return Err(ConfigError::ReservedListenerKind {
                id: self.id.clone(),
            });
        }
        Ok(())
    }
}

/// `host:port` with a non-empty host and a numeric port.
fn is_valid_bind_address(address: &str) -> bool {
    let Some((host, port)) = address.rsplit_once(':') else {
        return false;
    };
    !host.is_empty() && port.parse::<u16>().is_ok()
}
