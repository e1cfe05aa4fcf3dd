//! Driver configuration.
//!
//! Loaded from JSON, with every field optional:
//!
//! ```json
//! {
//!   "use_managed_networking": true,
//!   "switches": { "Switch.Tds.SomethingElse": false },
//!   "packet_size": 8000,
//!   "connection_timeout": 15000,
//!   "writer": { "max_pending_packets": 256, "backpressure_timeout": 2000 },
//!   "auth": { "application_client_id": "..." }
//! }
//! ```
//!
//! Durations are given in milliseconds.

use std::collections::HashMap;
use std::time::Duration;

use serde::Deserialize;

use crate::error::Result;
use crate::protocol::{clamp_packet_size, DEFAULT_PACKET_SIZE};
use crate::transport::USE_MANAGED_NETWORKING_SWITCH;
use crate::writer::WriterConfig;

/// Environment variable overriding [`DriverConfig::use_managed_networking`].
pub const USE_MANAGED_NETWORKING_ENV: &str = "TDS_USE_MANAGED_NETWORKING";

/// Default connection timeout.
pub const DEFAULT_CONNECTION_TIMEOUT: Duration = Duration::from_secs(15);

/// Top-level driver configuration.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct DriverConfig {
    /// Value of the managed-networking switch. Unset means native.
    pub use_managed_networking: Option<bool>,
    /// Other named boolean switches.
    pub switches: HashMap<String, bool>,
    /// Requested packet size, clamped on use.
    pub packet_size: usize,
    #[serde(with = "duration_ms")]
    pub connection_timeout: Duration,
    pub writer: WriterConfig,
    pub auth: AuthConfig,
}

impl Default for DriverConfig {
    fn default() -> Self {
        Self {
            use_managed_networking: None,
            switches: HashMap::new(),
            packet_size: DEFAULT_PACKET_SIZE,
            connection_timeout: DEFAULT_CONNECTION_TIMEOUT,
            writer: WriterConfig::default(),
            auth: AuthConfig::default(),
        }
    }
}

/// Authentication settings.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct AuthConfig {
    /// Client id presented to Active Directory. Empty means the default.
    pub application_client_id: Option<String>,
}

impl DriverConfig {
    /// Parse configuration from a JSON document.
    pub fn from_json(json: &str) -> Result<Self> {
        Ok(serde_json::from_str(json)?)
    }

    /// Value of the named switch, if set.
    ///
    /// The managed-networking switch is read from its dedicated field first.
    pub fn switch(&self, name: &str) -> Option<bool> {
        if name == USE_MANAGED_NETWORKING_SWITCH {
            if let Some(value) = self.use_managed_networking {
                return Some(value);
            }
        }
        self.switches.get(name).copied()
    }

    /// Apply overrides from the process environment.
    pub fn with_env_overrides(self) -> Self {
        self.with_overrides_from(|key| std::env::var(key).ok())
    }

    /// Apply overrides read through `lookup`.
    ///
    /// Accepts `true`/`false`/`1`/`0`, case-insensitive. Anything else is
    /// logged and ignored.
    pub fn with_overrides_from<F>(mut self, lookup: F) -> Self
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(raw) = lookup(USE_MANAGED_NETWORKING_ENV) {
            match parse_bool(&raw) {
                Some(value) => self.use_managed_networking = Some(value),
                None => tracing::warn!(
                    variable = USE_MANAGED_NETWORKING_ENV,
                    value = %raw,
                    "Ignoring unrecognized boolean override"
                ),
            }
        }
        self
    }

    /// Packet size clamped into the protocol's range.
    pub fn effective_packet_size(&self) -> usize {
        clamp_packet_size(self.packet_size)
    }
}

fn parse_bool(raw: &str) -> Option<bool> {
    match raw.trim().to_ascii_lowercase().as_str() {
        "true" | "1" => Some(true),
        "false" | "0" => Some(false),
        _ => None,
    }
}

/// Serde adapter for durations given as integer milliseconds.
pub(crate) mod duration_ms {
    use std::time::Duration;

    use serde::{Deserialize, Deserializer};

    pub fn deserialize<'de, D>(deserializer: D) -> Result<Duration, D::Error>
    where
        D: Deserializer<'de>,
    {
        u64::deserialize(deserializer).map(Duration::from_millis)
    }
}
