//! Engine configuration.

use std::time::Duration;

use packetforge_dispatch::DispatchConfig;
use packetforge_protocol::ProtocolConfig;
use serde::{Deserialize, Serialize};

use crate::PacketforgeError;

/// Everything an [`Engine`](crate::Engine) needs at construction.
///
/// Missing fields fall back to their defaults, so a JSON file only has
/// to name what it changes:
///
/// ```
/// use packetforge::EngineConfig;
///
/// let config = EngineConfig::from_json_str(r#"{
///     "bind_addr": "0.0.0.0:7000",
///     "dispatch": { "logic_threads": 4 }
/// }"#).unwrap();
/// assert_eq!(config.dispatch.logic_threads, 4);
/// assert_eq!(config.protocol.max_packet_size, 4096);
/// ```
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    /// Address the TCP listener binds to.
    pub bind_addr: String,
    pub protocol: ProtocolConfig,
    pub dispatch: DispatchConfig,
    /// Idle time after which a silent connection is dropped. `0`
    /// disables the timeout.
    pub recv_timeout_secs: u64,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            bind_addr: "127.0.0.1:7000".to_string(),
            protocol: ProtocolConfig::default(),
            dispatch: DispatchConfig::default(),
            recv_timeout_secs: 15,
        }
    }
}

impl EngineConfig {
    /// Parses a JSON configuration document.
    pub fn from_json_str(json: &str) -> Result<Self, PacketforgeError> {
        serde_json::from_str(json).map_err(PacketforgeError::Config)
    }

    /// Clamps the protocol and dispatch sections into range.
    pub fn validated(mut self) -> Self {
        self.protocol = self.protocol.validated();
        self.dispatch = self.dispatch.validated();
        self
    }

    /// The receive timeout, or `None` if disabled.
    pub fn recv_timeout(&self) -> Option<Duration> {
        (self.recv_timeout_secs > 0).then(|| Duration::from_secs(self.recv_timeout_secs))
    }
}
