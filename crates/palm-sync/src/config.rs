//! Server configuration.

use std::time::Duration;

use palm_sync_link::{CmpConfig, NetSyncConfig, PadpConfig};
use serde::{Deserialize, Serialize};

/// Pause between sending EndOfSync and closing the link, so the handheld
/// can read the reply before the connection drops.
pub const DEFAULT_END_OF_SYNC_DELAY: Duration = Duration::from_millis(100);

/// Configuration for a [`SyncServer`](crate::SyncServer).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ServerConfig {
    /// Go back to waiting for a device after each session.
    pub continuous: bool,
    pub end_of_sync_delay: Duration,
    pub padp: PadpConfig,
    pub cmp: CmpConfig,
    pub netsync: NetSyncConfig,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            continuous: false,
            end_of_sync_delay: DEFAULT_END_OF_SYNC_DELAY,
            padp: PadpConfig::default(),
            cmp: CmpConfig::default(),
            netsync: NetSyncConfig::default(),
        }
    }
}

impl ServerConfig {
    pub fn with_continuous(mut self, continuous: bool) -> Self {
        self.continuous = continuous;
        self
    }

    pub fn with_end_of_sync_delay(mut self, delay: Duration) -> Self {
        self.end_of_sync_delay = delay;
        self
    }

    pub fn with_padp(mut self, padp: PadpConfig) -> Self {
        self.padp = padp;
        self
    }

    pub fn with_cmp(mut self, cmp: CmpConfig) -> Self {
        self.cmp = cmp;
        self
    }

    pub fn with_netsync(mut self, netsync: NetSyncConfig) -> Self {
        self.netsync = netsync;
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = ServerConfig::default();
        assert!(!config.continuous);
        assert_eq!(config.end_of_sync_delay, Duration::from_millis(100));
        assert_eq!(config.padp.ack_timeout, Duration::from_secs(2));
        assert_eq!(config.padp.ack_retries, 0);
        assert_eq!(config.netsync.max_payload, 1024 * 1024);
    }

    #[test]
    fn test_json_roundtrip() {
        let config = ServerConfig::default()
            .with_continuous(true)
            .with_cmp(CmpConfig::default().with_baud_rate(115_200));
        let json = serde_json::to_string(&config).unwrap();
        let parsed: ServerConfig = serde_json::from_str(&json).unwrap();
        assert_eq!(parsed, config);
    }
}
