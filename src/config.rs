use std::net::SocketAddr;
use std::path::PathBuf;
use std::time::Duration;

use crate::store::DEFAULT_MAX_LEADS;

/// Timing rules for the rotation pipeline.
///
/// The promoter windows are measured against a lead's scheduled
/// appointment time:
/// - `expire_after`: this long past the appointment, the lead expires
/// - `cancel_unverified_after`: this long past the appointment without
///   setter verification, the lead is canceled
/// - `promote_within`: a verified lead enters the waiting queue once the
///   appointment is at most this far away
#[derive(Debug, Clone)]
pub struct RotationConfig {
    pub cancel_unverified_after: Duration,
    pub expire_after: Duration,
    pub promote_within: Duration,
    /// Clock tick for the promoter; store changes also trigger a pass.
    pub promoter_interval: Duration,
    /// Quiet period after the last store change before the matcher runs.
    pub matcher_debounce: Duration,
    pub notice_capacity: usize,
}

impl Default for RotationConfig {
    fn default() -> Self {
        Self {
            cancel_unverified_after: Duration::from_secs(10 * 60),
            expire_after: Duration::from_secs(15 * 60),
            promote_within: Duration::from_secs(45 * 60),
            promoter_interval: Duration::from_secs(30),
            matcher_debounce: Duration::from_millis(1000),
            notice_capacity: 256,
        }
    }
}

impl RotationConfig {
    pub fn with_matcher_debounce(mut self, debounce: Duration) -> Self {
        self.matcher_debounce = debounce;
        self
    }

    pub fn with_promoter_interval(mut self, interval: Duration) -> Self {
        self.promoter_interval = interval;
        self
    }
}

#[derive(Debug, Clone)]
pub struct NodeConfig {
    pub listen_addr: SocketAddr,
    /// JSON snapshot loaded at startup and written at shutdown.
    pub data_file: Option<PathBuf>,
    /// Inserts beyond this many leads are rejected.
    pub max_leads: usize,
    pub rotation: RotationConfig,
}

impl Default for NodeConfig {
    fn default() -> Self {
        Self {
            listen_addr: SocketAddr::from(([127, 0, 0, 1], 8080)),
            data_file: None,
            max_leads: DEFAULT_MAX_LEADS,
            rotation: RotationConfig::default(),
        }
    }
}

impl NodeConfig {
    pub fn new(listen_addr: SocketAddr) -> Self {
        Self {
            listen_addr,
            ..Default::default()
        }
    }

    pub fn with_data_file(mut self, path: impl Into<PathBuf>) -> Self {
        self.data_file = Some(path.into());
        self
    }

    pub fn with_max_leads(mut self, max_leads: usize) -> Self {
        self.max_leads = max_leads;
        self
    }

    pub fn with_rotation(mut self, rotation: RotationConfig) -> Self {
        self.rotation = rotation;
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rotation_config_default() {
        let cfg = RotationConfig::default();
        assert_eq!(cfg.cancel_unverified_after, Duration::from_secs(600));
        assert_eq!(cfg.expire_after, Duration::from_secs(900));
        assert_eq!(cfg.promote_within, Duration::from_secs(2700));
        assert_eq!(cfg.promoter_interval, Duration::from_secs(30));
        assert_eq!(cfg.matcher_debounce, Duration::from_millis(1000));
        assert_eq!(cfg.notice_capacity, 256);
    }

    #[test]
    fn rotation_config_builders() {
        let cfg = RotationConfig::default()
            .with_matcher_debounce(Duration::from_millis(20))
            .with_promoter_interval(Duration::from_millis(50));
        assert_eq!(cfg.matcher_debounce, Duration::from_millis(20));
        assert_eq!(cfg.promoter_interval, Duration::from_millis(50));
        assert_eq!(cfg.expire_after, Duration::from_secs(900));
    }

    #[test]
    fn node_config_default() {
        let cfg = NodeConfig::default();
        assert_eq!(cfg.listen_addr.to_string(), "127.0.0.1:8080");
        assert!(cfg.data_file.is_none());
        assert_eq!(cfg.max_leads, 100_000);
    }

    #[test]
    fn node_config_new() {
        let addr: SocketAddr = "10.0.0.1:9000".parse().unwrap();
        let cfg = NodeConfig::new(addr).with_data_file("/var/lib/leadflow.json");
        assert_eq!(cfg.listen_addr, addr);
        assert_eq!(
            cfg.data_file.as_deref(),
            Some(std::path::Path::new("/var/lib/leadflow.json"))
        );
    }
}
