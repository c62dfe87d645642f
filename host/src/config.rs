//! Host configuration, read from a JSON file
//!
//! ```json
//! {
//!   "store_dir": "/tmp/cornhole-host",
//!   "companion_port": 7878,
//!   "radio_loss_percent": 0,
//!   "log_level": "info",
//!   "nodes": [
//!     { "name": "left",  "address": [36, 111, 40, 0, 0, 1], "battery_raw": 3900 },
//!     { "name": "right", "address": [36, 111, 40, 0, 0, 2], "battery_raw": 3900 }
//!   ]
//! }
//! ```
//!
//! Missing fields take their defaults. Node `i` serves its companion link on
//! `companion_port + i`.

use std::collections::BTreeSet;
use std::path::{Path, PathBuf};

use cornhole_node::PeerAddress;
use serde::{Deserialize, Serialize};

use crate::error::HostError;

/// One simulated board
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NodeConfig {
    pub name: String,
    pub address: PeerAddress,
    /// Raw battery ADC reading the board reports
    #[serde(default = "default_battery_raw")]
    pub battery_raw: u16,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct HostConfig {
    /// Directory holding one `<name>.json` store per node
    pub store_dir: PathBuf,
    /// TCP port of the first node's companion link
    pub companion_port: u16,
    /// Chance that a radio frame is lost, 0..=100
    pub radio_loss_percent: u8,
    /// Log filter used when `RUST_LOG` is not set
    pub log_level: String,
    pub nodes: Vec<NodeConfig>,
}

fn default_battery_raw() -> u16 {
    3900
}

impl Default for HostConfig {
    fn default() -> Self {
        Self {
            store_dir: std::env::temp_dir().join("cornhole-host"),
            companion_port: 7878,
            radio_loss_percent: 0,
            log_level: "info".to_string(),
            nodes: vec![
                NodeConfig {
                    name: "left".to_string(),
                    address: PeerAddress::new([0x24, 0x6F, 0x28, 0x00, 0x00, 0x01]),
                    battery_raw: default_battery_raw(),
                },
                NodeConfig {
                    name: "right".to_string(),
                    address: PeerAddress::new([0x24, 0x6F, 0x28, 0x00, 0x00, 0x02]),
                    battery_raw: default_battery_raw(),
                },
            ],
        }
    }
}

impl HostConfig {
    /// Load from `path`, or the defaults when no path is given
    pub fn load(path: Option<&Path>) -> Result<Self, HostError> {
        let config = match path {
            Some(path) => {
                let text = std::fs::read_to_string(path)?;
                serde_json::from_str(&text)?
            }
            None => HostConfig::default(),
        };
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), HostError> {
        if self.nodes.is_empty() {
            return Err(HostError::Config("at least one node is required".into()));
        }
        if self.radio_loss_percent > 100 {
            return Err(HostError::Config(format!(
                "radio_loss_percent must be 0..=100, got {}",
                self.radio_loss_percent
            )));
        }
        let mut addresses = BTreeSet::new();
        let mut names = BTreeSet::new();
        for node in &self.nodes {
            if node.address.is_broadcast() {
                return Err(HostError::Config(format!("{}: broadcast address", node.name)));
            }
            if !addresses.insert(node.address) {
                return Err(HostError::Config(format!("duplicate address {}", node.address)));
            }
            if !names.insert(node.name.as_str()) {
                return Err(HostError::Config(format!("duplicate node name {}", node.name)));
            }
        }
        if self.companion_port as usize + self.nodes.len() > u16::MAX as usize {
            return Err(HostError::Config("companion port range overflows".into()));
        }
        Ok(())
    }

    /// Store file of `node`
    pub fn store_path(&self, node: &NodeConfig) -> PathBuf {
        self.store_dir.join(format!("{}.json", node.name))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config_is_valid() {
        let config = HostConfig::load(None).unwrap();
        assert_eq!(config.nodes.len(), 2);
        assert_eq!(config.companion_port, 7878);
    }

    #[test]
    fn test_partial_file_uses_defaults() {
        let path = std::env::temp_dir().join(format!("cornhole-config-{}.json", std::process::id()));
        std::fs::write(&path, r#"{ "radio_loss_percent": 20, "log_level": "debug" }"#).unwrap();
        let config = HostConfig::load(Some(&path)).unwrap();
        std::fs::remove_file(&path).unwrap();

        assert_eq!(config.radio_loss_percent, 20);
        assert_eq!(config.log_level, "debug");
        assert_eq!(config.nodes, HostConfig::default().nodes);
    }

    #[test]
    fn test_duplicate_addresses_rejected() {
        let mut config = HostConfig::default();
        config.nodes[1].address = config.nodes[0].address;
        assert!(matches!(config.validate(), Err(HostError::Config(_))));
    }

    #[test]
    fn test_loss_out_of_range_rejected() {
        let config = HostConfig {
            radio_loss_percent: 101,
            ..HostConfig::default()
        };
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_missing_file_is_io_error() {
        let err = HostConfig::load(Some(Path::new("/nonexistent/cornhole.json"))).unwrap_err();
        assert!(matches!(err, HostError::Io(_)));
    }
}
