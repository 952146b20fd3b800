use std::path::Path;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::{info, warn};

use crate::device::DeviceAddress;
use crate::poll::{PollSettings, RetryPolicy};

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("cannot read config file: {0}")]
    Io(#[from] std::io::Error),
    #[error("invalid JSON config: {0}")]
    Json(#[from] serde_json::Error),
    #[error("invalid YAML config: {0}")]
    Yaml(#[from] serde_yaml::Error),
}

#[derive(Clone, Serialize, Deserialize, Debug, PartialEq)]
#[serde(rename_all = "PascalCase", default)]
pub struct Config {
    pub mqtt_client_id_prefix: String,
    #[serde(rename = "MqttServerURI")]
    pub mqtt_server_uri: String,
    pub mqtt_username: String,
    pub mqtt_password: String,
    pub mqtt_topic_global_prefix: String,
    /// Host radio adapter, e.g. `hci0`.
    pub adapter_name: String,
    pub bridge_name: String,
    pub retry_count: u32,
    pub retry_delay_ms: u64,
    pub device_addresses: Vec<String>,
    /// Seconds between two sweeps.
    #[serde(rename = "PoolInterval", alias = "PollInterval")]
    pub poll_interval: u64,
    /// Seconds a single device read may take.
    pub read_timeout: u64,
}

impl Default for Config {
    fn default() -> Self {
        Config {
            mqtt_client_id_prefix: "inst1".to_string(),
            mqtt_server_uri: "tcp://localhost:1883".to_string(),
            mqtt_username: String::new(),
            mqtt_password: String::new(),
            mqtt_topic_global_prefix: String::new(),
            adapter_name: "hci0".to_string(),
            bridge_name: "ble".to_string(),
            retry_count: 10,
            retry_delay_ms: 1000,
            device_addresses: Vec::new(),
            poll_interval: 600,
            read_timeout: 15,
        }
    }
}

impl Config {
    pub fn parse_json(config_str: &str) -> Result<Config, ConfigError> {
        Ok(serde_json::from_str(config_str)?)
    }

    pub fn parse_yaml(config_str: &str) -> Result<Config, ConfigError> {
        Ok(serde_yaml::from_str(config_str)?)
    }

    /// Reads the file at `path`; `.yaml`/`.yml` files are YAML, anything else JSON.
    pub async fn read(path: &Path) -> Result<Config, ConfigError> {
        let contents = tokio::fs::read_to_string(path).await?;

        match path.extension().and_then(|e| e.to_str()) {
            Some("yaml") | Some("yml") => Config::parse_yaml(&contents),
            _ => Config::parse_json(&contents),
        }
    }

    pub async fn load_or_default(path: &Path) -> Config {
        match Config::read(path).await {
            Ok(config) => {
                info!("loaded config from {}", path.display());
                config
            }
            Err(e) => {
                warn!("failed to load config from {}: {}. Loading defaults", path.display(), e);
                Config::default()
            }
        }
    }

    pub fn device_addresses(&self) -> Vec<DeviceAddress> {
        self.device_addresses
            .iter()
            .filter_map(|a| match a.parse() {
                Ok(addr) => Some(addr),
                Err(e) => {
                    warn!("ignoring configured device: {}", e);
                    None
                }
            })
            .collect()
    }

    pub fn poll_settings(&self) -> PollSettings {
        PollSettings {
            interval: Duration::from_secs(self.poll_interval),
            stagger: Duration::from_secs(1),
            retry: RetryPolicy::new(self.retry_count, Duration::from_millis(self.retry_delay_ms)),
        }
    }

    #[cfg_attr(not(feature = "ble"), allow(dead_code))]
    pub fn read_timeout(&self) -> Duration {
        Duration::from_secs(self.read_timeout)
    }

    pub fn mqtt_client_id(&self) -> String {
        format!("{}ble_ad", self.mqtt_client_id_prefix)
    }

    pub fn mqtt_host_port(&self) -> (String, u16) {
        let uri = self.mqtt_server_uri.as_str();
        let authority = uri.split_once("://").map(|(_, rest)| rest).unwrap_or(uri);
        let authority = authority.trim_end_matches('/');

        match authority.rsplit_once(':') {
            Some((host, port)) => match port.parse() {
                Ok(port) => (host.to_string(), port),
                Err(_) => (authority.to_string(), 1883),
            },
            None => (authority.to_string(), 1883),
        }
    }
}
