//! Configuration loading and conversion to adapter descriptors

use anyhow::Result;
use serde::{Deserialize, Deserializer, Serialize};
use std::net::{IpAddr, Ipv4Addr};
use std::path::Path;
use switchboard_core::{AdapterDescriptor, DeviceEntry, DeviceType};
use switchboard_hub::{DEFAULT_HUB_PORT, DEFAULT_SERVER_PORT};
use tracing::info;

/// Main configuration structure
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub hub: HubConfig,
    #[serde(default)]
    pub server: ServerConfig,
    #[serde(default, rename = "adapter")]
    pub adapters: Vec<AdapterConfig>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HubConfig {
    /// Hub address
    #[serde(default = "default_hub_host")]
    pub host: IpAddr,
    /// Hub API port
    #[serde(default = "default_hub_port")]
    pub port: u16,
}

impl Default for HubConfig {
    fn default() -> Self {
        Self {
            host: default_hub_host(),
            port: default_hub_port(),
        }
    }
}

fn default_hub_host() -> IpAddr {
    IpAddr::V4(Ipv4Addr::LOCALHOST)
}

fn default_hub_port() -> u16 {
    DEFAULT_HUB_PORT
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    /// Name the server registers under at the hub
    #[serde(default = "default_server_name")]
    pub name: String,
    /// Publishing server port
    #[serde(default = "default_server_port")]
    pub port: u16,
    /// Bind address (resolved from local interfaces when absent)
    #[serde(default)]
    pub bind: Option<IpAddr>,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            name: default_server_name(),
            port: default_server_port(),
            bind: None,
        }
    }
}

fn default_server_name() -> String {
    "switchboard".to_string()
}

fn default_server_port() -> u16 {
    DEFAULT_SERVER_PORT
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AdapterConfig {
    /// Unique adapter name
    pub name: String,
    /// Device type tag, e.g. "LIGHT", "light" or "av-receiver"
    #[serde(rename = "type", deserialize_with = "deserialize_device_type")]
    pub device_type: DeviceType,
    #[serde(default)]
    pub manufacturer: String,
    #[serde(default = "default_driver_version")]
    pub driver_version: String,
    /// Log device ids the hub already knows when the adapter first comes up
    #[serde(default)]
    pub restore_registrations: bool,
    #[serde(default, rename = "device")]
    pub devices: Vec<DeviceEntry>,
}

/// Accept any spelling `DeviceType::from_str` does; written back as SCREAMING_SNAKE_CASE
fn deserialize_device_type<'de, D>(deserializer: D) -> Result<DeviceType, D::Error>
where
    D: Deserializer<'de>,
{
    let raw = String::deserialize(deserializer)?;
    raw.parse().map_err(serde::de::Error::custom)
}

fn default_driver_version() -> String {
    "1.0".to_string()
}

impl AdapterConfig {
    /// Convert to an AdapterDescriptor
    pub fn to_descriptor(&self) -> AdapterDescriptor {
        let mut descriptor = AdapterDescriptor::new(&self.name, self.device_type)
            .manufacturer(&self.manufacturer)
            .driver_version(&self.driver_version);
        for device in &self.devices {
            descriptor = descriptor.device(device.clone());
        }

        if self.restore_registrations {
            let name = self.name.clone();
            descriptor = descriptor.on_initialize(move |ids| {
                let name = name.clone();
                async move {
                    info!(adapter = %name, devices = ?ids, "Restored hub registrations");
                    Ok::<(), anyhow::Error>(())
                }
            });
        }

        descriptor
    }
}

impl Config {
    /// Descriptors for every configured adapter, in file order
    pub fn to_descriptors(&self) -> Vec<AdapterDescriptor> {
        self.adapters.iter().map(AdapterConfig::to_descriptor).collect()
    }
}

/// Load configuration from file
pub fn load_config(path: &Path) -> Result<Config> {
    if path.exists() {
        let content = std::fs::read_to_string(path)?;
        let config: Config = toml::from_str(&content)?;
        info!(
            path = %path.display(),
            adapters = config.adapters.len(),
            "Loaded configuration"
        );
        Ok(config)
    } else {
        info!(
            path = %path.display(),
            "Configuration file not found, using defaults"
        );
        Ok(Config::default())
    }
}

/// Save an example configuration to file
pub fn save_default_config(path: &Path) -> Result<()> {
    let config = Config {
        hub: HubConfig::default(),
        server: ServerConfig::default(),
        adapters: vec![AdapterConfig {
            name: "living-room-lights".to_string(),
            device_type: DeviceType::Light,
            manufacturer: "Acme".to_string(),
            driver_version: default_driver_version(),
            restore_registrations: true,
            devices: vec![
                DeviceEntry::new("Floor Lamp").with_tokens(["light", "lamp"]),
                DeviceEntry::new("Ceiling Spots").with_tokens(["light", "spot"]),
            ],
        }],
    };

    let content = toml::to_string_pretty(&config)?;
    std::fs::write(path, content)?;
    Ok(())
}
