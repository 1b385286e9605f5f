//! Adapter descriptors supplied by integrations at startup

use futures_util::future::BoxFuture;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::future::Future;
use std::str::FromStr;
use std::sync::Arc;
use thiserror::Error;

/// Device category reported to the hub
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum DeviceType {
    Accessory,
    AvReceiver,
    Dvb,
    Dvd,
    GameConsole,
    HdmiSwitch,
    Light,
    MediaPlayer,
    MusicPlayer,
    Projector,
    Soundbar,
    Tv,
    Tuner,
    Vod,
}

impl DeviceType {
    pub const ALL: [DeviceType; 14] = [
        Self::Accessory,
        Self::AvReceiver,
        Self::Dvb,
        Self::Dvd,
        Self::GameConsole,
        Self::HdmiSwitch,
        Self::Light,
        Self::MediaPlayer,
        Self::MusicPlayer,
        Self::Projector,
        Self::Soundbar,
        Self::Tv,
        Self::Tuner,
        Self::Vod,
    ];

    /// Wire tag, as serialized
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Accessory => "ACCESSORY",
            Self::AvReceiver => "AV_RECEIVER",
            Self::Dvb => "DVB",
            Self::Dvd => "DVD",
            Self::GameConsole => "GAME_CONSOLE",
            Self::HdmiSwitch => "HDMI_SWITCH",
            Self::Light => "LIGHT",
            Self::MediaPlayer => "MEDIA_PLAYER",
            Self::MusicPlayer => "MUSIC_PLAYER",
            Self::Projector => "PROJECTOR",
            Self::Soundbar => "SOUNDBAR",
            Self::Tv => "TV",
            Self::Tuner => "TUNER",
            Self::Vod => "VOD",
        }
    }

    /// Human-typed rendering used by the token index
    pub fn search_tag(&self) -> &'static str {
        match self {
            Self::Accessory => "accessory",
            Self::AvReceiver => "av receiver",
            Self::Dvb => "dvb",
            Self::Dvd => "dvd",
            Self::GameConsole => "game console",
            Self::HdmiSwitch => "hdmi switch",
            Self::Light => "light",
            Self::MediaPlayer => "media player",
            Self::MusicPlayer => "music player",
            Self::Projector => "projector",
            Self::Soundbar => "soundbar",
            Self::Tv => "tv",
            Self::Tuner => "tuner",
            Self::Vod => "vod",
        }
    }
}

impl fmt::Display for DeviceType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("Unknown device type: {0}")]
pub struct UnknownDeviceType(pub String);

impl FromStr for DeviceType {
    type Err = UnknownDeviceType;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let normalized = s.trim().replace(['-', ' '], "_");
        Self::ALL
            .into_iter()
            .find(|t| t.as_str().eq_ignore_ascii_case(&normalized))
            .ok_or_else(|| UnknownDeviceType(s.to_string()))
    }
}

/// Why a descriptor cannot be registered
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum DescriptorError {
    #[error("adapter name is empty")]
    EmptyName,
    #[error("adapter '{adapter}' device #{index} has an empty name")]
    EmptyDeviceName { adapter: String, index: usize },
}

/// One device offered by an adapter
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeviceEntry {
    /// Display name shown to the user
    pub name: String,
    /// Extra free-text search terms
    #[serde(default)]
    pub tokens: Vec<String>,
}

impl DeviceEntry {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            tokens: Vec::new(),
        }
    }

    pub fn with_tokens<I, S>(mut self, tokens: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.tokens = tokens.into_iter().map(Into::into).collect();
        self
    }
}

/// Future returned by an adapter initializer
pub type InitFuture = BoxFuture<'static, anyhow::Result<()>>;

/// One-time setup callback, handed the device ids the hub already has for the adapter
#[derive(Clone)]
pub struct Initializer(Arc<dyn Fn(Vec<String>) -> InitFuture + Send + Sync>);

impl Initializer {
    pub fn new<F, Fut>(f: F) -> Self
    where
        F: Fn(Vec<String>) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = anyhow::Result<()>> + Send + 'static,
    {
        Self(Arc::new(move |ids| Box::pin(f(ids))))
    }

    pub fn call(&self, registered_ids: Vec<String>) -> InitFuture {
        (self.0)(registered_ids)
    }
}

impl fmt::Debug for Initializer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("Initializer(..)")
    }
}

/// A pluggable device adapter as supplied by its integration
#[derive(Debug, Clone)]
pub struct AdapterDescriptor {
    /// Unique adapter name
    pub name: String,
    /// Category of every device in this adapter
    pub device_type: DeviceType,
    /// Driver version string
    pub driver_version: String,
    /// Manufacturer name
    pub manufacturer: String,
    /// Devices in registration order
    pub devices: Vec<DeviceEntry>,
    /// Optional one-time setup callback
    pub initializer: Option<Initializer>,
}

impl AdapterDescriptor {
    pub fn new(name: impl Into<String>, device_type: DeviceType) -> Self {
        Self {
            name: name.into(),
            device_type,
            driver_version: String::new(),
            manufacturer: String::new(),
            devices: Vec::new(),
            initializer: None,
        }
    }

    pub fn manufacturer(mut self, manufacturer: impl Into<String>) -> Self {
        self.manufacturer = manufacturer.into();
        self
    }

    pub fn driver_version(mut self, version: impl Into<String>) -> Self {
        self.driver_version = version.into();
        self
    }

    pub fn device(mut self, device: DeviceEntry) -> Self {
        self.devices.push(device);
        self
    }

    pub fn initializer(mut self, initializer: Initializer) -> Self {
        self.initializer = Some(initializer);
        self
    }

    /// Register an async closure as the initializer
    pub fn on_initialize<F, Fut>(self, f: F) -> Self
    where
        F: Fn(Vec<String>) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = anyhow::Result<()>> + Send + 'static,
    {
        self.initializer(Initializer::new(f))
    }

    /// Reject descriptors that would produce unnamed adapters or devices
    pub fn validate(&self) -> Result<(), DescriptorError> {
        if self.name.trim().is_empty() {
            return Err(DescriptorError::EmptyName);
        }
        if let Some(index) = self.devices.iter().position(|d| d.name.trim().is_empty()) {
            return Err(DescriptorError::EmptyDeviceName {
                adapter: self.name.clone(),
                index,
            });
        }
        Ok(())
    }
}
