//! Switchboard Hub - Remote hub session management
//!
//! This crate connects the device registry to a remote orchestrating hub:
//! - Hub client contract and a JSON-over-HTTP implementation
//! - Firmware compatibility gate
//! - Bind address resolution from local interfaces
//! - Session owning the single publishing server

pub mod address;
pub mod client;
pub mod session;
pub mod version;

pub use address::{local_ipv4_addresses, resolve_bind_address, select_bind_address};
pub use client::{HttpHubClient, HubClient, SystemInfo, DEFAULT_HUB_PORT};
pub use session::{
    HubSession, ServerHandle, SessionError, StartOptions, SurfaceFactory, DEFAULT_SERVER_PORT,
};
pub use version::{is_supported_firmware, parse_firmware_version, MIN_FIRMWARE};
