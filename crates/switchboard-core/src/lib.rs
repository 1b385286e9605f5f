//! Switchboard Core - Device registry and lookup control plane
//!
//! This crate provides the registry side of the Switchboard hub:
//! - Adapter descriptors supplied by device integrations
//! - Device registry with stable numeric ids across all adapters
//! - Fuzzy token index for free-text device search
//! - Lazy, retryable adapter initialization

pub mod adapter;
pub mod lifecycle;
pub mod registry;
pub mod token_index;

pub use adapter::{
    AdapterDescriptor, DescriptorError, DeviceEntry, DeviceType, Initializer, UnknownDeviceType,
};
pub use lifecycle::{AdapterLifecycle, AdapterState, NoRegisteredDevices, RegisteredDevices};
pub use registry::{DeviceRecord, DeviceRegistry, RegistryError, SearchResult, MAX_SEARCH_RESULTS};
pub use token_index::{Indexable, TokenIndex, TokenIndexOptions};
