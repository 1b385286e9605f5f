//! Device registry: flattened device records with stable numeric ids

use serde::Serialize;
use std::collections::HashMap;
use std::sync::Arc;
use thiserror::Error;
use tokio_util::sync::CancellationToken;
use tracing::info;

use crate::adapter::{AdapterDescriptor, DescriptorError, DeviceType};
use crate::lifecycle::{AdapterLifecycle, AdapterState, NoRegisteredDevices, RegisteredDevices};
use crate::token_index::{Indexable, TokenIndex, TokenIndexOptions};

/// Maximum number of results returned by [`DeviceRegistry::search`]
pub const MAX_SEARCH_RESULTS: usize = 10;

/// Record fields scored by the search index
pub const SEARCH_FIELDS: [&str; 4] = ["manufacturer", "name", "type", "tokens"];

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum RegistryError {
    #[error("Invalid argument: {0}")]
    InvalidArgument(String),
    #[error("Device not found: {0}")]
    NotFound(usize),
    #[error("Duplicate adapter name: {0}")]
    DuplicateAdapter(String),
    #[error("Invalid adapter descriptor: {0}")]
    InvalidDescriptor(#[from] DescriptorError),
}

/// One device as exposed to the hub
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct DeviceRecord {
    /// Position in the flattened device list
    pub id: usize,
    pub adapter_name: String,
    pub device_type: DeviceType,
    pub display_name: String,
    pub driver_version: String,
    pub manufacturer: String,
    /// Search tokens joined by a single space
    pub search_text: String,
}

impl Indexable for DeviceRecord {
    fn field(&self, name: &str) -> Option<&str> {
        match name {
            "manufacturer" => Some(&self.manufacturer),
            "name" => Some(&self.display_name),
            "type" => Some(self.device_type.search_tag()),
            "tokens" => Some(&self.search_text),
            _ => None,
        }
    }
}

/// A scored search result
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SearchResult {
    pub item: DeviceRecord,
    pub score: f64,
}

/// Registry of all devices across all adapters
///
/// Built once at startup; the record set never changes afterwards.
pub struct DeviceRegistry {
    adapters: Vec<Arc<AdapterDescriptor>>,
    by_name: HashMap<String, usize>,
    records: Vec<DeviceRecord>,
    index: TokenIndex,
    lifecycle: AdapterLifecycle,
}

impl DeviceRegistry {
    /// Build a registry whose initializers receive no registered device ids
    pub fn build<I>(adapters: I) -> Result<Self, RegistryError>
    where
        I: IntoIterator<Item = AdapterDescriptor>,
    {
        Self::build_with(adapters, Arc::new(NoRegisteredDevices))
    }

    /// Build a registry, fetching registered device ids from `registered`
    /// before each adapter initializer runs
    pub fn build_with<I>(
        adapters: I,
        registered: Arc<dyn RegisteredDevices>,
    ) -> Result<Self, RegistryError>
    where
        I: IntoIterator<Item = AdapterDescriptor>,
    {
        let mut descriptors = Vec::new();
        let mut by_name = HashMap::new();
        let mut records = Vec::new();

        for adapter in adapters {
            adapter.validate()?;
            if by_name.contains_key(&adapter.name) {
                return Err(RegistryError::DuplicateAdapter(adapter.name));
            }

            for device in &adapter.devices {
                records.push(DeviceRecord {
                    id: records.len(),
                    adapter_name: adapter.name.clone(),
                    device_type: adapter.device_type,
                    display_name: device.name.clone(),
                    driver_version: adapter.driver_version.clone(),
                    manufacturer: adapter.manufacturer.clone(),
                    search_text: device.tokens.join(" "),
                });
            }

            by_name.insert(adapter.name.clone(), descriptors.len());
            descriptors.push(Arc::new(adapter));
        }

        let index = TokenIndex::new(&records, &SEARCH_FIELDS, TokenIndexOptions::default());
        let lifecycle = AdapterLifecycle::new(
            descriptors.iter().map(|a| a.name.clone()),
            registered,
        );

        info!(
            adapters = descriptors.len(),
            devices = records.len(),
            "Device registry built"
        );

        Ok(Self {
            adapters: descriptors,
            by_name,
            records,
            index,
            lifecycle,
        })
    }

    /// Total number of devices
    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    /// All devices in id order
    pub fn devices(&self) -> impl Iterator<Item = &DeviceRecord> {
        self.records.iter()
    }

    /// All adapters in the order they were supplied
    pub fn adapters(&self) -> impl Iterator<Item = &Arc<AdapterDescriptor>> {
        self.adapters.iter()
    }

    /// Devices belonging to one adapter, in id order
    pub fn devices_for_adapter<'a>(
        &'a self,
        name: &'a str,
    ) -> impl Iterator<Item = &'a DeviceRecord> + 'a {
        self.records.iter().filter(move |r| r.adapter_name == name)
    }

    /// Look up a device by id
    pub fn get_device(&self, id: usize) -> Result<&DeviceRecord, RegistryError> {
        self.records.get(id).ok_or(RegistryError::NotFound(id))
    }

    /// Initialization state of an adapter
    pub fn adapter_state(&self, name: &str) -> AdapterState {
        self.lifecycle.state(name)
    }

    /// Look up an adapter, initializing it on first access
    pub async fn get_adapter(&self, name: &str) -> Result<Arc<AdapterDescriptor>, RegistryError> {
        self.get_adapter_with_cancel(name, &CancellationToken::new())
            .await
    }

    /// Like [`get_adapter`](Self::get_adapter), abandoning initialization on `cancel`
    ///
    /// The adapter is returned even when initialization fails; it is retried
    /// on the next access.
    pub async fn get_adapter_with_cancel(
        &self,
        name: &str,
        cancel: &CancellationToken,
    ) -> Result<Arc<AdapterDescriptor>, RegistryError> {
        if name.is_empty() {
            return Err(RegistryError::InvalidArgument(
                "adapter name is empty".to_string(),
            ));
        }
        let adapter = self
            .by_name
            .get(name)
            .map(|&i| self.adapters[i].clone())
            .ok_or_else(|| RegistryError::InvalidArgument(format!("unknown adapter: {}", name)))?;

        self.lifecycle.ensure_initialized(&adapter, cancel).await;
        Ok(adapter)
    }

    /// Fuzzy search over manufacturer, name, type and tokens
    pub fn search(&self, query: Option<&str>) -> Vec<SearchResult> {
        let Some(query) = query.filter(|q| !q.trim().is_empty()) else {
            return Vec::new();
        };

        self.index
            .search(query, MAX_SEARCH_RESULTS)
            .into_iter()
            .map(|hit| SearchResult {
                item: self.records[hit.index].clone(),
                score: hit.score,
            })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::adapter::DeviceEntry;
    use std::sync::atomic::{AtomicUsize, Ordering};

    fn sample_adapters() -> Vec<AdapterDescriptor> {
        vec![
            AdapterDescriptor::new("A", DeviceType::Light)
                .manufacturer("Acme")
                .driver_version("1.0")
                .device(DeviceEntry::new("Lamp").with_tokens(["light", "lamp"])),
            AdapterDescriptor::new("B", DeviceType::Accessory)
                .manufacturer("Breeze")
                .driver_version("2.1")
                .device(DeviceEntry::new("Fan")),
        ]
    }

    #[test]
    fn test_ids_follow_supply_order() {
        let registry = DeviceRegistry::build(sample_adapters()).unwrap();
        assert_eq!(registry.len(), 2);
        assert_eq!(registry.get_device(0).unwrap().display_name, "Lamp");
        assert_eq!(registry.get_device(1).unwrap().display_name, "Fan");
        assert_eq!(registry.get_device(0).unwrap().search_text, "light lamp");
        assert_eq!(registry.get_device(1).unwrap().adapter_name, "B");
    }

    #[test]
    fn test_ids_stable_across_builds() {
        let first = DeviceRegistry::build(sample_adapters()).unwrap();
        let second = DeviceRegistry::build(sample_adapters()).unwrap();
        let a: Vec<_> = first.devices().map(|d| (d.id, d.display_name.clone())).collect();
        let b: Vec<_> = second.devices().map(|d| (d.id, d.display_name.clone())).collect();
        assert_eq!(a, b);
    }

    #[test]
    fn test_get_device_range() {
        let registry = DeviceRegistry::build(sample_adapters()).unwrap();
        assert!(registry.get_device(1).is_ok());
        assert_eq!(registry.get_device(2), Err(RegistryError::NotFound(2)));
        assert_eq!(
            registry.get_device(usize::MAX),
            Err(RegistryError::NotFound(usize::MAX))
        );
    }

    #[test]
    fn test_duplicate_adapter_rejected() {
        let mut adapters = sample_adapters();
        adapters.push(AdapterDescriptor::new("A", DeviceType::Tv));
        match DeviceRegistry::build(adapters) {
            Err(RegistryError::DuplicateAdapter(name)) => assert_eq!(name, "A"),
            other => panic!("expected duplicate error, got {:?}", other.err()),
        }
    }

    #[test]
    fn test_invalid_descriptor_rejected() {
        let adapters = vec![AdapterDescriptor::new("", DeviceType::Tv)];
        assert!(matches!(
            DeviceRegistry::build(adapters),
            Err(RegistryError::InvalidDescriptor(DescriptorError::EmptyName))
        ));
    }

    #[test]
    fn test_search_empty_query() {
        let registry = DeviceRegistry::build(sample_adapters()).unwrap();
        assert!(registry.search(None).is_empty());
        assert!(registry.search(Some("")).is_empty());
    }

    #[test]
    fn test_search_fuzzy_and_exact() {
        let registry = DeviceRegistry::build(sample_adapters()).unwrap();

        let lite = registry.search(Some("lite"));
        assert_eq!(lite.len(), 1);
        assert_eq!(lite[0].item.id, 0);

        let fan = registry.search(Some("Fan"));
        assert_eq!(fan[0].item.id, 1);
        assert_eq!(fan[0].score, 1.0);

        let breeze = registry.search(Some("Breeze"));
        assert_eq!(breeze[0].item.id, 1);

        assert!(registry.search(Some("qwxz")).is_empty());
    }

    #[test]
    fn test_search_result_cap() {
        let mut adapter = AdapterDescriptor::new("bulbs", DeviceType::Light).manufacturer("Acme");
        for i in 0..25 {
            adapter = adapter.device(DeviceEntry::new(format!("Bulb {}", i)));
        }
        let registry = DeviceRegistry::build(vec![adapter]).unwrap();

        let results = registry.search(Some("acme"));
        assert_eq!(results.len(), MAX_SEARCH_RESULTS);
        let ids: Vec<usize> = results.iter().map(|r| r.item.id).collect();
        assert_eq!(ids, (0..MAX_SEARCH_RESULTS).collect::<Vec<_>>());
    }

    #[tokio::test]
    async fn test_get_adapter_arguments() {
        let registry = DeviceRegistry::build(sample_adapters()).unwrap();
        assert!(matches!(
            registry.get_adapter("").await,
            Err(RegistryError::InvalidArgument(_))
        ));
        assert!(matches!(
            registry.get_adapter("missing").await,
            Err(RegistryError::InvalidArgument(_))
        ));
        assert_eq!(registry.get_adapter("B").await.unwrap().name, "B");
        assert_eq!(registry.adapter_state("B"), AdapterState::Initialized);
    }

    #[tokio::test]
    async fn test_get_adapter_initializes_once() {
        let calls = Arc::new(AtomicUsize::new(0));
        let counter = calls.clone();
        let adapter = AdapterDescriptor::new("A", DeviceType::Light)
            .device(DeviceEntry::new("Lamp"))
            .on_initialize(move |_ids| {
                counter.fetch_add(1, Ordering::SeqCst);
                async { Ok::<(), anyhow::Error>(()) }
            });
        let registry = DeviceRegistry::build(vec![adapter]).unwrap();

        registry.get_adapter("A").await.unwrap();
        registry.get_adapter("A").await.unwrap();
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_get_adapter_survives_failed_init() {
        let calls = Arc::new(AtomicUsize::new(0));
        let counter = calls.clone();
        let adapter = AdapterDescriptor::new("A", DeviceType::Light).on_initialize(move |_ids| {
            counter.fetch_add(1, Ordering::SeqCst);
            async { Err::<(), _>(anyhow::anyhow!("hub offline")) }
        });
        let registry = DeviceRegistry::build(vec![adapter]).unwrap();

        assert_eq!(registry.get_adapter("A").await.unwrap().name, "A");
        assert_eq!(registry.adapter_state("A"), AdapterState::Uninitialized);
        registry.get_adapter("A").await.unwrap();
        assert_eq!(calls.load(Ordering::SeqCst), 2);
    }

    #[test]
    fn test_devices_for_adapter() {
        let registry = DeviceRegistry::build(sample_adapters()).unwrap();
        let names: Vec<_> = registry
            .devices_for_adapter("A")
            .map(|d| d.display_name.as_str())
            .collect();
        assert_eq!(names, vec!["Lamp"]);
        assert_eq!(registry.adapters().count(), 2);
    }
}
