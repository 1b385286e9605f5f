//! Lazy, retryable adapter initialization
//!
//! Every adapter starts `Uninitialized`. The first access moves it to
//! `Initializing` while its initializer runs; success makes it `Initialized`
//! for good, while failure or cancellation puts it back to `Uninitialized` so
//! the next access tries again. Failures are logged here and never reach the
//! caller that triggered them.
//!
//! Attempts for one adapter are serialized behind an async mutex. A caller
//! that had to wait for an in-flight attempt takes that attempt's outcome
//! instead of starting another one.

use async_trait::async_trait;
use serde::Serialize;
use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, AtomicU8, Ordering};
use std::sync::Arc;
use thiserror::Error;
use tokio::sync::Mutex;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::adapter::{AdapterDescriptor, Initializer};

/// Initialization state of one adapter
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
#[repr(u8)]
pub enum AdapterState {
    Uninitialized = 0,
    Initializing = 1,
    Initialized = 2,
}

impl AdapterState {
    fn from_u8(value: u8) -> Self {
        match value {
            1 => Self::Initializing,
            2 => Self::Initialized,
            _ => Self::Uninitialized,
        }
    }
}

/// Why an initialization attempt did not complete
#[derive(Error, Debug)]
pub enum InitError {
    #[error("failed to fetch registered devices: {0}")]
    RegisteredDevices(anyhow::Error),
    #[error("initializer failed: {0}")]
    Callback(anyhow::Error),
    #[error("initialization cancelled")]
    Cancelled,
}

/// Source of the device ids the hub already associates with an adapter
#[async_trait]
pub trait RegisteredDevices: Send + Sync {
    async fn registered_device_ids(&self, adapter: &str) -> anyhow::Result<Vec<String>>;
}

/// Reports no previously registered devices
#[derive(Debug, Clone, Copy, Default)]
pub struct NoRegisteredDevices;

#[async_trait]
impl RegisteredDevices for NoRegisteredDevices {
    async fn registered_device_ids(&self, _adapter: &str) -> anyhow::Result<Vec<String>> {
        Ok(Vec::new())
    }
}

#[derive(Default)]
struct Slot {
    state: AtomicU8,
    /// Bumped once per finished attempt
    attempts: AtomicU64,
    gate: Mutex<()>,
}

impl Slot {
    fn state(&self) -> AdapterState {
        AdapterState::from_u8(self.state.load(Ordering::Acquire))
    }

    fn set(&self, state: AdapterState) {
        self.state.store(state as u8, Ordering::Release);
    }
}

/// Puts the slot back to `Uninitialized` unless the attempt committed
struct Rollback<'a> {
    slot: &'a Slot,
    committed: bool,
}

impl Rollback<'_> {
    fn commit(mut self) {
        self.committed = true;
        self.slot.set(AdapterState::Initialized);
    }
}

impl Drop for Rollback<'_> {
    fn drop(&mut self) {
        if !self.committed {
            self.slot.set(AdapterState::Uninitialized);
        }
        self.slot.attempts.fetch_add(1, Ordering::AcqRel);
    }
}

/// Tracks per-adapter initialization for a fixed set of adapter names
pub struct AdapterLifecycle {
    slots: HashMap<String, Slot>,
    registered: Arc<dyn RegisteredDevices>,
}

impl AdapterLifecycle {
    /// Create slots for `names`, all `Uninitialized`
    pub fn new<I, S>(names: I, registered: Arc<dyn RegisteredDevices>) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            slots: names
                .into_iter()
                .map(|n| (n.into(), Slot::default()))
                .collect(),
            registered,
        }
    }

    /// Current state; unknown names read as `Uninitialized`
    pub fn state(&self, name: &str) -> AdapterState {
        self.slots
            .get(name)
            .map(Slot::state)
            .unwrap_or(AdapterState::Uninitialized)
    }

    /// Run the adapter's initializer unless it already succeeded
    ///
    /// Returns the state after this call. Errors are logged and absorbed.
    pub async fn ensure_initialized(
        &self,
        adapter: &AdapterDescriptor,
        cancel: &CancellationToken,
    ) -> AdapterState {
        let Some(slot) = self.slots.get(&adapter.name) else {
            warn!(adapter = %adapter.name, "No lifecycle slot for adapter");
            return AdapterState::Uninitialized;
        };

        if slot.state() == AdapterState::Initialized {
            return AdapterState::Initialized;
        }

        let seen = slot.attempts.load(Ordering::Acquire);
        let _gate = tokio::select! {
            biased;
            _ = cancel.cancelled() => {
                debug!(adapter = %adapter.name, "Cancelled while waiting for in-flight initialization");
                return slot.state();
            }
            gate = slot.gate.lock() => gate,
        };

        // An attempt finished while we waited: share its outcome
        if slot.attempts.load(Ordering::Acquire) != seen
            || slot.state() == AdapterState::Initialized
        {
            return slot.state();
        }

        let Some(initializer) = &adapter.initializer else {
            slot.set(AdapterState::Initialized);
            debug!(adapter = %adapter.name, "Adapter has no initializer");
            return AdapterState::Initialized;
        };

        slot.set(AdapterState::Initializing);
        let attempt = Rollback {
            slot,
            committed: false,
        };

        match self.initialize(&adapter.name, initializer, cancel).await {
            Ok(()) => {
                attempt.commit();
                info!(adapter = %adapter.name, "Adapter initialized");
                AdapterState::Initialized
            }
            Err(e) => {
                drop(attempt);
                warn!(
                    adapter = %adapter.name,
                    error = %e,
                    "Adapter initialization failed, will retry on next access"
                );
                AdapterState::Uninitialized
            }
        }
    }

    async fn initialize(
        &self,
        name: &str,
        initializer: &Initializer,
        cancel: &CancellationToken,
    ) -> Result<(), InitError> {
        let work = async {
            let ids = self
                .registered
                .registered_device_ids(name)
                .await
                .map_err(InitError::RegisteredDevices)?;
            debug!(adapter = %name, registered = ids.len(), "Running adapter initializer");
            initializer.call(ids).await.map_err(InitError::Callback)
        };

        tokio::select! {
            biased;
            _ = cancel.cancelled() => Err(InitError::Cancelled),
            result = work => result,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::adapter::DeviceType;
    use std::sync::atomic::AtomicUsize;
    use std::time::Duration;

    fn counting_adapter(calls: Arc<AtomicUsize>, fail_first: bool) -> AdapterDescriptor {
        AdapterDescriptor::new("lights", DeviceType::Light).on_initialize(move |_ids| {
            let calls = calls.clone();
            async move {
                let n = calls.fetch_add(1, Ordering::SeqCst);
                tokio::time::sleep(Duration::from_millis(20)).await;
                if fail_first && n == 0 {
                    anyhow::bail!("hub unreachable");
                }
                Ok(())
            }
        })
    }

    fn lifecycle() -> AdapterLifecycle {
        AdapterLifecycle::new(["lights"], Arc::new(NoRegisteredDevices))
    }

    #[tokio::test]
    async fn test_initializes_once() {
        let calls = Arc::new(AtomicUsize::new(0));
        let adapter = counting_adapter(calls.clone(), false);
        let lifecycle = lifecycle();
        let cancel = CancellationToken::new();

        assert_eq!(lifecycle.state("lights"), AdapterState::Uninitialized);
        assert_eq!(
            lifecycle.ensure_initialized(&adapter, &cancel).await,
            AdapterState::Initialized
        );
        assert_eq!(
            lifecycle.ensure_initialized(&adapter, &cancel).await,
            AdapterState::Initialized
        );
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_failure_rolls_back_and_retries() {
        let calls = Arc::new(AtomicUsize::new(0));
        let adapter = counting_adapter(calls.clone(), true);
        let lifecycle = lifecycle();
        let cancel = CancellationToken::new();

        assert_eq!(
            lifecycle.ensure_initialized(&adapter, &cancel).await,
            AdapterState::Uninitialized
        );
        assert_eq!(lifecycle.state("lights"), AdapterState::Uninitialized);

        assert_eq!(
            lifecycle.ensure_initialized(&adapter, &cancel).await,
            AdapterState::Initialized
        );
        assert_eq!(calls.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn test_concurrent_first_access_runs_once() {
        let calls = Arc::new(AtomicUsize::new(0));
        let adapter = Arc::new(counting_adapter(calls.clone(), false));
        let lifecycle = Arc::new(lifecycle());

        let mut tasks = tokio::task::JoinSet::new();
        for _ in 0..8 {
            let adapter = adapter.clone();
            let lifecycle = lifecycle.clone();
            tasks.spawn(async move {
                lifecycle
                    .ensure_initialized(&adapter, &CancellationToken::new())
                    .await
            });
        }
        while let Some(result) = tasks.join_next().await {
            assert_eq!(result.unwrap(), AdapterState::Initialized);
        }
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_waiters_share_failed_attempt() {
        let calls = Arc::new(AtomicUsize::new(0));
        let adapter = Arc::new(counting_adapter(calls.clone(), true));
        let lifecycle = Arc::new(lifecycle());

        let mut tasks = tokio::task::JoinSet::new();
        for _ in 0..4 {
            let adapter = adapter.clone();
            let lifecycle = lifecycle.clone();
            tasks.spawn(async move {
                lifecycle
                    .ensure_initialized(&adapter, &CancellationToken::new())
                    .await
            });
        }
        while let Some(result) = tasks.join_next().await {
            assert_eq!(result.unwrap(), AdapterState::Uninitialized);
        }
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_cancellation_rolls_back() {
        let adapter = AdapterDescriptor::new("lights", DeviceType::Light)
            .on_initialize(|_ids| std::future::pending::<anyhow::Result<()>>());
        let lifecycle = lifecycle();
        let cancel = CancellationToken::new();
        cancel.cancel();

        assert_eq!(
            lifecycle.ensure_initialized(&adapter, &cancel).await,
            AdapterState::Uninitialized
        );
        assert_eq!(lifecycle.state("lights"), AdapterState::Uninitialized);
    }

    #[tokio::test]
    async fn test_cancelled_waiter_does_not_block() {
        let adapter = Arc::new(
            AdapterDescriptor::new("lights", DeviceType::Light)
                .on_initialize(|_ids| std::future::pending::<anyhow::Result<()>>()),
        );
        let lifecycle = Arc::new(lifecycle());

        let holder = {
            let adapter = adapter.clone();
            let lifecycle = lifecycle.clone();
            tokio::spawn(async move {
                lifecycle
                    .ensure_initialized(&adapter, &CancellationToken::new())
                    .await
            })
        };
        while lifecycle.state("lights") != AdapterState::Initializing {
            tokio::task::yield_now().await;
        }

        let cancel = CancellationToken::new();
        cancel.cancel();
        let waited = tokio::time::timeout(
            Duration::from_millis(300),
            lifecycle.ensure_initialized(&adapter, &cancel),
        )
        .await;
        assert_eq!(waited.unwrap(), AdapterState::Initializing);

        holder.abort();
        let _ = holder.await;
        assert_eq!(lifecycle.state("lights"), AdapterState::Uninitialized);
    }

    #[tokio::test]
    async fn test_dropped_caller_rolls_back() {
        let adapter = AdapterDescriptor::new("lights", DeviceType::Light)
            .on_initialize(|_ids| std::future::pending::<anyhow::Result<()>>());
        let lifecycle = lifecycle();
        let cancel = CancellationToken::new();

        let timed_out = tokio::time::timeout(
            Duration::from_millis(20),
            lifecycle.ensure_initialized(&adapter, &cancel),
        )
        .await;
        assert!(timed_out.is_err());
        assert_eq!(lifecycle.state("lights"), AdapterState::Uninitialized);
    }

    #[tokio::test]
    async fn test_no_initializer() {
        let adapter = AdapterDescriptor::new("lights", DeviceType::Light);
        let lifecycle = lifecycle();
        assert_eq!(
            lifecycle
                .ensure_initialized(&adapter, &CancellationToken::new())
                .await,
            AdapterState::Initialized
        );
    }

    struct FixedIds(Vec<String>);

    #[async_trait]
    impl RegisteredDevices for FixedIds {
        async fn registered_device_ids(&self, _adapter: &str) -> anyhow::Result<Vec<String>> {
            Ok(self.0.clone())
        }
    }

    #[tokio::test]
    async fn test_initializer_gets_registered_ids() {
        let seen = Arc::new(std::sync::Mutex::new(Vec::new()));
        let sink = seen.clone();
        let adapter = AdapterDescriptor::new("lights", DeviceType::Light).on_initialize(
            move |ids| {
                let sink = sink.clone();
                async move {
                    sink.lock().unwrap().extend(ids);
                    Ok::<(), anyhow::Error>(())
                }
            },
        );
        let lifecycle = AdapterLifecycle::new(
            ["lights"],
            Arc::new(FixedIds(vec!["0".to_string(), "3".to_string()])),
        );

        lifecycle
            .ensure_initialized(&adapter, &CancellationToken::new())
            .await;
        assert_eq!(*seen.lock().unwrap(), vec!["0".to_string(), "3".to_string()]);
    }
}
