// Copyright (c) Microsoft Corporation.
// Licensed under the MIT License.

//! Builder for [`Stockpile`] instances.

use std::marker::PhantomData;

use anyspawn::Spawner;
#[cfg(any(feature = "metrics", test))]
use opentelemetry::metrics::Meter;
use serde::{Serialize, de::DeserializeOwned};
#[cfg(feature = "memory")]
use stockpile_memory::{InMemoryLocalStore, InMemoryRemoteStore};
use stockpile_tier::{CacheEntry, LocalStore, RemoteStore};
use tick::Clock;

use crate::{Stockpile, telemetry::CacheTelemetry};

const DEFAULT_NAME: &str = "stockpile";

/// Builder for a [`Stockpile`].
///
/// Created by [`Stockpile::builder`]. Both stores must be provided before the cache can be
/// built; whether a tier is consulted is decided per call by
/// [`ResolveOptions`](crate::ResolveOptions).
///
/// Resolutions run as tasks on a [`Spawner`], Tokio's by default, so the cache must be used
/// from within a runtime that spawner can reach.
///
/// # Examples
///
/// ```
/// use stockpile::Stockpile;
/// use stockpile_memory::{InMemoryLocalStore, InMemoryRemoteStore};
/// use tick::Clock;
///
/// let cache = Stockpile::builder::<String>(Clock::new_frozen())
///     .name("inventory")
///     .local(InMemoryLocalStore::with_capacity(1_000))
///     .remote(InMemoryRemoteStore::new())
///     .logs(false)
///     .build();
///
/// assert_eq!(cache.name(), "inventory");
/// ```
#[derive(Debug)]
pub struct StockpileBuilder<T, L = (), R = ()> {
    clock: Clock,
    spawner: Option<Spawner>,
    local: L,
    remote: R,
    name: Option<String>,
    logs: bool,
    #[cfg(any(feature = "metrics", test))]
    meter: Option<Meter>,
    _phantom: PhantomData<fn() -> T>,
}

impl<T> StockpileBuilder<T> {
    pub(crate) fn new(clock: Clock) -> Self {
        Self {
            clock,
            spawner: None,
            local: (),
            remote: (),
            name: None,
            logs: true,
            #[cfg(any(feature = "metrics", test))]
            meter: None,
            _phantom: PhantomData,
        }
    }
}

impl<T, L, R> StockpileBuilder<T, L, R> {
    /// Sets the local store.
    pub fn local<S: LocalStore>(self, store: S) -> StockpileBuilder<T, S, R> {
        StockpileBuilder {
            clock: self.clock,
            spawner: self.spawner,
            local: store,
            remote: self.remote,
            name: self.name,
            logs: self.logs,
            #[cfg(any(feature = "metrics", test))]
            meter: self.meter,
            _phantom: PhantomData,
        }
    }

    /// Sets the remote store.
    pub fn remote<S: RemoteStore<CacheEntry<T>>>(self, store: S) -> StockpileBuilder<T, L, S> {
        StockpileBuilder {
            clock: self.clock,
            spawner: self.spawner,
            local: self.local,
            remote: store,
            name: self.name,
            logs: self.logs,
            #[cfg(any(feature = "metrics", test))]
            meter: self.meter,
            _phantom: PhantomData,
        }
    }

    /// Uses unbounded in-memory stores for both tiers.
    ///
    /// Handy for tests and for process-local caching. Values do not survive restarts.
    #[cfg(feature = "memory")]
    #[must_use]
    pub fn memory(self) -> StockpileBuilder<T, InMemoryLocalStore, InMemoryRemoteStore<CacheEntry<T>>>
    where
        T: Clone + Send + Sync + 'static,
    {
        self.local(InMemoryLocalStore::new()).remote(InMemoryRemoteStore::new())
    }

    /// Sets the spawner resolutions run on. Defaults to [`Spawner::new_tokio`].
    #[must_use]
    pub fn spawner(mut self, spawner: Spawner) -> Self {
        self.spawner = Some(spawner);
        self
    }

    /// Sets the name reported with every telemetry event. Defaults to `stockpile`.
    #[must_use]
    pub fn name(mut self, name: impl Into<String>) -> Self {
        self.name = Some(name.into());
        self
    }

    /// Enables or disables `tracing` events. Enabled by default.
    #[must_use]
    pub fn logs(mut self, enabled: bool) -> Self {
        self.logs = enabled;
        self
    }

    /// Counts cache events with a `cache.event.count` counter created from `meter`.
    #[cfg(any(feature = "metrics", test))]
    #[cfg_attr(docsrs, doc(cfg(feature = "metrics")))]
    #[must_use]
    pub fn meter(mut self, meter: &Meter) -> Self {
        self.meter = Some(meter.clone());
        self
    }
}

impl<T, L, R> StockpileBuilder<T, L, R>
where
    T: Clone + Serialize + DeserializeOwned + Send + Sync + 'static,
    L: LocalStore + 'static,
    R: RemoteStore<CacheEntry<T>> + 'static,
{
    /// Builds the cache.
    #[must_use]
    pub fn build(self) -> Stockpile<T, L, R> {
        let telemetry = CacheTelemetry::new(self.name.as_deref().unwrap_or(DEFAULT_NAME), self.logs);
        #[cfg(any(feature = "metrics", test))]
        let telemetry = match &self.meter {
            Some(meter) => telemetry.with_meter(meter),
            None => telemetry,
        };

        let spawner = self.spawner.unwrap_or_else(Spawner::new_tokio);
        Stockpile::from_parts(self.local, self.remote, self.clock, spawner, telemetry)
    }
}
