// Copyright (c) Microsoft Corporation.
// Licensed under the MIT License.

//! In-memory store implementations using moka.
//!
//! This module provides in-memory local and remote stores backed by the moka crate,
//! which offers high-performance concurrent caching with eviction policies.

use std::time::{Duration, Instant};

use moka::{Expiry, future::Cache};
use stockpile_tier::{LocalStore, RemoteStore, StoreError};

use crate::builder::InMemoryStoreBuilder;

/// An in-memory [`LocalStore`] backed by moka.
///
/// Values live only as long as the process; use a durable implementation when
/// entries and backoff records must survive restarts.
///
/// # Examples
///
/// ```
/// use stockpile_memory::InMemoryLocalStore;
/// use stockpile_tier::LocalStore;
/// # futures::executor::block_on(async {
///
/// let store = InMemoryLocalStore::new();
/// store.set("key", "value".to_string()).await.unwrap();
/// assert_eq!(store.get("key").await.unwrap().as_deref(), Some("value"));
/// # });
/// ```
#[derive(Debug, Clone)]
pub struct InMemoryLocalStore {
    inner: Cache<String, String>,
}

impl Default for InMemoryLocalStore {
    fn default() -> Self {
        Self::new()
    }
}

impl InMemoryLocalStore {
    /// Creates a new unbounded in-memory local store.
    #[must_use]
    pub fn new() -> Self {
        Self::builder().build_local()
    }

    /// Creates a new in-memory local store holding at most `max_capacity` values.
    #[must_use]
    pub fn with_capacity(max_capacity: u64) -> Self {
        Self::builder().max_capacity(max_capacity).build_local()
    }

    /// Creates a new builder for configuring an in-memory store.
    #[must_use]
    pub fn builder() -> InMemoryStoreBuilder {
        InMemoryStoreBuilder::new()
    }

    pub(crate) fn from_builder(builder: &InMemoryStoreBuilder) -> Self {
        let mut moka_builder = Cache::builder();

        if let Some(capacity) = builder.max_capacity {
            moka_builder = moka_builder.max_capacity(capacity);
        }

        if let Some(capacity) = builder.initial_capacity {
            moka_builder = moka_builder.initial_capacity(capacity);
        }

        if let Some(name) = builder.name.as_deref() {
            moka_builder = moka_builder.name(name);
        }

        Self {
            inner: moka_builder.build(),
        }
    }
}

impl LocalStore for InMemoryLocalStore {
    async fn get(&self, key: &str) -> Result<Option<String>, StoreError> {
        Ok(self.inner.get(key).await)
    }

    async fn set(&self, key: &str, value: String) -> Result<(), StoreError> {
        self.inner.insert(key.to_owned(), value).await;
        Ok(())
    }

    async fn remove(&self, key: &str) -> Result<(), StoreError> {
        self.inner.invalidate(key).await;
        Ok(())
    }
}

/// A stored remote value together with the TTL hint it was written with.
#[derive(Debug, Clone)]
struct Slot<V> {
    value: V,
    ttl: Option<Duration>,
}

/// Expires each slot after the TTL hint of its latest write.
struct SlotExpiry;

impl<V> Expiry<String, Slot<V>> for SlotExpiry {
    fn expire_after_create(&self, _key: &String, value: &Slot<V>, _created_at: Instant) -> Option<Duration> {
        value.ttl
    }

    fn expire_after_update(
        &self,
        _key: &String,
        value: &Slot<V>,
        _updated_at: Instant,
        _duration_until_expiry: Option<Duration>,
    ) -> Option<Duration> {
        value.ttl
    }
}

/// An in-memory [`RemoteStore`] backed by moka.
///
/// Unlike the local store, this one honors the per-write TTL hint: a value written
/// with a TTL is evicted once it elapses (measured on the machine's monotonic clock).
///
/// # Examples
///
/// ```
/// use stockpile_memory::InMemoryRemoteStore;
/// use stockpile_tier::RemoteStore;
/// # futures::executor::block_on(async {
///
/// let store = InMemoryRemoteStore::<i32>::new();
/// store.set("key", 42, None).await.unwrap();
/// assert_eq!(store.get("key").await.unwrap(), Some(42));
/// # });
/// ```
pub struct InMemoryRemoteStore<V> {
    inner: Cache<String, Slot<V>>,
}

impl<V> std::fmt::Debug for InMemoryRemoteStore<V> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("InMemoryRemoteStore").finish_non_exhaustive()
    }
}

impl<V> Clone for InMemoryRemoteStore<V> {
    fn clone(&self) -> Self {
        Self { inner: self.inner.clone() }
    }
}

impl<V> Default for InMemoryRemoteStore<V>
where
    V: Clone + Send + Sync + 'static,
{
    fn default() -> Self {
        Self::new()
    }
}

impl<V> InMemoryRemoteStore<V>
where
    V: Clone + Send + Sync + 'static,
{
    /// Creates a new unbounded in-memory remote store.
    #[must_use]
    pub fn new() -> Self {
        InMemoryStoreBuilder::new().build_remote()
    }

    /// Creates a new in-memory remote store holding at most `max_capacity` values.
    #[must_use]
    pub fn with_capacity(max_capacity: u64) -> Self {
        InMemoryStoreBuilder::new().max_capacity(max_capacity).build_remote()
    }

    pub(crate) fn from_builder(builder: &InMemoryStoreBuilder) -> Self {
        let mut moka_builder = Cache::builder().expire_after(SlotExpiry);

        if let Some(capacity) = builder.max_capacity {
            moka_builder = moka_builder.max_capacity(capacity);
        }

        if let Some(capacity) = builder.initial_capacity {
            moka_builder = moka_builder.initial_capacity(capacity);
        }

        if let Some(name) = builder.name.as_deref() {
            moka_builder = moka_builder.name(name);
        }

        Self {
            inner: moka_builder.build(),
        }
    }
}

impl<V> RemoteStore<V> for InMemoryRemoteStore<V>
where
    V: Clone + Send + Sync + 'static,
{
    async fn get(&self, key: &str) -> Result<Option<V>, StoreError> {
        Ok(self.inner.get(key).await.map(|slot| slot.value))
    }

    async fn set(&self, key: &str, value: V, ttl: Option<Duration>) -> Result<(), StoreError> {
        self.inner.insert(key.to_owned(), Slot { value, ttl }).await;
        Ok(())
    }

    async fn delete(&self, key: &str) -> Result<(), StoreError> {
        self.inner.invalidate(key).await;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn block_on<F: std::future::Future>(f: F) -> F::Output {
        futures::executor::block_on(f)
    }

    #[test]
    fn slot_expiry_follows_latest_write() {
        let expiry = SlotExpiry;
        let key = "k".to_string();
        let now = Instant::now();
        let first = Slot {
            value: 1,
            ttl: Some(Duration::from_secs(5)),
        };
        let second = Slot { value: 2, ttl: None };

        assert_eq!(expiry.expire_after_create(&key, &first, now), Some(Duration::from_secs(5)));
        assert_eq!(expiry.expire_after_update(&key, &second, now, Some(Duration::from_secs(5))), None);
    }

    #[test]
    fn remote_set_overwrites_value() {
        block_on(async {
            let store = InMemoryRemoteStore::<&'static str>::new();
            store.set("k", "old", Some(Duration::from_secs(60))).await.expect("set failed");
            store.set("k", "new", None).await.expect("set failed");
            assert_eq!(store.get("k").await.expect("get failed"), Some("new"));
        });
    }
}
