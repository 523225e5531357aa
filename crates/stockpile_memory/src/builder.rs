// Copyright (c) Microsoft Corporation.
// Licensed under the MIT License.

//! Builder for configuring in-memory stores.
//!
//! This module provides a builder API for the in-memory stores that abstracts
//! the underlying moka configuration, providing a stable API surface
//! without exposing moka's types.

use crate::store::{InMemoryLocalStore, InMemoryRemoteStore};

/// Builder for configuring an in-memory store.
///
/// The same settings apply to both store kinds; finish with
/// [`build_local`](Self::build_local) or [`build_remote`](Self::build_remote).
///
/// # Examples
///
/// ```
/// use stockpile_memory::InMemoryStoreBuilder;
///
/// let local = InMemoryStoreBuilder::new()
///     .max_capacity(1000)
///     .initial_capacity(100)
///     .name("device-cache")
///     .build_local();
///
/// let remote = InMemoryStoreBuilder::new()
///     .max_capacity(10_000)
///     .build_remote::<String>();
/// ```
#[derive(Debug, Default, Clone)]
pub struct InMemoryStoreBuilder {
    pub(crate) max_capacity: Option<u64>,
    pub(crate) initial_capacity: Option<usize>,
    pub(crate) name: Option<String>,
}

impl InMemoryStoreBuilder {
    /// Creates a new builder with default settings.
    ///
    /// The default configuration creates an unbounded store.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets the maximum number of stored values.
    ///
    /// Once the capacity is reached, values will be evicted to make room
    /// for new ones using moka's `TinyLFU` policy. Eviction is the store's
    /// concern; the cache above it treats an evicted value as a miss.
    #[must_use]
    pub fn max_capacity(mut self, capacity: u64) -> Self {
        self.max_capacity = Some(capacity);
        self
    }

    /// Sets the initial capacity (pre-allocation hint) for the store.
    #[must_use]
    pub fn initial_capacity(mut self, capacity: usize) -> Self {
        self.initial_capacity = Some(capacity);
        self
    }

    /// Sets a name for the store.
    ///
    /// This name may appear in debugging output from the underlying implementation.
    #[must_use]
    pub fn name(mut self, name: impl Into<String>) -> Self {
        self.name = Some(name.into());
        self
    }

    /// Builds the configured [`InMemoryLocalStore`].
    #[must_use]
    pub fn build_local(self) -> InMemoryLocalStore {
        InMemoryLocalStore::from_builder(&self)
    }

    /// Builds the configured [`InMemoryRemoteStore`].
    #[must_use]
    pub fn build_remote<V>(self) -> InMemoryRemoteStore<V>
    where
        V: Clone + Send + Sync + 'static,
    {
        InMemoryRemoteStore::from_builder(&self)
    }
}
