// Copyright (c) Microsoft Corporation.
// Licensed under the MIT License.

//! The storage collaborators a tiered cache reads through.
//!
//! Both traits describe single-operation contracts: each call is one get, one put or
//! one removal. Implementations serialize their own access and own capacity-based
//! eviction; the cache never holds a lock across calls.

use std::time::Duration;

use crate::StoreError;

/// A durable per-device key/value store holding string values.
///
/// The cache persists serialized entries and backoff records here, so values
/// survive process restarts when the implementation is durable.
pub trait LocalStore: Send + Sync {
    /// Reads the value stored under `key`.
    fn get(&self, key: &str) -> impl Future<Output = Result<Option<String>, StoreError>> + Send;

    /// Stores `value` under `key`, replacing any previous value.
    fn set(&self, key: &str, value: String) -> impl Future<Output = Result<(), StoreError>> + Send;

    /// Removes the value stored under `key`. Removing a missing key is not an error.
    fn remove(&self, key: &str) -> impl Future<Output = Result<(), StoreError>> + Send;
}

/// A shared backend cache holding typed values.
///
/// The optional TTL passed to [`set`](Self::set) is a hint the backend may use for
/// its own eviction. The cache checks freshness from the stored entry itself, so
/// honoring the hint is not required for correctness.
pub trait RemoteStore<V>: Send + Sync {
    /// Reads the value stored under `key`.
    fn get(&self, key: &str) -> impl Future<Output = Result<Option<V>, StoreError>> + Send;

    /// Stores `value` under `key` with an optional backend TTL.
    fn set(&self, key: &str, value: V, ttl: Option<Duration>) -> impl Future<Output = Result<(), StoreError>> + Send;

    /// Deletes the value stored under `key`. Deleting a missing key is not an error.
    fn delete(&self, key: &str) -> impl Future<Output = Result<(), StoreError>> + Send;
}
