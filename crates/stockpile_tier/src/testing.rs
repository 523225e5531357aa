// Copyright (c) Microsoft Corporation.
// Licensed under the MIT License.

//! Mock stores for testing.
//!
//! This module provides [`MockLocalStore`] and [`MockRemoteStore`], configurable in-memory
//! stores that record all operations and support failure injection for testing
//! degraded-mode paths.

use std::{collections::HashMap, sync::Arc, time::Duration};

use parking_lot::Mutex;

use crate::{LocalStore, RemoteStore, StoreError};

/// Recorded local store operation with full context.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LocalOp {
    /// A get operation was performed with the given key.
    Get(String),
    /// A set operation was performed.
    Set {
        /// The key that was written.
        key: String,
        /// The serialized value that was written.
        value: String,
    },
    /// A remove operation was performed with the given key.
    Remove(String),
}

impl LocalOp {
    /// Returns the key this operation targeted.
    #[must_use]
    pub fn key(&self) -> &str {
        match self {
            Self::Get(key) | Self::Remove(key) | Self::Set { key, .. } => key,
        }
    }
}

/// Recorded remote store operation with full context.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RemoteOp<V> {
    /// A get operation was performed with the given key.
    Get(String),
    /// A set operation was performed.
    Set {
        /// The key that was written.
        key: String,
        /// The value that was written.
        value: V,
        /// The backend TTL hint passed with the write.
        ttl: Option<Duration>,
    },
    /// A delete operation was performed with the given key.
    Delete(String),
}

impl<V> RemoteOp<V> {
    /// Returns the key this operation targeted.
    #[must_use]
    pub fn key(&self) -> &str {
        match self {
            Self::Get(key) | Self::Delete(key) | Self::Set { key, .. } => key,
        }
    }
}

type FailPredicate<Op> = Box<dyn Fn(&Op) -> bool + Send + Sync>;

/// Shared state behind both mock stores.
struct MockState<V, Op> {
    data: Arc<Mutex<HashMap<String, V>>>,
    operations: Arc<Mutex<Vec<Op>>>,
    fail_when: Arc<Mutex<Option<FailPredicate<Op>>>>,
}

impl<V, Op> Clone for MockState<V, Op> {
    fn clone(&self) -> Self {
        Self {
            data: Arc::clone(&self.data),
            operations: Arc::clone(&self.operations),
            fail_when: Arc::clone(&self.fail_when),
        }
    }
}

impl<V, Op> MockState<V, Op> {
    fn new() -> Self {
        Self {
            data: Arc::new(Mutex::new(HashMap::new())),
            operations: Arc::new(Mutex::new(Vec::new())),
            fail_when: Arc::new(Mutex::new(None)),
        }
    }

    /// Records `op` and reports whether it should fail.
    fn record(&self, op: Op) -> bool {
        let fail = self.fail_when.lock().as_ref().is_some_and(|predicate| predicate(&op));
        self.operations.lock().push(op);
        fail
    }
}

/// A configurable mock local store for testing.
///
/// All operations are recorded for later verification, and any operation can be
/// made to fail on demand.
///
/// # Examples
///
/// ```
/// use stockpile_tier::{LocalStore, testing::{LocalOp, MockLocalStore}};
///
/// # futures::executor::block_on(async {
/// let store = MockLocalStore::new();
/// store.set("key", "value".to_string()).await.unwrap();
/// assert_eq!(store.get("key").await.unwrap().as_deref(), Some("value"));
///
/// store.fail_when(|op| matches!(op, LocalOp::Get(k) if k == "key"));
/// assert!(store.get("key").await.is_err());
/// # });
/// ```
pub struct MockLocalStore {
    state: MockState<String, LocalOp>,
}

/// A configurable mock remote store for testing.
///
/// Values are kept as-is; the TTL hint is recorded but not enforced.
///
/// # Examples
///
/// ```
/// use stockpile_tier::{RemoteStore, testing::{MockRemoteStore, RemoteOp}};
///
/// # futures::executor::block_on(async {
/// let store = MockRemoteStore::<i32>::new();
/// store.set("key", 7, None).await.unwrap();
/// assert_eq!(store.get("key").await.unwrap(), Some(7));
///
/// store.fail_when(|op| matches!(op, RemoteOp::Set { .. }));
/// assert!(store.set("key", 8, None).await.is_err());
/// # });
/// ```
pub struct MockRemoteStore<V> {
    state: MockState<V, RemoteOp<V>>,
}

macro_rules! mock_store_api {
    ($store:ident $(<$v:ident>)?, $op:ty, $value:ty) => {
        impl$(<$v>)? std::fmt::Debug for $store$(<$v>)? {
            fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
                f.debug_struct(stringify!($store))
                    .field("entries", &self.state.data.lock().len())
                    .field("operations", &self.state.operations.lock().len())
                    .field("fail_when", &self.state.fail_when.lock().is_some())
                    .finish()
            }
        }

        impl$(<$v>)? Clone for $store$(<$v>)? {
            fn clone(&self) -> Self {
                Self { state: self.state.clone() }
            }
        }

        impl$(<$v>)? Default for $store$(<$v>)? {
            fn default() -> Self {
                Self::new()
            }
        }

        impl$(<$v>)? $store$(<$v>)? {
            /// Creates a new empty mock store.
            #[must_use]
            pub fn new() -> Self {
                Self { state: MockState::new() }
            }

            /// Returns the number of stored values.
            #[must_use]
            pub fn entry_count(&self) -> usize {
                self.state.data.lock().len()
            }

            /// Returns true if a value is stored under `key`.
            #[must_use]
            pub fn contains_key(&self, key: &str) -> bool {
                self.state.data.lock().contains_key(key)
            }

            /// Writes a value directly, bypassing operation recording.
            pub fn seed(&self, key: impl Into<String>, value: $value) {
                self.state.data.lock().insert(key.into(), value);
            }

            /// Sets a predicate that determines when operations should fail.
            ///
            /// The predicate receives the operation and returns `true` if it should fail.
            /// Failed operations are still recorded but do not touch the stored data.
            pub fn fail_when<F>(&self, predicate: F)
            where
                F: Fn(&$op) -> bool + Send + Sync + 'static,
            {
                *self.state.fail_when.lock() = Some(Box::new(predicate));
            }

            /// Clears the failure predicate, allowing all operations to succeed.
            pub fn clear_failures(&self) {
                *self.state.fail_when.lock() = None;
            }

            /// Clears all recorded operations.
            pub fn clear_operations(&self) {
                self.state.operations.lock().clear();
            }
        }
    };
}

mock_store_api!(MockLocalStore, LocalOp, String);
mock_store_api!(MockRemoteStore<V>, RemoteOp<V>, V);

impl MockLocalStore {
    /// Returns the raw serialized value stored under `key`.
    #[must_use]
    pub fn raw(&self, key: &str) -> Option<String> {
        self.state.data.lock().get(key).cloned()
    }

    /// Returns a clone of all recorded operations.
    #[must_use]
    pub fn operations(&self) -> Vec<LocalOp> {
        self.state.operations.lock().clone()
    }
}

impl<V: Clone> MockRemoteStore<V> {
    /// Returns the value stored under `key`.
    #[must_use]
    pub fn value(&self, key: &str) -> Option<V> {
        self.state.data.lock().get(key).cloned()
    }

    /// Returns a clone of all recorded operations.
    #[must_use]
    pub fn operations(&self) -> Vec<RemoteOp<V>> {
        self.state.operations.lock().clone()
    }
}

impl LocalStore for MockLocalStore {
    async fn get(&self, key: &str) -> Result<Option<String>, StoreError> {
        if self.state.record(LocalOp::Get(key.to_owned())) {
            return Err(StoreError::from_message("mock: get failed"));
        }
        Ok(self.state.data.lock().get(key).cloned())
    }

    async fn set(&self, key: &str, value: String) -> Result<(), StoreError> {
        let op = LocalOp::Set {
            key: key.to_owned(),
            value: value.clone(),
        };
        if self.state.record(op) {
            return Err(StoreError::from_message("mock: set failed"));
        }
        self.state.data.lock().insert(key.to_owned(), value);
        Ok(())
    }

    async fn remove(&self, key: &str) -> Result<(), StoreError> {
        if self.state.record(LocalOp::Remove(key.to_owned())) {
            return Err(StoreError::from_message("mock: remove failed"));
        }
        self.state.data.lock().remove(key);
        Ok(())
    }
}

impl<V> RemoteStore<V> for MockRemoteStore<V>
where
    V: Clone + Send + Sync,
{
    async fn get(&self, key: &str) -> Result<Option<V>, StoreError> {
        if self.state.record(RemoteOp::Get(key.to_owned())) {
            return Err(StoreError::from_message("mock: get failed"));
        }
        Ok(self.state.data.lock().get(key).cloned())
    }

    async fn set(&self, key: &str, value: V, ttl: Option<Duration>) -> Result<(), StoreError> {
        let op = RemoteOp::Set {
            key: key.to_owned(),
            value: value.clone(),
            ttl,
        };
        if self.state.record(op) {
            return Err(StoreError::from_message("mock: set failed"));
        }
        self.state.data.lock().insert(key.to_owned(), value);
        Ok(())
    }

    async fn delete(&self, key: &str) -> Result<(), StoreError> {
        if self.state.record(RemoteOp::Delete(key.to_owned())) {
            return Err(StoreError::from_message("mock: delete failed"));
        }
        self.state.data.lock().remove(key);
        Ok(())
    }
}
