// Copyright (c) Microsoft Corporation.
// Licensed under the MIT License.

#![cfg_attr(coverage_nightly, feature(coverage_attribute))]
#![cfg_attr(docsrs, feature(doc_cfg))]

//! Store abstractions and persisted entry types for tiered caching.
//!
//! This crate defines the two storage collaborators a tiered cache reads through:
//!
//! - [`LocalStore`]: a durable, per-device, string-valued key/value store.
//! - [`RemoteStore`]: a shared backend cache holding typed values with an optional TTL.
//!
//! It also defines the records persisted into those stores: [`CacheEntry`] for cached
//! values and [`RateLimitRecord`] for learned backoff windows, plus the [`StoreError`]
//! type every store operation reports.
//!
//! # Implementing a Local Store
//!
//! ```
//! use std::collections::HashMap;
//! use std::sync::RwLock;
//!
//! use stockpile_tier::{LocalStore, StoreError};
//!
//! struct MapStore(RwLock<HashMap<String, String>>);
//!
//! impl LocalStore for MapStore {
//!     async fn get(&self, key: &str) -> Result<Option<String>, StoreError> {
//!         let map = self.0.read().map_err(|e| StoreError::from_message(e.to_string()))?;
//!         Ok(map.get(key).cloned())
//!     }
//!
//!     async fn set(&self, key: &str, value: String) -> Result<(), StoreError> {
//!         let mut map = self.0.write().map_err(|e| StoreError::from_message(e.to_string()))?;
//!         map.insert(key.to_owned(), value);
//!         Ok(())
//!     }
//!
//!     async fn remove(&self, key: &str) -> Result<(), StoreError> {
//!         let mut map = self.0.write().map_err(|e| StoreError::from_message(e.to_string()))?;
//!         map.remove(key);
//!         Ok(())
//!     }
//! }
//! ```

mod entry;
pub mod error;
mod store;
#[cfg(any(feature = "test-util", test))]
pub mod testing;

#[doc(inline)]
pub use entry::{CacheEntry, RateLimitRecord};
#[doc(inline)]
pub use error::{Result, StoreError};
#[doc(inline)]
pub use store::{LocalStore, RemoteStore};
