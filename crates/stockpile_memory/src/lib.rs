// Copyright (c) Microsoft Corporation.
// Licensed under the MIT License.

#![cfg_attr(coverage_nightly, feature(coverage_attribute))]
#![cfg_attr(docsrs, feature(doc_cfg))]

//! In-memory stores backed by moka.
//!
//! This crate provides [`InMemoryLocalStore`] and [`InMemoryRemoteStore`], concurrent
//! in-memory implementations of the `stockpile_tier` store traits. They are useful as
//! process-local tiers, in tests, and as reference implementations for real backends.
//! Use [`InMemoryStoreBuilder`] to configure capacity without exposing moka types.
//!
//! # Quick Start
//!
//! ```
//! use stockpile_memory::{InMemoryLocalStore, InMemoryRemoteStore};
//! use stockpile_tier::{LocalStore, RemoteStore};
//! use std::time::Duration;
//!
//! # futures::executor::block_on(async {
//! let local = InMemoryLocalStore::builder().max_capacity(1000).build_local();
//! local.set("key", "value".to_string()).await?;
//! assert_eq!(local.get("key").await?.as_deref(), Some("value"));
//!
//! let remote = InMemoryRemoteStore::<u64>::new();
//! remote.set("key", 7, Some(Duration::from_secs(60))).await?;
//! assert_eq!(remote.get("key").await?, Some(7));
//! # Ok::<(), stockpile_tier::StoreError>(())
//! # });
//! ```
//!
//! # Features
//!
//! - **Capacity limits**: Set maximum entry count with automatic eviction
//! - **Per-entry TTL**: The remote store honors the TTL hint passed with each write
//! - **Thread-safe**: Safe for concurrent access from multiple tasks

pub mod builder;
pub mod store;

#[doc(inline)]
pub use builder::InMemoryStoreBuilder;
#[doc(inline)]
pub use store::{InMemoryLocalStore, InMemoryRemoteStore};
