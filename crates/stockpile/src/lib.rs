// Copyright (c) Microsoft Corporation.
// Licensed under the MIT License.

#![cfg_attr(coverage_nightly, feature(coverage_attribute))]
#![cfg_attr(docsrs, feature(doc_cfg))]

//! A read-through multi-tier cache for externally sourced records.
//!
//! [`Stockpile`] resolves a key through three ordered tiers:
//!
//! 1. a durable per-device [`LocalStore`],
//! 2. a shared [`RemoteStore`],
//! 3. the origin, a caller-supplied async fetcher.
//!
//! Fresh values are written back to both cache tiers. When the origin fails, the most recent
//! stale value is served instead; when it signals rate limiting, the key enters a backoff window
//! (kept by the [`RateLimitLedger`]) during which the origin is not contacted at all. Concurrent
//! resolutions of the same key share a single origin call, which runs to completion and updates
//! the caches even when every caller stops waiting for it, and [`Stockpile::resolve_batch`]
//! resolves many keys at once while confining each key's failure to its own outcome.
//!
//! # Examples
//!
//! ```
//! use std::time::Duration;
//!
//! use stockpile::{OriginError, ResolveOptions, Stockpile, build_key};
//! use tick::Clock;
//! # #[tokio::main(flavor = "current_thread")]
//! # async fn main() -> Result<(), stockpile::ResolveError> {
//!
//! let cache = Stockpile::builder::<u64>(Clock::new_tokio())
//!     .name("usage")
//!     .memory()
//!     .build();
//!
//! let key = build_key("usage", [("device", "89852")]);
//! let options = ResolveOptions::new().local_ttl(Duration::from_secs(15 * 60));
//!
//! let used = cache.resolve(key.as_str(), || async { Ok(42) }, &options).await?;
//! assert_eq!(used, 42);
//!
//! // Served from the local tier; the failing fetcher is never called.
//! let again = cache
//!     .resolve(key.as_str(), || async { Err(OriginError::transient("offline")) }, &options)
//!     .await?;
//! assert_eq!(again, 42);
//! # Ok(())
//! # }
//! ```
//!
//! # Features
//!
//! - `memory` (default): [`StockpileBuilder::memory`] wires up in-memory stores from
//!   `stockpile_memory`.
//! - `metrics`: [`StockpileBuilder::meter`] counts cache events with OpenTelemetry.
//! - `test-util`: enables `stockpile_tier::testing` mock stores.

mod batch;
mod builder;
mod error;
mod inflight;
mod key;
mod ledger;
mod options;
mod origin;
mod resolver;
mod telemetry;
mod time;

#[doc(inline)]
pub use batch::BatchResult;
#[doc(inline)]
pub use builder::StockpileBuilder;
#[doc(inline)]
pub use error::{ConfigError, FailureKind, ResolveError};
#[doc(inline)]
pub use key::{CacheKey, build_key};
#[doc(inline)]
pub use ledger::RateLimitLedger;
#[doc(inline)]
pub use options::ResolveOptions;
#[doc(inline)]
pub use origin::{OriginError, OriginErrorKind};
#[doc(inline)]
pub use resolver::{Resolution, Source, Stockpile};
#[doc(inline)]
pub use stockpile_tier::{CacheEntry, LocalStore, RateLimitRecord, RemoteStore, StoreError};
