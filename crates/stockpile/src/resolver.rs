// Copyright (c) Microsoft Corporation.
// Licensed under the MIT License.

//! Read-through resolution across the local, remote and origin tiers.

use std::{
    collections::HashMap,
    fmt::Debug,
    sync::{
        Arc,
        atomic::{AtomicBool, Ordering},
    },
    time::Duration,
};

use anyspawn::Spawner;
use futures::future::join_all;
use parking_lot::Mutex;
use serde::{Serialize, de::DeserializeOwned};
use stockpile_tier::{CacheEntry, LocalStore, RemoteStore};
use tick::Clock;

use crate::{
    OriginError, OriginErrorKind, RateLimitLedger, ResolveError, ResolveOptions,
    builder::StockpileBuilder,
    inflight::InFlight,
    ledger::entry_key,
    telemetry::{CacheActivity, CacheOperation, CacheTelemetry},
    time::unix_millis,
};

/// Where a resolved value came from.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum Source {
    /// A fresh entry in the local tier.
    Local,
    /// A fresh entry in the remote tier, now also backfilled into the local tier.
    Remote,
    /// The last known good value, served without contacting the origin during a backoff window.
    Backoff,
    /// A fresh value from the origin.
    Origin,
    /// An expired entry served because the origin failed.
    Stale,
}

/// A resolved value together with the tier that produced it.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Resolution<T> {
    value: T,
    source: Source,
}

impl<T> Resolution<T> {
    pub(crate) fn new(value: T, source: Source) -> Self {
        Self { value, source }
    }

    /// Returns the resolved value.
    #[must_use]
    pub fn value(&self) -> &T {
        &self.value
    }

    /// Returns where the value came from.
    #[must_use]
    pub fn source(&self) -> Source {
        self.source
    }

    /// Returns `true` unless the value was served in degraded mode ([`Source::Stale`] or
    /// [`Source::Backoff`]).
    #[must_use]
    pub fn is_fresh(&self) -> bool {
        !matches!(self.source, Source::Stale | Source::Backoff)
    }

    /// Consumes the resolution and returns the value.
    #[must_use]
    pub fn into_value(self) -> T {
        self.value
    }
}

/// The outcome of checking the cache tiers and the ledger for a key.
pub(crate) enum Lookup<T> {
    /// Served from the cache, or refused because of an active backoff window.
    Settled(Result<Resolution<T>, ResolveError>),
    /// The origin has to be called; carries the most recent stale value, if any.
    NeedsOrigin(Option<T>),
}

pub(crate) type Outcome<T> = Result<Resolution<T>, ResolveError>;

pub(crate) struct Inner<T, L, R> {
    pub(crate) local: L,
    pub(crate) remote: R,
    pub(crate) clock: Clock,
    pub(crate) telemetry: CacheTelemetry,
    inflight: InFlight<Outcome<T>>,
    /// Bumped by every invalidation; absent keys are at generation zero.
    generations: Mutex<HashMap<String, u64>>,
    closed: AtomicBool,
}

/// A multi-tier read-through cache.
///
/// Resolving a key checks the local tier, then the remote tier, then the key's backoff window,
/// and only then calls the origin. Origin failures are absorbed by serving the most recent stale
/// value when one exists:
///
/// - transient failures serve stale data,
/// - rate-limit failures also open a backoff window during which the origin is not contacted,
/// - permanent failures propagate unless
///   [`serve_stale_on_permanent_error`](ResolveOptions::serve_stale_on_permanent_error) is set.
///
/// Store failures never fail a resolution; the resolver moves on to the next tier.
///
/// Concurrent resolutions of the same key are coalesced: the first caller starts the work and
/// later callers await the same result, so the origin sees at most one call per key at a time.
/// The work runs as a task on the builder's [`Spawner`](anyspawn::Spawner), so a resolution
/// whose callers stopped awaiting still runs to completion and updates the caches.
///
/// The handle is cheap to clone; clones share the stores and the in-flight state.
///
/// # Examples
///
/// ```
/// use std::time::Duration;
///
/// use stockpile::{ResolveOptions, Source, Stockpile};
/// use tick::Clock;
/// # #[tokio::main(flavor = "current_thread")]
/// # async fn main() -> Result<(), stockpile::ResolveError> {
///
/// let cache = Stockpile::builder::<String>(Clock::new_frozen())
///     .name("usage")
///     .memory()
///     .build();
///
/// let options = ResolveOptions::new().local_ttl(Duration::from_secs(900));
///
/// let first = cache
///     .resolve_detailed("usage:1", || async { Ok("42 GB".to_string()) }, &options)
///     .await?;
/// assert_eq!(first.source(), Source::Origin);
///
/// let second = cache
///     .resolve_detailed("usage:1", || async { Ok("never called".to_string()) }, &options)
///     .await?;
/// assert_eq!(second.source(), Source::Local);
/// assert_eq!(second.value(), "42 GB");
/// # Ok(())
/// # }
/// ```
pub struct Stockpile<T, L = (), R = ()> {
    inner: Arc<Inner<T, L, R>>,
}

impl<T, L, R> Clone for Stockpile<T, L, R> {
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
        }
    }
}

impl<T, L, R> Debug for Stockpile<T, L, R> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Stockpile")
            .field("name", &self.inner.telemetry.name())
            .field("closed", &self.inner.closed.load(Ordering::Acquire))
            .finish_non_exhaustive()
    }
}

impl Stockpile<(), (), ()> {
    /// Creates a new cache builder.
    ///
    /// # Examples
    ///
    /// ```
    /// use stockpile::Stockpile;
    /// use tick::Clock;
    ///
    /// let cache = Stockpile::builder::<u64>(Clock::new_frozen()).memory().build();
    /// assert_eq!(cache.name(), "stockpile");
    /// ```
    #[must_use]
    pub fn builder<T>(clock: Clock) -> StockpileBuilder<T> {
        StockpileBuilder::new(clock)
    }
}

impl<T, L, R> Stockpile<T, L, R>
where
    T: Clone + Serialize + DeserializeOwned + Send + Sync + 'static,
    L: LocalStore + 'static,
    R: RemoteStore<CacheEntry<T>> + 'static,
{
    pub(crate) fn from_parts(local: L, remote: R, clock: Clock, spawner: Spawner, telemetry: CacheTelemetry) -> Self {
        Self {
            inner: Arc::new(Inner {
                local,
                remote,
                clock,
                telemetry,
                inflight: InFlight::new(spawner),
                generations: Mutex::new(HashMap::new()),
                closed: AtomicBool::new(false),
            }),
        }
    }

    pub(crate) fn inner(&self) -> &Arc<Inner<T, L, R>> {
        &self.inner
    }

    /// Returns the name used in telemetry.
    #[must_use]
    pub fn name(&self) -> &str {
        self.inner.telemetry.name()
    }

    /// Returns the clock entry timestamps are taken from.
    #[must_use]
    pub fn clock(&self) -> &Clock {
        &self.inner.clock
    }

    /// Returns the local store.
    #[must_use]
    pub fn local_store(&self) -> &L {
        &self.inner.local
    }

    /// Returns the remote store.
    #[must_use]
    pub fn remote_store(&self) -> &R {
        &self.inner.remote
    }

    /// Returns the rate-limit ledger backing this cache.
    #[must_use]
    pub fn ledger(&self) -> RateLimitLedger<'_, L> {
        self.inner.ledger()
    }

    /// Returns the number of resolution tasks still running, including ones no caller awaits.
    ///
    /// Every call waiting on a coalesced resolution counts separately.
    #[must_use]
    pub fn pending(&self) -> usize {
        self.inner.inflight.len()
    }

    /// Returns `true` once [`close`](Self::close) has been called.
    #[must_use]
    pub fn is_closed(&self) -> bool {
        self.inner.closed.load(Ordering::Acquire)
    }

    /// Resolves `key`, calling `fetch` only when no tier can serve it.
    ///
    /// # Errors
    ///
    /// Fails only when every fallback is exhausted: the origin failed and no stale value
    /// exists (or stale masking does not apply to the failure), or the cache is closed.
    pub async fn resolve<F, Fut>(&self, key: &str, fetch: F, options: &ResolveOptions) -> Result<T, ResolveError>
    where
        F: FnOnce() -> Fut + Send + 'static,
        Fut: Future<Output = Result<T, OriginError>> + Send + 'static,
    {
        self.resolve_detailed(key, fetch, options).await.map(Resolution::into_value)
    }

    /// Resolves `key` like [`resolve`](Self::resolve) and reports which tier served the value.
    ///
    /// When another resolution of `key` is already in flight, this call awaits its result
    /// instead, and `fetch` and `options` are dropped.
    ///
    /// Dropping the returned future does not cancel the resolution: it keeps running as a task
    /// and writes its result to the caches.
    ///
    /// # Errors
    ///
    /// Same as [`resolve`](Self::resolve).
    pub async fn resolve_detailed<F, Fut>(&self, key: &str, fetch: F, options: &ResolveOptions) -> Result<Resolution<T>, ResolveError>
    where
        F: FnOnce() -> Fut + Send + 'static,
        Fut: Future<Output = Result<T, OriginError>> + Send + 'static,
    {
        if self.is_closed() {
            return Err(ResolveError::closed(key));
        }

        let generation = self.inner.generation(key);
        let work = {
            let inner = Arc::clone(&self.inner);
            let key = key.to_owned();
            let options = options.clone();
            async move {
                match inner.lookup(&key, &options, CacheOperation::Resolve).await {
                    Lookup::Settled(outcome) => outcome,
                    Lookup::NeedsOrigin(fallback) => {
                        inner
                            .fetch(&key, generation, fetch(), fallback, &options, CacheOperation::Resolve)
                            .await
                    }
                }
            }
        };

        self.inner.coalesce(key, generation, work, CacheOperation::Resolve).await
    }

    /// Removes `key` from both tiers and clears its backoff window.
    ///
    /// The next resolution of `key` calls the origin. A resolution of `key` already in flight
    /// keeps running for its current callers, but new callers no longer join it and its result
    /// is not written to the caches or the ledger.
    ///
    /// # Errors
    ///
    /// Returns a [`Store`](crate::FailureKind::Store) error when a tier could not be cleared
    /// (every tier is still attempted), or a [`Closed`](crate::FailureKind::Closed) error.
    pub async fn invalidate(&self, key: &str) -> Result<(), ResolveError> {
        if self.is_closed() {
            return Err(ResolveError::closed(key));
        }

        self.inner.advance_generation(key);

        let local = self.inner.local.remove(&entry_key(key)).await;
        let remote = self.inner.remote.delete(key).await;
        let ledger = self.inner.ledger().clear(key).await;

        match local.and(remote).and(ledger) {
            Ok(()) => {
                self.inner.record(CacheOperation::Invalidate, CacheActivity::Invalidated, key);
                Ok(())
            }
            Err(error) => {
                self.inner.record(CacheOperation::Invalidate, CacheActivity::StoreError, key);
                Err(ResolveError::store(key, error))
            }
        }
    }

    /// Writes `value` as a fresh entry into the enabled tiers without contacting the origin.
    ///
    /// Use it right after a local mutation so subsequent reads see the new value.
    ///
    /// # Errors
    ///
    /// Returns a [`Serialization`](crate::FailureKind::Serialization) or
    /// [`Store`](crate::FailureKind::Store) error when a tier could not be written (every
    /// enabled tier is still attempted), or a [`Closed`](crate::FailureKind::Closed) error.
    pub async fn preload(&self, key: &str, value: T, options: &ResolveOptions) -> Result<(), ResolveError> {
        if self.is_closed() {
            return Err(ResolveError::closed(key));
        }

        match self.inner.write_through(key, &value, options).await {
            Ok(()) => {
                self.inner.record(CacheOperation::Preload, CacheActivity::Preloaded, key);
                Ok(())
            }
            Err(error) => {
                self.inner.record(CacheOperation::Preload, CacheActivity::StoreError, key);
                Err(error)
            }
        }
    }

    /// Waits until every resolution running at the time of the call has finished, including ones
    /// no caller awaits any more, so their cache writes have landed.
    pub async fn flush(&self) {
        let running = self.inner.inflight.snapshot();

        join_all(running.into_iter().map(|(key, completion)| async move {
            completion.await;
            self.inner.record(CacheOperation::Flush, CacheActivity::Flushed, &key);
        }))
        .await;
    }

    /// Flushes the cache and rejects every later operation with a
    /// [`Closed`](crate::FailureKind::Closed) error.
    pub async fn close(&self) {
        self.inner.closed.store(true, Ordering::Release);
        self.flush().await;
    }
}

impl<T, L, R> Inner<T, L, R>
where
    T: Clone + Serialize + DeserializeOwned + Send + Sync + 'static,
    L: LocalStore + 'static,
    R: RemoteStore<CacheEntry<T>> + 'static,
{
    pub(crate) fn ledger(&self) -> RateLimitLedger<'_, L> {
        RateLimitLedger::new(&self.local, &self.clock)
    }

    pub(crate) fn record(&self, operation: CacheOperation, activity: CacheActivity, key: &str) {
        self.telemetry.record(operation, activity, key);
    }

    pub(crate) fn generation(&self, key: &str) -> u64 {
        self.generations.lock().get(key).copied().unwrap_or_default()
    }

    fn advance_generation(&self, key: &str) {
        let mut generations = self.generations.lock();
        let generation = generations.entry(key.to_owned()).or_default();
        *generation = generation.wrapping_add(1);
    }

    /// Runs `work` as the resolution of `key` at `generation`, or joins the one in flight.
    pub(crate) async fn coalesce<W>(&self, key: &str, generation: u64, work: W, operation: CacheOperation) -> Outcome<T>
    where
        W: Future<Output = Outcome<T>> + Send + 'static,
    {
        let (outcome, started) = self.inflight.run(key, generation, work).await;
        if !started {
            self.record(operation, CacheActivity::Coalesced, key);
        }

        match outcome {
            Ok(outcome) => outcome,
            Err(panicked) => {
                self.record(operation, CacheActivity::Error, key);
                Err(ResolveError::panicked(key, panicked))
            }
        }
    }

    /// Checks the local tier, the remote tier and the backoff window, in that order.
    pub(crate) async fn lookup(&self, key: &str, options: &ResolveOptions, operation: CacheOperation) -> Lookup<T> {
        let now = unix_millis(&self.clock);
        let mut stale: Option<CacheEntry<T>> = None;

        if options.local_enabled() {
            match self.read_local(key, operation).await {
                Some(entry) if !entry.is_expired(now) => {
                    self.record(operation, CacheActivity::Hit, key);
                    return Lookup::Settled(Ok(Resolution::new(entry.into_data(), Source::Local)));
                }
                Some(entry) => {
                    self.record(operation, CacheActivity::Expired, key);
                    stale = Some(entry);
                }
                None => self.record(operation, CacheActivity::Miss, key),
            }
        }

        if options.remote_enabled() {
            match self.read_remote(key, operation).await {
                Some(entry) if !entry.is_expired(now) => {
                    self.backfill(key, &entry, options, operation).await;
                    return Lookup::Settled(Ok(Resolution::new(entry.into_data(), Source::Remote)));
                }
                Some(entry) => {
                    if stale.as_ref().is_none_or(|local| entry.timestamp() > local.timestamp()) {
                        stale = Some(entry);
                    }
                }
                None => {}
            }
        }

        let mut recorded = None;
        match self.ledger().read::<T>(key).await {
            Ok(Some(record)) if record.is_active(now) => {
                self.record(operation, CacheActivity::SoftHit, key);
                let remaining = u64::try_from(record.backoff_until().saturating_sub(now)).unwrap_or_default();
                return Lookup::Settled(match record.into_data() {
                    Some(value) => Ok(Resolution::new(value, Source::Backoff)),
                    None => Err(ResolveError::origin(
                        key,
                        OriginError::rate_limited(Duration::from_millis(remaining), "origin is backing off"),
                    )),
                });
            }
            Ok(Some(record)) => recorded = record.into_data(),
            Ok(None) => {}
            Err(_) => self.record(operation, CacheActivity::StoreError, key),
        }

        Lookup::NeedsOrigin(stale.map(CacheEntry::into_data).or(recorded))
    }

    /// Calls the origin and writes the fresh value through, or falls back to `fallback`.
    ///
    /// Nothing is written when `key` was invalidated after `generation` was read.
    pub(crate) async fn fetch<Fut>(
        &self,
        key: &str,
        generation: u64,
        fetch: Fut,
        fallback: Option<T>,
        options: &ResolveOptions,
        operation: CacheOperation,
    ) -> Result<Resolution<T>, ResolveError>
    where
        Fut: Future<Output = Result<T, OriginError>>,
    {
        match fetch.await {
            Ok(value) => {
                if self.generation(key) == generation {
                    if self.write_through(key, &value, options).await.is_err() {
                        self.record(operation, CacheActivity::StoreError, key);
                    }
                    if self.ledger().clear(key).await.is_err() {
                        self.record(operation, CacheActivity::StoreError, key);
                    }
                } else {
                    self.record(operation, CacheActivity::Superseded, key);
                }
                self.record(operation, CacheActivity::Fetched, key);
                Ok(Resolution::new(value, Source::Origin))
            }
            Err(error) => self.recover(key, generation, error, fallback, options, operation).await,
        }
    }

    async fn recover(
        &self,
        key: &str,
        generation: u64,
        error: OriginError,
        fallback: Option<T>,
        options: &ResolveOptions,
        operation: CacheOperation,
    ) -> Result<Resolution<T>, ResolveError> {
        let serve_stale = match error.kind() {
            OriginErrorKind::RateLimited { retry_after } => {
                self.record(operation, CacheActivity::RateLimited, key);
                if self.generation(key) != generation {
                    self.record(operation, CacheActivity::Superseded, key);
                } else if self.ledger().record_backoff(key, fallback.as_ref(), retry_after).await.is_err() {
                    self.record(operation, CacheActivity::StoreError, key);
                }
                true
            }
            OriginErrorKind::Transient => true,
            OriginErrorKind::Permanent => options.serves_stale_on_permanent_error(),
        };

        match fallback {
            Some(value) if serve_stale => {
                self.record(operation, CacheActivity::Stale, key);
                Ok(Resolution::new(value, Source::Stale))
            }
            _ => {
                self.record(operation, CacheActivity::Error, key);
                Err(ResolveError::origin(key, error))
            }
        }
    }

    /// Writes a fresh entry for `value` into every enabled tier.
    ///
    /// Every enabled tier is attempted; the first failure is returned.
    pub(crate) async fn write_through(&self, key: &str, value: &T, options: &ResolveOptions) -> Result<(), ResolveError> {
        let entry = CacheEntry::new(value.clone(), unix_millis(&self.clock));
        let mut outcome = Ok(());

        if options.local_enabled() {
            outcome = self.write_local(key, &entry.clone().with_ttl(options.local_freshness())).await;
        }

        if options.remote_enabled() {
            let written = self.write_remote(key, entry.with_ttl(options.remote_freshness())).await;
            outcome = outcome.and(written);
        }

        outcome
    }

    /// Copies a fresh remote entry into the local tier, keeping its capture time.
    async fn backfill(&self, key: &str, entry: &CacheEntry<T>, options: &ResolveOptions, operation: CacheOperation) {
        if !options.local_enabled() {
            self.record(operation, CacheActivity::Hit, key);
            return;
        }

        let local = entry.clone().with_ttl(options.local_freshness());
        match self.write_local(key, &local).await {
            Ok(()) => self.record(operation, CacheActivity::Backfill, key),
            Err(_) => self.record(operation, CacheActivity::StoreError, key),
        }
    }

    async fn read_local(&self, key: &str, operation: CacheOperation) -> Option<CacheEntry<T>> {
        match self.local.get(&entry_key(key)).await {
            Ok(Some(raw)) => {
                let decoded = serde_json::from_str(&raw);
                if decoded.is_err() {
                    self.record(operation, CacheActivity::StoreError, key);
                }
                decoded.ok()
            }
            Ok(None) => None,
            Err(_) => {
                self.record(operation, CacheActivity::StoreError, key);
                None
            }
        }
    }

    async fn read_remote(&self, key: &str, operation: CacheOperation) -> Option<CacheEntry<T>> {
        match self.remote.get(key).await {
            Ok(entry) => entry,
            Err(_) => {
                self.record(operation, CacheActivity::StoreError, key);
                None
            }
        }
    }

    async fn write_local(&self, key: &str, entry: &CacheEntry<T>) -> Result<(), ResolveError> {
        let encoded = serde_json::to_string(entry).map_err(|error| ResolveError::serialization(key, error))?;
        self.local
            .set(&entry_key(key), encoded)
            .await
            .map_err(|error| ResolveError::store(key, error))
    }

    /// Freshness travels in the entry; the store gets no eviction hint, so expired entries stay
    /// available as stale fallbacks.
    async fn write_remote(&self, key: &str, entry: CacheEntry<T>) -> Result<(), ResolveError> {
        self.remote.set(key, entry, None).await.map_err(|error| ResolveError::store(key, error))
    }
}
