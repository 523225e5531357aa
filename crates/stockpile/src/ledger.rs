// Copyright (c) Microsoft Corporation.
// Licensed under the MIT License.

//! Per-key rate-limit backoff windows, persisted in the local store.

use std::{borrow::Cow, time::Duration};

use serde::{
    Serialize,
    de::{DeserializeOwned, IgnoredAny},
};
use stockpile_tier::{LocalStore, RateLimitRecord, StoreError};
use tick::Clock;

use crate::time::unix_millis;

/// First character of every ledger record key in the local store.
const RESERVED: char = '#';

const BACKOFF_PREFIX: &str = "#backoff:";

/// Learned backoff windows, one per key.
///
/// Each record lives in the local store next to the key's cache entry (under `#backoff:{key}`),
/// so backoff survives process restarts. Cache entries for keys that start with `#` are stored
/// with an extra leading `#`, so a caller key never reads or overwrites a ledger record.
///
/// A record pairs the window with the last known good value; the value is absent when the
/// origin rate-limited a key that was never cached.
///
/// The ledger borrows the store and clock of the cache it belongs to; get one with
/// [`Stockpile::ledger`](crate::Stockpile::ledger).
///
/// # Examples
///
/// ```
/// use std::time::Duration;
///
/// use stockpile::RateLimitLedger;
/// use stockpile_memory::InMemoryLocalStore;
/// use tick::ClockControl;
/// # futures::executor::block_on(async {
///
/// let control = ClockControl::new();
/// let clock = control.to_clock();
/// let store = InMemoryLocalStore::new();
/// let ledger = RateLimitLedger::new(&store, &clock);
///
/// ledger.record_backoff("usage:1", Some(&7_u64), Duration::from_secs(900)).await?;
/// assert!(ledger.is_backed_off("usage:1").await?);
/// assert_eq!(ledger.peek::<u64>("usage:1").await?, Some(7));
///
/// control.advance(Duration::from_secs(901));
/// assert!(!ledger.is_backed_off("usage:1").await?);
/// # Ok::<(), stockpile_tier::StoreError>(())
/// # });
/// ```
#[derive(Debug)]
pub struct RateLimitLedger<'a, L> {
    store: &'a L,
    clock: &'a Clock,
}

impl<'a, L: LocalStore> RateLimitLedger<'a, L> {
    /// Creates a ledger over `store`, reading the time from `clock`.
    pub fn new(store: &'a L, clock: &'a Clock) -> Self {
        Self { store, clock }
    }

    /// Records that `key` must not be fetched from the origin for `retry_after`, starting now.
    ///
    /// # Errors
    ///
    /// Returns an error when the record cannot be serialized or written.
    pub async fn record_backoff<T: Serialize>(&self, key: &str, last_good: Option<&T>, retry_after: Duration) -> Result<(), StoreError> {
        let encoded = serde_json::to_string(&RateLimitRecord::new(last_good, unix_millis(self.clock), retry_after))
            .map_err(StoreError::from_source)?;
        self.store.set(&backoff_key(key), encoded).await
    }

    /// Returns `true` while a backoff window for `key` is active.
    ///
    /// # Errors
    ///
    /// Returns an error when the record cannot be read or decoded.
    pub async fn is_backed_off(&self, key: &str) -> Result<bool, StoreError> {
        let record = self.read::<IgnoredAny>(key).await?;
        Ok(record.is_some_and(|record| record.is_active(unix_millis(self.clock))))
    }

    /// Returns the last known good value recorded for `key`, whether or not the window is
    /// still active.
    ///
    /// # Errors
    ///
    /// Returns an error when the record cannot be read or decoded.
    pub async fn peek<T: DeserializeOwned>(&self, key: &str) -> Result<Option<T>, StoreError> {
        Ok(self.read::<T>(key).await?.and_then(RateLimitRecord::into_data))
    }

    /// Removes the backoff record for `key`.
    ///
    /// # Errors
    ///
    /// Returns an error when the store fails to remove the record.
    pub async fn clear(&self, key: &str) -> Result<(), StoreError> {
        self.store.remove(&backoff_key(key)).await
    }

    /// Reads the full record for `key`, active or not.
    pub(crate) async fn read<T: DeserializeOwned>(&self, key: &str) -> Result<Option<RateLimitRecord<Option<T>>>, StoreError> {
        match self.store.get(&backoff_key(key)).await? {
            Some(raw) => serde_json::from_str(&raw).map(Some).map_err(StoreError::from_source),
            None => Ok(None),
        }
    }
}

/// Returns where the cache entry for `key` lives in the local store.
pub(crate) fn entry_key(key: &str) -> Cow<'_, str> {
    if key.starts_with(RESERVED) {
        Cow::Owned(format!("{RESERVED}{key}"))
    } else {
        Cow::Borrowed(key)
    }
}

fn backoff_key(key: &str) -> String {
    format!("{BACKOFF_PREFIX}{key}")
}
