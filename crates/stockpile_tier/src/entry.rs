// Copyright (c) Microsoft Corporation.
// Licensed under the MIT License.

use std::{ops::Deref, time::Duration};

use serde::{Deserialize, Serialize};

/// A cached value with its capture time and optional time-to-live.
///
/// Timestamps are milliseconds since the Unix epoch, which is also the persisted
/// representation: `{ "data": ..., "timestamp": ..., "ttl": ... }`. The `ttl` field is
/// omitted when absent.
///
/// An entry without a TTL never expires by time. This is an explicit evergreen policy
/// for slowly-changing reference data, not an oversight.
///
/// Expiry never removes an entry from its store; an expired entry only stops being
/// served as fresh and stays available as a stale fallback.
///
/// # Examples
///
/// ```
/// use stockpile_tier::CacheEntry;
/// use std::time::Duration;
///
/// let entry = CacheEntry::new(42, 1_000).with_ttl(Some(Duration::from_secs(60)));
/// assert_eq!(*entry.data(), 42);
/// assert!(!entry.is_expired(1_000 + 60_000));
/// assert!(entry.is_expired(1_000 + 60_001));
///
/// let evergreen = CacheEntry::new("reference", 0);
/// assert!(!evergreen.is_expired(i64::MAX));
/// ```
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct CacheEntry<T> {
    data: T,
    timestamp: i64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    ttl: Option<u64>,
}

impl<T> CacheEntry<T> {
    /// Creates an evergreen entry captured at `timestamp` (milliseconds since the Unix epoch).
    pub fn new(data: T, timestamp: i64) -> Self {
        Self {
            data,
            timestamp,
            ttl: None,
        }
    }

    /// Replaces the entry's time-to-live. `None` makes the entry evergreen.
    #[must_use]
    pub fn with_ttl(mut self, ttl: Option<Duration>) -> Self {
        self.ttl = ttl.map(duration_to_millis);
        self
    }

    /// Returns the capture time in milliseconds since the Unix epoch.
    #[must_use]
    pub fn timestamp(&self) -> i64 {
        self.timestamp
    }

    /// Returns the entry's time-to-live, if any.
    #[must_use]
    pub fn ttl(&self) -> Option<Duration> {
        self.ttl.map(Duration::from_millis)
    }

    /// Returns how long ago the entry was captured, clamped to zero for future timestamps.
    #[must_use]
    pub fn age(&self, now: i64) -> Duration {
        u64::try_from(now.saturating_sub(self.timestamp)).map_or(Duration::ZERO, Duration::from_millis)
    }

    /// Returns `true` when the entry has a TTL and `now - timestamp > ttl`.
    #[must_use]
    pub fn is_expired(&self, now: i64) -> bool {
        self.ttl.is_some_and(|ttl| {
            let ttl = i64::try_from(ttl).unwrap_or(i64::MAX);
            now.saturating_sub(self.timestamp) > ttl
        })
    }

    /// Returns a reference to the cached data.
    #[must_use]
    pub fn data(&self) -> &T {
        &self.data
    }

    /// Consumes the entry and returns the cached data.
    #[must_use]
    pub fn into_data(self) -> T {
        self.data
    }
}

impl<T> Deref for CacheEntry<T> {
    type Target = T;

    fn deref(&self) -> &Self::Target {
        &self.data
    }
}

/// A learned backoff window paired with the last known good value.
///
/// Recorded when the origin signals rate limiting: the resolver keeps serving `data` and
/// does not contact the origin again until `timestamp + retry_after` has passed.
///
/// The persisted shape reuses the entry layout with `retryAfter` (seconds) marking it as a
/// backoff record: `{ "data": ..., "timestamp": ..., "retryAfter": ... }`.
///
/// # Examples
///
/// ```
/// use stockpile_tier::RateLimitRecord;
/// use std::time::Duration;
///
/// let record = RateLimitRecord::new("last good", 0, Duration::from_secs(900));
/// assert!(record.is_active(600_000));
/// assert!(!record.is_active(901_000));
/// ```
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RateLimitRecord<T> {
    data: T,
    timestamp: i64,
    retry_after: u64,
}

impl<T> RateLimitRecord<T> {
    /// Creates a record observed at `observed_at` (milliseconds since the Unix epoch).
    ///
    /// The retry-after window is kept in whole seconds, rounded up so the backoff never ends
    /// before the origin asked.
    pub fn new(data: T, observed_at: i64, retry_after: Duration) -> Self {
        Self {
            data,
            timestamp: observed_at,
            retry_after: retry_after.as_secs().saturating_add(u64::from(retry_after.subsec_nanos() > 0)),
        }
    }

    /// Returns when the rate-limit signal was observed, in milliseconds since the Unix epoch.
    #[must_use]
    pub fn observed_at(&self) -> i64 {
        self.timestamp
    }

    /// Returns the learned retry-after window.
    #[must_use]
    pub fn retry_after(&self) -> Duration {
        Duration::from_secs(self.retry_after)
    }

    /// Returns the first instant (milliseconds since the Unix epoch) at which the origin may be contacted again.
    #[must_use]
    pub fn backoff_until(&self) -> i64 {
        let window = i64::try_from(self.retry_after.saturating_mul(1000)).unwrap_or(i64::MAX);
        self.timestamp.saturating_add(window)
    }

    /// Returns `true` while `now < observed_at + retry_after`.
    #[must_use]
    pub fn is_active(&self, now: i64) -> bool {
        now < self.backoff_until()
    }

    /// Returns a reference to the last known good value.
    #[must_use]
    pub fn data(&self) -> &T {
        &self.data
    }

    /// Consumes the record and returns the last known good value.
    #[must_use]
    pub fn into_data(self) -> T {
        self.data
    }
}

fn duration_to_millis(duration: Duration) -> u64 {
    u64::try_from(duration.as_millis()).unwrap_or(u64::MAX)
}
