// Copyright (c) Microsoft Corporation.
// Licensed under the MIT License.

//! Concurrent resolution of many independent keys.

use std::{
    collections::{BTreeMap, btree_map},
    sync::Arc,
};

use futures::{StreamExt, future::join_all, stream};
use serde::{Serialize, de::DeserializeOwned};
use stockpile_tier::{CacheEntry, LocalStore, RemoteStore};

use crate::{
    OriginError, ResolveError, ResolveOptions, Stockpile,
    resolver::{Lookup, Resolution},
    telemetry::CacheOperation,
};

/// Per-key outcomes of [`Stockpile::resolve_batch`].
///
/// Every requested key has exactly one outcome; a failing key never affects its siblings.
/// Iteration is in key order.
#[derive(Clone, Debug)]
pub struct BatchResult<T> {
    outcomes: BTreeMap<String, Result<T, ResolveError>>,
}

impl<T> BatchResult<T> {
    /// Returns the outcome for `key`, or `None` if it was not requested.
    #[must_use]
    pub fn get(&self, key: &str) -> Option<&Result<T, ResolveError>> {
        self.outcomes.get(key)
    }

    /// Returns the resolved value for `key`, if it resolved.
    #[must_use]
    pub fn value(&self, key: &str) -> Option<&T> {
        self.get(key)?.as_ref().ok()
    }

    /// Returns the error for `key`, if it failed.
    #[must_use]
    pub fn error(&self, key: &str) -> Option<&ResolveError> {
        self.get(key)?.as_ref().err()
    }

    /// Iterates over the keys that resolved, with their values.
    pub fn values(&self) -> impl Iterator<Item = (&str, &T)> {
        self.outcomes
            .iter()
            .filter_map(|(key, outcome)| outcome.as_ref().ok().map(|value| (key.as_str(), value)))
    }

    /// Iterates over the keys that failed, with their errors.
    pub fn errors(&self) -> impl Iterator<Item = (&str, &ResolveError)> {
        self.outcomes
            .iter()
            .filter_map(|(key, outcome)| outcome.as_ref().err().map(|error| (key.as_str(), error)))
    }

    /// Iterates over every outcome.
    pub fn iter(&self) -> btree_map::Iter<'_, String, Result<T, ResolveError>> {
        self.outcomes.iter()
    }

    /// Returns the number of distinct keys.
    #[must_use]
    pub fn len(&self) -> usize {
        self.outcomes.len()
    }

    /// Returns `true` if no keys were requested.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.outcomes.is_empty()
    }

    /// Consumes the result and returns the outcome map.
    #[must_use]
    pub fn into_map(self) -> BTreeMap<String, Result<T, ResolveError>> {
        self.outcomes
    }
}

impl<T> IntoIterator for BatchResult<T> {
    type Item = (String, Result<T, ResolveError>);
    type IntoIter = btree_map::IntoIter<String, Result<T, ResolveError>>;

    fn into_iter(self) -> Self::IntoIter {
        self.outcomes.into_iter()
    }
}

impl<'a, T> IntoIterator for &'a BatchResult<T> {
    type Item = (&'a String, &'a Result<T, ResolveError>);
    type IntoIter = btree_map::Iter<'a, String, Result<T, ResolveError>>;

    fn into_iter(self) -> Self::IntoIter {
        self.outcomes.iter()
    }
}

impl<T, L, R> Stockpile<T, L, R>
where
    T: Clone + Serialize + DeserializeOwned + Send + Sync + 'static,
    L: LocalStore + 'static,
    R: RemoteStore<CacheEntry<T>> + 'static,
{
    /// Resolves many independent keys concurrently.
    ///
    /// Every key is first checked against the cache tiers and its backoff window. The origin
    /// is then called, through `fetcher_factory`, for the keys no tier could serve, all at once
    /// or at most [`max_concurrent_fetches`](ResolveOptions::max_concurrent_fetches) at a time.
    /// A key whose origin call fails falls back to its stale value like a single
    /// [`resolve`](Self::resolve); if none exists its outcome is the error.
    ///
    /// Duplicate keys are resolved once. Keys already being resolved by another caller are
    /// joined rather than fetched again; the futures `fetcher_factory` built for them are
    /// dropped unpolled. As with [`resolve`](Self::resolve), each origin call runs as a task and
    /// updates the caches even if this call is dropped.
    ///
    /// The call as a whole never fails.
    ///
    /// # Examples
    ///
    /// ```
    /// use stockpile::{OriginError, ResolveOptions, Stockpile};
    /// use tick::Clock;
    /// # #[tokio::main(flavor = "current_thread")]
    /// # async fn main() {
    ///
    /// let cache = Stockpile::builder::<u32>(Clock::new_frozen()).memory().build();
    ///
    /// let result = cache
    ///     .resolve_batch(
    ///         ["good", "bad"],
    ///         |key| {
    ///             let ok = key == "good";
    ///             async move { if ok { Ok(1) } else { Err(OriginError::transient("boom")) } }
    ///         },
    ///         &ResolveOptions::default(),
    ///     )
    ///     .await;
    ///
    /// assert_eq!(result.value("good"), Some(&1));
    /// assert!(result.error("bad").is_some());
    /// # }
    /// ```
    pub async fn resolve_batch<I, K, F, Fut>(&self, keys: I, mut fetcher_factory: F, options: &ResolveOptions) -> BatchResult<T>
    where
        I: IntoIterator<Item = K>,
        K: Into<String>,
        F: FnMut(&str) -> Fut,
        Fut: Future<Output = Result<T, OriginError>> + Send + 'static,
    {
        let mut keys: Vec<String> = keys.into_iter().map(Into::into).collect();
        keys.sort_unstable();
        keys.dedup();

        let mut outcomes = BTreeMap::new();

        if self.is_closed() {
            for key in keys {
                let error = ResolveError::closed(&key);
                outcomes.insert(key, Err(error));
            }
            return BatchResult { outcomes };
        }

        let inner = self.inner();
        let generations: Vec<u64> = keys.iter().map(|key| inner.generation(key)).collect();
        let lookups = join_all(keys.iter().map(|key| inner.lookup(key, options, CacheOperation::Batch))).await;

        let mut needs_origin = Vec::new();
        for ((key, generation), lookup) in keys.into_iter().zip(generations).zip(lookups) {
            match lookup {
                Lookup::Settled(outcome) => {
                    outcomes.insert(key, outcome.map(Resolution::into_value));
                }
                Lookup::NeedsOrigin(fallback) => {
                    let work = {
                        let inner = Arc::clone(inner);
                        let fetch = fetcher_factory(&key);
                        let key = key.clone();
                        let options = options.clone();
                        async move {
                            inner
                                .fetch(&key, generation, fetch, fallback, &options, CacheOperation::Batch)
                                .await
                        }
                    };
                    needs_origin.push((key, generation, work));
                }
            }
        }

        let fetches = needs_origin.into_iter().map(|(key, generation, work)| async move {
            let outcome = inner.coalesce(&key, generation, work, CacheOperation::Batch).await;
            (key, outcome)
        });

        let settled: Vec<_> = match options.fetch_limit() {
            Some(limit) => stream::iter(fetches).buffer_unordered(limit.get()).collect().await,
            None => join_all(fetches).await,
        };

        for (key, outcome) in settled {
            outcomes.insert(key, outcome.map(Resolution::into_value));
        }

        BatchResult { outcomes }
    }
}
