// Copyright (c) Microsoft Corporation.
// Licensed under the MIT License.

//! Per-call resolution options.

use std::{num::NonZeroUsize, time::Duration};

use serde::{Deserialize, Serialize};

use crate::error::ConfigError;

const DEFAULT_LOCAL_TTL: Duration = Duration::from_secs(5 * 60);
const DEFAULT_REMOTE_TTL: Duration = Duration::from_secs(30 * 60);

/// Options controlling how a key is resolved through the tiers.
///
/// | option | effect | default |
/// |---|---|---|
/// | [`local_ttl`](Self::local_ttl) | max age before a local entry is stale | 5 min |
/// | [`remote_ttl`](Self::remote_ttl) | max age before a remote entry is stale | 30 min |
/// | [`enable_local_cache`](Self::enable_local_cache) | use the local tier | `true` |
/// | [`enable_remote_cache`](Self::enable_remote_cache) | use the remote tier | `true` |
/// | [`serve_stale_on_permanent_error`](Self::serve_stale_on_permanent_error) | mask permanent origin errors with stale data | `false` |
/// | [`max_concurrent_fetches`](Self::max_concurrent_fetches) | origin fan-out limit for batches | unbounded |
///
/// The TTLs are stamped onto entries when they are written; freshness checks use the TTL stored
/// with each entry.
///
/// Options can also be loaded from JSON with [`from_json`](Self::from_json). TTLs are given in
/// milliseconds, `null` marks a tier as evergreen, and unknown options are rejected:
///
/// ```
/// use std::time::Duration;
///
/// use stockpile::ResolveOptions;
///
/// let options = ResolveOptions::from_json(r#"{ "localTTL": 900000, "remoteTTL": null }"#)?;
/// assert_eq!(options.local_freshness(), Some(Duration::from_secs(900)));
/// assert_eq!(options.remote_freshness(), None);
///
/// assert!(ResolveOptions::from_json(r#"{ "localTtl": 1 }"#).is_err());
/// # Ok::<(), stockpile::ConfigError>(())
/// ```
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields, rename_all = "camelCase")]
pub struct ResolveOptions {
    #[serde(rename = "localTTL", with = "ttl_millis")]
    local_ttl: Option<Duration>,
    #[serde(rename = "remoteTTL", with = "ttl_millis")]
    remote_ttl: Option<Duration>,
    enable_local_cache: bool,
    enable_remote_cache: bool,
    serve_stale_on_permanent_error: bool,
    max_concurrent_fetches: Option<NonZeroUsize>,
}

impl Default for ResolveOptions {
    fn default() -> Self {
        Self {
            local_ttl: Some(DEFAULT_LOCAL_TTL),
            remote_ttl: Some(DEFAULT_REMOTE_TTL),
            enable_local_cache: true,
            enable_remote_cache: true,
            serve_stale_on_permanent_error: false,
            max_concurrent_fetches: None,
        }
    }
}

impl ResolveOptions {
    /// Creates options with the default settings.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Parses options from a JSON document.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::Invalid`] for malformed JSON, unknown options, values of the wrong
    /// type, and a zero `maxConcurrentFetches`.
    pub fn from_json(json: &str) -> Result<Self, ConfigError> {
        Ok(serde_json::from_str(json)?)
    }

    /// Sets the max age of local entries written by this call.
    #[must_use]
    pub fn local_ttl(mut self, ttl: Duration) -> Self {
        self.local_ttl = Some(ttl);
        self
    }

    /// Sets the max age of remote entries written by this call.
    #[must_use]
    pub fn remote_ttl(mut self, ttl: Duration) -> Self {
        self.remote_ttl = Some(ttl);
        self
    }

    /// Writes local entries without a TTL so they never go stale.
    ///
    /// Suited to slowly-changing reference data. Such entries are only refreshed after an
    /// explicit invalidation.
    #[must_use]
    pub fn evergreen_local(mut self) -> Self {
        self.local_ttl = None;
        self
    }

    /// Writes remote entries without a TTL so they never go stale.
    #[must_use]
    pub fn evergreen_remote(mut self) -> Self {
        self.remote_ttl = None;
        self
    }

    /// Enables or bypasses the local tier.
    #[must_use]
    pub fn enable_local_cache(mut self, enabled: bool) -> Self {
        self.enable_local_cache = enabled;
        self
    }

    /// Enables or bypasses the remote tier.
    #[must_use]
    pub fn enable_remote_cache(mut self, enabled: bool) -> Self {
        self.enable_remote_cache = enabled;
        self
    }

    /// Serves stale data when the origin reports a permanent error.
    ///
    /// Off by default: masking a permanent error such as "resource deleted" can mislead.
    #[must_use]
    pub fn serve_stale_on_permanent_error(mut self, enabled: bool) -> Self {
        self.serve_stale_on_permanent_error = enabled;
        self
    }

    /// Limits how many origin calls a batch runs at once.
    #[must_use]
    pub fn max_concurrent_fetches(mut self, limit: NonZeroUsize) -> Self {
        self.max_concurrent_fetches = Some(limit);
        self
    }

    /// Returns the local TTL, or `None` for evergreen local entries.
    #[must_use]
    pub fn local_freshness(&self) -> Option<Duration> {
        self.local_ttl
    }

    /// Returns the remote TTL, or `None` for evergreen remote entries.
    #[must_use]
    pub fn remote_freshness(&self) -> Option<Duration> {
        self.remote_ttl
    }

    /// Returns `true` when the local tier is used.
    #[must_use]
    pub fn local_enabled(&self) -> bool {
        self.enable_local_cache
    }

    /// Returns `true` when the remote tier is used.
    #[must_use]
    pub fn remote_enabled(&self) -> bool {
        self.enable_remote_cache
    }

    /// Returns `true` when permanent origin errors are masked with stale data.
    #[must_use]
    pub fn serves_stale_on_permanent_error(&self) -> bool {
        self.serve_stale_on_permanent_error
    }

    /// Returns the batch origin fan-out limit, if any.
    #[must_use]
    pub fn fetch_limit(&self) -> Option<NonZeroUsize> {
        self.max_concurrent_fetches
    }
}

mod ttl_millis {
    use std::time::Duration;

    use serde::{Deserialize, Deserializer, Serializer};

    #[expect(clippy::ref_option, reason = "signature required by serde's `with` attribute")]
    pub(super) fn serialize<S: Serializer>(ttl: &Option<Duration>, serializer: S) -> Result<S::Ok, S::Error> {
        match ttl {
            Some(ttl) => serializer.serialize_some(&u64::try_from(ttl.as_millis()).unwrap_or(u64::MAX)),
            None => serializer.serialize_none(),
        }
    }

    pub(super) fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Option<Duration>, D::Error> {
        Ok(Option::<u64>::deserialize(deserializer)?.map(Duration::from_millis))
    }
}
