// Copyright (c) Microsoft Corporation.
// Licensed under the MIT License.

//! Structured events for every tier decision.
//!
//! Events are emitted through `tracing` and, with the `metrics` feature, counted with an
//! OpenTelemetry counter. Both carry the cache name, the operation and the activity.

use std::sync::Arc;

#[cfg(any(feature = "metrics", test))]
use opentelemetry::{
    KeyValue,
    metrics::{Counter, Meter},
};

pub(crate) mod attributes;
#[cfg(any(feature = "metrics", test))]
pub(crate) mod metrics;
#[cfg(test)]
pub(crate) mod testing;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum CacheOperation {
    Resolve,
    Batch,
    Invalidate,
    Preload,
    Flush,
}

impl CacheOperation {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Resolve => "cache.resolve",
            Self::Batch => "cache.batch",
            Self::Invalidate => "cache.invalidate",
            Self::Preload => "cache.preload",
            Self::Flush => "cache.flush",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum CacheActivity {
    Hit,
    Expired,
    Miss,
    Backfill,
    SoftHit,
    Fetched,
    Stale,
    RateLimited,
    Invalidated,
    Preloaded,
    Coalesced,
    Superseded,
    Flushed,
    StoreError,
    Error,
}

impl CacheActivity {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Hit => "cache.hit",
            Self::Expired => "cache.expired",
            Self::Miss => "cache.miss",
            Self::Backfill => "cache.backfill",
            Self::SoftHit => "cache.soft_hit",
            Self::Fetched => "cache.fetched",
            Self::Stale => "cache.stale",
            Self::RateLimited => "cache.rate_limited",
            Self::Invalidated => "cache.invalidated",
            Self::Preloaded => "cache.preloaded",
            Self::Coalesced => "cache.coalesced",
            Self::Superseded => "cache.superseded",
            Self::Flushed => "cache.flushed",
            Self::StoreError => "cache.store_error",
            Self::Error => "cache.error",
        }
    }

    pub fn severity(self) -> Severity {
        match self {
            Self::Hit | Self::Miss | Self::Backfill | Self::Coalesced | Self::Flushed => Severity::Debug,
            Self::Expired | Self::SoftHit | Self::Fetched | Self::Invalidated | Self::Preloaded | Self::Superseded => {
                Severity::Info
            }
            Self::Stale | Self::RateLimited | Self::StoreError => Severity::Warn,
            Self::Error => Severity::Error,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Severity {
    Debug,
    Info,
    Warn,
    Error,
}

/// Records cache events for one cache instance.
#[derive(Clone, Debug)]
pub(crate) struct CacheTelemetry {
    name: Arc<str>,
    logging_enabled: bool,
    #[cfg(any(feature = "metrics", test))]
    event_counter: Option<Counter<u64>>,
}

impl CacheTelemetry {
    pub fn new(name: &str, logging_enabled: bool) -> Self {
        Self {
            name: Arc::from(name),
            logging_enabled,
            #[cfg(any(feature = "metrics", test))]
            event_counter: None,
        }
    }

    #[cfg(any(feature = "metrics", test))]
    #[must_use]
    pub fn with_meter(mut self, meter: &Meter) -> Self {
        self.event_counter = Some(metrics::create_event_counter(meter));
        self
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub(crate) fn record(&self, operation: CacheOperation, activity: CacheActivity, key: &str) {
        #[cfg(any(feature = "metrics", test))]
        if let Some(counter) = &self.event_counter {
            counter.add(
                1,
                &[
                    KeyValue::new(attributes::CACHE_NAME, self.name.to_string()),
                    KeyValue::new(attributes::CACHE_OPERATION_NAME, operation.as_str()),
                    KeyValue::new(attributes::CACHE_ACTIVITY_NAME, activity.as_str()),
                ],
            );
        }

        if self.logging_enabled {
            Self::emit(&self.name, operation, activity, key);
        }
    }

    fn emit(cache_name: &str, operation: CacheOperation, activity: CacheActivity, key: &str) {
        let op = operation.as_str();
        let ev = activity.as_str();

        // Tracing levels must be constant, so the macro picks the level per arm.
        // Field names must match the constants in attributes.rs.
        macro_rules! emit_event {
            ($level:ident) => {
                tracing::$level!(
                    cache.name = cache_name,
                    cache.operation = op,
                    cache.activity = ev,
                    cache.key = key,
                    "cache.event"
                )
            };
        }

        match activity.severity() {
            Severity::Debug => emit_event!(debug),
            Severity::Info => emit_event!(info),
            Severity::Warn => emit_event!(warn),
            Severity::Error => emit_event!(error),
        }
    }
}
