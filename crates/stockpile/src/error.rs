// Copyright (c) Microsoft Corporation.
// Licensed under the MIT License.

//! Errors reported by cache operations.

use std::{error::Error, sync::Arc};

use stockpile_tier::StoreError;
use uniflight::LeaderPanicked;

use crate::origin::{OriginError, OriginErrorKind};

/// Why a cache operation failed.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum FailureKind {
    /// The origin failed and no fallback value could be served.
    Origin(OriginErrorKind),
    /// A value could not be serialized for storage.
    Serialization,
    /// A store rejected a write or removal requested directly by the caller.
    Store,
    /// The cache has been closed.
    Closed,
    /// The resolution this call joined panicked before producing a value.
    Panicked,
}

/// An error from a cache operation.
///
/// Resolutions only fail once every fallback is exhausted, so the cause is almost always the
/// origin's own error. The error is cheap to clone so coalesced callers can share it.
///
/// # Examples
///
/// ```
/// use stockpile::{FailureKind, OriginError, OriginErrorKind, ResolveOptions, Stockpile};
/// use tick::Clock;
/// # #[tokio::main(flavor = "current_thread")]
/// # async fn main() {
///
/// let cache = Stockpile::builder::<u32>(Clock::new_frozen()).memory().build();
///
/// let error = cache
///     .resolve("missing", || async { Err(OriginError::permanent("not found")) }, &ResolveOptions::default())
///     .await
///     .unwrap_err();
///
/// assert_eq!(error.key(), "missing");
/// assert_eq!(error.kind(), FailureKind::Origin(OriginErrorKind::Permanent));
/// assert_eq!(error.origin_error().map(OriginError::message), Some("not found"));
/// # }
/// ```
#[derive(Clone, Debug, thiserror::Error)]
#[error("failed to resolve `{key}`: {message}")]
pub struct ResolveError {
    key: String,
    kind: FailureKind,
    message: String,
    #[source]
    source: Option<Arc<dyn Error + Send + Sync + 'static>>,
}

impl ResolveError {
    pub(crate) fn origin(key: &str, error: OriginError) -> Self {
        Self {
            key: key.to_owned(),
            kind: FailureKind::Origin(error.kind()),
            message: error.to_string(),
            source: Some(Arc::new(error)),
        }
    }

    pub(crate) fn serialization(key: &str, error: serde_json::Error) -> Self {
        Self {
            key: key.to_owned(),
            kind: FailureKind::Serialization,
            message: format!("value could not be serialized: {error}"),
            source: Some(Arc::new(error)),
        }
    }

    pub(crate) fn store(key: &str, error: StoreError) -> Self {
        Self {
            key: key.to_owned(),
            kind: FailureKind::Store,
            message: error.to_string(),
            source: Some(Arc::new(error)),
        }
    }

    pub(crate) fn panicked(key: &str, error: LeaderPanicked) -> Self {
        Self {
            key: key.to_owned(),
            kind: FailureKind::Panicked,
            message: error.to_string(),
            source: Some(Arc::new(error)),
        }
    }

    pub(crate) fn closed(key: &str) -> Self {
        Self {
            key: key.to_owned(),
            kind: FailureKind::Closed,
            message: "cache is closed".to_owned(),
            source: None,
        }
    }

    /// Returns the key the operation was for.
    #[must_use]
    pub fn key(&self) -> &str {
        &self.key
    }

    /// Returns the failure classification.
    #[must_use]
    pub fn kind(&self) -> FailureKind {
        self.kind
    }

    /// Returns `true` when the origin refused the request because of rate limiting.
    #[must_use]
    pub fn is_rate_limited(&self) -> bool {
        matches!(self.kind, FailureKind::Origin(OriginErrorKind::RateLimited { .. }))
    }

    /// Returns the origin error that caused this failure, if any.
    #[must_use]
    pub fn origin_error(&self) -> Option<&OriginError> {
        self.source.as_deref()?.downcast_ref::<OriginError>()
    }
}

/// An error from loading [`ResolveOptions`](crate::ResolveOptions) out of a configuration document.
#[derive(Debug, thiserror::Error)]
#[non_exhaustive]
pub enum ConfigError {
    /// The document is malformed, has an unknown option or a value of the wrong type.
    #[error("invalid resolve options: {0}")]
    Invalid(#[from] serde_json::Error),
}
