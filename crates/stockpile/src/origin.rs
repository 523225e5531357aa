// Copyright (c) Microsoft Corporation.
// Licensed under the MIT License.

//! Classified failures reported by origin fetchers.

use std::{error::Error, fmt, sync::Arc, time::Duration};

/// How an origin failure should be treated by the resolver.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum OriginErrorKind {
    /// Network or server-side failure that may succeed on a later attempt.
    ///
    /// The resolver serves stale data when any exists.
    Transient,

    /// The origin asked callers to slow down.
    ///
    /// The resolver stops contacting the origin for this key until `retry_after` has
    /// elapsed and serves the last known good value in the meantime.
    RateLimited {
        /// How long the origin asked callers to wait.
        retry_after: Duration,
    },

    /// Non-retryable failure such as a missing or forbidden resource.
    ///
    /// Propagated to the caller unless stale masking is enabled in the resolve options.
    Permanent,
}

impl fmt::Display for OriginErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Transient => f.write_str("transient"),
            Self::RateLimited { retry_after } => write!(f, "rate limited (retry after {}s)", retry_after.as_secs()),
            Self::Permanent => f.write_str("permanent"),
        }
    }
}

/// An error returned by an origin fetcher.
///
/// # Examples
///
/// ```
/// use std::time::Duration;
///
/// use stockpile::{OriginError, OriginErrorKind};
///
/// let error = OriginError::rate_limited(Duration::from_secs(900), "HTTP 429");
/// assert!(error.is_rate_limited());
/// assert_eq!(error.retry_after(), Some(Duration::from_secs(900)));
///
/// let error = OriginError::transient("connection reset");
/// assert_eq!(error.kind(), OriginErrorKind::Transient);
/// ```
#[derive(Clone, Debug, thiserror::Error)]
#[error("{kind} origin failure: {message}")]
pub struct OriginError {
    kind: OriginErrorKind,
    message: String,
    #[source]
    source: Option<Arc<dyn Error + Send + Sync + 'static>>,
}

impl OriginError {
    /// Creates an error of the given kind.
    pub fn new(kind: OriginErrorKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
            source: None,
        }
    }

    /// Creates a [`Transient`](OriginErrorKind::Transient) error.
    pub fn transient(message: impl Into<String>) -> Self {
        Self::new(OriginErrorKind::Transient, message)
    }

    /// Creates a [`RateLimited`](OriginErrorKind::RateLimited) error carrying the retry-after window.
    pub fn rate_limited(retry_after: Duration, message: impl Into<String>) -> Self {
        Self::new(OriginErrorKind::RateLimited { retry_after }, message)
    }

    /// Creates a [`Permanent`](OriginErrorKind::Permanent) error.
    pub fn permanent(message: impl Into<String>) -> Self {
        Self::new(OriginErrorKind::Permanent, message)
    }

    /// Attaches the underlying cause.
    #[must_use]
    pub fn with_source(mut self, source: impl Error + Send + Sync + 'static) -> Self {
        self.source = Some(Arc::new(source));
        self
    }

    /// Returns the failure classification.
    #[must_use]
    pub fn kind(&self) -> OriginErrorKind {
        self.kind
    }

    /// Returns the error message, without the cause chain.
    #[must_use]
    pub fn message(&self) -> &str {
        &self.message
    }

    /// Returns `true` for rate-limit failures.
    #[must_use]
    pub fn is_rate_limited(&self) -> bool {
        matches!(self.kind, OriginErrorKind::RateLimited { .. })
    }

    /// Returns the retry-after window of a rate-limit failure.
    #[must_use]
    pub fn retry_after(&self) -> Option<Duration> {
        match self.kind {
            OriginErrorKind::RateLimited { retry_after } => Some(retry_after),
            _ => None,
        }
    }
}
