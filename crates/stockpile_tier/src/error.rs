// Copyright (c) Microsoft Corporation.
// Licensed under the MIT License.

//! Error types for store operations.

use std::sync::Arc;

/// An error from a store operation.
///
/// This is an opaque error type that can wrap any underlying error from a store
/// implementation. Use [`std::error::Error::source()`] to access the underlying
/// cause if needed. The error is cheap to clone so it can be shared between
/// callers awaiting the same operation.
///
/// # Example
///
/// ```
/// use stockpile_tier::StoreError;
///
/// let error = StoreError::from_message("connection reset");
/// assert!(error.to_string().contains("connection reset"));
/// ```
#[derive(Debug, Clone, thiserror::Error)]
#[error("store operation failed: {message}")]
pub struct StoreError {
    message: String,
    #[source]
    source: Option<Arc<dyn std::error::Error + Send + Sync + 'static>>,
}

impl StoreError {
    /// Creates a new error from a message.
    pub fn from_message(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            source: None,
        }
    }

    /// Creates a new error wrapping an underlying cause.
    ///
    /// # Examples
    ///
    /// ```
    /// use std::error::Error;
    ///
    /// use stockpile_tier::StoreError;
    ///
    /// let io = std::io::Error::new(std::io::ErrorKind::TimedOut, "timed out");
    /// let error = StoreError::from_source(io);
    /// assert!(error.source().is_some());
    /// ```
    pub fn from_source(source: impl std::error::Error + Send + Sync + 'static) -> Self {
        Self {
            message: source.to_string(),
            source: Some(Arc::new(source)),
        }
    }

    /// Returns the error message, without the cause chain.
    #[must_use]
    pub fn message(&self) -> &str {
        &self.message
    }
}

/// A specialized [`Result`] type for store operations.
pub type Result<T> = std::result::Result<T, StoreError>;
