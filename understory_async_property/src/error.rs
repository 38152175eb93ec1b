// Copyright 2025 the Understory Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! Error types.

use std::error::Error;

/// Boxed error produced by a failing asynchronous formula.
pub type BoxError = Box<dyn Error + Send + Sync + 'static>;

/// Why an asynchronous formula did not produce a value.
#[derive(Debug, thiserror::Error)]
pub enum ComputeError {
    /// The formula observed its cancellation token.
    #[error("computation was cancelled")]
    Cancelled,
    /// The formula failed.
    #[error("computation failed: {0}")]
    Failed(#[source] BoxError),
}

impl ComputeError {
    /// Wraps any error as [`ComputeError::Failed`].
    pub fn failed(error: impl Into<BoxError>) -> Self {
        Self::Failed(error.into())
    }

    /// Returns `true` for [`ComputeError::Cancelled`].
    #[must_use]
    pub fn is_cancelled(&self) -> bool {
        matches!(self, Self::Cancelled)
    }
}

/// Errors reported by property stores and facades.
#[derive(Clone, Debug, PartialEq, Eq, thiserror::Error)]
pub enum PropertyError {
    /// A name was already bound to a property of a different kind.
    #[error("property `{name}` is a `{existing}`, not a `{requested}`")]
    KindMismatch {
        /// The property name.
        name: String,
        /// The kind the name is bound to.
        existing: &'static str,
        /// The kind that was requested.
        requested: &'static str,
    },
    /// The facade cannot invalidate the whole object at once.
    #[error("invalidating the whole entity is not supported by this helper")]
    EntityInvalidationUnsupported,
}
