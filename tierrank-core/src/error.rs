//! Error types for the tiering engine.

use thiserror::Error;

/// Errors returned by engine operations.
///
/// Scoring, confidence and stability are total over valid records and never
/// produce one of these.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum RankError {
    /// A settings value was rejected. Nothing was written.
    #[error("invalid value for {field}: {reason}")]
    Validation {
        /// Setting or field name
        field: String,
        /// Why the value was rejected
        reason: String,
    },

    /// A vote named an unknown, excluded or identical pair. Nothing was written.
    #[error("invalid pair ({winner}, {loser}): {reason}")]
    InvalidPair {
        /// Winner as given by the caller
        winner: String,
        /// Loser as given by the caller
        loser: String,
        /// Why the pair was rejected
        reason: String,
    },

    /// The item has no record.
    #[error("unknown item: {id}")]
    UnknownItem {
        /// Item identifier
        id: String,
    },

    /// A snapshot could not be parsed or lacks a required field.
    /// The previous state is untouched.
    #[error("snapshot format error: {message}")]
    SnapshotFormat {
        /// Parser or validation message
        message: String,
    },
}

impl RankError {
    /// Create a validation error.
    #[must_use]
    pub fn validation(field: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::Validation {
            field: field.into(),
            reason: reason.into(),
        }
    }

    /// Create an invalid pair error.
    #[must_use]
    pub fn invalid_pair(
        winner: impl Into<String>,
        loser: impl Into<String>,
        reason: impl Into<String>,
    ) -> Self {
        Self::InvalidPair {
            winner: winner.into(),
            loser: loser.into(),
            reason: reason.into(),
        }
    }

    /// Create an unknown item error.
    #[must_use]
    pub fn unknown_item(id: impl Into<String>) -> Self {
        Self::UnknownItem { id: id.into() }
    }

    /// Create a snapshot format error.
    #[must_use]
    pub fn snapshot_format(message: impl Into<String>) -> Self {
        Self::SnapshotFormat {
            message: message.into(),
        }
    }
}

impl From<serde_json::Error> for RankError {
    fn from(e: serde_json::Error) -> Self {
        Self::snapshot_format(e.to_string())
    }
}

/// Result type for engine operations.
pub type RankResult<T> = Result<T, RankError>;
