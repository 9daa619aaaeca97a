//! Error types for path access.

use thiserror::Error;

/// Errors that can occur while writing through a dotted path.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum PathError {
    /// A segment addressed a container of an incompatible type.
    #[error("cannot traverse {found} at segment {segment:?} of path {path:?}")]
    IncompatibleType {
        /// The full path being resolved.
        path: String,
        /// The segment that failed.
        segment: String,
        /// The type name of the value found at the segment.
        found: &'static str,
    },

    /// A segment applied to an array did not parse as an index.
    #[error("invalid array index {segment:?} in path {path:?}")]
    InvalidIndex {
        /// The full path being resolved.
        path: String,
        /// The segment that failed.
        segment: String,
    },

    /// The path does not exist and creation was not requested.
    #[error("path {path:?} does not exist")]
    NotFound {
        /// The full path being resolved.
        path: String,
    },
}

impl PathError {
    /// Creates an incompatible type error.
    pub fn incompatible(
        path: impl Into<String>,
        segment: impl Into<String>,
        found: &'static str,
    ) -> Self {
        Self::IncompatibleType {
            path: path.into(),
            segment: segment.into(),
            found,
        }
    }

    /// Creates an invalid index error.
    pub fn invalid_index(path: impl Into<String>, segment: impl Into<String>) -> Self {
        Self::InvalidIndex {
            path: path.into(),
            segment: segment.into(),
        }
    }

    /// Creates a not found error.
    pub fn not_found(path: impl Into<String>) -> Self {
        Self::NotFound { path: path.into() }
    }
}
