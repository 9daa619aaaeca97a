//! Error types for the engine.

use crate::handle::Handle;
use std::io;
use thiserror::Error;

/// Result type for engine operations.
pub type CoreResult<T> = Result<T, EngineError>;

/// Errors that can occur in engine operations.
#[derive(Debug, Error)]
pub enum EngineError {
    /// The same document identity was inserted twice.
    #[error("duplicate document in namespace {handle}")]
    DuplicateDocument {
        /// The namespace that already contains the document.
        handle: Handle,
    },

    /// A unique index rejected a document.
    #[error("duplicate document for index {name:?}")]
    DuplicateForIndex {
        /// Name of the violated index.
        name: String,
    },

    /// An attempt was made to change a document's `_id`.
    #[error("document _id is immutable")]
    ImmutableId,

    /// An upsert carried incompatible `_id`s in query and replacement.
    #[error("query _id and replacement _id must match")]
    MismatchedIds,

    /// The operation requires an existing namespace.
    #[error("missing namespace {handle}")]
    MissingNamespace {
        /// The absent namespace.
        handle: Handle,
    },

    /// An index with the given name does not exist.
    #[error("missing index {name:?}")]
    MissingIndex {
        /// The unknown index name.
        name: String,
    },

    /// The index name is not acceptable for the operation.
    #[error("invalid index name {name:?}")]
    InvalidIndexName {
        /// The rejected name.
        name: String,
    },

    /// The store failed to load or persist a snapshot.
    #[error("store failure: {0}")]
    Store(#[from] StoreError),

    /// The match engine rejected a query.
    #[error("match engine error: {message}")]
    MatchEngine {
        /// Description of the failure.
        message: String,
    },

    /// The update engine rejected an update.
    #[error("update engine error: {message}")]
    UpdateEngine {
        /// Description of the failure.
        message: String,
    },

    /// A dotted path could not be written.
    #[error("path error: {0}")]
    Path(#[from] marrow_bson::PathError),
}

impl EngineError {
    /// Creates a duplicate document error.
    pub fn duplicate_document(handle: Handle) -> Self {
        Self::DuplicateDocument { handle }
    }

    /// Creates a duplicate-for-index error.
    pub fn duplicate_for_index(name: impl Into<String>) -> Self {
        Self::DuplicateForIndex { name: name.into() }
    }

    /// Creates a missing namespace error.
    pub fn missing_namespace(handle: Handle) -> Self {
        Self::MissingNamespace { handle }
    }

    /// Creates a missing index error.
    pub fn missing_index(name: impl Into<String>) -> Self {
        Self::MissingIndex { name: name.into() }
    }

    /// Creates an invalid index name error.
    pub fn invalid_index_name(name: impl Into<String>) -> Self {
        Self::InvalidIndexName { name: name.into() }
    }

    /// Creates a match engine error.
    pub fn match_engine(message: impl Into<String>) -> Self {
        Self::MatchEngine {
            message: message.into(),
        }
    }

    /// Creates an update engine error.
    pub fn update_engine(message: impl Into<String>) -> Self {
        Self::UpdateEngine {
            message: message.into(),
        }
    }
}

/// Errors produced by snapshot stores.
#[derive(Debug, Error)]
pub enum StoreError {
    /// I/O failure while reading or writing a snapshot.
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),

    /// A snapshot could not be encoded or decoded.
    #[error("codec error: {0}")]
    Codec(#[from] serde_json::Error),

    /// The snapshot contents are not usable.
    #[error("invalid snapshot: {message}")]
    InvalidSnapshot {
        /// Description of the problem.
        message: String,
    },
}

impl StoreError {
    /// Creates an invalid snapshot error.
    pub fn invalid_snapshot(message: impl Into<String>) -> Self {
        Self::InvalidSnapshot {
            message: message.into(),
        }
    }
}
