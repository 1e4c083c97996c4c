// ⚠️ Error types - typed failures for merge, undo and persistence
//
// Detection and resolution never fail for well-typed input, so only the
// mutating paths (merge, undo) and the persistence layer carry error enums.

use thiserror::Error;

/// Input that could not be parsed into one of the closed value sets.
#[derive(Debug, Error, PartialEq)]
pub enum ValidationError {
    #[error("Unknown entity type: {0}")]
    UnknownEntityType(String),

    #[error("Unknown entity status: {0}")]
    UnknownStatus(String),

    #[error("Unknown merge strategy: {0}")]
    UnknownStrategy(String),

    #[error("Unknown redirect status: {0}")]
    UnknownRedirectStatus(String),
}

/// Failures raised by the persistence collaborator.
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("Entity not found: {0}")]
    NotFound(String),

    /// The source already has an active redirect (checked inside the merge transaction)
    #[error("Entity {0} already has an active redirect")]
    AlreadyRedirected(String),

    /// The target's redirect chain reaches the source (checked inside the merge transaction)
    #[error("Redirect {from_id} -> {to_id} would close a cycle")]
    Cycle { from_id: String, to_id: String },

    /// Merge source or target was archived after the merge read it
    #[error("Entity {0} is archived")]
    Archived(String),

    /// Content blocks changed between the merge's read and its commit
    #[error("Content of {0} changed during the merge")]
    Conflict(String),

    #[error("Database error: {0}")]
    Sqlite(#[from] rusqlite::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("Corrupt record: {0}")]
    Corrupt(String),

    #[error("Store lock poisoned")]
    Poisoned,
}

impl From<ValidationError> for StoreError {
    fn from(err: ValidationError) -> Self {
        StoreError::Corrupt(err.to_string())
    }
}

/// Expected, recoverable merge failures. Retrying without changing the
/// inputs always fails again.
#[derive(Debug, Error)]
pub enum MergeError {
    #[error("Merging {source_id} into {target_id} would create a redirect cycle")]
    Cycle { source_id: String, target_id: String },

    #[error("Entity not found: {id}")]
    NotFound { id: String },

    #[error("Entity {source_id} is already merged into {target_id}")]
    AlreadyMerged { source_id: String, target_id: String },

    #[error("Entity {id} is archived")]
    Archived { id: String },

    #[error("Cannot merge a {source_type} into a {target_type}")]
    TypeMismatch {
        source_type: String,
        target_type: String,
    },

    #[error(transparent)]
    Store(StoreError),
}

impl MergeError {
    /// Short machine-readable code, used by the admin surfaces
    pub fn code(&self) -> &'static str {
        match self {
            MergeError::Cycle { .. } => "cycle",
            MergeError::NotFound { .. } => "not_found",
            MergeError::AlreadyMerged { .. } => "already_merged",
            MergeError::Archived { .. } => "archived",
            MergeError::TypeMismatch { .. } => "type_mismatch",
            MergeError::Store(_) => "store",
        }
    }
}

impl From<StoreError> for MergeError {
    fn from(err: StoreError) -> Self {
        match err {
            StoreError::NotFound(id) => MergeError::NotFound { id },
            StoreError::Cycle { from_id, to_id } => MergeError::Cycle {
                source_id: from_id,
                target_id: to_id,
            },
            StoreError::Archived(id) => MergeError::Archived { id },
            other => MergeError::Store(other),
        }
    }
}

pub type StoreResult<T> = std::result::Result<T, StoreError>;
