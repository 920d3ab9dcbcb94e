use recordkit_core::{ConfigurationError, CoreError, InstanceId, RecordId};
use recordkit_storage::StorageError;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum EngineError {
    #[error("storage error: {0}")]
    Storage(#[from] StorageError),

    #[error("core error: {0}")]
    Core(#[from] CoreError),

    #[error("configuration error: {0}")]
    Configuration(#[from] ConfigurationError),

    #[error("record not found: {0}")]
    RecordNotFound(RecordId),
}

/// What a commit was trying to write when it failed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CommitTarget {
    /// Partial update of a persisted identity.
    Identity(RecordId),
    /// Insert of a new record held by this entity instance.
    NewRecord(InstanceId),
}

impl std::fmt::Display for CommitTarget {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Identity(id) => write!(f, "record {id}"),
            Self::NewRecord(instance) => write!(f, "new record held by {instance:?}"),
        }
    }
}

#[derive(Debug, Error)]
pub enum PersistenceFailure {
    #[error(transparent)]
    Store(#[from] StorageError),

    #[error(transparent)]
    Configuration(#[from] ConfigurationError),

    #[error("reference `{field}` points at a record that was never inserted")]
    UnresolvedReference { field: String },
}

/// A store write that failed for one identity. The entities involved stay
/// dirty so a later commit retries them.
#[derive(Debug, Error)]
#[error("persisting {target} failed: {failure}")]
pub struct PersistenceError {
    pub target: CommitTarget,
    #[source]
    pub failure: PersistenceFailure,
}
