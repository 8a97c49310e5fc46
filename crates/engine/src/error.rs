use opsdesk_core::CoreError;
use opsdesk_remote::RemoteError;
use opsdesk_storage::StorageError;
use thiserror::Error;

use crate::collection::CollectionKind;
use crate::commit::{CommitError, CommitPhase};
use crate::staging::StagingKind;

#[derive(Debug, Error)]
pub enum EngineError {
    #[error("core error: {0}")]
    Core(#[from] CoreError),

    #[error("storage error: {0}")]
    Storage(#[from] StorageError),

    #[error("remote error: {0}")]
    Remote(#[from] RemoteError),

    #[error("commit error: {0}")]
    Commit(#[from] CommitError),

    #[error("{collection} staging is locked while its commit is {phase}")]
    StagingLocked {
        collection: CollectionKind,
        phase: CommitPhase,
    },

    #[error("{collection} does not accept {attempted} edits")]
    WrongStagingShape {
        collection: CollectionKind,
        attempted: StagingKind,
    },

    #[error("index {index} out of range for {len} rows")]
    IndexOutOfRange { index: usize, len: usize },

    #[error("catalog order commit already in flight")]
    ReorderInFlight,

    #[error("config error: {0}")]
    Config(String),
}
