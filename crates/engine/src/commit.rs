use std::fmt;

use parking_lot::Mutex;
use thiserror::Error;

use opsdesk_core::{CoreError, RecordKey};
use opsdesk_remote::RemoteError;

use crate::collection::{CollectionKind, CollectionState};
use crate::staging::StagingBuffer;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CommitPhase {
    Idle,
    Resolving,
    Transmitting,
    Reconciling,
    Failed,
}

impl CommitPhase {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Idle => "idle",
            Self::Resolving => "resolving",
            Self::Transmitting => "transmitting",
            Self::Reconciling => "reconciling",
            Self::Failed => "failed",
        }
    }
}

impl fmt::Display for CommitPhase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Step at which a commit attempt stopped.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FailedPhase {
    /// Another commit held the collection; nothing was attempted.
    Admission,
    Resolving,
    Transmitting,
    ServerRejection,
}

#[derive(Debug, Error)]
pub enum CommitError {
    #[error("{collection} commit already in flight ({phase})")]
    InFlight {
        collection: CollectionKind,
        phase: CommitPhase,
    },

    #[error("encoding {collection} batch failed: {source}")]
    Encode {
        collection: CollectionKind,
        source: CoreError,
    },

    #[error("transmitting {collection} batch failed: {source}")]
    Transmit {
        collection: CollectionKind,
        source: RemoteError,
    },

    #[error("server rejected {collection} batch: {message}")]
    Rejected {
        collection: CollectionKind,
        message: String,
    },
}

impl CommitError {
    pub(crate) fn from_remote(collection: CollectionKind, err: RemoteError) -> Self {
        match err {
            RemoteError::Rejected { message, .. } => Self::Rejected { collection, message },
            source => Self::Transmit { collection, source },
        }
    }

    pub fn failed_phase(&self) -> FailedPhase {
        match self {
            Self::InFlight { .. } => FailedPhase::Admission,
            Self::Encode { .. } => FailedPhase::Resolving,
            Self::Transmit { .. } => FailedPhase::Transmitting,
            Self::Rejected { .. } => FailedPhase::ServerRejection,
        }
    }

    pub fn collection(&self) -> CollectionKind {
        match self {
            Self::InFlight { collection, .. }
            | Self::Encode { collection, .. }
            | Self::Transmit { collection, .. }
            | Self::Rejected { collection, .. } => *collection,
        }
    }

    /// Staging is untouched by every failure, so a retry is always safe; it
    /// re-runs uploads for records that still hold local attachments.
    pub fn is_retryable(&self) -> bool {
        !matches!(self, Self::Encode { .. })
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UploadFailure {
    pub key: RecordKey,
    pub file_name: String,
    pub error: String,
}

/// Result of a commit that reached the server and was accepted, or found
/// nothing to send.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CommitReport {
    pub collection: CollectionKind,
    /// Records in the transmitted batch.
    pub committed: usize,
    pub uploaded: usize,
    /// Attachments dropped from the batch because their upload failed.
    pub upload_failures: Vec<UploadFailure>,
    /// Set when the post-commit refetch failed; the commit itself stands.
    pub refresh_error: Option<String>,
}

impl CommitReport {
    pub(crate) fn empty(collection: CollectionKind) -> Self {
        Self {
            collection,
            committed: 0,
            uploaded: 0,
            upload_failures: Vec::new(),
            refresh_error: None,
        }
    }

    pub fn nothing_to_commit(&self) -> bool {
        self.committed == 0
    }

    pub fn is_degraded(&self) -> bool {
        !self.upload_failures.is_empty()
    }
}

/// Exclusive hold on a collection's commit pipeline. Dropping it returns the
/// collection to `Idle`, whichever way the commit ended.
pub struct PhaseGuard<'a> {
    kind: CollectionKind,
    state: &'a Mutex<CollectionState>,
}

impl<'a> PhaseGuard<'a> {
    /// Moves `Idle → Resolving`, or reports the phase of the commit in flight.
    pub(crate) fn acquire(
        kind: CollectionKind,
        state: &'a Mutex<CollectionState>,
    ) -> Result<Self, CommitError> {
        let mut guard = state.lock();
        if guard.phase != CommitPhase::Idle {
            return Err(CommitError::InFlight {
                collection: kind,
                phase: guard.phase,
            });
        }
        guard.phase = CommitPhase::Resolving;
        tracing::info!(collection = %kind, phase = %CommitPhase::Resolving, "commit started");
        Ok(Self { kind, state })
    }

    pub fn advance(&self, phase: CommitPhase) {
        self.state.lock().phase = phase;
        tracing::info!(collection = %self.kind, %phase, "commit phase");
    }

    /// Copy of the staged edits; the live buffer stays put until success.
    pub fn staged(&self) -> StagingBuffer {
        self.state.lock().staging.clone()
    }

    pub(crate) fn clear_staging(&self) {
        self.state.lock().staging.clear();
    }
}

impl Drop for PhaseGuard<'_> {
    fn drop(&mut self) {
        self.state.lock().phase = CommitPhase::Idle;
    }
}
