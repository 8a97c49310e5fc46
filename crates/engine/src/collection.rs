use std::fmt;

use parking_lot::Mutex;

use opsdesk_core::{RecordKey, StagedRecord};

use crate::commit::{CommitError, CommitPhase, PhaseGuard};
use crate::error::EngineError;
use crate::merge::DisplayRow;
use crate::snapshot::Snapshot;
use crate::staging::{StagedEdit, StagingBuffer, StagingKind};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum CollectionKind {
    Orders,
    Catalog,
}

impl CollectionKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Orders => "orders",
            Self::Catalog => "catalog",
        }
    }

    pub fn staging_kind(&self) -> StagingKind {
        match self {
            Self::Orders => StagingKind::Patch,
            Self::Catalog => StagingKind::Replace,
        }
    }
}

impl fmt::Display for CollectionKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

pub(crate) struct CollectionState {
    pub snapshot: Snapshot,
    pub staging: StagingBuffer,
    pub phase: CommitPhase,
}

/// Snapshot, staging buffer and commit phase of one collection, behind one
/// lock that is never held across a remote call.
pub struct Collection {
    kind: CollectionKind,
    state: Mutex<CollectionState>,
}

impl Collection {
    pub fn new(kind: CollectionKind) -> Self {
        Self {
            kind,
            state: Mutex::new(CollectionState {
                snapshot: Snapshot::empty(),
                staging: StagingBuffer::new(kind.staging_kind()),
                phase: CommitPhase::Idle,
            }),
        }
    }

    pub fn kind(&self) -> CollectionKind {
        self.kind
    }

    pub fn phase(&self) -> CommitPhase {
        self.state.lock().phase
    }

    pub fn snapshot(&self) -> Snapshot {
        self.state.lock().snapshot.clone()
    }

    /// Swaps the snapshot wholesale. Staged edits are kept.
    pub(crate) fn install_snapshot(&self, snapshot: Snapshot) {
        let mut state = self.state.lock();
        tracing::debug!(
            collection = %self.kind,
            records = snapshot.len(),
            origin = ?snapshot.origin(),
            staged = state.staging.len(),
            "snapshot replaced"
        );
        state.snapshot = snapshot;
    }

    /// Runs `f` on the staging buffer unless a commit holds it.
    fn with_idle_staging<R>(&self, f: impl FnOnce(&mut StagingBuffer) -> R) -> Result<R, EngineError> {
        let mut state = self.state.lock();
        if state.phase != CommitPhase::Idle {
            return Err(EngineError::StagingLocked {
                collection: self.kind,
                phase: state.phase,
            });
        }
        Ok(f(&mut state.staging))
    }

    pub fn stage(&self, edit: StagedEdit) -> Result<(), EngineError> {
        let kind = self.kind;
        self.with_idle_staging(|staging| staging.stage(edit))?
            .map_err(|edit| EngineError::WrongStagingShape {
                collection: kind,
                attempted: edit.kind(),
            })?;
        tracing::debug!(collection = %kind, "edit staged");
        Ok(())
    }

    pub fn remove_staged(&self, key: &RecordKey) -> Result<bool, EngineError> {
        self.with_idle_staging(|staging| staging.remove(key))
    }

    /// Fails fast with the same error a staging mutation would get.
    pub fn ensure_idle(&self) -> Result<(), EngineError> {
        self.with_idle_staging(|_| ())
    }

    pub fn staging(&self) -> StagingBuffer {
        self.state.lock().staging.clone()
    }

    pub fn staged_record(&self, key: &RecordKey) -> Option<StagedRecord> {
        self.state
            .lock()
            .staging
            .as_replace()
            .and_then(|staging| staging.get(key).cloned())
    }

    pub fn staged_len(&self) -> usize {
        self.state.lock().staging.len()
    }

    pub fn is_dirty(&self) -> bool {
        self.state.lock().staging.is_dirty()
    }

    pub fn view(&self, attachment_field: &str) -> Vec<DisplayRow> {
        let state = self.state.lock();
        state.staging.merge(&state.snapshot, attachment_field)
    }

    pub fn begin_commit(&self) -> Result<PhaseGuard<'_>, CommitError> {
        PhaseGuard::acquire(self.kind, &self.state)
    }
}
