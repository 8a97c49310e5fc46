use std::sync::Arc;
use std::time::{SystemTime, UNIX_EPOCH};

use opsdesk_core::{EntityId, Record};
use opsdesk_storage::CachedSnapshot;

/// Wall-clock milliseconds since the Unix epoch; zero if the clock is before it.
pub fn now_ms() -> i64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_millis() as i64)
        .unwrap_or(0)
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SnapshotOrigin {
    /// Nothing fetched yet.
    Empty,
    /// Read from the local cache; must be superseded by a fetch.
    Cache,
    Remote,
}

/// Last confirmed copy of a collection. Shared immutably; a refresh swaps the
/// whole value instead of editing records.
#[derive(Debug, Clone)]
pub struct Snapshot {
    records: Arc<[Record]>,
    origin: SnapshotOrigin,
    fetched_at_ms: i64,
}

impl Default for Snapshot {
    fn default() -> Self {
        Self::empty()
    }
}

impl Snapshot {
    pub fn empty() -> Self {
        Self {
            records: Arc::from(Vec::new()),
            origin: SnapshotOrigin::Empty,
            fetched_at_ms: 0,
        }
    }

    pub fn from_remote(records: Vec<Record>, fetched_at_ms: i64) -> Self {
        Self {
            records: Arc::from(records),
            origin: SnapshotOrigin::Remote,
            fetched_at_ms,
        }
    }

    pub fn from_cache(cached: CachedSnapshot) -> Self {
        Self {
            records: Arc::from(cached.records),
            origin: SnapshotOrigin::Cache,
            fetched_at_ms: cached.fetched_at_ms,
        }
    }

    pub fn records(&self) -> &[Record] {
        &self.records
    }

    pub fn origin(&self) -> SnapshotOrigin {
        self.origin
    }

    pub fn fetched_at_ms(&self) -> i64 {
        self.fetched_at_ms
    }

    pub fn is_provisional(&self) -> bool {
        self.origin != SnapshotOrigin::Remote
    }

    pub fn get(&self, id: &EntityId) -> Option<&Record> {
        self.records.iter().find(|r| &r.id == id)
    }

    pub fn contains(&self, id: &EntityId) -> bool {
        self.get(id).is_some()
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }
}
