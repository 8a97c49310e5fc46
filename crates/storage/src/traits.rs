use opsdesk_core::Record;

use crate::error::StorageError;

/// A snapshot as it was last written to the local cache.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CachedSnapshot {
    pub collection: String,
    pub records: Vec<Record>,
    pub fetched_at_ms: i64,
}

/// Client-side accelerator for first paint. Never authoritative.
pub trait SnapshotCache {
    fn store_snapshot(
        &mut self,
        collection: &str,
        records: &[Record],
        fetched_at_ms: i64,
    ) -> Result<(), StorageError>;

    fn load_snapshot(&self, collection: &str) -> Result<Option<CachedSnapshot>, StorageError>;

    fn clear_snapshot(&mut self, collection: &str) -> Result<(), StorageError>;
}
