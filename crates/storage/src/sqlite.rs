use std::path::Path;

use rusqlite::{Connection, OptionalExtension};

use opsdesk_core::Record;

use crate::error::StorageError;
use crate::traits::{CachedSnapshot, SnapshotCache};

/// Convert Vec<u8> to fixed-size array with proper error handling.
fn to_array<const N: usize>(v: Vec<u8>, label: &str) -> Result<[u8; N], StorageError> {
    v.try_into()
        .map_err(|_| StorageError::Serialization(format!("invalid {label} length")))
}

pub struct SqliteCache {
    conn: Connection,
}

impl SqliteCache {
    pub fn open(path: impl AsRef<Path>) -> Result<Self, StorageError> {
        let conn = Connection::open(path)?;
        crate::schema::init_schema(&conn)?;
        Ok(Self { conn })
    }

    pub fn open_in_memory() -> Result<Self, StorageError> {
        let conn = Connection::open_in_memory()?;
        crate::schema::init_schema(&conn)?;
        Ok(Self { conn })
    }

    pub fn conn(&self) -> &Connection {
        &self.conn
    }
}

impl SnapshotCache for SqliteCache {
    fn store_snapshot(
        &mut self,
        collection: &str,
        records: &[Record],
        fetched_at_ms: i64,
    ) -> Result<(), StorageError> {
        let payload =
            rmp_serde::to_vec(records).map_err(|e| StorageError::Serialization(e.to_string()))?;
        let checksum = blake3::hash(&payload);
        self.conn.execute(
            "INSERT INTO snapshot_cache (collection, payload, checksum, record_count, fetched_at)
             VALUES (?1, ?2, ?3, ?4, ?5)
             ON CONFLICT(collection) DO UPDATE SET
                payload = excluded.payload,
                checksum = excluded.checksum,
                record_count = excluded.record_count,
                fetched_at = excluded.fetched_at,
                stored_at = CAST(unixepoch('now','subsec') * 1000 AS INTEGER)",
            rusqlite::params![
                collection,
                payload,
                checksum.as_bytes().as_slice(),
                records.len() as i64,
                fetched_at_ms,
            ],
        )?;
        Ok(())
    }

    fn load_snapshot(&self, collection: &str) -> Result<Option<CachedSnapshot>, StorageError> {
        let row = self
            .conn
            .query_row(
                "SELECT payload, checksum, fetched_at FROM snapshot_cache WHERE collection = ?1",
                rusqlite::params![collection],
                |row| {
                    Ok((
                        row.get::<_, Vec<u8>>(0)?,
                        row.get::<_, Vec<u8>>(1)?,
                        row.get::<_, i64>(2)?,
                    ))
                },
            )
            .optional()?;

        let Some((payload, checksum, fetched_at_ms)) = row else {
            return Ok(None);
        };

        let expected = to_array::<32>(checksum, "checksum")?;
        if blake3::hash(&payload).as_bytes() != &expected {
            return Err(StorageError::ChecksumMismatch(collection.to_string()));
        }
        let records: Vec<Record> = rmp_serde::from_slice(&payload)
            .map_err(|e| StorageError::Serialization(e.to_string()))?;

        Ok(Some(CachedSnapshot {
            collection: collection.to_string(),
            records,
            fetched_at_ms,
        }))
    }

    fn clear_snapshot(&mut self, collection: &str) -> Result<(), StorageError> {
        self.conn.execute(
            "DELETE FROM snapshot_cache WHERE collection = ?1",
            rusqlite::params![collection],
        )?;
        Ok(())
    }
}
