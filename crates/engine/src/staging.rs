use std::fmt;

use indexmap::IndexMap;
use serde_json::Value;

use opsdesk_core::{record::fields_to_json, EntityId, FieldValue, Fields, RecordKey, StagedRecord};

use crate::merge::{self, DisplayRow};
use crate::snapshot::Snapshot;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StagingKind {
    /// Sparse field edits merged per field.
    Patch,
    /// Full records that supersede whatever was staged before.
    Replace,
}

impl StagingKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Patch => "patch",
            Self::Replace => "replace",
        }
    }
}

impl fmt::Display for StagingKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A mutation headed for a staging buffer.
#[derive(Debug, Clone)]
pub enum StagedEdit {
    Patch { id: EntityId, fields: Fields },
    Replace(StagedRecord),
}

impl StagedEdit {
    pub fn kind(&self) -> StagingKind {
        match self {
            Self::Patch { .. } => StagingKind::Patch,
            Self::Replace(_) => StagingKind::Replace,
        }
    }
}

/// Pending field edits keyed by entity id, in first-edit order.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PatchStaging {
    patches: IndexMap<EntityId, Fields>,
}

impl PatchStaging {
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets one field; later writes to the same field win.
    pub fn record(&mut self, id: EntityId, field_key: impl Into<String>, value: FieldValue) {
        self.patches
            .entry(id)
            .or_default()
            .insert(field_key.into(), value);
    }

    pub fn record_many(&mut self, id: EntityId, fields: impl IntoIterator<Item = (String, FieldValue)>) {
        let patch = self.patches.entry(id).or_default();
        for (key, value) in fields {
            patch.insert(key, value);
        }
    }

    pub fn get(&self, id: &EntityId) -> Option<&Fields> {
        self.patches.get(id)
    }

    pub fn remove(&mut self, id: &EntityId) -> Option<Fields> {
        self.patches.shift_remove(id)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&EntityId, &Fields)> {
        self.patches.iter()
    }

    pub fn len(&self) -> usize {
        self.patches.len()
    }

    pub fn is_empty(&self) -> bool {
        self.patches.is_empty()
    }

    pub fn clear(&mut self) {
        self.patches.clear();
    }

    /// One `{<id_field>: id, ...patch}` object per staged entity.
    pub fn build_batch(&self, id_field: &str) -> Vec<Value> {
        self.patches
            .iter()
            .map(|(id, patch)| {
                let mut map = fields_to_json(patch);
                map.insert(id_field.to_string(), Value::String(id.to_string()));
                Value::Object(map)
            })
            .collect()
    }
}

/// Full replacement records keyed by id or temp id, in staging order.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ReplaceStaging {
    records: IndexMap<RecordKey, StagedRecord>,
}

impl ReplaceStaging {
    pub fn new() -> Self {
        Self::default()
    }

    /// Drops any record staged under the same key and appends `record`.
    pub fn replace(&mut self, record: StagedRecord) {
        self.records.shift_remove(&record.key);
        self.records.insert(record.key.clone(), record);
    }

    pub fn get(&self, key: &RecordKey) -> Option<&StagedRecord> {
        self.records.get(key)
    }

    pub fn remove(&mut self, key: &RecordKey) -> Option<StagedRecord> {
        self.records.shift_remove(key)
    }

    pub fn iter(&self) -> impl Iterator<Item = &StagedRecord> {
        self.records.values()
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    pub fn clear(&mut self) {
        self.records.clear();
    }

    pub fn has_local_attachments(&self) -> bool {
        self.records.values().any(StagedRecord::has_local_attachments)
    }
}

/// Per-collection staging strategy. Orders stage patches, catalog items stage
/// whole records; the two are kept distinct on purpose.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StagingBuffer {
    Patch(PatchStaging),
    Replace(ReplaceStaging),
}

impl StagingBuffer {
    pub fn new(kind: StagingKind) -> Self {
        match kind {
            StagingKind::Patch => Self::Patch(PatchStaging::new()),
            StagingKind::Replace => Self::Replace(ReplaceStaging::new()),
        }
    }

    pub fn kind(&self) -> StagingKind {
        match self {
            Self::Patch(_) => StagingKind::Patch,
            Self::Replace(_) => StagingKind::Replace,
        }
    }

    /// Applies `edit`. A shape mismatch hands the edit back untouched.
    pub fn stage(&mut self, edit: StagedEdit) -> Result<(), StagedEdit> {
        match (self, edit) {
            (Self::Patch(staging), StagedEdit::Patch { id, fields }) => {
                staging.record_many(id, fields);
                Ok(())
            }
            (Self::Replace(staging), StagedEdit::Replace(record)) => {
                staging.replace(record);
                Ok(())
            }
            (_, edit) => Err(edit),
        }
    }

    pub fn merge(&self, snapshot: &Snapshot, attachment_field: &str) -> Vec<DisplayRow> {
        merge::merge(snapshot.records(), self, attachment_field)
    }

    /// Removes whatever is staged for `key`; returns whether anything was there.
    pub fn remove(&mut self, key: &RecordKey) -> bool {
        match (self, key) {
            (Self::Patch(staging), RecordKey::Persisted(id)) => staging.remove(id).is_some(),
            (Self::Patch(_), RecordKey::Temp(_)) => false,
            (Self::Replace(staging), key) => staging.remove(key).is_some(),
        }
    }

    pub fn contains(&self, key: &RecordKey) -> bool {
        match (self, key) {
            (Self::Patch(staging), RecordKey::Persisted(id)) => staging.get(id).is_some(),
            (Self::Patch(_), RecordKey::Temp(_)) => false,
            (Self::Replace(staging), key) => staging.get(key).is_some(),
        }
    }

    pub fn len(&self) -> usize {
        match self {
            Self::Patch(staging) => staging.len(),
            Self::Replace(staging) => staging.len(),
        }
    }

    pub fn is_dirty(&self) -> bool {
        self.len() > 0
    }

    pub fn clear(&mut self) {
        match self {
            Self::Patch(staging) => staging.clear(),
            Self::Replace(staging) => staging.clear(),
        }
    }

    pub fn as_patch(&self) -> Option<&PatchStaging> {
        match self {
            Self::Patch(staging) => Some(staging),
            Self::Replace(_) => None,
        }
    }

    pub fn as_replace(&self) -> Option<&ReplaceStaging> {
        match self {
            Self::Replace(staging) => Some(staging),
            Self::Patch(_) => None,
        }
    }
}
