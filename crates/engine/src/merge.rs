//! Overlay of staged edits onto a snapshot, and filtering of the result.

use std::collections::HashSet;

use opsdesk_core::{EntityId, FieldValue, Fields, Record, RecordKey};

use crate::staging::{PatchStaging, ReplaceStaging, StagingBuffer};

/// A render-ready row of the merged view.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DisplayRow {
    pub key: RecordKey,
    pub fields: Fields,
    /// Differs from the snapshot because of a staged edit.
    pub modified: bool,
    /// Exists only in staging.
    pub new: bool,
    /// Local attachments still waiting for upload.
    pub pending_uploads: usize,
}

impl DisplayRow {
    fn unchanged(record: &Record) -> Self {
        Self {
            key: RecordKey::Persisted(record.id.clone()),
            fields: record.fields.clone(),
            modified: false,
            new: false,
            pending_uploads: 0,
        }
    }

    pub fn get(&self, field_key: &str) -> Option<&FieldValue> {
        self.fields.get(field_key)
    }

    pub fn text(&self, field_key: &str) -> Option<&str> {
        self.get(field_key).and_then(FieldValue::as_text)
    }
}

/// Pure overlay of `staging` onto `snapshot`. Inputs are only read.
pub fn merge(snapshot: &[Record], staging: &StagingBuffer, attachment_field: &str) -> Vec<DisplayRow> {
    match staging {
        StagingBuffer::Patch(patches) => merge_patches(snapshot, patches),
        StagingBuffer::Replace(records) => merge_replacements(snapshot, records, attachment_field),
    }
}

fn merge_patches(snapshot: &[Record], patches: &PatchStaging) -> Vec<DisplayRow> {
    snapshot
        .iter()
        .map(|record| match patches.get(&record.id) {
            Some(patch) => {
                let mut fields = record.fields.clone();
                fields.extend(patch.iter().map(|(k, v)| (k.clone(), v.clone())));
                DisplayRow {
                    key: RecordKey::Persisted(record.id.clone()),
                    fields,
                    modified: true,
                    new: false,
                    pending_uploads: 0,
                }
            }
            None => DisplayRow::unchanged(record),
        })
        .collect()
}

fn merge_replacements(
    snapshot: &[Record],
    records: &ReplaceStaging,
    attachment_field: &str,
) -> Vec<DisplayRow> {
    let mut rows: Vec<DisplayRow> = snapshot
        .iter()
        .map(|record| {
            let key = RecordKey::Persisted(record.id.clone());
            match records.get(&key) {
                Some(staged) => DisplayRow {
                    key,
                    fields: staged.display_fields(attachment_field),
                    modified: true,
                    new: false,
                    pending_uploads: staged.local_attachment_count(),
                },
                None => DisplayRow::unchanged(record),
            }
        })
        .collect();

    let known: HashSet<&EntityId> = snapshot.iter().map(|r| &r.id).collect();
    rows.extend(
        records
            .iter()
            .filter(|staged| staged.key.entity_id().is_none_or(|id| !known.contains(id)))
            .map(|staged| DisplayRow {
                key: staged.key.clone(),
                fields: staged.display_fields(attachment_field),
                modified: true,
                new: true,
                pending_uploads: staged.local_attachment_count(),
            }),
    );
    rows
}

/// Search and exact-match filters over merged rows.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ViewFilter {
    pub text: Option<String>,
    pub search_fields: Vec<String>,
    pub equals: Vec<(String, FieldValue)>,
}

impl ViewFilter {
    /// Case-insensitive substring search over the row key and `fields`.
    pub fn search(fields: &[String], text: impl Into<String>) -> Self {
        Self {
            text: Some(text.into()),
            search_fields: fields.to_vec(),
            equals: Vec::new(),
        }
    }

    pub fn with_equals(mut self, field_key: impl Into<String>, value: impl Into<FieldValue>) -> Self {
        self.equals.push((field_key.into(), value.into()));
        self
    }

    pub fn matches(&self, row: &DisplayRow) -> bool {
        let text_ok = match self.text.as_deref().map(str::trim) {
            None | Some("") => true,
            Some(needle) => {
                let needle = needle.to_lowercase();
                row.key.as_str().to_lowercase().contains(&needle)
                    || self.search_fields.iter().any(|field| {
                        row.get(field)
                            .is_some_and(|v| v.display_text().to_lowercase().contains(&needle))
                    })
            }
        };
        text_ok
            && self
                .equals
                .iter()
                .all(|(field, value)| row.get(field) == Some(value))
    }

    pub fn apply(&self, rows: Vec<DisplayRow>) -> Vec<DisplayRow> {
        rows.into_iter().filter(|row| self.matches(row)).collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::staging::{StagedEdit, StagingKind};
    use opsdesk_core::{AttachmentRef, LocalAttachment, StagedRecord, TempId};
    use serde_json::json;

    fn orders() -> Vec<Record> {
        vec![
            Record::from_json(
                json!({ "orderId": "A", "status": "待處理", "customerName": "Lin", "customerPhone": "0912" }),
                "orderId",
            )
            .unwrap(),
            Record::from_json(
                json!({ "orderId": "B", "status": "已完成", "customerName": "Chen", "customerPhone": "0988" }),
                "orderId",
            )
            .unwrap(),
        ]
    }

    fn products() -> Vec<Record> {
        vec![
            Record::from_json(json!({ "id": "P1", "name": "Toner", "image": "https://a/1.png" }), "id").unwrap(),
            Record::from_json(json!({ "id": "P2", "name": "Mask", "image": "" }), "id").unwrap(),
        ]
    }

    fn patch(id: &str, field: &str, value: &str) -> StagedEdit {
        StagedEdit::Patch {
            id: EntityId::new(id).unwrap(),
            fields: Fields::from([(field.to_string(), FieldValue::from(value))]),
        }
    }

    #[test]
    fn sequential_patches_show_both_fields() {
        let mut staging = StagingBuffer::new(StagingKind::Patch);
        staging.stage(patch("A", "status", "shipped")).unwrap();
        staging.stage(patch("A", "note", "urgent")).unwrap();

        let rows = merge(&orders(), &staging, "image");
        assert_eq!(rows.len(), 2);
        assert_eq!(rows[0].text("status"), Some("shipped"));
        assert_eq!(rows[0].text("note"), Some("urgent"));
        assert_eq!(rows[0].text("customerName"), Some("Lin"));
        assert!(rows[0].modified);
        assert!(!rows[1].modified);
    }

    #[test]
    fn patch_for_unknown_id_adds_no_row() {
        let mut staging = StagingBuffer::new(StagingKind::Patch);
        staging.stage(patch("Z", "status", "shipped")).unwrap();
        let rows = merge(&orders(), &staging, "image");
        assert_eq!(rows.len(), 2);
        assert!(rows.iter().all(|r| !r.modified));
    }

    #[test]
    fn replacements_substitute_wholesale_and_append_new() {
        let snapshot = products();
        let mut staging = StagingBuffer::new(StagingKind::Replace);
        let p1 = StagedRecord::new(RecordKey::Persisted(EntityId::new("P1").unwrap()))
            .with_field("price", FieldValue::Integer(450));
        staging.stage(StagedEdit::Replace(p1)).unwrap();
        let temp = StagedRecord::new(TempId::parse("NEW_1").unwrap().into())
            .with_field("name", "Serum")
            .with_attachment(AttachmentRef::Local(LocalAttachment {
                file_name: "f1.png".into(),
                mime_type: "image/png".into(),
                content: vec![0; 8],
            }));
        staging.stage(StagedEdit::Replace(temp)).unwrap();

        let rows = merge(&snapshot, &staging, "image");
        assert_eq!(rows.len(), 3);
        // Wholesale: the staged P1 has no name, so the row has none either.
        assert_eq!(rows[0].get("name"), None);
        assert_eq!(rows[0].get("price"), Some(&FieldValue::Integer(450)));
        assert!(rows[0].modified && !rows[0].new);
        assert!(rows[2].new && rows[2].modified);
        assert_eq!(rows[2].key.as_str(), "NEW_1");
        assert_eq!(rows[2].pending_uploads, 1);
    }

    #[test]
    fn merge_is_idempotent_and_leaves_inputs_alone() {
        let snapshot = orders();
        let mut staging = StagingBuffer::new(StagingKind::Patch);
        staging.stage(patch("B", "status", "已取消")).unwrap();
        let before = staging.clone();

        let first = merge(&snapshot, &staging, "image");
        let second = merge(&snapshot, &staging, "image");
        assert_eq!(first, second);
        assert_eq!(staging, before);
        assert_eq!(snapshot, orders());
    }

    #[test]
    fn empty_staging_has_no_flags() {
        let rows = merge(&products(), &StagingBuffer::new(StagingKind::Replace), "image");
        assert!(rows.iter().all(|r| !r.modified && !r.new));
    }

    #[test]
    fn filter_sees_staged_values() {
        let mut staging = StagingBuffer::new(StagingKind::Patch);
        staging.stage(patch("A", "status", "已出貨")).unwrap();
        let rows = merge(&orders(), &staging, "image");

        let by_status = ViewFilter::default().with_equals("status", "已出貨");
        let hits = by_status.apply(rows.clone());
        assert_eq!(hits.len(), 1);
        assert_eq!(hits[0].key.as_str(), "A");

        let fields = vec!["customerName".to_string(), "customerPhone".to_string()];
        assert_eq!(ViewFilter::search(&fields, "chen").apply(rows.clone()).len(), 1);
        assert_eq!(ViewFilter::search(&fields, "b").apply(rows.clone()).len(), 1);
        assert_eq!(ViewFilter::search(&fields, "  ").apply(rows).len(), 2);
    }
}
