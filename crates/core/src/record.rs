use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::collections::BTreeMap;

use crate::attachment::{join_urls, split_urls, AttachmentRef};
use crate::error::CoreError;
use crate::field_value::FieldValue;
use crate::ids::{EntityId, RecordKey};

pub type Fields = BTreeMap<String, FieldValue>;

/// One entity as last confirmed by the remote store.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Record {
    pub id: EntityId,
    pub fields: Fields,
}

impl Record {
    pub fn new(id: EntityId, fields: Fields) -> Self {
        Self { id, fields }
    }

    pub fn get(&self, field_key: &str) -> Option<&FieldValue> {
        self.fields.get(field_key)
    }

    /// Reads a wire object, lifting `id_field` out into the record id.
    pub fn from_json(value: Value, id_field: &str) -> Result<Self, CoreError> {
        let Value::Object(mut map) = value else {
            return Err(CoreError::InvalidData("record is not an object".into()));
        };
        let id_value = map
            .remove(id_field)
            .ok_or_else(|| CoreError::InvalidData(format!("record is missing {id_field}")))?;
        let id = EntityId::from_json(&id_value)?;
        let fields = map
            .into_iter()
            .map(|(k, v)| (k, FieldValue::from_json(v)))
            .collect();
        Ok(Self { id, fields })
    }

    pub fn to_json(&self, id_field: &str) -> Value {
        let mut map = fields_to_json(&self.fields);
        map.insert(id_field.to_string(), Value::String(self.id.to_string()));
        Value::Object(map)
    }
}

pub fn fields_to_json(fields: &Fields) -> Map<String, Value> {
    fields
        .iter()
        .map(|(k, v)| (k.clone(), v.to_json()))
        .collect()
}

/// Complete replacement record held in replace-staging.
///
/// Attachments are kept apart from `fields` because they may still hold local
/// payloads; on the wire they collapse into one comma-joined URL field.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StagedRecord {
    pub key: RecordKey,
    pub fields: Fields,
    pub attachments: Vec<AttachmentRef>,
}

impl StagedRecord {
    pub fn new(key: RecordKey) -> Self {
        Self {
            key,
            fields: Fields::new(),
            attachments: Vec::new(),
        }
    }

    /// Starts a full record from a snapshot entity.
    pub fn from_record(record: &Record, attachment_field: &str) -> Self {
        let mut staged = Self {
            key: RecordKey::Persisted(record.id.clone()),
            fields: record.fields.clone(),
            attachments: Vec::new(),
        };
        staged.lift_attachment_field(attachment_field);
        staged
    }

    /// Moves URLs written straight into `attachment_field` onto the attachment
    /// list, ahead of the ones already there. Repeated URLs are kept once.
    pub fn lift_attachment_field(&mut self, attachment_field: &str) {
        let urls = match self.fields.remove(attachment_field) {
            Some(FieldValue::Text(urls)) => split_urls(&urls),
            Some(FieldValue::List(items)) => items
                .iter()
                .filter_map(FieldValue::as_text)
                .flat_map(split_urls)
                .collect(),
            _ => return,
        };
        let mut lifted: Vec<AttachmentRef> = Vec::with_capacity(urls.len() + self.attachments.len());
        for attachment in urls.into_iter().chain(self.attachments.drain(..)) {
            if attachment.is_local() || !lifted.contains(&attachment) {
                lifted.push(attachment);
            }
        }
        self.attachments = lifted;
    }

    pub fn with_field(mut self, field_key: impl Into<String>, value: impl Into<FieldValue>) -> Self {
        self.set_field(field_key, value);
        self
    }

    pub fn set_field(&mut self, field_key: impl Into<String>, value: impl Into<FieldValue>) {
        self.fields.insert(field_key.into(), value.into());
    }

    pub fn with_attachment(mut self, attachment: AttachmentRef) -> Self {
        self.attachments.push(attachment);
        self
    }

    pub fn has_local_attachments(&self) -> bool {
        self.attachments.iter().any(AttachmentRef::is_local)
    }

    pub fn local_attachment_count(&self) -> usize {
        self.attachments.iter().filter(|a| a.is_local()).count()
    }

    /// Fields as they should render: existing URLs joined into `attachment_field`.
    pub fn display_fields(&self, attachment_field: &str) -> Fields {
        let mut fields = self.fields.clone();
        fields.insert(
            attachment_field.to_string(),
            FieldValue::Text(join_urls(&self.attachments)),
        );
        fields
    }

    /// Outbound form. Temporary keys become `null` so the server assigns an id.
    pub fn to_wire(&self, id_field: &str, attachment_field: &str) -> Result<Value, CoreError> {
        if let Some(AttachmentRef::Local(local)) = self.attachments.iter().find(|a| a.is_local()) {
            return Err(CoreError::UnresolvedAttachment {
                key: self.key.to_string(),
                file_name: local.file_name.clone(),
            });
        }
        let mut map = fields_to_json(&self.display_fields(attachment_field));
        let id = match &self.key {
            RecordKey::Persisted(id) => Value::String(id.to_string()),
            RecordKey::Temp(_) => Value::Null,
        };
        map.insert(id_field.to_string(), id);
        Ok(Value::Object(map))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::attachment::LocalAttachment;
    use crate::ids::TempId;
    use serde_json::json;

    #[test]
    fn record_json_lifts_id_field() {
        let record = Record::from_json(
            json!({ "orderId": "ORD-1", "status": "待處理", "total": 880 }),
            "orderId",
        )
        .unwrap();
        assert_eq!(record.id.as_str(), "ORD-1");
        assert!(!record.fields.contains_key("orderId"));
        assert_eq!(record.to_json("orderId")["orderId"], json!("ORD-1"));
        assert!(Record::from_json(json!({ "status": "x" }), "orderId").is_err());
    }

    #[test]
    fn staged_record_from_snapshot_splits_attachments() {
        let record = Record::from_json(
            json!({ "id": 7, "name": "Cushion", "image": "https://a/1.png,https://a/2.png" }),
            "id",
        )
        .unwrap();
        let staged = StagedRecord::from_record(&record, "image");
        assert_eq!(staged.attachments.len(), 2);
        assert!(!staged.fields.contains_key("image"));
        assert_eq!(staged.key, RecordKey::Persisted(EntityId::new("7").unwrap()));
    }

    #[test]
    fn image_written_as_field_is_lifted_into_attachments() {
        let mut staged = StagedRecord::new(RecordKey::Persisted(EntityId::new("P2").unwrap()))
            .with_field("image", "https://a/keep.png, https://a/old.png")
            .with_attachment(AttachmentRef::Existing("https://a/old.png".into()))
            .with_attachment(AttachmentRef::Existing("https://a/new.png".into()));
        staged.lift_attachment_field("image");

        assert!(!staged.fields.contains_key("image"));
        let wire = staged.to_wire("id", "image").unwrap();
        assert_eq!(
            wire["image"],
            json!("https://a/keep.png,https://a/old.png,https://a/new.png")
        );
    }

    #[test]
    fn temp_record_goes_out_with_null_id() {
        let staged = StagedRecord::new(TempId::parse("NEW_1").unwrap().into())
            .with_field("name", "Toner")
            .with_attachment(AttachmentRef::Existing("https://a/t.png".into()));
        let wire = staged.to_wire("id", "image").unwrap();
        assert_eq!(wire["id"], Value::Null);
        assert_eq!(wire["image"], json!("https://a/t.png"));
    }

    #[test]
    fn unresolved_local_attachment_never_reaches_the_wire() {
        let staged = StagedRecord::new(TempId::parse("NEW_1").unwrap().into()).with_attachment(
            AttachmentRef::Local(LocalAttachment {
                file_name: "f1.png".into(),
                mime_type: "image/png".into(),
                content: vec![1],
            }),
        );
        assert!(matches!(
            staged.to_wire("id", "image"),
            Err(CoreError::UnresolvedAttachment { .. })
        ));
    }
}
