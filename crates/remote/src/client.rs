use base64::Engine as _;
use base64::engine::general_purpose::STANDARD;
use serde_json::{Value, json};

use opsdesk_core::{EntityId, Record};

use crate::envelope::RpcRequest;
use crate::error::RemoteError;
use crate::transport::Transport;

/// One binary attachment headed for the upload endpoint.
#[derive(Debug, Clone, Copy)]
pub struct Upload<'a> {
    pub file_name: &'a str,
    pub mime_type: &'a str,
    pub content: &'a [u8],
    /// Storage folder on the remote side, e.g. the product brand.
    pub group: &'a str,
}

/// Typed calls over a [`Transport`]. Endpoint names are passed in by the
/// caller so the same client serves every collection.
pub struct RemoteClient<T> {
    transport: T,
    action: String,
}

impl<T: Transport> RemoteClient<T> {
    pub fn new(transport: T, action: impl Into<String>) -> Self {
        Self {
            transport,
            action: action.into(),
        }
    }

    pub fn transport(&self) -> &T {
        &self.transport
    }

    pub fn request(&self, sub_action: &str) -> RpcRequest {
        RpcRequest::new(self.action.clone(), sub_action)
    }

    pub async fn call(&self, request: RpcRequest) -> Result<Value, RemoteError> {
        let sub_action = request.sub_action.clone();
        tracing::debug!(%sub_action, "rpc call");
        let response = self.transport.call(request).await?;
        response.into_result(&sub_action)
    }

    /// Fetches a whole collection; records sit in an array under `data_key`.
    pub async fn fetch_records(
        &self,
        sub_action: &str,
        data_key: &str,
        id_field: &str,
    ) -> Result<Vec<Record>, RemoteError> {
        let data = self.call(self.request(sub_action)).await?;
        let Some(Value::Array(items)) = data.get(data_key).cloned() else {
            return Err(RemoteError::MalformedResponse {
                sub_action: sub_action.to_string(),
                reason: format!("missing {data_key} array"),
            });
        };
        let records = items
            .into_iter()
            .map(|item| Record::from_json(item, id_field))
            .collect::<Result<Vec<_>, _>>()?;
        tracing::debug!(%sub_action, count = records.len(), "fetched records");
        Ok(records)
    }

    pub async fn batch_update(&self, sub_action: &str, updates: Vec<Value>) -> Result<(), RemoteError> {
        let request = self.request(sub_action).with("updates", Value::Array(updates));
        self.call(request).await?;
        Ok(())
    }

    pub async fn delete_record(
        &self,
        sub_action: &str,
        id_field: &str,
        id: &EntityId,
    ) -> Result<(), RemoteError> {
        let request = self.request(sub_action).with(id_field, json!(id.as_str()));
        self.call(request).await?;
        Ok(())
    }

    pub async fn reorder(&self, sub_action: &str, ordered_ids: &[EntityId]) -> Result<(), RemoteError> {
        let ids: Vec<Value> = ordered_ids.iter().map(|id| json!(id.as_str())).collect();
        let request = self.request(sub_action).with("orderedIds", Value::Array(ids));
        self.call(request).await?;
        Ok(())
    }

    /// Uploads one attachment and returns the stored resource URL.
    pub async fn upload(&self, sub_action: &str, upload: Upload<'_>) -> Result<String, RemoteError> {
        let request = self
            .request(sub_action)
            .with("fileName", json!(upload.file_name))
            .with("content", json!(STANDARD.encode(upload.content)))
            .with("mimeType", json!(upload.mime_type))
            .with("group", json!(upload.group));
        let data = self.call(request).await?;
        match data.get("url").and_then(Value::as_str) {
            Some(url) if !url.is_empty() => Ok(url.to_string()),
            _ => Err(RemoteError::MalformedResponse {
                sub_action: sub_action.to_string(),
                reason: "missing url".into(),
            }),
        }
    }

    /// Immediate create call. Returns the id under `id_key` when the server sends one.
    pub async fn create(
        &self,
        sub_action: &str,
        payload_key: &str,
        payload: Value,
        id_key: &str,
    ) -> Result<Option<EntityId>, RemoteError> {
        let data = self.call(self.request(sub_action).with(payload_key, payload)).await?;
        match data.get(id_key) {
            Some(value) if !value.is_null() => Ok(Some(EntityId::from_json(value)?)),
            _ => Ok(None),
        }
    }
}
