use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::error::RemoteError;

/// Outbound call: `{action, subAction, ...payload}` once flattened.
#[derive(Debug, Clone, PartialEq)]
pub struct RpcRequest {
    pub action: String,
    pub sub_action: String,
    pub payload: Map<String, Value>,
}

impl RpcRequest {
    pub fn new(action: impl Into<String>, sub_action: impl Into<String>) -> Self {
        Self {
            action: action.into(),
            sub_action: sub_action.into(),
            payload: Map::new(),
        }
    }

    pub fn with(mut self, key: impl Into<String>, value: Value) -> Self {
        self.payload.insert(key.into(), value);
        self
    }

    pub fn get(&self, key: &str) -> Option<&Value> {
        self.payload.get(key)
    }

    /// Flattened wire object. `action` and `subAction` always win over payload keys.
    pub fn to_json(&self) -> Value {
        let mut map = self.payload.clone();
        map.insert("action".into(), Value::String(self.action.clone()));
        map.insert("subAction".into(), Value::String(self.sub_action.clone()));
        Value::Object(map)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RpcResponse {
    pub success: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub data: Option<Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl RpcResponse {
    pub fn ok(data: Value) -> Self {
        Self {
            success: true,
            data: Some(data),
            error: None,
        }
    }

    pub fn ok_empty() -> Self {
        Self {
            success: true,
            data: None,
            error: None,
        }
    }

    pub fn failure(message: impl Into<String>) -> Self {
        Self {
            success: false,
            data: None,
            error: Some(message.into()),
        }
    }

    /// Unwraps the envelope: `data` on success, [`RemoteError::Rejected`] otherwise.
    pub fn into_result(self, sub_action: &str) -> Result<Value, RemoteError> {
        if self.success {
            Ok(self.data.unwrap_or(Value::Null))
        } else {
            Err(RemoteError::Rejected {
                sub_action: sub_action.to_string(),
                message: self.error.unwrap_or_else(|| "unknown error".into()),
            })
        }
    }
}
