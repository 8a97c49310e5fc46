use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use opsdesk_core::AttachmentPolicy;

use crate::error::EngineError;

/// Endpoints and field names of one remote collection. When a collection
/// table appears in a config file it must be complete.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CollectionConfig {
    pub fetch_action: String,
    /// Key under the response `data` holding the record array.
    pub data_key: String,
    pub batch_action: String,
    pub delete_action: String,
    pub id_field: String,
    /// Fields matched by free-text search, besides the id.
    pub search_fields: Vec<String>,
}

impl CollectionConfig {
    pub fn orders() -> Self {
        Self {
            fetch_action: "getDashboardData".into(),
            data_key: "orders".into(),
            batch_action: "updateOrdersBatch".into(),
            delete_action: "deleteOrder".into(),
            id_field: "orderId".into(),
            search_fields: vec!["customerName".into(), "customerPhone".into()],
        }
    }

    pub fn catalog() -> Self {
        Self {
            fetch_action: "getProductsAdmin".into(),
            data_key: "products".into(),
            batch_action: "updateProductsBatch".into(),
            delete_action: "deleteProduct".into(),
            id_field: "id".into(),
            search_fields: vec!["name".into(), "category".into(), "brand".into()],
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ConsoleConfig {
    /// Top-level `action` sent with every request.
    pub action: String,
    pub orders: CollectionConfig,
    pub catalog: CollectionConfig,
    /// Catalog field holding comma-joined attachment URLs.
    pub attachment_field: String,
    /// Catalog field whose value groups uploads on the remote side.
    pub upload_group_field: String,
    pub default_upload_group: String,
    pub upload_action: String,
    pub reorder_action: String,
    pub create_order_action: String,
    pub attachments: AttachmentPolicy,
    pub cache_path: Option<PathBuf>,
}

impl Default for ConsoleConfig {
    fn default() -> Self {
        Self {
            action: "adminAction".into(),
            orders: CollectionConfig::orders(),
            catalog: CollectionConfig::catalog(),
            attachment_field: "image".into(),
            upload_group_field: "brand".into(),
            default_upload_group: "default".into(),
            upload_action: "uploadImageToGitHub".into(),
            reorder_action: "reorderProducts".into(),
            create_order_action: "createManualOrder".into(),
            attachments: AttachmentPolicy::default(),
            cache_path: None,
        }
    }
}

impl ConsoleConfig {
    pub fn from_toml_str(text: &str) -> Result<Self, EngineError> {
        toml::from_str(text).map_err(|e| EngineError::Config(e.to_string()))
    }

    pub fn load(path: &Path) -> Result<Self, EngineError> {
        let text = std::fs::read_to_string(path)
            .map_err(|e| EngineError::Config(format!("{}: {e}", path.display())))?;
        Self::from_toml_str(&text)
    }
}
