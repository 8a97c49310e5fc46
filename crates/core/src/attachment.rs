use serde::{Deserialize, Serialize};
use std::fmt;

use crate::error::CoreError;

/// Binary payload picked by the operator and not uploaded yet.
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LocalAttachment {
    pub file_name: String,
    pub mime_type: String,
    pub content: Vec<u8>,
}

impl fmt::Debug for LocalAttachment {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("LocalAttachment")
            .field("file_name", &self.file_name)
            .field("mime_type", &self.mime_type)
            .field("len", &self.content.len())
            .finish()
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", content = "value", rename_all = "lowercase")]
pub enum AttachmentRef {
    Existing(String),
    Local(LocalAttachment),
}

impl AttachmentRef {
    pub fn is_local(&self) -> bool {
        matches!(self, AttachmentRef::Local(_))
    }

    pub fn url(&self) -> Option<&str> {
        match self {
            AttachmentRef::Existing(url) => Some(url),
            AttachmentRef::Local(_) => None,
        }
    }
}

/// Splits a comma-joined URL field into existing attachment references.
pub fn split_urls(text: &str) -> Vec<AttachmentRef> {
    text.split(',')
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(|s| AttachmentRef::Existing(s.to_string()))
        .collect()
}

/// Joins the existing URLs of `refs` in order; local entries are skipped.
pub fn join_urls(refs: &[AttachmentRef]) -> String {
    refs.iter()
        .filter_map(AttachmentRef::url)
        .collect::<Vec<_>>()
        .join(",")
}

pub const DEFAULT_MAX_ATTACHMENT_BYTES: usize = 5 * 1024 * 1024;

/// Which local files may be staged at all.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct AttachmentPolicy {
    pub allowed_mime_types: Vec<String>,
    pub max_bytes: usize,
}

impl Default for AttachmentPolicy {
    fn default() -> Self {
        Self {
            allowed_mime_types: vec![
                "image/jpeg".into(),
                "image/png".into(),
                "image/webp".into(),
            ],
            max_bytes: DEFAULT_MAX_ATTACHMENT_BYTES,
        }
    }
}

impl AttachmentPolicy {
    pub fn check(&self, file_name: &str, mime_type: &str, len: usize) -> Result<(), CoreError> {
        if !self.allowed_mime_types.iter().any(|m| m == mime_type) {
            return Err(CoreError::AttachmentRejected {
                file_name: file_name.to_string(),
                reason: format!("unsupported type {mime_type}"),
            });
        }
        if len > self.max_bytes {
            return Err(CoreError::AttachmentRejected {
                file_name: file_name.to_string(),
                reason: format!("{len} bytes exceeds the {} byte limit", self.max_bytes),
            });
        }
        Ok(())
    }

    /// Builds a local attachment reference, validating it first.
    pub fn local(
        &self,
        file_name: impl Into<String>,
        mime_type: impl Into<String>,
        content: Vec<u8>,
    ) -> Result<AttachmentRef, CoreError> {
        let file_name = file_name.into();
        let mime_type = mime_type.into();
        self.check(&file_name, &mime_type, content.len())?;
        Ok(AttachmentRef::Local(LocalAttachment {
            file_name,
            mime_type,
            content,
        }))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn split_and_join_skip_blanks_and_locals() {
        let mut refs = split_urls("https://a/1.png, ,https://a/2.png,");
        assert_eq!(refs.len(), 2);
        refs.insert(
            1,
            AttachmentRef::Local(LocalAttachment {
                file_name: "x.png".into(),
                mime_type: "image/png".into(),
                content: vec![1, 2, 3],
            }),
        );
        assert_eq!(join_urls(&refs), "https://a/1.png,https://a/2.png");
    }

    #[test]
    fn policy_rejects_wrong_type_and_oversize() {
        let policy = AttachmentPolicy::default();
        assert!(policy.local("a.gif", "image/gif", vec![0; 4]).is_err());
        assert!(
            policy
                .local("big.png", "image/png", vec![0; DEFAULT_MAX_ATTACHMENT_BYTES + 1])
                .is_err()
        );
        let ok = policy.local("a.webp", "image/webp", vec![0; 4]).unwrap();
        assert!(ok.is_local());
    }

    #[test]
    fn serde_shape_is_kind_and_value() {
        let json = serde_json::to_value(AttachmentRef::Existing("https://a/1.png".into())).unwrap();
        assert_eq!(json, serde_json::json!({ "kind": "existing", "value": "https://a/1.png" }));
    }
}
