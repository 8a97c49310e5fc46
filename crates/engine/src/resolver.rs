use async_trait::async_trait;

use opsdesk_core::{AttachmentRef, FieldValue, LocalAttachment, StagedRecord};
use opsdesk_remote::{RemoteClient, RemoteError, Transport, Upload};

/// Where local attachments go to become URLs.
#[async_trait]
pub trait Uploader: Send + Sync {
    async fn upload(&self, attachment: &LocalAttachment, group: &str) -> Result<String, RemoteError>;
}

/// Uploads through the console's RPC client.
pub struct ClientUploader<'a, T> {
    client: &'a RemoteClient<T>,
    sub_action: &'a str,
}

impl<'a, T> ClientUploader<'a, T> {
    pub fn new(client: &'a RemoteClient<T>, sub_action: &'a str) -> Self {
        Self { client, sub_action }
    }
}

#[async_trait]
impl<T: Transport> Uploader for ClientUploader<'_, T> {
    async fn upload(&self, attachment: &LocalAttachment, group: &str) -> Result<String, RemoteError> {
        self.client
            .upload(
                self.sub_action,
                Upload {
                    file_name: &attachment.file_name,
                    mime_type: &attachment.mime_type,
                    content: &attachment.content,
                    group,
                },
            )
            .await
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum UploadOutcome {
    Uploaded { file_name: String, url: String },
    Failed { file_name: String, error: String },
}

impl UploadOutcome {
    pub fn is_failure(&self) -> bool {
        matches!(self, Self::Failed { .. })
    }
}

#[derive(Debug, Clone)]
pub struct Resolution {
    /// The record with every local entry either swapped for its URL or dropped.
    pub record: StagedRecord,
    /// One entry per local attachment, in attachment order.
    pub outcomes: Vec<UploadOutcome>,
}

/// Grouping key for uploads of `record`: its group field, or `fallback` when blank.
pub fn upload_group(record: &StagedRecord, group_field: &str, fallback: &str) -> String {
    record
        .fields
        .get(group_field)
        .and_then(FieldValue::as_text)
        .map(str::trim)
        .filter(|g| !g.is_empty())
        .unwrap_or(fallback)
        .to_string()
}

/// Uploads the local attachments of `record` one at a time, in order.
///
/// A failed upload is logged and its entry dropped; the rest of the record
/// still resolves.
pub async fn resolve<U: Uploader + ?Sized>(uploader: &U, mut record: StagedRecord, group: &str) -> Resolution {
    let mut resolved = Vec::with_capacity(record.attachments.len());
    let mut outcomes = Vec::new();

    for attachment in std::mem::take(&mut record.attachments) {
        let local = match attachment {
            AttachmentRef::Local(local) => local,
            existing => {
                resolved.push(existing);
                continue;
            }
        };
        match uploader.upload(&local, group).await {
            Ok(url) => {
                tracing::debug!(key = %record.key, file = %local.file_name, %url, "attachment uploaded");
                resolved.push(AttachmentRef::Existing(url.clone()));
                outcomes.push(UploadOutcome::Uploaded {
                    file_name: local.file_name,
                    url,
                });
            }
            Err(err) => {
                tracing::warn!(key = %record.key, file = %local.file_name, error = %err, "attachment upload failed; continuing");
                outcomes.push(UploadOutcome::Failed {
                    file_name: local.file_name,
                    error: err.to_string(),
                });
            }
        }
    }

    record.attachments = resolved;
    Resolution { record, outcomes }
}

#[cfg(test)]
mod tests {
    use super::*;
    use opsdesk_core::{RecordKey, TempId};
    use parking_lot::Mutex;

    /// Fails any file whose name is listed; records call order.
    struct FakeUploader {
        failing: Vec<&'static str>,
        calls: Mutex<Vec<(String, String)>>,
    }

    #[async_trait]
    impl Uploader for FakeUploader {
        async fn upload(&self, attachment: &LocalAttachment, group: &str) -> Result<String, RemoteError> {
            self.calls
                .lock()
                .push((attachment.file_name.clone(), group.to_string()));
            if self.failing.contains(&attachment.file_name.as_str()) {
                return Err(RemoteError::Network("connection reset".into()));
            }
            Ok(format!("https://cdn/{group}/{}", attachment.file_name))
        }
    }

    fn local(name: &str) -> AttachmentRef {
        AttachmentRef::Local(LocalAttachment {
            file_name: name.into(),
            mime_type: "image/png".into(),
            content: name.as_bytes().to_vec(),
        })
    }

    fn staged() -> StagedRecord {
        StagedRecord::new(RecordKey::Temp(TempId::parse("NEW_1").unwrap()))
            .with_field("brand", "COSRX")
            .with_attachment(AttachmentRef::Existing("https://cdn/old.png".into()))
            .with_attachment(local("f1.png"))
            .with_attachment(local("f2.png"))
    }

    #[tokio::test]
    async fn failed_upload_is_skipped_and_order_kept() {
        let uploader = FakeUploader {
            failing: vec!["f1.png"],
            calls: Mutex::new(Vec::new()),
        };
        let resolution = resolve(&uploader, staged(), "COSRX").await;

        assert_eq!(
            resolution.record.attachments,
            vec![
                AttachmentRef::Existing("https://cdn/old.png".into()),
                AttachmentRef::Existing("https://cdn/COSRX/f2.png".into()),
            ]
        );
        assert!(resolution.outcomes[0].is_failure());
        assert!(!resolution.outcomes[1].is_failure());
        let calls = uploader.calls.lock();
        assert_eq!(calls[0].0, "f1.png");
        assert_eq!(calls[1].0, "f2.png");
    }

    #[tokio::test]
    async fn record_without_locals_makes_no_calls() {
        let uploader = FakeUploader {
            failing: vec![],
            calls: Mutex::new(Vec::new()),
        };
        let record = StagedRecord::new(RecordKey::Temp(TempId::generate()))
            .with_attachment(AttachmentRef::Existing("https://cdn/a.png".into()));
        let resolution = resolve(&uploader, record.clone(), "default").await;
        assert_eq!(resolution.record, record);
        assert!(resolution.outcomes.is_empty());
        assert!(uploader.calls.lock().is_empty());
    }

    #[test]
    fn group_falls_back_when_blank() {
        assert_eq!(upload_group(&staged(), "brand", "default"), "COSRX");
        let blank = StagedRecord::new(RecordKey::Temp(TempId::generate())).with_field("brand", "  ");
        assert_eq!(upload_group(&blank, "brand", "default"), "default");
    }
}
