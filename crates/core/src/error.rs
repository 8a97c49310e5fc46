use thiserror::Error;

#[derive(Debug, Error)]
pub enum CoreError {
    #[error("serialization error: {0}")]
    Serialization(String),

    #[error("invalid data: {0}")]
    InvalidData(String),

    #[error("malformed structured value: {0}")]
    MalformedStructure(String),

    #[error("attachment {file_name} rejected: {reason}")]
    AttachmentRejected { file_name: String, reason: String },

    #[error("record {key} still holds local attachment {file_name}")]
    UnresolvedAttachment { key: String, file_name: String },
}
