use opsdesk_core::CoreError;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum RemoteError {
    /// Transport could not deliver the request or read the reply, timeouts included.
    #[error("network failure: {0}")]
    Network(String),

    #[error("{sub_action} rejected by server: {message}")]
    Rejected { sub_action: String, message: String },

    #[error("malformed {sub_action} response: {reason}")]
    MalformedResponse { sub_action: String, reason: String },

    #[error("core error: {0}")]
    Core(#[from] CoreError),
}

impl RemoteError {
    pub fn is_network(&self) -> bool {
        matches!(self, Self::Network(_))
    }
}
