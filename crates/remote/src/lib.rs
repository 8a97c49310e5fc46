pub mod client;
pub mod envelope;
pub mod error;
pub mod transport;

pub use client::{RemoteClient, Upload};
pub use envelope::{RpcRequest, RpcResponse};
pub use error::RemoteError;
pub use transport::Transport;
