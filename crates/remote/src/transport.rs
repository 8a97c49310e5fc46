use std::sync::Arc;

use async_trait::async_trait;

use crate::envelope::{RpcRequest, RpcResponse};
use crate::error::RemoteError;

/// The single-endpoint request/response service. Implementations own framing,
/// authentication and timeouts; anything that keeps a reply from arriving is
/// reported as [`RemoteError::Network`].
#[async_trait]
pub trait Transport: Send + Sync {
    async fn call(&self, request: RpcRequest) -> Result<RpcResponse, RemoteError>;
}

#[async_trait]
impl<T: Transport + ?Sized> Transport for Arc<T> {
    async fn call(&self, request: RpcRequest) -> Result<RpcResponse, RemoteError> {
        (**self).call(request).await
    }
}
