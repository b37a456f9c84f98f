//! # Dynamic gRPC Client
//!
//! Wraps a `tonic` client so that any method described by a `MethodDescriptor` can be
//! called with a JSON body. The call shape (unary, server streaming, client streaming or
//! bidirectional) is read from the descriptor.
use super::codec::JsonCodec;
use crate::BoxError;
use futures_util::{Stream, StreamExt};
use http_body::Body as HttpBody;
use prost_reflect::MethodDescriptor;
use std::{str::FromStr, time::Duration};
use tonic::{
    Code, Status,
    client::GrpcService,
    metadata::{
        MetadataMap,
        errors::{InvalidMetadataKey, InvalidMetadataValue},
    },
    transport::Channel,
};

/// Errors that can occur while performing a dynamic gRPC call.
#[derive(Debug, thiserror::Error)]
pub enum GrpcCallError {
    #[error("Service '{0}' not found")]
    ServiceNotFound(String),
    #[error("Method '{method}' not found in service '{service}'")]
    MethodNotFound { service: String, method: String },
    #[error("Invalid input: '{0}'")]
    InvalidInput(String),
    #[error("Invalid gRPC path '{0}'")]
    InvalidPath(String),
    #[error("Internal error, the client was not ready: '{0}'")]
    ClientNotReady(#[source] BoxError),
    #[error("Invalid metadata (header) key '{key}': '{source}'")]
    InvalidMetadataKey {
        key: String,
        source: InvalidMetadataKey,
    },
    #[error("Invalid metadata (header) value for key '{key}': '{source}'")]
    InvalidMetadataValue {
        key: String,
        source: InvalidMetadataValue,
    },
    #[error("gRPC status {code:?}: {message}")]
    Status { code: Code, message: String },
    #[error("The call did not complete within {0:?}")]
    Timeout(Duration),
    #[error("Failed to decode the response body: '{0}'")]
    Decode(#[from] serde_json::Error),
}

impl From<Status> for GrpcCallError {
    fn from(status: Status) -> Self {
        GrpcCallError::Status {
            code: status.code(),
            message: status.message().to_string(),
        }
    }
}

/// What a call produced, before it is folded into a single JSON value.
#[derive(Debug)]
pub enum Reply {
    /// Unary and client streaming calls.
    Message(serde_json::Value),
    /// Server streaming and bidirectional calls, one entry per received item.
    Stream(Vec<Result<serde_json::Value, Status>>),
}

/// A `tonic` client that speaks JSON through [`JsonCodec`].
#[derive(Debug, Clone)]
pub struct GrpcClient<S = Channel> {
    inner: tonic::client::Grpc<S>,
}

impl<S> GrpcClient<S> {
    pub fn new(service: S) -> Self {
        Self {
            inner: tonic::client::Grpc::new(service),
        }
    }
}

impl<S> GrpcClient<S>
where
    S: GrpcService<tonic::body::Body>,
    S::Error: Into<BoxError>,
    S::ResponseBody: HttpBody<Data = tonic::codegen::Bytes> + Send + 'static,
    <S::ResponseBody as HttpBody>::Error: Into<BoxError> + Send,
{
    /// Calls `method` with `body`, dispatching on the method's streaming flags.
    ///
    /// Client streaming methods expect `body` to be a JSON array; each element is sent as
    /// one message.
    pub async fn call(
        &mut self,
        method: &MethodDescriptor,
        body: serde_json::Value,
        metadata: MetadataMap,
    ) -> Result<Reply, GrpcCallError> {
        self.inner
            .ready()
            .await
            .map_err(|e| GrpcCallError::ClientNotReady(e.into()))?;

        let codec = JsonCodec::for_method(method);
        let path = http_path(method)?;

        match (method.is_client_streaming(), method.is_server_streaming()) {
            (false, false) => {
                let response = self
                    .inner
                    .unary(request(body, metadata), path, codec)
                    .await?;
                Ok(Reply::Message(response.into_inner()))
            }
            (false, true) => {
                let stream = self
                    .inner
                    .server_streaming(request(body, metadata), path, codec)
                    .await?
                    .into_inner();
                Ok(Reply::Stream(stream.collect().await))
            }
            (true, false) => {
                let input = json_array_to_stream(body)?;
                let response = self
                    .inner
                    .client_streaming(request(input, metadata), path, codec)
                    .await?;
                Ok(Reply::Message(response.into_inner()))
            }
            (true, true) => {
                let input = json_array_to_stream(body)?;
                let stream = self
                    .inner
                    .streaming(request(input, metadata), path, codec)
                    .await?
                    .into_inner();
                Ok(Reply::Stream(stream.collect().await))
            }
        }
    }
}

fn request<T>(message: T, metadata: MetadataMap) -> tonic::Request<T> {
    let mut request = tonic::Request::new(message);
    *request.metadata_mut() = metadata;
    request
}

fn http_path(method: &MethodDescriptor) -> Result<http::uri::PathAndQuery, GrpcCallError> {
    let path = format!("/{}/{}", method.parent_service().full_name(), method.name());
    http::uri::PathAndQuery::from_str(&path).map_err(|_| GrpcCallError::InvalidPath(path))
}

fn json_array_to_stream(
    body: serde_json::Value,
) -> Result<impl Stream<Item = serde_json::Value> + Send + 'static, GrpcCallError> {
    match body {
        serde_json::Value::Array(items) => Ok(tokio_stream::iter(items)),
        _ => Err(GrpcCallError::InvalidInput(
            "Client streaming requires a JSON Array body".to_string(),
        )),
    }
}
