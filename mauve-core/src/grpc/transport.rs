//! # gRPC Transport
//!
//! Plugs the dynamic gRPC client into [`crate::Client`].
//!
//! The transport owns the schema (a `DescriptorPool` decoded from a `FileDescriptorSet`),
//! the channel and a tokio runtime handle. Every call:
//!
//! 1. resolves `service`/`method` in the pool,
//! 2. turns the connection credentials and the request headers into gRPC metadata,
//! 3. runs the call on the runtime, bounded by the connection timeout,
//! 4. folds the reply into one JSON value (streams become arrays) and deserializes it into
//!    the caller's output type.
//!
//! Any non-OK status is a fault. When a response stream carries several error statuses,
//! they are reported together as an aggregate.
use super::client::{GrpcCallError, GrpcClient, Reply};
use crate::{
    BoxError,
    client::{
        ConnectionInformation, Credentials, Fault, Transport, TransportExecutor, block_on,
    },
};
use http_body::Body as HttpBody;
use prost_reflect::{DescriptorError, DescriptorPool, MethodDescriptor};
use serde::de::DeserializeOwned;
use std::str::FromStr;
use tokio::runtime::Handle;
use tonic::{
    client::GrpcService,
    metadata::{Ascii, MetadataKey, MetadataMap, MetadataValue},
    transport::{Channel, Endpoint},
};
use tracing::debug;

/// Errors that can occur when setting up a [`GrpcTransport`].
#[derive(Debug, thiserror::Error)]
pub enum GrpcConnectError {
    #[error("Invalid URL '{address}': '{source}'")]
    InvalidUrl {
        address: String,
        source: tonic::transport::Error,
    },
    #[error("Failed to decode file descriptor set: '{0}'")]
    Descriptor(#[from] DescriptorError),
}

/// A dynamic gRPC call.
#[derive(Debug, Clone, PartialEq)]
pub struct GrpcRequest {
    /// The fully qualified name of the service (e.g., `my.package.Service`).
    pub service: String,
    /// The name of the method to call (e.g., `SayHello`).
    pub method: String,
    /// The JSON body: an object for unary and server streaming calls, an array of objects
    /// for client streaming and bidirectional calls.
    pub body: serde_json::Value,
    /// Custom gRPC metadata (headers) to attach to the request.
    pub headers: Vec<(String, String)>,
}

impl GrpcRequest {
    pub fn new(
        service: impl Into<String>,
        method: impl Into<String>,
        body: serde_json::Value,
    ) -> Self {
        Self {
            service: service.into(),
            method: method.into(),
            body,
            headers: Vec::new(),
        }
    }

    pub fn with_header(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.headers.push((key.into(), value.into()));
        self
    }
}

/// A [`TransportExecutor`] for dynamic gRPC calls over `S`.
///
/// `run_transport` blocks on the stored runtime handle through [`block_on`]. Inside a
/// single-threaded runtime it fails instead; use [`crate::Client::execute_async`] there.
#[derive(Debug)]
pub struct GrpcTransport<S = Channel> {
    client: GrpcClient<S>,
    pool: DescriptorPool,
    runtime: Handle,
}

impl GrpcTransport<Channel> {
    /// Builds a transport whose channel connects on first use.
    ///
    /// The connection timeout, when set, bounds both connecting and each request.
    pub fn connect_lazy(
        runtime: Handle,
        connection: &ConnectionInformation,
        file_descriptor_set: &[u8],
    ) -> Result<Self, GrpcConnectError> {
        let pool = DescriptorPool::decode(file_descriptor_set)?;

        let mut endpoint = Endpoint::new(connection.address.clone()).map_err(|source| {
            GrpcConnectError::InvalidUrl {
                address: connection.address.clone(),
                source,
            }
        })?;
        if let Some(timeout) = connection.timeout {
            endpoint = endpoint.connect_timeout(timeout).timeout(timeout);
        }

        // The lazy channel spawns its worker on the runtime it is created in.
        let channel = {
            let _guard = runtime.enter();
            endpoint.connect_lazy()
        };

        Ok(Self {
            client: GrpcClient::new(channel),
            pool,
            runtime,
        })
    }
}

impl<S> GrpcTransport<S> {
    /// Builds a transport over an existing `tonic` service or channel.
    pub fn from_service(
        runtime: Handle,
        service: S,
        file_descriptor_set: &[u8],
    ) -> Result<Self, DescriptorError> {
        Ok(Self {
            client: GrpcClient::new(service),
            pool: DescriptorPool::decode(file_descriptor_set)?,
            runtime,
        })
    }

    pub fn descriptor_pool(&self) -> &DescriptorPool {
        &self.pool
    }

    /// Lists the fully qualified names of the services this transport can call.
    pub fn list_services(&self) -> Vec<String> {
        self.pool
            .services()
            .map(|s| s.full_name().to_string())
            .collect()
    }

    fn resolve(&self, request: &GrpcRequest) -> Result<MethodDescriptor, GrpcCallError> {
        self.pool
            .get_service_by_name(&request.service)
            .ok_or_else(|| GrpcCallError::ServiceNotFound(request.service.clone()))?
            .methods()
            .find(|m| m.name() == request.method)
            .ok_or_else(|| GrpcCallError::MethodNotFound {
                service: request.service.clone(),
                method: request.method.clone(),
            })
    }
}

impl<S> GrpcTransport<S>
where
    S: GrpcService<tonic::body::Body> + Clone,
    S::Error: Into<BoxError>,
    S::ResponseBody: HttpBody<Data = tonic::codegen::Bytes> + Send + 'static,
    <S::ResponseBody as HttpBody>::Error: Into<BoxError> + Send,
{
    #[tracing::instrument(skip_all, fields(service = %request.service, method = %request.method))]
    async fn call(
        &self,
        connection: &ConnectionInformation,
        request: &GrpcRequest,
    ) -> Result<serde_json::Value, Fault> {
        let method = self.resolve(request)?;
        let metadata = metadata(&request.headers, connection.credentials.as_ref())?;

        let mut client = self.client.clone();
        let call = client.call(&method, request.body.clone(), metadata);
        let reply = match connection.timeout {
            Some(timeout) => tokio::time::timeout(timeout, call)
                .await
                .map_err(|_| GrpcCallError::Timeout(timeout))??,
            None => call.await?,
        };

        match reply {
            Reply::Message(value) => Ok(value),
            Reply::Stream(items) => {
                debug!(items = items.len(), "received response stream");
                fold_stream(items)
            }
        }
    }
}

impl<S> Transport for GrpcTransport<S>
where
    S: Send + Sync + 'static,
{
    type Request = GrpcRequest;
}

impl<S, O> TransportExecutor<O> for GrpcTransport<S>
where
    S: GrpcService<tonic::body::Body> + Clone + Send + Sync + 'static,
    S::Error: Into<BoxError>,
    S::ResponseBody: HttpBody<Data = tonic::codegen::Bytes> + Send + 'static,
    <S::ResponseBody as HttpBody>::Error: Into<BoxError> + Send,
    O: DeserializeOwned,
{
    fn run_transport(
        &self,
        connection: &ConnectionInformation,
        request: &GrpcRequest,
    ) -> Result<O, Fault> {
        let value = block_on(&self.runtime, self.call(connection, request))??;
        let output = serde_json::from_value(value).map_err(GrpcCallError::Decode)?;
        Ok(output)
    }
}

fn fold_stream(
    items: Vec<Result<serde_json::Value, tonic::Status>>,
) -> Result<serde_json::Value, Fault> {
    let mut values = Vec::with_capacity(items.len());
    let mut failures = Vec::new();

    for item in items {
        match item {
            Ok(value) => values.push(value),
            Err(status) => failures.push(Fault::from(GrpcCallError::from(status))),
        }
    }

    if failures.is_empty() {
        Ok(serde_json::Value::Array(values))
    } else {
        Err(Fault::aggregate(failures))
    }
}

fn metadata(
    headers: &[(String, String)],
    credentials: Option<&Credentials>,
) -> Result<MetadataMap, GrpcCallError> {
    let mut metadata = MetadataMap::new();

    if let Some(credentials) = credentials {
        insert(&mut metadata, "authorization", &credentials.authorization())?;
    }
    for (key, value) in headers {
        insert(&mut metadata, key, value)?;
    }

    Ok(metadata)
}

fn insert(metadata: &mut MetadataMap, key: &str, value: &str) -> Result<(), GrpcCallError> {
    let name = MetadataKey::<Ascii>::from_str(key).map_err(|source| {
        GrpcCallError::InvalidMetadataKey {
            key: key.to_string(),
            source,
        }
    })?;
    let value = MetadataValue::<Ascii>::from_str(value).map_err(|source| {
        GrpcCallError::InvalidMetadataValue {
            key: key.to_string(),
            source,
        }
    })?;

    metadata.insert(name, value);
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_credentials_come_before_request_headers() {
        let credentials = Credentials::Bearer {
            token: "abc".to_string(),
        };
        let headers = vec![("x-trace".to_string(), "1".to_string())];

        let metadata = metadata(&headers, Some(&credentials)).unwrap();

        assert_eq!(metadata.get("authorization").unwrap(), "Bearer abc");
        assert_eq!(metadata.get("x-trace").unwrap(), "1");
    }

    #[test]
    fn test_invalid_header_key_is_rejected() {
        let headers = vec![("bad key".to_string(), "1".to_string())];

        let err = metadata(&headers, None).unwrap_err();

        assert!(matches!(err, GrpcCallError::InvalidMetadataKey { ref key, .. } if key == "bad key"));
    }

    #[test]
    fn test_stream_errors_are_aggregated() {
        let items = vec![
            Ok(serde_json::json!({"message": "a"})),
            Err(tonic::Status::unavailable("node 1 down")),
            Err(tonic::Status::unavailable("node 2 down")),
        ];

        let fault = fold_stream(items).unwrap_err();

        assert!(fault.is_aggregate());
        assert_eq!(
            fault.to_string(),
            "gRPC status Unavailable: node 1 down gRPC status Unavailable: node 2 down"
        );
    }

    #[test]
    fn test_successful_stream_becomes_an_array() {
        let items = vec![Ok(serde_json::json!(1)), Ok(serde_json::json!(2))];

        assert_eq!(fold_stream(items).unwrap(), serde_json::json!([1, 2]));
    }
}
