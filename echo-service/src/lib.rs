//! # Echo Service
//!
//! **INTERNAL USE ONLY**: This crate exists solely to provide a gRPC server implementation
//! and descriptor set for integration testing the `mauve_core` gRPC transport.
//! It is not intended for production use.
use futures_util::Stream;
use std::pin::Pin;
use tokio::sync::mpsc;
use tokio_stream::{StreamExt, wrappers::ReceiverStream};
use tonic::{Request, Response, Status, Streaming};

pub mod pb {
    include!(concat!(env!("OUT_DIR"), "/echo.rs"));
}

use pb::{EchoRequest, EchoResponse};

pub use pb::echo_service_server::{EchoService, EchoServiceServer};
pub const FILE_DESCRIPTOR_SET: &[u8] = tonic::include_file_descriptor_set!("descriptors");

pub const SERVICE_NAME: &str = "echo.EchoService";

/// Metadata key naming another header that `UnaryEcho` should send back.
pub const ECHO_METADATA_KEY: &str = "x-echo-metadata";

/// The echo behaviour used by the integration tests.
///
/// * `UnaryEcho` returns the message, or `INVALID_ARGUMENT` when it is empty. When the
///   request carries an `x-echo-metadata: <key>` header, it returns the value of the `<key>`
///   header instead.
/// * `ServerStreamingEcho` returns `repeat` numbered copies (three by default).
/// * `ClientStreamingEcho` joins every received message with a space.
/// * `BidirectionalEcho` answers each message with `echo: <message>`.
#[derive(Debug, Default, Clone, Copy)]
pub struct Echo;

#[tonic::async_trait]
impl EchoService for Echo {
    type ServerStreamingEchoStream = ReceiverStream<Result<EchoResponse, Status>>;
    type BidirectionalEchoStream = Pin<Box<dyn Stream<Item = Result<EchoResponse, Status>> + Send>>;

    async fn unary_echo(
        &self,
        request: Request<EchoRequest>,
    ) -> Result<Response<EchoResponse>, Status> {
        if let Some(key) = request.metadata().get(ECHO_METADATA_KEY) {
            let key = key.to_str().unwrap_or_default().to_string();
            let value = request
                .metadata()
                .get(key.as_str())
                .and_then(|value| value.to_str().ok())
                .unwrap_or_default();
            return Ok(Response::new(EchoResponse {
                message: value.to_string(),
                sequence: 0,
            }));
        }

        let request = request.into_inner();
        if request.message.is_empty() {
            return Err(Status::invalid_argument("message must not be empty"));
        }

        Ok(Response::new(EchoResponse {
            message: request.message,
            sequence: 0,
        }))
    }

    async fn server_streaming_echo(
        &self,
        request: Request<EchoRequest>,
    ) -> Result<Response<Self::ServerStreamingEchoStream>, Status> {
        let request = request.into_inner();
        let repeat = if request.repeat == 0 { 3 } else { request.repeat };
        let (tx, rx) = mpsc::channel(4);

        tokio::spawn(async move {
            for sequence in 0..repeat {
                let response = EchoResponse {
                    message: format!("{} #{}", request.message, sequence),
                    sequence,
                };
                if tx.send(Ok(response)).await.is_err() {
                    break;
                }
            }
        });

        Ok(Response::new(ReceiverStream::new(rx)))
    }

    async fn client_streaming_echo(
        &self,
        request: Request<Streaming<EchoRequest>>,
    ) -> Result<Response<EchoResponse>, Status> {
        let mut stream = request.into_inner();
        let mut parts = Vec::new();

        while let Some(request) = stream.next().await {
            parts.push(request?.message);
        }

        Ok(Response::new(EchoResponse {
            message: parts.join(" "),
            sequence: parts.len() as i32,
        }))
    }

    async fn bidirectional_echo(
        &self,
        request: Request<Streaming<EchoRequest>>,
    ) -> Result<Response<Self::BidirectionalEchoStream>, Status> {
        let mut in_stream = request.into_inner();
        let (tx, rx) = mpsc::channel(16);

        tokio::spawn(async move {
            let mut sequence = 0;
            while let Some(result) = in_stream.next().await {
                let reply = result.map(|request| EchoResponse {
                    message: format!("echo: {}", request.message),
                    sequence,
                });
                let failed = reply.is_err();
                if tx.send(reply).await.is_err() || failed {
                    break;
                }
                sequence += 1;
            }
        });

        Ok(Response::new(Box::pin(ReceiverStream::new(rx))))
    }
}
