//! # Generic gRPC Transport
//!
//! This module contains the building blocks for performing gRPC calls using dynamic
//! message types.
//!
//! Unlike standard `tonic` clients which are strongly typed (e.g., `HelloRequest`),
//! the components here work with generic `serde_json::Value` structures, transcoding them
//! to Protobuf binary format on the fly. [`GrpcTransport`] ties them to [`crate::Client`].
//!
//! ```rust,no_run
//! use mauve_core::{Client, ConnectionInformation, Response};
//! use mauve_core::grpc::{GrpcRequest, GrpcTransport};
//! # fn example(descriptor_set: &[u8]) -> Result<(), Box<dyn std::error::Error>> {
//! let runtime = tokio::runtime::Runtime::new()?;
//! let connection = ConnectionInformation::new("http://localhost:50051");
//! let transport = GrpcTransport::connect_lazy(runtime.handle().clone(), &connection, descriptor_set)?;
//! let client = Client::new(connection, transport);
//!
//! let request = GrpcRequest::new("helloworld.Greeter", "SayHello", serde_json::json!({ "name": "Ferris" }));
//! let response: Response<serde_json::Value> = client.execute(&request);
//! println!("{}: {:?}", response.message(), response.content());
//! # Ok(())
//! # }
//! ```
pub mod client;
pub mod codec;
mod transport;

pub use client::{GrpcCallError, Reply};
pub use transport::{GrpcConnectError, GrpcRequest, GrpcTransport};
