//! # Mauve Core
//!
//! `mauve-core` provides a generic network client: a typed request/response execution
//! layer that runs a protocol-specific transport and always hands the caller a uniform
//! response envelope, whether the call succeeded or failed.
//!
//! ## Key Components
//!
//! * **[`Client`]:** The main entry point. It owns the [`ConnectionInformation`] and a
//!   transport, and exposes synchronous, asynchronous and cancellable execution.
//! * **[`Response`]:** The envelope returned by every call. It carries a status code, a
//!   human readable message and, on success only, the decoded content.
//! * **[`Fault`]:** The failure tree a transport reports. Aggregated faults are flattened
//!   into their leaf causes when the envelope message is built.
//!
//! ## Transports
//!
//! A transport implements [`Transport`] (naming its request type) and
//! [`TransportExecutor`] for each output type it can produce. Two are shipped:
//!
//! * **[`grpc::GrpcTransport`]:** Dynamic gRPC calls with JSON bodies, transcoded on the fly
//!   against a Protobuf descriptor pool.
//! * **[`smtp::SmtpTransport`]:** A single SMTP mail transaction per request, with requests
//!   assembled by [`smtp::SmtpRequestBuilder`].
//!
//! ## Serialization
//!
//! [`serialization::serialize`] renders any `serde` value as Binary, XML, JSON, YAML or raw
//! text. The SMTP builder uses it to attach data to messages.
//!
//! ## Re-exports
//!
//! This crate re-exports `prost-reflect`, `tonic` and `tokio-util`'s cancellation token to
//! ensure that consumers use compatible versions of these underlying dependencies.
pub mod client;
pub mod grpc;
pub mod serialization;
pub mod smtp;

pub use client::{
    BlockingInAsyncContext, Cancelled, Client, ConnectionInformation, Credentials, Fault,
    Response, Transport, TransportExecutor,
};

// Re-exports
pub use prost_reflect;
pub use tokio_util::sync::CancellationToken;
pub use tonic;

/// Type alias for the standard boxed error used in generic bounds.
pub type BoxError = Box<dyn std::error::Error + Send + Sync + 'static>;
