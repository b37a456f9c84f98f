//! # Mauve Client
//!
//! This module implements the transport-independent execution contract.
//!
//! A [`Client`] is parameterized by its transport. The transport decides what a request
//! looks like ([`Transport::Request`]) and how to turn it into an output
//! ([`TransportExecutor::run_transport`]); the client decides what the caller gets back.
//! Whatever the transport does, the caller receives a [`Response`]:
//!
//! * On success the envelope holds the content, a `200 OK` status and the message `"Success."`.
//! * On failure the envelope holds no content, a `500 Internal Server Error` status and the
//!   messages of every leaf cause of the [`Fault`], joined by a single space.
//!
//! Faults are never propagated to the caller, so failure handling looks the same for every
//! protocol.
//!
//! ## Execution modes
//!
//! 1. **[`Client::execute`]**: Runs the transport on the calling thread.
//! 2. **[`Client::execute_async`]**: Runs [`Client::execute`] on tokio's blocking pool and
//!    awaits it.
//! 3. **[`Client::execute_async_with_cancellation`]**: Same as above, but the wait can be
//!    abandoned through a [`CancellationToken`]. Transport work that already started is not
//!    interrupted; its envelope is simply dropped.
//!
//! ## Example
//!
//! ```rust
//! use mauve_core::client::{Client, ConnectionInformation, Fault, Transport, TransportExecutor};
//!
//! struct Doubler;
//!
//! impl Transport for Doubler {
//!     type Request = u32;
//! }
//!
//! impl TransportExecutor<u64> for Doubler {
//!     fn run_transport(&self, _: &ConnectionInformation, request: &u32) -> Result<u64, Fault> {
//!         Ok(u64::from(*request) * 2)
//!     }
//! }
//!
//! let client = Client::new(ConnectionInformation::new("memory://"), Doubler);
//! let response = client.execute::<u64>(&21);
//!
//! assert!(response.is_success());
//! assert_eq!(response.content(), Some(&42));
//! assert_eq!(response.message(), "Success.");
//! ```
mod blocking;
mod connection;
pub mod fault;
mod types;

pub use blocking::{BlockingInAsyncContext, block_on};
pub use connection::{ConnectionConfigError, ConnectionInformation, Credentials};
pub use fault::Fault;
pub use types::*;

use std::any::Any;
use std::panic::{self, AssertUnwindSafe};
use std::sync::Arc;
use tokio::task::JoinError;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

/// Names the kind of request a transport accepts.
///
/// Transports are shared between concurrent calls, hence the `Send + Sync` bounds.
pub trait Transport: Send + Sync + 'static {
    type Request: Send + 'static;
}

/// The protocol-specific half of a client: turns a request into an `O` or fails.
///
/// Implementations own encoding, decoding, connection establishment and timeouts. They
/// must report failures through the returned [`Fault`] instead of swallowing them.
pub trait TransportExecutor<O>: Transport {
    fn run_transport(
        &self,
        connection: &ConnectionInformation,
        request: &Self::Request,
    ) -> Result<O, Fault>;
}

/// Returned by [`Client::execute_async_with_cancellation`] when the caller stopped waiting.
#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
#[error("The call was cancelled before a response was received")]
pub struct Cancelled;

/// A generic network client over the transport `T`.
///
/// Cloning is cheap: clones share the transport and the current connection snapshot.
#[derive(Debug)]
pub struct Client<T> {
    connection: Arc<ConnectionInformation>,
    transport: Arc<T>,
}

impl<T> Clone for Client<T> {
    fn clone(&self) -> Self {
        Self {
            connection: Arc::clone(&self.connection),
            transport: Arc::clone(&self.transport),
        }
    }
}

impl<T: Transport> Client<T> {
    pub fn new(connection: ConnectionInformation, transport: T) -> Self {
        Self {
            connection: Arc::new(connection),
            transport: Arc::new(transport),
        }
    }

    pub fn connection(&self) -> &ConnectionInformation {
        &self.connection
    }

    pub fn transport(&self) -> &T {
        &self.transport
    }

    /// Replaces the connection used by calls started after this one.
    ///
    /// Calls already in flight, and other clones of this client, keep the snapshot they hold.
    pub fn set_connection(&mut self, connection: ConnectionInformation) {
        self.connection = Arc::new(connection);
    }

    /// Executes `request` on the calling thread and wraps the outcome in a [`Response`].
    ///
    /// A panicking transport yields a failure envelope carrying the panic message, as with
    /// [`Client::execute_async`]. Transports that drive async I/O cannot block a
    /// single-threaded runtime: called from one, this returns a failure naming
    /// [`BlockingInAsyncContext`].
    #[tracing::instrument(skip_all, fields(address = %self.connection.address))]
    pub fn execute<O>(&self, request: &T::Request) -> Response<O>
    where
        T: TransportExecutor<O>,
    {
        debug!("executing request");

        let outcome = panic::catch_unwind(AssertUnwindSafe(|| {
            self.transport.run_transport(&self.connection, request)
        }))
        .unwrap_or_else(|payload| Err(Fault::new(panic_message(payload))));

        match outcome {
            Ok(content) => {
                debug!("request succeeded");
                Response::success(content)
            }
            Err(fault) => {
                let response = Response::failure(&fault);
                warn!(message = response.message(), "request failed");
                response
            }
        }
    }

    /// Executes `request` on tokio's blocking pool.
    ///
    /// The envelope is the one [`Client::execute`] would produce for the same request.
    pub async fn execute_async<O>(&self, request: T::Request) -> Response<O>
    where
        T: TransportExecutor<O>,
        O: Send + 'static,
    {
        let client = self.clone();

        tokio::task::spawn_blocking(move || {
            blocking::on_blocking_worker(|| client.execute(&request))
        })
            .await
            .unwrap_or_else(worker_failure)
    }

    /// Executes `request` on tokio's blocking pool until it completes or `token` is cancelled.
    ///
    /// Returns `Err(Cancelled)` as soon as cancellation is observed. If the token fires
    /// before the worker picks the request up, the transport is never invoked. Otherwise the
    /// transport runs to completion in the background and its envelope is discarded.
    pub async fn execute_async_with_cancellation<O>(
        &self,
        request: T::Request,
        token: CancellationToken,
    ) -> Result<Response<O>, Cancelled>
    where
        T: TransportExecutor<O>,
        O: Send + 'static,
    {
        if token.is_cancelled() {
            return Err(Cancelled);
        }

        let client = self.clone();
        let worker_token = token.clone();
        let mut worker = tokio::task::spawn_blocking(move || {
            if worker_token.is_cancelled() {
                return None;
            }
            Some(blocking::on_blocking_worker(|| client.execute(&request)))
        });

        tokio::select! {
            biased;
            _ = token.cancelled() => {
                // Only prevents the worker from starting; running transport work is not preempted.
                worker.abort();
                debug!("stopped waiting for a cancelled call");
                Err(Cancelled)
            }
            joined = &mut worker => match joined {
                Ok(Some(response)) => Ok(response),
                Ok(None) => Err(Cancelled),
                Err(err) => Ok(worker_failure(err)),
            },
        }
    }
}

fn worker_failure<O>(err: JoinError) -> Response<O> {
    let fault = if err.is_panic() {
        Fault::new(panic_message(err.into_panic()))
    } else {
        Fault::new(err)
    };

    let response = Response::failure(&fault);
    warn!(message = response.message(), "request worker failed");
    response
}

fn panic_message(payload: Box<dyn Any + Send>) -> String {
    payload
        .downcast_ref::<&str>()
        .map(|s| s.to_string())
        .or_else(|| payload.downcast_ref::<String>().cloned())
        .unwrap_or_else(|| "The transport panicked while executing the request".to_string())
}
