//! Transport and endpoint abstractions.
//!
//! A [`Transport`] opens [`Endpoint`]s bound to one remote address. An
//! endpoint is strictly lockstep: one `send`, then one `receive`, then the
//! next `send`. Replies carry no correlation identifier, so an endpoint whose
//! exchange was abandoned must be thrown away with [`Transport::recreate`].
//!
//! The traits exist so the client state machine can run against a test double
//! as well as against [`SocketTransport`](super::SocketTransport).

use async_trait::async_trait;
use thiserror::Error;
use tokio::time::Instant;

/// Transport-level failures.
#[derive(Debug, Error)]
pub enum TransportError {
    /// The connection string could not be interpreted.
    #[error("Invalid address: {0}")]
    InvalidAddress(String),

    /// No tokio runtime was available to drive the endpoint.
    #[error("No async runtime available to drive the endpoint")]
    NoRuntime,

    /// A send was attempted while the previous exchange was still open.
    #[error("Endpoint busy: previous request has not been answered")]
    Busy,

    /// The endpoint has been closed.
    #[error("Endpoint closed")]
    Closed,

    /// The endpoint's worker went away before producing a reply.
    #[error("Endpoint disconnected before a reply arrived")]
    Disconnected,

    /// I/O error on the underlying connection.
    #[error("I/O error: {0}")]
    Io(#[source] std::io::Error),

    /// Framing or wire protocol error.
    #[error("Protocol error: {0}")]
    Protocol(String),
}

impl From<std::io::Error> for TransportError {
    fn from(err: std::io::Error) -> Self {
        TransportError::Io(err)
    }
}

/// Outcome of a bounded wait for a reply.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Received {
    /// A complete reply.
    Reply(Vec<u8>),
    /// The deadline elapsed first. Not an error.
    TimedOut,
}

/// One live binding to a remote address.
#[async_trait]
pub trait Endpoint: Send {
    /// Enqueue `payload` as a single message. Never blocks on the network and
    /// never sends partially.
    fn send(&mut self, payload: &[u8]) -> Result<(), TransportError>;

    /// Wait until a complete reply is available or `deadline` passes.
    async fn receive(&mut self, deadline: Instant) -> Result<Received, TransportError>;

    /// Release every local resource. Idempotent.
    fn close(&mut self);
}

/// Factory for endpoints.
pub trait Transport {
    type Endpoint: Endpoint;

    /// Open an endpoint bound to `address`. Does not wait for the remote to
    /// be reachable.
    fn open(&self, address: &str) -> Result<Self::Endpoint, TransportError>;

    /// Close `old` and open a fresh endpoint bound to the same address.
    ///
    /// Anything in flight on `old` is discarded with it.
    fn recreate(
        &self,
        mut old: Self::Endpoint,
        address: &str,
    ) -> Result<Self::Endpoint, TransportError> {
        old.close();
        drop(old);
        self.open(address)
    }
}
