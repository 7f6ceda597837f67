//! Lockstep request/reply client.
//!
//! [`Client`] drives one [`Endpoint`] through a strict send-then-receive cycle
//! and guarantees that a reply is only ever returned for the request that
//! immediately preceded it on the same endpoint.
//!
//! # State machine
//!
//! ```text
//!                initialize            request (send ok)
//! Uninitialized ───────────► Ready ─────────────────────► AwaitingReply
//!       │                    ▲   ▲                             │
//!       │                    │   └──── reply ──────────────────┤
//!       │                    └──── timeout / error ────────────┘
//!       │                          (endpoint recreated)
//!       └──────── close ────────► Closed ◄──────── close ──── Ready
//! ```
//!
//! A timed-out exchange may still be answered later. The transport has no
//! correlation identifiers, so the spent endpoint is closed and a fresh one
//! opened before the call returns; a late reply dies with the old endpoint.

use std::time::Duration;

use thiserror::Error;
use tokio::time::Instant;

use crate::config::ClientConfig;
use crate::transport::{Endpoint, Received, SocketTransport, Transport, TransportError};

mod blocking;

pub use blocking::BlockingClient;

/// Lifecycle state of a [`Client`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ClientState {
    /// Created, no address bound yet.
    Uninitialized,
    /// Bound to an address with no request outstanding.
    Ready,
    /// A request was sent and its reply is being awaited. Only observable
    /// from outside if a `request` future was dropped mid-flight.
    AwaitingReply,
    /// Terminal.
    Closed,
}

/// Client-level failures.
#[derive(Debug, Error)]
pub enum ClientError {
    /// `request` was called before `initialize`.
    #[error("client is not initialized")]
    NotInitialized,

    /// `initialize` was called on a client that already has an address.
    #[error("client is already initialized")]
    AlreadyInitialized,

    /// The client has been closed.
    #[error("client is closed")]
    Closed,

    /// No reply arrived before the deadline. The endpoint has been recreated.
    #[error("request timed out after {}ms", .0.as_millis())]
    TimedOut(Duration),

    /// The spent endpoint could not be replaced. The next request reopens it.
    #[error("failed to recreate endpoint: {0}")]
    Recreate(#[source] TransportError),

    /// Transport failure on open, send or receive.
    #[error(transparent)]
    Transport(#[from] TransportError),
}

impl ClientError {
    /// True for [`ClientError::TimedOut`], the one outcome that is expected
    /// rather than a failure.
    pub fn is_timeout(&self) -> bool {
        matches!(self, ClientError::TimedOut(_))
    }
}

/// Address and timeout, fixed by `initialize`.
#[derive(Debug, Clone)]
struct Binding {
    address: String,
    timeout: Duration,
}

/// A request/reply client bound to a single remote address.
///
/// Not meant for concurrent use: every operation takes `&mut self`, which is
/// what keeps exchanges on the endpoint strictly sequential. Independent
/// clients share nothing and may run concurrently.
///
/// # Example
///
/// ```ignore
/// use lockstep_client::{Client, ClientConfig, SocketTransport};
///
/// let config = ClientConfig::new("tcp://127.0.0.1:5555");
/// let mut client = Client::connect(SocketTransport::new(), &config)?;
/// match client.request(br#"{"op":"ping"}"#).await {
///     Ok(reply) => println!("{}", String::from_utf8_lossy(reply)),
///     Err(e) if e.is_timeout() => println!("timed out"),
///     Err(e) => eprintln!("request failed: {}", e),
/// }
/// ```
pub struct Client<T: Transport = SocketTransport> {
    transport: T,
    state: ClientState,
    binding: Option<Binding>,
    /// Exactly one live endpoint while `Ready`, except after a failed
    /// recreate, when it is reopened lazily by the next request.
    endpoint: Option<T::Endpoint>,
    /// Last reply, lent out by `request` until the next call.
    reply: Vec<u8>,
    last_error: String,
}

impl<T: Transport> Client<T> {
    /// Create an uninitialized client.
    pub fn new(transport: T) -> Self {
        Self {
            transport,
            state: ClientState::Uninitialized,
            binding: None,
            endpoint: None,
            reply: Vec::new(),
            last_error: String::new(),
        }
    }

    /// Create a client and initialize it from `config`.
    pub fn connect(transport: T, config: &ClientConfig) -> Result<Self, ClientError> {
        let mut client = Self::new(transport);
        client.initialize(&config.address, config.timeout)?;
        Ok(client)
    }

    /// Bind the client to `address` and open its endpoint.
    ///
    /// # Errors
    ///
    /// - `AlreadyInitialized` if called twice (state unchanged)
    /// - `Closed` after `close`
    /// - `Transport` if the endpoint cannot be opened (state stays
    ///   `Uninitialized`)
    pub fn initialize(&mut self, address: &str, timeout: Duration) -> Result<(), ClientError> {
        match self.state {
            ClientState::Uninitialized => {}
            ClientState::Closed => return Err(self.fail(ClientError::Closed)),
            ClientState::Ready | ClientState::AwaitingReply => {
                return Err(self.fail(ClientError::AlreadyInitialized))
            }
        }

        match self.transport.open(address) {
            Ok(endpoint) => {
                self.endpoint = Some(endpoint);
                self.binding = Some(Binding {
                    address: address.to_string(),
                    timeout,
                });
                self.state = ClientState::Ready;
                self.last_error.clear();
                tracing::debug!(address, timeout_ms = timeout.as_millis() as u64, "client initialized");
                Ok(())
            }
            Err(e) => Err(self.fail(e.into())),
        }
    }

    /// Send `payload` and wait up to the configured timeout for its reply.
    ///
    /// The payload is forwarded untouched, empty or not. The returned reply
    /// borrows the client and is valid until the next call; copy it to keep
    /// it longer.
    ///
    /// # Errors
    ///
    /// - `TimedOut` if no reply arrived in time (endpoint recreated)
    /// - `Transport` if the send or receive failed (endpoint recreated after
    ///   a receive failure, kept after a send failure)
    /// - `Recreate` if the endpoint could not be replaced
    /// - `NotInitialized` / `Closed` if the client is not `Ready`
    pub async fn request(&mut self, payload: &[u8]) -> Result<&[u8], ClientError> {
        match self.exchange(payload).await {
            Ok(reply) => {
                self.reply = reply;
                self.last_error.clear();
                Ok(&self.reply)
            }
            Err(e) => Err(self.fail(e)),
        }
    }

    async fn exchange(&mut self, payload: &[u8]) -> Result<Vec<u8>, ClientError> {
        match self.state {
            ClientState::Uninitialized => return Err(ClientError::NotInitialized),
            ClientState::Closed => return Err(ClientError::Closed),
            ClientState::AwaitingReply => {
                // A previous request future was dropped before its reply came
                // back. Its endpoint went with it; never reuse that exchange.
                tracing::warn!("previous request was abandoned, starting on a fresh endpoint");
                if let Some(mut abandoned) = self.endpoint.take() {
                    abandoned.close();
                }
                self.state = ClientState::Ready;
            }
            ClientState::Ready => {}
        }

        let binding = self.binding.as_ref().ok_or(ClientError::NotInitialized)?;
        let timeout = binding.timeout;

        let mut endpoint = match self.endpoint.take() {
            Some(endpoint) => endpoint,
            None => {
                tracing::debug!(address = %binding.address, "reopening endpoint");
                self.transport.open(&binding.address)?
            }
        };

        self.state = ClientState::AwaitingReply;

        if let Err(e) = endpoint.send(payload) {
            // Nothing went out, so the endpoint holds no stale exchange.
            self.endpoint = Some(endpoint);
            self.state = ClientState::Ready;
            return Err(e.into());
        }

        match endpoint.receive(Instant::now() + timeout).await {
            Ok(Received::Reply(reply)) => {
                self.endpoint = Some(endpoint);
                self.state = ClientState::Ready;
                Ok(reply)
            }
            Ok(Received::TimedOut) => {
                tracing::warn!(timeout_ms = timeout.as_millis() as u64, "request timed out, recreating endpoint");
                self.recover(endpoint)?;
                Err(ClientError::TimedOut(timeout))
            }
            Err(e) => {
                tracing::warn!(error = %e, "receive failed, recreating endpoint");
                self.recover(endpoint)?;
                Err(e.into())
            }
        }
    }

    /// Swap a spent endpoint for a fresh one bound to the same address.
    fn recover(&mut self, spent: T::Endpoint) -> Result<(), ClientError> {
        self.state = ClientState::Ready;

        let recreated = match &self.binding {
            Some(binding) => self.transport.recreate(spent, &binding.address),
            None => {
                let mut spent = spent;
                spent.close();
                Err(TransportError::Closed)
            }
        };

        match recreated {
            Ok(fresh) => {
                self.endpoint = Some(fresh);
                tracing::debug!("endpoint recreated");
                Ok(())
            }
            Err(e) => {
                tracing::warn!(error = %e, "could not recreate endpoint, next request will reopen it");
                Err(ClientError::Recreate(e))
            }
        }
    }

    /// Most recent error message, or `""` if the last operation succeeded.
    pub fn last_error(&self) -> &str {
        &self.last_error
    }

    /// Release the endpoint. Safe to call more than once.
    pub fn close(&mut self) {
        if self.state == ClientState::Closed {
            return;
        }
        if let Some(mut endpoint) = self.endpoint.take() {
            endpoint.close();
        }
        self.reply = Vec::new();
        self.state = ClientState::Closed;
        tracing::debug!("client closed");
    }

    pub fn state(&self) -> ClientState {
        self.state
    }

    /// Remote address, once initialized.
    pub fn address(&self) -> Option<&str> {
        self.binding.as_ref().map(|b| b.address.as_str())
    }

    /// Request timeout, once initialized.
    pub fn timeout(&self) -> Option<Duration> {
        self.binding.as_ref().map(|b| b.timeout)
    }

    fn fail(&mut self, err: ClientError) -> ClientError {
        self.last_error = err.to_string();
        err
    }
}

impl<T: Transport> Drop for Client<T> {
    fn drop(&mut self) {
        self.close();
    }
}
