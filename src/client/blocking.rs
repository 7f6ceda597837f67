//! Synchronous facade over [`Client`].
//!
//! Owns a current-thread tokio runtime. Endpoint workers run only while a
//! call is blocked in [`BlockingClient::request`], which is exactly when the
//! exchange needs to make progress.

use std::time::Duration;

use tokio::runtime::{Builder, Runtime};

use super::{Client, ClientError, ClientState};
use crate::config::ClientConfig;
use crate::transport::{SocketOptions, SocketTransport, TransportError};

/// Blocking request/reply client over sockets.
///
/// Must not be used from inside an async context: `request` blocks the
/// calling thread on its own runtime.
///
/// # Example
///
/// ```ignore
/// use lockstep_client::{BlockingClient, ClientConfig};
///
/// let mut client = BlockingClient::connect(&ClientConfig::new("tcp://127.0.0.1:5555"))?;
/// let reply = client.request(b"{}")?.to_vec();
/// ```
pub struct BlockingClient {
    // Declared first so endpoints are closed before the runtime shuts down.
    inner: Client<SocketTransport>,
    runtime: Runtime,
}

impl BlockingClient {
    /// Create an uninitialized client with default socket options.
    pub fn new() -> Result<Self, ClientError> {
        Self::with_options(SocketOptions::default())
    }

    /// Create an uninitialized client.
    ///
    /// # Errors
    ///
    /// Fails only if the runtime cannot be built (resource exhaustion).
    pub fn with_options(options: SocketOptions) -> Result<Self, ClientError> {
        let runtime = Builder::new_current_thread()
            .enable_all()
            .build()
            .map_err(TransportError::from)?;
        let transport = SocketTransport::with_options(options).with_runtime(runtime.handle().clone());

        Ok(Self {
            inner: Client::new(transport),
            runtime,
        })
    }

    /// Create a client and initialize it from `config`.
    pub fn connect(config: &ClientConfig) -> Result<Self, ClientError> {
        let mut client = Self::new()?;
        client.initialize(&config.address, config.timeout)?;
        Ok(client)
    }

    /// See [`Client::initialize`].
    pub fn initialize(&mut self, address: &str, timeout: Duration) -> Result<(), ClientError> {
        self.inner.initialize(address, timeout)
    }

    /// See [`Client::request`]. Blocks for at most the configured timeout
    /// (plus the time to recreate the endpoint).
    pub fn request(&mut self, payload: &[u8]) -> Result<&[u8], ClientError> {
        self.runtime.block_on(self.inner.request(payload))
    }

    pub fn last_error(&self) -> &str {
        self.inner.last_error()
    }

    /// See [`Client::close`].
    pub fn close(&mut self) {
        self.inner.close();
    }

    pub fn state(&self) -> ClientState {
        self.inner.state()
    }

    pub fn address(&self) -> Option<&str> {
        self.inner.address()
    }

    pub fn timeout(&self) -> Option<Duration> {
        self.inner.timeout()
    }
}
