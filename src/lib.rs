//! Lockstep request/reply client.
//!
//! Sends one opaque payload per call over a connection-oriented transport,
//! waits up to a timeout for the reply, and reports success, timeout or
//! failure distinctly.
//!
//! - `transport` - endpoints bound to one remote address (`tcp://`, `ipc://`)
//! - `client` - the request state machine and its blocking facade
//! - `config` - address/timeout resolution and the caller's timeout policy
//! - `format` - reply pretty-printing for display
//! - `session` - the stdin-to-stdout request loop behind the `lockstep` binary
//!
//! # Usage
//!
//! ```ignore
//! use lockstep_client::{Client, ClientConfig, SocketTransport};
//!
//! let config = ClientConfig::new("tcp://127.0.0.1:5555");
//! let mut client = Client::connect(SocketTransport::new(), &config)?;
//! let reply = client.request(br#"{"op":"status"}"#).await?;
//! ```
//!
//! After a timeout the client discards its endpoint and opens a new one, so
//! a reply that arrives late can never be handed to a later request.

pub mod client;
pub mod config;
pub mod format;
pub mod session;
pub mod transport;

pub use client::{BlockingClient, Client, ClientError, ClientState};
pub use config::{ClientConfig, ConfigError, TimeoutPolicy};
pub use transport::{SocketOptions, SocketTransport, TransportError};
