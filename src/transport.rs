//! Transport endpoints for lockstep request/reply exchanges.
//!
//! An endpoint is a single outbound binding to one remote address that
//! carries one request, then one reply, then the next request. Nothing on the
//! wire correlates a reply with its request; ordering is the only link.
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────┐  send / receive   ┌────────────────┐   Content-Length   ┌────────┐
//! │   Client    │ ─────────────────►│ SocketEndpoint │ ◄────────────────► │ remote │
//! │ (lockstep)  │    recreate       │  (worker task) │   tcp:// | ipc://  │        │
//! └─────────────┘                   └────────────────┘                    └────────┘
//! ```
//!
//! # Usage
//!
//! ```ignore
//! use lockstep_client::transport::{Endpoint, SocketTransport, Transport};
//!
//! let transport = SocketTransport::new();
//! let mut endpoint = transport.open("tcp://127.0.0.1:5555")?;
//! endpoint.send(b"{}")?;
//! let received = endpoint.receive(tokio::time::Instant::now() + timeout).await?;
//! ```

mod address;
mod endpoint;
mod framing;
mod socket;

pub use address::Address;
pub use endpoint::{Endpoint, Received, Transport, TransportError};
pub use framing::{read_message, write_message, DEFAULT_MAX_MESSAGE_SIZE};
pub use socket::{SocketEndpoint, SocketOptions, SocketTransport};
