//! Socket-backed endpoints over TCP and Unix domain sockets.
//!
//! Each [`SocketEndpoint`] owns a worker task on the tokio runtime. The
//! endpoint hands requests to the worker through a capacity-1 channel and
//! collects replies from a second one. The worker connects lazily, retries
//! with exponential backoff while the remote is unreachable, and performs one
//! framed write followed by one framed read per request.
//!
//! ```text
//! ┌──────────────┐  request_tx (cap 1)  ┌──────────────┐   framed   ┌────────┐
//! │ SocketEndpoint│ ───────────────────► │ endpoint     │ ─────────► │ remote │
//! │              │ ◄─────────────────── │ worker task  │ ◄───────── │        │
//! └──────────────┘   reply_rx (cap 1)   └──────────────┘            └────────┘
//! ```
//!
//! Closing the endpoint aborts the worker, which drops the connection along
//! with any reply still on its way.

use std::io;
use std::time::Duration;

use async_trait::async_trait;
use tokio::io::{AsyncRead, AsyncWrite, BufReader};
use tokio::net::TcpStream;
#[cfg(unix)]
use tokio::net::UnixStream;
use tokio::runtime::Handle;
use tokio::sync::mpsc::{self, error::TrySendError};
use tokio::task::JoinHandle;
use tokio::time::{timeout_at, Instant};

use super::address::Address;
use super::endpoint::{Endpoint, Received, Transport, TransportError};
use super::framing::{read_message, write_message, DEFAULT_MAX_MESSAGE_SIZE};

/// Lower bound on the reconnect delay so a zero setting cannot spin.
const MIN_RECONNECT_DELAY: Duration = Duration::from_millis(1);

/// Tunables for socket endpoints.
#[derive(Debug, Clone)]
pub struct SocketOptions {
    /// Largest reply body accepted from the remote.
    pub max_message_size: usize,
    /// Delay before the first reconnect attempt.
    pub initial_reconnect_delay: Duration,
    /// Ceiling for the exponential reconnect delay.
    pub max_reconnect_delay: Duration,
    /// Set TCP_NODELAY on TCP connections.
    pub nodelay: bool,
}

impl Default for SocketOptions {
    fn default() -> Self {
        Self {
            max_message_size: DEFAULT_MAX_MESSAGE_SIZE,
            initial_reconnect_delay: Duration::from_millis(100),
            max_reconnect_delay: Duration::from_secs(5),
            nodelay: true,
        }
    }
}

/// Opens [`SocketEndpoint`]s.
///
/// Endpoints are driven by the runtime given to [`SocketTransport::with_runtime`],
/// or by the runtime current at `open` time.
#[derive(Debug, Clone, Default)]
pub struct SocketTransport {
    options: SocketOptions,
    runtime: Option<Handle>,
}

impl SocketTransport {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_options(options: SocketOptions) -> Self {
        Self {
            options,
            runtime: None,
        }
    }

    /// Spawn endpoint workers on `handle` instead of the current runtime.
    pub fn with_runtime(mut self, handle: Handle) -> Self {
        self.runtime = Some(handle);
        self
    }

    pub fn options(&self) -> &SocketOptions {
        &self.options
    }
}

impl Transport for SocketTransport {
    type Endpoint = SocketEndpoint;

    fn open(&self, address: &str) -> Result<SocketEndpoint, TransportError> {
        let address = Address::parse(address)?;
        let runtime = match &self.runtime {
            Some(handle) => handle.clone(),
            None => Handle::try_current().map_err(|_| TransportError::NoRuntime)?,
        };

        let (request_tx, request_rx) = mpsc::channel::<Vec<u8>>(1);
        let (reply_tx, reply_rx) = mpsc::channel(1);

        let worker = runtime.spawn(endpoint_worker(
            address.clone(),
            self.options.clone(),
            request_rx,
            reply_tx,
        ));

        tracing::debug!(%address, "endpoint opened");

        Ok(SocketEndpoint {
            address,
            request_tx,
            reply_rx,
            worker: Some(worker),
            awaiting_reply: false,
        })
    }
}

/// A lockstep endpoint bound to one remote address.
pub struct SocketEndpoint {
    address: Address,
    request_tx: mpsc::Sender<Vec<u8>>,
    reply_rx: mpsc::Receiver<Result<Vec<u8>, TransportError>>,
    /// `None` once closed.
    worker: Option<JoinHandle<()>>,
    /// Set by `send`, cleared when `receive` yields a reply or an error.
    /// A timed-out receive leaves it set: the endpoint is spent.
    awaiting_reply: bool,
}

impl SocketEndpoint {
    pub fn address(&self) -> &Address {
        &self.address
    }

    pub fn is_closed(&self) -> bool {
        self.worker.is_none()
    }
}

#[async_trait]
impl Endpoint for SocketEndpoint {
    fn send(&mut self, payload: &[u8]) -> Result<(), TransportError> {
        if self.is_closed() {
            return Err(TransportError::Closed);
        }
        if self.awaiting_reply {
            return Err(TransportError::Busy);
        }

        match self.request_tx.try_send(payload.to_vec()) {
            Ok(()) => {
                self.awaiting_reply = true;
                Ok(())
            }
            Err(TrySendError::Full(_)) => Err(TransportError::Busy),
            Err(TrySendError::Closed(_)) => Err(TransportError::Closed),
        }
    }

    async fn receive(&mut self, deadline: Instant) -> Result<Received, TransportError> {
        if self.is_closed() {
            return Err(TransportError::Closed);
        }
        if !self.awaiting_reply {
            return Err(TransportError::Protocol(
                "receive called with no request outstanding".to_string(),
            ));
        }

        match timeout_at(deadline, self.reply_rx.recv()).await {
            Err(_) => Ok(Received::TimedOut),
            Ok(Some(Ok(reply))) => {
                self.awaiting_reply = false;
                Ok(Received::Reply(reply))
            }
            Ok(Some(Err(e))) => {
                self.awaiting_reply = false;
                Err(e)
            }
            Ok(None) => {
                self.awaiting_reply = false;
                Err(TransportError::Disconnected)
            }
        }
    }

    fn close(&mut self) {
        if let Some(worker) = self.worker.take() {
            worker.abort();
            self.reply_rx.close();
            tracing::debug!(address = %self.address, "endpoint closed");
        }
    }
}

impl Drop for SocketEndpoint {
    fn drop(&mut self) {
        self.close();
    }
}

type BoxedReader = BufReader<Box<dyn AsyncRead + Send + Unpin>>;
type BoxedWriter = Box<dyn AsyncWrite + Send + Unpin>;

/// An established stream connection, split for framed I/O.
struct Connection {
    reader: BoxedReader,
    writer: BoxedWriter,
}

impl Connection {
    fn new<R, W>(read_half: R, write_half: W) -> Self
    where
        R: AsyncRead + Send + Unpin + 'static,
        W: AsyncWrite + Send + Unpin + 'static,
    {
        Self {
            reader: BufReader::new(Box::new(read_half)),
            writer: Box::new(write_half),
        }
    }
}

/// Worker loop: one exchange per queued request, one result per exchange.
async fn endpoint_worker(
    address: Address,
    options: SocketOptions,
    mut requests: mpsc::Receiver<Vec<u8>>,
    replies: mpsc::Sender<Result<Vec<u8>, TransportError>>,
) {
    let mut connection: Option<Connection> = None;

    while let Some(payload) = requests.recv().await {
        let result = exchange(&address, &options, &mut connection, &payload).await;

        if let Err(ref e) = result {
            tracing::debug!(%address, error = %e, "exchange failed, connection dropped");
        }

        if replies.send(result).await.is_err() {
            break;
        }
    }

    tracing::trace!(%address, "endpoint worker exiting");
}

/// Write `payload` and read its reply, connecting first if needed.
///
/// The connection is only kept when the whole exchange succeeded.
async fn exchange(
    address: &Address,
    options: &SocketOptions,
    connection: &mut Option<Connection>,
    payload: &[u8],
) -> Result<Vec<u8>, TransportError> {
    let mut conn = match connection.take() {
        Some(conn) => conn,
        None => connect_with_backoff(address, options).await,
    };

    write_message(&mut conn.writer, payload)
        .await
        .map_err(framing_error)?;

    let reply = read_message(&mut conn.reader, options.max_message_size)
        .await
        .map_err(framing_error)?;

    *connection = Some(conn);
    Ok(reply)
}

/// Connect, retrying until it succeeds. Only the endpoint's deadline or
/// `close` ends the wait.
async fn connect_with_backoff(address: &Address, options: &SocketOptions) -> Connection {
    let mut delay = options.initial_reconnect_delay.max(MIN_RECONNECT_DELAY);
    let mut attempt: u32 = 1;

    loop {
        match dial(address, options).await {
            Ok(conn) => {
                tracing::debug!(%address, attempt, "connected");
                return conn;
            }
            Err(e) => {
                tracing::trace!(%address, attempt, error = %e, ?delay, "connect failed, retrying");
                tokio::time::sleep(delay).await;
                delay = (delay * 2).min(options.max_reconnect_delay.max(MIN_RECONNECT_DELAY));
                attempt = attempt.saturating_add(1);
            }
        }
    }
}

async fn dial(address: &Address, options: &SocketOptions) -> io::Result<Connection> {
    match address {
        Address::Tcp(authority) => {
            let stream = TcpStream::connect(authority.as_str()).await?;
            stream.set_nodelay(options.nodelay)?;
            let (read_half, write_half) = stream.into_split();
            Ok(Connection::new(read_half, write_half))
        }
        #[cfg(unix)]
        Address::Ipc(path) => {
            let stream = UnixStream::connect(path).await?;
            let (read_half, write_half) = stream.into_split();
            Ok(Connection::new(read_half, write_half))
        }
    }
}

fn framing_error(err: anyhow::Error) -> TransportError {
    match err.downcast_ref::<io::Error>() {
        Some(io_err) => TransportError::Io(io::Error::new(io_err.kind(), format!("{:#}", err))),
        None => TransportError::Protocol(format!("{:#}", err)),
    }
}
