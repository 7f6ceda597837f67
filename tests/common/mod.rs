//! Scriptable framed remotes for integration tests.
//!
//! Each server answers requests in arrival order according to a shared
//! script. Requests beyond the script are echoed back.

#![allow(dead_code)]

use std::collections::VecDeque;
use std::path::PathBuf;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use lockstep_client::transport::{read_message, write_message, DEFAULT_MAX_MESSAGE_SIZE};
use tokio::io::{AsyncRead, AsyncWrite, BufReader};
use tokio::net::TcpListener;
use tokio::runtime::Runtime;

/// Test timeout to prevent hanging tests.
pub const TEST_TIMEOUT: Duration = Duration::from_secs(10);

/// What the remote does with one request.
#[derive(Debug, Clone)]
pub enum Behavior {
    /// Reply with the request body.
    Echo,
    /// Reply with fixed bytes.
    Reply(Vec<u8>),
    /// Echo after a delay.
    EchoAfter(Duration),
    /// Never reply on this connection.
    Silent,
    /// Close the connection without replying.
    HangUp,
}

#[derive(Clone, Default)]
struct Shared {
    script: Arc<Mutex<VecDeque<Behavior>>>,
    requests: Arc<Mutex<Vec<Vec<u8>>>>,
    connections: Arc<Mutex<usize>>,
}

/// A running scripted remote.
pub struct TestServer {
    pub address: String,
    shared: Shared,
}

impl TestServer {
    /// Every request body received so far, in order.
    pub fn requests(&self) -> Vec<Vec<u8>> {
        self.shared.requests.lock().unwrap().clone()
    }

    /// Number of accepted connections.
    pub fn connections(&self) -> usize {
        *self.shared.connections.lock().unwrap()
    }

    /// Append behaviors for requests not yet received.
    pub fn script(&self, behaviors: impl IntoIterator<Item = Behavior>) {
        self.shared.script.lock().unwrap().extend(behaviors);
    }
}

/// Start a TCP remote on an ephemeral port.
pub async fn spawn_tcp(script: Vec<Behavior>) -> TestServer {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let address = format!("tcp://{}", listener.local_addr().unwrap());
    let shared = Shared::default();
    shared.script.lock().unwrap().extend(script);

    let accept_shared = shared.clone();
    tokio::spawn(async move {
        while let Ok((stream, _)) = listener.accept().await {
            *accept_shared.connections.lock().unwrap() += 1;
            let (read_half, write_half) = stream.into_split();
            tokio::spawn(serve(read_half, write_half, accept_shared.clone()));
        }
    });

    TestServer { address, shared }
}

/// Start a Unix domain socket remote at `path`.
#[cfg(unix)]
pub async fn spawn_ipc(path: &std::path::Path, script: Vec<Behavior>) -> TestServer {
    let _ = std::fs::remove_file(path);
    let listener = tokio::net::UnixListener::bind(path).unwrap();
    let address = format!("ipc://{}", path.display());
    let shared = Shared::default();
    shared.script.lock().unwrap().extend(script);

    let accept_shared = shared.clone();
    tokio::spawn(async move {
        while let Ok((stream, _)) = listener.accept().await {
            *accept_shared.connections.lock().unwrap() += 1;
            let (read_half, write_half) = stream.into_split();
            tokio::spawn(serve(read_half, write_half, accept_shared.clone()));
        }
    });

    TestServer { address, shared }
}

async fn serve<R, W>(read_half: R, mut write_half: W, shared: Shared)
where
    R: AsyncRead + Unpin,
    W: AsyncWrite + Unpin,
{
    let mut reader = BufReader::new(read_half);

    loop {
        let body = match read_message(&mut reader, DEFAULT_MAX_MESSAGE_SIZE).await {
            Ok(body) => body,
            Err(_) => return,
        };
        shared.requests.lock().unwrap().push(body.clone());
        let behavior = shared
            .script
            .lock()
            .unwrap()
            .pop_front()
            .unwrap_or(Behavior::Echo);

        let reply = match behavior {
            Behavior::Echo => body,
            Behavior::Reply(bytes) => bytes,
            Behavior::EchoAfter(delay) => {
                tokio::time::sleep(delay).await;
                body
            }
            Behavior::Silent => continue,
            Behavior::HangUp => return,
        };

        if write_message(&mut write_half, &reply).await.is_err() {
            return;
        }
    }
}

/// A TCP remote running on its own multi-threaded runtime, for tests that
/// drive blocking clients from the test thread.
pub struct BackgroundServer {
    pub server: TestServer,
    _runtime: Runtime,
}

pub fn spawn_tcp_background(script: Vec<Behavior>) -> BackgroundServer {
    let runtime = tokio::runtime::Builder::new_multi_thread()
        .worker_threads(2)
        .enable_all()
        .build()
        .unwrap();
    let server = runtime.block_on(spawn_tcp(script));
    BackgroundServer {
        server,
        _runtime: runtime,
    }
}

/// Unique socket path for this test.
pub fn test_socket_path(test_name: &str) -> PathBuf {
    let pid = std::process::id();
    let timestamp = std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .unwrap()
        .as_nanos();
    PathBuf::from(format!(
        "/tmp/lockstep-test-{}-{}-{}.sock",
        test_name, pid, timestamp
    ))
}

/// An address with nothing listening behind it.
pub fn unused_tcp_address() -> String {
    let listener = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
    let address = format!("tcp://{}", listener.local_addr().unwrap());
    drop(listener);
    address
}
