//! End-to-end tests for the async client over real sockets.
//!
//! # Running
//!
//! ```bash
//! cargo test --test socket_client -- --nocapture
//! ```

mod common;

use std::time::{Duration, Instant};

use common::{spawn_tcp, unused_tcp_address, Behavior, TEST_TIMEOUT};
use lockstep_client::{Client, ClientConfig, ClientError, ClientState, SocketTransport};
use pretty_assertions::assert_eq;
use tokio::time::timeout;

fn config(address: &str, timeout_ms: u64) -> ClientConfig {
    ClientConfig::new(address).with_timeout(Duration::from_millis(timeout_ms))
}

/// Immediate reply is returned byte for byte.
#[tokio::test]
async fn test_immediate_reply() {
    let server = spawn_tcp(vec![Behavior::Reply(br#"{"ok":true}"#.to_vec())]).await;
    let mut client = Client::connect(SocketTransport::new(), &config(&server.address, 3000)).unwrap();

    let reply = timeout(TEST_TIMEOUT, client.request(b"{}"))
        .await
        .expect("Test timed out")
        .expect("Request failed");

    assert_eq!(reply, br#"{"ok":true}"#);
    assert_eq!(client.last_error(), "");
    assert_eq!(server.requests(), vec![b"{}".to_vec()]);
}

/// A silent remote produces a timeout close to the configured bound, and the
/// client keeps working once the remote answers again.
#[tokio::test]
async fn test_timeout_then_recovery() {
    let server = spawn_tcp(vec![Behavior::Silent]).await;
    let mut client = Client::connect(SocketTransport::new(), &config(&server.address, 100)).unwrap();

    let started = Instant::now();
    let err = client.request(b"{}").await.unwrap_err();
    let elapsed = started.elapsed();

    assert!(err.is_timeout(), "expected timeout, got {:?}", err);
    assert!(elapsed >= Duration::from_millis(100), "returned early: {:?}", elapsed);
    assert!(elapsed < Duration::from_secs(2), "returned late: {:?}", elapsed);
    assert_eq!(client.state(), ClientState::Ready);

    let reply = client.request(b"{}").await.unwrap();
    assert_eq!(reply, b"{}");
    // The timed-out exchange's connection was abandoned for a new one.
    assert_eq!(server.connections(), 2);
}

/// A reply that shows up after its request timed out is never handed to the
/// next request.
#[tokio::test]
async fn test_late_reply_is_discarded() {
    let server = spawn_tcp(vec![Behavior::EchoAfter(Duration::from_millis(300))]).await;
    let mut client = Client::connect(SocketTransport::new(), &config(&server.address, 100)).unwrap();

    let err = client.request(b"first").await.unwrap_err();
    assert!(err.is_timeout());

    // Give the remote time to answer the first request.
    tokio::time::sleep(Duration::from_millis(400)).await;

    for payload in [b"second".as_slice(), b"third".as_slice()] {
        let reply = client.request(payload).await.unwrap();
        assert_eq!(reply, payload);
    }
    assert_eq!(
        server.requests(),
        vec![b"first".to_vec(), b"second".to_vec(), b"third".to_vec()]
    );
}

/// Remote hangs up mid-exchange: error, endpoint recreated, next call works.
#[tokio::test]
async fn test_remote_hangup_is_error_and_recovers() {
    let server = spawn_tcp(vec![Behavior::HangUp]).await;
    let mut client = Client::connect(SocketTransport::new(), &config(&server.address, 2000)).unwrap();

    let err = timeout(TEST_TIMEOUT, client.request(b"{}"))
        .await
        .expect("Test timed out")
        .unwrap_err();
    assert!(!err.is_timeout(), "expected transport error, got {:?}", err);
    assert!(matches!(err, ClientError::Transport(_)));
    assert!(!client.last_error().is_empty());

    let reply = client.request(b"again").await.unwrap();
    assert_eq!(reply, b"again");
    assert_eq!(client.last_error(), "");
}

/// Payloads of any content, including empty and non-UTF-8, round-trip
/// unchanged.
#[tokio::test]
async fn test_byte_transparency() {
    let server = spawn_tcp(vec![]).await;
    let mut client = Client::connect(SocketTransport::new(), &config(&server.address, 3000)).unwrap();

    let all_bytes: Vec<u8> = (0..=255).collect();
    let large = vec![b'x'; 1024 * 1024];
    for payload in [Vec::new(), b"{}".to_vec(), all_bytes, large] {
        let reply = client.request(&payload).await.unwrap();
        assert!(reply == payload.as_slice(), "reply differs for {} byte payload", payload.len());
    }
    assert_eq!(server.connections(), 1);
}

/// The remote may come up after the client was initialized.
#[tokio::test]
async fn test_remote_started_late() {
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let local = listener.local_addr().unwrap();
    drop(listener);
    let address = format!("tcp://{}", local);

    let mut client = Client::connect(SocketTransport::new(), &config(&address, 3000)).unwrap();

    tokio::spawn(async move {
        tokio::time::sleep(Duration::from_millis(200)).await;
        let listener = tokio::net::TcpListener::bind(local).await.unwrap();
        if let Ok((stream, _)) = listener.accept().await {
            let (read_half, mut write_half) = stream.into_split();
            let mut reader = tokio::io::BufReader::new(read_half);
            if let Ok(body) = lockstep_client::transport::read_message(&mut reader, 1024).await {
                let _ = lockstep_client::transport::write_message(&mut write_half, &body).await;
            }
        }
    });

    let reply = timeout(TEST_TIMEOUT, client.request(b"queued"))
        .await
        .expect("Test timed out")
        .unwrap();
    assert_eq!(reply, b"queued");
}

#[tokio::test]
async fn test_unreachable_remote_times_out() {
    let address = unused_tcp_address();
    let mut client = Client::connect(SocketTransport::new(), &config(&address, 100)).unwrap();

    for _ in 0..3 {
        assert!(client.request(b"{}").await.unwrap_err().is_timeout());
    }
    assert_eq!(client.last_error(), "request timed out after 100ms");
}

#[tokio::test]
async fn test_lifecycle_guards() {
    let server = spawn_tcp(vec![]).await;
    let mut client = Client::new(SocketTransport::new());

    assert!(matches!(client.request(b"{}").await, Err(ClientError::NotInitialized)));
    assert!(!client.last_error().is_empty());

    client.initialize(&server.address, Duration::from_secs(1)).unwrap();
    assert!(matches!(
        client.initialize(&server.address, Duration::from_secs(1)),
        Err(ClientError::AlreadyInitialized)
    ));

    client.close();
    client.close();
    assert!(matches!(client.request(b"{}").await, Err(ClientError::Closed)));
    assert!(server.requests().is_empty());
}

#[tokio::test]
async fn test_bad_address_fails_initialize() {
    let mut client = Client::new(SocketTransport::new());
    for address in ["", "localhost:5555", "http://localhost:80", "tcp://localhost"] {
        let err = client.initialize(address, Duration::from_secs(1)).unwrap_err();
        assert!(matches!(err, ClientError::Transport(_)), "{:?} -> {:?}", address, err);
        assert_eq!(client.state(), ClientState::Uninitialized);
        assert!(!client.last_error().is_empty());
    }
}

/// Several clients run concurrently without interfering.
#[tokio::test]
async fn test_independent_clients() {
    let server = spawn_tcp(vec![]).await;
    let mut handles = Vec::new();

    for i in 0..4 {
        let address = server.address.clone();
        handles.push(tokio::spawn(async move {
            let mut client =
                Client::connect(SocketTransport::new(), &config(&address, 3000)).unwrap();
            for j in 0..5 {
                let payload = format!("{{\"client\":{},\"seq\":{}}}", i, j);
                let reply = client.request(payload.as_bytes()).await.unwrap();
                assert_eq!(reply, payload.as_bytes());
            }
        }));
    }

    for handle in handles {
        timeout(TEST_TIMEOUT, handle).await.expect("Test timed out").unwrap();
    }
    assert_eq!(server.requests().len(), 20);
}

#[cfg(unix)]
#[tokio::test]
async fn test_ipc_roundtrip_and_timeout() {
    let path = common::test_socket_path("ipc_roundtrip");
    let server = common::spawn_ipc(&path, vec![Behavior::Echo, Behavior::Silent]).await;
    let mut client = Client::connect(SocketTransport::new(), &config(&server.address, 150)).unwrap();

    assert_eq!(client.request(b"{\"n\":1}").await.unwrap(), b"{\"n\":1}");
    assert!(client.request(b"{\"n\":2}").await.unwrap_err().is_timeout());
    assert_eq!(client.request(b"{\"n\":3}").await.unwrap(), b"{\"n\":3}");
    assert_eq!(server.connections(), 2);

    client.close();
    let _ = std::fs::remove_file(&path);
}
