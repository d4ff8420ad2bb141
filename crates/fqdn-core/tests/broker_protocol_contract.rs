//! Contract test: credential broker wire protocol
//!
//! Runs the real server on a temp-dir socket and drives it with the
//! real client plus raw socket I/O, verifying:
//! - the OK path returns the stored username|secret pair
//! - a provider without a row maps to `NoCredentials`
//! - a missing database maps to `DatabaseNotFound`
//! - malformed input gets `ERROR:unknown command`, never a crash
//! - `has_credentials` swallows every error as `false`
//! - a malformed OK response maps to `IncompleteCredentials`

use std::path::Path;
use std::time::Duration;

use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::net::{UnixListener, UnixStream};

use fqdn_core::error::BrokerError;
use fqdn_core::{BrokerClient, BrokerServer, CredentialStore};

/// Spawn a broker and wait for its socket to appear
async fn start_broker(socket: &Path, store: &Path) -> tokio::task::JoinHandle<()> {
    let server = BrokerServer::new(socket, store);
    let handle = tokio::spawn(async move {
        let _ = server.run().await;
    });

    for _ in 0..100 {
        if socket.exists() {
            return handle;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    panic!("broker socket never appeared at {}", socket.display());
}

#[tokio::test]
async fn serves_stored_credentials() {
    let dir = tempfile::tempdir().unwrap();
    let store_path = dir.path().join("credentials.json");
    let socket_path = dir.path().join("credd.sock");

    let store = CredentialStore::init(&store_path).await.unwrap();
    store.add("wedos.com", "admin@example.com", "s3cret").await.unwrap();

    let server = start_broker(&socket_path, &store_path).await;

    let client = BrokerClient::new(&socket_path);
    let cred = client.get_credentials("wedos.com").await.unwrap();
    assert_eq!(cred.username, "admin@example.com");
    assert_eq!(cred.secret, "s3cret");
    assert!(client.has_credentials("wedos.com").await);

    server.abort();
}

#[tokio::test]
async fn missing_provider_maps_to_no_credentials() {
    let dir = tempfile::tempdir().unwrap();
    let store_path = dir.path().join("credentials.json");
    let socket_path = dir.path().join("credd.sock");

    CredentialStore::init(&store_path).await.unwrap();
    let server = start_broker(&socket_path, &store_path).await;

    let client = BrokerClient::new(&socket_path);
    assert_eq!(
        client.get_credentials("wedos.com").await,
        Err(BrokerError::NoCredentials("wedos.com".to_string()))
    );
    // the probe is never an error path
    assert!(!client.has_credentials("wedos.com").await);

    server.abort();
}

#[tokio::test]
async fn missing_database_maps_to_database_not_found() {
    let dir = tempfile::tempdir().unwrap();
    let socket_path = dir.path().join("credd.sock");

    // the store file was never provisioned
    let server = start_broker(&socket_path, &dir.path().join("credentials.json")).await;

    let client = BrokerClient::new(&socket_path);
    assert_eq!(
        client.get_credentials("wedos.com").await,
        Err(BrokerError::DatabaseNotFound)
    );

    server.abort();
}

#[tokio::test]
async fn malformed_request_gets_unknown_command() {
    let dir = tempfile::tempdir().unwrap();
    let store_path = dir.path().join("credentials.json");
    let socket_path = dir.path().join("credd.sock");

    CredentialStore::init(&store_path).await.unwrap();
    let server = start_broker(&socket_path, &store_path).await;

    for request in ["HELLO\n", "GET_CREDS:\n", "\n"] {
        let mut stream = UnixStream::connect(&socket_path).await.unwrap();
        stream.write_all(request.as_bytes()).await.unwrap();

        let mut reader = BufReader::new(stream);
        let mut line = String::new();
        reader.read_line(&mut line).await.unwrap();
        assert_eq!(line.trim(), "ERROR:unknown command", "request {request:?}");
    }

    server.abort();
}

#[tokio::test]
async fn absent_socket_maps_to_socket_not_found() {
    let dir = tempfile::tempdir().unwrap();
    let client = BrokerClient::new(dir.path().join("nonexistent.sock"));

    assert!(matches!(
        client.get_credentials("wedos.com").await,
        Err(BrokerError::SocketNotFound { .. })
    ));
    assert!(!client.has_credentials("wedos.com").await);
}

#[tokio::test]
async fn truncated_ok_response_is_incomplete_credentials() {
    let dir = tempfile::tempdir().unwrap();
    let socket_path = dir.path().join("fake.sock");

    // a fake broker that answers with an OK missing the secret
    let listener = UnixListener::bind(&socket_path).unwrap();
    tokio::spawn(async move {
        loop {
            let Ok((stream, _)) = listener.accept().await else {
                break;
            };
            let mut reader = BufReader::new(stream);
            let mut line = String::new();
            let _ = reader.read_line(&mut line).await;
            let _ = reader.get_mut().write_all(b"OK:useronly\n").await;
        }
    });

    let client = BrokerClient::new(&socket_path);
    assert_eq!(
        client.get_credentials("wedos.com").await,
        Err(BrokerError::IncompleteCredentials("wedos.com".to_string()))
    );
}
