// # Credential Broker Server
//
// Accept loop over a Unix socket, one task per connection. The broker
// holds no session state: every request independently re-opens the
// credential store, which makes it restart-safe and horizontally
// replaceable. Malformed input gets `ERROR:unknown command`; a slow or
// silent client is cut off by a read timeout rather than hanging a task
// forever.

use std::path::{Path, PathBuf};
use std::time::Duration;
use tokio::io::{AsyncBufReadExt, AsyncReadExt, AsyncWriteExt, BufReader};
use tokio::net::{UnixListener, UnixStream};
use tracing::{debug, info, warn};

use crate::error::{Error, Result};
use crate::state::CredentialStore;

use super::{
    ERR_DB_NOT_FOUND, ERR_NO_CREDS_PREFIX, ERR_UNKNOWN_COMMAND, ERROR_PREFIX, GET_CREDS_PREFIX,
    OK_PREFIX,
};

/// Seconds a connection may take to deliver its request line
const READ_TIMEOUT_SECS: u64 = 5;

/// Longest request line the broker will buffer
const MAX_REQUEST_BYTES: u64 = 1024;

/// Credential broker server
pub struct BrokerServer {
    socket_path: PathBuf,
    store_path: PathBuf,
}

impl BrokerServer {
    /// Create a broker serving credentials from `store_path` on
    /// `socket_path`
    pub fn new(socket_path: impl Into<PathBuf>, store_path: impl Into<PathBuf>) -> Self {
        Self {
            socket_path: socket_path.into(),
            store_path: store_path.into(),
        }
    }

    /// Bind the socket and serve until the process terminates.
    ///
    /// A stale socket file from a previous run is removed before
    /// binding. Socket permissions are tightened to owner/group.
    pub async fn run(&self) -> Result<()> {
        if self.socket_path.exists() {
            tokio::fs::remove_file(&self.socket_path).await.map_err(|e| {
                Error::config(format!(
                    "failed to remove stale socket {}: {}",
                    self.socket_path.display(),
                    e
                ))
            })?;
        }

        let listener = UnixListener::bind(&self.socket_path).map_err(|e| {
            Error::config(format!(
                "failed to bind broker socket {}: {}",
                self.socket_path.display(),
                e
            ))
        })?;

        #[cfg(unix)]
        {
            use std::os::unix::fs::PermissionsExt;
            let perms = std::fs::Permissions::from_mode(0o660);
            tokio::fs::set_permissions(&self.socket_path, perms).await?;
        }

        info!(socket = %self.socket_path.display(), "credential broker listening");

        loop {
            let (stream, _addr) = listener.accept().await?;
            let store_path = self.store_path.clone();
            tokio::spawn(async move {
                if let Err(e) = handle_connection(stream, &store_path).await {
                    debug!(error = %e, "broker connection ended with error");
                }
            });
        }
    }
}

async fn handle_connection(stream: UnixStream, store_path: &Path) -> std::io::Result<()> {
    let mut reader = BufReader::new(stream).take(MAX_REQUEST_BYTES);

    let mut line = String::new();
    let read = tokio::time::timeout(
        Duration::from_secs(READ_TIMEOUT_SECS),
        reader.read_line(&mut line),
    )
    .await;

    let response = match read {
        Ok(Ok(0)) => return Ok(()), // client went away without a request
        Ok(Ok(_)) => respond(line.trim(), store_path).await,
        Ok(Err(e)) => {
            warn!(error = %e, "broker request read failed");
            return Ok(());
        }
        Err(_) => {
            warn!("broker request timed out");
            format!("{ERROR_PREFIX}{ERR_UNKNOWN_COMMAND}")
        }
    };

    let mut stream = reader.into_inner().into_inner();
    stream.write_all(response.as_bytes()).await?;
    stream.write_all(b"\n").await?;
    stream.flush().await?;
    Ok(())
}

/// Compute the single-line response for a single-line request.
///
/// Never panics and never leaks secrets into logs: the response text is
/// the only place credential material appears.
async fn respond(request: &str, store_path: &Path) -> String {
    let Some(provider) = request.strip_prefix(GET_CREDS_PREFIX) else {
        debug!("broker received unknown command");
        return format!("{ERROR_PREFIX}{ERR_UNKNOWN_COMMAND}");
    };

    let provider = provider.trim();
    if provider.is_empty() {
        return format!("{ERROR_PREFIX}{ERR_UNKNOWN_COMMAND}");
    }

    match CredentialStore::open(store_path).await {
        Ok(store) => match store.get(provider).await {
            Ok(Some(cred)) => {
                debug!(provider, "credentials served");
                format!("{OK_PREFIX}{}|{}", cred.username, cred.secret)
            }
            Ok(None) => format!("{ERROR_PREFIX}{ERR_NO_CREDS_PREFIX}{provider}"),
            Err(e) => format!("{ERROR_PREFIX}{e}"),
        },
        Err(Error::StoreNotInitialized { .. }) => {
            format!("{ERROR_PREFIX}{ERR_DB_NOT_FOUND}")
        }
        Err(e) => format!("{ERROR_PREFIX}{e}"),
    }
}
