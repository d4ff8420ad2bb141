// # Credential Broker Client
//
// Maps the wire protocol plus every transport failure into the
// `BrokerError` taxonomy; a raw I/O error never escapes this module.

use async_trait::async_trait;
use std::path::PathBuf;
use std::time::Duration;
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::net::UnixStream;
use tracing::{debug, trace};

use crate::error::BrokerError;
use crate::state::Credential;
use crate::traits::CredentialSource;

use super::{
    ERR_DB_NOT_FOUND, ERR_NO_CREDS_PREFIX, ERROR_PREFIX, GET_CREDS_PREFIX, OK_PREFIX,
};

/// Seconds to wait for the broker's response line
const RESPONSE_TIMEOUT_SECS: u64 = 10;

/// Client for the credential broker socket
#[derive(Debug, Clone)]
pub struct BrokerClient {
    socket_path: PathBuf,
}

impl BrokerClient {
    /// Create a client for the broker at `socket_path`
    pub fn new(socket_path: impl Into<PathBuf>) -> Self {
        Self {
            socket_path: socket_path.into(),
        }
    }

    /// Fetch the credential for a provider.
    ///
    /// Every failure mode maps to exactly one `BrokerError` variant;
    /// callers can rely on the taxonomy for their exit signals.
    pub async fn get_credentials(&self, provider: &str) -> Result<Credential, BrokerError> {
        let stream = UnixStream::connect(&self.socket_path).await.map_err(|e| {
            debug!(socket = %self.socket_path.display(), error = %e, "broker connect failed");
            BrokerError::SocketNotFound {
                path: self.socket_path.display().to_string(),
            }
        })?;

        let mut reader = BufReader::new(stream);
        let request = format!("{GET_CREDS_PREFIX}{provider}\n");
        reader
            .get_mut()
            .write_all(request.as_bytes())
            .await
            .map_err(|e| BrokerError::Generic(format!("request write failed: {e}")))?;

        let mut line = String::new();
        let read = tokio::time::timeout(
            Duration::from_secs(RESPONSE_TIMEOUT_SECS),
            reader.read_line(&mut line),
        )
        .await;
        match read {
            Ok(Ok(0)) => return Err(BrokerError::InvalidResponse),
            Ok(Ok(_)) => {}
            Ok(Err(e)) => return Err(BrokerError::Generic(format!("response read failed: {e}"))),
            Err(_) => return Err(BrokerError::Generic("broker response timed out".to_string())),
        }

        parse_response(line.trim(), provider)
    }

    /// Non-mutating probe: does the broker have credentials for a
    /// provider? Swallows every broker error as `false`.
    pub async fn has_credentials(&self, provider: &str) -> bool {
        match self.get_credentials(provider).await {
            Ok(_) => true,
            Err(e) => {
                trace!(provider, error = %e, "credential probe negative");
                false
            }
        }
    }
}

fn parse_response(line: &str, provider: &str) -> Result<Credential, BrokerError> {
    if let Some(payload) = line.strip_prefix(OK_PREFIX) {
        return match payload.split_once('|') {
            Some((username, secret)) if !username.is_empty() && !secret.is_empty() => {
                Ok(Credential {
                    username: username.to_string(),
                    secret: secret.to_string(),
                })
            }
            _ => Err(BrokerError::IncompleteCredentials(provider.to_string())),
        };
    }

    if let Some(detail) = line.strip_prefix(ERROR_PREFIX) {
        if let Some(missing) = detail.strip_prefix(ERR_NO_CREDS_PREFIX) {
            return Err(BrokerError::NoCredentials(missing.to_string()));
        }
        if detail == ERR_DB_NOT_FOUND {
            return Err(BrokerError::DatabaseNotFound);
        }
        return Err(BrokerError::Generic(detail.to_string()));
    }

    Err(BrokerError::InvalidResponse)
}

#[async_trait]
impl CredentialSource for BrokerClient {
    async fn get(&self, provider: &str) -> Result<Credential, BrokerError> {
        self.get_credentials(provider).await
    }
}
