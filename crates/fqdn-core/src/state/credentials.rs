// # Credential Store
//
// Durable table of provider → username/secret. Protection is OS file
// permissions plus the broker's narrow socket protocol; there is no
// encryption layer. Secrets are never logged and never appear in
// listings.
//
// Fail-fast like the domain store: operations on a missing backing file
// return `StoreNotInitialized`.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio::fs;
use tokio::io::AsyncWriteExt;
use tokio::sync::RwLock;
use tracing::{debug, info};

use crate::error::{Error, Result};

/// One credential set for a provider
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Credential {
    /// API username / account identifier
    pub username: String,
    /// API secret / token
    pub secret: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
struct CredentialsFileFormat {
    version: String,
    providers: HashMap<String, Credential>,
}

const CREDENTIALS_FILE_VERSION: &str = "1.0";

/// Durable provider → credential store
#[derive(Debug)]
pub struct CredentialStore {
    path: PathBuf,
    state: Arc<RwLock<HashMap<String, Credential>>>,
}

impl CredentialStore {
    /// Provisioning entry point: create an empty store with owner-only
    /// permissions. An already-initialized store is left as is.
    pub async fn init<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref().to_path_buf();
        if path.exists() {
            return Self::open(path).await;
        }

        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() && !parent.exists() {
                fs::create_dir_all(parent).await?;
            }
        }

        let store = Self {
            path,
            state: Arc::new(RwLock::new(HashMap::new())),
        };
        store.persist().await?;

        #[cfg(unix)]
        {
            use std::os::unix::fs::PermissionsExt;
            let perms = std::fs::Permissions::from_mode(0o600);
            fs::set_permissions(&store.path, perms).await?;
        }

        info!(path = %store.path.display(), "credential store initialized");
        Ok(store)
    }

    /// Open an existing store; fails fast if it was never provisioned
    pub async fn open<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref().to_path_buf();
        if !path.exists() {
            return Err(Error::StoreNotInitialized {
                path: path.display().to_string(),
            });
        }

        let content = fs::read_to_string(&path).await.map_err(|e| {
            Error::state_store(format!("failed to read {}: {}", path.display(), e))
        })?;
        let file: CredentialsFileFormat = serde_json::from_str(&content).map_err(|e| {
            Error::state_store(format!("failed to parse {}: {}", path.display(), e))
        })?;

        Ok(Self {
            path,
            state: Arc::new(RwLock::new(file.providers)),
        })
    }

    /// Credential for a provider, if stored
    pub async fn get(&self, provider: &str) -> Result<Option<Credential>> {
        let state = self.state.read().await;
        Ok(state.get(provider).cloned())
    }

    /// Insert or replace the credential for a provider
    pub async fn add(&self, provider: &str, username: &str, secret: &str) -> Result<()> {
        {
            let mut state = self.state.write().await;
            state.insert(
                provider.to_string(),
                Credential {
                    username: username.to_string(),
                    secret: secret.to_string(),
                },
            );
        }
        debug!(provider, "credential stored");
        self.persist().await
    }

    /// Update an existing credential; fails if none is stored
    pub async fn update(&self, provider: &str, username: &str, secret: &str) -> Result<()> {
        {
            let mut state = self.state.write().await;
            match state.get_mut(provider) {
                Some(cred) => {
                    cred.username = username.to_string();
                    cred.secret = secret.to_string();
                }
                None => {
                    return Err(Error::not_found(format!(
                        "no credentials stored for provider {provider}"
                    )));
                }
            }
        }
        self.persist().await
    }

    /// Delete a provider's credential; fails if none is stored
    pub async fn delete(&self, provider: &str) -> Result<()> {
        {
            let mut state = self.state.write().await;
            if state.remove(provider).is_none() {
                return Err(Error::not_found(format!(
                    "no credentials stored for provider {provider}"
                )));
            }
        }
        debug!(provider, "credential deleted");
        self.persist().await
    }

    /// (provider, masked username) pairs for display. Secrets never leave
    /// the store through this path.
    pub async fn list(&self) -> Result<Vec<(String, String)>> {
        let state = self.state.read().await;
        let mut rows: Vec<(String, String)> = state
            .iter()
            .map(|(provider, cred)| (provider.clone(), mask_username(&cred.username)))
            .collect();
        rows.sort();
        Ok(rows)
    }

    async fn persist(&self) -> Result<()> {
        let json = {
            let state = self.state.read().await;
            let file = CredentialsFileFormat {
                version: CREDENTIALS_FILE_VERSION.to_string(),
                providers: state.clone(),
            };
            serde_json::to_string_pretty(&file)
                .map_err(|e| Error::state_store(format!("failed to serialize: {}", e)))?
        };

        let temp_path = self.path.with_extension("tmp");
        {
            let mut file = fs::File::create(&temp_path).await.map_err(|e| {
                Error::state_store(format!(
                    "failed to create temp file {}: {}",
                    temp_path.display(),
                    e
                ))
            })?;
            file.write_all(json.as_bytes()).await.map_err(|e| {
                Error::state_store(format!("failed to write {}: {}", temp_path.display(), e))
            })?;
            file.flush().await.map_err(|e| Error::state_store(e.to_string()))?;
        }

        fs::rename(&temp_path, &self.path).await.map_err(|e| {
            Error::state_store(format!(
                "failed to rename {} to {}: {}",
                temp_path.display(),
                self.path.display(),
                e
            ))
        })?;
        Ok(())
    }
}

/// Mask a username for display.
///
/// The local part and every domain label keep their first and last
/// character when longer than 2 characters; shorter segments are fully
/// masked.
pub fn mask_username(username: &str) -> String {
    fn mask_segment(segment: &str) -> String {
        let chars: Vec<char> = segment.chars().collect();
        if chars.len() > 2 {
            let middle = "*".repeat(chars.len() - 2);
            format!("{}{}{}", chars[0], middle, chars[chars.len() - 1])
        } else {
            "*".repeat(chars.len())
        }
    }

    match username.split_once('@') {
        Some((local, domain)) => {
            let masked_domain: Vec<String> = domain.split('.').map(mask_segment).collect();
            format!("{}@{}", mask_segment(local), masked_domain.join("."))
        }
        None => mask_segment(username),
    }
}
