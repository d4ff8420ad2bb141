// # Domain Status Store
//
// Durable table of domain → status/registrar, with a recorded sweep time.
//
// ## Provisioning
//
// The store is fail-fast: every operation on a missing backing file
// returns `StoreNotInitialized`. Creation is an explicit provisioning
// step (`init`), not an auto-create on first use.
//
// ## Write policy
//
// Only `free`, `owned` and `taken` are ever persisted. `unavailable`
// and `unknown` are transient classifications: upserting one is a
// silent no-op that leaves any existing row unchanged.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;
use tokio::fs;
use tokio::io::AsyncWriteExt;
use tokio::sync::RwLock;
use tracing::{debug, info};

use crate::error::{Error, Result};

/// Domain status classification
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DomainStatus {
    /// Registerable, nobody owns it
    Free,
    /// Owned by us (credentials on file manage it)
    Owned,
    /// Registered by someone else
    Taken,
    /// The registrar refuses to sell it (reserved, premium, policy)
    Unavailable,
    /// Could not be classified
    Unknown,
}

impl DomainStatus {
    /// Whether this status may be persisted to the store
    pub fn is_final(&self) -> bool {
        matches!(self, DomainStatus::Free | DomainStatus::Owned | DomainStatus::Taken)
    }

    /// Parse a status reported by a provider plugin.
    ///
    /// Anything outside the known set classifies as `Unknown`.
    pub fn from_provider(raw: &str) -> Self {
        match raw.trim().to_lowercase().as_str() {
            "free" => DomainStatus::Free,
            "owned" => DomainStatus::Owned,
            "taken" => DomainStatus::Taken,
            "unavailable" => DomainStatus::Unavailable,
            _ => DomainStatus::Unknown,
        }
    }
}

impl fmt::Display for DomainStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            DomainStatus::Free => "free",
            DomainStatus::Owned => "owned",
            DomainStatus::Taken => "taken",
            DomainStatus::Unavailable => "unavailable",
            DomainStatus::Unknown => "unknown",
        };
        f.write_str(s)
    }
}

/// One row of the domain table
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DomainRecord {
    /// Last persisted status
    pub status: DomainStatus,
    /// Registrar managing the domain, if resolved
    pub registrar: Option<String>,
    /// Whether initial DNS records were confirmed propagated
    #[serde(default)]
    pub dns_init: bool,
    /// When a certificate was last issued for the domain
    #[serde(default)]
    pub cert_date: Option<DateTime<Utc>>,
}

/// Serializable store file format
#[derive(Debug, Clone, Serialize, Deserialize)]
struct DomainsFileFormat {
    version: String,
    last_sweep: Option<DateTime<Utc>>,
    domains: HashMap<String, DomainRecord>,
}

const DOMAINS_FILE_VERSION: &str = "1.0";

#[derive(Debug)]
struct DomainsState {
    last_sweep: Option<DateTime<Utc>>,
    domains: HashMap<String, DomainRecord>,
}

/// Durable domain → status/registrar store
#[derive(Debug)]
pub struct DomainStore {
    path: PathBuf,
    state: Arc<RwLock<DomainsState>>,
}

impl DomainStore {
    /// Provisioning entry point: create an empty store file.
    ///
    /// Overwrites nothing: an already-initialized store is left as is.
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
            state: Arc::new(RwLock::new(DomainsState {
                last_sweep: None,
                domains: HashMap::new(),
            })),
        };
        store.persist().await?;
        info!(path = %store.path.display(), "domain store initialized");
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
        let file: DomainsFileFormat = serde_json::from_str(&content).map_err(|e| {
            Error::state_store(format!("failed to parse {}: {}", path.display(), e))
        })?;

        debug!(
            path = %path.display(),
            domains = file.domains.len(),
            "domain store loaded"
        );

        Ok(Self {
            path,
            state: Arc::new(RwLock::new(DomainsState {
                last_sweep: file.last_sweep,
                domains: file.domains,
            })),
        })
    }

    /// Status and registrar for a domain, if a row exists
    pub async fn status(&self, domain: &str) -> Result<Option<(DomainStatus, Option<String>)>> {
        let state = self.state.read().await;
        Ok(state
            .domains
            .get(domain)
            .map(|r| (r.status, r.registrar.clone())))
    }

    /// Upsert a row for a final status.
    ///
    /// Non-final statuses are a silent no-op: existing state stays
    /// unchanged and no row is created.
    pub async fn upsert_final(
        &self,
        domain: &str,
        status: DomainStatus,
        registrar: Option<&str>,
    ) -> Result<()> {
        if !status.is_final() {
            debug!(domain, %status, "non-final status, leaving store unchanged");
            return Ok(());
        }

        {
            let mut state = self.state.write().await;
            let entry = state
                .domains
                .entry(domain.to_string())
                .or_insert_with(|| DomainRecord {
                    status,
                    registrar: None,
                    dns_init: false,
                    cert_date: None,
                });
            entry.status = status;
            if let Some(r) = registrar {
                entry.registrar = Some(r.to_string());
            }
        }
        self.persist().await
    }

    /// Mark a domain's initial DNS records as confirmed.
    ///
    /// Updates an existing row only; status resolution owns row creation.
    pub async fn mark_dns_init(&self, domain: &str) -> Result<()> {
        let changed = {
            let mut state = self.state.write().await;
            match state.domains.get_mut(domain) {
                Some(record) => {
                    record.dns_init = true;
                    true
                }
                None => false,
            }
        };
        if changed {
            self.persist().await?;
        }
        Ok(())
    }

    /// Record a certificate issuance date. Updates an existing row only.
    pub async fn set_cert_date(&self, domain: &str, date: DateTime<Utc>) -> Result<()> {
        let changed = {
            let mut state = self.state.write().await;
            match state.domains.get_mut(domain) {
                Some(record) => {
                    record.cert_date = Some(date);
                    true
                }
                None => false,
            }
        };
        if changed {
            self.persist().await?;
        }
        Ok(())
    }

    /// All rows, optionally filtered by registrar
    pub async fn list(&self, registrar: Option<&str>) -> Result<Vec<(String, DomainRecord)>> {
        let state = self.state.read().await;
        let mut rows: Vec<(String, DomainRecord)> = state
            .domains
            .iter()
            .filter(|(_, r)| match registrar {
                Some(want) => r.registrar.as_deref() == Some(want),
                None => true,
            })
            .map(|(d, r)| (d.clone(), r.clone()))
            .collect();
        rows.sort_by(|a, b| a.0.cmp(&b.0));
        Ok(rows)
    }

    /// Delete every non-owned row, at most once per `interval`.
    ///
    /// The gate is the recorded time of the last sweep; the age of
    /// individual rows is irrelevant. Returns the number of rows
    /// removed (0 when the interval has not elapsed).
    pub async fn sweep_non_owned(&self, interval: Duration) -> Result<usize> {
        let now = Utc::now();
        let removed = {
            let mut state = self.state.write().await;
            if let Some(last) = state.last_sweep {
                let elapsed = now.signed_duration_since(last);
                if elapsed < chrono::Duration::from_std(interval).unwrap_or(chrono::Duration::MAX)
                {
                    debug!(
                        elapsed_secs = elapsed.num_seconds(),
                        "sweep interval not elapsed, skipping"
                    );
                    return Ok(0);
                }
            }

            let before = state.domains.len();
            state
                .domains
                .retain(|_, record| record.status == DomainStatus::Owned);
            state.last_sweep = Some(now);
            before - state.domains.len()
        };

        if removed > 0 {
            info!(removed, "swept non-owned domain rows");
        }
        self.persist().await?;
        Ok(removed)
    }

    /// Write the store atomically (temp file, then rename)
    async fn persist(&self) -> Result<()> {
        let json = {
            let state = self.state.read().await;
            let file = DomainsFileFormat {
                version: DOMAINS_FILE_VERSION.to_string(),
                last_sweep: state.last_sweep,
                domains: state.domains.clone(),
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
