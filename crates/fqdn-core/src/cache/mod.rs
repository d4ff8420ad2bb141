// # Expiring Cache
//
// Typed key/value cache with a per-kind TTL, backed by a newline-delimited
// flat file so concurrent invocations of the tool can share it.
//
// ## File Format
//
// ```text
// <kind> <key> <value> <timestamp>
// ```
//
// One record per line, space-separated; trailing extra fields from older
// versions are ignored. Keys and values must therefore be token-safe
// (registrar names are canonicalized before caching, ACME validation
// values are base64url).
//
// ## Concurrency
//
// The file is rewritten atomically (write-then-rename) on every mutation.
// There is no cross-process locking: concurrent writers are last-writer-wins
// and an occasionally lost update is accepted, not an error condition.

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio::fs;
use tokio::io::AsyncWriteExt;
use tokio::sync::RwLock;
use tracing::{debug, trace, warn};

use crate::error::{Error, Result};

/// Cache entry kind, determining the TTL and key shape
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum CacheKind {
    /// WHOIS-observed registrar, keyed by domain
    WhoisRegistrar,
    /// WHOIS-observed availability, keyed by domain
    WhoisAvailable,
    /// Authoritative nameserver, keyed by domain
    Nameserver,
    /// Pending DNS change timestamp, keyed by
    /// `domain:recordType:host:value`
    DnsChange,
    /// Average propagation seconds, keyed by nameserver
    AvgPropagation,
}

impl CacheKind {
    /// TTL in seconds, `None` meaning the entry never expires
    pub fn ttl_secs(&self) -> Option<i64> {
        match self {
            CacheKind::WhoisRegistrar | CacheKind::WhoisAvailable => Some(3600),
            CacheKind::Nameserver => Some(7200),
            CacheKind::DnsChange => Some(172_800),
            CacheKind::AvgPropagation => None,
        }
    }

    /// Stable on-disk tag for this kind
    pub fn as_str(&self) -> &'static str {
        match self {
            CacheKind::WhoisRegistrar => "whois_registrar",
            CacheKind::WhoisAvailable => "whois_available",
            CacheKind::Nameserver => "ns",
            CacheKind::DnsChange => "dns_change",
            CacheKind::AvgPropagation => "ap",
        }
    }

    fn from_str(tag: &str) -> Option<Self> {
        match tag {
            "whois_registrar" => Some(CacheKind::WhoisRegistrar),
            "whois_available" => Some(CacheKind::WhoisAvailable),
            "ns" => Some(CacheKind::Nameserver),
            "dns_change" => Some(CacheKind::DnsChange),
            "ap" => Some(CacheKind::AvgPropagation),
            _ => None,
        }
    }
}

#[derive(Debug, Clone)]
struct CacheEntry {
    value: String,
    written_at: i64,
}

impl CacheEntry {
    fn is_live(&self, kind: CacheKind, now: i64) -> bool {
        match kind.ttl_secs() {
            Some(ttl) => self.written_at + ttl > now,
            None => true,
        }
    }
}

/// File-backed expiring cache
///
/// At most one live entry exists per (kind, key): writes supersede prior
/// entries for the same key. Expired entries read as misses even before
/// compaction removes them.
#[derive(Debug)]
pub struct ExpiringCache {
    path: PathBuf,
    entries: Arc<RwLock<HashMap<(CacheKind, String), CacheEntry>>>,
}

impl ExpiringCache {
    /// Open the cache file, creating parent directories if needed.
    ///
    /// Loading compacts opportunistically: expired rows are dropped and,
    /// if any were, the file is rewritten. A missing file is an empty
    /// cache, not an error.
    pub async fn open<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref().to_path_buf();

        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() && !parent.exists() {
                fs::create_dir_all(parent).await.map_err(|e| {
                    Error::cache(format!(
                        "failed to create cache directory {}: {}",
                        parent.display(),
                        e
                    ))
                })?;
            }
        }

        let (entries, dropped) = Self::load(&path).await?;
        debug!(
            path = %path.display(),
            entries = entries.len(),
            dropped,
            "cache loaded"
        );

        let cache = Self {
            path,
            entries: Arc::new(RwLock::new(entries)),
        };

        if dropped > 0 {
            cache.persist().await?;
        }

        Ok(cache)
    }

    /// Look up a value; expired entries are misses
    pub async fn get(&self, kind: CacheKind, key: &str) -> Option<String> {
        let now = chrono::Utc::now().timestamp();
        let entries = self.entries.read().await;
        entries
            .get(&(kind, key.to_string()))
            .filter(|e| e.is_live(kind, now))
            .map(|e| e.value.clone())
    }

    /// Timestamp at which a live entry was written, if one exists
    pub async fn written_at(&self, kind: CacheKind, key: &str) -> Option<i64> {
        let now = chrono::Utc::now().timestamp();
        let entries = self.entries.read().await;
        entries
            .get(&(kind, key.to_string()))
            .filter(|e| e.is_live(kind, now))
            .map(|e| e.written_at)
    }

    /// Insert a value, superseding any prior entry for the same key
    pub async fn set(&self, kind: CacheKind, key: &str, value: &str) -> Result<()> {
        self.set_at(kind, key, value, chrono::Utc::now().timestamp())
            .await
    }

    /// Insert with an explicit write timestamp
    pub async fn set_at(&self, kind: CacheKind, key: &str, value: &str, ts: i64) -> Result<()> {
        {
            let mut entries = self.entries.write().await;
            entries.insert(
                (kind, key.to_string()),
                CacheEntry {
                    value: value.to_string(),
                    written_at: ts,
                },
            );
        }
        self.persist().await
    }

    /// Remove an entry; removing a missing entry is a no-op
    pub async fn delete(&self, kind: CacheKind, key: &str) -> Result<()> {
        let removed = {
            let mut entries = self.entries.write().await;
            entries.remove(&(kind, key.to_string())).is_some()
        };
        if removed {
            self.persist().await?;
        }
        Ok(())
    }

    /// Drop every expired entry and rewrite the backing file.
    ///
    /// Infinite-TTL kinds are never dropped. Returns the number of
    /// entries removed.
    pub async fn compact(&self) -> Result<usize> {
        let now = chrono::Utc::now().timestamp();
        let dropped = {
            let mut entries = self.entries.write().await;
            let before = entries.len();
            entries.retain(|(kind, _), entry| entry.is_live(*kind, now));
            before - entries.len()
        };
        if dropped > 0 {
            trace!(dropped, "cache compacted");
            self.persist().await?;
        }
        Ok(dropped)
    }

    async fn load(path: &Path) -> Result<(HashMap<(CacheKind, String), CacheEntry>, usize)> {
        if !path.exists() {
            return Ok((HashMap::new(), 0));
        }

        let content = fs::read_to_string(path).await.map_err(|e| {
            Error::cache(format!("failed to read cache file {}: {}", path.display(), e))
        })?;

        let now = chrono::Utc::now().timestamp();
        let mut entries = HashMap::new();
        let mut dropped = 0usize;

        for line in content.lines() {
            let line = line.trim();
            if line.is_empty() {
                continue;
            }
            let mut fields = line.split_whitespace();
            let parsed = (|| {
                let kind = CacheKind::from_str(fields.next()?)?;
                let key = fields.next()?.to_string();
                let value = fields.next()?.to_string();
                let written_at: i64 = fields.next()?.parse().ok()?;
                Some((kind, key, value, written_at))
            })();

            match parsed {
                Some((kind, key, value, written_at)) => {
                    let entry = CacheEntry { value, written_at };
                    if entry.is_live(kind, now) {
                        // later lines supersede earlier ones for the same key
                        entries.insert((kind, key), entry);
                    } else {
                        dropped += 1;
                    }
                }
                None => {
                    warn!(line, "dropping unparseable cache line");
                    dropped += 1;
                }
            }
        }

        Ok((entries, dropped))
    }

    /// Rewrite the backing file atomically (write to .tmp, then rename)
    async fn persist(&self) -> Result<()> {
        let content = {
            let entries = self.entries.read().await;
            let mut lines: Vec<String> = entries
                .iter()
                .map(|((kind, key), entry)| {
                    format!("{} {} {} {}", kind.as_str(), key, entry.value, entry.written_at)
                })
                .collect();
            lines.sort();
            lines.join("\n")
        };

        let temp_path = self.path.with_extension("tmp");
        {
            let mut file = fs::File::create(&temp_path).await.map_err(|e| {
                Error::cache(format!(
                    "failed to create temp file {}: {}",
                    temp_path.display(),
                    e
                ))
            })?;
            file.write_all(content.as_bytes()).await.map_err(|e| {
                Error::cache(format!(
                    "failed to write temp file {}: {}",
                    temp_path.display(),
                    e
                ))
            })?;
            if !content.is_empty() {
                file.write_all(b"\n").await.map_err(|e| Error::cache(e.to_string()))?;
            }
            file.flush().await.map_err(|e| Error::cache(e.to_string()))?;
        }

        fs::rename(&temp_path, &self.path).await.map_err(|e| {
            Error::cache(format!(
                "failed to rename {} to {}: {}",
                temp_path.display(),
                self.path.display(),
                e
            ))
        })?;

        Ok(())
    }
}
