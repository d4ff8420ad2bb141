// # WHOIS
//
// Minimal WHOIS client: TCP port 43, one query line, read to EOF.
// Only two facts are extracted from the response: the sponsoring
// registrar and whether the domain looks unregistered. Everything else
// is noise for this system's purposes.
//
// WHOIS failures are observations we do not have, not errors: the
// resolution engine treats a failed lookup the same as a response
// naming no registrar.

use async_trait::async_trait;
use std::time::Duration;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpStream;
use tracing::{debug, trace, warn};

use crate::cache::{CacheKind, ExpiringCache};
use crate::error::{Error, Result};
use crate::resolve::canonicalize_registrar;

/// Cache sentinel for "WHOIS named no registrar"
const NO_REGISTRAR: &str = "-";

/// What a WHOIS response told us about a domain
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct WhoisObservation {
    /// Canonicalized sponsoring registrar, when the response named one
    pub registrar: Option<String>,
    /// Whether the response looked like an unregistered domain
    pub available: Option<bool>,
}

/// Trait seam for WHOIS lookups
#[async_trait]
pub trait WhoisLookup: Send + Sync {
    /// Observe a domain via WHOIS
    async fn lookup(&self, domain: &str) -> Result<WhoisObservation>;
}

/// WHOIS servers for TLDs whose server does not follow the
/// `whois.nic.<tld>` convention
const WHOIS_SERVERS: &[(&str, &str)] = &[
    ("com", "whois.verisign-grs.com"),
    ("net", "whois.verisign-grs.com"),
    ("org", "whois.publicinterestregistry.org"),
    ("info", "whois.nic.info"),
    ("cz", "whois.nic.cz"),
    ("de", "whois.denic.de"),
    ("uk", "whois.nic.uk"),
    ("eu", "whois.eu"),
];

/// Response phrases indicating an unregistered domain
const AVAILABLE_PATTERNS: &[&str] = &[
    "no match for",
    "not found",
    "no entries found",
    "no data found",
    "domain not found",
    "is available for registration",
    "is free",
];

/// TCP WHOIS client
#[derive(Debug, Clone)]
pub struct WhoisClient {
    timeout: Duration,
}

impl WhoisClient {
    /// Create a client with the default query timeout
    pub fn new() -> Self {
        Self {
            timeout: Duration::from_secs(10),
        }
    }

    fn server_for(tld: &str) -> String {
        WHOIS_SERVERS
            .iter()
            .find(|(t, _)| *t == tld)
            .map(|(_, server)| server.to_string())
            .unwrap_or_else(|| format!("whois.nic.{tld}"))
    }

    async fn query(&self, server: &str, domain: &str) -> Result<String> {
        let connect = TcpStream::connect((server, 43));
        let mut stream = tokio::time::timeout(self.timeout, connect)
            .await
            .map_err(|_| Error::whois(format!("connection to {server} timed out")))?
            .map_err(|e| Error::whois(format!("connection to {server} failed: {e}")))?;

        stream.write_all(format!("{domain}\r\n").as_bytes()).await?;

        let mut raw = Vec::new();
        tokio::time::timeout(self.timeout, stream.read_to_end(&mut raw))
            .await
            .map_err(|_| Error::whois(format!("response from {server} timed out")))??;

        Ok(String::from_utf8_lossy(&raw).into_owned())
    }
}

impl Default for WhoisClient {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl WhoisLookup for WhoisClient {
    async fn lookup(&self, domain: &str) -> Result<WhoisObservation> {
        let tld = domain
            .rsplit('.')
            .next()
            .ok_or_else(|| Error::whois(format!("cannot derive TLD from {domain}")))?;
        let server = Self::server_for(tld);

        let raw = self.query(&server, domain).await?;
        let observation = parse_response(&raw);
        debug!(
            domain,
            server,
            registrar = ?observation.registrar,
            available = ?observation.available,
            "WHOIS observation"
        );
        Ok(observation)
    }
}

fn parse_response(raw: &str) -> WhoisObservation {
    let lower = raw.to_lowercase();

    let available = if raw.trim().is_empty() {
        None
    } else {
        Some(AVAILABLE_PATTERNS.iter().any(|p| lower.contains(p)))
    };

    let registrar = raw
        .lines()
        .filter_map(|line| {
            let (key, value) = line.split_once(':')?;
            let key = key.trim().to_lowercase();
            if key == "registrar" || key == "sponsoring registrar" {
                let value = value.trim();
                if value.is_empty() { None } else { Some(value.to_string()) }
            } else {
                None
            }
        })
        .next()
        .and_then(|name| canonicalize_registrar(&name));

    WhoisObservation {
        registrar,
        available,
    }
}

/// WHOIS lookup through the cache.
///
/// Hits under `whois_registrar`/`whois_available` short-circuit the
/// network; a fresh observation is cached with the WHOIS TTL. Lookup
/// failures degrade to an empty observation.
pub async fn cached_lookup(
    whois: &dyn WhoisLookup,
    cache: &ExpiringCache,
    domain: &str,
) -> WhoisObservation {
    let cached_registrar = cache.get(CacheKind::WhoisRegistrar, domain).await;
    let cached_available = cache.get(CacheKind::WhoisAvailable, domain).await;

    if let (Some(registrar), Some(available)) = (&cached_registrar, &cached_available) {
        trace!(domain, "WHOIS observation from cache");
        return WhoisObservation {
            registrar: (registrar != NO_REGISTRAR).then(|| registrar.clone()),
            available: Some(available == "1"),
        };
    }

    match whois.lookup(domain).await {
        Ok(observation) => {
            let registrar_token = observation.registrar.as_deref().unwrap_or(NO_REGISTRAR);
            let _ = cache
                .set(CacheKind::WhoisRegistrar, domain, registrar_token)
                .await;
            if let Some(available) = observation.available {
                let _ = cache
                    .set(
                        CacheKind::WhoisAvailable,
                        domain,
                        if available { "1" } else { "0" },
                    )
                    .await;
            }
            observation
        }
        Err(e) => {
            warn!(domain, error = %e, "WHOIS lookup failed, continuing without it");
            WhoisObservation::default()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_registrar_line() {
        let raw = "Domain Name: EXAMPLE.COM\n   Registrar: NameCheap, Inc.\n";
        let obs = parse_response(raw);
        assert_eq!(obs.registrar, Some("namecheap.com".to_string()));
        assert_eq!(obs.available, Some(false));
    }

    #[test]
    fn parses_sponsoring_registrar_line() {
        let raw = "domain: example.cz\nsponsoring registrar: WEDOS Internet, a.s.\n";
        let obs = parse_response(raw);
        assert_eq!(obs.registrar, Some("wedos.com".to_string()));
    }

    #[test]
    fn detects_unregistered_domain() {
        let raw = "No match for domain \"FREE-EXAMPLE.COM\".\n";
        let obs = parse_response(raw);
        assert_eq!(obs.registrar, None);
        assert_eq!(obs.available, Some(true));
    }

    #[test]
    fn empty_response_observes_nothing() {
        let obs = parse_response("   \n");
        assert_eq!(obs.registrar, None);
        assert_eq!(obs.available, None);
    }

    #[test]
    fn known_tlds_use_their_servers() {
        assert_eq!(WhoisClient::server_for("com"), "whois.verisign-grs.com");
        assert_eq!(WhoisClient::server_for("dev"), "whois.nic.dev");
    }
}
