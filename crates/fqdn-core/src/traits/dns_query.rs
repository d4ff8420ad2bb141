//! DNS query seam
//!
//! The pollers and the engine query DNS only through this trait, so
//! propagation behavior is testable with a scripted resolver.

use async_trait::async_trait;
use std::fmt;

use crate::error::Result;

/// Record types the pollers care about
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum RecordKind {
    /// IPv4 address record
    A,
    /// Mail exchanger record (compared by exchange host, preference
    /// ignored)
    Mx,
    /// Text record
    Txt,
}

impl RecordKind {
    /// Stable tag used in DNS-change cache keys
    pub fn as_str(&self) -> &'static str {
        match self {
            RecordKind::A => "A",
            RecordKind::Mx => "MX",
            RecordKind::Txt => "TXT",
        }
    }
}

impl fmt::Display for RecordKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Trait for DNS lookups
///
/// `nameserver` selects the server to query: `None` means the system
/// default resolver, otherwise a hostname or IP literal. Implementations
/// must not cache lookups themselves; the cadence and caching decisions
/// belong to the pollers.
#[async_trait]
pub trait DnsQuery: Send + Sync {
    /// Primary nameserver from the zone's SOA MNAME field
    async fn soa_mname(&self, domain: &str) -> Result<Option<String>>;

    /// NS record targets for the zone
    async fn ns_records(&self, domain: &str) -> Result<Vec<String>>;

    /// Record values of the given kind for `fqdn`, as seen by
    /// `nameserver`.
    ///
    /// An empty vec means "no such records"; a query failure is an
    /// error and the caller decides whether it is fatal (the pollers
    /// treat it as "not yet propagated").
    async fn lookup(
        &self,
        nameserver: Option<&str>,
        fqdn: &str,
        kind: RecordKind,
    ) -> Result<Vec<String>>;
}
