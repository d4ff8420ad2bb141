// # Registrar Provider Trait
//
// Defines the interface implemented by per-registrar plugins. The core
// never assumes a plugin implements every operation: `supports()` is
// checked before each call, and the default method bodies return an
// explicit "not implemented" error rather than relying on runtime
// introspection.
//
// ## Trust Level
//
// Providers are untrusted, single-shot integrations:
//
// - they perform the registrar API call they were asked for, nothing else
// - no retry logic (owned by the engine)
// - no access to stores, cache, or other providers
// - no propagation waiting (owned by the pollers)

use async_trait::async_trait;
use std::net::IpAddr;

use crate::error::{Error, Result};
use crate::state::DomainStatus;

/// Optional provider operations, checked before use
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Capability {
    /// `purchase`
    Purchase,
    /// `certify` (publish an ACME DNS-01 TXT record)
    Certify,
    /// `cleanup` (remove an ACME DNS-01 TXT record)
    Cleanup,
    /// `list_owned_domains`
    ListOwnedDomains,
    /// `check_domain_status`
    CheckDomainStatus,
    /// `set_init_dns_records`
    SetInitDnsRecords,
}

impl Capability {
    /// Operation name used in "not implemented" errors
    pub fn as_str(&self) -> &'static str {
        match self {
            Capability::Purchase => "purchase",
            Capability::Certify => "certify",
            Capability::Cleanup => "cleanup",
            Capability::ListOwnedDomains => "listOwnedDomains",
            Capability::CheckDomainStatus => "checkDomainStatus",
            Capability::SetInitDnsRecords => "setInitDnsRecords",
        }
    }
}

/// Result of a purchase attempt
///
/// Mirrors the plugin exit contract: ok / insufficient funds; any other
/// failure surfaces as a provider error.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PurchaseOutcome {
    /// The domain was purchased
    Purchased,
    /// The registrar account balance does not cover the purchase
    InsufficientFunds,
}

/// Trait for registrar provider plugins
///
/// Implementations must be thread-safe and usable across async tasks.
#[async_trait]
pub trait RegistrarProvider: Send + Sync {
    /// Canonical provider name (e.g. "namecheap.com")
    fn name(&self) -> &str;

    /// Whether this provider implements the given operation
    fn supports(&self, capability: Capability) -> bool;

    /// Authoritative domain status from the registrar API
    async fn check_domain_status(&self, _domain: &str) -> Result<DomainStatus> {
        Err(Error::not_implemented(
            self.name(),
            Capability::CheckDomainStatus.as_str(),
        ))
    }

    /// Purchase a domain
    async fn purchase(&self, _fqdn: &str) -> Result<PurchaseOutcome> {
        Err(Error::not_implemented(self.name(), Capability::Purchase.as_str()))
    }

    /// Publish the ACME DNS-01 validation TXT record
    async fn certify(&self, _domain: &str, _validation: &str, _wan_ip: IpAddr) -> Result<()> {
        Err(Error::not_implemented(self.name(), Capability::Certify.as_str()))
    }

    /// Remove the ACME DNS-01 validation TXT record
    async fn cleanup(&self, _domain: &str, _validation: &str, _wan_ip: IpAddr) -> Result<()> {
        Err(Error::not_implemented(self.name(), Capability::Cleanup.as_str()))
    }

    /// Domains owned by the account behind the credentials
    async fn list_owned_domains(&self) -> Result<Vec<String>> {
        Err(Error::not_implemented(
            self.name(),
            Capability::ListOwnedDomains.as_str(),
        ))
    }

    /// Set the initial record set (A `@`, A `*`, MX `@`) for a domain
    async fn set_init_dns_records(
        &self,
        _domain: &str,
        _wan_ip: IpAddr,
        _ttl: Option<u32>,
        _override_existing: bool,
    ) -> Result<()> {
        Err(Error::not_implemented(
            self.name(),
            Capability::SetInitDnsRecords.as_str(),
        ))
    }
}

/// Helper trait for constructing providers from stored credentials
pub trait RegistrarProviderFactory: Send + Sync {
    /// Create a provider instance bound to the given credentials
    fn create(&self, credentials: &crate::state::Credential)
    -> Result<Box<dyn RegistrarProvider>>;
}
