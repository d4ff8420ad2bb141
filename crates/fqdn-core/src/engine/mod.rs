//! Orchestration engine
//!
//! Composes the cache, the stores, WHOIS, the broker, the resolution
//! decision table and the propagation pollers into the user-facing
//! operations: check, purchase, list, certify, cleanup,
//! setInitDNSRecords and checkInitDns.
//!
//! ## Architecture
//!
//! ```text
//! ┌────────────┐   ┌─────────────┐   ┌──────────────────┐
//! │ WhoisLookup│   │ DomainStore │   │ CredentialSource │
//! └─────┬──────┘   └──────┬──────┘   └────────┬─────────┘
//!       │                 │                   │
//!       └────────────┬────┴───────────────────┘
//!                    ▼
//!             ┌────────────┐     ┌───────────────────┐
//!             │ FqdnEngine │────▶│ RegistrarProvider │ (plugin)
//!             └─────┬──────┘     └───────────────────┘
//!                   │
//!         ┌─────────┴──────────┐
//!         ▼                    ▼
//!  ┌──────────────┐   ┌─────────────────┐
//!  │ ExpiringCache│   │ Propagation     │
//!  │              │   │ pollers         │
//!  └──────────────┘   └─────────────────┘
//! ```
//!
//! The engine owns all policy (guards, persistence rules, wait
//! scheduling); providers stay single-shot API calls.

use std::collections::HashSet;
use std::fmt;
use std::net::IpAddr;
use std::sync::Arc;
use std::time::Duration;

use tracing::{debug, info, warn};

use crate::cache::ExpiringCache;
use crate::config::FqdnConfig;
use crate::dns::authoritative_ns;
use crate::error::{BrokerError, Error, Result};
use crate::propagation::{
    DomainWait, ExpectedRecord, PropagationOutcome, PropagationPoller, stamp_change,
    clear_change, wait_for_domains,
};
use crate::registry::ProviderRegistry;
use crate::resolve::{ResolutionAction, canonicalize_registrar, decide};
use crate::state::{CredentialStore, DomainStatus, DomainStore};
use crate::traits::{
    Capability, CredentialPrompt, CredentialSource, DnsQuery, MismatchChoice, RecordKind,
    RegistrarProvider,
};
use crate::whois::{WhoisLookup, cached_lookup};

/// Result of a `check` operation
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CheckOutcome {
    /// Resolved status (possibly `Unknown`)
    pub status: DomainStatus,
    /// Registrar that answered, when one was resolved
    pub registrar: Option<String>,
}

impl fmt::Display for CheckOutcome {
    /// Machine-parsable single line: `status=<s> registrar=<r>`
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "status={} registrar={}",
            self.status,
            self.registrar.as_deref().unwrap_or("")
        )
    }
}

/// Per-domain result of `setInitDNSRecords`
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum InitDnsOutcome {
    /// The records were already correct; nothing was pushed
    AlreadyVisible,
    /// Pushed and confirmed propagated
    Propagated {
        /// Seconds from first check to authoritative confirmation
        elapsed_secs: u64,
    },
    /// Pushed but not confirmed within the timeout
    TimedOut {
        /// Seconds waited before giving up
        waited_secs: u64,
    },
    /// The provider call failed for this domain
    ProviderFailed(String),
}

/// Orchestration engine over injected collaborators
pub struct FqdnEngine {
    config: FqdnConfig,
    cache: ExpiringCache,
    domains: DomainStore,
    registry: Arc<ProviderRegistry>,
    dns: Box<dyn DnsQuery>,
    whois: Box<dyn WhoisLookup>,
    credentials: Box<dyn CredentialSource>,
    prompt: Option<Box<dyn CredentialPrompt>>,
}

impl FqdnEngine {
    /// Create an engine.
    ///
    /// Opens the cache (creating it if absent) and the domain store
    /// (failing fast if it was never provisioned). `prompt` carries the
    /// interactive side effects; passing `None` runs non-interactively.
    pub async fn new(
        config: FqdnConfig,
        registry: Arc<ProviderRegistry>,
        dns: Box<dyn DnsQuery>,
        whois: Box<dyn WhoisLookup>,
        credentials: Box<dyn CredentialSource>,
        prompt: Option<Box<dyn CredentialPrompt>>,
    ) -> Result<Self> {
        config.validate()?;
        let cache = ExpiringCache::open(&config.cache_path).await?;
        let domains = DomainStore::open(&config.domains_path).await?;

        Ok(Self {
            config,
            cache,
            domains,
            registry,
            dns,
            whois,
            credentials,
            prompt,
        })
    }

    /// Resolve the domain status via the decision table and the
    /// registrar's provider API.
    ///
    /// Runs the opportunistic store sweep first. Only final statuses
    /// are persisted; everything else leaves the store untouched.
    pub async fn check(&self, fqdn: &str, hint: Option<&str>) -> Result<CheckOutcome> {
        self.domains
            .sweep_non_owned(Duration::from_secs(self.config.sweep_interval_secs))
            .await?;

        let Some(registrar) = self.resolve_registrar(fqdn, hint).await? else {
            return Ok(CheckOutcome {
                status: DomainStatus::Unknown,
                registrar: None,
            });
        };

        let provider = self.provider_for(&registrar).await?;
        self.require(&*provider, Capability::CheckDomainStatus)?;

        let status = provider.check_domain_status(fqdn).await?;
        if status.is_final() {
            self.domains
                .upsert_final(fqdn, status, Some(&registrar))
                .await?;
        } else {
            debug!(fqdn, %status, "transient status, not persisted");
        }

        Ok(CheckOutcome {
            status,
            registrar: Some(registrar),
        })
    }

    /// Publish the ACME DNS-01 validation record and wait for it,
    /// reading `CERTBOT_DOMAIN` and `CERTBOT_VALIDATION` from the
    /// process environment as the certificate tool's auth hook.
    pub async fn certify_from_env(&self) -> Result<()> {
        let domain = require_env("CERTBOT_DOMAIN")?;
        let validation = require_env("CERTBOT_VALIDATION")?;
        self.certify(&domain, &validation).await
    }

    /// Publish the ACME DNS-01 validation record and wait until it has
    /// propagated globally.
    pub async fn certify(&self, domain: &str, validation: &str) -> Result<()> {
        let record = ExpectedRecord::acme_challenge(validation);
        let records = vec![record.clone()];
        let poller = PropagationPoller::new(self.dns.as_ref(), &self.cache, &self.config);

        // idempotency guard: a value already visible at the
        // authoritative server is never re-pushed, and the average is
        // left alone
        let ns = authoritative_ns(self.dns.as_ref(), &self.cache, domain).await?;
        if poller.records_visible(ns.as_deref(), domain, &records).await {
            info!(domain, "validation record already published, skipping push");
            return Ok(());
        }

        let registrar = self
            .resolve_registrar(domain, None)
            .await?
            .ok_or_else(|| Error::RegistrarUnresolved {
                domain: domain.to_string(),
            })?;
        let provider = self.provider_for(&registrar).await?;
        self.require(&*provider, Capability::Certify)?;
        let wan_ip = self.wan_ip()?;

        provider.certify(domain, validation, wan_ip).await?;
        stamp_change(&self.cache, domain, &record).await?;

        match poller.wait_for_domain(domain, &records, Some(&registrar)).await? {
            PropagationOutcome::Propagated { .. } => {
                self.domains
                    .set_cert_date(domain, chrono::Utc::now())
                    .await?;
                Ok(())
            }
            PropagationOutcome::TimedOut { waited_secs } => Err(Error::PropagationTimeout {
                domain: domain.to_string(),
                waited_secs,
            }),
        }
    }

    /// Remove the ACME DNS-01 validation record, reading the hook
    /// environment like [`FqdnEngine::certify_from_env`].
    pub async fn cleanup_from_env(&self) -> Result<()> {
        let domain = require_env("CERTBOT_DOMAIN")?;
        let validation = require_env("CERTBOT_VALIDATION")?;
        self.cleanup(&domain, &validation).await
    }

    /// Remove the ACME DNS-01 validation record
    pub async fn cleanup(&self, domain: &str, validation: &str) -> Result<()> {
        let registrar = self
            .resolve_registrar(domain, None)
            .await?
            .ok_or_else(|| Error::RegistrarUnresolved {
                domain: domain.to_string(),
            })?;
        let provider = self.provider_for(&registrar).await?;
        self.require(&*provider, Capability::Cleanup)?;
        let wan_ip = self.wan_ip()?;

        provider.cleanup(domain, validation, wan_ip).await?;
        clear_change(&self.cache, domain, &ExpectedRecord::acme_challenge(validation)).await?;
        Ok(())
    }

    /// Set the initial record set (A `@`, A `*`, MX `@`) for a batch of
    /// domains and wait for all of them in parallel.
    ///
    /// Per-domain provider failures and timeouts are reported, not
    /// fatal: a partially propagated batch is partial success.
    pub async fn set_init_dns_records(
        &self,
        domain_list: &[String],
        registrar: &str,
        override_existing: bool,
    ) -> Result<Vec<(String, InitDnsOutcome)>> {
        let registrar = canonicalize_registrar(registrar)
            .ok_or_else(|| Error::config(format!("unusable registrar name: {registrar}")))?;
        let provider = self.provider_for(&registrar).await?;
        self.require(&*provider, Capability::SetInitDnsRecords)?;
        let wan_ip = self.wan_ip()?;

        let poller = PropagationPoller::new(self.dns.as_ref(), &self.cache, &self.config);
        let mut results = Vec::new();
        let mut batch = Vec::new();

        for domain in domain_list {
            let records = init_records(domain, wan_ip);

            if !override_existing {
                let ns = authoritative_ns(self.dns.as_ref(), &self.cache, domain).await?;
                if poller.records_visible(ns.as_deref(), domain, &records).await {
                    info!(domain, "initial records already correct, skipping push");
                    self.domains.mark_dns_init(domain).await?;
                    results.push((domain.clone(), InitDnsOutcome::AlreadyVisible));
                    continue;
                }
            }

            match provider
                .set_init_dns_records(domain, wan_ip, None, override_existing)
                .await
            {
                Ok(()) => {
                    for record in &records {
                        stamp_change(&self.cache, domain, record).await?;
                    }
                    batch.push(DomainWait {
                        domain: domain.clone(),
                        records,
                    });
                }
                Err(e) => {
                    warn!(domain, error = %e, "provider failed to set initial records");
                    results.push((domain.clone(), InitDnsOutcome::ProviderFailed(e.to_string())));
                }
            }
        }

        let outcomes = wait_for_domains(
            self.dns.as_ref(),
            &self.cache,
            &self.config,
            batch,
            Some(&registrar),
        )
        .await?;

        for (domain, outcome) in outcomes {
            let mapped = match outcome {
                PropagationOutcome::Propagated { elapsed_secs, .. } => {
                    self.domains.mark_dns_init(&domain).await?;
                    InitDnsOutcome::Propagated { elapsed_secs }
                }
                PropagationOutcome::TimedOut { waited_secs } => {
                    InitDnsOutcome::TimedOut { waited_secs }
                }
            };
            results.push((domain, mapped));
        }

        Ok(results)
    }

    /// One-shot probe: are the initial records visible at both the
    /// authoritative nameserver and the public resolver?
    pub async fn check_init_dns(&self, fqdn: &str) -> Result<bool> {
        let wan_ip = self.wan_ip()?;
        let records = init_records(fqdn, wan_ip);
        let poller = PropagationPoller::new(self.dns.as_ref(), &self.cache, &self.config);

        let ns = authoritative_ns(self.dns.as_ref(), &self.cache, fqdn).await?;
        if !poller.records_visible(ns.as_deref(), fqdn, &records).await {
            return Ok(false);
        }
        let public = self.config.public_resolver.to_string();
        Ok(poller.records_visible(Some(&public), fqdn, &records).await)
    }

    /// Purchase a domain through a registrar
    pub async fn purchase(
        &self,
        fqdn: &str,
        registrar: &str,
    ) -> Result<crate::traits::PurchaseOutcome> {
        let registrar = canonicalize_registrar(registrar)
            .ok_or_else(|| Error::config(format!("unusable registrar name: {registrar}")))?;
        let provider = self.provider_for(&registrar).await?;
        self.require(&*provider, Capability::Purchase)?;

        let outcome = provider.purchase(fqdn).await?;
        if outcome == crate::traits::PurchaseOutcome::Purchased {
            self.domains
                .upsert_final(fqdn, DomainStatus::Owned, Some(&registrar))
                .await?;
        }
        Ok(outcome)
    }

    /// Locally stored domains, optionally filtered by registrar
    pub async fn list_local(
        &self,
        registrar: Option<&str>,
    ) -> Result<Vec<(String, crate::state::DomainRecord)>> {
        self.domains.list(registrar).await
    }

    /// Domains the registrar account owns, via the provider API
    pub async fn list_remote(&self, registrar: &str) -> Result<Vec<String>> {
        let registrar = canonicalize_registrar(registrar)
            .ok_or_else(|| Error::config(format!("unusable registrar name: {registrar}")))?;
        let provider = self.provider_for(&registrar).await?;
        self.require(&*provider, Capability::ListOwnedDomains)?;
        provider.list_owned_domains().await
    }

    /// Run the decision table over WHOIS, hint, local history and
    /// credential availability. `Ok(None)` is "unknown" and must not
    /// lead to any persistence.
    async fn resolve_registrar(&self, fqdn: &str, hint: Option<&str>) -> Result<Option<String>> {
        let stored_registrar = match self.domains.status(fqdn).await? {
            Some((_, registrar)) => registrar,
            None => None,
        };

        let observation = cached_lookup(self.whois.as_ref(), &self.cache, fqdn).await;
        let whois_registrar = observation.registrar;

        // the locally remembered registrar serves as the hint when the
        // caller supplied none
        let hint_registrar = hint
            .and_then(canonicalize_registrar)
            .or_else(|| stored_registrar.as_deref().and_then(canonicalize_registrar));

        let tld = fqdn.rsplit('.').next().unwrap_or_default();
        let tld_candidates: Vec<String> = self
            .config
            .tld_priority
            .get(tld)
            .cloned()
            .unwrap_or_default();

        // probe credential availability once per candidate, so the
        // decision itself stays pure
        let mut candidates: Vec<&str> = Vec::new();
        candidates.extend(whois_registrar.as_deref());
        candidates.extend(hint_registrar.as_deref());
        candidates.extend(tld_candidates.iter().map(String::as_str));

        let mut with_creds: HashSet<String> = HashSet::new();
        for candidate in candidates {
            if !with_creds.contains(candidate)
                && self.credentials.has_credentials(candidate).await
            {
                with_creds.insert(candidate.to_string());
            }
        }

        let action = decide(
            whois_registrar.as_deref(),
            hint_registrar.as_deref(),
            self.prompt.is_some(),
            &tld_candidates,
            |name| with_creds.contains(name),
        );

        match action {
            ResolutionAction::UseRegistrar(registrar) => Ok(Some(registrar)),
            ResolutionAction::Unknown => Ok(None),
            ResolutionAction::PromptForCredentials(registrar) => {
                if self.capture_and_store(&registrar).await? {
                    Ok(Some(registrar))
                } else {
                    Ok(None)
                }
            }
            ResolutionAction::PromptMismatch { whois, hint } => {
                let Some(prompt) = self.prompt.as_deref() else {
                    return Ok(None);
                };
                match prompt.resolve_mismatch(&whois, &hint).await? {
                    MismatchChoice::SupplyWhoisCredentials => {
                        if self.capture_and_store(&whois).await? {
                            Ok(Some(whois))
                        } else {
                            Ok(None)
                        }
                    }
                    MismatchChoice::GiveUp => Ok(None),
                    MismatchChoice::FallBackToHint => {
                        if self.credentials.has_credentials(&hint).await {
                            Ok(Some(hint))
                        } else {
                            Ok(None)
                        }
                    }
                }
            }
        }
    }

    /// Interactively capture credentials for a provider and store them.
    /// Returns whether credentials are now available.
    async fn capture_and_store(&self, provider: &str) -> Result<bool> {
        let Some(prompt) = self.prompt.as_deref() else {
            return Ok(false);
        };
        match prompt.capture_credentials(provider).await? {
            Some(credential) => {
                let store = CredentialStore::open(&self.config.credentials_path).await?;
                store
                    .add(provider, &credential.username, &credential.secret)
                    .await?;
                info!(provider, "credentials captured");
                Ok(true)
            }
            None => {
                debug!(provider, "operator declined to supply credentials");
                Ok(false)
            }
        }
    }

    /// Instantiate the provider plugin for a registrar from its stored
    /// credentials
    async fn provider_for(&self, registrar: &str) -> Result<Box<dyn RegistrarProvider>> {
        let credential = self.credentials.get(registrar).await.map_err(|e| match e {
            BrokerError::NoCredentials(provider) => Error::CredentialsUnavailable { provider },
            other => Error::Broker(other),
        })?;
        self.registry.create(registrar, &credential)
    }

    fn require(&self, provider: &dyn RegistrarProvider, capability: Capability) -> Result<()> {
        if provider.supports(capability) {
            Ok(())
        } else {
            Err(Error::not_implemented(provider.name(), capability.as_str()))
        }
    }

    fn wan_ip(&self) -> Result<IpAddr> {
        self.config.wan_ip.ok_or(Error::WanIpUnknown)
    }
}

/// The initial record set: apex and wildcard A records at the WAN IP,
/// and the apex MX pointing at the domain itself
fn init_records(domain: &str, wan_ip: IpAddr) -> Vec<ExpectedRecord> {
    vec![
        ExpectedRecord::new(RecordKind::A, "@", wan_ip.to_string()),
        ExpectedRecord::new(RecordKind::A, "*", wan_ip.to_string()),
        ExpectedRecord::new(RecordKind::Mx, "@", domain),
    ]
}

fn require_env(name: &str) -> Result<String> {
    std::env::var(name).map_err(|_| Error::MissingEnv(name.to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn check_outcome_renders_machine_parsable_line() {
        let outcome = CheckOutcome {
            status: DomainStatus::Owned,
            registrar: Some("namecheap.com".to_string()),
        };
        assert_eq!(outcome.to_string(), "status=owned registrar=namecheap.com");

        let unknown = CheckOutcome {
            status: DomainStatus::Unknown,
            registrar: None,
        };
        assert_eq!(unknown.to_string(), "status=unknown registrar=");
    }

    #[test]
    fn init_records_cover_apex_wildcard_and_mail() {
        let records = init_records("example.com", "198.51.100.7".parse().unwrap());
        assert_eq!(records.len(), 3);
        assert_eq!(records[0].fqdn("example.com"), "example.com");
        assert_eq!(records[1].fqdn("example.com"), "*.example.com");
        assert_eq!(records[2].kind, RecordKind::Mx);
        assert_eq!(records[2].value, "example.com");
    }
}
