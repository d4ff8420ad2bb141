//! Shared mocks for the contract tests
//!
//! - `MockDns`: scripted resolver with per-target record tables and
//!   query counters
//! - `MemoryCredentials`: in-memory `CredentialSource`
//! - `MockWhois`: fixed WHOIS observation
//! - `MockProvider`: registrar provider with call counters, sharing a
//!   `MockDns` so a push becomes visible DNS state

#![allow(dead_code)]

use std::collections::HashMap;
use std::net::IpAddr;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};

use async_trait::async_trait;
use tokio::sync::Mutex;

use fqdn_core::error::BrokerError;
use fqdn_core::state::{Credential, DomainStatus};
use fqdn_core::traits::{
    Capability, CredentialSource, DnsQuery, PurchaseOutcome, RecordKind, RegistrarProvider,
    RegistrarProviderFactory,
};
use fqdn_core::whois::{WhoisLookup, WhoisObservation};
use fqdn_core::{Error, FqdnConfig, Result};

/// Key into the scripted record table: (nameserver, fqdn, kind).
/// `None` is the default resolver.
type RecordKey = (Option<String>, String, RecordKind);

#[derive(Default)]
struct MockDnsState {
    records: HashMap<RecordKey, Vec<String>>,
    soa: HashMap<String, String>,
}

/// Scripted DNS resolver
#[derive(Clone, Default)]
pub struct MockDns {
    state: Arc<Mutex<MockDnsState>>,
    pub soa_queries: Arc<AtomicUsize>,
    pub lookups: Arc<AtomicUsize>,
}

impl MockDns {
    pub fn new() -> Self {
        Self::default()
    }

    /// Script the SOA MNAME for a domain
    pub async fn set_soa(&self, domain: &str, mname: &str) {
        let mut state = self.state.lock().await;
        state.soa.insert(domain.to_string(), mname.to_string());
    }

    /// Script record values as seen by one nameserver (`None` = default
    /// resolver)
    pub async fn set_records(
        &self,
        nameserver: Option<&str>,
        fqdn: &str,
        kind: RecordKind,
        values: &[&str],
    ) {
        let mut state = self.state.lock().await;
        state.records.insert(
            (nameserver.map(String::from), fqdn.to_string(), kind),
            values.iter().map(|v| v.to_string()).collect(),
        );
    }

    /// Script a record as visible everywhere (authoritative, public,
    /// default)
    pub async fn set_records_everywhere(
        &self,
        nameservers: &[&str],
        fqdn: &str,
        kind: RecordKind,
        values: &[&str],
    ) {
        self.set_records(None, fqdn, kind, values).await;
        for ns in nameservers {
            self.set_records(Some(ns), fqdn, kind, values).await;
        }
    }

    pub fn lookup_count(&self) -> usize {
        self.lookups.load(Ordering::SeqCst)
    }

    pub fn soa_query_count(&self) -> usize {
        self.soa_queries.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl DnsQuery for MockDns {
    async fn soa_mname(&self, domain: &str) -> Result<Option<String>> {
        self.soa_queries.fetch_add(1, Ordering::SeqCst);
        let state = self.state.lock().await;
        Ok(state.soa.get(domain).cloned())
    }

    async fn ns_records(&self, _domain: &str) -> Result<Vec<String>> {
        Ok(Vec::new())
    }

    async fn lookup(
        &self,
        nameserver: Option<&str>,
        fqdn: &str,
        kind: RecordKind,
    ) -> Result<Vec<String>> {
        self.lookups.fetch_add(1, Ordering::SeqCst);
        let state = self.state.lock().await;
        Ok(state
            .records
            .get(&(nameserver.map(String::from), fqdn.to_string(), kind))
            .cloned()
            .unwrap_or_default())
    }
}

/// In-memory credential source
#[derive(Clone, Default)]
pub struct MemoryCredentials {
    providers: HashMap<String, Credential>,
}

impl MemoryCredentials {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with(mut self, provider: &str, username: &str, secret: &str) -> Self {
        self.providers.insert(
            provider.to_string(),
            Credential {
                username: username.to_string(),
                secret: secret.to_string(),
            },
        );
        self
    }
}

#[async_trait]
impl CredentialSource for MemoryCredentials {
    async fn get(&self, provider: &str) -> std::result::Result<Credential, BrokerError> {
        self.providers
            .get(provider)
            .cloned()
            .ok_or_else(|| BrokerError::NoCredentials(provider.to_string()))
    }
}

/// Fixed WHOIS observation
#[derive(Clone, Default)]
pub struct MockWhois {
    pub observation: WhoisObservation,
}

impl MockWhois {
    pub fn empty() -> Self {
        Self::default()
    }

    pub fn naming(registrar: &str) -> Self {
        Self {
            observation: WhoisObservation {
                registrar: Some(registrar.to_string()),
                available: Some(false),
            },
        }
    }
}

#[async_trait]
impl WhoisLookup for MockWhois {
    async fn lookup(&self, _domain: &str) -> Result<WhoisObservation> {
        Ok(self.observation.clone())
    }
}

/// Shared counters for a mock provider
#[derive(Default)]
pub struct ProviderCounters {
    pub status_calls: AtomicUsize,
    pub certify_calls: AtomicUsize,
    pub cleanup_calls: AtomicUsize,
    pub init_dns_calls: AtomicUsize,
    pub purchase_calls: AtomicUsize,
}

/// Registrar provider that reports a fixed status and, on push
/// operations, writes the expected records into a shared `MockDns`
pub struct MockProvider {
    pub name: String,
    pub status: DomainStatus,
    pub counters: Arc<ProviderCounters>,
    /// When set, certify/setInitDNSRecords publish into this resolver
    /// at these nameservers (plus the default view)
    pub dns: Option<(MockDns, Vec<String>)>,
}

impl MockProvider {
    pub fn reporting(name: &str, status: DomainStatus) -> Self {
        Self {
            name: name.to_string(),
            status,
            counters: Arc::new(ProviderCounters::default()),
            dns: None,
        }
    }
}

#[async_trait]
impl RegistrarProvider for MockProvider {
    fn name(&self) -> &str {
        &self.name
    }

    fn supports(&self, _capability: Capability) -> bool {
        true
    }

    async fn check_domain_status(&self, _domain: &str) -> Result<DomainStatus> {
        self.counters.status_calls.fetch_add(1, Ordering::SeqCst);
        Ok(self.status)
    }

    async fn purchase(&self, _fqdn: &str) -> Result<PurchaseOutcome> {
        self.counters.purchase_calls.fetch_add(1, Ordering::SeqCst);
        Ok(PurchaseOutcome::Purchased)
    }

    async fn certify(&self, domain: &str, validation: &str, _wan_ip: IpAddr) -> Result<()> {
        self.counters.certify_calls.fetch_add(1, Ordering::SeqCst);
        if let Some((dns, nameservers)) = &self.dns {
            let targets: Vec<&str> = nameservers.iter().map(String::as_str).collect();
            dns.set_records_everywhere(
                &targets,
                &format!("_acme-challenge.{domain}"),
                RecordKind::Txt,
                &[validation],
            )
            .await;
        }
        Ok(())
    }

    async fn cleanup(&self, _domain: &str, _validation: &str, _wan_ip: IpAddr) -> Result<()> {
        self.counters.cleanup_calls.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }

    async fn list_owned_domains(&self) -> Result<Vec<String>> {
        Ok(vec!["owned.example".to_string()])
    }

    async fn set_init_dns_records(
        &self,
        domain: &str,
        wan_ip: IpAddr,
        _ttl: Option<u32>,
        _override_existing: bool,
    ) -> Result<()> {
        self.counters.init_dns_calls.fetch_add(1, Ordering::SeqCst);
        if let Some((dns, nameservers)) = &self.dns {
            let targets: Vec<&str> = nameservers.iter().map(String::as_str).collect();
            let ip = wan_ip.to_string();
            dns.set_records_everywhere(&targets, domain, RecordKind::A, &[&ip])
                .await;
            dns.set_records_everywhere(&targets, &format!("*.{domain}"), RecordKind::A, &[&ip])
                .await;
            dns.set_records_everywhere(&targets, domain, RecordKind::Mx, &[domain])
                .await;
        }
        Ok(())
    }
}

/// Factory handing out pre-built providers (one per create call)
pub struct QueueFactory {
    providers: Mutex<Vec<MockProvider>>,
}

impl QueueFactory {
    pub fn of(providers: Vec<MockProvider>) -> Self {
        Self {
            providers: Mutex::new(providers),
        }
    }
}

impl RegistrarProviderFactory for QueueFactory {
    fn create(&self, _credentials: &Credential) -> Result<Box<dyn RegistrarProvider>> {
        let mut providers = self.providers.try_lock().map_err(|_| {
            Error::Other("provider factory contended".to_string())
        })?;
        providers
            .pop()
            .map(|p| Box::new(p) as Box<dyn RegistrarProvider>)
            .ok_or_else(|| Error::Other("factory exhausted".to_string()))
    }
}

/// Config pointed at a temp dir, with fast propagation settings
pub fn test_config(dir: &std::path::Path) -> FqdnConfig {
    let mut config = FqdnConfig::default();
    config.cache_path = dir.join("dns.cache");
    config.domains_path = dir.join("domains.json");
    config.credentials_path = dir.join("credentials.json");
    config.broker_socket = dir.join("credd.sock");
    config.wan_ip = Some("198.51.100.7".parse().unwrap());
    config.propagation.min_interval_secs = 1;
    config.propagation.default_average_secs = 8;
    config.propagation.default_buffer_secs = 0;
    config.propagation.timeout_secs = 60;
    config.registrars.clear();
    config
}
