// # DNS Queries
//
// hickory-resolver implementation of the `DnsQuery` seam, plus the
// cached authoritative-nameserver lookup.
//
// Resolver caching is disabled: the pollers must see the real state of
// the queried server on every check, and negative caching in particular
// would block convergence.

use std::net::{IpAddr, SocketAddr};
use std::time::Duration;

use async_trait::async_trait;
use hickory_resolver::config::{NameServerConfig, ResolverConfig, ResolverOpts};
use hickory_resolver::name_server::TokioConnectionProvider;
use hickory_resolver::proto::rr::{RData, RecordType};
use hickory_resolver::proto::xfer::Protocol;
use hickory_resolver::{Resolver, TokioResolver};
use tracing::{debug, trace};

use crate::cache::{CacheKind, ExpiringCache};
use crate::error::{Error, Result};
use crate::traits::{DnsQuery, RecordKind};

/// DNS query implementation backed by hickory-resolver
#[derive(Debug, Clone)]
pub struct HickoryDns {
    timeout: Duration,
    attempts: usize,
}

impl HickoryDns {
    /// Create a querier with the default timeout and attempt count
    pub fn new() -> Self {
        Self {
            timeout: Duration::from_secs(5),
            attempts: 2,
        }
    }

    /// Build a resolver pointed at one server, or at the defaults
    fn resolver_for(&self, server: Option<IpAddr>) -> TokioResolver {
        let config = match server {
            Some(ip) => {
                let mut config = ResolverConfig::new();
                config.add_name_server(NameServerConfig::new(
                    SocketAddr::new(ip, 53),
                    Protocol::Udp,
                ));
                config
            }
            None => ResolverConfig::default(),
        };

        let mut opts = ResolverOpts::default();
        opts.timeout = self.timeout;
        opts.attempts = self.attempts;
        opts.cache_size = 0;

        Resolver::builder_with_config(config, TokioConnectionProvider::default())
            .with_options(opts)
            .build()
    }

    /// Resolve a nameserver argument (IP literal or hostname) to an IP
    async fn nameserver_ip(&self, nameserver: &str) -> Result<IpAddr> {
        if let Ok(ip) = nameserver.parse::<IpAddr>() {
            return Ok(ip);
        }

        let resolver = self.resolver_for(None);
        let lookup = resolver
            .lookup_ip(nameserver)
            .await
            .map_err(|e| Error::dns(format!("failed to resolve nameserver {nameserver}: {e}")))?;
        lookup
            .iter()
            .next()
            .ok_or_else(|| Error::dns(format!("nameserver {nameserver} has no address records")))
    }
}

impl Default for HickoryDns {
    fn default() -> Self {
        Self::new()
    }
}

/// NXDOMAIN, NOERROR-with-no-records and similar transient conditions
/// are "no records", not query failures
fn is_no_records(err: &str) -> bool {
    let err = err.to_lowercase();
    err.contains("no records found")
        || err.contains("nxdomain")
        || err.contains("record not found")
        || err.contains("no connections available")
}

fn trim_dot(name: String) -> String {
    name.trim_end_matches('.').to_string()
}

#[async_trait]
impl DnsQuery for HickoryDns {
    async fn soa_mname(&self, domain: &str) -> Result<Option<String>> {
        let resolver = self.resolver_for(None);
        match resolver.lookup(domain, RecordType::SOA).await {
            Ok(lookup) => {
                for rdata in lookup.iter() {
                    if let RData::SOA(soa) = rdata {
                        let mname = trim_dot(soa.mname().to_utf8());
                        trace!(domain, mname, "SOA MNAME resolved");
                        return Ok(Some(mname));
                    }
                }
                Ok(None)
            }
            Err(e) if is_no_records(&e.to_string()) => Ok(None),
            Err(e) => Err(Error::dns(format!("SOA lookup for {domain} failed: {e}"))),
        }
    }

    async fn ns_records(&self, domain: &str) -> Result<Vec<String>> {
        let resolver = self.resolver_for(None);
        match resolver.ns_lookup(domain).await {
            Ok(lookup) => Ok(lookup
                .iter()
                .map(|ns| trim_dot(ns.to_string()))
                .collect()),
            Err(e) if is_no_records(&e.to_string()) => Ok(Vec::new()),
            Err(e) => Err(Error::dns(format!("NS lookup for {domain} failed: {e}"))),
        }
    }

    async fn lookup(
        &self,
        nameserver: Option<&str>,
        fqdn: &str,
        kind: RecordKind,
    ) -> Result<Vec<String>> {
        let resolver = match nameserver {
            Some(ns) => self.resolver_for(Some(self.nameserver_ip(ns).await?)),
            None => self.resolver_for(None),
        };

        let result = match kind {
            RecordKind::A => resolver
                .ipv4_lookup(fqdn)
                .await
                .map(|lookup| lookup.iter().map(|a| a.to_string()).collect::<Vec<_>>()),
            RecordKind::Mx => resolver.mx_lookup(fqdn).await.map(|lookup| {
                lookup
                    .iter()
                    .map(|mx| trim_dot(mx.exchange().to_utf8()))
                    .collect::<Vec<_>>()
            }),
            RecordKind::Txt => resolver.txt_lookup(fqdn).await.map(|lookup| {
                lookup
                    .iter()
                    .map(|record| {
                        record
                            .txt_data()
                            .iter()
                            .map(|data| String::from_utf8_lossy(data))
                            .collect::<String>()
                    })
                    .collect::<Vec<_>>()
            }),
        };

        match result {
            Ok(values) => Ok(values),
            Err(e) if is_no_records(&e.to_string()) => Ok(Vec::new()),
            Err(e) => Err(Error::dns(format!(
                "{kind} lookup for {fqdn} at {} failed: {e}",
                nameserver.unwrap_or("default resolver")
            ))),
        }
    }
}

/// Authoritative nameserver for a domain: SOA MNAME first, any NS
/// record as the fallback, memoized in the cache.
pub async fn authoritative_ns(
    dns: &dyn DnsQuery,
    cache: &ExpiringCache,
    domain: &str,
) -> Result<Option<String>> {
    if let Some(ns) = cache.get(CacheKind::Nameserver, domain).await {
        trace!(domain, ns, "authoritative nameserver from cache");
        return Ok(Some(ns));
    }

    let ns = match dns.soa_mname(domain).await? {
        Some(mname) => Some(mname),
        None => dns.ns_records(domain).await?.into_iter().next(),
    };

    if let Some(ref ns) = ns {
        debug!(domain, ns, "authoritative nameserver resolved");
        cache.set(CacheKind::Nameserver, domain, ns).await?;
    }
    Ok(ns)
}
