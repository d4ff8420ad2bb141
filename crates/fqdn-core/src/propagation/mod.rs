// # Propagation Poller
//
// Adaptive single-domain wait for DNS record propagation, plus the
// shared timing model used by the parallel variant.
//
// ## Ordering invariant
//
// The authoritative nameserver is queried first, and the fixed public
// resolver only after the authoritative server confirms the records.
// Asking the public resolver too early can plant a negative-cache entry
// there that then blocks convergence.
//
// ## Timing model
//
// The expected propagation time for a nameserver is the cached running
// average, falling back to the registrar profile, falling back to a
// fixed default. Each wait halves the estimated remaining time, so the
// poll converges geometrically instead of ticking at a fixed cadence.
// A successful wait feeds the measured time back into the average as a
// two-point mean, except when the records were already correct on the
// very first check: recording a near-zero measurement would corrupt
// the average.

pub mod parallel;

use std::time::Duration;
use tracing::{debug, info, trace};

use crate::cache::{CacheKind, ExpiringCache};
use crate::config::FqdnConfig;
use crate::dns::authoritative_ns;
use crate::error::Result;
use crate::traits::{DnsQuery, RecordKind};

pub use parallel::{DomainWait, wait_for_domains};

/// A record the poller expects to observe
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExpectedRecord {
    /// Record type
    pub kind: RecordKind,
    /// Host relative to the domain: `@`, `*`, or a label like
    /// `_acme-challenge`
    pub host: String,
    /// Expected record value (must be token-safe: no whitespace)
    pub value: String,
}

impl ExpectedRecord {
    /// Create an expected record
    pub fn new(kind: RecordKind, host: impl Into<String>, value: impl Into<String>) -> Self {
        Self {
            kind,
            host: host.into(),
            value: value.into(),
        }
    }

    /// The ACME DNS-01 challenge TXT record for a domain
    pub fn acme_challenge(validation: impl Into<String>) -> Self {
        Self::new(RecordKind::Txt, "_acme-challenge", validation)
    }

    /// Fully qualified name to query for this record
    pub fn fqdn(&self, domain: &str) -> String {
        if self.host == "@" {
            domain.to_string()
        } else {
            format!("{}.{domain}", self.host)
        }
    }

    /// Cache key of this record's pending-change stamp
    pub fn change_key(&self, domain: &str) -> String {
        format!("{domain}:{}:{}:{}", self.kind.as_str(), self.host, self.value)
    }
}

/// Outcome of one domain's propagation wait
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PropagationOutcome {
    /// The records are visible at the authoritative server and the
    /// public resolver
    Propagated {
        /// Seconds from the first check to authoritative confirmation
        elapsed_secs: u64,
        /// The very first check already saw the records
        already_visible: bool,
    },
    /// The configured timeout elapsed first (non-fatal for batches)
    TimedOut {
        /// Seconds waited before giving up
        waited_secs: u64,
    },
}

/// Record a pending DNS change, keyed by (domain, type, host, value).
///
/// Set immediately after a record is pushed to the registrar; a live
/// stamp found at poll start means the process restarted mid-wait and
/// the original clock is reused.
pub async fn stamp_change(
    cache: &ExpiringCache,
    domain: &str,
    record: &ExpectedRecord,
) -> Result<()> {
    let now = chrono::Utc::now().timestamp();
    cache
        .set(CacheKind::DnsChange, &record.change_key(domain), &now.to_string())
        .await
}

/// Drop a pending-change stamp after confirmed propagation
pub async fn clear_change(
    cache: &ExpiringCache,
    domain: &str,
    record: &ExpectedRecord,
) -> Result<()> {
    cache.delete(CacheKind::DnsChange, &record.change_key(domain)).await
}

/// Earliest live change stamp across the expected records
pub(crate) async fn earliest_stamp(
    cache: &ExpiringCache,
    domain: &str,
    records: &[ExpectedRecord],
) -> Option<i64> {
    let mut earliest: Option<i64> = None;
    for record in records {
        if let Some(value) = cache.get(CacheKind::DnsChange, &record.change_key(domain)).await {
            if let Ok(ts) = value.parse::<i64>() {
                earliest = Some(earliest.map_or(ts, |e: i64| e.min(ts)));
            }
        }
    }
    earliest
}

/// Next adaptive wait: half the estimated remaining time, floored
pub(crate) fn next_wait_secs(average_secs: i64, first_check: i64, now: i64, min_interval: i64) -> u64 {
    let half_remaining = (average_secs + first_check - now) / 2;
    half_remaining.max(min_interval) as u64
}

/// Average-propagation bookkeeping over the cache and config
pub struct TimingModel<'a> {
    cache: &'a ExpiringCache,
    config: &'a FqdnConfig,
}

impl<'a> TimingModel<'a> {
    /// Create a timing model over the given cache and config
    pub fn new(cache: &'a ExpiringCache, config: &'a FqdnConfig) -> Self {
        Self { cache, config }
    }

    /// Expected propagation seconds: cached average, else registrar
    /// profile, else the configured default
    pub async fn average_secs(&self, nameserver: Option<&str>, registrar: Option<&str>) -> u64 {
        if let Some(ns) = nameserver {
            if let Some(cached) = self.cache.get(CacheKind::AvgPropagation, ns).await {
                if let Ok(avg) = cached.parse::<u64>() {
                    return avg;
                }
            }
        }

        registrar
            .and_then(|r| self.config.registrar_profile(r))
            .and_then(|p| p.average_propagation_secs)
            .unwrap_or(self.config.propagation.default_average_secs)
    }

    /// Fold a measured propagation time into the running average.
    ///
    /// Two-point mean with the previous average; the first measurement
    /// becomes the average exactly.
    pub async fn record_observation(&self, nameserver: &str, elapsed_secs: u64) -> Result<()> {
        let previous = self
            .cache
            .get(CacheKind::AvgPropagation, nameserver)
            .await
            .and_then(|v| v.parse::<u64>().ok());

        let updated = match previous {
            Some(prev) => (prev + elapsed_secs) / 2,
            None => elapsed_secs,
        };

        debug!(nameserver, elapsed_secs, updated, "propagation average updated");
        self.cache
            .set(CacheKind::AvgPropagation, nameserver, &updated.to_string())
            .await
    }
}

/// Adaptive single-domain propagation poller
pub struct PropagationPoller<'a> {
    dns: &'a dyn DnsQuery,
    cache: &'a ExpiringCache,
    config: &'a FqdnConfig,
}

impl<'a> PropagationPoller<'a> {
    /// Create a poller over the given querier, cache and config
    pub fn new(dns: &'a dyn DnsQuery, cache: &'a ExpiringCache, config: &'a FqdnConfig) -> Self {
        Self { dns, cache, config }
    }

    /// Whether every expected record is visible at `nameserver`.
    ///
    /// Query errors count as "not yet propagated", never as failure.
    pub async fn records_visible(
        &self,
        nameserver: Option<&str>,
        domain: &str,
        records: &[ExpectedRecord],
    ) -> bool {
        for record in records {
            let fqdn = record.fqdn(domain);
            match self.dns.lookup(nameserver, &fqdn, record.kind).await {
                Ok(values) => {
                    if !values.iter().any(|v| v == &record.value) {
                        trace!(
                            %fqdn,
                            kind = %record.kind,
                            expected = %record.value,
                            "record not yet visible"
                        );
                        return false;
                    }
                }
                Err(e) => {
                    trace!(%fqdn, error = %e, "lookup failed, treating as not propagated");
                    return false;
                }
            }
        }
        true
    }

    /// Wait until the expected records are visible at the authoritative
    /// nameserver and then at the public resolver, with the adaptive
    /// interval schedule.
    ///
    /// On success a registrar-specific buffer delay is applied before
    /// returning, giving slower secondary resolvers a margin, and the
    /// change stamps are dropped.
    pub async fn wait_for_domain(
        &self,
        domain: &str,
        records: &[ExpectedRecord],
        registrar: Option<&str>,
    ) -> Result<PropagationOutcome> {
        let timing = TimingModel::new(self.cache, self.config);
        let nameserver = authoritative_ns(self.dns, self.cache, domain).await?;
        let ns_ref = nameserver.as_deref();
        let public = self.config.public_resolver.to_string();

        // a live change stamp means the process restarted mid-wait:
        // the original clock is reused instead of reset
        let now = chrono::Utc::now().timestamp();
        let first_check = earliest_stamp(self.cache, domain, records).await.unwrap_or(now);
        let waited_base = (now - first_check).max(0) as u64;
        if waited_base > 0 {
            debug!(domain, waited_base, "resuming propagation wait from change stamp");
        }

        let average = timing.average_secs(ns_ref, registrar).await as i64;
        let timeout_secs = self.config.propagation.timeout_secs;
        let min_interval = self.config.propagation.min_interval_secs as i64;
        let start = tokio::time::Instant::now();

        let mut first_probe = true;
        let mut already_visible = false;
        let mut confirmed_after: Option<u64> = None;

        loop {
            let waited = waited_base + start.elapsed().as_secs();

            if confirmed_after.is_none() && self.records_visible(ns_ref, domain, records).await {
                confirmed_after = Some(waited);
                already_visible = first_probe;
                debug!(domain, already_visible, "authoritative nameserver confirmed");
            }

            // the public resolver is only consulted once the
            // authoritative server agrees
            if confirmed_after.is_some()
                && self.records_visible(Some(&public), domain, records).await
            {
                break;
            }

            first_probe = false;
            let waited = waited_base + start.elapsed().as_secs();
            if waited >= timeout_secs {
                info!(domain, waited, "propagation wait timed out");
                return Ok(PropagationOutcome::TimedOut { waited_secs: waited });
            }

            let now = first_check + waited as i64;
            let wait = next_wait_secs(average, first_check, now, min_interval);
            trace!(domain, wait, "sleeping before next propagation check");
            tokio::time::sleep(Duration::from_secs(wait)).await;
        }

        let buffer = self.config.buffer_secs(registrar);
        if buffer > 0 {
            trace!(domain, buffer, "buffer delay for slower secondary resolvers");
            tokio::time::sleep(Duration::from_secs(buffer)).await;
        }

        for record in records {
            clear_change(self.cache, domain, record).await?;
        }

        let elapsed_secs = confirmed_after.unwrap_or(0);
        if !already_visible {
            if let Some(ns) = ns_ref {
                timing.record_observation(ns, elapsed_secs).await?;
            }
        }

        info!(domain, elapsed_secs, already_visible, "propagation confirmed");
        Ok(PropagationOutcome::Propagated {
            elapsed_secs,
            already_visible,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn expected_record_fqdn_and_key() {
        let apex = ExpectedRecord::new(RecordKind::A, "@", "198.51.100.7");
        assert_eq!(apex.fqdn("example.com"), "example.com");

        let wildcard = ExpectedRecord::new(RecordKind::A, "*", "198.51.100.7");
        assert_eq!(wildcard.fqdn("example.com"), "*.example.com");

        let challenge = ExpectedRecord::acme_challenge("tok3n");
        assert_eq!(challenge.fqdn("example.com"), "_acme-challenge.example.com");
        assert_eq!(
            challenge.change_key("example.com"),
            "example.com:TXT:_acme-challenge:tok3n"
        );
    }

    #[test]
    fn next_wait_halves_remaining_time() {
        // average 600s, first check at t=0, now t=100: (600 - 100) / 2
        assert_eq!(next_wait_secs(600, 0, 100, 5), 250);
        // past the expected completion: floor applies
        assert_eq!(next_wait_secs(600, 0, 700, 5), 5);
    }

    #[tokio::test]
    async fn first_observation_becomes_the_average() {
        let dir = tempdir().unwrap();
        let cache = ExpiringCache::open(dir.path().join("dns.cache")).await.unwrap();
        let config = FqdnConfig::default();
        let timing = TimingModel::new(&cache, &config);

        timing.record_observation("ns1.example.net", 240).await.unwrap();
        assert_eq!(timing.average_secs(Some("ns1.example.net"), None).await, 240);

        // second measurement is a two-point mean with the first
        timing.record_observation("ns1.example.net", 120).await.unwrap();
        assert_eq!(timing.average_secs(Some("ns1.example.net"), None).await, 180);
    }

    #[tokio::test]
    async fn average_falls_back_to_profile_then_default() {
        let dir = tempdir().unwrap();
        let cache = ExpiringCache::open(dir.path().join("dns.cache")).await.unwrap();
        let config = FqdnConfig::default();
        let timing = TimingModel::new(&cache, &config);

        // no cached average: registrar profile wins
        assert_eq!(
            timing.average_secs(Some("ns1.wedos.net"), Some("wedos.com")).await,
            300
        );
        // no profile either: configured default
        assert_eq!(
            timing.average_secs(Some("ns1.other.net"), Some("other.example")).await,
            config.propagation.default_average_secs
        );
    }

    #[tokio::test]
    async fn change_stamps_round_trip() {
        let dir = tempdir().unwrap();
        let cache = ExpiringCache::open(dir.path().join("dns.cache")).await.unwrap();
        let record = ExpectedRecord::acme_challenge("tok3n");

        assert_eq!(earliest_stamp(&cache, "example.com", &[record.clone()]).await, None);

        stamp_change(&cache, "example.com", &record).await.unwrap();
        let stamp = earliest_stamp(&cache, "example.com", &[record.clone()]).await;
        assert!(stamp.is_some());

        clear_change(&cache, "example.com", &record).await.unwrap();
        assert_eq!(earliest_stamp(&cache, "example.com", &[record]).await, None);
    }
}
