//! Contract test: propagation pollers and timing model discipline
//!
//! Verifies with a scripted resolver:
//! - the authoritative nameserver is cached (one SOA query per TTL)
//! - records visible on the very first check skip the average update
//! - a measured propagation feeds the average; a restart reuses the
//!   change stamp as the first-check time
//! - the timeout yields a non-fatal `TimedOut`
//! - the parallel variant keeps per-domain outcomes independent
//! - the certify guard never pushes an already-correct value

use std::sync::Arc;
use std::sync::atomic::Ordering;

use fqdn_core::cache::{CacheKind, ExpiringCache};
use fqdn_core::dns::authoritative_ns;
use fqdn_core::propagation::{
    DomainWait, ExpectedRecord, PropagationOutcome, PropagationPoller, wait_for_domains,
};
use fqdn_core::state::{DomainStatus, DomainStore};
use fqdn_core::traits::RecordKind;
use fqdn_core::{FqdnEngine, ProviderRegistry};

mod common;
use common::{MemoryCredentials, MockDns, MockProvider, MockWhois, QueueFactory, test_config};

const NS: &str = "ns1.example.net";
const PUBLIC: &str = "8.8.8.8";

#[tokio::test]
async fn authoritative_nameserver_is_cached() {
    let dir = tempfile::tempdir().unwrap();
    let cache = ExpiringCache::open(dir.path().join("dns.cache")).await.unwrap();

    let dns = MockDns::new();
    dns.set_soa("example.com", NS).await;

    let first = authoritative_ns(&dns, &cache, "example.com").await.unwrap();
    assert_eq!(first.as_deref(), Some(NS));

    // the second call is served from the cache without a DNS query
    let second = authoritative_ns(&dns, &cache, "example.com").await.unwrap();
    assert_eq!(second.as_deref(), Some(NS));
    assert_eq!(dns.soa_query_count(), 1);
}

#[tokio::test(start_paused = true)]
async fn already_visible_records_skip_the_average_update() {
    let dir = tempfile::tempdir().unwrap();
    let config = test_config(dir.path());
    let cache = ExpiringCache::open(&config.cache_path).await.unwrap();

    let dns = MockDns::new();
    dns.set_soa("example.com", NS).await;
    let record = ExpectedRecord::acme_challenge("tok3n");
    dns.set_records_everywhere(
        &[NS, PUBLIC],
        "_acme-challenge.example.com",
        RecordKind::Txt,
        &["tok3n"],
    )
    .await;

    let poller = PropagationPoller::new(&dns, &cache, &config);
    let outcome = poller
        .wait_for_domain("example.com", &[record], None)
        .await
        .unwrap();

    assert_eq!(
        outcome,
        PropagationOutcome::Propagated {
            elapsed_secs: 0,
            already_visible: true,
        }
    );
    // recording a near-zero measurement would corrupt the average
    assert_eq!(cache.get(CacheKind::AvgPropagation, NS).await, None);
}

#[tokio::test(start_paused = true)]
async fn measured_propagation_updates_the_average() {
    let dir = tempfile::tempdir().unwrap();
    let config = test_config(dir.path());
    let cache = ExpiringCache::open(&config.cache_path).await.unwrap();

    let dns = MockDns::new();
    dns.set_soa("example.com", NS).await;
    let record = ExpectedRecord::acme_challenge("tok3n");

    // the record appears a few virtual seconds after the wait starts
    {
        let dns = dns.clone();
        tokio::spawn(async move {
            tokio::time::sleep(std::time::Duration::from_secs(3)).await;
            dns.set_records_everywhere(
                &[NS, PUBLIC],
                "_acme-challenge.example.com",
                RecordKind::Txt,
                &["tok3n"],
            )
            .await;
        });
    }

    let poller = PropagationPoller::new(&dns, &cache, &config);
    let outcome = poller
        .wait_for_domain("example.com", &[record], None)
        .await
        .unwrap();

    let PropagationOutcome::Propagated {
        elapsed_secs,
        already_visible,
    } = outcome
    else {
        panic!("expected propagation, got {outcome:?}");
    };
    assert!(!already_visible);

    // the first measurement becomes the average exactly
    let average: u64 = cache
        .get(CacheKind::AvgPropagation, NS)
        .await
        .expect("average recorded")
        .parse()
        .unwrap();
    assert_eq!(average, elapsed_secs);
}

#[tokio::test(start_paused = true)]
async fn restart_reuses_the_change_stamp_for_the_timeout_clock() {
    let dir = tempfile::tempdir().unwrap();
    let config = test_config(dir.path());
    let cache = ExpiringCache::open(&config.cache_path).await.unwrap();

    let dns = MockDns::new();
    dns.set_soa("example.com", NS).await;
    let record = ExpectedRecord::acme_challenge("tok3n");

    // a previous process stamped the change well past the timeout and
    // died; the resumed wait must not reset the clock
    let stale = chrono::Utc::now().timestamp() - (config.propagation.timeout_secs as i64 + 10);
    cache
        .set_at(
            CacheKind::DnsChange,
            &record.change_key("example.com"),
            &stale.to_string(),
            stale,
        )
        .await
        .unwrap();

    let poller = PropagationPoller::new(&dns, &cache, &config);
    let outcome = poller
        .wait_for_domain("example.com", &[record], None)
        .await
        .unwrap();

    let PropagationOutcome::TimedOut { waited_secs } = outcome else {
        panic!("expected timeout, got {outcome:?}");
    };
    assert!(waited_secs >= config.propagation.timeout_secs);
}

#[tokio::test(start_paused = true)]
async fn timeout_is_returned_not_raised() {
    let dir = tempfile::tempdir().unwrap();
    let config = test_config(dir.path());
    let cache = ExpiringCache::open(&config.cache_path).await.unwrap();

    let dns = MockDns::new();
    dns.set_soa("example.com", NS).await;
    let record = ExpectedRecord::new(RecordKind::A, "@", "198.51.100.7");

    let poller = PropagationPoller::new(&dns, &cache, &config);
    let outcome = poller
        .wait_for_domain("example.com", &[record], None)
        .await
        .unwrap();

    assert!(matches!(outcome, PropagationOutcome::TimedOut { .. }));
}

#[tokio::test(start_paused = true)]
async fn parallel_outcomes_are_independent() {
    let dir = tempfile::tempdir().unwrap();
    let config = test_config(dir.path());
    let cache = ExpiringCache::open(&config.cache_path).await.unwrap();

    let dns = MockDns::new();
    dns.set_soa("fast.com", NS).await;
    dns.set_soa("slow.com", NS).await;

    let fast = ExpectedRecord::new(RecordKind::A, "@", "198.51.100.7");
    dns.set_records_everywhere(&[NS, PUBLIC], "fast.com", RecordKind::A, &["198.51.100.7"])
        .await;
    // slow.com never shows its record

    let batch = vec![
        DomainWait {
            domain: "fast.com".to_string(),
            records: vec![fast.clone()],
        },
        DomainWait {
            domain: "slow.com".to_string(),
            records: vec![ExpectedRecord::new(RecordKind::A, "@", "198.51.100.7")],
        },
    ];

    let mut outcomes = wait_for_domains(&dns, &cache, &config, batch, None)
        .await
        .unwrap();
    outcomes.sort_by(|a, b| a.0.cmp(&b.0));

    assert_eq!(outcomes.len(), 2);
    assert!(matches!(
        outcomes[0],
        (ref d, PropagationOutcome::Propagated { .. }) if d == "fast.com"
    ));
    assert!(matches!(
        outcomes[1],
        (ref d, PropagationOutcome::TimedOut { .. }) if d == "slow.com"
    ));
}

#[tokio::test(start_paused = true)]
async fn certify_guard_skips_push_when_record_already_correct() {
    let dir = tempfile::tempdir().unwrap();
    let config = test_config(dir.path());
    DomainStore::init(&config.domains_path).await.unwrap();

    let dns = MockDns::new();
    dns.set_soa("example.com", NS).await;
    dns.set_records(
        Some(NS),
        "_acme-challenge.example.com",
        RecordKind::Txt,
        &["tok3n"],
    )
    .await;

    let mut provider = MockProvider::reporting("wedos.com", DomainStatus::Owned);
    provider.dns = Some((dns.clone(), vec![NS.to_string(), PUBLIC.to_string()]));
    let counters = provider.counters.clone();

    let registry = Arc::new(ProviderRegistry::new());
    registry.register("wedos.com", Box::new(QueueFactory::of(vec![provider])));

    let engine = FqdnEngine::new(
        config.clone(),
        registry,
        Box::new(dns.clone()),
        Box::new(MockWhois::naming("wedos.com")),
        Box::new(MemoryCredentials::new().with("wedos.com", "user", "secret")),
        None,
    )
    .await
    .unwrap();

    engine.certify("example.com", "tok3n").await.unwrap();

    // no provider call, no average pollution
    assert_eq!(counters.certify_calls.load(Ordering::SeqCst), 0);
    let cache = ExpiringCache::open(&config.cache_path).await.unwrap();
    assert_eq!(cache.get(CacheKind::AvgPropagation, NS).await, None);
}

#[tokio::test(start_paused = true)]
async fn certify_pushes_waits_and_clears_the_stamp() {
    let dir = tempfile::tempdir().unwrap();
    let config = test_config(dir.path());
    DomainStore::init(&config.domains_path).await.unwrap();

    let dns = MockDns::new();
    dns.set_soa("example.com", NS).await;

    let mut provider = MockProvider::reporting("wedos.com", DomainStatus::Owned);
    provider.dns = Some((dns.clone(), vec![NS.to_string(), PUBLIC.to_string()]));
    let counters = provider.counters.clone();

    let registry = Arc::new(ProviderRegistry::new());
    registry.register("wedos.com", Box::new(QueueFactory::of(vec![provider])));

    let engine = FqdnEngine::new(
        config.clone(),
        registry,
        Box::new(dns.clone()),
        Box::new(MockWhois::naming("wedos.com")),
        Box::new(MemoryCredentials::new().with("wedos.com", "user", "secret")),
        None,
    )
    .await
    .unwrap();

    engine.certify("example.com", "tok3n").await.unwrap();
    assert_eq!(counters.certify_calls.load(Ordering::SeqCst), 1);

    // confirmed propagation drops the pending-change stamp
    let cache = ExpiringCache::open(&config.cache_path).await.unwrap();
    let record = ExpectedRecord::acme_challenge("tok3n");
    assert_eq!(
        cache
            .get(CacheKind::DnsChange, &record.change_key("example.com"))
            .await,
        None
    );
}

#[tokio::test(start_paused = true)]
async fn set_init_dns_records_guards_and_waits_per_domain() {
    let dir = tempfile::tempdir().unwrap();
    let config = test_config(dir.path());
    DomainStore::init(&config.domains_path).await.unwrap();

    let dns = MockDns::new();
    dns.set_soa("ready.com", NS).await;
    dns.set_soa("new.com", NS).await;

    // ready.com already carries the full record set
    let wan = "198.51.100.7";
    dns.set_records_everywhere(&[NS, PUBLIC], "ready.com", RecordKind::A, &[wan]).await;
    dns.set_records_everywhere(&[NS, PUBLIC], "*.ready.com", RecordKind::A, &[wan]).await;
    dns.set_records_everywhere(&[NS, PUBLIC], "ready.com", RecordKind::Mx, &["ready.com"])
        .await;

    let mut provider = MockProvider::reporting("wedos.com", DomainStatus::Owned);
    provider.dns = Some((dns.clone(), vec![NS.to_string(), PUBLIC.to_string()]));
    let counters = provider.counters.clone();

    let registry = Arc::new(ProviderRegistry::new());
    registry.register("wedos.com", Box::new(QueueFactory::of(vec![provider])));

    let engine = FqdnEngine::new(
        config.clone(),
        registry,
        Box::new(dns.clone()),
        Box::new(MockWhois::naming("wedos.com")),
        Box::new(MemoryCredentials::new().with("wedos.com", "user", "secret")),
        None,
    )
    .await
    .unwrap();

    let mut results = engine
        .set_init_dns_records(
            &["ready.com".to_string(), "new.com".to_string()],
            "wedos.com",
            false,
        )
        .await
        .unwrap();
    results.sort_by(|a, b| a.0.cmp(&b.0));

    // only the domain with missing records reached the provider
    assert_eq!(counters.init_dns_calls.load(Ordering::SeqCst), 1);
    assert_eq!(results.len(), 2);
    assert!(matches!(
        results[0],
        (ref d, fqdn_core::engine::InitDnsOutcome::Propagated { .. }) if d == "new.com"
    ));
    assert!(matches!(
        results[1],
        (ref d, fqdn_core::engine::InitDnsOutcome::AlreadyVisible) if d == "ready.com"
    ));
}
