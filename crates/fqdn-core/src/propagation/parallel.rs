// # Parallel Propagation Poller
//
// Tracks N domains at once inside one loop with a shared 1-second tick.
// Every pending domain is re-checked on every tick rather than on the
// adaptive schedule; that is an intentional trade-off for interactive
// multi-domain feedback, kept deliberately distinct from the
// single-domain path.
//
// Each domain carries its own start time, authoritative nameserver and
// timeout; one domain timing out never affects another.

use std::time::Duration;
use tokio::time::Instant;
use tracing::{debug, info, warn};

use crate::cache::ExpiringCache;
use crate::config::FqdnConfig;
use crate::dns::authoritative_ns;
use crate::error::Result;
use crate::traits::DnsQuery;

use super::{
    ExpectedRecord, PropagationOutcome, PropagationPoller, TimingModel, clear_change,
    earliest_stamp,
};

/// One domain's batch entry: the records expected to appear
#[derive(Debug, Clone)]
pub struct DomainWait {
    /// The domain being watched
    pub domain: String,
    /// Records that must become visible
    pub records: Vec<ExpectedRecord>,
}

enum Phase {
    AwaitingAuthoritative,
    AwaitingPublic,
    Buffering { until: Instant },
}

struct Pending {
    domain: String,
    records: Vec<ExpectedRecord>,
    nameserver: Option<String>,
    /// Seconds already waited before this process took over (from a
    /// live change stamp)
    waited_base: u64,
    phase: Phase,
    probed: bool,
    already_visible: bool,
    confirmed_after: u64,
}

/// Wait for a batch of domains to propagate, one second per tick.
///
/// Returns one outcome per input domain. A timeout is per-domain and
/// non-fatal: callers may treat a partially propagated batch as partial
/// success.
pub async fn wait_for_domains(
    dns: &dyn DnsQuery,
    cache: &ExpiringCache,
    config: &FqdnConfig,
    batch: Vec<DomainWait>,
    registrar: Option<&str>,
) -> Result<Vec<(String, PropagationOutcome)>> {
    let poller = PropagationPoller::new(dns, cache, config);
    let timing = TimingModel::new(cache, config);
    let public = config.public_resolver.to_string();
    let buffer = Duration::from_secs(config.buffer_secs(registrar));
    let timeout_secs = config.propagation.timeout_secs;

    let mut pending = Vec::with_capacity(batch.len());
    for entry in batch {
        let nameserver = match authoritative_ns(dns, cache, &entry.domain).await {
            Ok(ns) => ns,
            Err(e) => {
                warn!(domain = %entry.domain, error = %e, "authoritative lookup failed, using public resolver only");
                None
            }
        };
        let now = chrono::Utc::now().timestamp();
        let first_check = earliest_stamp(cache, &entry.domain, &entry.records)
            .await
            .unwrap_or(now);

        pending.push(Pending {
            domain: entry.domain,
            records: entry.records,
            nameserver,
            waited_base: (now - first_check).max(0) as u64,
            phase: Phase::AwaitingAuthoritative,
            probed: false,
            already_visible: false,
            confirmed_after: 0,
        });
    }

    if pending.is_empty() {
        return Ok(Vec::new());
    }

    info!(domains = pending.len(), "waiting for batch propagation");

    let start = Instant::now();
    let mut outcomes = Vec::new();
    let mut ticker = tokio::time::interval(Duration::from_secs(1));

    while !pending.is_empty() {
        ticker.tick().await;

        let mut still_pending = Vec::with_capacity(pending.len());
        for mut entry in pending {
            let waited = entry.waited_base + start.elapsed().as_secs();

            // a timeout only applies while propagation is unconfirmed;
            // the buffering phase always runs to completion
            if !matches!(entry.phase, Phase::Buffering { .. }) && waited >= timeout_secs {
                info!(domain = %entry.domain, waited, "domain timed out");
                outcomes.push((
                    entry.domain,
                    PropagationOutcome::TimedOut { waited_secs: waited },
                ));
                continue;
            }

            match entry.phase {
                Phase::AwaitingAuthoritative => {
                    let visible = poller
                        .records_visible(entry.nameserver.as_deref(), &entry.domain, &entry.records)
                        .await;
                    if visible {
                        entry.already_visible = !entry.probed;
                        entry.confirmed_after = waited;
                        entry.phase = Phase::AwaitingPublic;
                        debug!(domain = %entry.domain, "authoritative nameserver confirmed");
                    }
                    entry.probed = true;
                    still_pending.push(entry);
                }
                Phase::AwaitingPublic => {
                    if poller
                        .records_visible(Some(&public), &entry.domain, &entry.records)
                        .await
                    {
                        entry.phase = Phase::Buffering {
                            until: Instant::now() + buffer,
                        };
                        debug!(domain = %entry.domain, "public resolver confirmed");
                    }
                    still_pending.push(entry);
                }
                Phase::Buffering { until } => {
                    if Instant::now() < until {
                        still_pending.push(entry);
                        continue;
                    }

                    for record in &entry.records {
                        clear_change(cache, &entry.domain, record).await?;
                    }
                    if !entry.already_visible {
                        if let Some(ref ns) = entry.nameserver {
                            timing.record_observation(ns, entry.confirmed_after).await?;
                        }
                    }
                    info!(
                        domain = %entry.domain,
                        elapsed = entry.confirmed_after,
                        "domain propagated"
                    );
                    outcomes.push((
                        entry.domain,
                        PropagationOutcome::Propagated {
                            elapsed_secs: entry.confirmed_after,
                            already_visible: entry.already_visible,
                        },
                    ));
                }
            }
        }
        pending = still_pending;
    }

    Ok(outcomes)
}
