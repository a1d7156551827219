//! Bounded-concurrency checking orchestrator
//!
//! Fans probes out over a `JoinSet` that never holds more than
//! `concurrency` tasks, collects each result as soon as its task finishes
//! and feeds it to the [`ResultAccumulator`], which this loop owns
//! exclusively. A task that panics or gets cancelled is still accounted
//! for: its entry is recorded as `Failed(Other(..))`.

use std::collections::{HashMap, VecDeque};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::task::{Id, JoinSet};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::config::Config;
use crate::errors::ProbeFailure;
use crate::models::{AddressFamily, PlaylistEntry, ProbeOutcome};
use crate::pipeline::accumulator::{ResultAccumulator, RunSummary};
use crate::services::progress_service::{FamilyProgress, ProgressReporter, ProgressSnapshot};
use crate::services::stream_prober::StreamProber;
use crate::utils::UrlUtils;

/// Run-level knobs handed to the orchestrator
#[derive(Debug, Clone)]
pub struct CheckerOptions {
    /// Maximum probes in flight
    pub concurrency: usize,
    /// Family dispatched first, if any
    pub preferred_family: Option<AddressFamily>,
    pub stable_order: bool,
    pub epg_enabled: bool,
}

impl Default for CheckerOptions {
    fn default() -> Self {
        Self {
            concurrency: crate::config::defaults::DEFAULT_CONCURRENCY,
            preferred_family: None,
            stable_order: crate::config::defaults::DEFAULT_STABLE_ORDER,
            epg_enabled: false,
        }
    }
}

impl CheckerOptions {
    pub fn from_config(config: &Config, preferred_family: Option<AddressFamily>) -> Self {
        Self {
            concurrency: config.checker.concurrency,
            preferred_family,
            stable_order: config.checker.stable_order,
            epg_enabled: config.epg.mode != crate::config::EpgMode::Disabled,
        }
    }

    pub fn with_concurrency(mut self, concurrency: usize) -> Self {
        self.concurrency = concurrency;
        self
    }
}

/// Everything a finished (or cancelled) run produced
#[derive(Debug)]
pub struct CheckReport {
    pub accumulator: ResultAccumulator,
    pub cancelled: bool,
    /// Entries never handed to a probe because of cancellation
    pub undispatched: usize,
    pub elapsed: Duration,
    pub stable_order: bool,
}

impl CheckReport {
    pub fn summary(&self) -> RunSummary {
        self.accumulator
            .summary(self.elapsed, self.cancelled, self.undispatched)
    }

    /// (file name, document) pairs to persist
    pub fn documents(&self) -> Vec<(String, String)> {
        self.accumulator.documents(self.stable_order)
    }
}

/// Order in which entries are handed to probes: preferred family first,
/// playlist order otherwise
pub fn dispatch_order(
    entries: Vec<PlaylistEntry>,
    preferred_family: Option<AddressFamily>,
) -> VecDeque<PlaylistEntry> {
    let mut entries = entries;
    if let Some(preferred) = preferred_family {
        entries.sort_by_key(|entry| entry.address_family != preferred);
    }
    entries.into()
}

pub struct CheckOrchestrator {
    prober: Arc<dyn StreamProber>,
    reporter: Arc<dyn ProgressReporter>,
    options: CheckerOptions,
}

impl CheckOrchestrator {
    pub fn new(
        prober: Arc<dyn StreamProber>,
        reporter: Arc<dyn ProgressReporter>,
        options: CheckerOptions,
    ) -> Self {
        Self {
            prober,
            reporter,
            options,
        }
    }

    pub fn options(&self) -> &CheckerOptions {
        &self.options
    }

    /// Probe every entry once and accumulate the results.
    ///
    /// Cancelling `cancellation_token` stops new dispatches; probes already
    /// in flight run to completion or to their own timeout.
    pub async fn run(
        &self,
        entries: Vec<PlaylistEntry>,
        cancellation_token: CancellationToken,
    ) -> CheckReport {
        let started = Instant::now();
        let concurrency = self.options.concurrency.max(1);
        let total = entries.len();

        let mut snapshot = ProgressSnapshot {
            completed: 0,
            total,
            ipv4: FamilyProgress::default(),
            ipv6: FamilyProgress::default(),
        };
        for entry in &entries {
            match entry.address_family {
                AddressFamily::Ipv4 => snapshot.ipv4.total += 1,
                AddressFamily::Ipv6 => snapshot.ipv6.total += 1,
            }
        }

        info!(
            preferred_family = ?self.options.preferred_family,
            epg_enabled = self.options.epg_enabled,
            "Starting check of {} streams ({} IPv4, {} IPv6) with {} workers",
            total,
            snapshot.ipv4.total,
            snapshot.ipv6.total,
            concurrency
        );

        let mut queue = dispatch_order(entries, self.options.preferred_family);
        let mut in_flight: HashMap<Id, PlaylistEntry> = HashMap::with_capacity(concurrency);
        let mut tasks: JoinSet<ProbeOutcome> = JoinSet::new();
        let mut accumulator = ResultAccumulator::new();

        loop {
            while tasks.len() < concurrency && !cancellation_token.is_cancelled() {
                let Some(entry) = queue.pop_front() else {
                    break;
                };
                let prober = Arc::clone(&self.prober);
                let url = entry.url.clone();
                let handle = tasks.spawn(async move { prober.probe(&url).await });
                in_flight.insert(handle.id(), entry);
            }

            let Some(joined) = tasks.join_next_with_id().await else {
                break;
            };

            let (id, outcome) = match joined {
                Ok((id, outcome)) => (id, outcome),
                Err(join_error) => {
                    let reason = if join_error.is_panic() {
                        "probe task panicked".to_string()
                    } else {
                        "probe task was cancelled".to_string()
                    };
                    (join_error.id(), ProbeOutcome::failed(ProbeFailure::Other(reason)))
                }
            };

            let Some(entry) = in_flight.remove(&id) else {
                warn!("Finished probe task {id} has no matching entry");
                continue;
            };

            if let Some(ProbeFailure::Other(message)) = outcome.error_reason() {
                debug!(
                    "Probe of {} failed unexpectedly: {message}",
                    UrlUtils::obfuscate_credentials(&entry.url)
                );
            }

            accumulator.record(&entry, &outcome);

            snapshot.completed += 1;
            if outcome.is_working() {
                match entry.address_family {
                    AddressFamily::Ipv4 => snapshot.ipv4.working += 1,
                    AddressFamily::Ipv6 => snapshot.ipv6.working += 1,
                }
            }
            self.reporter.report(&snapshot);
        }

        self.reporter.finish(&snapshot);

        let undispatched = queue.len();
        let cancelled = cancellation_token.is_cancelled();
        if cancelled {
            warn!(
                "Check cancelled: {} of {} streams were not probed",
                undispatched, total
            );
        }

        let elapsed = started.elapsed();
        info!(
            "Check finished: {}/{} working in {:.1}s",
            accumulator.partitions().working(),
            accumulator.partitions().total(),
            elapsed.as_secs_f64()
        );

        CheckReport {
            accumulator,
            cancelled,
            undispatched,
            elapsed,
            stable_order: self.options.stable_order,
        }
    }
}
