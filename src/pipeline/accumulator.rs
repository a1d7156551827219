//! Result accumulation for a checking run
//!
//! The accumulator is the single writer of the six output partitions. It is
//! owned by the orchestrator loop and fed one (entry, outcome) pair at a
//! time, so records are never interleaved and every counter is derived from
//! partition lengths instead of being tracked separately.

use chrono::{DateTime, Utc};
use serde::Serialize;
use std::collections::BTreeMap;
use std::fmt;
use std::time::Duration;

use crate::models::{AddressFamily, M3U_HEADER, PlaylistEntry, ProbeOutcome, ProbeStatus};
use crate::utils::{format_duration, format_percentage};

/// Which address family a partition groups
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum PartitionScope {
    /// Every entry regardless of family
    All,
    Family(AddressFamily),
}

impl PartitionScope {
    pub fn label(&self) -> &'static str {
        match self {
            PartitionScope::All => "all",
            PartitionScope::Family(family) => family.file_label(),
        }
    }
}

/// Identity of one of the six output partitions
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct PartitionId {
    pub scope: PartitionScope,
    pub status: ProbeStatus,
}

impl PartitionId {
    pub const ALL: [PartitionId; 6] = [
        PartitionId::new(PartitionScope::All, ProbeStatus::Ok),
        PartitionId::new(PartitionScope::All, ProbeStatus::Fail),
        PartitionId::new(PartitionScope::Family(AddressFamily::Ipv4), ProbeStatus::Ok),
        PartitionId::new(PartitionScope::Family(AddressFamily::Ipv4), ProbeStatus::Fail),
        PartitionId::new(PartitionScope::Family(AddressFamily::Ipv6), ProbeStatus::Ok),
        PartitionId::new(PartitionScope::Family(AddressFamily::Ipv6), ProbeStatus::Fail),
    ];

    pub const fn new(scope: PartitionScope, status: ProbeStatus) -> Self {
        Self { scope, status }
    }

    /// Output file name carrying the partition identity and its size
    pub fn file_name(&self, count: usize) -> String {
        let status = match self.status {
            ProbeStatus::Ok => "working",
            ProbeStatus::Fail => "failing",
        };
        format!("{}_{status}_{count}.m3u", self.scope.label())
    }
}

/// A rendered entry tagged with its playlist position
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RenderedRecord {
    pub index: usize,
    pub text: String,
}

/// The six append-only output sequences
#[derive(Debug, Clone, Default)]
pub struct PartitionSet {
    all_working: Vec<RenderedRecord>,
    all_failing: Vec<RenderedRecord>,
    ipv4_working: Vec<RenderedRecord>,
    ipv4_failing: Vec<RenderedRecord>,
    ipv6_working: Vec<RenderedRecord>,
    ipv6_failing: Vec<RenderedRecord>,
}

impl PartitionSet {
    fn slot_mut(&mut self, id: PartitionId) -> &mut Vec<RenderedRecord> {
        use AddressFamily::*;
        use PartitionScope::*;
        match (id.scope, id.status) {
            (All, ProbeStatus::Ok) => &mut self.all_working,
            (All, ProbeStatus::Fail) => &mut self.all_failing,
            (Family(Ipv4), ProbeStatus::Ok) => &mut self.ipv4_working,
            (Family(Ipv4), ProbeStatus::Fail) => &mut self.ipv4_failing,
            (Family(Ipv6), ProbeStatus::Ok) => &mut self.ipv6_working,
            (Family(Ipv6), ProbeStatus::Fail) => &mut self.ipv6_failing,
        }
    }

    pub fn records(&self, id: PartitionId) -> &[RenderedRecord] {
        use AddressFamily::*;
        use PartitionScope::*;
        match (id.scope, id.status) {
            (All, ProbeStatus::Ok) => &self.all_working,
            (All, ProbeStatus::Fail) => &self.all_failing,
            (Family(Ipv4), ProbeStatus::Ok) => &self.ipv4_working,
            (Family(Ipv4), ProbeStatus::Fail) => &self.ipv4_failing,
            (Family(Ipv6), ProbeStatus::Ok) => &self.ipv6_working,
            (Family(Ipv6), ProbeStatus::Fail) => &self.ipv6_failing,
        }
    }

    /// Append one entry to its combined and family partitions
    pub fn push(&mut self, entry: &PlaylistEntry, status: ProbeStatus) {
        let record = RenderedRecord {
            index: entry.index,
            text: entry.render(),
        };
        self.slot_mut(PartitionId::new(PartitionScope::Family(entry.address_family), status))
            .push(record.clone());
        self.slot_mut(PartitionId::new(PartitionScope::All, status))
            .push(record);
    }

    pub fn len(&self, id: PartitionId) -> usize {
        self.records(id).len()
    }

    pub fn scope_total(&self, scope: PartitionScope) -> usize {
        self.len(PartitionId::new(scope, ProbeStatus::Ok))
            + self.len(PartitionId::new(scope, ProbeStatus::Fail))
    }

    pub fn scope_working(&self, scope: PartitionScope) -> usize {
        self.len(PartitionId::new(scope, ProbeStatus::Ok))
    }

    pub fn total(&self) -> usize {
        self.scope_total(PartitionScope::All)
    }

    pub fn working(&self) -> usize {
        self.scope_working(PartitionScope::All)
    }

    pub fn failing(&self) -> usize {
        self.len(PartitionId::new(PartitionScope::All, ProbeStatus::Fail))
    }

    /// Render a partition as a playlist document.
    ///
    /// Records come out in arrival order unless `stable_order` asks for
    /// playlist order.
    pub fn render(&self, id: PartitionId, stable_order: bool) -> String {
        let mut records: Vec<&RenderedRecord> = self.records(id).iter().collect();
        if stable_order {
            records.sort_by_key(|record| record.index);
        }

        let mut document = String::with_capacity(
            M3U_HEADER.len() + 1 + records.iter().map(|r| r.text.len()).sum::<usize>(),
        );
        document.push_str(M3U_HEADER);
        document.push('\n');
        for record in records {
            document.push_str(&record.text);
        }
        document
    }
}

/// Per-family counters of a summary
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct FamilySummary {
    pub total: usize,
    pub working: usize,
    pub failing: usize,
}

/// Final report of a checking run
#[derive(Debug, Clone, Serialize)]
pub struct RunSummary {
    pub generated_at: DateTime<Utc>,
    pub total: usize,
    pub working: usize,
    pub failing: usize,
    pub ipv4: FamilySummary,
    pub ipv6: FamilySummary,
    /// Failure counts keyed by failure kind
    pub failure_reasons: BTreeMap<String, usize>,
    pub average_response_time_seconds: Option<f64>,
    pub elapsed_seconds: f64,
    pub cancelled: bool,
    pub undispatched: usize,
    /// Working entries whose channel name has an EPG listing
    #[serde(skip_serializing_if = "Option::is_none")]
    pub epg_matches: Option<usize>,
    /// Files written for this run
    pub files: Vec<String>,
}

impl fmt::Display for RunSummary {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "Check complete")?;
        writeln!(f, "Total: {} streams", self.total)?;
        writeln!(
            f,
            "Working: {} ({})",
            self.working,
            format_percentage(self.working, self.total)
        )?;
        writeln!(
            f,
            "IPv4: {} total, {} working",
            self.ipv4.total, self.ipv4.working
        )?;
        writeln!(
            f,
            "IPv6: {} total, {} working",
            self.ipv6.total, self.ipv6.working
        )?;
        if let Some(average) = self.average_response_time_seconds {
            writeln!(f, "Average response time: {average:.2}s")?;
        }
        if !self.failure_reasons.is_empty() {
            let reasons: Vec<String> = self
                .failure_reasons
                .iter()
                .map(|(kind, count)| format!("{kind}={count}"))
                .collect();
            writeln!(f, "Failures: {}", reasons.join(", "))?;
        }
        if let Some(matches) = self.epg_matches {
            writeln!(f, "EPG: {matches} working channels listed")?;
        }
        if self.cancelled {
            writeln!(f, "Cancelled: {} entries not checked", self.undispatched)?;
        }
        write!(
            f,
            "Elapsed: {}",
            format_duration(Duration::from_secs_f64(self.elapsed_seconds))
        )
    }
}

/// Single-writer accumulator of probe results
#[derive(Debug, Default)]
pub struct ResultAccumulator {
    partitions: PartitionSet,
    failure_reasons: BTreeMap<String, usize>,
    total_response_time: Duration,
    working_channels: Vec<String>,
}

impl ResultAccumulator {
    pub fn new() -> Self {
        Self::default()
    }

    /// Consume one finished probe
    pub fn record(&mut self, entry: &PlaylistEntry, outcome: &ProbeOutcome) {
        match outcome {
            ProbeOutcome::Working { response_time, .. } => {
                self.total_response_time += *response_time;
                if !entry.channel_name.is_empty() {
                    self.working_channels.push(entry.channel_name.clone());
                }
            }
            ProbeOutcome::Failed(reason) => {
                *self
                    .failure_reasons
                    .entry(reason.kind().to_string())
                    .or_insert(0) += 1;
            }
        }
        self.partitions.push(entry, outcome.status());
    }

    pub fn partitions(&self) -> &PartitionSet {
        &self.partitions
    }

    /// Channel names of working entries, in arrival order
    pub fn working_channels(&self) -> &[String] {
        &self.working_channels
    }

    pub fn family_summary(&self, family: AddressFamily) -> FamilySummary {
        let scope = PartitionScope::Family(family);
        let total = self.partitions.scope_total(scope);
        let working = self.partitions.scope_working(scope);
        FamilySummary {
            total,
            working,
            failing: total - working,
        }
    }

    /// Partitions to persist: combined always, a family only when it has entries
    pub fn emitted_partitions(&self) -> Vec<PartitionId> {
        PartitionId::ALL
            .into_iter()
            .filter(|id| match id.scope {
                PartitionScope::All => true,
                scope => self.partitions.scope_total(scope) > 0,
            })
            .collect()
    }

    /// (file name, document) pairs for every emitted partition
    pub fn documents(&self, stable_order: bool) -> Vec<(String, String)> {
        self.emitted_partitions()
            .into_iter()
            .map(|id| {
                (
                    id.file_name(self.partitions.len(id)),
                    self.partitions.render(id, stable_order),
                )
            })
            .collect()
    }

    pub fn summary(
        &self,
        elapsed: Duration,
        cancelled: bool,
        undispatched: usize,
    ) -> RunSummary {
        let working = self.partitions.working();
        let average_response_time_seconds = (working > 0)
            .then(|| self.total_response_time.as_secs_f64() / working as f64);

        RunSummary {
            generated_at: Utc::now(),
            total: self.partitions.total(),
            working,
            failing: self.partitions.failing(),
            ipv4: self.family_summary(AddressFamily::Ipv4),
            ipv6: self.family_summary(AddressFamily::Ipv6),
            failure_reasons: self.failure_reasons.clone(),
            average_response_time_seconds,
            elapsed_seconds: elapsed.as_secs_f64(),
            cancelled,
            undispatched,
            epg_matches: None,
            files: Vec::new(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::errors::ProbeFailure;
    use proptest::prelude::*;

    fn ok() -> ProbeOutcome {
        ProbeOutcome::Working {
            response_time: Duration::from_millis(100),
            status_code: 200,
            content_type: "video/mp2t".to_string(),
        }
    }

    fn entry(index: usize, url: &str) -> PlaylistEntry {
        PlaylistEntry::new(index, Some(format!("#EXTINF:-1,Channel {index}")), url)
    }

    #[test]
    fn empty_accumulator_has_zero_counts() {
        let acc = ResultAccumulator::new();
        let summary = acc.summary(Duration::ZERO, false, 0);
        assert_eq!(summary.total, 0);
        assert_eq!(summary.working, 0);
        assert!(summary.average_response_time_seconds.is_none());
        assert!(summary.to_string().contains("0.0%"));

        let documents = acc.documents(false);
        assert_eq!(documents.len(), 2);
        for (name, document) in documents {
            assert!(name.starts_with("all_"));
            assert_eq!(document, "#EXTM3U\n");
        }
    }

    #[test]
    fn each_entry_lands_in_two_partitions() {
        let mut acc = ResultAccumulator::new();
        acc.record(&entry(0, "http://10.0.0.1/a.ts"), &ok());
        acc.record(
            &entry(1, "http://[2001:db8::1]/b.ts"),
            &ProbeOutcome::failed(ProbeFailure::Timeout),
        );

        let partitions = acc.partitions();
        let sizes: Vec<usize> = PartitionId::ALL.iter().map(|id| partitions.len(*id)).collect();
        assert_eq!(sizes, vec![1, 1, 1, 0, 0, 1]);
        assert_eq!(sizes.iter().sum::<usize>(), 2 * partitions.total());

        let summary = acc.summary(Duration::from_secs(1), false, 0);
        assert_eq!(summary.failure_reasons.get("timeout"), Some(&1));
        assert_eq!(summary.ipv6, FamilySummary { total: 1, working: 0, failing: 1 });
    }

    #[test]
    fn file_names_embed_counts() {
        let mut acc = ResultAccumulator::new();
        acc.record(&entry(0, "http://10.0.0.1/a.ts"), &ok());
        acc.record(&entry(1, "http://10.0.0.2/b.ts"), &ok());

        let names: Vec<String> = acc.documents(false).into_iter().map(|(n, _)| n).collect();
        assert_eq!(
            names,
            vec![
                "all_working_2.m3u",
                "all_failing_0.m3u",
                "ipv4_working_2.m3u",
                "ipv4_failing_0.m3u",
            ]
        );
    }

    #[test]
    fn stable_order_sorts_by_playlist_position() {
        let mut acc = ResultAccumulator::new();
        acc.record(&entry(2, "http://10.0.0.3/c.ts"), &ok());
        acc.record(&entry(0, "http://10.0.0.1/a.ts"), &ok());

        let id = PartitionId::new(PartitionScope::All, ProbeStatus::Ok);
        let arrival = acc.partitions().render(id, false);
        let stable = acc.partitions().render(id, true);
        assert!(arrival.find("c.ts").unwrap() < arrival.find("a.ts").unwrap());
        assert!(stable.find("a.ts").unwrap() < stable.find("c.ts").unwrap());
        assert!(stable.starts_with("#EXTM3U\n#EXTINF:-1,Channel 0\nhttp://10.0.0.1/a.ts\n"));
    }

    proptest! {
        #[test]
        fn counters_match_partition_lengths(flags in prop::collection::vec((any::<bool>(), any::<bool>()), 0..64)) {
            let mut acc = ResultAccumulator::new();
            for (index, (is_v6, works)) in flags.iter().enumerate() {
                let url = if *is_v6 {
                    format!("http://[2001:db8::{index:x}]/s.ts")
                } else {
                    format!("http://10.0.0.{}/s.ts", index % 250)
                };
                let outcome = if *works { ok() } else { ProbeOutcome::failed(ProbeFailure::ConnectionError) };
                acc.record(&entry(index, &url), &outcome);
            }

            let p = acc.partitions();
            let v4 = acc.family_summary(AddressFamily::Ipv4);
            let v6 = acc.family_summary(AddressFamily::Ipv6);
            prop_assert_eq!(p.total(), flags.len());
            prop_assert_eq!(p.working() + p.failing(), p.total());
            prop_assert_eq!(v4.total + v6.total, p.total());
            prop_assert_eq!(v4.working + v6.working, p.working());
            prop_assert_eq!(p.working(), flags.iter().filter(|(_, w)| *w).count());
        }
    }
}
