//! Progress reporting for checking runs
//!
//! The orchestrator builds a [`ProgressSnapshot`] after every completed probe
//! and hands it to a [`ProgressReporter`]. Reporters decide how often and
//! where to surface it: a refreshed terminal line, periodic log events, or
//! nothing at all.

use serde::Serialize;
use std::io::Write;
use std::sync::atomic::{AtomicUsize, Ordering};
use tracing::info;

use crate::models::AddressFamily;

/// Working/total counter pair for one address family
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct FamilyProgress {
    /// Entries of this family that probed as working so far
    pub working: usize,
    /// Entries of this family in the whole playlist
    pub total: usize,
}

/// Point-in-time view of a running batch
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct ProgressSnapshot {
    pub completed: usize,
    pub total: usize,
    pub ipv4: FamilyProgress,
    pub ipv6: FamilyProgress,
}

impl ProgressSnapshot {
    /// Completion percentage, 0 for an empty batch
    pub fn percentage(&self) -> f64 {
        if self.total == 0 {
            return 0.0;
        }
        self.completed as f64 * 100.0 / self.total as f64
    }

    pub fn family(&self, family: AddressFamily) -> FamilyProgress {
        match family {
            AddressFamily::Ipv4 => self.ipv4,
            AddressFamily::Ipv6 => self.ipv6,
        }
    }

    /// Completion in tenths of a percent, the resolution of [`status_line`](Self::status_line)
    pub fn permille(&self) -> usize {
        if self.total == 0 {
            return 0;
        }
        self.completed.saturating_mul(1000) / self.total
    }

    pub fn is_complete(&self) -> bool {
        self.completed >= self.total
    }

    /// Single status line, e.g. `Progress: 3/10 (30.0%) IPv4 working: 2/8 IPv6 working: 0/2`
    pub fn status_line(&self) -> String {
        format!(
            "Progress: {}/{} ({:.1}%) IPv4 working: {}/{} IPv6 working: {}/{}",
            self.completed,
            self.total,
            self.percentage(),
            self.ipv4.working,
            self.ipv4.total,
            self.ipv6.working,
            self.ipv6.total
        )
    }
}

/// Sink for progress snapshots
pub trait ProgressReporter: Send + Sync {
    /// Called once per completed probe
    fn report(&self, snapshot: &ProgressSnapshot);

    /// Called once after the last probe finished
    fn finish(&self, _snapshot: &ProgressSnapshot) {}
}

/// Rewrites one stderr line in place, only when the displayed percentage moves
#[derive(Debug)]
pub struct TerminalProgressReporter {
    last_drawn: AtomicUsize,
}

impl TerminalProgressReporter {
    pub fn new() -> Self {
        Self {
            last_drawn: AtomicUsize::new(usize::MAX),
        }
    }

    /// Whether this snapshot changes the visible line; claims the redraw if so
    fn should_redraw(&self, snapshot: &ProgressSnapshot) -> bool {
        let permille = snapshot.permille();
        self.last_drawn.swap(permille, Ordering::Relaxed) != permille || snapshot.is_complete()
    }
}

impl Default for TerminalProgressReporter {
    fn default() -> Self {
        Self::new()
    }
}

impl ProgressReporter for TerminalProgressReporter {
    fn report(&self, snapshot: &ProgressSnapshot) {
        if !self.should_redraw(snapshot) {
            return;
        }
        let mut stderr = std::io::stderr().lock();
        let _ = write!(stderr, "\r{}", snapshot.status_line());
        let _ = stderr.flush();
    }

    fn finish(&self, _snapshot: &ProgressSnapshot) {
        let _ = writeln!(std::io::stderr());
    }
}

/// Emits an `info!` event every `interval` completions and at the end
#[derive(Debug)]
pub struct LogProgressReporter {
    interval: usize,
}

impl LogProgressReporter {
    pub fn new(interval: usize) -> Self {
        Self {
            interval: interval.max(1),
        }
    }
}

impl ProgressReporter for LogProgressReporter {
    fn report(&self, snapshot: &ProgressSnapshot) {
        if snapshot.completed % self.interval == 0 && !snapshot.is_complete() {
            info!(
                completed = snapshot.completed,
                total = snapshot.total,
                "{}",
                snapshot.status_line()
            );
        }
    }

    fn finish(&self, snapshot: &ProgressSnapshot) {
        info!(
            completed = snapshot.completed,
            total = snapshot.total,
            "{}",
            snapshot.status_line()
        );
    }
}

/// Discards all progress
#[derive(Debug, Default)]
pub struct NoopProgressReporter;

impl ProgressReporter for NoopProgressReporter {
    fn report(&self, _snapshot: &ProgressSnapshot) {}
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_batch_has_zero_percentage() {
        let snapshot = ProgressSnapshot::default();
        assert_eq!(snapshot.percentage(), 0.0);
        assert!(snapshot.is_complete());
        assert_eq!(
            snapshot.status_line(),
            "Progress: 0/0 (0.0%) IPv4 working: 0/0 IPv6 working: 0/0"
        );
    }

    #[test]
    fn status_line_carries_family_counts() {
        let snapshot = ProgressSnapshot {
            completed: 3,
            total: 10,
            ipv4: FamilyProgress { working: 2, total: 8 },
            ipv6: FamilyProgress { working: 0, total: 2 },
        };
        assert_eq!(snapshot.percentage(), 30.0);
        assert_eq!(snapshot.family(AddressFamily::Ipv4).working, 2);
        assert_eq!(
            snapshot.status_line(),
            "Progress: 3/10 (30.0%) IPv4 working: 2/8 IPv6 working: 0/2"
        );
    }

    #[test]
    fn log_reporter_never_divides_by_zero_interval() {
        let reporter = LogProgressReporter::new(0);
        reporter.report(&ProgressSnapshot {
            completed: 1,
            total: 2,
            ..Default::default()
        });
        reporter.finish(&ProgressSnapshot::default());
    }

    #[test]
    fn terminal_reporter_redraws_only_when_percentage_moves() {
        let reporter = TerminalProgressReporter::new();
        let snapshot = |completed| ProgressSnapshot {
            completed,
            total: 100_000,
            ..Default::default()
        };

        assert!(reporter.should_redraw(&snapshot(1)));
        // 1..=99 share the same tenth of a percent
        for completed in 2..100 {
            assert!(!reporter.should_redraw(&snapshot(completed)));
        }
        assert!(reporter.should_redraw(&snapshot(100)));
        assert!(!reporter.should_redraw(&snapshot(150)));
        assert!(reporter.should_redraw(&snapshot(100_000)));
        assert_eq!(snapshot(100_000).permille(), 1000);
    }
}
