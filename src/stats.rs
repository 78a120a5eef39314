use crate::model::{HealthStatus, HistoryEntry, ProbeResult, ProbeStatus};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::VecDeque;

/// Running statistics for one target. Mutated only through `record` and
/// `prune_history_before`; uptime and average latency are derived from the
/// counters on read and never stored.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct TargetStats {
    #[serde(default)]
    pub current_status: HealthStatus,
    #[serde(default)]
    pub last_checked_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub total_checks: u64,
    #[serde(default)]
    pub successful_checks: u64,
    #[serde(default)]
    pub cumulative_latency_ms: u64,
    #[serde(default)]
    pub history: VecDeque<HistoryEntry>,
    #[serde(default)]
    pub last_incident_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub incident_count: u64,
}

impl TargetStats {
    pub fn uptime_percent(&self) -> f64 {
        if self.total_checks == 0 {
            return 0.0;
        }
        self.successful_checks as f64 / self.total_checks as f64 * 100.0
    }

    pub fn average_latency_ms(&self) -> f64 {
        if self.total_checks == 0 {
            return 0.0;
        }
        self.cumulative_latency_ms as f64 / self.total_checks as f64
    }

    /// Fold one probe result into the stats. Pure in-memory update, no I/O.
    ///
    /// Not idempotent: applying the same result twice double-counts, so the
    /// caller must apply each probe outcome at most once.
    pub fn record(&mut self, result: &ProbeResult, capacity: usize) {
        self.history.push_back(HistoryEntry::from(result));
        while self.history.len() > capacity {
            self.history.pop_front();
        }

        self.total_checks += 1;
        if result.status == ProbeStatus::Up {
            self.successful_checks += 1;
        }
        // Failed attempts still contribute their elapsed time.
        self.cumulative_latency_ms += result.latency_ms;

        if result.status == ProbeStatus::Down {
            self.last_incident_at = Some(result.checked_at);
            self.incident_count += 1;
        }

        self.current_status = result.status.into();
        self.last_checked_at = Some(result.checked_at);
    }

    /// Time-based secondary bound on history, independent of the ring-buffer
    /// capacity. Returns the number of entries removed.
    pub fn prune_history_before(&mut self, cutoff: DateTime<Utc>) -> usize {
        let before = self.history.len();
        self.history.retain(|entry| entry.checked_at >= cutoff);
        before - self.history.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;

    fn result(status: ProbeStatus, latency_ms: u64) -> ProbeResult {
        ProbeResult {
            status,
            latency_ms,
            status_code: match status {
                ProbeStatus::Up => Some(200),
                ProbeStatus::Degraded => Some(404),
                ProbeStatus::Down => None,
            },
            reason: None,
            checked_at: Utc::now(),
        }
    }

    #[test]
    fn fresh_stats_report_unknown_and_zero() {
        let stats = TargetStats::default();
        assert_eq!(stats.current_status, HealthStatus::Unknown);
        assert_eq!(stats.total_checks, 0);
        assert_eq!(stats.uptime_percent(), 0.0);
        assert_eq!(stats.average_latency_ms(), 0.0);
    }

    #[test]
    fn counters_track_every_result() {
        let mut stats = TargetStats::default();
        let sequence = [
            result(ProbeStatus::Up, 100),
            result(ProbeStatus::Degraded, 6000),
            result(ProbeStatus::Down, 10000),
            result(ProbeStatus::Up, 140),
        ];
        for r in &sequence {
            stats.record(r, 288);
        }

        assert_eq!(stats.total_checks, 4);
        assert_eq!(stats.successful_checks, 2);
        assert!(stats.successful_checks <= stats.total_checks);
        // Latency accumulates even for failed attempts.
        assert_eq!(stats.cumulative_latency_ms, 100 + 6000 + 10000 + 140);
        assert_eq!(stats.average_latency_ms(), 16240.0 / 4.0);
        assert_eq!(stats.uptime_percent(), 50.0);
        assert_eq!(stats.current_status, HealthStatus::Up);
        assert!(stats.last_checked_at.is_some());
    }

    #[test]
    fn all_up_means_full_uptime() {
        let mut stats = TargetStats::default();
        for _ in 0..10 {
            stats.record(&result(ProbeStatus::Up, 50), 288);
        }
        assert_eq!(stats.total_checks, stats.successful_checks);
        assert_eq!(stats.uptime_percent(), 100.0);
    }

    #[test]
    fn history_is_bounded_and_keeps_newest() {
        let mut stats = TargetStats::default();
        for i in 0..10 {
            stats.record(&result(ProbeStatus::Up, i), 4);
            assert!(stats.history.len() <= 4);
        }
        assert_eq!(stats.history.len(), 4);
        let latencies: Vec<u64> = stats.history.iter().map(|e| e.latency_ms).collect();
        assert_eq!(latencies, vec![6, 7, 8, 9]);
    }

    #[test]
    fn incident_fields_count_down_results() {
        let mut stats = TargetStats::default();
        for _ in 0..3 {
            stats.record(&result(ProbeStatus::Down, 10000), 2);
        }
        // Three consecutive downs against capacity 2.
        assert_eq!(stats.history.len(), 2);
        assert!(stats.history.iter().all(|e| e.status == ProbeStatus::Down));
        assert_eq!(stats.incident_count, 3);
        assert_eq!(stats.current_status, HealthStatus::Down);
        assert_eq!(stats.last_incident_at, stats.last_checked_at);
    }

    #[test]
    fn degraded_is_not_an_incident() {
        let mut stats = TargetStats::default();
        stats.record(&result(ProbeStatus::Degraded, 6000), 288);
        assert_eq!(stats.incident_count, 0);
        assert!(stats.last_incident_at.is_none());
        assert_eq!(stats.current_status, HealthStatus::Degraded);
    }

    #[test]
    fn duplicate_apply_double_counts() {
        // By design the fold is not idempotent; at-most-once delivery is the
        // scheduler's job.
        let mut stats = TargetStats::default();
        let r = result(ProbeStatus::Up, 100);
        stats.record(&r, 288);
        stats.record(&r, 288);
        assert_eq!(stats.total_checks, 2);
        assert_eq!(stats.successful_checks, 2);
    }

    #[test]
    fn prune_drops_only_entries_older_than_cutoff() {
        let mut stats = TargetStats::default();
        let now = Utc::now();
        for days_ago in [40, 35, 10, 1] {
            let mut r = result(ProbeStatus::Up, 100);
            r.checked_at = now - Duration::days(days_ago);
            stats.record(&r, 288);
        }

        let removed = stats.prune_history_before(now - Duration::days(30));
        assert_eq!(removed, 2);
        assert_eq!(stats.history.len(), 2);
        assert!(stats.history.iter().all(|e| e.checked_at >= now - Duration::days(30)));
        // Counters are cumulative and unaffected by retention pruning.
        assert_eq!(stats.total_checks, 4);
    }
}
