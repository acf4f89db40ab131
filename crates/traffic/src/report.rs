//! Run summary.

use hdrhistogram::Histogram;
use robustness_types::{History, OperationKind};
use std::collections::{BTreeMap, HashSet};
use std::time::Duration;

/// Success and failure counts for one operation kind.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct KindStats {
    pub succeeded: u64,
    pub failed: u64,
}

impl KindStats {
    pub fn total(&self) -> u64 {
        self.succeeded + self.failed
    }
}

/// Latency percentiles over every recorded operation.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct LatencySummary {
    pub p50: Duration,
    pub p90: Duration,
    pub p99: Duration,
    pub max: Duration,
}

impl LatencySummary {
    fn from_history(history: &History) -> Self {
        let Ok(mut histogram) = Histogram::<u64>::new(3) else {
            return Self::default();
        };
        for record in history.operations() {
            let latency = record.returned.0.saturating_sub(record.invoked.0);
            histogram.saturating_record(latency);
        }
        if histogram.is_empty() {
            return Self::default();
        }
        Self {
            p50: Duration::from_nanos(histogram.value_at_percentile(50.0)),
            p90: Duration::from_nanos(histogram.value_at_percentile(90.0)),
            p99: Duration::from_nanos(histogram.value_at_percentile(99.0)),
            max: Duration::from_nanos(histogram.max()),
        }
    }
}

/// Outcome of a traffic run: the merged history plus summary statistics.
#[derive(Debug, Clone)]
pub struct TrafficReport {
    history: History,
    duration: Duration,
    qps: f64,
    kinds: BTreeMap<OperationKind, KindStats>,
    keys: usize,
    latency: LatencySummary,
}

impl TrafficReport {
    /// Summarize `history`, recorded over a traffic phase of `duration`.
    pub fn new(history: History, duration: Duration) -> Self {
        let mut kinds: BTreeMap<OperationKind, KindStats> = BTreeMap::new();
        let mut keys: HashSet<&str> = HashSet::new();
        for record in history.operations() {
            keys.extend(record.request.keys());
            let stats = kinds.entry(record.kind()).or_default();
            if record.is_success() {
                stats.succeeded += 1;
            } else {
                stats.failed += 1;
            }
        }

        let secs = duration.as_secs_f64();
        let qps = if secs > 0.0 {
            history.len() as f64 / secs
        } else {
            0.0
        };

        let keys = keys.len();
        Self {
            latency: LatencySummary::from_history(&history),
            keys,
            history,
            duration,
            qps,
            kinds,
        }
    }

    pub fn history(&self) -> &History {
        &self.history
    }

    pub fn into_history(self) -> History {
        self.history
    }

    /// Wall-clock length of the traffic phase.
    pub fn duration(&self) -> Duration {
        self.duration
    }

    /// Recorded operations per second of traffic phase.
    pub fn qps(&self) -> f64 {
        self.qps
    }

    pub fn kind_stats(&self, kind: OperationKind) -> KindStats {
        self.kinds.get(&kind).copied().unwrap_or_default()
    }

    pub fn kinds(&self) -> impl Iterator<Item = (OperationKind, KindStats)> + '_ {
        self.kinds.iter().map(|(kind, stats)| (*kind, *stats))
    }

    /// Number of distinct keys and prefixes touched by recorded operations.
    pub fn distinct_keys(&self) -> usize {
        self.keys
    }

    pub fn succeeded(&self) -> u64 {
        self.kinds.values().map(|s| s.succeeded).sum()
    }

    pub fn failed(&self) -> u64 {
        self.kinds.values().map(|s| s.failed).sum()
    }

    pub fn latency(&self) -> LatencySummary {
        self.latency
    }

    /// Print a human-readable summary to stdout.
    pub fn print(&self) {
        println!();
        println!("=== Traffic Report ===");
        println!("Duration:   {:?}", self.duration);
        println!(
            "Operations: {} ({} succeeded, {} failed)",
            self.history.len(),
            self.succeeded(),
            self.failed()
        );
        println!("QPS:        {:.2}", self.qps);
        println!("Keys:       {}", self.keys);
        println!();
        println!("{:<14} {:>10} {:>10}", "kind", "succeeded", "failed");
        for (kind, stats) in &self.kinds {
            println!(
                "{:<14} {:>10} {:>10}",
                kind.to_string(),
                stats.succeeded,
                stats.failed
            );
        }
        println!();
        println!("Latency P50:  {:?}", self.latency.p50);
        println!("Latency P90:  {:?}", self.latency.p90);
        println!("Latency P99:  {:?}", self.latency.p99);
        println!("Latency max:  {:?}", self.latency.max);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use robustness_types::{
        ClientId, OperationRecord, PutResponse, Request, RequestId, Revision, StoreError,
        Timestamp,
    };

    fn record(id: u64, invoked: u64, returned: u64, ok: bool) -> OperationRecord {
        OperationRecord {
            client: ClientId(0),
            id: RequestId(id),
            request: Request::Put {
                key: "k".into(),
                value: "v".into(),
                lease: None,
            },
            invoked: Timestamp(invoked),
            returned: Timestamp(returned),
            outcome: if ok {
                Ok(PutResponse {
                    revision: Revision(id as i64),
                }
                .into())
            } else {
                Err(StoreError::Timeout { after_ms: 40 })
            },
        }
    }

    #[test]
    fn test_counts_and_qps() {
        let mut history = History::new();
        for id in 0..8 {
            history.append(record(id, id * 10, id * 10 + 5, id % 4 != 0));
        }
        let report = TrafficReport::new(history, Duration::from_secs(2));

        assert_eq!(report.qps(), 4.0);
        assert_eq!(report.succeeded(), 6);
        assert_eq!(report.failed(), 2);
        let put = report.kind_stats(OperationKind::Put);
        assert_eq!(put.total(), 8);
        assert_eq!(report.kind_stats(OperationKind::Get), KindStats::default());
        assert_eq!(report.kinds().count(), 1);
        assert_eq!(report.distinct_keys(), 1);
    }

    #[test]
    fn test_distinct_keys() {
        let mut history = History::new();
        history.append(record(0, 0, 5, true));
        history.append(OperationRecord {
            request: Request::Get { key: "a".into() },
            ..record(1, 10, 15, false)
        });
        history.append(OperationRecord {
            request: Request::Defragment,
            ..record(2, 20, 25, false)
        });
        let report = TrafficReport::new(history, Duration::from_secs(1));

        assert_eq!(report.history().len(), 3);
        assert_eq!(report.distinct_keys(), 2);
    }

    #[test]
    fn test_latency_percentiles() {
        let mut history = History::new();
        for id in 0..100 {
            let latency = (id + 1) * 1_000_000;
            history.append(record(id, 0, latency, true));
        }
        let latency = TrafficReport::new(history, Duration::from_secs(1)).latency();

        let within = |observed: Duration, millis: u64| {
            let expected = Duration::from_millis(millis).as_nanos() as f64;
            (observed.as_nanos() as f64 - expected).abs() / expected < 0.01
        };
        assert!(within(latency.p50, 50), "p50 {:?}", latency.p50);
        assert!(within(latency.p99, 99), "p99 {:?}", latency.p99);
        assert!(within(latency.max, 100), "max {:?}", latency.max);
    }

    #[test]
    fn test_empty_history() {
        let report = TrafficReport::new(History::new(), Duration::ZERO);
        assert_eq!(report.qps(), 0.0);
        assert_eq!(report.latency(), LatencySummary::default());
        assert_eq!(report.distinct_keys(), 0);
        report.print();
    }
}
