use std::collections::BTreeMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use serde::Serialize;
use tracing::info;

use crate::zone::index::ZoneIndex;

/// A per-cycle counter with a running total
#[derive(Debug, Default)]
struct Counter {
    cycle: AtomicU64,
    total: AtomicU64,
}

impl Counter {
    fn incr(&self) {
        self.cycle.fetch_add(1, Ordering::Relaxed);
    }

    /// Move the cycle count into the total; returns `(cycle, total)`
    fn roll(&self) -> (u64, u64) {
        let cycle = self.cycle.swap(0, Ordering::Relaxed);
        let total = self.total.fetch_add(cycle, Ordering::Relaxed) + cycle;
        (cycle, total)
    }
}

/// Query counters shared by every listener
#[derive(Debug)]
pub struct Stats {
    start: i64,
    queries: Counter,
    errors: Counter,
    misses: Counter,
    proxys: Counter,
}

/// One stats cycle as broadcast to subscribers
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct StatsSnapshot {
    pub start: i64,
    pub querys: u64,
    pub querys_total: u64,
    pub errors: u64,
    pub errors_total: u64,
    pub misses: u64,
    pub misses_total: u64,
    pub proxys: u64,
    pub proxys_total: u64,
    /// Zone entry hits this cycle
    pub hits: u64,
    /// Zone entries across all types
    pub records: usize,
    /// Hits per record type mnemonic
    #[serde(flatten)]
    pub types: BTreeMap<String, u64>,
}

impl Default for Stats {
    fn default() -> Self {
        Self::new()
    }
}

impl Stats {
    pub fn new() -> Self {
        Self {
            start: chrono::Utc::now().timestamp_millis(),
            queries: Counter::default(),
            errors: Counter::default(),
            misses: Counter::default(),
            proxys: Counter::default(),
        }
    }

    pub fn record_query(&self) {
        self.queries.incr();
    }

    pub fn record_error(&self) {
        self.errors.incr();
    }

    pub fn record_miss(&self) {
        self.misses.incr();
    }

    pub fn record_proxy(&self) {
        self.proxys.incr();
    }

    /// Close the current cycle: roll counters, flush entry hits
    pub fn flush(&self, index: &ZoneIndex) -> StatsSnapshot {
        let per_type = index.flush_hits();
        let hits = per_type.values().sum();
        let types = per_type
            .into_iter()
            .map(|(rtype, count)| (rtype.to_string(), count))
            .collect();

        let (querys, querys_total) = self.queries.roll();
        let (errors, errors_total) = self.errors.roll();
        let (misses, misses_total) = self.misses.roll();
        let (proxys, proxys_total) = self.proxys.roll();

        StatsSnapshot {
            start: self.start,
            querys,
            querys_total,
            errors,
            errors_total,
            misses,
            misses_total,
            proxys,
            proxys_total,
            hits,
            records: index.len(),
            types,
        }
    }
}

impl StatsSnapshot {
    /// Log the non-zero counters as per-cycle and per-second rates
    pub fn log(&self, interval: Duration) {
        let secs = interval.as_secs_f64().max(1.0);
        let rows = [
            ("querys", self.querys, self.querys_total),
            ("errors", self.errors, self.errors_total),
            ("misses", self.misses, self.misses_total),
            ("proxys", self.proxys, self.proxys_total),
        ];
        for (name, count, total) in rows {
            if count > 0 {
                info!(
                    "Stats: {}: {}/{}s {:.1}/ps Total: {}",
                    name,
                    count,
                    interval.as_secs(),
                    count as f64 / secs,
                    total
                );
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::zone::record::{RecordType, ResourceRecord};

    #[test]
    fn test_flush_rolls_counters() {
        let stats = Stats::new();
        let index = ZoneIndex::from_records(vec![
            ResourceRecord::new("a", "www.example.com", RecordType::A, "192.0.2.1"),
            ResourceRecord::new("m", "example.com", RecordType::MX, "mail.example.com"),
        ]);
        let source = "192.0.2.99".parse().unwrap();
        index.lookup(RecordType::A, "www.example.com", source);
        index.lookup(RecordType::A, "www.example.com", source);

        for _ in 0..3 {
            stats.record_query();
        }
        stats.record_error();
        stats.record_miss();

        let first = stats.flush(&index);
        assert_eq!(first.querys, 3);
        assert_eq!(first.querys_total, 3);
        assert_eq!(first.errors, 1);
        assert_eq!(first.misses, 1);
        assert_eq!(first.proxys, 0);
        assert_eq!(first.hits, 2);
        assert_eq!(first.records, 2);
        assert_eq!(first.types["A"], 2);
        assert_eq!(first.types["MX"], 0);

        stats.record_query();
        let second = stats.flush(&index);
        assert_eq!(second.querys, 1);
        assert_eq!(second.querys_total, 4);
        assert_eq!(second.errors, 0);
        assert_eq!(second.errors_total, 1);
        assert_eq!(second.hits, 0);
    }

    #[test]
    fn test_snapshot_json_shape() {
        let stats = Stats::new();
        let index = ZoneIndex::new();
        stats.record_proxy();
        let json = serde_json::to_value(stats.flush(&index)).unwrap();

        for key in [
            "start",
            "querys",
            "querysTotal",
            "errorsTotal",
            "missesTotal",
            "proxys",
            "proxysTotal",
            "hits",
            "records",
            "AAAA",
            "CAA",
        ] {
            assert!(json.get(key).is_some(), "missing {}", key);
        }
        assert_eq!(json["proxys"], 1);
    }
}
