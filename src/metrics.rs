//! In-process metrics registry for the vocabulary callers can forward to
//! whatever sink they choose. This crate never exports to Prometheus or any
//! other backend itself; `Metrics::snapshot` hands back plain data for the
//! embedding application to do that with.

use std::collections::HashMap;
use std::sync::atomic::{AtomicI64, AtomicU64, Ordering};
use std::sync::RwLock;

use crate::task::Status;

#[derive(Default)]
struct GaugeSet(RwLock<HashMap<String, AtomicI64>>);

impl GaugeSet {
    fn set(&self, key: &str, value: i64) {
        if let Some(cell) = self.0.read().expect("gauge lock poisoned").get(key) {
            cell.store(value, Ordering::Relaxed);
            return;
        }
        self.0
            .write()
            .expect("gauge lock poisoned")
            .entry(key.to_owned())
            .or_insert_with(|| AtomicI64::new(value))
            .store(value, Ordering::Relaxed);
    }

    fn snapshot(&self) -> HashMap<String, i64> {
        self.0
            .read()
            .expect("gauge lock poisoned")
            .iter()
            .map(|(k, v)| (k.clone(), v.load(Ordering::Relaxed)))
            .collect()
    }
}

#[derive(Default)]
struct CounterSet(RwLock<HashMap<String, AtomicU64>>);

impl CounterSet {
    fn incr(&self, key: &str) {
        if let Some(cell) = self.0.read().expect("counter lock poisoned").get(key) {
            cell.fetch_add(1, Ordering::Relaxed);
            return;
        }
        self.0
            .write()
            .expect("counter lock poisoned")
            .entry(key.to_owned())
            .or_insert_with(|| AtomicU64::new(0))
            .fetch_add(1, Ordering::Relaxed);
    }

    fn snapshot(&self) -> HashMap<String, u64> {
        self.0
            .read()
            .expect("counter lock poisoned")
            .iter()
            .map(|(k, v)| (k.clone(), v.load(Ordering::Relaxed)))
            .collect()
    }
}

fn label2(a: &str, b: &str) -> String {
    format!("{a}\u{0}{b}")
}

/// Flat, serializable view of every metric this crate tracks, keyed by the
/// metric name and its (possibly composite) label string.
#[derive(Debug, Default, Clone, serde::Serialize)]
pub struct MetricsSnapshot {
    pub gauges: HashMap<String, HashMap<String, i64>>,
    pub counters: HashMap<String, HashMap<String, u64>>,
}

/// Registry for the worker-pool, repository and orchestrator metric
/// vocabulary. Cheap to share behind an `Arc`: every operation is a lock-free
/// atomic update once the label key has been seen once.
#[derive(Default)]
pub struct Metrics {
    workers_max: GaugeSet,
    workers_total: GaugeSet,
    workers_active: GaugeSet,
    workers_idle: GaugeSet,
    tasks_ingested: CounterSet,
    tasks_processed: CounterSet,
    tasks_waiting: GaugeSet,
    workers_recycled: CounterSet,
    handlerpools_total: GaugeSet,
    queue_length: GaugeSet,
    jobs_processed_total: CounterSet,
}

impl Metrics {
    pub fn new() -> Metrics {
        Metrics::default()
    }

    pub fn set_workers_max(&self, handler: &str, value: usize) {
        self.workers_max.set(handler, value as i64);
    }

    pub fn set_workers_total(&self, handler: &str, value: usize) {
        self.workers_total.set(handler, value as i64);
    }

    pub fn set_workers_active(&self, handler: &str, value: usize) {
        self.workers_active.set(handler, value as i64);
    }

    pub fn set_workers_idle(&self, handler: &str, value: usize) {
        self.workers_idle.set(handler, value as i64);
    }

    pub fn incr_tasks_ingested(&self, handler: &str) {
        self.tasks_ingested.incr(handler);
    }

    pub fn incr_tasks_processed(&self, handler: &str, status: Status) {
        self.tasks_processed.incr(&label2(handler, &status.to_string()));
    }

    pub fn set_tasks_waiting(&self, handler: &str, value: usize) {
        self.tasks_waiting.set(handler, value as i64);
    }

    pub fn incr_workers_recycled(&self, handler: &str) {
        self.workers_recycled.incr(handler);
    }

    pub fn set_handlerpools_total(&self, repository: &str, value: usize) {
        self.handlerpools_total.set(repository, value as i64);
    }

    pub fn set_queue_length(&self, name: &str, value: usize) {
        self.queue_length.set(name, value as i64);
    }

    pub fn incr_jobs_processed_total(&self, name: &str, status: Status) {
        self.jobs_processed_total
            .incr(&label2(name, &status.to_string()));
    }

    pub fn snapshot(&self) -> MetricsSnapshot {
        let mut gauges = HashMap::new();
        gauges.insert("workers_max".to_owned(), self.workers_max.snapshot());
        gauges.insert("workers_total".to_owned(), self.workers_total.snapshot());
        gauges.insert("workers_active".to_owned(), self.workers_active.snapshot());
        gauges.insert("workers_idle".to_owned(), self.workers_idle.snapshot());
        gauges.insert("tasks_waiting".to_owned(), self.tasks_waiting.snapshot());
        gauges.insert(
            "handlerpools_total".to_owned(),
            self.handlerpools_total.snapshot(),
        );
        gauges.insert("queue_length".to_owned(), self.queue_length.snapshot());

        let mut counters = HashMap::new();
        counters.insert("tasks_ingested".to_owned(), self.tasks_ingested.snapshot());
        counters.insert(
            "tasks_processed".to_owned(),
            self.tasks_processed.snapshot(),
        );
        counters.insert(
            "workers_recycled".to_owned(),
            self.workers_recycled.snapshot(),
        );
        counters.insert(
            "jobs_processed_total".to_owned(),
            self.jobs_processed_total.snapshot(),
        );

        MetricsSnapshot { gauges, counters }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn gauges_overwrite_and_counters_accumulate() {
        let m = Metrics::new();
        m.set_workers_max("log_task", 4);
        m.set_workers_max("log_task", 2);
        m.incr_tasks_ingested("log_task");
        m.incr_tasks_ingested("log_task");

        let snap = m.snapshot();
        assert_eq!(snap.gauges["workers_max"]["log_task"], 2);
        assert_eq!(snap.counters["tasks_ingested"]["log_task"], 2);
    }

    #[test]
    fn processed_counter_is_labeled_by_status() {
        let m = Metrics::new();
        m.incr_tasks_processed("log_task", Status::Success);
        m.incr_tasks_processed("log_task", Status::Error);
        m.incr_tasks_processed("log_task", Status::Success);

        let snap = m.snapshot();
        let key_success = label2("log_task", "success");
        let key_error = label2("log_task", "error");
        assert_eq!(snap.counters["tasks_processed"][&key_success], 2);
        assert_eq!(snap.counters["tasks_processed"][&key_error], 1);
    }
}
