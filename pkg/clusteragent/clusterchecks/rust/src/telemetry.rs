// Unless explicitly stated otherwise all files in this repository are licensed
// under the Apache License Version 2.0.
// This product includes software developed at Datadog (https://www.datadoghq.com/).
// Copyright 2026-present Datadog, Inc.

use std::collections::BTreeMap;
use std::sync::{Arc, Mutex, PoisonError};

/// Destination of the dispatcher's gauges. Every write carries the leader
/// value so that only the elected leader's series are meaningful.
pub trait MetricsSink: Send + Sync {
    fn inc_dangling_configs(&self, leader: &str);
    fn dec_dangling_configs(&self, leader: &str);
    fn inc_unscheduled_check(&self, source: &str, name: &str, leader: &str);
    fn dec_unscheduled_check(&self, source: &str, name: &str, leader: &str);
    fn set_configs_info(&self, node: &str, name: &str, check_id: &str, leader: &str);
    fn delete_configs_info(&self, node: &str, name: &str, check_id: &str, leader: &str);
}

/// Discards every write.
#[derive(Debug, Default, Clone, Copy)]
pub struct NoopMetrics;

impl MetricsSink for NoopMetrics {
    fn inc_dangling_configs(&self, _: &str) {}
    fn dec_dangling_configs(&self, _: &str) {}
    fn inc_unscheduled_check(&self, _: &str, _: &str, _: &str) {}
    fn dec_unscheduled_check(&self, _: &str, _: &str, _: &str) {}
    fn set_configs_info(&self, _: &str, _: &str, _: &str, _: &str) {}
    fn delete_configs_info(&self, _: &str, _: &str, _: &str, _: &str) {}
}

/// `(node, check name, check id)`
pub type ConfigsInfoKey = (String, String, String);

#[derive(Debug, Default)]
struct Gauges {
    dangling_configs: i64,
    unscheduled_checks: BTreeMap<(String, String), i64>,
    configs_info: BTreeMap<ConfigsInfoKey, String>,
}

/// Keeps the latest gauge values in memory, for status pages and tests.
#[derive(Debug, Default)]
pub struct InMemoryMetrics {
    gauges: Mutex<Gauges>,
}

impl InMemoryMetrics {
    pub fn new() -> Self {
        Self::default()
    }

    fn with<T>(&self, f: impl FnOnce(&mut Gauges) -> T) -> T {
        let mut gauges = self.gauges.lock().unwrap_or_else(PoisonError::into_inner);
        f(&mut gauges)
    }

    pub fn dangling_configs(&self) -> i64 {
        self.with(|g| g.dangling_configs)
    }

    /// Current value of the unscheduled gauge for `(source, name)`.
    pub fn unscheduled_check(&self, source: &str, name: &str) -> i64 {
        self.with(|g| {
            g.unscheduled_checks
                .get(&(source.to_string(), name.to_string()))
                .copied()
                .unwrap_or(0)
        })
    }

    pub fn unscheduled_checks_total(&self) -> i64 {
        self.with(|g| g.unscheduled_checks.values().sum())
    }

    /// Every configs-info series currently set.
    pub fn configs_info(&self) -> Vec<ConfigsInfoKey> {
        self.with(|g| g.configs_info.keys().cloned().collect())
    }

    /// Check IDs reported as running on `node`.
    pub fn configs_info_for_node(&self, node: &str) -> Vec<String> {
        self.with(|g| {
            g.configs_info
                .keys()
                .filter(|(n, _, _)| n == node)
                .map(|(_, _, id)| id.clone())
                .collect()
        })
    }
}

impl MetricsSink for InMemoryMetrics {
    fn inc_dangling_configs(&self, _: &str) {
        self.with(|g| g.dangling_configs += 1);
    }

    fn dec_dangling_configs(&self, _: &str) {
        self.with(|g| g.dangling_configs -= 1);
    }

    fn inc_unscheduled_check(&self, source: &str, name: &str, _: &str) {
        self.with(|g| {
            *g.unscheduled_checks
                .entry((source.to_string(), name.to_string()))
                .or_default() += 1;
        });
    }

    fn dec_unscheduled_check(&self, source: &str, name: &str, _: &str) {
        self.with(|g| {
            let key = (source.to_string(), name.to_string());
            if let Some(v) = g.unscheduled_checks.get_mut(&key) {
                *v -= 1;
                if *v == 0 {
                    g.unscheduled_checks.remove(&key);
                }
            }
        });
    }

    fn set_configs_info(&self, node: &str, name: &str, check_id: &str, leader: &str) {
        self.with(|g| {
            g.configs_info.insert(
                (node.to_string(), name.to_string(), check_id.to_string()),
                leader.to_string(),
            );
        });
    }

    fn delete_configs_info(&self, node: &str, name: &str, check_id: &str, _: &str) {
        self.with(|g| {
            g.configs_info
                .remove(&(node.to_string(), name.to_string(), check_id.to_string()));
        });
    }
}

/// Sink plus the leader value stamped on every write.
#[derive(Clone)]
pub(crate) struct Telemetry {
    sink: Arc<dyn MetricsSink>,
    leader: String,
}

impl Telemetry {
    pub(crate) fn new(sink: Arc<dyn MetricsSink>, leader: impl Into<String>) -> Self {
        Telemetry {
            sink,
            leader: leader.into(),
        }
    }

    pub(crate) fn inc_dangling(&self) {
        self.sink.inc_dangling_configs(&self.leader);
    }

    pub(crate) fn dec_dangling(&self) {
        self.sink.dec_dangling_configs(&self.leader);
    }

    pub(crate) fn inc_unscheduled(&self, source: &str, name: &str) {
        self.sink.inc_unscheduled_check(source, name, &self.leader);
    }

    pub(crate) fn dec_unscheduled(&self, source: &str, name: &str) {
        self.sink.dec_unscheduled_check(source, name, &self.leader);
    }

    pub(crate) fn set_configs_info(&self, node: &str, name: &str, check_id: &str) {
        self.sink
            .set_configs_info(node, name, check_id, &self.leader);
    }

    pub(crate) fn delete_configs_info(&self, node: &str, name: &str, check_id: &str) {
        self.sink
            .delete_configs_info(node, name, check_id, &self.leader);
    }
}
