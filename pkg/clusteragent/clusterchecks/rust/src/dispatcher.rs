// Unless explicitly stated otherwise all files in this repository are licensed
// under the Apache License Version 2.0.
// This product includes software developed at Datadog (https://www.datadoghq.com/).
// Copyright 2026-present Datadog, Inc.

use std::sync::{Arc, PoisonError, RwLock, RwLockReadGuard, RwLockWriteGuard};
use std::time::Duration;

use log::{debug, warn};

use crate::checkid::CheckId;
use crate::clock::Clock;
use crate::config::AgentConfig;
use crate::errors::Error;
use crate::integration::Config;
use crate::patcher::Patcher;
use crate::store::ClusterStore;
use crate::telemetry::{MetricsSink, Telemetry};
use crate::types::StateResponse;

#[derive(Debug, Clone)]
pub(crate) struct Settings {
    pub(crate) node_expiration_timeout: Duration,
    pub(crate) unscheduled_check_threshold: Duration,
    pub(crate) rebalance_period: Duration,
    pub(crate) rebalance_tolerance: f64,
}

/// Leader-side owner of the cluster-check assignment.
pub struct Dispatcher {
    pub(crate) store: RwLock<ClusterStore>,
    pub(crate) patcher: Patcher,
    pub(crate) settings: Settings,
    pub(crate) clock: Arc<dyn Clock>,
}

impl Dispatcher {
    pub fn new(
        config: &AgentConfig,
        clock: Arc<dyn Clock>,
        metrics: Arc<dyn MetricsSink>,
        leader_value: impl Into<String>,
    ) -> Self {
        let cc = &config.cluster_checks;
        Dispatcher {
            store: RwLock::new(ClusterStore::new(Telemetry::new(metrics, leader_value))),
            patcher: Patcher::new(config.extra_tags()),
            settings: Settings {
                node_expiration_timeout: cc.node_expiration_timeout(),
                unscheduled_check_threshold: cc.unscheduled_check_threshold(),
                rebalance_period: cc.rebalance_period(),
                rebalance_tolerance: cc.rebalance_tolerance,
            },
            clock,
        }
    }

    pub(crate) fn read(&self) -> RwLockReadGuard<'_, ClusterStore> {
        self.store.read().unwrap_or_else(PoisonError::into_inner)
    }

    pub(crate) fn write(&self) -> RwLockWriteGuard<'_, ClusterStore> {
        self.store.write().unwrap_or_else(PoisonError::into_inner)
    }

    /// Stores `config` and places it on `target`, or leaves it dangling when
    /// `target` is empty. Returns whether the config is now assigned to
    /// `target`.
    ///
    /// The config is patched before placement; if that fails the store is
    /// left as it was, except that a config unknown until now is recorded as
    /// dangling.
    pub fn add_config(&self, config: Config, target: &str) -> bool {
        let digest = config.digest();
        let mut store = self.write();
        let now = self.clock.now();

        // Equal digests do not imply equal payloads: the digest ignores key
        // and tag order, the node-ready form does not.
        let unchanged = store.digest_to_config.get(&digest) == Some(&config);

        if target.is_empty() {
            if let Some(previous) = store.unassign(&digest) {
                debug!("config {digest} unassigned from node {previous}");
            }
            if !unchanged {
                store.drop_check_ids(&digest);
                store.node_ready.remove(&digest);
            }
            store.insert_config(&digest, config);
            store.record_dangling(&digest, now);
            return false;
        }

        let cached = if unchanged {
            store.node_ready.get(&digest).cloned()
        } else {
            None
        };
        let ready = match cached {
            Some(ready) => ready,
            None => match self.patcher.patch(&config) {
                Ok(ready) => ready,
                Err(e) => {
                    warn!("not dispatching config {digest} to {target}: {e}");
                    if !store.digest_to_config.contains_key(&digest) {
                        store.insert_config(&digest, config);
                        store.record_dangling(&digest, now);
                    }
                    return false;
                }
            },
        };

        if !unchanged && store.digest_to_config.contains_key(&digest) {
            // Check IDs derive from the raw payload; retire the old ones.
            if let Some(node) = store.unassign(&digest) {
                debug!("config {digest} changed, reloading it on node {node}");
            }
            store.drop_check_ids(&digest);
        }
        store.insert_config(&digest, config);
        store.node_ready.insert(digest.clone(), ready);

        // Re-adding to the node that already runs it must not de-schedule it.
        if store.digest_to_node.get(&digest).map(String::as_str) == Some(target) {
            return true;
        }
        store.unassign(&digest);
        store.drop_dangling(&digest);
        store.assign(&digest, target, now);
        debug!("config {digest} dispatched to node {target}");
        true
    }

    /// Forgets the config with `digest`. Unknown digests are ignored.
    pub fn remove_config(&self, digest: &str) {
        let mut store = self.write();
        if !store.digest_to_config.contains_key(digest) {
            debug!("ignoring removal of unknown config {digest}");
            return;
        }
        match store.purge_config(digest) {
            Some(node) => debug!("config {digest} removed from node {node}"),
            None => debug!("dangling config {digest} removed"),
        }
    }

    pub fn get_state(&self) -> StateResponse {
        self.read().snapshot()
    }

    /// Every known config, ordered by digest.
    pub fn get_all_configs(&self) -> Vec<Config> {
        self.read().all_configs()
    }

    /// Reverse lookup from a running check to the config it came from.
    pub fn get_config_and_digest(&self, check_id: &str) -> Result<(Config, String), Error> {
        let store = self.read();
        let digest = store
            .id_to_digest
            .get(&CheckId::from(check_id))
            .ok_or_else(|| Error::UnknownCheck(check_id.to_string()))?;
        let config = store
            .digest_to_config
            .get(digest)
            .ok_or_else(|| Error::UnknownCheck(check_id.to_string()))?;
        Ok((config.clone(), digest.clone()))
    }

    /// Node currently running `digest`, `None` while it is dangling.
    pub fn node_for_digest(&self, digest: &str) -> Result<Option<String>, Error> {
        let store = self.read();
        if !store.digest_to_config.contains_key(digest) {
            return Err(Error::UnknownDigest(digest.to_string()));
        }
        Ok(store.digest_to_node.get(digest).cloned())
    }

    /// Entry point for configs found by service discovery. Cluster checks go
    /// to the least loaded node, or stay dangling while no node is known.
    pub fn schedule(&self, configs: Vec<Config>) {
        for config in configs {
            if !config.cluster_check {
                debug!("ignoring non cluster-check config {}", config.name);
                continue;
            }
            let target = self.read().least_loaded_node().unwrap_or_default();
            self.add_config(config, &target);
        }
    }

    /// Entry point for configs that service discovery no longer sees.
    pub fn unschedule(&self, configs: &[Config]) {
        for config in configs {
            self.remove_config(&config.digest());
        }
    }

    /// Checks the store's structural invariants.
    pub fn verify_store(&self) -> Result<(), String> {
        self.read().verify()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::ManualClock;
    use crate::integration::Data;
    use crate::telemetry::InMemoryMetrics;

    fn dispatcher() -> (Dispatcher, Arc<InMemoryMetrics>) {
        let metrics = Arc::new(InMemoryMetrics::new());
        let d = Dispatcher::new(
            &AgentConfig::default(),
            Arc::new(ManualClock::new()),
            metrics.clone(),
            "true",
        );
        (d, metrics)
    }

    fn config(name: &str) -> Config {
        Config {
            name: name.to_string(),
            instances: vec![Data::new(format!("name: {name}\nurl: http://{name}\n"))],
            cluster_check: true,
            ..Default::default()
        }
    }

    #[test]
    fn test_add_config_dangling() {
        let (d, metrics) = dispatcher();
        assert!(!d.add_config(config("a"), ""));
        let state = d.get_state();
        assert_eq!(state.dangling, vec![config("a")]);
        assert!(state.nodes.is_empty());
        assert!(state.warmup);
        assert_eq!(metrics.dangling_configs(), 1);

        // Adding it again does not double count
        assert!(!d.add_config(config("a"), ""));
        assert_eq!(metrics.dangling_configs(), 1);
        d.verify_store().unwrap();
    }

    #[test]
    fn test_add_config_to_node() {
        let (d, metrics) = dispatcher();
        let c = config("a");
        assert!(d.add_config(c.clone(), "node1"));
        let state = d.get_state();
        assert!(state.dangling.is_empty());
        assert_eq!(state.node("node1").unwrap().configs, vec![c.clone()]);
        assert_eq!(metrics.configs_info_for_node("node1").len(), 1);
        assert_eq!(d.node_for_digest(&c.digest()).unwrap().as_deref(), Some("node1"));
        d.verify_store().unwrap();
    }

    #[test]
    fn test_add_config_is_idempotent() {
        let (d, metrics) = dispatcher();
        d.add_config(config("a"), "node1");
        let before = d.get_state();
        assert!(d.add_config(config("a"), "node1"));
        assert_eq!(d.get_state(), before);
        assert_eq!(metrics.configs_info_for_node("node1").len(), 1);
    }

    #[test]
    fn test_add_config_moves_between_nodes() {
        let (d, metrics) = dispatcher();
        let c = config("a");
        d.add_config(c.clone(), "node1");
        d.add_config(c.clone(), "node2");
        let state = d.get_state();
        assert!(state.node("node1").unwrap().configs.is_empty());
        assert_eq!(state.node("node2").unwrap().configs, vec![c]);
        assert!(metrics.configs_info_for_node("node1").is_empty());
        assert_eq!(metrics.configs_info_for_node("node2").len(), 1);
        d.verify_store().unwrap();
    }

    #[test]
    fn test_add_config_from_dangling_to_node() {
        let (d, metrics) = dispatcher();
        d.add_config(config("a"), "");
        d.add_config(config("a"), "node1");
        assert!(d.get_state().dangling.is_empty());
        assert_eq!(metrics.dangling_configs(), 0);
        d.verify_store().unwrap();
    }

    #[test]
    fn test_add_assigned_config_without_target() {
        let (d, _) = dispatcher();
        let c = config("a");
        d.add_config(c.clone(), "node1");
        d.add_config(c.clone(), "");
        let state = d.get_state();
        assert_eq!(state.dangling, vec![c]);
        assert!(state.node("node1").unwrap().configs.is_empty());
        d.verify_store().unwrap();
    }

    #[test]
    fn test_add_config_with_same_digest_new_payload() {
        let (d, metrics) = dispatcher();
        let mut first = config("a");
        first.instances = vec![Data::new("url: http://a\ntimeout: 5\n")];
        let mut second = first.clone();
        second.instances = vec![Data::new("timeout: 5\nurl: http://a\n")];
        assert_eq!(first.digest(), second.digest());
        assert_ne!(first, second);

        assert!(d.add_config(first.clone(), "node1"));
        let old_ids = metrics.configs_info_for_node("node1");
        assert!(d.add_config(second.clone(), "node1"));

        let ready = d.get_node_configs("node1").unwrap();
        assert_eq!(ready, vec![d.patcher.patch(&second).unwrap()]);
        assert_ne!(ready, vec![d.patcher.patch(&first).unwrap()]);
        assert_eq!(d.get_all_configs(), vec![second.clone()]);

        let new_ids = metrics.configs_info_for_node("node1");
        assert_eq!(new_ids.len(), 1);
        assert_ne!(new_ids, old_ids);
        assert!(matches!(
            d.get_config_and_digest(&old_ids[0]),
            Err(Error::UnknownCheck(_))
        ));
        assert_eq!(d.get_config_and_digest(&new_ids[0]).unwrap().0, second);
        assert_eq!(d.node_for_digest(&second.digest()).unwrap().as_deref(), Some("node1"));
        d.verify_store().unwrap();
    }

    #[test]
    fn test_add_config_patch_failure() {
        let (d, _) = dispatcher();
        let mut broken = config("broken");
        broken.instances.push(Data::new("- a list\n"));
        assert!(!d.add_config(broken.clone(), "node1"));
        let state = d.get_state();
        assert_eq!(state.dangling, vec![broken]);
        assert!(state.nodes.is_empty());
        d.verify_store().unwrap();
    }

    #[test]
    fn test_remove_config() {
        let (d, metrics) = dispatcher();
        let a = config("a");
        let b = config("b");
        d.add_config(a.clone(), "node1");
        d.add_config(b.clone(), "");
        d.remove_config(&a.digest());
        d.remove_config(&b.digest());
        d.remove_config("unknown");

        let state = d.get_state();
        assert!(state.dangling.is_empty());
        assert!(state.node("node1").unwrap().configs.is_empty());
        assert!(d.get_all_configs().is_empty());
        assert_eq!(metrics.dangling_configs(), 0);
        assert!(metrics.configs_info().is_empty());
        assert!(matches!(
            d.node_for_digest(&a.digest()),
            Err(Error::UnknownDigest(_))
        ));
        d.verify_store().unwrap();
    }

    #[test]
    fn test_get_config_and_digest() {
        let (d, metrics) = dispatcher();
        let c = config("a");
        d.add_config(c.clone(), "node1");
        let check_id = metrics.configs_info_for_node("node1").remove(0);
        assert!(check_id.starts_with("a:a:"));
        let (found, digest) = d.get_config_and_digest(&check_id).unwrap();
        assert_eq!(found, c);
        assert_eq!(digest, c.digest());

        d.remove_config(&digest);
        assert!(matches!(
            d.get_config_and_digest(&check_id),
            Err(Error::UnknownCheck(_))
        ));
    }

    #[test]
    fn test_get_all_configs_sorted() {
        let (d, _) = dispatcher();
        for name in ["c", "a", "b"] {
            d.add_config(config(name), "");
        }
        let digests: Vec<String> = d.get_all_configs().iter().map(Config::digest).collect();
        let mut sorted = digests.clone();
        sorted.sort();
        assert_eq!(digests, sorted);
        assert_eq!(digests.len(), 3);
    }

    #[test]
    fn test_schedule_and_unschedule() {
        let (d, _) = dispatcher();
        let mut not_cluster = config("local");
        not_cluster.cluster_check = false;
        d.schedule(vec![config("a"), not_cluster.clone()]);
        assert_eq!(d.get_state().dangling, vec![config("a")]);

        d.add_config(config("b"), "node1");
        d.schedule(vec![config("c")]);
        assert_eq!(d.node_for_digest(&config("c").digest()).unwrap().as_deref(), Some("node1"));

        d.unschedule(&[config("a"), config("b"), config("c"), not_cluster]);
        assert!(d.get_all_configs().is_empty());
        d.verify_store().unwrap();
    }
}
