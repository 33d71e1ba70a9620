// Unless explicitly stated otherwise all files in this repository are licensed
// under the Apache License Version 2.0.
// This product includes software developed at Datadog (https://www.datadoghq.com/).
// Copyright 2026-present Datadog, Inc.

use std::collections::{BTreeMap, BTreeSet, HashMap};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::{Duration, Instant};

use crate::checkid::{CheckId, check_ids};
use crate::integration::Config;
use crate::telemetry::Telemetry;
use crate::types::{StateNodeResponse, StateResponse};

/// A known config that no node currently runs.
#[derive(Debug, Clone)]
pub(crate) struct DanglingConfig {
    pub(crate) time_created: Instant,
    pub(crate) unscheduled_check: bool,
}

/// Per-node record. Holds digests only; the configs themselves belong to
/// the cluster store.
#[derive(Debug)]
pub(crate) struct NodeStore {
    pub(crate) name: String,
    pub(crate) client_ip: String,
    pub(crate) last_heartbeat: Instant,
    pub(crate) digests: BTreeSet<String>,
}

impl NodeStore {
    fn new(name: &str, client_ip: &str, now: Instant) -> Self {
        NodeStore {
            name: name.to_string(),
            client_ip: client_ip.to_string(),
            last_heartbeat: now,
            digests: BTreeSet::new(),
        }
    }

    pub(crate) fn heartbeat(&mut self, client_ip: &str, now: Instant) {
        self.last_heartbeat = now;
        if !client_ip.is_empty() && self.client_ip != client_ip {
            self.client_ip = client_ip.to_string();
        }
    }
}

pub(crate) type NodeHandle = Arc<Mutex<NodeStore>>;

pub(crate) fn lock_node(node: &NodeHandle) -> MutexGuard<'_, NodeStore> {
    node.lock().unwrap_or_else(PoisonError::into_inner)
}

/// Authoritative state of the dispatcher. Always accessed under the
/// dispatcher's outer lock; node mutexes are only taken while that lock is
/// held.
pub(crate) struct ClusterStore {
    pub(crate) active: bool,
    pub(crate) nodes_seen: bool,
    pub(crate) digest_to_config: HashMap<String, Config>,
    pub(crate) node_ready: HashMap<String, Config>,
    pub(crate) id_to_digest: HashMap<CheckId, String>,
    pub(crate) digest_to_node: HashMap<String, String>,
    pub(crate) nodes: BTreeMap<String, NodeHandle>,
    pub(crate) dangling_configs: BTreeMap<String, DanglingConfig>,
    telemetry: Telemetry,
}

impl ClusterStore {
    pub(crate) fn new(telemetry: Telemetry) -> Self {
        ClusterStore {
            active: false,
            nodes_seen: false,
            digest_to_config: HashMap::new(),
            node_ready: HashMap::new(),
            id_to_digest: HashMap::new(),
            digest_to_node: HashMap::new(),
            nodes: BTreeMap::new(),
            dangling_configs: BTreeMap::new(),
            telemetry,
        }
    }

    pub(crate) fn telemetry(&self) -> &Telemetry {
        &self.telemetry
    }

    /// Returns the node and whether it was just created.
    pub(crate) fn get_or_create_node(
        &mut self,
        name: &str,
        client_ip: &str,
        now: Instant,
    ) -> (NodeHandle, bool) {
        if let Some(node) = self.nodes.get(name) {
            return (Arc::clone(node), false);
        }
        let node = Arc::new(Mutex::new(NodeStore::new(name, client_ip, now)));
        self.nodes.insert(name.to_string(), Arc::clone(&node));
        self.nodes_seen = true;
        (node, true)
    }

    pub(crate) fn get_node(&self, name: &str) -> Option<NodeHandle> {
        self.nodes.get(name).map(Arc::clone)
    }

    /// Names of the nodes whose last heartbeat is older than `timeout`.
    pub(crate) fn expired_nodes(&self, now: Instant, timeout: Duration) -> Vec<String> {
        self.nodes
            .values()
            .filter_map(|node| {
                let node = lock_node(node);
                (now.saturating_duration_since(node.last_heartbeat) > timeout)
                    .then(|| node.name.clone())
            })
            .collect()
    }

    /// Registers `config` (and its check IDs) under `digest`.
    pub(crate) fn insert_config(&mut self, digest: &str, config: Config) {
        for id in check_ids(&config) {
            self.id_to_digest.insert(id, digest.to_string());
        }
        self.digest_to_config.insert(digest.to_string(), config);
    }

    /// Forgets everything about `digest`. Returns the node it was assigned
    /// to, if any.
    pub(crate) fn purge_config(&mut self, digest: &str) -> Option<String> {
        let node = self.unassign(digest);
        self.drop_dangling(digest);
        self.drop_check_ids(digest);
        self.node_ready.remove(digest);
        self.digest_to_config.remove(digest);
        node
    }

    pub(crate) fn drop_check_ids(&mut self, digest: &str) {
        self.id_to_digest.retain(|_, d| d != digest);
    }

    pub(crate) fn weight(&self, digest: &str) -> u64 {
        self.digest_to_config.get(digest).map_or(1, Config::weight)
    }

    pub(crate) fn record_dangling(&mut self, digest: &str, now: Instant) {
        if self.dangling_configs.contains_key(digest) {
            return;
        }
        self.dangling_configs.insert(
            digest.to_string(),
            DanglingConfig {
                time_created: now,
                unscheduled_check: false,
            },
        );
        self.telemetry.inc_dangling();
    }

    pub(crate) fn drop_dangling(&mut self, digest: &str) -> Option<DanglingConfig> {
        let dangling = self.dangling_configs.remove(digest)?;
        self.telemetry.dec_dangling();
        if dangling.unscheduled_check
            && let Some(config) = self.digest_to_config.get(digest)
        {
            self.telemetry
                .dec_unscheduled(&config.source, &config.name);
        }
        Some(dangling)
    }

    /// Places `digest` on `node_name`, creating the node if needed. The
    /// caller is responsible for detaching it from its previous location.
    pub(crate) fn assign(&mut self, digest: &str, node_name: &str, now: Instant) {
        let (node, _) = self.get_or_create_node(node_name, "", now);
        lock_node(&node).digests.insert(digest.to_string());
        self.digest_to_node
            .insert(digest.to_string(), node_name.to_string());
        if let Some(config) = self.digest_to_config.get(digest) {
            for id in check_ids(config) {
                self.telemetry
                    .set_configs_info(node_name, &config.name, id.as_str());
            }
        }
    }

    /// Detaches `digest` from its node. Returns the node name it was on.
    pub(crate) fn unassign(&mut self, digest: &str) -> Option<String> {
        let node_name = self.digest_to_node.remove(digest)?;
        if let Some(node) = self.nodes.get(&node_name) {
            lock_node(node).digests.remove(digest);
        }
        if let Some(config) = self.digest_to_config.get(digest) {
            for id in check_ids(config) {
                self.telemetry
                    .delete_configs_info(&node_name, &config.name, id.as_str());
            }
        }
        Some(node_name)
    }

    /// Removes a node and moves all of its configs to dangling.
    pub(crate) fn remove_node(&mut self, name: &str, now: Instant) -> Vec<String> {
        let Some(node) = self.nodes.get(name).map(Arc::clone) else {
            return Vec::new();
        };
        let digests: Vec<String> = lock_node(&node).digests.iter().cloned().collect();
        for digest in &digests {
            self.unassign(digest);
            self.record_dangling(digest, now);
        }
        self.nodes.remove(name);
        digests
    }

    /// Sum of config weights per node, including idle nodes.
    pub(crate) fn loads(&self) -> BTreeMap<String, u64> {
        self.nodes
            .iter()
            .map(|(name, node)| {
                let load = lock_node(node)
                    .digests
                    .iter()
                    .map(|d| self.weight(d))
                    .sum::<u64>();
                (name.clone(), load)
            })
            .collect()
    }

    /// Least loaded node, ties broken by name.
    pub(crate) fn least_loaded_node(&self) -> Option<String> {
        self.loads()
            .into_iter()
            .min_by(|(a_name, a_load), (b_name, b_load)| {
                a_load.cmp(b_load).then_with(|| a_name.cmp(b_name))
            })
            .map(|(name, _)| name)
    }

    fn configs_sorted<'a>(&self, digests: impl Iterator<Item = &'a String>) -> Vec<Config> {
        let mut digests: Vec<&String> = digests.collect();
        digests.sort();
        digests
            .into_iter()
            .filter_map(|d| self.digest_to_config.get(d).cloned())
            .collect()
    }

    /// Node-ready configs of `node`, ordered by digest.
    pub(crate) fn node_ready_configs(&self, node: &NodeStore) -> Vec<Config> {
        node.digests
            .iter()
            .filter_map(|d| {
                self.node_ready
                    .get(d)
                    .or_else(|| self.digest_to_config.get(d))
                    .cloned()
            })
            .collect()
    }

    pub(crate) fn all_configs(&self) -> Vec<Config> {
        self.configs_sorted(self.digest_to_config.keys())
    }

    pub(crate) fn snapshot(&self) -> StateResponse {
        StateResponse {
            warmup: !self.active,
            dangling: self.configs_sorted(self.dangling_configs.keys()),
            nodes: self
                .nodes
                .values()
                .map(|node| {
                    let node = lock_node(node);
                    StateNodeResponse {
                        name: node.name.clone(),
                        configs: self.configs_sorted(node.digests.iter()),
                    }
                })
                .collect(),
        }
    }

    /// Checks the structural invariants of the store.
    pub(crate) fn verify(&self) -> Result<(), String> {
        for digest in self.digest_to_config.keys() {
            let assigned = self.digest_to_node.contains_key(digest);
            let dangling = self.dangling_configs.contains_key(digest);
            if assigned == dangling {
                return Err(format!(
                    "config {digest}: assigned={assigned} dangling={dangling}"
                ));
            }
        }
        for digest in self.dangling_configs.keys() {
            if !self.digest_to_config.contains_key(digest) {
                return Err(format!("dangling config {digest} is unknown"));
            }
        }
        for (id, digest) in &self.id_to_digest {
            if !self.digest_to_config.contains_key(digest) {
                return Err(format!("check {id} points at unknown config {digest}"));
            }
        }
        for digest in self.node_ready.keys() {
            if !self.digest_to_config.contains_key(digest) {
                return Err(format!("node-ready config {digest} is unknown"));
            }
        }
        for (digest, node_name) in &self.digest_to_node {
            if !self.digest_to_config.contains_key(digest) {
                return Err(format!("assigned config {digest} is unknown"));
            }
            let Some(node) = self.nodes.get(node_name) else {
                return Err(format!("config {digest} assigned to missing node {node_name}"));
            };
            if !lock_node(node).digests.contains(digest) {
                return Err(format!("node {node_name} does not hold {digest}"));
            }
        }
        let mut held = 0;
        for (name, node) in &self.nodes {
            let node = lock_node(node);
            for digest in &node.digests {
                if self.digest_to_node.get(digest) != Some(name) {
                    return Err(format!("node {name} holds {digest} assigned elsewhere"));
                }
            }
            held += node.digests.len();
        }
        if held + self.dangling_configs.len() != self.digest_to_config.len() {
            return Err(format!(
                "{held} assigned + {} dangling != {} known",
                self.dangling_configs.len(),
                self.digest_to_config.len()
            ));
        }
        Ok(())
    }
}
