// Unless explicitly stated otherwise all files in this repository are licensed
// under the Apache License Version 2.0.
// This product includes software developed at Datadog (https://www.datadoghq.com/).
// Copyright 2026-present Datadog, Inc.

use std::cmp::{Ordering, Reverse};
use std::collections::BinaryHeap;
use std::time::Instant;

use log::{debug, info, warn};

use crate::dispatcher::Dispatcher;
use crate::errors::Error;
use crate::integration::Config;
use crate::store::{ClusterStore, lock_node};

impl Dispatcher {
    /// Records that `name` is alive and returns the configs it should run.
    /// An unknown node is registered and receives any dangling configs.
    pub fn heartbeat(&self, name: &str, client_ip: &str, now: Instant) -> Vec<Config> {
        {
            let store = self.read();
            if let Some(node) = store.get_node(name) {
                let mut node = lock_node(&node);
                node.heartbeat(client_ip, now);
                return store.node_ready_configs(&node);
            }
        }

        let mut guard = self.write();
        let store = &mut *guard;
        let (node, created) = store.get_or_create_node(name, client_ip, now);
        lock_node(&node).heartbeat(client_ip, now);
        if created {
            info!("node {name} ({client_ip}) joined");
            if !store.dangling_configs.is_empty() {
                let dispatched = self.dispatch_dangling_locked(store, now);
                debug!("dispatched {dispatched} dangling configs after {name} joined");
            }
        }
        let node = lock_node(&node);
        store.node_ready_configs(&node)
    }

    /// Node-ready configs of `name`, without touching its heartbeat.
    pub fn get_node_configs(&self, name: &str) -> Result<Vec<Config>, Error> {
        let store = self.read();
        let node = store
            .get_node(name)
            .ok_or_else(|| Error::UnknownNode(name.to_string()))?;
        let node = lock_node(&node);
        Ok(store.node_ready_configs(&node))
    }

    /// Drops the nodes that missed their heartbeats and leaves warmup once
    /// a node has been seen. Returns the names of the removed nodes.
    pub fn expire_nodes(&self, now: Instant) -> Vec<String> {
        let mut store = self.write();
        let expired = store.expired_nodes(now, self.settings.node_expiration_timeout);
        for name in &expired {
            let orphaned = store.remove_node(name, now);
            warn!(
                "node {name} expired, {} configs are now dangling",
                orphaned.len()
            );
        }
        if !store.active && store.nodes_seen {
            info!("cluster-check dispatcher leaving warmup");
            store.active = true;
        }
        expired
    }

    pub fn should_dispatch_dangling(&self) -> bool {
        let store = self.read();
        !store.dangling_configs.is_empty() && !store.nodes.is_empty()
    }

    /// Places every dangling config on a live node, heaviest first, each on
    /// the least loaded node at the time. Returns how many were placed.
    pub fn dispatch_dangling(&self) -> usize {
        let mut guard = self.write();
        let now = self.clock.now();
        self.dispatch_dangling_locked(&mut guard, now)
    }

    pub(crate) fn dispatch_dangling_locked(&self, store: &mut ClusterStore, now: Instant) -> usize {
        if store.nodes.is_empty() {
            return 0;
        }

        let mut targets: BinaryHeap<Reverse<(u64, String)>> = store
            .loads()
            .into_iter()
            .map(|(name, load)| Reverse((load, name)))
            .collect();

        let mut pending: Vec<(u64, String)> = store
            .dangling_configs
            .keys()
            .map(|d| (store.weight(d), d.clone()))
            .collect();
        pending.sort_by(|(wa, da), (wb, db)| match wb.cmp(wa) {
            Ordering::Equal => da.cmp(db),
            other => other,
        });

        let mut dispatched = 0;
        for (weight, digest) in pending {
            let ready = match store.node_ready.get(&digest) {
                Some(ready) => ready.clone(),
                None => {
                    let Some(config) = store.digest_to_config.get(&digest) else {
                        continue;
                    };
                    match self.patcher.patch(config) {
                        Ok(ready) => ready,
                        Err(e) => {
                            warn!("config {digest} stays dangling: {e}");
                            continue;
                        }
                    }
                }
            };
            let Some(Reverse((load, target))) = targets.pop() else {
                break;
            };
            store.node_ready.insert(digest.clone(), ready);
            store.drop_dangling(&digest);
            store.assign(&digest, &target, now);
            debug!("dangling config {digest} dispatched to node {target}");
            targets.push(Reverse((load + weight, target)));
            dispatched += 1;
        }
        dispatched
    }

    /// Flags the configs that have been dangling longer than the unscheduled
    /// check threshold. Each config is only reported once per dangling
    /// period. Returns how many were newly flagged.
    pub fn report_unscheduled(&self, now: Instant) -> usize {
        let mut guard = self.write();
        let store = &mut *guard;
        let threshold = self.settings.unscheduled_check_threshold;

        let mut flagged = Vec::new();
        for (digest, dangling) in store.dangling_configs.iter_mut() {
            if !dangling.unscheduled_check
                && now.saturating_duration_since(dangling.time_created) > threshold
            {
                dangling.unscheduled_check = true;
                flagged.push(digest.clone());
            }
        }
        for digest in &flagged {
            if let Some(config) = store.digest_to_config.get(digest) {
                warn!(
                    "check {} from {} has not been scheduled for {threshold:?}",
                    config.name, config.source
                );
                store
                    .telemetry()
                    .inc_unscheduled(&config.source, &config.name);
            }
        }
        flagged.len()
    }
}
