// Unless explicitly stated otherwise all files in this repository are licensed
// under the Apache License Version 2.0.
// This product includes software developed at Datadog (https://www.datadoghq.com/).
// Copyright 2026-present Datadog, Inc.

use std::cmp::Reverse;
use std::collections::{BTreeMap, BinaryHeap};

use log::{debug, info};

use crate::dispatcher::Dispatcher;
use crate::store::lock_node;
use crate::types::Migration;

type Loads = BTreeMap<String, u64>;

/// Pops the lightest node whose heap entry still matches its current load.
fn pop_lightest(light: &mut BinaryHeap<Reverse<(u64, String)>>, loads: &Loads) -> Option<(String, u64)> {
    while let Some(Reverse((load, name))) = light.pop() {
        if loads.get(&name) == Some(&load) {
            return Some((name, load));
        }
    }
    None
}

impl Dispatcher {
    /// Moves configs away from overloaded nodes. A node is overloaded when
    /// its load exceeds the mean by more than the rebalance tolerance;
    /// `force` drops the tolerance to zero.
    ///
    /// Each move goes from the most loaded node to the least loaded one and
    /// only happens if it strictly narrows the gap between them, so the
    /// process always terminates.
    pub fn rebalance(&self, force: bool) -> Vec<Migration> {
        let mut guard = self.write();
        let store = &mut *guard;
        let now = self.clock.now();

        let mut loads = store.loads();
        if loads.len() < 2 {
            return Vec::new();
        }
        let total: u64 = loads.values().sum();
        let mean = total as f64 / loads.len() as f64;
        let tolerance = if force {
            0.0
        } else {
            self.settings.rebalance_tolerance
        };
        let upper = mean * (1.0 + tolerance);

        let mut heavy: BinaryHeap<(u64, Reverse<String>)> = loads
            .iter()
            .filter(|(_, load)| **load as f64 > upper)
            .map(|(name, load)| (*load, Reverse(name.clone())))
            .collect();
        let mut light: BinaryHeap<Reverse<(u64, String)>> = loads
            .iter()
            .map(|(name, load)| Reverse((*load, name.clone())))
            .collect();

        let mut migrations = Vec::new();
        while let Some((src_load, Reverse(src))) = heavy.pop() {
            if loads.get(&src) != Some(&src_load) || src_load as f64 <= upper {
                continue;
            }
            let Some((dst, dst_load)) = pop_lightest(&mut light, &loads) else {
                break;
            };
            if dst == src {
                light.push(Reverse((dst_load, dst)));
                continue;
            }

            let Some(node) = store.get_node(&src) else {
                continue;
            };
            let mut candidates: Vec<(u64, String)> = lock_node(&node)
                .digests
                .iter()
                .map(|d| (store.weight(d), d.clone()))
                .collect();
            candidates.sort_by(|(wa, da), (wb, db)| wb.cmp(wa).then_with(|| da.cmp(db)));

            let Some((weight, digest)) = candidates
                .into_iter()
                .find(|(weight, _)| dst_load + weight < src_load)
            else {
                // Nothing on `src` fits; it stays as it is.
                light.push(Reverse((dst_load, dst)));
                continue;
            };

            store.unassign(&digest);
            store.assign(&digest, &dst, now);
            let check_name = store
                .digest_to_config
                .get(&digest)
                .map(|c| c.name.clone())
                .unwrap_or_default();
            debug!("moved config {digest} ({check_name}) from {src} to {dst}");

            let new_src = src_load - weight;
            let new_dst = dst_load + weight;
            loads.insert(src.clone(), new_src);
            loads.insert(dst.clone(), new_dst);
            heavy.push((new_src, Reverse(src.clone())));
            heavy.push((new_dst, Reverse(dst.clone())));
            light.push(Reverse((new_src, src.clone())));
            light.push(Reverse((new_dst, dst.clone())));

            migrations.push(Migration {
                digest,
                check_name,
                source: src,
                target: dst,
                weight,
            });
        }

        if !migrations.is_empty() {
            info!(
                "rebalance moved {} configs (mean load {mean:.2}, tolerance {tolerance})",
                migrations.len()
            );
        }
        migrations
    }
}
