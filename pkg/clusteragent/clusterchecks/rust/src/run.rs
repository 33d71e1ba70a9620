// Unless explicitly stated otherwise all files in this repository are licensed
// under the Apache License Version 2.0.
// This product includes software developed at Datadog (https://www.datadoghq.com/).
// Copyright 2026-present Datadog, Inc.

use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use log::{debug, info};
use tokio::time::{self, Instant, MissedTickBehavior};

use crate::dispatcher::Dispatcher;

const MIN_PERIOD: Duration = Duration::from_secs(1);

fn ticker(period: Duration, immediate: bool) -> time::Interval {
    let period = period.max(MIN_PERIOD);
    let start = if immediate {
        Instant::now()
    } else {
        Instant::now() + period
    };
    let mut interval = time::interval_at(start, period);
    interval.set_missed_tick_behavior(MissedTickBehavior::Delay);
    interval
}

impl Dispatcher {
    /// Periodic maintenance: node expiry and dangling dispatch, rebalancing,
    /// and unscheduled check reporting. Returns once `shutdown` resolves.
    pub async fn run(self: Arc<Self>, shutdown: impl Future<Output = ()>) {
        tokio::pin!(shutdown);

        let mut expiry = ticker(self.settings.node_expiration_timeout / 2, true);
        let mut rebalance = ticker(self.settings.rebalance_period, false);
        let mut unscheduled = ticker(self.settings.unscheduled_check_threshold, false);

        info!("cluster-check dispatcher loop started");
        loop {
            tokio::select! {
                () = &mut shutdown => {
                    info!("cluster-check dispatcher loop stopping");
                    return;
                }
                _ = expiry.tick() => {
                    let expired = self.expire_nodes(self.clock.now());
                    if !expired.is_empty() {
                        debug!("expired nodes: {expired:?}");
                    }
                    if self.should_dispatch_dangling() {
                        self.dispatch_dangling();
                    }
                }
                _ = rebalance.tick() => {
                    self.rebalance(false);
                }
                _ = unscheduled.tick() => {
                    self.report_unscheduled(self.clock.now());
                }
            }
        }
    }

    /// Heartbeats `nodes` twice per expiration timeout, for nodes that have
    /// no agent reporting for them. Never returns; drop the future to stop.
    pub async fn keep_nodes_alive(self: Arc<Self>, nodes: Vec<String>) {
        let mut keep_alive = ticker(self.settings.node_expiration_timeout / 2, true);
        loop {
            keep_alive.tick().await;
            let now = self.clock.now();
            for node in &nodes {
                self.heartbeat(node, "", now);
            }
            debug!("sent keep-alive heartbeats for {} nodes", nodes.len());
        }
    }
}
