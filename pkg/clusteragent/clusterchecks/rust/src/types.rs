// Unless explicitly stated otherwise all files in this repository are licensed
// under the Apache License Version 2.0.
// This product includes software developed at Datadog (https://www.datadoghq.com/).
// Copyright 2026-present Datadog, Inc.

use serde::Serialize;

use crate::integration::Config;

/// Read-only view of the dispatcher. Nodes are ordered by name and configs
/// by digest.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct StateResponse {
    pub warmup: bool,
    pub dangling: Vec<Config>,
    pub nodes: Vec<StateNodeResponse>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct StateNodeResponse {
    pub name: String,
    pub configs: Vec<Config>,
}

impl StateResponse {
    pub fn node(&self, name: &str) -> Option<&StateNodeResponse> {
        self.nodes.iter().find(|n| n.name == name)
    }
}

/// A config moved from one node to another by a rebalance.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Migration {
    pub digest: String,
    pub check_name: String,
    pub source: String,
    pub target: String,
    pub weight: u64,
}
