// Unless explicitly stated otherwise all files in this repository are licensed
// under the Apache License Version 2.0.
// This product includes software developed at Datadog (https://www.datadoghq.com/).
// Copyright 2026-present Datadog, Inc.

use std::fmt;
use std::hash::Hasher;

use fnv::FnvHasher;
use serde::Serialize;

use crate::integration::{Config, Data};

/// Identity of a single running check: one per instance of a config.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
#[serde(transparent)]
pub struct CheckId(String);

impl CheckId {
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for CheckId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for CheckId {
    fn from(s: &str) -> Self {
        CheckId(s.to_string())
    }
}

/// Builds `<name>:<instance name>:<hash>`, or `<name>:<hash>` when the
/// instance carries no name.
pub fn build_id(name: &str, fast_digest: u64, instance: &Data, init_config: &Data) -> CheckId {
    let mut h = FnvHasher::default();
    h.write(format!("{fast_digest:x}").as_bytes());
    h.write(instance.as_str().as_bytes());
    h.write(init_config.as_str().as_bytes());
    let hash = h.finish();

    match instance.name_for_instance() {
        Some(instance_name) => CheckId(format!("{name}:{instance_name}:{hash:x}")),
        None => CheckId(format!("{name}:{hash:x}")),
    }
}

/// Check IDs of every instance of `config`, in instance order.
pub fn check_ids(config: &Config) -> Vec<CheckId> {
    let fast_digest = config.fast_digest();
    config
        .instances
        .iter()
        .map(|instance| build_id(&config.name, fast_digest, instance, &config.init_config))
        .collect()
}
