// Unless explicitly stated otherwise all files in this repository are licensed
// under the Apache License Version 2.0.
// This product includes software developed at Datadog (https://www.datadoghq.com/).
// Copyright 2026-present Datadog, Inc.

use std::env;
use std::path::{Path, PathBuf};
use std::str::FromStr;
use std::time::Duration;

use anyhow::{Context, Result, bail};
use log::warn;
use serde::Deserialize;

pub const DEFAULT_CONFIG_PATH: &str = "/etc/datadog-agent/datadog-cluster.yaml";

/// Cluster agent settings relevant to cluster-check dispatching.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default)]
pub struct AgentConfig {
    pub log_level: String,
    pub cluster_name: String,
    pub cluster_checks: ClusterChecksConfig,
}

impl Default for AgentConfig {
    fn default() -> Self {
        AgentConfig {
            log_level: "info".to_string(),
            cluster_name: String::new(),
            cluster_checks: ClusterChecksConfig::default(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default)]
pub struct ClusterChecksConfig {
    /// Seconds without heartbeat after which a node is considered gone.
    pub node_expiration_timeout: u64,
    /// Seconds a config may stay dangling before it is reported as unscheduled.
    pub unscheduled_check_threshold: u64,
    /// Seconds between two periodic rebalances.
    pub rebalance_period: u64,
    /// Relative overload a node may carry before rebalancing moves its configs.
    pub rebalance_tolerance: f64,
    pub extra_tags: Vec<String>,
    pub cluster_tag_name: String,
    pub disable_cluster_name_tag_key: bool,
}

impl Default for ClusterChecksConfig {
    fn default() -> Self {
        ClusterChecksConfig {
            node_expiration_timeout: 30,
            unscheduled_check_threshold: 60,
            rebalance_period: 600,
            rebalance_tolerance: 0.10,
            extra_tags: Vec::new(),
            cluster_tag_name: "cluster_name".to_string(),
            disable_cluster_name_tag_key: false,
        }
    }
}

impl ClusterChecksConfig {
    pub fn node_expiration_timeout(&self) -> Duration {
        Duration::from_secs(self.node_expiration_timeout)
    }

    pub fn unscheduled_check_threshold(&self) -> Duration {
        Duration::from_secs(self.unscheduled_check_threshold)
    }

    pub fn rebalance_period(&self) -> Duration {
        Duration::from_secs(self.rebalance_period)
    }
}

impl AgentConfig {
    /// Tags the patcher appends to every dispatched instance.
    pub fn extra_tags(&self) -> Vec<String> {
        let cc = &self.cluster_checks;
        let mut tags = cc.extra_tags.clone();
        if !self.cluster_name.is_empty() {
            if !cc.disable_cluster_name_tag_key && !cc.cluster_tag_name.is_empty() {
                tags.push(format!("{}:{}", cc.cluster_tag_name, self.cluster_name));
            }
            tags.push(format!("kube_cluster_name:{}", self.cluster_name));
        }
        tags
    }

    pub fn log_level(&self) -> log::Level {
        parse_log_level(&self.log_level)
    }

    fn apply_env_overrides(&mut self) {
        if let Ok(level) = env::var("DD_LOG_LEVEL") {
            self.log_level = level;
        }
        if let Ok(name) = env::var("DD_CLUSTER_NAME") {
            self.cluster_name = name;
        }
        if let Ok(tags) = env::var("DD_CLUSTER_CHECKS_EXTRA_TAGS") {
            self.cluster_checks.extra_tags = tags.split_whitespace().map(str::to_owned).collect();
        }
        if let Some(timeout) = env_parse("DD_CLUSTER_CHECKS_NODE_EXPIRATION_TIMEOUT") {
            self.cluster_checks.node_expiration_timeout = timeout;
        }
        if let Some(tolerance) = env_parse("DD_CLUSTER_CHECKS_REBALANCE_TOLERANCE") {
            self.cluster_checks.rebalance_tolerance = tolerance;
        }
    }

    fn validate(&self) -> Result<()> {
        let cc = &self.cluster_checks;
        if cc.node_expiration_timeout == 0 {
            bail!("cluster_checks.node_expiration_timeout must be greater than 0");
        }
        if !cc.rebalance_tolerance.is_finite() || cc.rebalance_tolerance < 0.0 {
            bail!(
                "cluster_checks.rebalance_tolerance must be a non-negative number, got {}",
                cc.rebalance_tolerance
            );
        }
        Ok(())
    }
}

fn env_parse<T: FromStr>(key: &str) -> Option<T> {
    let raw = env::var(key).ok()?;
    match raw.trim().parse() {
        Ok(v) => Some(v),
        Err(_) => {
            warn!("ignoring invalid value for {key}: {raw:?}");
            None
        }
    }
}

/// Loads the cluster agent configuration. A missing file yields the defaults;
/// environment overrides are applied in both cases.
pub fn load_config(config_path: Option<&Path>) -> Result<AgentConfig> {
    let path = config_path.map_or_else(|| PathBuf::from(DEFAULT_CONFIG_PATH), Path::to_path_buf);

    let mut config = if path.exists() {
        let contents = std::fs::read_to_string(&path)
            .with_context(|| format!("Failed to read config file: {}", path.display()))?;
        if contents.trim().is_empty() {
            AgentConfig::default()
        } else {
            serde_yaml::from_str(&contents)
                .with_context(|| format!("Failed to parse config file: {}", path.display()))?
        }
    } else {
        warn!(
            "Config file not found at {}. Using defaults and environment variables.",
            path.display()
        );
        AgentConfig::default()
    };

    config.apply_env_overrides();
    config.validate()?;
    Ok(config)
}

/// Parse a Go log level string into a log::Level
/// Unknown levels default to Info
pub fn parse_log_level(level: &str) -> log::Level {
    match level.to_lowercase().as_str() {
        "trace" => log::Level::Trace,
        "debug" => log::Level::Debug,
        "info" => log::Level::Info,
        "warn" | "warning" => log::Level::Warn,
        "error" | "critical" => log::Level::Error,
        other => {
            warn!("unknown log level {other:?}, using info");
            log::Level::Info
        }
    }
}
