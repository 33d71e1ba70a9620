// Unless explicitly stated otherwise all files in this repository are licensed
// under the Apache License Version 2.0.
// This product includes software developed at Datadog (https://www.datadoghq.com/).
// Copyright 2026-present Datadog, Inc.

// Panicking code
#![deny(clippy::unwrap_used)]
#![deny(clippy::expect_used)]
#![deny(clippy::panic)]
// Debug code that shouldn't be in production
#![deny(clippy::dbg_macro)]

use std::io::{self, Write};
use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, Result, bail};
use clap::Parser;
use dd_clusterchecks::{
    AgentConfig, Clock, Dispatcher, NoopMetrics, SystemClock, load_check_configs, load_config,
};
use log::{LevelFilter, info};
use simple_logger::SimpleLogger;
use tokio::signal::unix::{SignalKind, signal};

#[derive(Parser, Debug)]
#[command(name = "dd-clusterchecks")]
#[command(about = "Dispatches a directory of cluster checks onto a set of nodes and prints the resulting state", long_about = None)]
struct Args {
    /// Path to datadog-cluster.yaml
    #[arg(long)]
    config: Option<PathBuf>,

    /// Directory holding the check configurations
    #[arg(long)]
    checks_dir: PathBuf,

    /// Node agent to dispatch to (repeatable)
    #[arg(long = "node", required = true)]
    nodes: Vec<String>,

    /// Force a rebalance before printing the state
    #[arg(long)]
    rebalance: bool,

    /// Keep the dispatcher running until SIGINT or SIGTERM
    #[arg(long)]
    watch: bool,
}

/// Installs the logger at the default level so that warnings raised while
/// loading the configuration are not lost.
fn init_logging() -> Result<()> {
    SimpleLogger::new().with_level(LevelFilter::Trace).init()?;
    log::set_max_level(LevelFilter::Info);
    Ok(())
}

fn apply_log_level(config: &AgentConfig) {
    log::set_max_level(config.log_level().to_level_filter());
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();
    init_logging()?;
    let config = load_config(args.config.as_deref())?;
    apply_log_level(&config);

    let checks = load_check_configs(&args.checks_dir)?;
    if checks.is_empty() {
        bail!("no check configuration found in {}", args.checks_dir.display());
    }

    let clock: Arc<dyn Clock> = Arc::new(SystemClock);
    let dispatcher = Arc::new(Dispatcher::new(
        &config,
        Arc::clone(&clock),
        Arc::new(NoopMetrics),
        "true",
    ));

    for node in &args.nodes {
        dispatcher.heartbeat(node, "", clock.now());
    }
    dispatcher.schedule(checks);
    dispatcher.expire_nodes(clock.now());

    if args.rebalance {
        let migrations = dispatcher.rebalance(true);
        info!("rebalance performed {} migrations", migrations.len());
    }

    if args.watch {
        let mut sigterm =
            signal(SignalKind::terminate()).context("Failed to setup SIGTERM handler")?;
        let mut sigint =
            signal(SignalKind::interrupt()).context("Failed to setup SIGINT handler")?;
        let shutdown = async move {
            tokio::select! {
                _ = sigterm.recv() => info!("Received SIGTERM, shutting down"),
                _ = sigint.recv() => info!("Received SIGINT, shutting down"),
            }
        };
        // Nothing else heartbeats the command-line nodes.
        let keep_alive = Arc::clone(&dispatcher).keep_nodes_alive(args.nodes.clone());
        tokio::select! {
            () = Arc::clone(&dispatcher).run(shutdown) => {}
            () = keep_alive => {}
        }
    }

    let state = dispatcher.get_state();
    let json = serde_json::to_string_pretty(&state).context("Failed to serialize state")?;
    let mut stdout = io::stdout().lock();
    writeln!(stdout, "{json}").context("Failed to write state")?;
    Ok(())
}
