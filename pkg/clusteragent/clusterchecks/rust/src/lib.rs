// Unless explicitly stated otherwise all files in this repository are licensed
// under the Apache License Version 2.0.
// This product includes software developed at Datadog (https://www.datadoghq.com/).
// Copyright 2026-present Datadog, Inc.

//! Leader-side dispatching of cluster checks onto node agents.

// Correctness
#![deny(clippy::indexing_slicing)]
#![deny(clippy::string_slice)]
#![deny(clippy::cast_possible_wrap)]
#![deny(clippy::undocumented_unsafe_blocks)]
// Panicking code
#![deny(clippy::unwrap_used)]
#![deny(clippy::expect_used)]
#![deny(clippy::panic)]
#![deny(clippy::unimplemented)]
#![deny(clippy::todo)]
// Debug code that shouldn't be in production
#![deny(clippy::dbg_macro)]
#![deny(clippy::print_stdout)]
#![deny(clippy::print_stderr)]

pub mod checkid;
pub mod clock;
pub mod config;
mod dispatcher;
mod dispatcher_nodes;
mod errors;
pub mod integration;
mod patcher;
mod rebalance;
mod run;
mod store;
pub mod telemetry;
mod types;

// Re-export the public API
pub use checkid::CheckId;
pub use clock::{Clock, ManualClock, SystemClock};
pub use config::{AgentConfig, ClusterChecksConfig, load_config};
pub use dispatcher::Dispatcher;
pub use errors::{DataError, Error};
pub use integration::{Config, Data, load_check_configs};
pub use patcher::Patcher;
pub use telemetry::{InMemoryMetrics, MetricsSink, NoopMetrics};
pub use types::{Migration, StateNodeResponse, StateResponse};
