// Unless explicitly stated otherwise all files in this repository are licensed
// under the Apache License Version 2.0.
// This product includes software developed at Datadog (https://www.datadoghq.com/).
// Copyright 2026-present Datadog, Inc.

//! Normalization of span names, services and tags.
//!
//! Every function here returns a string that satisfies the backend's
//! character-set and length constraints. When the input already satisfies them
//! the input itself is handed back as `Cow::Borrowed`, so the common case does
//! not allocate. Functions that can substitute a default also return an
//! advisory [`NormalizeError`] describing why the input was changed.

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

mod errors;
mod lookup;
mod name;
mod service;
mod tag;
mod truncate;

pub use errors::NormalizeError;
pub use name::normalize_name;
pub use service::{fallback_service, normalize_peer_service, normalize_service};
pub use tag::{normalize_tag, normalize_tag_value};
pub use truncate::{truncate_resource, truncate_utf8};

/// Name given to a span that has none and no reasonable fallback.
pub const DEFAULT_SPAN_NAME: &str = "unnamed_operation";
/// Service given to a span that has none and no language to derive one from.
pub const DEFAULT_SERVICE_NAME: &str = "unnamed-service";

/// Maximum length of a span name, in bytes.
pub const MAX_NAME_LEN: usize = 100;
/// Maximum length of a service name, in bytes.
pub const MAX_SERVICE_LEN: usize = 100;
/// Maximum length of a resource, in bytes.
pub const MAX_RESOURCE_LEN: usize = 5000;

/// Maximum number of characters kept by tag normalization.
pub(crate) const MAX_TAG_LENGTH: usize = 200;
