// Unless explicitly stated otherwise all files in this repository are licensed
// under the Apache License Version 2.0.
// This product includes software developed at Datadog (https://www.datadoghq.com/).
// Copyright 2026-present Datadog, Inc.

use thiserror::Error;

/// Reason why a normalizer modified its input.
///
/// These are advisory: the string returned next to them is always safe to
/// forward to the backend.
#[derive(Error, Debug, Clone, Copy, PartialEq, Eq)]
pub enum NormalizeError {
    /// The input was empty.
    #[error("empty")]
    Empty,
    /// The input was longer than the allowed maximum and got truncated.
    #[error("too long")]
    TooLong,
    /// The input had no salvageable characters.
    #[error("invalid")]
    Invalid,
}
