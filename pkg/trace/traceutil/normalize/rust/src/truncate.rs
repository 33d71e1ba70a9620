// Unless explicitly stated otherwise all files in this repository are licensed
// under the Apache License Version 2.0.
// This product includes software developed at Datadog (https://www.datadoghq.com/).
// Copyright 2026-present Datadog, Inc.

use crate::MAX_RESOURCE_LEN;

/// Truncates `s` to at most `limit` bytes without splitting a character.
pub fn truncate_utf8(s: &str, limit: usize) -> &str {
    if s.len() <= limit {
        return s;
    }
    let mut end = limit;
    while !s.is_char_boundary(end) {
        end -= 1;
    }
    &s[..end]
}

/// Truncates a resource to [`MAX_RESOURCE_LEN`] bytes. The boolean is true
/// when the resource was shortened.
pub fn truncate_resource(resource: &str) -> (&str, bool) {
    let truncated = truncate_utf8(resource, MAX_RESOURCE_LEN);
    (truncated, truncated.len() != resource.len())
}
