// Unless explicitly stated otherwise all files in this repository are licensed
// under the Apache License Version 2.0.
// This product includes software developed at Datadog (https://www.datadoghq.com/).
// Copyright 2026-present Datadog, Inc.

use std::borrow::Cow;

use crate::lookup::{ALPHA, ALPHA_NUM, LOWER_ALPHA_NUM};
use crate::{DEFAULT_SPAN_NAME, MAX_NAME_LEN, NormalizeError, truncate_utf8};

/// Normalizes a span name, returning the reason (if any) why it was modified.
///
/// The result starts with a letter, contains only `[a-z0-9._]`, never has `_`
/// next to another `_` or a `.`, and does not end with `_`.
pub fn normalize_name(name: &str) -> (Cow<'_, str>, Option<NormalizeError>) {
    if name.is_empty() {
        return (Cow::Borrowed(DEFAULT_SPAN_NAME), Some(NormalizeError::Empty));
    }
    let mut err = None;
    let mut name = name;
    if name.len() > MAX_NAME_LEN {
        name = truncate_utf8(name, MAX_NAME_LEN);
        err = Some(NormalizeError::TooLong);
    }
    match norm_metric_name_parse(name) {
        Some(normalized) => (normalized, err),
        None => (
            Cow::Borrowed(DEFAULT_SPAN_NAME),
            Some(NormalizeError::Invalid),
        ),
    }
}

/// Checks whether `name` is already in the form produced by
/// [`norm_metric_name_parse`], ignoring a trailing underscore.
fn is_valid_normalized_metric_name(name: &[u8]) -> bool {
    let Some((&first, rest)) = name.split_first() else {
        return false;
    };
    if !first.is_ascii_lowercase() {
        return false;
    }
    let mut prev = first;
    for &b in rest {
        let ok = LOWER_ALPHA_NUM[b as usize]
            || (b == b'.' && prev != b'_')
            || (b == b'_' && prev != b'_' && prev != b'.');
        if !ok {
            return false;
        }
        prev = b;
    }
    true
}

/// Normalizes a metric-style name with a single pass over its bytes.
/// Returns `None` when the name holds no ASCII letter at all.
fn norm_metric_name_parse(name: &str) -> Option<Cow<'_, str>> {
    if name.is_empty() || name.len() > MAX_NAME_LEN {
        return None;
    }

    // Skip everything up to the first letter.
    let start = name.bytes().position(|b| ALPHA[b as usize])?;
    let rest = &name[start..];

    if is_valid_normalized_metric_name(rest.as_bytes()) {
        return Some(Cow::Borrowed(rest.strip_suffix('_').unwrap_or(rest)));
    }

    let mut res: Vec<u8> = Vec::with_capacity(rest.len());
    for b in rest.bytes() {
        if ALPHA_NUM[b as usize] {
            res.push(b.to_ascii_lowercase());
            continue;
        }
        // res is never empty here: rest starts with a letter.
        match (b, res.last().copied()) {
            // an underscore right before a period is replaced by it
            (b'.', Some(b'_')) => {
                if let Some(last) = res.last_mut() {
                    *last = b'.';
                }
            }
            (b'.', _) => res.push(b'.'),
            // no double underscores, no underscores after periods
            (_, Some(b'.' | b'_')) => {}
            _ => res.push(b'_'),
        }
    }
    if res.last() == Some(&b'_') {
        res.pop();
    }

    String::from_utf8(res).ok().map(Cow::Owned)
}
