// Unless explicitly stated otherwise all files in this repository are licensed
// under the Apache License Version 2.0.
// This product includes software developed at Datadog (https://www.datadoghq.com/).
// Copyright 2026-present Datadog, Inc.

use std::borrow::Cow;
use std::collections::HashMap;
use std::sync::{LazyLock, PoisonError, RwLock};

use crate::{
    DEFAULT_SERVICE_NAME, MAX_SERVICE_LEN, NormalizeError, normalize_tag_value, truncate_utf8,
};

/// Fallback service names, per tracer language. Entries are never evicted, so
/// leaking them gives them the same lifetime the map would.
static FALLBACK_SERVICE_NAMES: LazyLock<RwLock<HashMap<Box<str>, &'static str>>> =
    LazyLock::new(Default::default);

/// Returns the service name used for spans of language `lang` whose service
/// is missing or invalid.
pub fn fallback_service(lang: &str) -> &'static str {
    if lang.is_empty() {
        return DEFAULT_SERVICE_NAME;
    }
    let cached = FALLBACK_SERVICE_NAMES
        .read()
        .unwrap_or_else(PoisonError::into_inner)
        .get(lang)
        .copied();
    if let Some(name) = cached {
        return name;
    }
    let mut names = FALLBACK_SERVICE_NAMES
        .write()
        .unwrap_or_else(PoisonError::into_inner);
    // A concurrent writer may have won the race; keep its value.
    *names
        .entry(lang.into())
        .or_insert_with(|| &*Box::leak(format!("unnamed-{lang}-service").into_boxed_str()))
}

/// Normalizes a span service, falling back to a per-language default when the
/// service is empty or has no valid character.
pub fn normalize_service<'a>(svc: &'a str, lang: &str) -> (Cow<'a, str>, Option<NormalizeError>) {
    if svc.is_empty() {
        return (
            Cow::Borrowed(fallback_service(lang)),
            Some(NormalizeError::Empty),
        );
    }
    let (svc, err) = truncate_service(svc);
    let normalized = normalize_tag_value(svc);
    if normalized.is_empty() {
        return (
            Cow::Borrowed(fallback_service(lang)),
            Some(NormalizeError::Invalid),
        );
    }
    (normalized, err)
}

/// Normalizes a span's `peer.service`. Unlike [`normalize_service`] there is
/// no fallback: an empty peer service stays empty.
pub fn normalize_peer_service(svc: &str) -> (Cow<'_, str>, Option<NormalizeError>) {
    if svc.is_empty() {
        return (Cow::Borrowed(""), None);
    }
    let (svc, err) = truncate_service(svc);
    let normalized = normalize_tag_value(svc);
    if normalized.is_empty() {
        return (Cow::Borrowed(""), Some(NormalizeError::Invalid));
    }
    (normalized, err)
}

fn truncate_service(svc: &str) -> (&str, Option<NormalizeError>) {
    if svc.len() > MAX_SERVICE_LEN {
        (
            truncate_utf8(svc, MAX_SERVICE_LEN),
            Some(NormalizeError::TooLong),
        )
    } else {
        (svc, None)
    }
}
