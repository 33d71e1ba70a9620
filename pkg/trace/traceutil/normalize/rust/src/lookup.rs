// Unless explicitly stated otherwise all files in this repository are licensed
// under the Apache License Version 2.0.
// This product includes software developed at Datadog (https://www.datadoghq.com/).
// Copyright 2026-present Datadog, Inc.

//! Byte classification tables used on the hot paths.

#[derive(Clone, Copy)]
enum Class {
    Alpha,
    LowerAlphaNum,
    AlphaNum,
    TagStart,
    Tag,
}

const fn matches(class: Class, c: u8) -> bool {
    match class {
        Class::Alpha => c.is_ascii_alphabetic(),
        Class::LowerAlphaNum => c.is_ascii_lowercase() || c.is_ascii_digit(),
        Class::AlphaNum => c.is_ascii_alphanumeric(),
        Class::TagStart => c.is_ascii_lowercase() || c == b':',
        Class::Tag => {
            c.is_ascii_lowercase()
                || c == b':'
                || c.is_ascii_digit()
                || c == b'.'
                || c == b'/'
                || c == b'-'
        }
    }
}

const fn table(class: Class) -> [bool; 256] {
    let mut table = [false; 256];
    let mut i = 0;
    while i < 256 {
        table[i] = matches(class, i as u8);
        i += 1;
    }
    table
}

/// `[A-Za-z]`
pub(crate) static ALPHA: [bool; 256] = table(Class::Alpha);
/// `[a-z0-9]`
pub(crate) static LOWER_ALPHA_NUM: [bool; 256] = table(Class::LowerAlphaNum);
/// `[A-Za-z0-9]`
pub(crate) static ALPHA_NUM: [bool; 256] = table(Class::AlphaNum);
/// Bytes a normalized tag may start with: `[a-z:]`.
pub(crate) static VALID_ASCII_START_CHAR: [bool; 256] = table(Class::TagStart);
/// Bytes a normalized tag may contain without further checks: `[a-z0-9:./-]`.
pub(crate) static VALID_ASCII_TAG_CHAR: [bool; 256] = table(Class::Tag);
