// Unless explicitly stated otherwise all files in this repository are licensed
// under the Apache License Version 2.0.
// This product includes software developed at Datadog (https://www.datadoghq.com/).
// Copyright 2026-present Datadog, Inc.

use std::borrow::Cow;

use unicode_general_category::{GeneralCategory, get_general_category};

use crate::MAX_TAG_LENGTH;
use crate::lookup::{VALID_ASCII_START_CHAR, VALID_ASCII_TAG_CHAR};

/// Normalizes a full `key:value` tag so that it matches the backend
/// requirements. Leading characters that cannot start a tag are dropped.
pub fn normalize_tag(v: &str) -> Cow<'_, str> {
    normalize(v, true)
}

/// Normalizes a tag value. Use this when the input is only the right-hand side
/// of a tag; unlike [`normalize_tag`] a value may start with a digit.
pub fn normalize_tag_value(v: &str) -> Cow<'_, str> {
    normalize(v, false)
}

fn normalize(v: &str, remove_digit_start_char: bool) -> Cow<'_, str> {
    // Most tags are already valid ASCII; hand them back untouched.
    if is_normalized_ascii_tag(v, remove_digit_start_char) {
        return Cow::Borrowed(v);
    }

    // The algorithm records cuts, [start, end) byte ranges of v that get
    // replaced by a single underscore once the scan is over.
    let mut tag = v.as_bytes().to_vec();
    let mut trim = 0; // bytes dropped from the start
    let mut cuts: Vec<(usize, usize)> = Vec::new();
    let mut chars = 0; // characters processed
    let mut end = 0; // byte offset right after the last processed character

    for (i, c) in v.char_indices() {
        let jump = c.len_utf8();
        end = i + jump;
        match c {
            'a'..='z' | ':' => chars += 1,
            'A'..='Z' => {
                tag[i] += b'a' - b'A';
                chars += 1;
            }
            _ => {
                let mut c = c;
                if is_upper(c) {
                    // Only lowercase when the width is unchanged so the
                    // offsets collected so far stay valid.
                    let mut lower = c.to_lowercase();
                    if let (Some(low), None) = (lower.next(), lower.next())
                        && low.len_utf8() == jump
                    {
                        low.encode_utf8(&mut tag[i..end]);
                        c = low;
                    }
                }
                if is_letter(c) {
                    chars += 1;
                } else if remove_digit_start_char && chars == 0 {
                    // Nothing but letters and colons may start a tag.
                    trim = end;
                } else if is_digit(c) || matches!(c, '.' | '/' | '-') {
                    chars += 1;
                } else {
                    chars += 1;
                    // merge with the previous cut when adjacent
                    if let Some(last) = cuts.last_mut()
                        && last.1 >= i
                    {
                        last.1 += jump;
                    } else {
                        cuts.push((i, end));
                    }
                }
            }
        }
        // Bail early on tags made of many multi-byte characters, and stop
        // at the maximum length.
        if end >= 2 * MAX_TAG_LENGTH || chars >= MAX_TAG_LENGTH {
            break;
        }
    }

    tag.truncate(end);
    tag.drain(..trim);

    let mut delta = trim;
    for (cut_start, cut_end) in cuts {
        let start = cut_start - delta;
        let stop = cut_end - delta;

        if stop >= tag.len() {
            // The cut runs to the end of the tag: drop it entirely.
            tag.truncate(start);
            break;
        }
        tag[start] = b'_';
        if stop - start == 1 {
            continue;
        }
        tag.copy_within(stop.., start + 1);
        tag.truncate(tag.len() - (stop - start) + 1);
        delta += cut_end - cut_start - 1;
    }

    match String::from_utf8(tag) {
        Ok(tag) => Cow::Owned(tag),
        // Cuts and trims only ever land on character boundaries.
        Err(e) => Cow::Owned(String::from_utf8_lossy(e.as_bytes()).into_owned()),
    }
}

/// Letters are the `L*` general categories only; letter-like numbers and
/// marks are not.
fn is_letter(c: char) -> bool {
    matches!(
        get_general_category(c),
        GeneralCategory::UppercaseLetter
            | GeneralCategory::LowercaseLetter
            | GeneralCategory::TitlecaseLetter
            | GeneralCategory::ModifierLetter
            | GeneralCategory::OtherLetter
    )
}

fn is_upper(c: char) -> bool {
    get_general_category(c) == GeneralCategory::UppercaseLetter
}

/// Decimal digits (`Nd`) only: superscripts, fractions and roman numerals
/// are cut.
fn is_digit(c: char) -> bool {
    c.is_ascii_digit() || get_general_category(c) == GeneralCategory::DecimalNumber
}

/// Reports whether `tag` is pure ASCII, short enough and already normalized,
/// in which case normalization returns it as is.
pub(crate) fn is_normalized_ascii_tag(tag: &str, check_valid_start_char: bool) -> bool {
    let bytes = tag.as_bytes();
    if bytes.is_empty() {
        return true;
    }
    if bytes.len() > MAX_TAG_LENGTH {
        return false;
    }
    let mut i = 0;
    if check_valid_start_char {
        if !VALID_ASCII_START_CHAR[bytes[0] as usize] {
            return false;
        }
        i += 1;
    }
    while i < bytes.len() {
        let b = bytes[i];
        if VALID_ASCII_TAG_CHAR[b as usize] {
            i += 1;
            continue;
        }
        if b != b'_' {
            return false;
        }
        // an underscore is only fine when followed by a valid non-underscore byte
        i += 1;
        match bytes.get(i) {
            Some(&next) if VALID_ASCII_TAG_CHAR[next as usize] => i += 1,
            _ => return false,
        }
    }
    true
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn test_normalize_tag_cases() {
        let cases = [
            ("#test_starting_hash", "test_starting_hash"),
            ("TestCAPSandSuch", "testcapsandsuch"),
            (
                "Test Conversion Of Weird !@#$%^&**() Characters",
                "test_conversion_of_weird_characters",
            ),
            ("$#weird_starting", "weird_starting"),
            ("allowed:c0l0ns", "allowed:c0l0ns"),
            ("1love", "love"),
            ("ünicöde", "ünicöde"),
            ("ünicöde:metäl", "ünicöde:metäl"),
            ("Data🐨dog🐶 繋がっ⛰てて", "data_dog_繋がっ_てて"),
            (" spaces   ", "spaces"),
            (" #hashtag!@#spaces #__<>#  ", "hashtag_spaces"),
            (":testing", ":testing"),
            ("_foo", "foo"),
            (":::test", ":::test"),
            ("contiguous_____underscores", "contiguous_underscores"),
            ("foo_", "foo"),
            ("\u{017F}odd_\u{017F}case\u{017F}", "\u{017F}odd_\u{017F}case\u{017F}"),
            ("", ""),
            (" ", ""),
            ("ok", "ok"),
            ("™Ö™Ö™™Ö™", "ö_ö_ö"),
            ("AlsO:ök", "also:ök"),
            (":still_ok", ":still_ok"),
            ("___trim", "trim"),
            ("12.:trim@", ":trim"),
            ("12.:trim@@", ":trim"),
            ("fun:ky__tag/1", "fun:ky_tag/1"),
            ("fun:ky@tag/2", "fun:ky_tag/2"),
            ("fun:ky@@@tag/3", "fun:ky_tag/3"),
            ("tag:1/2.3", "tag:1/2.3"),
            ("---fun:k####y_ta@#g/1_@@#", "fun:k_y_ta_g/1"),
            ("AlsO:œ#@ö))œk", "also:œ_ö_œk"),
            ("Hello World🍣tag", "hello_world_tag"),
            ("9abc", "abc"),
            // numbers other than decimal digits and marks are not letters
            ("a\u{00B2}b", "a_b"),
            ("a\u{216B}b", "a_b"),
            ("a\u{093E}b", "a_b"),
            ("a\u{00BD}b", "a_b"),
            ("v\u{0663}", "v\u{0663}"),
            ("\u{0394}elta", "\u{03B4}elta"),
        ];
        for (input, expected) in cases {
            assert_eq!(normalize_tag(input), expected, "input: {input:?}");
        }
    }

    #[test]
    fn test_normalize_tag_too_long() {
        let input = "a".repeat(MAX_TAG_LENGTH + 10);
        assert_eq!(normalize_tag(&input), "a".repeat(MAX_TAG_LENGTH));

        // multi-byte characters stop the scan at twice the maximum in bytes
        let input = format!("a{}", "🐶".repeat(500));
        assert_eq!(normalize_tag(&input), "a");

        let input = format!("a{}", "ü".repeat(500));
        let out = normalize_tag(&input);
        assert_eq!(out.chars().count(), MAX_TAG_LENGTH);
    }

    #[test]
    fn test_normalize_tag_value() {
        let cases = [
            ("1love", "1love"),
            ("Hello World", "hello_world"),
            ("_foo", "_foo"),
            ("!foo", "_foo"),
            ("9abc", "9abc"),
            ("my-service", "my-service"),
            ("\u{2167}rc", "_rc"),
            ("\u{0663}rc", "\u{0663}rc"),
        ];
        for (input, expected) in cases {
            assert_eq!(normalize_tag_value(input), expected, "input: {input:?}");
        }
    }

    #[test]
    fn test_fast_path_is_borrowed() {
        let input = "abc:def/ghi-1.0";
        assert!(is_normalized_ascii_tag(input, true));
        let out = normalize_tag(input);
        assert!(matches!(out, Cow::Borrowed(s) if std::ptr::eq(s, input)));
    }

    #[test]
    fn test_is_normalized_ascii_tag() {
        assert!(is_normalized_ascii_tag("", true));
        assert!(is_normalized_ascii_tag("a_b", true));
        assert!(is_normalized_ascii_tag("1ab", false));
        assert!(!is_normalized_ascii_tag("1ab", true));
        assert!(!is_normalized_ascii_tag("a__b", true));
        assert!(!is_normalized_ascii_tag("ab_", true));
        assert!(!is_normalized_ascii_tag("Ab", true));
        assert!(!is_normalized_ascii_tag("a b", false));
        assert!(!is_normalized_ascii_tag("ü", false));
        assert!(!is_normalized_ascii_tag(&"a".repeat(MAX_TAG_LENGTH + 1), true));
    }

    proptest! {
        #[test]
        fn fast_path_returns_input(s in "[a-z:][a-z0-9:./_-]{0,250}", check in any::<bool>()) {
            if is_normalized_ascii_tag(&s, check) {
                let out = normalize(&s, check);
                prop_assert!(matches!(out, Cow::Borrowed(b) if std::ptr::eq(b, s.as_str())));
            }
        }
    }
}
