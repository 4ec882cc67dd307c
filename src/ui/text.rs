//! Width accounting for rendered text (spec §3, §4.1).
//!
//! Every string that reaches the grid is normalized to precomposed form
//! (NFC) before its display width is measured, so a combining-sequence
//! filename and its precomposed equivalent occupy the same number of
//! columns (spec §8 invariant 10). Wide (East Asian) characters occupy two
//! columns; callers that need a fixed-width field must measure with
//! [`display_width`] rather than `chars().count()` or `str::len()`.

use unicode_normalization::UnicodeNormalization;
use unicode_segmentation::UnicodeSegmentation;
use unicode_width::UnicodeWidthStr;

/// Normalizes to NFC (spec glossary: "precomposed form").
pub fn normalize_nfc(s: &str) -> String {
    s.nfc().collect()
}

/// Display width in terminal columns, after NFC normalization.
pub fn display_width(s: &str) -> usize {
    UnicodeWidthStr::width(normalize_nfc(s).as_str())
}

/// Truncates `s` to at most `max_width` display columns, normalizing first
/// and appending an ellipsis when truncation occurs. Never splits a wide
/// character in half — a char whose width would overflow `max_width` is
/// dropped rather than rendered partially.
pub fn truncate_to_width(s: &str, max_width: usize) -> String {
    let normalized = normalize_nfc(s);
    if UnicodeWidthStr::width(normalized.as_str()) <= max_width {
        return normalized;
    }
    if max_width == 0 {
        return String::new();
    }
    let budget = max_width - 1;
    let mut out = String::new();
    let mut used = 0usize;
    for ch in normalized.chars() {
        let w = unicode_width::UnicodeWidthChar::width(ch).unwrap_or(1);
        if used + w > budget {
            break;
        }
        out.push(ch);
        used += w;
    }
    out.push('…');
    out
}

/// Pads `s` (already width-measured) with spaces up to `width` columns,
/// accounting for wide characters — `format!("{:<width$}")` pads by byte
/// count, not display width, so it under-pads wide-character strings.
pub fn pad_to_width(s: &str, width: usize) -> String {
    let w = display_width(s);
    if w >= width {
        s.to_string()
    } else {
        format!("{s}{}", " ".repeat(width - w))
    }
}

/// Byte offset of grapheme cluster `n` in `s` (or `s.len()` past the end).
/// Cursor motion and insert/delete operate on grapheme clusters, not
/// `char`s, so a combining-mark sequence or a multi-codepoint emoji moves
/// and deletes as the single visual unit the user sees (spec §4.6's "single-
/// line editable text field with cursor motion").
pub fn grapheme_byte_offset(s: &str, n: usize) -> usize {
    s.grapheme_indices(true).nth(n).map(|(i, _)| i).unwrap_or(s.len())
}

pub fn grapheme_count(s: &str) -> usize {
    s.graphemes(true).count()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn combining_sequence_matches_precomposed_width() {
        let combining = "e\u{0301}"; // e + combining acute
        let precomposed = "\u{00e9}"; // é
        assert_eq!(display_width(combining), display_width(precomposed));
    }

    #[test]
    fn wide_characters_count_as_two_columns() {
        assert_eq!(display_width("中文"), 4);
    }

    #[test]
    fn truncate_adds_ellipsis_when_over_budget() {
        let out = truncate_to_width("hello world", 6);
        assert_eq!(display_width(&out), 6);
        assert!(out.ends_with('…'));
    }

    #[test]
    fn truncate_is_noop_under_budget() {
        assert_eq!(truncate_to_width("short", 10), "short");
    }

    #[test]
    fn pad_accounts_for_wide_characters() {
        let padded = pad_to_width("中", 4);
        assert_eq!(display_width(&padded), 4);
    }

    #[test]
    fn grapheme_count_treats_combining_sequence_as_one() {
        assert_eq!(grapheme_count("e\u{0301}b"), 2);
    }
}
