//! Deterministic shortening of oversized document text.
//!
//! Converted documents can be arbitrarily long while model context windows
//! are not. Text over the configured character budget is cut the same way
//! every time, so the same document always produces the same invocation.
//! Lengths are counted in Unicode scalar values and cuts never split a
//! character.

use crate::config::TruncationStrategy;
use serde::{Deserialize, Serialize};

/// What happened to the input text on its way into the invocation.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Truncation {
    pub truncated: bool,
    pub original_chars: usize,
    pub kept_chars: usize,
}

/// Marker inserted between head and tail in [`TruncationStrategy::HeadAndTail`].
pub fn omission_marker(omitted: usize) -> String {
    format!("\n\n[... {omitted} characters omitted ...]\n\n")
}

/// Shorten `text` to at most `budget` characters of document content.
///
/// Returns the text to send plus a [`Truncation`] record. Text within the
/// budget is returned unchanged.
pub fn truncate(text: &str, budget: usize, strategy: TruncationStrategy) -> (String, Truncation) {
    let original_chars = text.chars().count();
    if original_chars <= budget {
        return (
            text.to_string(),
            Truncation {
                truncated: false,
                original_chars,
                kept_chars: original_chars,
            },
        );
    }

    let (out, kept) = match strategy {
        TruncationStrategy::Head => (head(text, budget).to_string(), budget),
        TruncationStrategy::HeadAndTail => {
            let tail_len = budget / 4;
            let head_len = budget - tail_len;
            let omitted = original_chars - head_len - tail_len;
            let mut out = String::with_capacity(text.len().min(budget * 4) + 48);
            out.push_str(head(text, head_len));
            out.push_str(&omission_marker(omitted));
            out.push_str(tail(text, tail_len, original_chars));
            (out, head_len + tail_len)
        }
    };

    (
        out,
        Truncation {
            truncated: true,
            original_chars,
            kept_chars: kept,
        },
    )
}

/// The first `n` characters of `text`.
fn head(text: &str, n: usize) -> &str {
    match text.char_indices().nth(n) {
        Some((byte_idx, _)) => &text[..byte_idx],
        None => text,
    }
}

/// The last `n` characters of `text`, given its total character count.
fn tail(text: &str, n: usize, total_chars: usize) -> &str {
    if n == 0 {
        return "";
    }
    match text.char_indices().nth(total_chars - n) {
        Some((byte_idx, _)) => &text[byte_idx..],
        None => "",
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn short_text_is_untouched() {
        let (out, t) = truncate("hello", 10, TruncationStrategy::HeadAndTail);
        assert_eq!(out, "hello");
        assert!(!t.truncated);
        assert_eq!(t.original_chars, 5);
        assert_eq!(t.kept_chars, 5);
    }

    #[test]
    fn exact_budget_is_untouched() {
        let (out, t) = truncate("abcdefghij", 10, TruncationStrategy::Head);
        assert_eq!(out, "abcdefghij");
        assert!(!t.truncated);
    }

    #[test]
    fn head_keeps_prefix() {
        let (out, t) = truncate("abcdefghijklmnop", 4, TruncationStrategy::Head);
        assert_eq!(out, "abcd");
        assert!(t.truncated);
        assert_eq!(t.original_chars, 16);
        assert_eq!(t.kept_chars, 4);
    }

    #[test]
    fn head_and_tail_keeps_both_ends() {
        let text: String = ('a'..='z').collect();
        let (out, t) = truncate(&text, 8, TruncationStrategy::HeadAndTail);
        // 6 head + 2 tail, 18 omitted
        assert!(out.starts_with("abcdef"));
        assert!(out.ends_with("yz"));
        assert!(out.contains("[... 18 characters omitted ...]"));
        assert_eq!(t.kept_chars, 8);
    }

    #[test]
    fn multibyte_characters_are_never_split() {
        let text = "é".repeat(50) + &"日本".repeat(50);
        let (out, t) = truncate(&text, 21, TruncationStrategy::HeadAndTail);
        assert!(t.truncated);
        assert!(out.starts_with(&"é".repeat(16)));
        assert!(out.ends_with("本日本日本"));
    }

    #[test]
    fn truncation_is_deterministic() {
        let text = "lorem ipsum ".repeat(1000);
        let a = truncate(&text, 500, TruncationStrategy::HeadAndTail);
        let b = truncate(&text, 500, TruncationStrategy::HeadAndTail);
        assert_eq!(a, b);
    }
}
