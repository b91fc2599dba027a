//! Response normalisation: raw model text into a typed payload.
//!
//! Small models do not always follow formatting instructions. The rules
//! here are deterministic and run in a fixed order:
//!
//! 1. Normalise line endings (CRLF → LF)
//! 2. Strip an outer markdown fence the model added despite the prompt
//! 3. Remove invisible Unicode (zero-width spaces, BOM, soft hyphens)
//! 4. Trim surrounding whitespace
//!
//! Key-point replies are then parsed against the fixed
//! [`KEY_POINT_FORMAT`](crate::prompts::KEY_POINT_FORMAT). Anything that
//! does not match is malformed output; there is no best-effort fallback.

use once_cell::sync::Lazy;
use regex::Regex;
use std::collections::HashSet;
use thiserror::Error;

/// The model replied, but not in a shape we can use.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("malformed model output: {0}")]
pub struct MalformedOutput(pub String);

static RE_OUTER_FENCE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?s)^```[A-Za-z0-9_-]*\n(.*?)\n?```$").unwrap());

static RE_KEY_POINT: Lazy<Regex> = Lazy::new(|| Regex::new(r"^(\d+)\.\s+(\S.*)$").unwrap());

/// Apply the cleanup rules shared by every task.
pub fn normalise(raw: &str) -> String {
    let s = raw.replace("\r\n", "\n").replace('\r', "\n");
    let s = strip_outer_fence(s.trim());
    let s = s.replace(
        [
            '\u{200B}', '\u{FEFF}', '\u{00AD}', '\u{200C}', '\u{200D}', '\u{2060}',
        ],
        "",
    );
    s.trim().to_string()
}

fn strip_outer_fence(input: &str) -> String {
    match RE_OUTER_FENCE.captures(input) {
        Some(caps) => caps[1].to_string(),
        None => input.to_string(),
    }
}

/// Parse a summary or free-form analysis reply.
pub fn parse_text(raw: &str) -> Result<String, MalformedOutput> {
    let text = normalise(raw);
    if text.is_empty() {
        return Err(MalformedOutput("model returned empty output".into()));
    }
    Ok(text)
}

/// Parse a key-point reply into an ordered list of at most `num_points`.
///
/// Every non-empty line must read `N. <point>` with `N` counting up from 1.
/// Case-insensitive duplicates are dropped before the list is cut to
/// `num_points`.
pub fn parse_key_points(raw: &str, num_points: u32) -> Result<Vec<String>, MalformedOutput> {
    let text = normalise(raw);
    let mut points = Vec::new();
    let mut seen = HashSet::new();
    let mut expected = 1u32;

    for line in text.lines().map(str::trim).filter(|l| !l.is_empty()) {
        let caps = RE_KEY_POINT.captures(line).ok_or_else(|| {
            MalformedOutput(format!(
                "line {expected} is not a numbered key point: {:?}",
                excerpt(line)
            ))
        })?;
        let number: u32 = caps[1].parse().unwrap_or(0);
        if number != expected {
            return Err(MalformedOutput(format!(
                "key point numbered {number}, expected {expected}"
            )));
        }
        expected += 1;

        let point = caps[2].trim();
        if seen.insert(point.to_lowercase()) {
            points.push(point.to_string());
        }
    }

    if points.is_empty() {
        return Err(MalformedOutput("no key points found in model output".into()));
    }
    points.truncate(num_points as usize);
    Ok(points)
}

fn excerpt(line: &str) -> String {
    if line.chars().count() <= 60 {
        line.to_string()
    } else {
        let cut: String = line.chars().take(60).collect();
        format!("{cut}…")
    }
}
