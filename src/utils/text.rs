//! Small string helpers used when turning feed items into messages.
//!
//! All lengths are counted in `char`s, never bytes, so multi-byte text is
//! never split inside a code point.

/// Marker appended to text that was cut short.
pub const ELLIPSIS: &str = "...";

/// Truncate `text` to at most `limit` characters.
///
/// Text longer than `limit` keeps its first `limit - 3` characters followed by
/// [`ELLIPSIS`]. `None` and empty input yield an empty string.
pub fn truncate(text: Option<&str>, limit: usize) -> String {
    let Some(text) = text else {
        return String::new();
    };
    if text.chars().count() <= limit {
        return text.to_string();
    }
    let keep = limit.saturating_sub(ELLIPSIS.len());
    let mut out: String = text.chars().take(keep).collect();
    out.push_str(ELLIPSIS);
    out
}

/// Upper-case the first character (`"opened"` -> `"Opened"`).
pub fn capitalize(word: &str) -> String {
    let mut chars = word.chars();
    match chars.next() {
        Some(first) => first.to_uppercase().chain(chars).collect(),
        None => String::new(),
    }
}

/// First line of a (commit) message, without the trailing `\r`.
pub fn first_line(message: &str) -> &str {
    message
        .lines()
        .next()
        .map(|l| l.trim_end_matches('\r'))
        .unwrap_or("")
}

/// Abbreviated commit sha (7 characters, or fewer if the input is shorter).
pub fn short_sha(sha: &str) -> &str {
    match sha.char_indices().nth(7) {
        Some((idx, _)) => &sha[..idx],
        None => sha,
    }
}
