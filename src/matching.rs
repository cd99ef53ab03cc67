use once_cell::sync::Lazy;
use regex::Regex;

static RE_ACTION_PATH: Lazy<Regex> = Lazy::new(|| Regex::new(r"^[A-Za-z0-9_\-*/.]+$").unwrap());

// Uppercase delimiter that splits one textContains line into several required parts.
static RE_TEXT_DELIMITER: Lazy<Regex> = Lazy::new(|| Regex::new(r"\s+AND\s+").unwrap());

/// The turn a test step performs, parsed from its action mini-syntax.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TurnAction {
    /// `#path`
    Postback(String),
    /// `>/path`
    QuickReply(String),
    /// `>title`
    QuickReplyText(String),
    Text(String),
}

impl TurnAction {
    pub fn parse(action: &str) -> Self {
        if let Some(path) = action.strip_prefix('#') {
            return TurnAction::Postback(path.trim().to_string());
        }
        if let Some(rest) = action.strip_prefix('>') {
            if rest.starts_with('/') {
                return TurnAction::QuickReply(rest.trim().to_string());
            }
            return TurnAction::QuickReplyText(rest.trim().to_string());
        }
        TurnAction::Text(action.to_string())
    }
}

pub fn is_action_path(value: &str) -> bool {
    RE_ACTION_PATH.is_match(value)
}

/// Lowercases and joins alphanumeric runs with dashes.
pub fn tokenize(value: &str) -> String {
    value
        .to_lowercase()
        .split(|c: char| !c.is_alphanumeric())
        .filter(|part| !part.is_empty())
        .collect::<Vec<_>>()
        .join("-")
}

pub fn normalize_path(path: &str) -> String {
    let trimmed = path.trim().trim_end_matches('/');
    if trimmed.starts_with('/') {
        trimmed.to_string()
    } else {
        format!("/{trimmed}")
    }
}

/// Matches an action path against an expectation.
///
/// `*` matches one segment, a trailing `*` matches the rest of the path. An
/// expectation without a leading slash may match the tail of a nested path.
pub fn action_matches(expected: &str, actual: &str) -> bool {
    let expected = expected.trim();
    if expected.is_empty() {
        return false;
    }
    if expected == "*" {
        return true;
    }

    let want: Vec<&str> = segments(expected);
    let have: Vec<&str> = segments(actual);

    if expected.starts_with('/') {
        return segments_match(&want, &have);
    }

    (0..=have.len().saturating_sub(1)).any(|start| segments_match(&want, &have[start..]))
}

fn segments(path: &str) -> Vec<&str> {
    path.trim()
        .split('/')
        .filter(|segment| !segment.is_empty())
        .collect()
}

fn segments_match(want: &[&str], have: &[&str]) -> bool {
    match (want.split_first(), have.split_first()) {
        (None, None) => true,
        (Some((&"*", rest)), _) if rest.is_empty() => true,
        (Some((w, want_rest)), Some((h, have_rest))) => {
            (*w == "*" || w.eq_ignore_ascii_case(h)) && segments_match(want_rest, have_rest)
        }
        _ => false,
    }
}

/// Splits a `passedAction` cell into accepted alternatives, tokenizing anything
/// that is not a bare action path.
pub fn passed_action_alternatives(value: &str) -> Vec<String> {
    value
        .lines()
        .map(str::trim)
        .filter(|line| !line.is_empty())
        .map(|line| {
            if is_action_path(line) {
                line.to_string()
            } else {
                tokenize(line)
            }
        })
        .collect()
}

/// Non-empty lines of an expectation cell, optionally split on ` AND `.
pub fn required_parts(value: &str, split_delimiter: bool) -> Vec<String> {
    value
        .lines()
        .flat_map(|line| {
            if split_delimiter {
                RE_TEXT_DELIMITER.split(line).map(str::to_string).collect::<Vec<_>>()
            } else {
                vec![line.to_string()]
            }
        })
        .map(|part| part.trim().to_string())
        .filter(|part| !part.is_empty())
        .collect()
}

/// Case-insensitive containment with collapsed whitespace.
pub fn text_contains(haystack: &str, needle: &str) -> bool {
    collapse(haystack).contains(&collapse(needle))
}

fn collapse(value: &str) -> String {
    value
        .split_whitespace()
        .collect::<Vec<_>>()
        .join(" ")
        .to_lowercase()
}
