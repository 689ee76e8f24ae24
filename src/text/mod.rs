// Small text helpers shared by retrieval and the chat loop


use fancy_regex::Regex;
use std::sync::LazyLock;
use thiserror::Error;

/// Shortest question the chat loop will send
pub const MIN_QUERY_LENGTH: usize = 3;
/// Longest question the chat loop will send
pub const MAX_QUERY_LENGTH: usize = 500;

static WHITESPACE_REGEX: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\s+").expect("valid regex"));

static DISALLOWED_CHARS_REGEX: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"[^\w\s\-.,:;!?()]").expect("valid regex"));

static TECHNIQUE_ID_REGEX: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?i)T\d{4}(?:\.\d{3})?").expect("valid regex"));

static UNSAFE_PATTERNS: LazyLock<Vec<Regex>> = LazyLock::new(|| {
    [
        r"(?i)<script.*?>.*?</script>",
        r"(?i)javascript:",
        r"(?i)data:text/html",
        r"(?i)eval\s*\(",
        r"(?i)exec\s*\(",
    ]
    .into_iter()
    .map(|pattern| Regex::new(pattern).expect("valid regex"))
    .collect()
});

/// Why a chat input was not sent to the model
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum QueryRejection {
    #[error("Query cannot be empty.")]
    Empty,
    #[error("Query too short. Minimum {0} characters required.")]
    TooShort(usize),
    #[error("Query too long. Maximum {0} characters allowed.")]
    TooLong(usize),
    #[error("Query contains potentially unsafe content.")]
    Unsafe,
}

/// Collapse whitespace runs and drop characters outside word characters,
/// whitespace and basic punctuation
#[inline]
pub fn clean_text(text: &str) -> String {
    let collapsed = WHITESPACE_REGEX.replace_all(text, " ");
    DISALLOWED_CHARS_REGEX
        .replace_all(&collapsed, "")
        .trim()
        .to_string()
}

/// First ATT&CK technique id in `text`, upper-cased (`t1059.001` -> `T1059.001`)
#[inline]
pub fn extract_technique_id(text: &str) -> Option<String> {
    TECHNIQUE_ID_REGEX
        .find(text)
        .ok()
        .flatten()
        .map(|m| m.as_str().to_uppercase())
}

/// Cut `text` to at most `max_length` characters, preferring the last space
/// before the limit and appending `suffix` when anything was removed
#[inline]
pub fn truncate_text(text: &str, max_length: usize, suffix: &str) -> String {
    if text.chars().count() <= max_length {
        return text.to_string();
    }

    let suffix_len = suffix.chars().count();
    if suffix_len >= max_length {
        return text.chars().take(max_length).collect();
    }

    let head: String = text.chars().take(max_length - suffix_len).collect();
    let kept = head
        .rsplit_once(' ')
        .map_or(head.as_str(), |(before, _)| before);

    format!("{}{}", kept, suffix)
}

/// Basic sanity checks on a chat question. Lengths are counted in characters
/// after trimming.
#[inline]
pub fn validate_query(
    query: &str,
    min_length: usize,
    max_length: usize,
) -> Result<(), QueryRejection> {
    let query = query.trim();
    if query.is_empty() {
        return Err(QueryRejection::Empty);
    }

    let length = query.chars().count();
    if length < min_length {
        return Err(QueryRejection::TooShort(min_length));
    }
    if length > max_length {
        return Err(QueryRejection::TooLong(max_length));
    }

    if UNSAFE_PATTERNS
        .iter()
        .any(|pattern| pattern.is_match(query).unwrap_or(true))
    {
        return Err(QueryRejection::Unsafe);
    }

    Ok(())
}
