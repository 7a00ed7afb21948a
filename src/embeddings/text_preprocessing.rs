//! Text preprocessing utilities for embedding generation
//!
//! Provides utilities for joining, cleaning and bounding product text before
//! it reaches an embedding provider.

use tracing::debug;

/// Join name and description into the text a product is classified by
pub fn classification_text(name: &str, description: &str) -> String {
    normalize_whitespace(&format!("{} {}", name.trim(), description.trim()))
}

/// Preprocess text for embedding generation
///
/// Returns `None` when nothing embeddable is left, which callers map to the
/// zero vector.
pub fn preprocess_text_for_embedding(text: &str, max_chars: usize) -> Option<String> {
    let sanitized = sanitize_text(&normalize_whitespace(text));
    if sanitized.is_empty() {
        return None;
    }

    let char_count = sanitized.chars().count();
    if char_count > max_chars {
        debug!(
            "Text too long ({} chars), truncating to {} chars",
            char_count, max_chars
        );
        return Some(smart_truncate_text(&sanitized, max_chars));
    }

    Some(sanitized)
}

/// Collapse every run of whitespace (newlines and tabs included) into one space
fn normalize_whitespace(text: &str) -> String {
    text.split_whitespace().collect::<Vec<&str>>().join(" ")
}

/// Replace control characters with spaces
fn sanitize_text(text: &str) -> String {
    text.chars()
        .map(|c| if c.is_control() { ' ' } else { c })
        .collect::<String>()
        .split_whitespace()
        .collect::<Vec<&str>>()
        .join(" ")
}

/// Truncate at a word boundary when one exists in the last fifth of the budget
fn smart_truncate_text(text: &str, max_chars: usize) -> String {
    let truncated: String = text.chars().take(max_chars).collect();
    match truncated.rfind(' ') {
        Some(pos) if pos >= truncated.len() * 4 / 5 => truncated[..pos].to_string(),
        _ => truncated,
    }
}
