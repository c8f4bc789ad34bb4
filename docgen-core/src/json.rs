//! Lenient JSON extraction from model output.
//!
//! Providers occasionally wrap JSON in fenced code blocks or surround it
//! with prose even in JSON mode, so every caller of a JSON-mode response
//! goes through [`safe_json_parse`].

use serde_json::Value;

/// Strip a leading ```` ```json ```` or ```` ``` ```` fence and a trailing
/// ```` ``` ```` fence.
fn clean_markdown_fences(text: &str) -> &str {
    let mut cleaned = text.trim();
    if let Some(rest) = cleaned.strip_prefix("```json") {
        cleaned = rest;
    } else if let Some(rest) = cleaned.strip_prefix("```") {
        cleaned = rest;
    }
    if let Some(rest) = cleaned.strip_suffix("```") {
        cleaned = rest;
    }
    cleaned.trim()
}

/// Extract the first balanced `{…}` substring, respecting string and
/// escape state, and parse it.
fn extract_balanced_object(text: &str) -> Option<Value> {
    let start = text.find('{')?;
    let bytes = text.as_bytes();
    let mut depth = 0usize;
    let mut in_string = false;
    let mut escaped = false;

    for (offset, &byte) in bytes[start..].iter().enumerate() {
        if escaped {
            escaped = false;
            continue;
        }
        match byte {
            b'\\' => escaped = true,
            b'"' => in_string = !in_string,
            b'{' if !in_string => depth += 1,
            b'}' if !in_string => {
                depth -= 1;
                if depth == 0 {
                    let candidate = &text[start..start + offset + 1];
                    return serde_json::from_str(candidate).ok();
                }
            }
            _ => {}
        }
    }
    None
}

/// Parse model output as a JSON object with fallback strategies.
///
/// 1. Strict parse.
/// 2. Strip markdown fences, parse again.
/// 3. Extract the first balanced object and parse that.
///
/// Returns `None` when no strategy yields valid JSON.
pub fn safe_json_parse(text: &str) -> Option<Value> {
    if text.trim().is_empty() {
        return None;
    }
    if let Ok(value) = serde_json::from_str::<Value>(text) {
        return Some(value);
    }
    if let Ok(value) = serde_json::from_str::<Value>(clean_markdown_fences(text)) {
        return Some(value);
    }
    extract_balanced_object(text)
}
