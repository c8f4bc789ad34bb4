//! Gemini model fallback policy.

/// Fallback models tried in order when the caller's model is overloaded.
pub const DEFAULT_GEMINI_FALLBACK_MODELS: &[&str] = &[
    "gemini-2.5-flash",
    "gemini-2.5-pro",
    "gemini-3-flash-preview",
    "gemini-3-pro-preview",
];

/// Substrings marking a provider error as transient (worth a fallback).
const TRANSIENT_PATTERNS: &[&str] = &["503", "overload", "unavailable", "capacity"];

/// Case-insensitive transient classification.
pub fn is_transient_message(message: &str) -> bool {
    let lower = message.to_lowercase();
    TRANSIENT_PATTERNS.iter().any(|p| lower.contains(p))
}

/// Ordered, deduplicated model list: the caller's model first, then the
/// curated defaults.
pub fn build_model_list(preferred: &str, fallbacks: &[&str]) -> Vec<String> {
    let mut models = Vec::new();
    let mut push = |model: &str| {
        if !model.is_empty() && !models.iter().any(|m| m == model) {
            models.push(model.to_string());
        }
    };
    push(preferred);
    for model in fallbacks {
        push(model);
    }
    models
}
