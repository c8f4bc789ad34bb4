use thiserror::Error;

/// Workspace-wide result alias.
pub type Result<T> = std::result::Result<T, DocgenError>;

/// Unified error type for the generation engine.
///
/// Node implementations never let these cross the node boundary as `Err`;
/// they record the message in `WorkflowState::errors` and return normally.
/// The variants exist so collaborators (parsers, providers, renderers) can
/// propagate failures with `?` up to the node edge, where they are
/// classified into a stable [`ErrorCode`].
#[derive(Debug, Error)]
pub enum DocgenError {
    /// Source type the engine refuses to ingest (e.g. spreadsheets).
    #[error("unsupported source: {0}")]
    UnsupportedSource(String),

    /// An external parser refused the input or raised internally.
    #[error("parse failed: {0}")]
    ParseFailed(String),

    /// No credentials or provider client available for a mandatory call.
    #[error("LLM unavailable: {0}")]
    LlmUnavailable(String),

    /// Provider-side transient failure (overload, 503); candidate for
    /// model fallback inside the gateway.
    #[error("LLM transient error: {0}")]
    LlmTransient(String),

    /// The render step produced no file.
    #[error("Generation failed: {0}")]
    GenerationFailed(String),

    /// The rendered file exists but is empty or has the wrong extension.
    #[error("Validation failed: {0}")]
    ValidationFailed(String),

    /// Missing or invalid API key for the selected provider.
    #[error("missing or invalid API key: {0}")]
    Auth(String),

    /// Client disconnected or explicit cancel.
    #[error("cancelled")]
    Cancelled,

    /// Cache or manifest store failure.
    #[error("cache error: {0}")]
    Cache(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("serialization error: {0}")]
    Json(#[from] serde_json::Error),

    /// Anything uncaught or unexpected.
    #[error("internal error: {0}")]
    Internal(String),
}

/// Stable error codes surfaced to callers in terminal `Error` events.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorCode {
    UnsupportedSource,
    ParseFailed,
    LlmUnavailable,
    LlmTransient,
    GenerationFailed,
    ValidationFailed,
    Auth,
    Cancelled,
    Internal,
}

impl ErrorCode {
    pub fn as_str(&self) -> &'static str {
        match self {
            ErrorCode::UnsupportedSource => "UNSUPPORTED_SOURCE",
            ErrorCode::ParseFailed => "PARSE_FAILED",
            ErrorCode::LlmUnavailable => "LLM_UNAVAILABLE",
            ErrorCode::LlmTransient => "LLM_TRANSIENT",
            ErrorCode::GenerationFailed => "GENERATION_FAILED",
            ErrorCode::ValidationFailed => "VALIDATION_FAILED",
            ErrorCode::Auth => "AUTH",
            ErrorCode::Cancelled => "CANCELLED",
            ErrorCode::Internal => "INTERNAL",
        }
    }
}

impl std::fmt::Display for ErrorCode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl DocgenError {
    /// The stable code for this error.
    pub fn code(&self) -> ErrorCode {
        match self {
            DocgenError::UnsupportedSource(_) => ErrorCode::UnsupportedSource,
            DocgenError::ParseFailed(_) => ErrorCode::ParseFailed,
            DocgenError::LlmUnavailable(_) => ErrorCode::LlmUnavailable,
            DocgenError::LlmTransient(_) => ErrorCode::LlmTransient,
            DocgenError::GenerationFailed(_) => ErrorCode::GenerationFailed,
            DocgenError::ValidationFailed(_) => ErrorCode::ValidationFailed,
            DocgenError::Auth(_) => ErrorCode::Auth,
            DocgenError::Cancelled => ErrorCode::Cancelled,
            DocgenError::Cache(_)
            | DocgenError::Io(_)
            | DocgenError::Json(_)
            | DocgenError::Internal(_) => ErrorCode::Internal,
        }
    }

    /// True when the gateway should try the next model in its fallback
    /// list rather than aborting.
    pub fn is_transient(&self) -> bool {
        matches!(self, DocgenError::LlmTransient(_))
    }
}

/// Classify an error message recorded in `WorkflowState::errors` as
/// retryable for the `generate_output ↔ validate_output` retry pair.
///
/// Matches the message prefixes those nodes produce; parse and ingest
/// failures never match.
pub fn is_retryable_message(message: &str) -> bool {
    message.contains("Generation failed") || message.contains("Validation failed")
}

/// Derive the terminal error code from the last recorded error message.
pub fn classify_message(message: &str) -> ErrorCode {
    let lower = message.to_lowercase();
    if lower.contains("not supported") || lower.contains("unsupported") {
        ErrorCode::UnsupportedSource
    } else if message.contains("Generation failed") {
        ErrorCode::GenerationFailed
    } else if message.contains("Validation failed") {
        ErrorCode::ValidationFailed
    } else if lower.contains("parse") || lower.contains("no sources") {
        ErrorCode::ParseFailed
    } else if lower.contains("api key") {
        ErrorCode::Auth
    } else if lower.contains("llm") || lower.contains("model") {
        ErrorCode::LlmUnavailable
    } else {
        ErrorCode::Internal
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_codes_are_stable_strings() {
        assert_eq!(DocgenError::UnsupportedSource("xlsx".into()).code().as_str(), "UNSUPPORTED_SOURCE");
        assert_eq!(DocgenError::GenerationFailed("no file".into()).code().as_str(), "GENERATION_FAILED");
        assert_eq!(DocgenError::Cancelled.code().as_str(), "CANCELLED");
        assert_eq!(DocgenError::Cache("broken".into()).code().as_str(), "INTERNAL");
    }

    #[test]
    fn test_retryable_messages() {
        assert!(is_retryable_message("Generation failed: renderer produced no file"));
        assert!(is_retryable_message("Validation failed: empty file"));
        assert!(!is_retryable_message("parse failed: bad pdf"));
        assert!(!is_retryable_message("Excel files are not supported."));
    }

    #[test]
    fn test_classify_message() {
        assert_eq!(classify_message("Excel files are not supported."), ErrorCode::UnsupportedSource);
        assert_eq!(classify_message("Validation failed: wrong extension"), ErrorCode::ValidationFailed);
        assert_eq!(classify_message("Generation failed: renderer error"), ErrorCode::GenerationFailed);
        assert_eq!(classify_message("something odd"), ErrorCode::Internal);
    }
}
