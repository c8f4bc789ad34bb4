use std::path::PathBuf;

const DEFAULT_MAX_INLINE_PREVIEW_BYTES: u64 = 8 * 1024 * 1024;

/// Engine configuration, loaded from environment variables with defaults.
#[derive(Debug, Clone)]
pub struct Settings {
    /// Root directory for per-session outputs.
    pub output_root: PathBuf,
    /// Root directory for per-artifact cache manifest entries.
    pub cache_root: PathBuf,
    /// Content at or below this length is summarized in one call.
    pub single_chunk_limit: usize,
    /// Upper bound per chunk when map-reduce summarization kicks in.
    pub chunk_limit: usize,
    /// Retry budget for the generate/validate pair.
    pub max_retries: u32,
    /// Slide count requested from the model for slide-capable artifacts.
    pub max_slides: u32,
    /// Attempts for slide-structure generation before surfacing an error.
    pub max_slide_attempts: u32,
    /// Per-call provider timeout.
    pub provider_timeout_secs: u64,
    /// Hard ceiling for high-quality image model calls before fallback.
    pub image_timeout_secs: u64,
    /// Cache-hit responses above this size omit the inline base64 preview.
    pub max_inline_preview_bytes: u64,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            output_root: PathBuf::from("data/output"),
            cache_root: PathBuf::from("data/cache"),
            single_chunk_limit: 50_000,
            chunk_limit: 40_000,
            max_retries: 3,
            max_slides: 10,
            max_slide_attempts: 3,
            provider_timeout_secs: 120,
            image_timeout_secs: 180,
            max_inline_preview_bytes: DEFAULT_MAX_INLINE_PREVIEW_BYTES,
        }
    }
}

impl Settings {
    /// Load settings from the environment, falling back to defaults.
    ///
    /// Recognized variables:
    /// - `DOCGEN_OUTPUT_ROOT`, `DOCGEN_CACHE_ROOT`
    /// - `DOCGEN_MAX_INLINE_PREVIEW_BYTES` (integer ≥ 0)
    pub fn from_env() -> Self {
        let mut settings = Self::default();
        if let Ok(root) = std::env::var("DOCGEN_OUTPUT_ROOT") {
            settings.output_root = PathBuf::from(root);
        }
        if let Ok(root) = std::env::var("DOCGEN_CACHE_ROOT") {
            settings.cache_root = PathBuf::from(root);
        }
        if let Ok(raw) = std::env::var("DOCGEN_MAX_INLINE_PREVIEW_BYTES") {
            match raw.parse::<i64>() {
                Ok(value) => settings.max_inline_preview_bytes = value.max(0) as u64,
                Err(_) => {
                    tracing::warn!(value = %raw, "invalid DOCGEN_MAX_INLINE_PREVIEW_BYTES, using default");
                }
            }
        }
        settings
    }

    pub fn with_output_root(mut self, root: impl Into<PathBuf>) -> Self {
        self.output_root = root.into();
        self
    }

    pub fn with_cache_root(mut self, root: impl Into<PathBuf>) -> Self {
        self.cache_root = root.into();
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let settings = Settings::default();
        assert_eq!(settings.max_retries, 3);
        assert_eq!(settings.max_inline_preview_bytes, 8 * 1024 * 1024);
        assert!(settings.chunk_limit < settings.single_chunk_limit);
    }

    #[test]
    fn test_builder_overrides() {
        let settings = Settings::default().with_output_root("/tmp/out").with_cache_root("/tmp/cache");
        assert_eq!(settings.output_root, PathBuf::from("/tmp/out"));
        assert_eq!(settings.cache_root, PathBuf::from("/tmp/cache"));
    }
}
