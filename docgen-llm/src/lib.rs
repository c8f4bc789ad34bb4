//! Provider-agnostic LLM invocation for the docgen engine.
//!
//! One [`LlmGateway`] call interface over Gemini, OpenAI, and Anthropic
//! with JSON-mode support, Gemini model fallback on transient overload,
//! per-call usage accounting, and an observability sink. The speech and
//! image collaborator contracts live here too, next to their Gemini REST
//! implementations.

pub mod fallback;
pub mod gateway;
pub mod image;
pub mod keys;
pub mod providers;
pub mod speech;
pub mod testing;
pub mod usage;

pub use fallback::{DEFAULT_GEMINI_FALLBACK_MODELS, build_model_list, is_transient_message};
pub use gateway::{CallUsage, HttpLlmGateway, LlmCallOutcome, LlmCallRequest, LlmGateway, ObservabilitySink, TracingSink};
pub use image::{DEFAULT_IMAGE_MODEL, FALLBACK_IMAGE_MODEL, GeminiImageModel, ImageModel, ImageRequest};
pub use keys::ScopedApiKey;
pub use speech::{GeminiSpeech, SpeechRequest, SpeechSynthesizer};
pub use usage::{LlmCall, UsageRegistry, UsageSnapshot};
