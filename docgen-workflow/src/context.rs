use crate::parsers::{ParserRegistry, WebParser};
use crate::render::RendererRegistry;
use docgen_cache::{CacheStore, SessionStorage};
use docgen_core::Settings;
use docgen_llm::{
    GeminiImageModel, GeminiSpeech, HttpLlmGateway, ImageModel, LlmGateway, SpeechSynthesizer,
    UsageRegistry,
};
use std::sync::Arc;

/// Shared collaborators handed to every node.
///
/// One context serves many concurrent executions; everything here is
/// either immutable or internally synchronized.
pub struct WorkflowContext {
    pub gateway: Arc<dyn LlmGateway>,
    pub image_model: Arc<dyn ImageModel>,
    pub speech: Arc<dyn SpeechSynthesizer>,
    pub cache: Arc<CacheStore>,
    pub storage: Arc<SessionStorage>,
    pub usage: Arc<UsageRegistry>,
    pub parsers: ParserRegistry,
    pub web: WebParser,
    pub renderers: RendererRegistry,
    pub settings: Settings,
}

impl WorkflowContext {
    /// Production wiring: REST providers, default parser and renderer
    /// registries, filesystem-backed cache and storage.
    pub fn new(settings: Settings) -> Self {
        let usage = Arc::new(UsageRegistry::new());
        Self {
            gateway: Arc::new(
                HttpLlmGateway::new(usage.clone())
                    .with_timeout(std::time::Duration::from_secs(settings.provider_timeout_secs)),
            ),
            image_model: Arc::new(GeminiImageModel::new()),
            speech: Arc::new(GeminiSpeech::new()),
            cache: Arc::new(CacheStore::new(&settings.output_root, &settings.cache_root)),
            storage: Arc::new(SessionStorage::new(&settings.output_root)),
            usage,
            parsers: ParserRegistry::new(),
            web: WebParser::new(),
            renderers: RendererRegistry::new(),
            settings,
        }
    }

    /// Custom wiring, used by tests and embedders.
    #[allow(clippy::too_many_arguments)]
    pub fn with_collaborators(
        settings: Settings,
        gateway: Arc<dyn LlmGateway>,
        image_model: Arc<dyn ImageModel>,
        speech: Arc<dyn SpeechSynthesizer>,
        usage: Arc<UsageRegistry>,
        renderers: RendererRegistry,
    ) -> Self {
        Self {
            gateway,
            image_model,
            speech,
            cache: Arc::new(CacheStore::new(&settings.output_root, &settings.cache_root)),
            storage: Arc::new(SessionStorage::new(&settings.output_root)),
            usage,
            parsers: ParserRegistry::new(),
            web: WebParser::new(),
            renderers,
            settings,
        }
    }
}
