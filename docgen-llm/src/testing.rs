//! Scripted collaborator doubles shared by downstream crate tests.

use crate::gateway::{CallUsage, LlmCallOutcome, LlmCallRequest, LlmGateway};
use crate::image::{ImageModel, ImageRequest};
use crate::speech::{SpeechRequest, SpeechSynthesizer};
use crate::usage::{LlmCall, UsageRegistry};
use async_trait::async_trait;
use chrono::Utc;
use docgen_core::{DocgenError, Result};
use std::collections::VecDeque;
use std::sync::{Arc, Mutex};
use std::time::Duration;

/// Gateway that replays a fixed script of responses, recording every
/// request it sees. A `Err(LlmTransient)` entry exercises fallback paths.
pub struct ScriptedGateway {
    script: Mutex<VecDeque<Result<String>>>,
    requests: Mutex<Vec<LlmCallRequest>>,
    usage: Option<Arc<UsageRegistry>>,
}

impl ScriptedGateway {
    pub fn new(responses: Vec<Result<String>>) -> Self {
        Self {
            script: Mutex::new(responses.into_iter().collect()),
            requests: Mutex::new(Vec::new()),
            usage: None,
        }
    }

    /// Convenience constructor: every entry succeeds.
    pub fn replying(responses: &[&str]) -> Self {
        Self::new(responses.iter().map(|r| Ok(r.to_string())).collect())
    }

    /// Mirror calls into a usage registry like the real gateway does.
    pub fn with_usage(mut self, usage: Arc<UsageRegistry>) -> Self {
        self.usage = Some(usage);
        self
    }

    pub fn requests(&self) -> Vec<LlmCallRequest> {
        self.requests.lock().unwrap().clone()
    }

    pub fn call_count(&self) -> usize {
        self.requests.lock().unwrap().len()
    }
}

#[async_trait]
impl LlmGateway for ScriptedGateway {
    async fn complete(&self, req: LlmCallRequest) -> Result<LlmCallOutcome> {
        self.requests.lock().unwrap().push(req.clone());
        if let Some(usage) = &self.usage {
            usage.record(LlmCall {
                step_name: req.step_name.clone(),
                provider: req.provider.as_str().to_string(),
                model: req.model.clone(),
                prompt_digest: String::new(),
                response_digest: String::new(),
                input_tokens: None,
                output_tokens: None,
                duration_ms: 0,
                timestamp: Utc::now(),
            });
        }
        let next = self.script.lock().unwrap().pop_front();
        match next {
            Some(Ok(text)) => Ok(LlmCallOutcome {
                text,
                model_used: req.model,
                usage: CallUsage::default(),
            }),
            Some(Err(e)) => Err(e),
            None => Err(DocgenError::Internal("scripted gateway exhausted".into())),
        }
    }
}

/// Image model returning fixed bytes; optionally fails the first N calls.
pub struct StubImageModel {
    bytes: Vec<u8>,
    failures_remaining: Mutex<u32>,
}

impl StubImageModel {
    pub fn new(bytes: Vec<u8>) -> Self {
        Self { bytes, failures_remaining: Mutex::new(0) }
    }

    pub fn failing_first(self, failures: u32) -> Self {
        *self.failures_remaining.lock().unwrap() = failures;
        self
    }
}

#[async_trait]
impl ImageModel for StubImageModel {
    async fn generate(&self, _req: ImageRequest, _timeout: Duration) -> Result<Vec<u8>> {
        let mut failures = self.failures_remaining.lock().unwrap();
        if *failures > 0 {
            *failures -= 1;
            return Err(DocgenError::LlmTransient("image model unavailable".into()));
        }
        Ok(self.bytes.clone())
    }

    async fn edit(&self, req: ImageRequest, timeout: Duration) -> Result<Vec<u8>> {
        self.generate(req, timeout).await
    }
}

/// Synthesizer producing `frames` frames of silence (16-bit mono PCM).
pub struct StubSpeech {
    pub frames: usize,
    failures_remaining: Mutex<u32>,
}

impl StubSpeech {
    pub fn new(frames: usize) -> Self {
        Self { frames, failures_remaining: Mutex::new(0) }
    }

    pub fn failing_first(self, failures: u32) -> Self {
        *self.failures_remaining.lock().unwrap() = failures;
        self
    }
}

#[async_trait]
impl SpeechSynthesizer for StubSpeech {
    async fn synthesize(&self, _req: SpeechRequest) -> Result<Vec<u8>> {
        let mut failures = self.failures_remaining.lock().unwrap();
        if *failures > 0 {
            *failures -= 1;
            return Err(DocgenError::LlmTransient("TTS 500 internal".into()));
        }
        Ok(vec![0u8; self.frames * 2])
    }
}
