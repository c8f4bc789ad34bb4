use async_trait::async_trait;
use base64::Engine;
use docgen_core::{DocgenError, Result};
use serde_json::json;
use std::time::Duration;

const GEMINI_BASE_URL: &str = "https://generativelanguage.googleapis.com/v1beta";
const DEFAULT_TTS_MODEL: &str = "gemini-2.5-flash-preview-tts";

/// One synthesis request: a `Speaker: text` transcript plus the
/// speaker-name → voice-name map.
#[derive(Debug, Clone)]
pub struct SpeechRequest {
    pub transcript: String,
    pub voices: Vec<(String, String)>,
    pub api_key: String,
}

/// Text-to-speech collaborator contract.
///
/// Implementations return raw PCM (1 channel, 24 kHz, 16-bit); WAV
/// framing and retry policy belong to the caller.
#[async_trait]
pub trait SpeechSynthesizer: Send + Sync {
    async fn synthesize(&self, req: SpeechRequest) -> Result<Vec<u8>>;
}

/// Gemini multi-speaker TTS over REST.
pub struct GeminiSpeech {
    client: reqwest::Client,
    model: String,
    timeout: Duration,
}

impl GeminiSpeech {
    pub fn new() -> Self {
        Self {
            client: reqwest::Client::new(),
            model: DEFAULT_TTS_MODEL.into(),
            timeout: Duration::from_secs(300),
        }
    }

    pub fn with_model(mut self, model: impl Into<String>) -> Self {
        self.model = model.into();
        self
    }
}

impl Default for GeminiSpeech {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl SpeechSynthesizer for GeminiSpeech {
    async fn synthesize(&self, req: SpeechRequest) -> Result<Vec<u8>> {
        let speaker_voice_configs: Vec<_> = req
            .voices
            .iter()
            .map(|(speaker, voice)| {
                json!({
                    "speaker": speaker,
                    "voiceConfig": {"prebuiltVoiceConfig": {"voiceName": voice}},
                })
            })
            .collect();
        let body = json!({
            "contents": [{"role": "user", "parts": [{"text": req.transcript}]}],
            "generationConfig": {
                "responseModalities": ["AUDIO"],
                "speechConfig": {
                    "multiSpeakerVoiceConfig": {"speakerVoiceConfigs": speaker_voice_configs}
                },
            },
        });
        let url =
            format!("{GEMINI_BASE_URL}/models/{}:generateContent?key={}", self.model, req.api_key);

        let response = self
            .client
            .post(&url)
            .timeout(self.timeout)
            .json(&body)
            .send()
            .await
            .map_err(|e| DocgenError::Internal(format!("TTS request failed: {e}")))?;
        let status = response.status().as_u16();
        let text = response
            .text()
            .await
            .map_err(|e| DocgenError::Internal(format!("TTS response read failed: {e}")))?;
        if !(200..300).contains(&status) {
            return Err(DocgenError::Internal(format!("TTS error {status}: {text}")));
        }

        let value: serde_json::Value = serde_json::from_str(&text)?;
        let encoded = value["candidates"][0]["content"]["parts"][0]["inlineData"]["data"]
            .as_str()
            .ok_or_else(|| DocgenError::Internal("TTS response carried no audio".into()))?;
        base64::engine::general_purpose::STANDARD
            .decode(encoded)
            .map_err(|e| DocgenError::Internal(format!("TTS audio decode failed: {e}")))
    }
}
