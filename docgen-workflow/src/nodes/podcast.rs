use crate::context::WorkflowContext;
use crate::prompts;
use async_trait::async_trait;
use base64::Engine;
use docgen_core::{
    DialogueLine, PodcastOutput, PodcastScript, Result, Speaker, StepGroup, WorkflowState,
    safe_json_parse,
};
use docgen_graph::{NodeContext, WorkflowNode};
use docgen_llm::{LlmCallRequest, SpeechRequest};
use rand::Rng;
use std::sync::Arc;

const SAMPLE_RATE: u32 = 24_000;
const SAMPLE_WIDTH: u16 = 2;
const CHANNELS: u16 = 1;
const MAX_TTS_ATTEMPTS: u32 = 3;

/// Wrap raw PCM into a WAV container (1 channel, 24 kHz, 16-bit).
pub fn wave_bytes(pcm: &[u8]) -> Vec<u8> {
    let byte_rate = SAMPLE_RATE * u32::from(CHANNELS) * u32::from(SAMPLE_WIDTH);
    let block_align = CHANNELS * SAMPLE_WIDTH;
    let data_len = pcm.len() as u32;

    let mut wav = Vec::with_capacity(44 + pcm.len());
    wav.extend_from_slice(b"RIFF");
    wav.extend_from_slice(&(36 + data_len).to_le_bytes());
    wav.extend_from_slice(b"WAVE");
    wav.extend_from_slice(b"fmt ");
    wav.extend_from_slice(&16u32.to_le_bytes());
    wav.extend_from_slice(&1u16.to_le_bytes()); // PCM
    wav.extend_from_slice(&CHANNELS.to_le_bytes());
    wav.extend_from_slice(&SAMPLE_RATE.to_le_bytes());
    wav.extend_from_slice(&byte_rate.to_le_bytes());
    wav.extend_from_slice(&block_align.to_le_bytes());
    wav.extend_from_slice(&(SAMPLE_WIDTH * 8).to_le_bytes());
    wav.extend_from_slice(b"data");
    wav.extend_from_slice(&data_len.to_le_bytes());
    wav.extend_from_slice(pcm);
    wav
}

fn is_transient_tts(message: &str) -> bool {
    let lower = message.to_lowercase();
    ["500", "internal", "overload", "unavailable"].iter().any(|p| lower.contains(p))
}

/// Generates the dialogue script from the extracted content.
pub struct GeneratePodcastScriptNode {
    ctx: Arc<WorkflowContext>,
}

impl GeneratePodcastScriptNode {
    pub fn new(ctx: Arc<WorkflowContext>) -> Self {
        Self { ctx }
    }
}

#[async_trait]
impl WorkflowNode for GeneratePodcastScriptNode {
    fn name(&self) -> &str {
        "generate_podcast_script"
    }

    fn step_group(&self) -> StepGroup {
        StepGroup::Transforming
    }

    async fn run(&self, state: &mut WorkflowState, ctx: &NodeContext) -> Result<()> {
        if !state.errors.is_empty() {
            return Ok(());
        }
        let content = state.effective_content().to_string();
        if content.trim().is_empty() {
            state.push_error("No content for podcast script");
            return Ok(());
        }
        ctx.emit_progress(StepGroup::Transforming, "Writing podcast script").await;

        let style = state.params.style.clone().unwrap_or_else(|| "conversational".into());
        let speakers = if state.params.speakers.is_empty() {
            Speaker::default_pair()
        } else {
            state.params.speakers.clone()
        };
        let duration = state.params.duration_minutes.unwrap_or(3);
        let source_count = state.meta_u64("source_count").unwrap_or(1);

        let outcome = self
            .ctx
            .gateway
            .complete(
                LlmCallRequest::new(
                    state.provider,
                    &state.model,
                    prompts::podcast_script_prompt(&content, &style, &speakers, duration, source_count),
                )
                .with_step_name("podcast_script")
                .with_api_key(&state.api_key)
                .with_max_output_tokens(4000)
                .with_temperature(0.7)
                .with_json_mode(true),
            )
            .await;

        let text = match outcome {
            Ok(outcome) => outcome.text,
            Err(e) => {
                state.push_error(format!("Script generation failed: {e}"));
                return Ok(());
            }
        };
        let Some(value) = safe_json_parse(&text) else {
            state.push_error("Failed to parse podcast script");
            return Ok(());
        };

        let dialogue: Vec<DialogueLine> =
            serde_json::from_value(value["dialogue"].clone()).unwrap_or_default();
        if dialogue.is_empty() {
            state.push_error("Podcast script contained no dialogue");
            return Ok(());
        }
        let script = PodcastScript {
            title: value["title"].as_str().unwrap_or("Podcast Episode").to_string(),
            description: value["description"].as_str().unwrap_or("").to_string(),
            dialogue,
        };
        tracing::info!(lines = script.dialogue.len(), "podcast script generated");
        state.podcast = Some(PodcastOutput { script, script_raw: text, ..Default::default() });
        Ok(())
    }
}

/// Synthesizes the dialogue via the TTS collaborator with bounded
/// exponential backoff on transient failures, then frames the PCM as WAV.
pub struct SynthesizePodcastAudioNode {
    ctx: Arc<WorkflowContext>,
}

impl SynthesizePodcastAudioNode {
    pub fn new(ctx: Arc<WorkflowContext>) -> Self {
        Self { ctx }
    }

    async fn synthesize_with_retry(&self, request: SpeechRequest) -> Result<Vec<u8>> {
        let mut last_error = None;
        for attempt in 0..MAX_TTS_ATTEMPTS {
            match self.ctx.speech.synthesize(request.clone()).await {
                Ok(pcm) => {
                    if attempt > 0 {
                        tracing::info!(attempt = attempt + 1, "TTS succeeded after retry");
                    }
                    return Ok(pcm);
                }
                Err(e) => {
                    let message = e.to_string();
                    if is_transient_tts(&message) && attempt + 1 < MAX_TTS_ATTEMPTS {
                        let factor: f64 = rand::rng().random_range(1.0..1.5);
                        let delay = f64::from(1u32 << attempt) * factor;
                        tracing::warn!(
                            attempt = attempt + 1,
                            delay_secs = delay,
                            error = %message,
                            "transient TTS error, backing off"
                        );
                        tokio::time::sleep(std::time::Duration::from_secs_f64(delay)).await;
                        last_error = Some(e);
                    } else {
                        return Err(e);
                    }
                }
            }
        }
        Err(last_error.expect("retry loop exits with an error"))
    }
}

#[async_trait]
impl WorkflowNode for SynthesizePodcastAudioNode {
    fn name(&self) -> &str {
        "synthesize_podcast_audio"
    }

    fn step_group(&self) -> StepGroup {
        StepGroup::GeneratingOutput
    }

    async fn run(&self, state: &mut WorkflowState, ctx: &NodeContext) -> Result<()> {
        if !state.errors.is_empty() {
            return Ok(());
        }
        let Some(podcast) = state.podcast.clone() else {
            state.push_error("No dialogue for audio synthesis");
            return Ok(());
        };
        let key = if !state.gemini_api_key.is_empty() {
            state.gemini_api_key.clone()
        } else {
            state.api_key.clone()
        };
        if key.is_empty() {
            state.push_error("Gemini API key required for TTS");
            return Ok(());
        }
        ctx.emit_progress(
            StepGroup::GeneratingOutput,
            format!("Synthesizing {} dialogue lines", podcast.script.dialogue.len()),
        )
        .await;

        let speakers = if state.params.speakers.is_empty() {
            Speaker::default_pair()
        } else {
            state.params.speakers.clone()
        };
        let transcript = podcast
            .script
            .dialogue
            .iter()
            .filter(|line| !line.text.trim().is_empty())
            .map(|line| format!("{}: {}", line.speaker, line.text))
            .collect::<Vec<_>>()
            .join("\n");
        let voices = speakers.iter().map(|s| (s.name.clone(), s.voice.clone())).collect();

        let pcm = match self
            .synthesize_with_retry(SpeechRequest { transcript, voices, api_key: key })
            .await
        {
            Ok(pcm) => pcm,
            Err(e) => {
                state.push_error(format!("Audio synthesis failed: {e}"));
                return Ok(());
            }
        };

        let wav = wave_bytes(&pcm);
        let duration = pcm.len() as f64 / f64::from(SAMPLE_RATE * u32::from(SAMPLE_WIDTH));

        let session_dir = self.ctx.storage.session_dir(&state.session_id)?;
        let slug = crate::prompts::output_slug(&podcast.script.title);
        let path = session_dir.join("audio").join(format!("{slug}.wav"));
        std::fs::write(&path, &wav)?;

        let mut podcast = podcast;
        podcast.audio_base64 = base64::engine::general_purpose::STANDARD.encode(&wav);
        podcast.duration_seconds = duration;
        tracing::info!(seconds = duration, "podcast audio synthesized");

        state.podcast = Some(podcast);
        state.output_path = Some(path);
        state.completed = true;
        Ok(())
    }
}
