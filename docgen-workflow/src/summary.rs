//! Chunked map-reduce summarization.

use crate::prompts;
use docgen_core::{Provider, Result};
use docgen_llm::{LlmCallRequest, LlmGateway};

/// Split content at paragraph boundaries into chunks of at most
/// `chunk_limit` bytes. A single oversized paragraph becomes its own
/// chunk rather than being split mid-sentence.
pub fn split_paragraph_chunks(content: &str, chunk_limit: usize) -> Vec<String> {
    let mut chunks = Vec::new();
    let mut current = String::new();
    for paragraph in content.split("\n\n") {
        if !current.is_empty() && current.len() + paragraph.len() + 2 > chunk_limit {
            chunks.push(std::mem::take(&mut current));
        }
        if !current.is_empty() {
            current.push_str("\n\n");
        }
        current.push_str(paragraph);
    }
    if !current.is_empty() {
        chunks.push(current);
    }
    chunks
}

pub struct SummaryRequest<'a> {
    pub provider: Provider,
    pub model: &'a str,
    pub api_key: &'a str,
    pub audience: &'a str,
    pub single_chunk_limit: usize,
    pub chunk_limit: usize,
}

async fn summarize_once(
    gateway: &dyn LlmGateway,
    req: &SummaryRequest<'_>,
    content: &str,
    step: &str,
) -> Result<String> {
    let outcome = gateway
        .complete(
            LlmCallRequest::new(req.provider, req.model, prompts::executive_summary_prompt(content, req.audience))
                .with_system_prompt(prompts::EXECUTIVE_SUMMARY_SYSTEM)
                .with_step_name(step)
                .with_api_key(req.api_key)
                .with_max_output_tokens(500)
                .with_temperature(0.3),
        )
        .await?;
    Ok(outcome.text.trim().to_string())
}

/// Summarize without truncation.
///
/// Content at or under `single_chunk_limit` gets one call. Longer content
/// is split at paragraph boundaries into `chunk_limit`-bounded chunks,
/// each summarized independently; multiple chunk summaries are reduced
/// with one final call over their concatenation.
pub async fn summarize_chunked(
    gateway: &dyn LlmGateway,
    req: &SummaryRequest<'_>,
    content: &str,
) -> Result<String> {
    if content.len() <= req.single_chunk_limit {
        return summarize_once(gateway, req, content, "summarize_sources").await;
    }

    let chunks = split_paragraph_chunks(content, req.chunk_limit);
    let mut partials = Vec::new();
    for (index, chunk) in chunks.iter().enumerate() {
        let summary =
            summarize_once(gateway, req, chunk, &format!("summarize_chunk_{index}")).await?;
        if !summary.is_empty() {
            partials.push(summary);
        }
    }

    match partials.len() {
        0 => Ok(String::new()),
        1 => Ok(partials.remove(0)),
        _ => summarize_once(gateway, req, &partials.join("\n\n"), "summarize_reduce").await,
    }
}
