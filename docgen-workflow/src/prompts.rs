//! Prompt templates for the generation steps.
//!
//! Wording is deliberately plain; each builder returns the user prompt,
//! with the paired system prompt exposed alongside where one exists.

use docgen_core::{Speaker, slugify};

pub const EXECUTIVE_SUMMARY_SYSTEM: &str =
    "You are an expert analyst who writes crisp executive summaries for busy readers.";

pub fn executive_summary_prompt(content: &str, audience: &str) -> String {
    format!(
        "Write an executive summary of the following content for a {audience} audience.\n\
         Keep it under five short paragraphs and preserve the key facts.\n\n\
         CONTENT:\n{content}"
    )
}

pub const TRANSFORM_SYSTEM: &str =
    "You are a technical editor who restructures raw notes into clean, well-organized articles.";

pub fn transform_prompt(content: &str, audience: &str) -> String {
    format!(
        "Restructure the following content into a blog-style article for a {audience} audience.\n\n\
         CONTENT:\n{content}\n\n\
         OUTPUT FORMAT (JSON):\n\
         {{\n\
           \"title\": \"Article title\",\n\
           \"outline\": [\"Section heading\", \"...\"],\n\
           \"sections\": [{{\"title\": \"1. Heading\", \"content\": \"Section text...\"}}],\n\
           \"markdown\": \"# Title\\n\\n## 1. Heading\\n\\n...\",\n\
           \"visual_markers\": [{{\"marker_id\": \"vm-1\", \"type\": \"flowchart\", \"title\": \"...\", \"description\": \"...\", \"position\": 1}}]\n\
         }}\n\n\
         Number section headings (\"1. \", \"2. \", ...) and keep the markdown complete."
    )
}

pub const SLIDE_STRUCTURE_SYSTEM: &str =
    "You are a presentation designer who turns articles into focused slide decks.";

pub fn slide_structure_prompt(content: &str, max_slides: u32) -> String {
    format!(
        "Design a slide deck for the following content with at most {max_slides} slides.\n\n\
         CONTENT:\n{content}\n\n\
         OUTPUT FORMAT (JSON):\n\
         {{\"slides\": [{{\"title\": \"Slide title\", \"bullets\": [\"point\"], \"speaker_notes\": \"...\"}}]}}"
    )
}

pub const IMAGE_PROMPT_SYSTEM: &str = "You decide whether a document section benefits from an \
     illustration and, if so, write the image generation prompt. Prefer 'none' for sections that \
     are lists of caveats, legal text, or short transitions.";

pub fn image_prompt_request(section_title: &str, section_content: &str, style: &str) -> String {
    format!(
        "SECTION: {section_title}\n\n{section_content}\n\n\
         Choose an image_type from: infographic, decorative, diagram, chart, mermaid, none.\n\
         Style preference: {style}\n\n\
         OUTPUT FORMAT (JSON):\n\
         {{\"image_type\": \"infographic\", \"prompt\": \"...\", \"confidence\": 0.8}}"
    )
}

pub fn image_description_prompt(section_title: &str) -> String {
    format!(
        "Describe this illustration for the section \"{section_title}\" in two to four sentences, \
         suitable as an accessible caption."
    )
}

pub fn podcast_script_prompt(
    content: &str,
    style: &str,
    speakers: &[Speaker],
    duration_minutes: u32,
    source_count: u64,
) -> String {
    let speaker_list = speakers
        .iter()
        .map(|s| format!("{} ({})", s.name, s.role))
        .collect::<Vec<_>>()
        .join(", ");
    format!(
        "Generate a podcast script about the following content.\n\n\
         CONTENT:\n{content}\n\n\
         REQUIREMENTS:\n\
         - Style: {style}\n\
         - Target duration: {duration_minutes} minutes\n\
         - Speakers: {speaker_list}\n\
         - Based on {source_count} source document(s)\n\n\
         OUTPUT FORMAT (JSON):\n\
         {{\n\
           \"title\": \"Episode title\",\n\
           \"description\": \"Brief episode description\",\n\
           \"dialogue\": [\n\
             {{\"speaker\": \"SpeakerName\", \"text\": \"What they say...\"}}\n\
           ]\n\
         }}\n\n\
         Create an engaging dialogue that covers the key points from the content.\n\
         The dialogue should feel natural and conversational."
    )
}

pub fn mindmap_prompt(content: &str, mode: &str, source_count: u64) -> String {
    let guidance = match mode {
        "detailed" => {
            "Create a comprehensive mind map with 5-10 main branches covering all major themes, \
             2-4 sub-branches per main branch, and specific details, facts, and concepts."
        }
        "hierarchical" => {
            "Create a structured hierarchical mind map with clear parent-child relationships, \
             logical groupings of concepts, and multiple levels of depth where appropriate."
        }
        _ => {
            "Create a mind map that captures the key concepts and their relationships, with a \
             central topic, 3-7 main branches, and relevant sub-branches."
        }
    };
    format!(
        "Analyze the following content and create a mind map structure.\n\n\
         CONTENT:\n{content}\n\n\
         {guidance}\n\n\
         OUTPUT FORMAT (JSON):\n\
         {{\n\
           \"title\": \"Main Topic\",\n\
           \"summary\": \"Brief summary of the content\",\n\
           \"central_node\": {{\n\
             \"label\": \"Central Topic\",\n\
             \"children\": [{{\"label\": \"Branch\", \"children\": [{{\"label\": \"Sub-topic\"}}]}}]\n\
           }}\n\
         }}\n\n\
         Based on {source_count} source document(s)."
    )
}

pub fn faq_prompt(content: &str) -> String {
    format!(
        "Extract the questions a reader would most likely ask about the following content, with \
         clear answers drawn only from the content itself.\n\n\
         CONTENT:\n{content}\n\n\
         OUTPUT FORMAT (JSON):\n\
         {{\n\
           \"title\": \"FAQ title\",\n\
           \"items\": [\n\
             {{\"id\": \"faq-1\", \"question\": \"...\", \"answer\": \"...\", \"tags\": [\"topic\"]}}\n\
           ]\n\
         }}"
    )
}

pub fn vision_extraction_prompt() -> String {
    "Extract all text visible in this image verbatim, then add a short description of what the \
     image shows. Return both as markdown."
        .to_string()
}

/// Deterministic output filename stem for an artifact.
pub fn output_slug(title: &str) -> String {
    let slug = slugify(title);
    if slug.is_empty() { "document".to_string() } else { slug }
}
