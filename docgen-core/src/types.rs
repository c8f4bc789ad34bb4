use derive_more::{AsRef, Deref, Display, From, Into};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

/// Groups runs over the same source digest, enabling cross-artifact reuse.
#[derive(
    Debug, Clone, PartialEq, Eq, Hash, Display, From, AsRef, Deref, Into, Serialize, Deserialize, Default,
)]
pub struct SessionId(String);

impl SessionId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    /// Derive a session id from the canonical digest of the request sources.
    pub fn derived(sources: &[Source]) -> Self {
        Self(canonical_source_digest(sources))
    }
}

/// Identifier handed out by the upload endpoint (`f_<hex>`).
#[derive(
    Debug, Clone, PartialEq, Eq, Hash, Display, From, AsRef, Deref, Into, Serialize, Deserialize, Default,
)]
pub struct FileId(String);

impl FileId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }
}

/// Final user-facing output family. Determines branch topology and renderer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ArtifactKind {
    ArticlePdf,
    ArticleMarkdown,
    SlideDeckPdf,
    PresentationPptx,
    Podcast,
    Mindmap,
    Faq,
    ImageGenerate,
    ImageEdit,
}

impl ArtifactKind {
    /// Document kinds run the full document branch.
    pub fn is_document(&self) -> bool {
        matches!(
            self,
            ArtifactKind::ArticlePdf
                | ArtifactKind::ArticleMarkdown
                | ArtifactKind::SlideDeckPdf
                | ArtifactKind::PresentationPptx
        )
    }

    /// Whether this kind needs the common ingest/summarize prefix.
    pub fn requires_extraction(&self) -> bool {
        !matches!(self, ArtifactKind::ImageGenerate | ArtifactKind::ImageEdit)
    }

    /// Slide-capable kinds request slide structures during enhancement.
    pub fn is_slide_capable(&self) -> bool {
        matches!(self, ArtifactKind::SlideDeckPdf | ArtifactKind::PresentationPptx)
    }

    /// Renderer identifier for document kinds.
    pub fn renderer_id(&self) -> &'static str {
        match self {
            ArtifactKind::ArticlePdf => "pdf",
            ArtifactKind::ArticleMarkdown => "markdown",
            ArtifactKind::SlideDeckPdf => "pdf_from_pptx",
            ArtifactKind::PresentationPptx => "pptx",
            _ => "",
        }
    }

    /// Expected extension of the rendered file, dot included.
    pub fn expected_extension(&self) -> &'static str {
        match self {
            ArtifactKind::ArticlePdf | ArtifactKind::SlideDeckPdf => ".pdf",
            ArtifactKind::ArticleMarkdown => ".md",
            ArtifactKind::PresentationPptx => ".pptx",
            ArtifactKind::Podcast => ".wav",
            _ => "",
        }
    }

    /// Output subdirectory under the session directory.
    pub fn output_subdir(&self) -> &'static str {
        match self {
            ArtifactKind::ArticlePdf | ArtifactKind::SlideDeckPdf => "pdf",
            ArtifactKind::PresentationPptx => "pptx",
            ArtifactKind::ArticleMarkdown => "markdown",
            ArtifactKind::Podcast => "audio",
            _ => "misc",
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            ArtifactKind::ArticlePdf => "article_pdf",
            ArtifactKind::ArticleMarkdown => "article_markdown",
            ArtifactKind::SlideDeckPdf => "slide_deck_pdf",
            ArtifactKind::PresentationPptx => "presentation_pptx",
            ArtifactKind::Podcast => "podcast",
            ArtifactKind::Mindmap => "mindmap",
            ArtifactKind::Faq => "faq",
            ArtifactKind::ImageGenerate => "image_generate",
            ArtifactKind::ImageEdit => "image_edit",
        }
    }
}

impl std::fmt::Display for ArtifactKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Text-generation provider selector.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum Provider {
    #[default]
    #[serde(alias = "google")]
    Gemini,
    Openai,
    #[serde(alias = "claude")]
    Anthropic,
}

impl Provider {
    /// Parse a provider name; `"google"` normalizes to `gemini`.
    pub fn parse(name: &str) -> Option<Self> {
        match name.to_lowercase().as_str() {
            "gemini" | "google" => Some(Provider::Gemini),
            "openai" => Some(Provider::Openai),
            "anthropic" | "claude" => Some(Provider::Anthropic),
            _ => None,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Provider::Gemini => "gemini",
            Provider::Openai => "openai",
            Provider::Anthropic => "anthropic",
        }
    }
}

impl std::fmt::Display for Provider {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One input to a generation run. Read-only once supplied.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Source {
    /// Previously uploaded file, referenced by its upload id.
    File { file_id: FileId },
    /// Remote URL, fetched and converted to markdown by the web parser.
    Url {
        url: String,
        #[serde(skip_serializing_if = "Option::is_none", default)]
        parser_hint: Option<String>,
    },
    /// Inline text used verbatim.
    Text { text: String },
}

impl Source {
    fn digest_payload(&self) -> (&'static str, &str) {
        match self {
            Source::File { file_id } => ("file", file_id.as_ref()),
            Source::Url { url, .. } => ("url", url.as_str()),
            Source::Text { text } => ("text", text.as_str()),
        }
    }
}

/// Canonical input format detected for document parsing.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ContentFormat {
    Markdown,
    Text,
    Html,
    Pdf,
    Docx,
    Pptx,
    Url,
}

impl ContentFormat {
    /// Map a file extension or URL scheme to a format.
    pub fn detect(path: &str) -> Option<Self> {
        if path.starts_with("http://") || path.starts_with("https://") {
            return Some(ContentFormat::Url);
        }
        let ext = std::path::Path::new(path)
            .extension()
            .and_then(|e| e.to_str())
            .map(|e| e.to_lowercase())?;
        match ext.as_str() {
            "md" | "markdown" => Some(ContentFormat::Markdown),
            "txt" => Some(ContentFormat::Text),
            "html" | "htm" => Some(ContentFormat::Html),
            "pdf" => Some(ContentFormat::Pdf),
            "docx" => Some(ContentFormat::Docx),
            "pptx" => Some(ContentFormat::Pptx),
            _ => None,
        }
    }
}

fn sha256_hex(bytes: &[u8]) -> String {
    let mut hasher = Sha256::new();
    hasher.update(bytes);
    let digest = hasher.finalize();
    let mut out = String::with_capacity(digest.len() * 2);
    for byte in digest {
        use std::fmt::Write;
        let _ = write!(out, "{byte:02x}");
    }
    out
}

/// SHA-256 over the UTF-8 bytes of raw content, hex-encoded.
pub fn content_hash(content: &str) -> String {
    sha256_hex(content.as_bytes())
}

/// Filesystem-safe slug: alphanumeric runs joined by single dashes,
/// lowercased, trimmed.
pub fn slugify(text: &str) -> String {
    let mut slug = String::with_capacity(text.len());
    let mut last_dash = true;
    for ch in text.chars() {
        if ch.is_ascii_alphanumeric() {
            slug.push(ch.to_ascii_lowercase());
            last_dash = false;
        } else if !last_dash {
            slug.push('-');
            last_dash = true;
        }
    }
    while slug.ends_with('-') {
        slug.pop();
    }
    slug
}

/// Digest of a source list, stable across identical logical inputs.
///
/// Each source hashes as `H(type ‖ payload)` in declaration order, folded
/// with `H(prev ‖ cur)`.
pub fn canonical_source_digest(sources: &[Source]) -> String {
    let mut acc = String::new();
    for source in sources {
        let (kind, payload) = source.digest_payload();
        let mut hasher = Sha256::new();
        hasher.update(kind.as_bytes());
        hasher.update(payload.as_bytes());
        let cur = sha256_hex(&hasher.finalize());
        if acc.is_empty() {
            acc = cur;
        } else {
            let mut fold = Sha256::new();
            fold.update(acc.as_bytes());
            fold.update(cur.as_bytes());
            acc = sha256_hex(&fold.finalize());
        }
    }
    acc
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_artifact_kind_roundtrip() {
        let kind: ArtifactKind = serde_json::from_str("\"slide_deck_pdf\"").unwrap();
        assert_eq!(kind, ArtifactKind::SlideDeckPdf);
        assert_eq!(serde_json::to_string(&kind).unwrap(), "\"slide_deck_pdf\"");
    }

    #[test]
    fn test_provider_normalizes_google() {
        assert_eq!(Provider::parse("google"), Some(Provider::Gemini));
        assert_eq!(Provider::parse("GEMINI"), Some(Provider::Gemini));
        assert_eq!(Provider::parse("mistral"), None);
        // Wire-level normalization too
        assert_eq!(serde_json::from_str::<Provider>("\"google\"").unwrap(), Provider::Gemini);
    }

    #[test]
    fn test_source_tagged_serde() {
        let source: Source = serde_json::from_str(r#"{"type":"text","text":"hello"}"#).unwrap();
        assert_eq!(source, Source::Text { text: "hello".into() });

        let source: Source =
            serde_json::from_str(r#"{"type":"url","url":"https://example.com"}"#).unwrap();
        assert!(matches!(source, Source::Url { .. }));
    }

    #[test]
    fn test_content_hash_is_sha256() {
        // SHA-256 of the empty string
        assert_eq!(
            content_hash(""),
            "e3b0c44298fc1c149afbf4c8996fb92427ae41e4649b934ca495991b7852b855"
        );
        assert_eq!(content_hash("abc").len(), 64);
    }

    #[test]
    fn test_source_digest_stability_and_order() {
        let a = Source::Text { text: "alpha".into() };
        let b = Source::Text { text: "beta".into() };
        let d1 = canonical_source_digest(&[a.clone(), b.clone()]);
        let d2 = canonical_source_digest(&[a.clone(), b.clone()]);
        let d3 = canonical_source_digest(&[b, a]);
        assert_eq!(d1, d2);
        assert_ne!(d1, d3);
    }

    #[test]
    fn test_slugify() {
        assert_eq!(slugify("1. Intro & Overview"), "1-intro-overview");
        assert_eq!(slugify("  spaced  "), "spaced");
        assert_eq!(slugify("???"), "");
    }

    #[test]
    fn test_format_detection() {
        assert_eq!(ContentFormat::detect("https://example.com/page"), Some(ContentFormat::Url));
        assert_eq!(ContentFormat::detect("notes.md"), Some(ContentFormat::Markdown));
        assert_eq!(ContentFormat::detect("deck.PPTX"), Some(ContentFormat::Pptx));
        assert_eq!(ContentFormat::detect("data.xlsx"), None);
    }
}
