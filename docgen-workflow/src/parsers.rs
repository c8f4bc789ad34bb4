//! Source parser collaborator contracts.
//!
//! Concrete parser internals are out of scope for the engine; the
//! text-oriented parsers here keep the contract honest while PDF/DOCX/PPTX
//! parsing stays pluggable behind [`SourceParser`].

use docgen_core::{ContentFormat, DocgenError, Result};
use regex::Regex;
use std::collections::HashMap;
use std::path::Path;
use std::sync::Arc;

/// Canonical UTF-8 markdown plus metadata produced from one source.
#[derive(Debug, Clone, Default)]
pub struct ParsedDocument {
    pub content: String,
    pub title: Option<String>,
    pub page_count: Option<u32>,
}

/// Converts one on-disk source into canonical markdown.
pub trait SourceParser: Send + Sync {
    fn parse(&self, path: &Path) -> Result<ParsedDocument>;
}

/// Passes text through verbatim, deriving the title from the filename.
pub struct PlainTextParser;

impl SourceParser for PlainTextParser {
    fn parse(&self, path: &Path) -> Result<ParsedDocument> {
        let content = std::fs::read_to_string(path)
            .map_err(|e| DocgenError::ParseFailed(format!("{}: {e}", path.display())))?;
        Ok(ParsedDocument {
            content,
            title: path.file_stem().map(|s| s.to_string_lossy().into_owned()),
            page_count: None,
        })
    }
}

/// Markdown passes through; the title comes from the first `#` heading.
pub struct MarkdownParser;

impl SourceParser for MarkdownParser {
    fn parse(&self, path: &Path) -> Result<ParsedDocument> {
        let content = std::fs::read_to_string(path)
            .map_err(|e| DocgenError::ParseFailed(format!("{}: {e}", path.display())))?;
        let title = content
            .lines()
            .find(|line| line.starts_with("# "))
            .map(|line| line.trim_start_matches("# ").trim().to_string())
            .or_else(|| path.file_stem().map(|s| s.to_string_lossy().into_owned()));
        Ok(ParsedDocument { content, title, page_count: None })
    }
}

/// Strips tags from saved HTML; a stand-in for a real HTML converter.
pub struct HtmlParser;

impl HtmlParser {
    pub(crate) fn strip_tags(html: &str) -> String {
        let no_scripts = Regex::new(r"(?si)<(script|style)[^>]*>.*?</(script|style)>")
            .expect("static regex")
            .replace_all(html, "");
        let no_tags = Regex::new(r"(?s)<[^>]+>").expect("static regex").replace_all(&no_scripts, " ");
        let collapsed = Regex::new(r"[ \t]+").expect("static regex").replace_all(&no_tags, " ");
        collapsed
            .lines()
            .map(str::trim)
            .filter(|line| !line.is_empty())
            .collect::<Vec<_>>()
            .join("\n")
    }
}

impl SourceParser for HtmlParser {
    fn parse(&self, path: &Path) -> Result<ParsedDocument> {
        let html = std::fs::read_to_string(path)
            .map_err(|e| DocgenError::ParseFailed(format!("{}: {e}", path.display())))?;
        let title = Regex::new(r"(?si)<title[^>]*>(.*?)</title>")
            .expect("static regex")
            .captures(&html)
            .map(|c| c[1].trim().to_string());
        Ok(ParsedDocument { content: Self::strip_tags(&html), title, page_count: None })
    }
}

/// Fetches a URL and converts the body to markdown-ish text.
pub struct WebParser {
    client: reqwest::Client,
}

impl WebParser {
    pub fn new() -> Self {
        Self { client: reqwest::Client::new() }
    }

    pub async fn fetch(&self, url: &str) -> Result<ParsedDocument> {
        let response = self
            .client
            .get(url)
            .timeout(std::time::Duration::from_secs(30))
            .send()
            .await
            .map_err(|e| DocgenError::ParseFailed(format!("fetch {url}: {e}")))?;
        if !response.status().is_success() {
            return Err(DocgenError::ParseFailed(format!(
                "fetch {url}: status {}",
                response.status()
            )));
        }
        let body = response
            .text()
            .await
            .map_err(|e| DocgenError::ParseFailed(format!("read {url}: {e}")))?;
        let title = Regex::new(r"(?si)<title[^>]*>(.*?)</title>")
            .expect("static regex")
            .captures(&body)
            .map(|c| c[1].trim().to_string());
        Ok(ParsedDocument { content: HtmlParser::strip_tags(&body), title, page_count: None })
    }
}

impl Default for WebParser {
    fn default() -> Self {
        Self::new()
    }
}

/// Parser lookup by detected content format.
pub struct ParserRegistry {
    parsers: HashMap<ContentFormat, Arc<dyn SourceParser>>,
}

impl ParserRegistry {
    pub fn new() -> Self {
        let mut parsers: HashMap<ContentFormat, Arc<dyn SourceParser>> = HashMap::new();
        parsers.insert(ContentFormat::Text, Arc::new(PlainTextParser));
        parsers.insert(ContentFormat::Markdown, Arc::new(MarkdownParser));
        parsers.insert(ContentFormat::Html, Arc::new(HtmlParser));
        Self { parsers }
    }

    /// Register or replace the parser for a format (PDF/DOCX/PPTX
    /// collaborators plug in here).
    pub fn register(&mut self, format: ContentFormat, parser: Arc<dyn SourceParser>) {
        self.parsers.insert(format, parser);
    }

    pub fn get(&self, format: ContentFormat) -> Result<Arc<dyn SourceParser>> {
        self.parsers
            .get(&format)
            .cloned()
            .ok_or_else(|| DocgenError::ParseFailed(format!("no parser for {format:?}")))
    }
}

impl Default for ParserRegistry {
    fn default() -> Self {
        Self::new()
    }
}

/// File extensions treated as images (routed through vision extraction).
pub fn is_image_file(path: &Path) -> bool {
    matches!(
        path.extension().and_then(|e| e.to_str()).map(|e| e.to_lowercase()).as_deref(),
        Some("png" | "jpg" | "jpeg" | "gif" | "webp")
    )
}

/// Spreadsheet extensions the engine refuses.
pub fn is_spreadsheet(path: &Path) -> bool {
    matches!(
        path.extension().and_then(|e| e.to_str()).map(|e| e.to_lowercase()).as_deref(),
        Some("xls" | "xlsx")
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_markdown_parser_takes_title_from_heading() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("notes.md");
        std::fs::write(&path, "# The Title\n\nbody").unwrap();
        let doc = MarkdownParser.parse(&path).unwrap();
        assert_eq!(doc.title.as_deref(), Some("The Title"));
        assert!(doc.content.contains("body"));
    }

    #[test]
    fn test_html_strip_tags() {
        let text = HtmlParser::strip_tags(
            "<html><head><style>p{}</style></head><body><h1>Hi</h1><p>there <b>friend</b></p><script>x()</script></body></html>",
        );
        assert!(text.contains("Hi"));
        assert!(text.contains("there friend"));
        assert!(!text.contains("script"));
        assert!(!text.contains("p{}"));
    }

    #[test]
    fn test_registry_rejects_unknown_format() {
        let registry = ParserRegistry::new();
        assert!(registry.get(ContentFormat::Pdf).is_err());
        assert!(registry.get(ContentFormat::Markdown).is_ok());
    }

    #[test]
    fn test_file_classification() {
        assert!(is_image_file(Path::new("photo.PNG")));
        assert!(!is_image_file(Path::new("doc.pdf")));
        assert!(is_spreadsheet(Path::new("data.xlsx")));
        assert!(is_spreadsheet(Path::new("old.XLS")));
        assert!(!is_spreadsheet(Path::new("doc.docx")));
    }
}
