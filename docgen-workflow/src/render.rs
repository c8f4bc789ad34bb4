//! Document renderer collaborator contracts.
//!
//! Rendering correctness is out of scope for the engine; the registry
//! fixes the contract (kind id → renderer → deterministic file path) and
//! ships a full markdown renderer plus a minimal single-page PDF writer.
//! Production PDF/PPTX engines register themselves over these defaults.

use docgen_core::{DocgenError, Result, StructuredContent};
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;

/// Renders one structured document into a file under `dest_dir`.
///
/// Implementations must produce the file at `<dest_dir>/<slug>.<ext>` and
/// return that path; a missing or empty result is a generation failure.
pub trait DocumentRenderer: Send + Sync + std::fmt::Debug {
    fn extension(&self) -> &'static str;
    fn render(&self, content: &StructuredContent, dest_dir: &Path, slug: &str) -> Result<PathBuf>;
}

/// Writes the structured markdown verbatim.
#[derive(Debug)]
pub struct MarkdownRenderer;

impl DocumentRenderer for MarkdownRenderer {
    fn extension(&self) -> &'static str {
        "md"
    }

    fn render(&self, content: &StructuredContent, dest_dir: &Path, slug: &str) -> Result<PathBuf> {
        std::fs::create_dir_all(dest_dir)?;
        let path = dest_dir.join(format!("{slug}.md"));
        std::fs::write(&path, content.markdown.as_bytes())?;
        Ok(path)
    }
}

fn escape_pdf_text(text: &str) -> String {
    text.chars()
        .filter(|c| c.is_ascii() && !c.is_ascii_control())
        .collect::<String>()
        .replace('\\', "\\\\")
        .replace('(', "\\(")
        .replace(')', "\\)")
}

/// Minimal single-page PDF writer: title plus section titles as text
/// lines. Stands in for the production PDF engine behind the same
/// contract.
#[derive(Debug)]
pub struct SimplePdfRenderer;

impl DocumentRenderer for SimplePdfRenderer {
    fn extension(&self) -> &'static str {
        "pdf"
    }

    fn render(&self, content: &StructuredContent, dest_dir: &Path, slug: &str) -> Result<PathBuf> {
        std::fs::create_dir_all(dest_dir)?;
        let path = dest_dir.join(format!("{slug}.pdf"));

        let mut lines = vec![content.title.clone()];
        lines.extend(content.sections.iter().map(|s| s.title.clone()));

        let mut text_ops = String::from("BT /F1 12 Tf 72 720 Td 16 TL\n");
        for line in &lines {
            text_ops.push_str(&format!("({}) Tj T*\n", escape_pdf_text(line)));
        }
        text_ops.push_str("ET");

        let objects = [
            "<< /Type /Catalog /Pages 2 0 R >>".to_string(),
            "<< /Type /Pages /Kids [3 0 R] /Count 1 >>".to_string(),
            "<< /Type /Page /Parent 2 0 R /MediaBox [0 0 612 792] /Contents 4 0 R /Resources << /Font << /F1 5 0 R >> >> >>".to_string(),
            format!("<< /Length {} >>\nstream\n{}\nendstream", text_ops.len(), text_ops),
            "<< /Type /Font /Subtype /Type1 /BaseFont /Helvetica >>".to_string(),
        ];

        let mut body = String::from("%PDF-1.4\n");
        let mut offsets = Vec::with_capacity(objects.len());
        for (index, object) in objects.iter().enumerate() {
            offsets.push(body.len());
            body.push_str(&format!("{} 0 obj\n{}\nendobj\n", index + 1, object));
        }
        let xref_offset = body.len();
        body.push_str(&format!("xref\n0 {}\n0000000000 65535 f \n", objects.len() + 1));
        for offset in &offsets {
            body.push_str(&format!("{offset:010} 00000 n \n"));
        }
        body.push_str(&format!(
            "trailer\n<< /Size {} /Root 1 0 R >>\nstartxref\n{}\n%%EOF\n",
            objects.len() + 1,
            xref_offset
        ));

        std::fs::write(&path, body.as_bytes())?;
        Ok(path)
    }
}

/// Renderer lookup by kind id (`pdf`, `markdown`, `pptx`, `pdf_from_pptx`).
pub struct RendererRegistry {
    renderers: HashMap<String, Arc<dyn DocumentRenderer>>,
}

impl RendererRegistry {
    pub fn new() -> Self {
        let mut renderers: HashMap<String, Arc<dyn DocumentRenderer>> = HashMap::new();
        renderers.insert("markdown".into(), Arc::new(MarkdownRenderer));
        renderers.insert("pdf".into(), Arc::new(SimplePdfRenderer));
        renderers.insert("pdf_from_pptx".into(), Arc::new(SimplePdfRenderer));
        Self { renderers }
    }

    /// Empty registry for tests that want full control.
    pub fn empty() -> Self {
        Self { renderers: HashMap::new() }
    }

    pub fn register(&mut self, id: impl Into<String>, renderer: Arc<dyn DocumentRenderer>) {
        self.renderers.insert(id.into(), renderer);
    }

    pub fn get(&self, id: &str) -> Result<Arc<dyn DocumentRenderer>> {
        self.renderers
            .get(id)
            .cloned()
            .ok_or_else(|| DocgenError::GenerationFailed(format!("no renderer for '{id}'")))
    }
}

impl Default for RendererRegistry {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use docgen_core::Section;

    fn structured() -> StructuredContent {
        StructuredContent {
            title: "Title (v1)".into(),
            markdown: "# Title\n\n## 1. Intro\n\nAlpha.".into(),
            sections: vec![Section { id: 1, title: "Intro".into(), content: "Alpha.".into() }],
            ..Default::default()
        }
    }

    #[test]
    fn test_markdown_renderer_writes_markdown() {
        let dir = tempfile::tempdir().unwrap();
        let path = MarkdownRenderer.render(&structured(), dir.path(), "title").unwrap();
        assert!(path.ends_with("title.md"));
        assert_eq!(std::fs::read_to_string(path).unwrap(), "# Title\n\n## 1. Intro\n\nAlpha.");
    }

    #[test]
    fn test_pdf_renderer_emits_wellformed_header() {
        let dir = tempfile::tempdir().unwrap();
        let path = SimplePdfRenderer.render(&structured(), dir.path(), "title").unwrap();
        let bytes = std::fs::read(path).unwrap();
        assert!(bytes.starts_with(b"%PDF-1.4"));
        assert!(bytes.ends_with(b"%%EOF\n"));
        // Parens in the title are escaped inside the content stream
        let body = String::from_utf8_lossy(&bytes);
        assert!(body.contains("Title \\(v1\\)"));
    }

    #[test]
    fn test_registry_defaults_and_missing() {
        let registry = RendererRegistry::new();
        assert!(registry.get("markdown").is_ok());
        assert!(registry.get("pdf").is_ok());
        let err = registry.get("pptx").unwrap_err();
        assert!(matches!(err, DocgenError::GenerationFailed(_)));
    }
}
