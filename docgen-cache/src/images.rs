use crate::manifest::write_json_atomic;
use docgen_core::{ImageType, Section, SectionImage, slugify};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::Path;

/// Per-session record of generated section images, stored as
/// `manifest.json` alongside the image files.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
pub struct ImageManifest {
    pub content_hash: String,
    pub image_style: String,
    pub sections: Vec<ManifestSection>,
    #[serde(default)]
    pub descriptions: BTreeMap<u32, String>,
    #[serde(default)]
    pub image_types: BTreeMap<u32, String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ManifestSection {
    pub id: u32,
    pub title: String,
}

/// Write the image manifest atomically. Best-effort at call sites; the
/// caller decides whether a failure is fatal.
pub fn save_image_manifest(
    images_dir: &Path,
    content_hash: &str,
    sections: &[Section],
    descriptions: &BTreeMap<u32, String>,
    image_types: &BTreeMap<u32, ImageType>,
    image_style: &str,
) -> std::io::Result<()> {
    let manifest = ImageManifest {
        content_hash: content_hash.to_string(),
        image_style: image_style.to_string(),
        sections: sections
            .iter()
            .map(|s| ManifestSection { id: s.id, title: s.title.clone() })
            .collect(),
        descriptions: descriptions.clone(),
        image_types: image_types.iter().map(|(id, t)| (*id, t.as_str().to_string())).collect(),
    };
    write_json_atomic(&images_dir.join("manifest.json"), &manifest)
}

fn load_manifest(images_dir: &Path) -> Option<ImageManifest> {
    let body = std::fs::read_to_string(images_dir.join("manifest.json")).ok()?;
    match serde_json::from_str(&body) {
        Ok(manifest) => Some(manifest),
        Err(e) => {
            tracing::warn!(dir = %images_dir.display(), error = %e, "unreadable image manifest");
            None
        }
    }
}

/// Resolve the image file for a slugged title. Plain `<slug>.png` is the
/// base candidate; `<slug>_<n>.png` variants win, newest numeric suffix
/// first.
fn resolve_image_file(images_dir: &Path, title: &str) -> Option<std::path::PathBuf> {
    let slug = slugify(title);
    if slug.is_empty() {
        return None;
    }
    let mut best: Option<(u64, std::path::PathBuf)> = None;
    let base = images_dir.join(format!("{slug}.png"));
    if base.exists() {
        best = Some((0, base));
    }
    let prefix = format!("{slug}_");
    if let Ok(entries) = std::fs::read_dir(images_dir) {
        for entry in entries.flatten() {
            let name = entry.file_name();
            let Some(name) = name.to_str() else { continue };
            let Some(stem) = name.strip_suffix(".png") else { continue };
            let Some(suffix) = stem.strip_prefix(&prefix) else { continue };
            if let Ok(seq) = suffix.parse::<u64>() {
                // sequence suffixes rank above the bare slug
                if best.as_ref().map(|(s, _)| seq + 1 > *s).unwrap_or(true) {
                    best = Some((seq + 1, entry.path()));
                }
            }
        }
    }
    best.map(|(_, path)| path)
}

/// Load cached section images from `images_dir`.
///
/// Returns `None` when the manifest is absent or when either the content
/// hash or the requested style disagrees with it; the caller then
/// regenerates.
pub fn load_images(
    images_dir: &Path,
    expected_hash: &str,
    expected_style: &str,
) -> Option<BTreeMap<u32, SectionImage>> {
    let manifest = load_manifest(images_dir)?;
    if manifest.content_hash != expected_hash {
        tracing::info!("image cache skipped: content hash mismatch");
        return None;
    }
    if manifest.image_style != expected_style {
        tracing::info!("image cache skipped: image style mismatch");
        return None;
    }

    let mut images = BTreeMap::new();
    for section in &manifest.sections {
        let Some(path) = resolve_image_file(images_dir, &section.title) else { continue };
        let image_type = manifest
            .image_types
            .get(&section.id)
            .map(|t| ImageType::parse(t))
            .unwrap_or(ImageType::Infographic);
        images.insert(
            section.id,
            SectionImage {
                section_id: section.id,
                section_title: section.title.clone(),
                image_type,
                path: path.to_string_lossy().into_owned(),
                prompt: "Previously generated".into(),
                confidence: 1.0,
                description: manifest.descriptions.get(&section.id).cloned().unwrap_or_default(),
                attempts: 0,
                embed_base64: None,
            },
        );
    }
    if images.is_empty() { None } else { Some(images) }
}
