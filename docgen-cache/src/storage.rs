use chrono::{DateTime, Utc};
use docgen_core::{DocgenError, FileId, Result, SessionId};
use rand::RngCore;
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::RwLock;

/// Metadata tracked for one upload.
#[derive(Debug, Clone)]
pub struct UploadRecord {
    pub file_id: FileId,
    pub filename: String,
    pub mime_type: String,
    pub size: u64,
    pub path: PathBuf,
    pub created_at: DateTime<Utc>,
}

/// Manages uploads and generated outputs with an organized folder layout.
///
/// ```text
/// <output_root>/
///     <session_or_file_id>/
///         source/      - original uploaded files
///         images/      - generated images + manifest.json
///         pdf/         - generated PDF files
///         pptx/        - generated PPTX files
///         markdown/    - generated markdown files
///         audio/       - synthesized audio
/// ```
pub struct SessionStorage {
    output_root: PathBuf,
    base_url: String,
    uploads: RwLock<HashMap<FileId, UploadRecord>>,
}

fn hex_token(bytes: usize) -> String {
    let mut buf = vec![0u8; bytes];
    rand::rng().fill_bytes(&mut buf);
    let mut out = String::with_capacity(bytes * 2);
    for byte in buf {
        use std::fmt::Write;
        let _ = write!(out, "{byte:02x}");
    }
    out
}

impl SessionStorage {
    pub fn new(output_root: impl Into<PathBuf>) -> Self {
        Self {
            output_root: output_root.into(),
            base_url: "/api/download".into(),
            uploads: RwLock::new(HashMap::new()),
        }
    }

    pub fn output_root(&self) -> &Path {
        &self.output_root
    }

    /// Directory for one session (or upload id), subdirectories created.
    pub fn session_dir(&self, session: &SessionId) -> Result<PathBuf> {
        let dir = self.output_root.join(session.as_ref());
        for sub in ["source", "images", "pdf", "pptx", "markdown", "audio"] {
            std::fs::create_dir_all(dir.join(sub))?;
        }
        Ok(dir)
    }

    pub fn images_dir(&self, session: &SessionId) -> PathBuf {
        self.output_root.join(session.as_ref()).join("images")
    }

    /// Persist an uploaded file under a fresh `f_<hex>` id.
    pub fn save_upload(&self, content: &[u8], filename: &str, mime_type: &str) -> Result<UploadRecord> {
        let file_id = FileId::new(format!("f_{}", hex_token(12)));
        let dir = self.output_root.join(file_id.as_ref()).join("source");
        std::fs::create_dir_all(&dir)?;
        let path = dir.join(filename);
        std::fs::write(&path, content)?;
        tracing::info!(path = %path.display(), "saved upload");

        let record = UploadRecord {
            file_id: file_id.clone(),
            filename: filename.to_string(),
            mime_type: mime_type.to_string(),
            size: content.len() as u64,
            path,
            created_at: Utc::now(),
        };
        self.uploads
            .write()
            .expect("upload registry poisoned")
            .insert(file_id, record.clone());
        Ok(record)
    }

    /// Resolve an upload path, falling back to a disk scan so uploads
    /// survive a process restart.
    pub fn upload_path(&self, file_id: &FileId) -> Result<PathBuf> {
        if let Some(record) = self.uploads.read().expect("upload registry poisoned").get(file_id) {
            return Ok(record.path.clone());
        }
        let source_dir = self.output_root.join(file_id.as_ref()).join("source");
        if let Ok(mut entries) = std::fs::read_dir(&source_dir) {
            if let Some(entry) = entries.next().and_then(|e| e.ok()) {
                return Ok(entry.path());
            }
        }
        Err(DocgenError::ParseFailed(format!("upload not found: {file_id}")))
    }

    /// Relative path (from the output root) for a produced file.
    pub fn relative_path(&self, path: &Path) -> String {
        path.strip_prefix(&self.output_root)
            .map(|p| p.to_string_lossy().into_owned())
            .unwrap_or_else(|_| {
                path.file_name().map(|n| n.to_string_lossy().into_owned()).unwrap_or_default()
            })
    }

    /// Download URL for a produced file, with a random access token.
    pub fn download_url(&self, path: &Path) -> String {
        let rel = self.relative_path(path);
        format!("{}/{}?token={}", self.base_url, rel, hex_token(16))
    }
}
