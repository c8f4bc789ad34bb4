use chrono::{DateTime, Utc};
use docgen_core::ArtifactKind;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::BTreeMap;
use std::io::Write;
use std::path::Path;

/// One produced artifact recorded in a session manifest.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ArtifactEntry {
    /// Path relative to the output root.
    pub file_path: String,
    pub download_url: String,
    pub content_hash: String,
    pub created_at: DateTime<Utc>,
    #[serde(default)]
    pub metadata: Value,
}

/// Per-session ledger of produced artifacts.
///
/// Keys are serialized in stable order (`BTreeMap` + struct field order).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SessionManifest {
    pub created_at: DateTime<Utc>,
    pub last_generated_at: DateTime<Utc>,
    pub outputs_generated: Vec<ArtifactKind>,
    pub artifacts: BTreeMap<String, ArtifactEntry>,
}

impl SessionManifest {
    pub fn new() -> Self {
        let now = Utc::now();
        Self {
            created_at: now,
            last_generated_at: now,
            outputs_generated: Vec::new(),
            artifacts: BTreeMap::new(),
        }
    }

    /// Record an artifact for `kind`, replacing any prior entry.
    pub fn record(&mut self, kind: ArtifactKind, entry: ArtifactEntry) {
        if !self.outputs_generated.contains(&kind) {
            self.outputs_generated.push(kind);
        }
        self.last_generated_at = entry.created_at;
        self.artifacts.insert(kind.as_str().to_string(), entry);
    }

    pub fn artifact(&self, kind: ArtifactKind) -> Option<&ArtifactEntry> {
        self.artifacts.get(kind.as_str())
    }

    /// The most recently generated kind, if any.
    pub fn last_generated(&self) -> Option<&str> {
        self.artifacts
            .iter()
            .max_by_key(|(_, entry)| entry.created_at)
            .map(|(kind, _)| kind.as_str())
    }
}

impl Default for SessionManifest {
    fn default() -> Self {
        Self::new()
    }
}

/// Serialize `value` to `path` atomically: write a sibling temp file, then
/// rename over the destination.
pub(crate) fn write_json_atomic<T: Serialize>(path: &Path, value: &T) -> std::io::Result<()> {
    let parent = path.parent().unwrap_or_else(|| Path::new("."));
    std::fs::create_dir_all(parent)?;
    let tmp = parent.join(format!(
        ".{}.tmp",
        path.file_name().and_then(|n| n.to_str()).unwrap_or("manifest")
    ));
    let body = serde_json::to_string_pretty(value)
        .map_err(|e| std::io::Error::other(e.to_string()))?;
    {
        let mut file = std::fs::File::create(&tmp)?;
        file.write_all(body.as_bytes())?;
        file.sync_all()?;
    }
    std::fs::rename(&tmp, path)
}
