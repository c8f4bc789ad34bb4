use crate::manifest::{ArtifactEntry, SessionManifest, write_json_atomic};
use chrono::Utc;
use docgen_core::{ArtifactKind, DocgenError, Preferences, Result, SessionId};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use sha2::{Digest, Sha256};
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};

/// Content-addressed key for one artifact request.
///
/// Stable across identical logical inputs and distinct otherwise:
/// `H(kind ‖ provider ‖ model ‖ image_model ‖ canonical_prefs ‖ source_digest)`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct CacheKey(String);

impl CacheKey {
    pub fn compute(
        kind: ArtifactKind,
        provider: &str,
        model: &str,
        image_model: Option<&str>,
        preferences: &Preferences,
        source_digest: &str,
    ) -> Self {
        let mut hasher = Sha256::new();
        hasher.update(kind.as_str().as_bytes());
        hasher.update(b"\x1f");
        hasher.update(provider.to_lowercase().as_bytes());
        hasher.update(b"\x1f");
        hasher.update(model.as_bytes());
        hasher.update(b"\x1f");
        hasher.update(image_model.unwrap_or("").as_bytes());
        hasher.update(b"\x1f");
        hasher.update(preferences.canonical().as_bytes());
        hasher.update(b"\x1f");
        hasher.update(source_digest.as_bytes());
        let digest = hasher.finalize();
        let mut out = String::with_capacity(64);
        for byte in digest {
            use std::fmt::Write;
            let _ = write!(out, "{byte:02x}");
        }
        CacheKey(out)
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for CacheKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

/// Cache entry stored at `<cache_root>/<cache_key>.json`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CachedArtifact {
    pub kind: ArtifactKind,
    pub session_id: SessionId,
    /// Path relative to the output root.
    pub file_path: String,
    pub download_url: String,
    pub content_hash: String,
    pub created_at: chrono::DateTime<Utc>,
    #[serde(default)]
    pub metadata: Value,
}

/// Deterministic lookup of prior artifacts plus session manifest
/// persistence. TTL-free; eviction is an operator concern.
pub struct CacheStore {
    output_root: PathBuf,
    cache_root: PathBuf,
    session_locks: Mutex<HashMap<String, Arc<Mutex<()>>>>,
}

impl CacheStore {
    pub fn new(output_root: impl Into<PathBuf>, cache_root: impl Into<PathBuf>) -> Self {
        Self {
            output_root: output_root.into(),
            cache_root: cache_root.into(),
            session_locks: Mutex::new(HashMap::new()),
        }
    }

    pub fn output_root(&self) -> &Path {
        &self.output_root
    }

    fn entry_path(&self, key: &CacheKey) -> PathBuf {
        self.cache_root.join(format!("{}.json", key.as_str()))
    }

    fn manifest_path(&self, session: &SessionId) -> PathBuf {
        self.output_root.join(session.as_ref()).join("manifest.json")
    }

    fn session_lock(&self, session: &SessionId) -> Arc<Mutex<()>> {
        let mut locks = self.session_locks.lock().expect("session lock registry poisoned");
        locks.entry(session.as_ref().to_string()).or_default().clone()
    }

    /// Look up a prior artifact. A hit requires the referenced file to be
    /// present, non-empty, and to carry the extension expected for its
    /// kind; any failure degrades to a miss.
    pub fn get(&self, key: &CacheKey) -> Option<CachedArtifact> {
        let path = self.entry_path(key);
        let body = match std::fs::read_to_string(&path) {
            Ok(body) => body,
            Err(_) => return None,
        };
        let entry: CachedArtifact = match serde_json::from_str(&body) {
            Ok(entry) => entry,
            Err(e) => {
                tracing::warn!(key = %key, error = %e, "unreadable cache entry, treating as miss");
                return None;
            }
        };

        let file = self.output_root.join(&entry.file_path);
        let expected_ext = entry.kind.expected_extension();
        let valid = std::fs::metadata(&file).map(|m| m.len() > 0).unwrap_or(false)
            && (expected_ext.is_empty()
                || file
                    .extension()
                    .and_then(|e| e.to_str())
                    .map(|e| format!(".{}", e.to_lowercase()) == expected_ext)
                    .unwrap_or(false));
        if !valid {
            tracing::info!(key = %key, file = %file.display(), "stale cache entry, treating as miss");
            return None;
        }
        Some(entry)
    }

    /// Record a produced artifact under `key` and in the session manifest.
    ///
    /// Both writes are atomic (temp + rename); the session manifest update
    /// holds the per-session mutex. A failure leaves the run uncached but
    /// is reported to the caller.
    pub fn put(
        &self,
        key: &CacheKey,
        session: &SessionId,
        kind: ArtifactKind,
        file_path: &str,
        download_url: &str,
        content_hash: &str,
        metadata: Value,
    ) -> Result<CachedArtifact> {
        let entry = CachedArtifact {
            kind,
            session_id: session.clone(),
            file_path: file_path.to_string(),
            download_url: download_url.to_string(),
            content_hash: content_hash.to_string(),
            created_at: Utc::now(),
            metadata: metadata.clone(),
        };

        write_json_atomic(&self.entry_path(key), &entry)
            .map_err(|e| DocgenError::Cache(format!("cache entry write failed: {e}")))?;

        let lock = self.session_lock(session);
        let _guard = lock.lock().expect("session mutex poisoned");

        let mut manifest = self.load_manifest_unlocked(session).unwrap_or_default();
        manifest.record(
            kind,
            ArtifactEntry {
                file_path: entry.file_path.clone(),
                download_url: entry.download_url.clone(),
                content_hash: entry.content_hash.clone(),
                created_at: entry.created_at,
                metadata,
            },
        );
        write_json_atomic(&self.manifest_path(session), &manifest)
            .map_err(|e| DocgenError::Cache(format!("session manifest write failed: {e}")))?;

        tracing::info!(key = %key, session = %session, kind = %kind, "artifact cached");
        Ok(entry)
    }

    /// Read the session manifest, if one exists. Reads do not lock.
    pub fn session_manifest(&self, session: &SessionId) -> Option<SessionManifest> {
        self.load_manifest_unlocked(session)
    }

    fn load_manifest_unlocked(&self, session: &SessionId) -> Option<SessionManifest> {
        let body = std::fs::read_to_string(self.manifest_path(session)).ok()?;
        match serde_json::from_str(&body) {
            Ok(manifest) => Some(manifest),
            Err(e) => {
                tracing::warn!(session = %session, error = %e, "unreadable session manifest");
                None
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use docgen_core::Preferences;

    fn store() -> (tempfile::TempDir, CacheStore) {
        let dir = tempfile::tempdir().unwrap();
        let store = CacheStore::new(dir.path().join("output"), dir.path().join("cache"));
        (dir, store)
    }

    fn key_for(kind: ArtifactKind, model: &str) -> CacheKey {
        CacheKey::compute(kind, "gemini", model, None, &Preferences::default(), "digest")
    }

    #[test]
    fn test_key_stability_and_distinction() {
        let a = key_for(ArtifactKind::ArticleMarkdown, "m0");
        let b = key_for(ArtifactKind::ArticleMarkdown, "m0");
        let c = key_for(ArtifactKind::ArticleMarkdown, "m1");
        let d = key_for(ArtifactKind::ArticlePdf, "m0");
        assert_eq!(a, b);
        assert_ne!(a, c);
        assert_ne!(a, d);
    }

    #[test]
    fn test_get_misses_without_entry() {
        let (_dir, store) = store();
        assert!(store.get(&key_for(ArtifactKind::ArticleMarkdown, "m0")).is_none());
    }

    #[test]
    fn test_put_then_get_requires_valid_file() {
        let (_dir, store) = store();
        let session = SessionId::new("s1");
        let key = key_for(ArtifactKind::ArticleMarkdown, "m0");

        // Entry referencing a missing file is a miss.
        store
            .put(&key, &session, ArtifactKind::ArticleMarkdown, "s1/markdown/doc.md", "/dl/doc.md", "hash", Value::Null)
            .unwrap();
        assert!(store.get(&key).is_none());

        // Materialize the file and the hit comes back.
        let file = store.output_root().join("s1/markdown/doc.md");
        std::fs::create_dir_all(file.parent().unwrap()).unwrap();
        std::fs::write(&file, "# doc").unwrap();
        let hit = store.get(&key).unwrap();
        assert_eq!(hit.file_path, "s1/markdown/doc.md");
        assert_eq!(hit.content_hash, "hash");
    }

    #[test]
    fn test_empty_file_is_a_miss() {
        let (_dir, store) = store();
        let session = SessionId::new("s1");
        let key = key_for(ArtifactKind::ArticleMarkdown, "m0");
        let file = store.output_root().join("s1/markdown/doc.md");
        std::fs::create_dir_all(file.parent().unwrap()).unwrap();
        std::fs::write(&file, "").unwrap();
        store
            .put(&key, &session, ArtifactKind::ArticleMarkdown, "s1/markdown/doc.md", "/dl/doc.md", "hash", Value::Null)
            .unwrap();
        assert!(store.get(&key).is_none());
    }

    #[test]
    fn test_wrong_extension_is_a_miss() {
        let (_dir, store) = store();
        let session = SessionId::new("s1");
        let key = key_for(ArtifactKind::ArticlePdf, "m0");
        let file = store.output_root().join("s1/pdf/doc.txt");
        std::fs::create_dir_all(file.parent().unwrap()).unwrap();
        std::fs::write(&file, "not a pdf").unwrap();
        store
            .put(&key, &session, ArtifactKind::ArticlePdf, "s1/pdf/doc.txt", "/dl/doc.txt", "hash", Value::Null)
            .unwrap();
        assert!(store.get(&key).is_none());
    }

    #[test]
    fn test_manifest_accumulates_kinds() {
        let (_dir, store) = store();
        let session = SessionId::new("s1");
        for (kind, rel) in [
            (ArtifactKind::ArticleMarkdown, "s1/markdown/doc.md"),
            (ArtifactKind::ArticlePdf, "s1/pdf/doc.pdf"),
        ] {
            let file = store.output_root().join(rel);
            std::fs::create_dir_all(file.parent().unwrap()).unwrap();
            std::fs::write(&file, "content").unwrap();
            store
                .put(&key_for(kind, "m0"), &session, kind, rel, "/dl", "hash", Value::Null)
                .unwrap();
        }
        let manifest = store.session_manifest(&session).unwrap();
        assert_eq!(manifest.outputs_generated.len(), 2);
        assert!(manifest.artifact(ArtifactKind::ArticlePdf).is_some());
    }
}
