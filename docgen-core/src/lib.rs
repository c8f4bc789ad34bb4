//! Core types for the docgen generation engine.
//!
//! This crate defines the vocabulary shared by every other crate in the
//! workspace: source descriptors, the unified [`WorkflowState`] passed
//! between graph nodes, structured-content records, the error taxonomy,
//! streaming event payloads, and the lenient JSON parsing used on model
//! output.

pub mod config;
pub mod error;
pub mod events;
pub mod json;
pub mod state;
pub mod types;

pub use config::Settings;
pub use error::{DocgenError, ErrorCode, Result, classify_message, is_retryable_message};
pub use events::{
    CacheHitEvent, CompleteEvent, ErrorEvent, OutputMetadata, ProgressEvent, StepGroup,
    WorkflowEvent, progress_for_step,
};
pub use json::safe_json_parse;
pub use state::{
    BranchParams, DialogueLine, FaqData, FaqItem, ImageOutput, ImageType, MarkerType, MindMapNode,
    MindMapTree, PodcastOutput, PodcastScript, Preferences, Section, SectionImage, SlideContent,
    Speaker, StructuredContent, VisualMarker, WorkflowState,
};
pub use types::{
    ArtifactKind, ContentFormat, FileId, Provider, SessionId, Source, canonical_source_digest,
    content_hash, slugify,
};
