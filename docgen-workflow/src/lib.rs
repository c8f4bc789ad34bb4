//! Workflow definitions and node implementations for the docgen engine.
//!
//! Five branch topologies (document, podcast, mind map, FAQ, image) share
//! a common ingest/summarize prefix and route on the requested artifact
//! kind. Every node is a thin coordinator over collaborators: the LLM
//! gateway, the cache store, source parsers, document renderers, and the
//! speech/image providers.

pub mod context;
pub mod definitions;
pub mod nodes;
pub mod parsers;
pub mod prompts;
pub mod render;
pub mod sections;
pub mod summary;

pub use context::WorkflowContext;
pub use definitions::{apply_step_metadata, build_graph};
pub use parsers::{ParsedDocument, ParserRegistry, SourceParser, WebParser};
pub use render::{DocumentRenderer, MarkdownRenderer, RendererRegistry, SimplePdfRenderer};
pub use sections::parse_sections;
