//! Node implementations for the five workflow branches.

pub mod document;
pub mod enhance;
pub mod faq;
pub mod image_branch;
pub mod images;
pub mod ingest;
pub mod mindmap;
pub mod output;
pub mod podcast;
pub mod summarize;
pub mod transform;

pub use document::{DetectFormatNode, ParseDocumentContentNode};
pub use enhance::EnhanceContentNode;
pub use faq::GenerateFaqNode;
pub use image_branch::{EditImageNode, GenerateImageNode};
pub use images::{DescribeImagesNode, GenerateImagesNode, PersistImageManifestNode};
pub use ingest::IngestSourcesNode;
pub use mindmap::GenerateMindmapNode;
pub use output::{GenerateOutputNode, ValidateOutputNode};
pub use podcast::{GeneratePodcastScriptNode, SynthesizePodcastAudioNode};
pub use summarize::SummarizeSourcesNode;
pub use transform::TransformContentNode;
