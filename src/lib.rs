//! archetype_import - Asset import and normalization pipeline
//!
//! # Features
//! - Format routing by extension (glTF/GLB, Collada, LDraw)
//! - Async decoding over a pluggable resource fetcher
//! - Meshopt-compressed and quantized glTF geometry
//! - Semi-transparent materials rewritten as transmissive materials
//! - Unit bounding-sphere normalization with caller placement
//! - Monotonic two-phase progress reporting
//!
//! # Quick Start
//!
//! ```ignore
//! use std::sync::Arc;
//! use archetype_import::{FileFetcher, ImportPipeline, ImportRequest, LogProgress};
//!
//! let pipeline = ImportPipeline::new(Arc::new(FileFetcher::new()), Arc::new(LogProgress));
//! let result = pipeline.import(&ImportRequest::new("models/duck.glb").with_scale(2.0)).await?;
//! println!("{} nodes", result.root.node_count());
//! ```
//!
//! # Feature Flags
//!
//! - `meshopt` (default): decode `EXT_meshopt_compression` buffer views
//! - `runtime-tokio`: filesystem fetcher built on Tokio

// Core modules
pub mod fetch;
pub mod format;
pub mod loader;
pub mod material;
pub mod pipeline;
pub mod progress;
pub mod spatial;

// Support modules
pub mod config;
pub mod geometry;
pub mod scene;
pub mod texture;

// Error types
mod error;
pub use error::{DecodeError, ImportError, Result};

// Re-export pipeline types
pub use config::{LDrawConfig, PipelineConfig, ProgressConfig, TransmissionConfig};
pub use pipeline::{ImportPipeline, ImportRequest, ImportResult, PipelineState};

// Re-export fetch types
#[cfg(feature = "runtime-tokio")]
pub use fetch::FileFetcher;
pub use fetch::{FetchError, MemoryFetcher, ResourceFetcher};

// Re-export format and importer types
pub use format::{ImporterKind, ModelFormat};
pub use loader::{
    ColladaError, ColladaImporter, FormatImporter, GltfError, GltfImporter, Importer, Importers,
    LDrawError, LDrawImporter,
};

// Re-export progress types
pub use progress::{LogProgress, NullProgress, Phase, ProgressAggregator, ProgressSink, RecordingProgress};

// Re-export scene types
pub use geometry::{Geometry, PrimitiveType, Vertex};
pub use material::{
    Color, MaterialCanonicalizer, MaterialDescriptor, MaterialKind, MaterialProperty, MaterialRef,
    PropertyValue, Side,
};
pub use scene::{Mesh, ModelSlot, SceneNode, Transform};
pub use spatial::{Aabb, BoundingSphere, Normalization, Placement, SpatialNormalizer};
pub use texture::{Texture, TextureError, TextureLoader, TextureRef};

// Version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_version() {
        assert!(!VERSION.is_empty());
    }

    #[test]
    fn test_every_format_has_an_importer() {
        let importers = Importers::default();
        for format in ModelFormat::ALL {
            assert_eq!(importers.get(format.importer_kind()).kind(), format.importer_kind());
        }
    }
}
