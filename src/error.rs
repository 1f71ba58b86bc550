//! Error types for archetype_import

use thiserror::Error;

use crate::fetch::FetchError;
use crate::loader::collada::ColladaError;
use crate::loader::gltf::GltfError;
use crate::loader::ldraw::LDrawError;
use crate::texture::TextureError;

/// Terminal outcome of a failed import request
///
/// None of these are retried by the pipeline; the caller decides whether
/// to retry, skip or abort.
#[derive(Error, Debug)]
pub enum ImportError {
    /// The locator's extension is not in the format registry
    #[error("Model format not supported: {0}")]
    UnsupportedFormat(String),

    /// A format decoder failed while reading the model or one of its resources
    #[error("Failed to decode {locator}: {source}")]
    Decode {
        locator: String,
        #[source]
        source: DecodeError,
    },

    /// Normalization could not derive a positive bounding-sphere radius
    #[error("Degenerate geometry: {0}")]
    DegenerateGeometry(String),
}

impl ImportError {
    /// Wrap a decoder failure for `locator`
    pub fn decode(locator: impl Into<String>, source: impl Into<DecodeError>) -> Self {
        Self::Decode {
            locator: locator.into(),
            source: source.into(),
        }
    }
}

/// Underlying cause of an [`ImportError::Decode`]
#[derive(Error, Debug)]
pub enum DecodeError {
    #[error("Fetch error: {0}")]
    Fetch(#[from] FetchError),

    #[error("glTF error: {0}")]
    Gltf(#[from] GltfError),

    #[error("Collada error: {0}")]
    Collada(#[from] ColladaError),

    #[error("LDraw error: {0}")]
    LDraw(#[from] LDrawError),

    #[error("Texture error: {0}")]
    Texture(#[from] TextureError),
}

/// Result type alias for import operations
pub type Result<T> = std::result::Result<T, ImportError>;

#[cfg(test)]
mod tests {
    use super::*;
    use std::error::Error as _;

    #[test]
    fn test_decode_error_keeps_cause() {
        let err = ImportError::decode("a.glb", FetchError::NotFound("a.glb".to_string()));
        assert!(err.to_string().contains("a.glb"));

        let source = err.source().expect("decode errors carry a source");
        assert!(source.to_string().contains("Fetch error"));
    }

    #[test]
    fn test_unsupported_format_message() {
        let err = ImportError::UnsupportedFormat("model.obj".to_string());
        assert_eq!(err.to_string(), "Model format not supported: model.obj");
    }
}
