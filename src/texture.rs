//! Texture loading and shared texture resources
//!
//! Textures are decoded once and shared between materials through
//! [`TextureRef`]. Releasing is explicit: whoever drops the last material
//! using a texture calls [`Texture::dispose`] so the renderer can free the
//! GPU copy.

use image::ImageFormat;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use thiserror::Error;

/// Error type for texture loading operations
#[derive(Error, Debug)]
pub enum TextureError {
    #[error("Image decoding error: {0}")]
    DecodeError(String),

    #[error("Unsupported format: {0}")]
    UnsupportedFormat(String),
}

/// Supported texture formats
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TextureFormat {
    Rgba8,
}

/// A decoded texture
#[derive(Debug)]
pub struct Texture {
    /// Optional name (image name or source locator)
    pub name: Option<String>,
    pub width: u32,
    pub height: u32,
    pub format: TextureFormat,
    pub data: Vec<u8>,
    disposed: AtomicBool,
}

/// Shared handle to a texture
pub type TextureRef = Arc<Texture>;

impl Texture {
    /// Create a texture from raw RGBA8 pixels
    pub fn new(name: Option<String>, width: u32, height: u32, data: Vec<u8>) -> Self {
        Self {
            name,
            width,
            height,
            format: TextureFormat::Rgba8,
            data,
            disposed: AtomicBool::new(false),
        }
    }

    /// Create a 1×1 texture of a single color (placeholders and tests)
    pub fn solid(name: impl Into<String>, rgba: [u8; 4]) -> TextureRef {
        Arc::new(Self::new(Some(name.into()), 1, 1, rgba.to_vec()))
    }

    /// Mark the texture as released
    ///
    /// Returns `true` the first time it is called.
    pub fn dispose(&self) -> bool {
        !self.disposed.swap(true, Ordering::AcqRel)
    }

    /// Whether the texture has been released
    pub fn is_disposed(&self) -> bool {
        self.disposed.load(Ordering::Acquire)
    }
}

/// Decodes image files into textures
#[derive(Default, Clone, Debug)]
pub struct TextureLoader;

impl TextureLoader {
    /// Create a new texture loader
    pub fn new() -> Self {
        Self
    }

    /// Decode PNG or JPEG bytes
    ///
    /// `mime_type` is only a hint; the actual format is sniffed from the data.
    pub fn load(
        &self,
        name: Option<String>,
        data: &[u8],
        mime_type: Option<&str>,
    ) -> Result<Texture, TextureError> {
        let format = match image::guess_format(data) {
            Ok(format) => format,
            Err(err) => match mime_type.and_then(ImageFormat::from_mime_type) {
                Some(format) => format,
                None => return Err(TextureError::DecodeError(err.to_string())),
            },
        };

        match format {
            ImageFormat::Jpeg | ImageFormat::Png => {}
            _ => {
                return Err(TextureError::UnsupportedFormat(format!(
                    "Only JPG/JPEG and PNG formats are supported, got {:?}",
                    format.extensions_str()
                )))
            }
        }

        let img = image::load_from_memory_with_format(data, format)
            .map_err(|e| TextureError::DecodeError(e.to_string()))?;

        let rgba_img = img.into_rgba8();
        let (width, height) = rgba_img.dimensions();
        log::debug!(
            "Decoded texture {} ({width}x{height})",
            name.as_deref().unwrap_or("unnamed")
        );

        Ok(Texture::new(name, width, height, rgba_img.into_raw()))
    }

    /// Decode and wrap in a shared handle
    pub fn load_shared(
        &self,
        name: Option<String>,
        data: &[u8],
        mime_type: Option<&str>,
    ) -> Result<TextureRef, TextureError> {
        self.load(name, data, mime_type).map(Arc::new)
    }
}
