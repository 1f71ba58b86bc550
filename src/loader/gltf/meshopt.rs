//! `EXT_meshopt_compression` buffer views
//!
//! The extension object is read straight from the JSON, since the
//! document model does not expose unknown buffer-view extensions.
//! Decoding goes through the meshoptimizer decoders.

use serde::Deserialize;
use serde_json::Value;

use super::GltfError;

pub const EXTENSION: &str = "EXT_meshopt_compression";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum CompressionMode {
    Attributes,
    Triangles,
    Indices,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum CompressionFilter {
    #[default]
    None,
    Octahedral,
    Quaternion,
    Exponential,
}

/// Compression parameters of one buffer view
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CompressedView {
    pub buffer: usize,
    #[serde(default)]
    pub byte_offset: usize,
    pub byte_length: usize,
    pub byte_stride: usize,
    pub count: usize,
    pub mode: CompressionMode,
    #[serde(default)]
    pub filter: CompressionFilter,
}

impl CompressedView {
    /// Size of the decoded data
    pub fn decoded_len(&self) -> usize {
        self.count * self.byte_stride
    }
}

/// Collect the compressed buffer views of a glTF JSON root
pub fn compressed_views(root: &Value) -> Result<Vec<(usize, CompressedView)>, GltfError> {
    let Some(views) = root.get("bufferViews").and_then(Value::as_array) else {
        return Ok(Vec::new());
    };

    let mut compressed = Vec::new();
    for (index, view) in views.iter().enumerate() {
        if let Some(extension) = view.get("extensions").and_then(|ext| ext.get(EXTENSION)) {
            let parsed: CompressedView = serde_json::from_value(extension.clone())?;
            compressed.push((index, parsed));
        }
    }
    Ok(compressed)
}

/// Indices of buffers that only exist as meshopt fallbacks
pub fn fallback_buffers(root: &Value) -> Vec<usize> {
    let Some(buffers) = root.get("buffers").and_then(Value::as_array) else {
        return Vec::new();
    };

    buffers
        .iter()
        .enumerate()
        .filter(|(_, buffer)| {
            buffer
                .get("extensions")
                .and_then(|ext| ext.get(EXTENSION))
                .and_then(|ext| ext.get("fallback"))
                .and_then(Value::as_bool)
                .unwrap_or(false)
        })
        .map(|(index, _)| index)
        .collect()
}

/// Decode one compressed view from its source buffer
#[cfg(feature = "meshopt")]
pub fn decode(view: &CompressedView, source: &[u8]) -> Result<Vec<u8>, GltfError> {
    use std::os::raw::c_void;

    let encoded = source
        .get(view.byte_offset..view.byte_offset + view.byte_length)
        .ok_or_else(|| {
            GltfError::OutOfBounds(format!(
                "meshopt data {}..{} exceeds buffer of {} bytes",
                view.byte_offset,
                view.byte_offset + view.byte_length,
                source.len()
            ))
        })?;

    let mut decoded = vec![0u8; view.decoded_len()];
    let destination = decoded.as_mut_ptr() as *mut c_void;

    // SAFETY: `decoded` holds exactly `count * byte_stride` bytes, which is
    // the output size every decoder writes.
    let status = unsafe {
        match view.mode {
            CompressionMode::Attributes => ::meshopt::ffi::meshopt_decodeVertexBuffer(
                destination,
                view.count,
                view.byte_stride,
                encoded.as_ptr(),
                encoded.len(),
            ),
            CompressionMode::Triangles => ::meshopt::ffi::meshopt_decodeIndexBuffer(
                destination,
                view.count,
                view.byte_stride,
                encoded.as_ptr(),
                encoded.len(),
            ),
            CompressionMode::Indices => ::meshopt::ffi::meshopt_decodeIndexSequence(
                destination,
                view.count,
                view.byte_stride,
                encoded.as_ptr(),
                encoded.len(),
            ),
        }
    };

    if status != 0 {
        return Err(GltfError::Meshopt(format!(
            "{:?} decoder failed with status {status}",
            view.mode
        )));
    }

    // SAFETY: filters rewrite `count` elements of `byte_stride` bytes in place.
    unsafe {
        match view.filter {
            CompressionFilter::None => {}
            CompressionFilter::Octahedral => {
                ::meshopt::ffi::meshopt_decodeFilterOct(destination, view.count, view.byte_stride);
            }
            CompressionFilter::Quaternion => {
                ::meshopt::ffi::meshopt_decodeFilterQuat(destination, view.count, view.byte_stride);
            }
            CompressionFilter::Exponential => {
                ::meshopt::ffi::meshopt_decodeFilterExp(destination, view.count, view.byte_stride);
            }
        }
    }

    log::debug!(
        "Decoded meshopt view: {:?}/{:?}, {} x {} bytes",
        view.mode,
        view.filter,
        view.count,
        view.byte_stride
    );

    Ok(decoded)
}

#[cfg(not(feature = "meshopt"))]
pub fn decode(_view: &CompressedView, _source: &[u8]) -> Result<Vec<u8>, GltfError> {
    Err(GltfError::UnsupportedExtension(EXTENSION.to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_parse_compressed_views() {
        let root = json!({
            "bufferViews": [
                { "buffer": 1, "byteLength": 48 },
                {
                    "buffer": 1,
                    "byteLength": 48,
                    "extensions": {
                        "EXT_meshopt_compression": {
                            "buffer": 0,
                            "byteOffset": 16,
                            "byteLength": 30,
                            "byteStride": 12,
                            "count": 4,
                            "mode": "ATTRIBUTES",
                            "filter": "OCTAHEDRAL"
                        }
                    }
                }
            ]
        });

        let views = compressed_views(&root).unwrap();
        assert_eq!(views.len(), 1);
        let (index, view) = &views[0];
        assert_eq!(*index, 1);
        assert_eq!(view.mode, CompressionMode::Attributes);
        assert_eq!(view.filter, CompressionFilter::Octahedral);
        assert_eq!(view.decoded_len(), 48);
    }

    #[test]
    fn test_default_filter_and_offset() {
        let root = json!({
            "bufferViews": [{
                "buffer": 0,
                "byteLength": 12,
                "extensions": {
                    "EXT_meshopt_compression": {
                        "buffer": 0, "byteLength": 10, "byteStride": 2,
                        "count": 6, "mode": "TRIANGLES"
                    }
                }
            }]
        });
        let (_, view) = compressed_views(&root).unwrap().remove(0);
        assert_eq!(view.filter, CompressionFilter::None);
        assert_eq!(view.byte_offset, 0);
    }

    #[test]
    fn test_fallback_buffers() {
        let root = json!({
            "buffers": [
                { "byteLength": 10, "uri": "data.bin" },
                { "byteLength": 64, "extensions": { "EXT_meshopt_compression": { "fallback": true } } }
            ]
        });
        assert_eq!(fallback_buffers(&root), vec![1]);
    }

    #[cfg(feature = "meshopt")]
    #[test]
    fn test_decode_rejects_truncated_source() {
        let view = CompressedView {
            buffer: 0,
            byte_offset: 0,
            byte_length: 32,
            byte_stride: 4,
            count: 3,
            mode: CompressionMode::Attributes,
            filter: CompressionFilter::None,
        };
        assert!(decode(&view, &[0u8; 8]).is_err());
    }
}
