//! Accessor decoding
//!
//! Reads accessors of any component type into `f32`/`u32` values, so
//! `KHR_mesh_quantization` attributes (integer positions, normals and
//! texture coordinates) come out dequantized.

use std::collections::HashMap;

use gltf::accessor::{DataType, Dimensions};
use gltf::Accessor;

use super::GltfError;

/// Resolved buffer contents plus decompressed buffer views
#[derive(Debug, Default)]
pub struct BufferSet {
    buffers: Vec<Vec<u8>>,
    views: HashMap<usize, Vec<u8>>,
}

impl BufferSet {
    pub fn new(buffers: Vec<Vec<u8>>) -> Self {
        Self {
            buffers,
            views: HashMap::new(),
        }
    }

    /// Replace the contents of a buffer view (decompressed data)
    pub fn override_view(&mut self, view: usize, data: Vec<u8>) {
        self.views.insert(view, data);
    }

    pub fn buffer(&self, index: usize) -> Result<&[u8], GltfError> {
        self.buffers
            .get(index)
            .map(Vec::as_slice)
            .ok_or(GltfError::MissingBuffer(index))
    }

    /// Bytes of a buffer view
    pub fn view_bytes(&self, view: &gltf::buffer::View) -> Result<&[u8], GltfError> {
        if let Some(data) = self.views.get(&view.index()) {
            return Ok(data);
        }

        let buffer = self.buffer(view.buffer().index())?;
        let start = view.offset();
        let end = start + view.length();
        buffer.get(start..end).ok_or_else(|| {
            GltfError::OutOfBounds(format!(
                "buffer view {} ({start}..{end}) exceeds buffer of {} bytes",
                view.index(),
                buffer.len()
            ))
        })
    }
}

fn component_size(data_type: DataType) -> usize {
    match data_type {
        DataType::I8 | DataType::U8 => 1,
        DataType::I16 | DataType::U16 => 2,
        DataType::U32 | DataType::F32 => 4,
    }
}

fn component_count(dimensions: Dimensions) -> usize {
    match dimensions {
        Dimensions::Scalar => 1,
        Dimensions::Vec2 => 2,
        Dimensions::Vec3 => 3,
        Dimensions::Vec4 | Dimensions::Mat2 => 4,
        Dimensions::Mat3 => 9,
        Dimensions::Mat4 => 16,
    }
}

/// Tightly packed element bytes of an accessor, sparse values applied
fn element_bytes(buffers: &BufferSet, accessor: &Accessor) -> Result<Vec<u8>, GltfError> {
    let element_size = component_size(accessor.data_type()) * component_count(accessor.dimensions());
    let count = accessor.count();

    let mut packed = match accessor.view() {
        Some(view) => {
            let data = buffers.view_bytes(&view)?;
            let stride = view.stride().unwrap_or(element_size).max(element_size);
            let offset = accessor.offset();

            if count > 0 {
                let last = offset + stride * (count - 1) + element_size;
                if last > data.len() {
                    return Err(GltfError::OutOfBounds(format!(
                        "accessor {} needs {last} bytes, view has {}",
                        accessor.index(),
                        data.len()
                    )));
                }
            }

            let mut packed = Vec::with_capacity(count * element_size);
            for element in 0..count {
                let start = offset + element * stride;
                packed.extend_from_slice(&data[start..start + element_size]);
            }
            packed
        }
        None => vec![0; count * element_size],
    };

    if let Some(sparse) = accessor.sparse() {
        let indices_view = sparse.indices().view();
        let index_data = buffers.view_bytes(&indices_view)?;
        let index_offset = sparse.indices().offset();
        let index_size = match sparse.indices().index_type() {
            gltf::accessor::sparse::IndexType::U8 => 1,
            gltf::accessor::sparse::IndexType::U16 => 2,
            gltf::accessor::sparse::IndexType::U32 => 4,
        };

        let values_view = sparse.values().view();
        let value_data = buffers.view_bytes(&values_view)?;
        let value_offset = sparse.values().offset();

        for entry in 0..sparse.count() {
            let at = index_offset + entry * index_size;
            let raw = index_data.get(at..at + index_size).ok_or_else(|| {
                GltfError::OutOfBounds(format!("sparse indices of accessor {}", accessor.index()))
            })?;
            let target = match index_size {
                1 => raw[0] as usize,
                2 => u16::from_le_bytes([raw[0], raw[1]]) as usize,
                _ => u32::from_le_bytes([raw[0], raw[1], raw[2], raw[3]]) as usize,
            };

            let source = value_offset + entry * element_size;
            let value = value_data.get(source..source + element_size).ok_or_else(|| {
                GltfError::OutOfBounds(format!("sparse values of accessor {}", accessor.index()))
            })?;
            let destination = target * element_size;
            packed
                .get_mut(destination..destination + element_size)
                .ok_or_else(|| {
                    GltfError::OutOfBounds(format!(
                        "sparse index {target} of accessor {}",
                        accessor.index()
                    ))
                })?
                .copy_from_slice(value);
        }
    }

    Ok(packed)
}

/// Read an accessor as flat `f32` components
///
/// Normalized integers map to [0, 1] (unsigned) or [-1, 1] (signed);
/// other integers convert by value.
pub fn read_f32(buffers: &BufferSet, accessor: &Accessor) -> Result<Vec<f32>, GltfError> {
    let bytes = element_bytes(buffers, accessor)?;
    let normalized = accessor.normalized();

    let values = match accessor.data_type() {
        DataType::F32 => bytes
            .chunks_exact(4)
            .map(|c| f32::from_le_bytes([c[0], c[1], c[2], c[3]]))
            .collect(),
        DataType::U8 => bytes
            .iter()
            .map(|&v| if normalized { v as f32 / 255.0 } else { v as f32 })
            .collect(),
        DataType::I8 => bytes
            .iter()
            .map(|&v| {
                let v = v as i8 as f32;
                if normalized {
                    (v / 127.0).max(-1.0)
                } else {
                    v
                }
            })
            .collect(),
        DataType::U16 => bytes
            .chunks_exact(2)
            .map(|c| {
                let v = u16::from_le_bytes([c[0], c[1]]) as f32;
                if normalized {
                    v / 65535.0
                } else {
                    v
                }
            })
            .collect(),
        DataType::I16 => bytes
            .chunks_exact(2)
            .map(|c| {
                let v = i16::from_le_bytes([c[0], c[1]]) as f32;
                if normalized {
                    (v / 32767.0).max(-1.0)
                } else {
                    v
                }
            })
            .collect(),
        DataType::U32 => bytes
            .chunks_exact(4)
            .map(|c| {
                let v = u32::from_le_bytes([c[0], c[1], c[2], c[3]]);
                if normalized {
                    v as f32 / u32::MAX as f32
                } else {
                    v as f32
                }
            })
            .collect(),
    };

    Ok(values)
}

/// Read an accessor as fixed-width vectors
pub fn read_vectors<const N: usize>(
    buffers: &BufferSet,
    accessor: &Accessor,
) -> Result<Vec<[f32; N]>, GltfError> {
    let components = component_count(accessor.dimensions());
    if components != N {
        return Err(GltfError::Accessor(format!(
            "accessor {} has {components} components, expected {N}",
            accessor.index()
        )));
    }

    let flat = read_f32(buffers, accessor)?;
    Ok(flat
        .chunks_exact(N)
        .map(|chunk| {
            let mut vector = [0.0; N];
            vector.copy_from_slice(chunk);
            vector
        })
        .collect())
}

/// Read an index accessor
pub fn read_indices(buffers: &BufferSet, accessor: &Accessor) -> Result<Vec<u32>, GltfError> {
    if accessor.dimensions() != Dimensions::Scalar {
        return Err(GltfError::Accessor(format!(
            "index accessor {} is not scalar",
            accessor.index()
        )));
    }

    let bytes = element_bytes(buffers, accessor)?;
    match accessor.data_type() {
        DataType::U8 => Ok(bytes.iter().map(|&v| v as u32).collect()),
        DataType::U16 => Ok(bytes
            .chunks_exact(2)
            .map(|c| u16::from_le_bytes([c[0], c[1]]) as u32)
            .collect()),
        DataType::U32 => Ok(bytes
            .chunks_exact(4)
            .map(|c| u32::from_le_bytes([c[0], c[1], c[2], c[3]]))
            .collect()),
        other => Err(GltfError::Accessor(format!(
            "index accessor {} has component type {other:?}",
            accessor.index()
        ))),
    }
}

/// Read vertex colors as RGBA, accepting RGB input
pub fn read_colors(buffers: &BufferSet, accessor: &Accessor) -> Result<Vec<[f32; 4]>, GltfError> {
    match accessor.dimensions() {
        Dimensions::Vec3 => Ok(read_vectors::<3>(buffers, accessor)?
            .into_iter()
            .map(|[r, g, b]| [r, g, b, 1.0])
            .collect()),
        _ => read_vectors::<4>(buffers, accessor),
    }
}
