//! Fixtures shared by the integration tests
//!
//! Models are built in code: a glTF cube with configurable material and
//! textures, Collada documents, and LDraw files.

#![allow(dead_code)]

use std::io::Cursor;
use std::sync::Arc;

use archetype_import::{
    ImportPipeline, MemoryFetcher, PipelineConfig, ProgressAggregator, RecordingProgress,
};
use base64::{engine::general_purpose::STANDARD, Engine};
use serde_json::{json, Value};

pub const CUBE_INDICES: [u16; 36] = [
    0, 1, 2, 0, 2, 3, // -Z
    4, 6, 5, 4, 7, 6, // +Z
    0, 4, 5, 0, 5, 1, // -Y
    3, 2, 6, 3, 6, 7, // +Y
    0, 3, 7, 0, 7, 4, // -X
    1, 5, 6, 1, 6, 2, // +X
];

pub fn cube_positions(half: f32) -> Vec<[f32; 3]> {
    vec![
        [-half, -half, -half],
        [half, -half, -half],
        [half, half, -half],
        [-half, half, -half],
        [-half, -half, half],
        [half, -half, half],
        [half, half, half],
        [-half, half, half],
    ]
}

fn pad(data: &mut Vec<u8>, byte: u8) {
    while data.len() % 4 != 0 {
        data.push(byte);
    }
}

/// Encode a 2x2 PNG filled with `rgba`
pub fn png(rgba: [u8; 4]) -> Vec<u8> {
    let image = image::RgbaImage::from_pixel(2, 2, image::Rgba(rgba));
    let mut bytes = Cursor::new(Vec::new());
    image
        .write_to(&mut bytes, image::ImageFormat::Png)
        .unwrap();
    bytes.into_inner()
}

/// glTF cube under construction
#[derive(Debug, Clone)]
pub struct GltfFixture {
    pub json: Value,
    pub bin: Vec<u8>,
}

impl GltfFixture {
    /// Axis-aligned cube of edge `2 * half` centred on the origin
    pub fn cube(half: f32) -> Self {
        let mut bin: Vec<u8> = Vec::new();
        for position in cube_positions(half) {
            for component in position {
                bin.extend_from_slice(&component.to_le_bytes());
            }
        }
        for index in CUBE_INDICES {
            bin.extend_from_slice(&index.to_le_bytes());
        }

        let json = json!({
            "asset": { "version": "2.0", "generator": "fixture" },
            "scene": 0,
            "scenes": [{ "name": "Scene", "nodes": [0] }],
            "nodes": [{ "name": "Cube", "mesh": 0 }],
            "meshes": [{
                "name": "Cube",
                "primitives": [{
                    "attributes": { "POSITION": 0 },
                    "indices": 1,
                    "material": 0
                }]
            }],
            "materials": [{ "name": "Surface" }],
            "accessors": [
                {
                    "bufferView": 0,
                    "componentType": 5126,
                    "count": 8,
                    "type": "VEC3",
                    "min": [-half, -half, -half],
                    "max": [half, half, half]
                },
                {
                    "bufferView": 1,
                    "componentType": 5123,
                    "count": 36,
                    "type": "SCALAR"
                }
            ],
            "bufferViews": [
                { "buffer": 0, "byteOffset": 0, "byteLength": 96, "target": 34962 },
                { "buffer": 0, "byteOffset": 96, "byteLength": 72, "target": 34963 }
            ],
            "buffers": [{ "byteLength": 168 }]
        });

        Self { json, bin }
    }

    /// Replace the cube's material
    pub fn with_material(mut self, material: Value) -> Self {
        self.json["materials"][0] = material;
        self
    }

    /// Place the cube node
    pub fn with_node(mut self, node: Value) -> Self {
        let mut node = node;
        node["mesh"] = json!(0);
        self.json["nodes"][0] = node;
        self
    }

    /// Embed `image` in the binary chunk and return its texture index
    pub fn add_texture(&mut self, image: &[u8]) -> usize {
        pad(&mut self.bin, 0);
        let offset = self.bin.len();
        self.bin.extend_from_slice(image);

        let views = self.json["bufferViews"].as_array_mut().unwrap();
        views.push(json!({ "buffer": 0, "byteOffset": offset, "byteLength": image.len() }));
        let view = views.len() - 1;

        let images = self.json.as_object_mut().unwrap()
            .entry("images")
            .or_insert_with(|| json!([]))
            .as_array_mut()
            .unwrap();
        images.push(json!({ "bufferView": view, "mimeType": "image/png" }));
        let image_index = images.len() - 1;

        let textures = self.json.as_object_mut().unwrap()
            .entry("textures")
            .or_insert_with(|| json!([]))
            .as_array_mut()
            .unwrap();
        textures.push(json!({ "source": image_index }));
        textures.len() - 1
    }

    fn finished_json(&self, uri: Option<String>) -> Value {
        let mut json = self.json.clone();
        json["buffers"][0]["byteLength"] = json!(self.bin.len());
        if let Some(uri) = uri {
            json["buffers"][0]["uri"] = json!(uri);
        }
        json
    }

    /// Binary container
    pub fn glb(&self) -> Vec<u8> {
        glb(&self.finished_json(None), &self.bin)
    }

    /// JSON file with the buffer as a base64 `data:` URI
    pub fn gltf_embedded(&self) -> Vec<u8> {
        let uri = format!(
            "data:application/octet-stream;base64,{}",
            STANDARD.encode(&self.bin)
        );
        serde_json::to_vec(&self.finished_json(Some(uri))).unwrap()
    }

    /// JSON file referencing an external buffer named `buffer_uri`
    pub fn gltf_external(&self, buffer_uri: &str) -> (Vec<u8>, Vec<u8>) {
        let json = self.finished_json(Some(buffer_uri.to_string()));
        (serde_json::to_vec(&json).unwrap(), self.bin.clone())
    }
}

/// Assemble a GLB container from a JSON root and binary chunk
pub fn glb(json: &Value, bin: &[u8]) -> Vec<u8> {
    let mut json_chunk = serde_json::to_vec(json).unwrap();
    pad(&mut json_chunk, b' ');
    let mut bin_chunk = bin.to_vec();
    pad(&mut bin_chunk, 0);

    let total = 12 + 8 + json_chunk.len() + 8 + bin_chunk.len();
    let mut out = Vec::with_capacity(total);
    out.extend_from_slice(b"glTF");
    out.extend_from_slice(&2u32.to_le_bytes());
    out.extend_from_slice(&(total as u32).to_le_bytes());
    out.extend_from_slice(&(json_chunk.len() as u32).to_le_bytes());
    out.extend_from_slice(b"JSON");
    out.extend_from_slice(&json_chunk);
    out.extend_from_slice(&(bin_chunk.len() as u32).to_le_bytes());
    out.extend_from_slice(b"BIN\0");
    out.extend_from_slice(&bin_chunk);
    out
}

/// Pipeline over an in-memory fetcher with a recording sink
pub fn pipeline(fetcher: Arc<MemoryFetcher>) -> (ImportPipeline, Arc<RecordingProgress>) {
    pipeline_with_config(fetcher, PipelineConfig::default())
}

pub fn pipeline_with_config(
    fetcher: Arc<MemoryFetcher>,
    config: PipelineConfig,
) -> (ImportPipeline, Arc<RecordingProgress>) {
    let sink = Arc::new(RecordingProgress::new());
    let pipeline = ImportPipeline::with_config(fetcher, sink.clone(), config);
    (pipeline, sink)
}

/// Aggregator whose reports are discarded
pub fn quiet_progress() -> ProgressAggregator {
    ProgressAggregator::new(Arc::new(archetype_import::NullProgress))
}

pub fn assert_monotonic(values: &[f32]) {
    for pair in values.windows(2) {
        assert!(pair[0] <= pair[1], "progress went backwards: {values:?}");
    }
}

pub fn init_logging() {
    let _ = env_logger::builder().is_test(true).try_init();
}
