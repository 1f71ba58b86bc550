//! Integration tests for the glTF / GLB importer

mod common;

use std::sync::Arc;

use archetype_import::{
    DecodeError, FetchError, GltfImporter, MaterialKind, MaterialProperty, MemoryFetcher,
    SceneNode,
};
use common::{png, quiet_progress, GltfFixture};
use futures::executor::block_on;
use serde_json::json;

fn decode(fetcher: &MemoryFetcher, locator: &str) -> Result<SceneNode, DecodeError> {
    block_on(GltfImporter::new().decode(locator, fetcher, &quiet_progress()))
}

fn positions(root: &SceneNode) -> Vec<[f32; 3]> {
    root.meshes()
        .iter()
        .flat_map(|mesh| mesh.geometry.vertices.iter().map(|v| v.position))
        .collect()
}

#[test]
fn test_glb_cube() {
    common::init_logging();
    let fetcher = MemoryFetcher::new().with_resource("cube.glb", GltfFixture::cube(5.0).glb());

    let root = decode(&fetcher, "cube.glb").unwrap();
    assert_eq!(root.name.as_deref(), Some("Scene"));
    assert_eq!(root.children.len(), 1);

    let mesh = root.children[0].mesh.as_ref().unwrap();
    assert_eq!(mesh.geometry.vertex_count(), 8);
    assert_eq!(mesh.geometry.index_count(), 36);
    assert_ne!(mesh.geometry.vertices[0].normal, [0.0, 0.0, 0.0]);

    let material = mesh.material.read();
    assert_eq!(material.kind(), MaterialKind::Standard);
    assert_eq!(material.name(), Some("Surface"));
    assert_eq!(material.opacity(), 1.0);
}

#[test]
fn test_buffer_sources_agree() {
    let fixture = GltfFixture::cube(2.0);
    let (json, bin) = fixture.gltf_external("cube.bin");
    let fetcher = MemoryFetcher::new()
        .with_resource("models/cube.glb", fixture.glb())
        .with_resource("models/embedded.gltf", fixture.gltf_embedded())
        .with_resource("models/external.gltf?v=3", json)
        .with_resource("models/cube.bin", bin);

    let binary = positions(&decode(&fetcher, "models/cube.glb").unwrap());
    let embedded = positions(&decode(&fetcher, "models/embedded.gltf").unwrap());
    let external = positions(&decode(&fetcher, "models/external.gltf?v=3").unwrap());

    assert_eq!(binary, embedded);
    assert_eq!(binary, external);
    assert_eq!(fetcher.request_count_for("models/cube.bin"), 1);
}

#[test]
fn test_missing_external_buffer_fails() {
    let (json, _) = GltfFixture::cube(1.0).gltf_external("gone.bin");
    let fetcher = MemoryFetcher::new().with_resource("cube.gltf", json);

    let err = decode(&fetcher, "cube.gltf").unwrap_err();
    assert!(matches!(err, DecodeError::Fetch(FetchError::NotFound(_))));
}

#[test]
fn test_embedded_texture_and_alpha() {
    let mut fixture = GltfFixture::cube(1.0);
    let texture = fixture.add_texture(&png([200, 10, 10, 255]));
    let fixture = fixture.with_material(json!({
        "name": "Glass",
        "alphaMode": "BLEND",
        "pbrMetallicRoughness": {
            "baseColorFactor": [0.2, 0.4, 0.6, 0.5],
            "baseColorTexture": { "index": texture },
            "metallicFactor": 0.0,
            "roughnessFactor": 0.1
        }
    }));
    let fetcher = MemoryFetcher::new().with_resource("glass.glb", fixture.glb());

    let root = decode(&fetcher, "glass.glb").unwrap();
    let material = root.materials()[0].read().clone();
    assert_eq!(material.opacity(), 0.5);
    assert_eq!(material.flag(MaterialProperty::Transparent), Some(true));
    assert_eq!(material.scalar(MaterialProperty::Roughness), Some(0.1));

    let map = material.texture(MaterialProperty::Map).unwrap();
    assert_eq!((map.width, map.height), (2, 2));
    assert_eq!(&map.data[..4], &[200, 10, 10, 255]);
}

#[test]
fn test_multi_primitive_mesh_shares_material() {
    let mut fixture = GltfFixture::cube(1.0);
    let primitive = fixture.json["meshes"][0]["primitives"][0].clone();
    fixture.json["meshes"][0]["primitives"]
        .as_array_mut()
        .unwrap()
        .push(primitive);
    let fetcher = MemoryFetcher::new().with_resource("two.glb", fixture.glb());

    let root = decode(&fetcher, "two.glb").unwrap();
    let node = &root.children[0];
    assert!(node.mesh.is_none());
    let names: Vec<_> = node.children.iter().map(|c| c.name.clone().unwrap()).collect();
    assert_eq!(names, vec!["Cube_0", "Cube_1"]);

    let first = &node.children[0].mesh.as_ref().unwrap().material;
    let second = &node.children[1].mesh.as_ref().unwrap().material;
    assert!(Arc::ptr_eq(first, second));
    assert_eq!(root.materials().len(), 1);
}

#[test]
fn test_node_transform_is_kept() {
    let fixture = GltfFixture::cube(1.0).with_node(json!({
        "name": "Moved",
        "translation": [1.0, 2.0, 3.0],
        "scale": [2.0, 2.0, 2.0]
    }));
    let fetcher = MemoryFetcher::new().with_resource("moved.glb", fixture.glb());

    let root = decode(&fetcher, "moved.glb").unwrap();
    let node = &root.children[0];
    assert_eq!(node.name.as_deref(), Some("Moved"));
    assert_eq!(node.transform.translation, glam::Vec3::new(1.0, 2.0, 3.0));
    assert_eq!(node.transform.scale, glam::Vec3::splat(2.0));
}

#[test]
fn test_truncated_glb_fails() {
    let mut data = GltfFixture::cube(1.0).glb();
    data.truncate(40);
    let fetcher = MemoryFetcher::new().with_resource("broken.glb", data);

    assert!(matches!(
        decode(&fetcher, "broken.glb"),
        Err(DecodeError::Gltf(_))
    ));
}

#[cfg(feature = "meshopt")]
mod compressed {
    use super::*;
    use common::{cube_positions, glb, CUBE_INDICES};
    use std::os::raw::c_void;

    fn encode_vertices(positions: &[[f32; 3]]) -> Vec<u8> {
        unsafe {
            let bound = meshopt::ffi::meshopt_encodeVertexBufferBound(positions.len(), 12);
            let mut encoded = vec![0u8; bound];
            let size = meshopt::ffi::meshopt_encodeVertexBuffer(
                encoded.as_mut_ptr(),
                encoded.len(),
                positions.as_ptr() as *const c_void,
                positions.len(),
                12,
            );
            encoded.truncate(size);
            encoded
        }
    }

    fn encode_indices(indices: &[u32], vertex_count: usize) -> Vec<u8> {
        unsafe {
            let bound = meshopt::ffi::meshopt_encodeIndexBufferBound(indices.len(), vertex_count);
            let mut encoded = vec![0u8; bound];
            let size = meshopt::ffi::meshopt_encodeIndexBuffer(
                encoded.as_mut_ptr(),
                encoded.len(),
                indices.as_ptr(),
                indices.len(),
            );
            encoded.truncate(size);
            encoded
        }
    }

    fn compressed_cube(half: f32) -> Vec<u8> {
        let vertices = encode_vertices(&cube_positions(half));
        let indices: Vec<u32> = CUBE_INDICES.iter().map(|&i| u32::from(i)).collect();
        let encoded_indices = encode_indices(&indices, 8);

        let mut bin = vertices.clone();
        while bin.len() % 4 != 0 {
            bin.push(0);
        }
        let index_offset = bin.len();
        bin.extend_from_slice(&encoded_indices);

        let mut json = GltfFixture::cube(half).json;
        json["extensionsUsed"] = json!(["EXT_meshopt_compression"]);
        json["extensionsRequired"] = json!(["EXT_meshopt_compression"]);
        json["buffers"] = json!([
            { "byteLength": bin.len() },
            { "byteLength": 168, "extensions": { "EXT_meshopt_compression": { "fallback": true } } }
        ]);
        json["bufferViews"] = json!([
            {
                "buffer": 1, "byteOffset": 0, "byteLength": 96, "byteStride": 12, "target": 34962,
                "extensions": { "EXT_meshopt_compression": {
                    "buffer": 0, "byteOffset": 0, "byteLength": vertices.len(),
                    "byteStride": 12, "count": 8, "mode": "ATTRIBUTES"
                } }
            },
            {
                "buffer": 1, "byteOffset": 96, "byteLength": 72, "target": 34963,
                "extensions": { "EXT_meshopt_compression": {
                    "buffer": 0, "byteOffset": index_offset, "byteLength": encoded_indices.len(),
                    "byteStride": 2, "count": 36, "mode": "TRIANGLES"
                } }
            }
        ]);
        glb(&json, &bin)
    }

    #[test]
    fn test_meshopt_matches_uncompressed() {
        let fetcher = MemoryFetcher::new()
            .with_resource("plain.glb", GltfFixture::cube(3.0).glb())
            .with_resource("packed.glb", compressed_cube(3.0));

        let plain = decode(&fetcher, "plain.glb").unwrap();
        let packed = decode(&fetcher, "packed.glb").unwrap();

        assert_eq!(positions(&plain), positions(&packed));
        let plain_mesh = plain.meshes()[0].geometry.clone();
        let packed_mesh = packed.meshes()[0].geometry.clone();
        assert_eq!(plain_mesh.indices, packed_mesh.indices);
    }
}
