//! glTF / GLB importer
//!
//! Handles JSON glTF with external or embedded (`data:`) resources and
//! binary GLB containers. Quantized accessors (`KHR_mesh_quantization`)
//! are dequantized while reading and `EXT_meshopt_compression` buffer
//! views are decompressed before any accessor touches them.

pub mod accessor;
pub mod meshopt;

use std::collections::{HashMap, HashSet};

use gltf::mesh::Mode;
use gltf::Semantic;
use serde_json::Value;
use thiserror::Error;

use self::accessor::BufferSet;
use crate::error::DecodeError;
use crate::fetch::{join_locator, no_progress, parse_data_uri, ResourceFetcher};
use crate::geometry::{Geometry, PrimitiveType, Vertex};
use crate::material::{
    shared, Color, MaterialDescriptor, MaterialKind, MaterialProperty, MaterialRef, PropertyValue,
    Side,
};
use crate::progress::ProgressAggregator;
use crate::scene::{Mesh, SceneNode, Transform};
use crate::texture::{TextureLoader, TextureRef};

/// Extension handled by dequantizing accessors
pub const KHR_MESH_QUANTIZATION: &str = "KHR_mesh_quantization";

const MAX_NODE_DEPTH: usize = 256;

/// Error type for glTF decoding
#[derive(Error, Debug)]
pub enum GltfError {
    #[error("glTF parse error: {0}")]
    Parse(#[from] gltf::Error),

    #[error("glTF JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Unsupported required extension: {0}")]
    UnsupportedExtension(String),

    #[error("Buffer {0} has no data")]
    MissingBuffer(usize),

    #[error("Out of bounds read: {0}")]
    OutOfBounds(String),

    #[error("Invalid accessor: {0}")]
    Accessor(String),

    #[error("Mesh {mesh} primitive {primitive} is missing positions")]
    MissingPositions { mesh: usize, primitive: usize },

    #[error("Meshopt decoding failed: {0}")]
    Meshopt(String),

    #[error("Node hierarchy deeper than {0} levels")]
    TooDeep(usize),
}

/// JSON chunk and optional binary chunk of a model file
#[derive(Debug)]
struct Container {
    json: Vec<u8>,
    blob: Option<Vec<u8>>,
}

fn split_container(data: &[u8]) -> Result<Container, GltfError> {
    if data.starts_with(b"glTF") {
        let glb = gltf::Glb::from_slice(data)?;
        Ok(Container {
            json: glb.json.into_owned(),
            blob: glb.bin.map(|bin| bin.into_owned()),
        })
    } else {
        Ok(Container {
            json: data.to_vec(),
            blob: None,
        })
    }
}

/// Drop the required extensions this importer implements itself
///
/// The document parser rejects files requiring extensions it does not
/// know; quantization and meshopt are handled here, so they are removed
/// from `extensionsRequired` before parsing.
pub fn strip_handled_extensions(root: &mut Value) -> Result<(), GltfError> {
    let Some(required) = root
        .get_mut("extensionsRequired")
        .and_then(Value::as_array_mut)
    else {
        return Ok(());
    };

    let mut kept = Vec::with_capacity(required.len());
    for extension in required.drain(..) {
        match extension.as_str() {
            Some(KHR_MESH_QUANTIZATION) => {}
            Some(meshopt::EXTENSION) if cfg!(feature = "meshopt") => {}
            Some(meshopt::EXTENSION) => {
                return Err(GltfError::UnsupportedExtension(meshopt::EXTENSION.to_string()));
            }
            _ => kept.push(extension),
        }
    }
    *required = kept;
    Ok(())
}

/// glTF and GLB decoder
#[derive(Debug, Clone, Default)]
pub struct GltfImporter {
    textures: TextureLoader,
}

impl GltfImporter {
    pub fn new() -> Self {
        Self::default()
    }

    /// Fetch and decode a model into a scene tree
    pub async fn decode(
        &self,
        locator: &str,
        fetcher: &dyn ResourceFetcher,
        progress: &ProgressAggregator,
    ) -> Result<SceneNode, DecodeError> {
        let on_bytes = |loaded: u64, total: u64| progress.report_bytes(loaded, total);
        let data = fetcher.fetch(locator, &on_bytes).await?;

        let container = split_container(&data)?;
        let mut root: Value = serde_json::from_slice(&container.json).map_err(GltfError::from)?;
        strip_handled_extensions(&mut root)?;
        let compressed = meshopt::compressed_views(&root)?;
        let fallbacks = meshopt::fallback_buffers(&root);

        let json = serde_json::to_vec(&root).map_err(GltfError::from)?;
        let document = gltf::Gltf::from_slice(&json).map_err(GltfError::from)?.document;

        log::debug!(
            "Parsed glTF {locator}: {} meshes, {} materials, {} images",
            document.meshes().len(),
            document.materials().len(),
            document.images().len()
        );

        let mut buffers = BufferSet::new(
            self.resolve_buffers(&document, container.blob, &fallbacks, locator, fetcher)
                .await?,
        );

        for (index, view) in compressed {
            let fallback_only = document
                .views()
                .nth(index)
                .map_or(true, |fallback| fallbacks.contains(&fallback.buffer().index()));
            if !cfg!(feature = "meshopt") && !fallback_only {
                continue;
            }
            let decoded = meshopt::decode(&view, buffers.buffer(view.buffer)?)?;
            buffers.override_view(index, decoded);
        }

        let images = self
            .resolve_images(&document, &buffers, locator, fetcher)
            .await?;

        let builder = SceneBuilder::new(&document, &buffers, &images)?;
        Ok(builder.build()?)
    }

    async fn resolve_buffers(
        &self,
        document: &gltf::Document,
        mut blob: Option<Vec<u8>>,
        fallbacks: &[usize],
        locator: &str,
        fetcher: &dyn ResourceFetcher,
    ) -> Result<Vec<Vec<u8>>, DecodeError> {
        let mut resolved = Vec::with_capacity(document.buffers().len());

        for buffer in document.buffers() {
            let data = match buffer.source() {
                gltf::buffer::Source::Bin if fallbacks.contains(&buffer.index()) => {
                    vec![0; buffer.length()]
                }
                gltf::buffer::Source::Bin => blob
                    .take()
                    .ok_or(GltfError::MissingBuffer(buffer.index()))?,
                gltf::buffer::Source::Uri(uri) => match parse_data_uri(uri)? {
                    Some(embedded) => embedded.data,
                    None => {
                        let resource = join_locator(locator, uri);
                        log::debug!("Fetching glTF buffer {resource}");
                        fetcher.fetch(&resource, &no_progress).await?
                    }
                },
            };

            if data.len() < buffer.length() {
                return Err(GltfError::OutOfBounds(format!(
                    "buffer {} has {} bytes, expected {}",
                    buffer.index(),
                    data.len(),
                    buffer.length()
                ))
                .into());
            }
            resolved.push(data);
        }

        Ok(resolved)
    }

    async fn resolve_images(
        &self,
        document: &gltf::Document,
        buffers: &BufferSet,
        locator: &str,
        fetcher: &dyn ResourceFetcher,
    ) -> Result<HashMap<usize, TextureRef>, DecodeError> {
        let used: HashSet<usize> = document
            .textures()
            .map(|texture| texture.source().index())
            .collect();

        let mut images = HashMap::new();
        for image in document.images().filter(|image| used.contains(&image.index())) {
            let texture = match image.source() {
                gltf::image::Source::View { view, mime_type } => {
                    let name = image.name().map(str::to_string);
                    self.textures
                        .load_shared(name, buffers.view_bytes(&view)?, Some(mime_type))?
                }
                gltf::image::Source::Uri { uri, mime_type } => {
                    let name = Some(image.name().unwrap_or(uri).to_string());
                    match parse_data_uri(uri)? {
                        Some(embedded) => {
                            let mime = embedded.mime_type.as_deref().or(mime_type);
                            self.textures.load_shared(name, &embedded.data, mime)?
                        }
                        None => {
                            let resource = join_locator(locator, uri);
                            let data = fetcher.fetch(&resource, &no_progress).await?;
                            self.textures.load_shared(name, &data, mime_type)?
                        }
                    }
                }
            };
            images.insert(image.index(), texture);
        }

        Ok(images)
    }
}

struct SceneBuilder<'a> {
    document: &'a gltf::Document,
    images: &'a HashMap<usize, TextureRef>,
    materials: HashMap<Option<usize>, MaterialRef>,
    meshes: Vec<Vec<Mesh>>,
}

impl<'a> SceneBuilder<'a> {
    fn new(
        document: &'a gltf::Document,
        buffers: &BufferSet,
        images: &'a HashMap<usize, TextureRef>,
    ) -> Result<Self, GltfError> {
        let mut builder = Self {
            document,
            images,
            materials: HashMap::new(),
            meshes: Vec::with_capacity(document.meshes().len()),
        };

        for mesh in document.meshes() {
            let mut primitives = Vec::new();
            for primitive in mesh.primitives() {
                let geometry = build_geometry(&primitive, buffers, mesh.index())?;
                let material = builder.material(&primitive.material());
                primitives.push(Mesh::new(geometry, material));
            }
            builder.meshes.push(primitives);
        }

        Ok(builder)
    }

    fn material(&mut self, material: &gltf::Material) -> MaterialRef {
        if let Some(existing) = self.materials.get(&material.index()) {
            return existing.clone();
        }
        let built = shared(build_material(material, self.images));
        self.materials.insert(material.index(), built.clone());
        built
    }

    fn build(&self) -> Result<SceneNode, GltfError> {
        let scene = self
            .document
            .default_scene()
            .or_else(|| self.document.scenes().next());

        let mut root = SceneNode::new(scene.as_ref().and_then(|s| s.name()).map(str::to_string));
        match scene {
            Some(scene) => {
                for node in scene.nodes() {
                    root.add_child(self.build_node(&node, 0)?);
                }
            }
            None => {
                let children: HashSet<usize> = self
                    .document
                    .nodes()
                    .flat_map(|node| node.children().map(|child| child.index()))
                    .collect();
                for node in self.document.nodes() {
                    if !children.contains(&node.index()) {
                        root.add_child(self.build_node(&node, 0)?);
                    }
                }
            }
        }

        Ok(root)
    }

    fn build_node(&self, node: &gltf::Node, depth: usize) -> Result<SceneNode, GltfError> {
        if depth > MAX_NODE_DEPTH {
            return Err(GltfError::TooDeep(MAX_NODE_DEPTH));
        }

        let (translation, rotation, scale) = node.transform().decomposed();
        let mut scene_node = SceneNode::new(node.name().map(str::to_string)).with_transform(
            Transform {
                translation: translation.into(),
                rotation: glam::Quat::from_array(rotation),
                scale: scale.into(),
            },
        );

        if let Some(mesh) = node.mesh() {
            match self.meshes.get(mesh.index()).map(Vec::as_slice) {
                Some([single]) => scene_node.mesh = Some(single.clone()),
                Some(primitives) => {
                    for (index, primitive) in primitives.iter().enumerate() {
                        let name = mesh.name().map(|name| format!("{name}_{index}"));
                        scene_node.add_child(SceneNode::with_mesh(name, primitive.clone()));
                    }
                }
                None => {}
            }
        }

        for child in node.children() {
            scene_node.add_child(self.build_node(&child, depth + 1)?);
        }

        Ok(scene_node)
    }
}

fn build_material(
    material: &gltf::Material,
    images: &HashMap<usize, TextureRef>,
) -> MaterialDescriptor {
    let texture_of = |texture: gltf::Texture| images.get(&texture.source().index()).cloned();
    let pbr = material.pbr_metallic_roughness();
    let [r, g, b, a] = pbr.base_color_factor();

    let mut descriptor = MaterialDescriptor::new(MaterialKind::Standard)
        .with(MaterialProperty::Color, PropertyValue::Color(Color::rgb(r, g, b)))
        .with(MaterialProperty::Opacity, PropertyValue::Scalar(a))
        .with(MaterialProperty::Roughness, PropertyValue::Scalar(pbr.roughness_factor()))
        .with(MaterialProperty::Metalness, PropertyValue::Scalar(pbr.metallic_factor()))
        .with(
            MaterialProperty::Emissive,
            PropertyValue::Color(Color::from(material.emissive_factor())),
        )
        .with(
            MaterialProperty::Side,
            PropertyValue::Side(if material.double_sided() {
                Side::Double
            } else {
                Side::Front
            }),
        );

    if let Some(name) = material.name() {
        descriptor = descriptor.with_name(name);
    }

    match material.alpha_mode() {
        gltf::material::AlphaMode::Blend => {
            descriptor.set(MaterialProperty::Transparent, PropertyValue::Flag(true));
        }
        gltf::material::AlphaMode::Mask => {
            let cutoff = material.alpha_cutoff().unwrap_or(0.5);
            descriptor.set(MaterialProperty::AlphaTest, PropertyValue::Scalar(cutoff));
        }
        gltf::material::AlphaMode::Opaque => {}
    }

    let mut link = |key: MaterialProperty, texture: Option<TextureRef>| {
        if let Some(texture) = texture {
            descriptor.set(key, PropertyValue::Texture(texture));
        }
    };

    link(
        MaterialProperty::Map,
        pbr.base_color_texture().and_then(|info| texture_of(info.texture())),
    );
    let metal_rough = pbr
        .metallic_roughness_texture()
        .and_then(|info| texture_of(info.texture()));
    link(MaterialProperty::RoughnessMap, metal_rough.clone());
    link(MaterialProperty::MetalnessMap, metal_rough);
    link(
        MaterialProperty::EmissiveMap,
        material
            .emissive_texture()
            .and_then(|info| texture_of(info.texture())),
    );

    if let Some(normal) = material.normal_texture() {
        link(MaterialProperty::NormalMap, texture_of(normal.texture()));
        descriptor.set(
            MaterialProperty::NormalScale,
            PropertyValue::Vec2(glam::Vec2::splat(normal.scale())),
        );
    }

    if let Some(occlusion) = material.occlusion_texture() {
        if let Some(texture) = texture_of(occlusion.texture()) {
            descriptor.set(MaterialProperty::AoMap, PropertyValue::Texture(texture));
        }
        descriptor.set(
            MaterialProperty::AoMapIntensity,
            PropertyValue::Scalar(occlusion.strength()),
        );
    }

    log::debug!(
        "Loaded material {:?} (opacity {a})",
        material.name().unwrap_or("unnamed")
    );
    descriptor
}

fn build_geometry(
    primitive: &gltf::Primitive,
    buffers: &BufferSet,
    mesh_index: usize,
) -> Result<Geometry, GltfError> {
    let primitive_type = match primitive.mode() {
        Mode::Points => PrimitiveType::Points,
        Mode::Lines => PrimitiveType::Lines,
        Mode::LineLoop => {
            log::warn!("Line loop primitive mode is not supported, converting to line strip");
            PrimitiveType::LineStrip
        }
        Mode::LineStrip => PrimitiveType::LineStrip,
        Mode::Triangles => PrimitiveType::Triangles,
        Mode::TriangleStrip => PrimitiveType::TriangleStrip,
        Mode::TriangleFan => PrimitiveType::TriangleFan,
    };

    let positions = primitive
        .get(&Semantic::Positions)
        .ok_or(GltfError::MissingPositions {
            mesh: mesh_index,
            primitive: primitive.index(),
        })?;
    let positions = accessor::read_vectors::<3>(buffers, &positions)?;

    let normals = primitive
        .get(&Semantic::Normals)
        .map(|a| accessor::read_vectors::<3>(buffers, &a))
        .transpose()?;
    let uvs = primitive
        .get(&Semantic::TexCoords(0))
        .map(|a| accessor::read_vectors::<2>(buffers, &a))
        .transpose()?;
    let tangents = primitive
        .get(&Semantic::Tangents)
        .map(|a| accessor::read_vectors::<4>(buffers, &a))
        .transpose()?;
    let colors = primitive
        .get(&Semantic::Colors(0))
        .map(|a| accessor::read_colors(buffers, &a))
        .transpose()?;
    let indices = primitive
        .indices()
        .map(|a| accessor::read_indices(buffers, &a))
        .transpose()?
        .unwrap_or_default();

    if let Some(&out_of_range) = indices.iter().find(|&&i| i as usize >= positions.len()) {
        return Err(GltfError::OutOfBounds(format!(
            "index {out_of_range} exceeds {} vertices",
            positions.len()
        )));
    }

    let defaults = Vertex::default();
    let vertices = positions
        .iter()
        .enumerate()
        .map(|(i, &position)| Vertex {
            position,
            normal: normals.as_ref().and_then(|n| n.get(i).copied()).unwrap_or(defaults.normal),
            uv: uvs.as_ref().and_then(|u| u.get(i).copied()).unwrap_or(defaults.uv),
            tangent: tangents
                .as_ref()
                .and_then(|t| t.get(i).copied())
                .unwrap_or(defaults.tangent),
            color: colors.as_ref().and_then(|c| c.get(i).copied()).unwrap_or(defaults.color),
        })
        .collect();

    let mut geometry = Geometry::new(primitive_type, vertices, indices);
    if normals.is_none() {
        log::debug!("Generating flat normals for mesh {mesh_index}");
        geometry.compute_normals();
    }

    Ok(geometry)
}
