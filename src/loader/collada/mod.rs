//! Collada (`.dae`) importer
//!
//! Decodes the `profile_COMMON` subset of COLLADA 1.4/1.5: images,
//! effects, materials, triangle/polygon/line geometry, node hierarchies
//! with ordered transforms, instanced nodes and skinned geometry (bind
//! pose only). After decoding, the root scale is reset and Phong-style
//! materials are simplified to metal/roughness materials.

pub mod xml;

use std::collections::{HashMap, HashSet};
use std::f32::consts::FRAC_PI_2;
use std::sync::Arc;

use glam::{Mat4, Quat, Vec3};
use thiserror::Error;

use self::xml::Element;
use crate::error::DecodeError;
use crate::fetch::{join_locator, no_progress, parse_data_uri, ResourceFetcher};
use crate::geometry::{Geometry, PrimitiveType, Vertex};
use crate::material::{
    replace_materials, shared, Color, MaterialDescriptor, MaterialKind, MaterialProperty,
    MaterialRef, PropertyValue, ReplaceReport, Side,
};
use crate::progress::ProgressAggregator;
use crate::scene::{Mesh, SceneNode, Transform};
use crate::texture::{TextureLoader, TextureRef};

const MAX_NODE_DEPTH: usize = 128;

/// Error type for Collada decoding
#[derive(Error, Debug)]
pub enum ColladaError {
    #[error("XML error: {0}")]
    Xml(String),

    #[error("Document root is <{0}>, expected <COLLADA>")]
    NotCollada(String),

    #[error("Invalid number {value:?} in <{element}>")]
    BadNumber { element: String, value: String },

    #[error("Unresolved reference: {0}")]
    Unresolved(String),

    #[error("Invalid geometry {id}: {reason}")]
    Geometry { id: String, reason: String },

    #[error("Node hierarchy deeper than {0} levels")]
    TooDeep(usize),
}

fn parse_floats(element: &Element) -> Result<Vec<f32>, ColladaError> {
    element
        .text()
        .split_whitespace()
        .map(|value| {
            value.parse::<f32>().map_err(|_| ColladaError::BadNumber {
                element: element.name.clone(),
                value: value.to_string(),
            })
        })
        .collect()
}

fn parse_indices(element: &Element) -> Result<Vec<usize>, ColladaError> {
    element
        .text()
        .split_whitespace()
        .map(|value| {
            value.parse::<usize>().map_err(|_| ColladaError::BadNumber {
                element: element.name.clone(),
                value: value.to_string(),
            })
        })
        .collect()
}

fn strip_hash(url: &str) -> &str {
    url.strip_prefix('#').unwrap_or(url)
}

fn collect_named<'a>(element: &'a Element, name: &str, out: &mut Vec<&'a Element>) {
    for child in &element.children {
        if child.name == name {
            out.push(child);
        }
        collect_named(child, name, out);
    }
}

/// Color or texture input of an effect
#[derive(Debug, Clone, PartialEq)]
enum Channel {
    Color([f32; 4]),
    /// Image id
    Texture(String),
}

#[derive(Debug, Clone, PartialEq)]
struct Effect {
    kind: MaterialKind,
    diffuse: Option<Channel>,
    emission: Option<Channel>,
    specular: Option<Channel>,
    shininess: Option<f32>,
    transparent: Option<(String, Channel)>,
    transparency: Option<f32>,
    bump: Option<String>,
    double_sided: bool,
}

impl Effect {
    fn new(kind: MaterialKind) -> Self {
        Self {
            kind,
            diffuse: None,
            emission: None,
            specular: None,
            shininess: None,
            transparent: None,
            transparency: None,
            bump: None,
            double_sided: false,
        }
    }

    fn images(&self) -> impl Iterator<Item = &str> {
        [&self.diffuse, &self.emission, &self.specular]
            .into_iter()
            .flatten()
            .chain(self.transparent.iter().map(|(_, channel)| channel))
            .filter_map(|channel| match channel {
                Channel::Texture(image) => Some(image.as_str()),
                Channel::Color(_) => None,
            })
            .chain(self.bump.as_deref())
    }

    /// Opacity from `<transparent>` and `<transparency>`
    fn opacity(&self) -> Option<f32> {
        let (mode, Channel::Color(color)) = self.transparent.as_ref()? else {
            return None;
        };
        let transparency = self.transparency?;

        match mode.as_str() {
            "A_ONE" => Some(color[3] * transparency),
            "RGB_ZERO" => Some(1.0 - color[0] * transparency),
            "A_ZERO" => Some(1.0 - color[3] * transparency),
            "RGB_ONE" => Some(color[0] * transparency),
            other => {
                log::warn!("Unknown transparency mode {other}");
                None
            }
        }
    }
}

/// Sampler and surface parameters of one effect
#[derive(Debug, Default)]
struct EffectParams {
    surfaces: HashMap<String, String>,
    samplers: HashMap<String, String>,
}

impl EffectParams {
    fn parse(profile: &Element) -> Self {
        let mut params = Self::default();
        for param in profile.children_named("newparam") {
            let Some(sid) = param.attr("sid") else {
                continue;
            };
            if let Some(init) = param.path(&["surface", "init_from"]) {
                params.surfaces.insert(sid.to_string(), init.text().to_string());
            }
            if let Some(sampler) = param.child("sampler2D") {
                if let Some(source) = sampler.child("source") {
                    params
                        .samplers
                        .insert(sid.to_string(), source.text().to_string());
                } else if let Some(url) = sampler.child("instance_image").and_then(|i| i.attr("url")) {
                    params
                        .surfaces
                        .insert(sid.to_string(), strip_hash(url).to_string());
                    params.samplers.insert(sid.to_string(), sid.to_string());
                }
            }
        }
        params
    }

    /// Image id behind a `<texture texture="…">` reference
    fn image_for(&self, texture: &str) -> String {
        self.samplers
            .get(texture)
            .and_then(|surface| self.surfaces.get(surface))
            .cloned()
            .unwrap_or_else(|| texture.to_string())
    }
}

fn parse_channel(element: &Element, params: &EffectParams) -> Result<Option<Channel>, ColladaError> {
    if let Some(color) = element.child("color") {
        let values = parse_floats(color)?;
        let mut rgba = [1.0; 4];
        for (slot, value) in rgba.iter_mut().zip(values) {
            *slot = value;
        }
        return Ok(Some(Channel::Color(rgba)));
    }
    if let Some(texture) = element.child("texture").and_then(|t| t.attr("texture")) {
        return Ok(Some(Channel::Texture(params.image_for(texture))));
    }
    Ok(None)
}

fn parse_scalar(element: &Element) -> Result<Option<f32>, ColladaError> {
    match element.child("float") {
        Some(value) => Ok(parse_floats(value)?.first().copied()),
        None => Ok(None),
    }
}

fn parse_effect(effect: &Element) -> Result<Effect, ColladaError> {
    let Some(profile) = effect.child("profile_COMMON") else {
        log::warn!(
            "Effect {} has no profile_COMMON, using defaults",
            effect.attr("id").unwrap_or("?")
        );
        return Ok(Effect::new(MaterialKind::Phong));
    };
    let params = EffectParams::parse(profile);

    let technique = profile.child("technique");
    let shading = technique.and_then(|technique| {
        technique
            .children
            .iter()
            .find(|child| matches!(child.name.as_str(), "phong" | "blinn" | "lambert" | "constant"))
    });

    let Some(shading) = shading else {
        return Ok(Effect::new(MaterialKind::Phong));
    };

    let mut result = Effect::new(match shading.name.as_str() {
        "lambert" => MaterialKind::Lambert,
        "constant" => MaterialKind::Basic,
        _ => MaterialKind::Phong,
    });

    for parameter in &shading.children {
        match parameter.name.as_str() {
            "diffuse" => result.diffuse = parse_channel(parameter, &params)?,
            "emission" => result.emission = parse_channel(parameter, &params)?,
            "specular" => result.specular = parse_channel(parameter, &params)?,
            "shininess" => result.shininess = parse_scalar(parameter)?,
            "transparency" => result.transparency = parse_scalar(parameter)?,
            "transparent" => {
                let mode = parameter.attr("opaque").unwrap_or("A_ONE").to_string();
                result.transparent = parse_channel(parameter, &params)?.map(|c| (mode, c));
            }
            _ => {}
        }
    }

    if let Some(bump) = technique
        .and_then(|t| t.find("bump"))
        .and_then(|bump| bump.child("texture"))
        .and_then(|texture| texture.attr("texture"))
    {
        result.bump = Some(params.image_for(bump));
    }

    result.double_sided = effect
        .find("double_sided")
        .is_some_and(|flag| flag.text() == "1");

    Ok(result)
}

fn image_path(image: &Element) -> Option<&str> {
    let init = image.child("init_from")?;
    match init.child("ref") {
        Some(reference) => Some(reference.text()),
        None => Some(init.text()),
    }
}

struct Source {
    data: Vec<f32>,
    stride: usize,
}

impl Source {
    fn read<const N: usize>(&self, index: usize) -> Option<[f32; N]> {
        let start = index * self.stride;
        let slice = self.data.get(start..start + N.min(self.stride))?;
        let mut out = [0.0; N];
        out[..slice.len()].copy_from_slice(slice);
        if N == 4 && slice.len() == 3 {
            out[3] = 1.0;
        }
        Some(out)
    }
}

struct Input {
    semantic: String,
    source: String,
    offset: usize,
    set: usize,
}

fn parse_inputs(element: &Element) -> Vec<Input> {
    element
        .children_named("input")
        .map(|input| Input {
            semantic: input.attr("semantic").unwrap_or_default().to_string(),
            source: strip_hash(input.attr("source").unwrap_or_default()).to_string(),
            offset: input.attr("offset").and_then(|o| o.parse().ok()).unwrap_or(0),
            set: input.attr("set").and_then(|s| s.parse().ok()).unwrap_or(0),
        })
        .collect()
}

/// One drawable part of a geometry with its material symbol
#[derive(Debug, Clone)]
struct Primitive {
    symbol: Option<String>,
    geometry: Arc<Geometry>,
}

struct MeshReader<'a> {
    id: &'a str,
    sources: HashMap<String, Source>,
    vertices_id: String,
    vertex_inputs: Vec<Input>,
}

impl<'a> MeshReader<'a> {
    fn new(id: &'a str, mesh: &Element) -> Result<Self, ColladaError> {
        let mut sources = HashMap::new();
        for source in mesh.children_named("source") {
            let Some(source_id) = source.attr("id") else {
                continue;
            };
            let Some(array) = source.child("float_array") else {
                continue;
            };
            let stride = source
                .path(&["technique_common", "accessor"])
                .and_then(|accessor| accessor.attr("stride"))
                .and_then(|stride| stride.parse().ok())
                .unwrap_or(1)
                .max(1);
            sources.insert(
                source_id.to_string(),
                Source {
                    data: parse_floats(array)?,
                    stride,
                },
            );
        }

        let vertices = mesh.child("vertices");
        Ok(Self {
            id,
            sources,
            vertices_id: vertices
                .and_then(|v| v.attr("id"))
                .unwrap_or_default()
                .to_string(),
            vertex_inputs: vertices.map(parse_inputs).unwrap_or_default(),
        })
    }

    fn fail(&self, reason: impl Into<String>) -> ColladaError {
        ColladaError::Geometry {
            id: self.id.to_string(),
            reason: reason.into(),
        }
    }

    fn apply(
        &self,
        vertex: &mut Vertex,
        semantic: &str,
        source: &str,
        set: usize,
        index: usize,
    ) -> Result<bool, ColladaError> {
        let source_data = self
            .sources
            .get(source)
            .ok_or_else(|| ColladaError::Unresolved(format!("#{source}")))?;
        let missing = || self.fail(format!("index {index} out of range for source {source}"));

        match semantic {
            "POSITION" => vertex.position = source_data.read::<3>(index).ok_or_else(missing)?,
            "NORMAL" => vertex.normal = source_data.read::<3>(index).ok_or_else(missing)?,
            "TEXCOORD" if set == 0 => {
                let [s, t] = source_data.read::<2>(index).ok_or_else(missing)?;
                vertex.uv = [s, 1.0 - t];
            }
            "COLOR" => vertex.color = source_data.read::<4>(index).ok_or_else(missing)?,
            _ => return Ok(false),
        }
        Ok(true)
    }

    /// Build the vertex referenced by one group of `<p>` indices
    fn corner(
        &self,
        inputs: &[Input],
        indices: &[usize],
        has_normal: &mut bool,
    ) -> Result<Vertex, ColladaError> {
        let mut vertex = Vertex::default();
        for input in inputs {
            let index = *indices
                .get(input.offset)
                .ok_or_else(|| self.fail("input offset outside index group"))?;

            if input.semantic == "VERTEX" {
                if input.source != self.vertices_id {
                    return Err(ColladaError::Unresolved(format!("#{}", input.source)));
                }
                for vertex_input in &self.vertex_inputs {
                    self.apply(&mut vertex, &vertex_input.semantic, &vertex_input.source, 0, index)?;
                    *has_normal |= vertex_input.semantic == "NORMAL";
                }
            } else {
                self.apply(&mut vertex, &input.semantic, &input.source, input.set, index)?;
                *has_normal |= input.semantic == "NORMAL";
            }
        }
        Ok(vertex)
    }

    fn primitive(&self, element: &Element) -> Result<Option<Primitive>, ColladaError> {
        let inputs = parse_inputs(element);
        let group = inputs.iter().map(|input| input.offset + 1).max().unwrap_or(1);

        let mut polygons: Vec<Vec<usize>> = Vec::new();
        let primitive_type = match element.name.as_str() {
            "triangles" => {
                let indices = element.child("p").map(parse_indices).transpose()?.unwrap_or_default();
                polygons.extend(indices.chunks(group * 3).map(<[usize]>::to_vec));
                PrimitiveType::Triangles
            }
            "polylist" => {
                let counts = element
                    .child("vcount")
                    .map(parse_indices)
                    .transpose()?
                    .unwrap_or_default();
                let indices = element.child("p").map(parse_indices).transpose()?.unwrap_or_default();
                let mut cursor = 0;
                for count in counts {
                    let end = cursor + count * group;
                    let polygon = indices
                        .get(cursor..end)
                        .ok_or_else(|| self.fail("polylist <p> shorter than <vcount>"))?;
                    polygons.push(polygon.to_vec());
                    cursor = end;
                }
                PrimitiveType::Triangles
            }
            "polygons" => {
                for p in element.children_named("p") {
                    polygons.push(parse_indices(p)?);
                }
                PrimitiveType::Triangles
            }
            "lines" => {
                let indices = element.child("p").map(parse_indices).transpose()?.unwrap_or_default();
                polygons.extend(indices.chunks(group * 2).map(<[usize]>::to_vec));
                PrimitiveType::Lines
            }
            "linestrips" | "trifans" | "tristrips" => {
                log::warn!("Skipping unsupported <{}> in geometry {}", element.name, self.id);
                return Ok(None);
            }
            _ => return Ok(None),
        };

        let mut has_normal = false;
        let mut vertices = Vec::new();
        for polygon in polygons {
            let corners = polygon
                .chunks_exact(group)
                .map(|indices| self.corner(&inputs, indices, &mut has_normal))
                .collect::<Result<Vec<_>, _>>()?;

            if primitive_type == PrimitiveType::Lines {
                if corners.len() == 2 {
                    vertices.extend(corners);
                }
                continue;
            }
            for i in 1..corners.len().saturating_sub(1) {
                vertices.extend([corners[0], corners[i], corners[i + 1]]);
            }
        }

        let mut geometry = Geometry::new(primitive_type, vertices, Vec::new());
        if !has_normal {
            geometry.compute_normals();
        }

        Ok(Some(Primitive {
            symbol: element.attr("material").map(str::to_string),
            geometry: Arc::new(geometry),
        }))
    }
}

fn parse_geometry(geometry: &Element) -> Result<Vec<Primitive>, ColladaError> {
    let id = geometry.attr("id").unwrap_or_default();
    let Some(mesh) = geometry.child("mesh") else {
        log::warn!("Geometry {id} has no <mesh>, skipping");
        return Ok(Vec::new());
    };

    let reader = MeshReader::new(id, mesh)?;
    let mut primitives = Vec::new();
    for element in &mesh.children {
        if let Some(primitive) = reader.primitive(element)? {
            primitives.push(primitive);
        }
    }
    log::debug!("Parsed geometry {id}: {} primitives", primitives.len());
    Ok(primitives)
}

/// Libraries of a COLLADA document, parsed up front
#[derive(Default)]
struct Library {
    images: HashMap<String, String>,
    effects: HashMap<String, Effect>,
    /// material id → (name, effect id)
    materials: HashMap<String, (Option<String>, String)>,
    geometries: HashMap<String, (Option<String>, Vec<Primitive>)>,
    /// controller id → geometry id
    controllers: HashMap<String, String>,
}

impl Library {
    fn parse(root: &Element) -> Result<Self, ColladaError> {
        let mut library = Self::default();

        let mut found = Vec::new();
        collect_named(root, "image", &mut found);
        for image in found {
            if let (Some(id), Some(path)) = (image.attr("id"), image_path(image)) {
                library.images.insert(id.to_string(), path.to_string());
            }
        }

        for effect in root.children_named("library_effects").flat_map(|l| l.children_named("effect")) {
            if let Some(id) = effect.attr("id") {
                library.effects.insert(id.to_string(), parse_effect(effect)?);
            }
        }

        for material in root
            .children_named("library_materials")
            .flat_map(|l| l.children_named("material"))
        {
            let (Some(id), Some(url)) = (
                material.attr("id"),
                material.child("instance_effect").and_then(|i| i.attr("url")),
            ) else {
                continue;
            };
            library.materials.insert(
                id.to_string(),
                (material.attr("name").map(str::to_string), strip_hash(url).to_string()),
            );
        }

        for geometry in root
            .children_named("library_geometries")
            .flat_map(|l| l.children_named("geometry"))
        {
            if let Some(id) = geometry.attr("id") {
                library.geometries.insert(
                    id.to_string(),
                    (geometry.attr("name").map(str::to_string), parse_geometry(geometry)?),
                );
            }
        }

        for controller in root
            .children_named("library_controllers")
            .flat_map(|l| l.children_named("controller"))
        {
            let source = controller
                .child("skin")
                .or_else(|| controller.child("morph"))
                .and_then(|skin| skin.attr("source"));
            if let (Some(id), Some(source)) = (controller.attr("id"), source) {
                library
                    .controllers
                    .insert(id.to_string(), strip_hash(source).to_string());
            }
        }

        Ok(library)
    }

    /// Image ids referenced by any material's effect
    fn referenced_images(&self) -> Vec<String> {
        let mut seen = HashSet::new();
        let mut images = Vec::new();
        for (_, effect_id) in self.materials.values() {
            let Some(effect) = self.effects.get(effect_id) else {
                continue;
            };
            for image in effect.images() {
                if seen.insert(image.to_string()) {
                    images.push(image.to_string());
                }
            }
        }
        images.sort();
        images
    }
}

fn material_from_effect(
    effect: &Effect,
    name: Option<&str>,
    textures: &HashMap<String, TextureRef>,
) -> MaterialDescriptor {
    let mut material = MaterialDescriptor::new(effect.kind);
    if let Some(name) = name {
        material = material.with_name(name);
    }

    let texture = |image: &str| textures.get(image).cloned().map(PropertyValue::Texture);

    match &effect.diffuse {
        Some(Channel::Color([r, g, b, _])) => {
            material.set(MaterialProperty::Color, PropertyValue::Color(Color::rgb(*r, *g, *b)));
        }
        Some(Channel::Texture(image)) => {
            if let Some(map) = texture(image) {
                material.set(MaterialProperty::Map, map);
            }
        }
        None => {
            if let (MaterialKind::Basic, Some(Channel::Color([r, g, b, _]))) =
                (effect.kind, &effect.emission)
            {
                material.set(MaterialProperty::Color, PropertyValue::Color(Color::rgb(*r, *g, *b)));
            }
        }
    }

    if effect.kind != MaterialKind::Basic {
        match &effect.emission {
            Some(Channel::Color([r, g, b, _])) => {
                material.set(MaterialProperty::Emissive, PropertyValue::Color(Color::rgb(*r, *g, *b)));
            }
            Some(Channel::Texture(image)) => {
                if let Some(map) = texture(image) {
                    material.set(MaterialProperty::EmissiveMap, map);
                }
            }
            None => {}
        }
    }

    if effect.kind == MaterialKind::Phong {
        match &effect.specular {
            Some(Channel::Color([r, g, b, _])) => {
                material.set(MaterialProperty::Specular, PropertyValue::Color(Color::rgb(*r, *g, *b)));
            }
            Some(Channel::Texture(image)) => {
                if let Some(map) = texture(image) {
                    material.set(MaterialProperty::SpecularMap, map);
                }
            }
            None => {}
        }
        if let Some(shininess) = effect.shininess {
            material.set(MaterialProperty::Shininess, PropertyValue::Scalar(shininess));
        }
    }

    if let Some(map) = effect.bump.as_deref().and_then(texture) {
        material.set(MaterialProperty::BumpMap, map);
    }

    if effect.double_sided {
        material.set(MaterialProperty::Side, PropertyValue::Side(Side::Double));
    }

    match (&effect.transparent, effect.transparency) {
        (Some((_, Channel::Texture(image))), Some(_)) => {
            if let Some(map) = texture(image) {
                material.set(MaterialProperty::AlphaMap, map);
            }
            material.set(MaterialProperty::Transparent, PropertyValue::Flag(true));
        }
        _ => {
            if let Some(opacity) = effect.opacity() {
                material.set(MaterialProperty::Opacity, PropertyValue::Scalar(opacity));
                if opacity < 1.0 {
                    material.set(MaterialProperty::Transparent, PropertyValue::Flag(true));
                }
            }
        }
    }

    material
}

/// Compose `<matrix>`, `<translate>`, `<rotate>` and `<scale>` in order
fn node_matrix(node: &Element) -> Result<Mat4, ColladaError> {
    let mut matrix = Mat4::IDENTITY;
    for child in &node.children {
        let step = match child.name.as_str() {
            "matrix" => {
                let values = parse_floats(child)?;
                let values: [f32; 16] = values
                    .try_into()
                    .map_err(|_| ColladaError::BadNumber {
                        element: "matrix".to_string(),
                        value: child.text().to_string(),
                    })?;
                Mat4::from_cols_array(&values).transpose()
            }
            "translate" => match parse_floats(child)?.as_slice() {
                [x, y, z] => Mat4::from_translation(Vec3::new(*x, *y, *z)),
                _ => continue,
            },
            "rotate" => match parse_floats(child)?.as_slice() {
                [x, y, z, degrees] => {
                    let axis = Vec3::new(*x, *y, *z);
                    if axis.length_squared() == 0.0 {
                        continue;
                    }
                    Mat4::from_axis_angle(axis.normalize(), degrees.to_radians())
                }
                _ => continue,
            },
            "scale" => match parse_floats(child)?.as_slice() {
                [x, y, z] => Mat4::from_scale(Vec3::new(*x, *y, *z)),
                _ => continue,
            },
            _ => continue,
        };
        matrix *= step;
    }
    Ok(matrix)
}

struct SceneBuilder<'a> {
    library: &'a Library,
    textures: &'a HashMap<String, TextureRef>,
    nodes: HashMap<&'a str, &'a Element>,
    materials: HashMap<String, MaterialRef>,
    fallback: Option<MaterialRef>,
}

impl<'a> SceneBuilder<'a> {
    fn new(
        root: &'a Element,
        library: &'a Library,
        textures: &'a HashMap<String, TextureRef>,
    ) -> Self {
        let mut found = Vec::new();
        collect_named(root, "node", &mut found);
        let nodes = found
            .into_iter()
            .filter_map(|node| node.attr("id").map(|id| (id, node)))
            .collect();

        Self {
            library,
            textures,
            nodes,
            materials: HashMap::new(),
            fallback: None,
        }
    }

    fn material(&mut self, id: Option<&str>) -> MaterialRef {
        let library = self.library;
        if let Some(id) = id {
            if let Some(existing) = self.materials.get(id) {
                return existing.clone();
            }
            if let Some((name, effect_id)) = library.materials.get(id) {
                if let Some(effect) = library.effects.get(effect_id) {
                    let built = shared(material_from_effect(effect, name.as_deref(), self.textures));
                    self.materials.insert(id.to_string(), built.clone());
                    return built;
                }
            }
            log::warn!("Material {id} could not be resolved, using default");
        }

        self.fallback
            .get_or_insert_with(|| shared(MaterialDescriptor::new(MaterialKind::Phong)))
            .clone()
    }

    fn instance_meshes(
        &mut self,
        node: &mut SceneNode,
        geometry_id: &str,
        instance: &Element,
    ) -> Result<(), ColladaError> {
        let library = self.library;
        let (name, primitives) = library
            .geometries
            .get(geometry_id)
            .ok_or_else(|| ColladaError::Unresolved(format!("#{geometry_id}")))?;

        let mut bindings = HashMap::new();
        if let Some(common) = instance.path(&["bind_material", "technique_common"]) {
            for binding in common.children_named("instance_material") {
                if let (Some(symbol), Some(target)) = (binding.attr("symbol"), binding.attr("target"))
                {
                    bindings.insert(symbol, strip_hash(target));
                }
            }
        }

        for primitive in primitives {
            let material_id = primitive
                .symbol
                .as_deref()
                .map(|symbol| bindings.get(symbol).copied().unwrap_or(symbol));
            let material = self.material(material_id);
            node.add_child(SceneNode::with_mesh(
                name.clone(),
                Mesh::new(primitive.geometry.clone(), material),
            ));
        }
        Ok(())
    }

    fn build_node(&mut self, element: &Element, depth: usize) -> Result<SceneNode, ColladaError> {
        if depth > MAX_NODE_DEPTH {
            return Err(ColladaError::TooDeep(MAX_NODE_DEPTH));
        }

        let name = element.attr("name").or_else(|| element.attr("id"));
        let mut node = SceneNode::new(name.map(str::to_string))
            .with_transform(Transform::from_matrix(node_matrix(element)?));

        for child in &element.children {
            match child.name.as_str() {
                "node" => {
                    let built = self.build_node(child, depth + 1)?;
                    node.add_child(built);
                }
                "instance_geometry" => {
                    let url = strip_hash(child.attr("url").unwrap_or_default());
                    self.instance_meshes(&mut node, url, child)?;
                }
                "instance_controller" => {
                    let url = strip_hash(child.attr("url").unwrap_or_default());
                    let library = self.library;
                    let geometry = library
                        .controllers
                        .get(url)
                        .ok_or_else(|| ColladaError::Unresolved(format!("#{url}")))?;
                    self.instance_meshes(&mut node, geometry, child)?;
                }
                "instance_node" => {
                    let url = strip_hash(child.attr("url").unwrap_or_default());
                    let target = *self
                        .nodes
                        .get(url)
                        .ok_or_else(|| ColladaError::Unresolved(format!("#{url}")))?;
                    let built = self.build_node(target, depth + 1)?;
                    node.add_child(built);
                }
                _ => {}
            }
        }

        Ok(node)
    }

    fn build(mut self, root: &'a Element) -> Result<SceneNode, ColladaError> {
        let scenes: Vec<&Element> = root
            .children_named("library_visual_scenes")
            .flat_map(|l| l.children_named("visual_scene"))
            .collect();

        let wanted = root
            .path(&["scene", "instance_visual_scene"])
            .and_then(|instance| instance.attr("url"))
            .map(strip_hash);
        let scene = match wanted {
            Some(id) => scenes
                .iter()
                .find(|scene| scene.attr("id") == Some(id))
                .copied()
                .ok_or_else(|| ColladaError::Unresolved(format!("#{id}")))?,
            None => scenes
                .first()
                .copied()
                .ok_or_else(|| ColladaError::Unresolved("visual scene".to_string()))?,
        };

        let name = scene.attr("name").or_else(|| scene.attr("id"));
        let mut result = SceneNode::new(name.map(str::to_string));
        for node in scene.children_named("node") {
            let built = self.build_node(node, 0)?;
            result.add_child(built);
        }

        let meter = root
            .path(&["asset", "unit"])
            .and_then(|unit| unit.attr("meter"))
            .and_then(|meter| meter.parse::<f32>().ok())
            .unwrap_or(1.0);
        result.transform.scale = Vec3::splat(meter);

        match root.path(&["asset", "up_axis"]).map(Element::text) {
            Some("Z_UP") => result.transform.rotation = Quat::from_rotation_x(-FRAC_PI_2),
            Some("X_UP") => result.transform.rotation = Quat::from_rotation_z(FRAC_PI_2),
            _ => {}
        }

        Ok(result)
    }
}

/// Simplified metal/roughness replacement of a Phong material
pub fn simplify_phong(phong: &MaterialDescriptor) -> MaterialDescriptor {
    let mut standard = MaterialDescriptor::new(MaterialKind::Standard);
    if let Some(color) = phong.color(MaterialProperty::Color) {
        standard.set(MaterialProperty::Color, PropertyValue::Color(color));
    }
    standard.set(
        MaterialProperty::Roughness,
        PropertyValue::Scalar(phong.scalar(MaterialProperty::Roughness).unwrap_or(0.0)),
    );
    standard.set(
        MaterialProperty::Metalness,
        PropertyValue::Scalar(phong.scalar(MaterialProperty::Metalness).unwrap_or(0.0)),
    );
    if let Some(map) = phong.texture(MaterialProperty::Map) {
        standard.set(MaterialProperty::Map, PropertyValue::Texture(map.clone()));
    }
    standard
}

/// Collada decoder
#[derive(Debug, Clone, Default)]
pub struct ColladaImporter {
    textures: TextureLoader,
}

impl ColladaImporter {
    pub fn new() -> Self {
        Self::default()
    }

    /// Fetch and decode a document into a scene tree
    pub async fn decode(
        &self,
        locator: &str,
        fetcher: &dyn ResourceFetcher,
        progress: &ProgressAggregator,
    ) -> Result<SceneNode, DecodeError> {
        let on_bytes = |loaded: u64, total: u64| progress.report_bytes(loaded, total);
        let data = fetcher.fetch(locator, &on_bytes).await?;

        let root = xml::parse(&data)?;
        if root.name != "COLLADA" {
            return Err(ColladaError::NotCollada(root.name).into());
        }
        let library = Library::parse(&root)?;

        let mut textures = HashMap::new();
        for image in library.referenced_images() {
            let Some(path) = library.images.get(&image) else {
                log::warn!("Texture image {image} is not declared");
                continue;
            };
            let texture = match parse_data_uri(path)? {
                Some(embedded) => self.textures.load_shared(
                    Some(image.clone()),
                    &embedded.data,
                    embedded.mime_type.as_deref(),
                )?,
                None => {
                    let resource = join_locator(locator, path);
                    log::debug!("Fetching Collada texture {resource}");
                    let bytes = fetcher.fetch(&resource, &no_progress).await?;
                    self.textures.load_shared(Some(path.clone()), &bytes, None)?
                }
            };
            textures.insert(image, texture);
        }

        let scene = SceneBuilder::new(&root, &library, &textures).build(&root)?;
        Ok(scene)
    }

    /// Reset the root scale and simplify Phong materials
    pub fn post_process(&self, root: &mut SceneNode) -> ReplaceReport {
        root.transform.scale = Vec3::ONE;
        let report = replace_materials(root, |material| {
            (material.kind() == MaterialKind::Phong).then(|| simplify_phong(material))
        });
        log::debug!(
            "Simplified {} Phong materials, released {} textures",
            report.replaced,
            report.released_textures
        );
        report
    }
}
