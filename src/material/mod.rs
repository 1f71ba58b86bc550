//! Material descriptors
//!
//! A material is a bag of named properties. Each [`MaterialKind`] has a
//! schema of default values; decoders overwrite what the source file
//! specifies and may add keys outside the schema. Materials are shared
//! between meshes through [`MaterialRef`], so replacing one keeps every
//! node that used it pointing at the same new material.

pub mod canonical;

pub use canonical::MaterialCanonicalizer;

use glam::Vec2;
use parking_lot::RwLock;
use std::collections::{BTreeMap, HashMap, HashSet};
use std::sync::Arc;

use crate::scene::SceneNode;
use crate::texture::TextureRef;

/// Shared, replaceable handle to a material
pub type MaterialRef = Arc<RwLock<MaterialDescriptor>>;

/// Wrap a descriptor in a shared handle
pub fn shared(material: MaterialDescriptor) -> MaterialRef {
    Arc::new(RwLock::new(material))
}

/// Material family
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum MaterialKind {
    /// Unlit color
    Basic,
    /// Diffuse only
    Lambert,
    /// Diffuse plus specular highlight
    Phong,
    /// Metal/roughness PBR
    Standard,
    /// PBR with transmission, the canonical output family
    Physical,
}

impl MaterialKind {
    /// Whether this is one of the families produced by decoders
    pub fn is_legacy(self) -> bool {
        !matches!(self, Self::Physical)
    }
}

/// Which faces of a mesh are rendered
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Side {
    #[default]
    Front,
    Back,
    Double,
}

/// Linear RGB color
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Color {
    pub r: f32,
    pub g: f32,
    pub b: f32,
}

impl Color {
    pub const WHITE: Color = Color::rgb(1.0, 1.0, 1.0);
    pub const BLACK: Color = Color::rgb(0.0, 0.0, 0.0);

    pub const fn rgb(r: f32, g: f32, b: f32) -> Self {
        Self { r, g, b }
    }

    /// Build from a `0xRRGGBB` integer
    pub fn from_hex(hex: u32) -> Self {
        Self::rgb(
            ((hex >> 16) & 0xff) as f32 / 255.0,
            ((hex >> 8) & 0xff) as f32 / 255.0,
            (hex & 0xff) as f32 / 255.0,
        )
    }

    pub fn to_array(self) -> [f32; 3] {
        [self.r, self.g, self.b]
    }

    /// Convert to hue, saturation, lightness, each in [0, 1]
    pub fn to_hsl(self) -> (f32, f32, f32) {
        let max = self.r.max(self.g).max(self.b);
        let min = self.r.min(self.g).min(self.b);
        let lightness = (min + max) / 2.0;

        if (max - min).abs() <= f32::EPSILON {
            return (0.0, 0.0, lightness);
        }

        let delta = max - min;
        let saturation = if lightness <= 0.5 {
            delta / (max + min)
        } else {
            delta / (2.0 - max - min)
        };

        let hue = if max == self.r {
            (self.g - self.b) / delta + if self.g < self.b { 6.0 } else { 0.0 }
        } else if max == self.g {
            (self.b - self.r) / delta + 2.0
        } else {
            (self.r - self.g) / delta + 4.0
        };

        (hue / 6.0, saturation, lightness)
    }

    /// Build from hue, saturation, lightness
    pub fn from_hsl(hue: f32, saturation: f32, lightness: f32) -> Self {
        let hue = hue.rem_euclid(1.0);
        let saturation = saturation.clamp(0.0, 1.0);
        let lightness = lightness.clamp(0.0, 1.0);

        if saturation == 0.0 {
            return Self::rgb(lightness, lightness, lightness);
        }

        let p = if lightness <= 0.5 {
            lightness * (1.0 + saturation)
        } else {
            lightness + saturation - lightness * saturation
        };
        let q = 2.0 * lightness - p;

        Self::rgb(
            hue_to_rgb(q, p, hue + 1.0 / 3.0),
            hue_to_rgb(q, p, hue),
            hue_to_rgb(q, p, hue - 1.0 / 3.0),
        )
    }
}

impl From<[f32; 3]> for Color {
    fn from([r, g, b]: [f32; 3]) -> Self {
        Self::rgb(r, g, b)
    }
}

fn hue_to_rgb(p: f32, q: f32, t: f32) -> f32 {
    let t = t.rem_euclid(1.0);
    if t < 1.0 / 6.0 {
        p + (q - p) * 6.0 * t
    } else if t < 0.5 {
        q
    } else if t < 2.0 / 3.0 {
        p + (q - p) * 6.0 * (2.0 / 3.0 - t)
    } else {
        p
    }
}

/// Property keys a material may carry
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum MaterialProperty {
    Name,
    Color,
    Opacity,
    Transparent,
    AlphaTest,
    Side,
    Wireframe,
    VertexColors,
    FlatShading,
    Map,
    AlphaMap,
    LightMap,
    LightMapIntensity,
    AoMap,
    AoMapIntensity,
    Emissive,
    EmissiveMap,
    EmissiveIntensity,
    BumpMap,
    BumpScale,
    NormalMap,
    NormalScale,
    DisplacementMap,
    DisplacementScale,
    DisplacementBias,
    Specular,
    SpecularMap,
    Shininess,
    Reflectivity,
    RefractionRatio,
    EnvMap,
    EnvMapIntensity,
    Roughness,
    RoughnessMap,
    Metalness,
    MetalnessMap,
    Clearcoat,
    ClearcoatRoughness,
    Sheen,
    SheenColor,
    SheenRoughness,
    Iridescence,
    SpecularIntensity,
    SpecularColor,
    Transmission,
    TransmissionMap,
    Ior,
    Thickness,
    ThicknessMap,
    AttenuationColor,
    AttenuationDistance,
}

/// Value stored under a material property
#[derive(Debug, Clone)]
pub enum PropertyValue {
    /// Explicitly unset (an empty texture slot)
    Null,
    Texture(TextureRef),
    Color(Color),
    Vec2(Vec2),
    Side(Side),
    Scalar(f32),
    Flag(bool),
    Text(String),
}

impl PropertyValue {
    /// Whether both values are the same variant
    pub fn same_kind(&self, other: &PropertyValue) -> bool {
        std::mem::discriminant(self) == std::mem::discriminant(other)
    }

    pub fn is_null(&self) -> bool {
        matches!(self, Self::Null)
    }
}

impl PartialEq for PropertyValue {
    fn eq(&self, other: &Self) -> bool {
        match (self, other) {
            (Self::Null, Self::Null) => true,
            (Self::Texture(a), Self::Texture(b)) => Arc::ptr_eq(a, b),
            (Self::Color(a), Self::Color(b)) => a == b,
            (Self::Vec2(a), Self::Vec2(b)) => a == b,
            (Self::Side(a), Self::Side(b)) => a == b,
            (Self::Scalar(a), Self::Scalar(b)) => a == b,
            (Self::Flag(a), Self::Flag(b)) => a == b,
            (Self::Text(a), Self::Text(b)) => a == b,
            _ => false,
        }
    }
}

/// A material: a kind plus its property bag
#[derive(Debug, Clone, PartialEq)]
pub struct MaterialDescriptor {
    kind: MaterialKind,
    properties: BTreeMap<MaterialProperty, PropertyValue>,
}

impl MaterialDescriptor {
    /// Create a material holding the defaults of `kind`
    pub fn new(kind: MaterialKind) -> Self {
        Self {
            kind,
            properties: defaults(kind).into_iter().collect(),
        }
    }

    /// Set the material name
    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.set(MaterialProperty::Name, PropertyValue::Text(name.into()));
        self
    }

    /// Builder form of [`set`](Self::set)
    pub fn with(mut self, key: MaterialProperty, value: PropertyValue) -> Self {
        self.set(key, value);
        self
    }

    pub fn kind(&self) -> MaterialKind {
        self.kind
    }

    pub fn name(&self) -> Option<&str> {
        match self.get(MaterialProperty::Name) {
            Some(PropertyValue::Text(name)) if !name.is_empty() => Some(name),
            _ => None,
        }
    }

    pub fn get(&self, key: MaterialProperty) -> Option<&PropertyValue> {
        self.properties.get(&key)
    }

    /// Set a property, adding the key if the schema lacks it
    pub fn set(&mut self, key: MaterialProperty, value: PropertyValue) {
        self.properties.insert(key, value);
    }

    /// Remove a property entirely
    pub fn remove(&mut self, key: MaterialProperty) -> Option<PropertyValue> {
        self.properties.remove(&key)
    }

    pub fn scalar(&self, key: MaterialProperty) -> Option<f32> {
        match self.get(key) {
            Some(PropertyValue::Scalar(value)) => Some(*value),
            _ => None,
        }
    }

    pub fn color(&self, key: MaterialProperty) -> Option<Color> {
        match self.get(key) {
            Some(PropertyValue::Color(color)) => Some(*color),
            _ => None,
        }
    }

    pub fn texture(&self, key: MaterialProperty) -> Option<&TextureRef> {
        match self.get(key) {
            Some(PropertyValue::Texture(texture)) => Some(texture),
            _ => None,
        }
    }

    pub fn flag(&self, key: MaterialProperty) -> Option<bool> {
        match self.get(key) {
            Some(PropertyValue::Flag(flag)) => Some(*flag),
            _ => None,
        }
    }

    /// Opacity, 1 when unset
    pub fn opacity(&self) -> f32 {
        self.scalar(MaterialProperty::Opacity).unwrap_or(1.0)
    }

    /// Iterate over every property in key order
    pub fn properties(&self) -> impl Iterator<Item = (MaterialProperty, &PropertyValue)> {
        self.properties.iter().map(|(key, value)| (*key, value))
    }

    /// Iterate over every texture slot that holds a texture
    pub fn textures(&self) -> impl Iterator<Item = (MaterialProperty, &TextureRef)> {
        self.properties.iter().filter_map(|(key, value)| match value {
            PropertyValue::Texture(texture) => Some((*key, texture)),
            _ => None,
        })
    }

    /// Whether any slot holds `texture`
    pub fn references(&self, texture: &TextureRef) -> bool {
        self.textures().any(|(_, held)| Arc::ptr_eq(held, texture))
    }
}

/// Outcome of a [`replace_materials`] pass
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct ReplaceReport {
    /// Distinct materials replaced
    pub replaced: usize,
    /// Textures of replaced materials that nothing references any more
    pub released_textures: usize,
}

/// Swap materials of every mesh in the tree
///
/// `rebuild` is asked once per distinct material; returning `Some` swaps
/// the replacement in on every mesh that shared the old material. The
/// replacement is fully built before any mesh sees it. Textures held only
/// by replaced materials are disposed afterwards.
pub fn replace_materials(
    root: &mut SceneNode,
    mut rebuild: impl FnMut(&MaterialDescriptor) -> Option<MaterialDescriptor>,
) -> ReplaceReport {
    let mut decided: HashMap<*const RwLock<MaterialDescriptor>, Option<MaterialRef>> =
        HashMap::new();
    let mut retired: Vec<MaterialRef> = Vec::new();

    root.traverse_mut(&mut |node| {
        let Some(mesh) = node.mesh.as_mut() else {
            return;
        };
        let key = Arc::as_ptr(&mesh.material);

        let replacement = decided
            .entry(key)
            .or_insert_with(|| {
                let built = rebuild(&*mesh.material.read()).map(shared);
                if built.is_some() {
                    retired.push(mesh.material.clone());
                }
                built
            })
            .clone();

        if let Some(replacement) = replacement {
            mesh.material = replacement;
        }
    });

    let in_use: HashSet<*const crate::texture::Texture> = root.texture_ids();
    let mut released_textures = 0;
    for material in &retired {
        for (_, texture) in material.read().textures() {
            if !in_use.contains(&Arc::as_ptr(texture)) && texture.dispose() {
                released_textures += 1;
            }
        }
    }

    ReplaceReport {
        replaced: retired.len(),
        released_textures,
    }
}

/// Default property set of a material kind
pub fn defaults(kind: MaterialKind) -> Vec<(MaterialProperty, PropertyValue)> {
    use MaterialProperty as P;
    use PropertyValue as V;

    let mut props = vec![
        (P::Name, V::Text(String::new())),
        (P::Opacity, V::Scalar(1.0)),
        (P::Transparent, V::Flag(false)),
        (P::AlphaTest, V::Scalar(0.0)),
        (P::Side, V::Side(Side::Front)),
        (P::Wireframe, V::Flag(false)),
        (P::VertexColors, V::Flag(false)),
        (P::Color, V::Color(Color::WHITE)),
        (P::Map, V::Null),
        (P::AlphaMap, V::Null),
        (P::LightMap, V::Null),
        (P::LightMapIntensity, V::Scalar(1.0)),
        (P::AoMap, V::Null),
        (P::AoMapIntensity, V::Scalar(1.0)),
        (P::EnvMap, V::Null),
    ];

    let shaded = [
        (P::Emissive, V::Color(Color::BLACK)),
        (P::EmissiveMap, V::Null),
        (P::EmissiveIntensity, V::Scalar(1.0)),
        (P::BumpMap, V::Null),
        (P::BumpScale, V::Scalar(1.0)),
        (P::NormalMap, V::Null),
        (P::NormalScale, V::Vec2(Vec2::ONE)),
        (P::DisplacementMap, V::Null),
        (P::DisplacementScale, V::Scalar(1.0)),
        (P::DisplacementBias, V::Scalar(0.0)),
        (P::FlatShading, V::Flag(false)),
    ];

    let classic = [
        (P::SpecularMap, V::Null),
        (P::Reflectivity, V::Scalar(1.0)),
        (P::RefractionRatio, V::Scalar(0.98)),
    ];

    let pbr = [
        (P::Roughness, V::Scalar(1.0)),
        (P::RoughnessMap, V::Null),
        (P::Metalness, V::Scalar(0.0)),
        (P::MetalnessMap, V::Null),
        (P::EnvMapIntensity, V::Scalar(1.0)),
    ];

    match kind {
        MaterialKind::Basic => {
            props.extend(classic);
        }
        MaterialKind::Lambert => {
            props.extend(classic);
            props.extend(shaded);
        }
        MaterialKind::Phong => {
            props.extend(classic);
            props.extend(shaded);
            props.push((P::Specular, V::Color(Color::from_hex(0x111111))));
            props.push((P::Shininess, V::Scalar(30.0)));
        }
        MaterialKind::Standard => {
            props.extend(shaded);
            props.extend(pbr);
        }
        MaterialKind::Physical => {
            props.extend(shaded);
            props.extend(pbr);
            props.extend([
                (P::Clearcoat, V::Scalar(0.0)),
                (P::ClearcoatRoughness, V::Scalar(0.0)),
                (P::Sheen, V::Scalar(0.0)),
                (P::SheenColor, V::Color(Color::BLACK)),
                (P::SheenRoughness, V::Scalar(1.0)),
                (P::Iridescence, V::Scalar(0.0)),
                (P::SpecularIntensity, V::Scalar(1.0)),
                (P::SpecularColor, V::Color(Color::WHITE)),
                (P::Transmission, V::Scalar(0.0)),
                (P::TransmissionMap, V::Null),
                (P::Ior, V::Scalar(1.5)),
                (P::Thickness, V::Scalar(0.0)),
                (P::ThicknessMap, V::Null),
                (P::AttenuationColor, V::Color(Color::WHITE)),
                (P::AttenuationDistance, V::Scalar(f32::INFINITY)),
            ]);
        }
    }

    props
}
