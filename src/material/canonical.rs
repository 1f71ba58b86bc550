//! Transmissive material canonicalization
//!
//! Semi-transparent legacy materials are ambiguous: the same opacity value
//! means "glass" in one exporter and "fade out" in another. Materials whose
//! opacity falls strictly inside the configured band are rebuilt as
//! `Physical` materials that render as fully opaque transmissive surfaces.

use std::sync::Arc;

use super::{
    replace_materials, Color, MaterialDescriptor, MaterialKind, MaterialProperty, PropertyValue,
    ReplaceReport,
};
use crate::config::TransmissionConfig;
use crate::scene::SceneNode;

/// Rewrites semi-transparent materials into transmissive ones
#[derive(Debug, Clone, Default)]
pub struct MaterialCanonicalizer {
    config: TransmissionConfig,
}

impl MaterialCanonicalizer {
    pub fn new(config: TransmissionConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &TransmissionConfig {
        &self.config
    }

    /// Whether `material` falls in the semi-transparent band
    pub fn qualifies(&self, material: &MaterialDescriptor) -> bool {
        let opacity = material.opacity();
        opacity > self.config.min_opacity && opacity < self.config.max_opacity
    }

    /// Build the transmissive replacement of a legacy material
    ///
    /// `ior` of `None` (or a non-positive value) falls back to the
    /// configured default.
    pub fn to_transmissive(
        &self,
        legacy: &MaterialDescriptor,
        ior: Option<f32>,
    ) -> MaterialDescriptor {
        let mut canonical = MaterialDescriptor::new(MaterialKind::Physical);

        for (key, value) in legacy.properties() {
            match value {
                PropertyValue::Null => {}
                PropertyValue::Texture(texture) => {
                    canonical.set(key, PropertyValue::Texture(texture.clone()));
                }
                PropertyValue::Color(_) | PropertyValue::Vec2(_) | PropertyValue::Side(_) => {
                    let compatible = canonical
                        .get(key)
                        .is_some_and(|default| default.same_kind(value));
                    if compatible {
                        canonical.set(key, value.clone());
                    }
                }
                PropertyValue::Scalar(number) => {
                    canonical.set(key, PropertyValue::Scalar(*number));
                }
                PropertyValue::Flag(_) | PropertyValue::Text(_) => {}
            }
        }

        let ior = ior
            .filter(|ior| ior.is_finite() && *ior > 0.0)
            .unwrap_or(self.config.default_ior);
        canonical.set(MaterialProperty::Opacity, PropertyValue::Scalar(1.0));
        canonical.set(MaterialProperty::Transmission, PropertyValue::Scalar(1.0));
        canonical.set(MaterialProperty::Ior, PropertyValue::Scalar(ior));

        if let Some(color) = canonical.color(MaterialProperty::Color) {
            let floored = floor_lightness(color, self.config.lightness_floor);
            canonical.set(MaterialProperty::Color, PropertyValue::Color(floored));
        }

        canonical
    }

    /// Replace every qualifying material in the tree
    ///
    /// A material shared by several meshes is replaced once and the
    /// replacement stays shared.
    pub fn canonicalize(&self, root: &mut SceneNode, ior: Option<f32>) -> ReplaceReport {
        replace_materials(root, |legacy| {
            if !self.qualifies(legacy) {
                return None;
            }
            log::debug!(
                "Converting {:?} material {} (opacity {}) to transmission",
                legacy.kind(),
                legacy.name().unwrap_or("unnamed"),
                legacy.opacity()
            );
            Some(self.to_transmissive(legacy, ior))
        })
    }

    /// Set the configured thickness on every material of the tree
    pub fn force_thickness(&self, root: &SceneNode) {
        for material in root.materials() {
            material.write().set(
                MaterialProperty::Thickness,
                PropertyValue::Scalar(self.config.thickness),
            );
        }
    }
}

/// Clear emissive maps and intensity on every material of the tree
///
/// Returns the number of emissive textures released.
pub fn remove_emission(root: &SceneNode) -> usize {
    let mut removed = Vec::new();
    for material in root.materials() {
        let mut material = material.write();
        if let Some(PropertyValue::Texture(texture)) = material.remove(MaterialProperty::EmissiveMap)
        {
            removed.push(texture);
        }
        material.set(MaterialProperty::EmissiveMap, PropertyValue::Null);
        material.set(MaterialProperty::EmissiveIntensity, PropertyValue::Scalar(0.0));
    }

    let in_use = root.texture_ids();
    removed
        .iter()
        .filter(|texture| !in_use.contains(&Arc::as_ptr(*texture)))
        .filter(|texture| texture.dispose())
        .count()
}

/// Raise HSL lightness to `floor`, keeping hue and saturation
pub fn floor_lightness(color: Color, floor: f32) -> Color {
    let (hue, saturation, lightness) = color.to_hsl();
    if lightness >= floor {
        color
    } else {
        Color::from_hsl(hue, saturation, floor)
    }
}
