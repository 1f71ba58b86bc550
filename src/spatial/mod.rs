//! Spatial normalization
//!
//! Rescales an imported model so its bounding sphere has radius 1, then
//! applies the caller's placement on top.

pub mod bounds;

pub use bounds::{scene_bounds, Aabb, BoundingSphere};

use glam::{EulerRot, Mat4, Quat, Vec3};

use crate::error::{ImportError, Result};
use crate::scene::SceneNode;

/// Caller placement applied after normalization
///
/// Every field is absolute: it replaces the corresponding root value.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct Placement {
    pub position: Option<Vec3>,
    /// XYZ Euler angles in degrees
    pub rotation_degrees: Option<Vec3>,
    /// Multiplier on the normalized scale; zero, negative and non-finite
    /// values are ignored
    pub scale: Option<f32>,
}

/// What normalization measured and applied
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Normalization {
    /// Sphere of the model as imported (root scale ignored)
    pub source_sphere: BoundingSphere,
    /// `1 / source_sphere.radius`
    pub unit_scale: f32,
    /// Box after rescaling, before placement
    pub normalized_bounds: Aabb,
}

#[derive(Debug, Clone, Copy, Default)]
pub struct SpatialNormalizer;

impl SpatialNormalizer {
    pub fn new() -> Self {
        Self
    }

    /// Rescale `root` to a unit bounding sphere
    pub fn normalize(&self, root: &mut SceneNode) -> Result<Normalization> {
        let transform = root.transform;
        let measure = Mat4::from_rotation_translation(transform.rotation, transform.translation);
        let aabb = scene_bounds(root, measure)
            .ok_or_else(|| ImportError::DegenerateGeometry("model has no geometry".to_string()))?;

        let sphere = aabb.bounding_sphere();
        if !aabb.is_finite() || !sphere.radius.is_finite() || sphere.radius <= 0.0 {
            return Err(ImportError::DegenerateGeometry(format!(
                "bounding sphere radius is {}",
                sphere.radius
            )));
        }

        let unit_scale = 1.0 / sphere.radius;
        root.transform.scale = Vec3::splat(unit_scale);
        root.transform.translation *= unit_scale;

        let normalized_bounds = scene_bounds(root, root.transform.matrix())
            .ok_or_else(|| ImportError::DegenerateGeometry("model has no geometry".to_string()))?;

        log::debug!(
            "Normalized model: radius {:.4} -> scale {:.4}, center {:?}",
            sphere.radius,
            unit_scale,
            sphere.center
        );

        Ok(Normalization {
            source_sphere: sphere,
            unit_scale,
            normalized_bounds,
        })
    }

    /// Apply caller overrides on a normalized root
    pub fn place(&self, root: &mut SceneNode, normalization: &Normalization, placement: &Placement) {
        if let Some(position) = placement.position {
            root.transform.translation = position;
        }
        match placement.scale {
            Some(scale) if scale.is_finite() && scale > 0.0 => {
                root.transform.scale = Vec3::splat(normalization.unit_scale * scale);
            }
            Some(scale) => log::warn!("Ignoring placement scale {scale}"),
            None => {}
        }
        if let Some(degrees) = placement.rotation_degrees {
            root.transform.rotation = Quat::from_euler(
                EulerRot::XYZ,
                degrees.x.to_radians(),
                degrees.y.to_radians(),
                degrees.z.to_radians(),
            );
        }
    }
}
