//! Axis-aligned boxes and bounding spheres over scene trees

use glam::{Mat4, Vec3};

use crate::scene::SceneNode;

/// Axis-aligned bounding box
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Aabb {
    pub min: Vec3,
    pub max: Vec3,
}

impl Aabb {
    pub fn new(min: Vec3, max: Vec3) -> Self {
        Self { min, max }
    }

    /// Smallest box containing every point; `None` when there are none
    pub fn from_points(points: impl IntoIterator<Item = Vec3>) -> Option<Self> {
        let mut points = points.into_iter();
        let first = points.next()?;
        let mut aabb = Self::new(first, first);
        for point in points {
            aabb.extend(point);
        }
        Some(aabb)
    }

    pub fn extend(&mut self, point: Vec3) {
        self.min = self.min.min(point);
        self.max = self.max.max(point);
    }

    pub fn center(&self) -> Vec3 {
        (self.min + self.max) * 0.5
    }

    pub fn size(&self) -> Vec3 {
        self.max - self.min
    }

    pub fn half_diagonal(&self) -> f32 {
        self.size().length() * 0.5
    }

    pub fn is_finite(&self) -> bool {
        self.min.is_finite() && self.max.is_finite()
    }

    /// Sphere through the box corners
    pub fn bounding_sphere(&self) -> BoundingSphere {
        BoundingSphere {
            center: self.center(),
            radius: self.half_diagonal(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct BoundingSphere {
    pub center: Vec3,
    pub radius: f32,
}

/// Box over every mesh vertex, with `root` placed by `root_matrix`
///
/// `root_matrix` replaces the root's own transform; descendants use theirs.
pub fn scene_bounds(root: &SceneNode, root_matrix: Mat4) -> Option<Aabb> {
    let mut aabb: Option<Aabb> = None;
    let mut include = |node: &SceneNode, world: Mat4| {
        let Some(mesh) = &node.mesh else {
            return;
        };
        for point in mesh.geometry.transformed_positions(world) {
            let mut bounds = aabb.unwrap_or(Aabb::new(point, point));
            bounds.extend(point);
            aabb = Some(bounds);
        }
    };

    include(root, root_matrix);
    for child in &root.children {
        child.traverse_world(root_matrix, &mut include);
    }
    aabb
}
