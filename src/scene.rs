//! Scene graph produced by the importers
//!
//! A tree of [`SceneNode`]s, each with a local [`Transform`], an optional
//! [`Mesh`] and children. Geometry is shared immutably; materials are
//! shared through [`MaterialRef`] so a replacement is visible to every
//! mesh that used the old material.

use glam::{Mat4, Quat, Vec3};
use std::collections::HashSet;
use std::sync::Arc;
use uuid::Uuid;

use crate::geometry::Geometry;
use crate::material::MaterialRef;
use crate::texture::{Texture, TextureRef};

/// Spatial transform (translation, rotation, scale)
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Transform {
    pub translation: Vec3,
    pub rotation: Quat,
    pub scale: Vec3,
}

impl Default for Transform {
    fn default() -> Self {
        Self::IDENTITY
    }
}

impl Transform {
    pub const IDENTITY: Transform = Transform {
        translation: Vec3::ZERO,
        rotation: Quat::IDENTITY,
        scale: Vec3::ONE,
    };

    /// Decompose an affine matrix
    pub fn from_matrix(matrix: Mat4) -> Self {
        let (scale, rotation, translation) = matrix.to_scale_rotation_translation();
        Self {
            translation,
            rotation,
            scale,
        }
    }

    /// Local-to-parent matrix
    pub fn matrix(&self) -> Mat4 {
        Mat4::from_scale_rotation_translation(self.scale, self.rotation, self.translation)
    }
}

/// Drawable geometry with its material
#[derive(Debug, Clone)]
pub struct Mesh {
    pub geometry: Arc<Geometry>,
    pub material: MaterialRef,
}

impl Mesh {
    pub fn new(geometry: impl Into<Arc<Geometry>>, material: MaterialRef) -> Self {
        Self {
            geometry: geometry.into(),
            material,
        }
    }

    /// Whether this mesh draws line segments
    pub fn is_line(&self) -> bool {
        self.geometry.primitive_type.is_line()
    }
}

/// A node in the scene hierarchy
#[derive(Debug, Clone, Default)]
pub struct SceneNode {
    /// Optional name of the node
    pub name: Option<String>,
    /// Local transform of the node
    pub transform: Transform,
    pub mesh: Option<Mesh>,
    pub children: Vec<SceneNode>,
}

impl SceneNode {
    /// Create an empty group node
    pub fn new(name: Option<String>) -> Self {
        Self {
            name,
            ..Default::default()
        }
    }

    /// Create a node holding a mesh
    pub fn with_mesh(name: Option<String>, mesh: Mesh) -> Self {
        Self {
            name,
            mesh: Some(mesh),
            ..Default::default()
        }
    }

    pub fn with_transform(mut self, transform: Transform) -> Self {
        self.transform = transform;
        self
    }

    pub fn add_child(&mut self, child: SceneNode) {
        self.children.push(child);
    }

    /// Visit this node and all descendants, depth first
    pub fn traverse<'a>(&'a self, visit: &mut impl FnMut(&'a SceneNode)) {
        visit(self);
        for child in &self.children {
            child.traverse(visit);
        }
    }

    /// Mutable depth-first traversal
    pub fn traverse_mut(&mut self, visit: &mut impl FnMut(&mut SceneNode)) {
        visit(self);
        for child in &mut self.children {
            child.traverse_mut(visit);
        }
    }

    /// Visit every node with its world matrix
    ///
    /// `parent` is the matrix this node's transform is relative to.
    pub fn traverse_world(&self, parent: Mat4, visit: &mut impl FnMut(&SceneNode, Mat4)) {
        let world = parent * self.transform.matrix();
        visit(self, world);
        for child in &self.children {
            child.traverse_world(world, visit);
        }
    }

    /// Total number of nodes in the subtree
    pub fn node_count(&self) -> usize {
        let mut count = 0;
        self.traverse(&mut |_| count += 1);
        count
    }

    /// Every mesh in the subtree
    pub fn meshes(&self) -> Vec<&Mesh> {
        let mut meshes = Vec::new();
        self.traverse(&mut |node| {
            if let Some(mesh) = &node.mesh {
                meshes.push(mesh);
            }
        });
        meshes
    }

    /// Distinct materials in the subtree, in first-use order
    pub fn materials(&self) -> Vec<MaterialRef> {
        let mut seen = HashSet::new();
        let mut materials = Vec::new();
        for mesh in self.meshes() {
            if seen.insert(Arc::as_ptr(&mesh.material)) {
                materials.push(mesh.material.clone());
            }
        }
        materials
    }

    /// Distinct textures referenced by any material in the subtree
    pub fn textures(&self) -> Vec<TextureRef> {
        let mut seen = HashSet::new();
        let mut textures = Vec::new();
        for material in self.materials() {
            for (_, texture) in material.read().textures() {
                if seen.insert(Arc::as_ptr(texture)) {
                    textures.push(texture.clone());
                }
            }
        }
        textures
    }

    /// Identity set of the textures in use
    pub fn texture_ids(&self) -> HashSet<*const Texture> {
        self.textures().iter().map(Arc::as_ptr).collect()
    }

    /// Remove every descendant for which `remove` returns true
    ///
    /// Returns the number of removed subtrees. The root itself is never
    /// removed.
    pub fn remove_descendants(&mut self, remove: &impl Fn(&SceneNode) -> bool) -> usize {
        let before = self.children.len();
        self.children.retain(|child| !remove(child));
        let mut removed = before - self.children.len();
        for child in &mut self.children {
            removed += child.remove_descendants(remove);
        }
        removed
    }

    /// Release every texture of the subtree
    ///
    /// Returns the number of textures disposed by this call.
    pub fn release(&self) -> usize {
        self.release_except(&HashSet::new())
    }

    fn release_except(&self, keep: &HashSet<*const Texture>) -> usize {
        self.textures()
            .iter()
            .filter(|texture| !keep.contains(&Arc::as_ptr(*texture)))
            .filter(|texture| texture.dispose())
            .count()
    }
}

/// Holder of the model currently inserted into a scene
///
/// Installing a new model releases the textures of the previous one,
/// except those the new model also uses.
#[derive(Debug, Default)]
pub struct ModelSlot {
    id: Option<Uuid>,
    current: Option<SceneNode>,
}

impl ModelSlot {
    pub fn new() -> Self {
        Self::default()
    }

    /// Replace the current model, returning how many textures were released
    pub fn install(&mut self, model: SceneNode) -> usize {
        let released = match self.current.take() {
            Some(previous) => previous.release_except(&model.texture_ids()),
            None => 0,
        };
        if released > 0 {
            log::debug!("Released {released} textures of the previous model");
        }
        self.id = Some(Uuid::new_v4());
        self.current = Some(model);
        released
    }

    /// Remove and release the current model
    pub fn clear(&mut self) -> usize {
        self.id = None;
        self.current.take().map_or(0, |model| model.release())
    }

    pub fn current(&self) -> Option<&SceneNode> {
        self.current.as_ref()
    }

    /// Identifier of the current installation
    pub fn id(&self) -> Option<Uuid> {
        self.id
    }
}
