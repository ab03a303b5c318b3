//! Model document to scene graph conversion.
//!
//! The produced tree has a fixed shape:
//!
//! ```text
//! Group (tile container)
//! └── Transform (base * RTC * up-axis)
//!     └── Transform per root node (local matrix)
//!         ├── Group per mesh
//!         │   └── Drawable per primitive
//!         └── child node Transforms ...
//! ```

use cgmath::Matrix4;

use crate::data_structures::{
    bounds::BoundingSphere,
    document::ModelDocument,
    scene_graph::SceneNode,
    transform::{local_matrix, root_transform},
};

pub mod material;
pub mod mesh;

use self::material::{TextureCache, resolve_material};

/// Counters collected while building, for logging and tests.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct BuildStats {
    pub nodes: usize,
    pub primitives: usize,
    pub skipped_primitives: usize,
    pub textures: usize,
}

/// A built tile fragment with its bound in the fragment's parent frame.
#[derive(Debug)]
pub struct BuiltScene {
    pub root: SceneNode,
    pub bound: BoundingSphere,
    pub stats: BuildStats,
}

/**
 * Walks a [`ModelDocument`] and produces an owned [`SceneNode`] tree.
 *
 * Building is deterministic and never fails: anything malformed is skipped
 * with a warning and the rest of the document is still built.
 */
pub struct SceneGraphBuilder<'a> {
    document: &'a ModelDocument,
    textures: TextureCache,
    stats: BuildStats,
}

impl<'a> SceneGraphBuilder<'a> {
    pub fn new(document: &'a ModelDocument) -> Self {
        Self {
            document,
            textures: TextureCache::default(),
            stats: BuildStats::default(),
        }
    }

    pub fn build(mut self, base: &Matrix4<f64>) -> BuiltScene {
        let started = instant::Instant::now();
        let mut root = SceneNode::transform(Some("root".to_string()), root_transform(base, self.document));

        let mut path = Vec::new();
        for index in self.root_nodes() {
            if let Some(node) = self.build_node(index, &mut path) {
                root.add_child(node);
            }
        }

        let mut container = SceneNode::group(Some("tile".to_string()));
        container.add_child(root);
        let bound = container.bound_with_fallback();
        self.stats.textures = self.textures.len();

        log::debug!(
            "Built scene with {} node(s), {} primitive(s) ({} skipped), {} texture(s) in {:?}",
            self.stats.nodes,
            self.stats.primitives,
            self.stats.skipped_primitives,
            self.stats.textures,
            started.elapsed()
        );
        BuiltScene {
            root: container,
            bound,
            stats: self.stats,
        }
    }

    /// Scene roots when the document has scenes, otherwise every orphan node.
    fn root_nodes(&self) -> Vec<usize> {
        if self.document.scenes.is_empty() {
            log::trace!("No scenes, building {} orphan node(s)", self.document.orphan_nodes().len());
            return self.document.orphan_nodes();
        }
        let mut roots = Vec::new();
        for (scene_index, scene) in self.document.scenes.iter().enumerate() {
            for &node in &scene.nodes {
                if node < self.document.nodes.len() {
                    roots.push(node);
                } else {
                    log::warn!("Invalid node index {} in scene {}", node, scene_index);
                }
            }
        }
        roots
    }

    /// `path` holds the indices of the nodes currently being built, so a
    /// node listing one of its ancestors as a child is caught.
    fn build_node(&mut self, index: usize, path: &mut Vec<usize>) -> Option<SceneNode> {
        let document = self.document;
        let Some(node) = document.nodes.get(index) else {
            log::warn!("Invalid node index {}", index);
            return None;
        };
        if path.contains(&index) {
            log::warn!("Node {} is its own ancestor, skipping the cycle", index);
            return None;
        }

        let mut built = SceneNode::transform(node.name.clone(), local_matrix(node));
        self.stats.nodes += 1;

        if let Some(mesh_index) = node.mesh {
            match self.build_mesh(mesh_index) {
                Some(mesh) => built.add_child(mesh),
                None => log::warn!("Node {} references invalid mesh {}", index, mesh_index),
            }
        }

        path.push(index);
        for &child in &node.children {
            if let Some(child) = self.build_node(child, path) {
                built.add_child(child);
            }
        }
        path.pop();

        Some(built)
    }

    /// One group per mesh with one drawable per primitive that could be built.
    fn build_mesh(&mut self, mesh_index: usize) -> Option<SceneNode> {
        let document = self.document;
        let mesh = document.meshes.get(mesh_index)?;
        let mut group = SceneNode::group(mesh.name.clone());
        for (primitive_index, primitive) in mesh.primitives.iter().enumerate() {
            let label = format!("mesh {} primitive {}", mesh_index, primitive_index);
            let Some(geometry) = mesh::build_geometry(document, primitive, &label) else {
                self.stats.skipped_primitives += 1;
                continue;
            };
            let (material, texture) = resolve_material(document, primitive.material, &mut self.textures, &label);
            group.add_child(SceneNode::drawable(geometry, material, texture));
            self.stats.primitives += 1;
        }
        Some(group)
    }
}

/// Builds `document` under `base`. Shorthand for [`SceneGraphBuilder`].
pub fn build_scene(document: &ModelDocument, base: &Matrix4<f64>) -> BuiltScene {
    SceneGraphBuilder::new(document).build(base)
}
