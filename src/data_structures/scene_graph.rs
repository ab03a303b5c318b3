//! Scene graph fragments produced for a tile.
//!
//! A built fragment is a plain owned tree of [`SceneNode`]s. It carries no
//! renderer handles, so it can be built on a worker thread and moved to the
//! render thread afterwards. [`realize`] maps it onto a concrete scene graph
//! runtime through the [`SceneGraphBackend`] capability trait.

use std::sync::Arc;

use cgmath::{Matrix4, Point3, SquareMatrix, Transform};

use crate::data_structures::{
    bounds::{BoundingBox, BoundingSphere},
    document::PrimitiveMode,
    material::RenderMaterial,
    texture::Texture2D,
};

/// Interleaved vertex as uploaded by GPU back ends.
#[repr(C)]
#[derive(Copy, Clone, Debug, Default, PartialEq, bytemuck::Pod, bytemuck::Zeroable)]
pub struct Vertex {
    pub position: [f32; 3],
    pub normal: [f32; 3],
    pub tex_coords: [f32; 2],
}

/// Triangle (or other primitive) indices of one geometry.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Indices {
    U16(Vec<u16>),
    U32(Vec<u32>),
    /// `0..n` without a buffer: the vertices themselves form the list.
    Sequential(u32),
}

impl Indices {
    pub fn len(&self) -> usize {
        match self {
            Self::U16(v) => v.len(),
            Self::U32(v) => v.len(),
            Self::Sequential(n) => *n as usize,
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn iter(&self) -> Box<dyn Iterator<Item = u32> + '_> {
        match self {
            Self::U16(v) => Box::new(v.iter().map(|&i| i as u32)),
            Self::U32(v) => Box::new(v.iter().copied()),
            Self::Sequential(n) => Box::new(0..*n),
        }
    }
}

#[derive(Clone, Debug)]
pub struct Geometry {
    pub vertices: Vec<Vertex>,
    pub has_normals: bool,
    pub has_tex_coords: bool,
    pub indices: Indices,
    pub mode: PrimitiveMode,
}

impl Geometry {
    /// Sphere around the vertex positions, invalid for an empty geometry.
    pub fn bound(&self) -> BoundingSphere {
        let mut bb = BoundingBox::new();
        for v in &self.vertices {
            bb.expand_by_point(Point3::new(
                v.position[0] as f64,
                v.position[1] as f64,
                v.position[2] as f64,
            ));
        }
        bb.to_sphere()
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum NodeKind {
    /// Pure container.
    Group,
    /// Applies `transform` to its subtree.
    Transform,
    /// Holds geometry with its material and texture.
    Drawable,
}

#[derive(Clone, Debug)]
pub struct SceneNode {
    pub name: Option<String>,
    pub kind: NodeKind,
    pub transform: Matrix4<f64>,
    pub geometry: Vec<Geometry>,
    pub material: Option<RenderMaterial>,
    pub texture: Option<Arc<Texture2D>>,
    pub children: Vec<SceneNode>,
}

impl SceneNode {
    pub fn group(name: Option<String>) -> Self {
        Self {
            name,
            kind: NodeKind::Group,
            transform: Matrix4::identity(),
            geometry: Vec::new(),
            material: None,
            texture: None,
            children: Vec::new(),
        }
    }

    pub fn transform(name: Option<String>, transform: Matrix4<f64>) -> Self {
        Self {
            kind: NodeKind::Transform,
            transform,
            ..Self::group(name)
        }
    }

    pub fn drawable(geometry: Geometry, material: RenderMaterial, texture: Option<Arc<Texture2D>>) -> Self {
        Self {
            kind: NodeKind::Drawable,
            geometry: vec![geometry],
            material: Some(material),
            texture,
            ..Self::group(None)
        }
    }

    pub fn add_child(&mut self, child: SceneNode) {
        self.children.push(child);
    }

    /**
     * Bound in the parent's frame.
     *
     * Geometry and children are merged in local space, then the node's own
     * transform is applied. Group and drawable transforms are identity.
     */
    pub fn compute_bound(&self) -> BoundingSphere {
        let parts: Vec<BoundingSphere> = self
            .geometry
            .iter()
            .map(Geometry::bound)
            .chain(self.children.iter().map(SceneNode::compute_bound))
            .collect();
        let local = match parts.as_slice() {
            [] => BoundingSphere::invalid(),
            [only] => *only,
            _ => BoundingSphere::enclosing(&parts),
        };
        match self.kind {
            NodeKind::Transform => local.transformed(&self.transform),
            NodeKind::Group | NodeKind::Drawable => local,
        }
    }

    /// Like [`compute_bound`](Self::compute_bound), but a degenerate result
    /// (radius not positive, or anything non-finite) is replaced by the box
    /// around every finite vertex of the subtree in the parent's frame.
    ///
    /// Returns the degenerate sphere unchanged when the vertices do not span
    /// any volume either.
    pub fn bound_with_fallback(&self) -> BoundingSphere {
        let bound = self.compute_bound();
        if is_usable(&bound) {
            return bound;
        }
        log::warn!("Bounding sphere is degenerate (radius {}), expanding over vertices", bound.radius);
        let mut bb = BoundingBox::new();
        self.expand_by_vertices(&Matrix4::identity(), &mut bb);
        let fallback = bb.to_sphere();
        if !is_usable(&fallback) {
            return bound;
        }
        log::debug!(
            "Recomputed bounding sphere: center=({}, {}, {}), radius={}",
            fallback.center.x,
            fallback.center.y,
            fallback.center.z,
            fallback.radius
        );
        fallback
    }

    fn expand_by_vertices(&self, parent: &Matrix4<f64>, bb: &mut BoundingBox) {
        let matrix = match self.kind {
            NodeKind::Transform => parent * self.transform,
            NodeKind::Group | NodeKind::Drawable => *parent,
        };
        for v in self.geometry.iter().flat_map(|g| &g.vertices) {
            let [x, y, z] = v.position.map(f64::from);
            let p = matrix.transform_point(Point3::new(x, y, z));
            if p.x.is_finite() && p.y.is_finite() && p.z.is_finite() {
                bb.expand_by_point(p);
            }
        }
        for child in &self.children {
            child.expand_by_vertices(&matrix, bb);
        }
    }

    /// Number of nodes in this subtree, including `self`.
    pub fn node_count(&self) -> usize {
        1 + self.children.iter().map(SceneNode::node_count).sum::<usize>()
    }

    pub fn geometry_count(&self) -> usize {
        self.geometry.len() + self.children.iter().map(SceneNode::geometry_count).sum::<usize>()
    }

    /// Depth-first pre-order walk.
    pub fn visit<'a>(&'a self, f: &mut dyn FnMut(&'a SceneNode)) {
        f(self);
        for child in &self.children {
            child.visit(f);
        }
    }
}

fn is_usable(sphere: &BoundingSphere) -> bool {
    sphere.radius > 0.0
        && sphere.radius.is_finite()
        && sphere.center.x.is_finite()
        && sphere.center.y.is_finite()
        && sphere.center.z.is_finite()
}

/// Minimal set of operations a scene graph runtime must offer to receive a
/// built fragment.
pub trait SceneGraphBackend {
    type Node;

    fn create_group(&mut self, name: Option<&str>) -> Self::Node;

    fn create_transform(&mut self, name: Option<&str>, matrix: &Matrix4<f64>) -> Self::Node;

    fn create_drawable(
        &mut self,
        geometry: &[Geometry],
        material: Option<&RenderMaterial>,
        texture: Option<&Texture2D>,
    ) -> Self::Node;

    fn add_child(&mut self, parent: &mut Self::Node, child: Self::Node);
}

/// Recreates `node` and its subtree with `backend`'s own node types.
pub fn realize<B: SceneGraphBackend>(node: &SceneNode, backend: &mut B) -> B::Node {
    let name = node.name.as_deref();
    let mut realized = match node.kind {
        NodeKind::Group => backend.create_group(name),
        NodeKind::Transform => backend.create_transform(name, &node.transform),
        NodeKind::Drawable => {
            backend.create_drawable(&node.geometry, node.material.as_ref(), node.texture.as_deref())
        }
    };
    for child in &node.children {
        let child = realize(child, backend);
        backend.add_child(&mut realized, child);
    }
    realized
}

#[cfg(test)]
mod tests {
    use super::*;
    use cgmath::Vector3;

    fn triangle() -> Geometry {
        let v = |x: f32, y: f32| Vertex {
            position: [x, y, 0.0],
            ..Default::default()
        };
        Geometry {
            vertices: vec![v(0.0, 0.0), v(2.0, 0.0), v(0.0, 2.0)],
            has_normals: false,
            has_tex_coords: false,
            indices: Indices::Sequential(3),
            mode: PrimitiveMode::Triangles,
        }
    }

    #[test]
    fn sequential_indices_enumerate_vertices() {
        assert_eq!(Indices::Sequential(3).iter().collect::<Vec<_>>(), vec![0, 1, 2]);
        assert_eq!(Indices::U16(vec![2, 1]).iter().collect::<Vec<_>>(), vec![2, 1]);
    }

    #[test]
    fn transform_moves_child_bound() {
        let mut root = SceneNode::transform(None, Matrix4::from_translation(Vector3::new(10.0, 0.0, 0.0)));
        root.add_child(SceneNode::drawable(triangle(), RenderMaterial::neutral(), None));
        let bound = root.compute_bound();
        assert!((bound.center.x - 11.0).abs() < 1e-9);
        assert!((bound.center.y - 1.0).abs() < 1e-9);
        assert_eq!(root.node_count(), 2);
        assert_eq!(root.geometry_count(), 1);
    }

    #[test]
    fn empty_group_has_invalid_bound() {
        let group = SceneNode::group(Some("empty".into()));
        assert!(!group.bound_with_fallback().is_valid());
    }
}
