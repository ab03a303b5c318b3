//! Node transforms and the fixed corrections applied at the root of a tile.
//!
//! All matrices are column-major `cgmath::Matrix4<f64>`; tiles are placed in
//! Earth-centered coordinates where single precision is not enough.

use cgmath::{Matrix4, One, Quaternion, SquareMatrix, Vector3};

use crate::data_structures::document::{ModelDocument, Node, UpAxis};

/// A node's decomposed transformation: position, rotation (as quaternion), and scale.
#[derive(Clone, Debug, PartialEq)]
pub struct NodeTransform {
    pub translation: Vector3<f64>,
    pub rotation: Quaternion<f64>,
    pub scale: Vector3<f64>,
}

impl NodeTransform {
    /// Identity transformation (no move, rotate, or scale).
    pub fn new() -> Self {
        Self {
            translation: Vector3::new(0.0, 0.0, 0.0),
            rotation: Quaternion::one(),
            scale: Vector3::new(1.0, 1.0, 1.0),
        }
    }

    /// Reads the separate components of a node, defaulting each absent one.
    pub fn from_node(node: &Node) -> Self {
        let mut transform = Self::new();
        if let Some([x, y, z]) = node.translation {
            transform.translation = Vector3::new(x, y, z);
        }
        if let Some([x, y, z, w]) = node.rotation {
            transform.rotation = Quaternion::new(w, x, y, z);
        }
        if let Some([x, y, z]) = node.scale {
            transform.scale = Vector3::new(x, y, z);
        }
        transform
    }

    /// `T * R * S`: scale first, translation outermost.
    pub fn to_matrix(&self) -> Matrix4<f64> {
        Matrix4::from_translation(self.translation)
            * Matrix4::from(self.rotation)
            * Matrix4::from_nonuniform_scale(self.scale.x, self.scale.y, self.scale.z)
    }
}

impl Default for NodeTransform {
    fn default() -> Self {
        Self::new()
    }
}

impl From<Vector3<f64>> for NodeTransform {
    fn from(translation: Vector3<f64>) -> Self {
        NodeTransform {
            translation,
            ..Default::default()
        }
    }
}

/// The local matrix of a node. An explicit matrix takes precedence.
pub fn local_matrix(node: &Node) -> Matrix4<f64> {
    match node.matrix {
        Some(m) => matrix_from_column_major(&m),
        None => NodeTransform::from_node(node).to_matrix(),
    }
}

pub fn matrix_from_column_major(m: &[f64; 16]) -> Matrix4<f64> {
    Matrix4::new(
        m[0], m[1], m[2], m[3], m[4], m[5], m[6], m[7], m[8], m[9], m[10], m[11], m[12], m[13],
        m[14], m[15],
    )
}

/// Rotation that brings an asset authored with `axis` up into the Z-up tile frame.
pub fn up_axis_correction(axis: UpAxis) -> Matrix4<f64> {
    match axis {
        // +90 degrees about X
        UpAxis::Y => Matrix4::new(
            1.0, 0.0, 0.0, 0.0, //
            0.0, 0.0, 1.0, 0.0, //
            0.0, -1.0, 0.0, 0.0, //
            0.0, 0.0, 0.0, 1.0,
        ),
        // -90 degrees about Y
        UpAxis::X => Matrix4::new(
            0.0, 0.0, 1.0, 0.0, //
            0.0, 1.0, 0.0, 0.0, //
            -1.0, 0.0, 0.0, 0.0, //
            0.0, 0.0, 0.0, 1.0,
        ),
        UpAxis::Z => Matrix4::identity(),
    }
}

/// `base * RTC * up-axis`, the transform every root node of a tile hangs under.
pub fn root_transform(base: &Matrix4<f64>, document: &ModelDocument) -> Matrix4<f64> {
    let recentered = match document.rtc_center {
        Some(center) => base * Matrix4::from_translation(center),
        None => *base,
    };
    recentered * up_axis_correction(document.up_axis)
}
