//! In-memory model document produced by the parsers.
//!
//! Everything refers to everything else by index. Indices are not validated
//! here; consumers treat an out-of-range index as absent.

use cgmath::Vector3;

/// Which axis points up in the source asset.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum UpAxis {
    X,
    #[default]
    Y,
    Z,
}

impl UpAxis {
    /// Maps the glTF `extras.gltfUpAxis` integer (0 = X, 1 = Y, 2 = Z).
    pub fn from_index(index: i64) -> Option<Self> {
        match index {
            0 => Some(Self::X),
            1 => Some(Self::Y),
            2 => Some(Self::Z),
            _ => None,
        }
    }
}

#[derive(Clone, Debug, Default)]
pub struct ModelDocument {
    pub scenes: Vec<Scene>,
    pub nodes: Vec<Node>,
    pub meshes: Vec<Mesh>,
    pub materials: Vec<Material>,
    pub textures: Vec<Texture>,
    pub images: Vec<ImageAsset>,
    pub accessors: Vec<Accessor>,
    /// Origin recentering offset (`CESIUM_RTC` or a b3dm `RTC_CENTER`).
    pub rtc_center: Option<Vector3<f64>>,
    pub up_axis: UpAxis,
}

#[derive(Clone, Debug, Default)]
pub struct Scene {
    pub name: Option<String>,
    pub nodes: Vec<usize>,
}

/// A hierarchy node. `matrix` wins over the separate components when present.
#[derive(Clone, Debug, Default)]
pub struct Node {
    pub name: Option<String>,
    pub children: Vec<usize>,
    pub mesh: Option<usize>,
    /// Column-major.
    pub matrix: Option<[f64; 16]>,
    pub translation: Option<[f64; 3]>,
    /// `[x, y, z, w]`
    pub rotation: Option<[f64; 4]>,
    pub scale: Option<[f64; 3]>,
}

#[derive(Clone, Debug, Default)]
pub struct Mesh {
    pub name: Option<String>,
    pub primitives: Vec<Primitive>,
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum PrimitiveMode {
    Points,
    Lines,
    LineLoop,
    LineStrip,
    #[default]
    Triangles,
    TriangleStrip,
    TriangleFan,
}

#[derive(Clone, Debug, Default)]
pub struct Primitive {
    /// Attribute semantic (`POSITION`, `NORMAL`, `TEXCOORD_0`, ..) to accessor index.
    pub attributes: Vec<(String, usize)>,
    pub indices: Option<usize>,
    pub material: Option<usize>,
    pub mode: PrimitiveMode,
}

impl Primitive {
    pub fn attribute(&self, semantic: &str) -> Option<usize> {
        self.attributes
            .iter()
            .find(|(name, _)| name == semantic)
            .map(|(_, accessor)| *accessor)
    }
}

#[derive(Clone, Debug, Default)]
pub struct Material {
    pub name: Option<String>,
    pub pbr: Option<PbrMetallicRoughness>,
}

#[derive(Clone, Debug)]
pub struct PbrMetallicRoughness {
    /// Linear RGBA.
    pub base_color_factor: Option<[f64; 4]>,
    /// Index into [`ModelDocument::textures`].
    pub base_color_texture: Option<usize>,
    pub metallic_factor: f64,
    pub roughness_factor: f64,
}

impl Default for PbrMetallicRoughness {
    fn default() -> Self {
        Self {
            base_color_factor: Some([1.0; 4]),
            base_color_texture: None,
            metallic_factor: 1.0,
            roughness_factor: 1.0,
        }
    }
}

#[derive(Clone, Debug, Default)]
pub struct Texture {
    /// Index into [`ModelDocument::images`].
    pub source: Option<usize>,
}

/// Decoded 8-bit pixels, row-major, `channels` bytes per pixel.
#[derive(Clone, Debug, Default)]
pub struct ImageAsset {
    pub width: u32,
    pub height: u32,
    pub channels: u8,
    pub pixels: Vec<u8>,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ComponentType {
    I8,
    U8,
    I16,
    U16,
    U32,
    F32,
}

impl ComponentType {
    pub fn size(self) -> usize {
        match self {
            Self::I8 | Self::U8 => 1,
            Self::I16 | Self::U16 => 2,
            Self::U32 | Self::F32 => 4,
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Dimensions {
    Scalar,
    Vec2,
    Vec3,
    Vec4,
    Mat2,
    Mat3,
    Mat4,
}

impl Dimensions {
    pub fn multiplicity(self) -> usize {
        match self {
            Self::Scalar => 1,
            Self::Vec2 => 2,
            Self::Vec3 => 3,
            Self::Vec4 | Self::Mat2 => 4,
            Self::Mat3 => 9,
            Self::Mat4 => 16,
        }
    }
}

/// A typed view whose elements have already been copied out of their buffer
/// and packed without stride. Little-endian.
#[derive(Clone, Debug)]
pub struct Accessor {
    pub component_type: ComponentType,
    pub dimensions: Dimensions,
    pub normalized: bool,
    pub count: usize,
    pub data: Vec<u8>,
}

impl Accessor {
    pub fn element_size(&self) -> usize {
        self.component_type.size() * self.dimensions.multiplicity()
    }

    /// Whether `data` really holds `count` elements.
    pub fn is_complete(&self) -> bool {
        self.count
            .checked_mul(self.element_size())
            .is_some_and(|needed| self.data.len() >= needed)
    }

    /// The bytes of exactly `count` elements.
    pub fn bytes(&self) -> &[u8] {
        let len = self.count.saturating_mul(self.element_size()).min(self.data.len());
        &self.data[..len]
    }

    pub fn from_f32(dimensions: Dimensions, values: &[f32]) -> Self {
        Self {
            component_type: ComponentType::F32,
            dimensions,
            normalized: false,
            count: values.len() / dimensions.multiplicity(),
            data: bytemuck::cast_slice(values).to_vec(),
        }
    }

    pub fn from_u16(values: &[u16]) -> Self {
        Self {
            component_type: ComponentType::U16,
            dimensions: Dimensions::Scalar,
            normalized: false,
            count: values.len(),
            data: bytemuck::cast_slice(values).to_vec(),
        }
    }

    pub fn from_u32(values: &[u32]) -> Self {
        Self {
            component_type: ComponentType::U32,
            dimensions: Dimensions::Scalar,
            normalized: false,
            count: values.len(),
            data: bytemuck::cast_slice(values).to_vec(),
        }
    }
}

impl ModelDocument {
    /// Nodes not listed as a child of any other node, in index order.
    pub fn orphan_nodes(&self) -> Vec<usize> {
        let mut referenced = vec![false; self.nodes.len()];
        for node in &self.nodes {
            for &child in &node.children {
                if let Some(flag) = referenced.get_mut(child) {
                    *flag = true;
                }
            }
        }
        referenced
            .iter()
            .enumerate()
            .filter(|(_, is_child)| !**is_child)
            .map(|(index, _)| index)
            .collect()
    }

    /// Whether there is anything to build at all.
    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty() && self.meshes.is_empty()
    }
}
