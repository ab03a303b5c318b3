//! glTF 2.0 parser (binary GLB and JSON), built on the `gltf` crate.

use std::path::Path;

use anyhow::{Context, bail};
use cgmath::Vector3;
use image::{DynamicImage, ImageBuffer, Luma, LumaA, Rgb, Rgba};

use crate::{
    data_structures::document::{
        Accessor, ComponentType, Dimensions, ImageAsset, Material, Mesh, ModelDocument, Node,
        PbrMetallicRoughness, Primitive, PrimitiveMode, Scene, Texture, UpAxis,
    },
    parser::{ModelDocumentParser, ParseOptions, ParseOutcome, url_extension},
};

/// Extensions that only annotate data this parser handles itself, and so do
/// not block loading when listed as required.
const TOLERATED_REQUIRED_EXTENSIONS: &[&str] = &["CESIUM_RTC", "KHR_materials_unlit"];

/// Upper bound for accessors without a buffer view, which are zero-filled.
const MAX_ZERO_FILLED_BYTES: usize = 256 << 20;

pub struct GltfParser;

impl ModelDocumentParser for GltfParser {
    fn name(&self) -> &'static str {
        "glTF"
    }

    fn accepts(&self, bytes: &[u8], url: &str) -> bool {
        bytes.starts_with(b"glTF")
            || first_significant_byte(bytes) == Some(b'{')
            || matches!(url_extension(url).as_deref(), Some("glb" | "gltf"))
    }

    fn parse(&self, bytes: &[u8], options: &ParseOptions) -> ParseOutcome {
        let mut warnings = Vec::new();
        match parse_gltf(bytes, options, &mut warnings) {
            Ok(document) => ParseOutcome {
                document: Some(document),
                errors: Vec::new(),
                warnings,
            },
            Err(e) => ParseOutcome {
                document: None,
                errors: vec![format!("{:#}", e)],
                warnings,
            },
        }
    }
}

fn first_significant_byte(bytes: &[u8]) -> Option<u8> {
    let bytes = bytes.strip_prefix(b"\xEF\xBB\xBF").unwrap_or(bytes);
    bytes.iter().copied().find(|b| !b.is_ascii_whitespace())
}

/// Pushes onto the warning list and the log at the same time.
fn warn(warnings: &mut Vec<String>, message: String) {
    log::warn!("{}", message);
    warnings.push(message);
}

/**
 * Parses a GLB container or a JSON glTF into a [`ModelDocument`].
 *
 * Accessors are copied out of their buffers up front, so the document does
 * not borrow the input. Images that fail to load are kept as empty entries
 * to preserve indices.
 */
pub fn parse_gltf(bytes: &[u8], options: &ParseOptions, warnings: &mut Vec<String>) -> anyhow::Result<ModelDocument> {
    let (json, blob) = if bytes.starts_with(b"glTF") {
        let glb = ::gltf::Glb::from_slice(bytes).context("Invalid GLB container")?;
        (glb.json.into_owned(), glb.bin.map(|bin| bin.into_owned()))
    } else {
        (bytes.to_vec(), None)
    };

    let raw: serde_json::Value = serde_json::from_slice(&json).context("glTF JSON is malformed")?;
    let mut root: ::gltf::json::Root = serde_json::from_value(raw.clone()).context("glTF JSON does not describe a glTF asset")?;
    root.extensions_required.retain(|ext| {
        let tolerated = TOLERATED_REQUIRED_EXTENSIONS.contains(&ext.as_str());
        if !tolerated {
            log::debug!("glTF requires extension {}", ext);
        }
        !tolerated
    });
    let document = ::gltf::Document::from_json(root).context("glTF validation failed")?;

    let base = options.base_dir.as_deref();
    let buffers = ::gltf::import_buffers(&document, base, blob).context("Could not load glTF buffers")?;

    let mut model = ModelDocument {
        rtc_center: read_rtc_center(&raw),
        up_axis: read_up_axis(&raw, warnings),
        ..Default::default()
    };

    model.accessors = document
        .accessors()
        .map(|accessor| read_accessor(&accessor, &buffers, warnings))
        .collect();
    model.images = document
        .images()
        .map(|image| read_image(&image, base, &buffers, warnings))
        .collect();
    model.textures = document
        .textures()
        .map(|texture| Texture {
            source: Some(texture.source().index()),
        })
        .collect();
    model.materials = document.materials().map(|m| read_material(&m, &raw)).collect();
    model.meshes = document.meshes().map(|m| read_mesh(&m)).collect();
    model.nodes = document.nodes().map(|n| read_node(&n)).collect();
    model.scenes = document
        .scenes()
        .map(|scene| Scene {
            name: scene.name().map(str::to_string),
            nodes: scene.nodes().map(|n| n.index()).collect(),
        })
        .collect();

    log::debug!(
        "Parsed glTF: {} scene(s), {} node(s), {} mesh(es), {} material(s), {} image(s)",
        model.scenes.len(),
        model.nodes.len(),
        model.meshes.len(),
        model.materials.len(),
        model.images.len()
    );
    Ok(model)
}

fn read_rtc_center(raw: &serde_json::Value) -> Option<Vector3<f64>> {
    let center = raw.pointer("/extensions/CESIUM_RTC/center")?.as_array()?;
    match center.as_slice() {
        [x, y, z] => Some(Vector3::new(x.as_f64()?, y.as_f64()?, z.as_f64()?)),
        _ => None,
    }
}

fn read_up_axis(raw: &serde_json::Value, warnings: &mut Vec<String>) -> UpAxis {
    let Some(value) = raw.pointer("/extras/gltfUpAxis") else {
        return UpAxis::default();
    };
    let axis = match value {
        serde_json::Value::Number(n) => n.as_i64().and_then(UpAxis::from_index),
        serde_json::Value::String(s) => match s.to_ascii_uppercase().as_str() {
            "X" => Some(UpAxis::X),
            "Y" => Some(UpAxis::Y),
            "Z" => Some(UpAxis::Z),
            _ => None,
        },
        _ => None,
    };
    axis.unwrap_or_else(|| {
        warn(warnings, format!("Unknown gltfUpAxis value {}, assuming Y up", value));
        UpAxis::default()
    })
}

fn read_accessor(accessor: &::gltf::Accessor, buffers: &[::gltf::buffer::Data], warnings: &mut Vec<String>) -> Accessor {
    use ::gltf::accessor::{DataType, Dimensions as D};

    let component_type = match accessor.data_type() {
        DataType::I8 => ComponentType::I8,
        DataType::U8 => ComponentType::U8,
        DataType::I16 => ComponentType::I16,
        DataType::U16 => ComponentType::U16,
        DataType::U32 => ComponentType::U32,
        DataType::F32 => ComponentType::F32,
    };
    let dimensions = match accessor.dimensions() {
        D::Scalar => Dimensions::Scalar,
        D::Vec2 => Dimensions::Vec2,
        D::Vec3 => Dimensions::Vec3,
        D::Vec4 => Dimensions::Vec4,
        D::Mat2 => Dimensions::Mat2,
        D::Mat3 => Dimensions::Mat3,
        D::Mat4 => Dimensions::Mat4,
    };
    let mut result = Accessor {
        component_type,
        dimensions,
        normalized: accessor.normalized(),
        count: accessor.count(),
        data: Vec::new(),
    };
    let element_size = result.element_size();

    if accessor.sparse().is_some() {
        warn(
            warnings,
            format!("Accessor {} is sparse; only its base values are used", accessor.index()),
        );
    }

    let Some(view) = accessor.view() else {
        // No view means all zeros.
        match element_size
            .checked_mul(result.count)
            .filter(|&len| len <= MAX_ZERO_FILLED_BYTES)
        {
            Some(len) => result.data = vec![0; len],
            None => warn(
                warnings,
                format!(
                    "Accessor {} declares {} elements without a buffer view, too many to zero-fill",
                    accessor.index(),
                    result.count
                ),
            ),
        }
        return result;
    };
    let Some(buffer) = buffers.get(view.buffer().index()) else {
        warn(warnings, format!("Accessor {} refers to a missing buffer", accessor.index()));
        return result;
    };
    let stride = view.stride().unwrap_or(element_size).max(element_size);
    let view_end = view.offset().saturating_add(view.length()).min(buffer.len());
    let Some(start) = view.offset().checked_add(accessor.offset()) else {
        warn(warnings, format!("Accessor {} has an out-of-range byte offset", accessor.index()));
        return result;
    };

    // Never trust `count` beyond what the view can hold.
    let available = match view_end.checked_sub(start) {
        Some(len) if len >= element_size => (len - element_size) / stride + 1,
        _ => 0,
    };
    let readable = result.count.min(available);
    result.data.reserve(element_size * readable);
    for i in 0..readable {
        let begin = start + i * stride;
        result.data.extend_from_slice(&buffer[begin..begin + element_size]);
    }
    if readable < result.count {
        warn(
            warnings,
            format!(
                "Accessor {} overruns its buffer view after {} of {} elements",
                accessor.index(),
                readable,
                result.count
            ),
        );
    }
    result
}

fn read_image(
    image: &::gltf::Image,
    base: Option<&Path>,
    buffers: &[::gltf::buffer::Data],
    warnings: &mut Vec<String>,
) -> ImageAsset {
    match ::gltf::image::Data::from_source(image.source(), base, buffers) {
        Ok(data) => match to_image_asset(data) {
            Ok(asset) => asset,
            Err(e) => {
                warn(warnings, format!("Image {} could not be converted: {:#}", image.index(), e));
                ImageAsset::default()
            }
        },
        Err(e) => {
            warn(warnings, format!("Image {} could not be loaded: {}", image.index(), e));
            ImageAsset::default()
        }
    }
}

/// Normalizes any decoded glTF image to 8-bit RGB or RGBA.
fn to_image_asset(data: ::gltf::image::Data) -> anyhow::Result<ImageAsset> {
    use ::gltf::image::Format;

    let (width, height, format) = (data.width, data.height, data.format);
    let pixels = data.pixels;
    let dynamic = match format {
        Format::R8G8B8 => return Ok(asset(width, height, 3, pixels)),
        Format::R8G8B8A8 => return Ok(asset(width, height, 4, pixels)),
        Format::R8 => ImageBuffer::<Luma<u8>, _>::from_raw(width, height, pixels).map(DynamicImage::ImageLuma8),
        Format::R8G8 => ImageBuffer::<LumaA<u8>, _>::from_raw(width, height, pixels).map(DynamicImage::ImageLumaA8),
        Format::R16 => ImageBuffer::<Luma<u16>, _>::from_raw(width, height, widen(&pixels)).map(DynamicImage::ImageLuma16),
        Format::R16G16 => ImageBuffer::<LumaA<u16>, _>::from_raw(width, height, widen(&pixels)).map(DynamicImage::ImageLumaA16),
        Format::R16G16B16 => ImageBuffer::<Rgb<u16>, _>::from_raw(width, height, widen(&pixels)).map(DynamicImage::ImageRgb16),
        Format::R16G16B16A16 => ImageBuffer::<Rgba<u16>, _>::from_raw(width, height, widen(&pixels)).map(DynamicImage::ImageRgba16),
        Format::R32G32B32FLOAT => ImageBuffer::<Rgb<f32>, _>::from_raw(width, height, floats(&pixels)).map(DynamicImage::ImageRgb32F),
        Format::R32G32B32A32FLOAT => ImageBuffer::<Rgba<f32>, _>::from_raw(width, height, floats(&pixels)).map(DynamicImage::ImageRgba32F),
    };
    let Some(dynamic) = dynamic else {
        bail!("pixel buffer does not match {}x{} {:?}", width, height, format);
    };
    if dynamic.color().has_alpha() {
        Ok(asset(width, height, 4, dynamic.to_rgba8().into_raw()))
    } else {
        Ok(asset(width, height, 3, dynamic.to_rgb8().into_raw()))
    }
}

fn widen(bytes: &[u8]) -> Vec<u16> {
    bytemuck::pod_collect_to_vec(bytes)
}

fn floats(bytes: &[u8]) -> Vec<f32> {
    bytemuck::pod_collect_to_vec(bytes)
}

fn asset(width: u32, height: u32, channels: u8, pixels: Vec<u8>) -> ImageAsset {
    ImageAsset {
        width,
        height,
        channels,
        pixels,
    }
}

/**
 * Carries over only what the JSON declares, not the `gltf` crate's filled-in
 * defaults. Without `pbrMetallicRoughness` there is no PBR block, and a
 * missing `metallicFactor` reads as a dielectric.
 */
fn read_material(material: &::gltf::Material, raw: &serde_json::Value) -> Material {
    let name = material.name().map(str::to_string);
    let declared = material
        .index()
        .and_then(|index| raw.pointer(&format!("/materials/{}/pbrMetallicRoughness", index)))
        .filter(|block| block.is_object());
    let Some(declared) = declared else {
        return Material { name, pbr: None };
    };
    let pbr = material.pbr_metallic_roughness();
    let base_color_factor = declared
        .get("baseColorFactor")
        .map(|_| pbr.base_color_factor().map(|c| c as f64));
    let metallic_factor = match declared.get("metallicFactor") {
        Some(_) => pbr.metallic_factor() as f64,
        None => 0.0,
    };
    Material {
        name,
        pbr: Some(PbrMetallicRoughness {
            base_color_factor,
            base_color_texture: pbr.base_color_texture().map(|info| info.texture().index()),
            metallic_factor,
            roughness_factor: pbr.roughness_factor() as f64,
        }),
    }
}

fn read_mesh(mesh: &::gltf::Mesh) -> Mesh {
    use ::gltf::mesh::Mode;

    let primitives = mesh
        .primitives()
        .map(|primitive| Primitive {
            attributes: primitive
                .attributes()
                .filter_map(|(semantic, accessor)| Some((semantic_name(&semantic)?, accessor.index())))
                .collect(),
            indices: primitive.indices().map(|a| a.index()),
            material: primitive.material().index(),
            mode: match primitive.mode() {
                Mode::Points => PrimitiveMode::Points,
                Mode::Lines => PrimitiveMode::Lines,
                Mode::LineLoop => PrimitiveMode::LineLoop,
                Mode::LineStrip => PrimitiveMode::LineStrip,
                Mode::Triangles => PrimitiveMode::Triangles,
                Mode::TriangleStrip => PrimitiveMode::TriangleStrip,
                Mode::TriangleFan => PrimitiveMode::TriangleFan,
            },
        })
        .collect();
    Mesh {
        name: mesh.name().map(str::to_string),
        primitives,
    }
}

fn semantic_name(semantic: &::gltf::Semantic) -> Option<String> {
    use ::gltf::Semantic as S;

    #[allow(unreachable_patterns)]
    let name = match semantic {
        S::Positions => "POSITION".to_string(),
        S::Normals => "NORMAL".to_string(),
        S::Tangents => "TANGENT".to_string(),
        S::Colors(n) => format!("COLOR_{}", n),
        S::TexCoords(n) => format!("TEXCOORD_{}", n),
        S::Joints(n) => format!("JOINTS_{}", n),
        S::Weights(n) => format!("WEIGHTS_{}", n),
        _ => return None,
    };
    Some(name)
}

fn read_node(node: &::gltf::Node) -> Node {
    let mut result = Node {
        name: node.name().map(str::to_string),
        children: node.children().map(|c| c.index()).collect(),
        mesh: node.mesh().map(|m| m.index()),
        ..Default::default()
    };
    match node.transform() {
        ::gltf::scene::Transform::Matrix { matrix } => {
            let mut flat = [0.0; 16];
            for (column, values) in matrix.iter().enumerate() {
                for (row, value) in values.iter().enumerate() {
                    flat[column * 4 + row] = *value as f64;
                }
            }
            result.matrix = Some(flat);
        }
        ::gltf::scene::Transform::Decomposed { translation, rotation, scale } => {
            result.translation = Some(translation.map(f64::from));
            result.rotation = Some(rotation.map(f64::from));
            result.scale = Some(scale.map(f64::from));
        }
    }
    result
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn accepts_glb_magic_and_json() {
        assert!(GltfParser.accepts(b"glTF\x02\x00\x00\x00", "x"));
        assert!(GltfParser.accepts(b"\xEF\xBB\xBF  {\"asset\":{}}", "x"));
        assert!(GltfParser.accepts(b"", "model.GLTF"));
        assert!(!GltfParser.accepts(b"b3dm", "tile.b3dm"));
    }

    #[test]
    fn rtc_and_up_axis_are_read_from_json() {
        let raw = serde_json::json!({
            "extensions": { "CESIUM_RTC": { "center": [1.0, 2.0, 3.0] } },
            "extras": { "gltfUpAxis": 2 }
        });
        let mut warnings = Vec::new();
        assert_eq!(read_rtc_center(&raw), Some(Vector3::new(1.0, 2.0, 3.0)));
        assert_eq!(read_up_axis(&raw, &mut warnings), UpAxis::Z);
        assert!(warnings.is_empty());

        let raw = serde_json::json!({ "extras": { "gltfUpAxis": "sideways" } });
        assert_eq!(read_up_axis(&raw, &mut warnings), UpAxis::Y);
        assert_eq!(warnings.len(), 1);
    }

    #[test]
    fn malformed_json_is_an_error_not_a_panic() {
        let outcome = GltfParser.parse(b"{ not json", &ParseOptions::default());
        assert!(outcome.document.is_none());
        assert_eq!(outcome.errors.len(), 1);
    }
}
