//! Primitive assembly: typed accessor extraction into interleaved vertices and index lists.

use crate::data_structures::{
    document::{Accessor, ComponentType, Dimensions, ModelDocument, Primitive},
    scene_graph::{Geometry, Indices, Vertex},
};

/**
 * Builds the geometry of one primitive.
 *
 * `POSITION` is required; without a usable position accessor the primitive
 * is dropped with a warning. `NORMAL` and `TEXCOORD_0` are optional and are
 * ignored (with a warning) when they are malformed or their element count
 * differs from the positions. An unusable index accessor falls back to the
 * implicit sequential list; indices that point past the vertices drop the
 * primitive.
 */
pub fn build_geometry(document: &ModelDocument, primitive: &Primitive, label: &str) -> Option<Geometry> {
    let positions = read_positions(document, primitive, label)?;
    if positions.is_empty() {
        log::warn!("{}: POSITION accessor is empty, skipping primitive", label);
        return None;
    }
    let vertex_count = positions.len();

    let normals = primitive
        .attribute("NORMAL")
        .and_then(|index| optional_accessor(document, index, "NORMAL", label))
        .and_then(|accessor| read_vec3_f32(accessor, "NORMAL", label))
        .filter(|normals| matches_count(normals.len(), vertex_count, "NORMAL", label));
    let tex_coords = primitive
        .attribute("TEXCOORD_0")
        .and_then(|index| optional_accessor(document, index, "TEXCOORD_0", label))
        .and_then(|accessor| read_tex_coords(accessor, label))
        .filter(|uvs| matches_count(uvs.len(), vertex_count, "TEXCOORD_0", label));

    let vertices: Vec<Vertex> = positions
        .iter()
        .enumerate()
        .map(|(i, position)| Vertex {
            position: *position,
            normal: normals.as_ref().map_or([0.0; 3], |n| n[i]),
            tex_coords: tex_coords.as_ref().map_or([0.0; 2], |t| t[i]),
        })
        .collect();

    let indices = match primitive.indices {
        Some(index) => read_indices(document, index, label).unwrap_or_else(|| {
            log::warn!("{}: falling back to sequential vertex order", label);
            Indices::Sequential(vertex_count as u32)
        }),
        None => Indices::Sequential(vertex_count as u32),
    };
    if let Some(bad) = indices.iter().find(|&i| i as usize >= vertex_count) {
        log::warn!(
            "{}: index {} is out of range for {} vertices, skipping primitive",
            label,
            bad,
            vertex_count
        );
        return None;
    }

    log::trace!(
        "{}: {} vertices, {} indices, normals: {}, texcoords: {}",
        label,
        vertex_count,
        indices.len(),
        normals.is_some(),
        tex_coords.is_some()
    );
    Some(Geometry {
        vertices,
        has_normals: normals.is_some(),
        has_tex_coords: tex_coords.is_some(),
        indices,
        mode: primitive.mode,
    })
}

fn read_positions(document: &ModelDocument, primitive: &Primitive, label: &str) -> Option<Vec<[f32; 3]>> {
    let Some(index) = primitive.attribute("POSITION") else {
        log::warn!("{}: no POSITION attribute, skipping primitive", label);
        return None;
    };
    let Some(accessor) = document.accessors.get(index) else {
        log::warn!("{}: POSITION accessor {} does not exist, skipping primitive", label, index);
        return None;
    };
    read_vec3_f32(accessor, "POSITION", label)
}

fn optional_accessor<'a>(document: &'a ModelDocument, index: usize, semantic: &str, label: &str) -> Option<&'a Accessor> {
    let accessor = document.accessors.get(index);
    if accessor.is_none() {
        log::warn!("{}: {} accessor {} does not exist, ignoring", label, semantic, index);
    }
    accessor
}

fn matches_count(len: usize, vertex_count: usize, semantic: &str, label: &str) -> bool {
    if len != vertex_count {
        log::warn!(
            "{}: {} has {} elements but there are {} vertices, ignoring",
            label,
            semantic,
            len,
            vertex_count
        );
    }
    len == vertex_count
}

fn read_vec3_f32(accessor: &Accessor, semantic: &str, label: &str) -> Option<Vec<[f32; 3]>> {
    if accessor.component_type != ComponentType::F32 || accessor.dimensions != Dimensions::Vec3 {
        log::warn!(
            "{}: {} must be VEC3 of f32, found {:?} of {:?}",
            label,
            semantic,
            accessor.dimensions,
            accessor.component_type
        );
        return None;
    }
    if !accessor.is_complete() {
        log::warn!("{}: {} accessor is truncated", label, semantic);
        return None;
    }
    Some(bytemuck::pod_collect_to_vec(accessor.bytes()))
}

/// Float UVs, or normalized unsigned bytes/shorts scaled into [0, 1].
fn read_tex_coords(accessor: &Accessor, label: &str) -> Option<Vec<[f32; 2]>> {
    if accessor.dimensions != Dimensions::Vec2 || !accessor.is_complete() {
        log::warn!("{}: TEXCOORD_0 must be a complete VEC2 accessor", label);
        return None;
    }
    let bytes = accessor.bytes();
    match (accessor.component_type, accessor.normalized) {
        (ComponentType::F32, _) => Some(bytemuck::pod_collect_to_vec(bytes)),
        (ComponentType::U8, true) => Some(
            bytes
                .chunks_exact(2)
                .map(|uv| [uv[0] as f32 / 255.0, uv[1] as f32 / 255.0])
                .collect(),
        ),
        (ComponentType::U16, true) => Some(
            bytemuck::pod_collect_to_vec::<u8, [u16; 2]>(bytes)
                .into_iter()
                .map(|[u, v]| [u as f32 / 65535.0, v as f32 / 65535.0])
                .collect(),
        ),
        (component_type, normalized) => {
            log::warn!(
                "{}: unsupported TEXCOORD_0 component type {:?} (normalized: {})",
                label,
                component_type,
                normalized
            );
            None
        }
    }
}

/// 16- and 32-bit indices are kept as they are; 8-bit ones are widened to 16 bits.
fn read_indices(document: &ModelDocument, index: usize, label: &str) -> Option<Indices> {
    let Some(accessor) = document.accessors.get(index) else {
        log::warn!("{}: index accessor {} does not exist", label, index);
        return None;
    };
    if accessor.dimensions != Dimensions::Scalar || !accessor.is_complete() {
        log::warn!("{}: index accessor {} is not a complete scalar accessor", label, index);
        return None;
    }
    let bytes = accessor.bytes();
    match accessor.component_type {
        ComponentType::U16 => Some(Indices::U16(bytemuck::pod_collect_to_vec(bytes))),
        ComponentType::U32 => Some(Indices::U32(bytemuck::pod_collect_to_vec(bytes))),
        ComponentType::U8 => Some(Indices::U16(bytes.iter().map(|&i| i as u16).collect())),
        other => {
            log::warn!("{}: unsupported index component type {:?}", label, other);
            None
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn document_with(accessors: Vec<Accessor>) -> ModelDocument {
        ModelDocument {
            accessors,
            ..Default::default()
        }
    }

    fn primitive(attributes: &[(&str, usize)], indices: Option<usize>) -> Primitive {
        Primitive {
            attributes: attributes.iter().map(|(n, i)| (n.to_string(), *i)).collect(),
            indices,
            ..Default::default()
        }
    }

    #[test]
    fn u32_indices_and_normalized_uvs() {
        let document = document_with(vec![
            Accessor::from_f32(Dimensions::Vec3, &[0.0; 9]),
            Accessor::from_u32(&[0, 1, 2]),
            Accessor {
                component_type: ComponentType::U8,
                dimensions: Dimensions::Vec2,
                normalized: true,
                count: 3,
                data: vec![0, 255, 255, 0, 51, 51],
            },
        ]);
        let geometry = build_geometry(&document, &primitive(&[("POSITION", 0), ("TEXCOORD_0", 2)], Some(1)), "t").unwrap();
        assert_eq!(geometry.indices, Indices::U32(vec![0, 1, 2]));
        assert!(geometry.has_tex_coords);
        assert!(!geometry.has_normals);
        assert_eq!(geometry.vertices[0].tex_coords, [0.0, 1.0]);
        assert!((geometry.vertices[2].tex_coords[0] - 0.2).abs() < 1e-6);
    }

    #[test]
    fn float_indices_fall_back_to_sequential() {
        let document = document_with(vec![
            Accessor::from_f32(Dimensions::Vec3, &[0.0; 9]),
            Accessor::from_f32(Dimensions::Scalar, &[0.0, 1.0, 2.0]),
        ]);
        let geometry = build_geometry(&document, &primitive(&[("POSITION", 0)], Some(1)), "t").unwrap();
        assert_eq!(geometry.indices, Indices::Sequential(3));
    }

    #[test]
    fn out_of_range_index_drops_primitive() {
        let document = document_with(vec![
            Accessor::from_f32(Dimensions::Vec3, &[0.0; 9]),
            Accessor::from_u16(&[0, 1, 7]),
        ]);
        assert!(build_geometry(&document, &primitive(&[("POSITION", 0)], Some(1)), "t").is_none());
    }

    #[test]
    fn mismatched_normals_are_ignored() {
        let document = document_with(vec![
            Accessor::from_f32(Dimensions::Vec3, &[0.0; 9]),
            Accessor::from_f32(Dimensions::Vec3, &[0.0, 0.0, 1.0]),
        ]);
        let geometry = build_geometry(&document, &primitive(&[("POSITION", 0), ("NORMAL", 1)], None), "t").unwrap();
        assert!(!geometry.has_normals);
    }

    #[test]
    fn position_of_wrong_type_drops_primitive() {
        let document = document_with(vec![Accessor::from_f32(Dimensions::Vec2, &[0.0; 6])]);
        assert!(build_geometry(&document, &primitive(&[("POSITION", 0)], None), "t").is_none());
    }
}
