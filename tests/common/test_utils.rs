#![allow(dead_code)]

use std::path::PathBuf;

use tileflow::data_structures::document::{
    Accessor, Dimensions, Material, Mesh, ModelDocument, Node, PbrMetallicRoughness, Primitive,
    Scene,
};

pub fn init_logger() {
    let _ = env_logger::builder().is_test(true).try_init();
}

pub const TRIANGLE_POSITIONS: [f32; 9] = [0.0, 0.0, 0.0, 1.0, 0.0, 0.0, 0.0, 1.0, 0.0];

/// One scene, one node, one mesh, one triangle with `u16` indices.
///
/// Accessor 0 holds the positions, accessor 1 the indices.
pub fn triangle_document() -> ModelDocument {
    ModelDocument {
        scenes: vec![Scene {
            name: Some("scene".to_string()),
            nodes: vec![0],
        }],
        nodes: vec![Node {
            name: Some("triangle".to_string()),
            mesh: Some(0),
            ..Default::default()
        }],
        meshes: vec![Mesh {
            name: Some("triangle".to_string()),
            primitives: vec![triangle_primitive(0, Some(1), None)],
        }],
        accessors: vec![
            Accessor::from_f32(Dimensions::Vec3, &TRIANGLE_POSITIONS),
            Accessor::from_u16(&[0, 1, 2]),
        ],
        ..Default::default()
    }
}

pub fn triangle_primitive(position: usize, indices: Option<usize>, material: Option<usize>) -> Primitive {
    Primitive {
        attributes: vec![("POSITION".to_string(), position)],
        indices,
        material,
        ..Default::default()
    }
}

pub fn pbr_material(base_color: [f64; 4], metallic: f64, roughness: f64) -> Material {
    Material {
        name: None,
        pbr: Some(PbrMetallicRoughness {
            base_color_factor: Some(base_color),
            base_color_texture: None,
            metallic_factor: metallic,
            roughness_factor: roughness,
        }),
    }
}

/// Wraps a JSON document and a binary chunk into a GLB container.
pub fn glb(json: &serde_json::Value, bin: &[u8]) -> Vec<u8> {
    let mut json = serde_json::to_vec(json).unwrap();
    while json.len() % 4 != 0 {
        json.push(b' ');
    }
    let mut bin = bin.to_vec();
    while bin.len() % 4 != 0 {
        bin.push(0);
    }
    let bin_chunk_len = if bin.is_empty() { 0 } else { 8 + bin.len() };
    let total = 12 + 8 + json.len() + bin_chunk_len;

    let mut out = Vec::with_capacity(total);
    out.extend_from_slice(b"glTF");
    out.extend_from_slice(&2u32.to_le_bytes());
    out.extend_from_slice(&(total as u32).to_le_bytes());
    out.extend_from_slice(&(json.len() as u32).to_le_bytes());
    out.extend_from_slice(b"JSON");
    out.extend_from_slice(&json);
    if !bin.is_empty() {
        out.extend_from_slice(&(bin.len() as u32).to_le_bytes());
        out.extend_from_slice(b"BIN\0");
        out.extend_from_slice(&bin);
    }
    out
}

/// The triangle of [`triangle_document`] as a GLB, with `extra` merged into
/// the root of the JSON.
pub fn triangle_glb(extra: serde_json::Value) -> Vec<u8> {
    let mut bin: Vec<u8> = bytemuck::cast_slice(&TRIANGLE_POSITIONS).to_vec();
    bin.extend_from_slice(bytemuck::cast_slice(&[0u16, 1, 2]));
    bin.extend_from_slice(&[0, 0]);

    let mut json = serde_json::json!({
        "asset": { "version": "2.0" },
        "scene": 0,
        "scenes": [{ "nodes": [0] }],
        "nodes": [{ "mesh": 0, "translation": [1.0, 0.0, 0.0], "scale": [2.0, 2.0, 2.0] }],
        "meshes": [{ "primitives": [{ "attributes": { "POSITION": 0 }, "indices": 1, "material": 0 }] }],
        "materials": [{ "pbrMetallicRoughness": { "baseColorFactor": [1.0, 0.0, 0.0, 1.0], "metallicFactor": 0.9 } }],
        "buffers": [{ "byteLength": bin.len() }],
        "bufferViews": [
            { "buffer": 0, "byteOffset": 0, "byteLength": 36 },
            { "buffer": 0, "byteOffset": 36, "byteLength": 6 }
        ],
        "accessors": [
            { "bufferView": 0, "componentType": 5126, "count": 3, "type": "VEC3",
              "min": [0.0, 0.0, 0.0], "max": [1.0, 1.0, 0.0] },
            { "bufferView": 1, "componentType": 5123, "count": 3, "type": "SCALAR" }
        ]
    });
    if let (Some(root), serde_json::Value::Object(extra)) = (json.as_object_mut(), extra) {
        root.extend(extra);
    }
    glb(&json, &bin)
}

/// Wraps `glb` into a b3dm with the given feature table JSON.
pub fn b3dm(feature_table: &serde_json::Value, glb: &[u8]) -> Vec<u8> {
    let mut table = serde_json::to_vec(feature_table).unwrap();
    while (28 + table.len()) % 8 != 0 {
        table.push(b' ');
    }
    let total = 28 + table.len() + glb.len();
    let mut out = Vec::with_capacity(total);
    out.extend_from_slice(b"b3dm");
    for value in [1, total as u32, table.len() as u32, 0, 0, 0] {
        out.extend_from_slice(&value.to_le_bytes());
    }
    out.extend_from_slice(&table);
    out.extend_from_slice(glb);
    out
}

/// A fresh directory under the system temp dir, unique per test and process.
pub fn temp_dir(test: &str) -> PathBuf {
    let dir = std::env::temp_dir().join(format!("tileflow-{}-{}", test, std::process::id()));
    let _ = std::fs::remove_dir_all(&dir);
    std::fs::create_dir_all(&dir).unwrap();
    dir
}
