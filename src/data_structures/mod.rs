//! Data structures: model documents, scene graph fragments and what they carry.
//!
//! This module contains the core data types on both sides of the builder:
//!
//! - `document` is the parsed, index-based model document
//! - `scene_graph` is the built, owned fragment and the back-end capability trait
//! - `transform` holds node transform composition and root corrections
//! - `bounds` provides bounding spheres and boxes
//! - `material` converts PBR factors into renderer materials
//! - `texture` wraps decoded images with sampler state

pub mod bounds;
pub mod document;
pub mod material;
pub mod scene_graph;
pub mod texture;
pub mod transform;
