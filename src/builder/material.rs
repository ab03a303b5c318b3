//! Material and texture synthesis for built primitives.

use std::{collections::HashMap, sync::Arc};

use crate::data_structures::{
    document::{ModelDocument, PbrMetallicRoughness},
    material::RenderMaterial,
    texture::Texture2D,
};

/// Textures already built for this document, by image index. Primitives
/// sharing an image share one [`Texture2D`].
#[derive(Default)]
pub struct TextureCache {
    by_image: HashMap<usize, Option<Arc<Texture2D>>>,
}

impl TextureCache {
    pub fn len(&self) -> usize {
        self.by_image.values().filter(|t| t.is_some()).count()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn get_or_build(&mut self, document: &ModelDocument, image_index: usize, label: &str) -> Option<Arc<Texture2D>> {
        self.by_image
            .entry(image_index)
            .or_insert_with(|| {
                let image = document.images.get(image_index)?;
                match Texture2D::from_image_asset(image) {
                    Ok(texture) => {
                        log::trace!(
                            "{}: texture {}x{} with {} channels",
                            label,
                            image.width,
                            image.height,
                            image.channels
                        );
                        Some(Arc::new(texture))
                    }
                    Err(e) => {
                        log::warn!("{}: image {} is unusable: {:#}", label, image_index, e);
                        None
                    }
                }
            })
            .clone()
    }
}

/**
 * Resolves the material and base color texture of a primitive.
 *
 * A base color factor yields a PBR-derived material. A texture without a
 * factor is lit with a white base color. With neither, the neutral grey
 * default is used so the primitive never renders invisibly.
 */
pub fn resolve_material(
    document: &ModelDocument,
    material_index: Option<usize>,
    textures: &mut TextureCache,
    label: &str,
) -> (RenderMaterial, Option<Arc<Texture2D>>) {
    let Some(index) = material_index else {
        return (RenderMaterial::neutral(), None);
    };
    let Some(material) = document.materials.get(index) else {
        log::warn!("{}: material {} does not exist, using default", label, index);
        return (RenderMaterial::neutral(), None);
    };
    let Some(pbr) = material.pbr.as_ref() else {
        log::debug!("{}: material {} has no PBR block, using default", label, index);
        return (RenderMaterial::neutral(), None);
    };

    let texture = base_color_texture(document, pbr, textures, label);
    let material = match pbr.base_color_factor {
        Some(factor) => Some(from_factors(factor, pbr)),
        None => {
            log::warn!("{}: material {} has no base color factor", label, index);
            None
        }
    };
    match (material, texture) {
        (Some(material), texture) => (material, texture),
        (None, Some(texture)) => (from_factors([1.0; 4], pbr), Some(texture)),
        (None, None) => (RenderMaterial::neutral(), None),
    }
}

fn from_factors(factor: [f64; 4], pbr: &PbrMetallicRoughness) -> RenderMaterial {
    RenderMaterial::from_pbr(
        factor.map(|c| c as f32),
        pbr.metallic_factor as f32,
        pbr.roughness_factor as f32,
    )
}

fn base_color_texture(
    document: &ModelDocument,
    pbr: &PbrMetallicRoughness,
    textures: &mut TextureCache,
    label: &str,
) -> Option<Arc<Texture2D>> {
    let texture_index = pbr.base_color_texture?;
    let Some(texture) = document.textures.get(texture_index) else {
        log::warn!("{}: base color texture {} does not exist", label, texture_index);
        return None;
    };
    let Some(source) = texture.source.filter(|s| *s < document.images.len()) else {
        log::warn!("{}: texture {} has no valid image source", label, texture_index);
        return None;
    };
    if document.images[source].pixels.is_empty() {
        log::debug!("{}: image {} has no pixels, skipping texture", label, source);
        return None;
    }
    textures.get_or_build(document, source, label)
}
