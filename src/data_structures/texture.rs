//! Renderer textures built from decoded model images.
//!
//! This module provides [`Texture2D`], the CPU-side texture handed to a scene
//! graph back end together with the sampler state it should be bound with.

use anyhow::*;
use image::{RgbImage, RgbaImage};

use crate::data_structures::document::ImageAsset;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum WrapMode {
    Repeat,
    ClampToEdge,
    MirroredRepeat,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum FilterMode {
    Nearest,
    Linear,
    /// Trilinear: linear within and between mip levels.
    LinearMipmapLinear,
}

#[derive(Clone, Debug)]
pub enum TextureImage {
    Rgb(RgbImage),
    Rgba(RgbaImage),
}

/// A 2D color texture with its sampler settings.
#[derive(Clone, Debug)]
pub struct Texture2D {
    pub image: TextureImage,
    pub wrap_s: WrapMode,
    pub wrap_t: WrapMode,
    pub min_filter: FilterMode,
    pub mag_filter: FilterMode,
}

impl Texture2D {
    /// Copies a 3- or 4-channel image into a repeating, trilinear-filtered texture.
    ///
    /// Fails when the image is empty, has another channel count, or its pixel
    /// buffer does not match its dimensions.
    pub fn from_image_asset(asset: &ImageAsset) -> Result<Self> {
        if asset.pixels.is_empty() || asset.width == 0 || asset.height == 0 {
            bail!("Image has no pixel data");
        }
        let image = match asset.channels {
            3 => TextureImage::Rgb(
                RgbImage::from_raw(asset.width, asset.height, asset.pixels.clone())
                    .context("RGB pixel buffer does not match image dimensions")?,
            ),
            4 => TextureImage::Rgba(
                RgbaImage::from_raw(asset.width, asset.height, asset.pixels.clone())
                    .context("RGBA pixel buffer does not match image dimensions")?,
            ),
            n => bail!("Unsupported channel count {}", n),
        };
        Ok(Self {
            image,
            wrap_s: WrapMode::Repeat,
            wrap_t: WrapMode::Repeat,
            min_filter: FilterMode::LinearMipmapLinear,
            mag_filter: FilterMode::Linear,
        })
    }

    pub fn dimensions(&self) -> (u32, u32) {
        match &self.image {
            TextureImage::Rgb(img) => img.dimensions(),
            TextureImage::Rgba(img) => img.dimensions(),
        }
    }

    pub fn channels(&self) -> u8 {
        match self.image {
            TextureImage::Rgb(_) => 3,
            TextureImage::Rgba(_) => 4,
        }
    }
}
