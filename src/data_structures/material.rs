//! Fixed-function style materials synthesized from PBR factors.

/// Reflectance colors are sRGB-encoded RGBA.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct RenderMaterial {
    pub diffuse: [f32; 4],
    pub ambient: [f32; 4],
    pub specular: [f32; 4],
    pub shininess: f32,
}

impl RenderMaterial {
    /// Metallic factors above this route the base color into the specular channel.
    pub const METALLIC_THRESHOLD: f32 = 0.5;
    pub const AMBIENT_SCALE: f32 = 0.6;
    pub const DIELECTRIC_SPECULAR: [f32; 4] = [0.1, 0.1, 0.1, 1.0];

    /**
     * Converts a linear base color plus metallic/roughness factors.
     *
     * Metals get a black diffuse and the encoded color as specular; everything
     * else keeps the color in diffuse with a faint grey highlight. Ambient is
     * 60% of the encoded color, alpha untouched.
     */
    pub fn from_pbr(base_color: [f32; 4], metallic: f32, roughness: f32) -> Self {
        let encoded = srgb_encode(base_color);
        let (diffuse, specular) = if metallic > Self::METALLIC_THRESHOLD {
            ([0.0, 0.0, 0.0, 1.0], encoded)
        } else {
            (encoded, Self::DIELECTRIC_SPECULAR)
        };
        let ambient = [
            encoded[0] * Self::AMBIENT_SCALE,
            encoded[1] * Self::AMBIENT_SCALE,
            encoded[2] * Self::AMBIENT_SCALE,
            encoded[3],
        ];
        Self {
            diffuse,
            ambient,
            specular,
            shininess: (1.0 - roughness.clamp(0.0, 1.0)) * 128.0,
        }
    }

    /// Neutral grey used when a primitive carries no usable material.
    pub fn neutral() -> Self {
        Self {
            diffuse: [0.8, 0.8, 0.8, 1.0],
            ambient: [0.3, 0.3, 0.3, 1.0],
            specular: Self::DIELECTRIC_SPECULAR,
            shininess: 32.0,
        }
    }
}

impl Default for RenderMaterial {
    fn default() -> Self {
        Self::neutral()
    }
}

/// Standard sRGB transfer function for one channel, input clamped to [0, 1].
pub fn linear_to_srgb(c: f32) -> f32 {
    let c = c.clamp(0.0, 1.0);
    if c <= 0.0031308 {
        c * 12.92
    } else {
        1.055 * c.powf(1.0 / 2.4) - 0.055
    }
}

/// Encodes RGB, leaves alpha linear.
pub fn srgb_encode(color: [f32; 4]) -> [f32; 4] {
    [
        linear_to_srgb(color[0]),
        linear_to_srgb(color[1]),
        linear_to_srgb(color[2]),
        color[3],
    ]
}
