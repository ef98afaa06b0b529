//! Surface response parameters for the local lighting model.

use lumen_math::Color;

/// How a surface responds to light.
///
/// The tracer splits the response of a hit into an ambient share
/// `ambient * (1 - reflectivity)`, a diffuse share weighted by
/// `1 - reflectivity`, and a mirror share weighted by `reflectivity`.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct Material {
    /// Base (diffuse and ambient) color
    pub color: Color,

    /// Fraction of light that is mirror-reflected, in [0, 1]
    pub reflectivity: f64,

    /// Color of specular highlights
    pub specular: Color,

    /// Intensity of specular highlights
    pub specular_factor: f64,

    /// Phong exponent; higher is a tighter highlight
    pub shininess: f64,
}

impl Default for Material {
    fn default() -> Self {
        Self {
            color: Color::WHITE,
            reflectivity: 0.0,
            specular: Color::WHITE,
            specular_factor: 0.5,
            shininess: 32.0,
        }
    }
}

impl Material {
    /// Create a non-reflective material with the given base color.
    pub fn new(color: Color) -> Self {
        Self {
            color,
            ..Default::default()
        }
    }

    /// Set the reflectivity, clamped to [0, 1].
    pub fn with_reflectivity(mut self, reflectivity: f64) -> Self {
        self.reflectivity = if reflectivity.is_nan() {
            0.0
        } else {
            reflectivity.clamp(0.0, 1.0)
        };
        self
    }

    /// Set the specular color, intensity and exponent.
    pub fn with_specular(mut self, specular: Color, factor: f64, shininess: f64) -> Self {
        self.specular = specular;
        self.specular_factor = factor.max(0.0);
        self.shininess = shininess.max(0.0);
        self
    }

    /// Check if this material contributes a mirror term.
    pub fn is_reflective(&self) -> bool {
        self.reflectivity > 0.0
    }
}
