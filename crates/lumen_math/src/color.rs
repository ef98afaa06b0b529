use std::ops::{Add, AddAssign, Div, Mul};

/// Linear RGB color used as a light accumulator.
///
/// Channels are unclamped while light is being mixed; [`Color::clamp`] maps
/// them into the displayable `[0, 1]` range.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct Color {
    pub r: f64,
    pub g: f64,
    pub b: f64,
}

impl Color {
    pub const BLACK: Color = Color::new(0.0, 0.0, 0.0);
    pub const WHITE: Color = Color::new(1.0, 1.0, 1.0);

    /// Create a color from linear channel values.
    pub const fn new(r: f64, g: f64, b: f64) -> Self {
        Self { r, g, b }
    }

    /// Create a color from 8-bit channel values (0-255).
    pub fn from_rgb8(r: u8, g: u8, b: u8) -> Self {
        Self::new(
            f64::from(r) / 255.0,
            f64::from(g) / 255.0,
            f64::from(b) / 255.0,
        )
    }

    /// Clamp every channel to `[0, 1]`.
    pub fn clamp(self) -> Self {
        Self::new(
            self.r.clamp(0.0, 1.0),
            self.g.clamp(0.0, 1.0),
            self.b.clamp(0.0, 1.0),
        )
    }

    /// Convert to 8-bit channels, `round(channel * 255)` after clamping.
    pub fn to_bytes(self) -> [u8; 3] {
        let c = self.clamp();
        [to_byte(c.r), to_byte(c.g), to_byte(c.b)]
    }
}

#[inline]
fn to_byte(channel: f64) -> u8 {
    // NaN maps to 0 through the saturating float-to-int cast.
    (channel * 255.0).round() as u8
}

impl Add for Color {
    type Output = Color;

    #[inline]
    fn add(self, rhs: Color) -> Color {
        Color::new(self.r + rhs.r, self.g + rhs.g, self.b + rhs.b)
    }
}

impl AddAssign for Color {
    #[inline]
    fn add_assign(&mut self, rhs: Color) {
        self.r += rhs.r;
        self.g += rhs.g;
        self.b += rhs.b;
    }
}

impl Mul for Color {
    type Output = Color;

    #[inline]
    fn mul(self, rhs: Color) -> Color {
        Color::new(self.r * rhs.r, self.g * rhs.g, self.b * rhs.b)
    }
}

impl Mul<f64> for Color {
    type Output = Color;

    #[inline]
    fn mul(self, rhs: f64) -> Color {
        Color::new(self.r * rhs, self.g * rhs, self.b * rhs)
    }
}

impl Mul<Color> for f64 {
    type Output = Color;

    #[inline]
    fn mul(self, rhs: Color) -> Color {
        rhs * self
    }
}

impl Div<f64> for Color {
    type Output = Color;

    #[inline]
    fn div(self, rhs: f64) -> Color {
        Color::new(self.r / rhs, self.g / rhs, self.b / rhs)
    }
}
