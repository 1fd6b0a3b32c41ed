/// Straight-alpha RGBA color, channels in `[0, 1]`.
///
/// Invariant:
/// - `rgb` is not multiplied by `a`. Vertex writers call [`Color::premultiplied`] when the
///   target blend state expects premultiplied input.
///
/// Rationale:
/// - Skeleton tints multiply straight colors channel-wise before premultiplying once.
#[derive(Debug, Copy, Clone, PartialEq)]
pub struct Color {
    pub r: f32,
    pub g: f32,
    pub b: f32,
    pub a: f32,
}

impl Default for Color {
    fn default() -> Self {
        Self::WHITE
    }
}

impl Color {
    pub const WHITE: Color = Color::new(1.0, 1.0, 1.0, 1.0);
    pub const BLACK: Color = Color::new(0.0, 0.0, 0.0, 1.0);
    pub const RED: Color = Color::new(1.0, 0.0, 0.0, 1.0);
    pub const GREEN: Color = Color::new(0.0, 1.0, 0.0, 1.0);
    pub const BLUE: Color = Color::new(0.0, 0.0, 1.0, 1.0);
    pub const LIGHT_GRAY: Color = Color::new(192.0 / 255.0, 192.0 / 255.0, 192.0 / 255.0, 1.0);

    #[inline]
    pub const fn new(r: f32, g: f32, b: f32, a: f32) -> Self {
        Self { r, g, b, a }
    }

    /// Creates a color from straight sRGB bytes (`0`–`255`).
    #[inline]
    pub fn from_srgb_u8(r: u8, g: u8, b: u8, a: u8) -> Self {
        Self::new(
            r as f32 / 255.0,
            g as f32 / 255.0,
            b as f32 / 255.0,
            a as f32 / 255.0,
        )
    }

    /// Parses `RRGGBB` or `RRGGBBAA`, with or without a leading `#`.
    ///
    /// Returns `None` for any other length or a non-hex digit.
    pub fn from_hex(hex: &str) -> Option<Self> {
        let hex = hex.strip_prefix('#').unwrap_or(hex);
        if hex.len() != 6 && hex.len() != 8 {
            return None;
        }
        let channel = |i: usize| u8::from_str_radix(hex.get(i..i + 2)?, 16).ok();
        let a = if hex.len() == 8 { channel(6)? } else { 255 };
        Some(Self::from_srgb_u8(channel(0)?, channel(2)?, channel(4)?, a))
    }

    /// Channel-wise product, used to combine skeleton, slot and attachment tints.
    #[inline]
    pub fn mul(self, other: Color) -> Self {
        Self::new(
            self.r * other.r,
            self.g * other.g,
            self.b * other.b,
            self.a * other.a,
        )
    }

    /// Returns `rgb * a` with alpha unchanged.
    #[inline]
    pub fn premultiplied(self) -> Self {
        Self::new(self.r * self.a, self.g * self.a, self.b * self.a, self.a)
    }

    /// Clamps all channels to `[0, 1]`.
    #[inline]
    pub fn clamped(self) -> Self {
        Self::new(
            self.r.clamp(0.0, 1.0),
            self.g.clamp(0.0, 1.0),
            self.b.clamp(0.0, 1.0),
            self.a.clamp(0.0, 1.0),
        )
    }

    #[inline]
    pub fn to_array(self) -> [f32; 4] {
        [self.r, self.g, self.b, self.a]
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn hex_parsing() {
        let orange = Color::from_hex("FF7F00").unwrap();
        assert_eq!(orange.r, 1.0);
        assert!((orange.g - 127.0 / 255.0).abs() < 1e-6);
        assert_eq!(orange.a, 1.0);

        let half = Color::from_hex("#00000080").unwrap();
        assert!((half.a - 128.0 / 255.0).abs() < 1e-6);

        assert!(Color::from_hex("FF7F0").is_none());
        assert!(Color::from_hex("GG0000").is_none());
    }

    #[test]
    fn premultiply_scales_rgb_only() {
        let c = Color::new(1.0, 0.5, 0.25, 0.5).premultiplied();
        assert_eq!(c.to_array(), [0.5, 0.25, 0.125, 0.5]);
    }
}
