//! Normalizes the supported input pixel layouts into a canonical stream of straight (non-premultiplied)
//! sRGBA colors.
//!
//! The channel order of every layout is an explicit part of its name and is never inferred.
//! All buffers are row-major without row padding.

use crate::Error;
use palette::{cast::ComponentsAs, Srgba};

/// The byte layout of the pixels in an input buffer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum PixelFormat {
    /// Three bytes per pixel in the order `R, G, B`. Every pixel is opaque.
    Rgb,
    /// Four bytes per pixel in the order `R, G, B, A` with straight alpha.
    Rgba,
    /// Four bytes per pixel in the order `R, G, B, A` with the color channels premultiplied by alpha.
    RgbaPremultiplied,
    /// Three bytes per pixel in the order `B, G, R`. Every pixel is opaque.
    Bgr,
    /// Four bytes per pixel in the order `A, B, G, R` with straight alpha.
    Abgr,
    /// Four bytes per pixel in the order `A, B, G, R` with the color channels premultiplied by alpha.
    AbgrPremultiplied,
}

impl PixelFormat {
    /// Returns the pixel format for a plain `R, G, B` (`3`) or `R, G, B, A` (`4`) buffer.
    ///
    /// # Errors
    /// Returns [`Error::UnsupportedChannelCount`] for any other number of channels.
    pub fn from_components(components: u32) -> Result<Self, Error> {
        match components {
            3 => Ok(PixelFormat::Rgb),
            4 => Ok(PixelFormat::Rgba),
            n => Err(Error::UnsupportedChannelCount(n)),
        }
    }

    /// The number of bytes per pixel.
    #[must_use]
    pub const fn components(self) -> usize {
        match self {
            PixelFormat::Rgb | PixelFormat::Bgr => 3,
            PixelFormat::Rgba
            | PixelFormat::RgbaPremultiplied
            | PixelFormat::Abgr
            | PixelFormat::AbgrPremultiplied => 4,
        }
    }

    /// Whether the color channels are premultiplied by alpha.
    #[must_use]
    pub const fn is_premultiplied(self) -> bool {
        matches!(self, PixelFormat::RgbaPremultiplied | PixelFormat::AbgrPremultiplied)
    }

    /// Converts a row of raw pixel bytes into normalized colors, writing them to `out`.
    ///
    /// `row` must hold exactly `out.len()` pixels.
    pub(crate) fn read_row(self, row: &[u8], out: &mut [Srgba<u8>]) {
        debug_assert_eq!(row.len(), out.len() * self.components());

        match self {
            PixelFormat::Rgba => {
                let colors: &[Srgba<u8>] = row.components_as();
                for (d, &s) in out.iter_mut().zip(colors) {
                    *d = normalize(s);
                }
            }
            PixelFormat::Rgb => {
                for (d, s) in out.iter_mut().zip(row.chunks_exact(3)) {
                    *d = Srgba::new(s[0], s[1], s[2], u8::MAX);
                }
            }
            PixelFormat::Bgr => {
                for (d, s) in out.iter_mut().zip(row.chunks_exact(3)) {
                    *d = Srgba::new(s[2], s[1], s[0], u8::MAX);
                }
            }
            PixelFormat::Abgr => {
                for (d, s) in out.iter_mut().zip(row.chunks_exact(4)) {
                    *d = normalize(Srgba::new(s[3], s[2], s[1], s[0]));
                }
            }
            PixelFormat::RgbaPremultiplied => {
                for (d, s) in out.iter_mut().zip(row.chunks_exact(4)) {
                    *d = unpremultiply(s[0], s[1], s[2], s[3]);
                }
            }
            PixelFormat::AbgrPremultiplied => {
                for (d, s) in out.iter_mut().zip(row.chunks_exact(4)) {
                    *d = unpremultiply(s[3], s[2], s[1], s[0]);
                }
            }
        }
    }
}

/// Collapses every fully transparent color into transparent black.
#[inline]
pub(crate) fn normalize(color: Srgba<u8>) -> Srgba<u8> {
    if color.alpha == 0 {
        Srgba::new(0, 0, 0, 0)
    } else {
        color
    }
}

/// Converts premultiplied channels into a straight alpha color.
#[inline]
fn unpremultiply(r: u8, g: u8, b: u8, a: u8) -> Srgba<u8> {
    if a == 0 {
        return Srgba::new(0, 0, 0, 0);
    }

    let alpha = u32::from(a);
    #[allow(clippy::cast_possible_truncation)]
    let channel = |c: u8| ((u32::from(c) * 255 + alpha / 2) / alpha).min(255) as u8;
    Srgba::new(channel(r), channel(g), channel(b), a)
}

/// Reduces the precision of a channel to its top `8 - bits` bits,
/// replicating the kept bits downwards so that `0` and `255` are preserved.
#[inline]
pub(crate) fn posterize_channel(value: u8, bits: u8) -> u8 {
    if bits == 0 {
        value
    } else {
        let kept = value & (u8::MAX << bits);
        kept | (kept >> (8 - bits))
    }
}

/// Posterizes every channel of a color.
#[inline]
pub(crate) fn posterize(color: Srgba<u8>, bits: u8) -> Srgba<u8> {
    if bits == 0 {
        return color;
    }
    let (r, g, b, a) = color.into_components();
    normalize(Srgba::new(
        posterize_channel(r, bits),
        posterize_channel(g, bits),
        posterize_channel(b, bits),
        posterize_channel(a, bits),
    ))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn read(format: PixelFormat, bytes: &[u8]) -> Vec<Srgba<u8>> {
        let mut out = vec![Srgba::new(0, 0, 0, 0); bytes.len() / format.components()];
        format.read_row(bytes, &mut out);
        out
    }

    #[test]
    fn channel_orders() {
        let expected = vec![Srgba::new(10, 20, 30, 255), Srgba::new(40, 50, 60, 128)];
        assert_eq!(read(PixelFormat::Rgba, &[10, 20, 30, 255, 40, 50, 60, 128]), expected);
        assert_eq!(read(PixelFormat::Abgr, &[255, 30, 20, 10, 128, 60, 50, 40]), expected);

        let opaque = vec![Srgba::new(10, 20, 30, 255), Srgba::new(40, 50, 60, 255)];
        assert_eq!(read(PixelFormat::Rgb, &[10, 20, 30, 40, 50, 60]), opaque);
        assert_eq!(read(PixelFormat::Bgr, &[30, 20, 10, 60, 50, 40]), opaque);
    }

    #[test]
    fn premultiplied_is_unpremultiplied() {
        assert_eq!(
            read(PixelFormat::RgbaPremultiplied, &[64, 32, 0, 128, 10, 10, 10, 0]),
            vec![Srgba::new(128, 64, 0, 128), Srgba::new(0, 0, 0, 0)]
        );
        assert_eq!(
            read(PixelFormat::AbgrPremultiplied, &[255, 3, 2, 1]),
            vec![Srgba::new(1, 2, 3, 255)]
        );
    }

    #[test]
    fn transparent_pixels_collapse() {
        assert_eq!(read(PixelFormat::Rgba, &[9, 8, 7, 0]), vec![Srgba::new(0, 0, 0, 0)]);
    }

    #[test]
    fn component_counts() {
        assert_eq!(PixelFormat::from_components(3), Ok(PixelFormat::Rgb));
        assert_eq!(PixelFormat::from_components(4), Ok(PixelFormat::Rgba));
        assert_eq!(PixelFormat::from_components(2), Err(Error::UnsupportedChannelCount(2)));
        assert_eq!(PixelFormat::from_components(5), Err(Error::UnsupportedChannelCount(5)));
    }

    #[test]
    fn posterization_keeps_extremes() {
        for bits in 0..=4 {
            assert_eq!(posterize_channel(0, bits), 0);
            assert_eq!(posterize_channel(255, bits), 255);
        }
        assert_eq!(posterize_channel(0b1010_1111, 4), 0b1010_1010);
        assert_eq!(posterize_channel(0b1010_1111, 0), 0b1010_1111);
        assert_eq!(posterize(Srgba::new(255, 255, 255, 3), 2), Srgba::new(0, 0, 0, 0));
    }
}
