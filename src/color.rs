//! The perceptual color space used for histogram clustering, palette search, and dithering.
//!
//! Colors are converted from 8-bit sRGBA into points of the form `[a, r, g, b]` where
//! each color channel is gamma adjusted, premultiplied by alpha, and scaled by a channel weight.
//! The weights favor green (and thus luminance), so the plain squared euclidean distance
//! between two points approximates the perceived difference between the two colors.

use palette::Srgba;

/// A color in the internal perceptual space: `[alpha, red, green, blue]`.
pub(crate) type Point = [f32; 4];

/// The gamma assumed for input images unless set otherwise (`1 / 2.2`).
pub const DEFAULT_GAMMA: f64 = 0.45455;

/// The gamma of the internal perceptual space.
const INTERNAL_GAMMA: f64 = 0.5499;

/// Per channel scale factors in `[a, r, g, b]` order.
pub(crate) const CHANNEL_WEIGHTS: Point = [0.79, 0.71, 1.0, 0.67];

/// Alpha values (in the unweighted `0.0..=1.0` range) below this are treated as fully transparent.
const MIN_OPAQUE: f32 = 1.0 / 256.0;

/// Scales internal MSE values to the commonly reported 8-bit scale.
const STANDARD_MSE_SCALE: f64 = 65536.0 / 6.0;

/// Calibrates the quality to MSE curve.
const MSE_WEIGHT: f64 = 0.45;

/// The MSE associated with a quality of `0`.
const MAX_MSE: f64 = 1e20;

/// Returns whether `gamma` is in the supported open range `(0, 1)`.
pub(crate) fn valid_gamma(gamma: f64) -> bool {
    gamma > 0.0 && gamma < 1.0
}

/// Squared euclidean distance between two points.
#[inline]
pub(crate) fn squared_euclidean_distance<const N: usize>(x: [f32; N], y: [f32; N]) -> f32 {
    let mut dist = 0.0;
    for c in 0..N {
        let d = x[c] - y[c];
        dist += d * d;
    }
    dist
}

/// A lookup table from 8-bit channel values to gamma adjusted channel values.
#[derive(Clone)]
pub(crate) struct GammaLut {
    lut: [f32; 256],
}

impl GammaLut {
    /// Creates the lookup table for images with the given `gamma`.
    pub(crate) fn new(gamma: f64) -> Self {
        let exponent = INTERNAL_GAMMA / gamma;
        #[allow(clippy::cast_possible_truncation)]
        let lut = std::array::from_fn(|i| (i as f64 / 255.0).powf(exponent) as f32);
        Self { lut }
    }

    /// Converts an sRGBA color into the perceptual space.
    #[inline]
    pub(crate) fn to_point(&self, color: Srgba<u8>) -> Point {
        let (r, g, b, a) = color.into_components();
        let [wa, wr, wg, wb] = CHANNEL_WEIGHTS;
        let a = f32::from(a) / 255.0;
        [
            a * wa,
            self.lut[usize::from(r)] * a * wr,
            self.lut[usize::from(g)] * a * wg,
            self.lut[usize::from(b)] * a * wb,
        ]
    }
}

/// Converts a perceptual point back to an sRGBA color using the given output `gamma`.
pub(crate) fn to_srgba(point: Point, gamma: f64) -> Srgba<u8> {
    let [wa, wr, wg, wb] = CHANNEL_WEIGHTS;
    let a = (point[0] / wa).clamp(0.0, 1.0);

    if a < MIN_OPAQUE {
        return Srgba::new(0, 0, 0, 0);
    }

    let exponent = gamma / INTERNAL_GAMMA;
    #[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
    let channel = |value: f32, weight: f32| {
        let value = f64::from((value / weight / a).clamp(0.0, 1.0));
        (value.powf(exponent) * 255.0).round() as u8
    };

    #[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
    let alpha = (a * 255.0).round() as u8;

    Srgba::new(
        channel(point[1], wr),
        channel(point[2], wg),
        channel(point[3], wb),
        alpha,
    )
}

/// Packs a color into a `u32` that sorts by alpha, then red, green, and blue.
#[inline]
pub(crate) fn color_key(color: Srgba<u8>) -> u32 {
    let (r, g, b, a) = color.into_components();
    u32::from_be_bytes([a, r, g, b])
}

/// Returns the inverse of [`color_key`].
#[inline]
pub(crate) fn color_from_key(key: u32) -> Srgba<u8> {
    let [a, r, g, b] = key.to_be_bytes();
    Srgba::new(r, g, b, a)
}

/// Returns the maximum internal MSE allowed for the given quality (`0..=100`).
pub(crate) fn quality_to_mse(quality: u8) -> f64 {
    if quality == 0 {
        return MAX_MSE;
    }
    if quality >= 100 {
        return 0.0;
    }

    let q = f64::from(quality);
    let extra_low_quality_fudge = (0.016 / (0.001 + q) - 0.001).max(0.0);
    MSE_WEIGHT * (extra_low_quality_fudge + 2.5 / (210.0 + q).powf(1.2) * (100.1 - q) / 100.0)
}

/// Returns the highest quality whose MSE bound is met by the given internal `mse`.
pub(crate) fn mse_to_quality(mse: f64) -> u8 {
    (1..=100)
        .rev()
        .find(|&quality| mse <= quality_to_mse(quality))
        .unwrap_or(0)
}

/// Scales an internal MSE value to the reported scale.
pub(crate) fn mse_to_standard(mse: f64) -> f64 {
    mse * STANDARD_MSE_SCALE
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn round_trip_is_exact() {
        for gamma in [DEFAULT_GAMMA, 0.3, 0.8] {
            let lut = GammaLut::new(gamma);
            for v in 0..=255u8 {
                for alpha in [1, 7, 128, 254, 255] {
                    let color = Srgba::new(v, 255 - v, v / 2, alpha);
                    assert_eq!(to_srgba(lut.to_point(color), gamma), color);
                }
            }
        }
    }

    #[test]
    fn transparent_collapses() {
        let lut = GammaLut::new(DEFAULT_GAMMA);
        let point = lut.to_point(Srgba::new(200, 10, 30, 0));
        assert_eq!(point, [0.0; 4]);
        assert_eq!(to_srgba(point, DEFAULT_GAMMA), Srgba::new(0, 0, 0, 0));
    }

    #[test]
    fn green_weighs_most() {
        let lut = GammaLut::new(DEFAULT_GAMMA);
        let black = lut.to_point(Srgba::new(0, 0, 0, 255));
        let red = squared_euclidean_distance(black, lut.to_point(Srgba::new(64, 0, 0, 255)));
        let green = squared_euclidean_distance(black, lut.to_point(Srgba::new(0, 64, 0, 255)));
        let blue = squared_euclidean_distance(black, lut.to_point(Srgba::new(0, 0, 64, 255)));
        assert!(green > red);
        assert!(green > blue);
    }

    #[test]
    fn quality_is_monotonic() {
        assert_eq!(quality_to_mse(100), 0.0);
        for q in 1..=100 {
            assert!(quality_to_mse(q) <= quality_to_mse(q - 1));
        }
        assert_eq!(mse_to_quality(0.0), 100);
        assert_eq!(mse_to_quality(MAX_MSE), 0);

        let mut last = 100;
        for i in 0..100 {
            let quality = mse_to_quality(f64::from(i) * 0.001);
            assert!(quality <= last);
            last = quality;
        }
    }

    #[test]
    fn only_zero_error_is_full_quality() {
        assert_eq!(mse_to_quality(0.0), 100);
        assert_eq!(mse_to_quality(1e-7), 99);
        assert_eq!(mse_to_quality(f64::MIN_POSITIVE), 99);
    }

    #[test]
    fn quality_round_trips() {
        for q in 1..=100 {
            assert_eq!(mse_to_quality(quality_to_mse(q)), q);
        }
    }

    #[test]
    fn keys_sort_by_alpha_first() {
        let opaque_black = color_key(Srgba::new(0, 0, 0, 255));
        let translucent_white = color_key(Srgba::new(255, 255, 255, 128));
        assert!(translucent_white < opaque_black);
        let color = Srgba::new(1, 2, 3, 4);
        assert_eq!(color_from_key(color_key(color)), color);
    }
}
