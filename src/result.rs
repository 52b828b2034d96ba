//! Contains [`QuantizeResult`], the palette produced by quantization.

use crate::{
    color::{mse_to_quality, mse_to_standard, to_srgba, valid_gamma, Point},
    kdtree::KdTree,
    remap, DitherMode, Error, Image, IndexedImage,
};
use palette::{cast, Srgba};

/// The outcome of quantization: a palette plus the settings used to remap images with it.
///
/// The palette itself never changes. The dithering level, dither mode, and output gamma
/// only affect subsequent calls to the remapping and palette methods.
///
/// # Examples
/// ```
/// # use palquant::{Attr, Image, PixelFormat};
/// # fn main() -> Result<(), palquant::Error> {
/// let pixels = (0..64u8).flat_map(|i| [i * 4, 255 - i * 4, 128]).collect::<Vec<_>>();
/// let image = Image::new(pixels, 8, 8, PixelFormat::Rgb)?;
///
/// let mut attr = Attr::new();
/// attr.set_max_colors(8)?;
/// let mut result = attr.quantize(&image)?;
/// result.set_dithering_level(0.5)?;
///
/// let mut indices = vec![0; 64];
/// result.remap_into(&image, &mut indices)?;
/// assert!(indices.iter().all(|&i| usize::from(i) < result.palette().len()));
/// # Ok(())
/// # }
/// ```
#[derive(Debug, Clone)]
pub struct QuantizeResult {
    /// The palette colors at the input gamma.
    colors: Vec<Srgba<u8>>,
    /// The palette colors at the output gamma.
    output_colors: Vec<Srgba<u8>>,
    /// Nearest neighbor search over the palette points.
    tree: KdTree,
    /// The mean squared error in the internal scale.
    mse: f64,
    /// The gamma of the quantized images.
    input_gamma: f64,
    /// The gamma of the emitted palette colors.
    output_gamma: f64,
    /// The amount of dithering applied when remapping.
    dithering_level: f32,
    /// The dithering method.
    dither_mode: DitherMode,
}

impl QuantizeResult {
    /// Creates a result from a finalized palette.
    pub(crate) fn new(colors: Vec<Srgba<u8>>, points: Vec<Point>, mse: f64, gamma: f64) -> Self {
        Self {
            output_colors: colors.clone(),
            colors,
            tree: KdTree::new(&points),
            mse,
            input_gamma: gamma,
            output_gamma: gamma,
            dithering_level: 1.0,
            dither_mode: DitherMode::default(),
        }
    }

    pub(crate) fn tree(&self) -> &KdTree {
        &self.tree
    }

    /// Returns the palette.
    #[must_use]
    pub fn palette(&self) -> &[Srgba<u8>] {
        &self.output_colors
    }

    /// Returns the number of palette colors.
    #[must_use]
    pub fn palette_len(&self) -> usize {
        self.output_colors.len()
    }

    /// Returns the palette as `R, G, B, A` bytes.
    #[must_use]
    pub fn palette_bytes(&self) -> Vec<u8> {
        let bytes = cast::into_component_slice(self.output_colors.as_slice());
        bytes.to_vec()
    }

    /// Copies the palette as `R, G, B, A` bytes into the start of `out`, returning the number of colors.
    ///
    /// # Errors
    /// Returns [`Error::BufferSizeMismatch`] if `out` is shorter than `4 * self.palette_len()`.
    pub fn copy_palette_into(&self, out: &mut [u8]) -> Result<usize, Error> {
        let bytes = cast::into_component_slice(self.output_colors.as_slice());
        if out.len() < bytes.len() {
            return Err(Error::BufferSizeMismatch { expected: bytes.len(), actual: out.len() });
        }
        out[..bytes.len()].copy_from_slice(bytes);
        Ok(self.output_colors.len())
    }

    /// Returns the mean squared error of the palette against the histogram, on the 8-bit scale.
    #[must_use]
    pub fn mean_square_error(&self) -> f64 {
        mse_to_standard(self.mse)
    }

    /// Returns the quality (`0..=100`) corresponding to [`QuantizeResult::mean_square_error`].
    #[must_use]
    pub fn quality(&self) -> u8 {
        mse_to_quality(self.mse)
    }

    /// Returns the dithering level (`1.0` by default).
    #[must_use]
    pub const fn dithering_level(&self) -> f32 {
        self.dithering_level
    }

    /// Sets the amount of dithering applied when remapping. `0.0` disables dithering.
    ///
    /// # Errors
    /// Returns [`Error::OutOfRange`] if `level` is not in `0.0..=1.0`.
    pub fn set_dithering_level(&mut self, level: f32) -> Result<&mut Self, Error> {
        if !(0.0..=1.0).contains(&level) {
            return Err(Error::OutOfRange {
                parameter: "dithering_level",
                value: f64::from(level),
                range: "0.0..=1.0",
            });
        }
        self.dithering_level = level;
        Ok(self)
    }

    /// Returns the dithering method.
    #[must_use]
    pub const fn dither_mode(&self) -> DitherMode {
        self.dither_mode
    }

    /// Sets the dithering method.
    pub fn set_dither_mode(&mut self, mode: DitherMode) -> &mut Self {
        self.dither_mode = mode;
        self
    }

    /// Returns the gamma of the palette colors.
    #[must_use]
    pub const fn output_gamma(&self) -> f64 {
        self.output_gamma
    }

    /// Sets the gamma the palette colors are emitted with. By default this is the gamma of the input.
    ///
    /// # Errors
    /// Returns [`Error::OutOfRange`] if `gamma` is not in the range `(0, 1)`.
    pub fn set_output_gamma(&mut self, gamma: f64) -> Result<&mut Self, Error> {
        if !valid_gamma(gamma) {
            return Err(Error::OutOfRange { parameter: "output_gamma", value: gamma, range: "(0, 1)" });
        }

        self.output_gamma = gamma;
        #[allow(clippy::float_cmp)]
        if gamma == self.input_gamma {
            self.output_colors.clone_from(&self.colors);
        } else {
            self.output_colors = self.tree.points().iter().map(|&p| to_srgba(p, gamma)).collect();
        }
        Ok(self)
    }

    /// Writes the palette index of each pixel of `image` to `out`.
    ///
    /// # Errors
    /// - [`Error::BufferSizeMismatch`] if `out.len()` is not `image.width() * image.height()`.
    /// - [`Error::OutOfMemory`] if the working buffers could not be allocated.
    pub fn remap_into(&self, image: &Image, out: &mut [u8]) -> Result<(), Error> {
        remap::remap(self, image, out)
    }

    /// Remaps `image`, returning the indices together with the palette.
    ///
    /// # Errors
    /// Returns [`Error::OutOfMemory`] if the output or working buffers could not be allocated.
    pub fn remapped(&self, image: &Image) -> Result<IndexedImage, Error> {
        let mut indices = crate::error::try_with_capacity(image.num_pixels())?;
        indices.resize(image.num_pixels(), 0);
        self.remap_into(image, &mut indices)?;
        Ok(IndexedImage::new(image.width(), image.height(), self.output_colors.clone(), indices))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{Attr, ErrorKind, PixelFormat};

    fn gradient(width: u32, height: u32) -> Image<'static> {
        let pixels = (0..width * height)
            .flat_map(|i| {
                #[allow(clippy::cast_possible_truncation)]
                let v = (i * 255 / (width * height - 1)) as u8;
                [v, v / 2, 255 - v, 255]
            })
            .collect::<Vec<_>>();
        Image::new(pixels, width, height, PixelFormat::Rgba).unwrap()
    }

    fn quantized(image: &Image, max_colors: u32) -> QuantizeResult {
        let mut attr = Attr::new();
        attr.set_max_colors(max_colors).unwrap();
        attr.quantize(image).unwrap()
    }

    #[test]
    fn wrong_buffer_size() {
        let image = gradient(4, 4);
        let result = quantized(&image, 4);

        let err = result.remap_into(&image, &mut [0; 15]).unwrap_err();
        assert_eq!(err, Error::BufferSizeMismatch { expected: 16, actual: 15 });
        assert_eq!(err.kind(), ErrorKind::BufferSizeMismatch);
        assert!(result.remap_into(&image, &mut [0; 17]).is_err());
    }

    #[test]
    fn dithering_level_is_validated() {
        let mut result = quantized(&gradient(4, 4), 4);
        assert_eq!(result.dithering_level(), 1.0);
        assert!(result.set_dithering_level(1.5).is_err());
        assert!(result.set_dithering_level(-0.1).is_err());
        assert_eq!(result.dithering_level(), 1.0);
        result.set_dithering_level(0.0).unwrap();
        assert_eq!(result.dithering_level(), 0.0);
    }

    #[test]
    fn output_gamma_changes_only_colors() {
        let image = gradient(8, 8);
        let mut result = quantized(&image, 8);
        let original = result.palette().to_vec();
        let before = result.remapped(&image).unwrap();

        assert!(result.set_output_gamma(1.0).is_err());
        result.set_output_gamma(0.8).unwrap();
        assert_eq!(result.output_gamma(), 0.8);
        assert_eq!(result.palette_len(), original.len());
        assert_ne!(result.palette(), original.as_slice());
        assert_eq!(result.remapped(&image).unwrap().indices(), before.indices());

        result.set_output_gamma(image.gamma()).unwrap();
        assert_eq!(result.palette(), original.as_slice());
    }

    #[test]
    fn palette_bytes_are_rgba() {
        let pixels = [10, 20, 30, 255, 40, 50, 60, 128];
        let image = Image::new(&pixels[..], 2, 1, PixelFormat::Rgba).unwrap();
        let result = quantized(&image, 256);

        let bytes = result.palette_bytes();
        assert_eq!(bytes.len(), 8);
        // translucent colors come first
        assert_eq!(bytes, vec![40, 50, 60, 128, 10, 20, 30, 255]);

        let mut out = [0; 10];
        assert_eq!(result.copy_palette_into(&mut out), Ok(2));
        assert_eq!(&out[..8], bytes.as_slice());
        assert!(result.copy_palette_into(&mut [0; 7]).is_err());
    }

    #[test]
    fn ordered_dithering_is_repeatable() {
        let image = gradient(16, 16);
        let mut result = quantized(&image, 4);
        result.set_dither_mode(DitherMode::Ordered);
        assert_eq!(result.dither_mode(), DitherMode::Ordered);

        let first = result.remapped(&image).unwrap();
        let second = result.remapped(&image).unwrap();
        assert_eq!(first.indices(), second.indices());
    }
}
