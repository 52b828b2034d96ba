//! Contains the [`Image`] type: a pixel buffer with a declared layout plus optional fixed colors.

use crate::{
    color::{valid_gamma, DEFAULT_GAMMA},
    error::try_with_capacity,
    pixels::normalize,
    Error, PixelFormat, MAX_COLORS, MAX_PIXELS,
};
use palette::Srgba;
use std::borrow::Cow;

#[cfg(feature = "threads")]
use rayon::prelude::*;

/// An input image for quantization and remapping.
///
/// The pixel buffer is either borrowed or owned, must be row-major without padding,
/// and its channel order is given by a [`PixelFormat`].
///
/// # Examples
/// ```
/// # use palquant::{Image, PixelFormat};
/// # fn main() -> Result<(), palquant::Error> {
/// let pixels = [255, 0, 0, 255, 0, 0, 255, 255];
/// let mut image = Image::new(&pixels[..], 2, 1, PixelFormat::Rgba)?;
/// image.add_fixed_rgb(255, 255, 255)?;
/// assert_eq!(image.width(), 2);
/// # Ok(())
/// # }
/// ```
#[derive(Debug, Clone, PartialEq)]
pub struct Image<'pixels> {
    /// The raw pixel bytes.
    pixels: Cow<'pixels, [u8]>,
    /// The number of pixels in each row.
    width: u32,
    /// The number of rows.
    height: u32,
    /// The layout of `pixels`.
    format: PixelFormat,
    /// The gamma the pixel values are encoded with.
    gamma: f64,
    /// Colors that must appear verbatim in the palette.
    fixed_colors: Vec<Srgba<u8>>,
}

impl<'pixels> Image<'pixels> {
    /// Creates a new [`Image`] from a pixel buffer in the given format.
    ///
    /// # Errors
    /// - [`Error::ZeroDimension`] if `width` or `height` is zero.
    /// - [`Error::TooManyPixels`] if `width * height` is above [`MAX_PIXELS`].
    /// - [`Error::PixelBufferMismatch`] if the buffer length is not `width * height * components`.
    pub fn new(
        pixels: impl Into<Cow<'pixels, [u8]>>,
        width: u32,
        height: u32,
        format: PixelFormat,
    ) -> Result<Self, Error> {
        let pixels = pixels.into();

        if width == 0 || height == 0 {
            return Err(Error::ZeroDimension { width, height });
        }

        if u64::from(width) * u64::from(height) > u64::from(MAX_PIXELS) {
            return Err(Error::TooManyPixels { width, height });
        }

        let expected = (width as usize)
            .checked_mul(height as usize)
            .and_then(|n| n.checked_mul(format.components()))
            .ok_or(Error::TooManyPixels { width, height })?;

        if pixels.len() != expected {
            return Err(Error::PixelBufferMismatch { expected, actual: pixels.len() });
        }

        Ok(Self {
            pixels,
            width,
            height,
            format,
            gamma: DEFAULT_GAMMA,
            fixed_colors: Vec::new(),
        })
    }

    /// Creates a new [`Image`] from an `R, G, B` (`components == 3`) or `R, G, B, A` (`components == 4`) buffer.
    ///
    /// # Errors
    /// Returns [`Error::UnsupportedChannelCount`] for any other number of components,
    /// or any of the errors described in [`Image::new`].
    pub fn from_components(
        pixels: impl Into<Cow<'pixels, [u8]>>,
        width: u32,
        height: u32,
        components: u32,
    ) -> Result<Self, Error> {
        let format = PixelFormat::from_components(components)?;
        Self::new(pixels, width, height, format)
    }

    /// Returns the width of the image in pixels.
    #[must_use]
    pub const fn width(&self) -> u32 {
        self.width
    }

    /// Returns the height of the image in pixels.
    #[must_use]
    pub const fn height(&self) -> u32 {
        self.height
    }

    /// Returns the number of pixels in the image.
    #[must_use]
    pub const fn num_pixels(&self) -> usize {
        self.width as usize * self.height as usize
    }

    /// Returns the pixel layout of the image.
    #[must_use]
    pub const fn format(&self) -> PixelFormat {
        self.format
    }

    /// Returns the raw pixel bytes.
    #[must_use]
    pub fn pixels(&self) -> &[u8] {
        &self.pixels
    }

    /// Returns the gamma of the image (`0.45455` unless set otherwise).
    #[must_use]
    pub const fn gamma(&self) -> f64 {
        self.gamma
    }

    /// Sets the gamma the pixel values are encoded with.
    ///
    /// # Errors
    /// Returns [`Error::OutOfRange`] if `gamma` is not in the range `(0, 1)`.
    /// The image is left unchanged in that case.
    pub fn set_gamma(&mut self, gamma: f64) -> Result<&mut Self, Error> {
        if !valid_gamma(gamma) {
            return Err(Error::OutOfRange { parameter: "gamma", value: gamma, range: "(0, 1)" });
        }
        self.gamma = gamma;
        Ok(self)
    }

    /// Returns the colors that will be copied verbatim into the palette.
    #[must_use]
    pub fn fixed_colors(&self) -> &[Srgba<u8>] {
        &self.fixed_colors
    }

    /// Adds a color that must appear verbatim in the palette.
    ///
    /// Adding a color that is already present has no effect.
    ///
    /// # Errors
    /// Returns [`Error::TooManyFixedColors`] if the image already has [`MAX_COLORS`] fixed colors.
    pub fn add_fixed_color(&mut self, color: Srgba<u8>) -> Result<&mut Self, Error> {
        let color = normalize(color);
        if !self.fixed_colors.contains(&color) {
            if self.fixed_colors.len() >= usize::from(MAX_COLORS) {
                return Err(Error::TooManyFixedColors);
            }
            self.fixed_colors.push(color);
        }
        Ok(self)
    }

    /// Adds an opaque color that must appear verbatim in the palette.
    ///
    /// # Errors
    /// See [`Image::add_fixed_color`].
    pub fn add_fixed_rgb(&mut self, red: u8, green: u8, blue: u8) -> Result<&mut Self, Error> {
        self.add_fixed_color(Srgba::new(red, green, blue, u8::MAX))
    }

    /// Converts this image into one that owns its pixel buffer.
    #[must_use]
    pub fn into_owned(self) -> Image<'static> {
        Image {
            pixels: Cow::Owned(self.pixels.into_owned()),
            width: self.width,
            height: self.height,
            format: self.format,
            gamma: self.gamma,
            fixed_colors: self.fixed_colors,
        }
    }

    /// Decodes all pixels into straight alpha colors with transparent pixels normalized.
    pub(crate) fn to_colors(&self) -> Result<Vec<Srgba<u8>>, Error> {
        let mut colors = try_with_capacity(self.num_pixels())?;
        colors.resize(self.num_pixels(), Srgba::new(0, 0, 0, 0));

        let width = self.width as usize;
        let stride = width * self.format.components();

        #[cfg(feature = "threads")]
        colors
            .par_chunks_exact_mut(width)
            .zip(self.pixels.par_chunks_exact(stride))
            .for_each(|(out, row)| self.format.read_row(row, out));

        #[cfg(not(feature = "threads"))]
        for (out, row) in colors.chunks_exact_mut(width).zip(self.pixels.chunks_exact(stride)) {
            self.format.read_row(row, out);
        }

        Ok(colors)
    }
}

#[cfg(feature = "image")]
impl<'a> TryFrom<&'a ::image::RgbImage> for Image<'a> {
    type Error = Error;

    fn try_from(image: &'a ::image::RgbImage) -> Result<Self, Self::Error> {
        let (width, height) = image.dimensions();
        Image::new(image.as_raw().as_slice(), width, height, PixelFormat::Rgb)
    }
}

#[cfg(feature = "image")]
impl<'a> TryFrom<&'a ::image::RgbaImage> for Image<'a> {
    type Error = Error;

    fn try_from(image: &'a ::image::RgbaImage) -> Result<Self, Self::Error> {
        let (width, height) = image.dimensions();
        Image::new(image.as_raw().as_slice(), width, height, PixelFormat::Rgba)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ErrorKind;

    #[test]
    fn rejects_bad_dimensions() {
        let err = Image::new(Vec::new(), 0, 4, PixelFormat::Rgba).unwrap_err();
        assert_eq!(err, Error::ZeroDimension { width: 0, height: 4 });
        assert_eq!(err.kind(), ErrorKind::ResourceCreation);

        let err = Image::new(vec![0; 15], 2, 2, PixelFormat::Rgba).unwrap_err();
        assert_eq!(err, Error::PixelBufferMismatch { expected: 16, actual: 15 });

        let err = Image::new(Vec::new(), u32::MAX, 2, PixelFormat::Rgb).unwrap_err();
        assert_eq!(err, Error::TooManyPixels { width: u32::MAX, height: 2 });
    }

    #[test]
    fn components_select_the_format() {
        let rgb = Image::from_components(vec![0; 12], 2, 2, 3).unwrap();
        assert_eq!(rgb.format(), PixelFormat::Rgb);
        let rgba = Image::from_components(vec![0; 16], 2, 2, 4).unwrap();
        assert_eq!(rgba.format(), PixelFormat::Rgba);

        let err = Image::from_components(vec![0; 8], 2, 2, 2).unwrap_err();
        assert_eq!(err, Error::UnsupportedChannelCount(2));
        assert_eq!(err.kind(), ErrorKind::ResourceCreation);
    }

    #[test]
    fn borrowed_pixels_are_not_copied() {
        let pixels = [1, 2, 3, 4, 5, 6];
        let image = Image::new(&pixels[..], 2, 1, PixelFormat::Rgb).unwrap();
        assert!(matches!(image.pixels, Cow::Borrowed(_)));

        let owned = image.clone().into_owned();
        assert_eq!(owned.pixels(), image.pixels());
        assert_eq!(
            owned.to_colors().unwrap(),
            vec![Srgba::new(1, 2, 3, 255), Srgba::new(4, 5, 6, 255)]
        );
    }

    #[test]
    fn fixed_colors_are_deduplicated_and_bounded() {
        let mut image = Image::new(vec![0; 4], 1, 1, PixelFormat::Rgba).unwrap();
        image.add_fixed_rgb(255, 255, 255).unwrap();
        image.add_fixed_color(Srgba::new(255, 255, 255, 255)).unwrap();
        assert_eq!(image.fixed_colors(), &[Srgba::new(255, 255, 255, 255)]);

        for i in 0..255 {
            image.add_fixed_rgb(i, 0, 0).unwrap();
        }
        assert_eq!(image.fixed_colors().len(), usize::from(MAX_COLORS));
        assert_eq!(image.add_fixed_rgb(0, 1, 0).unwrap_err(), Error::TooManyFixedColors);
        image.add_fixed_rgb(0, 0, 0).unwrap();
    }

    #[test]
    fn gamma_is_validated() {
        let mut image = Image::new(vec![0; 3], 1, 1, PixelFormat::Rgb).unwrap();
        assert_eq!(image.gamma(), DEFAULT_GAMMA);
        assert!(image.set_gamma(0.0).is_err());
        assert!(image.set_gamma(1.0).is_err());
        assert_eq!(image.gamma(), DEFAULT_GAMMA);
        image.set_gamma(0.5).unwrap();
        assert_eq!(image.gamma(), 0.5);
    }
}
