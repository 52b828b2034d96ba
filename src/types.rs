//! Contains the [`IndexedImage`] output type.

use palette::Srgba;

/// A remapped image: a palette plus one palette index per pixel.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IndexedImage {
    /// The number of pixels in each row.
    width: u32,
    /// The number of rows.
    height: u32,
    /// The palette colors.
    palette: Vec<Srgba<u8>>,
    /// The palette index of each pixel in row-major order.
    indices: Vec<u8>,
}

impl IndexedImage {
    pub(crate) const fn new(width: u32, height: u32, palette: Vec<Srgba<u8>>, indices: Vec<u8>) -> Self {
        Self { width, height, palette, indices }
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

    /// Returns the palette.
    #[must_use]
    pub fn palette(&self) -> &[Srgba<u8>] {
        &self.palette
    }

    /// Returns the palette index of each pixel.
    #[must_use]
    pub fn indices(&self) -> &[u8] {
        &self.indices
    }

    /// Consumes the image, returning the palette and the indices.
    #[must_use]
    pub fn into_parts(self) -> (Vec<Srgba<u8>>, Vec<u8>) {
        (self.palette, self.indices)
    }

    /// Renders the image as `R, G, B, A` bytes, with each pixel being `palette[index]`.
    #[must_use]
    pub fn to_rgba_bytes(&self) -> Vec<u8> {
        self.indices
            .iter()
            .flat_map(|&i| {
                let color = self.palette[usize::from(i)];
                [color.red, color.green, color.blue, color.alpha]
            })
            .collect()
    }

    /// Renders the image as an [`RgbaImage`](image::RgbaImage).
    #[cfg(feature = "image")]
    #[must_use]
    pub fn to_rgbaimage(&self) -> ::image::RgbaImage {
        let width = self.width as usize;
        ::image::RgbaImage::from_fn(self.width, self.height, |x, y| {
            let color = self.palette[usize::from(self.indices[y as usize * width + x as usize])];
            ::image::Rgba([color.red, color.green, color.blue, color.alpha])
        })
    }
}
