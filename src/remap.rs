//! Maps the pixels of an image to palette indices.

use crate::{
    color::{GammaLut, Point},
    dither,
    error::try_with_capacity,
    kdtree::KdTree,
    DitherMode, Error, Image, QuantizeResult,
};
use log::debug;

#[cfg(feature = "threads")]
use rayon::prelude::*;

/// Converts the pixels of `image` into points in the perceptual space.
fn image_points(image: &Image) -> Result<Vec<Point>, Error> {
    let colors = image.to_colors()?;
    let lut = GammaLut::new(image.gamma());

    let mut points = try_with_capacity(colors.len())?;
    points.resize(colors.len(), [0.0; 4]);

    #[cfg(feature = "threads")]
    points.par_iter_mut().zip(&colors).for_each(|(p, &c)| *p = lut.to_point(c));

    #[cfg(not(feature = "threads"))]
    for (p, &c) in points.iter_mut().zip(&colors) {
        *p = lut.to_point(c);
    }

    Ok(points)
}

/// Writes the index of the nearest palette entry of each point to `indices`.
fn nearest(tree: &KdTree, indices: &mut [u8], points: &[Point]) {
    #[cfg(feature = "threads")]
    indices
        .par_iter_mut()
        .zip(points)
        .for_each(|(i, &p)| *i = tree.nearest(p).0);

    #[cfg(not(feature = "threads"))]
    for (i, &p) in indices.iter_mut().zip(points) {
        *i = tree.nearest(p).0;
    }
}

/// Remaps `image` with the palette of `result`, writing one palette index per pixel to `out`.
pub(crate) fn remap(result: &QuantizeResult, image: &Image, out: &mut [u8]) -> Result<(), Error> {
    let expected = image.num_pixels();
    if out.len() != expected {
        return Err(Error::BufferSizeMismatch { expected, actual: out.len() });
    }

    let points = image_points(image)?;
    let width = image.width() as usize;
    let tree = result.tree();
    let level = result.dithering_level();

    match result.dither_mode() {
        DitherMode::Ordered if level > 0.0 => dither::ordered(tree, out, &points, width, level),
        DitherMode::Ordered => nearest(tree, out, &points),
        DitherMode::FloydSteinberg => {
            nearest(tree, out, &points);
            dither::floyd_steinberg(tree.points(), out, &points, width, level);
        }
    }

    debug!(
        "remap: {}x{} pixels to {} colors, {:?} dithering at level {level}",
        image.width(),
        image.height(),
        tree.points().len(),
        result.dither_mode()
    );

    Ok(())
}
