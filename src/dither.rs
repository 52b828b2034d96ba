//! Contains the dithering implementations used by remapping.

use crate::{
    color::{squared_euclidean_distance, Point, CHANNEL_WEIGHTS},
    kdtree::KdTree,
};
use ordered_float::OrderedFloat;
#[cfg(feature = "threads")]
use rayon::prelude::*;
use std::array;

/// The dithering method applied when remapping with a non-zero dithering level.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum DitherMode {
    /// Floyd–Steinberg error diffusion in serpentine order.
    ///
    /// Each pixel depends on the error diffused from earlier pixels, so this always runs sequentially.
    #[default]
    FloydSteinberg,
    /// Ordered dithering with an 8×8 Bayer threshold matrix.
    ///
    /// Every pixel is independent, so this runs in parallel with the `threads` feature.
    Ordered,
}

/// Propagated errors with a squared magnitude above this are damped.
const ERROR_DAMPING_THRESHOLD: f32 = 1.0 / 16.0;

/// The factor applied to large propagated errors.
const ERROR_DAMPING: f32 = 0.75;

/// The threshold offset, in unweighted channel units, at full dithering level.
const ORDERED_SPREAD: f32 = 1.0 / 8.0;

/// The 8×8 Bayer matrix.
const BAYER: [[u8; 8]; 8] = [
    [0, 32, 8, 40, 2, 34, 10, 42],
    [48, 16, 56, 24, 50, 18, 58, 26],
    [12, 44, 4, 36, 14, 46, 6, 38],
    [60, 28, 52, 20, 62, 30, 54, 22],
    [3, 35, 11, 43, 1, 33, 9, 41],
    [51, 19, 59, 27, 49, 17, 57, 25],
    [15, 47, 7, 39, 13, 45, 5, 37],
    [63, 31, 55, 23, 61, 29, 53, 21],
];

/// For every palette entry, the other entries ordered by distance.
///
/// Error diffusion moves a pixel only a little away from its undithered color, so the search
/// starts at that color's row and ends as soon as the triangle inequality rules out the rest.
struct NeighborTable {
    palette: Vec<Point>,
    /// `palette.len()` rows of `(index, quarter squared distance)`, each sorted by distance.
    rows: Vec<(u8, f32)>,
}

impl NeighborTable {
    fn new(palette: &[Point]) -> Self {
        let k = palette.len();
        let mut rows = Vec::with_capacity(k * k);
        #[allow(clippy::cast_possible_truncation)]
        for &from in palette {
            let start = rows.len();
            rows.extend(
                palette
                    .iter()
                    .enumerate()
                    .map(|(j, &to)| (j as u8, squared_euclidean_distance(from, to) / 4.0)),
            );
            rows[start..].sort_by_key(|&(_, quarter)| OrderedFloat(quarter));
        }

        Self { palette: palette.to_vec(), rows }
    }

    /// Returns the palette entry nearest to `point`, searching outward from entry `guess`.
    #[inline]
    fn nearest_from(&self, guess: u8, point: Point) -> (u8, Point) {
        let k = self.palette.len();
        let start = usize::from(guess) * k;

        // An entry `c` can only be closer than `guess` if d(guess, c) < 2 d(point, guess).
        let limit = squared_euclidean_distance(point, self.palette[usize::from(guess)]);

        let mut best = (guess, limit);
        for &(j, quarter) in &self.rows[start..start + k] {
            if quarter > limit {
                break;
            }
            let dist = squared_euclidean_distance(point, self.palette[usize::from(j)]);
            if dist < best.1 {
                best = (j, dist);
            }
        }

        (best.0, self.palette[usize::from(best.0)])
    }
}

/// Multiplies `other` by a scalar, `alpha`, and adds the result to `arr`.
#[inline]
fn arr_mul_add_assign(arr: &mut Point, alpha: f32, other: Point) {
    for i in 0..4 {
        arr[i] += alpha * other[i];
    }
}

/// Propagates, stores, and applies the dither error to the pixels.
struct ErrorBuf {
    /// The propagated error for the current row of pixels, padded by one pixel on each side.
    this_err: Vec<Point>,
    /// The propagated error for the next row of pixels, padded by one pixel on each side.
    next_err: Vec<Point>,
}

impl ErrorBuf {
    /// Creates a zeroed error buffer for rows of `width` pixels.
    fn new(width: usize) -> Self {
        Self {
            this_err: vec![[0.0; 4]; width + 2],
            next_err: vec![[0.0; 4]; width + 2],
        }
    }

    /// Propagate error using floyd steinberg dithering, going from left to right.
    #[inline]
    fn propagate_ltr(&mut self, i: usize, err: Point) {
        arr_mul_add_assign(&mut self.this_err[i + 2], 7.0 / 16.0, err);
        arr_mul_add_assign(&mut self.next_err[i], 3.0 / 16.0, err);
        arr_mul_add_assign(&mut self.next_err[i + 1], 5.0 / 16.0, err);
        arr_mul_add_assign(&mut self.next_err[i + 2], 1.0 / 16.0, err);
    }

    /// Propagate error using floyd steinberg dithering, going from right to left.
    #[inline]
    fn propagate_rtl(&mut self, i: usize, err: Point) {
        arr_mul_add_assign(&mut self.this_err[i], 7.0 / 16.0, err);
        arr_mul_add_assign(&mut self.next_err[i + 2], 3.0 / 16.0, err);
        arr_mul_add_assign(&mut self.next_err[i + 1], 5.0 / 16.0, err);
        arr_mul_add_assign(&mut self.next_err[i], 1.0 / 16.0, err);
    }

    /// Apply the accumulated error to this pixel.
    #[inline]
    fn apply(&self, i: usize, point: &mut Point) {
        let err = self.this_err[i + 1];
        for c in 0..4 {
            point[c] += err[c];
        }
    }

    /// Reset and swap the error buffers for the next row of pixels.
    #[inline]
    fn next_row(&mut self) {
        std::mem::swap(&mut self.this_err, &mut self.next_err);
        self.next_err.fill([0.0; 4]);
    }
}

/// Dither a single pixel, returning the error to propagate.
#[inline]
fn dither_pixel(
    i: usize,
    index: &mut u8,
    mut point: Point,
    table: &NeighborTable,
    error: &ErrorBuf,
    level: f32,
) -> Point {
    error.apply(i, &mut point);
    let (nearest_index, nearest_point) = table.nearest_from(*index, point);
    *index = nearest_index;

    let err: Point = array::from_fn(|c| level * (point[c] - nearest_point[c]));
    let magnitude = err.iter().map(|e| e * e).sum::<f32>();
    if magnitude > ERROR_DAMPING_THRESHOLD {
        err.map(|e| e * ERROR_DAMPING)
    } else {
        err
    }
}

/// Performs Floyd–Steinberg dithering, refining the nearest palette `indices` of `points` in place.
///
/// `indices` must hold the (undithered) nearest palette index of each point; they serve as the
/// starting guess for the search after error is applied.
pub(crate) fn floyd_steinberg(
    palette: &[Point],
    indices: &mut [u8],
    points: &[Point],
    width: usize,
    level: f32,
) {
    if palette.is_empty() || level <= 0.0 || width == 0 {
        return;
    }

    let table = NeighborTable::new(palette);
    let mut error = ErrorBuf::new(width);

    for (row, (indices, points)) in indices
        .chunks_exact_mut(width)
        .zip(points.chunks_exact(width))
        .enumerate()
    {
        if row % 2 == 0 {
            for (i, (index, &point)) in indices.iter_mut().zip(points).enumerate() {
                let err = dither_pixel(i, index, point, &table, &error, level);
                error.propagate_ltr(i, err);
            }
        } else {
            for (i, (index, &point)) in indices.iter_mut().zip(points).enumerate().rev() {
                let err = dither_pixel(i, index, point, &table, &error, level);
                error.propagate_rtl(i, err);
            }
        }

        error.next_row();
    }
}

/// Offsets the color channels of `point` by the Bayer threshold at `(x, y)`.
#[inline]
fn ordered_offset(point: Point, x: usize, y: usize, level: f32) -> Point {
    let threshold = (f32::from(BAYER[y % 8][x % 8]) + 0.5) / 64.0 - 0.5;
    let alpha = point[0] / CHANNEL_WEIGHTS[0];
    let offset = threshold * level * ORDERED_SPREAD * alpha;
    [
        point[0],
        point[1] + offset * CHANNEL_WEIGHTS[1],
        point[2] + offset * CHANNEL_WEIGHTS[2],
        point[3] + offset * CHANNEL_WEIGHTS[3],
    ]
}

/// Performs ordered dithering, writing the palette index of each point to `indices`.
pub(crate) fn ordered(tree: &KdTree, indices: &mut [u8], points: &[Point], width: usize, level: f32) {
    let dither_row = |(y, (indices, points)): (usize, (&mut [u8], &[Point]))| {
        for (x, (index, &point)) in indices.iter_mut().zip(points).enumerate() {
            *index = tree.nearest(ordered_offset(point, x, y, level)).0;
        }
    };

    #[cfg(feature = "threads")]
    indices
        .par_chunks_exact_mut(width)
        .zip(points.par_chunks_exact(width))
        .enumerate()
        .for_each(dither_row);

    #[cfg(not(feature = "threads"))]
    indices
        .chunks_exact_mut(width)
        .zip(points.chunks_exact(width))
        .enumerate()
        .for_each(dither_row);
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tests::*;

    #[test]
    fn neighbor_table_finds_nearest_from_any_guess() {
        let palette = test_points(20);
        let table = NeighborTable::new(&palette);
        for (n, query) in test_points(300).into_iter().enumerate() {
            #[allow(clippy::cast_possible_truncation)]
            let guess = (n % palette.len()) as u8;
            let (i, nearest) = table.nearest_from(guess, query);
            let expected = palette
                .iter()
                .map(|&p| squared_euclidean_distance(p, query))
                .fold(f32::INFINITY, f32::min);
            assert_eq!(squared_euclidean_distance(nearest, query), expected);
            assert_eq!(palette[usize::from(i)], nearest);
        }
    }

    #[test]
    fn diffusion_mixes_two_colors() {
        let black = [1.0, 0.0, 0.0, 0.0];
        let white = [1.0, 0.71, 1.0, 0.67];
        let gray = [1.0, 0.355, 0.5, 0.335];
        let palette = [black, white];

        let width = 16;
        let points = vec![gray; width * width];
        let mut indices = vec![0; width * width];
        floyd_steinberg(&palette, &mut indices, &points, width, 1.0);

        let whites = indices.iter().filter(|&&i| i == 1).count();
        assert!(whites > width * width / 4 && whites < width * width * 3 / 4);
    }

    #[test]
    fn zero_level_keeps_indices() {
        let palette = test_points(4);
        let points = test_points(16);
        let mut indices = vec![3; 16];
        floyd_steinberg(&palette, &mut indices, &points, 4, 0.0);
        assert_eq!(indices, vec![3; 16]);
    }

    #[test]
    fn ordered_dither_is_a_pattern() {
        let black = [1.0, 0.0, 0.0, 0.0];
        let white = [1.0, 0.71, 1.0, 0.67];
        let tree = KdTree::new(&[black, white]);

        let width = 8;
        let midpoint = [1.0, 0.355, 0.5, 0.335];
        let mut indices = vec![0; width * width];
        ordered(&tree, &mut indices, &vec![midpoint; width * width], width, 1.0);
        let whites = indices.iter().filter(|&&i| i == 1).count();
        assert!(whites > 16 && whites < 48);

        ordered(&tree, &mut indices, &vec![black; width * width], width, 1.0);
        assert!(indices.iter().all(|&i| i == 0));
    }
}
