//! Lloyd refinement of the seeded palette.
//!
//! Each iteration assigns every histogram color to its nearest palette entry (in parallel)
//! and then, once all assignments are settled, moves every free palette entry to the weighted
//! centroid of its colors. Fixed palette entries are pinned and never move.
//! Palette entries that attract no colors are reseeded onto colors with a large weighted error.

use crate::{
    color::{squared_euclidean_distance, Point},
    error::try_with_capacity,
    Attr, Error, SpeedSettings,
};
use log::{debug, trace};
use rand::{distributions::Distribution, SeedableRng};
use rand_distr::weighted_alias::WeightedAliasIndex;
use rand_xoshiro::Xoroshiro128PlusPlus;
use std::{array, ops::Range};
use wide::{f32x8, u32x8, CmpLe};

#[cfg(feature = "threads")]
use rayon::prelude::*;

/// The seed used when sampling colors for empty palette entries.
const RESEED_SEED: u64 = 0x9E37_79B9_7F4A_7C15;

/// The number of colors assigned per parallel task.
#[cfg(feature = "threads")]
const ASSIGN_CHUNK: usize = 4096;

/// Palette points laid out for SIMD nearest neighbor search:
/// each chunk holds 8 points, one `f32x8` per channel.
pub(crate) struct Centroids {
    /// The palette points by chunk and channel, padded with infinity.
    components: Vec<[f32x8; 4]>,
}

impl Centroids {
    /// Lays out the given palette points.
    pub(crate) fn new(points: &[Point]) -> Self {
        let mut components = Vec::with_capacity(points.len().div_ceil(8));
        let chunks = points.chunks_exact(8);
        components.extend(
            chunks
                .clone()
                .map(|chunk| array::from_fn(|i| f32x8::new(array::from_fn(|j| chunk[j][i])))),
        );

        if !chunks.remainder().is_empty() {
            let mut arr = [[f32::INFINITY; 8]; 4];
            for (i, point) in chunks.remainder().iter().enumerate() {
                for (arr, &c) in arr.iter_mut().zip(point) {
                    arr[i] = c;
                }
            }
            components.push(arr.map(f32x8::new));
        }

        Self { components }
    }

    /// Returns the index of the nearest palette point and its squared distance to `query`.
    #[inline]
    pub(crate) fn nearest(&self, query: Point) -> (u8, f32) {
        let incr = u32x8::ONE;
        let mut cur_chunk = u32x8::ZERO;
        let mut min_chunk = cur_chunk;
        let mut min_distance = f32x8::splat(f32::INFINITY);

        let query = query.map(f32x8::splat);

        for chunk in &self.components {
            let distance = array::from_fn::<_, 4, _>(|i| {
                let diff = query[i] - chunk[i];
                diff * diff
            })
            .into_iter()
            .fold(f32x8::ZERO, |a, b| a + b);

            let mask = u32x8::new(distance.cmp_le(min_distance).to_array().map(f32::to_bits));
            min_chunk = mask.blend(cur_chunk, min_chunk);
            min_distance = min_distance.fast_min(distance);
            cur_chunk += incr;
        }

        let mut min_lane = 0;
        let mut min_dist = f32::INFINITY;
        for (i, &v) in min_distance.as_array_ref().iter().enumerate() {
            if v < min_dist {
                min_dist = v;
                min_lane = i;
            }
        }

        let min_chunk = min_chunk.as_array_ref()[min_lane] as usize;

        #[allow(clippy::cast_possible_truncation)]
        {
            ((min_chunk * 8 + min_lane) as u8, min_dist)
        }
    }
}

/// Assigns each point to its nearest palette entry.
pub(crate) fn assign(centroids: &Centroids, points: &[Point], assignments: &mut [(u8, f32)]) {
    #[cfg(feature = "threads")]
    assignments
        .par_chunks_mut(ASSIGN_CHUNK)
        .zip(points.par_chunks(ASSIGN_CHUNK))
        .for_each(|(assignments, points)| {
            for (a, &p) in assignments.iter_mut().zip(points) {
                *a = centroids.nearest(p);
            }
        });

    #[cfg(not(feature = "threads"))]
    for (a, &p) in assignments.iter_mut().zip(points) {
        *a = centroids.nearest(p);
    }
}

/// Per palette entry totals of one assignment pass.
struct ClusterStats {
    /// The weighted sum of the points assigned to each entry.
    sums: Vec<[f64; 4]>,
    /// The total weight assigned to each entry.
    weights: Vec<f64>,
    /// The total weighted squared error.
    error: f64,
}

impl ClusterStats {
    /// Totals the assignments for a palette of `k` entries.
    fn new(k: usize, points: &[Point], weights: &[f32], assignments: &[(u8, f32)]) -> Self {
        let mut sums = vec![[0.0; 4]; k];
        let mut totals = vec![0.0; k];
        let mut error = 0.0;

        for ((&point, &weight), &(i, distance)) in points.iter().zip(weights).zip(assignments) {
            let i = usize::from(i);
            let weight = f64::from(weight);
            for (s, &c) in sums[i].iter_mut().zip(&point) {
                *s += weight * f64::from(c);
            }
            totals[i] += weight;
            error += weight * f64::from(distance);
        }

        Self { sums, weights: totals, error }
    }
}

/// Returns the index of a color to move an empty palette entry to,
/// sampled with probability proportional to its weighted error.
fn reseed_target(
    rng: &mut Xoroshiro128PlusPlus,
    weights: &[f32],
    assignments: &[(u8, f32)],
    taken: &[usize],
) -> Option<usize> {
    let errors = weights.iter().zip(assignments).map(|(&w, &(_, d))| w * d).collect::<Vec<_>>();
    let distribution = WeightedAliasIndex::new(errors).ok()?;
    (0..8)
        .map(|_| distribution.sample(rng))
        .find(|i| !taken.contains(i))
}

/// The outcome of refinement.
pub(crate) struct Refined {
    /// The best palette seen.
    pub(crate) palette: Vec<Point>,
    /// The mean squared error of `palette`.
    pub(crate) mse: f64,
}

/// Refines `palette` for the weighted `points`, keeping the first `pinned` entries in place.
///
/// Progress is reported within `progress` after each iteration.
pub(crate) fn refine(
    points: &[Point],
    weights: &[f32],
    mut palette: Vec<Point>,
    pinned: usize,
    settings: &SpeedSettings,
    attr: &Attr,
    progress: Range<f32>,
) -> Result<Refined, Error> {
    let k = palette.len();
    let total_weight = weights.iter().map(|&w| f64::from(w)).sum::<f64>().max(f64::MIN_POSITIVE);

    let mut assignments = try_with_capacity(points.len())?;
    assignments.resize(points.len(), (0, 0.0));

    let rng = &mut Xoroshiro128PlusPlus::seed_from_u64(RESEED_SEED);
    let iterations = settings.iterations;

    let mut best = Refined { palette: palette.clone(), mse: f64::INFINITY };
    let mut converged = false;

    for iteration in 0..=iterations {
        assign(&Centroids::new(&palette), points, &mut assignments);
        let stats = ClusterStats::new(k, points, weights, &assignments);
        let mse = stats.error / total_weight;

        trace!("refinement iteration {iteration}: mse {mse}");

        if mse < best.mse {
            best = Refined { palette: palette.clone(), mse };
        }

        if converged || iteration == iterations || mse <= 0.0 {
            break;
        }

        let mut movement = 0.0;
        let mut taken = Vec::new();
        for i in pinned..k {
            let new = if stats.weights[i] > 0.0 {
                #[allow(clippy::cast_possible_truncation)]
                stats.sums[i].map(|s| (s / stats.weights[i]) as f32)
            } else if let Some(j) = reseed_target(rng, weights, &assignments, &taken) {
                taken.push(j);
                points[j]
            } else {
                continue;
            };

            movement += f64::from(squared_euclidean_distance(palette[i], new));
            palette[i] = new;
        }

        converged = movement < settings.convergence_limit;

        let done = f32::from(iteration + 1) / f32::from(iterations);
        attr.report_progress(progress.start + (progress.end - progress.start) * done)?;
    }

    debug!("refinement: {k} colors, mse {}", best.mse);

    Ok(best)
}
