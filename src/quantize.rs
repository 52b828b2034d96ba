//! Palette generation: seeding, refinement, and finalization of the palette for a [`Histogram`].

use crate::{
    color::{mse_to_quality, quality_to_mse, to_srgba, GammaLut, Point, DEFAULT_GAMMA},
    error::try_with_capacity,
    kmeans::{self, Centroids},
    median_cut::median_cut,
    Attr, Error, Histogram, QuantizeResult,
};
use log::debug;
use ordered_float::OrderedFloat;
use palette::Srgba;
use std::{cmp::Reverse, ops::Range};

/// A palette snapped to 8-bit colors, in its final order.
struct Finalized {
    colors: Vec<Srgba<u8>>,
    points: Vec<Point>,
    mse: f64,
}

/// Snaps the palette to 8-bit colors, removes duplicates and unused entries,
/// measures the error, and sorts translucent colors first, then by popularity.
///
/// The first `fixed.len()` entries of `palette` are the fixed colors and are always kept.
fn finalize(
    palette: &[Point],
    fixed: &[Srgba<u8>],
    points: &[Point],
    weights: &[f32],
    lut: &GammaLut,
    gamma: f64,
) -> Result<Finalized, Error> {
    let mut colors = try_with_capacity(palette.len())?;
    for (i, &point) in palette.iter().enumerate() {
        let color = fixed.get(i).copied().unwrap_or_else(|| to_srgba(point, gamma));
        if !colors.contains(&color) {
            colors.push(color);
        }
    }

    let snapped = colors.iter().map(|&color| lut.to_point(color)).collect::<Vec<_>>();

    let mut assignments = try_with_capacity(points.len())?;
    assignments.resize(points.len(), (0, 0.0));
    kmeans::assign(&Centroids::new(&snapped), points, &mut assignments);

    let mut popularity = try_with_capacity(snapped.len())?;
    popularity.resize(snapped.len(), 0.0);
    let mut error = 0.0;
    let mut total = 0.0;
    for (&weight, &(i, distance)) in weights.iter().zip(&assignments) {
        let weight = f64::from(weight);
        popularity[usize::from(i)] += weight;
        error += weight * f64::from(distance);
        total += weight;
    }
    let mse = if total > 0.0 { error / total } else { 0.0 };

    let mut order = (0..snapped.len())
        .filter(|&i| i < fixed.len() || popularity[i] > 0.0)
        .collect::<Vec<_>>();
    order.sort_by_key(|&i| (colors[i].alpha == u8::MAX, Reverse(OrderedFloat(popularity[i]))));

    Ok(Finalized {
        colors: order.iter().map(|&i| colors[i]).collect(),
        points: order.iter().map(|&i| snapped[i]).collect(),
        mse,
    })
}

/// Returns the point with the largest weighted distance to its nearest palette entry.
fn worst_fit(palette: &[Point], points: &[Point], weights: &[f32]) -> Result<Option<Point>, Error> {
    let mut assignments = try_with_capacity(points.len())?;
    assignments.resize(points.len(), (0, 0.0));
    kmeans::assign(&Centroids::new(palette), points, &mut assignments);

    Ok(points
        .iter()
        .zip(weights)
        .zip(&assignments)
        .filter(|(_, (_, distance))| *distance > 0.0)
        .max_by_key(|((_, weight), (_, distance))| OrderedFloat(**weight * *distance))
        .map(|((point, _), _)| *point))
}

/// Seeds and refines a palette for a histogram with more colors than fit into the palette.
///
/// The refined palette is compared against the refined palette with one seed less plus the
/// worst fitting color, and the one with the lower error is kept. Adding a color never increases
/// the error, so a palette is never worse than the refined palette with one color less.
fn generate(
    histogram: &Histogram,
    attr: &Attr,
    points: &[Point],
    weights: &[f32],
    lut: &GammaLut,
    gamma: f64,
) -> Result<Finalized, Error> {
    let fixed = histogram.fixed_colors();
    let slots = usize::from(attr.max_colors()) - fixed.len();

    let bits = attr.seeding_posterization();
    let entries = histogram.posterized_entries(bits);
    if bits > histogram.posterization() {
        debug!("quantize: seeding on {} colors posterized to {bits} bits", entries.len());
    }

    let mut seed_points = try_with_capacity(entries.len())?;
    seed_points.extend(entries.iter().map(|entry| lut.to_point(entry.color)));
    let mut seed_weights = try_with_capacity(entries.len())?;
    seed_weights.extend(entries.iter().map(|entry| entry.weight));

    let (free_points, free_weights): (Vec<_>, Vec<_>) = seed_points
        .iter()
        .zip(&seed_weights)
        .zip(&entries)
        .filter(|(_, entry)| !entry.fixed)
        .map(|((&point, &weight), _)| (point, weight))
        .unzip();

    let target_mse = quality_to_mse(attr.max_quality());
    let fixed_points = fixed.iter().map(|&color| lut.to_point(color)).collect::<Vec<_>>();
    let settings = attr.speed_settings();

    let refine = |seeds: Vec<Point>, progress: Range<f32>| {
        let mut palette = fixed_points.clone();
        palette.extend(seeds);
        kmeans::refine(&seed_points, &seed_weights, palette, fixed.len(), &settings, attr, progress)
            .map(|refined| refined.palette)
    };

    let seeds = median_cut(&free_points, &free_weights, slots, target_mse);
    debug!("quantize: median cut produced {} seeds from {} colors", seeds.len(), free_points.len());
    attr.report_progress(50.0)?;

    // median cut is greedy, so the seeds for fewer boxes are the earlier splits of these
    let boxes = seeds.len();
    let compare = boxes > 1;
    let split = if compare { 72.5 } else { 95.0 };

    let palette = refine(seeds, 50.0..split)?;
    let mut best = finalize(&palette, fixed, points, weights, lut, gamma)?;

    if compare {
        let seeds = median_cut(&free_points, &free_weights, boxes - 1, target_mse);
        let mut palette = refine(seeds, split..95.0)?;
        if let Some(extra) = worst_fit(&palette, points, weights)? {
            palette.push(extra);
        }

        let smaller = finalize(&palette, fixed, points, weights, lut, gamma)?;
        debug!("quantize: mse {} with {boxes} seeds, {} with one seed less", best.mse, smaller.mse);
        if smaller.mse < best.mse {
            best = smaller;
        }
    }

    Ok(best)
}

/// Generates a palette for the colors in `histogram`.
pub(crate) fn quantize(histogram: &Histogram, attr: &Attr) -> Result<QuantizeResult, Error> {
    let fixed = histogram.fixed_colors();
    let max_colors = usize::from(attr.max_colors());

    if fixed.len() > max_colors {
        return Err(Error::FixedColorsExceedMaxColors {
            fixed: fixed.len(),
            max_colors: attr.max_colors(),
        });
    }

    if histogram.is_empty() {
        return Err(Error::EmptyHistogram);
    }

    attr.report_progress(0.0)?;

    let gamma = histogram.gamma().unwrap_or(DEFAULT_GAMMA);
    let lut = GammaLut::new(gamma);
    let entries = histogram.entries();

    let mut points = try_with_capacity(entries.len())?;
    points.extend(entries.iter().map(|entry| lut.to_point(entry.color)));
    let mut weights = try_with_capacity(entries.len())?;
    weights.extend(entries.iter().map(|entry| entry.weight));

    let free = entries.iter().filter(|entry| !entry.fixed).count();

    let finalized = if free + fixed.len() <= max_colors {
        debug!("quantize: all {} colors fit into the palette", free + fixed.len());
        let mut palette = try_with_capacity(free + fixed.len())?;
        palette.extend(fixed.iter().map(|&color| lut.to_point(color)));
        palette.extend(
            points
                .iter()
                .zip(entries)
                .filter(|(_, entry)| !entry.fixed)
                .map(|(&point, _)| point),
        );
        finalize(&palette, fixed, &points, &weights, &lut, gamma)?
    } else {
        generate(histogram, attr, &points, &weights, &lut, gamma)?
    };

    let quality = mse_to_quality(finalized.mse);

    debug!(
        "quantize: {} colors, mse {}, quality {quality}",
        finalized.colors.len(),
        finalized.mse
    );

    if quality < attr.min_quality() {
        return Err(Error::QualityBelowTarget { achieved: quality, minimum: attr.min_quality() });
    }

    attr.report_progress(100.0)?;

    Ok(QuantizeResult::new(finalized.colors, finalized.points, finalized.mse, gamma))
}
