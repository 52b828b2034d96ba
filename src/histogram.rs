//! Weighted, deduplicated color histograms built from one or more images.
//!
//! Pixels are (optionally) posterized, weighted by the local contrast around them,
//! and then deduplicated with a radix pass on the alpha and red bytes
//! followed by a dense table over the green and blue bytes.

use crate::{
    attr::MAX_POSTERIZATION,
    color::{color_from_key, color_key},
    error::try_with_capacity,
    pixels::{normalize, posterize},
    quantize, Attr, Error, Image, QuantizeResult, SpeedSettings, MAX_COLORS,
};
use bitvec::vec::BitVec;
use log::debug;
use palette::{cast, Srgba};
use std::{cmp::Ordering, ops::Range};

#[cfg(feature = "threads")]
use rayon::prelude::*;

/// A byte-sized Radix
const RADIX: usize = u8::MAX as usize + 1;

/// The number of radix buckets, one for each combination of alpha and red.
const BUCKETS: usize = RADIX * RADIX;

/// Buckets smaller than this are deduplicated by sorting.
const SMALL_BUCKET: usize = 64;

/// A unique color in a [`Histogram`] and how much it matters.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct HistogramEntry {
    /// The (posterized) color.
    pub(crate) color: Srgba<u8>,
    /// The sum of the importance weights of all pixels with this color.
    pub(crate) weight: f32,
    /// The number of sampled pixels with this color.
    pub(crate) count: u32,
    /// Whether this color is one of the fixed colors.
    pub(crate) fixed: bool,
}

impl HistogramEntry {
    /// Returns the color of this entry.
    #[must_use]
    pub const fn color(&self) -> Srgba<u8> {
        self.color
    }

    /// Returns the accumulated importance weight of this entry.
    #[must_use]
    pub const fn weight(&self) -> f32 {
        self.weight
    }

    /// Returns the number of sampled pixels with this color.
    #[must_use]
    pub const fn count(&self) -> u32 {
        self.count
    }

    /// Returns whether this color is a fixed color and therefore always in the palette.
    #[must_use]
    pub const fn is_fixed(&self) -> bool {
        self.fixed
    }
}

/// A histogram of the colors in one or more images.
///
/// # Examples
/// ```
/// # use palquant::{Attr, Histogram, Image, PixelFormat};
/// # fn main() -> Result<(), palquant::Error> {
/// let attr = Attr::new();
/// let first = Image::new(vec![255, 0, 0, 0, 0, 255], 2, 1, PixelFormat::Rgb)?;
/// let second = Image::new(vec![0, 255, 0], 1, 1, PixelFormat::Rgb)?;
///
/// let mut histogram = Histogram::new(&attr);
/// histogram.add_image(&attr, &first)?.add_image(&attr, &second)?;
///
/// let result = histogram.quantize(&attr)?;
/// assert_eq!(result.palette().len(), 3);
/// # Ok(())
/// # }
/// ```
#[derive(Debug, Clone)]
pub struct Histogram {
    /// The unique colors sorted by [`color_key`].
    entries: Vec<HistogramEntry>,
    /// Colors that must appear verbatim in the palette.
    fixed_colors: Vec<Srgba<u8>>,
    /// The gamma shared by all added images.
    gamma: Option<f64>,
    /// The number of posterization bits applied to the entries.
    posterization: u8,
    /// The number of entries above which posterization is increased.
    max_entries: usize,
}

impl Histogram {
    /// Creates an empty histogram using the minimum posterization and size limit of the given [`Attr`].
    ///
    /// The speed dependent posterization floor is not applied here. It only affects palette
    /// generation, and only when the colors do not fit into the palette.
    #[must_use]
    pub fn new(attr: &Attr) -> Self {
        Self {
            entries: Vec::new(),
            fixed_colors: Vec::new(),
            gamma: None,
            posterization: attr.min_posterization(),
            max_entries: attr.speed_settings().max_histogram_entries,
        }
    }

    /// Returns the unique colors in the histogram, excluding fixed colors that appear in no image.
    #[must_use]
    pub fn entries(&self) -> &[HistogramEntry] {
        &self.entries
    }

    /// Returns the fixed colors added so far.
    #[must_use]
    pub fn fixed_colors(&self) -> &[Srgba<u8>] {
        &self.fixed_colors
    }

    /// Returns the number of unique colors.
    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Returns whether the histogram has neither colors nor fixed colors.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty() && self.fixed_colors.is_empty()
    }

    /// Returns the gamma of the added images, if any image was added.
    #[must_use]
    pub const fn gamma(&self) -> Option<f64> {
        self.gamma
    }

    /// Returns the number of low bits currently dropped from each channel.
    #[must_use]
    pub const fn posterization(&self) -> u8 {
        self.posterization
    }

    /// Adds the pixels and fixed colors of an image.
    ///
    /// # Errors
    /// - [`Error::GammaMismatch`] if the image gamma differs from that of previously added images.
    /// - [`Error::TooManyFixedColors`] if the fixed colors would exceed [`MAX_COLORS`].
    /// - [`Error::OutOfMemory`] if the working buffers could not be allocated.
    ///
    /// The histogram is left unchanged on error.
    pub fn add_image(&mut self, attr: &Attr, image: &Image) -> Result<&mut Self, Error> {
        #[allow(clippy::float_cmp)]
        if let Some(gamma) = self.gamma.filter(|&gamma| gamma != image.gamma()) {
            return Err(Error::GammaMismatch { histogram: gamma, image: image.gamma() });
        }

        let new_fixed = image
            .fixed_colors()
            .iter()
            .filter(|color| !self.fixed_colors.contains(color))
            .copied()
            .collect::<Vec<_>>();

        if self.fixed_colors.len() + new_fixed.len() > usize::from(MAX_COLORS) {
            return Err(Error::TooManyFixedColors);
        }

        let samples = sample(image, &attr.speed_settings(), self.posterization)?;
        let entries = dedup(samples)?;

        debug!(
            "histogram: {} unique colors in {}x{} image",
            entries.len(),
            image.width(),
            image.height()
        );

        self.entries = merge(&self.entries, entries)?;
        self.gamma = Some(image.gamma());
        self.fixed_colors.extend(new_fixed);
        self.mark_fixed();
        self.limit_size();
        self.mark_fixed();

        Ok(self)
    }

    /// Adds a color that must appear verbatim in the palette.
    ///
    /// # Errors
    /// Returns [`Error::TooManyFixedColors`] if the histogram already has [`MAX_COLORS`] fixed colors.
    pub fn add_fixed_color(&mut self, color: Srgba<u8>) -> Result<&mut Self, Error> {
        let color = normalize(color);
        if !self.fixed_colors.contains(&color) {
            if self.fixed_colors.len() >= usize::from(MAX_COLORS) {
                return Err(Error::TooManyFixedColors);
            }
            self.fixed_colors.push(color);
            self.mark_fixed();
        }
        Ok(self)
    }

    /// Generates a palette for all colors added so far.
    ///
    /// # Errors
    /// - [`Error::EmptyHistogram`] if no colors were added.
    /// - [`Error::FixedColorsExceedMaxColors`] if there are more fixed colors than `attr.max_colors()`.
    /// - [`Error::QualityBelowTarget`] if the palette does not reach `attr.min_quality()`.
    /// - [`Error::Aborted`] if the progress callback requested cancellation.
    /// - [`Error::OutOfMemory`] if the working buffers could not be allocated.
    pub fn quantize(&self, attr: &Attr) -> Result<QuantizeResult, Error> {
        quantize::quantize(self, attr)
    }

    /// Increases posterization until the number of entries is within bounds.
    fn limit_size(&mut self) {
        while self.entries.len() > self.max_entries && self.posterization < MAX_POSTERIZATION {
            self.posterization += 1;

            self.entries = posterize_entries(std::mem::take(&mut self.entries), self.posterization);

            debug!(
                "histogram: raised posterization to {} bits, {} unique colors remain",
                self.posterization,
                self.entries.len()
            );
        }
    }

    /// Returns the entries posterized to at least `bits`, merging colors that became equal.
    /// Fixed entries keep their exact color.
    pub(crate) fn posterized_entries(&self, bits: u8) -> Vec<HistogramEntry> {
        if bits <= self.posterization {
            return self.entries.clone();
        }
        posterize_entries(self.entries.clone(), bits)
    }

    /// Flags the entries that are equal to a fixed color.
    fn mark_fixed(&mut self) {
        for entry in &mut self.entries {
            entry.fixed = false;
        }
        for &color in &self.fixed_colors {
            let key = color_key(color);
            if let Ok(i) = self.entries.binary_search_by_key(&key, |entry| color_key(entry.color)) {
                self.entries[i].fixed = true;
            }
        }
    }
}

/// Posterizes all non-fixed entries to `bits` and merges the entries that became equal.
fn posterize_entries(mut entries: Vec<HistogramEntry>, bits: u8) -> Vec<HistogramEntry> {
    for entry in entries.iter_mut().filter(|entry| !entry.fixed) {
        entry.color = posterize(entry.color, bits);
    }
    entries.sort_unstable_by_key(|entry| color_key(entry.color));
    entries.dedup_by(|entry, kept| {
        let same = entry.color == kept.color;
        if same {
            kept.weight += entry.weight;
            kept.count += entry.count;
            kept.fixed |= entry.fixed;
        }
        same
    });
    entries
}

/// Returns the range associated with the `i`-th chunk.
#[inline]
fn chunk_range(chunks: &[u32], i: usize) -> Range<usize> {
    (chunks[i] as usize)..(chunks[i + 1] as usize)
}

/// Computes the prefix sum of the slice in place.
#[inline]
fn prefix_sum(counts: &mut [u32]) {
    for i in 1..counts.len() {
        counts[i] += counts[i - 1];
    }
}

/// Returns the importance of the pixel at `x` in `row` given its vertical neighbors.
///
/// Pixels on edges are weighted up, pixels in noisy areas are weighted down.
fn importance(above: &[Srgba<u8>], row: &[Srgba<u8>], below: &[Srgba<u8>], x: usize) -> f32 {
    let channels = |color: Srgba<u8>| cast::into_array(color).map(i32::from);

    let center = channels(row[x]);
    let left = channels(row[x.saturating_sub(1)]);
    let right = channels(row[(x + 1).min(row.len() - 1)]);
    let up = channels(above[x]);
    let down = channels(below[x]);

    let mut edge = 0;
    let mut horizontal = 0;
    let mut vertical = 0;
    for c in 0..4 {
        let first = [left[c], right[c], up[c], down[c]].map(|n| (n - center[c]).abs());
        edge = first.into_iter().fold(edge, i32::max);
        horizontal = horizontal.max((left[c] + right[c] - 2 * center[c]).abs());
        vertical = vertical.max((up[c] + down[c] - 2 * center[c]).abs());
    }

    #[allow(clippy::cast_precision_loss)]
    let edge = edge as f32 / 255.0;
    #[allow(clippy::cast_precision_loss)]
    let noise = horizontal.min(vertical) as f32 / 510.0;

    (1.0 + 0.5 * edge) * (1.0 - 0.5 * noise)
}

/// Samples the rows of an image, returning the posterized color key and weight of each sampled pixel.
fn sample(image: &Image, settings: &SpeedSettings, bits: u8) -> Result<Vec<(u32, f32)>, Error> {
    let colors = image.to_colors()?;
    let width = image.width() as usize;
    let height = image.height() as usize;
    let stride = settings.stride_for(image.width(), image.height());
    let rows = height.div_ceil(stride);

    let mut samples = try_with_capacity(rows * width)?;
    samples.resize(rows * width, (0, 0.0));

    #[allow(clippy::cast_precision_loss)]
    let scale = stride as f32;
    let row_at = |y: usize| &colors[(y * width)..((y + 1) * width)];

    let sample_row = |(i, out): (usize, &mut [(u32, f32)])| {
        let y = i * stride;
        let row = row_at(y);
        if settings.contrast_weighting {
            let above = row_at(y.saturating_sub(1));
            let below = row_at((y + 1).min(height - 1));
            for (x, (out, &color)) in out.iter_mut().zip(row).enumerate() {
                let weight = importance(above, row, below, x);
                *out = (color_key(posterize(color, bits)), weight * scale);
            }
        } else {
            for (out, &color) in out.iter_mut().zip(row) {
                *out = (color_key(posterize(color, bits)), scale);
            }
        }
    };

    #[cfg(feature = "threads")]
    samples.par_chunks_exact_mut(width).enumerate().for_each(sample_row);

    #[cfg(not(feature = "threads"))]
    samples.chunks_exact_mut(width).enumerate().for_each(sample_row);

    Ok(samples)
}

/// Scratch space for deduplicating the green and blue bytes of one radix bucket.
struct DenseTable {
    /// The summed weight for each green and blue combination.
    weights: Vec<f32>,
    /// The number of samples for each green and blue combination.
    counts: Vec<u32>,
    /// The non-zero entries of `counts`.
    bitmask: BitVec,
}

impl DenseTable {
    /// Creates a zeroed table.
    fn new() -> Self {
        Self {
            weights: vec![0.0; RADIX * RADIX],
            counts: vec![0; RADIX * RADIX],
            bitmask: BitVec::repeat(false, RADIX * RADIX),
        }
    }

    /// Deduplicates the `(green_blue, weight)` samples of one bucket, appending the unique colors to `out`.
    fn dedup(&mut self, bucket: usize, chunk: &mut [(u16, f32)], out: &mut Vec<HistogramEntry>) {
        #[allow(clippy::cast_possible_truncation)]
        let high = (bucket as u32) << 16;
        let entry = |gb: usize, weight: f32, count: u32| {
            #[allow(clippy::cast_possible_truncation)]
            let color = color_from_key(high | gb as u32);
            HistogramEntry { color, weight, count, fixed: false }
        };

        if chunk.len() < SMALL_BUCKET {
            chunk.sort_unstable_by_key(|&(gb, _)| gb);
            let mut i = 0;
            while i < chunk.len() {
                let gb = chunk[i].0;
                let mut weight = 0.0;
                let mut count = 0;
                while i < chunk.len() && chunk[i].0 == gb {
                    weight += chunk[i].1;
                    count += 1;
                    i += 1;
                }
                out.push(entry(usize::from(gb), weight, count));
            }
        } else if chunk.len() < RADIX * RADIX / 4 {
            for &(gb, weight) in &*chunk {
                let gb = usize::from(gb);
                self.weights[gb] += weight;
                self.counts[gb] += 1;
                self.bitmask.set(gb, true);
            }

            for gb in self.bitmask.iter_ones() {
                out.push(entry(gb, self.weights[gb], self.counts[gb]));
                self.weights[gb] = 0.0;
                self.counts[gb] = 0;
            }

            self.bitmask.fill(false);
        } else {
            for &(gb, weight) in &*chunk {
                let gb = usize::from(gb);
                self.weights[gb] += weight;
                self.counts[gb] += 1;
            }

            for (gb, (weight, count)) in self.weights.iter_mut().zip(&mut self.counts).enumerate() {
                if *count > 0 {
                    out.push(entry(gb, *weight, *count));
                    *weight = 0.0;
                    *count = 0;
                }
            }
        }
    }
}

/// Deduplicates color keys, summing their weights. The returned entries are sorted by key.
fn dedup(samples: Vec<(u32, f32)>) -> Result<Vec<HistogramEntry>, Error> {
    let mut prefix = vec![0u32; BUCKETS + 1];
    for &(key, _) in &samples {
        prefix[(key >> 16) as usize] += 1;
    }
    prefix_sum(&mut prefix[..BUCKETS]);

    let mut lower = try_with_capacity(samples.len())?;
    lower.resize(samples.len(), (0u16, 0.0f32));
    for (key, weight) in samples {
        let bucket = (key >> 16) as usize;
        let j = prefix[bucket] - 1;
        #[allow(clippy::cast_possible_truncation)]
        {
            lower[j as usize] = (key as u16, weight);
        }
        prefix[bucket] = j;
    }
    #[allow(clippy::cast_possible_truncation)]
    {
        prefix[BUCKETS] = lower.len() as u32;
    }

    let dedup_alpha = |table: &mut DenseTable, lower: &mut [(u16, f32)], alpha: usize| {
        let mut out = Vec::new();
        let start = prefix[alpha * RADIX] as usize;
        for red in 0..RADIX {
            let bucket = alpha * RADIX + red;
            let range = chunk_range(&prefix, bucket);
            if !range.is_empty() {
                let chunk = &mut lower[(range.start - start)..(range.end - start)];
                table.dedup(bucket, chunk, &mut out);
            }
        }
        out
    };

    let alpha_chunks = split_by_alpha(&mut lower, &prefix);

    #[cfg(feature = "threads")]
    let groups = alpha_chunks
        .into_par_iter()
        .map_init(DenseTable::new, |table, (alpha, chunk)| dedup_alpha(table, chunk, alpha))
        .collect::<Vec<_>>();

    #[cfg(not(feature = "threads"))]
    let groups = {
        let mut table = DenseTable::new();
        alpha_chunks
            .into_iter()
            .map(|(alpha, chunk)| dedup_alpha(&mut table, chunk, alpha))
            .collect::<Vec<_>>()
    };

    let mut entries = try_with_capacity(groups.iter().map(Vec::len).sum())?;
    for group in groups {
        entries.extend(group);
    }
    Ok(entries)
}

/// Splits the bucketed samples into one mutable chunk per non-empty alpha value.
fn split_by_alpha<'a>(
    mut lower: &'a mut [(u16, f32)],
    prefix: &[u32],
) -> Vec<(usize, &'a mut [(u16, f32)])> {
    let mut chunks = Vec::new();
    for alpha in 0..RADIX {
        let len = (prefix[(alpha + 1) * RADIX] - prefix[alpha * RADIX]) as usize;
        let (chunk, rest) = std::mem::take(&mut lower).split_at_mut(len);
        lower = rest;
        if !chunk.is_empty() {
            chunks.push((alpha, chunk));
        }
    }
    chunks
}

/// Merges two lists of entries sorted by key, summing the weights and counts of equal colors.
fn merge(old: &[HistogramEntry], new: Vec<HistogramEntry>) -> Result<Vec<HistogramEntry>, Error> {
    if old.is_empty() {
        return Ok(new);
    }

    let mut merged = try_with_capacity(old.len() + new.len())?;
    let mut old = old.iter().copied().peekable();
    let mut new = new.into_iter().peekable();

    loop {
        let next = match (old.peek(), new.peek()) {
            (Some(a), Some(b)) => match color_key(a.color).cmp(&color_key(b.color)) {
                Ordering::Less => old.next(),
                Ordering::Greater => new.next(),
                Ordering::Equal => {
                    let (a, b) = (old.next(), new.next());
                    a.zip(b).map(|(mut a, b)| {
                        a.weight += b.weight;
                        a.count += b.count;
                        a
                    })
                }
            },
            (Some(_), None) => old.next(),
            (None, Some(_)) => new.next(),
            (None, None) => None,
        };

        match next {
            Some(entry) => merged.push(entry),
            None => break,
        }
    }

    Ok(merged)
}
