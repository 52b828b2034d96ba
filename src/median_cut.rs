//! Median cut: the initial palette for refinement.
//!
//! The weighted colors are recursively split into boxes. At each step the box with the largest
//! sum of squared errors is split at the weighted median of its highest variance channel.

use crate::color::Point;
use ordered_float::OrderedFloat;
use std::{collections::BinaryHeap, ops::Range};

/// A set of consecutive colors and their statistics.
#[derive(Debug, Clone)]
struct ColorBox {
    /// The range of the colors in the working slice.
    range: Range<usize>,
    /// The weighted sum of each channel.
    sum: [f64; 4],
    /// The total weight.
    weight: f64,
    /// The weighted sum of squared deviations from the mean of each channel.
    variance: [f64; 4],
}

impl ColorBox {
    /// Computes the statistics for the colors in `range`.
    fn new(colors: &[(Point, f32)], range: Range<usize>) -> Self {
        let mut sum = [0.0; 4];
        let mut sum_sq = [0.0; 4];
        let mut weight = 0.0;

        for &(point, w) in &colors[range.clone()] {
            let w = f64::from(w);
            for c in 0..4 {
                let v = f64::from(point[c]);
                sum[c] += w * v;
                sum_sq[c] += w * v * v;
            }
            weight += w;
        }

        let variance = if weight > 0.0 {
            std::array::from_fn(|c| (sum_sq[c] - sum[c] * sum[c] / weight).max(0.0))
        } else {
            [0.0; 4]
        };

        Self { range, sum, weight, variance }
    }

    /// The total sum of squared errors of the box.
    fn sse(&self) -> f64 {
        self.variance.iter().sum()
    }

    /// The weighted mean of the box.
    #[allow(clippy::cast_possible_truncation)]
    fn centroid(&self) -> Point {
        if self.weight > 0.0 {
            self.sum.map(|s| (s / self.weight) as f32)
        } else {
            [0.0; 4]
        }
    }

    /// Whether the box has more than one color and any spread.
    fn splittable(&self) -> bool {
        self.range.len() > 1 && self.sse() > 0.0
    }
}

/// Orders boxes by their sum of squared errors.
struct BoxVar(ColorBox, f64);

impl PartialOrd for BoxVar {
    fn partial_cmp(&self, other: &Self) -> Option<std::cmp::Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for BoxVar {
    fn cmp(&self, other: &Self) -> std::cmp::Ordering {
        OrderedFloat(self.1).cmp(&OrderedFloat(other.1))
    }
}

impl Eq for BoxVar {}

impl PartialEq for BoxVar {
    fn eq(&self, other: &Self) -> bool {
        self.1 == other.1
    }
}

impl BoxVar {
    /// Wraps a box, giving unsplittable boxes the lowest priority.
    fn new(color_box: ColorBox) -> Self {
        let priority = if color_box.splittable() { color_box.sse() } else { 0.0 };
        Self(color_box, priority)
    }
}

/// Splits a box in two at the weighted median of its highest variance channel.
fn split(colors: &mut [(Point, f32)], color_box: &ColorBox) -> (ColorBox, ColorBox) {
    let channel = (0..4)
        .max_by_key(|&c| OrderedFloat(color_box.variance[c]))
        .unwrap_or_default();

    let range = color_box.range.clone();
    let chunk = &mut colors[range.clone()];
    chunk.sort_unstable_by_key(|&(point, _)| OrderedFloat(point[channel]));

    let half = color_box.weight / 2.0;
    let mut cumulative = 0.0;
    let mut mid = chunk.len() / 2;
    for (i, &(_, w)) in chunk.iter().enumerate() {
        cumulative += f64::from(w);
        if cumulative >= half {
            mid = i + 1;
            break;
        }
    }
    let mid = range.start + mid.clamp(1, chunk.len() - 1);

    (ColorBox::new(colors, range.start..mid), ColorBox::new(colors, mid..range.end))
}

/// Returns up to `max_boxes` seed colors for the weighted `points`.
///
/// Splitting stops early once the mean squared error of the boxes is at most `target_mse`,
/// or when no box has any spread left.
pub(crate) fn median_cut(
    points: &[Point],
    weights: &[f32],
    max_boxes: usize,
    target_mse: f64,
) -> Vec<Point> {
    if points.is_empty() || max_boxes == 0 {
        return Vec::new();
    }

    let mut colors = points.iter().copied().zip(weights.iter().copied()).collect::<Vec<_>>();

    let root = ColorBox::new(&colors, 0..colors.len());
    let total_weight = root.weight;
    let mut total_sse = root.sse();

    let mut queue = BinaryHeap::with_capacity(max_boxes);
    queue.push(BoxVar::new(root));

    while queue.len() < max_boxes {
        if total_weight > 0.0 && total_sse / total_weight <= target_mse {
            break;
        }

        let Some(BoxVar(color_box, priority)) = queue.pop() else {
            break;
        };

        if priority <= 0.0 {
            queue.push(BoxVar(color_box, priority));
            break;
        }

        let (left, right) = split(&mut colors, &color_box);
        total_sse += left.sse() + right.sse() - color_box.sse();
        queue.push(BoxVar::new(left));
        queue.push(BoxVar::new(right));
    }

    queue.into_iter().map(|BoxVar(color_box, _)| color_box.centroid()).collect()
}
