//! A static k-d tree over the palette for nearest color lookups during remapping.

use crate::color::{squared_euclidean_distance, Point};
use ordered_float::OrderedFloat;

/// The maximum number of points in a leaf.
const B: usize = 8;

// Palettes have at most 256 points, so the number of nodes always fits in a u16.
#[derive(Debug, Clone, Copy)]
enum NodeIndex {
    Leaf(u16),
    Branch(u16),
}

#[derive(Debug, Clone)]
struct Branch {
    left_right: [NodeIndex; 2],
    dim: u8,
    value: f32,
}

/// The palette indices of the points in a leaf.
#[derive(Debug, Clone)]
struct Leaf(Vec<u8>);

/// Nearest neighbor search over palette points.
#[derive(Debug, Clone)]
pub(crate) struct KdTree {
    points: Vec<Point>,
    branches: Vec<Branch>,
    leaves: Vec<Leaf>,
    root: NodeIndex,
}

impl KdTree {
    /// Builds a tree over at most 256 palette points.
    pub(crate) fn new(points: &[Point]) -> Self {
        debug_assert!(points.len() <= usize::from(crate::MAX_COLORS));

        let mut tree = Self {
            points: points.to_vec(),
            branches: Vec::new(),
            leaves: Vec::new(),
            root: NodeIndex::Leaf(0),
        };

        #[allow(clippy::cast_possible_truncation)]
        let mut keys = (0..points.len()).map(|i| i as u8).collect::<Vec<_>>();
        tree.root = tree.build(&mut keys);
        tree
    }

    /// Returns the palette points.
    pub(crate) fn points(&self) -> &[Point] {
        &self.points
    }

    #[allow(clippy::cast_possible_truncation)]
    fn build(&mut self, keys: &mut [u8]) -> NodeIndex {
        if keys.len() <= B {
            self.leaves.push(Leaf(keys.to_vec()));
            return NodeIndex::Leaf((self.leaves.len() - 1) as u16);
        }

        let points = &self.points;
        let spread = |d: usize| {
            let (min, max) = keys.iter().fold((f32::INFINITY, f32::NEG_INFINITY), |(min, max), &k| {
                let v = points[usize::from(k)][d];
                (min.min(v), max.max(v))
            });
            OrderedFloat(max - min)
        };
        let dim = (0..4).max_by_key(|&d| spread(d)).unwrap_or_default();

        keys.sort_unstable_by_key(|&k| OrderedFloat(points[usize::from(k)][dim]));
        let mid = keys.len() / 2;
        let value = points[usize::from(keys[mid])][dim];

        let (left, right) = keys.split_at_mut(mid);
        let left = self.build(left);
        let right = self.build(right);

        self.branches.push(Branch { left_right: [left, right], dim: dim as u8, value });
        NodeIndex::Branch((self.branches.len() - 1) as u16)
    }

    fn search(&self, node: NodeIndex, query: Point, best: &mut (u8, f32)) {
        match node {
            NodeIndex::Leaf(i) => {
                for &key in &self.leaves[usize::from(i)].0 {
                    let dist = squared_euclidean_distance(self.points[usize::from(key)], query);
                    if dist < best.1 {
                        *best = (key, dist);
                    }
                }
            }
            NodeIndex::Branch(i) => {
                let Branch { left_right: [left, right], dim, value } = self.branches[usize::from(i)];
                let diff = query[usize::from(dim)] - value;
                let (near, far) = if diff < 0.0 { (left, right) } else { (right, left) };

                self.search(near, query, best);
                if diff * diff < best.1 {
                    self.search(far, query, best);
                }
            }
        }
    }

    /// Returns the index of the palette point nearest to `query` and its squared distance.
    #[inline]
    pub(crate) fn nearest(&self, query: Point) -> (u8, f32) {
        let mut best = (0, f32::INFINITY);
        self.search(self.root, query, &mut best);
        best
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tests::*;

    fn brute_force(points: &[Point], query: Point) -> f32 {
        points
            .iter()
            .map(|&p| squared_euclidean_distance(p, query))
            .fold(f32::INFINITY, f32::min)
    }

    #[test]
    fn matches_brute_force() {
        let queries = test_points(1000);
        for k in [1, 7, 8, 9, 100, 256] {
            let points = test_points(k);
            let tree = KdTree::new(&points);
            assert_eq!(tree.points().len(), k);
            for &query in &queries {
                let (i, dist) = tree.nearest(query);
                assert_eq!(dist, brute_force(&points, query));
                assert_eq!(squared_euclidean_distance(points[usize::from(i)], query), dist);
            }
        }
    }

    #[test]
    fn exact_points_are_found() {
        let points = test_points(200);
        let tree = KdTree::new(&points);
        for &point in &points {
            assert_eq!(tree.nearest(point).1, 0.0);
        }
    }
}
