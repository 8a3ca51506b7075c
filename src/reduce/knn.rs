//! Exact k-nearest-neighbour search.
//!
//! Brute force is O(n² · d). Trees are built level by level from at most a
//! few thousand texts, so an approximate index buys nothing here.

use super::Metric;

/// Neighbour lists sorted by ascending distance. Each point is its own first
/// neighbour at distance zero, the usual convention for fuzzy simplicial sets.
#[derive(Debug, Clone)]
pub struct KnnGraph {
    /// `indices[i][j]` is the j-th nearest neighbour of point i.
    pub indices: Vec<Vec<usize>>,
    /// `distances[i][j]` is the distance to `indices[i][j]`.
    pub distances: Vec<Vec<f64>>,
}

impl KnnGraph {
    /// Number of neighbours kept per point (self included).
    pub fn k(&self) -> usize {
        self.indices.first().map_or(0, Vec::len)
    }
}

/// Find the `k` nearest neighbours (self included) of every row.
pub fn nearest_neighbors(points: &[Vec<f64>], k: usize, metric: Metric) -> KnnGraph {
    let n = points.len();
    let k = k.min(n);
    let mut indices = Vec::with_capacity(n);
    let mut distances = Vec::with_capacity(n);

    for (i, point) in points.iter().enumerate() {
        let mut row: Vec<(usize, f64)> = points
            .iter()
            .enumerate()
            .map(|(j, other)| {
                let d = if i == j { 0.0 } else { metric.distance(point, other) };
                (j, d)
            })
            .collect();
        // Self first on ties, then by index, so equal inputs give equal graphs.
        row.sort_by(|a, b| {
            a.1.partial_cmp(&b.1)
                .unwrap_or(std::cmp::Ordering::Equal)
                .then_with(|| (a.0 != i).cmp(&(b.0 != i)))
                .then_with(|| a.0.cmp(&b.0))
        });
        row.truncate(k);
        indices.push(row.iter().map(|(j, _)| *j).collect());
        distances.push(row.iter().map(|(_, d)| *d).collect());
    }

    KnnGraph { indices, distances }
}
