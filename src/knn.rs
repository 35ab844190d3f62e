//! Exact k-nearest-neighbour search over the rows of a matrix.

use anyhow::{anyhow, Result};
use ndarray::{ArrayView1, ArrayView2};
use rayon::prelude::*;
use std::cmp::Ordering;

/// Distance used to rank neighbours
#[derive(Debug, Clone, Copy, PartialEq, Eq, clap::ValueEnum)]
pub enum Metric {
    Euclidean,
    Manhattan,
    Cosine,
}

impl Metric {
    /// Distance between two rows.
    ///
    /// Euclidean returns the squared distance: only the ranking is used.
    #[inline]
    pub fn distance(&self, a: ArrayView1<f32>, b: ArrayView1<f32>) -> f32 {
        match self {
            Metric::Euclidean => a.iter().zip(b.iter()).map(|(x, y)| (x - y).powi(2)).sum(),
            Metric::Manhattan => a.iter().zip(b.iter()).map(|(x, y)| (x - y).abs()).sum(),
            Metric::Cosine => {
                let dot: f32 = a.dot(&b);
                let norm = a.dot(&a).sqrt() * b.dot(&b).sqrt();
                if norm > 0.0 {
                    1.0 - dot / norm
                } else {
                    1.0
                }
            }
        }
    }
}

#[inline]
fn by_distance_then_index(a: &(f32, usize), b: &(f32, usize)) -> Ordering {
    a.0.total_cmp(&b.0).then(a.1.cmp(&b.1))
}

/// For every row, the indices of its `k` nearest other rows, closest first.
///
/// The row itself is never reported as its own neighbour. Ties are broken by
/// the lower row index so the result does not depend on thread scheduling.
/// Runs on the current rayon pool.
pub fn nearest_neighbors(data: ArrayView2<f32>, k: usize, metric: Metric) -> Result<Vec<Vec<usize>>> {
    let n = data.nrows();
    if k == 0 {
        return Err(anyhow!("k must be at least 1"));
    }
    if k >= n {
        return Err(anyhow!("k = {} needs at least {} rows, got {}", k, k + 1, n));
    }

    let neighbors = (0..n)
        .into_par_iter()
        .map(|i| {
            let row = data.row(i);
            let mut candidates: Vec<(f32, usize)> = (0..n)
                .filter(|&j| j != i)
                .map(|j| (metric.distance(row, data.row(j)), j))
                .collect();
            if k < candidates.len() {
                candidates.select_nth_unstable_by(k - 1, by_distance_then_index);
                candidates.truncate(k);
            }
            candidates.sort_unstable_by(by_distance_then_index);
            candidates.into_iter().map(|(_, j)| j).collect()
        })
        .collect();

    log::debug!("computed {} nearest neighbours for {} rows", k, n);
    Ok(neighbors)
}
