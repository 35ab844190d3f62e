//! Weighted neighbour graph built from kNN lists.

use sprs::{CsMat, TriMat};
use std::collections::HashMap;

/// Number of entries two ascending index lists have in common.
fn shared_count(a: &[usize], b: &[usize]) -> usize {
    let (mut i, mut j, mut shared) = (0, 0, 0);
    while i < a.len() && j < b.len() {
        match a[i].cmp(&b[j]) {
            std::cmp::Ordering::Less => i += 1,
            std::cmp::Ordering::Greater => j += 1,
            std::cmp::Ordering::Equal => {
                shared += 1;
                i += 1;
                j += 1;
            }
        }
    }
    shared
}

/// Directed edges `i -> j` for every `j` in the neighbour list of `i`.
///
/// With `jaccard` the weight is the Jaccard index of the two neighbour sets,
/// otherwise 1. Edges of weight 0 are dropped.
pub fn directed_edges(neighbors: &[Vec<usize>], jaccard: bool) -> Vec<(usize, usize, f64)> {
    let sorted: Vec<Vec<usize>> = neighbors
        .iter()
        .map(|nn| {
            let mut nn = nn.clone();
            nn.sort_unstable();
            nn
        })
        .collect();

    let mut edges = Vec::with_capacity(neighbors.iter().map(|nn| nn.len()).sum());
    for (i, nn) in neighbors.iter().enumerate() {
        for &j in nn {
            let weight = if jaccard {
                let shared = shared_count(&sorted[i], &sorted[j]);
                let union = sorted[i].len() + sorted[j].len() - shared;
                if union == 0 {
                    0.0
                } else {
                    shared as f64 / union as f64
                }
            } else {
                1.0
            };
            if weight > 0.0 {
                edges.push((i, j, weight));
            }
        }
    }
    edges
}

/// Build the symmetric n x n neighbour graph.
///
/// Without `prune` the directed graph G is symmetrised as (G + Gᵀ) / 2.
/// With `prune` only mutual edges survive, weighted G_ij * G_ji.
pub fn jaccard_graph(neighbors: &[Vec<usize>], jaccard: bool, prune: bool) -> CsMat<f64> {
    let n = neighbors.len();
    let edges = directed_edges(neighbors, jaccard);
    let mut tri = TriMat::new((n, n));

    if prune {
        let lookup: HashMap<(usize, usize), f64> =
            edges.iter().map(|&(i, j, w)| ((i, j), w)).collect();
        for &(i, j, w) in &edges {
            if let Some(&back) = lookup.get(&(j, i)) {
                tri.add_triplet(i, j, w * back);
            }
        }
    } else {
        for &(i, j, w) in &edges {
            tri.add_triplet(i, j, w / 2.0);
            tri.add_triplet(j, i, w / 2.0);
        }
    }

    let graph: CsMat<f64> = tri.to_csr();
    log::info!(
        "neighbour graph: {} nodes, {} stored entries (jaccard = {}, prune = {})",
        n,
        graph.nnz(),
        jaccard,
        prune
    );
    graph
}
