//! Louvain modularity optimisation on a symmetric weighted graph.
//!
//! Each level moves single nodes between neighbouring communities until no
//! move increases modularity, then collapses every community into one node
//! and starts over on the smaller graph. Levels stop when the partition no
//! longer changes, when a level gains less than `q_tol`, or when the time
//! limit is spent.

use rand::prelude::*;
use rand::rngs::StdRng;
use sprs::CsMat;
use std::collections::BTreeMap;
use std::time::{Duration, Instant};

/// Smallest modularity gain accepted for a move, absorbs rounding noise.
const MOVE_EPSILON: f64 = 1e-12;

/// Result of a Louvain run on the original nodes.
#[derive(Debug, Clone)]
pub struct Partition {
    /// community id per node, numbered 0.. by first appearance
    pub membership: Vec<usize>,
    pub modularity: f64,
    /// number of aggregation levels performed
    pub levels: usize,
}

impl Partition {
    pub fn n_communities(&self) -> usize {
        self.membership.iter().max().map_or(0, |&m| m + 1)
    }
}

/// Adjacency-list copy of the graph; self loops are stored separately.
#[derive(Debug, Clone)]
struct Network {
    adj: Vec<Vec<(usize, f64)>>,
    self_loops: Vec<f64>,
    strength: Vec<f64>,
    total: f64,
}

impl Network {
    fn from_csr(graph: &CsMat<f64>) -> Self {
        let n = graph.rows();
        let mut adj = vec![Vec::new(); n];
        let mut self_loops = vec![0.0; n];
        let mut strength = vec![0.0; n];
        let mut total = 0.0;
        for (i, row) in graph.outer_iterator().enumerate() {
            for (j, &w) in row.iter() {
                if i == j {
                    self_loops[i] += w;
                } else {
                    adj[i].push((j, w));
                }
                strength[i] += w;
                total += w;
            }
        }
        Self { adj, self_loops, strength, total }
    }

    fn len(&self) -> usize {
        self.adj.len()
    }

    fn modularity(&self, membership: &[usize]) -> f64 {
        if self.total <= 0.0 {
            return 0.0;
        }
        let n_comm = membership.iter().max().map_or(0, |&m| m + 1);
        let mut inside = vec![0.0; n_comm];
        let mut tot = vec![0.0; n_comm];
        for i in 0..self.len() {
            let c = membership[i];
            inside[c] += self.self_loops[i];
            tot[c] += self.strength[i];
            for &(j, w) in &self.adj[i] {
                if membership[j] == c {
                    inside[c] += w;
                }
            }
        }
        inside
            .iter()
            .zip(tot.iter())
            .map(|(&inn, &t)| inn / self.total - (t / self.total).powi(2))
            .sum()
    }

    /// Move nodes greedily; returns the community per node and whether any node moved.
    fn local_moving<R: Rng>(&self, rng: &mut R) -> (Vec<usize>, bool) {
        let n = self.len();
        let mut comm: Vec<usize> = (0..n).collect();
        let mut tot = self.strength.clone();
        let mut neigh_weight = vec![0.0; n];
        let mut touched: Vec<usize> = Vec::new();
        let mut order: Vec<usize> = (0..n).collect();
        let mut any_move = false;

        loop {
            order.shuffle(rng);
            let mut moved = 0usize;
            for &i in &order {
                let ci = comm[i];
                let ki = self.strength[i];

                for &(j, w) in &self.adj[i] {
                    let c = comm[j];
                    if neigh_weight[c] == 0.0 {
                        touched.push(c);
                    }
                    neigh_weight[c] += w;
                }

                tot[ci] -= ki;
                let mut best = ci;
                let mut best_gain = neigh_weight[ci] - tot[ci] * ki / self.total;
                for &c in &touched {
                    let gain = neigh_weight[c] - tot[c] * ki / self.total;
                    if gain > best_gain + MOVE_EPSILON {
                        best = c;
                        best_gain = gain;
                    }
                }
                tot[best] += ki;
                comm[i] = best;
                if best != ci {
                    moved += 1;
                }

                for &c in &touched {
                    neigh_weight[c] = 0.0;
                }
                touched.clear();
            }
            log::trace!("local moving pass: {} of {} nodes moved", moved, n);
            if moved == 0 {
                break;
            }
            any_move = true;
        }
        (comm, any_move)
    }

    /// Collapse every community into a single node.
    fn aggregate(&self, membership: &[usize], n_comm: usize) -> Self {
        let mut links: Vec<BTreeMap<usize, f64>> = vec![BTreeMap::new(); n_comm];
        let mut self_loops = vec![0.0; n_comm];
        let mut strength = vec![0.0; n_comm];
        for i in 0..self.len() {
            let c = membership[i];
            self_loops[c] += self.self_loops[i];
            strength[c] += self.strength[i];
            for &(j, w) in &self.adj[i] {
                let d = membership[j];
                if c == d {
                    self_loops[c] += w;
                } else {
                    *links[c].entry(d).or_insert(0.0) += w;
                }
            }
        }
        let adj = links.into_iter().map(|m| m.into_iter().collect()).collect();
        Self { adj, self_loops, strength, total: self.total }
    }
}

/// Renumber community ids to 0.. in order of first appearance.
pub fn renumber(membership: &[usize]) -> (Vec<usize>, usize) {
    let mut map: Vec<Option<usize>> = vec![None; membership.iter().max().map_or(0, |&m| m + 1)];
    let mut next = 0;
    let renumbered = membership
        .iter()
        .map(|&c| {
            *map[c].get_or_insert_with(|| {
                next += 1;
                next - 1
            })
        })
        .collect();
    (renumbered, next)
}

/// Modularity of `membership` on a symmetric weighted graph.
pub fn modularity(graph: &CsMat<f64>, membership: &[usize]) -> f64 {
    Network::from_csr(graph).modularity(membership)
}

/// Louvain settings
#[derive(Debug, Clone)]
pub struct Louvain {
    /// minimal modularity gain for another aggregation level
    pub q_tol: f64,
    pub time_limit: Option<Duration>,
    /// seed for the node visiting order, entropy if None
    pub seed: Option<u64>,
}

impl Default for Louvain {
    fn default() -> Self {
        Self { q_tol: 1e-3, time_limit: None, seed: None }
    }
}

impl Louvain {
    pub fn run(&self, graph: &CsMat<f64>) -> Partition {
        let mut rng = match self.seed {
            Some(seed) => StdRng::seed_from_u64(seed),
            None => StdRng::from_entropy(),
        };
        let start = Instant::now();

        let mut net = Network::from_csr(graph);
        let mut membership: Vec<usize> = (0..net.len()).collect();
        let mut q = net.modularity(&membership);
        let mut levels = 0;

        if net.total <= 0.0 {
            log::warn!("graph has no edges, every node is its own community");
            return Partition { membership, modularity: q, levels };
        }

        loop {
            let (comm, moved) = net.local_moving(&mut rng);
            if !moved {
                break;
            }
            let (comm, n_comm) = renumber(&comm);
            for m in membership.iter_mut() {
                *m = comm[*m];
            }
            let new_q = net.modularity(&comm);
            levels += 1;
            log::debug!(
                "louvain level {}: {} communities, modularity {:.6}",
                levels, n_comm, new_q
            );

            let gain = new_q - q;
            q = new_q;
            if n_comm == net.len() || gain < self.q_tol {
                break;
            }
            if let Some(limit) = self.time_limit {
                if start.elapsed() >= limit {
                    log::warn!("louvain time limit of {:?} reached after {} levels", limit, levels);
                    break;
                }
            }
            net = net.aggregate(&comm, n_comm);
        }

        Partition { membership, modularity: q, levels }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;
    use sprs::TriMat;

    fn undirected(n: usize, edges: &[(usize, usize, f64)]) -> CsMat<f64> {
        let mut tri = TriMat::new((n, n));
        for &(i, j, w) in edges {
            tri.add_triplet(i, j, w);
            tri.add_triplet(j, i, w);
        }
        tri.to_csr()
    }

    /// Two triangles joined by a single edge
    fn two_triangles() -> CsMat<f64> {
        undirected(
            6,
            &[(0, 1, 1.0), (1, 2, 1.0), (0, 2, 1.0), (3, 4, 1.0), (4, 5, 1.0), (3, 5, 1.0), (2, 3, 1.0)],
        )
    }

    #[test]
    fn test_modularity_known_value() {
        let g = two_triangles();
        // m = 7, each side: 3 internal edges, degree sum 7
        let expected = 2.0 * (6.0 / 14.0 - (7.0f64 / 14.0).powi(2));
        assert_relative_eq!(modularity(&g, &[0, 0, 0, 1, 1, 1]), expected, epsilon = 1e-12);
        assert_relative_eq!(modularity(&g, &[0; 6]), 0.0, epsilon = 1e-12);
    }

    #[test]
    fn test_louvain_splits_triangles() {
        let g = two_triangles();
        for seed in 0..5 {
            let louvain = Louvain { seed: Some(seed), ..Default::default() };
            let p = louvain.run(&g);
            assert_eq!(p.n_communities(), 2);
            assert_eq!(p.membership[0], p.membership[1]);
            assert_eq!(p.membership[1], p.membership[2]);
            assert_eq!(p.membership[3], p.membership[4]);
            assert_eq!(p.membership[4], p.membership[5]);
            assert_ne!(p.membership[0], p.membership[3]);
            assert_relative_eq!(p.modularity, modularity(&g, &p.membership), epsilon = 1e-12);
        }
    }

    #[test]
    fn test_same_seed_same_partition() {
        let g = two_triangles();
        let louvain = Louvain { seed: Some(42), ..Default::default() };
        assert_eq!(louvain.run(&g).membership, louvain.run(&g).membership);
    }

    #[test]
    fn test_aggregation_keeps_modularity() {
        let g = two_triangles();
        let net = Network::from_csr(&g);
        let membership = vec![0, 0, 0, 1, 1, 1];
        let coarse = net.aggregate(&membership, 2);
        assert_relative_eq!(coarse.total, net.total);
        assert_relative_eq!(coarse.modularity(&[0, 1]), net.modularity(&membership), epsilon = 1e-12);
        assert_relative_eq!(coarse.modularity(&[0, 0]), 0.0, epsilon = 1e-12);
    }

    #[test]
    fn test_empty_graph() {
        let g = undirected(3, &[]);
        let p = Louvain::default().run(&g);
        assert_eq!(p.membership, vec![0, 1, 2]);
        assert_eq!(p.modularity, 0.0);
    }

    /// `n` triangles in a ring, each joined to the next by a single edge
    fn ring_of_triangles(n: usize) -> CsMat<f64> {
        let mut edges = Vec::new();
        for t in 0..n {
            let (a, b, c) = (3 * t, 3 * t + 1, 3 * t + 2);
            edges.extend([(a, b, 1.0), (b, c, 1.0), (a, c, 1.0)]);
            edges.push((c, (3 * t + 3) % (3 * n), 1.0));
        }
        undirected(3 * n, &edges)
    }

    #[test]
    fn test_ring_needs_several_levels() {
        // 60 triangles: neighbouring communities keep merging above level 1
        let g = ring_of_triangles(60);
        let louvain = Louvain { seed: Some(9), q_tol: 0.0, ..Default::default() };
        let p = louvain.run(&g);
        assert!(p.levels >= 2, "levels = {}", p.levels);
        assert!(p.n_communities() < 60);
        assert_relative_eq!(p.modularity, modularity(&g, &p.membership), epsilon = 1e-9);
    }

    #[test]
    fn test_time_limit_stops_after_first_level() {
        let g = ring_of_triangles(60);
        let louvain = Louvain {
            seed: Some(9),
            q_tol: 0.0,
            time_limit: Some(Duration::ZERO),
        };
        let p = louvain.run(&g);
        assert_eq!(p.levels, 1);
        assert!(p.n_communities() < 180);
        assert_relative_eq!(p.modularity, modularity(&g, &p.membership), epsilon = 1e-9);
    }

    #[test]
    fn test_large_q_tol_keeps_first_level() {
        let g = ring_of_triangles(60);
        let first_level = Louvain {
            seed: Some(9),
            q_tol: 0.0,
            time_limit: Some(Duration::ZERO),
        }
        .run(&g);
        let coarse_tol = Louvain { seed: Some(9), q_tol: 1.0, ..Default::default() }.run(&g);
        assert_eq!(coarse_tol.levels, 1);
        assert_eq!(coarse_tol.membership, first_level.membership);
        assert_relative_eq!(coarse_tol.modularity, first_level.modularity, epsilon = 1e-12);
    }

    #[test]
    fn test_renumber() {
        let (r, n) = renumber(&[5, 2, 5, 0]);
        assert_eq!(r, vec![0, 1, 0, 2]);
        assert_eq!(n, 3);
    }
}
