//! PhenoGraph clustering: kNN search, Jaccard graph, Louvain, relabelling by size.

use anyhow::{anyhow, Result};
use ndarray::ArrayView2;
use sprs::CsMat;
use std::time::Duration;

use crate::graph::jaccard_graph;
use crate::knn::{nearest_neighbors, Metric};
use crate::louvain::Louvain;

/// Parameters of one clustering run.
///
/// `k`, `jaccard`, `prune` and `min_cluster_size` default to PhenoGraph's
/// values. `q_tol` and `time_limit` are stopping rules between Louvain
/// levels of a single run, not limits on repeated restarts.
#[derive(Debug, Clone)]
pub struct PhenographParams {
    /// number of nearest neighbours per row
    pub k: usize,
    pub metric: Metric,
    /// weight edges by the Jaccard index of the neighbour sets
    pub jaccard: bool,
    /// keep only mutual kNN edges
    pub prune: bool,
    /// communities smaller than this are labelled -1
    pub min_cluster_size: usize,
    /// stop aggregating once a level gains less modularity than this
    pub q_tol: f64,
    /// checked after each Louvain level, unbounded if None
    pub time_limit: Option<Duration>,
    pub seed: Option<u64>,
    /// worker threads for the kNN search, rayon's global pool if None
    pub threads: Option<usize>,
}

impl Default for PhenographParams {
    fn default() -> Self {
        Self {
            k: 30,
            metric: Metric::Euclidean,
            jaccard: true,
            prune: false,
            min_cluster_size: 10,
            q_tol: 1e-3,
            time_limit: None,
            seed: None,
            threads: None,
        }
    }
}

/// Output of [`cluster`]
#[derive(Debug, Clone)]
pub struct Clustering {
    /// label per row, 0 is the largest community, -1 marks rows in small communities
    pub communities: Vec<i64>,
    pub graph: CsMat<f64>,
    pub modularity: f64,
}

impl Clustering {
    pub fn n_clusters(&self) -> usize {
        self.communities.iter().filter(|&&c| c >= 0).max().map_or(0, |&c| c as usize + 1)
    }

    pub fn n_outliers(&self) -> usize {
        self.communities.iter().filter(|&&c| c < 0).count()
    }
}

/// Relabel communities so that 0 is the largest, 1 the next and so on.
///
/// Equal sizes keep the order of the original ids. Communities with fewer
/// than `min_size` members become -1.
pub fn sort_by_size(membership: &[usize], min_size: usize) -> Vec<i64> {
    let n_comm = membership.iter().max().map_or(0, |&m| m + 1);
    let mut sizes = vec![0usize; n_comm];
    for &m in membership {
        sizes[m] += 1;
    }

    let mut order: Vec<usize> = (0..n_comm).filter(|&c| sizes[c] > 0).collect();
    order.sort_by(|&a, &b| sizes[b].cmp(&sizes[a]).then(a.cmp(&b)));

    let mut relabel = vec![-1i64; n_comm];
    let mut next = 0i64;
    for c in order {
        if sizes[c] >= min_size {
            relabel[c] = next;
            next += 1;
        }
    }
    membership.iter().map(|&m| relabel[m]).collect()
}

fn knn_in_pool(data: ArrayView2<f32>, k: usize, params: &PhenographParams) -> Result<Vec<Vec<usize>>> {
    match params.threads {
        Some(0) => Err(anyhow!("Thread count must be at least 1")),
        Some(threads) => {
            let pool = rayon::ThreadPoolBuilder::new()
                .num_threads(threads)
                .build()
                .map_err(|e| anyhow!("Failed to build a pool of {} threads: {}", threads, e))?;
            pool.install(|| nearest_neighbors(data, k, params.metric))
        }
        None => nearest_neighbors(data, k, params.metric),
    }
}

/// Cluster the rows of `data`.
pub fn cluster(data: ArrayView2<f32>, params: &PhenographParams) -> Result<Clustering> {
    let n = data.nrows();
    if n < 2 {
        return Err(anyhow!("Need at least 2 rows to cluster, got {}", n));
    }
    if params.k == 0 {
        return Err(anyhow!("k must be at least 1"));
    }
    let k = if params.k >= n {
        log::warn!("k = {} is not below the number of rows, using k = {}", params.k, n - 1);
        n - 1
    } else {
        params.k
    };

    log::info!("finding {} nearest neighbours of {} rows ({:?})", k, n, params.metric);
    let neighbors = knn_in_pool(data, k, params)?;
    let graph = jaccard_graph(&neighbors, params.jaccard, params.prune);

    let louvain = Louvain {
        q_tol: params.q_tol,
        time_limit: params.time_limit,
        seed: params.seed,
    };
    let partition = louvain.run(&graph);
    let communities = sort_by_size(&partition.membership, params.min_cluster_size);

    let clustering = Clustering { communities, graph, modularity: partition.modularity };
    log::info!(
        "{} communities after {} levels, modularity {:.4}, {} rows in communities below {} members",
        clustering.n_clusters(),
        partition.levels,
        clustering.modularity,
        clustering.n_outliers(),
        params.min_cluster_size
    );
    Ok(clustering)
}
