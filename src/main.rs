//main.rs
use anyhow::anyhow;
use clap::Parser;
use env_logger::Env;
use phenograph_stability::columns::MARKER_COLUMNS;
use phenograph_stability::knn::Metric;
use phenograph_stability::output::write_labels;
use phenograph_stability::{cluster, ColumnSet, DataSet, PhenographParams};
use std::time::Duration;

/// One PhenoGraph run of the stability analysis
#[derive(Parser)]
#[clap(version = "0.1.0")]
struct Opts {
    /// tab-delimited input table
    #[clap(short, long)]
    file: String,

    /// label file, one integer per line
    #[clap(short, long)]
    outfile: String,

    /// 0-based marker columns, e.g. "4..7,8..18"
    #[clap(long, default_value = MARKER_COLUMNS)]
    columns: ColumnSet,

    /// header lines to skip
    #[clap(long, default_value_t = 1)]
    skip_rows: usize,

    /// field delimiter of input and output
    #[clap(long, default_value_t = '\t')]
    delimiter: char,

    /// nearest neighbours per row
    #[clap(short, default_value_t = 30)]
    k: usize,

    #[clap(long, default_value_t = 10)]
    min_cluster_size: usize,

    #[clap(long, value_enum, default_value_t = Metric::Euclidean)]
    metric: Metric,

    /// use unit edge weights instead of the Jaccard index
    #[clap(long)]
    no_jaccard: bool,

    /// keep only mutual nearest-neighbour edges
    #[clap(long)]
    prune: bool,

    #[clap(long, default_value_t = 1e-3)]
    q_tol: f64,

    /// Louvain time limit in seconds
    #[clap(long)]
    time_limit: Option<u64>,

    #[clap(long)]
    seed: Option<u64>,

    /// worker threads for the neighbour search
    #[clap(long)]
    threads: Option<usize>,
}

impl Opts {
    fn delimiter_byte(&self) -> anyhow::Result<u8> {
        if !self.delimiter.is_ascii() {
            return Err(anyhow!("Delimiter {:?} is not a single byte", self.delimiter));
        }
        Ok(self.delimiter as u8)
    }

    fn params(&self) -> PhenographParams {
        PhenographParams {
            k: self.k,
            metric: self.metric,
            jaccard: !self.no_jaccard,
            prune: self.prune,
            min_cluster_size: self.min_cluster_size,
            q_tol: self.q_tol,
            time_limit: self.time_limit.map(Duration::from_secs),
            seed: self.seed,
            threads: self.threads,
        }
    }
}

fn main() -> anyhow::Result<()> {
    env_logger::init_from_env(Env::default().filter_or("RUST_LOG", "info"));
    let opts = Opts::parse();
    let delimiter = opts.delimiter_byte()?;

    let ds = DataSet::from_delimited(&opts.file, delimiter, opts.skip_rows)?;
    let features = ds.select_columns(opts.columns.indices())?;
    if let Some(names) = ds.column_names(opts.columns.indices()) {
        log::info!("clustering on columns: {}", names.join(", "));
    }
    log::info!(
        "feature matrix: {} rows x {} columns",
        features.nrows(),
        features.ncols()
    );

    let clustering = cluster(features.view(), &opts.params())?;
    println!(
        "Assigned {} points into {} clusters (modularity {:.4})",
        clustering.communities.len(),
        clustering.n_clusters(),
        clustering.modularity
    );

    write_labels(&opts.outfile, &clustering.communities, delimiter)?;

    Ok(())
}
