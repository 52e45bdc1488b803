//! Command line definitions.

use std::path::PathBuf;

use clap::{ArgGroup, Args, Parser, Subcommand};
use pitdata::CacheKind;

#[derive(Debug, Parser)]
#[command(
    name = "pitdata",
    version,
    about = "Point-in-time market data cache: health checks and dataset preparation"
)]
pub(crate) struct Cli {
    /// Root of the cache tree.
    #[arg(long, global = true, env = "PITDATA_BASE_DIR", default_value = "data_cache")]
    pub(crate) base_dir: PathBuf,

    /// JSON file overriding TTLs and subdirectories of the built-in policy table.
    #[arg(long, global = true, env = "PITDATA_CACHE_POLICY")]
    pub(crate) policy: Option<PathBuf>,

    #[command(subcommand)]
    pub(crate) command: Commands,
}

#[derive(Debug, Subcommand)]
pub(crate) enum Commands {
    /// List the effective cache policy table.
    Kinds {
        /// Print JSON instead of a table.
        #[arg(long, default_value_t = false)]
        json: bool,
    },
    /// Report the health of cache directories.
    Check(CheckArgs),
    /// Prepare one dataset from the cache.
    Prepare(PrepareArgs),
    /// Prepare datasets for many entities from the cache.
    Batch(BatchArgs),
}

#[derive(Debug, Args)]
#[command(group(ArgGroup::new("targets").required(true).multiple(true).args(["symbol", "batch_file"])))]
pub(crate) struct CheckArgs {
    /// Entity to check (repeatable).
    #[arg(long)]
    pub(crate) symbol: Vec<String>,

    /// File listing one `SYMBOL[,NAME]` per line.
    #[arg(long)]
    pub(crate) batch_file: Option<PathBuf>,

    /// Kinds to check, comma separated. Defaults to every kind.
    #[arg(long, value_delimiter = ',')]
    pub(crate) kinds: Vec<CacheKind>,

    /// Print JSON instead of a table.
    #[arg(long, default_value_t = false)]
    pub(crate) json: bool,

    /// Write the report to this file instead of stdout.
    #[arg(long)]
    pub(crate) output: Option<PathBuf>,

    /// Exit non-zero when a directory or required file is missing.
    #[arg(long, default_value_t = false)]
    pub(crate) fail_on_missing: bool,

    /// Exit non-zero when a cache is stale.
    #[arg(long, default_value_t = false)]
    pub(crate) fail_on_stale: bool,
}

/// Options shared by `prepare` and `batch`.
#[derive(Debug, Args)]
pub(crate) struct DatasetArgs {
    /// As-of date (YYYY-MM-DD or YYYYMMDD).
    #[arg(long)]
    pub(crate) as_of: String,

    /// Include announcements.
    #[arg(long, default_value_t = false)]
    pub(crate) include_disclosures: bool,

    /// Calendar days of price history.
    #[arg(long)]
    pub(crate) price_lookback_days: Option<u32>,

    /// Calendar days of announcements.
    #[arg(long)]
    pub(crate) disclosure_lookback_days: Option<u32>,

    /// Give up after this many seconds.
    #[arg(long)]
    pub(crate) timeout_secs: Option<u64>,
}

#[derive(Debug, Args)]
pub(crate) struct PrepareArgs {
    /// Entity symbol, e.g. 600519.SH.
    pub(crate) symbol: String,

    #[command(flatten)]
    pub(crate) dataset: DatasetArgs,
}

#[derive(Debug, Args)]
pub(crate) struct BatchArgs {
    /// Entity symbols.
    #[arg(required = true)]
    pub(crate) symbols: Vec<String>,

    #[command(flatten)]
    pub(crate) dataset: DatasetArgs,

    /// Entities prepared at once.
    #[arg(long, default_value_t = 4)]
    pub(crate) workers: usize,
}
