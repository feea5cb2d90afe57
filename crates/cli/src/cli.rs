use std::path::PathBuf;

use clap::{Parser, Subcommand};

use cardiovar_core::DataKind;

#[derive(Parser, Debug)]
#[command(name = "cardiovar")]
#[command(about = "CardioVar data-source tools: cache admin, fetches and annotation jobs")]
#[command(version)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,

    /// Settings file (TOML); defaults apply when absent
    #[arg(short, long, global = true, env = "CARDIOVAR_CONFIG")]
    pub config: Option<PathBuf>,

    /// Log JSON lines instead of compact text
    #[arg(long, global = true, env = "CARDIOVAR_LOG_JSON")]
    pub log_json: bool,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Inspect and maintain the response cache
    Cache(CacheArgs),
    /// Resolve one record through the source chain
    Fetch(FetchArgs),
    /// Annotate one variant as a background job
    Annotate(AnnotateArgs),
    /// Annotate a JSON list of variants as a batch job
    Batch(BatchArgs),
}

#[derive(clap::Args, Debug)]
pub struct CacheArgs {
    #[command(subcommand)]
    pub command: CacheCommands,
}

#[derive(Subcommand, Debug)]
pub enum CacheCommands {
    /// Show the entry stored under a key
    Get { key: String },
    /// Delete one key
    Invalidate { key: String },
    /// Delete keys matching a pattern (`%`/`*` any run, `_`/`?` one char)
    InvalidatePattern { pattern: String },
    /// Delete expired entries
    Sweep,
    /// Delete every entry
    Clear,
    /// Entry counts
    Stats,
}

#[derive(clap::Args, Debug)]
pub struct FetchArgs {
    /// Data kind (e.g. gnomad_frequency, clinvar, phylop)
    pub kind: DataKind,
    /// Key parts in the kind's order (e.g. chr22 36191400 A C)
    #[arg(required = true)]
    pub parts: Vec<String>,
    /// Disable every fallback tier below live
    #[arg(long)]
    pub force_live: bool,
}

#[derive(clap::Args, Debug)]
pub struct AnnotateArgs {
    pub chrom: String,
    pub pos: u64,
    #[arg(value_name = "REF")]
    pub reference: String,
    #[arg(value_name = "ALT")]
    pub alternate: String,
    /// Gene symbol for gene-level annotations
    #[arg(long)]
    pub gene: Option<String>,
    /// Disable every fallback tier below live
    #[arg(long)]
    pub force_live: bool,
    /// Give up waiting after this many seconds
    #[arg(long, default_value_t = 300)]
    pub timeout_secs: u64,
}

#[derive(clap::Args, Debug)]
pub struct BatchArgs {
    /// JSON file holding an array of `{chrom, pos, ref, alt, gene?}` objects
    pub file: PathBuf,
    /// Disable every fallback tier below live
    #[arg(long)]
    pub force_live: bool,
    #[arg(long, default_value_t = 3600)]
    pub timeout_secs: u64,
}
