use clap::{Args, Parser, Subcommand};
use std::path::PathBuf;

#[derive(Debug, Parser)]
#[command(
    name = "photo-indexer",
    about = "Index photo albums into a SQLite full-text catalog"
)]
pub struct Cli {
    /// Catalog file, overriding `db_path` from configuration
    #[arg(long, global = true)]
    pub dbpath: Option<PathBuf>,

    /// Increase log verbosity (-v debug, -vv trace)
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    pub verbose: u8,

    /// Only log warnings and errors
    #[arg(short, long, global = true, conflicts_with = "verbose")]
    pub quiet: bool,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Debug, Subcommand)]
pub enum Command {
    /// Describe and catalog every photo the glob matches that is not indexed yet
    Index(GlobArgs),
    /// Drop catalog entries whose files the glob no longer matches
    Prune(GlobArgs),
    /// Ranked full-text search (FTS5 query syntax)
    Search(SearchArgs),
    /// Tags containing a substring, most frequent first
    SearchTags(TagArgs),
    /// Coordinates and capture times for paths containing a substring
    SearchMetadata(QueryArgs),
    /// Print every catalog record
    Dump,
    /// Serve the read-only HTTP API
    Serve,
}

#[derive(Debug, Args)]
pub struct GlobArgs {
    /// Glob pattern of photo files, e.g. "albums/**/*.jpg"
    #[arg(long)]
    pub glob: String,

    /// Report what would change without writing
    #[arg(long)]
    pub dry_run: bool,
}

#[derive(Debug, Args)]
pub struct SearchArgs {
    #[arg(long)]
    pub query: String,

    #[arg(long)]
    pub limit: Option<usize>,

    #[arg(long)]
    pub offset: Option<usize>,
}

#[derive(Debug, Args)]
pub struct TagArgs {
    #[arg(long, default_value = "")]
    pub query: String,

    #[arg(long)]
    pub limit: Option<usize>,
}

#[derive(Debug, Args)]
pub struct QueryArgs {
    #[arg(long, default_value = "")]
    pub query: String,
}

impl Cli {
    /// Level requested on the command line, if any.
    pub fn log_level(&self) -> Option<log::LevelFilter> {
        match (self.quiet, self.verbose) {
            (true, _) => Some(log::LevelFilter::Warn),
            (false, 0) => None,
            (false, 1) => Some(log::LevelFilter::Debug),
            (false, _) => Some(log::LevelFilter::Trace),
        }
    }
}
