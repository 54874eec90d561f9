use std::path::PathBuf;

use clap::{Args, Parser, Subcommand};
use objcache_types::ObjectId;

#[derive(Parser)]
#[command(
    name = "objcache",
    about = "Browse repository objects through a batch object cache",
    version
)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Command,

    /// Repository to read (overrides the config file)
    #[arg(long, global = true)]
    pub repo: Option<PathBuf>,

    /// TOML file with engine settings
    #[arg(long, global = true)]
    pub config: Option<PathBuf>,

    #[arg(short, long, global = true)]
    pub verbose: bool,

    #[arg(long, global = true, default_value = "text")]
    pub format: OutputFormat,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, clap::ValueEnum)]
pub enum OutputFormat {
    Text,
    Json,
}

#[derive(Subcommand)]
pub enum Command {
    /// List a tree recursively
    LsTree(LsTreeArgs),
    /// Print a blob
    Cat(CatArgs),
    /// Show commit history
    Log(LogArgs),
    /// Resolve a path below a tree
    Resolve(ResolveArgs),
    /// Load a whole tree and report cache statistics
    Stats(StatsArgs),
}

#[derive(Args)]
pub struct LsTreeArgs {
    pub tree: ObjectId,
    /// Levels below the root to list
    #[arg(long)]
    pub depth: Option<usize>,
    /// Do not fetch blob contents
    #[arg(long)]
    pub no_blobs: bool,
}

#[derive(Args)]
pub struct CatArgs {
    pub blob: ObjectId,
}

#[derive(Args)]
pub struct LogArgs {
    pub commit: ObjectId,
    #[arg(short = 'n', long, default_value = "20")]
    pub limit: usize,
}

#[derive(Args)]
pub struct ResolveArgs {
    pub tree: ObjectId,
    pub path: String,
}

#[derive(Args)]
pub struct StatsArgs {
    pub tree: ObjectId,
}
