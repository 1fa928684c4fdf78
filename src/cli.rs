use clap::{Parser, Subcommand};
use std::path::PathBuf;

#[derive(Parser)]
#[command(name = "commprof")]
#[command(about = "Summarize per-rank communication profiles of a parallel run", long_about = None)]
#[command(version)]
pub struct Cli {
    /// Print debug diagnostics (RUST_LOG overrides this)
    #[arg(short, long, global = true)]
    pub verbose: bool,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Aggregate one or more text reports (one per rank)
    Summarize {
        /// Output JSON instead of human-readable text
        #[arg(long)]
        json: bool,

        /// Suppress human-readable output (useful with --csv)
        #[arg(long)]
        quiet: bool,

        /// Export per-peer traffic to a CSV file
        #[arg(long, value_name = "PATH")]
        csv: Option<String>,

        /// Export per-transport-mode totals to a CSV file
        #[arg(long, value_name = "PATH")]
        modes_csv: Option<String>,

        /// Report files, e.g. CommProfiling/processor*.comm
        #[arg(required = true)]
        reports: Vec<PathBuf>,
    },

    /// Show the transport call totals written at the end of a run
    Stats {
        /// Output JSON instead of human-readable text
        #[arg(long)]
        json: bool,

        /// A processor<rank>.stats.json file
        file: PathBuf,
    },
}
