use std::path::PathBuf;

use clap::{Parser, Subcommand};

/// Guild roster ranking and drop-rate statistics.
#[derive(Debug, Parser)]
#[command(name = "grablu", version, about)]
pub struct Cli {
    /// Configuration file.
    #[arg(long, global = true, default_value = "config.toml")]
    pub config: PathBuf,

    /// Debug-level logging (RUST_LOG still wins when set).
    #[arg(short, long, global = true)]
    pub verbose: bool,

    /// Append logs to this file instead of the job's default.
    #[arg(long, global = true)]
    pub log_file: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Debug, Subcommand)]
pub enum Command {
    /// Scrape the guild member list and add this event's ranks to the spreadsheet.
    Roster {
        /// Print the scraped ranks without touching the spreadsheet.
        #[arg(long)]
        dry_run: bool,
    },
    /// Scrape drop counters, print binomial statistics and draw the distribution chart.
    Drops {
        /// Chart output directory (overrides drop_stats.output_directory).
        #[arg(short, long)]
        out: Option<PathBuf>,

        /// Skip the chart.
        #[arg(long)]
        no_chart: bool,
    },
}

impl Command {
    pub fn default_log_file(&self) -> &'static str {
        match self {
            Command::Roster { .. } => "grablu.log",
            Command::Drops { .. } => "drops.log",
        }
    }
}

pub fn parse() -> Cli {
    Cli::parse()
}
