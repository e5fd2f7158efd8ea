//! Command line argument parsing for the Pilum CLI using clap.

use std::path::PathBuf;

use clap::{Parser, Subcommand, ValueEnum};
use serde::{Deserialize, Serialize};

use crate::query::SpecificationLimit;

/// Pilum - reverse/forward index construction and budgeted query execution
#[derive(Parser, Debug, Clone)]
#[command(name = "pilum")]
#[command(about = "Build, publish and query pilum search indexes")]
#[command(version = env!("CARGO_PKG_VERSION"))]
#[command(long_about = None)]
pub struct PilumArgs {
    /// Verbosity level (0=quiet, 1=normal, 2=verbose, 3=debug)
    #[arg(short, long, action = clap::ArgAction::Count)]
    pub verbose: u8,

    /// Quiet mode (overrides verbose)
    #[arg(short, long)]
    pub quiet: bool,

    /// Output format
    #[arg(short = 'f', long = "format", default_value = "human")]
    pub output_format: OutputFormat,

    /// Pretty-print JSON output
    #[arg(long)]
    pub pretty: bool,

    /// Index configuration file (JSON)
    #[arg(short, long, env = "PILUM_CONFIG", value_name = "CONFIG_FILE")]
    pub config: Option<PathBuf>,

    /// Index root directory, overrides the configuration file
    #[arg(short, long, env = "PILUM_INDEX_DIR", value_name = "INDEX_DIR")]
    pub index_dir: Option<PathBuf>,

    /// Subcommand to execute
    #[command(subcommand)]
    pub command: Command,
}

impl PilumArgs {
    /// Get the effective verbosity level
    pub fn verbosity(&self) -> u8 {
        if self.quiet {
            0
        } else {
            match self.verbose {
                0 => 1,
                n => n,
            }
        }
    }
}

/// Available CLI commands
#[derive(Subcommand, Debug, Clone)]
pub enum Command {
    /// Convert JSON-lines document records into a journal file
    Import(ImportArgs),

    /// Build a staged index generation from a directory of journals
    Construct(ConstructArgs),

    /// Publish the staged generation as the live index
    Switch,

    /// Run a query against the live index
    Query(QueryArgs),

    /// Show statistics of the live index
    Stats(StatsArgs),
}

/// Arguments for importing records
#[derive(Parser, Debug, Clone)]
pub struct ImportArgs {
    /// JSON-lines input, one record per line
    #[arg(value_name = "INPUT")]
    pub input: PathBuf,

    /// Journal file to write
    #[arg(value_name = "JOURNAL")]
    pub output: PathBuf,
}

/// Arguments for index construction
#[derive(Parser, Debug, Clone)]
pub struct ConstructArgs {
    /// Directory holding `*.journal` files
    #[arg(value_name = "JOURNAL_DIR")]
    pub journal_dir: PathBuf,

    /// Number of construction threads
    #[arg(short, long)]
    pub threads: Option<usize>,

    /// Publish the generation right after building it
    #[arg(long)]
    pub switch: bool,
}

/// Arguments for querying
#[derive(Parser, Debug, Clone)]
pub struct QueryArgs {
    /// Term ids every result must contain (comma-separated)
    #[arg(short = 'I', long, value_delimiter = ',', required = true)]
    pub include: Vec<u64>,

    /// Term ids no result may contain (comma-separated)
    #[arg(short = 'X', long, value_delimiter = ',')]
    pub exclude: Vec<u64>,

    /// Time budget in milliseconds
    #[arg(short, long, default_value = "150")]
    pub budget_ms: u64,

    /// Maximum number of ids to print
    #[arg(short, long)]
    pub limit: Option<usize>,

    /// Admitted domain ids (comma-separated)
    #[arg(long, value_delimiter = ',')]
    pub domain: Vec<u32>,

    /// Quality constraint: `=N`, `<N` or `>N` (bounds are inclusive)
    #[arg(long, value_parser = parse_limit)]
    pub quality: Option<SpecificationLimit>,

    /// Publication year constraint
    #[arg(long, value_parser = parse_limit)]
    pub year: Option<SpecificationLimit>,

    /// Document size constraint
    #[arg(long, value_parser = parse_limit)]
    pub size: Option<SpecificationLimit>,

    /// Rank constraint
    #[arg(long, value_parser = parse_limit)]
    pub rank: Option<SpecificationLimit>,
}

/// Arguments for index statistics
#[derive(Parser, Debug, Clone)]
pub struct StatsArgs {
    /// Term ids to report posting counts for (comma-separated)
    #[arg(short, long, value_delimiter = ',')]
    pub terms: Vec<u64>,
}

/// Output formats for CLI
#[derive(ValueEnum, Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OutputFormat {
    /// Human-readable format
    Human,
    /// JSON format
    Json,
}

/// Parse `=N`, `<N` or `>N`. A bare number means equality.
pub fn parse_limit(s: &str) -> Result<SpecificationLimit, String> {
    let s = s.trim();
    let (op, number) = match s.chars().next() {
        Some(c @ ('=' | '<' | '>')) => (c, &s[1..]),
        _ => ('=', s),
    };
    let value: i32 = number
        .trim()
        .parse()
        .map_err(|e| format!("invalid limit '{s}': {e}"))?;
    Ok(match op {
        '<' => SpecificationLimit::LessThan(value),
        '>' => SpecificationLimit::GreaterThan(value),
        _ => SpecificationLimit::Equals(value),
    })
}
