//! Command implementations for the Pilum CLI.

use std::fs::File;
use std::io::BufReader;
use std::sync::Arc;
use std::time::{Duration, Instant};

use log::info;

use crate::cli::args::*;
use crate::cli::output::*;
use crate::config::IndexConfig;
use crate::error::{PilumError, Result};
use crate::index::{
    CombinedIndexReader, DirectoryIndexFactory, IndexConstructor, IndexQueryExecution,
    StatefulIndex,
};
use crate::journal::import_json_lines;
use crate::query::{QueryParams, SearchBudget, SearchQuery};

/// Execute a CLI command.
pub fn execute_command(args: PilumArgs) -> Result<()> {
    match &args.command {
        Command::Import(import_args) => import(import_args, &args),
        Command::Construct(construct_args) => construct(construct_args, &args),
        Command::Switch => switch(&args),
        Command::Query(query_args) => query(query_args, &args),
        Command::Stats(stats_args) => stats(stats_args, &args),
    }
}

/// Resolve the index configuration from the config file and CLI overrides.
pub fn load_config(args: &PilumArgs) -> Result<IndexConfig> {
    let mut config = match &args.config {
        Some(path) => IndexConfig::from_file(path)?,
        None => IndexConfig::default(),
    };
    if let Some(dir) = &args.index_dir {
        config.index_dir = dir.clone();
    }
    config.validate()?;
    Ok(config)
}

fn open_stateful(config: &IndexConfig) -> Result<StatefulIndex> {
    let factory = Arc::new(DirectoryIndexFactory::new(config));
    StatefulIndex::new(factory, config.close_delay())
}

fn import(args: &ImportArgs, cli_args: &PilumArgs) -> Result<()> {
    let file = File::open(&args.input).map_err(|e| {
        PilumError::invalid_argument(format!("Cannot open {}: {e}", args.input.display()))
    })?;
    let records = import_json_lines(BufReader::new(file), &args.output)?;

    output_result(
        "Journal written",
        &ImportResult {
            journal: args.output.display().to_string(),
            records,
        },
        cli_args,
    )
}

fn construct(args: &ConstructArgs, cli_args: &PilumArgs) -> Result<()> {
    let mut config = load_config(cli_args)?;
    if let Some(threads) = args.threads {
        config = config.with_construction_threads(threads);
        config.validate()?;
    }

    let start = Instant::now();
    let report = IndexConstructor::new(config.clone()).construct(&args.journal_dir)?;

    let switched = if args.switch && report.is_some() {
        let index = open_stateful(&config)?;
        if !index.switch_index() {
            return Err(PilumError::index("Index switch failed, see log"));
        }
        true
    } else {
        false
    };

    output_result(
        "Index constructed",
        &ConstructResult {
            staged_dir: config.next_dir().display().to_string(),
            report,
            switched,
            duration_ms: start.elapsed().as_millis() as u64,
        },
        cli_args,
    )
}

fn switch(cli_args: &PilumArgs) -> Result<()> {
    let config = load_config(cli_args)?;
    let index = open_stateful(&config)?;
    if !index.switch_index() {
        return Err(PilumError::index("Index switch failed, see log"));
    }
    let reader = index
        .snapshot()
        .ok_or_else(|| PilumError::index("No reader after switch"))?;

    output_result(
        "Index switched",
        &SwitchResult {
            live_dir: config.current_dir().display().to_string(),
            documents: reader.total_doc_count(),
            loaded: reader.is_loaded(),
        },
        cli_args,
    )
}

fn query(args: &QueryArgs, cli_args: &PilumArgs) -> Result<()> {
    let config = load_config(cli_args)?;
    let index = open_stateful(&config)?;
    index.init()?;
    let reader = index
        .snapshot()
        .ok_or_else(|| PilumError::index("No live index"))?;

    let params = QueryParams {
        domains: args.domain.clone(),
        quality: args.quality.unwrap_or_default(),
        year: args.year.unwrap_or_default(),
        size: args.size.unwrap_or_default(),
        rank: args.rank.unwrap_or_default(),
    };
    let search = SearchQuery::new(args.include.clone(), args.exclude.clone()).with_params(params);
    let budget = SearchBudget::new(Duration::from_millis(args.budget_ms));

    let start = Instant::now();
    let mut ids = Vec::new();
    let mut execution = IndexQueryExecution::new(config.lookup_batch_size, config.results_batch_size);
    let stats = execution.run(&reader, &search, &budget, |batch| ids.extend_from_slice(batch));
    info!(
        "Query produced {} ids from {}/{} heads",
        stats.results, stats.heads_evaluated, stats.heads
    );

    let total = ids.len();
    if let Some(limit) = args.limit {
        ids.truncate(limit);
    }

    output_result(
        "Query results",
        &QueryResults {
            ids,
            total,
            stats,
            duration_ms: start.elapsed().as_millis() as u64,
        },
        cli_args,
    )
}

fn stats(args: &StatsArgs, cli_args: &PilumArgs) -> Result<()> {
    let config = load_config(cli_args)?;
    let reader = CombinedIndexReader::open(&config.current_dir())?;

    let terms = args
        .terms
        .iter()
        .map(|&term_id| TermStats {
            term_id,
            full: reader.num_hits(term_id),
            prio: reader.num_hits_prio(term_id),
        })
        .collect();

    output_result(
        "Index statistics",
        &IndexStats {
            live_dir: config.current_dir().display().to_string(),
            loaded: reader.is_loaded(),
            documents: reader.total_doc_count(),
            full_terms: reader.full().term_count(),
            prio_terms: reader.prio().term_count(),
            terms,
        },
        cli_args,
    )
}
