use std::path::{Path, PathBuf};

use clap::{Parser, Subcommand};
use wvw_skirmish::{
    build_csv_chunks, combine_csv_fragments, combine_match_json, init_logging, log_app_start,
    log_paths_selected, sync_match_files, DatasetConfig, LoggingConfig, RecordErrorPolicy,
    StaticTables, WerdesApiConfig,
};

#[derive(Parser)]
#[command(name = "skirmish_dataset")]
#[command(about = "Build a per-skirmish WvW dataset from historical match data", long_about = None)]
struct Cli {
    /// Increase log verbosity (-v info, -vv debug)
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    verbose: u8,

    /// Directory holding the per-match JSON, CSV chunks and merged outputs
    #[arg(long, env = "WVW_DATA_ROOT", default_value = ".", global = true)]
    data_root: PathBuf,

    /// Directory holding maps.json and events.json
    #[arg(long, env = "WVW_LOOKUP_DIR", default_value = "lookup_tables", global = true)]
    lookup_dir: PathBuf,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Download every listed match not already on disk
    Fetch {
        /// Pause after each match request, in milliseconds
        #[arg(long, env = "WVW_REQUEST_DELAY_MS", default_value_t = 750)]
        request_delay_ms: u64,
    },
    /// Merge the per-match JSON files into a single JSON array
    MergeJson,
    /// Transform match files into aggregated CSV chunks and concatenate them
    BuildCsv {
        /// Matches per aggregated chunk
        #[arg(long, env = "WVW_CHUNK_SIZE", default_value_t = 200)]
        chunk_size: usize,

        /// Skip matches that fail the transform instead of aborting
        #[arg(long, default_value_t = false)]
        skip_bad_matches: bool,
    },
    /// Fetch, then build the CSV dataset
    Run {
        #[arg(long, env = "WVW_REQUEST_DELAY_MS", default_value_t = 750)]
        request_delay_ms: u64,

        #[arg(long, env = "WVW_CHUNK_SIZE", default_value_t = 200)]
        chunk_size: usize,

        #[arg(long, default_value_t = false)]
        skip_bad_matches: bool,
    },
}

impl Commands {
    fn name(&self) -> &'static str {
        match self {
            Self::Fetch { .. } => "fetch",
            Self::MergeJson => "merge-json",
            Self::BuildCsv { .. } => "build-csv",
            Self::Run { .. } => "run",
        }
    }
}

fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();

    let logging_cfg = LoggingConfig::from_env_and_verbosity(cli.verbose);
    init_logging(&logging_cfg)?;
    log_app_start(&logging_cfg, cli.command.name());
    log_paths_selected(&cli.lookup_dir, &cli.data_root);

    match cli.command {
        Commands::Fetch { request_delay_ms } => {
            fetch(&cli.data_root, request_delay_ms)?;
        }
        Commands::MergeJson => {
            let cfg = dataset_config(&cli.data_root, 200, false);
            combine_match_json(&cfg.json_dir(), &cfg.merged_json_path())?;
        }
        Commands::BuildCsv {
            chunk_size,
            skip_bad_matches,
        } => {
            let cfg = dataset_config(&cli.data_root, chunk_size, skip_bad_matches);
            build_csv(&cli.lookup_dir, &cfg)?;
        }
        Commands::Run {
            request_delay_ms,
            chunk_size,
            skip_bad_matches,
        } => {
            // Tables load before any download starts.
            let tables = StaticTables::load_dir(&cli.lookup_dir)?;
            fetch(&cli.data_root, request_delay_ms)?;
            let cfg = dataset_config(&cli.data_root, chunk_size, skip_bad_matches);
            build_csv_with_tables(&tables, &cfg)?;
        }
    }

    Ok(())
}

fn dataset_config(data_root: &Path, chunk_size: usize, skip_bad: bool) -> DatasetConfig {
    DatasetConfig {
        data_root: data_root.to_path_buf(),
        chunk_size,
        record_error_policy: if skip_bad {
            RecordErrorPolicy::ReportAndSkip
        } else {
            RecordErrorPolicy::Strict
        },
    }
}

fn fetch(data_root: &Path, request_delay_ms: u64) -> Result<(), Box<dyn std::error::Error>> {
    let api_cfg = WerdesApiConfig {
        output_dir: dataset_config(data_root, 200, false).json_dir(),
        request_delay_ms,
        ..WerdesApiConfig::default()
    };
    let (_, report) = sync_match_files(&api_cfg)?;
    if !report.failed.is_empty() {
        eprintln!(
            "{} of {} matches could not be fetched: {}",
            report.failed.len(),
            report.listed,
            report.failed.join(", ")
        );
    }
    Ok(())
}

fn build_csv(
    lookup_dir: &Path,
    cfg: &DatasetConfig,
) -> Result<(), Box<dyn std::error::Error>> {
    let tables = StaticTables::load_dir(lookup_dir)?;
    build_csv_with_tables(&tables, cfg)
}

fn build_csv_with_tables(
    tables: &StaticTables,
    cfg: &DatasetConfig,
) -> Result<(), Box<dyn std::error::Error>> {
    let report = build_csv_chunks(&cfg.json_dir(), &cfg.csv_dir(), tables, cfg)?;
    let rows = combine_csv_fragments(&cfg.csv_dir(), &cfg.merged_csv_path())?;
    println!(
        "Built {} | matches={} rejected={} skipped_files={} chunks={} rows={}",
        cfg.merged_csv_path().display(),
        report.matches_transformed,
        report.matches_rejected,
        report.files_skipped,
        report.chunks.len(),
        rows
    );
    if let Some(first_error) = report.first_error {
        eprintln!("first rejected match: {first_error}");
    }
    Ok(())
}
