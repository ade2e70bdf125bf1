use std::path::{Path, PathBuf};
use std::process;

use anyhow::Context;
use clap::{Parser, Subcommand};
use duckdb::Connection;

use orasplit::{plan_job, JobConfig, WorkerContext};

#[derive(Parser)]
#[command(name = "orasplit")]
#[command(about = "Split planning and cluster routing for parallel table scans")]
#[command(version = "0.1.0")]
struct Cli {
    /// Enable verbose logging
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Suppress all output except errors
    #[arg(long, global = true)]
    quiet: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Plan the splits of a job and write them into its configuration
    Plan {
        /// DuckDB database holding the dictionary views
        #[arg(short, long)]
        database: PathBuf,

        /// Job configuration (JSON)
        #[arg(short, long)]
        config: PathBuf,

        /// Where to write the planned configuration (defaults to --config)
        #[arg(short, long)]
        output: Option<PathBuf>,
    },
    /// Print what the worker owning a split would scan
    Show {
        /// Planned job configuration (JSON)
        #[arg(short, long)]
        config: PathBuf,

        /// Split sequence id
        #[arg(short, long)]
        split: u32,
    },
}

fn main() {
    let cli = Cli::parse();

    init_logging(cli.verbose, cli.quiet);

    if let Err(e) = run(cli) {
        eprintln!("Error: {:#}", e);
        process::exit(1);
    }
}

fn init_logging(verbose: bool, quiet: bool) {
    let level = if quiet {
        log::LevelFilter::Error
    } else if verbose {
        log::LevelFilter::Debug
    } else {
        log::LevelFilter::Info
    };

    env_logger::Builder::new().filter_level(level).init();
}

fn run(cli: Cli) -> anyhow::Result<()> {
    match cli.command {
        Command::Plan {
            database,
            config,
            output,
        } => plan_command(&database, &config, output.as_ref().unwrap_or(&config), cli.quiet),
        Command::Show { config, split } => show_command(&config, split),
    }
}

fn plan_command(database: &Path, config_path: &Path, output: &Path, quiet: bool) -> anyhow::Result<()> {
    let conn = Connection::open(database)
        .with_context(|| format!("Failed to open database {}", database.display()))?;
    let mut config = JobConfig::from_file(config_path)
        .with_context(|| format!("Failed to read job configuration {}", config_path.display()))?;

    let splits = plan_job(&conn, &mut config)?;

    config
        .write_file(output)
        .with_context(|| format!("Failed to write job configuration {}", output.display()))?;

    if !quiet {
        for split in &splits {
            println!(
                "split {:>4}: {:>6} chunks {:>12} blocks{}",
                split.sequence_id,
                split.number_of_chunks(),
                split.block_count(),
                split
                    .location_hint
                    .as_deref()
                    .map(|h| format!("  location={}", h))
                    .unwrap_or_default()
            );
        }
        println!("{} splits written to {}", splits.len(), output.display());
    }
    Ok(())
}

fn show_command(config_path: &Path, split_id: u32) -> anyhow::Result<()> {
    let config = JobConfig::from_file(config_path)
        .with_context(|| format!("Failed to read job configuration {}", config_path.display()))?;
    let worker = WorkerContext::load(&config, split_id)?;

    println!("split:      {}", worker.split.sequence_id);
    println!("table:      {}", worker.table);
    println!(
        "connection: {}",
        worker.connection_string.as_deref().unwrap_or("<job default>")
    );
    println!(
        "blocks:     {} of {}",
        worker.split.block_count(),
        worker.split.total_blocks_across_all_splits
    );
    for (table_ref, predicate) in worker.scan_targets() {
        println!("  {} WHERE {}", table_ref, predicate);
    }
    Ok(())
}
