mod action;
mod config;
mod edge;
mod encoding;
mod error;
mod extract;
mod fingerprint;
mod ingest;
mod ir;
mod reference;
mod rules;
mod scan;
mod staging;
mod store;

use std::path::{Path, PathBuf};
use std::time::Instant;

use anyhow::{Context, Result};
use clap::{Args, Parser, Subcommand};
use tracing_subscriber::EnvFilter;

use crate::config::Config;
use crate::extract::extract;
use crate::ingest::{IngestReport, ingest};
use crate::scan::scan_inputs;
use crate::staging::{StagedBatch, stage};
use crate::store::SqliteGraphStore;

/// CLI arguments for gadgraph execution.
#[derive(Parser, Debug)]
#[command(
    name = "gadgraph",
    about = "Content-addressed property graph builder for JVM gadget-chain discovery.",
    version
)]
struct Cli {
    #[command(subcommand)]
    command: Command,
    #[arg(long, value_name = "PATH", global = true)]
    config: Option<PathBuf>,
    #[arg(long, global = true)]
    quiet: bool,
    #[arg(long, global = true)]
    timing: bool,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Extract descriptors into staged tables.
    Extract {
        #[command(flatten)]
        inputs: InputArgs,
        #[arg(long, value_name = "DIR")]
        staging_dir: PathBuf,
    },
    /// Merge staged tables into the graph database.
    Ingest {
        #[arg(long, value_name = "DIR")]
        staging_dir: PathBuf,
        #[command(flatten)]
        store: StoreArgs,
    },
    /// Extract and ingest in one run.
    Build {
        #[command(flatten)]
        inputs: InputArgs,
        #[arg(long, value_name = "DIR")]
        staging_dir: Option<PathBuf>,
        #[command(flatten)]
        store: StoreArgs,
    },
}

#[derive(Args, Debug)]
struct InputArgs {
    #[arg(long, value_name = "PATH", required = true)]
    input: Vec<PathBuf>,
    #[arg(long, value_name = "PATH")]
    classpath: Vec<PathBuf>,
}

#[derive(Args, Debug)]
struct StoreArgs {
    #[arg(long, value_name = "PATH")]
    database: PathBuf,
    /// Override every ingest batch size.
    #[arg(long, value_name = "ROWS")]
    batch_size: Option<usize>,
}

fn main() -> Result<()> {
    let cli = Cli::parse();
    init_tracing(cli.quiet);
    run(cli)
}

fn init_tracing(quiet: bool) {
    let default = if quiet { "error" } else { "info" };
    let filter =
        EnvFilter::try_from_env("GADGRAPH_LOG").unwrap_or_else(|_| EnvFilter::new(default));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();
}

fn run(cli: Cli) -> Result<()> {
    let mut config = match &cli.config {
        Some(path) => Config::load(path)?,
        None => Config::default(),
    };
    let timing = cli.timing && !cli.quiet;
    let started_at = Instant::now();

    match cli.command {
        Command::Extract {
            inputs,
            staging_dir,
        } => {
            let staged = extract_inputs(&inputs, &config)?;
            staged.write_to(&staging_dir)?;
            report_timing(timing, started_at, staged.row_count(), None);
        }
        Command::Ingest { staging_dir, store } => {
            apply_store_args(&mut config, &store);
            let staged = StagedBatch::read_from(&staging_dir)?;
            let report = ingest_staged(&staged, &store.database, &config)?;
            report_timing(timing, started_at, staged.row_count(), Some(&report));
        }
        Command::Build {
            inputs,
            staging_dir,
            store,
        } => {
            apply_store_args(&mut config, &store);
            let staged = extract_inputs(&inputs, &config)?;
            if let Some(staging_dir) = &staging_dir {
                staged.write_to(staging_dir)?;
            }
            let report = ingest_staged(&staged, &store.database, &config)?;
            report_timing(timing, started_at, staged.row_count(), Some(&report));
        }
    }

    Ok(())
}

fn apply_store_args(config: &mut Config, store: &StoreArgs) {
    if let Some(size) = store.batch_size {
        config.ingest.class_batch_size = size;
        config.ingest.method_batch_size = size;
        config.ingest.edge_batch_size = size;
        config.ingest.alias_batch_size = size;
    }
}

fn extract_inputs(inputs: &InputArgs, config: &Config) -> Result<StagedBatch> {
    for entry in inputs.input.iter().chain(&inputs.classpath) {
        if !entry.exists() {
            anyhow::bail!("input not found: {}", entry.display());
        }
    }
    let scan = scan_inputs(&inputs.input, &inputs.classpath)?;
    let batch = extract(&scan.classes, &scan.calls, config).context("extraction failed")?;
    stage(&batch).context("failed to stage graph batch")
}

fn ingest_staged(staged: &StagedBatch, database: &Path, config: &Config) -> Result<IngestReport> {
    let store = SqliteGraphStore::open(database, &config.store)
        .with_context(|| format!("failed to open {}", database.display()))?;
    ingest(&store, staged, &config.ingest).map_err(|error| {
        let retry = if error.is_retryable() {
            " (re-run to resume)"
        } else {
            ""
        };
        anyhow::Error::new(error).context(format!("ingestion into {} failed{retry}", database.display()))
    })
}

fn report_timing(timing: bool, started_at: Instant, rows: usize, report: Option<&IngestReport>) {
    if !timing {
        return;
    }
    let inserted = report.map_or(0, IngestReport::total_inserted);
    eprintln!(
        "timing: total_ms={} rows={} inserted={}",
        started_at.elapsed().as_millis(),
        rows,
        inserted
    );
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::staging::{CALL_EDGES, METHODS};
    use crate::store::GraphStore;

    fn write_descriptors(dir: &Path) -> PathBuf {
        let path = dir.join("app.json");
        let document = serde_json::json!({
            "classes": [{
                "name": "com.example.Task",
                "interfaces": ["java.io.Serializable"],
                "methods": [{
                    "name": "readObject",
                    "signature": "<com.example.Task: void readObject(java.io.ObjectInputStream)>",
                    "parameterTypes": ["java.io.ObjectInputStream"]
                }]
            }],
            "calls": [{
                "caller": "<com.example.Task: void readObject(java.io.ObjectInputStream)>",
                "callee": "<java.lang.Runtime: java.lang.Process exec(java.lang.String)>",
                "lineNumber": 7,
                "invokerType": "java.lang.Runtime",
                "dispatch": "virtual"
            }]
        });
        std::fs::write(&path, document.to_string()).expect("write descriptors");
        path
    }

    #[test]
    fn cli_parses_build_command() {
        let cli = Cli::try_parse_from([
            "gadgraph",
            "build",
            "--input",
            "app.json",
            "--database",
            "graph.db",
            "--batch-size",
            "10",
            "--timing",
        ])
        .expect("parse cli");

        assert!(cli.timing);
        assert!(matches!(
            cli.command,
            Command::Build { store: StoreArgs { batch_size: Some(10), .. }, .. }
        ));
    }

    #[test]
    fn extract_then_ingest_matches_build() {
        let dir = tempfile::tempdir().expect("temp dir");
        let input = write_descriptors(dir.path());
        let staging_dir = dir.path().join("staging");
        let database = dir.path().join("graph.db");

        let extract_cli = Cli::try_parse_from([
            "gadgraph",
            "extract",
            "--input",
            input.to_str().expect("utf-8 path"),
            "--staging-dir",
            staging_dir.to_str().expect("utf-8 path"),
        ])
        .expect("parse extract");
        run(extract_cli).expect("extract");
        let ingest_cli = Cli::try_parse_from([
            "gadgraph",
            "ingest",
            "--staging-dir",
            staging_dir.to_str().expect("utf-8 path"),
            "--database",
            database.to_str().expect("utf-8 path"),
        ])
        .expect("parse ingest");
        run(ingest_cli).expect("ingest");

        let staged = StagedBatch::read_from(&staging_dir).expect("read staging");
        let store = SqliteGraphStore::open(&database, &Config::default().store).expect("open");
        assert_eq!(1, store.count(&CALL_EDGES).expect("count calls"));
        assert_eq!(
            staged.table(&METHODS).expect("methods").rows.len(),
            store.count(&METHODS).expect("count methods")
        );
    }

    #[test]
    fn missing_input_is_reported() {
        let dir = tempfile::tempdir().expect("temp dir");
        let inputs = InputArgs {
            input: vec![dir.path().join("absent.json")],
            classpath: Vec::new(),
        };

        let error = extract_inputs(&inputs, &Config::default()).expect_err("missing input");

        assert!(error.to_string().contains("input not found"));
    }
}
