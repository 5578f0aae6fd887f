//! smelter-ingest: Load markup, tag soup or JSON sources into relational tables
//!
//! Reads a JSON schema file, walks its sources and writes the resulting SQL
//! script (database and table definitions followed by one INSERT per row).
//!
//! Usage:
//!   # Fresh database, script to stdout
//!   smelter-ingest schema.json
//!
//!   # Write to a file
//!   smelter-ingest schema.json --output load.sql
//!
//!   # Add to an existing database whose highest document id is 1200
//!   smelter-ingest schema.json --append --high-water 1200

#[global_allocator]
static GLOBAL: mimalloc::MiMalloc = mimalloc::MiMalloc;

use anyhow::{Context, Result};
use clap::Parser;
use smelter::{Pipeline, SqlScriptSink, WriteMode};
use std::fs::File;
use std::io::{self, BufWriter, Write};
use std::path::PathBuf;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[derive(Parser, Debug)]
#[command(name = "smelter-ingest")]
#[command(about = "Extract rows from markup and JSON sources as a SQL script", long_about = None)]
struct Args {
    /// Schema file describing tables, columns and sources
    #[arg(value_name = "SCHEMA")]
    schema: PathBuf,

    /// Add to an existing database instead of recreating it
    #[arg(long)]
    append: bool,

    /// Highest document id already stored (used with --append)
    #[arg(long, value_name = "N", default_value_t = 0, requires = "append")]
    high_water: u64,

    /// Output file (stdout if omitted)
    #[arg(long, short = 'o', value_name = "FILE")]
    output: Option<PathBuf>,
}

fn main() -> Result<()> {
    tracing_subscriber::registry()
        .with(tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| "info".into()))
        .with(tracing_subscriber::fmt::layer().with_writer(io::stderr))
        .init();

    let args = Args::parse();

    let (schema, sources) = smelter::schema::load(&args.schema)
        .with_context(|| format!("Failed to load schema {}", args.schema.display()))?;

    let writer: Box<dyn Write> = match &args.output {
        Some(path) => Box::new(BufWriter::new(
            File::create(path).with_context(|| format!("Failed to create {}", path.display()))?,
        )),
        None => Box::new(BufWriter::new(io::stdout().lock())),
    };

    let mode = if args.append { WriteMode::Append } else { WriteMode::Create };
    let mut sink = SqlScriptSink::new(writer).with_high_water_mark(args.high_water);

    let report = Pipeline::new(&schema, &sources)
        .ingest(&mut sink, mode)
        .context("Ingestion failed")?;

    eprintln!(
        "✓ {} documents, {} rows from {} files ({} skipped)",
        report.documents,
        report.rows,
        report.files,
        report.skipped_files.len()
    );
    for path in &report.skipped_files {
        eprintln!("  skipped: {}", path.display());
    }

    Ok(())
}
