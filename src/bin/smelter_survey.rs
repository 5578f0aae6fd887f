//! smelter-survey: Explore the structure of a corpus before writing a schema
//!
//! By default every document root of every source is profiled and one line
//! per structural path is printed with its per-document min/max counts, its
//! total count and its longest text.
//!
//! Usage:
//!   # Path statistics, namespaces and http attribute values abbreviated
//!   smelter-survey schema.json
//!
//!   # Full path keys
//!   smelter-survey schema.json --verbose-paths
//!
//!   # Indented outline of each document, with text
//!   smelter-survey schema.json --tree-text
//!
//!   # Every element matching a path, with its position and subtree
//!   smelter-survey schema.json --find './/Author[@ValidYN]'

#[global_allocator]
static GLOBAL: mimalloc::MiMalloc = mimalloc::MiMalloc;

use anyhow::{Context, Result};
use clap::Parser;
use smelter::document::{dump, CasedPath};
use smelter::{PathProfiler, Pipeline};
use std::io::{self, BufWriter, Write};
use std::path::PathBuf;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[derive(Parser, Debug)]
#[command(name = "smelter-survey")]
#[command(about = "Profile element paths or dump document trees of a corpus", long_about = None)]
struct Args {
    /// Schema file naming the sources (tables are not needed)
    #[arg(value_name = "SCHEMA")]
    schema: PathBuf,

    /// Print path keys unabbreviated
    #[arg(long)]
    verbose_paths: bool,

    /// Shallowest level at which attributes become part of a path
    #[arg(long, value_name = "LEVEL", default_value_t = 1)]
    min_attribute_level: usize,

    /// Print an outline of every document
    #[arg(long, conflicts_with_all = ["tree_text", "paths", "find"])]
    tree: bool,

    /// Print an outline of every document, with text
    #[arg(long, conflicts_with_all = ["paths", "find"])]
    tree_text: bool,

    /// Print the positional path of every element
    #[arg(long, conflicts_with = "find")]
    paths: bool,

    /// Print every element matching this path below each document root
    #[arg(long, value_name = "PATH")]
    find: Option<String>,
}

fn main() -> Result<()> {
    tracing_subscriber::registry()
        .with(tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| "info".into()))
        .with(tracing_subscriber::fmt::layer().with_writer(io::stderr))
        .init();

    let args = Args::parse();

    let (schema, sources) = smelter::schema::load(&args.schema)
        .with_context(|| format!("Failed to load schema {}", args.schema.display()))?;
    let pipeline = Pipeline::new(&schema, &sources);

    let stdout = io::stdout();
    let mut out = BufWriter::new(stdout.lock());

    if let Some(expr) = &args.find {
        let path = CasedPath::compile(expr).with_context(|| format!("Invalid path {expr}"))?;
        pipeline.for_each_document(|file, document, roots| {
            let path = path.for_case(document.tag_case);
            for root in roots {
                for found in path.find_all(root) {
                    let position = dump::path_of(&document.root, found).unwrap_or_default();
                    writeln!(out, "{}: {}", file.display(), position)?;
                    dump::write_outline(found, true, &mut out)?;
                }
            }
            Ok(())
        })?;
    } else if args.tree || args.tree_text || args.paths {
        pipeline.for_each_document(|file, _, roots| {
            writeln!(out, "==> {}", file.display())?;
            for root in roots {
                if args.paths {
                    dump::write_paths(root, &mut out)?;
                } else {
                    dump::write_outline(root, args.tree_text, &mut out)?;
                }
            }
            Ok(())
        })?;
    } else {
        let mut profiler = PathProfiler::new().with_min_attribute_level(args.min_attribute_level);
        let report = pipeline.profile(&mut profiler)?;
        profiler.write_report(&mut out, !args.verbose_paths)?;
        eprintln!(
            "✓ {} documents from {} files ({} skipped), {} distinct paths",
            report.documents,
            report.files,
            report.skipped_files.len(),
            profiler.stats().count()
        );
    }

    out.flush()?;
    Ok(())
}
