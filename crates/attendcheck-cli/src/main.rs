// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// AttendCheck — attendance sheet photos to CSV attendance lists.
//
// Entry point. Initialises logging, loads settings, runs one batch over the
// input files, and writes the merged or per-file CSV.

mod input;

use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::Context;
use clap::Parser;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use attendcheck_batch::{BatchAggregator, DEFAULT_EXPORT_FILENAME, export_csv, export_split};
use attendcheck_core::AppConfig;
use attendcheck_core::human_errors::{humanize_error, humanize_warning};
use attendcheck_extract::Extractor;

use input::{SourceEngine, collect_inputs, read_inputs};

/// Command-line arguments
#[derive(Debug, Parser)]
#[command(name = "attendcheck", version)]
#[command(about = "Turn attendance sheet photos (or captured OCR token dumps) into a CSV attendance list")]
struct Args {
    /// Token dump (*.json), photo, or a directory of them
    input: PathBuf,

    /// Output directory
    #[arg(short, long, default_value = "results")]
    output: PathBuf,

    /// Write one `<name>_result.csv` per input file instead of one merged list
    #[arg(long)]
    split: bool,

    /// Keep one record per student ID across files (the most confident one)
    #[arg(long)]
    merge_duplicates: bool,

    /// Settings file (JSON); ATTENDCHECK_* environment variables override it
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Omit the UTF-8 byte order mark
    #[arg(long)]
    no_bom: bool,

    /// Directory holding the OCR models (defaults to ~/.cache/ocrs)
    #[cfg(feature = "ocr")]
    #[arg(long)]
    models: Option<PathBuf>,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .init();

    let args = Args::parse();
    info!(input = %args.input.display(), "AttendCheck starting");

    match run(args).await {
        Ok(()) => Ok(()),
        Err(err) => {
            if let Some(inner) = err.downcast_ref::<attendcheck_core::AttendCheckError>() {
                let human = humanize_error(inner);
                eprintln!("{}\n  {}", human.message, human.suggestion);
            }
            Err(err)
        }
    }
}

async fn run(args: Args) -> anyhow::Result<()> {
    let mut config = match &args.config {
        Some(path) => AppConfig::load(path)?,
        None => AppConfig::from_env()?,
    };
    if args.no_bom {
        config.export.bom = false;
    }

    let paths = collect_inputs(&args.input)?;
    let files = read_inputs(&paths)?;
    info!(files = files.len(), "inputs collected");

    let engine = build_engine(&args, &paths)?;
    let extractor = Extractor::new(&config.extractor)?;
    let aggregator = BatchAggregator::new(extractor, config.batch.clone())?;

    // Ctrl-C stops scheduling; files already being read still finish.
    let cancel = CancellationToken::new();
    let on_interrupt = cancel.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            warn!("interrupted, finishing files in progress");
            on_interrupt.cancel();
        }
    });

    let mut result = aggregator.analyze_images(engine, files, &cancel).await?;
    if args.merge_duplicates {
        result = result.merge_duplicates();
    }

    for warning in &result.warnings {
        let human = humanize_warning(warning);
        eprintln!("warning: {}\n  {}", human.message, human.suggestion);
    }

    std::fs::create_dir_all(&args.output)
        .with_context(|| format!("creating {}", args.output.display()))?;

    if args.split {
        let outputs = export_split(&result.students, &config.export)?;
        for (name, bytes) in &outputs {
            write_output(&args.output.join(name), bytes)?;
        }
        println!(
            "{} students from {} files saved as {} CSV files in {}",
            result.students.len(),
            result.files_processed,
            outputs.len(),
            args.output.display()
        );
    } else {
        let path = args.output.join(DEFAULT_EXPORT_FILENAME);
        write_output(&path, &export_csv(&result.students, &config.export)?)?;
        println!(
            "{} students from {} files saved to {}",
            result.students.len(),
            result.files_processed,
            path.display()
        );
    }
    Ok(())
}

#[cfg(feature = "ocr")]
fn build_engine(args: &Args, paths: &[PathBuf]) -> anyhow::Result<Arc<SourceEngine>> {
    use attendcheck_extract::{OcrConfig, OcrsEngine};

    if !paths.iter().any(|p| input::is_image(p)) {
        return Ok(Arc::new(SourceEngine::default()));
    }
    let ocr_config = match &args.models {
        Some(dir) => OcrConfig::from_dir(dir),
        None => OcrConfig::default(),
    };
    let engine = OcrsEngine::new(&ocr_config)?;
    Ok(Arc::new(SourceEngine::with_ocr(engine)))
}

#[cfg(not(feature = "ocr"))]
fn build_engine(_args: &Args, paths: &[PathBuf]) -> anyhow::Result<Arc<SourceEngine>> {
    if paths.iter().any(|p| input::is_image(p)) {
        warn!("built without the `ocr` feature; photos will be skipped");
    }
    Ok(Arc::new(SourceEngine::default()))
}

fn write_output(path: &Path, bytes: &[u8]) -> anyhow::Result<()> {
    std::fs::write(path, bytes).with_context(|| format!("writing {}", path.display()))
}
