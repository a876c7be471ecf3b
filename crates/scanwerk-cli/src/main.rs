// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// Scanwerk command line.
//
// Queues every input photo, runs the batch, accepts each completed result
// (which writes it to disk), optionally collects the pages into one PDF, and
// prints a summary. Exit status is 0 when every document succeeded, 1 when
// some failed, and 2 on a setup error.

use std::path::{Path, PathBuf};
use std::process::ExitCode;
use std::sync::Arc;

use clap::Parser;
use scanwerk_core::error::{Result, ScanwerkError};
use scanwerk_core::human_errors::{humanize_error, humanize_kind};
use scanwerk_core::{DocumentStatus, OutputFormat, PageSize, ScanConfig};
use scanwerk_pipeline::PdfAssembler;
use scanwerk_queue::{
    DirectoryStore, QueueEvent, QueueHandle, QueueService, QueueSnapshot, ResultStore,
};
use tokio::sync::broadcast;
use tokio::sync::broadcast::error::RecvError;
use tracing::{debug, error, info, warn};

/// Extensions picked up when a directory is given as input.
const IMAGE_EXTENSIONS: &[&str] = &["jpg", "jpeg", "png", "tif", "tiff", "bmp", "webp"];

#[derive(Parser, Debug)]
#[command(name = "scanwerk", version)]
#[command(about = "Straighten and clean up photographed documents", long_about = None)]
struct Cli {
    /// Settings file (JSON). Missing files fall back to the defaults
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Write results under this directory instead of next to each photo
    #[arg(short, long)]
    output: Option<PathBuf>,

    /// Also collect every finished page into this PDF
    #[arg(long)]
    pdf: Option<PathBuf>,

    /// Output format: jpeg or png
    #[arg(short, long)]
    format: Option<String>,

    /// JPEG quality between 0.1 and 1.0
    #[arg(short, long)]
    quality: Option<f32>,

    /// Letterbox every result onto the configured page size
    #[arg(long)]
    uniform: bool,

    /// Photos, or directories of photos
    #[arg(required = true)]
    inputs: Vec<PathBuf>,
}

#[tokio::main]
async fn main() -> ExitCode {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .init();

    let cli = Cli::parse();
    match run(cli).await {
        Ok(true) => ExitCode::SUCCESS,
        Ok(false) => ExitCode::from(1),
        Err(err) => {
            error!(error = %err, "Scan run aborted");
            let human = humanize_error(&err);
            eprintln!("error: {}", human.message);
            eprintln!("       {}", human.suggestion);
            ExitCode::from(2)
        }
    }
}

/// Returns whether every document was processed.
async fn run(cli: Cli) -> Result<bool> {
    let config = effective_config(&cli)?;
    let sources = collect_inputs(&cli.inputs)?;
    if sources.is_empty() {
        return Err(ScanwerkError::Config("no input images found".into()));
    }
    info!(documents = sources.len(), format = ?config.output.format, "Starting scan run");

    let store: Arc<dyn ResultStore> = match &cli.output {
        Some(dir) => Arc::new(DirectoryStore::under(dir)),
        None => Arc::new(DirectoryStore::beside_source()),
    };
    let queue = QueueService::from_config(&config)
        .auto_start(false)
        .with_store(store)
        .spawn();
    let logger = tokio::spawn(log_events(queue.subscribe()));

    for path in sources {
        queue.enqueue_path(path).await?;
    }
    queue.start_batch().await?;
    queue.wait_idle().await?;

    confirm_all(&queue).await?;
    queue.wait_idle().await?;

    let snapshot = queue.snapshot().await?;
    if let Some(path) = &cli.pdf {
        export_pdf(&snapshot, path).await?;
    }
    queue.shutdown().await?;
    logger.abort();

    Ok(print_summary(&snapshot))
}

/// Load the settings file and apply command-line overrides.
fn effective_config(cli: &Cli) -> Result<ScanConfig> {
    let mut config = match &cli.config {
        Some(path) => ScanConfig::load_or_default(path)?,
        None => ScanConfig::default(),
    };
    if let Some(name) = &cli.format {
        config.output.format = OutputFormat::from_name(name)
            .ok_or_else(|| ScanwerkError::Config(format!("unknown output format: {name}")))?;
    }
    if let Some(quality) = cli.quality {
        config.output.jpeg_quality = quality;
    }
    if cli.uniform {
        config.output.uniform_size = true;
    }
    config.validate()?;
    Ok(config)
}

/// Expand directories (one level, sorted by name) into image files.
fn collect_inputs(inputs: &[PathBuf]) -> Result<Vec<PathBuf>> {
    let mut files = Vec::new();
    for input in inputs {
        if input.is_dir() {
            let mut found: Vec<PathBuf> = std::fs::read_dir(input)?
                .filter_map(|entry| entry.ok().map(|entry| entry.path()))
                .filter(|path| path.is_file() && has_image_extension(path))
                .collect();
            found.sort();
            debug!(dir = %input.display(), count = found.len(), "Directory expanded");
            files.extend(found);
        } else {
            files.push(input.clone());
        }
    }
    Ok(files)
}

fn has_image_extension(path: &Path) -> bool {
    path.extension()
        .and_then(|ext| ext.to_str())
        .is_some_and(|ext| IMAGE_EXTENSIONS.contains(&ext.to_ascii_lowercase().as_str()))
}

/// Walk the review flow, accepting every completed document in queue order.
async fn confirm_all(queue: &QueueHandle) -> Result<()> {
    let snapshot = queue.snapshot().await?;
    let Some(first) = snapshot
        .entries
        .iter()
        .find(|entry| entry.status == DocumentStatus::Completed)
    else {
        return Ok(());
    };

    queue.start_review(first.id).await?;
    let mut current = Some(first.id);
    while let Some(id) = current {
        current = queue.confirm_and_advance(id).await?;
    }
    Ok(())
}

async fn export_pdf(snapshot: &QueueSnapshot, path: &Path) -> Result<()> {
    let pages: Vec<_> = snapshot
        .entries
        .iter()
        .filter_map(|entry| entry.result.as_ref())
        .map(|result| (*result.raster).clone())
        .collect();
    if pages.is_empty() {
        warn!("No finished pages; PDF not written");
        return Ok(());
    }

    let path = path.to_path_buf();
    tokio::task::spawn_blocking(move || {
        PdfAssembler::new(PageSize::A4)
            .with_title("Scanwerk Scan")
            .write_to_file(&pages, &path)
    })
    .await
    .map_err(|err| ScanwerkError::Worker(format!("PDF export task: {err}")))?
}

async fn log_events(mut events: broadcast::Receiver<QueueEvent>) {
    loop {
        match events.recv().await {
            Ok(QueueEvent::BatchFinished { done, total }) => info!(done, total, "Batch finished"),
            Ok(QueueEvent::SaveFailed { id, message }) => warn!(%id, %message, "Save failed"),
            Ok(event) => debug!(?event, "Queue event"),
            Err(RecvError::Lagged(skipped)) => debug!(skipped, "Event log fell behind"),
            Err(RecvError::Closed) => break,
        }
    }
}

/// Print one line per document. Returns whether all of them succeeded.
fn print_summary(snapshot: &QueueSnapshot) -> bool {
    for entry in &snapshot.entries {
        match entry.status {
            DocumentStatus::Completed | DocumentStatus::Reviewing => {
                let target = entry
                    .saved_path
                    .as_ref()
                    .map(|path| path.display().to_string())
                    .unwrap_or_else(|| "not saved".into());
                println!("  done    {} -> {}", entry.name, target);
            }
            DocumentStatus::Failed => {
                let reason = entry
                    .error_kind
                    .map(humanize_kind)
                    .map(|human| format!("{} {}", human.message, human.suggestion))
                    .or_else(|| entry.error_message.clone())
                    .unwrap_or_default();
                println!("  failed  {}: {}", entry.name, reason);
            }
            status => println!("  {:<7} {}", status.display_name(), entry.name),
        }
    }

    let completed = snapshot.count(DocumentStatus::Completed);
    let failed = snapshot.count(DocumentStatus::Failed);
    println!("{completed} done, {failed} failed, {} total", snapshot.entries.len());
    failed == 0 && completed == snapshot.entries.len()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_flags_and_inputs() {
        let cli = Cli::try_parse_from([
            "scanwerk", "--format", "png", "-q", "0.8", "--pdf", "out.pdf", "a.jpg", "b.jpg",
        ])
        .expect("parse");
        assert_eq!(cli.inputs.len(), 2);
        assert_eq!(cli.pdf, Some(PathBuf::from("out.pdf")));

        let config = effective_config(&cli).expect("config");
        assert_eq!(config.output.format, OutputFormat::Png);
        assert_eq!(config.output.jpeg_quality, 0.8);
    }

    #[test]
    fn inputs_are_required() {
        assert!(Cli::try_parse_from(["scanwerk"]).is_err());
    }

    #[test]
    fn bad_overrides_are_rejected() {
        let cli = Cli::try_parse_from(["scanwerk", "--format", "gif", "a.jpg"]).expect("parse");
        assert!(matches!(effective_config(&cli), Err(ScanwerkError::Config(_))));

        let cli = Cli::try_parse_from(["scanwerk", "--quality", "4", "a.jpg"]).expect("parse");
        assert!(matches!(effective_config(&cli), Err(ScanwerkError::Config(_))));
    }

    #[test]
    fn directories_expand_to_sorted_images() {
        let dir = tempfile::tempdir().expect("tempdir");
        for name in ["b.PNG", "a.jpg", "notes.txt"] {
            std::fs::write(dir.path().join(name), b"x").expect("write");
        }
        let loose = PathBuf::from("/elsewhere/c.tif");

        let files = collect_inputs(&[dir.path().to_path_buf(), loose.clone()]).expect("collect");
        assert_eq!(
            files,
            vec![dir.path().join("a.jpg"), dir.path().join("b.PNG"), loose]
        );
    }
}
