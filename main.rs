mod config;
mod db;
mod error;
mod events;
mod jobs;
mod metadata;
mod models;
mod pipeline;
mod scan;
mod schema;
#[cfg(test)]
mod test_support;

use crate::config::{LibraryPaths, Settings};
use crate::db::Library;
use crate::error::{Error, Result};
use crate::events::{ChannelSink, EventSink, FanoutSink, LogSink};
use crate::jobs::JobManager;
use crate::models::{Phase, PhotoRecord, PipelineEvent, RunStatus, RunSummary, TagRecord};
use clap::{Parser, Subcommand};
use crossbeam_channel::Receiver;
use rusqlite::Connection;
use std::path::{Path, PathBuf};
use std::process::ExitCode;
use std::sync::Arc;
use std::thread;

#[derive(Parser, Debug)]
#[command(name = "autotagger", version, about = "Tag a photo folder by year and GPS location")]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Scan a folder and tag every image in its catalog.
    Scan {
        folder: PathBuf,
        /// Concurrent EXIF extraction workers.
        #[arg(long)]
        workers: Option<usize>,
        /// Photos written per transaction.
        #[arg(long)]
        batch_size: Option<usize>,
        /// JSON settings file.
        #[arg(long)]
        config: Option<PathBuf>,
        /// Print the run summary as JSON.
        #[arg(long)]
        json: bool,
    },
    /// List the tags stored in a folder's catalog.
    Tags {
        folder: PathBuf,
        /// Show the tags of one photo instead of the whole catalog.
        #[arg(long)]
        photo: Option<PathBuf>,
        #[arg(long)]
        config: Option<PathBuf>,
        #[arg(long)]
        json: bool,
    },
}

#[tokio::main]
async fn main() -> ExitCode {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let cli = Cli::parse();
    let outcome = match cli.command {
        Command::Scan {
            folder,
            workers,
            batch_size,
            config,
            json,
        } => scan(folder, workers, batch_size, config, json).await,
        Command::Tags {
            folder,
            photo,
            config,
            json,
        } => tags(folder, photo, config, json),
    };

    match outcome {
        Ok(code) => code,
        Err(err) => {
            log::error!("{err}");
            ExitCode::FAILURE
        }
    }
}

async fn scan(
    folder: PathBuf,
    workers: Option<usize>,
    batch_size: Option<usize>,
    config: Option<PathBuf>,
    json: bool,
) -> Result<ExitCode> {
    let mut settings = Settings::load(config.as_deref())?;
    if let Some(workers) = workers {
        settings.tagger.workers = workers;
    }
    if let Some(batch_size) = batch_size {
        settings.tagger.batch_size = batch_size;
    }

    let manager = JobManager::new(settings.tagger);
    let (tx, rx) = crossbeam_channel::unbounded();
    let sink: Arc<dyn EventSink> = Arc::new(FanoutSink::new(vec![
        Arc::new(LogSink),
        Arc::new(ChannelSink::new(tx)),
    ]));
    let renderer = thread::Builder::new()
        .name("autotagger-events".into())
        .spawn(move || render_events(rx))?;

    let handle = manager.start(&folder, sink)?;
    let root = handle.folder().to_path_buf();
    log::info!("Run {} started for {}", handle.run_id(), root.display());

    let join = tokio::task::spawn_blocking(move || handle.join());
    tokio::pin!(join);
    let joined = tokio::select! {
        joined = &mut join => joined,
        _ = tokio::signal::ctrl_c() => {
            if manager.is_running(&root) {
                log::warn!("Interrupted; cancelling after the current batch.");
                if let Err(err) = manager.cancel() {
                    log::debug!("{err}");
                }
            }
            join.await
        }
    };
    let summary = joined.map_err(|e| Error::Init(format!("Task join error: {e}")))??;

    if renderer.join().is_err() {
        log::warn!("Event renderer stopped unexpectedly");
    }

    if json {
        println!("{}", serde_json::to_string_pretty(&summary)?);
    } else {
        print_summary(&summary);
    }

    Ok(match summary.status {
        RunStatus::Failed => ExitCode::FAILURE,
        RunStatus::Completed | RunStatus::Cancelled => ExitCode::SUCCESS,
    })
}

fn render_events(rx: Receiver<PipelineEvent>) {
    let mut last_percent = None;
    for event in rx {
        match event {
            PipelineEvent::Phase { .. } => last_percent = None,
            PipelineEvent::Progress {
                phase,
                current,
                total,
            } => {
                let percent = if total == 0 { 100 } else { current * 100 / total };
                // One line per ten percent keeps large folders readable.
                let bucket = percent / 10;
                if last_percent != Some(bucket) || current == total {
                    last_percent = Some(bucket);
                    eprintln!("   {phase}: {current}/{total} ({percent}%)");
                }
            }
            PipelineEvent::Log { .. } | PipelineEvent::Finished { .. } => {}
        }
    }
}

fn print_summary(summary: &RunSummary) {
    println!("Run {}: {}", summary.run_id, Phase::from(summary.status));
    println!("  discovered       {}", summary.discovered);
    println!("  photos processed {}", summary.photos_processed);
    println!("  skipped          {}", summary.skipped);
    println!("  with location    {}", summary.with_location);
    println!("  tags created     {}", summary.tags_created);
    println!("  tags used        {}", summary.tags_used);
}

fn open_catalog(folder: &Path, config: Option<&Path>) -> Result<Library> {
    let settings = Settings::load(config)?;
    let paths = LibraryPaths::discover(folder, &settings.tagger)?;
    if !paths.db_path.exists() {
        return Err(Error::Path(format!(
            "No catalog in {}; run `autotagger scan` first",
            paths.root.display()
        )));
    }
    Library::open(paths)
}

/// Looks a photo up by the path it was scanned under. Only the parent folder
/// is canonicalised so symlinked files keep their own name.
fn photo_tags(conn: &Connection, photo: &Path) -> Result<(PhotoRecord, Vec<TagRecord>)> {
    let name = photo
        .file_name()
        .ok_or_else(|| Error::Path(format!("Not a file: {}", photo.display())))?;
    let parent = match photo.parent() {
        Some(parent) if !parent.as_os_str().is_empty() => parent,
        _ => Path::new("."),
    };
    let path = parent.canonicalize()?.join(name);
    let Some(record) = db::get_photo_by_path(conn, &path.to_string_lossy())? else {
        return Err(Error::Path(format!("Not in catalog: {}", path.display())));
    };
    let tags = match record.id {
        Some(id) => db::tags_for_photo(conn, id)?,
        None => Vec::new(),
    };
    Ok((record, tags))
}

fn tags(
    folder: PathBuf,
    photo: Option<PathBuf>,
    config: Option<PathBuf>,
    json: bool,
) -> Result<ExitCode> {
    let library = open_catalog(&folder, config.as_deref())?;
    let conn = library.connection()?;

    if let Some(photo) = photo {
        let (record, tags) = photo_tags(&conn, &photo)?;
        if json {
            let body = serde_json::json!({ "photo": record, "tags": tags });
            println!("{}", serde_json::to_string_pretty(&body)?);
        } else {
            println!("{} ({})", record.path, record.created_at);
            for tag in tags {
                println!("  {}", tag.name);
            }
        }
        return Ok(ExitCode::SUCCESS);
    }

    let stats = library.stats()?;
    let tags = db::list_tags(&conn)?;

    if json {
        let body = serde_json::json!({ "stats": stats, "tags": tags });
        println!("{}", serde_json::to_string_pretty(&body)?);
        return Ok(ExitCode::SUCCESS);
    }

    println!(
        "{} photos, {} tags, {} links in {}",
        stats.photos,
        stats.tags,
        stats.links,
        library.paths().db_path.display()
    );
    for tag in tags {
        println!("{:>6}  {}", tag.photos, tag.name);
    }
    Ok(ExitCode::SUCCESS)
}
