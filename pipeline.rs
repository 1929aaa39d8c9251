use crate::config::TaggerConfig;
use crate::db::{Batch, PhotoStore};
use crate::error::{Error, Result};
use crate::events::EventSink;
use crate::metadata;
use crate::models::{
    ExtractedMetadata, Phase, PhotoRecord, RunStatus, RunSummary, UNKNOWN_LOCATION,
};
use crate::scan;
use chrono::{DateTime, Datelike, Local, NaiveDateTime};
use crossbeam_channel::bounded;
use std::collections::HashMap;
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread;
use uuid::Uuid;

const SAMPLE_NOTES: usize = 3;

#[derive(Clone, Debug, Default)]
pub struct CancelToken {
    flag: Arc<AtomicBool>,
}

impl CancelToken {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.flag.store(true, Ordering::Relaxed);
    }

    pub fn is_cancelled(&self) -> bool {
        self.flag.load(Ordering::Relaxed)
    }
}

#[derive(Debug)]
struct Extraction {
    path: PathBuf,
    metadata: ExtractedMetadata,
}

/// Extraction workers never touch the database; only the coordinator writes.
pub struct TaggingPipeline {
    store: PhotoStore,
    sink: Arc<dyn EventSink>,
    config: TaggerConfig,
    cancel: CancelToken,
    run_id: String,
    phase: Phase,
}

impl TaggingPipeline {
    pub fn new(
        store: PhotoStore,
        sink: Arc<dyn EventSink>,
        config: TaggerConfig,
        cancel: CancelToken,
    ) -> Self {
        Self {
            store,
            sink,
            config: config.normalized(),
            cancel,
            run_id: Uuid::new_v4().to_string(),
            phase: Phase::Idle,
        }
    }

    pub fn with_run_id(mut self, run_id: impl Into<String>) -> Self {
        self.run_id = run_id.into();
        self
    }

    pub fn run(mut self, root: &Path) -> RunSummary {
        let mut summary = RunSummary::new(self.run_id.clone());
        let status = match self.execute(root, &mut summary) {
            Ok(status) => status,
            Err(err) => {
                let message = format!("Fatal error: {err}");
                log::error!("[{}] {}", self.run_id, message);
                self.sink.on_log(&message);
                RunStatus::Failed
            }
        };
        summary.status = status;
        self.enter(status.into());
        self.sink.on_finished(&summary);
        summary
    }

    fn enter(&mut self, phase: Phase) {
        log::info!("[{}] {:?} -> {:?}", self.run_id, self.phase, phase);
        self.phase = phase;
        self.sink.on_phase(phase);
    }

    fn execute(&mut self, root: &Path, summary: &mut RunSummary) -> Result<RunStatus> {
        self.store.ensure_schema()?;

        self.enter(Phase::Scanning);
        self.sink
            .on_log(&format!("Scanning folder: {}", root.display()));
        let Some(paths) = scan::discover_images(root, &self.cancel)? else {
            self.sink.on_log("Operation cancelled.");
            return Ok(RunStatus::Cancelled);
        };
        summary.discovered = paths.len();
        if paths.is_empty() {
            self.sink.on_log("No image files found.");
            return Ok(RunStatus::Completed);
        }
        self.sink
            .on_log(&format!("Found {} image files.", paths.len()));
        if self.cancel.is_cancelled() {
            self.sink.on_log("Operation cancelled.");
            return Ok(RunStatus::Cancelled);
        }

        self.enter(Phase::Extracting);
        let extracted = self.extract_all(paths, summary);
        self.report_coverage(&extracted, summary);
        if self.cancel.is_cancelled() {
            self.sink.on_log("Operation cancelled.");
            return Ok(RunStatus::Cancelled);
        }

        self.enter(Phase::Persisting);
        self.persist_all(&extracted, summary)
    }

    fn extract_all(&self, paths: Vec<PathBuf>, summary: &mut RunSummary) -> Vec<Extraction> {
        let total = paths.len();
        let workers = self.config.workers.min(total).max(1);
        let (job_tx, job_rx) = bounded::<PathBuf>(workers * 2);
        let (result_tx, result_rx) = bounded::<(PathBuf, Result<ExtractedMetadata>)>(workers * 2);
        let cancel = &self.cancel;
        let mut extracted = Vec::with_capacity(total);

        thread::scope(|scope| {
            scope.spawn(move || {
                for path in paths {
                    if cancel.is_cancelled() || job_tx.send(path).is_err() {
                        break;
                    }
                }
            });

            for _ in 0..workers {
                let rx = job_rx.clone();
                let tx = result_tx.clone();
                scope.spawn(move || {
                    for path in rx.iter() {
                        if cancel.is_cancelled() {
                            break;
                        }
                        let result = extract_one(&path);
                        if tx.send((path, result)).is_err() {
                            break;
                        }
                    }
                });
            }
            drop(job_rx);
            drop(result_tx);

            let mut completed = 0;
            for (path, result) in result_rx.iter() {
                completed += 1;
                match result {
                    Ok(metadata) => extracted.push(Extraction { path, metadata }),
                    Err(err) => {
                        summary.skipped += 1;
                        let message = format!("Error reading {}: {}", path.display(), err);
                        log::warn!("{message}");
                        self.sink.on_log(&message);
                    }
                }
                self.sink.on_progress(Phase::Extracting, completed, total);
            }
        });

        extracted
    }

    fn report_coverage(&self, extracted: &[Extraction], summary: &mut RunSummary) {
        let missing: Vec<&Extraction> = extracted
            .iter()
            .filter(|e| e.metadata.location.is_none())
            .collect();
        summary.with_location = extracted.len() - missing.len();
        self.sink.on_log(&format!(
            "GPS data found: {} images, Missing: {} images",
            summary.with_location,
            missing.len()
        ));

        for item in extracted {
            log::debug!(
                "{}: {:?} {}",
                item.path.display(),
                item.metadata.date_source,
                item.metadata.notes.join(" | ")
            );
        }
        if missing.is_empty() {
            return;
        }
        self.sink.on_log("Sample EXIF extraction details:");
        for item in missing.iter().take(SAMPLE_NOTES) {
            let name = item
                .path
                .file_name()
                .map(|n| n.to_string_lossy().to_string())
                .unwrap_or_default();
            self.sink
                .on_log(&format!("  {}: {}", name, item.metadata.notes.join(" | ")));
        }
    }

    fn persist_all(&mut self, extracted: &[Extraction], summary: &mut RunSummary) -> Result<RunStatus> {
        let total = extracted.len();
        let mut tag_cache: HashMap<String, i64> = HashMap::new();
        let mut committed = 0;

        for (index, chunk) in extracted.chunks(self.config.batch_size).enumerate() {
            if self.cancel.is_cancelled() {
                self.sink.on_log(&format!(
                    "Operation cancelled; {committed} of {total} photos were committed."
                ));
                summary.tags_used = tag_cache.len();
                return Ok(RunStatus::Cancelled);
            }

            let mut batch = self.store.begin_batch()?;
            let created = match write_batch(&mut batch, chunk, &mut tag_cache) {
                Ok(created) => created,
                Err(err) => {
                    if let Err(rollback_err) = batch.rollback() {
                        log::warn!("Rollback of batch {} failed: {}", index + 1, rollback_err);
                    }
                    self.sink.on_log(&format!(
                        "Batch {} of {} photos rolled back.",
                        index + 1,
                        chunk.len()
                    ));
                    return Err(err);
                }
            };
            let staged = batch.staged();
            batch.commit()?;

            committed += staged;
            summary.photos_processed = committed;
            summary.tags_created += created;
            log::debug!("[{}] committed batch {} ({committed}/{total})", self.run_id, index + 1);
            self.sink.on_progress(Phase::Persisting, committed, total);
        }

        summary.tags_used = tag_cache.len();
        self.sink.on_log(&format!(
            "Tagging complete! {} photos, {} unique tags.",
            summary.photos_processed, summary.tags_used
        ));
        Ok(RunStatus::Completed)
    }
}

fn extract_one(path: &Path) -> Result<ExtractedMetadata> {
    match catch_unwind(AssertUnwindSafe(|| metadata::read_metadata(path))) {
        Ok(result) => result,
        Err(_) => Err(Error::ExtractionPanic(path.to_path_buf())),
    }
}

/// Returns how many tag rows were newly inserted.
fn write_batch(
    batch: &mut Batch<'_>,
    chunk: &[Extraction],
    tag_cache: &mut HashMap<String, i64>,
) -> Result<usize> {
    let mut created = 0;
    for item in chunk {
        let photo = photo_record(item);
        let photo_id = batch.upsert_photo(&photo)?;
        for name in [year_tag(&photo.created_at), photo.location.clone()] {
            let tag_id = match tag_cache.get(&name) {
                Some(id) => *id,
                None => {
                    let (id, was_created) = batch.get_or_create_tag(&name)?;
                    if was_created {
                        created += 1;
                    }
                    tag_cache.insert(name, id);
                    id
                }
            };
            batch.link_photo_tag(photo_id, tag_id)?;
        }
    }
    Ok(created)
}

fn photo_record(item: &Extraction) -> PhotoRecord {
    PhotoRecord {
        id: None,
        path: item.path.to_string_lossy().to_string(),
        file_name: item
            .path
            .file_name()
            .map(|n| n.to_string_lossy().to_string())
            .unwrap_or_default(),
        created_at: item.metadata.created_at.clone(),
        location: item
            .metadata
            .location
            .clone()
            .unwrap_or_else(|| UNKNOWN_LOCATION.to_string()),
        rotation: 0,
    }
}

pub fn year_tag(created_at: &str) -> String {
    if let Some(year) = created_at.get(..4) {
        if year.bytes().all(|b| b.is_ascii_digit()) {
            return year.to_string();
        }
    }
    let trimmed = created_at.trim();
    let parsed = NaiveDateTime::parse_from_str(trimmed, metadata::TIMESTAMP_FORMAT)
        .map(|dt| dt.year())
        .or_else(|_| DateTime::parse_from_rfc3339(trimmed).map(|dt| dt.year()));
    let year = match parsed {
        Ok(year) => year,
        Err(_) => {
            let year = Local::now().year();
            log::warn!("Cannot read a year from {created_at:?}; tagging as {year}");
            year
        }
    };
    format!("{year:04}")
}
