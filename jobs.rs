use crate::config::{LibraryPaths, TaggerConfig};
use crate::db::Library;
use crate::error::{Error, Result};
use crate::events::EventSink;
use crate::models::{Phase, RunStatus, RunSummary};
use crate::pipeline::{CancelToken, TaggingPipeline};
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::thread;
use uuid::Uuid;

#[derive(Clone, Default)]
pub struct JobManager {
    inner: Arc<JobManagerInner>,
}

#[derive(Default)]
struct JobManagerInner {
    config: TaggerConfig,
    active: Mutex<HashMap<PathBuf, JobHandle>>,
}

#[derive(Clone)]
struct JobHandle {
    id: String,
    cancel: CancelToken,
}

pub struct RunHandle {
    run_id: String,
    folder: PathBuf,
    thread: thread::JoinHandle<RunSummary>,
}

impl RunHandle {
    pub fn run_id(&self) -> &str {
        &self.run_id
    }

    pub fn folder(&self) -> &Path {
        &self.folder
    }

    pub fn join(self) -> Result<RunSummary> {
        self.thread
            .join()
            .map_err(|_| Error::Init(format!("Tagging run {} panicked", self.run_id)))
    }
}

impl JobManager {
    pub fn new(config: TaggerConfig) -> Self {
        Self {
            inner: Arc::new(JobManagerInner {
                config: config.normalized(),
                active: Mutex::new(HashMap::new()),
            }),
        }
    }

    pub fn start(&self, folder: &Path, sink: Arc<dyn EventSink>) -> Result<RunHandle> {
        let paths = match LibraryPaths::discover(folder, &self.inner.config) {
            Ok(paths) => paths,
            Err(err) => {
                sink.on_log(&format!("Cannot start tagging: {err}"));
                return Err(err);
            }
        };

        let run_id = Uuid::new_v4().to_string();
        let cancel = CancelToken::new();
        {
            let mut active = lock(&self.inner.active);
            if active.contains_key(&paths.root) {
                let message = format!(
                    "A tagging run is already active for {}; ignoring start.",
                    paths.root.display()
                );
                log::warn!("{message}");
                sink.on_log(&message);
                return Err(Error::AlreadyRunning(paths.root));
            }
            active.insert(
                paths.root.clone(),
                JobHandle {
                    id: run_id.clone(),
                    cancel: cancel.clone(),
                },
            );
        }

        let folder = paths.root.clone();
        let manager = self.clone();
        let config = self.inner.config.clone();
        let job_id = run_id.clone();
        let spawned = thread::Builder::new()
            .name(format!("autotagger-{}", &run_id[..8]))
            .spawn(move || {
                let root = paths.root.clone();
                let summary = run_job(paths, config, sink, cancel, job_id.clone());
                manager.finish_job(&root, &job_id);
                summary
            });

        match spawned {
            Ok(thread) => Ok(RunHandle {
                run_id,
                folder,
                thread,
            }),
            Err(err) => {
                self.finish_job(&folder, &run_id);
                Err(err.into())
            }
        }
    }

    /// Cancels every active run.
    pub fn cancel(&self) -> Result<()> {
        let active = lock(&self.inner.active);
        if active.is_empty() {
            return Err(Error::Init("No tagging run active".into()));
        }
        for handle in active.values() {
            log::info!("Cancelling run {}", handle.id);
            handle.cancel.cancel();
        }
        Ok(())
    }

    pub fn is_running(&self, folder: &Path) -> bool {
        folder
            .canonicalize()
            .map(|root| lock(&self.inner.active).contains_key(&root))
            .unwrap_or(false)
    }

    fn finish_job(&self, root: &Path, job_id: &str) {
        let mut active = lock(&self.inner.active);
        if active.get(root).is_some_and(|handle| handle.id == job_id) {
            active.remove(root);
        }
    }
}

fn run_job(
    paths: LibraryPaths,
    config: TaggerConfig,
    sink: Arc<dyn EventSink>,
    cancel: CancelToken,
    run_id: String,
) -> RunSummary {
    sink.on_log(&format!(
        "Connecting to database: {}",
        paths.db_path.display()
    ));
    let root = paths.root.clone();
    let store = match Library::open(paths).and_then(|library| library.store()) {
        Ok(store) => store,
        Err(err) => {
            let message = format!("Fatal error: cannot open catalog: {err}");
            log::error!("[{run_id}] {message}");
            sink.on_log(&message);
            let mut summary = RunSummary::new(run_id);
            summary.status = RunStatus::Failed;
            sink.on_phase(Phase::Failed);
            sink.on_finished(&summary);
            return summary;
        }
    };

    TaggingPipeline::new(store, sink, config, cancel)
        .with_run_id(run_id)
        .run(&root)
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}
