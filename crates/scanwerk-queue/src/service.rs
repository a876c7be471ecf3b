// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// Async front end for the batch queue.
//
// A single actor task owns the `Orchestrator`. Callers talk to it through a
// cloneable `QueueHandle`; every request is answered once the resulting state
// change has been applied. Source loading, pipeline runs and result writes
// happen on spawned tasks (CPU-heavy parts on the blocking pool) and report
// back to the actor over an internal channel, so the actor never blocks.

use std::path::PathBuf;
use std::sync::Arc;

use scanwerk_core::config::ScanConfig;
use scanwerk_core::error::{Result, ScanwerkError};
use scanwerk_core::{DocumentId, DocumentStatus, Point};
use scanwerk_pipeline::{ProcessingOutput, ProcessingPipeline};
use tokio::sync::{broadcast, mpsc, oneshot, watch};
use tracing::{debug, info, warn};

use crate::entry::{DocumentEntry, DocumentResult};
use crate::events::QueueEvent;
use crate::indexer::{DocumentIndexer, NoopIndexer};
use crate::orchestrator::{Job, JobMode, Orchestrator, QueueSnapshot};
use crate::source::{LoadedSource, SourceLocation, load_source};
use crate::store::{DirectoryStore, ResultStore};

const COMMAND_CAPACITY: usize = 64;
const EVENT_CAPACITY: usize = 256;

// -- Builder --------------------------------------------------------------

/// Configures and starts the queue actor.
pub struct QueueService {
    pipeline: Arc<ProcessingPipeline>,
    indexer: Arc<dyn DocumentIndexer>,
    store: Arc<dyn ResultStore>,
    auto_start: bool,
}

impl QueueService {
    pub fn new(pipeline: ProcessingPipeline) -> Self {
        Self {
            pipeline: Arc::new(pipeline),
            indexer: Arc::new(NoopIndexer),
            store: Arc::new(DirectoryStore::beside_source()),
            auto_start: false,
        }
    }

    /// Pipeline and auto-start setting from `config`.
    pub fn from_config(config: &ScanConfig) -> Self {
        Self::new(ProcessingPipeline::from_config(config)).auto_start(config.auto_processing)
    }

    pub fn with_indexer(mut self, indexer: Arc<dyn DocumentIndexer>) -> Self {
        self.indexer = indexer;
        self
    }

    pub fn with_store(mut self, store: Arc<dyn ResultStore>) -> Self {
        self.store = store;
        self
    }

    /// Start a batch as soon as something is enqueued.
    pub fn auto_start(mut self, enabled: bool) -> Self {
        self.auto_start = enabled;
        self
    }

    /// Spawn the actor on the current tokio runtime.
    pub fn spawn(self) -> QueueHandle {
        let (command_tx, command_rx) = mpsc::channel(COMMAND_CAPACITY);
        let (internal_tx, internal_rx) = mpsc::unbounded_channel();
        let (events, _) = broadcast::channel(EVENT_CAPACITY);
        let (busy_tx, busy_rx) = watch::channel(false);

        let actor = Actor {
            orchestrator: Orchestrator::new(events.clone()),
            pipeline: self.pipeline,
            indexer: self.indexer,
            store: self.store,
            auto_start: self.auto_start,
            internal_tx,
            busy_tx,
            pending_io: 0,
        };
        tokio::spawn(actor.run(command_rx, internal_rx));

        QueueHandle {
            commands: command_tx,
            events,
            busy: busy_rx,
        }
    }
}

// -- Handle ---------------------------------------------------------------

/// Cheap, cloneable access to a running queue.
#[derive(Clone)]
pub struct QueueHandle {
    commands: mpsc::Sender<Command>,
    events: broadcast::Sender<QueueEvent>,
    busy: watch::Receiver<bool>,
}

impl QueueHandle {
    async fn request<T>(&self, make: impl FnOnce(oneshot::Sender<T>) -> Command) -> Result<T> {
        let (reply, response) = oneshot::channel();
        self.commands
            .send(make(reply))
            .await
            .map_err(|_| ScanwerkError::ServiceStopped)?;
        response.await.map_err(|_| ScanwerkError::ServiceStopped)
    }

    pub async fn enqueue(&self, source: SourceLocation) -> Result<DocumentId> {
        self.request(|reply| Command::Enqueue { source, reply }).await
    }

    pub async fn enqueue_path(&self, path: impl Into<PathBuf>) -> Result<DocumentId> {
        self.enqueue(SourceLocation::Path(path.into())).await
    }

    pub async fn start_batch(&self) -> Result<()> {
        self.request(|reply| Command::StartBatch { reply }).await
    }

    pub async fn stop_processing(&self) -> Result<()> {
        self.request(|reply| Command::Stop { reply }).await
    }

    /// Run one document again. Empty `corners` re-runs detection.
    pub async fn reprocess(&self, id: DocumentId, corners: Vec<Point>) -> Result<()> {
        self.request(|reply| Command::Reprocess { id, corners, reply })
            .await?
    }

    pub async fn start_review(&self, id: DocumentId) -> Result<()> {
        self.request(|reply| Command::StartReview { id, reply }).await?
    }

    /// Confirm the reviewed result, persist it in the background, and return
    /// the document now under review.
    pub async fn confirm_and_advance(&self, id: DocumentId) -> Result<Option<DocumentId>> {
        self.request(|reply| Command::Confirm { id, reply }).await?
    }

    pub async fn remove(&self, id: DocumentId) -> Result<()> {
        self.request(|reply| Command::Remove { id, reply }).await?
    }

    pub async fn clear(&self) -> Result<()> {
        self.request(|reply| Command::Clear { reply }).await
    }

    pub async fn snapshot(&self) -> Result<QueueSnapshot> {
        self.request(|reply| Command::Snapshot { reply }).await
    }

    pub fn subscribe(&self) -> broadcast::Receiver<QueueEvent> {
        self.events.subscribe()
    }

    /// True while loading, processing or saving is outstanding.
    pub fn is_busy(&self) -> bool {
        *self.busy.borrow()
    }

    /// Resolve once no loading, processing or saving is outstanding.
    pub async fn wait_idle(&self) -> Result<()> {
        let mut busy = self.busy.clone();
        busy.wait_for(|busy| !*busy)
            .await
            .map(|_| ())
            .map_err(|_| ScanwerkError::ServiceStopped)
    }

    /// Cancel running work and stop the actor.
    pub async fn shutdown(&self) -> Result<()> {
        self.commands
            .send(Command::Shutdown)
            .await
            .map_err(|_| ScanwerkError::ServiceStopped)
    }
}

// -- Actor ----------------------------------------------------------------

enum Command {
    Enqueue {
        source: SourceLocation,
        reply: oneshot::Sender<DocumentId>,
    },
    StartBatch {
        reply: oneshot::Sender<()>,
    },
    Stop {
        reply: oneshot::Sender<()>,
    },
    Reprocess {
        id: DocumentId,
        corners: Vec<Point>,
        reply: oneshot::Sender<Result<()>>,
    },
    StartReview {
        id: DocumentId,
        reply: oneshot::Sender<Result<()>>,
    },
    Confirm {
        id: DocumentId,
        reply: oneshot::Sender<Result<Option<DocumentId>>>,
    },
    Remove {
        id: DocumentId,
        reply: oneshot::Sender<Result<()>>,
    },
    Clear {
        reply: oneshot::Sender<()>,
    },
    Snapshot {
        reply: oneshot::Sender<QueueSnapshot>,
    },
    Shutdown,
}

/// Reports from spawned tasks back to the actor.
enum Internal {
    Loaded {
        id: DocumentId,
        result: Result<LoadedSource>,
    },
    Progress {
        id: DocumentId,
        attempt: u64,
        progress: f32,
    },
    Finished {
        id: DocumentId,
        attempt: u64,
        result: Result<ProcessingOutput>,
    },
    Persisted {
        id: DocumentId,
        result: Result<PathBuf>,
    },
}

struct Actor {
    orchestrator: Orchestrator,
    pipeline: Arc<ProcessingPipeline>,
    indexer: Arc<dyn DocumentIndexer>,
    store: Arc<dyn ResultStore>,
    auto_start: bool,
    internal_tx: mpsc::UnboundedSender<Internal>,
    busy_tx: watch::Sender<bool>,
    /// Source loads and result writes still outstanding.
    pending_io: usize,
}

impl Actor {
    async fn run(
        mut self,
        mut commands: mpsc::Receiver<Command>,
        mut internal: mpsc::UnboundedReceiver<Internal>,
    ) {
        info!(auto_start = self.auto_start, "Queue service started");
        loop {
            tokio::select! {
                command = commands.recv() => {
                    match command {
                        Some(Command::Shutdown) | None => break,
                        Some(command) => self.handle_command(command),
                    }
                }
                Some(message) = internal.recv() => {
                    self.handle_internal(message);
                    self.publish_busy();
                }
            }
        }

        self.orchestrator.stop_processing();
        self.busy_tx.send_replace(false);
        info!("Queue service stopped");
    }

    fn handle_command(&mut self, command: Command) {
        match command {
            Command::Enqueue { source, reply } => {
                let id = self.orchestrator.enqueue(source.clone());
                self.index(id);
                self.spawn_load(id, source);
                if self.auto_start {
                    if let Some(job) = self.orchestrator.start_batch() {
                        self.run_job(job);
                    }
                }
                self.publish_busy();
                let _ = reply.send(id);
            }
            Command::StartBatch { reply } => {
                if let Some(job) = self.orchestrator.start_batch() {
                    self.run_job(job);
                }
                self.publish_busy();
                let _ = reply.send(());
            }
            Command::Stop { reply } => {
                self.orchestrator.stop_processing();
                self.publish_busy();
                let _ = reply.send(());
            }
            Command::Reprocess { id, corners, reply } => {
                let outcome = self
                    .orchestrator
                    .reprocess(id, corners)
                    .map(|job| self.run_job(job));
                self.publish_busy();
                let _ = reply.send(outcome);
            }
            Command::StartReview { id, reply } => {
                let outcome = self.orchestrator.start_review(id);
                let _ = reply.send(outcome);
            }
            Command::Confirm { id, reply } => {
                let outcome = self.orchestrator.confirm_and_advance(id).map(|confirmation| {
                    let next = confirmation.next;
                    self.index(id);
                    match confirmation.entry.result.clone() {
                        Some(result) => self.spawn_persist(confirmation.entry, result),
                        None => warn!(%id, "Confirmed document has no result to save"),
                    }
                    next
                });
                self.publish_busy();
                let _ = reply.send(outcome);
            }
            Command::Remove { id, reply } => {
                let outcome = self.orchestrator.remove(id).map(|next| {
                    if let Err(err) = self.indexer.remove(id) {
                        warn!(%id, error = %err, "Index removal failed");
                    }
                    if let Some(job) = next {
                        self.run_job(job);
                    }
                });
                self.publish_busy();
                let _ = reply.send(outcome);
            }
            Command::Clear { reply } => {
                self.orchestrator.clear();
                if let Err(err) = self.indexer.clear() {
                    warn!(error = %err, "Index clear failed");
                }
                self.publish_busy();
                let _ = reply.send(());
            }
            Command::Snapshot { reply } => {
                let _ = reply.send(self.orchestrator.snapshot());
            }
            Command::Shutdown => {}
        }
    }

    fn handle_internal(&mut self, message: Internal) {
        match message {
            Internal::Loaded { id, result } => {
                self.pending_io = self.pending_io.saturating_sub(1);
                if let Some(job) = self.orchestrator.source_loaded(id, result) {
                    self.run_job(job);
                }
            }
            Internal::Progress {
                id,
                attempt,
                progress,
            } => {
                self.orchestrator.record_progress(id, attempt, progress);
            }
            Internal::Finished {
                id,
                attempt,
                result,
            } => {
                let next = self.orchestrator.record_outcome(id, attempt, result);
                let completed = self
                    .orchestrator
                    .entry(id)
                    .is_some_and(|entry| entry.status == DocumentStatus::Completed);
                if completed {
                    self.index(id);
                }
                if let Some(job) = next {
                    self.run_job(job);
                }
            }
            Internal::Persisted { id, result } => {
                self.pending_io = self.pending_io.saturating_sub(1);
                self.orchestrator.record_saved(id, result);
            }
        }
    }

    fn publish_busy(&self) {
        let busy = self.orchestrator.is_processing()
            || self.orchestrator.has_in_flight()
            || self.pending_io > 0;
        self.busy_tx.send_if_modified(|current| {
            if *current == busy {
                false
            } else {
                *current = busy;
                true
            }
        });
    }

    fn index(&self, id: DocumentId) {
        if let Some(entry) = self.orchestrator.entry(id) {
            if let Err(err) = self.indexer.index(entry) {
                warn!(%id, error = %err, "Indexing failed");
            }
        }
    }

    fn spawn_load(&mut self, id: DocumentId, source: SourceLocation) {
        self.pending_io += 1;
        let tx = self.internal_tx.clone();
        tokio::spawn(async move {
            let result = load_source(&source).await;
            let _ = tx.send(Internal::Loaded { id, result });
        });
    }

    fn spawn_persist(&mut self, entry: DocumentEntry, result: DocumentResult) {
        self.pending_io += 1;
        let store = Arc::clone(&self.store);
        let tx = self.internal_tx.clone();
        let id = entry.id;
        tokio::spawn(async move {
            let result = tokio::task::spawn_blocking(move || store.save(&entry, &result))
                .await
                .map_err(|err| ScanwerkError::Worker(format!("save task: {err}")))
                .and_then(|saved| saved);
            let _ = tx.send(Internal::Persisted { id, result });
        });
    }

    fn run_job(&self, job: Job) {
        debug!(id = %job.id, attempt = job.attempt, mode = ?job.mode, "Dispatching job");
        let pipeline = Arc::clone(&self.pipeline);
        let tx = self.internal_tx.clone();
        tokio::spawn(async move {
            let (id, attempt) = (job.id, job.attempt);
            let result = execute(pipeline, job, tx.clone()).await;
            let _ = tx.send(Internal::Finished {
                id,
                attempt,
                result,
            });
        });
    }
}

/// Run the pipeline for one job on the blocking pool.
async fn execute(
    pipeline: Arc<ProcessingPipeline>,
    job: Job,
    tx: mpsc::UnboundedSender<Internal>,
) -> Result<ProcessingOutput> {
    let Job {
        id,
        attempt,
        mode,
        source,
        bytes,
        cancel,
        ..
    } = job;
    let bytes = match bytes {
        Some(bytes) => bytes,
        None => source.read().await?,
    };

    tokio::task::spawn_blocking(move || {
        let progress = move |progress: f32| {
            let _ = tx.send(Internal::Progress {
                id,
                attempt,
                progress,
            });
        };
        match mode {
            JobMode::Auto => pipeline.auto_process(&bytes, &progress, &cancel),
            JobMode::Manual(corners) => {
                pipeline.manual_process(&bytes, &corners, &progress, &cancel)
            }
        }
    })
    .await
    .map_err(|err| ScanwerkError::Worker(format!("pipeline task: {err}")))?
}

#[cfg(test)]
mod tests {
    use std::sync::Mutex;

    use image::{DynamicImage, Rgb, RgbImage};
    use scanwerk_core::config::DetectorConfig;
    use scanwerk_core::{ErrorKind, OutputFormat};
    use scanwerk_pipeline::codec;

    use super::*;

    /// 400x560 dark frame with a light 280x392 sheet in the middle.
    fn document_png() -> Vec<u8> {
        let img = RgbImage::from_fn(400, 560, |x, y| {
            if (60..340).contains(&x) && (84..476).contains(&y) {
                if y % 24 < 3 && (80..320).contains(&x) {
                    Rgb([30, 30, 30])
                } else {
                    Rgb([238, 236, 230])
                }
            } else {
                Rgb([40, 45, 50])
            }
        });
        codec::encode(&DynamicImage::ImageRgb8(img), OutputFormat::Png, 1.0).expect("encode")
    }

    fn blank_png() -> Vec<u8> {
        let img = RgbImage::from_pixel(300, 300, Rgb([128, 128, 128]));
        codec::encode(&DynamicImage::ImageRgb8(img), OutputFormat::Png, 1.0).expect("encode")
    }

    fn service(auto_start: bool) -> QueueService {
        QueueService::new(ProcessingPipeline::from_config(&ScanConfig::default()))
            .auto_start(auto_start)
    }

    #[derive(Default)]
    struct RecordingIndexer(Mutex<Vec<&'static str>>);

    impl RecordingIndexer {
        fn calls(&self) -> Vec<&'static str> {
            self.0.lock().map(|calls| calls.clone()).unwrap_or_default()
        }

        fn push(&self, call: &'static str) {
            if let Ok(mut calls) = self.0.lock() {
                calls.push(call);
            }
        }
    }

    impl DocumentIndexer for RecordingIndexer {
        fn index(&self, _entry: &DocumentEntry) -> Result<()> {
            self.push("index");
            Ok(())
        }

        fn remove(&self, _id: DocumentId) -> Result<()> {
            self.push("remove");
            Ok(())
        }

        fn clear(&self) -> Result<()> {
            self.push("clear");
            Ok(())
        }
    }

    #[tokio::test]
    async fn corrupt_source_fails_without_processing() {
        let handle = service(true).spawn();
        let mut events = handle.subscribe();

        let id = handle
            .enqueue(SourceLocation::memory("broken.jpg", b"\x00\x01 nope".to_vec()))
            .await
            .expect("enqueue");
        handle.wait_idle().await.expect("idle");

        let snapshot = handle.snapshot().await.expect("snapshot");
        let entry = snapshot.entry(id).expect("entry");
        assert_eq!(entry.status, DocumentStatus::Failed);
        assert_eq!(entry.error_kind, Some(ErrorKind::DecodeFailed));
        assert_eq!(entry.attempts, 0);
        assert!(!snapshot.is_processing);

        while let Ok(event) = events.try_recv() {
            assert_ne!(
                event,
                QueueEvent::StatusChanged {
                    id,
                    status: DocumentStatus::Processing
                }
            );
        }
    }

    #[tokio::test]
    async fn batch_continues_past_failures() {
        let mut config = ScanConfig::default();
        config.detector = DetectorConfig {
            fallback_enabled: false,
            ..DetectorConfig::default()
        };
        let handle = QueueService::new(ProcessingPipeline::from_config(&config)).spawn();

        let mut ids = Vec::new();
        for (name, bytes) in [("a.png", document_png()), ("b.png", blank_png()), ("c.png", document_png())] {
            ids.push(
                handle
                    .enqueue(SourceLocation::memory(name, bytes))
                    .await
                    .expect("enqueue"),
            );
        }
        handle.start_batch().await.expect("start");
        handle.wait_idle().await.expect("idle");

        let snapshot = handle.snapshot().await.expect("snapshot");
        let statuses: Vec<_> = ids
            .iter()
            .map(|id| snapshot.entry(*id).map(|entry| entry.status))
            .collect();
        assert_eq!(
            statuses,
            vec![
                Some(DocumentStatus::Completed),
                Some(DocumentStatus::Failed),
                Some(DocumentStatus::Completed),
            ]
        );
        assert_eq!(
            snapshot.entry(ids[1]).and_then(|entry| entry.error_kind),
            Some(ErrorKind::DetectionFailed)
        );
        assert!(!snapshot.is_processing);
        assert_eq!(snapshot.batch.done, 3);
        assert_eq!(snapshot.batch.total, 3);
        assert_eq!(snapshot.active, None);
    }

    #[tokio::test]
    async fn manual_reprocess_replaces_the_result() {
        let handle = service(true).spawn();
        let id = handle
            .enqueue(SourceLocation::memory("page.png", document_png()))
            .await
            .expect("enqueue");
        handle.wait_idle().await.expect("idle");

        let before = handle.snapshot().await.expect("snapshot");
        let first = before.entry(id).expect("entry");
        assert_eq!(first.status, DocumentStatus::Completed);
        assert_eq!(first.progress, 1.0);
        for corner in first.detected_quad.expect("quad").points() {
            assert!((0.0..=400.0).contains(&corner.x) && (0.0..=560.0).contains(&corner.y));
        }
        let first_bytes = first.result_bytes().map(<[u8]>::to_vec).expect("result");

        let corners = vec![
            Point::new(100.0, 120.0),
            Point::new(300.0, 130.0),
            Point::new(290.0, 430.0),
            Point::new(110.0, 420.0),
        ];
        handle.reprocess(id, corners.clone()).await.expect("reprocess");
        handle.wait_idle().await.expect("idle");

        let after = handle.snapshot().await.expect("snapshot");
        let entry = after.entry(id).expect("entry");
        assert_eq!(entry.status, DocumentStatus::Completed);
        assert_eq!(entry.attempts, 2);
        assert_eq!(entry.detected_quad.map(|quad| quad.points().to_vec()), Some(corners));
        let second_bytes = entry.result_bytes().map(<[u8]>::to_vec).expect("result");
        assert_ne!(first_bytes, second_bytes);
    }

    #[tokio::test]
    async fn reprocess_rejects_pending_and_unknown_entries() {
        let handle = service(false).spawn();
        let id = handle
            .enqueue(SourceLocation::memory("page.png", document_png()))
            .await
            .expect("enqueue");
        assert!(matches!(
            handle.reprocess(id, Vec::new()).await,
            Err(ScanwerkError::InvalidTransition { .. })
        ));
        assert!(matches!(
            handle.reprocess(DocumentId::new(), Vec::new()).await,
            Err(ScanwerkError::EntryNotFound(_))
        ));
    }

    #[tokio::test]
    async fn review_confirms_and_persists_in_order() {
        let dir = tempfile::tempdir().expect("tempdir");
        let handle = service(true)
            .with_store(Arc::new(DirectoryStore::under(dir.path())))
            .spawn();

        let a = handle
            .enqueue(SourceLocation::memory("first.png", document_png()))
            .await
            .expect("enqueue");
        let b = handle
            .enqueue(SourceLocation::memory("second.png", document_png()))
            .await
            .expect("enqueue");
        handle.wait_idle().await.expect("idle");

        handle.start_review(a).await.expect("review");
        assert_eq!(handle.confirm_and_advance(a).await.expect("confirm"), Some(b));
        assert_eq!(handle.confirm_and_advance(b).await.expect("confirm"), None);
        handle.wait_idle().await.expect("idle");

        let snapshot = handle.snapshot().await.expect("snapshot");
        assert_eq!(snapshot.active, None);
        for (id, stem) in [(a, "first"), (b, "second")] {
            let entry = snapshot.entry(id).expect("entry");
            assert!(entry.reviewed);
            assert_eq!(entry.status, DocumentStatus::Completed);
            let expected = dir
                .path()
                .join(format!("{stem}_AI_enhance"))
                .join(format!("{stem}_corrected.jpg"));
            assert_eq!(entry.saved_path.as_deref(), Some(expected.as_path()));
            assert!(expected.exists());
        }
    }

    #[tokio::test]
    async fn indexer_follows_the_queue() {
        let indexer = Arc::new(RecordingIndexer::default());
        let handle = service(true).with_indexer(indexer.clone()).spawn();

        let id = handle
            .enqueue(SourceLocation::memory("page.png", document_png()))
            .await
            .expect("enqueue");
        handle.wait_idle().await.expect("idle");
        handle.remove(id).await.expect("remove");
        handle.clear().await.expect("clear");

        assert_eq!(indexer.calls(), vec!["index", "index", "remove", "clear"]);
        assert!(handle.snapshot().await.expect("snapshot").entries.is_empty());
    }

    #[tokio::test]
    async fn stopped_service_reports_errors() {
        let handle = service(false).spawn();
        handle.shutdown().await.expect("shutdown");
        // Requests queued behind the shutdown are dropped unanswered.
        assert!(matches!(
            handle.snapshot().await,
            Err(ScanwerkError::ServiceStopped)
        ));
    }
}
