// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// Batch state machine.
//
// The orchestrator owns every queue entry and decides what runs next. It never
// does pipeline work itself: transitions that start processing hand back a
// `Job`, and the caller reports progress and the outcome for that job. All
// methods are synchronous and fast.
//
// Per-entry transitions:
//
//   pending ──> processing ──> completed ──> reviewing ──> completed (reviewed)
//      │             │  ^           │             │
//      │             v  └───────────┴─────────────┘  reprocess
//      └──────────> failed ──> processing (retry)
//
// At most one entry is `processing` at a time.

use std::path::PathBuf;
use std::sync::Arc;

use scanwerk_core::error::{Result, ScanwerkError};
use scanwerk_core::{DocumentId, DocumentStatus, ErrorKind, Point};
use scanwerk_pipeline::{CancelFlag, ProcessingOutput};
use tokio::sync::broadcast;
use tracing::{debug, error, info, instrument, warn};

use crate::entry::DocumentEntry;
use crate::events::QueueEvent;
use crate::source::{LoadedSource, SourceLocation};

/// How a job should find the document outline.
#[derive(Debug, Clone, PartialEq)]
pub enum JobMode {
    /// Run boundary detection.
    Auto,
    /// Use these corners (`[top_left, top_right, bottom_right, bottom_left]`).
    Manual(Vec<Point>),
}

/// One pipeline run handed out by the orchestrator.
#[derive(Debug, Clone)]
pub struct Job {
    pub id: DocumentId,
    /// Identifies this run; outcomes for older attempts are ignored.
    pub attempt: u64,
    pub mode: JobMode,
    /// Whether the batch moves on to the next pending entry afterwards.
    pub auto_advance: bool,
    pub source: SourceLocation,
    /// Cached source bytes. `None` if the source has to be read again.
    pub bytes: Option<Arc<[u8]>>,
    pub cancel: CancelFlag,
}

/// Overall batch progress. Failed documents count as done.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct BatchProgress {
    pub done: usize,
    pub total: usize,
}

impl BatchProgress {
    pub fn fraction(&self) -> f32 {
        if self.total == 0 {
            0.0
        } else {
            self.done as f32 / self.total as f32
        }
    }
}

/// Point-in-time copy of the queue for presentation.
#[derive(Debug, Clone)]
pub struct QueueSnapshot {
    pub entries: Vec<DocumentEntry>,
    pub active: Option<DocumentId>,
    pub is_processing: bool,
    pub batch: BatchProgress,
}

impl QueueSnapshot {
    pub fn entry(&self, id: DocumentId) -> Option<&DocumentEntry> {
        self.entries.iter().find(|entry| entry.id == id)
    }

    pub fn count(&self, status: DocumentStatus) -> usize {
        self.entries.iter().filter(|entry| entry.status == status).count()
    }
}

/// Returned by `confirm_and_advance`.
#[derive(Debug, Clone)]
pub struct Confirmation {
    /// The confirmed entry, for persisting its result.
    pub entry: DocumentEntry,
    /// The entry promoted to review next, if any.
    pub next: Option<DocumentId>,
}

#[derive(Debug)]
struct InFlight {
    id: DocumentId,
    attempt: u64,
    cancel: CancelFlag,
    auto_advance: bool,
    cancelled: bool,
    /// Entry state before the run, restored when a reprocess is stopped.
    previous: PriorState,
}

#[derive(Debug, Clone)]
struct PriorState {
    status: DocumentStatus,
    progress: f32,
    reviewed: bool,
    error_message: Option<String>,
    error_kind: Option<ErrorKind>,
}

pub struct Orchestrator {
    entries: Vec<DocumentEntry>,
    active: Option<DocumentId>,
    in_flight: Option<InFlight>,
    batch_running: bool,
    batch: BatchProgress,
    next_attempt: u64,
    events: broadcast::Sender<QueueEvent>,
}

impl Orchestrator {
    pub fn new(events: broadcast::Sender<QueueEvent>) -> Self {
        Self {
            entries: Vec::new(),
            active: None,
            in_flight: None,
            batch_running: false,
            batch: BatchProgress::default(),
            next_attempt: 1,
            events,
        }
    }

    // -- Queries --------------------------------------------------------------

    pub fn entries(&self) -> &[DocumentEntry] {
        &self.entries
    }

    pub fn entry(&self, id: DocumentId) -> Option<&DocumentEntry> {
        self.entries.iter().find(|entry| entry.id == id)
    }

    pub fn active(&self) -> Option<DocumentId> {
        self.active
    }

    /// True while a batch is running or a document is being processed.
    pub fn is_processing(&self) -> bool {
        self.batch_running || self.in_flight.as_ref().is_some_and(|flight| !flight.cancelled)
    }

    /// True while any pipeline run is still out, including cancelled ones.
    pub fn has_in_flight(&self) -> bool {
        self.in_flight.is_some()
    }

    pub fn batch_progress(&self) -> BatchProgress {
        self.batch
    }

    pub fn snapshot(&self) -> QueueSnapshot {
        QueueSnapshot {
            entries: self.entries.clone(),
            active: self.active,
            is_processing: self.is_processing(),
            batch: self.batch,
        }
    }

    // -- Enqueue and load -----------------------------------------------------

    /// Append a new pending entry. Its source still has to be loaded; report
    /// that with [`Orchestrator::source_loaded`].
    #[instrument(skip_all, fields(source = %source.display_name()))]
    pub fn enqueue(&mut self, source: SourceLocation) -> DocumentId {
        let entry = DocumentEntry::new(source);
        let id = entry.id;
        self.entries.push(entry);
        if self.batch_running {
            self.batch.total += 1;
        }
        info!(%id, "Document enqueued");
        self.emit(QueueEvent::Enqueued { id });
        id
    }

    /// Record the result of reading and decoding an entry's source.
    ///
    /// A decode failure moves the entry straight to `failed`.
    pub fn source_loaded(&mut self, id: DocumentId, loaded: Result<LoadedSource>) -> Option<Job> {
        let Some(idx) = self.position(id) else {
            debug!(%id, "Source loaded for a removed entry");
            return None;
        };

        match loaded {
            Ok(loaded) => {
                self.entries[idx].attach_source(loaded);
                debug!(%id, "Source loaded");
                self.emit(QueueEvent::Loaded { id });
            }
            Err(err) => {
                warn!(%id, error = %err, "Source could not be loaded");
                let entry = &mut self.entries[idx];
                entry.loaded = true;
                entry.record_error(&err);
                let was_pending = entry.status == DocumentStatus::Pending;
                self.set_status(idx, DocumentStatus::Failed);
                if self.batch_running && was_pending {
                    self.batch.done += 1;
                }
            }
        }
        self.advance()
    }

    // -- Batch control --------------------------------------------------------

    /// Start working through pending entries in insertion order. No-op while
    /// a batch is already running.
    pub fn start_batch(&mut self) -> Option<Job> {
        if self.batch_running {
            debug!("Batch already running");
            return None;
        }
        self.batch_running = true;
        self.batch = BatchProgress {
            done: 0,
            total: self.count(DocumentStatus::Pending),
        };
        info!(total = self.batch.total, "Batch started");
        self.emit(QueueEvent::BatchStarted {
            total: self.batch.total,
        });
        self.advance()
    }

    /// Stop the batch and ask the running pipeline to stop at the next stage
    /// boundary. A batch document goes back to `pending`; a reprocessed one
    /// keeps its previous status and result.
    pub fn stop_processing(&mut self) {
        let was_running = self.batch_running;
        self.batch_running = false;
        self.cancel_in_flight(true);
        if was_running {
            info!(done = self.batch.done, total = self.batch.total, "Batch stopped");
            self.emit(QueueEvent::BatchFinished {
                done: self.batch.done,
                total: self.batch.total,
            });
        }
        self.batch = BatchProgress::default();
    }

    // -- Pipeline feedback ----------------------------------------------------

    /// Progress for the current attempt. Lower values than already recorded
    /// are ignored.
    pub fn record_progress(&mut self, id: DocumentId, attempt: u64, progress: f32) {
        if !self.is_current(id, attempt) {
            return;
        }
        let Some(idx) = self.position(id) else {
            return;
        };
        let progress = progress.clamp(0.0, 1.0);
        let entry = &mut self.entries[idx];
        if progress > entry.progress {
            entry.progress = progress;
            self.emit(QueueEvent::Progress { id, progress });
        }
    }

    /// The pipeline finished (or failed) for `attempt`. Returns the next job
    /// when the batch continues.
    #[instrument(skip(self, outcome), fields(ok = outcome.is_ok()))]
    pub fn record_outcome(
        &mut self,
        id: DocumentId,
        attempt: u64,
        outcome: Result<ProcessingOutput>,
    ) -> Option<Job> {
        let matches = self
            .in_flight
            .as_ref()
            .is_some_and(|flight| flight.id == id && flight.attempt == attempt);
        if !matches {
            debug!("Stale outcome ignored");
            return None;
        }
        let flight = self.in_flight.take()?;
        if flight.cancelled {
            debug!("Outcome of a cancelled run discarded");
            return self.advance();
        }

        if let Some(idx) = self.position(id) {
            match outcome {
                Ok(output) => {
                    let entry = &mut self.entries[idx];
                    entry.detected_quad = Some(output.quad);
                    entry.result = Some(output.into());
                    entry.progress = 1.0;
                    entry.reviewed = false;
                    entry.saved_path = None;
                    entry.clear_error();
                    self.set_status(idx, DocumentStatus::Completed);
                    info!("Document completed");
                }
                Err(ScanwerkError::Cancelled) => self.restore(idx, &flight),
                Err(err) => {
                    error!(error = %err, "Document failed");
                    self.entries[idx].record_error(&err);
                    self.set_status(idx, DocumentStatus::Failed);
                }
            }
            if flight.auto_advance && self.batch_running && self.entries[idx].status.is_final() {
                self.batch.done += 1;
            }
        }
        self.advance()
    }

    // -- User actions ---------------------------------------------------------

    /// Run the pipeline again for one document. An empty corner list means
    /// "detect again"; otherwise the corners are used as given. Does not
    /// advance the batch afterwards.
    pub fn reprocess(&mut self, id: DocumentId, corners: Vec<Point>) -> Result<Job> {
        let idx = self.position(id).ok_or(ScanwerkError::EntryNotFound(id))?;
        let status = self.entries[idx].status;
        if !status.can_reprocess() {
            return Err(ScanwerkError::InvalidTransition {
                id,
                status,
                action: "reprocess",
            });
        }
        if self.in_flight.is_some() {
            return Err(ScanwerkError::Busy);
        }

        let mode = if corners.is_empty() {
            JobMode::Auto
        } else {
            JobMode::Manual(corners)
        };
        info!(%id, ?mode, "Reprocessing document");
        let job = self.begin(idx, mode, false);
        self.entries[idx].reviewed = false;
        Ok(job)
    }

    /// Put a completed document up for review.
    pub fn start_review(&mut self, id: DocumentId) -> Result<()> {
        let idx = self.position(id).ok_or(ScanwerkError::EntryNotFound(id))?;
        match self.entries[idx].status {
            DocumentStatus::Reviewing => {}
            DocumentStatus::Completed => self.set_status(idx, DocumentStatus::Reviewing),
            status => {
                return Err(ScanwerkError::InvalidTransition {
                    id,
                    status,
                    action: "review",
                });
            }
        }
        self.set_active(Some(id));
        Ok(())
    }

    /// Accept the reviewed result and move to the next completed document
    /// that has not been reviewed yet.
    pub fn confirm_and_advance(&mut self, id: DocumentId) -> Result<Confirmation> {
        let idx = self.position(id).ok_or(ScanwerkError::EntryNotFound(id))?;
        let status = self.entries[idx].status;
        if status != DocumentStatus::Reviewing {
            return Err(ScanwerkError::InvalidTransition {
                id,
                status,
                action: "confirm",
            });
        }

        self.entries[idx].reviewed = true;
        self.set_status(idx, DocumentStatus::Completed);
        let confirmed = self.entries[idx].clone();

        let next = self.entries.iter().position(|entry| {
            entry.status == DocumentStatus::Completed && !entry.reviewed && entry.result.is_some()
        });
        let next_id = next.map(|next_idx| {
            self.set_status(next_idx, DocumentStatus::Reviewing);
            self.entries[next_idx].id
        });
        self.set_active(next_id);
        info!(%id, next = ?next_id, "Result confirmed");

        Ok(Confirmation {
            entry: confirmed,
            next: next_id,
        })
    }

    /// Note where a confirmed result was persisted.
    pub fn record_saved(&mut self, id: DocumentId, saved: Result<PathBuf>) {
        match saved {
            Ok(path) => {
                if let Some(idx) = self.position(id) {
                    self.entries[idx].saved_path = Some(path.clone());
                    self.entries[idx].touch();
                }
                self.emit(QueueEvent::Saved { id, path });
            }
            Err(err) => {
                error!(%id, error = %err, "Saving result failed");
                self.emit(QueueEvent::SaveFailed {
                    id,
                    message: err.to_string(),
                });
            }
        }
    }

    /// Remove an entry in any state. Removing the document being processed
    /// cancels its run.
    pub fn remove(&mut self, id: DocumentId) -> Result<Option<Job>> {
        let idx = self.position(id).ok_or(ScanwerkError::EntryNotFound(id))?;
        if self.in_flight.as_ref().is_some_and(|flight| flight.id == id) {
            self.cancel_in_flight(false);
        }

        let entry = self.entries.remove(idx);
        if self.batch_running
            && matches!(entry.status, DocumentStatus::Pending | DocumentStatus::Processing)
        {
            self.batch.total = self.batch.total.saturating_sub(1);
        }
        if self.active == Some(id) {
            self.set_active(None);
        }
        info!(%id, "Document removed");
        self.emit(QueueEvent::Removed { id });
        Ok(self.advance())
    }

    /// Cancel any running work and drop every entry.
    pub fn clear(&mut self) {
        self.cancel_in_flight(false);
        self.entries.clear();
        self.batch_running = false;
        self.batch = BatchProgress::default();
        self.set_active(None);
        info!("Queue cleared");
        self.emit(QueueEvent::Cleared);
    }

    // -- Internals ------------------------------------------------------------

    fn emit(&self, event: QueueEvent) {
        // No subscribers is fine.
        let _ = self.events.send(event);
    }

    fn position(&self, id: DocumentId) -> Option<usize> {
        self.entries.iter().position(|entry| entry.id == id)
    }

    fn count(&self, status: DocumentStatus) -> usize {
        self.entries.iter().filter(|entry| entry.status == status).count()
    }

    fn is_current(&self, id: DocumentId, attempt: u64) -> bool {
        self.in_flight
            .as_ref()
            .is_some_and(|flight| flight.id == id && flight.attempt == attempt && !flight.cancelled)
    }

    fn set_status(&mut self, idx: usize, status: DocumentStatus) {
        let entry = &mut self.entries[idx];
        entry.status = status;
        entry.touch();
        let id = entry.id;
        debug!(%id, %status, "Status changed");
        self.emit(QueueEvent::StatusChanged { id, status });
    }

    fn set_active(&mut self, id: Option<DocumentId>) {
        if self.active != id {
            self.active = id;
            self.emit(QueueEvent::ActiveChanged { id });
        }
    }

    /// Signal the running pipeline to stop. With `requeue`, its entry is
    /// put back the way it was before the run.
    fn cancel_in_flight(&mut self, requeue: bool) {
        let Some(flight) = self.in_flight.as_mut() else {
            return;
        };
        if flight.cancelled {
            return;
        }
        flight.cancel.cancel();
        flight.cancelled = true;
        let id = flight.id;
        let auto_advance = flight.auto_advance;
        let previous = flight.previous.clone();
        debug!(%id, "In-flight run cancelled");

        if requeue {
            if let Some(idx) = self.position(id) {
                self.restore_to(idx, auto_advance, previous);
            }
        }
    }

    fn restore(&mut self, idx: usize, flight: &InFlight) {
        self.restore_to(idx, flight.auto_advance, flight.previous.clone());
    }

    /// Batch runs return to `pending`. Reprocess runs return to the state
    /// they had when they started.
    fn restore_to(&mut self, idx: usize, auto_advance: bool, previous: PriorState) {
        if auto_advance {
            self.entries[idx].progress = 0.0;
            self.set_status(idx, DocumentStatus::Pending);
        } else {
            let entry = &mut self.entries[idx];
            entry.progress = previous.progress;
            entry.reviewed = previous.reviewed;
            entry.error_message = previous.error_message;
            entry.error_kind = previous.error_kind;
            self.set_status(idx, previous.status);
        }
        let id = self.entries[idx].id;
        let progress = self.entries[idx].progress;
        self.emit(QueueEvent::Progress { id, progress });
    }

    /// Start the next pending entry if the batch is running and nothing is in
    /// flight. Finishes the batch when nothing is left.
    fn advance(&mut self) -> Option<Job> {
        if !self.batch_running || self.in_flight.is_some() {
            return None;
        }
        match self
            .entries
            .iter()
            .position(|entry| entry.status == DocumentStatus::Pending)
        {
            None => {
                self.batch_running = false;
                info!(done = self.batch.done, total = self.batch.total, "Batch finished");
                self.emit(QueueEvent::BatchFinished {
                    done: self.batch.done,
                    total: self.batch.total,
                });
                self.set_active(None);
                None
            }
            Some(idx) if !self.entries[idx].loaded => {
                debug!(id = %self.entries[idx].id, "Waiting for source to load");
                None
            }
            Some(idx) => Some(self.begin(idx, JobMode::Auto, true)),
        }
    }

    fn begin(&mut self, idx: usize, mode: JobMode, auto_advance: bool) -> Job {
        let attempt = self.next_attempt;
        self.next_attempt += 1;
        let cancel = CancelFlag::new();

        let entry = &mut self.entries[idx];
        let previous = PriorState {
            status: entry.status,
            progress: entry.progress,
            reviewed: entry.reviewed,
            error_message: entry.error_message.clone(),
            error_kind: entry.error_kind,
        };
        entry.progress = 0.0;
        entry.attempts += 1;
        entry.clear_error();
        let job = Job {
            id: entry.id,
            attempt,
            mode,
            auto_advance,
            source: entry.source.clone(),
            bytes: entry.source_bytes.clone(),
            cancel: cancel.clone(),
        };

        self.set_status(idx, DocumentStatus::Processing);
        self.emit(QueueEvent::Progress {
            id: job.id,
            progress: 0.0,
        });
        self.set_active(Some(job.id));
        self.in_flight = Some(InFlight {
            id: job.id,
            attempt,
            cancel,
            auto_advance,
            cancelled: false,
            previous,
        });
        job
    }
}
