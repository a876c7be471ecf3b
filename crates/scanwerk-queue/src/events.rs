// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// Change notifications published by the queue.

use std::path::PathBuf;

use scanwerk_core::{DocumentId, DocumentStatus};

/// Emitted on a `tokio::sync::broadcast` channel after each state change.
///
/// Events for one entry arrive in the order the changes happened.
#[derive(Debug, Clone, PartialEq)]
pub enum QueueEvent {
    Enqueued { id: DocumentId },
    Loaded { id: DocumentId },
    StatusChanged { id: DocumentId, status: DocumentStatus },
    Progress { id: DocumentId, progress: f32 },
    ActiveChanged { id: Option<DocumentId> },
    BatchStarted { total: usize },
    BatchFinished { done: usize, total: usize },
    Saved { id: DocumentId, path: PathBuf },
    SaveFailed { id: DocumentId, message: String },
    Removed { id: DocumentId },
    Cleared,
}
