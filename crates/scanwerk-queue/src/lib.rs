// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// Scanwerk queue: batch orchestration, review workflow, and the storage and
// indexing collaborators around it.

pub mod entry;
pub mod events;
pub mod indexer;
pub mod orchestrator;
pub mod service;
pub mod source;
pub mod store;

pub use entry::{DocumentEntry, DocumentResult};
pub use events::QueueEvent;
pub use indexer::{DocumentIndexer, NoopIndexer};
pub use orchestrator::{BatchProgress, Confirmation, Job, JobMode, Orchestrator, QueueSnapshot};
pub use service::{QueueHandle, QueueService};
pub use source::{LoadedSource, SourceLocation};
pub use store::{DirectoryStore, ResultStore};
