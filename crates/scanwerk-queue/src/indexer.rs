// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// Search-index collaborator.
//
// Hosts with a desktop search service implement `DocumentIndexer` and hand it
// to the queue service; the queue keeps the index in step with its entries.

use scanwerk_core::DocumentId;
use scanwerk_core::error::Result;
use tracing::debug;

use crate::entry::DocumentEntry;

/// Keeps an external search index in sync with the queue.
pub trait DocumentIndexer: Send + Sync {
    /// Add or refresh an entry.
    fn index(&self, entry: &DocumentEntry) -> Result<()>;

    fn remove(&self, id: DocumentId) -> Result<()>;

    /// Drop every entry this application has indexed.
    fn clear(&self) -> Result<()>;
}

/// Indexer for hosts without a search service. Logs and succeeds.
#[derive(Debug, Default, Clone, Copy)]
pub struct NoopIndexer;

impl DocumentIndexer for NoopIndexer {
    fn index(&self, entry: &DocumentEntry) -> Result<()> {
        debug!(id = %entry.id, status = %entry.status, "index (no-op)");
        Ok(())
    }

    fn remove(&self, id: DocumentId) -> Result<()> {
        debug!(%id, "remove from index (no-op)");
        Ok(())
    }

    fn clear(&self) -> Result<()> {
        debug!("clear index (no-op)");
        Ok(())
    }
}
