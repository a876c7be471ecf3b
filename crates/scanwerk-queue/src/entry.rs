// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// A single document in the batch queue.

use std::path::PathBuf;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use image::DynamicImage;
use scanwerk_core::error::{ErrorKind, ScanwerkError};
use scanwerk_core::{DocumentId, DocumentStatus, OutputFormat, Quad};
use scanwerk_pipeline::ProcessingOutput;

use crate::source::{LoadedSource, SourceLocation};

/// The processed output of a document.
#[derive(Debug, Clone)]
pub struct DocumentResult {
    pub raster: Arc<DynamicImage>,
    pub bytes: Arc<[u8]>,
    pub format: OutputFormat,
}

impl From<ProcessingOutput> for DocumentResult {
    fn from(output: ProcessingOutput) -> Self {
        Self {
            raster: Arc::new(output.raster),
            bytes: output.bytes.into(),
            format: output.format,
        }
    }
}

/// One unit of work in the queue.
///
/// Only the orchestrator mutates entries; everyone else sees clones taken
/// from a snapshot. Large buffers are shared behind `Arc`s so those clones
/// stay cheap.
#[derive(Debug, Clone)]
pub struct DocumentEntry {
    pub id: DocumentId,
    /// Display name, usually the source file name.
    pub name: String,
    pub source: SourceLocation,
    pub status: DocumentStatus,
    /// `0.0..=1.0`, non-decreasing within one attempt.
    pub progress: f32,
    pub detected_quad: Option<Quad>,
    pub result: Option<DocumentResult>,
    /// Decoded original, available once the source has loaded.
    pub preview: Option<Arc<DynamicImage>>,
    pub error_message: Option<String>,
    pub error_kind: Option<ErrorKind>,
    /// SHA-256 of the source bytes.
    pub source_hash: Option<String>,
    /// Number of processing attempts started.
    pub attempts: u32,
    /// Whether the user has confirmed the current result.
    pub reviewed: bool,
    /// Where the confirmed result was written.
    pub saved_path: Option<PathBuf>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub(crate) source_bytes: Option<Arc<[u8]>>,
    pub(crate) loaded: bool,
}

impl DocumentEntry {
    pub fn new(source: SourceLocation) -> Self {
        let now = Utc::now();
        Self {
            id: DocumentId::new(),
            name: source.display_name(),
            source,
            status: DocumentStatus::Pending,
            progress: 0.0,
            detected_quad: None,
            result: None,
            preview: None,
            error_message: None,
            error_kind: None,
            source_hash: None,
            attempts: 0,
            reviewed: false,
            saved_path: None,
            created_at: now,
            updated_at: now,
            source_bytes: None,
            loaded: false,
        }
    }

    /// Whether the initial read and decode has finished (successfully or not).
    pub fn is_loaded(&self) -> bool {
        self.loaded
    }

    pub fn source_bytes(&self) -> Option<&Arc<[u8]>> {
        self.source_bytes.as_ref()
    }

    pub fn result_bytes(&self) -> Option<&[u8]> {
        self.result.as_ref().map(|result| &result.bytes[..])
    }

    pub(crate) fn touch(&mut self) {
        self.updated_at = Utc::now();
    }

    pub(crate) fn attach_source(&mut self, loaded: LoadedSource) {
        self.source_bytes = Some(loaded.bytes);
        self.preview = Some(loaded.preview);
        self.source_hash = Some(loaded.hash);
        self.loaded = true;
        self.touch();
    }

    pub(crate) fn record_error(&mut self, err: &ScanwerkError) {
        self.error_message = Some(err.to_string());
        self.error_kind = Some(err.kind());
        self.touch();
    }

    pub(crate) fn clear_error(&mut self) {
        self.error_message = None;
        self.error_kind = None;
    }
}
