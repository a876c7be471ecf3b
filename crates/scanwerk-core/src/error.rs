// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// Unified error types for Scanwerk.

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::types::{DocumentId, DocumentStatus};

/// Top-level error type for all Scanwerk operations.
#[derive(Debug, Error)]
pub enum ScanwerkError {
    // -- Pipeline errors --
    #[error("image could not be decoded: {0}")]
    DecodeFailed(String),

    #[error("document boundary detection failed: {0}")]
    DetectionFailed(String),

    #[error("expected 4 corner points, got {0}")]
    InvalidCornerCount(usize),

    #[error("perspective correction failed: {0}")]
    RectificationFailed(String),

    #[error("image filter unavailable: {0}")]
    FilterUnavailable(String),

    #[error("image could not be encoded: {0}")]
    EncodeFailed(String),

    #[error("processing was cancelled")]
    Cancelled,

    // -- Queue errors --
    #[error("document {0} is not in the queue")]
    EntryNotFound(DocumentId),

    #[error("cannot {action} document {id} while it is {status}")]
    InvalidTransition {
        id: DocumentId,
        status: DocumentStatus,
        action: &'static str,
    },

    #[error("another document is already being processed")]
    Busy,

    #[error("queue service has stopped")]
    ServiceStopped,

    #[error("background task failed: {0}")]
    Worker(String),

    // -- Configuration / export --
    #[error("invalid configuration: {0}")]
    Config(String),

    #[error("export failed: {0}")]
    Export(String),

    #[error("file I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

/// Coarse classification of a `ScanwerkError`.
///
/// Stored on queue entries so the presentation layer can render a failure
/// without holding the error value itself.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ErrorKind {
    DecodeFailed,
    DetectionFailed,
    InvalidCornerCount,
    RectificationFailed,
    FilterUnavailable,
    EncodeFailed,
    Cancelled,
    Io,
    Other,
}

impl ScanwerkError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::DecodeFailed(_) => ErrorKind::DecodeFailed,
            Self::DetectionFailed(_) => ErrorKind::DetectionFailed,
            Self::InvalidCornerCount(_) => ErrorKind::InvalidCornerCount,
            Self::RectificationFailed(_) => ErrorKind::RectificationFailed,
            Self::FilterUnavailable(_) => ErrorKind::FilterUnavailable,
            Self::EncodeFailed(_) => ErrorKind::EncodeFailed,
            Self::Cancelled => ErrorKind::Cancelled,
            Self::Io(_) => ErrorKind::Io,
            Self::EntryNotFound(_)
            | Self::InvalidTransition { .. }
            | Self::Busy
            | Self::ServiceStopped
            | Self::Worker(_)
            | Self::Config(_)
            | Self::Export(_)
            | Self::Serialization(_) => ErrorKind::Other,
        }
    }
}

/// Alias used throughout the codebase.
pub type Result<T> = std::result::Result<T, ScanwerkError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn kind_classifies_pipeline_errors() {
        assert_eq!(
            ScanwerkError::DecodeFailed("x".into()).kind(),
            ErrorKind::DecodeFailed
        );
        assert_eq!(
            ScanwerkError::InvalidCornerCount(0).kind(),
            ErrorKind::InvalidCornerCount
        );
        assert_eq!(ScanwerkError::Busy.kind(), ErrorKind::Other);
    }

    #[test]
    fn invalid_transition_message_names_state() {
        let id = DocumentId::new();
        let err = ScanwerkError::InvalidTransition {
            id,
            status: DocumentStatus::Pending,
            action: "reprocess",
        };
        let msg = err.to_string();
        assert!(msg.contains("reprocess"));
        assert!(msg.contains("pending"));
    }
}
