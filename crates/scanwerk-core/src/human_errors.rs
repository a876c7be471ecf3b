// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// Human-readable error messages shown inline next to failed documents.
//
// Every error kind is mapped to plain English with a concrete suggestion.

use crate::error::{ErrorKind, ScanwerkError};

/// Severity of an error from the user's perspective.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Severity {
    /// Retrying the same document may well succeed.
    Transient,
    /// The user has to do something first (adjust corners, pick another file).
    ActionRequired,
    /// Retrying will not help.
    Permanent,
}

/// A human-readable error with a plain English message and a suggestion.
#[derive(Debug, Clone)]
pub struct HumanError {
    /// Plain English summary (shown as a heading).
    pub message: String,
    /// What the user should try (shown as body text).
    pub suggestion: String,
    /// Whether the retry action should be offered.
    pub retriable: bool,
    pub severity: Severity,
}

/// Convert a `ScanwerkError` into a `HumanError`.
pub fn humanize_error(err: &ScanwerkError) -> HumanError {
    match err {
        ScanwerkError::Config(detail) => HumanError {
            message: "The scanner settings are invalid.".into(),
            suggestion: format!("Fix the setting and try again. ({detail})"),
            retriable: false,
            severity: Severity::ActionRequired,
        },
        ScanwerkError::Busy => HumanError {
            message: "Another document is still being processed.".into(),
            suggestion: "Wait for it to finish, then try again.".into(),
            retriable: true,
            severity: Severity::Transient,
        },
        ScanwerkError::Export(detail) => HumanError {
            message: "The result could not be saved.".into(),
            suggestion: format!("Check that the output folder is writable. ({detail})"),
            retriable: true,
            severity: Severity::ActionRequired,
        },
        other => humanize_kind(other.kind()),
    }
}

/// Human-readable text for an error classification stored on a queue entry.
pub fn humanize_kind(kind: ErrorKind) -> HumanError {
    match kind {
        ErrorKind::DecodeFailed => HumanError {
            message: "This file isn't a picture we can read.".into(),
            suggestion: "Use a JPEG, PNG, TIFF or BMP photo of the document.".into(),
            retriable: false,
            severity: Severity::Permanent,
        },
        ErrorKind::DetectionFailed => HumanError {
            message: "We couldn't find the edges of the document.".into(),
            suggestion: "Drag the corners onto the document by hand, or retake the photo on a darker background.".into(),
            retriable: true,
            severity: Severity::ActionRequired,
        },
        ErrorKind::InvalidCornerCount => HumanError {
            message: "The document outline needs exactly four corners.".into(),
            suggestion: "Place one handle on each corner of the page.".into(),
            retriable: true,
            severity: Severity::ActionRequired,
        },
        ErrorKind::RectificationFailed => HumanError {
            message: "The page couldn't be straightened.".into(),
            suggestion: "The corners are too close together or in a line. Spread them out over the page.".into(),
            retriable: true,
            severity: Severity::ActionRequired,
        },
        ErrorKind::FilterUnavailable => HumanError {
            message: "An image filter isn't available.".into(),
            suggestion: "The result was produced without that filter.".into(),
            retriable: false,
            severity: Severity::Transient,
        },
        ErrorKind::EncodeFailed => HumanError {
            message: "The result couldn't be saved in the chosen format.".into(),
            suggestion: "Choose JPEG or PNG as the output format in settings.".into(),
            retriable: true,
            severity: Severity::ActionRequired,
        },
        ErrorKind::Cancelled => HumanError {
            message: "Processing was stopped.".into(),
            suggestion: "Start the batch again to continue.".into(),
            retriable: true,
            severity: Severity::Transient,
        },
        ErrorKind::Io => HumanError {
            message: "The file couldn't be read.".into(),
            suggestion: "Make sure the file still exists and you are allowed to open it.".into(),
            retriable: true,
            severity: Severity::ActionRequired,
        },
        ErrorKind::Other => HumanError {
            message: "Something went wrong.".into(),
            suggestion: "Try again. If it keeps happening, remove the document and add it again.".into(),
            retriable: true,
            severity: Severity::Transient,
        },
    }
}
