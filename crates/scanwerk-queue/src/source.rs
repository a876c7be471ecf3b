// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// Where a queued document's original bytes come from, and how they are
// loaded and fingerprinted.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use image::DynamicImage;
use scanwerk_core::error::{Result, ScanwerkError};
use scanwerk_pipeline::codec;
use sha2::{Digest, Sha256};
use tracing::{debug, instrument};

/// Reference to the original input of a queue entry. Never changes after the
/// entry is created.
#[derive(Debug, Clone)]
pub enum SourceLocation {
    /// A file on disk.
    Path(PathBuf),
    /// Bytes handed over directly (camera capture, paste, tests).
    Memory { name: String, bytes: Arc<[u8]> },
}

impl SourceLocation {
    pub fn memory(name: impl Into<String>, bytes: impl Into<Arc<[u8]>>) -> Self {
        Self::Memory {
            name: name.into(),
            bytes: bytes.into(),
        }
    }

    /// File name shown in lists.
    pub fn display_name(&self) -> String {
        match self {
            Self::Path(path) => path
                .file_name()
                .map(|name| name.to_string_lossy().into_owned())
                .unwrap_or_else(|| path.display().to_string()),
            Self::Memory { name, .. } => name.clone(),
        }
    }

    pub fn path(&self) -> Option<&Path> {
        match self {
            Self::Path(path) => Some(path),
            Self::Memory { .. } => None,
        }
    }

    /// Read the raw bytes.
    pub async fn read(&self) -> Result<Arc<[u8]>> {
        match self {
            Self::Path(path) => {
                let bytes = tokio::fs::read(path).await?;
                debug!(path = %path.display(), len = bytes.len(), "Source read");
                Ok(bytes.into())
            }
            Self::Memory { bytes, .. } => Ok(Arc::clone(bytes)),
        }
    }
}

/// A source that has been read and decoded.
#[derive(Debug, Clone)]
pub struct LoadedSource {
    pub bytes: Arc<[u8]>,
    pub preview: Arc<DynamicImage>,
    pub hash: String,
}

/// Read, decode and fingerprint a source. Decoding runs on the blocking pool.
#[instrument(skip_all, fields(source = %source.display_name()))]
pub async fn load_source(source: &SourceLocation) -> Result<LoadedSource> {
    let bytes = source.read().await?;
    tokio::task::spawn_blocking(move || {
        let preview = codec::decode(&bytes)?;
        let hash = hash_bytes(&bytes);
        Ok(LoadedSource {
            bytes,
            preview: Arc::new(preview),
            hash,
        })
    })
    .await
    .map_err(|err| ScanwerkError::Worker(format!("source decode task: {err}")))?
}

/// SHA-256 of `data` as lowercase hex.
pub fn hash_bytes(data: &[u8]) -> String {
    let mut hasher = Sha256::new();
    hasher.update(data);
    hex::encode(hasher.finalize())
}
