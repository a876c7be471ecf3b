// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// Persistence of confirmed results.

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};

use scanwerk_core::DocumentId;
use scanwerk_core::error::{Result, ScanwerkError};
use tracing::{debug, info, instrument};

use crate::entry::{DocumentEntry, DocumentResult};

/// Destination for confirmed results.
pub trait ResultStore: Send + Sync {
    /// Write `result` and return where it went.
    fn save(&self, entry: &DocumentEntry, result: &DocumentResult) -> Result<PathBuf>;
}

/// Writes `<stem>_AI_enhance/<stem>_corrected.<ext>`.
///
/// Without an output root the folder is created next to the source file.
/// In-memory sources need an output root. When another document already
/// wrote to the same path through this store, the file name gets the
/// document id's first eight characters: `<stem>_corrected_<id>.<ext>`.
#[derive(Debug, Clone, Default)]
pub struct DirectoryStore {
    root: Option<PathBuf>,
    /// Paths written so far and the document that owns each.
    claimed: Arc<Mutex<HashMap<PathBuf, DocumentId>>>,
}

impl DirectoryStore {
    /// Store results beside their source files.
    pub fn beside_source() -> Self {
        Self::default()
    }

    /// Store every result under `root`.
    pub fn under(root: impl Into<PathBuf>) -> Self {
        Self {
            root: Some(root.into()),
            ..Self::default()
        }
    }

    /// Where `entry`'s result would be written.
    pub fn target_path(&self, entry: &DocumentEntry, extension: &str) -> Result<PathBuf> {
        let stem = Path::new(&entry.name)
            .file_stem()
            .map(|stem| stem.to_string_lossy().into_owned())
            .filter(|stem| !stem.is_empty())
            .unwrap_or_else(|| entry.id.to_string());

        let base = match (&self.root, entry.source.path()) {
            (Some(root), _) => root.clone(),
            (None, Some(path)) => path
                .parent()
                .map(Path::to_path_buf)
                .unwrap_or_else(|| PathBuf::from(".")),
            (None, None) => {
                return Err(ScanwerkError::Export(format!(
                    "{} has no source folder; configure an output directory",
                    entry.name
                )));
            }
        };

        Ok(base
            .join(format!("{stem}_AI_enhance"))
            .join(format!("{stem}_corrected.{extension}")))
    }

    /// Claim a path for `entry`, switching to the id-suffixed name when
    /// another document already holds the plain one.
    fn claim(&self, entry: &DocumentEntry, extension: &str) -> Result<PathBuf> {
        let path = self.target_path(entry, extension)?;
        let mut claimed = self
            .claimed
            .lock()
            .map_err(|_| ScanwerkError::Export("result store lock poisoned".into()))?;

        let path = match claimed.get(&path) {
            Some(owner) if *owner != entry.id => {
                let id = entry.id.to_string();
                let suffix = &id[..8];
                let name = path
                    .file_stem()
                    .map(|stem| stem.to_string_lossy().into_owned())
                    .unwrap_or_default();
                let unique = path.with_file_name(format!("{name}_{suffix}.{extension}"));
                debug!(
                    taken = %path.display(),
                    path = %unique.display(),
                    "Name taken; using id suffix"
                );
                unique
            }
            _ => path,
        };
        claimed.insert(path.clone(), entry.id);
        Ok(path)
    }
}

impl ResultStore for DirectoryStore {
    #[instrument(skip_all, fields(id = %entry.id))]
    fn save(&self, entry: &DocumentEntry, result: &DocumentResult) -> Result<PathBuf> {
        let path = self.claim(entry, result.format.extension())?;
        if let Some(dir) = path.parent() {
            std::fs::create_dir_all(dir)?;
        }
        std::fs::write(&path, &result.bytes[..])?;
        info!(path = %path.display(), bytes = result.bytes.len(), "Result saved");
        Ok(path)
    }
}
