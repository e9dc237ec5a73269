use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::fs;
use std::io::ErrorKind;
use std::path::PathBuf;
use tracing::{debug, info};

use crate::models::Position;

/// Durable snapshot of the position book, written after every mutation
/// so a restart resumes with the same holdings and cash.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BookState {
    pub cash: f64,
    pub positions: Vec<Position>,
}

/// JSON-file store for the position book.
///
/// Saves go through a temp file and rename, so a crash mid-write leaves
/// the previous snapshot intact rather than a half-written one.
pub struct HoldingsStore {
    path: PathBuf,
}

impl HoldingsStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &PathBuf {
        &self.path
    }

    /// Load the last saved snapshot. A missing file is a fresh start,
    /// not an error; a file that exists but will not parse is.
    pub fn load(&self) -> Result<Option<BookState>> {
        let raw = match fs::read_to_string(&self.path) {
            Ok(raw) => raw,
            Err(e) if e.kind() == ErrorKind::NotFound => {
                debug!("No holdings file at {:?}, starting fresh", self.path);
                return Ok(None);
            }
            Err(e) => {
                return Err(e).with_context(|| format!("Failed to read {:?}", self.path));
            }
        };

        let state: BookState = serde_json::from_str(&raw)
            .with_context(|| format!("Corrupt holdings file {:?}", self.path))?;

        info!(
            "💾 Loaded {} positions and {:.2} cash from {:?}",
            state.positions.len(),
            state.cash,
            self.path
        );
        Ok(Some(state))
    }

    pub fn save(&self, state: &BookState) -> Result<()> {
        if let Some(parent) = self.path.parent() {
            if !parent.as_os_str().is_empty() {
                fs::create_dir_all(parent)
                    .with_context(|| format!("Failed to create {:?}", parent))?;
            }
        }

        let json = serde_json::to_string_pretty(state).context("Failed to serialize holdings")?;

        let tmp = self.path.with_extension("json.tmp");
        fs::write(&tmp, json).with_context(|| format!("Failed to write {:?}", tmp))?;
        fs::rename(&tmp, &self.path)
            .with_context(|| format!("Failed to replace {:?}", self.path))?;

        debug!("💾 Saved {} positions to {:?}", state.positions.len(), self.path);
        Ok(())
    }
}
