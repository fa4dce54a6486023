//! Resume position of a crawl
//!
//! The checkpoint holds the identifier most recently entered at each level.
//! On resume, entries below a level's cursor are skipped, and moving to a
//! new entry zeroes every deeper cursor.

use serde::{Deserialize, Serialize};
use std::fs;
use std::io::{self, ErrorKind};
use std::path::{Path, PathBuf};
use thiserror::Error;

/// Errors raised while loading or saving the checkpoint file
#[derive(Debug, Error)]
pub enum CheckpointError {
    #[error("Checkpoint file error: {0}")]
    Io(#[from] io::Error),

    #[error("Checkpoint document is invalid: {0}")]
    Json(#[from] serde_json::Error),
}

/// Traversal levels, outermost first
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum Level {
    Period,
    Manufacturer,
    Model,
    YearModel,
}

impl Level {
    pub const ALL: [Level; 4] = [
        Level::Period,
        Level::Manufacturer,
        Level::Model,
        Level::YearModel,
    ];
}

/// One cursor per level; zero means "from the start"
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Checkpoint {
    pub period: i64,
    pub manufacturer: i64,
    pub model: i64,
    pub year_model: i64,
}

impl Checkpoint {
    /// Cursor of a level
    pub fn get(&self, level: Level) -> i64 {
        match level {
            Level::Period => self.period,
            Level::Manufacturer => self.manufacturer,
            Level::Model => self.model,
            Level::YearModel => self.year_model,
        }
    }

    fn slot(&mut self, level: Level) -> &mut i64 {
        match level {
            Level::Period => &mut self.period,
            Level::Manufacturer => &mut self.manufacturer,
            Level::Model => &mut self.model,
            Level::YearModel => &mut self.year_model,
        }
    }

    /// True when `id` was already completed by an earlier run
    pub fn should_skip(&self, level: Level, id: i64) -> bool {
        id < self.get(level)
    }

    /// Records entry into `id` at `level`
    ///
    /// Entering the entry the cursor already points at keeps the deeper
    /// cursors, since that subtree is the one being resumed. Entering any
    /// other entry resets them.
    pub fn enter(&mut self, level: Level, id: i64) {
        if self.get(level) == id {
            return;
        }

        *self.slot(level) = id;
        self.reset_below(level);
    }

    /// Zeroes every cursor deeper than `level`
    pub fn reset_below(&mut self, level: Level) {
        for deeper in Level::ALL.iter().filter(|l| **l > level) {
            *self.slot(*deeper) = 0;
        }
    }

    /// True for the default, start-from-scratch position
    pub fn is_start(&self) -> bool {
        *self == Self::default()
    }
}

/// JSON file holding the checkpoint between runs
#[derive(Debug, Clone)]
pub struct CheckpointStore {
    path: PathBuf,
}

impl CheckpointStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Loads the saved checkpoint, or the default when no file exists
    pub fn load(&self) -> Result<Checkpoint, CheckpointError> {
        let content = match fs::read_to_string(&self.path) {
            Ok(content) => content,
            Err(e) if e.kind() == ErrorKind::NotFound => return Ok(Checkpoint::default()),
            Err(e) => return Err(e.into()),
        };

        Ok(serde_json::from_str(&content)?)
    }

    /// Writes the checkpoint atomically (temp file, then rename)
    pub fn save(&self, checkpoint: &Checkpoint) -> Result<(), CheckpointError> {
        if let Some(parent) = self.path.parent().filter(|p| !p.as_os_str().is_empty()) {
            fs::create_dir_all(parent)?;
        }

        let tmp = self.path.with_extension("json.tmp");
        fs::write(&tmp, serde_json::to_string_pretty(checkpoint)?)?;
        fs::rename(&tmp, &self.path)?;
        Ok(())
    }

    /// Removes the checkpoint file; a missing file is not an error
    pub fn clear(&self) -> Result<(), CheckpointError> {
        match fs::remove_file(&self.path) {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(()),
            Err(e) => Err(e.into()),
        }
    }
}
