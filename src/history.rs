use crate::error::{Error, Result};
use serde::{Deserialize, Serialize};
use std::collections::VecDeque;
use std::fs;
use std::path::{Path, PathBuf};
use tracing::{debug, error, warn};

#[derive(Serialize, Deserialize, Clone, Debug, PartialEq)]
pub struct MessagePair {
    pub image: String,
    pub message: String,
    pub attribution: String,
    pub timestamp: String,
}

/// Append-only message log keeping the most recent `limit` entries.
pub struct MessageLog {
    path: PathBuf,
    limit: usize,
    entries: VecDeque<MessagePair>,
}

impl MessageLog {
    /// Loads an existing log; a missing or unreadable file starts empty.
    ///
    /// A malformed file is renamed to `<name>.bak` first so the next save
    /// does not overwrite it.
    pub fn open(path: impl Into<PathBuf>, limit: usize) -> Self {
        let path = path.into();
        let entries = match fs::read(&path) {
            Ok(data) => match serde_json::from_slice::<Vec<MessagePair>>(&data) {
                Ok(v) => v.into(),
                Err(e) => {
                    let backup = backup_path(&path);
                    warn!("malformed message log {}: {e}", path.display());
                    match fs::rename(&path, &backup) {
                        Ok(()) => warn!(backup = %backup.display(), "moved malformed message log aside"),
                        Err(e) => error!("failed to move {} aside: {e}", path.display()),
                    }
                    VecDeque::new()
                }
            },
            Err(_) => VecDeque::new(),
        };
        let mut log = Self {
            path,
            limit: limit.max(1),
            entries,
        };
        log.trim();
        log
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn entries(&self) -> impl Iterator<Item = &MessagePair> {
        self.entries.iter()
    }

    fn trim(&mut self) {
        while self.entries.len() > self.limit {
            self.entries.pop_front();
        }
    }

    /// Appends in memory, then writes the whole log. A write failure leaves
    /// the in-memory entry in place.
    pub fn append(&mut self, pair: MessagePair) -> Result<()> {
        self.entries.push_back(pair);
        self.trim();
        self.save()
    }

    pub fn save(&self) -> Result<()> {
        if let Some(parent) = self.path.parent() {
            fs::create_dir_all(parent)
                .map_err(|e| Error::persistence(parent.display().to_string(), e))?;
        }
        let data = serde_json::to_vec_pretty(&self.entries)?;
        fs::write(&self.path, data)
            .map_err(|e| Error::persistence(self.path.display().to_string(), e))?;
        debug!(entries = self.entries.len(), "message log saved");
        Ok(())
    }
}

fn backup_path(path: &Path) -> PathBuf {
    let mut name = path.file_name().map(|n| n.to_os_string()).unwrap_or_default();
    name.push(".bak");
    path.with_file_name(name)
}
