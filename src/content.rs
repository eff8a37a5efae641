//! Content-mapping collaborator.
//!
//! Resolves GETFILE request paths to openable local files. The serving side
//! only ever asks for a readable handle; closing is the handle's own
//! business (dropping the [`File`] closes it). The map is loaded once and
//! read-only afterwards, so it is safe to share across workers.
use std::{
    collections::HashMap,
    fs::File,
    io::{self, BufRead, BufReader},
    path::{Path, PathBuf},
    thread,
    time::Duration,
};

use log::{trace, warn};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ContentError {
    #[error("failed to read content map {path}: {source}")]
    Io { path: PathBuf, source: io::Error },

    #[error("malformed content map entry on line {line}: '{entry}'")]
    Malformed { line: usize, entry: String },
}

/// Source of file content for request paths.
///
/// `None` means not found; the caller answers `FILE_NOT_FOUND`. A returned
/// handle that later fails to stat or read is the caller's `ERROR` case.
pub trait ContentSource: Send + Sync {
    fn get(&self, path: &str) -> Option<File>;
}

/// File-backed content map.
///
/// The map file holds one `<request-path> <local-path>` pair per line;
/// blank lines and lines starting with `#` are skipped. An optional
/// per-lookup delay simulates slow storage for load testing.
#[derive(Debug, Default)]
pub struct ContentMap {
    entries: HashMap<String, PathBuf>,
    delay: Duration,
}

impl ContentMap {
    pub fn load(path: &Path) -> Result<Self, ContentError> {
        let file = File::open(path).map_err(|source| ContentError::Io {
            path: path.to_path_buf(),
            source,
        })?;

        let mut entries = HashMap::new();
        for (at, line) in BufReader::new(file).lines().enumerate() {
            let line = line.map_err(|source| ContentError::Io {
                path: path.to_path_buf(),
                source,
            })?;

            let entry = line.trim();
            if entry.is_empty() || entry.starts_with('#') {
                continue;
            }

            let mut fields = entry.split_whitespace();
            match (fields.next(), fields.next()) {
                (Some(key), Some(local)) => {
                    entries.insert(key.to_string(), PathBuf::from(local));
                }
                _ => {
                    return Err(ContentError::Malformed {
                        line: at + 1,
                        entry: entry.to_string(),
                    });
                }
            }
        }

        trace!("loaded {} content entries from {path:?}", entries.len());
        Ok(Self {
            entries,
            delay: Duration::ZERO,
        })
    }

    /// Sleep this long inside every lookup.
    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = delay;
        self
    }

    /// Register a single entry directly.
    pub fn insert(&mut self, key: impl Into<String>, local: impl Into<PathBuf>) {
        self.entries.insert(key.into(), local.into());
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

impl ContentSource for ContentMap {
    fn get(&self, path: &str) -> Option<File> {
        if !self.delay.is_zero() {
            thread::sleep(self.delay);
        }

        let local = self.entries.get(path)?;
        match File::open(local) {
            Ok(file) => Some(file),
            Err(e) => {
                warn!("content entry {path} -> {local:?} unreadable: {e}");
                None
            }
        }
    }
}
