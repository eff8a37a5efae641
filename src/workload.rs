//! Workload file reader for the download client: a list of request paths
//! handed out round-robin across threads.
use std::{
    fs::File,
    io::{self, BufRead, BufReader},
    path::{Path, PathBuf},
    sync::atomic::{AtomicUsize, Ordering},
};

use thiserror::Error;

#[derive(Debug, Error)]
pub enum WorkloadError {
    #[error("failed to read workload file {path}: {source}")]
    Io { path: PathBuf, source: io::Error },

    #[error("workload file {path} contains no request paths")]
    Empty { path: PathBuf },
}

#[derive(Debug)]
pub struct Workload {
    paths: Vec<String>,
    next: AtomicUsize,
}

impl Workload {
    pub fn load(path: &Path) -> Result<Self, WorkloadError> {
        let file = File::open(path).map_err(|source| WorkloadError::Io {
            path: path.to_path_buf(),
            source,
        })?;

        let mut paths = Vec::new();
        for line in BufReader::new(file).lines() {
            let line = line.map_err(|source| WorkloadError::Io {
                path: path.to_path_buf(),
                source,
            })?;
            let entry = line.trim();
            if !entry.is_empty() {
                paths.push(entry.to_string());
            }
        }

        if paths.is_empty() {
            return Err(WorkloadError::Empty {
                path: path.to_path_buf(),
            });
        }

        Ok(Self {
            paths,
            next: AtomicUsize::new(0),
        })
    }

    /// Next request path, cycling back to the first after the last.
    pub fn next_path(&self) -> &str {
        let at = self.next.fetch_add(1, Ordering::Relaxed);
        &self.paths[at % self.paths.len()]
    }

    pub fn len(&self) -> usize {
        self.paths.len()
    }

    pub fn is_empty(&self) -> bool {
        self.paths.is_empty()
    }
}
