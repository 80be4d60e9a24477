//! Stale output removal.
//!
//! Scans the immediate entries of an output directory and deletes regular
//! files whose last modification is older than the retention window. The
//! sweep never fails its caller: every problem is logged and collected in
//! the returned [`CleanupReport`].

use std::path::{Path, PathBuf};
use std::time::{Duration, SystemTime};
use thiserror::Error;
use tokio::fs;
use tracing::{debug, error, info, warn};

#[derive(Error, Debug)]
pub enum CleanupError {
    #[error("Failed to read directory {path}: {source}")]
    ReadDir {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to inspect {path}: {source}")]
    Metadata {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to remove {path}: {source}")]
    Remove {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

/// What a single sweep did.
#[derive(Debug, Default)]
pub struct CleanupReport {
    /// Regular files examined
    pub scanned: usize,
    pub removed: Vec<PathBuf>,
    pub errors: Vec<CleanupError>,
}

impl CleanupReport {
    pub fn is_clean(&self) -> bool {
        self.errors.is_empty()
    }
}

/// Delete files in `dir` older than `max_age`.
pub async fn sweep(dir: &Path, max_age: Duration) -> CleanupReport {
    sweep_at(dir, max_age, SystemTime::now()).await
}

/// Same as [`sweep`] with an explicit notion of "now".
pub async fn sweep_at(dir: &Path, max_age: Duration, now: SystemTime) -> CleanupReport {
    let mut report = CleanupReport::default();

    let mut entries = match fs::read_dir(dir).await {
        Ok(entries) => entries,
        Err(source) => {
            error!(target: "janitor", dir = ?dir, error = %source, "Error cleaning up files");
            report.errors.push(CleanupError::ReadDir {
                path: dir.to_path_buf(),
                source,
            });
            return report;
        }
    };

    loop {
        let entry = match entries.next_entry().await {
            Ok(Some(entry)) => entry,
            Ok(None) => break,
            Err(source) => {
                error!(target: "janitor", dir = ?dir, error = %source, "Directory listing aborted");
                report.errors.push(CleanupError::ReadDir {
                    path: dir.to_path_buf(),
                    source,
                });
                break;
            }
        };
        let path = entry.path();

        // Follows symlinks, so a link to a regular file counts as one.
        let meta = match fs::metadata(&path).await {
            Ok(meta) => meta,
            Err(source) => {
                warn!(target: "janitor", path = ?path, error = %source, "Skipping unreadable entry");
                report.errors.push(CleanupError::Metadata { path, source });
                continue;
            }
        };
        if !meta.is_file() {
            continue;
        }
        report.scanned += 1;

        let modified = match meta.modified() {
            Ok(t) => t,
            Err(source) => {
                warn!(target: "janitor", path = ?path, error = %source, "No modification time");
                report.errors.push(CleanupError::Metadata { path, source });
                continue;
            }
        };
        let age = now.duration_since(modified).unwrap_or(Duration::ZERO);
        if age <= max_age {
            continue;
        }

        match fs::remove_file(&path).await {
            Ok(()) => {
                debug!(target: "janitor", path = ?path, age_secs = age.as_secs(), "Removed stale file");
                report.removed.push(path);
            }
            Err(source) => {
                warn!(target: "janitor", path = ?path, error = %source, "Failed to remove stale file");
                report.errors.push(CleanupError::Remove { path, source });
            }
        }
    }

    if !report.removed.is_empty() {
        info!(
            target: "janitor",
            dir = ?dir,
            removed = report.removed.len(),
            scanned = report.scanned,
            "Cleaned up old output files"
        );
    }
    report
}
