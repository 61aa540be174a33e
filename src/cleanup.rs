//! Persisted output management
//!
//! Renders normally hand back in-memory buffers, but the CLI and the legacy
//! callers persist results into a configured save directory. The store names
//! the files, tracks what it wrote, and deletes anything older than a caller
//! supplied age. Cleanup is best-effort by contract: a file that vanished
//! underneath us is not an error.

use std::path::{Path, PathBuf};
use std::time::{Duration, SystemTime};

use dashmap::DashMap;
use tracing::{debug, warn};

use crate::error::RenderError;

pub struct OutputStore {
    save_dir: PathBuf,
    written: DashMap<PathBuf, SystemTime>,
}

impl OutputStore {
    pub fn new(save_dir: PathBuf) -> Self {
        Self {
            save_dir,
            written: DashMap::new(),
        }
    }

    pub fn save_dir(&self) -> &Path {
        &self.save_dir
    }

    /// Create the save directory if it doesn't exist yet.
    pub async fn ensure_dir(&self) -> Result<(), RenderError> {
        tokio::fs::create_dir_all(&self.save_dir).await?;
        Ok(())
    }

    /// Persist output bytes under a unique timestamped name and return the path.
    pub async fn write_output(
        &self,
        data: &[u8],
        extension: &str,
    ) -> Result<PathBuf, RenderError> {
        self.ensure_dir().await?;

        let filename = format!(
            "{}-{}.{}",
            chrono::Utc::now().format("%Y%m%dT%H%M%S"),
            uuid::Uuid::new_v4(),
            extension
        );
        let path = self.save_dir.join(filename);

        tokio::fs::write(&path, data).await?;
        self.written.insert(path.clone(), SystemTime::now());

        debug!("Persisted {} bytes to {}", data.len(), path.display());
        Ok(path)
    }

    /// Number of files this store has written and not yet cleaned up.
    pub fn tracked_count(&self) -> usize {
        self.written.len()
    }

    /// Delete files in the save directory older than `age`, returning the
    /// paths that were removed.
    ///
    /// Sweeps the directory by modification time rather than only the
    /// in-memory registry, so files surviving from earlier processes are
    /// collected too.
    pub async fn cleanup_older_than(&self, age: Duration) -> Result<Vec<PathBuf>, RenderError> {
        let cutoff = SystemTime::now()
            .checked_sub(age)
            .unwrap_or(SystemTime::UNIX_EPOCH);

        let mut removed = Vec::new();
        let mut entries = match tokio::fs::read_dir(&self.save_dir).await {
            Ok(entries) => entries,
            // Nothing was ever written
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(removed),
            Err(e) => return Err(e.into()),
        };

        while let Some(entry) = entries.next_entry().await? {
            let path = entry.path();
            let metadata = match entry.metadata().await {
                Ok(metadata) => metadata,
                Err(e) => {
                    warn!("Skipping {} during cleanup: {}", path.display(), e);
                    continue;
                }
            };

            if !metadata.is_file() {
                continue;
            }

            let modified = metadata.modified().unwrap_or(SystemTime::UNIX_EPOCH);
            if modified < cutoff {
                match tokio::fs::remove_file(&path).await {
                    Ok(()) => {
                        self.written.remove(&path);
                        removed.push(path);
                    }
                    Err(e) => {
                        warn!("Failed to remove {} during cleanup: {}", path.display(), e);
                    }
                }
            }
        }

        if !removed.is_empty() {
            debug!("Cleanup removed {} files", removed.len());
        }

        Ok(removed)
    }

    /// Post-render auto-clean hook. Failures are logged, never propagated.
    pub async fn auto_clean(&self, age_secs: u64) {
        if age_secs == 0 {
            return;
        }

        if let Err(e) = self.cleanup_older_than(Duration::from_secs(age_secs)).await {
            warn!("Auto-clean of {} failed: {}", self.save_dir.display(), e);
        }
    }
}
