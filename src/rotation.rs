// rotation.rs
use log::{debug, info};
use std::fs::{self, OpenOptions};
use std::io;
use std::path::{Path, PathBuf};

// Size-based rotation for the active log file
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RotationPolicy {
    // Threshold in bytes; 0 disables rotation
    pub max_bytes: u64,
    // Number of archives kept next to the active file
    pub backup_count: usize,
}

impl RotationPolicy {
    pub fn new(max_bytes: u64, backup_count: usize) -> Self {
        RotationPolicy {
            max_bytes,
            backup_count,
        }
    }

    /// Returns true when appending `incoming_len` bytes to a file that is
    /// currently `current_len` bytes long would reach the threshold.
    /// An empty file is never rotated, and neither is any file when either
    /// `max_bytes` or `backup_count` is zero.
    pub fn should_rotate(&self, current_len: u64, incoming_len: u64) -> bool {
        self.max_bytes > 0
            && self.backup_count > 0
            && current_len > 0
            && current_len + incoming_len >= self.max_bytes
    }

    /// Archives `path` and leaves a fresh empty file in its place.
    pub fn rotate(&self, path: &Path) -> io::Result<()> {
        // Nowhere to archive to, keep appending to the active file
        if self.backup_count == 0 {
            debug!("Not rotating {}: no archives configured", path.display());
            return Ok(());
        }

        // Evict the oldest archive first
        let oldest = archive_path(path, self.backup_count);
        if oldest.exists() {
            debug!("Removing oldest archive {}", oldest.display());
            fs::remove_file(&oldest)?;
        }

        for index in (1..self.backup_count).rev() {
            let from = archive_path(path, index);
            if from.exists() {
                let to = archive_path(path, index + 1);
                debug!("Shifting {} -> {}", from.display(), to.display());
                fs::rename(&from, &to)?;
            }
        }

        let first = archive_path(path, 1);
        if path.exists() {
            fs::rename(path, &first)?;
        }
        OpenOptions::new().create(true).append(true).open(path)?;

        info!("Rotated {} into {}", path.display(), first.display());
        Ok(())
    }
}

/// Name of the archive at `index` (1 is the newest), e.g. `system_logs.json.3`.
pub fn archive_path(path: &Path, index: usize) -> PathBuf {
    let mut name = path.as_os_str().to_os_string();
    name.push(format!(".{}", index));
    PathBuf::from(name)
}
