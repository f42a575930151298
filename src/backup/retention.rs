use std::fs;
use std::path::{Path, PathBuf};
use std::time::{Duration, SystemTime};

use anyhow::{Context, Result};
use tracing::info;

const SECONDS_PER_DAY: u64 = 24 * 60 * 60;

/// Deletes every entry of `backup_dir` last modified more than `max_age_days`
/// before `now`, returning the removed paths.
///
/// A missing directory is not an error. Entries with a modification time in
/// the future are kept.
pub fn sweep_old_backups(backup_dir: &Path, max_age_days: u64, now: SystemTime) -> Result<Vec<PathBuf>> {
    if !backup_dir.exists() {
        return Ok(Vec::new());
    }

    let max_age = Duration::from_secs(max_age_days.saturating_mul(SECONDS_PER_DAY));
    info!(max_age_days, dir = %backup_dir.display(), "Cleaning up backups older than retention window");

    let entries = fs::read_dir(backup_dir)
        .with_context(|| format!("Failed to read backup directory: {}", backup_dir.display()))?;

    let mut removed = Vec::new();
    for entry in entries {
        let entry = entry.with_context(|| format!("Failed to read entry in {}", backup_dir.display()))?;
        let path = entry.path();
        let metadata = entry
            .metadata()
            .with_context(|| format!("Failed to stat {}", path.display()))?;
        let modified = metadata
            .modified()
            .with_context(|| format!("Failed to read modification time of {}", path.display()))?;

        let Ok(age) = now.duration_since(modified) else {
            continue;
        };
        if age <= max_age {
            continue;
        }

        info!(file = %entry.file_name().to_string_lossy(), "Removing old backup");
        if metadata.is_dir() {
            fs::remove_dir_all(&path)
        } else {
            fs::remove_file(&path)
        }
        .with_context(|| format!("Failed to remove old backup: {}", path.display()))?;
        removed.push(path);
    }

    Ok(removed)
}
