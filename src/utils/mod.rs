pub mod setting;

use anyhow::{Context, Result};
use std::path::PathBuf;
use which::which;

/// Finds the mongodump executable in the system PATH.
pub fn find_mongodump_executable() -> Result<PathBuf> {
    which("mongodump").context("mongodump executable not found in PATH. Please ensure the MongoDB Database Tools are installed and in your PATH.")
}
