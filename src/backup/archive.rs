// mongobackup/src/backup/archive.rs
use anyhow::{Context, Result};
use flate2::Compression;
use flate2::write::GzEncoder;
use std::fs::File;
use std::path::Path;
use tar::Builder;
use tracing::info;
use walkdir::WalkDir;

/// Creates a GZipped TAR archive of everything under `source_dir`.
///
/// Paths inside the archive are relative to `source_dir`; the root itself is
/// not included. The file is synced to disk before returning.
pub fn create_tar_gz_archive(source_dir: &Path, archive_dest_path: &Path) -> Result<()> {
    if !source_dir.is_dir() {
        return Err(anyhow::anyhow!(
            "Source for archival is not a directory: {}",
            source_dir.display()
        ));
    }

    info!(
        source = %source_dir.display(),
        dest = %archive_dest_path.display(),
        "Creating tar.gz archive"
    );

    let archive_file = File::create(archive_dest_path)
        .with_context(|| format!("Failed to create archive file: {}", archive_dest_path.display()))?;
    let enc = GzEncoder::new(archive_file, Compression::default());
    let mut tar_builder = Builder::new(enc);

    // WalkDir yields parents before children, so directories are recorded
    // before the files they contain.
    for entry in WalkDir::new(source_dir).sort_by_file_name() {
        let entry = entry.with_context(|| format!("Failed to walk directory: {}", source_dir.display()))?;
        let path = entry.path();
        let name = path.strip_prefix(source_dir).with_context(|| {
            format!(
                "Failed to strip prefix {} from {}",
                source_dir.display(),
                path.display()
            )
        })?;

        if name.as_os_str().is_empty() {
            continue;
        }

        if entry.file_type().is_dir() {
            tar_builder
                .append_dir(name, path)
                .with_context(|| format!("Failed to append directory {} to archive", path.display()))?;
        } else if entry.file_type().is_file() {
            tar_builder.append_path_with_name(path, name).with_context(|| {
                format!("Failed to append file {} as {} to archive", path.display(), name.display())
            })?;
        }
    }

    let encoder = tar_builder.into_inner().with_context(|| {
        format!("Failed to finish tar stream for archive: {}", archive_dest_path.display())
    })?;
    let file = encoder.finish().with_context(|| {
        format!("Failed to finish Gzip encoding for archive: {}", archive_dest_path.display())
    })?;
    file.sync_all()
        .with_context(|| format!("Failed to sync archive {} to disk", archive_dest_path.display()))?;

    info!(dest = %archive_dest_path.display(), "✓ Tar.gz archive created successfully");
    Ok(())
}
