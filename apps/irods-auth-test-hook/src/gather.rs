//! Copies the service account's logs into the CI output directory.

use std::fs;
use std::path::Path;

use anyhow::Context;
use tracing::{info, warn};
use walkdir::WalkDir;

/// Copies every file under `source` into `destination`, keeping relative paths.
///
/// A missing `source` is logged and yields zero files. Files that cannot be
/// copied are logged and skipped.
///
/// # Errors
///
/// Fails only if `destination` cannot be created.
pub fn gather_logs(source: &Path, destination: &Path) -> anyhow::Result<usize> {
    if !source.is_dir() {
        warn!(source = %source.display(), "Log directory does not exist; nothing gathered");
        return Ok(0);
    }
    fs::create_dir_all(destination)
        .with_context(|| format!("cannot create {}", destination.display()))?;

    let mut copied = 0usize;
    for entry in WalkDir::new(source).follow_links(false) {
        let entry = match entry {
            Ok(entry) => entry,
            Err(e) => {
                warn!(error = %e, "Skipping unreadable log entry");
                continue;
            }
        };
        if !entry.file_type().is_file() {
            continue;
        }
        let Ok(relative) = entry.path().strip_prefix(source) else {
            continue;
        };

        let target = destination.join(relative);
        let result = target
            .parent()
            .map_or(Ok(()), fs::create_dir_all)
            .and_then(|()| fs::copy(entry.path(), &target));
        match result {
            Ok(_) => copied += 1,
            Err(e) => warn!(file = %entry.path().display(), error = %e, "Failed to gather log file"),
        }
    }

    info!(
        files = copied,
        source = %source.display(),
        destination = %destination.display(),
        "Gathered logs"
    );
    Ok(copied)
}
