use std::fs::{self, File};
use std::io::{self, Write};
use std::path::{Path, PathBuf};
use std::process;
use std::sync::atomic::{AtomicU64, Ordering};

static STAGING_SEQUENCE: AtomicU64 = AtomicU64::new(0);

/// Stage `text` in a hidden sibling file unique to this write, flush it to
/// disk, then move it over `path`. A failed write never leaves a staging
/// file behind and never truncates the previous contents.
pub(crate) fn write_text_atomic(path: &Path, text: &str) -> io::Result<()> {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent)?;
    }

    let staging = unique_staging_path(path);
    let result = stage(&staging, text.as_bytes()).and_then(|()| promote(&staging, path));
    if result.is_err() {
        let _ = fs::remove_file(&staging);
    }
    result
}

fn stage(staging: &Path, bytes: &[u8]) -> io::Result<()> {
    let mut file = File::create(staging)?;
    file.write_all(bytes)?;
    file.sync_all()
}

fn promote(staging: &Path, destination: &Path) -> io::Result<()> {
    match fs::rename(staging, destination) {
        Ok(()) => Ok(()),
        // Windows refuses to rename over an existing file.
        Err(_) if destination.exists() => {
            fs::remove_file(destination)?;
            fs::rename(staging, destination)
        }
        Err(error) => Err(error),
    }
}

/// `.<file>.<pid>-<seq>.staging` next to `path`; concurrent saves of the
/// same profile never share a staging file.
fn unique_staging_path(path: &Path) -> PathBuf {
    let file_name = path
        .file_name()
        .and_then(|name| name.to_str())
        .unwrap_or("profile");
    let sequence = STAGING_SEQUENCE.fetch_add(1, Ordering::Relaxed);
    path.with_file_name(format!(".{file_name}.{}-{sequence}.staging", process::id()))
}
