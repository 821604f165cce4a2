//! Local mirror directory helpers: extension filter and non-recursive scans.

use std::ffi::OsStr;
use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use tracing::debug;
use walkdir::WalkDir;

/// Extensions mirrored from the device and shown in the slideshow.
pub const ACCEPTED_EXTENSIONS: &[&str] = &["jpg", "jpeg"];

/// Case-insensitive extension check on a bare file name.
pub fn is_image_name(name: &str) -> bool {
    is_image(Path::new(name))
}

#[inline]
pub fn is_image(p: &Path) -> bool {
    matches!(
        p.extension()
            .and_then(OsStr::to_str)
            .map(|s| s.to_ascii_lowercase()),
        Some(ref e) if ACCEPTED_EXTENSIONS.contains(&e.as_str())
    )
}

/// Create the mirror directory (and parents) if it does not exist yet.
pub fn ensure_library_dir(dir: &Path) -> Result<()> {
    fs::create_dir_all(dir)
        .with_context(|| format!("failed to create local mirror at {}", dir.display()))
}

/// Image files directly inside `dir`, sorted by path.
pub fn scan_library(dir: &Path) -> Result<Vec<PathBuf>> {
    let mut found = Vec::new();
    for entry in WalkDir::new(dir).min_depth(1).max_depth(1).follow_links(true) {
        let entry =
            entry.with_context(|| format!("failed to read mirror directory {}", dir.display()))?;
        if entry.file_type().is_file() && is_image(entry.path()) {
            found.push(entry.into_path());
        }
    }
    found.sort();
    debug!(dir = %dir.display(), count = found.len(), "scanned local mirror");
    Ok(found)
}
