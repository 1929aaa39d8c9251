use crate::error::{Error, Result};
use crate::pipeline::CancelToken;
use std::path::{Path, PathBuf};
use walkdir::WalkDir;

const SUPPORTED_EXT: &[&str] = &[
    "jpg", "jpeg", "png", "webp", "heic", "tiff", "tif", "bmp", "gif",
];

pub fn is_supported(path: &Path) -> bool {
    path.extension()
        .and_then(|ext| ext.to_str())
        .map(|ext| SUPPORTED_EXT.contains(&ext.to_lowercase().as_str()))
        .unwrap_or(false)
}

/// Returns `Ok(None)` when the walk was cancelled part way through.
pub fn discover_images(root: &Path, cancel: &CancelToken) -> Result<Option<Vec<PathBuf>>> {
    if !root.is_dir() {
        return Err(Error::Path(format!("Not a directory: {}", root.display())));
    }

    let mut discovered = Vec::new();
    for entry in WalkDir::new(root).follow_links(true) {
        if cancel.is_cancelled() {
            return Ok(None);
        }
        let entry = match entry {
            Ok(entry) => entry,
            Err(err) => {
                log::warn!("Skipping unreadable entry under {}: {}", root.display(), err);
                continue;
            }
        };
        if entry.file_type().is_file() && is_supported(entry.path()) {
            discovered.push(entry.into_path());
        }
    }
    discovered.sort();
    Ok(Some(discovered))
}
