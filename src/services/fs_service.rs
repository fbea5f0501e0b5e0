use crate::error::AppError;
use std::path::{Path, PathBuf};

// Formats the `image` crate can decode with its default features.
const IMAGE_EXTENSIONS: &[&str] = &[
    "jpg", "jpeg", "png", "gif", "bmp", "webp", "tiff", "tif", "ico",
];

pub fn is_image_file(path: &Path) -> bool {
    path.extension()
        .and_then(|ext| ext.to_str())
        .map(|ext| IMAGE_EXTENSIONS.contains(&ext.to_lowercase().as_str()))
        .unwrap_or(false)
}

/// Image files directly inside `dir`, sorted case-insensitively by file name.
pub fn list_image_files(dir: &Path) -> Result<Vec<PathBuf>, AppError> {
    if !dir.exists() {
        return Err(AppError::Io(format!("Path does not exist: {}", dir.display())));
    }

    let read_dir = std::fs::read_dir(dir)
        .map_err(|e| AppError::Io(format!("Cannot read directory {}: {}", dir.display(), e)))?;

    let mut images = Vec::new();

    for entry in read_dir {
        let entry = match entry {
            Ok(e) => e,
            Err(_) => continue,
        };

        let ft = match entry.file_type() {
            Ok(ft) => ft,
            Err(_) => continue,
        };

        if !ft.is_file() {
            continue;
        }

        let path = entry.path();
        if is_image_file(&path) {
            images.push(path);
        }
    }

    images.sort_by_key(|p| {
        p.file_name()
            .unwrap_or_default()
            .to_string_lossy()
            .to_lowercase()
    });

    Ok(images)
}

/// Expands command-line inputs: files are kept as given (whatever their
/// extension), directories are replaced by the images they contain.
pub fn expand_inputs(inputs: &[PathBuf]) -> Result<Vec<PathBuf>, AppError> {
    let mut files = Vec::new();
    for input in inputs {
        if input.is_dir() {
            files.extend(list_image_files(input)?);
        } else {
            files.push(input.clone());
        }
    }
    Ok(files)
}
