//! Class label derivation from a `root/<class>/<image>` directory tree.

use crate::types::{DatasetResult, RecordDatasetError};
use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};

/// File extensions (lowercase) treated as images when listing class directories.
pub const IMAGE_EXTENSIONS: [&str; 3] = ["jpg", "jpeg", "png"];

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LabeledPath {
    pub path: PathBuf,
    pub label: i64,
}

/// Dense label codes for every class directory plus the labelled image listing.
#[derive(Debug, Clone)]
pub struct LabelMapping {
    /// Class names sorted lexicographically; the index is the label code.
    pub classes: Vec<String>,
    pub codes: BTreeMap<String, i64>,
    /// Images in class-major, file-name order.
    pub samples: Vec<LabeledPath>,
}

impl LabelMapping {
    pub fn num_classes(&self) -> usize {
        self.classes.len()
    }

    pub fn code(&self, class_name: &str) -> Option<i64> {
        self.codes.get(class_name).copied()
    }

    pub fn class_name(&self, code: i64) -> Option<&str> {
        usize::try_from(code)
            .ok()
            .and_then(|i| self.classes.get(i))
            .map(String::as_str)
    }

    pub fn paths(&self) -> Vec<PathBuf> {
        self.samples.iter().map(|s| s.path.clone()).collect()
    }

    pub fn labels(&self) -> Vec<i64> {
        self.samples.iter().map(|s| s.label).collect()
    }
}

fn has_image_extension(path: &Path) -> bool {
    path.extension()
        .and_then(|e| e.to_str())
        .map(|e| e.to_ascii_lowercase())
        .is_some_and(|e| IMAGE_EXTENSIONS.contains(&e.as_str()))
}

fn list_sorted(dir: &Path) -> DatasetResult<Vec<PathBuf>> {
    let mut entries = fs::read_dir(dir)
        .map_err(|e| RecordDatasetError::io(dir, e))?
        .map(|entry| {
            entry
                .map(|e| e.path())
                .map_err(|e| RecordDatasetError::io(dir, e))
        })
        .collect::<DatasetResult<Vec<_>>>()?;
    entries.sort();
    Ok(entries)
}

/// Scan `root`, assign each class subdirectory its index in sorted order, and label every image.
///
/// Each image is labelled from its own parent directory, so the label list and the path list
/// stay paired regardless of how the filesystem orders directory entries.
pub fn build_label_mapping(root: &Path) -> DatasetResult<LabelMapping> {
    if !root.exists() {
        return Err(RecordDatasetError::NotFound {
            path: root.to_path_buf(),
        });
    }
    if !root.is_dir() {
        return Err(RecordDatasetError::NotADirectory {
            path: root.to_path_buf(),
        });
    }

    let class_dirs: Vec<PathBuf> = list_sorted(root)?
        .into_iter()
        .filter(|p| p.is_dir())
        .collect();

    let mut classes = Vec::with_capacity(class_dirs.len());
    let mut codes = BTreeMap::new();
    let mut samples = Vec::new();
    for dir in class_dirs {
        let Some(name) = dir.file_name().map(|n| n.to_string_lossy().into_owned()) else {
            continue;
        };
        let code = classes.len() as i64;
        let images: Vec<PathBuf> = list_sorted(&dir)?
            .into_iter()
            .filter(|p| p.is_file() && has_image_extension(p))
            .collect();
        tracing::debug!(class = %name, code, images = images.len(), "indexed class directory");
        samples.extend(
            images
                .into_iter()
                .map(|path| LabeledPath { path, label: code }),
        );
        codes.insert(name.clone(), code);
        classes.push(name);
    }

    if samples.is_empty() {
        return Err(RecordDatasetError::EmptyDataset {
            path: root.to_path_buf(),
        });
    }

    Ok(LabelMapping {
        classes,
        codes,
        samples,
    })
}
