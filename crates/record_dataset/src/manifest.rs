//! Sidecar manifest written next to the record containers.
//!
//! Readers never need it; it records what an encode pass produced so containers can be
//! audited later.

use crate::summary::DatasetSummary;
use crate::types::{
    DatasetResult, RecordDatasetError, SplitKind, IMAGE_CHANNELS, IMAGE_HEIGHT, IMAGE_WIDTH,
};
use serde::{Deserialize, Serialize};
use sha2::Digest;
use std::fs::{self, File};
use std::io::{BufReader, Read};
use std::path::{Path, PathBuf};

pub const MANIFEST_FILE_NAME: &str = "manifest.json";

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ContainerMetadata {
    pub split: SplitKind,
    /// Container path relative to the manifest directory.
    pub relative_path: PathBuf,
    pub records: usize,
    /// Images that failed to load and were left out.
    pub skipped: usize,
    pub bytes: u64,
    pub checksum_sha256: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DatasetManifest {
    /// Source image root as a UTF-8 string.
    pub dataset_root: String,
    /// `[height, width, channels]` of every stored image.
    pub image_shape: [usize; 3],
    /// Class names in label order.
    pub classes: Vec<String>,
    pub train_fraction: f64,
    pub summary: DatasetSummary,
    pub containers: Vec<ContainerMetadata>,
    pub code_version: String,
    pub created_at_ms: u64,
}

impl DatasetManifest {
    /// Default code version string (crate version).
    pub fn default_code_version() -> String {
        env!("CARGO_PKG_VERSION").to_string()
    }

    pub fn new(
        dataset_root: &Path,
        classes: Vec<String>,
        train_fraction: f64,
        summary: DatasetSummary,
        containers: Vec<ContainerMetadata>,
    ) -> Self {
        let created_at_ms = std::time::SystemTime::now()
            .duration_since(std::time::UNIX_EPOCH)
            .map(|d| d.as_millis() as u64)
            .unwrap_or_default();
        Self {
            dataset_root: dataset_root.display().to_string(),
            image_shape: [IMAGE_HEIGHT, IMAGE_WIDTH, IMAGE_CHANNELS],
            classes,
            train_fraction,
            summary,
            containers,
            code_version: Self::default_code_version(),
            created_at_ms,
        }
    }

    pub fn container(&self, split: SplitKind) -> Option<&ContainerMetadata> {
        self.containers.iter().find(|c| c.split == split)
    }

    pub fn save(&self, path: &Path) -> DatasetResult<()> {
        let parent = path.parent().unwrap_or_else(|| Path::new("."));
        if !parent.as_os_str().is_empty() && !parent.exists() {
            fs::create_dir_all(parent).map_err(|e| RecordDatasetError::io(parent, e))?;
        }
        let data = serde_json::to_vec_pretty(self).map_err(|e| RecordDatasetError::Json {
            path: path.to_path_buf(),
            source: e,
        })?;
        fs::write(path, data).map_err(|e| RecordDatasetError::io(path, e))
    }

    pub fn load(path: &Path) -> DatasetResult<Self> {
        let raw = fs::read(path).map_err(|e| RecordDatasetError::io(path, e))?;
        serde_json::from_slice(&raw).map_err(|e| RecordDatasetError::Json {
            path: path.to_path_buf(),
            source: e,
        })
    }

    /// Recompute every container checksum under `root` and compare with the manifest.
    pub fn verify_checksums(&self, root: &Path) -> DatasetResult<()> {
        for container in &self.containers {
            let path = root.join(&container.relative_path);
            let actual = sha256_file(&path)?;
            if actual != container.checksum_sha256 {
                return Err(RecordDatasetError::Other(format!(
                    "sha256 mismatch for {}: manifest {}, file {}",
                    path.display(),
                    container.checksum_sha256,
                    actual
                )));
            }
            tracing::debug!(path = %path.display(), "container checksum ok");
        }
        Ok(())
    }
}

/// Hex SHA-256 of a file's contents.
pub fn sha256_file(path: &Path) -> DatasetResult<String> {
    let file = File::open(path).map_err(|e| RecordDatasetError::io(path, e))?;
    let mut reader = BufReader::new(file);
    let mut hasher = sha2::Sha256::new();
    let mut buf = vec![0u8; 1 << 16];
    loop {
        let n = reader
            .read(&mut buf)
            .map_err(|e| RecordDatasetError::io(path, e))?;
        if n == 0 {
            break;
        }
        hasher.update(&buf[..n]);
    }
    Ok(format!("{:x}", hasher.finalize()))
}
