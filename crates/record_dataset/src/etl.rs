//! One encode pass: class tree → label mapping → split → train/test containers → manifest.

use crate::labels::build_label_mapping;
use crate::manifest::{ContainerMetadata, DatasetManifest, MANIFEST_FILE_NAME};
use crate::split::split_contiguous;
use crate::summary::summarize_mapping;
use crate::types::{DatasetResult, SplitKind, DEFAULT_TRAIN_FRACTION};
use crate::writer::{write_container_with, WriteReport};
use crate::ImageLoader;
use std::path::{Path, PathBuf};

pub const DEFAULT_TRAIN_CONTAINER: &str = "mon_train.tfrecords";
pub const DEFAULT_TEST_CONTAINER: &str = "mon_test.tfrecords";

#[derive(Debug, Clone)]
pub struct EncodeOptions {
    /// Root holding one subdirectory per class.
    pub dataset_root: PathBuf,
    /// Directory receiving both containers and the manifest.
    pub output_dir: PathBuf,
    pub train_name: String,
    pub test_name: String,
    pub train_fraction: f64,
    /// Write `manifest.json` next to the containers.
    pub write_manifest: bool,
}

impl EncodeOptions {
    pub fn new(dataset_root: impl Into<PathBuf>, output_dir: impl Into<PathBuf>) -> Self {
        Self {
            dataset_root: dataset_root.into(),
            output_dir: output_dir.into(),
            train_name: DEFAULT_TRAIN_CONTAINER.to_string(),
            test_name: DEFAULT_TEST_CONTAINER.to_string(),
            train_fraction: DEFAULT_TRAIN_FRACTION,
            write_manifest: true,
        }
    }

    pub fn train_path(&self) -> PathBuf {
        self.output_dir.join(&self.train_name)
    }

    pub fn test_path(&self) -> PathBuf {
        self.output_dir.join(&self.test_name)
    }

    pub fn manifest_path(&self) -> PathBuf {
        self.output_dir.join(MANIFEST_FILE_NAME)
    }
}

fn container_metadata(split: SplitKind, name: &str, report: &WriteReport) -> ContainerMetadata {
    ContainerMetadata {
        split,
        relative_path: PathBuf::from(name),
        records: report.written,
        skipped: report.skipped.len(),
        bytes: report.bytes,
        checksum_sha256: report.checksum_sha256.clone(),
    }
}

/// Encode the class tree at `opts.dataset_root` into a train and a test container.
///
/// Fails before creating any output when the root is missing or holds no images.
pub fn encode_dataset(opts: &EncodeOptions) -> DatasetResult<DatasetManifest> {
    encode_dataset_with(opts, &ImageLoader::default())
}

pub fn encode_dataset_with(opts: &EncodeOptions, loader: &ImageLoader) -> DatasetResult<DatasetManifest> {
    let mapping = build_label_mapping(&opts.dataset_root)?;
    let summary = summarize_mapping(&mapping);
    tracing::info!(
        root = %opts.dataset_root.display(),
        classes = summary.num_classes(),
        images = summary.total,
        "indexed dataset"
    );
    for class in &summary.classes {
        tracing::debug!(class = %class.name, code = class.code, images = class.images, "class");
    }
    for class in summary.empty_classes() {
        tracing::warn!(class = %class.name, "class directory has no images");
    }

    let (train, test) = split_contiguous(&mapping.samples, opts.train_fraction);
    tracing::info!(train = train.len(), test = test.len(), "split listing");

    let mut containers = Vec::with_capacity(2);
    for (split, name, samples) in [
        (SplitKind::Train, &opts.train_name, &train),
        (SplitKind::Test, &opts.test_name, &test),
    ] {
        let paths: Vec<PathBuf> = samples.iter().map(|s| s.path.clone()).collect();
        let labels: Vec<i64> = samples.iter().map(|s| s.label).collect();
        let report = write_container_with(&opts.output_dir.join(name), &paths, &labels, loader)?;
        containers.push(container_metadata(split, name, &report));
    }

    let manifest = DatasetManifest::new(
        &opts.dataset_root,
        mapping.classes,
        opts.train_fraction,
        summary,
        containers,
    );
    if opts.write_manifest {
        manifest.save(&opts.manifest_path())?;
    }
    Ok(manifest)
}

/// Path of the manifest that sits next to `container`, if any.
pub fn sibling_manifest(container: &Path) -> Option<PathBuf> {
    let path = container.parent()?.join(MANIFEST_FILE_NAME);
    path.exists().then_some(path)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::RecordDatasetError;
    use image::{Rgb, RgbImage};
    use tempfile::TempDir;

    fn make_tree(root: &Path, classes: &[(&str, usize)]) {
        for (class, count) in classes {
            let dir = root.join(class);
            std::fs::create_dir_all(&dir).unwrap();
            for i in 0..*count {
                RgbImage::from_pixel(6, 6, Rgb([i as u8, 0, 0]))
                    .save(dir.join(format!("{i}.png")))
                    .unwrap();
            }
        }
    }

    #[test]
    fn writes_both_containers_and_manifest() {
        let tmp = TempDir::new().unwrap();
        let root = tmp.path().join("training");
        make_tree(&root, &[("n0", 3), ("n1", 2)]);
        let opts = EncodeOptions::new(&root, tmp.path().join("out"));

        let manifest = encode_dataset_with(&opts, &ImageLoader::new(4, 4)).unwrap();
        assert_eq!(manifest.classes, vec!["n0", "n1"]);
        let train = manifest.container(SplitKind::Train).unwrap();
        let test = manifest.container(SplitKind::Test).unwrap();
        assert_eq!((train.records, test.records), (4, 1));
        assert!(opts.train_path().exists());
        assert!(opts.test_path().exists());
        assert_eq!(sibling_manifest(&opts.train_path()), Some(opts.manifest_path()));
        manifest.verify_checksums(&opts.output_dir).unwrap();
    }

    #[test]
    fn empty_root_writes_nothing() {
        let tmp = TempDir::new().unwrap();
        let root = tmp.path().join("training");
        std::fs::create_dir_all(root.join("n0")).unwrap();
        let opts = EncodeOptions::new(&root, tmp.path().join("out"));
        assert!(matches!(
            encode_dataset(&opts),
            Err(RecordDatasetError::EmptyDataset { .. })
        ));
        assert!(!opts.output_dir.exists());
    }
}
