//! Record containers and batch pipelines for image classification datasets.
//!
//! This crate provides utilities for:
//! - Deriving dense class labels from a `root/<class>/<image>` tree
//! - Loading and resizing images to the fixed 224x224 RGB record shape
//! - Writing and reading checksummed record containers
//! - Contiguous train/test splitting
//! - Shuffled, repeated, batched sample streams for training and evaluation
//! - Sidecar manifests describing written containers

pub mod codec;
pub mod etl;
pub mod labels;
pub mod loader;
pub mod manifest;
pub mod pipeline;
pub mod reader;
pub mod split;
pub mod summary;
pub mod types;
pub mod writer;

#[cfg(feature = "burn-runtime")]
pub mod batch;

pub use etl::{encode_dataset, EncodeOptions};
pub use labels::{build_label_mapping, LabelMapping, LabeledPath};
pub use loader::{load_image, ImageLoader};
pub use manifest::{ContainerMetadata, DatasetManifest};
pub use pipeline::{BatchIter, BatchPipeline, Mode, PipelineConfig, Repeat};
pub use reader::{count_records, decode_files, decode_record, RecordReader, SampleIter};
pub use split::split_contiguous;
pub use summary::{summarize_mapping, ClassSummary, DatasetSummary};
pub use types::*;
pub use writer::{write_container, RecordWriter, WriteReport};

#[cfg(feature = "burn-runtime")]
pub use batch::BurnBatch;
