//! Core types, error definitions, and the fixed record shape.

use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use thiserror::Error;

/// Image width stored in every record.
pub const IMAGE_WIDTH: usize = 224;
/// Image height stored in every record.
pub const IMAGE_HEIGHT: usize = 224;
/// RGB.
pub const IMAGE_CHANNELS: usize = 3;
/// Byte length of one encoded image (u8 per channel value).
pub const IMAGE_BYTES: usize = IMAGE_WIDTH * IMAGE_HEIGHT * IMAGE_CHANNELS;

/// Default fraction of the listing assigned to the train split.
pub const DEFAULT_TRAIN_FRACTION: f64 = 0.8;

pub type DatasetResult<T> = Result<T, RecordDatasetError>;

#[derive(Debug, Error)]
pub enum RecordDatasetError {
    #[error("io error at {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("dataset root not found: {path}")]
    NotFound { path: PathBuf },
    #[error("dataset root is not a directory: {path}")]
    NotADirectory { path: PathBuf },
    #[error("no labelled images found under {path}")]
    EmptyDataset { path: PathBuf },
    #[error("{paths} image paths but {labels} labels")]
    LengthMismatch { paths: usize, labels: usize },
    #[error("record image has {actual} bytes, expected {expected}")]
    ShapeMismatch { expected: usize, actual: usize },
    #[error("truncated record in {path} at byte {offset}")]
    Truncated { path: PathBuf, offset: u64 },
    #[error("checksum mismatch in {path} at byte {offset}: expected {expected:#010x}, got {actual:#010x}")]
    ChecksumMismatch {
        path: PathBuf,
        offset: u64,
        expected: u32,
        actual: u32,
    },
    #[error("invalid record: {msg}")]
    InvalidRecord { msg: String },
    #[error("record stream produced no samples; cannot repeat it indefinitely")]
    NothingToRepeat,
    #[error("invalid pipeline config: {msg}")]
    InvalidConfig { msg: String },
    #[error("json error at {path}: {source}")]
    Json {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },
    #[error("{0}")]
    Other(String),
}

impl RecordDatasetError {
    pub(crate) fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        RecordDatasetError::Io {
            path: path.into(),
            source,
        }
    }

    /// True for errors that indicate a malformed container rather than an environment problem.
    pub fn is_corruption(&self) -> bool {
        matches!(
            self,
            RecordDatasetError::Truncated { .. }
                | RecordDatasetError::ChecksumMismatch { .. }
                | RecordDatasetError::ShapeMismatch { .. }
                | RecordDatasetError::InvalidRecord { .. }
        )
    }
}

/// A loaded image in HWC layout, RGB, one byte per channel value.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ImageRecord {
    pub width: u32,
    pub height: u32,
    pub pixels: Vec<u8>,
}

impl ImageRecord {
    pub fn shape(&self) -> [usize; 3] {
        [self.height as usize, self.width as usize, IMAGE_CHANNELS]
    }

    /// Pixel values cast to f32 without rescaling.
    pub fn to_f32(&self) -> Vec<f32> {
        self.pixels.iter().map(|&v| v as f32).collect()
    }
}

/// One decoded record: a `[224, 224, 3]` f32 image and its class label.
#[derive(Debug, Clone, PartialEq)]
pub struct Sample {
    pub image: Vec<f32>,
    pub label: i32,
}

impl Sample {
    pub fn shape(&self) -> [usize; 3] {
        [IMAGE_HEIGHT, IMAGE_WIDTH, IMAGE_CHANNELS]
    }
}

/// Samples stacked along a new leading axis.
#[derive(Debug, Clone, PartialEq)]
pub struct Batch {
    /// Flattened `[len, 224, 224, 3]` pixel values.
    pub images: Vec<f32>,
    pub labels: Vec<i32>,
}

impl Batch {
    pub fn with_capacity(batch_size: usize) -> Self {
        Self {
            images: Vec::with_capacity(batch_size * IMAGE_BYTES),
            labels: Vec::with_capacity(batch_size),
        }
    }

    pub fn push(&mut self, sample: Sample) {
        self.images.extend_from_slice(&sample.image);
        self.labels.push(sample.label);
    }

    pub fn len(&self) -> usize {
        self.labels.len()
    }

    pub fn is_empty(&self) -> bool {
        self.labels.is_empty()
    }

    pub fn image_shape(&self) -> [usize; 4] {
        [self.len(), IMAGE_HEIGHT, IMAGE_WIDTH, IMAGE_CHANNELS]
    }

    /// Borrow the pixels of the `idx`-th image.
    pub fn image(&self, idx: usize) -> Option<&[f32]> {
        let start = idx.checked_mul(IMAGE_BYTES)?;
        self.images.get(start..start + IMAGE_BYTES)
    }
}

/// Which side of the contiguous split a container holds.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SplitKind {
    Train,
    Test,
}

impl SplitKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            SplitKind::Train => "train",
            SplitKind::Test => "test",
        }
    }
}
