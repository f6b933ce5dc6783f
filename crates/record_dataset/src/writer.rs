//! Sequential record container writer.

use crate::codec::RawRecord;
use crate::loader::ImageLoader;
use crate::types::{DatasetResult, ImageRecord, RecordDatasetError};
use rayon::prelude::*;
use sha2::Digest;
use std::fs::File;
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};
use std::time::Instant;

/// Images decoded in parallel per chunk; records are still written in input order.
const DECODE_CHUNK: usize = 64;
pub(crate) const DEFAULT_LOG_EVERY_RECORDS: usize = 500;

/// Appends framed records to a container file.
///
/// The file handle is owned by the writer and closed when it is dropped. Call [`finish`]
/// to flush and sync; a writer dropped early leaves whatever was written on disk.
///
/// [`finish`]: RecordWriter::finish
pub struct RecordWriter {
    path: PathBuf,
    file: BufWriter<File>,
    hasher: sha2::Sha256,
    records: usize,
    bytes: u64,
}

impl RecordWriter {
    pub fn create(path: &Path) -> DatasetResult<Self> {
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent).map_err(|e| RecordDatasetError::io(parent, e))?;
        }
        let file = File::create(path).map_err(|e| RecordDatasetError::io(path, e))?;
        Ok(Self {
            path: path.to_path_buf(),
            file: BufWriter::new(file),
            hasher: sha2::Sha256::new(),
            records: 0,
            bytes: 0,
        })
    }

    pub fn write_raw(&mut self, record: &RawRecord) -> DatasetResult<()> {
        let framed = record.encode_framed();
        self.hasher.update(&framed);
        self.file
            .write_all(&framed)
            .map_err(|e| RecordDatasetError::io(&self.path, e))?;
        self.records += 1;
        self.bytes += framed.len() as u64;
        Ok(())
    }

    pub fn write_record(&mut self, label: i64, image: &ImageRecord) -> DatasetResult<()> {
        self.write_raw(&RawRecord::labeled_image(label, image))
    }

    pub fn records(&self) -> usize {
        self.records
    }

    /// Flush buffered bytes and sync the file to disk.
    pub fn finish(mut self) -> DatasetResult<(usize, u64, String)> {
        self.file
            .flush()
            .map_err(|e| RecordDatasetError::io(&self.path, e))?;
        self.file
            .get_ref()
            .sync_all()
            .map_err(|e| RecordDatasetError::io(&self.path, e))?;
        let checksum = format!("{:x}", self.hasher.finalize());
        Ok((self.records, self.bytes, checksum))
    }
}

/// Outcome of one encode pass.
#[derive(Debug, Clone, Default)]
pub struct WriteReport {
    pub written: usize,
    /// Inputs whose image could not be loaded, in input order.
    pub skipped: Vec<PathBuf>,
    pub bytes: u64,
    pub checksum_sha256: String,
}

/// Encode `paths[i]` with `labels[i]` into a new container at `dest`.
///
/// Unreadable images are skipped together with their label. On a write error the
/// partially written container is left in place.
pub fn write_container(dest: &Path, paths: &[PathBuf], labels: &[i64]) -> DatasetResult<WriteReport> {
    write_container_with(dest, paths, labels, &ImageLoader::default())
}

pub fn write_container_with(
    dest: &Path,
    paths: &[PathBuf],
    labels: &[i64],
    loader: &ImageLoader,
) -> DatasetResult<WriteReport> {
    if paths.len() != labels.len() {
        return Err(RecordDatasetError::LengthMismatch {
            paths: paths.len(),
            labels: labels.len(),
        });
    }

    let started = Instant::now();
    let mut writer = RecordWriter::create(dest)?;
    let mut skipped = Vec::new();
    let mut last_logged = 0usize;

    for (chunk_paths, chunk_labels) in paths.chunks(DECODE_CHUNK).zip(labels.chunks(DECODE_CHUNK)) {
        let loaded: Vec<Option<ImageRecord>> =
            chunk_paths.par_iter().map(|p| loader.load(p)).collect();
        for ((path, label), image) in chunk_paths.iter().zip(chunk_labels).zip(loaded) {
            match image {
                Some(image) => writer.write_record(*label, &image)?,
                None => {
                    tracing::warn!(path = %path.display(), "skipping unreadable image");
                    skipped.push(path.clone());
                }
            }
        }
        if writer.records() - last_logged >= DEFAULT_LOG_EVERY_RECORDS {
            last_logged = writer.records();
            tracing::info!(
                dest = %dest.display(),
                written = writer.records(),
                skipped = skipped.len(),
                total = paths.len(),
                "encoding records"
            );
        }
    }

    let (written, bytes, checksum_sha256) = writer.finish()?;
    tracing::info!(
        dest = %dest.display(),
        written,
        skipped = skipped.len(),
        bytes,
        elapsed_ms = started.elapsed().as_millis() as u64,
        "wrote record container"
    );
    Ok(WriteReport {
        written,
        skipped,
        bytes,
        checksum_sha256,
    })
}
