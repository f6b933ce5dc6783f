//! Sequential record container reader and sample decoder.

use crate::codec::{masked_crc, RawRecord, IMAGE_FEATURE, LABEL_FEATURE};
use crate::types::{DatasetResult, RecordDatasetError, Sample, IMAGE_BYTES};
use std::collections::VecDeque;
use std::fs::File;
use std::io::{BufReader, Read};
use std::path::{Path, PathBuf};

/// Lazily yields raw records from one container, in file order.
///
/// The sequence ends at a clean end of file. The first error is yielded once and ends it.
pub struct RecordReader {
    path: PathBuf,
    inner: BufReader<File>,
    offset: u64,
    done: bool,
}

impl RecordReader {
    pub fn open(path: &Path) -> DatasetResult<Self> {
        let file = File::open(path).map_err(|e| RecordDatasetError::io(path, e))?;
        Ok(Self {
            path: path.to_path_buf(),
            inner: BufReader::new(file),
            offset: 0,
            done: false,
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Fill `buf` as far as possible; returns the number of bytes read before EOF.
    fn read_full(&mut self, buf: &mut [u8]) -> DatasetResult<usize> {
        let mut filled = 0;
        while filled < buf.len() {
            match self.inner.read(&mut buf[filled..]) {
                Ok(0) => break,
                Ok(n) => filled += n,
                Err(e) if e.kind() == std::io::ErrorKind::Interrupted => continue,
                Err(e) => return Err(RecordDatasetError::io(&self.path, e)),
            }
        }
        Ok(filled)
    }

    fn read_exact_or_truncated(&mut self, buf: &mut [u8], record_start: u64) -> DatasetResult<()> {
        if self.read_full(buf)? < buf.len() {
            return Err(RecordDatasetError::Truncated {
                path: self.path.clone(),
                offset: record_start,
            });
        }
        Ok(())
    }

    fn check_crc(&self, data: &[u8], expected: u32, offset: u64) -> DatasetResult<()> {
        let actual = masked_crc(data);
        if actual != expected {
            return Err(RecordDatasetError::ChecksumMismatch {
                path: self.path.clone(),
                offset,
                expected,
                actual,
            });
        }
        Ok(())
    }

    fn read_record(&mut self) -> DatasetResult<Option<RawRecord>> {
        let start = self.offset;
        let mut len_buf = [0u8; 8];
        match self.read_full(&mut len_buf)? {
            0 => return Ok(None),
            8 => {}
            _ => {
                return Err(RecordDatasetError::Truncated {
                    path: self.path.clone(),
                    offset: start,
                })
            }
        }
        let mut crc_buf = [0u8; 4];
        self.read_exact_or_truncated(&mut crc_buf, start)?;
        self.check_crc(&len_buf, u32::from_le_bytes(crc_buf), start)?;

        let len = usize::try_from(u64::from_le_bytes(len_buf)).map_err(|_| {
            RecordDatasetError::InvalidRecord {
                msg: format!("record at byte {start} is too large"),
            }
        })?;
        let mut payload = vec![0u8; len];
        self.read_exact_or_truncated(&mut payload, start)?;
        self.read_exact_or_truncated(&mut crc_buf, start)?;
        self.check_crc(&payload, u32::from_le_bytes(crc_buf), start)?;

        self.offset = start + 8 + 4 + len as u64 + 4;
        RawRecord::decode_payload(&payload).map(Some)
    }
}

impl Iterator for RecordReader {
    type Item = DatasetResult<RawRecord>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.done {
            return None;
        }
        match self.read_record() {
            Ok(Some(rec)) => Some(Ok(rec)),
            Ok(None) => {
                self.done = true;
                None
            }
            Err(e) => {
                self.done = true;
                Some(Err(e))
            }
        }
    }
}

/// Turn a raw record into a `[224, 224, 3]` f32 image and an i32 label.
pub fn decode_record(raw: &RawRecord) -> DatasetResult<Sample> {
    let bytes = raw.bytes(IMAGE_FEATURE)?;
    if bytes.len() != IMAGE_BYTES {
        return Err(RecordDatasetError::ShapeMismatch {
            expected: IMAGE_BYTES,
            actual: bytes.len(),
        });
    }
    let label = raw.int64(LABEL_FEATURE)?;
    let label = i32::try_from(label).map_err(|_| RecordDatasetError::InvalidRecord {
        msg: format!("label {label} does not fit in i32"),
    })?;
    Ok(Sample {
        image: bytes.iter().map(|&v| v as f32).collect(),
        label,
    })
}

/// Decoded samples from one or more containers, opened one at a time in order.
pub struct SampleIter {
    pending: VecDeque<PathBuf>,
    current: Option<RecordReader>,
    failed: bool,
}

impl Iterator for SampleIter {
    type Item = DatasetResult<Sample>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.failed {
            return None;
        }
        loop {
            if self.current.is_none() {
                let path = self.pending.pop_front()?;
                match RecordReader::open(&path) {
                    Ok(reader) => self.current = Some(reader),
                    Err(e) => {
                        self.failed = true;
                        return Some(Err(e));
                    }
                }
            }
            let reader = self.current.as_mut()?;
            match reader.next() {
                Some(Ok(raw)) => {
                    let decoded = decode_record(&raw);
                    if decoded.is_err() {
                        self.failed = true;
                    }
                    return Some(decoded);
                }
                Some(Err(e)) => {
                    self.failed = true;
                    return Some(Err(e));
                }
                None => self.current = None,
            }
        }
    }
}

/// Lazily decode every record of `paths`, in order.
pub fn decode_files(paths: &[PathBuf]) -> SampleIter {
    SampleIter {
        pending: paths.iter().cloned().collect(),
        current: None,
        failed: false,
    }
}

/// Number of well-formed records in a container; errors on the first malformed one.
pub fn count_records(path: &Path) -> DatasetResult<usize> {
    let mut n = 0;
    for rec in RecordReader::open(path)? {
        rec?;
        n += 1;
    }
    Ok(n)
}
