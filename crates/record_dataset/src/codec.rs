//! Record framing and the self-describing feature payload.
//!
//! Framing (little endian), one record after another with no file header:
//!
//! ```text
//! u64 payload_len | u32 masked_crc32c(payload_len) | payload | u32 masked_crc32c(payload)
//! ```
//!
//! Payload:
//!
//! ```text
//! u32 feature_count
//! repeated: u16 name_len | name | u8 kind | value
//!   kind 0 (int64): i64
//!   kind 1 (bytes): u64 len | bytes
//! ```

use crate::types::{DatasetResult, ImageRecord, RecordDatasetError};

pub const LABEL_FEATURE: &str = "label";
pub const IMAGE_FEATURE: &str = "image_raw";

/// Bytes preceding the payload: length plus its checksum.
pub const FRAME_HEADER_LEN: usize = 8 + 4;
/// Bytes following the payload.
pub const FRAME_FOOTER_LEN: usize = 4;

const KIND_INT64: u8 = 0;
const KIND_BYTES: u8 = 1;
const MASK_DELTA: u32 = 0xa282_ead8;

pub fn masked_crc(data: &[u8]) -> u32 {
    let crc = crc32c::crc32c(data);
    crc.rotate_right(15).wrapping_add(MASK_DELTA)
}

#[derive(Debug, Clone, PartialEq)]
pub enum Feature {
    Int64(i64),
    Bytes(Vec<u8>),
}

/// Serialized feature map of one record, before framing.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct RawRecord {
    pub features: Vec<(String, Feature)>,
}

impl RawRecord {
    pub fn labeled_image(label: i64, image: &ImageRecord) -> Self {
        Self {
            features: vec![
                (IMAGE_FEATURE.to_string(), Feature::Bytes(image.pixels.clone())),
                (LABEL_FEATURE.to_string(), Feature::Int64(label)),
            ],
        }
    }

    pub fn get(&self, name: &str) -> Option<&Feature> {
        self.features
            .iter()
            .find(|(n, _)| n == name)
            .map(|(_, f)| f)
    }

    pub fn int64(&self, name: &str) -> DatasetResult<i64> {
        match self.get(name) {
            Some(Feature::Int64(v)) => Ok(*v),
            Some(Feature::Bytes(_)) => Err(invalid(format!("feature `{name}` is not int64"))),
            None => Err(invalid(format!("missing feature `{name}`"))),
        }
    }

    pub fn bytes(&self, name: &str) -> DatasetResult<&[u8]> {
        match self.get(name) {
            Some(Feature::Bytes(v)) => Ok(v),
            Some(Feature::Int64(_)) => Err(invalid(format!("feature `{name}` is not bytes"))),
            None => Err(invalid(format!("missing feature `{name}`"))),
        }
    }

    pub fn encode_payload(&self) -> Vec<u8> {
        let mut out = Vec::new();
        out.extend_from_slice(&(self.features.len() as u32).to_le_bytes());
        for (name, feature) in &self.features {
            out.extend_from_slice(&(name.len() as u16).to_le_bytes());
            out.extend_from_slice(name.as_bytes());
            match feature {
                Feature::Int64(v) => {
                    out.push(KIND_INT64);
                    out.extend_from_slice(&v.to_le_bytes());
                }
                Feature::Bytes(bytes) => {
                    out.push(KIND_BYTES);
                    out.extend_from_slice(&(bytes.len() as u64).to_le_bytes());
                    out.extend_from_slice(bytes);
                }
            }
        }
        out
    }

    pub fn decode_payload(payload: &[u8]) -> DatasetResult<Self> {
        let mut cur = Cursor { data: payload, pos: 0 };
        let count = u32::from_le_bytes(cur.array()?) as usize;
        let mut features = Vec::with_capacity(count.min(16));
        for _ in 0..count {
            let name_len = u16::from_le_bytes(cur.array()?) as usize;
            let name = std::str::from_utf8(cur.take(name_len)?)
                .map_err(|_| invalid("feature name is not UTF-8".to_string()))?
                .to_string();
            let [kind] = cur.array::<1>()?;
            let feature = match kind {
                KIND_INT64 => Feature::Int64(i64::from_le_bytes(cur.array()?)),
                KIND_BYTES => {
                    let len = u64::from_le_bytes(cur.array()?);
                    let len = usize::try_from(len)
                        .map_err(|_| invalid(format!("bytes feature `{name}` too large")))?;
                    Feature::Bytes(cur.take(len)?.to_vec())
                }
                other => return Err(invalid(format!("unknown feature kind {other} for `{name}`"))),
            };
            features.push((name, feature));
        }
        if cur.pos != payload.len() {
            return Err(invalid(format!(
                "{} trailing bytes after features",
                payload.len() - cur.pos
            )));
        }
        Ok(Self { features })
    }

    /// Payload wrapped in length and checksum framing.
    pub fn encode_framed(&self) -> Vec<u8> {
        frame(&self.encode_payload())
    }
}

pub fn frame(payload: &[u8]) -> Vec<u8> {
    let len = (payload.len() as u64).to_le_bytes();
    let mut out = Vec::with_capacity(FRAME_HEADER_LEN + payload.len() + FRAME_FOOTER_LEN);
    out.extend_from_slice(&len);
    out.extend_from_slice(&masked_crc(&len).to_le_bytes());
    out.extend_from_slice(payload);
    out.extend_from_slice(&masked_crc(payload).to_le_bytes());
    out
}

fn invalid(msg: String) -> RecordDatasetError {
    RecordDatasetError::InvalidRecord { msg }
}

struct Cursor<'a> {
    data: &'a [u8],
    pos: usize,
}

impl<'a> Cursor<'a> {
    fn take(&mut self, n: usize) -> DatasetResult<&'a [u8]> {
        let end = self
            .pos
            .checked_add(n)
            .filter(|end| *end <= self.data.len())
            .ok_or_else(|| invalid(format!("payload ends inside a field at byte {}", self.pos)))?;
        let out = &self.data[self.pos..end];
        self.pos = end;
        Ok(out)
    }

    fn array<const N: usize>(&mut self) -> DatasetResult<[u8; N]> {
        let mut arr = [0u8; N];
        arr.copy_from_slice(self.take(N)?);
        Ok(arr)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn masked_crc_matches_reference_value() {
        // crc32c("") == 0, so the masked value is just the delta.
        assert_eq!(masked_crc(b""), MASK_DELTA);
        assert_ne!(masked_crc(b"a"), masked_crc(b"b"));
    }

    #[test]
    fn payload_preserves_features_and_order() {
        let rec = RawRecord {
            features: vec![
                ("label".into(), Feature::Int64(-7)),
                ("image_raw".into(), Feature::Bytes(vec![1, 2, 3])),
                ("extra".into(), Feature::Bytes(Vec::new())),
            ],
        };
        let decoded = RawRecord::decode_payload(&rec.encode_payload()).unwrap();
        assert_eq!(decoded, rec);
        assert_eq!(decoded.int64("label").unwrap(), -7);
        assert_eq!(decoded.bytes("image_raw").unwrap(), &[1, 2, 3]);
    }

    #[test]
    fn mistyped_and_missing_features_are_invalid() {
        let rec = RawRecord {
            features: vec![("label".into(), Feature::Bytes(vec![0]))],
        };
        assert!(matches!(
            rec.int64("label"),
            Err(RecordDatasetError::InvalidRecord { .. })
        ));
        assert!(matches!(
            rec.bytes("image_raw"),
            Err(RecordDatasetError::InvalidRecord { .. })
        ));
    }

    #[test]
    fn short_payload_is_invalid() {
        let rec = RawRecord {
            features: vec![("image_raw".into(), Feature::Bytes(vec![9; 32]))],
        };
        let payload = rec.encode_payload();
        let err = RawRecord::decode_payload(&payload[..payload.len() - 1]).unwrap_err();
        assert!(matches!(err, RecordDatasetError::InvalidRecord { .. }));
        let mut extended = payload.clone();
        extended.push(0);
        assert!(RawRecord::decode_payload(&extended).is_err());
    }

    #[test]
    fn frame_layout() {
        let framed = frame(b"abc");
        assert_eq!(framed.len(), FRAME_HEADER_LEN + 3 + FRAME_FOOTER_LEN);
        assert_eq!(&framed[..8], &3u64.to_le_bytes());
        assert_eq!(&framed[12..15], b"abc");
        assert_eq!(&framed[15..], &masked_crc(b"abc").to_le_bytes());
    }
}
