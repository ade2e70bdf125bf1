//! Byte form of a [`Split`], shipped to the worker that scans it.
//!
//! ```text
//! chunk_count:u32
//! chunk*      tag:u8 = 1  id:str  data_object_id:i32  relative_file_id:i32  start_block:i32  finish_block:i32
//!             tag:u8 = 2  id:str  is_sub_partition:bool  blocks:i32
//! sequence_id:i32
//! total_blocks_across_all_splits:i32
//! ```
//!
//! Integers are big-endian, strings are a `u32` byte length followed by
//! UTF-8, booleans are one byte. The location hint stays with the
//! coordinator.

use crate::chunk::{DataChunk, ExtentChunk, PartitionChunk};
use crate::error::{SplitError, SplitResult};
use crate::planner::Split;

const TAG_EXTENT: u8 = 1;
const TAG_PARTITION: u8 = 2;

/// Cursor over an encoded split.
#[derive(Debug, Clone, Copy)]
pub struct ByteReader<'a> {
    bytes: &'a [u8],
    offset: usize,
}

impl<'a> ByteReader<'a> {
    pub fn new(bytes: &'a [u8]) -> Self {
        Self { bytes, offset: 0 }
    }

    pub fn position(&self) -> usize {
        self.offset
    }

    pub fn remaining(&self) -> usize {
        self.bytes.len().saturating_sub(self.offset)
    }

    pub fn read_exact(&mut self, len: usize, field: &'static str) -> SplitResult<&'a [u8]> {
        if len > self.remaining() {
            return Err(SplitError::codec(
                field,
                format!(
                    "unexpected end of input at offset {} (needed {} bytes, {} left)",
                    self.offset,
                    len,
                    self.remaining()
                ),
            ));
        }
        let start = self.offset;
        self.offset += len;
        Ok(&self.bytes[start..start + len])
    }

    pub fn read_array<const N: usize>(&mut self, field: &'static str) -> SplitResult<[u8; N]> {
        let bytes = self.read_exact(N, field)?;
        let mut out = [0u8; N];
        out.copy_from_slice(bytes);
        Ok(out)
    }

    pub fn read_u8(&mut self, field: &'static str) -> SplitResult<u8> {
        Ok(self.read_array::<1>(field)?[0])
    }

    pub fn read_u32(&mut self, field: &'static str) -> SplitResult<u32> {
        Ok(u32::from_be_bytes(self.read_array(field)?))
    }

    pub fn read_i32(&mut self, field: &'static str) -> SplitResult<i32> {
        Ok(i32::from_be_bytes(self.read_array(field)?))
    }

    pub fn read_bool(&mut self, field: &'static str) -> SplitResult<bool> {
        match self.read_u8(field)? {
            0 => Ok(false),
            1 => Ok(true),
            other => Err(SplitError::codec(field, format!("invalid boolean byte {}", other))),
        }
    }

    pub fn read_string(&mut self, field: &'static str) -> SplitResult<String> {
        let len = self.read_u32(field)? as usize;
        let bytes = self.read_exact(len, field)?;
        String::from_utf8(bytes.to_vec())
            .map_err(|e| SplitError::codec(field, format!("invalid UTF-8: {}", e)))
    }
}

impl<'a> From<&'a [u8]> for ByteReader<'a> {
    fn from(bytes: &'a [u8]) -> Self {
        ByteReader::new(bytes)
    }
}

#[derive(Debug, Default)]
struct ByteWriter {
    out: Vec<u8>,
}

impl ByteWriter {
    fn u8(&mut self, v: u8) {
        self.out.push(v);
    }

    fn u32(&mut self, v: u32) {
        self.out.extend_from_slice(&v.to_be_bytes());
    }

    fn i32(&mut self, v: i32) {
        self.out.extend_from_slice(&v.to_be_bytes());
    }

    fn bool(&mut self, v: bool) {
        self.u8(u8::from(v));
    }

    fn string(&mut self, field: &'static str, v: &str) -> SplitResult<()> {
        let len = u32::try_from(v.len())
            .map_err(|_| SplitError::codec(field, format!("string of {} bytes is too long", v.len())))?;
        self.u32(len);
        self.out.extend_from_slice(v.as_bytes());
        Ok(())
    }
}

fn to_wire_i32<T>(field: &'static str, v: T) -> SplitResult<i32>
where
    T: Copy + std::fmt::Display + TryInto<i32>,
{
    v.try_into()
        .map_err(|_| SplitError::codec(field, format!("value {} does not fit in 32 bits", v)))
}

fn from_wire_i32(field: &'static str, v: i32) -> SplitResult<u32> {
    u32::try_from(v).map_err(|_| SplitError::codec(field, format!("negative value {}", v)))
}

pub fn encode(split: &Split) -> SplitResult<Vec<u8>> {
    let mut w = ByteWriter::default();

    let count = u32::try_from(split.chunks.len())
        .map_err(|_| SplitError::codec("chunk_count", format!("{} chunks", split.chunks.len())))?;
    w.u32(count);

    for chunk in &split.chunks {
        match chunk {
            DataChunk::Extent(e) => {
                w.u8(TAG_EXTENT);
                w.string("id", &e.id)?;
                w.i32(e.data_object_id);
                w.i32(e.relative_file_id);
                w.i32(e.start_block);
                w.i32(e.finish_block);
            }
            DataChunk::Partition(p) => {
                w.u8(TAG_PARTITION);
                w.string("id", &p.partition_name)?;
                w.bool(p.is_sub_partition);
                w.i32(to_wire_i32("blocks", p.blocks)?);
            }
        }
    }

    w.i32(to_wire_i32("sequence_id", split.sequence_id)?);
    w.i32(to_wire_i32(
        "total_blocks_across_all_splits",
        split.total_blocks_across_all_splits,
    )?);
    Ok(w.out)
}

pub fn decode(bytes: &[u8]) -> SplitResult<Split> {
    let mut r = ByteReader::new(bytes);

    let count = r.read_u32("chunk_count")? as usize;
    // Each chunk needs at least a tag and a length prefix.
    if count > r.remaining() / 5 {
        return Err(SplitError::codec(
            "chunk_count",
            format!("{} chunks cannot fit in {} bytes", count, r.remaining()),
        ));
    }

    let mut chunks = Vec::with_capacity(count);
    for _ in 0..count {
        let chunk = match r.read_u8("tag")? {
            TAG_EXTENT => DataChunk::from(ExtentChunk::new(
                r.read_string("id")?,
                r.read_i32("data_object_id")?,
                r.read_i32("relative_file_id")?,
                r.read_i32("start_block")?,
                r.read_i32("finish_block")?,
            )),
            TAG_PARTITION => {
                let name = r.read_string("id")?;
                let is_sub_partition = r.read_bool("is_sub_partition")?;
                let blocks = from_wire_i32("blocks", r.read_i32("blocks")?)?;
                DataChunk::from(PartitionChunk::new(name, is_sub_partition, blocks))
            }
            other => {
                return Err(SplitError::codec(
                    "tag",
                    format!("unknown chunk tag {} at offset {}", other, r.position() - 1),
                ))
            }
        };
        chunks.push(chunk);
    }

    let sequence_id = from_wire_i32("sequence_id", r.read_i32("sequence_id")?)?;
    let total = from_wire_i32(
        "total_blocks_across_all_splits",
        r.read_i32("total_blocks_across_all_splits")?,
    )?;

    if r.remaining() != 0 {
        return Err(SplitError::codec(
            "split",
            format!("{} trailing bytes after offset {}", r.remaining(), r.position()),
        ));
    }

    Ok(Split {
        sequence_id,
        chunks,
        total_blocks_across_all_splits: u64::from(total),
        location_hint: None,
    })
}

/// Lowercase hex of [`encode`], for storing in the job configuration.
pub fn encode_hex(split: &Split) -> SplitResult<String> {
    Ok(hex::encode(encode(split)?))
}

pub fn decode_hex(text: &str) -> SplitResult<Split> {
    let bytes = hex::decode(text.trim()).map_err(|e| SplitError::codec("split", format!("invalid hex: {}", e)))?;
    decode(&bytes)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample() -> Split {
        Split {
            sequence_id: 3,
            chunks: vec![
                DataChunk::from(ExtentChunk::new("4_2", 73251, 4, 128, 255)),
                DataChunk::from(PartitionChunk::new("P_2024_EU", true, 40)),
                DataChunk::from(ExtentChunk::new("5_1", 73251, 5, 0, 0)),
            ],
            total_blocks_across_all_splits: 9000,
            location_hint: Some("node3".to_string()),
        }
    }

    #[test]
    fn test_roundtrip_drops_location_hint() {
        let split = sample();
        let decoded = decode(&encode(&split).unwrap()).unwrap();
        assert_eq!(decoded.chunks, split.chunks);
        assert_eq!(decoded.sequence_id, 3);
        assert_eq!(decoded.total_blocks_across_all_splits, 9000);
        assert_eq!(decoded.location_hint, None);
    }

    #[test]
    fn test_layout() {
        let split = Split {
            sequence_id: 1,
            chunks: vec![DataChunk::from(PartitionChunk::new("P1", false, 2))],
            total_blocks_across_all_splits: 7,
            location_hint: None,
        };
        let bytes = encode(&split).unwrap();
        assert_eq!(
            bytes,
            vec![
                0, 0, 0, 1, // chunk count
                2, // partition tag
                0, 0, 0, 2, b'P', b'1', // id
                0, // is_sub_partition
                0, 0, 0, 2, // blocks
                0, 0, 0, 1, // sequence id
                0, 0, 0, 7, // total blocks
            ]
        );
        assert_eq!(encode_hex(&split).unwrap(), hex::encode(&bytes));
    }

    #[test]
    fn test_hex_roundtrip() {
        let split = sample();
        let text = encode_hex(&split).unwrap();
        assert!(text.chars().all(|c| c.is_ascii_hexdigit() && !c.is_ascii_uppercase()));
        assert_eq!(decode_hex(&text).unwrap().chunks, split.chunks);
        assert!(decode_hex("zz").is_err());
    }

    #[test]
    fn test_truncated_input() {
        let bytes = encode(&sample()).unwrap();
        for len in [0, 3, 5, 12, bytes.len() - 1] {
            let err = decode(&bytes[..len]).unwrap_err();
            assert!(matches!(err, SplitError::Codec { .. }), "len {}", len);
        }
    }

    #[test]
    fn test_trailing_bytes() {
        let mut bytes = encode(&sample()).unwrap();
        bytes.push(0);
        let err = decode(&bytes).unwrap_err();
        assert!(err.to_string().contains("trailing"));
    }

    #[test]
    fn test_bad_tag_and_bool() {
        let split = Split {
            sequence_id: 0,
            chunks: vec![DataChunk::from(PartitionChunk::new("P", true, 1))],
            total_blocks_across_all_splits: 1,
            location_hint: None,
        };
        let good = encode(&split).unwrap();

        let mut bad_tag = good.clone();
        bad_tag[4] = 9;
        assert!(decode(&bad_tag).unwrap_err().to_string().contains("unknown chunk tag 9"));

        let mut bad_bool = good;
        bad_bool[10] = 2;
        let err = decode(&bad_bool).unwrap_err();
        assert!(matches!(err, SplitError::Codec { field: "is_sub_partition", .. }));
    }

    #[test]
    fn test_invalid_utf8() {
        let bytes = vec![0, 0, 0, 1, 2, 0, 0, 0, 1, 0xff, 0, 0, 0, 0, 1, 0, 0, 0, 0, 0, 0, 0, 1];
        let err = decode(&bytes).unwrap_err();
        assert!(matches!(err, SplitError::Codec { field: "id", .. }));
    }

    #[test]
    fn test_oversized_values_rejected() {
        let mut split = sample();
        split.total_blocks_across_all_splits = u64::from(u32::MAX);
        assert!(encode(&split).is_err());
    }
}
