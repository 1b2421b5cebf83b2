// src/archive/directory.rs: directory blocks of a PMTiles v3 archive
//
// Decompressed block = unsigned LEB128 varints in five passes:
//   N
//   N x tile_id delta        (accumulated -> ascending ids)
//   N x run_length           (0 = pointer to a leaf directory)
//   N x length
//   N x offset               (entry 0: offset+1; i>0: 0 = contiguous with i-1, else offset+1)

use flate2::read::GzDecoder;
use flate2::write::GzEncoder;
use std::io::{Read, Write};

use super::header::Compression;
use crate::error::CodecError;
use crate::util::{read_uvarint, write_uvarint};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DirectoryEntry {
    pub tile_id: u64,
    pub offset: u64,
    pub length: u32,
    pub run_length: u32,
}

impl DirectoryEntry {
    /// Pointer entries address a leaf directory and own every id up to the next entry.
    #[inline]
    pub fn is_pointer(&self) -> bool {
        self.run_length == 0
    }
}

/// Decompress a directory (or metadata) block with the archive's internal codec.
pub fn decompress(bytes: &[u8], compression: Compression) -> Result<Vec<u8>, CodecError> {
    match compression {
        Compression::None => Ok(bytes.to_vec()),
        Compression::Gzip => {
            let mut out = Vec::with_capacity(bytes.len() * 4);
            GzDecoder::new(bytes).read_to_end(&mut out)?;
            Ok(out)
        }
        other => Err(CodecError::UnsupportedCompression(other)),
    }
}

fn compress(raw: &[u8], compression: Compression) -> Result<Vec<u8>, CodecError> {
    match compression {
        Compression::None => Ok(raw.to_vec()),
        Compression::Gzip => {
            let mut enc = GzEncoder::new(Vec::new(), flate2::Compression::default());
            enc.write_all(raw)?;
            Ok(enc.finish()?)
        }
        other => Err(CodecError::UnsupportedCompression(other)),
    }
}

/// Decode one directory block.
pub fn decode_directory(
    bytes: &[u8],
    compression: Compression,
) -> Result<Vec<DirectoryEntry>, CodecError> {
    let raw = decompress(bytes, compression)?;
    decode_entries(&raw)
}

fn decode_entries(buf: &[u8]) -> Result<Vec<DirectoryEntry>, CodecError> {
    let mut pos = 0usize;
    let n = read_uvarint(buf, &mut pos)?;
    // every entry needs at least 4 bytes (one per pass)
    if n > (buf.len() as u64) / 4 + 1 {
        return Err(CodecError::Malformed(format!(
            "entry count {} does not fit a {} byte block",
            n,
            buf.len()
        )));
    }
    let n = n as usize;
    let mut entries = vec![
        DirectoryEntry {
            tile_id: 0,
            offset: 0,
            length: 0,
            run_length: 0,
        };
        n
    ];

    // 1) tile ids, delta-encoded
    let mut last_id = 0u64;
    for (i, e) in entries.iter_mut().enumerate() {
        let delta = read_uvarint(buf, &mut pos)?;
        if i > 0 && delta == 0 {
            return Err(CodecError::Malformed(format!(
                "tile ids not strictly ascending at entry {}",
                i
            )));
        }
        last_id = last_id
            .checked_add(delta)
            .ok_or_else(|| CodecError::Malformed("tile id overflow".into()))?;
        e.tile_id = last_id;
    }

    // 2) run lengths
    for e in entries.iter_mut() {
        e.run_length = to_u32(read_uvarint(buf, &mut pos)?, "run_length")?;
    }

    // 3) lengths
    for e in entries.iter_mut() {
        e.length = to_u32(read_uvarint(buf, &mut pos)?, "length")?;
    }

    // 4) offsets, relative to the previous entry when 0
    for i in 0..n {
        let v = read_uvarint(buf, &mut pos)?;
        entries[i].offset = if i > 0 && v == 0 {
            let prev = entries[i - 1];
            prev.offset
                .checked_add(u64::from(prev.length))
                .ok_or_else(|| CodecError::Malformed("offset overflow".into()))?
        } else if v == 0 {
            return Err(CodecError::Malformed(
                "first entry cannot use a relative offset".into(),
            ));
        } else {
            v - 1
        };
    }

    Ok(entries)
}

fn to_u32(v: u64, what: &str) -> Result<u32, CodecError> {
    u32::try_from(v).map_err(|_| CodecError::Malformed(format!("{} {} exceeds u32", what, v)))
}

/// Encode entries (ascending tile ids) into a compressed directory block.
pub fn encode_directory(
    entries: &[DirectoryEntry],
    compression: Compression,
) -> Result<Vec<u8>, CodecError> {
    let mut raw = Vec::with_capacity(entries.len() * 6 + 4);
    write_uvarint(entries.len() as u64, &mut raw);

    let mut last_id = 0u64;
    for (i, e) in entries.iter().enumerate() {
        if i > 0 && e.tile_id <= last_id {
            return Err(CodecError::Malformed(format!(
                "tile ids not strictly ascending at entry {}",
                i
            )));
        }
        write_uvarint(e.tile_id - last_id, &mut raw);
        last_id = e.tile_id;
    }
    for e in entries {
        write_uvarint(u64::from(e.run_length), &mut raw);
    }
    for e in entries {
        write_uvarint(u64::from(e.length), &mut raw);
    }
    for (i, e) in entries.iter().enumerate() {
        let contiguous = i > 0 && {
            let prev = &entries[i - 1];
            prev.offset + u64::from(prev.length) == e.offset
        };
        if contiguous {
            write_uvarint(0, &mut raw);
        } else {
            write_uvarint(e.offset + 1, &mut raw);
        }
    }

    compress(&raw, compression)
}

/// Find the entry responsible for `tile_id`.
///
/// The candidate is the entry with the largest tile_id <= target. A pointer
/// candidate always matches (its leaf covers the whole range up to the next
/// entry); a data candidate matches only inside its run.
pub fn find_tile(entries: &[DirectoryEntry], tile_id: u64) -> Option<&DirectoryEntry> {
    let idx = entries.partition_point(|e| e.tile_id <= tile_id);
    if idx == 0 {
        return None;
    }
    let c = &entries[idx - 1];
    if c.run_length == 0 || tile_id - c.tile_id < u64::from(c.run_length) {
        Some(c)
    } else {
        None
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn e(tile_id: u64, offset: u64, length: u32, run_length: u32) -> DirectoryEntry {
        DirectoryEntry {
            tile_id,
            offset,
            length,
            run_length,
        }
    }

    #[test]
    fn lookup_semantics() {
        let dir = vec![e(10, 0, 100, 0), e(50, 100, 20, 5), e(100, 120, 40, 0)];

        assert_eq!(find_tile(&dir, 5), None);
        for t in 10..50 {
            assert_eq!(find_tile(&dir, t).map(|x| x.tile_id), Some(10), "target {t}");
        }
        assert_eq!(find_tile(&dir, 50).map(|x| x.tile_id), Some(50));
        assert_eq!(find_tile(&dir, 52).map(|x| x.tile_id), Some(50));
        assert_eq!(find_tile(&dir, 54).map(|x| x.tile_id), Some(50));
        assert_eq!(find_tile(&dir, 55), None);
        assert_eq!(find_tile(&dir, 99), None);
        for t in [100, 101, 5_000, u64::MAX] {
            assert_eq!(find_tile(&dir, t).map(|x| x.tile_id), Some(100), "target {t}");
        }
    }

    #[test]
    fn lookup_empty() {
        assert_eq!(find_tile(&[], 0), None);
    }

    #[test]
    fn contiguous_offsets_encode_as_zero() {
        let dir = vec![e(0, 0, 10, 1), e(1, 10, 5, 1), e(2, 100, 7, 2)];
        let raw = encode_directory(&dir, Compression::None).unwrap();
        // N, 3 deltas, 3 run lengths, 3 lengths, then offsets 1, 0, 101
        assert_eq!(raw, vec![3, 0, 1, 1, 1, 1, 2, 10, 5, 7, 1, 0, 101]);
        assert_eq!(decode_directory(&raw, Compression::None).unwrap(), dir);
    }

    #[test]
    fn gzip_roundtrip() {
        let dir = vec![e(3, 0, 512, 1), e(7, 512, 64, 0), e(90, 4_096, 33, 12)];
        let block = encode_directory(&dir, Compression::Gzip).unwrap();
        assert_eq!(&block[..2], &[0x1f, 0x8b]);
        assert_eq!(decode_directory(&block, Compression::Gzip).unwrap(), dir);
    }

    #[test]
    fn randomized_roundtrip() {
        let mut rng = oorandom::Rand64::new(0x6b76_7469_6c65);
        for _ in 0..200 {
            let n = rng.rand_range(0..300) as usize;
            let mut dir = Vec::with_capacity(n);
            let mut id = rng.rand_range(0..1_000);
            let mut off = 0u64;
            for _ in 0..n {
                let length = rng.rand_range(1..100_000) as u32;
                let run_length = rng.rand_range(0..4) as u32;
                // mostly contiguous, sometimes a gap
                if rng.rand_range(0..5) == 0 {
                    off += rng.rand_range(1..10_000);
                }
                dir.push(e(id, off, length, run_length));
                off += u64::from(length);
                id += rng.rand_range(1..50);
            }
            let block = encode_directory(&dir, Compression::Gzip).unwrap();
            assert_eq!(decode_directory(&block, Compression::Gzip).unwrap(), dir);
        }
    }

    #[test]
    fn unsupported_compression_rejected() {
        for c in [
            Compression::Brotli,
            Compression::Zstd,
            Compression::Unknown,
            Compression::Other(7),
        ] {
            assert!(matches!(
                decode_directory(&[1, 2, 3], c),
                Err(CodecError::UnsupportedCompression(x)) if x == c
            ));
        }
    }

    #[test]
    fn truncated_block_fails_closed() {
        let dir = vec![e(1, 0, 10, 1), e(2, 10, 10, 1)];
        let raw = encode_directory(&dir, Compression::None).unwrap();
        let cut = &raw[..raw.len() - 1];
        assert!(decode_directory(cut, Compression::None).is_err());
    }

    #[test]
    fn bad_gzip_fails_closed() {
        assert!(matches!(
            decode_directory(&[0x1f, 0x8b, 0, 0, 0], Compression::Gzip),
            Err(CodecError::Io(_))
        ));
    }

    #[test]
    fn first_offset_zero_is_malformed() {
        // N=1, delta 0, run 1, len 1, offset 0 (relative on entry 0)
        let raw = vec![1u8, 0, 1, 1, 0];
        assert!(matches!(
            decode_directory(&raw, Compression::None),
            Err(CodecError::Malformed(_))
        ));
    }
}
