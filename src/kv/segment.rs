// src/kv/segment.rs: record file of the embedded tile store
//
// <root>/tiles.kv (LE):
//   header  [magic8 "KVTSEG01"][ver u32 = 1][flags u32 = 0]
//   records [klen u16][vlen u32][crc32 u32][key][value] ...
//
// crc32 (crc32fast) covers key||value. Records are append-only; when a key
// repeats, the later record wins at index time.

use byteorder::{ByteOrder, LittleEndian};
use crc32fast::Hasher as Crc32;
use std::io;

use crate::consts::{
    KV_HDR_SIZE, KV_MAGIC, KV_REC_HDR_SIZE, KV_REC_OFF_CRC32, KV_REC_OFF_KLEN, KV_REC_OFF_VLEN,
    KV_VERSION,
};
use crate::error::OpenError;

pub(crate) fn file_header() -> [u8; KV_HDR_SIZE] {
    let mut h = [0u8; KV_HDR_SIZE];
    h[..8].copy_from_slice(KV_MAGIC);
    LittleEndian::write_u32(&mut h[8..12], KV_VERSION);
    LittleEndian::write_u32(&mut h[12..16], 0);
    h
}

pub(crate) fn check_file_header(buf: &[u8]) -> Result<(), OpenError> {
    let corrupt = |reason: String| OpenError::CorruptRecord { offset: 0, reason };
    if buf.len() < KV_HDR_SIZE {
        return Err(corrupt(format!("file too short: {} bytes", buf.len())));
    }
    if &buf[..8] != KV_MAGIC {
        return Err(corrupt("bad magic".into()));
    }
    let ver = LittleEndian::read_u32(&buf[8..12]);
    if ver != KV_VERSION {
        return Err(corrupt(format!("unsupported record file version {}", ver)));
    }
    Ok(())
}

fn crc_of(key: &[u8], value: &[u8]) -> u32 {
    let mut h = Crc32::new();
    h.update(key);
    h.update(value);
    h.finalize()
}

/// Append one encoded record to `out`.
pub(crate) fn encode_record(key: &[u8], value: &[u8], out: &mut Vec<u8>) -> io::Result<()> {
    let klen = u16::try_from(key.len())
        .map_err(|_| io::Error::new(io::ErrorKind::InvalidInput, "key longer than 65535 bytes"))?;
    let vlen = u32::try_from(value.len())
        .map_err(|_| io::Error::new(io::ErrorKind::InvalidInput, "value longer than 4 GiB"))?;

    let mut hdr = [0u8; KV_REC_HDR_SIZE];
    LittleEndian::write_u16(&mut hdr[KV_REC_OFF_KLEN..KV_REC_OFF_KLEN + 2], klen);
    LittleEndian::write_u32(&mut hdr[KV_REC_OFF_VLEN..KV_REC_OFF_VLEN + 4], vlen);
    LittleEndian::write_u32(
        &mut hdr[KV_REC_OFF_CRC32..KV_REC_OFF_CRC32 + 4],
        crc_of(key, value),
    );
    out.reserve(KV_REC_HDR_SIZE + key.len() + value.len());
    out.extend_from_slice(&hdr);
    out.extend_from_slice(key);
    out.extend_from_slice(value);
    Ok(())
}

/// One record located inside the file image.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) struct RecordRef<'a> {
    pub key: &'a [u8],
    pub value_offset: usize,
    pub value_len: usize,
}

/// Walk every record after the file header.
///
/// Any truncated or CRC-mismatching record is an error: the writer fsyncs the
/// whole file before the store counts as finalized, so a torn tail never
/// belongs to a servable store.
pub(crate) fn scan_records<'a>(
    buf: &'a [u8],
    verify_crc: bool,
    mut visit: impl FnMut(RecordRef<'a>),
) -> Result<u64, OpenError> {
    check_file_header(buf)?;
    let mut pos = KV_HDR_SIZE;
    let mut n = 0u64;

    while pos < buf.len() {
        let corrupt = |reason: String| OpenError::CorruptRecord {
            offset: pos as u64,
            reason,
        };
        if buf.len() - pos < KV_REC_HDR_SIZE {
            return Err(corrupt("truncated record header".into()));
        }
        let hdr = &buf[pos..pos + KV_REC_HDR_SIZE];
        let klen = LittleEndian::read_u16(&hdr[KV_REC_OFF_KLEN..]) as usize;
        let vlen = LittleEndian::read_u32(&hdr[KV_REC_OFF_VLEN..]) as usize;
        let crc = LittleEndian::read_u32(&hdr[KV_REC_OFF_CRC32..]);

        let key_off = pos + KV_REC_HDR_SIZE;
        let val_off = key_off + klen;
        let end = val_off
            .checked_add(vlen)
            .filter(|&e| e <= buf.len())
            .ok_or_else(|| corrupt(format!("record body ({} + {} B) past end of file", klen, vlen)))?;

        let key = &buf[key_off..val_off];
        if verify_crc {
            let got = crc_of(key, &buf[val_off..end]);
            if got != crc {
                return Err(corrupt(format!(
                    "crc mismatch: stored {:#010x}, computed {:#010x}",
                    crc, got
                )));
            }
        }

        visit(RecordRef {
            key,
            value_offset: val_off,
            value_len: vlen,
        });
        n += 1;
        pos = end;
    }
    Ok(n)
}
