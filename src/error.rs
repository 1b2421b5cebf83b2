//! Error taxonomy of the storage engine.
//!
//! - CodecError : header/directory bytes that cannot be decoded (pure codec layer).
//! - BlobError  : one failed range read against the backing blob.
//! - OpenError  : store construction failed; nothing usable exists.
//! - TileError  : one request failed; the store stays usable.
//! - IngestError : the one-shot build of an embedded store failed.

use std::io;
use std::path::PathBuf;

use thiserror::Error;

use crate::archive::header::Compression;

#[derive(Debug, Error)]
pub enum CodecError {
    #[error("truncated input: need {need} bytes, have {have}")]
    Truncated { need: usize, have: usize },

    #[error("magic number not detected, not a PMTiles archive")]
    BadMagic,

    #[error("archive format version {0} not supported (max 3)")]
    UnsupportedVersion(u8),

    #[error("unsupported compression: {0}")]
    UnsupportedCompression(Compression),

    #[error("varint overflows u64")]
    VarintOverflow,

    #[error("malformed directory: {0}")]
    Malformed(String),

    #[error("decompression failed: {0}")]
    Io(#[from] io::Error),
}

#[derive(Debug, Error)]
pub enum BlobError {
    #[error("io error on {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("http status {status} for {url}")]
    Http { url: String, status: u16 },

    #[error("http request to {url} failed: {source}")]
    Request {
        url: String,
        #[source]
        source: reqwest::Error,
    },

    #[error("range read timed out")]
    TimedOut,

    #[error("short read at offset {offset}: wanted {wanted} bytes, got {got}")]
    ShortRead { offset: u64, wanted: u64, got: u64 },

    #[error("range {offset}+{length} is outside the addressable blob")]
    Range { offset: u64, length: u64 },
}

#[derive(Debug, Error)]
pub enum OpenError {
    #[error("invalid locator {0:?}")]
    Locator(String),

    #[error("io error on {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("can't read archive prefix: {0}")]
    Blob(#[from] BlobError),

    #[error("bad archive header: {0}")]
    Header(#[source] CodecError),

    #[error("bad root directory: {0}")]
    RootDirectory(#[source] CodecError),

    #[error("store at {0} is locked by a writer")]
    Locked(PathBuf),

    #[error("corrupt record at offset {offset}: {reason}")]
    CorruptRecord { offset: u64, reason: String },

    #[error("store at {0} is not finalized (no map infos)")]
    NotFinalized(PathBuf),

    #[error("can't decode map infos: {0}")]
    MapInfos(#[source] serde_json::Error),

    #[error("unsupported content key scheme {0}")]
    KeyScheme(u32),
}

#[derive(Debug, Error)]
pub enum TileError {
    #[error("tile {z}/{x}/{y} not found")]
    NotFound { z: u8, x: u64, y: u64 },

    #[error("tile {z}/{x}/{y}: content entry missing for existing coordinate")]
    CorruptEntry { z: u8, x: u64, y: u64 },

    #[error("tile {z}/{x}/{y}: range read failed: {source}")]
    TransientIo {
        z: u8,
        x: u64,
        y: u64,
        #[source]
        source: BlobError,
    },

    #[error("tile {z}/{x}/{y}: directory at offset {offset}: {source}")]
    CorruptDirectory {
        z: u8,
        x: u64,
        y: u64,
        offset: u64,
        #[source]
        source: CodecError,
    },

    #[error("unsupported directory compression: {0}")]
    UnsupportedCompression(Compression),

    #[error("request cancelled or deadline exceeded")]
    Cancelled,
}

impl TileError {
    #[inline]
    pub fn is_not_found(&self) -> bool {
        matches!(self, TileError::NotFound { .. })
    }
}

#[derive(Debug, Error)]
pub enum IngestError {
    #[error("target {0} already holds a store")]
    TargetExists(PathBuf),

    #[error("store write failed: {0}")]
    Store(#[from] io::Error),

    #[error("can't read source dump: {0}")]
    Source(#[source] anyhow::Error),

    #[error("can't encode map infos: {0}")]
    Encode(#[from] serde_json::Error),

    #[error("target is locked: {0}")]
    Locked(PathBuf),
}
