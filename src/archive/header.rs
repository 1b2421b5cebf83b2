// src/archive/header.rs: PMTiles v3 header (127 bytes, LE)
//
// Layout:
//   0  magic7 = "PMTiles"
//   7  u8  version (<= 3)
//   8  u64 root_offset          16 u64 root_length
//  24  u64 metadata_offset      32 u64 metadata_length
//  40  u64 leaf_dirs_offset     48 u64 leaf_dirs_length
//  56  u64 tile_data_offset     64 u64 tile_data_length
//  72  u64 addressed_tiles      80 u64 tile_entries      88 u64 tile_contents
//  96  u8  clustered            97 u8 internal_compression
//  98  u8  tile_compression     99 u8 tile_type
// 100  u8  min_zoom            101 u8 max_zoom
// 102  i32 min_lon_e7  106 i32 min_lat_e7  110 i32 max_lon_e7  114 i32 max_lat_e7
// 118  u8  center_zoom         119 i32 center_lon_e7     123 i32 center_lat_e7

use byteorder::{LittleEndian, ReadBytesExt, WriteBytesExt};
use std::fmt;
use std::io::Cursor;

use crate::consts::{ARCHIVE_HEADER_LEN, ARCHIVE_MAGIC, ARCHIVE_MAX_VERSION};
use crate::error::CodecError;

/// Compression codec byte, used for directories/metadata and for tile payloads.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Compression {
    Unknown,
    None,
    Gzip,
    Brotli,
    Zstd,
    Other(u8),
}

impl Compression {
    pub fn from_u8(b: u8) -> Self {
        match b {
            0 => Compression::Unknown,
            1 => Compression::None,
            2 => Compression::Gzip,
            3 => Compression::Brotli,
            4 => Compression::Zstd,
            other => Compression::Other(other),
        }
    }

    pub fn to_u8(self) -> u8 {
        match self {
            Compression::Unknown => 0,
            Compression::None => 1,
            Compression::Gzip => 2,
            Compression::Brotli => 3,
            Compression::Zstd => 4,
            Compression::Other(b) => b,
        }
    }

    /// Value for an HTTP Content-Encoding header, if any.
    pub fn content_encoding(self) -> Option<&'static str> {
        match self {
            Compression::Gzip => Some("gzip"),
            Compression::Brotli => Some("br"),
            Compression::Zstd => Some("zstd"),
            _ => None,
        }
    }
}

impl fmt::Display for Compression {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Compression::Unknown => write!(f, "unknown"),
            Compression::None => write!(f, "none"),
            Compression::Gzip => write!(f, "gzip"),
            Compression::Brotli => write!(f, "brotli"),
            Compression::Zstd => write!(f, "zstd"),
            Compression::Other(b) => write!(f, "other({})", b),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TileType {
    Unknown,
    Mvt,
    Png,
    Jpeg,
    Webp,
    Avif,
    Other(u8),
}

impl TileType {
    pub fn from_u8(b: u8) -> Self {
        match b {
            0 => TileType::Unknown,
            1 => TileType::Mvt,
            2 => TileType::Png,
            3 => TileType::Jpeg,
            4 => TileType::Webp,
            5 => TileType::Avif,
            other => TileType::Other(other),
        }
    }

    pub fn to_u8(self) -> u8 {
        match self {
            TileType::Unknown => 0,
            TileType::Mvt => 1,
            TileType::Png => 2,
            TileType::Jpeg => 3,
            TileType::Webp => 4,
            TileType::Avif => 5,
            TileType::Other(b) => b,
        }
    }

    pub fn content_type(self) -> &'static str {
        match self {
            TileType::Mvt => "application/x-protobuf",
            TileType::Png => "image/png",
            TileType::Jpeg => "image/jpeg",
            TileType::Webp => "image/webp",
            TileType::Avif => "image/avif",
            _ => "application/octet-stream",
        }
    }
}

impl fmt::Display for TileType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TileType::Unknown => write!(f, "unknown"),
            TileType::Mvt => write!(f, "mvt"),
            TileType::Png => write!(f, "png"),
            TileType::Jpeg => write!(f, "jpeg"),
            TileType::Webp => write!(f, "webp"),
            TileType::Avif => write!(f, "avif"),
            TileType::Other(b) => write!(f, "other({})", b),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ArchiveHeader {
    pub version: u8,
    pub root_offset: u64,
    pub root_length: u64,
    pub metadata_offset: u64,
    pub metadata_length: u64,
    pub leaf_dirs_offset: u64,
    pub leaf_dirs_length: u64,
    pub tile_data_offset: u64,
    pub tile_data_length: u64,
    pub addressed_tiles: u64,
    pub tile_entries: u64,
    pub tile_contents: u64,
    /// Raw clustered byte; 1 means tile data is ordered by tile id.
    pub clustered: u8,
    pub internal_compression: Compression,
    pub tile_compression: Compression,
    pub tile_type: TileType,
    pub min_zoom: u8,
    pub max_zoom: u8,
    pub min_lon_e7: i32,
    pub min_lat_e7: i32,
    pub max_lon_e7: i32,
    pub max_lat_e7: i32,
    pub center_zoom: u8,
    pub center_lon_e7: i32,
    pub center_lat_e7: i32,
}

#[inline]
fn e7_to_deg(v: i32) -> f64 {
    f64::from(v) / 10_000_000.0
}

impl ArchiveHeader {
    pub fn center_lat(&self) -> f64 {
        e7_to_deg(self.center_lat_e7)
    }

    pub fn center_lon(&self) -> f64 {
        e7_to_deg(self.center_lon_e7)
    }

    pub fn is_clustered(&self) -> bool {
        self.clustered == 0x1
    }

    /// (min_lon, min_lat, max_lon, max_lat) in degrees.
    pub fn bounds(&self) -> (f64, f64, f64, f64) {
        (
            e7_to_deg(self.min_lon_e7),
            e7_to_deg(self.min_lat_e7),
            e7_to_deg(self.max_lon_e7),
            e7_to_deg(self.max_lat_e7),
        )
    }

    /// Serialize back to the 127-byte layout.
    pub fn to_bytes(&self) -> [u8; ARCHIVE_HEADER_LEN] {
        let mut v: Vec<u8> = Vec::with_capacity(ARCHIVE_HEADER_LEN);
        // writes into a Vec cannot fail
        let _ = self.write_fields(&mut v);
        let mut out = [0u8; ARCHIVE_HEADER_LEN];
        out.copy_from_slice(&v);
        out
    }

    fn write_fields(&self, v: &mut Vec<u8>) -> std::io::Result<()> {
        v.extend_from_slice(ARCHIVE_MAGIC);
        v.write_u8(self.version)?;
        for n in [
            self.root_offset,
            self.root_length,
            self.metadata_offset,
            self.metadata_length,
            self.leaf_dirs_offset,
            self.leaf_dirs_length,
            self.tile_data_offset,
            self.tile_data_length,
            self.addressed_tiles,
            self.tile_entries,
            self.tile_contents,
        ] {
            v.write_u64::<LittleEndian>(n)?;
        }
        v.write_u8(self.clustered)?;
        v.write_u8(self.internal_compression.to_u8())?;
        v.write_u8(self.tile_compression.to_u8())?;
        v.write_u8(self.tile_type.to_u8())?;
        v.write_u8(self.min_zoom)?;
        v.write_u8(self.max_zoom)?;
        v.write_i32::<LittleEndian>(self.min_lon_e7)?;
        v.write_i32::<LittleEndian>(self.min_lat_e7)?;
        v.write_i32::<LittleEndian>(self.max_lon_e7)?;
        v.write_i32::<LittleEndian>(self.max_lat_e7)?;
        v.write_u8(self.center_zoom)?;
        v.write_i32::<LittleEndian>(self.center_lon_e7)?;
        v.write_i32::<LittleEndian>(self.center_lat_e7)?;
        Ok(())
    }
}

/// Parse the fixed header. Magic and version are checked before any other field.
pub fn decode_header(d: &[u8]) -> Result<ArchiveHeader, CodecError> {
    if d.len() < ARCHIVE_HEADER_LEN {
        return Err(CodecError::Truncated {
            need: ARCHIVE_HEADER_LEN,
            have: d.len(),
        });
    }
    if &d[0..7] != ARCHIVE_MAGIC {
        return Err(CodecError::BadMagic);
    }
    let version = d[7];
    if version > ARCHIVE_MAX_VERSION {
        return Err(CodecError::UnsupportedVersion(version));
    }

    let mut r = Cursor::new(&d[8..ARCHIVE_HEADER_LEN]);
    Ok(ArchiveHeader {
        version,
        root_offset: r.read_u64::<LittleEndian>()?,
        root_length: r.read_u64::<LittleEndian>()?,
        metadata_offset: r.read_u64::<LittleEndian>()?,
        metadata_length: r.read_u64::<LittleEndian>()?,
        leaf_dirs_offset: r.read_u64::<LittleEndian>()?,
        leaf_dirs_length: r.read_u64::<LittleEndian>()?,
        tile_data_offset: r.read_u64::<LittleEndian>()?,
        tile_data_length: r.read_u64::<LittleEndian>()?,
        addressed_tiles: r.read_u64::<LittleEndian>()?,
        tile_entries: r.read_u64::<LittleEndian>()?,
        tile_contents: r.read_u64::<LittleEndian>()?,
        clustered: r.read_u8()?,
        internal_compression: Compression::from_u8(r.read_u8()?),
        tile_compression: Compression::from_u8(r.read_u8()?),
        tile_type: TileType::from_u8(r.read_u8()?),
        min_zoom: r.read_u8()?,
        max_zoom: r.read_u8()?,
        min_lon_e7: r.read_i32::<LittleEndian>()?,
        min_lat_e7: r.read_i32::<LittleEndian>()?,
        max_lon_e7: r.read_i32::<LittleEndian>()?,
        max_lat_e7: r.read_i32::<LittleEndian>()?,
        center_zoom: r.read_u8()?,
        center_lon_e7: r.read_i32::<LittleEndian>()?,
        center_lat_e7: r.read_i32::<LittleEndian>()?,
    })
}
