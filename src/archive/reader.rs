//! archive/reader: tile lookups against a remote (or local) PMTiles v3 archive.
//!
//! Open:
//! - one range read of `prefetch_bytes` from offset 0 (header + usually the root directory);
//! - root directory decoded and cached when the prefix covers it, otherwise
//!   range-read on every request (no lazily filled shared state);
//! - metadata JSON fetched once, best effort.
//!
//! Lookup walks root -> leaf -> leaf (at most MAX_DIRECTORY_DEPTH directories),
//! then range-reads the tile bytes and returns them verbatim.

use std::sync::Arc;
use std::time::Duration;

use log::{debug, info, warn};
use serde_json::Value;

use super::blob::{open_blob, BlobSource};
use super::directory::{decode_directory, decompress, find_tile, DirectoryEntry};
use super::header::{decode_header, ArchiveHeader, Compression};
use crate::config::KvTilesConfig;
use crate::consts::MAX_DIRECTORY_DEPTH;
use crate::error::{BlobError, CodecError, OpenError, TileError};
use crate::meta::MapInfos;
use crate::metrics::{
    record_directory_decode, record_root_cache_hit, record_tile_corrupt, record_tile_not_found,
    record_tile_served,
};
use crate::store::{ReadCtx, TileStore};
use crate::tileid::zxy_to_tile_id;

#[derive(Debug)]
pub struct ArchiveReader {
    blob: Arc<dyn BlobSource>,
    header: ArchiveHeader,
    root: Option<Vec<DirectoryEntry>>,
    metadata: Value,
    http_timeout: Duration,
}

impl ArchiveReader {
    pub fn open(locator: &str, cfg: &KvTilesConfig) -> Result<Self, OpenError> {
        let blob = open_blob(locator, cfg)?;
        Self::from_blob(blob, cfg)
    }

    /// Open over an already constructed blob backend.
    pub fn from_blob(blob: Arc<dyn BlobSource>, cfg: &KvTilesConfig) -> Result<Self, OpenError> {
        let prefix = blob.read_upto(0, cfg.prefetch_bytes, Some(cfg.http_timeout()))?;
        let header = decode_header(&prefix).map_err(OpenError::Header)?;
        debug!(
            "archive {}: v{} root@{}+{} leaves@{}+{} data@{}+{} internal={} tiles={}",
            blob.describe(),
            header.version,
            header.root_offset,
            header.root_length,
            header.leaf_dirs_offset,
            header.leaf_dirs_length,
            header.tile_data_offset,
            header.tile_data_length,
            header.internal_compression,
            header.tile_compression,
        );

        let root = match prefix_slice(&prefix, header.root_offset, header.root_length) {
            Some(bytes) if cfg.cache_root_dir => {
                let entries = decode_directory(bytes, header.internal_compression)
                    .map_err(OpenError::RootDirectory)?;
                record_directory_decode();
                debug!("root directory cached: {} entries", entries.len());
                Some(entries)
            }
            _ => {
                debug!(
                    "root directory not cached (prefix {} B, root ends at {})",
                    prefix.len(),
                    header.root_offset.saturating_add(header.root_length)
                );
                None
            }
        };

        let metadata = read_metadata(blob.as_ref(), &prefix, &header, cfg.http_timeout());

        info!(
            "opened archive {} (zoom {}..={}, {} addressed tiles)",
            blob.describe(),
            header.min_zoom,
            header.max_zoom,
            header.addressed_tiles
        );

        Ok(Self {
            blob,
            header,
            root,
            metadata,
            http_timeout: cfg.http_timeout(),
        })
    }

    pub fn header(&self) -> &ArchiveHeader {
        &self.header
    }

    /// Archive metadata JSON (`{}` when absent or unreadable).
    pub fn metadata(&self) -> &Value {
        &self.metadata
    }

    pub fn root_cached(&self) -> bool {
        self.root.is_some()
    }

    pub fn read_tile(&self, ctx: &ReadCtx, z: u8, x: u64, y: u64) -> Result<Vec<u8>, TileError> {
        let not_found = || {
            record_tile_not_found();
            TileError::NotFound { z, x, y }
        };
        let tile_id = zxy_to_tile_id(z, x, y).ok_or_else(not_found)?;

        let mut dir_offset = self.header.root_offset;
        let mut dir_length = self.header.root_length;

        for depth in 0..MAX_DIRECTORY_DEPTH {
            ctx.check()?;

            let fetched;
            let entries: &[DirectoryEntry] = match (&self.root, depth) {
                (Some(root), 0) => {
                    record_root_cache_hit();
                    root
                }
                _ => {
                    fetched = self.fetch_directory(ctx, (z, x, y), dir_offset, dir_length)?;
                    &fetched
                }
            };

            let entry = match find_tile(entries, tile_id) {
                Some(e) => *e,
                None => return Err(not_found()),
            };

            if entry.is_pointer() {
                dir_offset = self.header.leaf_dirs_offset.saturating_add(entry.offset);
                dir_length = u64::from(entry.length);
                continue;
            }

            ctx.check()?;
            let offset = self.header.tile_data_offset.saturating_add(entry.offset);
            let bytes = self
                .blob
                .read_range(offset, u64::from(entry.length), self.hop_timeout(ctx))
                .map_err(|source| transient(ctx, (z, x, y), source))?;
            record_tile_served();
            return Ok(bytes);
        }

        debug!("tile {}/{}/{}: directory depth exhausted", z, x, y);
        Err(not_found())
    }

    pub fn load_map_infos(&self) -> MapInfos {
        let text = |k: &str| {
            self.metadata
                .get(k)
                .and_then(Value::as_str)
                .unwrap_or_default()
                .to_string()
        };
        MapInfos {
            center_lat: self.header.center_lat(),
            center_lng: self.header.center_lon(),
            min_zoom: self.header.min_zoom,
            max_zoom: self.header.max_zoom,
            attribution: text("attribution"),
            name: text("name"),
            index_time: 0,
            tms: false,
            key_scheme: 0,
            tile_compression: self.header.tile_compression.to_u8(),
            tile_count: self.header.addressed_tiles,
            content_count: self.header.tile_contents,
        }
    }

    fn fetch_directory(
        &self,
        ctx: &ReadCtx,
        (z, x, y): (u8, u64, u64),
        offset: u64,
        length: u64,
    ) -> Result<Vec<DirectoryEntry>, TileError> {
        let bytes = self
            .blob
            .read_range(offset, length, self.hop_timeout(ctx))
            .map_err(|source| transient(ctx, (z, x, y), source))?;
        let entries = decode_directory(&bytes, self.header.internal_compression).map_err(
            |source| match source {
                CodecError::UnsupportedCompression(c) => TileError::UnsupportedCompression(c),
                source => {
                    record_tile_corrupt();
                    warn!("directory at {}+{} is corrupt: {}", offset, length, source);
                    TileError::CorruptDirectory {
                        z,
                        x,
                        y,
                        offset,
                        source,
                    }
                }
            },
        )?;
        record_directory_decode();
        Ok(entries)
    }

    /// Per-request budget bounds every range read.
    fn hop_timeout(&self, ctx: &ReadCtx) -> Option<Duration> {
        Some(match ctx.remaining() {
            Some(left) => left.min(self.http_timeout),
            None => self.http_timeout,
        })
    }
}

impl TileStore for ArchiveReader {
    fn read_tile(&self, ctx: &ReadCtx, z: u8, x: u64, y: u64) -> Result<Vec<u8>, TileError> {
        ArchiveReader::read_tile(self, ctx, z, x, y)
    }

    fn load_map_infos(&self) -> Result<MapInfos, TileError> {
        Ok(ArchiveReader::load_map_infos(self))
    }

    fn tile_compression(&self) -> Compression {
        self.header.tile_compression
    }
}

fn transient(ctx: &ReadCtx, (z, x, y): (u8, u64, u64), source: BlobError) -> TileError {
    if ctx.is_cancelled() {
        return TileError::Cancelled;
    }
    TileError::TransientIo { z, x, y, source }
}

fn prefix_slice(prefix: &[u8], offset: u64, length: u64) -> Option<&[u8]> {
    let end = offset.checked_add(length)?;
    if end > prefix.len() as u64 {
        return None;
    }
    Some(&prefix[offset as usize..end as usize])
}

fn read_metadata(
    blob: &dyn BlobSource,
    prefix: &[u8],
    header: &ArchiveHeader,
    timeout: Duration,
) -> Value {
    let empty = Value::Object(Default::default());
    if header.metadata_length == 0 {
        return empty;
    }
    let raw = match prefix_slice(prefix, header.metadata_offset, header.metadata_length) {
        Some(b) => b.to_vec(),
        None => match blob.read_range(header.metadata_offset, header.metadata_length, Some(timeout)) {
            Ok(b) => b,
            Err(e) => {
                warn!("{}: can't read metadata block: {}", blob.describe(), e);
                return empty;
            }
        },
    };
    let json = match decompress(&raw, header.internal_compression) {
        Ok(j) => j,
        Err(e) => {
            warn!("{}: can't decompress metadata block: {}", blob.describe(), e);
            return empty;
        }
    };
    match serde_json::from_slice::<Value>(&json) {
        Ok(v) if v.is_object() => v,
        Ok(_) => {
            warn!("{}: metadata is not a JSON object", blob.describe());
            empty
        }
        Err(e) => {
            warn!("{}: metadata is not valid JSON: {}", blob.describe(), e);
            empty
        }
    }
}
