// src/kv/store.rs: read side of the embedded tile store
//
// Open: shared lock -> mmap tiles.kv -> scan (+CRC) into an ordered index ->
// decode MapInfos (absent = not finalized). After open everything is
// immutable, so reads need no locking and the store is Send + Sync.
//
// read_tile: [tms flip] -> coordinate key -> content key -> tile bytes.

use std::collections::BTreeMap;
use std::fs::OpenOptions;
use std::ops::Bound;
use std::path::{Path, PathBuf};

use log::{debug, info};
use memmap2::{Mmap, MmapOptions};

use super::segment::scan_records;
use crate::archive::header::Compression;
use crate::config::KvTilesConfig;
use crate::consts::{CONTENT_PREFIX, KV_FILE, MAP_INFOS_KEY, MAX_ZOOM, TILES_URL_PREFIX};
use crate::error::{OpenError, TileError};
use crate::hash::coord_key;
use crate::lock::{try_acquire_lock, LockFailure, LockGuard, LockMode};
use crate::meta::MapInfos;
use crate::metrics::{record_tile_corrupt, record_tile_not_found, record_tile_served};
use crate::store::{ReadCtx, TileStore};

#[derive(Debug)]
pub struct KvTileStore {
    root: PathBuf,
    map: Mmap,
    /// key -> (value offset in map, value length)
    index: BTreeMap<Vec<u8>, (usize, usize)>,
    infos: MapInfos,
    tms: bool,
    _lock: LockGuard,
}

impl KvTileStore {
    pub fn open(root: &Path) -> Result<Self, OpenError> {
        Self::open_with_config(root, &KvTilesConfig::from_env())
    }

    pub fn open_with_config(root: &Path, cfg: &KvTilesConfig) -> Result<Self, OpenError> {
        let path = root.join(KV_FILE);
        let io_err = |source| OpenError::Io {
            path: path.clone(),
            source,
        };

        let lock = try_acquire_lock(root, LockMode::Shared).map_err(|e| match e {
            LockFailure::LockBusy(p) => OpenError::Locked(p),
            LockFailure::Io(source) => OpenError::Io {
                path: root.to_path_buf(),
                source,
            },
        })?;

        let file = OpenOptions::new().read(true).open(&path).map_err(io_err)?;
        let len = file.metadata().map_err(io_err)?.len() as usize;
        // the shared lock keeps writers away, so the file does not change under the map
        let map = unsafe { MmapOptions::new().len(len).map(&file).map_err(io_err)? };

        let mut index: BTreeMap<Vec<u8>, (usize, usize)> = BTreeMap::new();
        let records = scan_records(&map, cfg.verify_crc, |r| {
            index.insert(r.key.to_vec(), (r.value_offset, r.value_len));
        })?;

        let infos = match index.get(MAP_INFOS_KEY) {
            Some(&(off, len)) => MapInfos::decode(&map[off..off + len])?,
            None => return Err(OpenError::NotFinalized(root.to_path_buf())),
        };

        info!(
            "opened kv store {} ({} records, {} keys, tms={}, zoom {}..={})",
            root.display(),
            records,
            index.len(),
            infos.tms,
            infos.min_zoom,
            infos.max_zoom
        );

        Ok(Self {
            root: root.to_path_buf(),
            map,
            index,
            tms: infos.tms,
            infos,
            _lock: lock,
        })
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn is_tms(&self) -> bool {
        self.tms
    }

    pub fn read_tile(&self, ctx: &ReadCtx, z: u8, x: u64, y: u64) -> Result<Vec<u8>, TileError> {
        ctx.check()?;
        let not_found = || {
            record_tile_not_found();
            TileError::NotFound { z, x, y }
        };

        let row = if self.tms {
            flip_y(z, y).ok_or_else(not_found)?
        } else {
            y
        };

        let content_key = self.get(&coord_key(z, x, row)).ok_or_else(not_found)?;
        match self.get(content_key) {
            Some(bytes) => {
                record_tile_served();
                Ok(bytes.to_vec())
            }
            None => {
                record_tile_corrupt();
                debug!("tile {}/{}/{}: dangling content key {:02x?}", z, x, y, content_key);
                Err(TileError::CorruptEntry { z, x, y })
            }
        }
    }

    pub fn map_infos(&self) -> &MapInfos {
        &self.infos
    }

    fn get(&self, key: &[u8]) -> Option<&[u8]> {
        self.index
            .get(key)
            .map(|&(off, len)| &self.map[off..off + len])
    }

    /// Keys starting with `prefix`, in order.
    pub(crate) fn keys_with_prefix<'a>(&'a self, prefix: &'a [u8]) -> impl Iterator<Item = &'a [u8]> + 'a {
        self.index
            .range::<[u8], _>((Bound::Included(prefix), Bound::Unbounded))
            .map(|(k, _)| k.as_slice())
            .take_while(move |k| k.starts_with(prefix))
    }

    /// Distinct keys per space: (coordinates, contents).
    pub fn key_counts(&self) -> (usize, usize) {
        (
            self.keys_with_prefix(&[TILES_URL_PREFIX]).count(),
            self.keys_with_prefix(&[CONTENT_PREFIX]).count(),
        )
    }
}

/// Bottom-up row for top-down `y` at zoom `z`; None when `y` is outside the grid.
fn flip_y(z: u8, y: u64) -> Option<u64> {
    if z > MAX_ZOOM {
        return None;
    }
    let rows = 1u64 << z;
    if y >= rows {
        return None;
    }
    Some(rows - y - 1)
}

impl TileStore for KvTileStore {
    fn read_tile(&self, ctx: &ReadCtx, z: u8, x: u64, y: u64) -> Result<Vec<u8>, TileError> {
        KvTileStore::read_tile(self, ctx, z, x, y)
    }

    fn load_map_infos(&self) -> Result<MapInfos, TileError> {
        Ok(self.infos.clone())
    }

    fn tile_compression(&self) -> Compression {
        self.infos.tile_compression()
    }
}
