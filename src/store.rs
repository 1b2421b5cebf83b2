//! Tile store contract shared by the remote archive reader and the embedded
//! KV store, plus the per-request context both implementations honour.
//!
//! Callers hold a `Box<dyn TileStore>` (or `Arc<dyn TileStore>`) chosen once by
//! `open_store`; nothing re-dispatches on the backing kind per request.

use std::path::Path;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use log::debug;

use crate::archive::header::Compression;
use crate::archive::ArchiveReader;
use crate::config::KvTilesConfig;
use crate::consts::KV_FILE;
use crate::error::{OpenError, TileError};
use crate::kv::KvTileStore;
use crate::meta::MapInfos;

/// Per-request context: optional deadline and optional cancellation flag.
///
/// Cheap to clone; the flag is shared, so cancelling one clone cancels all.
#[derive(Debug, Clone, Default)]
pub struct ReadCtx {
    deadline: Option<Instant>,
    cancel: Option<Arc<AtomicBool>>,
}

impl ReadCtx {
    /// No deadline, never cancelled.
    pub fn background() -> Self {
        Self::default()
    }

    pub fn with_timeout(timeout: Duration) -> Self {
        Self {
            deadline: Some(Instant::now() + timeout),
            cancel: None,
        }
    }

    pub fn with_deadline(deadline: Instant) -> Self {
        Self {
            deadline: Some(deadline),
            cancel: None,
        }
    }

    /// Attach a cancellation flag; setting it to true aborts the request at the next hop.
    pub fn cancel_on(mut self, flag: Arc<AtomicBool>) -> Self {
        self.cancel = Some(flag);
        self
    }

    pub fn is_cancelled(&self) -> bool {
        if let Some(flag) = &self.cancel {
            if flag.load(Ordering::Acquire) {
                return true;
            }
        }
        matches!(self.deadline, Some(d) if Instant::now() >= d)
    }

    #[inline]
    pub fn check(&self) -> Result<(), TileError> {
        if self.is_cancelled() {
            Err(TileError::Cancelled)
        } else {
            Ok(())
        }
    }

    /// Time left before the deadline (None = unbounded).
    pub fn remaining(&self) -> Option<Duration> {
        self.deadline
            .map(|d| d.saturating_duration_since(Instant::now()))
    }
}

/// Read access to a tile pyramid.
///
/// Implementations are safe for concurrent use from many threads; a failed
/// request never poisons the store for later ones.
pub trait TileStore: Send + Sync {
    /// Raw bytes of tile z/x/y (XYZ scheme), returned as stored.
    ///
    /// Absence is `TileError::NotFound`; everything else is a real failure.
    fn read_tile(&self, ctx: &ReadCtx, z: u8, x: u64, y: u64) -> Result<Vec<u8>, TileError>;

    /// Descriptive metadata of the whole pyramid.
    fn load_map_infos(&self) -> Result<MapInfos, TileError>;

    /// Encoding of the returned tile bytes, for Content-Encoding decisions.
    fn tile_compression(&self) -> Compression;

    /// Like `read_tile`, but absence is `Ok(None)`.
    fn fetch_tile(
        &self,
        ctx: &ReadCtx,
        z: u8,
        x: u64,
        y: u64,
    ) -> Result<Option<Vec<u8>>, TileError> {
        match self.read_tile(ctx, z, x, y) {
            Ok(v) => Ok(Some(v)),
            Err(e) if e.is_not_found() => Ok(None),
            Err(e) => Err(e),
        }
    }
}

/// Open a store by locator.
///
/// A local directory holding a record file opens as an embedded store,
/// anything else (URL, file, file:// URL) as a remote archive.
pub fn open_store(locator: &str, cfg: &KvTilesConfig) -> Result<Box<dyn TileStore>, OpenError> {
    let p = Path::new(locator);
    if p.is_dir() && p.join(KV_FILE).is_file() {
        debug!("open_store: {} -> embedded store", locator);
        return Ok(Box::new(KvTileStore::open_with_config(p, cfg)?));
    }
    debug!("open_store: {} -> archive reader", locator);
    Ok(Box::new(ArchiveReader::open(locator, cfg)?))
}
