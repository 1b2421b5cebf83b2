//! Lightweight global metrics for kvtiles.
//!
//! Потокобезопасные атомарные счётчики для подсистем:
//! - Remote archive (range reads, directory decodes, root cache)
//! - Tile reads (served / not found / corrupt)
//! - Ingestion (rows, dedup)

use std::sync::atomic::{AtomicU64, Ordering};

// ----- Remote archive -----
static RANGE_READS: AtomicU64 = AtomicU64::new(0);
static RANGE_BYTES: AtomicU64 = AtomicU64::new(0);
static DIRECTORY_DECODES: AtomicU64 = AtomicU64::new(0);
static ROOT_CACHE_HITS: AtomicU64 = AtomicU64::new(0);

// ----- Tile reads -----
static TILES_SERVED: AtomicU64 = AtomicU64::new(0);
static TILES_NOT_FOUND: AtomicU64 = AtomicU64::new(0);
static TILES_CORRUPT: AtomicU64 = AtomicU64::new(0);

// ----- Ingestion -----
static INGEST_ROWS: AtomicU64 = AtomicU64::new(0);
static INGEST_DEDUP_HITS: AtomicU64 = AtomicU64::new(0);

#[derive(Debug, Clone, Default)]
pub struct MetricsSnapshot {
    pub range_reads: u64,
    pub range_bytes: u64,
    pub directory_decodes: u64,
    pub root_cache_hits: u64,

    pub tiles_served: u64,
    pub tiles_not_found: u64,
    pub tiles_corrupt: u64,

    pub ingest_rows: u64,
    pub ingest_dedup_hits: u64,
}

impl MetricsSnapshot {
    pub fn avg_range_bytes(&self) -> f64 {
        if self.range_reads == 0 {
            0.0
        } else {
            self.range_bytes as f64 / self.range_reads as f64
        }
    }

    pub fn dedup_ratio(&self) -> f64 {
        if self.ingest_rows == 0 {
            0.0
        } else {
            self.ingest_dedup_hits as f64 / self.ingest_rows as f64
        }
    }
}

// ----- Recorders (remote archive) -----
pub fn record_range_read(bytes: usize) {
    RANGE_READS.fetch_add(1, Ordering::Relaxed);
    RANGE_BYTES.fetch_add(bytes as u64, Ordering::Relaxed);
}

pub fn record_directory_decode() {
    DIRECTORY_DECODES.fetch_add(1, Ordering::Relaxed);
}

pub fn record_root_cache_hit() {
    ROOT_CACHE_HITS.fetch_add(1, Ordering::Relaxed);
}

// ----- Recorders (tile reads) -----
pub fn record_tile_served() {
    TILES_SERVED.fetch_add(1, Ordering::Relaxed);
}
pub fn record_tile_not_found() {
    TILES_NOT_FOUND.fetch_add(1, Ordering::Relaxed);
}
pub fn record_tile_corrupt() {
    TILES_CORRUPT.fetch_add(1, Ordering::Relaxed);
}

// ----- Recorders (ingestion) -----
pub fn record_ingest_row(dedup_hit: bool) {
    INGEST_ROWS.fetch_add(1, Ordering::Relaxed);
    if dedup_hit {
        INGEST_DEDUP_HITS.fetch_add(1, Ordering::Relaxed);
    }
}

pub fn metrics_snapshot() -> MetricsSnapshot {
    MetricsSnapshot {
        range_reads: RANGE_READS.load(Ordering::Relaxed),
        range_bytes: RANGE_BYTES.load(Ordering::Relaxed),
        directory_decodes: DIRECTORY_DECODES.load(Ordering::Relaxed),
        root_cache_hits: ROOT_CACHE_HITS.load(Ordering::Relaxed),
        tiles_served: TILES_SERVED.load(Ordering::Relaxed),
        tiles_not_found: TILES_NOT_FOUND.load(Ordering::Relaxed),
        tiles_corrupt: TILES_CORRUPT.load(Ordering::Relaxed),
        ingest_rows: INGEST_ROWS.load(Ordering::Relaxed),
        ingest_dedup_hits: INGEST_DEDUP_HITS.load(Ordering::Relaxed),
    }
}
