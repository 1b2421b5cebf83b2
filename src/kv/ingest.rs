// src/kv/ingest.rs: one-shot build of an embedded store from a tile dump
//
// Schema choice: `tiles` table present -> modern, else legacy (map + images).
// Both schemas share one key scheme:
//   t"z/x/y" -> c + xxhash64(data) BE      (coordinate -> content key)
//   c + xxhash64(data) BE -> data          (written once per distinct content)
// The legacy dump's own tile_id only joins map rows to images.
// Rows are stored as they come; legacy rows are bottom-up (tms = true).

use std::collections::{HashMap, HashSet};

use log::{debug, info, warn};

use super::dump::DumpSource;
use super::writer::KvWriter;
use crate::archive::header::Compression;
use crate::consts::CONTENT_KEY_LEN;
use crate::error::IngestError;
use crate::hash::{content_key, coord_key, KEY_SCHEME_DEFAULT};
use crate::meta::MapInfos;
use crate::metrics::record_ingest_row;
use crate::util::now_secs;

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct IngestReport {
    /// Dump used the map + images schema.
    pub legacy: bool,
    /// Coordinate keys written.
    pub tiles: u64,
    /// Distinct contents written.
    pub contents: u64,
    /// Rows whose content was already stored.
    pub dedup_hits: u64,
    /// Legacy map rows pointing at a missing image.
    pub skipped_rows: u64,
    pub min_zoom: Option<u8>,
}

struct Progress {
    report: IngestReport,
    compression: Option<Compression>,
}

impl Progress {
    fn new(legacy: bool) -> Self {
        Self {
            report: IngestReport {
                legacy,
                ..Default::default()
            },
            compression: None,
        }
    }

    fn content(&mut self, data: &[u8], written: bool) {
        if written {
            self.report.contents += 1;
        }
        if self.compression.is_none() && !data.is_empty() {
            self.compression = Some(sniff_compression(data));
        }
    }

    fn coordinate(&mut self, z: u8, dedup_hit: bool) {
        self.report.tiles += 1;
        if dedup_hit {
            self.report.dedup_hits += 1;
        }
        self.report.min_zoom = Some(self.report.min_zoom.map_or(z, |m| m.min(z)));
        record_ingest_row(dedup_hit);
        if self.report.tiles % 100_000 == 0 {
            info!("ingest: {} tiles written", self.report.tiles);
        }
    }
}

/// Build the store from `source` and finalize it with MapInfos.
pub fn ingest(
    mut writer: KvWriter,
    source: &dyn DumpSource,
    center_lat: f64,
    center_lng: f64,
    max_zoom: u8,
    region: &str,
) -> Result<IngestReport, IngestError> {
    let legacy = !source.has_table("tiles").map_err(IngestError::Source)?;
    info!(
        "ingest into {}: {} schema, max zoom {}",
        writer.root().display(),
        if legacy { "legacy (map + images)" } else { "modern (tiles)" },
        max_zoom
    );

    let mut p = Progress::new(legacy);
    if legacy {
        ingest_legacy(&mut writer, source, max_zoom, &mut p)?;
    } else {
        ingest_modern(&mut writer, source, max_zoom, &mut p)?;
    }

    let infos = MapInfos {
        center_lat,
        center_lng,
        min_zoom: p.report.min_zoom.unwrap_or(0),
        max_zoom,
        attribution: String::new(),
        name: region.to_string(),
        index_time: now_secs(),
        tms: legacy,
        key_scheme: KEY_SCHEME_DEFAULT.to_u32(),
        tile_compression: p.compression.unwrap_or(Compression::Unknown).to_u8(),
        tile_count: p.report.tiles,
        content_count: p.report.contents,
    };
    writer.finish(&infos)?;

    info!(
        "ingest done: {} tiles, {} contents, {} dedup hits, {} skipped",
        p.report.tiles, p.report.contents, p.report.dedup_hits, p.report.skipped_rows
    );
    Ok(p.report)
}

fn ingest_modern(
    writer: &mut KvWriter,
    source: &dyn DumpSource,
    max_zoom: u8,
    p: &mut Progress,
) -> Result<(), IngestError> {
    for row in source.tiles(max_zoom).map_err(IngestError::Source)? {
        let row = row.map_err(IngestError::Source)?;
        let ck = content_key(&row.data);
        writer.put(&coord_key(row.z, row.x, row.y), &ck)?;
        let written = writer.put_if_absent(&ck, &row.data)?;
        p.content(&row.data, written);
        p.coordinate(row.z, !written);
    }
    Ok(())
}

fn ingest_legacy(
    writer: &mut KvWriter,
    source: &dyn DumpSource,
    max_zoom: u8,
    p: &mut Progress,
) -> Result<(), IngestError> {
    let rows = source
        .map_rows(max_zoom)
        .map_err(IngestError::Source)?
        .collect::<anyhow::Result<Vec<_>>>()
        .map_err(IngestError::Source)?;
    let wanted: HashSet<&str> = rows.iter().map(|r| r.tile_id.as_str()).collect();
    debug!("legacy: {} map rows, {} distinct images referenced", rows.len(), wanted.len());

    // contents first, remembering which key each dump id resolved to
    let mut by_id: HashMap<String, [u8; CONTENT_KEY_LEN]> = HashMap::with_capacity(wanted.len());
    for img in source.images().map_err(IngestError::Source)? {
        let (tile_id, data) = img.map_err(IngestError::Source)?;
        if !wanted.contains(tile_id.as_str()) || by_id.contains_key(&tile_id) {
            continue;
        }
        let ck = content_key(&data);
        let written = writer.put_if_absent(&ck, &data)?;
        p.content(&data, written);
        by_id.insert(tile_id, ck);
    }

    let mut seen: HashSet<[u8; CONTENT_KEY_LEN]> = HashSet::with_capacity(by_id.len());
    for r in rows {
        let ck = match by_id.get(&r.tile_id) {
            Some(ck) => ck,
            None => {
                warn!(
                    "legacy: map row {}/{}/{} references missing image {}, skipped",
                    r.z, r.x, r.y, r.tile_id
                );
                p.report.skipped_rows += 1;
                continue;
            }
        };
        writer.put(&coord_key(r.z, r.x, r.y), ck)?;
        p.coordinate(r.z, !seen.insert(*ck));
    }
    Ok(())
}

fn sniff_compression(data: &[u8]) -> Compression {
    match data {
        [0x1f, 0x8b, ..] => Compression::Gzip,
        [0x28, 0xb5, 0x2f, 0xfd, ..] => Compression::Zstd,
        _ => Compression::None,
    }
}
