use anyhow::{Context, Result};
use std::path::PathBuf;

use kvtiles::kv::{ingest, KvWriter, MemoryDump};
use kvtiles::metrics;

pub fn exec(
    dump: PathBuf,
    path: PathBuf,
    max_zoom: u8,
    center_lat: f64,
    center_lng: f64,
    region: String,
) -> Result<()> {
    let source = MemoryDump::from_path(&dump)?;
    let writer = KvWriter::create(&path)
        .with_context(|| format!("create store {}", path.display()))?;
    let report = ingest(writer, &source, center_lat, center_lng, max_zoom, &region)
        .with_context(|| format!("ingest {} -> {}", dump.display(), path.display()))?;

    let ms = metrics::metrics_snapshot();
    println!(
        "IMPORTED {} -> {}: schema={}, tiles={}, contents={}, dedup_hits={} ({:.1}%), skipped={}",
        dump.display(),
        path.display(),
        if report.legacy { "legacy" } else { "modern" },
        report.tiles,
        report.contents,
        report.dedup_hits,
        ms.dedup_ratio() * 100.0,
        report.skipped_rows
    );
    Ok(())
}
