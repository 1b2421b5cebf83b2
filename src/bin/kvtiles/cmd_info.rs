use anyhow::{Context, Result};
use serde_json::json;
use std::path::Path;

use kvtiles::{ArchiveReader, KvTileStore, KvTilesConfig, MapInfos};

use super::util::is_store_dir;

pub fn exec(locator: String, json: bool) -> Result<()> {
    let cfg = KvTilesConfig::from_env();

    if is_store_dir(&locator) {
        let store = KvTileStore::open_with_config(Path::new(&locator), &cfg)
            .with_context(|| format!("open store {}", locator))?;
        let (coords, contents) = store.key_counts();
        let infos = store.map_infos();
        if json {
            let v = json!({
                "kind": "kv",
                "map_infos": infos,
                "keys": { "coordinates": coords, "contents": contents },
            });
            println!("{}", serde_json::to_string_pretty(&v)?);
        } else {
            println!("kind: embedded store ({})", locator);
            print_infos(infos);
            println!("keys: {} coordinates, {} contents", coords, contents);
        }
        return Ok(());
    }

    let reader =
        ArchiveReader::open(&locator, &cfg).with_context(|| format!("open archive {}", locator))?;
    let h = reader.header();
    let infos = reader.load_map_infos();
    if json {
        let (min_lon, min_lat, max_lon, max_lat) = h.bounds();
        let v = json!({
            "kind": "archive",
            "map_infos": infos,
            "header": {
                "version": h.version,
                "tile_type": h.tile_type.to_string(),
                "tile_compression": h.tile_compression.to_string(),
                "internal_compression": h.internal_compression.to_string(),
                "clustered": h.is_clustered(),
                "addressed_tiles": h.addressed_tiles,
                "tile_entries": h.tile_entries,
                "tile_contents": h.tile_contents,
                "bounds": [min_lon, min_lat, max_lon, max_lat],
                "center_zoom": h.center_zoom,
                "root_cached": reader.root_cached(),
            },
            "metadata": reader.metadata(),
        });
        println!("{}", serde_json::to_string_pretty(&v)?);
    } else {
        println!("kind: archive v{} ({})", h.version, locator);
        print_infos(&infos);
        println!(
            "tiles: type={}, compression={}, internal={}, clustered={}",
            h.tile_type, h.tile_compression, h.internal_compression, h.is_clustered()
        );
        println!(
            "counts: addressed={}, entries={}, contents={}",
            h.addressed_tiles, h.tile_entries, h.tile_contents
        );
        println!("root directory cached: {}", reader.root_cached());
    }
    Ok(())
}

fn print_infos(m: &MapInfos) {
    println!("name: {}", m.name);
    if !m.attribution.is_empty() {
        println!("attribution: {}", m.attribution);
    }
    println!("center: {:.6}, {:.6}", m.center_lat, m.center_lng);
    println!("zoom: {}..={}", m.min_zoom, m.max_zoom);
    println!("rows: {}", if m.tms { "tms (bottom-up)" } else { "xyz (top-down)" });
    println!("index_time: {}", m.index_time);
    println!("tiles: {}, contents: {}", m.tile_count, m.content_count);
}
