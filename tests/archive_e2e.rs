use anyhow::Result;
use flate2::write::GzEncoder;
use std::collections::BTreeMap;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::time::{Duration, SystemTime, UNIX_EPOCH};

use kvtiles::archive::directory::encode_directory;
use kvtiles::{
    open_store, tile_id_to_zxy, ArchiveHeader, ArchiveReader, Compression, DirectoryEntry,
    KvTilesConfig, OpenError, ReadCtx, TileError, TileStore, TileType,
};

static NEXT_ID: AtomicU64 = AtomicU64::new(0);

fn unique_root(prefix: &str) -> PathBuf {
    let pid = std::process::id();
    let t = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default()
        .as_nanos();
    let id = NEXT_ID.fetch_add(1, Ordering::Relaxed);
    let base = std::env::temp_dir();
    base.join(format!("kvtiles-archive-{prefix}-{pid}-{t}-{id}"))
}

fn entry(tile_id: u64, offset: u64, length: u32, run_length: u32) -> DirectoryEntry {
    DirectoryEntry {
        tile_id,
        offset,
        length,
        run_length,
    }
}

fn tile_bytes(id: u64) -> Vec<u8> {
    vec![id as u8; 10 + id as usize]
}

struct Fixture {
    path: PathBuf,
    /// tile id -> expected bytes (ids 0..=20, 19 and 20 share one run)
    tiles: BTreeMap<u64, Vec<u8>>,
}

/// Archive with a root of two leaf pointers (ids 0..=9 and 10..=20).
///
/// Layout: header | root | metadata | leaves | tile data.
fn build_archive(dir: &Path, internal: Compression, corrupt_second_leaf: bool) -> Result<Fixture> {
    std::fs::create_dir_all(dir)?;

    let mut tiles = BTreeMap::new();
    let mut data = Vec::new();
    let mut leaf_a = Vec::new();
    let mut leaf_b = Vec::new();
    for id in 0..=19u64 {
        let bytes = tile_bytes(id);
        let run = if id == 19 { 2 } else { 1 };
        let e = entry(id, data.len() as u64, bytes.len() as u32, run);
        if id < 10 {
            leaf_a.push(e);
        } else {
            leaf_b.push(e);
        }
        tiles.insert(id, bytes.clone());
        if id == 19 {
            tiles.insert(20, bytes.clone());
        }
        data.extend_from_slice(&bytes);
    }

    let codec = if internal == Compression::Gzip {
        Compression::Gzip
    } else {
        Compression::None
    };
    let leaf_a_bytes = encode_directory(&leaf_a, codec)?;
    let mut leaf_b_bytes = encode_directory(&leaf_b, codec)?;
    if corrupt_second_leaf {
        leaf_b_bytes = vec![0xff; leaf_b_bytes.len()];
    }
    let mut leaves = leaf_a_bytes.clone();
    leaves.extend_from_slice(&leaf_b_bytes);

    let root = encode_directory(
        &[
            entry(0, 0, leaf_a_bytes.len() as u32, 0),
            entry(10, leaf_a_bytes.len() as u64, leaf_b_bytes.len() as u32, 0),
        ],
        codec,
    )?;

    let mut gz = GzEncoder::new(Vec::new(), flate2::Compression::default());
    gz.write_all(br#"{"name":"fixture","attribution":"test data","vector_layers":[]}"#)?;
    let metadata = gz.finish()?;
    let metadata = if internal == Compression::Gzip {
        metadata
    } else {
        br#"{"name":"fixture"}"#.to_vec()
    };

    let file = assemble(internal, &root, &metadata, &leaves, &data, 21, 20);
    let path = dir.join("fixture.pmtiles");
    std::fs::write(&path, &file)?;
    Ok(Fixture { path, tiles })
}

/// Archive bytes: header | root | metadata | leaves | tile data.
fn assemble(
    internal: Compression,
    root: &[u8],
    metadata: &[u8],
    leaves: &[u8],
    data: &[u8],
    addressed_tiles: u64,
    tile_entries: u64,
) -> Vec<u8> {
    let root_offset = 127u64;
    let metadata_offset = root_offset + root.len() as u64;
    let leaf_dirs_offset = metadata_offset + metadata.len() as u64;
    let tile_data_offset = leaf_dirs_offset + leaves.len() as u64;

    let header = ArchiveHeader {
        version: 3,
        root_offset,
        root_length: root.len() as u64,
        metadata_offset,
        metadata_length: metadata.len() as u64,
        leaf_dirs_offset,
        leaf_dirs_length: leaves.len() as u64,
        tile_data_offset,
        tile_data_length: data.len() as u64,
        addressed_tiles,
        tile_entries,
        tile_contents: tile_entries,
        clustered: 1,
        internal_compression: internal,
        tile_compression: Compression::None,
        tile_type: TileType::Png,
        min_zoom: 0,
        max_zoom: 2,
        min_lon_e7: -1_800_000_000,
        min_lat_e7: -850_000_000,
        max_lon_e7: 1_800_000_000,
        max_lat_e7: 850_000_000,
        center_zoom: 1,
        center_lon_e7: 23_500_000,
        center_lat_e7: 488_500_000,
    };

    let mut file = header.to_bytes().to_vec();
    file.extend_from_slice(root);
    file.extend_from_slice(metadata);
    file.extend_from_slice(leaves);
    file.extend_from_slice(data);
    file
}

/// Archive whose tiles (ids 0..=5) sit `depth` directories deep:
/// root -> pointer leaf -> ... -> leaf holding the tile entries.
fn build_chained_archive(dir: &Path, depth: usize) -> Result<Fixture> {
    assert!(depth >= 2);
    std::fs::create_dir_all(dir)?;

    let mut tiles = BTreeMap::new();
    let mut data = Vec::new();
    let mut last = Vec::new();
    for id in 0..=5u64 {
        let bytes = tile_bytes(id);
        last.push(entry(id, data.len() as u64, bytes.len() as u32, 1));
        tiles.insert(id, bytes.clone());
        data.extend_from_slice(&bytes);
    }

    // leaves are laid out deepest first; each pointer covers every id from 0
    let mut leaves = encode_directory(&last, Compression::Gzip)?;
    let (mut off, mut len) = (0u64, leaves.len() as u32);
    for _ in 0..depth - 2 {
        let ptr = encode_directory(&[entry(0, off, len, 0)], Compression::Gzip)?;
        off = leaves.len() as u64;
        len = ptr.len() as u32;
        leaves.extend_from_slice(&ptr);
    }
    let root = encode_directory(&[entry(0, off, len, 0)], Compression::Gzip)?;

    let file = assemble(Compression::Gzip, &root, &[], &leaves, &data, 6, 6);
    let path = dir.join(format!("chain-{depth}.pmtiles"));
    std::fs::write(&path, &file)?;
    Ok(Fixture { path, tiles })
}

#[test]
fn present_tiles_read_back_verbatim() -> Result<()> {
    let root = unique_root("present");
    let fx = build_archive(&root, Compression::Gzip, false)?;
    let reader = ArchiveReader::open(fx.path.to_str().unwrap(), &KvTilesConfig::default())?;
    assert!(reader.root_cached());

    let ctx = ReadCtx::background();
    for (id, want) in &fx.tiles {
        let (z, x, y) = tile_id_to_zxy(*id).unwrap();
        let got = reader.read_tile(&ctx, z, x, y)?;
        assert_eq!(got.len(), want.len(), "tile {id}");
        assert_eq!(&got, want, "tile {id}");
    }

    let _ = std::fs::remove_dir_all(&root);
    Ok(())
}

#[test]
fn three_directory_levels_resolve() -> Result<()> {
    let root = unique_root("depth3");
    let fx = build_chained_archive(&root, 3)?;
    let reader = ArchiveReader::open(fx.path.to_str().unwrap(), &KvTilesConfig::default())?;
    let ctx = ReadCtx::background();

    for (id, want) in &fx.tiles {
        let (z, x, y) = tile_id_to_zxy(*id).unwrap();
        assert_eq!(&reader.read_tile(&ctx, z, x, y)?, want, "tile {id}");
    }
    // pointer chain resolves but the last leaf has no entry for id 6
    let (z, x, y) = tile_id_to_zxy(6).unwrap();
    assert!(reader.read_tile(&ctx, z, x, y).unwrap_err().is_not_found());

    let _ = std::fs::remove_dir_all(&root);
    Ok(())
}

#[test]
fn pointer_past_max_depth_is_not_found() -> Result<()> {
    let root = unique_root("depth4");
    let fx = build_chained_archive(&root, 4)?;
    let reader = ArchiveReader::open(fx.path.to_str().unwrap(), &KvTilesConfig::default())?;
    let ctx = ReadCtx::background();

    // third directory still yields a pointer; the walk stops there
    for id in [0u64, 5] {
        let (z, x, y) = tile_id_to_zxy(id).unwrap();
        assert!(matches!(
            reader.read_tile(&ctx, z, x, y),
            Err(TileError::NotFound { .. })
        ));
    }

    let _ = std::fs::remove_dir_all(&root);
    Ok(())
}

#[test]
fn absent_and_out_of_range_are_not_found() -> Result<()> {
    let root = unique_root("absent");
    let fx = build_archive(&root, Compression::Gzip, false)?;
    let reader = ArchiveReader::open(fx.path.to_str().unwrap(), &KvTilesConfig::default())?;
    let ctx = ReadCtx::background();

    // x outside the 2x2 grid of zoom 1
    assert!(matches!(
        reader.read_tile(&ctx, 1, 2, 0),
        Err(TileError::NotFound { z: 1, x: 2, y: 0 })
    ));
    // valid coordinate past the last run (id 21 = zoom 3)
    assert!(reader.read_tile(&ctx, 3, 0, 0).unwrap_err().is_not_found());
    // beyond the representable zoom
    assert!(reader.read_tile(&ctx, 40, 0, 0).unwrap_err().is_not_found());
    // fetch_tile turns absence into None
    assert_eq!(reader.fetch_tile(&ctx, 3, 0, 0)?, None);

    let _ = std::fs::remove_dir_all(&root);
    Ok(())
}

#[test]
fn root_outside_prefix_is_read_per_request() -> Result<()> {
    let root = unique_root("lazy");
    let fx = build_archive(&root, Compression::Gzip, false)?;
    let cfg = KvTilesConfig::default().with_prefetch_bytes(127);
    let reader = ArchiveReader::open(fx.path.to_str().unwrap(), &cfg)?;
    assert!(!reader.root_cached());

    let ctx = ReadCtx::background();
    for id in [0u64, 9, 10, 20] {
        let (z, x, y) = tile_id_to_zxy(id).unwrap();
        assert_eq!(reader.read_tile(&ctx, z, x, y)?, fx.tiles[&id]);
    }

    let _ = std::fs::remove_dir_all(&root);
    Ok(())
}

#[test]
fn map_infos_from_header_and_metadata() -> Result<()> {
    let root = unique_root("infos");
    let fx = build_archive(&root, Compression::Gzip, false)?;
    let store = open_store(fx.path.to_str().unwrap(), &KvTilesConfig::default())?;
    let m = store.load_map_infos()?;
    assert_eq!(m.name, "fixture");
    assert_eq!(m.attribution, "test data");
    assert!(!m.tms);
    assert_eq!((m.min_zoom, m.max_zoom), (0, 2));
    assert!((m.center_lat - 48.85).abs() < 1e-9);
    assert!((m.center_lng - 2.35).abs() < 1e-9);
    assert_eq!(store.tile_compression(), Compression::None);

    let _ = std::fs::remove_dir_all(&root);
    Ok(())
}

#[test]
fn uncompressed_directories_are_accepted() -> Result<()> {
    let root = unique_root("plain");
    let fx = build_archive(&root, Compression::None, false)?;
    let reader = ArchiveReader::open(fx.path.to_str().unwrap(), &KvTilesConfig::default())?;
    let (z, x, y) = tile_id_to_zxy(12).unwrap();
    assert_eq!(reader.read_tile(&ReadCtx::background(), z, x, y)?, fx.tiles[&12]);
    assert_eq!(reader.load_map_infos().name, "fixture");

    let _ = std::fs::remove_dir_all(&root);
    Ok(())
}

#[test]
fn unsupported_internal_compression() -> Result<()> {
    let root = unique_root("brotli");
    let fx = build_archive(&root, Compression::Brotli, false)?;
    let locator = fx.path.to_str().unwrap();

    // root inside the prefix: decoded at open, so open fails
    assert!(matches!(
        ArchiveReader::open(locator, &KvTilesConfig::default()),
        Err(OpenError::RootDirectory(_))
    ));

    // root read lazily: each request reports the codec
    let cfg = KvTilesConfig::default().with_prefetch_bytes(127);
    let reader = ArchiveReader::open(locator, &cfg)?;
    assert!(matches!(
        reader.read_tile(&ReadCtx::background(), 0, 0, 0),
        Err(TileError::UnsupportedCompression(Compression::Brotli))
    ));

    let _ = std::fs::remove_dir_all(&root);
    Ok(())
}

#[test]
fn corrupt_leaf_fails_only_its_requests() -> Result<()> {
    let root = unique_root("corrupt");
    let fx = build_archive(&root, Compression::Gzip, true)?;
    let reader = ArchiveReader::open(fx.path.to_str().unwrap(), &KvTilesConfig::default())?;
    let ctx = ReadCtx::background();

    let (z, x, y) = tile_id_to_zxy(15).unwrap();
    assert!(matches!(
        reader.read_tile(&ctx, z, x, y),
        Err(TileError::CorruptDirectory { .. })
    ));
    // first leaf still serves
    let (z, x, y) = tile_id_to_zxy(3).unwrap();
    assert_eq!(reader.read_tile(&ctx, z, x, y)?, fx.tiles[&3]);

    let _ = std::fs::remove_dir_all(&root);
    Ok(())
}

#[test]
fn cancelled_context_aborts_lookup() -> Result<()> {
    let root = unique_root("cancel");
    let fx = build_archive(&root, Compression::Gzip, false)?;
    let reader = ArchiveReader::open(fx.path.to_str().unwrap(), &KvTilesConfig::default())?;

    let flag = Arc::new(AtomicBool::new(true));
    let ctx = ReadCtx::background().cancel_on(flag);
    assert!(matches!(reader.read_tile(&ctx, 0, 0, 0), Err(TileError::Cancelled)));

    let expired = ReadCtx::with_timeout(Duration::ZERO);
    assert!(matches!(reader.read_tile(&expired, 0, 0, 0), Err(TileError::Cancelled)));

    let _ = std::fs::remove_dir_all(&root);
    Ok(())
}

#[test]
fn bad_archives_fail_to_open() -> Result<()> {
    let root = unique_root("bad");
    std::fs::create_dir_all(&root)?;

    let short = root.join("short.pmtiles");
    std::fs::write(&short, b"PMTiles\x03")?;
    assert!(matches!(
        ArchiveReader::open(short.to_str().unwrap(), &KvTilesConfig::default()),
        Err(OpenError::Header(_))
    ));

    let fx = build_archive(&root, Compression::Gzip, false)?;
    let mut bytes = std::fs::read(&fx.path)?;
    bytes[7] = 4;
    let v4 = root.join("v4.pmtiles");
    std::fs::write(&v4, &bytes)?;
    assert!(matches!(
        ArchiveReader::open(v4.to_str().unwrap(), &KvTilesConfig::default()),
        Err(OpenError::Header(_))
    ));

    let _ = std::fs::remove_dir_all(&root);
    Ok(())
}

#[test]
fn shared_reader_across_threads() -> Result<()> {
    let root = unique_root("threads");
    let fx = build_archive(&root, Compression::Gzip, false)?;
    let reader = Arc::new(ArchiveReader::open(
        fx.path.to_str().unwrap(),
        &KvTilesConfig::default(),
    )?);
    let tiles = Arc::new(fx.tiles);

    let handles: Vec<_> = (0..6u64)
        .map(|t| {
            let reader = Arc::clone(&reader);
            let tiles = Arc::clone(&tiles);
            std::thread::spawn(move || {
                let ctx = ReadCtx::background();
                for i in 0..200u64 {
                    // ids 0..=29: 21..=29 are absent
                    let id = (i * 7 + t) % 30;
                    let (z, x, y) = tile_id_to_zxy(id).unwrap();
                    match tiles.get(&id) {
                        Some(want) => assert_eq!(&reader.read_tile(&ctx, z, x, y).unwrap(), want),
                        None => assert!(reader.read_tile(&ctx, z, x, y).unwrap_err().is_not_found()),
                    }
                }
            })
        })
        .collect();
    for h in handles {
        h.join().expect("reader thread panicked");
    }

    let _ = std::fs::remove_dir_all(&root);
    Ok(())
}
