use anyhow::Result;
use std::sync::Arc;
use std::thread;
use std::time::Duration;

use kvtiles::archive::{encode_directory, BlobSource, HttpBlob};
use kvtiles::{
    open_store, tile_id_to_zxy, ArchiveHeader, ArchiveReader, BlobError, Compression,
    DirectoryEntry, KvTilesConfig, ReadCtx, TileType,
};
use tiny_http::{Header, Request, Response, Server};
use url::Url;

/// Local object store:
///   /range/<name>  honours `Range` (206, 416 past the end)
///   /full/<name>   ignores `Range` and always answers 200 with the whole body
///   anything else  404
fn serve(body: Vec<u8>) -> Result<String> {
    let server = Server::http("127.0.0.1:0").map_err(|e| anyhow::anyhow!("bind: {e}"))?;
    let addr = server
        .server_addr()
        .to_ip()
        .ok_or_else(|| anyhow::anyhow!("server has no ip address"))?;
    let body = Arc::new(body);
    thread::spawn(move || {
        for rq in server.incoming_requests() {
            let _ = respond(rq, &body);
        }
    });
    Ok(format!("http://{addr}"))
}

fn respond(rq: Request, body: &[u8]) -> std::io::Result<()> {
    let url = rq.url().to_string();
    if url.starts_with("/full/") {
        return rq.respond(Response::from_data(body.to_vec()).with_status_code(200));
    }
    if !url.starts_with("/range/") {
        return rq.respond(Response::from_string("not found\n").with_status_code(404));
    }

    let range = rq
        .headers()
        .iter()
        .find(|h| h.field.equiv("Range"))
        .and_then(|h| parse_range(h.value.as_str()));
    let (start, last) = match range {
        Some(r) => r,
        None => return rq.respond(Response::from_data(body.to_vec()).with_status_code(200)),
    };
    let len = body.len() as u64;
    if start >= len {
        return rq.respond(Response::from_data(Vec::<u8>::new()).with_status_code(416));
    }
    let end = last.min(len - 1);
    let mut resp =
        Response::from_data(body[start as usize..=end as usize].to_vec()).with_status_code(206);
    let cr = format!("bytes {start}-{end}/{len}");
    if let Ok(h) = Header::from_bytes(&b"Content-Range"[..], cr.into_bytes()) {
        resp.add_header(h);
    }
    rq.respond(resp)
}

fn parse_range(v: &str) -> Option<(u64, u64)> {
    let (a, b) = v.strip_prefix("bytes=")?.split_once('-')?;
    Some((a.parse().ok()?, b.parse().ok()?))
}

fn blob(base: &str, path: &str) -> Result<HttpBlob> {
    Ok(HttpBlob::new(Url::parse(&format!("{base}{path}"))?, Duration::from_secs(5))?)
}

fn pattern(n: usize) -> Vec<u8> {
    (0..n).map(|i| (i % 251) as u8).collect()
}

#[test]
fn partial_content_is_returned_as_is() -> Result<()> {
    let data = pattern(1000);
    let base = serve(data.clone())?;
    let b = blob(&base, "/range/blob.bin")?;

    assert_eq!(b.read_range(10, 4, None)?, data[10..14].to_vec());
    // window running past the end is clipped by the server
    assert_eq!(b.read_upto(997, 100, None)?, data[997..].to_vec());
    assert!(matches!(
        b.read_range(997, 100, None),
        Err(BlobError::ShortRead { got: 3, .. })
    ));
    Ok(())
}

#[test]
fn full_body_answer_is_sliced_to_window() -> Result<()> {
    let data = pattern(1000);
    let base = serve(data.clone())?;
    let b = blob(&base, "/full/blob.bin")?;

    assert_eq!(b.read_range(500, 16, Some(Duration::from_secs(5)))?, data[500..516].to_vec());
    assert_eq!(b.read_upto(998, 10, None)?, data[998..].to_vec());
    assert_eq!(b.read_upto(2000, 10, None)?, Vec::<u8>::new());
    Ok(())
}

#[test]
fn unsatisfiable_range_reads_empty() -> Result<()> {
    let base = serve(pattern(64))?;
    let b = blob(&base, "/range/blob.bin")?;

    assert_eq!(b.read_upto(64, 8, None)?, Vec::<u8>::new());
    assert!(matches!(
        b.read_range(100, 8, None),
        Err(BlobError::ShortRead { offset: 100, wanted: 8, got: 0 })
    ));
    Ok(())
}

#[test]
fn error_status_is_http_error() -> Result<()> {
    let base = serve(pattern(64))?;
    let b = blob(&base, "/missing/blob.bin")?;
    assert!(matches!(
        b.read_range(0, 8, None),
        Err(BlobError::Http { status: 404, .. })
    ));
    assert!(open_store(&format!("{base}/missing/a.pmtiles"), &KvTilesConfig::default()).is_err());
    Ok(())
}

// ---------------------------------------------------------------------------
// Archive over HTTP
// ---------------------------------------------------------------------------

fn tile_bytes(id: u64) -> Vec<u8> {
    vec![0xA0 | id as u8; 20 + id as usize]
}

/// Single root directory with tiles 0..=4, gzip directories, no metadata.
fn small_archive() -> Result<Vec<u8>> {
    let mut data = Vec::new();
    let mut entries = Vec::new();
    for id in 0..=4u64 {
        let bytes = tile_bytes(id);
        entries.push(DirectoryEntry {
            tile_id: id,
            offset: data.len() as u64,
            length: bytes.len() as u32,
            run_length: 1,
        });
        data.extend_from_slice(&bytes);
    }
    let root = encode_directory(&entries, Compression::Gzip)?;
    let root_offset = 127u64;
    let tile_data_offset = root_offset + root.len() as u64;

    let header = ArchiveHeader {
        version: 3,
        root_offset,
        root_length: root.len() as u64,
        metadata_offset: tile_data_offset,
        metadata_length: 0,
        leaf_dirs_offset: tile_data_offset,
        leaf_dirs_length: 0,
        tile_data_offset,
        tile_data_length: data.len() as u64,
        addressed_tiles: 5,
        tile_entries: 5,
        tile_contents: 5,
        clustered: 1,
        internal_compression: Compression::Gzip,
        tile_compression: Compression::None,
        tile_type: TileType::Png,
        min_zoom: 0,
        max_zoom: 1,
        min_lon_e7: -1_800_000_000,
        min_lat_e7: -850_000_000,
        max_lon_e7: 1_800_000_000,
        max_lat_e7: 850_000_000,
        center_zoom: 0,
        center_lon_e7: 0,
        center_lat_e7: 0,
    };
    let mut file = header.to_bytes().to_vec();
    file.extend_from_slice(&root);
    file.extend_from_slice(&data);
    Ok(file)
}

fn assert_all_tiles(store: &dyn kvtiles::TileStore) -> Result<()> {
    let ctx = ReadCtx::with_timeout(Duration::from_secs(10));
    for id in 0..=4u64 {
        let (z, x, y) = tile_id_to_zxy(id).unwrap();
        assert_eq!(store.read_tile(&ctx, z, x, y)?, tile_bytes(id), "tile {id}");
    }
    let (z, x, y) = tile_id_to_zxy(5).unwrap();
    assert!(store.read_tile(&ctx, z, x, y).unwrap_err().is_not_found());
    Ok(())
}

#[test]
fn archive_served_with_range_support() -> Result<()> {
    let base = serve(small_archive()?)?;
    let locator = format!("{base}/range/world.pmtiles");

    let store = open_store(&locator, &KvTilesConfig::default())?;
    assert_all_tiles(store.as_ref())?;
    assert_eq!(store.load_map_infos()?.max_zoom, 1);

    // root outside the prefix: fetched over HTTP on every request
    let cfg = KvTilesConfig::default().with_prefetch_bytes(127);
    let reader = ArchiveReader::open(&locator, &cfg)?;
    assert!(!reader.root_cached());
    assert_all_tiles(&reader)?;
    Ok(())
}

#[test]
fn archive_served_without_range_support() -> Result<()> {
    let base = serve(small_archive()?)?;
    let reader = ArchiveReader::open(&format!("{base}/full/world.pmtiles"), &KvTilesConfig::default())?;
    assert!(reader.root_cached());
    assert_all_tiles(&reader)?;
    Ok(())
}
