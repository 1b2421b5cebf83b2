//! Tabular tile dumps feeding the ingester.
//!
//! Two schemas exist:
//! - modern: one `tiles` table of (z, x, y, data);
//! - legacy: `map` (z, x, y, tile_id) joined with `images` (tile_id, data);
//!   tile_id is a text join key (numeric ids in JSON are accepted and stringified).
//!
//! `DumpSource` abstracts the reader; `MemoryDump` is the JSON-backed
//! implementation used by the CLI and tests (tile data base64-encoded).

use std::path::Path;

use anyhow::{anyhow, Context, Result};
use base64::engine::general_purpose::STANDARD as B64;
use base64::Engine;
use serde::Deserialize;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TileRow {
    pub z: u8,
    pub x: u64,
    pub y: u64,
    pub data: Vec<u8>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MapRow {
    pub z: u8,
    pub x: u64,
    pub y: u64,
    pub tile_id: String,
}

pub type RowIter<'a, T> = Box<dyn Iterator<Item = Result<T>> + 'a>;

pub trait DumpSource {
    /// Schema check: the modern schema has a `tiles` table.
    fn has_table(&self, name: &str) -> Result<bool>;

    /// Modern schema rows with `z <= max_zoom`.
    fn tiles(&self, max_zoom: u8) -> Result<RowIter<'_, TileRow>>;

    /// Legacy schema coordinate rows with `z <= max_zoom`.
    fn map_rows(&self, max_zoom: u8) -> Result<RowIter<'_, MapRow>>;

    /// Legacy schema images: (tile_id, data).
    fn images(&self) -> Result<RowIter<'_, (String, Vec<u8>)>>;
}

// ---------------------------------------------------------------------------
// JSON-backed dump
// ---------------------------------------------------------------------------

#[derive(Debug, Deserialize)]
struct JsonTile {
    z: u8,
    x: u64,
    y: u64,
    data: String,
}

#[derive(Debug, Deserialize)]
struct JsonMapRow {
    z: u8,
    x: u64,
    y: u64,
    #[serde(deserialize_with = "join_key")]
    tile_id: String,
}

#[derive(Debug, Deserialize)]
struct JsonImage {
    #[serde(deserialize_with = "join_key")]
    tile_id: String,
    data: String,
}

#[derive(Deserialize)]
#[serde(untagged)]
enum RawJoinKey {
    Text(String),
    Int(i64),
}

fn join_key<'de, D: serde::Deserializer<'de>>(d: D) -> std::result::Result<String, D::Error> {
    Ok(match RawJoinKey::deserialize(d)? {
        RawJoinKey::Text(s) => s,
        RawJoinKey::Int(n) => n.to_string(),
    })
}

#[derive(Debug, Deserialize)]
struct JsonDump {
    #[serde(default)]
    tiles: Option<Vec<JsonTile>>,
    #[serde(default)]
    map: Vec<JsonMapRow>,
    #[serde(default)]
    images: Vec<JsonImage>,
}

/// In-memory dump. Tables are present only if they were given.
#[derive(Debug, Default, Clone)]
pub struct MemoryDump {
    tiles: Option<Vec<TileRow>>,
    map: Vec<MapRow>,
    images: Vec<(String, Vec<u8>)>,
}

impl MemoryDump {
    pub fn modern(tiles: Vec<TileRow>) -> Self {
        Self {
            tiles: Some(tiles),
            ..Default::default()
        }
    }

    pub fn legacy(map: Vec<MapRow>, images: Vec<(String, Vec<u8>)>) -> Self {
        Self {
            tiles: None,
            map,
            images,
        }
    }

    pub fn from_json(bytes: &[u8]) -> Result<Self> {
        let raw: JsonDump = serde_json::from_slice(bytes).context("parse dump json")?;

        let tiles = match raw.tiles {
            Some(rows) => Some(
                rows.into_iter()
                    .map(|t| {
                        Ok(TileRow {
                            z: t.z,
                            x: t.x,
                            y: t.y,
                            data: decode_b64(&t.data)
                                .with_context(|| format!("tile {}/{}/{}", t.z, t.x, t.y))?,
                        })
                    })
                    .collect::<Result<Vec<_>>>()?,
            ),
            None => None,
        };
        let map = raw
            .map
            .into_iter()
            .map(|m| MapRow {
                z: m.z,
                x: m.x,
                y: m.y,
                tile_id: m.tile_id,
            })
            .collect();
        let images = raw
            .images
            .into_iter()
            .map(|i| {
                let data = decode_b64(&i.data).with_context(|| format!("image {}", i.tile_id))?;
                Ok((i.tile_id, data))
            })
            .collect::<Result<Vec<_>>>()?;

        Ok(Self { tiles, map, images })
    }

    pub fn from_path(path: &Path) -> Result<Self> {
        let bytes =
            std::fs::read(path).with_context(|| format!("read dump {}", path.display()))?;
        Self::from_json(&bytes).with_context(|| format!("load dump {}", path.display()))
    }
}

fn decode_b64(s: &str) -> Result<Vec<u8>> {
    B64.decode(s.trim())
        .map_err(|e| anyhow!("invalid base64 tile data: {}", e))
}

impl DumpSource for MemoryDump {
    fn has_table(&self, name: &str) -> Result<bool> {
        Ok(match name {
            "tiles" => self.tiles.is_some(),
            "map" | "images" => self.tiles.is_none(),
            _ => false,
        })
    }

    fn tiles(&self, max_zoom: u8) -> Result<RowIter<'_, TileRow>> {
        let rows = self
            .tiles
            .as_ref()
            .ok_or_else(|| anyhow!("no such table: tiles"))?;
        Ok(Box::new(
            rows.iter().filter(move |t| t.z <= max_zoom).cloned().map(Ok),
        ))
    }

    fn map_rows(&self, max_zoom: u8) -> Result<RowIter<'_, MapRow>> {
        Ok(Box::new(
            self.map.iter().filter(move |m| m.z <= max_zoom).cloned().map(Ok),
        ))
    }

    fn images(&self) -> Result<RowIter<'_, (String, Vec<u8>)>> {
        Ok(Box::new(self.images.iter().cloned().map(Ok)))
    }
}
