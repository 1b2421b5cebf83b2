// src/meta.rs: MapInfos, the descriptive record of one tile pyramid
//
// Embedded store: one JSON document at reserved key b"m", written last by the
// ingester (its presence marks the store as finalized).
// Remote archive: derived from the header plus the metadata JSON block.
//
// Forward compatibility:
// - unknown fields are ignored on decode;
// - fields missing from older records take their Default values.

use serde::{Deserialize, Serialize};

use crate::archive::header::Compression;
use crate::consts::KEY_SCHEME_XX64;
use crate::error::OpenError;
use crate::hash::KeyScheme;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct MapInfos {
    pub center_lat: f64,
    pub center_lng: f64,
    pub min_zoom: u8,
    pub max_zoom: u8,
    pub attribution: String,
    /// Region name.
    pub name: String,
    /// Build time, unix seconds.
    pub index_time: u64,
    /// Rows stored bottom-up (TMS); readers flip y on lookup.
    pub tms: bool,

    /// Content-key scheme (1 = xxhash64 seed 0). 0 on archives, which have no key space.
    pub key_scheme: u32,
    /// Encoding of stored tile bytes (archive header byte values).
    pub tile_compression: u8,
    /// Coordinates written.
    pub tile_count: u64,
    /// Distinct tile contents written.
    pub content_count: u64,
}

impl Default for MapInfos {
    fn default() -> Self {
        Self {
            center_lat: 0.0,
            center_lng: 0.0,
            min_zoom: 0,
            max_zoom: 0,
            attribution: String::new(),
            name: String::new(),
            index_time: 0,
            tms: false,
            key_scheme: KEY_SCHEME_XX64,
            tile_compression: Compression::Unknown.to_u8(),
            tile_count: 0,
            content_count: 0,
        }
    }
}

impl MapInfos {
    pub fn tile_compression(&self) -> Compression {
        Compression::from_u8(self.tile_compression)
    }

    pub fn encode(&self) -> Result<Vec<u8>, serde_json::Error> {
        serde_json::to_vec(self)
    }

    /// Decode a stored record and refuse content-key schemes this build cannot read.
    pub fn decode(bytes: &[u8]) -> Result<Self, OpenError> {
        let infos: MapInfos = serde_json::from_slice(bytes).map_err(OpenError::MapInfos)?;
        if KeyScheme::from_u32(infos.key_scheme).is_none() {
            return Err(OpenError::KeyScheme(infos.key_scheme));
        }
        Ok(infos)
    }
}
