//! Stable content hashing for the embedded tile store.
//!
//! Goals:
//! - Use a stable, explicit hash (not std::DefaultHasher) so content keys are
//!   identical across toolchains/platforms and between ingest and serve.
//! - Record the scheme in MapInfos.key_scheme for forward compatibility.
//!
//! Collisions between distinct tiles map both coordinates to whichever content
//! was written first. That risk is accepted and not checked for.

use std::fmt;
use std::hash::Hasher;
use twox_hash::XxHash64;

use crate::consts::{CONTENT_KEY_LEN, CONTENT_PREFIX, KEY_SCHEME_XX64};

/// Content-key scheme used by a store.
/// Stored as u32 in MapInfos.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum KeyScheme {
    /// 64-bit xxhash of the tile bytes, seed=0.
    Xx64Seed0,
}

impl KeyScheme {
    pub fn to_u32(self) -> u32 {
        match self {
            KeyScheme::Xx64Seed0 => KEY_SCHEME_XX64,
        }
    }

    /// Parse from the stored code. Unknown codes return None.
    pub fn from_u32(code: u32) -> Option<Self> {
        match code {
            KEY_SCHEME_XX64 => Some(KeyScheme::Xx64Seed0),
            _ => None,
        }
    }
}

impl fmt::Display for KeyScheme {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            KeyScheme::Xx64Seed0 => write!(f, "xxhash64(seed=0)"),
        }
    }
}

pub const KEY_SCHEME_DEFAULT: KeyScheme = KeyScheme::Xx64Seed0;

/// 64-bit stable hash of tile content.
pub fn content_hash64(data: &[u8]) -> u64 {
    let mut h = XxHash64::with_seed(0);
    h.write(data);
    h.finish()
}

/// Content key: [CONTENT_PREFIX][hash u64 BE].
pub fn content_key(data: &[u8]) -> [u8; CONTENT_KEY_LEN] {
    let mut out = [0u8; CONTENT_KEY_LEN];
    out[0] = CONTENT_PREFIX;
    out[1..].copy_from_slice(&content_hash64(data).to_be_bytes());
    out
}

/// Coordinate key: b't' + "z/x/y".
pub fn coord_key(z: u8, x: u64, y: u64) -> Vec<u8> {
    let mut k = Vec::with_capacity(24);
    k.push(crate::consts::TILES_URL_PREFIX);
    k.extend_from_slice(format!("{}/{}/{}", z, x, y).as_bytes());
    k
}
