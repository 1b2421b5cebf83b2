//! Общие константы форматов (archive header, directory, KV record file, key space).

// -------- Remote archive (PMTiles v3) --------
pub const ARCHIVE_MAGIC: &[u8; 7] = b"PMTiles";
pub const ARCHIVE_MAX_VERSION: u8 = 3;
pub const ARCHIVE_HEADER_LEN: usize = 127;

// First range read at open: header + (usually) the root directory in one round trip.
pub const DEFAULT_PREFETCH_BYTES: u64 = 16 * 1024;

// root + up to two leaf hops
pub const MAX_DIRECTORY_DEPTH: usize = 3;

// Highest zoom with a representable tile id (4^z must fit in u64 with headroom).
pub const MAX_ZOOM: u8 = 31;

// -------- KV record file --------
pub const KV_FILE: &str = "tiles.kv";
pub const KV_MAGIC: &[u8; 8] = b"KVTSEG01";
pub const KV_VERSION: u32 = 1;
pub const KV_HDR_SIZE: usize = 16; // [magic8][ver u32][flags u32]

// Record layout: [klen u16][vlen u32][crc32 u32][key][value]
pub const KV_REC_HDR_SIZE: usize = 10;
pub const KV_REC_OFF_KLEN: usize = 0;
pub const KV_REC_OFF_VLEN: usize = 2;
pub const KV_REC_OFF_CRC32: usize = 6;

pub const LOCK_FILE: &str = "LOCK";

// -------- Key space --------
// Reserved single-byte key holding the serialized MapInfos.
pub const MAP_INFOS_KEY: &[u8] = b"m";
// Coordinate keys: b't' + "z/x/y"
pub const TILES_URL_PREFIX: u8 = b't';
// Content keys: b'c' + xxhash64(tile bytes) big-endian
pub const CONTENT_PREFIX: u8 = b'c';
pub const CONTENT_KEY_LEN: usize = 9;

// Content-key scheme recorded in MapInfos.key_scheme.
pub const KEY_SCHEME_XX64: u32 = 1;
