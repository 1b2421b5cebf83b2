//! Centralized configuration for kvtiles stores.
//!
//! Goals:
//! - Single place to collect tunables instead of scattering env lookups.
//! - KvTilesConfig::from_env() reads the KVT_* variables; fluent setters override.
//!
//! Defaults:
//! - prefetch_bytes = 16 KiB (header + root directory in one range read for most archives)
//! - http_timeout_ms = 10_000 (upper bound per range request; a ReadCtx deadline may shorten it)
//! - cache_root_dir = true (keep the decoded root directory when the prefix covers it)
//! - verify_crc = true (check record CRCs while indexing an embedded store at open)

use std::fmt;
use std::time::Duration;

use crate::consts::{ARCHIVE_HEADER_LEN, DEFAULT_PREFETCH_BYTES};
use crate::util::{env_flag, env_parse};

#[derive(Clone, Debug)]
pub struct KvTilesConfig {
    /// Bytes fetched from offset 0 when an archive is opened.
    /// Env: KVT_PREFETCH_BYTES (default 16384, never below the header size)
    pub prefetch_bytes: u64,

    /// Upper bound for one HTTP range request in milliseconds.
    /// Env: KVT_HTTP_TIMEOUT_MS (default 10000)
    pub http_timeout_ms: u64,

    /// Cache the root directory decoded from the open-time prefix.
    /// Env: KVT_CACHE_ROOT_DIR = 0|1 (default 1)
    pub cache_root_dir: bool,

    /// Verify record CRC32 while indexing an embedded store.
    /// Env: KVT_VERIFY_CRC = 0|1 (default 1)
    pub verify_crc: bool,
}

impl Default for KvTilesConfig {
    fn default() -> Self {
        Self {
            prefetch_bytes: DEFAULT_PREFETCH_BYTES,
            http_timeout_ms: 10_000,
            cache_root_dir: true,
            verify_crc: true,
        }
    }
}

impl KvTilesConfig {
    pub fn from_env() -> Self {
        let mut cfg = Self::default();

        if let Some(n) = env_parse::<u64>("KVT_PREFETCH_BYTES") {
            cfg.prefetch_bytes = n;
        }
        if let Some(n) = env_parse::<u64>("KVT_HTTP_TIMEOUT_MS") {
            cfg.http_timeout_ms = n;
        }
        if let Some(on) = env_flag("KVT_CACHE_ROOT_DIR") {
            cfg.cache_root_dir = on;
        }
        if let Some(on) = env_flag("KVT_VERIFY_CRC") {
            cfg.verify_crc = on;
        }

        cfg.normalized()
    }

    fn normalized(mut self) -> Self {
        self.prefetch_bytes = self.prefetch_bytes.max(ARCHIVE_HEADER_LEN as u64);
        self
    }

    pub fn with_prefetch_bytes(mut self, n: u64) -> Self {
        self.prefetch_bytes = n;
        self.normalized()
    }

    pub fn with_http_timeout_ms(mut self, ms: u64) -> Self {
        self.http_timeout_ms = ms;
        self
    }

    pub fn with_cache_root_dir(mut self, on: bool) -> Self {
        self.cache_root_dir = on;
        self
    }

    pub fn with_verify_crc(mut self, on: bool) -> Self {
        self.verify_crc = on;
        self
    }

    #[inline]
    pub fn http_timeout(&self) -> Duration {
        Duration::from_millis(self.http_timeout_ms)
    }
}

impl fmt::Display for KvTilesConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "KvTilesConfig {{ \
             prefetch_bytes: {}, \
             http_timeout_ms: {}, \
             cache_root_dir: {}, \
             verify_crc: {} \
             }}",
            self.prefetch_bytes, self.http_timeout_ms, self.cache_root_dir, self.verify_crc,
        )
    }
}
