// Базовые модули
pub mod config;
pub mod consts;
pub mod error;
pub mod hash;
pub mod lock;
pub mod meta;
pub mod metrics;
pub mod tileid;

// Утилиты (now_secs, env helpers, LEB128 varints)
pub mod util; // src/util/mod.rs

// Remote archive: header/directory codec, blob range reads, reader
pub mod archive; // src/archive/{mod,header,directory,blob,reader}.rs

// Embedded store: record file, writer, reader, ingestion
pub mod kv; // src/kv/{mod,segment,writer,store,dump,ingest}.rs

// Tile store contract + per-request context
pub mod store;

// Удобные реэкспорты
pub use archive::{ArchiveHeader, ArchiveReader, Compression, DirectoryEntry, TileType};
pub use config::KvTilesConfig;
pub use error::{BlobError, CodecError, IngestError, OpenError, TileError};
pub use kv::{ingest, DumpSource, IngestReport, KvTileStore, KvWriter, MemoryDump};
pub use meta::MapInfos;
pub use store::{open_store, ReadCtx, TileStore};
pub use tileid::{tile_id_to_zxy, zxy_to_tile_id};
