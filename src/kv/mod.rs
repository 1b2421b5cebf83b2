//! Embedded content-addressed tile store.
//!
//! - segment: record file format (header, CRC-framed records, scanner)
//! - writer:  single-writer builder (exclusive lock, put / put_if_absent / finish)
//! - store:   read-only mmap-backed store implementing TileStore
//! - dump:    tabular tile dumps (modern / legacy schemas)
//! - ingest:  dump -> store, with content deduplication

pub(crate) mod segment;

pub mod dump;
pub mod ingest;
pub mod store;
pub mod writer;

pub use dump::{DumpSource, MapRow, MemoryDump, TileRow};
pub use ingest::{ingest, IngestReport};
pub use store::KvTileStore;
pub use writer::KvWriter;
