//! Remote archive layer: PMTiles v3 header and directory codec, blob range
//! reads (file / HTTP) and the archive-backed tile store.

pub mod blob;
pub mod directory;
pub mod header;
pub mod reader;

pub use blob::{open_blob, BlobSource, FileBlob, HttpBlob};
pub use directory::{decode_directory, encode_directory, find_tile, DirectoryEntry};
pub use header::{decode_header, ArchiveHeader, Compression, TileType};
pub use reader::ArchiveReader;
