// src/kv/writer.rs: single-writer builder of an embedded tile store
//
// Lifecycle: create (fresh directory, exclusive lock) -> put / put_if_absent ...
// -> finish(MapInfos). MapInfos is the last record; a file without it is not
// finalized and readers refuse to open it.

use std::collections::HashSet;
use std::fs::{File, OpenOptions};
use std::io::{self, BufWriter, Write};
use std::path::{Path, PathBuf};

use log::{debug, info};

use super::segment::{encode_record, file_header};
use crate::consts::{KV_FILE, MAP_INFOS_KEY};
use crate::error::IngestError;
use crate::lock::{try_acquire_lock, LockFailure, LockGuard, LockMode};
use crate::meta::MapInfos;

pub struct KvWriter {
    root: PathBuf,
    out: BufWriter<File>,
    written: HashSet<Vec<u8>>,
    records: u64,
    bytes: u64,
    scratch: Vec<u8>,
    _lock: LockGuard,
}

impl KvWriter {
    /// Start a new store under `root`. The directory may exist but must not hold a record file.
    pub fn create(root: &Path) -> Result<Self, IngestError> {
        std::fs::create_dir_all(root)?;
        let path = root.join(KV_FILE);
        if path.exists() {
            return Err(IngestError::TargetExists(path));
        }

        let lock = try_acquire_lock(root, LockMode::Exclusive).map_err(|e| match e {
            LockFailure::LockBusy(p) => IngestError::Locked(p),
            LockFailure::Io(e) => IngestError::Store(e),
        })?;

        let file = OpenOptions::new()
            .write(true)
            .create_new(true)
            .open(&path)
            .map_err(|e| match e.kind() {
                io::ErrorKind::AlreadyExists => IngestError::TargetExists(path.clone()),
                _ => IngestError::Store(e),
            })?;
        let mut out = BufWriter::new(file);
        let hdr = file_header();
        out.write_all(&hdr)?;

        debug!("kv writer: created {}", path.display());
        Ok(Self {
            root: root.to_path_buf(),
            out,
            written: HashSet::new(),
            records: 0,
            bytes: hdr.len() as u64,
            scratch: Vec::with_capacity(64 * 1024),
            _lock: lock,
        })
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn contains(&self, key: &[u8]) -> bool {
        self.written.contains(key)
    }

    /// Append key -> value. The reserved MapInfos key is refused here; use `finish`.
    pub fn put(&mut self, key: &[u8], value: &[u8]) -> Result<(), IngestError> {
        if key == MAP_INFOS_KEY {
            return Err(IngestError::Store(io::Error::new(
                io::ErrorKind::InvalidInput,
                "map infos key is reserved",
            )));
        }
        self.append(key, value)?;
        if !self.written.contains(key) {
            self.written.insert(key.to_vec());
        }
        Ok(())
    }

    /// Append only if `key` was not written in this pass. Returns true when written.
    pub fn put_if_absent(&mut self, key: &[u8], value: &[u8]) -> Result<bool, IngestError> {
        if self.contains(key) {
            return Ok(false);
        }
        self.put(key, value)?;
        Ok(true)
    }

    /// Write MapInfos last, fsync file and directory, release the lock.
    pub fn finish(mut self, infos: &MapInfos) -> Result<PathBuf, IngestError> {
        let encoded = infos.encode()?;
        self.append(MAP_INFOS_KEY, &encoded)?;
        self.out.flush()?;
        self.out.get_ref().sync_all()?;
        let path = self.root.join(KV_FILE);
        let _ = fsync_dir(&path);
        info!(
            "kv writer: finalized {} ({} records, {} bytes)",
            path.display(),
            self.records,
            self.bytes
        );
        Ok(path)
    }

    fn append(&mut self, key: &[u8], value: &[u8]) -> Result<(), IngestError> {
        self.scratch.clear();
        encode_record(key, value, &mut self.scratch)?;
        self.out.write_all(&self.scratch)?;
        self.records += 1;
        self.bytes += self.scratch.len() as u64;
        Ok(())
    }
}

#[cfg(unix)]
fn fsync_dir(path: &Path) -> io::Result<()> {
    if let Some(parent) = path.parent() {
        if !parent.as_os_str().is_empty() {
            File::open(parent)?.sync_all()?;
        }
    }
    Ok(())
}
#[cfg(not(unix))]
fn fsync_dir(_path: &Path) -> io::Result<()> {
    Ok(())
}
