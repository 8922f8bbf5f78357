//! Persistent quad storage.
//!
//! The scheduler reads the whole disk cache once at startup to pre-populate
//! its RAM cache, and writes newly resident quads back periodically and on
//! shutdown. Payloads are bincode-encoded [`Quad`]s; [`encode_quad`] and
//! [`decode_quad`] are the only place that format lives.

use std::collections::HashMap;
use std::fs::{self, File};
use std::io::{self, BufWriter, Write};
use std::path::{Path, PathBuf};

use bytes::Bytes;
use parking_lot::Mutex;
use thiserror::Error;

use crate::tile::{Quad, Scheme, TileId};

/// File extension of persisted quads.
pub const QUAD_FILE_EXTENSION: &str = "quad";

/// Errors from disk cache operations.
#[derive(Debug, Error)]
pub enum DiskCacheError {
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),

    #[error("Serialization error: {0}")]
    Serialization(String),
}

/// Encodes a quad for storage.
pub fn encode_quad(quad: &Quad) -> Result<Vec<u8>, DiskCacheError> {
    bincode::serialize(quad).map_err(|e| DiskCacheError::Serialization(e.to_string()))
}

/// Decodes a stored quad.
pub fn decode_quad(bytes: &[u8]) -> Result<Quad, DiskCacheError> {
    bincode::deserialize(bytes).map_err(|e| DiskCacheError::Serialization(e.to_string()))
}

/// Storage consumed by the scheduler.
///
/// Calls are blocking; the scheduler runs them off the async workers.
pub trait DiskCache: Send + Sync + 'static {
    /// Returns every stored quad as (quad id, encoded payload).
    fn read_all(&self) -> Result<Vec<(TileId, Bytes)>, DiskCacheError>;

    /// Stores one encoded quad, replacing any previous payload.
    fn write(&self, id: TileId, bytes: &[u8]) -> Result<(), DiskCacheError>;
}

/// Disk cache that stores nothing.
#[derive(Debug, Clone, Copy, Default)]
pub struct NullDiskCache;

impl DiskCache for NullDiskCache {
    fn read_all(&self) -> Result<Vec<(TileId, Bytes)>, DiskCacheError> {
        Ok(Vec::new())
    }

    fn write(&self, _id: TileId, _bytes: &[u8]) -> Result<(), DiskCacheError> {
        Ok(())
    }
}

/// Disk cache held in memory, for tests and ephemeral sessions.
#[derive(Debug, Default)]
pub struct MemoryDiskCache {
    entries: Mutex<HashMap<TileId, Bytes>>,
}

impl MemoryDiskCache {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.entries.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.lock().is_empty()
    }

    pub fn contains(&self, id: &TileId) -> bool {
        self.entries.lock().contains_key(&id.to_scheme(Scheme::NorthUp))
    }
}

impl DiskCache for MemoryDiskCache {
    fn read_all(&self) -> Result<Vec<(TileId, Bytes)>, DiskCacheError> {
        Ok(self
            .entries
            .lock()
            .iter()
            .map(|(id, bytes)| (*id, bytes.clone()))
            .collect())
    }

    fn write(&self, id: TileId, bytes: &[u8]) -> Result<(), DiskCacheError> {
        self.entries
            .lock()
            .insert(id.to_scheme(Scheme::NorthUp), Bytes::copy_from_slice(bytes));
        Ok(())
    }
}

/// Filesystem cache laid out as `<root>/<zoom>/<x>/<y>.quad` (north-up rows).
#[derive(Debug, Clone)]
pub struct FsDiskCache {
    root: PathBuf,
}

impl FsDiskCache {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Path of the file holding `id`.
    pub fn path_for(&self, id: TileId) -> PathBuf {
        let id = id.to_scheme(Scheme::NorthUp);
        self.root
            .join(id.zoom.to_string())
            .join(id.x.to_string())
            .join(format!("{}.{}", id.y, QUAD_FILE_EXTENSION))
    }

    /// Parses `<zoom>/<x>/<y>.quad` relative to the root.
    fn id_from_path(&self, path: &Path) -> Option<TileId> {
        let relative = path.strip_prefix(&self.root).ok()?;
        let mut parts = relative.components().map(|c| c.as_os_str().to_str());
        let zoom = parts.next()??.parse().ok()?;
        let x = parts.next()??.parse().ok()?;
        let file = parts.next()??;
        if parts.next().is_some() {
            return None;
        }
        let y = file
            .strip_suffix(QUAD_FILE_EXTENSION)?
            .strip_suffix('.')?
            .parse()
            .ok()?;
        Some(TileId::new(zoom, x, y))
    }

    fn collect_files(dir: &Path, depth: usize, out: &mut Vec<PathBuf>) -> io::Result<()> {
        for entry in fs::read_dir(dir)? {
            let path = entry?.path();
            if depth > 0 && path.is_dir() {
                Self::collect_files(&path, depth - 1, out)?;
            } else if depth == 0
                && path.extension().and_then(|e| e.to_str()) == Some(QUAD_FILE_EXTENSION)
            {
                out.push(path);
            }
        }
        Ok(())
    }
}

impl DiskCache for FsDiskCache {
    fn read_all(&self) -> Result<Vec<(TileId, Bytes)>, DiskCacheError> {
        if !self.root.exists() {
            return Ok(Vec::new());
        }

        let mut files = Vec::new();
        Self::collect_files(&self.root, 2, &mut files)?;

        let mut quads = Vec::with_capacity(files.len());
        for path in files {
            let Some(id) = self.id_from_path(&path) else {
                tracing::debug!(path = %path.display(), "Skipping unrecognised cache file");
                continue;
            };
            match fs::read(&path) {
                Ok(bytes) => quads.push((id, Bytes::from(bytes))),
                Err(e) => {
                    tracing::warn!(path = %path.display(), error = %e, "Failed to read cached quad")
                }
            }
        }
        Ok(quads)
    }

    fn write(&self, id: TileId, bytes: &[u8]) -> Result<(), DiskCacheError> {
        let path = self.path_for(id);
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)?;
        }

        // Temp file then rename, so readers never see a torn quad
        let temp_path = path.with_extension("tmp");
        {
            let mut writer = BufWriter::new(File::create(&temp_path)?);
            writer.write_all(bytes)?;
            writer.flush()?;
        }
        fs::rename(&temp_path, &path)?;
        Ok(())
    }
}
