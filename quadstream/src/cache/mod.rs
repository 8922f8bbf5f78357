//! Quad caches.
//!
//! - [`RamQuadCache`]: the bounded in-memory store of decoded quads, owned by
//!   the scheduler. Eviction never touches protected (desired or GPU-resident)
//!   quads.
//! - [`DiskCache`]: persistent store read once at startup and written back
//!   periodically. [`FsDiskCache`] keeps one bincode file per quad.

mod disk;
mod ram;

pub use disk::{
    decode_quad, encode_quad, DiskCache, DiskCacheError, FsDiskCache, MemoryDiskCache,
    NullDiskCache, QUAD_FILE_EXTENSION,
};
pub use ram::RamQuadCache;
