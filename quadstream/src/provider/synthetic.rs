//! Offline tile source that renders small PNG tiles locally.
//!
//! Useful for demos and tests: every tile is a solid color derived from its
//! address, produced after an optional artificial latency. Selected tiles can
//! be configured to report `NotFound` or to never answer.

use bytes::Bytes;
use image::{ImageFormat, Rgba, RgbaImage};
use std::collections::HashSet;
use std::io::Cursor;
use std::time::Duration;

use super::types::{FetchError, TileSource};
use crate::tile::{Scheme, TileId};

/// Default edge length of generated tiles in pixels.
pub const DEFAULT_SYNTHETIC_TILE_SIZE: u32 = 8;

/// Tile source that encodes a solid-color PNG per tile.
#[derive(Debug, Clone)]
pub struct SyntheticSource {
    tile_size: u32,
    latency: Duration,
    missing: HashSet<TileId>,
    stalled: HashSet<TileId>,
}

impl SyntheticSource {
    pub fn new() -> Self {
        Self {
            tile_size: DEFAULT_SYNTHETIC_TILE_SIZE,
            latency: Duration::ZERO,
            missing: HashSet::new(),
            stalled: HashSet::new(),
        }
    }

    /// Delay applied before every answer.
    pub fn with_latency(mut self, latency: Duration) -> Self {
        self.latency = latency;
        self
    }

    /// Edge length of generated tiles.
    pub fn with_tile_size(mut self, tile_size: u32) -> Self {
        self.tile_size = tile_size.max(1);
        self
    }

    /// Tiles answered with `NotFound`.
    pub fn with_missing(mut self, tiles: impl IntoIterator<Item = TileId>) -> Self {
        self.missing
            .extend(tiles.into_iter().map(|t| t.to_scheme(Scheme::NorthUp)));
        self
    }

    /// Tiles that never answer.
    pub fn with_stalled(mut self, tiles: impl IntoIterator<Item = TileId>) -> Self {
        self.stalled
            .extend(tiles.into_iter().map(|t| t.to_scheme(Scheme::NorthUp)));
        self
    }

    /// Encodes the PNG for `id`.
    pub fn render(&self, id: TileId) -> Result<Bytes, FetchError> {
        let id = id.to_scheme(Scheme::NorthUp);
        let color = Rgba([
            (id.x.wrapping_mul(53) % 256) as u8,
            (id.y.wrapping_mul(97) % 256) as u8,
            id.zoom.wrapping_mul(11),
            255,
        ]);
        let image = RgbaImage::from_pixel(self.tile_size, self.tile_size, color);

        let mut buffer = Cursor::new(Vec::new());
        image
            .write_to(&mut buffer, ImageFormat::Png)
            .map_err(|e| FetchError::Network(format!("Failed to encode tile {}: {}", id, e)))?;
        Ok(Bytes::from(buffer.into_inner()))
    }
}

impl Default for SyntheticSource {
    fn default() -> Self {
        Self::new()
    }
}

impl TileSource for SyntheticSource {
    async fn fetch(&self, id: TileId) -> Result<Bytes, FetchError> {
        let key = id.to_scheme(Scheme::NorthUp);
        if self.stalled.contains(&key) {
            std::future::pending::<()>().await;
        }
        if !self.latency.is_zero() {
            tokio::time::sleep(self.latency).await;
        }
        if self.missing.contains(&key) {
            return Err(FetchError::NotFound(id.to_string()));
        }
        self.render(id)
    }

    fn name(&self) -> &str {
        "synthetic"
    }
}
