//! Camera-driven draw-list generation.
//!
//! The scheduler does not know about cameras. It consumes the set of tiles a
//! [`DrawListGenerator`] says are visible, and the GPU side consumes the same
//! set ordered by [`DrawListGenerator::sort`].
//!
//! [`RadiusDrawList`] is a simple generator: the square of tiles within
//! `view_radius` tiles of the tile under the camera, at the camera's zoom.

use crate::coord::{self, CoordError};
use crate::tile::{Scheme, TileId, TileSet};

/// Minimal camera state needed to pick tiles.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Camera {
    /// Latitude of the look-at point in degrees.
    pub lat: f64,
    /// Longitude of the look-at point in degrees.
    pub lon: f64,
    /// Target zoom level for drawn tiles.
    pub zoom: u8,
    /// Half-width of the visible square, in tiles.
    pub view_radius: u32,
}

impl Camera {
    pub fn new(lat: f64, lon: f64, zoom: u8, view_radius: u32) -> Self {
        Self {
            lat,
            lon,
            zoom,
            view_radius,
        }
    }
}

/// Computes which tiles a camera wants drawn, and in which order.
pub trait DrawListGenerator: Send + Sync {
    /// The camera-visible tile set.
    fn desired_tile_set(&self, camera: &Camera) -> Result<TileSet, CoordError>;

    /// Orders `tiles` for drawing, nearest to the camera first.
    fn sort(&self, camera: &Camera, tiles: &TileSet) -> Vec<TileId>;
}

/// Square-radius generator at a single zoom level.
#[derive(Debug, Clone)]
pub struct RadiusDrawList {
    /// Camera zooms below this are raised to it. Must be at least 1 so every
    /// drawn tile belongs to a quad.
    min_zoom: u8,
    /// Scheme of the produced identifiers.
    scheme: Scheme,
}

impl RadiusDrawList {
    pub fn new(min_zoom: u8, scheme: Scheme) -> Self {
        Self {
            min_zoom: min_zoom.max(1),
            scheme,
        }
    }

    fn effective_zoom(&self, camera: &Camera) -> u8 {
        camera.zoom.max(self.min_zoom)
    }
}

impl Default for RadiusDrawList {
    fn default() -> Self {
        Self::new(1, Scheme::NorthUp)
    }
}

impl DrawListGenerator for RadiusDrawList {
    fn desired_tile_set(&self, camera: &Camera) -> Result<TileSet, CoordError> {
        let zoom = self.effective_zoom(camera);
        let center = coord::to_tile_id(camera.lat, camera.lon, zoom)?;
        let last = (center.tiles_per_axis() - 1) as i64;
        let radius = camera.view_radius as i64;

        let clamp = |v: i64| v.clamp(0, last) as u32;
        let (x0, x1) = (clamp(center.x as i64 - radius), clamp(center.x as i64 + radius));
        let (y0, y1) = (clamp(center.y as i64 - radius), clamp(center.y as i64 + radius));

        let mut tiles = TileSet::with_capacity(((x1 - x0 + 1) * (y1 - y0 + 1)) as usize);
        for x in x0..=x1 {
            for y in y0..=y1 {
                tiles.insert(TileId::new(zoom, x, y).to_scheme(self.scheme));
            }
        }
        Ok(tiles)
    }

    fn sort(&self, camera: &Camera, tiles: &TileSet) -> Vec<TileId> {
        let zoom = self.effective_zoom(camera);
        let scale = 2.0_f64.powi(zoom as i32);
        let (cx, cy) = match coord::to_tile_id(camera.lat, camera.lon, zoom) {
            Ok(center) => (center.x as f64 + 0.5, center.y as f64 + 0.5),
            Err(_) => (scale / 2.0, scale / 2.0),
        };

        // Distance measured in camera-zoom tile units so mixed zooms compare
        let distance = |tile: &TileId| {
            let t = tile.to_scheme(Scheme::NorthUp);
            let factor = 2.0_f64.powi(zoom as i32 - t.zoom as i32);
            let dx = (t.x as f64 + 0.5) * factor - cx;
            let dy = (t.y as f64 + 0.5) * factor - cy;
            dx * dx + dy * dy
        };

        let mut ordered: Vec<_> = tiles.iter().copied().collect();
        ordered.sort_by(|a, b| {
            distance(a)
                .total_cmp(&distance(b))
                .then_with(|| (a.zoom, a.x, a.y).cmp(&(b.zoom, b.x, b.y)))
        });
        ordered
    }
}
