//! Coordinate conversion module
//!
//! Converts between geographic coordinates (latitude/longitude) and Web
//! Mercator tile identifiers. The draw-list generator uses these to find the
//! tile under the camera.

use std::f64::consts::PI;

use thiserror::Error;

use crate::tile::{Scheme, TileId};

/// Web Mercator valid latitude range
pub const MIN_LAT: f64 = -85.05112878;
pub const MAX_LAT: f64 = 85.05112878;

/// Valid longitude range
pub const MIN_LON: f64 = -180.0;
pub const MAX_LON: f64 = 180.0;

/// Deepest zoom level accepted for conversions.
pub const MAX_ZOOM: u8 = 22;

/// Errors that can occur during coordinate conversion.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum CoordError {
    #[error("Invalid latitude: {0} (must be between -85.05112878 and 85.05112878)")]
    InvalidLatitude(f64),
    #[error("Invalid longitude: {0} (must be between -180 and 180)")]
    InvalidLongitude(f64),
    #[error("Invalid zoom level: {0} (must be at most 22)")]
    InvalidZoom(u8),
}

/// Converts geographic coordinates to the north-up tile containing them.
///
/// # Arguments
///
/// * `lat` - Latitude in degrees (-85.05112878 to 85.05112878)
/// * `lon` - Longitude in degrees (-180.0 to 180.0)
/// * `zoom` - Zoom level (0 to [`MAX_ZOOM`])
#[inline]
pub fn to_tile_id(lat: f64, lon: f64, zoom: u8) -> Result<TileId, CoordError> {
    if !(MIN_LAT..=MAX_LAT).contains(&lat) {
        return Err(CoordError::InvalidLatitude(lat));
    }
    if !(MIN_LON..=MAX_LON).contains(&lon) {
        return Err(CoordError::InvalidLongitude(lon));
    }
    if zoom > MAX_ZOOM {
        return Err(CoordError::InvalidZoom(zoom));
    }

    let n = 2.0_f64.powi(zoom as i32);
    let last = n as u32 - 1;

    // lon = 180.0 and lat = MIN_LAT land exactly on the far edge
    let x = (((lon + 180.0) / 360.0 * n) as u32).min(last);
    let lat_rad = lat * PI / 180.0;
    let y = (((1.0 - lat_rad.tan().asinh() / PI) / 2.0 * n) as u32).min(last);

    Ok(TileId::new(zoom, x, y))
}

/// Returns the latitude/longitude of the tile's north-west corner.
#[inline]
pub fn tile_to_lat_lon(tile: &TileId) -> (f64, f64) {
    let tile = tile.to_scheme(Scheme::NorthUp);
    fractional_to_lat_lon(tile.x as f64, tile.y as f64, tile.zoom)
}

/// Returns the latitude/longitude of the tile's center.
#[inline]
pub fn tile_center(tile: &TileId) -> (f64, f64) {
    let tile = tile.to_scheme(Scheme::NorthUp);
    fractional_to_lat_lon(tile.x as f64 + 0.5, tile.y as f64 + 0.5, tile.zoom)
}

fn fractional_to_lat_lon(x: f64, y: f64, zoom: u8) -> (f64, f64) {
    let n = 2.0_f64.powi(zoom as i32);
    let lon = x / n * 360.0 - 180.0;
    let lat_rad = (PI * (1.0 - 2.0 * y / n)).sinh().atan();
    (lat_rad * 180.0 / PI, lon)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_new_york_city_at_zoom_16() {
        let tile = to_tile_id(40.7128, -74.0060, 16).unwrap();
        assert_eq!(tile.y, 24640);
        assert_eq!(tile.x, 19295);
        assert_eq!(tile.zoom, 16);
    }

    #[test]
    fn test_invalid_latitude() {
        let result = to_tile_id(90.0, 0.0, 10);
        assert!(matches!(result, Err(CoordError::InvalidLatitude(_))));
    }

    #[test]
    fn test_invalid_zoom() {
        let result = to_tile_id(0.0, 0.0, MAX_ZOOM + 1);
        assert!(matches!(result, Err(CoordError::InvalidZoom(_))));
    }

    #[test]
    fn test_far_edge_clamped() {
        let tile = to_tile_id(MIN_LAT, 180.0, 3).unwrap();
        assert_eq!(tile.x, 7);
        assert_eq!(tile.y, 7);
    }

    #[test]
    fn test_tile_to_lat_lon_at_equator() {
        let (lat, lon) = tile_to_lat_lon(&TileId::new(10, 512, 512));
        assert!(lat.abs() < 1.0, "Should be near equator");
        assert!(lon.abs() < 1.0, "Should be near prime meridian");
    }

    #[test]
    fn test_south_up_tile_converts_like_north_up() {
        let tile = TileId::new(8, 100, 60);
        let tms = tile.to_scheme(Scheme::SouthUp);
        assert_eq!(tile_to_lat_lon(&tile), tile_to_lat_lon(&tms));
    }

    #[test]
    fn test_center_maps_back_to_tile() {
        let tile = TileId::new(14, 8800, 5370);
        let (lat, lon) = tile_center(&tile);
        assert_eq!(to_tile_id(lat, lon, 14).unwrap(), tile);
    }

    mod property_tests {
        use super::*;
        use proptest::prelude::*;

        proptest! {
            #[test]
            fn test_roundtrip_property(
                lat in -85.05..85.05_f64,
                lon in -180.0..180.0_f64,
                zoom in 0u8..=18
            ) {
                let tile = to_tile_id(lat, lon, zoom)?;
                let (converted_lat, converted_lon) = tile_to_lat_lon(&tile);
                let tile_size = 360.0 / (2.0_f64.powi(zoom as i32));

                prop_assert!((converted_lat - lat).abs() < tile_size);
                prop_assert!((converted_lon - lon).abs() < tile_size);
            }

            #[test]
            fn test_tile_coords_in_bounds(
                lat in -85.05..85.05_f64,
                lon in -180.0..180.0_f64,
                zoom in 0u8..=18
            ) {
                let tile = to_tile_id(lat, lon, zoom)?;
                let max_tile = 2u32.pow(zoom as u32);
                prop_assert!(tile.y < max_tile);
                prop_assert!(tile.x < max_tile);
                prop_assert_eq!(tile.zoom, zoom);
            }
        }
    }
}
