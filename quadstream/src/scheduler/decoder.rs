//! Payload validation on quad ingestion.

use std::io::Cursor;

use thiserror::Error;

use crate::tile::TileId;

/// A tile payload that cannot be used.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum DecodeError {
    #[error("Tile {0} has an empty payload")]
    Empty(TileId),

    #[error("Tile {tile} failed validation: {reason}")]
    Invalid { tile: TileId, reason: String },
}

/// Checks a payload before its quad becomes resident.
pub trait TileDecoder: Send + 'static {
    fn validate(&self, tile: TileId, data: &[u8]) -> Result<(), DecodeError>;
}

/// Accepts raster tiles whose header names a known image format with
/// non-zero dimensions. Pixel data is left to the uploader.
#[derive(Debug, Clone, Copy, Default)]
pub struct ImageHeaderDecoder;

impl TileDecoder for ImageHeaderDecoder {
    fn validate(&self, tile: TileId, data: &[u8]) -> Result<(), DecodeError> {
        if data.is_empty() {
            return Err(DecodeError::Empty(tile));
        }
        let invalid = |reason: String| DecodeError::Invalid { tile, reason };

        let (width, height) = image::ImageReader::new(Cursor::new(data))
            .with_guessed_format()
            .map_err(|e| invalid(e.to_string()))?
            .into_dimensions()
            .map_err(|e| invalid(e.to_string()))?;

        if width == 0 || height == 0 {
            return Err(invalid(format!("zero-sized image {}x{}", width, height)));
        }
        Ok(())
    }
}

/// Accepts any non-empty payload, for sources whose tiles are not images.
#[derive(Debug, Clone, Copy, Default)]
pub struct PassthroughDecoder;

impl TileDecoder for PassthroughDecoder {
    fn validate(&self, tile: TileId, data: &[u8]) -> Result<(), DecodeError> {
        if data.is_empty() {
            Err(DecodeError::Empty(tile))
        } else {
            Ok(())
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::provider::SyntheticSource;

    #[test]
    fn test_accepts_png() {
        let id = TileId::new(3, 1, 1);
        let png = SyntheticSource::new().render(id).unwrap();
        assert!(ImageHeaderDecoder.validate(id, &png).is_ok());
    }

    #[test]
    fn test_rejects_garbage() {
        let id = TileId::new(3, 1, 1);
        assert!(matches!(
            ImageHeaderDecoder.validate(id, b"definitely not an image"),
            Err(DecodeError::Invalid { .. })
        ));
        assert_eq!(
            ImageHeaderDecoder.validate(id, b""),
            Err(DecodeError::Empty(id))
        );
    }

    #[test]
    fn test_passthrough() {
        let id = TileId::new(1, 0, 0);
        assert!(PassthroughDecoder.validate(id, b"pbf").is_ok());
        assert!(PassthroughDecoder.validate(id, b"").is_err());
    }
}
