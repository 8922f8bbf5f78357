//! Quad-tree tile identifiers.
//!
//! A [`TileId`] addresses one tile of a quad-tree pyramid by zoom level and
//! column/row coordinates. Two row conventions are in use by tile servers:
//!
//! - [`Scheme::NorthUp`]: row 0 at the north edge (slippy map / XYZ)
//! - [`Scheme::SouthUp`]: row 0 at the south edge (TMS)
//!
//! Identifiers are plain values; equality and hashing include the scheme, so
//! callers that mix schemes should normalise with [`TileId::to_scheme`] first.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Number of children of one quad-tree node.
pub const QUAD_ARITY: usize = 4;

/// Highest zoom level that fits the packed representation.
pub const MAX_PACKED_ZOOM: u8 = 29;

const COORD_BITS: u32 = 29;
const COORD_MASK: u64 = (1 << COORD_BITS) - 1;
const ZOOM_SHIFT: u32 = 2 * COORD_BITS;

/// Row addressing convention of a tile pyramid.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Scheme {
    /// Row 0 at the north edge (XYZ / slippy map).
    NorthUp,
    /// Row 0 at the south edge (TMS).
    SouthUp,
}

impl Scheme {
    /// Short lowercase name, as used in config files.
    pub fn as_str(&self) -> &'static str {
        match self {
            Scheme::NorthUp => "xyz",
            Scheme::SouthUp => "tms",
        }
    }
}

impl std::str::FromStr for Scheme {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "xyz" | "north-up" | "slippy" => Ok(Scheme::NorthUp),
            "tms" | "south-up" => Ok(Scheme::SouthUp),
            other => Err(format!("unknown tile scheme '{}'", other)),
        }
    }
}

/// Identifier of one tile in a quad-tree.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct TileId {
    /// Zoom level, 0 is the single root tile.
    pub zoom: u8,
    /// Column (x), 0 at the west edge.
    pub x: u32,
    /// Row (y), origin depends on `scheme`.
    pub y: u32,
    /// Row addressing convention.
    pub scheme: Scheme,
}

impl TileId {
    /// Creates a north-up tile identifier.
    pub fn new(zoom: u8, x: u32, y: u32) -> Self {
        Self {
            zoom,
            x,
            y,
            scheme: Scheme::NorthUp,
        }
    }

    /// Creates a tile identifier in the given scheme.
    pub fn with_scheme(zoom: u8, x: u32, y: u32, scheme: Scheme) -> Self {
        Self { zoom, x, y, scheme }
    }

    /// True if the zoom is packable and both coordinates lie inside the
    /// pyramid at that zoom. The arithmetic helpers assume valid ids.
    pub fn is_valid(&self) -> bool {
        self.zoom <= MAX_PACKED_ZOOM
            && (self.x as u64) < self.tiles_per_axis()
            && (self.y as u64) < self.tiles_per_axis()
    }

    /// Number of tiles along one axis at this zoom level.
    #[inline]
    pub fn tiles_per_axis(&self) -> u64 {
        1u64 << self.zoom
    }

    /// Returns the same tile addressed in `scheme`.
    pub fn to_scheme(&self, scheme: Scheme) -> TileId {
        if scheme == self.scheme {
            return *self;
        }
        let flipped = (self.tiles_per_axis() - 1 - self.y as u64) as u32;
        TileId {
            zoom: self.zoom,
            x: self.x,
            y: flipped,
            scheme,
        }
    }

    /// Returns the tile one level up, or `None` for the root.
    pub fn parent(&self) -> Option<TileId> {
        if self.zoom == 0 {
            return None;
        }
        Some(TileId {
            zoom: self.zoom - 1,
            x: self.x / 2,
            y: self.y / 2,
            scheme: self.scheme,
        })
    }

    /// Returns the four children one level down.
    ///
    /// Order is north-west, north-east, south-west, south-east regardless of
    /// the scheme this identifier is expressed in.
    pub fn children(&self) -> [TileId; QUAD_ARITY] {
        let zoom = self.zoom + 1;
        let (x, y) = (self.x * 2, self.y * 2);
        let (north, south) = match self.scheme {
            Scheme::NorthUp => (y, y + 1),
            Scheme::SouthUp => (y + 1, y),
        };
        let child = |x, y| TileId {
            zoom,
            x,
            y,
            scheme: self.scheme,
        };
        [
            child(x, north),
            child(x + 1, north),
            child(x, south),
            child(x + 1, south),
        ]
    }

    /// Returns true if `self` lies strictly inside the subtree of `other`.
    pub fn is_descendant_of(&self, other: &TileId) -> bool {
        if self.zoom <= other.zoom {
            return false;
        }
        let this = self.to_scheme(Scheme::NorthUp);
        let other = other.to_scheme(Scheme::NorthUp);
        let shift = this.zoom - other.zoom;
        this.x >> shift == other.x && this.y >> shift == other.y
    }

    /// Packs the identifier into two 32-bit words for GPU lookup tables.
    ///
    /// Layout of the combined 64-bit value (always north-up):
    /// `| zoom (5) | x (29) | y (29) |`, split into `[high, low]`.
    pub fn pack(&self) -> [u32; 2] {
        let id = self.to_scheme(Scheme::NorthUp);
        debug_assert!(id.zoom <= MAX_PACKED_ZOOM, "zoom {} not packable", id.zoom);
        let value = (id.zoom as u64) << ZOOM_SHIFT
            | (id.x as u64 & COORD_MASK) << COORD_BITS
            | (id.y as u64 & COORD_MASK);
        [(value >> 32) as u32, value as u32]
    }

    /// Inverse of [`TileId::pack`]; the result is north-up.
    pub fn unpack(packed: [u32; 2]) -> TileId {
        let value = (packed[0] as u64) << 32 | packed[1] as u64;
        TileId {
            zoom: (value >> ZOOM_SHIFT) as u8,
            x: ((value >> COORD_BITS) & COORD_MASK) as u32,
            y: (value & COORD_MASK) as u32,
            scheme: Scheme::NorthUp,
        }
    }
}

impl fmt::Display for TileId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}/{}", self.zoom, self.x, self.y)?;
        if self.scheme == Scheme::SouthUp {
            write!(f, " (tms)")?;
        }
        Ok(())
    }
}
