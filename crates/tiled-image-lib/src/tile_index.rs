//! Tile index value types
//!
//! Four flavours identify a tile with increasing precision: a grid position, a grid
//! position at a LOD, a grid position in a layer, and the full `(column, row, lod, layer)`
//! tuple used as the key of loads and caches. Indices are unsigned, so a negative
//! column or row cannot be represented.

use std::fmt;
use std::hash::{Hash, Hasher};

#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

/// Column and row of a tile inside a grid
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Default)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct TileIndex {
    pub column: u32,
    pub row: u32,
}

/// Tile index at a given LOD level
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct LodTileIndex {
    pub column: u32,
    pub row: u32,
    pub lod: u32,
}

/// Tile index in a given layer
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct LayeredTileIndex {
    pub column: u32,
    pub row: u32,
    pub layer: u32,
}

/// Tile index with both LOD level and layer
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct FullTileIndex {
    pub column: u32,
    pub row: u32,
    pub lod: u32,
    pub layer: u32,
}

impl TileIndex {
    pub const fn new(column: u32, row: u32) -> Self {
        Self { column, row }
    }

    pub fn with_lod(self, lod: u32) -> LodTileIndex {
        LodTileIndex::new(self.column, self.row, lod)
    }

    pub fn with_layer(self, layer: u32) -> LayeredTileIndex {
        LayeredTileIndex::new(self.column, self.row, layer)
    }

    pub fn with_lod_and_layer(self, lod: u32, layer: u32) -> FullTileIndex {
        FullTileIndex::new(self.column, self.row, lod, layer)
    }

    /// Spreadsheet-style label of the row: A..Z, AA..AZ, BA..
    pub fn row_label(&self) -> String {
        let mut label = Vec::new();
        let mut n = u64::from(self.row) + 1;
        while n > 0 {
            n -= 1;
            label.push(b'A' + (n % 26) as u8);
            n /= 26;
        }
        label.reverse();
        String::from_utf8_lossy(&label).into_owned()
    }
}

impl LodTileIndex {
    pub const fn new(column: u32, row: u32, lod: u32) -> Self {
        Self { column, row, lod }
    }

    pub fn tile(&self) -> TileIndex {
        TileIndex::new(self.column, self.row)
    }

    pub fn with_layer(self, layer: u32) -> FullTileIndex {
        FullTileIndex::new(self.column, self.row, self.lod, layer)
    }
}

impl LayeredTileIndex {
    pub const fn new(column: u32, row: u32, layer: u32) -> Self {
        Self { column, row, layer }
    }

    pub fn tile(&self) -> TileIndex {
        TileIndex::new(self.column, self.row)
    }

    pub fn with_lod(self, lod: u32) -> FullTileIndex {
        FullTileIndex::new(self.column, self.row, lod, self.layer)
    }
}

impl FullTileIndex {
    pub const fn new(column: u32, row: u32, lod: u32, layer: u32) -> Self {
        Self {
            column,
            row,
            lod,
            layer,
        }
    }

    pub fn tile(&self) -> TileIndex {
        TileIndex::new(self.column, self.row)
    }

    pub fn lod_index(&self) -> LodTileIndex {
        LodTileIndex::new(self.column, self.row, self.lod)
    }

    pub fn layered_index(&self) -> LayeredTileIndex {
        LayeredTileIndex::new(self.column, self.row, self.layer)
    }

    /// Same grid position and LOD in another layer
    pub fn in_layer(self, layer: u32) -> Self {
        Self { layer, ..self }
    }

    /// Relative path of the tile: `lod/layer/row/column`
    pub fn to_path(&self) -> String {
        format!("{}/{}/{}/{}", self.lod, self.layer, self.row, self.column)
    }
}

// Hashes pack the fields into one u64. Equal indices always pack identically, so the
// packing stays consistent with the derived equality even where distinct indices collide.

impl Hash for TileIndex {
    fn hash<H: Hasher>(&self, state: &mut H) {
        state.write_u64((u64::from(self.column) << 32) | u64::from(self.row));
    }
}

impl Hash for LodTileIndex {
    fn hash<H: Hasher>(&self, state: &mut H) {
        state.write_u64(
            (u64::from(self.lod) << 56) ^ (u64::from(self.column) << 28) ^ u64::from(self.row),
        );
    }
}

impl Hash for LayeredTileIndex {
    fn hash<H: Hasher>(&self, state: &mut H) {
        state.write_u64(
            (u64::from(self.layer) << 56) ^ (u64::from(self.column) << 28) ^ u64::from(self.row),
        );
    }
}

impl Hash for FullTileIndex {
    fn hash<H: Hasher>(&self, state: &mut H) {
        state.write_u64(
            (u64::from(self.lod) << 58)
                ^ (u64::from(self.layer) << 50)
                ^ (u64::from(self.column) << 25)
                ^ u64::from(self.row),
        );
    }
}

impl From<LodTileIndex> for TileIndex {
    fn from(index: LodTileIndex) -> Self {
        index.tile()
    }
}

impl From<LayeredTileIndex> for TileIndex {
    fn from(index: LayeredTileIndex) -> Self {
        index.tile()
    }
}

impl From<FullTileIndex> for TileIndex {
    fn from(index: FullTileIndex) -> Self {
        index.tile()
    }
}

impl From<FullTileIndex> for LodTileIndex {
    fn from(index: FullTileIndex) -> Self {
        index.lod_index()
    }
}

impl From<FullTileIndex> for LayeredTileIndex {
    fn from(index: FullTileIndex) -> Self {
        index.layered_index()
    }
}

impl fmt::Display for TileIndex {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}{}", self.row_label(), self.column + 1)
    }
}

impl fmt::Display for FullTileIndex {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} @ LOD {} layer {}", self.tile(), self.lod, self.layer)
    }
}
