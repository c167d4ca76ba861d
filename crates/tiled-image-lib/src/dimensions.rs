//! Tile grid dimensions of a tiled image

use crate::{Result, TiledImageError};

#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

/// Size of a tiled image expressed as a tile grid.
///
/// Counts and sizes are strictly positive, margins may be zero. The margins are
/// the blank space on each side of the actual content, in pixels.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct Dimensions {
    horizontal_tiles: u32,
    vertical_tiles: u32,
    tile_width: u32,
    tile_height: u32,
    /// Layer count, not including the stacked layer
    layer_count: u32,
    horizontal_margin: u32,
    vertical_margin: u32,
}

#[cfg_attr(feature = "profiling", profiling::all_functions)]
impl Dimensions {
    /// Create validated dimensions
    pub fn new(
        horizontal_tiles: u32,
        vertical_tiles: u32,
        tile_width: u32,
        tile_height: u32,
        layer_count: u32,
        horizontal_margin: u32,
        vertical_margin: u32,
    ) -> Result<Self> {
        let dimensions = Self {
            horizontal_tiles,
            vertical_tiles,
            tile_width,
            tile_height,
            layer_count,
            horizontal_margin,
            vertical_margin,
        };
        dimensions.validate()?;
        Ok(dimensions)
    }

    /// Single-layer dimensions without margins
    pub fn simple(horizontal_tiles: u32, vertical_tiles: u32, tile_size: u32) -> Result<Self> {
        Self::new(horizontal_tiles, vertical_tiles, tile_size, tile_size, 1, 0, 0)
    }

    pub fn validate(&self) -> Result<()> {
        let positive = [
            ("horizontal_tiles", self.horizontal_tiles),
            ("vertical_tiles", self.vertical_tiles),
            ("tile_width", self.tile_width),
            ("tile_height", self.tile_height),
            ("layer_count", self.layer_count),
        ];
        for (name, value) in positive {
            if value == 0 {
                return Err(TiledImageError::InvalidDimensions(format!(
                    "{name} must be greater than zero"
                )));
            }
        }
        let margins = [
            ("horizontal_margin", self.horizontal_margin, self.width()),
            ("vertical_margin", self.vertical_margin, self.height()),
        ];
        for (name, margin, size) in margins {
            if 2 * u64::from(margin) >= size {
                return Err(TiledImageError::InvalidDimensions(format!(
                    "{name} ({margin}) leaves no content in {size} pixels"
                )));
            }
        }
        Ok(())
    }

    pub fn horizontal_tiles(&self) -> u32 {
        self.horizontal_tiles
    }

    pub fn vertical_tiles(&self) -> u32 {
        self.vertical_tiles
    }

    pub fn tile_width(&self) -> u32 {
        self.tile_width
    }

    pub fn tile_height(&self) -> u32 {
        self.tile_height
    }

    pub fn layer_count(&self) -> u32 {
        self.layer_count
    }

    pub fn horizontal_margin(&self) -> u32 {
        self.horizontal_margin
    }

    pub fn vertical_margin(&self) -> u32 {
        self.vertical_margin
    }

    /// Width of the entire image in pixels
    pub fn width(&self) -> u64 {
        u64::from(self.horizontal_tiles) * u64::from(self.tile_width)
    }

    /// Height of the entire image in pixels
    pub fn height(&self) -> u64 {
        u64::from(self.vertical_tiles) * u64::from(self.tile_height)
    }

    /// Width with the blank margins trimmed
    pub fn content_width(&self) -> u64 {
        self.width()
            .saturating_sub(2 * u64::from(self.horizontal_margin))
    }

    /// Height with the blank margins trimmed
    pub fn content_height(&self) -> u64 {
        self.height()
            .saturating_sub(2 * u64::from(self.vertical_margin))
    }

    /// Left edge of the content, in pixels
    pub fn content_left(&self) -> u64 {
        u64::from(self.horizontal_margin)
    }

    /// Top edge of the content, in pixels
    pub fn content_top(&self) -> u64 {
        u64::from(self.vertical_margin)
    }

    /// Tile count of a single layer
    pub fn tile_count(&self) -> u64 {
        u64::from(self.horizontal_tiles) * u64::from(self.vertical_tiles)
    }

    /// Tile count of all layers, including the stacked layer
    pub fn layered_tile_count(&self) -> u64 {
        self.tile_count() * (u64::from(self.layer_count) + 1)
    }

    /// Dimensions of the image at LOD `level`, where each level halves the tile grid.
    ///
    /// Tile counts never drop below one.
    pub fn at_lod_level(&self, level: u32) -> Self {
        let factor = 1u64.checked_shl(level).unwrap_or(u64::MAX);
        self.scaled_down(|value| (u64::from(value) / factor) as u32)
    }

    /// Dimensions of the image at an arbitrary LOD-to-world scale factor
    pub fn at_lod_scale(&self, scale: f64) -> Self {
        let scale = if scale.is_finite() && scale >= 1.0 { scale } else { 1.0 };
        self.scaled_down(|value| (f64::from(value) / scale).floor() as u32)
    }

    fn scaled_down(&self, divide: impl Fn(u32) -> u32) -> Self {
        Self {
            horizontal_tiles: divide(self.horizontal_tiles).max(1),
            vertical_tiles: divide(self.vertical_tiles).max(1),
            tile_width: self.tile_width,
            tile_height: self.tile_height,
            layer_count: self.layer_count,
            horizontal_margin: divide(self.horizontal_margin),
            vertical_margin: divide(self.vertical_margin),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_derived_sizes() {
        let dims = Dimensions::new(10, 4, 256, 128, 3, 16, 8).unwrap();
        assert_eq!(dims.width(), 2560);
        assert_eq!(dims.height(), 512);
        assert_eq!(dims.content_width(), 2528);
        assert_eq!(dims.content_height(), 496);
        assert_eq!((dims.content_left(), dims.content_top()), (16, 8));
        assert_eq!(dims.tile_count(), 40);
        assert_eq!(dims.layered_tile_count(), 160);
    }

    #[test]
    fn test_rejects_zero_sizes() {
        assert!(matches!(
            Dimensions::new(0, 4, 256, 256, 1, 0, 0),
            Err(TiledImageError::InvalidDimensions(_))
        ));
        assert!(Dimensions::new(4, 4, 256, 0, 1, 0, 0).is_err());
        assert!(Dimensions::new(4, 4, 256, 256, 0, 0, 0).is_err());
    }

    #[test]
    fn test_rejects_margins_without_content() {
        // 2x1 tiles of 100px: 200x100 pixels
        assert!(matches!(
            Dimensions::new(2, 1, 100, 100, 1, 100, 0),
            Err(TiledImageError::InvalidDimensions(_))
        ));
        assert!(Dimensions::new(2, 1, 100, 100, 1, 0, 50).is_err());
        assert!(Dimensions::new(2, 1, 100, 100, 1, 0, 80).is_err());

        let dims = Dimensions::new(2, 1, 100, 100, 1, 99, 49).unwrap();
        assert_eq!((dims.content_width(), dims.content_height()), (2, 2));
    }

    #[test]
    fn test_at_lod_level_floors_to_one() {
        let dims = Dimensions::new(5, 3, 256, 256, 1, 32, 0).unwrap();
        let level1 = dims.at_lod_level(1);
        assert_eq!(level1.horizontal_tiles(), 2);
        assert_eq!(level1.vertical_tiles(), 1);
        assert_eq!(level1.horizontal_margin(), 16);
        assert_eq!(level1.tile_width(), 256);

        let level10 = dims.at_lod_level(10);
        assert_eq!(level10.horizontal_tiles(), 1);
        assert_eq!(level10.vertical_tiles(), 1);

        let level64 = dims.at_lod_level(64);
        assert_eq!(level64.horizontal_tiles(), 1);
    }

    #[test]
    fn test_at_lod_scale_matches_power_of_two() {
        let dims = Dimensions::simple(1000, 600, 256).unwrap();
        assert_eq!(dims.at_lod_scale(4.0), dims.at_lod_level(2));
        assert_eq!(dims.at_lod_scale(1.0), dims);
    }
}
