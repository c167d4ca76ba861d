//! Level-of-detail configuration and selection
//!
//! Levels are numbered from `min_lod` (the finest level, whose pixels are world pixels)
//! up to `max_lod` (the coarsest). Each step towards a coarser level multiplies the
//! world size of a LOD pixel by the matching entry of `gaps`.

use crate::{Dimensions, Result, TiledImageError};

#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

/// Immutable LOD description of a tiled image
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct LodInfo {
    min_lod: u32,
    max_lod: u32,
    initial_zoom: f64,
    min_zoom: f64,
    max_zoom: f64,
    /// `gaps[i]` is the scale ratio between level `min_lod + i + 1` and `min_lod + i`
    gaps: Vec<f64>,
}

#[cfg_attr(feature = "profiling", profiling::all_functions)]
impl LodInfo {
    pub fn new(
        min_lod: u32,
        max_lod: u32,
        initial_zoom: f64,
        min_zoom: f64,
        max_zoom: f64,
        gaps: Vec<f64>,
    ) -> Result<Self> {
        let info = Self {
            min_lod,
            max_lod,
            initial_zoom,
            min_zoom,
            max_zoom,
            gaps,
        };
        info.validate()?;
        Ok(info)
    }

    /// LOD info where every pair of adjacent levels is `gap` apart
    pub fn uniform(
        min_lod: u32,
        max_lod: u32,
        initial_zoom: f64,
        min_zoom: f64,
        max_zoom: f64,
        gap: f64,
    ) -> Result<Self> {
        let count = max_lod.saturating_sub(min_lod) as usize;
        Self::new(
            min_lod,
            max_lod,
            initial_zoom,
            min_zoom,
            max_zoom,
            vec![gap; count],
        )
    }

    pub fn validate(&self) -> Result<()> {
        let invalid = |message: String| Err(TiledImageError::InvalidLodInfo(message));

        if self.min_lod > self.max_lod {
            return invalid(format!(
                "min_lod ({}) is greater than max_lod ({})",
                self.min_lod, self.max_lod
            ));
        }
        for (name, zoom) in [
            ("initial_zoom", self.initial_zoom),
            ("min_zoom", self.min_zoom),
            ("max_zoom", self.max_zoom),
        ] {
            if !zoom.is_finite() || zoom <= 0.0 {
                return invalid(format!("{name} must be positive and finite, got {zoom}"));
            }
        }
        if !(self.min_zoom <= self.initial_zoom && self.initial_zoom <= self.max_zoom) {
            return invalid(format!(
                "zoom levels must satisfy min <= initial <= max, got {} <= {} <= {}",
                self.min_zoom, self.initial_zoom, self.max_zoom
            ));
        }
        let expected = (self.max_lod - self.min_lod) as usize;
        if self.gaps.len() != expected {
            return invalid(format!(
                "expected {expected} LOD gaps, got {}",
                self.gaps.len()
            ));
        }
        if let Some(gap) = self.gaps.iter().find(|g| !g.is_finite() || **g <= 0.0) {
            return invalid(format!("LOD gaps must be positive and finite, got {gap}"));
        }
        Ok(())
    }

    pub fn min_lod(&self) -> u32 {
        self.min_lod
    }

    pub fn max_lod(&self) -> u32 {
        self.max_lod
    }

    pub fn initial_zoom(&self) -> f64 {
        self.initial_zoom
    }

    pub fn min_zoom(&self) -> f64 {
        self.min_zoom
    }

    pub fn max_zoom(&self) -> f64 {
        self.max_zoom
    }

    pub fn gaps(&self) -> &[f64] {
        &self.gaps
    }

    /// Clamp a zoom level into `[min_zoom, max_zoom]`
    pub fn clamp_zoom(&self, zoom: f64) -> f64 {
        if zoom.is_nan() {
            return self.initial_zoom;
        }
        zoom.clamp(self.min_zoom, self.max_zoom)
    }

    pub fn clamp_lod(&self, level: u32) -> u32 {
        level.clamp(self.min_lod, self.max_lod)
    }

    /// Pick the coarsest level that still shows at least one LOD pixel per view pixel.
    ///
    /// The walk starts at `max_lod` and moves to finer levels while the requested zoom
    /// exceeds the running threshold. Larger zooms never select a coarser level.
    pub fn calculate_lod_level(&self, zoom: f64) -> u32 {
        let zoom = self.clamp_zoom(zoom);
        let mut level = self.max_lod;
        let mut threshold = self.max_zoom / self.lod_to_world_scale(self.max_lod);
        while zoom > threshold && level > self.min_lod {
            level -= 1;
            threshold *= self.gap_below(level + 1);
        }
        self.clamp_lod(level)
    }

    /// Size of one LOD pixel in world pixels. The finest level has a scale of one.
    pub fn lod_to_world_scale(&self, level: u32) -> f64 {
        let level = self.clamp_lod(level);
        (self.min_lod + 1..=level)
            .map(|l| self.gap_below(l))
            .product()
    }

    /// Tile grid of `base` when rendered at `level`
    pub fn lod_dimensions(&self, base: &Dimensions, level: u32) -> Dimensions {
        base.at_lod_scale(self.lod_to_world_scale(level))
    }

    /// Gap between `level` and the next finer level
    fn gap_below(&self, level: u32) -> f64 {
        level
            .checked_sub(self.min_lod + 1)
            .and_then(|i| self.gaps.get(i as usize))
            .copied()
            .unwrap_or(1.0)
    }
}
