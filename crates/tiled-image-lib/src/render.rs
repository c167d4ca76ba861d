//! Frame output: the render sink the view draws into, overlays drawn on top of the tiles,
//! and the rendering options

use crate::{FullTileIndex, ImageViewState, LoadTileStatus};
use geo::{AffineTransform, Rect};

#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

/// Rendering options of a view
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct ViewConfig {
    /// Grow every tile by half a view pixel on each side so that antialiased edges of
    /// adjacent tiles do not leave hairline gaps
    pub compensate_tile_gaps: bool,
    /// Draw placeholders for tiles that are still loading
    pub darken_loading_tiles: bool,
}

impl Default for ViewConfig {
    fn default() -> Self {
        Self {
            compensate_tile_gaps: true,
            darken_loading_tiles: true,
        }
    }
}

/// Stand-in for a tile without pixels
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct TilePlaceholder<'a> {
    pub index: FullTileIndex,
    pub status: LoadTileStatus,
    pub progress: f64,
    pub error: Option<&'a str>,
}

/// What to draw for one tile region
#[derive(Debug, PartialEq)]
pub enum TileContent<'a, B> {
    Bitmap(&'a B),
    Placeholder(TilePlaceholder<'a>),
}

// Only references inside, so copyable whatever the bitmap type
impl<B> Clone for TileContent<'_, B> {
    fn clone(&self) -> Self {
        *self
    }
}

impl<B> Copy for TileContent<'_, B> {}

/// A tile drawing command, in world coordinates
#[derive(Debug, PartialEq)]
pub struct RenderItem<'a, B> {
    pub content: TileContent<'a, B>,
    pub rect: Rect<f64>,
}

impl<B> Clone for RenderItem<'_, B> {
    fn clone(&self) -> Self {
        *self
    }
}

impl<B> Copy for RenderItem<'_, B> {}

/// Drawing surface. Rectangles are in the space set up by the innermost pushed transform.
pub trait RenderSink<B> {
    fn push_transform(&mut self, transform: &AffineTransform<f64>);

    fn draw_bitmap(&mut self, bitmap: &B, rect: Rect<f64>);

    fn draw_placeholder(&mut self, placeholder: &TilePlaceholder<'_>, rect: Rect<f64>);

    /// Outline used by overlays for markers
    fn draw_outline(&mut self, rect: Rect<f64>, label: Option<&str>) {
        let _ = (rect, label);
    }

    fn pop_transform(&mut self);
}

/// Content drawn above the tiles, kept informed of view changes
pub trait Overlay<B> {
    fn on_layer_changed(&mut self, layer: u32) {
        let _ = layer;
    }

    fn on_view_state_changed(&mut self, state: &ImageViewState) {
        let _ = state;
    }

    /// Draw in world coordinates; the world-to-view transform is already pushed
    fn render(&self, state: &ImageViewState, sink: &mut dyn RenderSink<B>);
}
