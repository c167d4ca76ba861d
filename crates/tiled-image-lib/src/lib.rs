//! Tiled Image Library - Viewport-Driven Tile Streaming for Gigapixel Images
//!
//! This library decides which tiles of a very large, multi-LOD raster image are needed to
//! fill a rotated, zoomed and panned viewport, keeps one load task per needed tile, and
//! culls overlay items with a point quad-tree. Pixels are someone else's business: tiles
//! come from an [`ImageSource`] and frames go to a [`RenderSink`].
//!
//! # Architecture
//!
//! - **[`ImageViewState`]**: zoom, rotation, scroll offset and the world/envelope/view matrices
//! - **[`CullContext`]**: two-phase rectangle classification against the viewport
//! - **[`TileCuller`]**: recursive subdivision of the tile grid down to the visible tiles
//! - **[`PointQuadTree`]**: generic point index with insertion, removal and window queries
//! - **[`OverlayCuller`]**: visible overlay items, with added/removed notifications
//! - **[`TileLoadManager`]**: reconciles visible tiles with load tasks, nearest tiles first
//! - **[`TiledImageView`]**: attaches a source and drives all of the above
//!
//! # Performance Characteristics
//!
//! - **Tile culling**: proportional to the number of tiles along the viewport boundary,
//!   not to the grid size
//! - **Overlay culling**: O(log N + K) for N registered corners and K visible ones
//! - **Load reconciliation**: O(V log V) for V visible tiles

mod cull;
mod dimensions;
mod load_task;
mod lod;
mod overlay_culler;
pub mod quadtree;
mod render;
mod source;
mod tile_culler;
mod tile_index;
mod tiles_manager;
pub mod utils;
mod view;
mod view_state;

// Public API exports
pub use cull::{CullContext, Intersection};
pub use dimensions::Dimensions;
pub use load_task::{
    CancellationToken, LoadTileRequest, LoadTileStatus, LoadTileTask, TaskId, TileEvent,
    TileEventKind,
};
pub use lod::LodInfo;
pub use overlay_culler::{OverlayCuller, OverlayEvent, QuadTreeItem};
pub use quadtree::{Direction, PointQuadTree};
pub use render::{Overlay, RenderItem, RenderSink, TileContent, TilePlaceholder, ViewConfig};
pub use source::ImageSource;
pub use tile_culler::{TileCuller, TileRegion, visible_tiles};
pub use tile_index::{FullTileIndex, LayeredTileIndex, LodTileIndex, TileIndex};
pub use tiles_manager::{TileLoadManager, TileRenderInfo, UpdateTileRequest};
pub use view::TiledImageView;
pub use view_state::ImageViewState;

/// Error types of the tiled image core
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum TiledImageError {
    #[error("Invalid dimensions: {0}")]
    InvalidDimensions(String),

    #[error("Invalid LOD info: {0}")]
    InvalidLodInfo(String),

    #[error("Item is already registered")]
    ItemAlreadyRegistered,

    #[error("Item is not registered")]
    ItemNotRegistered,

    #[error("Item not found in the quad-tree")]
    ItemNotFound,

    #[error("No image source attached")]
    NoSource,

    #[error("Image source cannot create thumbnails")]
    ThumbnailUnsupported,

    #[error("Tile load failed: {0}")]
    TileLoad(String),
}

pub type Result<T> = std::result::Result<T, TiledImageError>;
