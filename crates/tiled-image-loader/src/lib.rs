//! Tiled Image Loader - A Concrete Tile Source for tiled-image-lib
//!
//! [`CoalescingImageSource`] turns any [`TileFetcher`] into an
//! [`ImageSource`](tiled_image_lib::ImageSource) that runs on tokio:
//!
//! - one fetch per tile, shared by every request for that tile
//! - the fetch is cancelled once the last interested request is cancelled
//! - decoded tiles are kept in an in-memory LRU
//! - raw tile bytes are optionally persisted in a [`DiskTileCache`]
//!
//! [`FsTileFetcher`] reads tiles laid out as `root/<lod>/<layer>/<row>/<column>.<ext>`.

mod cache;
mod coalescing;
mod config;
mod fetcher;
mod fs_fetcher;

pub use cache::DiskTileCache;
pub use coalescing::CoalescingImageSource;
pub use config::LoaderConfig;
pub use fetcher::{FetchProgress, TileFetcher};
pub use fs_fetcher::FsTileFetcher;

use tiled_image_lib::TiledImageError;

/// Error types of the loader
#[derive(Debug, thiserror::Error)]
pub enum LoaderError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error(transparent)]
    Core(#[from] TiledImageError),

    #[error("No tokio runtime is running")]
    NoRuntime,

    #[error("Fetch failed: {0}")]
    Fetch(String),

    #[error("Decode failed: {0}")]
    Decode(String),

    #[error("Load canceled")]
    Canceled,
}

pub type Result<T> = std::result::Result<T, LoaderError>;
