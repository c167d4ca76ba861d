//! Raw tile access, the part of a tile source that differs between backends

use crate::Result;
use std::{fmt, future::Future, sync::Arc};
use tiled_image_lib::{Dimensions, FullTileIndex, LodInfo};

/// Progress callback handed to [`TileFetcher::fetch`]
#[derive(Clone)]
pub struct FetchProgress {
    report: Arc<dyn Fn(f64) + Send + Sync>,
}

impl FetchProgress {
    pub fn new(report: impl Fn(f64) + Send + Sync + 'static) -> Self {
        Self {
            report: Arc::new(report),
        }
    }

    /// A sink that drops every report
    pub fn ignore() -> Self {
        Self::new(|_| {})
    }

    /// Report the fetched fraction, in `[0, 1]`
    pub fn report(&self, fraction: f64) {
        (self.report)(fraction)
    }
}

impl fmt::Debug for FetchProgress {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FetchProgress").finish_non_exhaustive()
    }
}

/// Backend that knows where tiles live and how to turn their bytes into bitmaps.
///
/// Fetches are dropped mid-flight when nobody wants the tile anymore, so `fetch` should
/// not leave partial state behind across `.await` points.
pub trait TileFetcher: Send + Sync + 'static {
    type Bitmap: Clone + Send + Sync + 'static;

    fn dimensions(&self) -> Dimensions;

    fn lod_info(&self) -> LodInfo;

    /// Stable identity of a tile across runs, hashed to address the persisted cache
    fn tile_key(&self, index: FullTileIndex) -> String;

    fn fetch(
        &self,
        index: FullTileIndex,
        progress: FetchProgress,
    ) -> impl Future<Output = Result<Vec<u8>>> + Send;

    fn decode(&self, index: FullTileIndex, bytes: &[u8]) -> Result<Self::Bitmap>;
}
