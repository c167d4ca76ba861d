//! Image source capability consumed by the view

use crate::{Dimensions, LoadTileRequest, LodInfo, Result, TiledImageError};
use std::future::Future;

/// Provider of the tiles of one image.
///
/// `begin_load_tile` must return immediately: the actual load runs elsewhere and reports
/// through the request, which is safe to move across threads.
pub trait ImageSource {
    /// Decoded tile pixels, in whatever form the render sink consumes
    type Bitmap: Clone + Send + 'static;

    fn dimensions(&self) -> Dimensions;

    fn lod_info(&self) -> LodInfo;

    /// Start loading the tile named by `request.index()`
    fn begin_load_tile(&self, request: LoadTileRequest<Self::Bitmap>);

    /// A small rendition of the whole image
    fn create_thumbnail(
        &self,
        width: u32,
        height: u32,
    ) -> impl Future<Output = Result<Self::Bitmap>> + Send {
        let _ = (width, height);
        std::future::ready(Err(TiledImageError::ThumbnailUnsupported))
    }
}
