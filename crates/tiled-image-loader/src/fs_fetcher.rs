//! Tiles stored as one file each under a directory tree

use crate::{FetchProgress, LoaderError, Result, TileFetcher};
use std::{
    path::{Path, PathBuf},
    sync::Arc,
};
use tiled_image_lib::{Dimensions, FullTileIndex, LodInfo};

/// Reads `root/<lod>/<layer>/<row>/<column>.<ext>`. The bitmap is the raw file content;
/// decoding pixels is left to whoever draws them.
#[derive(Debug, Clone)]
pub struct FsTileFetcher {
    root: PathBuf,
    extension: String,
    dimensions: Dimensions,
    lod_info: LodInfo,
}

impl FsTileFetcher {
    pub fn new(
        root: impl Into<PathBuf>,
        extension: impl Into<String>,
        dimensions: Dimensions,
        lod_info: LodInfo,
    ) -> Self {
        Self {
            root: root.into(),
            extension: extension.into(),
            dimensions,
            lod_info,
        }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn tile_path(&self, index: FullTileIndex) -> PathBuf {
        self.root
            .join(format!("{}.{}", index.to_path(), self.extension))
    }
}

impl TileFetcher for FsTileFetcher {
    type Bitmap = Arc<[u8]>;

    fn dimensions(&self) -> Dimensions {
        self.dimensions
    }

    fn lod_info(&self) -> LodInfo {
        self.lod_info.clone()
    }

    fn tile_key(&self, index: FullTileIndex) -> String {
        self.tile_path(index).display().to_string()
    }

    async fn fetch(&self, index: FullTileIndex, progress: FetchProgress) -> Result<Vec<u8>> {
        let path = self.tile_path(index);
        let bytes = tokio::fs::read(&path)
            .await
            .map_err(|e| LoaderError::Fetch(format!("{}: {}", path.display(), e)))?;
        progress.report(1.0);
        Ok(bytes)
    }

    fn decode(&self, _index: FullTileIndex, bytes: &[u8]) -> Result<Self::Bitmap> {
        if bytes.is_empty() {
            return Err(LoaderError::Decode("empty tile file".to_string()));
        }
        Ok(Arc::from(bytes))
    }
}
