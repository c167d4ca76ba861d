//! Image source sharing one fetch between every request for the same tile

use crate::{DiskTileCache, FetchProgress, LoaderConfig, LoaderError, Result, TileFetcher};
use lru::LruCache;
use std::{
    collections::{HashMap, hash_map::Entry},
    future::Future,
    num::NonZeroUsize,
    sync::{Arc, Mutex, MutexGuard},
};
use tiled_image_lib::{
    CancellationToken, Dimensions, FullTileIndex, ImageSource, LoadTileRequest, LodInfo,
    TiledImageError,
};
use tokio::{
    runtime::Handle,
    sync::{Semaphore, watch},
};

#[derive(Debug, Clone)]
enum DownloadState<B> {
    Loading(f64),
    Done(std::result::Result<B, String>),
    Canceled,
}

/// A fetch in flight, observed by one or more requests
struct Download<B> {
    state: watch::Sender<DownloadState<B>>,
    cancel: CancellationToken,
}

struct PendingDownload<B> {
    download: Arc<Download<B>>,
    observers: usize,
}

type Downloads<B> = HashMap<FullTileIndex, PendingDownload<B>>;

struct Shared<F: TileFetcher> {
    fetcher: F,
    disk_cache: Option<DiskTileCache>,
    fetch_slots: Semaphore,
    // Lock order: downloads, then memory_cache
    downloads: Mutex<Downloads<F::Bitmap>>,
    memory_cache: Mutex<LruCache<FullTileIndex, F::Bitmap>>,
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(|poisoned| {
        tracing::warn!("Recovering from a poisoned loader lock");
        poisoned.into_inner()
    })
}

/// [`ImageSource`] over a [`TileFetcher`], running loads on a tokio runtime.
///
/// Requests for a tile that is already being fetched observe the running fetch instead
/// of starting another. The fetch is cancelled when its last observer is cancelled.
/// Completed tiles are kept in an LRU and served without fetching again; failed and
/// cancelled fetches leave nothing behind, so the next request starts over.
pub struct CoalescingImageSource<F: TileFetcher> {
    shared: Arc<Shared<F>>,
    runtime: Handle,
}

#[cfg_attr(feature = "profiling", profiling::all_functions)]
impl<F: TileFetcher> CoalescingImageSource<F> {
    /// Create a source spawning its loads on the current tokio runtime
    pub fn new(fetcher: F, config: LoaderConfig) -> Result<Self> {
        let runtime = Handle::try_current().map_err(|_| LoaderError::NoRuntime)?;
        Ok(Self::with_runtime(fetcher, config, runtime))
    }

    pub fn with_runtime(fetcher: F, config: LoaderConfig, runtime: Handle) -> Self {
        let capacity =
            NonZeroUsize::new(config.memory_cache_capacity).unwrap_or(NonZeroUsize::MIN);
        let shared = Shared {
            fetcher,
            disk_cache: config.cache_dir.map(DiskTileCache::new),
            fetch_slots: Semaphore::new(config.max_concurrent_fetches.max(1)),
            downloads: Mutex::new(HashMap::new()),
            memory_cache: Mutex::new(LruCache::new(capacity)),
        };
        Self {
            shared: Arc::new(shared),
            runtime,
        }
    }

    pub fn fetcher(&self) -> &F {
        &self.shared.fetcher
    }

    pub fn disk_cache(&self) -> Option<&DiskTileCache> {
        self.shared.disk_cache.as_ref()
    }

    /// Number of fetches currently running
    pub fn pending_downloads(&self) -> usize {
        lock(&self.shared.downloads).len()
    }

    /// Number of decoded tiles held in memory
    pub fn cached_tiles(&self) -> usize {
        lock(&self.shared.memory_cache).len()
    }

    pub fn clear_memory_cache(&self) {
        lock(&self.shared.memory_cache).clear();
    }
}

impl<F: TileFetcher> ImageSource for CoalescingImageSource<F> {
    type Bitmap = F::Bitmap;

    fn dimensions(&self) -> Dimensions {
        self.shared.fetcher.dimensions()
    }

    fn lod_info(&self) -> LodInfo {
        self.shared.fetcher.lod_info()
    }

    fn begin_load_tile(&self, request: LoadTileRequest<F::Bitmap>) {
        if request.is_cancelled() {
            request.canceled();
            return;
        }
        let index = request.index();

        let download = {
            let mut downloads = lock(&self.shared.downloads);
            let cached = lock(&self.shared.memory_cache).get(&index).cloned();
            if let Some(bitmap) = cached {
                drop(downloads);
                tracing::trace!("Tile {} served from memory", index);
                request.complete(bitmap);
                return;
            }
            match downloads.entry(index) {
                Entry::Occupied(mut entry) => {
                    let pending = entry.get_mut();
                    pending.observers += 1;
                    tracing::trace!(
                        "Tile {} joins a running fetch ({} observers)",
                        index,
                        pending.observers
                    );
                    Arc::clone(&pending.download)
                }
                Entry::Vacant(entry) => {
                    let download = Arc::new(Download {
                        state: watch::Sender::new(DownloadState::Loading(0.0)),
                        cancel: CancellationToken::new(),
                    });
                    entry.insert(PendingDownload {
                        download: Arc::clone(&download),
                        observers: 1,
                    });
                    self.runtime.spawn(
                        Arc::clone(&self.shared).run_download(index, Arc::clone(&download)),
                    );
                    download
                }
            }
        };

        self.runtime
            .spawn(Arc::clone(&self.shared).observe(request, download));
    }

    /// The tile `(0, 0)` of the coarsest LOD, which covers the whole image on its own
    /// for any reasonable LOD setup. The requested size is left to the renderer.
    fn create_thumbnail(
        &self,
        width: u32,
        height: u32,
    ) -> impl Future<Output = tiled_image_lib::Result<F::Bitmap>> + Send {
        let _ = (width, height);
        let shared = Arc::clone(&self.shared);
        let index = FullTileIndex {
            column: 0,
            row: 0,
            lod: shared.fetcher.lod_info().max_lod(),
            layer: 0,
        };
        async move {
            shared
                .load_uncoalesced(index)
                .await
                .map_err(|e| TiledImageError::TileLoad(e.to_string()))
        }
    }
}

impl<F: TileFetcher> Shared<F> {
    async fn run_download(
        self: Arc<Self>,
        index: FullTileIndex,
        download: Arc<Download<F::Bitmap>>,
    ) {
        let progress = {
            let download = Arc::clone(&download);
            FetchProgress::new(move |fraction| {
                download.state.send_if_modified(|state| match state {
                    DownloadState::Loading(current) if fraction > *current => {
                        *current = fraction.min(1.0);
                        true
                    }
                    _ => false,
                });
            })
        };

        let outcome = tokio::select! {
            biased;
            _ = download.cancel.cancelled() => None,
            result = self.load(index, progress) => Some(result),
        };

        match outcome {
            None => {
                tracing::debug!("Fetch of tile {} canceled", index);
                download.state.send_replace(DownloadState::Canceled);
            }
            Some(Ok(bitmap)) => {
                {
                    let mut downloads = lock(&self.downloads);
                    lock(&self.memory_cache).put(index, bitmap.clone());
                    Self::forget(&mut downloads, index, &download);
                }
                download.state.send_replace(DownloadState::Done(Ok(bitmap)));
            }
            Some(Err(e)) => {
                tracing::warn!("Failed to load tile {}: {}", index, e);
                Self::forget(&mut lock(&self.downloads), index, &download);
                download
                    .state
                    .send_replace(DownloadState::Done(Err(e.to_string())));
            }
        }
    }

    /// Relay the state of `download` to `request` until either finishes
    async fn observe(
        self: Arc<Self>,
        request: LoadTileRequest<F::Bitmap>,
        download: Arc<Download<F::Bitmap>>,
    ) {
        let mut state = download.state.subscribe();
        loop {
            let current = state.borrow_and_update().clone();
            match current {
                DownloadState::Loading(progress) => request.report_progress(progress),
                DownloadState::Done(Ok(bitmap)) => return request.complete(bitmap),
                DownloadState::Done(Err(message)) => return request.fail(message),
                DownloadState::Canceled => return request.canceled(),
            }

            let changed = tokio::select! {
                biased;
                _ = request.cancelled() => None,
                changed = state.changed() => Some(changed.is_ok()),
            };
            match changed {
                None => {
                    self.release(request.index(), &download);
                    return request.canceled();
                }
                Some(false) => return request.fail("tile download vanished"),
                Some(true) => {}
            }
        }
    }

    /// Drop one observer, cancelling the fetch when it was the last
    fn release(&self, index: FullTileIndex, download: &Arc<Download<F::Bitmap>>) {
        let mut downloads = lock(&self.downloads);
        let Some(pending) = downloads.get_mut(&index) else {
            return;
        };
        if !Arc::ptr_eq(&pending.download, download) {
            return;
        }
        pending.observers = pending.observers.saturating_sub(1);
        if pending.observers == 0 {
            downloads.remove(&index);
            download.cancel.cancel();
            tracing::debug!("No observers left for tile {}, canceling its fetch", index);
        }
    }

    /// Remove the map entry of `download`, unless a newer fetch already replaced it
    fn forget(
        downloads: &mut Downloads<F::Bitmap>,
        index: FullTileIndex,
        download: &Arc<Download<F::Bitmap>>,
    ) {
        if downloads
            .get(&index)
            .is_some_and(|pending| Arc::ptr_eq(&pending.download, download))
        {
            downloads.remove(&index);
        }
    }

    async fn load(&self, index: FullTileIndex, progress: FetchProgress) -> Result<F::Bitmap> {
        let _slot = self
            .fetch_slots
            .acquire()
            .await
            .map_err(|_| LoaderError::Canceled)?;
        let bytes = self.load_bytes(index, progress).await?;
        self.fetcher.decode(index, &bytes)
    }

    /// Bytes of a tile from the persisted cache, or fetched and persisted
    async fn load_bytes(&self, index: FullTileIndex, progress: FetchProgress) -> Result<Vec<u8>> {
        let Some(cache) = &self.disk_cache else {
            return self.fetcher.fetch(index, progress).await;
        };

        let key = self.fetcher.tile_key(index);
        if let Some(bytes) = cache.read(&key).await {
            tracing::trace!("Tile {} served from disk", index);
            progress.report(1.0);
            return Ok(bytes);
        }

        let bytes = self.fetcher.fetch(index, progress).await?;
        if let Err(e) = cache.write(&key, &bytes).await {
            tracing::warn!("Failed to persist tile {}: {}", index, e);
        }
        Ok(bytes)
    }

    async fn load_uncoalesced(&self, index: FullTileIndex) -> Result<F::Bitmap> {
        let cached = lock(&self.memory_cache).get(&index).cloned();
        if let Some(bitmap) = cached {
            return Ok(bitmap);
        }
        let bitmap = self.load(index, FetchProgress::ignore()).await?;
        lock(&self.memory_cache).put(index, bitmap.clone());
        Ok(bitmap)
    }
}
