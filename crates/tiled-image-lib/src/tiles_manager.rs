//! Tile load management
//!
//! The manager turns the visible tile set of a view into load tasks. Tasks survive view
//! updates while their tile stays visible, failed or canceled ones are restarted when
//! their tile is requested again, and tasks of tiles that left the view are canceled.

use crate::{
    FullTileIndex, ImageSource, ImageViewState, LoadTileStatus, LoadTileTask, RenderItem, TaskId,
    TileCuller, TileContent, TileEvent, TilePlaceholder, ViewConfig, utils,
};
use geo::{Coord, Rect};
use smallvec::{SmallVec, smallvec};
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::{Notify, mpsc};

/// A visible tile and where it goes in world space
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct UpdateTileRequest {
    pub index: FullTileIndex,
    pub world_rect: Rect<f64>,
}

/// A load task together with the world rectangles it is drawn into
#[derive(Debug)]
pub struct TileRenderInfo<B> {
    task: LoadTileTask<B>,
    regions: SmallVec<[Rect<f64>; 1]>,
}

impl<B> TileRenderInfo<B> {
    pub fn task(&self) -> &LoadTileTask<B> {
        &self.task
    }

    pub fn regions(&self) -> &[Rect<f64>] {
        &self.regions
    }
}

/// Owns the load tasks of the visible tiles of one view
pub struct TileLoadManager<S: ImageSource> {
    source: Arc<S>,
    tiles: HashMap<FullTileIndex, TileRenderInfo<S::Bitmap>>,
    /// Keys of `tiles` in load order
    order: Vec<FullTileIndex>,
    next_task_id: u64,
    events_tx: mpsc::UnboundedSender<TileEvent<S::Bitmap>>,
    events_rx: mpsc::UnboundedReceiver<TileEvent<S::Bitmap>>,
    content_changed: Arc<Notify>,
}

#[cfg_attr(feature = "profiling", profiling::all_functions)]
impl<S: ImageSource> TileLoadManager<S> {
    pub fn new(source: Arc<S>, content_changed: Arc<Notify>) -> Self {
        let (events_tx, events_rx) = mpsc::unbounded_channel();
        Self {
            source,
            tiles: HashMap::new(),
            order: Vec::new(),
            next_task_id: 0,
            events_tx,
            events_rx,
            content_changed,
        }
    }

    pub fn source(&self) -> &Arc<S> {
        &self.source
    }

    /// Signal raised whenever the rendered content may have changed
    pub fn content_changed(&self) -> &Arc<Notify> {
        &self.content_changed
    }

    pub fn len(&self) -> usize {
        self.tiles.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tiles.is_empty()
    }

    pub fn tile(&self, index: &FullTileIndex) -> Option<&TileRenderInfo<S::Bitmap>> {
        self.tiles.get(index)
    }

    /// Current tiles in load order
    pub fn tiles(&self) -> impl Iterator<Item = (&FullTileIndex, &TileRenderInfo<S::Bitmap>)> {
        self.order
            .iter()
            .filter_map(|index| self.tiles.get_key_value(index))
    }

    /// Whether no task is still loading
    pub fn is_settled(&self) -> bool {
        self.tiles
            .values()
            .all(|info| info.task.status().is_terminal())
    }

    /// Visible tiles of `state`, nearest to the focal point (view space) first
    pub fn build_requests(
        state: &ImageViewState,
        focal_point: Coord<f64>,
    ) -> Vec<UpdateTileRequest> {
        let culler = TileCuller::new(state);
        let (lod, layer) = (state.lod_level(), state.layer());
        let mut requests: Vec<UpdateTileRequest> = culler
            .visible_regions()
            .iter()
            .flat_map(|region| region.tiles())
            .map(|tile| UpdateTileRequest {
                index: tile.with_lod_and_layer(lod, layer),
                world_rect: state.tile_world_rect(tile.column, tile.row),
            })
            .collect();

        let focal_world = state.view_point_to_world(focal_point);
        // stable: equally distant tiles keep their culling order
        requests.sort_by(|a, b| {
            let a = utils::distance_squared(focal_world, a.world_rect.center());
            let b = utils::distance_squared(focal_world, b.world_rect.center());
            a.total_cmp(&b)
        });
        requests
    }

    /// Reconcile the load tasks with the tiles visible in `state`
    pub fn update_tiles(&mut self, state: &ImageViewState, focal_point: Coord<f64>) {
        profiling::scope!("TileLoadManager::update_tiles");
        let requests = Self::build_requests(state, focal_point);
        self.apply_requests(requests);
    }

    /// Reconcile the load tasks with an explicit, already sorted request list
    pub fn apply_requests(&mut self, requests: Vec<UpdateTileRequest>) {
        let mut previous = std::mem::take(&mut self.tiles);
        let mut order = Vec::with_capacity(requests.len());
        let (mut reused, mut restarted, mut created) = (0usize, 0usize, 0usize);

        for request in requests {
            if let Some(info) = self.tiles.get_mut(&request.index) {
                info.regions.push(request.world_rect);
                continue;
            }
            let task = match previous.remove(&request.index) {
                Some(info) if info.task.is_alive() => {
                    reused += 1;
                    info.task
                }
                Some(mut info) => {
                    restarted += 1;
                    info.task.reset();
                    self.begin_load(&info.task);
                    info.task
                }
                None => {
                    created += 1;
                    let task = self.create_task(request.index);
                    self.begin_load(&task);
                    task
                }
            };
            order.push(request.index);
            self.tiles.insert(
                request.index,
                TileRenderInfo {
                    task,
                    regions: smallvec![request.world_rect],
                },
            );
        }

        let canceled = previous.len();
        for (_, mut info) in previous {
            info.task.cancel();
        }
        self.order = order;

        tracing::debug!(
            tiles = self.tiles.len(),
            reused,
            restarted,
            created,
            canceled,
            "Updated tiles"
        );
        self.content_changed.notify_one();
    }

    /// Replace every task with a fresh one for the same tile in `layer`
    pub fn update_layer(&mut self, layer: u32) {
        let previous = std::mem::take(&mut self.tiles);
        let previous_order = std::mem::take(&mut self.order);

        for index in previous_order {
            let Some(info) = previous.get(&index) else {
                continue;
            };
            let index = index.in_layer(layer);
            if self.tiles.contains_key(&index) {
                continue;
            }
            let task = self.create_task(index);
            self.begin_load(&task);
            self.order.push(index);
            self.tiles.insert(
                index,
                TileRenderInfo {
                    task,
                    regions: info.regions.clone(),
                },
            );
        }
        for (_, mut info) in previous {
            info.task.cancel();
        }

        tracing::debug!(layer, tiles = self.tiles.len(), "Switched tile layer");
        self.content_changed.notify_one();
    }

    /// Cancel and drop every task
    pub fn clear(&mut self) {
        for info in self.tiles.values_mut() {
            info.task.cancel();
        }
        self.tiles.clear();
        self.order.clear();
        self.content_changed.notify_one();
    }

    /// Apply every pending load event, returning how many were accepted
    pub fn process_events(&mut self) -> usize {
        let mut applied = 0;
        while let Ok(event) = self.events_rx.try_recv() {
            if self.apply_event(event) {
                applied += 1;
            }
        }
        if applied > 0 {
            self.content_changed.notify_one();
        }
        applied
    }

    /// Wait for at least one load event, then apply every pending one
    pub async fn wait_for_events(&mut self) -> usize {
        let Some(event) = self.events_rx.recv().await else {
            return 0;
        };
        let first = usize::from(self.apply_event(event));
        let applied = first + self.process_events();
        if first > 0 {
            self.content_changed.notify_one();
        }
        applied
    }

    fn apply_event(&mut self, event: TileEvent<S::Bitmap>) -> bool {
        let Some(info) = self.tiles.get_mut(&event.index) else {
            tracing::trace!(index = %event.index, "Dropping event of a tile no longer shown");
            return false;
        };
        let task = &mut info.task;
        let (index, generation) = (event.index, event.generation);
        if !task.apply(event) {
            tracing::trace!(
                index = %index,
                generation,
                current = task.generation(),
                "Dropping stale tile event"
            );
            return false;
        }
        match task.status() {
            LoadTileStatus::Failed => tracing::warn!(
                index = %index,
                error = task.error().unwrap_or_default(),
                "Tile failed to load"
            ),
            LoadTileStatus::Succeed => tracing::trace!(index = %index, "Tile loaded"),
            _ => {}
        }
        true
    }

    /// Drawing commands of the current tiles, in load order
    pub fn render_items(
        &self,
        config: &ViewConfig,
        view_to_world_scale: f64,
    ) -> Vec<RenderItem<'_, S::Bitmap>> {
        let inflation = if config.compensate_tile_gaps {
            0.5 * view_to_world_scale
        } else {
            0.0
        };
        let mut items = Vec::with_capacity(self.order.len());
        for (index, info) in self.tiles() {
            let task = &info.task;
            let content = match (task.status(), task.bitmap()) {
                (LoadTileStatus::Succeed, Some(bitmap)) => TileContent::Bitmap(bitmap),
                (LoadTileStatus::Loading, _) if !config.darken_loading_tiles => continue,
                (LoadTileStatus::Canceled, _) => continue,
                (status, _) => TileContent::Placeholder(TilePlaceholder {
                    index: *index,
                    status,
                    progress: task.progress(),
                    error: task.error(),
                }),
            };
            for region in &info.regions {
                items.push(RenderItem {
                    content,
                    rect: utils::inflate(region, inflation, inflation),
                });
            }
        }
        items
    }

    fn create_task(&mut self, index: FullTileIndex) -> LoadTileTask<S::Bitmap> {
        let id = TaskId(self.next_task_id);
        self.next_task_id += 1;
        LoadTileTask::new(id, index)
    }

    fn begin_load(&self, task: &LoadTileTask<S::Bitmap>) {
        self.source
            .begin_load_tile(task.request(self.events_tx.clone()));
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use crate::{Dimensions, LoadTileRequest, LodInfo, TileIndex};
    use std::sync::Mutex;

    /// Source that records requests and lets the test resolve them
    #[derive(Default)]
    pub(crate) struct RecordingSource {
        pub(crate) dimensions: Option<Dimensions>,
        pub(crate) requests: Mutex<Vec<LoadTileRequest<u32>>>,
        pub(crate) log: Mutex<Vec<FullTileIndex>>,
    }

    impl RecordingSource {
        pub(crate) fn new(dimensions: Dimensions) -> Self {
            Self {
                dimensions: Some(dimensions),
                ..Default::default()
            }
        }

        pub(crate) fn take_requests(&self) -> Vec<LoadTileRequest<u32>> {
            std::mem::take(&mut *self.requests.lock().unwrap())
        }

        pub(crate) fn log(&self) -> Vec<FullTileIndex> {
            self.log.lock().unwrap().clone()
        }
    }

    impl ImageSource for RecordingSource {
        type Bitmap = u32;

        fn dimensions(&self) -> Dimensions {
            self.dimensions
                .unwrap_or_else(|| Dimensions::simple(4, 4, 256).unwrap())
        }

        fn lod_info(&self) -> LodInfo {
            LodInfo::uniform(0, 1, 1.0, 0.5, 1.0, 2.0).unwrap()
        }

        fn begin_load_tile(&self, request: LoadTileRequest<u32>) {
            self.log.lock().unwrap().push(request.index());
            self.requests.lock().unwrap().push(request);
        }
    }

    fn state(viewport: f64) -> ImageViewState {
        let source = RecordingSource::default();
        ImageViewState::new(
            source.dimensions(),
            source.lod_info(),
            Coord {
                x: viewport,
                y: viewport,
            },
        )
        .unwrap()
    }

    fn manager() -> (Arc<RecordingSource>, TileLoadManager<RecordingSource>) {
        let source = Arc::new(RecordingSource::default());
        let manager = TileLoadManager::new(source.clone(), Arc::new(Notify::new()));
        (source, manager)
    }

    fn task_ids(manager: &TileLoadManager<RecordingSource>) -> Vec<(FullTileIndex, TaskId)> {
        let mut ids: Vec<_> = manager
            .tiles()
            .map(|(index, info)| (*index, info.task().id()))
            .collect();
        ids.sort_by_key(|(_, id)| *id);
        ids
    }

    #[test]
    fn test_loads_visible_tiles() {
        let (source, mut manager) = manager();
        manager.update_tiles(&state(512.0), Coord::zero());
        assert_eq!(manager.len(), 4);
        assert_eq!(source.log().len(), 4);
        assert!(
            manager
                .tiles()
                .all(|(_, info)| info.task().status() == LoadTileStatus::Loading)
        );
    }

    #[test]
    fn test_unchanged_view_reuses_tasks() {
        let (source, mut manager) = manager();
        let state = state(512.0);
        manager.update_tiles(&state, Coord::zero());
        let before = task_ids(&manager);

        manager.update_tiles(&state, Coord { x: 300.0, y: 300.0 });
        assert_eq!(task_ids(&manager), before);
        assert_eq!(source.log().len(), 4, "no new loads");
        for request in source.take_requests() {
            assert!(!request.is_cancelled());
        }
    }

    #[test]
    fn test_focal_ordering() {
        let (source, mut manager) = manager();
        // a single row of three tiles
        let state = ImageViewState::new(
            source.dimensions(),
            source.lod_info(),
            Coord { x: 768.0, y: 256.0 },
        )
        .unwrap();
        // squared distances from the right edge: col 2 -> 128², col 1 -> 384², col 0 -> 640²
        manager.update_tiles(&state, Coord { x: 768.0, y: 128.0 });

        let columns: Vec<u32> = source.log().iter().map(|i| i.column).collect();
        assert_eq!(columns, vec![2, 1, 0]);
        assert!(source.log().iter().all(|i| i.row == 0));
    }

    #[test]
    fn test_build_requests_sorted_by_focal_distance() {
        let state = state(1024.0);
        let focal = Coord { x: 900.0, y: 900.0 };
        let requests = TileLoadManager::<RecordingSource>::build_requests(&state, focal);
        assert_eq!(requests.len(), 16);
        assert_eq!(requests[0].index.tile(), TileIndex::new(3, 3));
        assert_eq!(requests[15].index.tile(), TileIndex::new(0, 0));
        for pair in requests.windows(2) {
            let a = utils::distance_squared(focal, pair[0].world_rect.center());
            let b = utils::distance_squared(focal, pair[1].world_rect.center());
            assert!(a <= b);
        }
    }

    #[test]
    fn test_hidden_tiles_are_canceled_and_failed_restarted() {
        let (source, mut manager) = manager();
        let mut state = state(512.0);
        manager.update_tiles(&state, Coord::zero());
        let mut requests = source.take_requests();
        let failed_index = FullTileIndex::new(0, 0, 0, 0);
        let position = requests
            .iter()
            .position(|r| r.index() == failed_index)
            .unwrap();
        requests.remove(position).fail("404");
        manager.process_events();
        assert_eq!(
            manager.tile(&failed_index).unwrap().task().status(),
            LoadTileStatus::Failed
        );

        // scroll one tile right: column 0 leaves the view, column 2 enters
        state.pan_by(Coord { x: 256.0, y: 0.0 });
        manager.update_tiles(&state, Coord::zero());
        assert!(manager.tile(&failed_index).is_none());
        let canceled: Vec<_> = requests
            .iter()
            .filter(|r| r.is_cancelled())
            .map(|r| r.index().column)
            .collect();
        assert_eq!(canceled, vec![0]);

        // scroll back: the failed tile is requested again
        state.pan_by(Coord { x: -256.0, y: 0.0 });
        manager.update_tiles(&state, Coord::zero());
        let info = manager.tile(&failed_index).unwrap();
        assert_eq!(info.task().status(), LoadTileStatus::Loading);
        assert_eq!(info.task().generation(), 0, "removed tiles come back as new tasks");
    }

    #[test]
    fn test_failed_task_restarts_when_still_visible() {
        let (source, mut manager) = manager();
        let state = state(256.0);
        manager.update_tiles(&state, Coord::zero());
        let index = FullTileIndex::new(0, 0, 0, 0);
        let id = manager.tile(&index).unwrap().task().id();
        source.take_requests().pop().unwrap().fail("timeout");
        manager.process_events();

        manager.update_tiles(&state, Coord::zero());
        let task = manager.tile(&index).unwrap().task();
        assert_eq!(task.id(), id);
        assert_eq!(task.generation(), 1);
        assert_eq!(task.status(), LoadTileStatus::Loading);
        assert_eq!(source.log().len(), 2);
    }

    #[test]
    fn test_late_events_are_ignored() {
        let (source, mut manager) = manager();
        let mut state = state(256.0);
        manager.update_tiles(&state, Coord::zero());
        let request = source.take_requests().pop().unwrap();

        state.pan_by(Coord { x: 2000.0, y: 0.0 });
        manager.update_tiles(&state, Coord::zero());
        assert!(manager.is_empty());
        assert!(request.is_cancelled());
        request.complete(7);
        assert_eq!(manager.process_events(), 0);
    }

    #[test]
    fn test_update_layer_creates_fresh_tasks() {
        let (source, mut manager) = manager();
        manager.update_tiles(&state(512.0), Coord::zero());
        let old_requests = source.take_requests();
        assert!(old_requests.iter().all(|r| !r.is_cancelled()));

        manager.update_layer(1);
        assert_eq!(manager.len(), 4);
        assert!(manager.tiles().all(|(index, _)| index.layer == 1));
        assert!(old_requests.iter().all(|r| r.is_cancelled()));
        assert_eq!(source.take_requests().len(), 4);
    }

    #[test]
    fn test_render_items() {
        let (source, mut manager) = manager();
        manager.update_tiles(&state(512.0), Coord::zero());
        let mut requests = source.take_requests();
        let done = requests.pop().unwrap();
        let done_index = done.index();
        done.complete(42);
        let failed = requests.pop().unwrap();
        failed.fail("bad tile");
        assert_eq!(manager.process_events(), 2);

        let config = ViewConfig {
            compensate_tile_gaps: false,
            darken_loading_tiles: false,
        };
        let items = manager.render_items(&config, 1.0);
        assert_eq!(items.len(), 2);
        assert!(items.iter().any(|item| item.content == TileContent::Bitmap(&42)));
        assert!(items.iter().any(|item| matches!(
            item.content,
            TileContent::Placeholder(TilePlaceholder {
                status: LoadTileStatus::Failed,
                error: Some("bad tile"),
                ..
            })
        )));

        let config = ViewConfig::default();
        let items = manager.render_items(&config, 2.0);
        assert_eq!(items.len(), 4);
        let bitmap = items
            .iter()
            .find(|item| item.content == TileContent::Bitmap(&42))
            .unwrap();
        let expected = utils::inflate(
            &utils::rect_from_origin_size(
                f64::from(done_index.column) * 256.0,
                f64::from(done_index.row) * 256.0,
                256.0,
                256.0,
            ),
            1.0,
            1.0,
        );
        assert_eq!(bitmap.rect, expected);
    }

    #[tokio::test]
    async fn test_wait_for_events_from_another_task() {
        let (source, mut manager) = manager();
        manager.update_tiles(&state(256.0), Coord::zero());
        let request = source.take_requests().pop().unwrap();
        tokio::spawn(async move {
            request.report_progress(0.5);
            request.complete(1);
        });
        let mut applied = 0;
        while !manager.is_settled() {
            applied += manager.wait_for_events().await;
        }
        assert_eq!(applied, 2);
        let (_, info) = manager.tiles().next().unwrap();
        assert_eq!(info.task().bitmap(), Some(&1));
    }
}
