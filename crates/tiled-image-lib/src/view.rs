//! The view: ties an image source, its transform state, the tile loads and the overlays
//! together

use crate::{
    ImageSource, ImageViewState, Overlay, RenderSink, Result, TileContent, TileLoadManager,
    TiledImageError, ViewConfig,
};
use geo::Coord;
use std::sync::Arc;
use tokio::sync::Notify;

struct Attached<S: ImageSource> {
    state: ImageViewState,
    tiles: TileLoadManager<S>,
}

/// A viewport onto a tiled image.
///
/// Every view change re-culls the tiles, updates the load tasks and notifies the overlays.
/// Tile events are applied on [`TiledImageView::process_tile_events`], on the owning thread.
pub struct TiledImageView<S: ImageSource> {
    config: ViewConfig,
    viewport_size: Coord<f64>,
    /// Last known pointer position (view space); tiles close to it load first
    focal_point: Coord<f64>,
    attached: Option<Attached<S>>,
    overlays: Vec<Box<dyn Overlay<S::Bitmap>>>,
    content_changed: Arc<Notify>,
}

#[cfg_attr(feature = "profiling", profiling::all_functions)]
impl<S: ImageSource> TiledImageView<S> {
    pub fn new(config: ViewConfig, viewport_size: Coord<f64>) -> Self {
        Self {
            config,
            viewport_size,
            focal_point: viewport_size / 2.0,
            attached: None,
            overlays: Vec::new(),
            content_changed: Arc::new(Notify::new()),
        }
    }

    pub fn config(&self) -> &ViewConfig {
        &self.config
    }

    pub fn set_config(&mut self, config: ViewConfig) {
        self.config = config;
        self.content_changed.notify_one();
    }

    /// Raised whenever a new frame should be rendered
    pub fn content_changed(&self) -> Arc<Notify> {
        self.content_changed.clone()
    }

    pub fn is_attached(&self) -> bool {
        self.attached.is_some()
    }

    pub fn source(&self) -> Option<&Arc<S>> {
        self.attached.as_ref().map(|a| a.tiles.source())
    }

    pub fn state(&self) -> Option<&ImageViewState> {
        self.attached.as_ref().map(|a| &a.state)
    }

    pub fn tiles(&self) -> Option<&TileLoadManager<S>> {
        self.attached.as_ref().map(|a| &a.tiles)
    }

    pub fn focal_point(&self) -> Coord<f64> {
        self.focal_point
    }

    /// Show `source`, replacing the current one, at its initial zoom and centered
    pub fn attach(&mut self, source: Arc<S>) -> Result<()> {
        self.detach();

        let mut state =
            ImageViewState::new(source.dimensions(), source.lod_info(), self.viewport_size)?;
        let center = self.viewport_size / 2.0;
        state.zoom_about(state.lod_info().initial_zoom(), center);
        state.centralize();

        let mut tiles = TileLoadManager::new(source, self.content_changed.clone());
        tiles.update_tiles(&state, self.focal_point);
        tracing::debug!(
            width = state.dimensions().width(),
            height = state.dimensions().height(),
            lod = state.lod_level(),
            "Attached image source"
        );

        for overlay in &mut self.overlays {
            overlay.on_layer_changed(state.layer());
            overlay.on_view_state_changed(&state);
        }
        self.attached = Some(Attached { state, tiles });
        Ok(())
    }

    /// Stop showing the current source, canceling its loads
    pub fn detach(&mut self) -> Option<Arc<S>> {
        let mut attached = self.attached.take()?;
        attached.tiles.clear();
        tracing::debug!("Detached image source");
        Some(attached.tiles.source().clone())
    }

    pub fn set_viewport_size(&mut self, size: Coord<f64>) -> Result<()> {
        if let Some(attached) = self.attached.as_mut() {
            attached.state.set_viewport_size(size)?;
        }
        self.viewport_size = size;
        if self.attached.is_some() {
            self.view_changed();
        }
        Ok(())
    }

    /// Record the pointer position used to prioritize tile loads
    pub fn set_focal_point(&mut self, focal_point: Coord<f64>) {
        self.focal_point = focal_point;
    }

    pub fn zoom_about(&mut self, zoom: f64, focal_point: Coord<f64>) -> Result<()> {
        self.focal_point = focal_point;
        self.state_mut()?.zoom_about(zoom, focal_point);
        self.view_changed();
        Ok(())
    }

    pub fn rotate_about(&mut self, degrees: f64, focal_point: Coord<f64>) -> Result<()> {
        self.focal_point = focal_point;
        self.state_mut()?.rotate_about(degrees, focal_point);
        self.view_changed();
        Ok(())
    }

    pub fn pan_by(&mut self, delta: Coord<f64>) -> Result<()> {
        self.state_mut()?.pan_by(delta);
        self.view_changed();
        Ok(())
    }

    pub fn set_offset(&mut self, offset: Coord<f64>) -> Result<()> {
        self.state_mut()?.set_offset(offset);
        self.view_changed();
        Ok(())
    }

    pub fn centralize(&mut self) -> Result<()> {
        self.state_mut()?.centralize();
        self.view_changed();
        Ok(())
    }

    /// Switch to another layer, reloading every visible tile. Selecting the current layer
    /// keeps the running loads.
    pub fn set_layer(&mut self, layer: u32) -> Result<()> {
        let attached = self.attached.as_mut().ok_or(TiledImageError::NoSource)?;
        let previous = attached.state.layer();
        attached.state.set_layer(layer);
        let layer = attached.state.layer();
        if layer == previous {
            return Ok(());
        }
        attached.tiles.update_layer(layer);
        for overlay in &mut self.overlays {
            overlay.on_layer_changed(layer);
        }
        Ok(())
    }

    /// Add an overlay drawn above the tiles, in insertion order
    pub fn add_overlay(&mut self, mut overlay: Box<dyn Overlay<S::Bitmap>>) {
        if let Some(attached) = &self.attached {
            overlay.on_layer_changed(attached.state.layer());
            overlay.on_view_state_changed(&attached.state);
        }
        self.overlays.push(overlay);
        self.content_changed.notify_one();
    }

    pub fn overlays(&self) -> &[Box<dyn Overlay<S::Bitmap>>] {
        &self.overlays
    }

    /// Apply pending tile load events, returning how many changed a tile
    pub fn process_tile_events(&mut self) -> usize {
        self.attached
            .as_mut()
            .map(|attached| attached.tiles.process_events())
            .unwrap_or(0)
    }

    /// Wait until a tile load reports, then apply every pending event
    pub async fn wait_for_tile_events(&mut self) -> Result<usize> {
        let attached = self.attached.as_mut().ok_or(TiledImageError::NoSource)?;
        Ok(attached.tiles.wait_for_events().await)
    }

    /// Thumbnail of the attached image
    pub async fn create_thumbnail(&self, width: u32, height: u32) -> Result<S::Bitmap> {
        let source = self.source().ok_or(TiledImageError::NoSource)?;
        source.create_thumbnail(width, height).await
    }

    /// Draw the tiles then the overlays into `sink`
    pub fn render(&self, sink: &mut dyn RenderSink<S::Bitmap>) {
        let Some(attached) = &self.attached else {
            return;
        };
        let state = &attached.state;
        sink.push_transform(state.world_to_view());
        for item in attached
            .tiles
            .render_items(&self.config, state.view_to_world_scale())
        {
            match item.content {
                TileContent::Bitmap(bitmap) => sink.draw_bitmap(bitmap, item.rect),
                TileContent::Placeholder(placeholder) => {
                    sink.draw_placeholder(&placeholder, item.rect)
                }
            }
        }
        for overlay in &self.overlays {
            overlay.render(state, sink);
        }
        sink.pop_transform();
    }

    fn state_mut(&mut self) -> Result<&mut ImageViewState> {
        self.attached
            .as_mut()
            .map(|attached| &mut attached.state)
            .ok_or(TiledImageError::NoSource)
    }

    fn view_changed(&mut self) {
        let Some(attached) = self.attached.as_mut() else {
            return;
        };
        attached.tiles.update_tiles(&attached.state, self.focal_point);
        for overlay in &mut self.overlays {
            overlay.on_view_state_changed(&attached.state);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tiles_manager::tests::RecordingSource;
    use crate::{
        Dimensions, FullTileIndex, LoadTileStatus, OverlayCuller, TilePlaceholder, utils,
    };
    use geo::{AffineTransform, Rect};
    use std::cell::RefCell;
    use std::rc::Rc;

    #[derive(Debug, PartialEq)]
    enum Call {
        Push,
        Bitmap(u32),
        Placeholder(FullTileIndex, LoadTileStatus),
        Outline(String),
        Pop,
    }

    #[derive(Default)]
    struct RecordingSink {
        calls: Vec<Call>,
    }

    impl RenderSink<u32> for RecordingSink {
        fn push_transform(&mut self, _transform: &AffineTransform<f64>) {
            self.calls.push(Call::Push);
        }

        fn draw_bitmap(&mut self, bitmap: &u32, _rect: Rect<f64>) {
            self.calls.push(Call::Bitmap(*bitmap));
        }

        fn draw_placeholder(&mut self, placeholder: &TilePlaceholder<'_>, _rect: Rect<f64>) {
            self.calls
                .push(Call::Placeholder(placeholder.index, placeholder.status));
        }

        fn draw_outline(&mut self, _rect: Rect<f64>, label: Option<&str>) {
            self.calls
                .push(Call::Outline(label.unwrap_or_default().to_string()));
        }

        fn pop_transform(&mut self) {
            self.calls.push(Call::Pop);
        }
    }

    /// Overlay outlining the visible markers of an [`OverlayCuller`]
    struct Markers {
        culler: OverlayCuller<&'static str>,
        visible: Vec<&'static str>,
        layers: Rc<RefCell<Vec<u32>>>,
    }

    impl Overlay<u32> for Markers {
        fn on_layer_changed(&mut self, layer: u32) {
            self.layers.borrow_mut().push(layer);
        }

        fn on_view_state_changed(&mut self, state: &ImageViewState) {
            self.visible = self.culler.cull(state);
        }

        fn render(&self, _state: &ImageViewState, sink: &mut dyn RenderSink<u32>) {
            for marker in &self.visible {
                if let Some(bounds) = self.culler.bounds_of(marker) {
                    sink.draw_outline(bounds, Some(*marker));
                }
            }
        }
    }

    fn source() -> Arc<RecordingSource> {
        Arc::new(RecordingSource::new(
            Dimensions::simple(4, 4, 256).unwrap(),
        ))
    }

    fn view() -> TiledImageView<RecordingSource> {
        TiledImageView::new(ViewConfig::default(), Coord { x: 512.0, y: 512.0 })
    }

    #[test]
    fn test_requires_source() {
        let mut view = view();
        assert!(matches!(
            view.zoom_about(1.0, Coord::zero()),
            Err(TiledImageError::NoSource)
        ));
        assert!(view.set_layer(1).is_err());
        assert!(view.detach().is_none());
        view.render(&mut RecordingSink::default());
    }

    #[test]
    fn test_attach_centralizes_and_loads() {
        let source = source();
        let mut view = view();
        view.attach(source.clone()).unwrap();

        let state = view.state().unwrap();
        // 1024x1024 image at zoom 1 centered in a 512x512 viewport
        assert_eq!(state.offset(), Coord { x: 256.0, y: 256.0 });
        let center = state.world_point_to_view(Coord { x: 512.0, y: 512.0 });
        assert!((center.x - 256.0).abs() < 1e-9 && (center.y - 256.0).abs() < 1e-9);
        assert_eq!(view.tiles().unwrap().len(), 4);
        assert_eq!(source.log().len(), 4);
        // focal point defaults to the viewport center: the four central tiles are equidistant
        assert!(
            source
                .log()
                .iter()
                .all(|i| (1..=2).contains(&i.column) && (1..=2).contains(&i.row))
        );
    }

    #[test]
    fn test_detach_cancels_loads() {
        let source = source();
        let mut view = view();
        view.attach(source.clone()).unwrap();
        let detached = view.detach().unwrap();
        assert!(Arc::ptr_eq(&detached, &source));
        assert!(!view.is_attached());
        assert!(source.take_requests().iter().all(|r| r.is_cancelled()));
    }

    #[test]
    fn test_render_frame() {
        let source = source();
        let mut view = view();
        let layers = Rc::new(RefCell::new(Vec::new()));
        let mut culler = OverlayCuller::new();
        culler
            .register_item("inside", utils::rect_from_origin_size(500.0, 500.0, 10.0, 10.0))
            .unwrap();
        culler
            .register_item("outside", utils::rect_from_origin_size(0.0, 0.0, 10.0, 10.0))
            .unwrap();
        view.add_overlay(Box::new(Markers {
            culler,
            visible: Vec::new(),
            layers: layers.clone(),
        }));
        view.attach(source.clone()).unwrap();

        let mut requests = source.take_requests();
        requests.pop().unwrap().complete(9);
        assert_eq!(view.process_tile_events(), 1);

        let mut sink = RecordingSink::default();
        view.render(&mut sink);
        assert_eq!(sink.calls.first(), Some(&Call::Push));
        assert_eq!(sink.calls.last(), Some(&Call::Pop));
        assert_eq!(
            sink.calls
                .iter()
                .filter(|c| matches!(c, Call::Placeholder(_, LoadTileStatus::Loading)))
                .count(),
            3
        );
        assert!(sink.calls.contains(&Call::Bitmap(9)));
        // overlays draw after the tiles
        assert_eq!(sink.calls[sink.calls.len() - 2], Call::Outline("inside".to_string()));
        assert!(!sink.calls.contains(&Call::Outline("outside".to_string())));

        view.set_layer(1).unwrap();
        assert_eq!(*layers.borrow(), vec![0, 1]);
        assert!(view.tiles().unwrap().tiles().all(|(i, _)| i.layer == 1));
    }

    #[test]
    fn test_same_layer_keeps_loads() {
        let source = source();
        let mut view = view();
        view.attach(source.clone()).unwrap();
        let requests = source.take_requests();
        let ids: Vec<_> = view
            .tiles()
            .unwrap()
            .tiles()
            .map(|(_, info)| info.task().id())
            .collect();

        view.set_layer(0).unwrap();
        assert!(requests.iter().all(|r| !r.is_cancelled()));
        assert!(source.take_requests().is_empty());
        let after: Vec<_> = view
            .tiles()
            .unwrap()
            .tiles()
            .map(|(_, info)| info.task().id())
            .collect();
        assert_eq!(after, ids);

        // layer 1 is the stacked layer, anything above clamps to it
        view.set_layer(1).unwrap();
        assert_eq!(source.take_requests().len(), 4);
        view.set_layer(7).unwrap();
        assert!(source.take_requests().is_empty());
        assert_eq!(view.state().unwrap().layer(), 1);
    }

    #[test]
    fn test_view_changes_update_tiles() {
        let source = source();
        let mut view = view();
        view.attach(source.clone()).unwrap();
        view.zoom_about(0.5, Coord { x: 256.0, y: 256.0 }).unwrap();
        let state = view.state().unwrap();
        assert_eq!(state.lod_level(), 1);
        // the whole image fits: 2x2 tiles at LOD 1
        let tiles = view.tiles().unwrap();
        assert_eq!(tiles.len(), 4);
        assert!(tiles.tiles().all(|(i, _)| i.lod == 1));

        view.pan_by(Coord { x: 5000.0, y: 0.0 }).unwrap();
        assert!(view.tiles().unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_thumbnail_unsupported_by_default() {
        let mut view = view();
        assert!(matches!(
            view.create_thumbnail(64, 64).await,
            Err(TiledImageError::NoSource)
        ));
        view.attach(source()).unwrap();
        assert!(matches!(
            view.create_thumbnail(64, 64).await,
            Err(TiledImageError::ThumbnailUnsupported)
        ));
    }
}
