//! Rectangular markers drawn over the image

use geo::Rect;
use tiled_image_lib::{ImageViewState, Overlay, OverlayCuller, RenderSink, Result};

/// Numbered world rectangles, outlined when visible
pub struct MarkerOverlay {
    markers: Vec<Rect<f64>>,
    culler: OverlayCuller<usize>,
}

impl MarkerOverlay {
    pub fn new(markers: &[Rect<f64>]) -> Result<Self> {
        let mut culler = OverlayCuller::new();
        for (id, rect) in markers.iter().enumerate() {
            culler.register_item(id, *rect)?;
        }
        culler.subscribe(|event| tracing::debug!(?event, "Marker visibility changed"));
        Ok(Self {
            markers: markers.to_vec(),
            culler,
        })
    }

    pub fn label(id: usize) -> String {
        format!("M{}", id + 1)
    }

    /// Re-cull against `state`
    pub fn update(&mut self, state: &ImageViewState) {
        self.culler.cull(state);
    }

    /// Visible markers in registration order
    pub fn visible(&self) -> Vec<(usize, Rect<f64>)> {
        let mut visible: Vec<_> = self
            .culler
            .visible_items()
            .map(|&id| (id, self.markers[id]))
            .collect();
        visible.sort_by_key(|(id, _)| *id);
        visible
    }
}

impl<B> Overlay<B> for MarkerOverlay {
    fn on_view_state_changed(&mut self, state: &ImageViewState) {
        self.update(state);
    }

    fn render(&self, _state: &ImageViewState, sink: &mut dyn RenderSink<B>) {
        for (id, rect) in self.visible() {
            sink.draw_outline(rect, Some(&Self::label(id)));
        }
    }
}
