//! Mutable transform state of one image view
//!
//! Three spaces are involved:
//!
//! - **World**: pixels of the finest LOD, covering the whole image including margins
//! - **Envelope**: world scaled to view pixels and rotated about the content center, then
//!   shifted so the bounding box of the rotated content starts at the origin
//! - **View**: envelope shifted by the scroll offset; `(0, 0)` is the viewport's top-left
//!
//! Every setter recomputes the derived matrices before returning.

use crate::{Dimensions, LodInfo, Result, TiledImageError, utils};
use geo::{AffineTransform, Coord, Rect};

/// Transform state of a view showing one image
#[derive(Debug, Clone)]
pub struct ImageViewState {
    dimensions: Dimensions,
    lod_info: LodInfo,
    viewport_size: Coord<f64>,
    zoom: f64,
    /// Degrees in `[0, 360)`
    rotation: f64,
    /// Scroll offset in envelope space
    offset: Coord<f64>,
    layer: u32,

    lod_level: u32,
    lod_dimensions: Dimensions,
    view_to_world_scale: f64,
    lod_to_world_scale: f64,
    envelope_size: Coord<f64>,
    world_to_envelope: AffineTransform<f64>,
    envelope_to_world: AffineTransform<f64>,
    world_to_view: AffineTransform<f64>,
    view_to_world: AffineTransform<f64>,
}

#[cfg_attr(feature = "profiling", profiling::all_functions)]
impl ImageViewState {
    /// Create the state for a freshly attached image, at its initial zoom without rotation
    pub fn new(dimensions: Dimensions, lod_info: LodInfo, viewport_size: Coord<f64>) -> Result<Self> {
        dimensions.validate()?;
        lod_info.validate()?;
        let viewport_size = sanitize_viewport(viewport_size)?;
        let zoom = lod_info.initial_zoom();
        let lod_level = lod_info.calculate_lod_level(zoom);
        let lod_dimensions = lod_info.lod_dimensions(&dimensions, lod_level);
        let mut state = Self {
            dimensions,
            lod_info,
            viewport_size,
            zoom,
            rotation: 0.0,
            offset: Coord::zero(),
            layer: 0,
            lod_level,
            lod_dimensions,
            view_to_world_scale: 1.0,
            lod_to_world_scale: 1.0,
            envelope_size: Coord::zero(),
            world_to_envelope: AffineTransform::identity(),
            envelope_to_world: AffineTransform::identity(),
            world_to_view: AffineTransform::identity(),
            view_to_world: AffineTransform::identity(),
        };
        state.update_matrices();
        Ok(state)
    }

    pub fn dimensions(&self) -> &Dimensions {
        &self.dimensions
    }

    pub fn lod_info(&self) -> &LodInfo {
        &self.lod_info
    }

    pub fn zoom(&self) -> f64 {
        self.zoom
    }

    pub fn rotation(&self) -> f64 {
        self.rotation
    }

    pub fn offset(&self) -> Coord<f64> {
        self.offset
    }

    pub fn layer(&self) -> u32 {
        self.layer
    }

    pub fn lod_level(&self) -> u32 {
        self.lod_level
    }

    /// Tile grid at the current LOD level
    pub fn lod_dimensions(&self) -> &Dimensions {
        &self.lod_dimensions
    }

    pub fn viewport_size(&self) -> Coord<f64> {
        self.viewport_size
    }

    /// Viewport rectangle in view space
    pub fn viewport_rect(&self) -> Rect<f64> {
        utils::rect_from_origin_size(0.0, 0.0, self.viewport_size.x, self.viewport_size.y)
    }

    /// World pixels per view pixel
    pub fn view_to_world_scale(&self) -> f64 {
        self.view_to_world_scale
    }

    /// World pixels per pixel of the current LOD
    pub fn lod_to_world_scale(&self) -> f64 {
        self.lod_to_world_scale
    }

    /// LOD pixels per view pixel
    pub fn view_to_lod_scale(&self) -> f64 {
        self.view_to_world_scale / self.lod_to_world_scale
    }

    /// Size of the bounding box of the rotated content, i.e. the scrollable extent
    pub fn envelope_size(&self) -> Coord<f64> {
        self.envelope_size
    }

    /// Size of the unrotated content in view pixels
    pub fn content_size(&self) -> Coord<f64> {
        Coord {
            x: self.dimensions.content_width() as f64 / self.view_to_world_scale,
            y: self.dimensions.content_height() as f64 / self.view_to_world_scale,
        }
    }

    pub fn world_to_envelope(&self) -> &AffineTransform<f64> {
        &self.world_to_envelope
    }

    pub fn envelope_to_world(&self) -> &AffineTransform<f64> {
        &self.envelope_to_world
    }

    pub fn world_to_view(&self) -> &AffineTransform<f64> {
        &self.world_to_view
    }

    pub fn view_to_world(&self) -> &AffineTransform<f64> {
        &self.view_to_world
    }

    pub fn view_point_to_world(&self, point: Coord<f64>) -> Coord<f64> {
        self.view_to_world.apply(point)
    }

    pub fn world_point_to_view(&self, point: Coord<f64>) -> Coord<f64> {
        self.world_to_view.apply(point)
    }

    /// World rectangle covered by a `columns`×`rows` block of tiles at the current LOD.
    ///
    /// Edges of adjacent blocks coincide exactly.
    pub fn tile_block_world_rect(&self, column: u32, row: u32, columns: u32, rows: u32) -> Rect<f64> {
        let tile_width = f64::from(self.lod_dimensions.tile_width()) * self.lod_to_world_scale;
        let tile_height = f64::from(self.lod_dimensions.tile_height()) * self.lod_to_world_scale;
        Rect::new(
            Coord {
                x: f64::from(column) * tile_width,
                y: f64::from(row) * tile_height,
            },
            Coord {
                x: f64::from(column + columns) * tile_width,
                y: f64::from(row + rows) * tile_height,
            },
        )
    }

    pub fn tile_world_rect(&self, column: u32, row: u32) -> Rect<f64> {
        self.tile_block_world_rect(column, row, 1, 1)
    }

    /// Set the zoom level, keeping the viewport center fixed
    pub fn set_zoom(&mut self, zoom: f64) {
        let center = self.viewport_center();
        self.zoom_about(zoom, center);
    }

    /// Set the zoom level, keeping `focal_point` (view space) over the same world point
    pub fn zoom_about(&mut self, zoom: f64, focal_point: Coord<f64>) {
        let zoom = self.lod_info.clamp_zoom(zoom);
        let world_point = self.view_point_to_world(focal_point);
        self.zoom = zoom;
        self.lod_level = self.lod_info.calculate_lod_level(zoom);
        self.lod_dimensions = self.lod_info.lod_dimensions(&self.dimensions, self.lod_level);
        self.update_matrices();
        self.pin_world_point(world_point, focal_point);
    }

    pub fn set_rotation(&mut self, degrees: f64) {
        let center = self.viewport_center();
        self.rotate_about(degrees, center);
    }

    /// Set the rotation, keeping `focal_point` (view space) over the same world point
    pub fn rotate_about(&mut self, degrees: f64, focal_point: Coord<f64>) {
        if !degrees.is_finite() {
            return;
        }
        let world_point = self.view_point_to_world(focal_point);
        self.rotation = utils::normalize_degrees(degrees);
        self.update_matrices();
        self.pin_world_point(world_point, focal_point);
    }

    pub fn set_offset(&mut self, offset: Coord<f64>) {
        if !(offset.x.is_finite() && offset.y.is_finite()) {
            return;
        }
        self.offset = offset;
        self.update_matrices();
    }

    /// Scroll by `delta` view pixels
    pub fn pan_by(&mut self, delta: Coord<f64>) {
        self.set_offset(self.offset + delta);
    }

    /// Center the rotated content inside the viewport
    pub fn centralize(&mut self) {
        self.set_offset((self.envelope_size - self.viewport_size) / 2.0);
    }

    pub fn set_viewport_size(&mut self, size: Coord<f64>) -> Result<()> {
        self.viewport_size = sanitize_viewport(size)?;
        Ok(())
    }

    /// Select a layer. `layer_count` itself addresses the stacked layer.
    pub fn set_layer(&mut self, layer: u32) {
        self.layer = layer.min(self.dimensions.layer_count());
    }

    fn viewport_center(&self) -> Coord<f64> {
        self.viewport_size / 2.0
    }

    /// Choose the offset so that `world_point` is shown at `view_point`
    fn pin_world_point(&mut self, world_point: Coord<f64>, view_point: Coord<f64>) {
        let envelope_point = self.world_to_envelope.apply(world_point);
        self.set_offset(envelope_point - view_point);
    }

    fn update_matrices(&mut self) {
        self.view_to_world_scale = self.lod_info.max_zoom() / self.zoom;
        self.lod_to_world_scale = self.lod_info.lod_to_world_scale(self.lod_level);

        let scale = 1.0 / self.view_to_world_scale;
        let content_min = Coord {
            x: f64::from(self.dimensions.horizontal_margin()) * scale,
            y: f64::from(self.dimensions.vertical_margin()) * scale,
        };
        let content = utils::rect_from_origin_size(
            content_min.x,
            content_min.y,
            self.dimensions.content_width() as f64 * scale,
            self.dimensions.content_height() as f64 * scale,
        );
        let center = content.center();

        let rotation = utils::rotation_about(self.rotation, center);
        let rotated = utils::transform_vertices(&rotation, &content);
        let envelope = utils::bounding_rect(&rotated).unwrap_or(content);
        self.envelope_size = Coord {
            x: envelope.width(),
            y: envelope.height(),
        };

        let (sin, cos) = self.rotation.to_radians().sin_cos();
        let to_envelope = -envelope.min();
        let to_view = to_envelope - self.offset;
        self.world_to_envelope = similarity(scale, sin, cos, center, to_envelope);
        self.envelope_to_world = similarity_inverse(scale, sin, cos, center, to_envelope);
        self.world_to_view = similarity(scale, sin, cos, center, to_view);
        self.view_to_world = similarity_inverse(scale, sin, cos, center, to_view);
    }
}

fn sanitize_viewport(size: Coord<f64>) -> Result<Coord<f64>> {
    if size.x.is_finite() && size.y.is_finite() && size.x >= 0.0 && size.y >= 0.0 {
        Ok(size)
    } else {
        Err(TiledImageError::InvalidDimensions(format!(
            "viewport size must be finite and non-negative, got {}x{}",
            size.x, size.y
        )))
    }
}

/// `p -> R(scale * p - center) + center + translation`, `R` rotating by the given angle
fn similarity(
    scale: f64,
    sin: f64,
    cos: f64,
    center: Coord<f64>,
    translation: Coord<f64>,
) -> AffineTransform<f64> {
    AffineTransform::new(
        scale * cos,
        -scale * sin,
        center.x - cos * center.x + sin * center.y + translation.x,
        scale * sin,
        scale * cos,
        center.y - sin * center.x - cos * center.y + translation.y,
    )
}

/// Exact inverse of [`similarity`]
fn similarity_inverse(
    scale: f64,
    sin: f64,
    cos: f64,
    center: Coord<f64>,
    translation: Coord<f64>,
) -> AffineTransform<f64> {
    let shifted = translation + center;
    AffineTransform::new(
        cos / scale,
        sin / scale,
        (center.x - cos * shifted.x - sin * shifted.y) / scale,
        -sin / scale,
        cos / scale,
        (center.y + sin * shifted.x - cos * shifted.y) / scale,
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    fn assert_close(a: Coord<f64>, b: Coord<f64>) {
        assert!(
            (a.x - b.x).abs() < 1e-6 && (a.y - b.y).abs() < 1e-6,
            "{a:?} != {b:?}"
        );
    }

    fn state() -> ImageViewState {
        let dims = Dimensions::new(8, 4, 256, 256, 2, 0, 0).unwrap();
        let lod = LodInfo::uniform(0, 3, 0.5, 0.125, 1.0, 2.0).unwrap();
        ImageViewState::new(dims, lod, Coord { x: 800.0, y: 600.0 }).unwrap()
    }

    #[test]
    fn test_identity_at_max_zoom() {
        let mut state = state();
        state.zoom_about(1.0, Coord::zero());
        state.set_offset(Coord::zero());
        assert_eq!(state.lod_level(), 0);
        assert_eq!(state.view_to_world_scale(), 1.0);
        let p = Coord { x: 123.0, y: 456.0 };
        assert_close(state.world_point_to_view(p), p);
        assert_close(state.view_point_to_world(p), p);
        assert_close(state.envelope_size(), Coord { x: 2048.0, y: 1024.0 });
    }

    #[test]
    fn test_inverse_matrices() {
        let mut state = state();
        state.set_rotation(37.0);
        state.set_offset(Coord { x: -40.0, y: 75.5 });
        for p in [
            Coord { x: 0.0, y: 0.0 },
            Coord { x: 1000.0, y: 20.0 },
            Coord { x: -3.0, y: 999.0 },
        ] {
            let back = state.view_point_to_world(state.world_point_to_view(p));
            assert_close(back, p);
            let back = state
                .envelope_to_world()
                .apply(state.world_to_envelope().apply(p));
            assert_close(back, p);
        }
    }

    #[test]
    fn test_envelope_contains_rotated_content() {
        let mut state = state();
        state.set_rotation(90.0);
        // 2048x1024 world at zoom 0.5 is 1024x512 view pixels, swapped by the rotation
        assert_close(state.envelope_size(), Coord { x: 512.0, y: 1024.0 });
        let corner = state.world_to_envelope().apply(Coord { x: 0.0, y: 0.0 });
        assert!(corner.x >= -1e-9 && corner.y >= -1e-9);
    }

    #[test]
    fn test_zoom_about_keeps_focal_point() {
        let mut state = state();
        state.set_rotation(30.0);
        let focal = Coord { x: 200.0, y: 150.0 };
        let world = state.view_point_to_world(focal);
        state.zoom_about(0.9, focal);
        assert_eq!(state.zoom(), 0.9);
        assert_close(state.view_point_to_world(focal), world);

        state.rotate_about(-45.0, focal);
        assert_eq!(state.rotation(), 315.0);
        assert_close(state.view_point_to_world(focal), world);
    }

    #[test]
    fn test_zoom_is_clamped_and_selects_lod() {
        let mut state = state();
        state.set_zoom(50.0);
        assert_eq!(state.zoom(), 1.0);
        assert_eq!(state.lod_level(), 0);
        state.set_zoom(0.0);
        assert_eq!(state.zoom(), 0.125);
        assert_eq!(state.lod_level(), 3);
        assert_eq!(state.lod_to_world_scale(), 8.0);
        assert_eq!(state.lod_dimensions().horizontal_tiles(), 1);
        assert_eq!(state.view_to_lod_scale(), 1.0);
    }

    #[test]
    fn test_centralize() {
        let mut state = state();
        state.centralize();
        // envelope 1024x512 inside an 800x600 viewport
        assert_close(state.offset(), Coord { x: 112.0, y: -44.0 });
        let center = state.world_point_to_view(Coord { x: 1024.0, y: 512.0 });
        assert_close(center, Coord { x: 400.0, y: 300.0 });
    }

    #[test]
    fn test_tile_world_rect_uses_lod_scale() {
        let mut state = state();
        state.set_zoom(0.5);
        assert_eq!(state.lod_level(), 1);
        let rect = state.tile_world_rect(1, 2);
        assert_eq!(rect.min(), Coord { x: 512.0, y: 1024.0 });
        assert_eq!(rect.max(), Coord { x: 1024.0, y: 1536.0 });
    }

    #[test]
    fn test_rejects_invalid_viewport() {
        let mut state = state();
        assert!(state.set_viewport_size(Coord { x: -1.0, y: 10.0 }).is_err());
        assert!(state.set_viewport_size(Coord { x: f64::NAN, y: 10.0 }).is_err());
        assert!(state.set_viewport_size(Coord { x: 0.0, y: 0.0 }).is_ok());
    }

    #[test]
    fn test_set_layer_clamps_to_stacked_layer() {
        let mut state = state();
        state.set_layer(1);
        assert_eq!(state.layer(), 1);
        state.set_layer(9);
        assert_eq!(state.layer(), 2);
    }
}
