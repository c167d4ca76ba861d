//! Render sink writing one text line per drawing command

use geo::{AffineTransform, Rect};
use std::sync::Arc;
use tiled_image_lib::{LoadTileStatus, RenderSink, TilePlaceholder, utils};

/// Records draw calls with their rectangles mapped to view space
#[derive(Debug, Default)]
pub struct TextSink {
    transforms: Vec<AffineTransform<f64>>,
    lines: Vec<String>,
}

impl TextSink {
    pub fn lines(&self) -> &[String] {
        &self.lines
    }

    fn to_view(&self, rect: Rect<f64>) -> Rect<f64> {
        self.transforms
            .last()
            .and_then(|transform| utils::bounding_rect(&utils::transform_vertices(transform, &rect)))
            .unwrap_or(rect)
    }

    fn describe(&self, rect: Rect<f64>) -> String {
        let rect = self.to_view(rect);
        format!(
            "({:.0}, {:.0}) {:.0}x{:.0}",
            rect.min().x,
            rect.min().y,
            rect.width(),
            rect.height()
        )
    }
}

impl RenderSink<Arc<[u8]>> for TextSink {
    fn push_transform(&mut self, transform: &AffineTransform<f64>) {
        let combined = match self.transforms.last() {
            Some(outer) => transform.compose(outer),
            None => *transform,
        };
        self.transforms.push(combined);
    }

    fn draw_bitmap(&mut self, bitmap: &Arc<[u8]>, rect: Rect<f64>) {
        let line = format!("tile    {}  {} bytes", self.describe(rect), bitmap.len());
        self.lines.push(line);
    }

    fn draw_placeholder(&mut self, placeholder: &TilePlaceholder<'_>, rect: Rect<f64>) {
        let state = match placeholder.status {
            LoadTileStatus::Loading => format!("loading {:.0}%", placeholder.progress * 100.0),
            LoadTileStatus::Failed => {
                format!("failed: {}", placeholder.error.unwrap_or("unknown error"))
            }
            other => format!("{other:?}"),
        };
        let line = format!("{}  {}  {}", placeholder.index, self.describe(rect), state);
        self.lines.push(line);
    }

    fn draw_outline(&mut self, rect: Rect<f64>, label: Option<&str>) {
        let line = format!("marker  {}  {}", label.unwrap_or("-"), self.describe(rect));
        self.lines.push(line);
    }

    fn pop_transform(&mut self) {
        self.transforms.pop();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tiled_image_lib::FullTileIndex;

    #[test]
    fn test_lines_in_view_space() {
        let mut sink = TextSink::default();
        sink.draw_outline(utils::rect_from_origin_size(1.0, 2.0, 3.0, 4.0), None);

        sink.push_transform(&AffineTransform::scale(0.5, 0.5, geo::Coord::zero()));
        let bitmap: Arc<[u8]> = Arc::from(&b"abcd"[..]);
        sink.draw_bitmap(&bitmap, utils::rect_from_origin_size(0.0, 0.0, 256.0, 256.0));
        let placeholder = TilePlaceholder {
            index: FullTileIndex::default(),
            status: LoadTileStatus::Failed,
            progress: 0.0,
            error: Some("missing"),
        };
        sink.draw_placeholder(&placeholder, utils::rect_from_origin_size(256.0, 0.0, 256.0, 256.0));
        sink.pop_transform();

        assert_eq!(
            sink.lines(),
            [
                "marker  -  (1, 2) 3x4".to_string(),
                "tile    (0, 0) 128x128  4 bytes".to_string(),
                format!("{}  (128, 0) 128x128  failed: missing", FullTileIndex::default()),
            ]
        );
    }
}
