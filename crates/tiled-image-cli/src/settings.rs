use clap::Parser;
use geo::{Coord, Rect};
use std::path::PathBuf;
use tiled_image_lib::{Dimensions, LodInfo, Result, utils};
use tiled_image_loader::LoaderConfig;

#[derive(Parser, Debug, Clone)]
#[clap(author, version, about, long_about = None)]
/// Tiled Image - Report which tiles and markers of a gigapixel image a viewport needs
pub struct Settings {
    /// Tile grid columns at the finest LOD
    #[clap(long, default_value = "64")]
    pub columns: u32,

    /// Tile grid rows at the finest LOD
    #[clap(long, default_value = "64")]
    pub rows: u32,

    /// Tile edge length in pixels
    #[clap(long, default_value = "256")]
    pub tile_size: u32,

    /// Number of layers
    #[clap(long, default_value = "1")]
    pub layers: u32,

    /// Finest LOD level
    #[clap(long, default_value = "0")]
    pub min_lod: u32,

    /// Coarsest LOD level
    #[clap(long, default_value = "4")]
    pub max_lod: u32,

    /// Scale ratio between adjacent LOD levels
    #[clap(long, default_value = "2.0")]
    pub lod_gap: f64,

    /// Viewport width in pixels
    #[clap(long, default_value = "1920")]
    pub viewport_width: u32,

    /// Viewport height in pixels
    #[clap(long, default_value = "1080")]
    pub viewport_height: u32,

    /// Zoom about the viewport center, 1.0 showing the finest LOD at full size.
    /// Defaults to the most zoomed-out view.
    #[clap(short, long)]
    pub zoom: Option<f64>,

    /// Rotation in degrees, clockwise about the viewport center
    #[clap(short, long, default_value = "0.0", allow_negative_numbers = true)]
    pub rotation: f64,

    /// Horizontal pan in view pixels, applied after centering
    #[clap(long, default_value = "0.0", allow_negative_numbers = true)]
    pub pan_x: f64,

    /// Vertical pan in view pixels, applied after centering
    #[clap(long, default_value = "0.0", allow_negative_numbers = true)]
    pub pan_y: f64,

    /// Layer to show
    #[clap(short, long, default_value = "0")]
    pub layer: u32,

    /// Overlay marker as a world rectangle, repeatable
    #[clap(short, long, value_name = "X,Y,W,H", value_parser = parse_rect)]
    pub markers: Vec<Rect<f64>>,

    /// Load the visible tiles from <DIR>/<lod>/<layer>/<row>/<column>.<ext>
    #[clap(long, value_name = "DIR")]
    pub tiles_root: Option<PathBuf>,

    /// Tile file extension
    #[clap(long, default_value = "png")]
    pub tile_extension: String,

    /// Persist fetched tile bytes under this directory
    #[clap(long, value_name = "DIR")]
    pub cache_dir: Option<PathBuf>,

    /// Maximum number of tile fetches running at once
    #[clap(long, default_value = "8")]
    pub max_concurrent_fetches: usize,

    /// Seconds to wait for the visible tiles to load
    #[clap(long, default_value = "10")]
    pub load_timeout: u64,
}

impl Settings {
    pub fn dimensions(&self) -> Result<Dimensions> {
        Dimensions::new(
            self.columns,
            self.rows,
            self.tile_size,
            self.tile_size,
            self.layers,
            0,
            0,
        )
    }

    /// LOD setup where zoom 1.0 maps to the finest level and each coarser level halves
    /// (or divides by the gap) the smallest reachable zoom
    pub fn lod_info(&self) -> Result<LodInfo> {
        let levels = self.max_lod.saturating_sub(self.min_lod);
        let min_zoom = self.lod_gap.powi(-(levels as i32));
        LodInfo::uniform(
            self.min_lod,
            self.max_lod,
            min_zoom,
            min_zoom,
            1.0,
            self.lod_gap,
        )
    }

    pub fn viewport(&self) -> Coord<f64> {
        Coord {
            x: f64::from(self.viewport_width),
            y: f64::from(self.viewport_height),
        }
    }

    pub fn pan(&self) -> Coord<f64> {
        Coord {
            x: self.pan_x,
            y: self.pan_y,
        }
    }

    pub fn loader_config(&self) -> LoaderConfig {
        LoaderConfig {
            cache_dir: self.cache_dir.clone(),
            max_concurrent_fetches: self.max_concurrent_fetches,
            ..LoaderConfig::default()
        }
    }
}

/// Parse `x,y,width,height`
fn parse_rect(value: &str) -> std::result::Result<Rect<f64>, String> {
    let parts = value
        .split(',')
        .map(|part| part.trim().parse::<f64>())
        .collect::<std::result::Result<Vec<_>, _>>()
        .map_err(|e| format!("invalid number in '{value}': {e}"))?;
    let [x, y, width, height] = parts[..] else {
        return Err(format!("expected X,Y,W,H, got '{value}'"));
    };
    if !(width >= 0.0 && height >= 0.0) {
        return Err(format!("negative size in '{value}'"));
    }
    Ok(utils::rect_from_origin_size(x, y, width, height))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let settings = Settings::try_parse_from(["tiled-image"]).unwrap();
        assert_eq!(settings.columns, 64);
        assert_eq!(settings.zoom, None);
        assert!(settings.markers.is_empty());

        let lod = settings.lod_info().unwrap();
        assert_eq!(lod.min_zoom(), 1.0 / 16.0);
        assert_eq!(lod.initial_zoom(), lod.min_zoom());
        assert_eq!(lod.max_zoom(), 1.0);
        assert_eq!(settings.dimensions().unwrap().width(), 64 * 256);
    }

    #[test]
    fn test_view_arguments() {
        let settings = Settings::try_parse_from([
            "tiled-image",
            "--zoom",
            "0.5",
            "--rotation",
            "-30",
            "--pan-x",
            "-100",
            "--markers",
            "10,20,30,40",
            "-m",
            "0, 0, 1, 1",
        ])
        .unwrap();
        assert_eq!(settings.zoom, Some(0.5));
        assert_eq!(settings.rotation, -30.0);
        assert_eq!(settings.pan(), Coord { x: -100.0, y: 0.0 });
        assert_eq!(
            settings.markers,
            vec![
                utils::rect_from_origin_size(10.0, 20.0, 30.0, 40.0),
                utils::rect_from_origin_size(0.0, 0.0, 1.0, 1.0),
            ]
        );
    }

    #[test]
    fn test_parse_rect_errors() {
        assert!(parse_rect("1,2,3").is_err());
        assert!(parse_rect("1,2,x,4").is_err());
        assert!(parse_rect("1,2,-3,4").is_err());
    }

    #[test]
    fn test_invalid_lod_setup() {
        let settings =
            Settings::try_parse_from(["tiled-image", "--min-lod", "3", "--max-lod", "1"]).unwrap();
        assert!(settings.lod_info().is_err());
    }
}
