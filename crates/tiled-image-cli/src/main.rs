//! Command-line probe for tiled-image-lib.
//!
//! Without `--tiles-root` it prints the tile regions and markers the requested view
//! needs. With it, the visible tiles are loaded from disk through the coalescing loader
//! and the resulting frame is printed one draw call per line.

mod logging;
mod markers;
mod settings;
mod sink;

use clap::Parser;
use markers::MarkerOverlay;
use settings::Settings;
use sink::TextSink;
use std::{path::Path, process::ExitCode, sync::Arc, time::Duration};
use tiled_image_lib::{
    ImageViewState, TileCuller, TileIndex, TiledImageError, TiledImageView, ViewConfig,
};
use tiled_image_loader::{CoalescingImageSource, FsTileFetcher, LoaderError};

#[derive(Debug, thiserror::Error)]
enum CliError {
    #[error(transparent)]
    Core(#[from] TiledImageError),

    #[error(transparent)]
    Loader(#[from] LoaderError),

    #[error("Failed to start the async runtime: {0}")]
    Runtime(#[from] std::io::Error),
}

fn main() -> ExitCode {
    logging::setup_logging();
    let settings = Settings::parse();

    match run(&settings) {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            tracing::error!("{}", e);
            ExitCode::FAILURE
        }
    }
}

fn run(settings: &Settings) -> Result<(), CliError> {
    let Some(root) = &settings.tiles_root else {
        return probe(settings);
    };
    let runtime = tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()?;
    runtime.block_on(load(settings, root))
}

/// Print the visible regions and markers without loading anything
fn probe(settings: &Settings) -> Result<(), CliError> {
    let mut state =
        ImageViewState::new(settings.dimensions()?, settings.lod_info()?, settings.viewport())?;
    let center = settings.viewport() / 2.0;
    state.zoom_about(state.lod_info().initial_zoom(), center);
    state.centralize();
    if let Some(zoom) = settings.zoom {
        state.zoom_about(zoom, center);
    }
    state.rotate_about(settings.rotation, center);
    state.pan_by(settings.pan());
    state.set_layer(settings.layer);
    print_view(&state);

    let culler = TileCuller::new(&state);
    let regions = culler.visible_regions();
    let tile_count: u64 = regions
        .iter()
        .map(|region| u64::from(region.columns) * u64::from(region.rows))
        .sum();
    println!("{} visible tiles in {} regions", tile_count, regions.len());
    for region in &regions {
        let first = TileIndex::new(region.column, region.row);
        if region.is_single_tile() {
            println!("  {first}");
        } else {
            let last = TileIndex::new(
                region.column + region.columns - 1,
                region.row + region.rows - 1,
            );
            println!("  {first}..{last} ({}x{})", region.columns, region.rows);
        }
    }

    let mut markers = MarkerOverlay::new(&settings.markers)?;
    markers.update(&state);
    for (id, rect) in markers.visible() {
        println!(
            "marker {} at ({:.0}, {:.0}) {:.0}x{:.0}",
            MarkerOverlay::label(id),
            rect.min().x,
            rect.min().y,
            rect.width(),
            rect.height()
        );
    }
    Ok(())
}

/// Load the visible tiles and print the rendered frame
async fn load(settings: &Settings, root: &Path) -> Result<(), CliError> {
    let fetcher = FsTileFetcher::new(
        root,
        settings.tile_extension.as_str(),
        settings.dimensions()?,
        settings.lod_info()?,
    );
    let source = Arc::new(CoalescingImageSource::new(fetcher, settings.loader_config())?);

    let center = settings.viewport() / 2.0;
    let mut view = TiledImageView::new(ViewConfig::default(), settings.viewport());
    view.add_overlay(Box::new(MarkerOverlay::new(&settings.markers)?));
    view.attach(source)?;
    if let Some(zoom) = settings.zoom {
        view.zoom_about(zoom, center)?;
    }
    view.rotate_about(settings.rotation, center)?;
    view.pan_by(settings.pan())?;
    view.set_layer(settings.layer)?;
    if let Some(state) = view.state() {
        print_view(state);
    }

    let timeout = Duration::from_secs(settings.load_timeout);
    let settled = tokio::time::timeout(timeout, async {
        while !view.tiles().is_none_or(|tiles| tiles.is_settled()) {
            view.wait_for_tile_events().await?;
        }
        Ok::<_, TiledImageError>(())
    })
    .await;
    match settled {
        Ok(result) => result?,
        Err(_) => tracing::warn!("Tiles still loading after {:?}", timeout),
    }

    let mut sink = TextSink::default();
    view.render(&mut sink);
    for line in sink.lines() {
        println!("{line}");
    }
    Ok(())
}

fn print_view(state: &ImageViewState) {
    let dims = state.dimensions();
    println!(
        "image {}x{} px, {}x{} tiles, layer {}",
        dims.width(),
        dims.height(),
        dims.horizontal_tiles(),
        dims.vertical_tiles(),
        state.layer()
    );
    println!(
        "zoom {:.4}, rotation {:.1}, LOD {} ({}x{} tiles)",
        state.zoom(),
        state.rotation(),
        state.lod_level(),
        state.lod_dimensions().horizontal_tiles(),
        state.lod_dimensions().vertical_tiles()
    );
}
