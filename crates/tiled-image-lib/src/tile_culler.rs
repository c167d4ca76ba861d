//! Visible tile enumeration by recursive subdivision of the tile grid

use crate::{CullContext, ImageViewState, Intersection, TileIndex};

/// A block of tiles at the current LOD: `columns`×`rows` tiles starting at `(column, row)`
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TileRegion {
    pub column: u32,
    pub row: u32,
    pub columns: u32,
    pub rows: u32,
}

impl TileRegion {
    pub fn is_single_tile(&self) -> bool {
        self.columns == 1 && self.rows == 1
    }

    pub fn is_empty(&self) -> bool {
        self.columns == 0 || self.rows == 0
    }

    pub fn tiles(&self) -> impl Iterator<Item = TileIndex> + '_ {
        (self.row..self.row + self.rows).flat_map(move |row| {
            (self.column..self.column + self.columns).map(move |column| TileIndex::new(column, row))
        })
    }

    /// Split into up to four blocks; odd extents give the extra row or column to the first half
    fn split(&self) -> impl Iterator<Item = TileRegion> {
        let first_columns = self.columns.div_ceil(2);
        let first_rows = self.rows.div_ceil(2);
        let column_halves = [
            (self.column, first_columns),
            (self.column + first_columns, self.columns - first_columns),
        ];
        let row_halves = [
            (self.row, first_rows),
            (self.row + first_rows, self.rows - first_rows),
        ];
        row_halves
            .into_iter()
            .flat_map(move |(row, rows)| {
                column_halves.into_iter().map(move |(column, columns)| TileRegion {
                    column,
                    row,
                    columns,
                    rows,
                })
            })
            .filter(|region| !region.is_empty())
    }
}

/// Finds the tiles of the current LOD that overlap the viewport without visiting the whole grid
pub struct TileCuller<'a> {
    state: &'a ImageViewState,
    context: CullContext,
}

#[cfg_attr(feature = "profiling", profiling::all_functions)]
impl<'a> TileCuller<'a> {
    pub fn new(state: &'a ImageViewState) -> Self {
        Self {
            state,
            context: CullContext::for_view(state),
        }
    }

    pub fn context(&self) -> &CullContext {
        &self.context
    }

    /// Visible tiles of the current LOD, in discovery order, each listed once
    pub fn visible_tiles(&self) -> Vec<TileIndex> {
        self.visible_regions()
            .iter()
            .flat_map(|region| region.tiles())
            .collect()
    }

    /// Disjoint tile blocks that together cover every visible tile
    pub fn visible_regions(&self) -> Vec<TileRegion> {
        profiling::scope!("TileCuller::visible_regions");
        let dimensions = self.state.lod_dimensions();
        let grid = TileRegion {
            column: 0,
            row: 0,
            columns: dimensions.horizontal_tiles(),
            rows: dimensions.vertical_tiles(),
        };
        let mut regions = Vec::new();
        self.cull(grid, &mut regions);
        tracing::trace!(regions = regions.len(), "Tile culling finished");
        regions
    }

    /// World rectangle covered by a region
    pub fn region_world_rect(&self, region: &TileRegion) -> geo::Rect<f64> {
        self.state
            .tile_block_world_rect(region.column, region.row, region.columns, region.rows)
    }

    fn cull(&self, region: TileRegion, output: &mut Vec<TileRegion>) {
        let rect = self.region_world_rect(&region);
        match self.context.classify(&rect) {
            Intersection::Disjoint => {}
            Intersection::Contained => output.push(region),
            Intersection::Intersecting if region.is_single_tile() => output.push(region),
            Intersection::Intersecting => {
                for sub_region in region.split() {
                    self.cull(sub_region, output);
                }
            }
        }
    }
}

/// Convenience wrapper around [`TileCuller::visible_tiles`]
pub fn visible_tiles(state: &ImageViewState) -> Vec<TileIndex> {
    TileCuller::new(state).visible_tiles()
}
