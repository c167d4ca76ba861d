//! Rectangle classification against a (possibly rotated) viewport
//!
//! The viewport is an axis-aligned rectangle in view space, which becomes an arbitrary
//! rectangle once mapped back into world space. Targets are axis-aligned world rectangles.
//! Classification runs in two phases: a corner test in view space resolves containment
//! and most overlaps, then a separating axis test over world space settles the rest.

use crate::{ImageViewState, utils};
use geo::{AffineTransform, Coord, Rect};

/// Relationship between a target rectangle and the cull rectangle
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Intersection {
    /// Every corner of the target lies in the closed cull rectangle
    Contained,
    /// The target and the cull rectangle share a region of positive area
    Intersecting,
    /// The target and the cull rectangle share no area; touching edges count as disjoint
    Disjoint,
}

/// Precomputed cull rectangle, reused for every classification of one culling pass
#[derive(Debug, Clone)]
pub struct CullContext {
    /// Cull rectangle in view space
    cull_rect: Rect<f64>,
    world_to_view: AffineTransform<f64>,
    /// Corners of the cull rectangle in world space
    world_vertices: [Coord<f64>; 4],
    world_center: Coord<f64>,
    /// Candidate separating axes and the cull polygon's projection onto each of them
    axes: [(Coord<f64>, f64, f64); 4],
}

#[cfg_attr(feature = "profiling", profiling::all_functions)]
impl CullContext {
    pub fn new(
        cull_rect: Rect<f64>,
        world_to_view: AffineTransform<f64>,
        view_to_world: AffineTransform<f64>,
    ) -> Self {
        let world_vertices = utils::transform_vertices(&view_to_world, &cull_rect);
        let world_center = view_to_world.apply(cull_rect.center());

        let edge_normal = |from: Coord<f64>, to: Coord<f64>| Coord {
            x: from.y - to.y,
            y: to.x - from.x,
        };
        // Targets are axis-aligned, so their edge normals are the unit axes
        let normals = [
            edge_normal(world_vertices[0], world_vertices[1]),
            edge_normal(world_vertices[1], world_vertices[2]),
            Coord { x: 1.0, y: 0.0 },
            Coord { x: 0.0, y: 1.0 },
        ];
        let axes = normals.map(|axis| {
            let (min, max) = project(&world_vertices, axis);
            (axis, min, max)
        });

        Self {
            cull_rect,
            world_to_view,
            world_vertices,
            world_center,
            axes,
        }
    }

    /// Cull context for the whole viewport of a view
    pub fn for_view(state: &ImageViewState) -> Self {
        Self::new(
            state.viewport_rect(),
            *state.world_to_view(),
            *state.view_to_world(),
        )
    }

    pub fn cull_rect(&self) -> &Rect<f64> {
        &self.cull_rect
    }

    pub fn world_vertices(&self) -> &[Coord<f64>; 4] {
        &self.world_vertices
    }

    pub fn world_center(&self) -> Coord<f64> {
        self.world_center
    }

    pub fn world_to_view(&self) -> &AffineTransform<f64> {
        &self.world_to_view
    }

    /// Whether a world point falls inside the closed cull rectangle
    pub fn contains_world_point(&self, point: Coord<f64>) -> bool {
        utils::contains_inclusive(&self.cull_rect, self.world_to_view.apply(point))
    }

    /// Classify an axis-aligned world rectangle against the cull rectangle.
    /// Rectangles that only touch it are `Disjoint`.
    pub fn classify(&self, target: &Rect<f64>) -> Intersection {
        self.classify_with(target, false)
    }

    /// Like [`CullContext::classify`], but over closed rectangles: sharing an edge or a
    /// corner counts as `Intersecting`
    pub fn classify_closed(&self, target: &Rect<f64>) -> Intersection {
        self.classify_with(target, true)
    }

    fn classify_with(&self, target: &Rect<f64>, closed: bool) -> Intersection {
        let view_vertices = utils::transform_vertices(&self.world_to_view, target);
        if view_vertices
            .iter()
            .all(|v| utils::contains_inclusive(&self.cull_rect, *v))
        {
            return Intersection::Contained;
        }
        let corner_inside = |v: &Coord<f64>| {
            if closed {
                utils::contains_inclusive(&self.cull_rect, *v)
            } else {
                utils::contains_strict(&self.cull_rect, *v)
            }
        };
        if view_vertices.iter().any(corner_inside) {
            return Intersection::Intersecting;
        }

        let target_vertices = utils::rect_vertices(target);
        for (axis, cull_min, cull_max) in &self.axes {
            let (target_min, target_max) = project(&target_vertices, *axis);
            let separated = if closed {
                target_max < *cull_min || *cull_max < target_min
            } else {
                target_max <= *cull_min || *cull_max <= target_min
            };
            if separated {
                return Intersection::Disjoint;
            }
        }
        Intersection::Intersecting
    }
}

fn project(vertices: &[Coord<f64>; 4], axis: Coord<f64>) -> (f64, f64) {
    vertices
        .iter()
        .map(|v| v.x * axis.x + v.y * axis.y)
        .fold((f64::INFINITY, f64::NEG_INFINITY), |(min, max), d| {
            (min.min(d), max.max(d))
        })
}
