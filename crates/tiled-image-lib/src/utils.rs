//! Geometry helpers shared by the view transform, the culling passes and the quad-tree
//!
//! All rectangles are axis-aligned `geo::Rect<f64>` in a y-down coordinate system:
//! `min()` is the top-left corner and `max()` the bottom-right one.

use geo::{AffineTransform, Coord, Rect};

/// Build a rectangle from its top-left corner and size
#[inline(always)]
pub fn rect_from_origin_size(x: f64, y: f64, width: f64, height: f64) -> Rect<f64> {
    Rect::new(
        Coord { x, y },
        Coord {
            x: x + width,
            y: y + height,
        },
    )
}

/// Check whether a point lies inside a closed rectangle (edges included)
#[inline(always)]
pub fn contains_inclusive(rect: &Rect<f64>, point: Coord<f64>) -> bool {
    let min = rect.min();
    let max = rect.max();
    point.x >= min.x && point.x <= max.x && point.y >= min.y && point.y <= max.y
}

/// Check whether a point lies strictly inside a rectangle (edges excluded)
#[inline(always)]
pub fn contains_strict(rect: &Rect<f64>, point: Coord<f64>) -> bool {
    let min = rect.min();
    let max = rect.max();
    point.x > min.x && point.x < max.x && point.y > min.y && point.y < max.y
}

/// The four corners of a rectangle, clockwise from the top-left one
#[inline(always)]
pub fn rect_vertices(rect: &Rect<f64>) -> [Coord<f64>; 4] {
    let min = rect.min();
    let max = rect.max();
    [
        Coord { x: min.x, y: min.y },
        Coord { x: max.x, y: min.y },
        Coord { x: max.x, y: max.y },
        Coord { x: min.x, y: max.y },
    ]
}

/// Transform the four corners of a rectangle
#[inline(always)]
pub fn transform_vertices(transform: &AffineTransform<f64>, rect: &Rect<f64>) -> [Coord<f64>; 4] {
    rect_vertices(rect).map(|vertex| transform.apply(vertex))
}

/// Axis-aligned bounding box of a set of points
pub fn bounding_rect(points: &[Coord<f64>]) -> Option<Rect<f64>> {
    let first = *points.first()?;
    let (min, max) = points.iter().skip(1).fold((first, first), |(min, max), p| {
        (
            Coord {
                x: min.x.min(p.x),
                y: min.y.min(p.y),
            },
            Coord {
                x: max.x.max(p.x),
                y: max.y.max(p.y),
            },
        )
    });
    Some(Rect::new(min, max))
}

/// Squared distance between two points
#[inline(always)]
pub fn distance_squared(a: Coord<f64>, b: Coord<f64>) -> f64 {
    let dx = a.x - b.x;
    let dy = a.y - b.y;
    dx * dx + dy * dy
}

/// Normalize an angle in degrees to `[0, 360)`
#[inline(always)]
pub fn normalize_degrees(degrees: f64) -> f64 {
    let normalized = degrees.rem_euclid(360.0);
    // rem_euclid can round up to exactly 360 for tiny negative inputs
    if normalized >= 360.0 { 0.0 } else { normalized }
}

/// Rotation by `degrees` about `center`, followed by a translation.
///
/// Positive angles turn clockwise on screen because the y axis points down.
pub fn rotation_about(degrees: f64, center: Coord<f64>) -> AffineTransform<f64> {
    let (sin, cos) = degrees.to_radians().sin_cos();
    AffineTransform::new(
        cos,
        -sin,
        center.x - cos * center.x + sin * center.y,
        sin,
        cos,
        center.y - sin * center.x - cos * center.y,
    )
}

/// Grow a rectangle by `dx`/`dy` on every side
#[inline(always)]
pub fn inflate(rect: &Rect<f64>, dx: f64, dy: f64) -> Rect<f64> {
    let min = rect.min();
    let max = rect.max();
    Rect::new(
        Coord {
            x: min.x - dx,
            y: min.y - dy,
        },
        Coord {
            x: max.x + dx,
            y: max.y + dy,
        },
    )
}
