//! Generic point quad-tree
//!
//! Every node is anchored at a point and may hold one resident item located at that
//! point. Items elsewhere are routed to one of four children by comparing their point to
//! the node's: ties go east and south. Each node keeps the tight bounds of its own point
//! and every descendant's, which lets window queries and culling passes prune subtrees.
//!
//! The tree is not synchronized; callers serialize access.

use crate::{Result, TiledImageError, utils};
use geo::{Coord, Rect};

/// Quadrant of a point relative to a node, usable as an index into the children array.
///
/// Bit 1 selects north (0) or south (1), bit 0 selects west (0) or east (1).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Direction {
    NorthWest = 0b00,
    NorthEast = 0b01,
    SouthWest = 0b10,
    SouthEast = 0b11,
}

impl Direction {
    pub const ALL: [Direction; 4] = [
        Direction::NorthWest,
        Direction::NorthEast,
        Direction::SouthWest,
        Direction::SouthEast,
    ];

    const EAST: usize = 0b01;
    const SOUTH: usize = 0b10;

    /// Quadrant of `point` around `origin`
    #[inline(always)]
    pub fn of(point: Coord<f64>, origin: Coord<f64>) -> Self {
        let east = if point.x >= origin.x { Self::EAST } else { 0 };
        let south = if point.y >= origin.y { Self::SOUTH } else { 0 };
        Self::from_index(east | south)
    }

    #[inline(always)]
    pub fn index(self) -> usize {
        self as usize
    }

    pub fn opposite(self) -> Self {
        Self::from_index(self.index() ^ 0b11)
    }

    pub fn is_east(self) -> bool {
        self.index() & Self::EAST != 0
    }

    pub fn is_south(self) -> bool {
        self.index() & Self::SOUTH != 0
    }

    fn from_index(index: usize) -> Self {
        Self::ALL[index & 0b11]
    }
}

/// A quad-tree node
#[derive(Debug, Clone)]
pub struct Node<T> {
    point: Coord<f64>,
    resident: Option<T>,
    bounds: Rect<f64>,
    children: [Option<Box<Node<T>>>; 4],
}

impl<T> Node<T> {
    fn leaf(item: T, point: Coord<f64>) -> Self {
        Self {
            point,
            resident: Some(item),
            bounds: Rect::new(point, point),
            children: [None, None, None, None],
        }
    }

    /// Anchor point of the node
    pub fn point(&self) -> Coord<f64> {
        self.point
    }

    pub fn resident(&self) -> Option<&T> {
        self.resident.as_ref()
    }

    /// Tight bounds of this node's point and all descendant points
    pub fn bounds(&self) -> Rect<f64> {
        self.bounds
    }

    pub fn child(&self, direction: Direction) -> Option<&Node<T>> {
        self.children[direction.index()].as_deref()
    }

    pub fn children(&self) -> impl Iterator<Item = &Node<T>> {
        self.children.iter().filter_map(|child| child.as_deref())
    }

    pub fn is_leaf(&self) -> bool {
        self.children.iter().all(Option::is_none)
    }

    /// Residents of this node and of every descendant
    pub fn descendants(&self) -> Vec<&T> {
        let mut output = Vec::new();
        self.collect_all(&mut output);
        output
    }

    /// A node without resident nor children carries nothing and can be dropped
    fn is_vacant_leaf(&self) -> bool {
        self.resident.is_none() && self.is_leaf()
    }

    fn update_bounds(&mut self) {
        let mut min = self.point;
        let mut max = self.point;
        for child in self.children.iter().flatten() {
            let bounds = child.bounds;
            min.x = min.x.min(bounds.min().x);
            min.y = min.y.min(bounds.min().y);
            max.x = max.x.max(bounds.max().x);
            max.y = max.y.max(bounds.max().y);
        }
        self.bounds = Rect::new(min, max);
    }

    fn insert(&mut self, item: T, point: Coord<f64>) {
        if self.resident.is_none() && self.point == point {
            self.resident = Some(item);
            return;
        }
        let index = Direction::of(point, self.point).index();
        if let Some(child) = self.children[index].as_mut() {
            child.insert(item, point);
        } else {
            self.children[index] = Some(Box::new(Node::leaf(item, point)));
        }
        self.update_bounds();
    }

    fn remove(&mut self, item: &T, point: Coord<f64>) -> Option<T>
    where
        T: PartialEq,
    {
        if self.point == point && self.resident.as_ref() == Some(item) {
            return self.resident.take();
        }
        let index = Direction::of(point, self.point).index();
        let child = self.children[index].as_mut()?;
        let removed = child.remove(item, point)?;
        if child.is_vacant_leaf() {
            self.children[index] = None;
        }
        self.update_bounds();
        Some(removed)
    }

    fn collect_all<'a>(&'a self, output: &mut Vec<&'a T>) {
        if let Some(resident) = &self.resident {
            output.push(resident);
        }
        for child in self.children() {
            child.collect_all(output);
        }
    }

    /// `anchor` is the quadrant known to lie inside `rect` when this node's point does
    fn collect<'a>(&'a self, rect: &Rect<f64>, anchor: Option<Direction>, output: &mut Vec<&'a T>) {
        if !overlaps_inclusive(&self.bounds, rect) {
            return;
        }
        let inside = utils::contains_inclusive(rect, self.point);
        if inside && let Some(resident) = &self.resident {
            output.push(resident);
        }

        let (min, max) = (rect.min(), rect.max());
        let west = min.x < self.point.x;
        let east = max.x >= self.point.x;
        let north = min.y < self.point.y;
        let south = max.y >= self.point.y;

        for direction in Direction::ALL {
            let Some(child) = self.child(direction) else {
                continue;
            };
            let horizontal = if direction.is_east() { east } else { west };
            let vertical = if direction.is_south() { south } else { north };
            if !(horizontal && vertical) {
                continue;
            }
            if inside && anchor == Some(direction) {
                child.collect_all(output);
                continue;
            }
            let child_anchor = inside.then(|| direction.opposite());
            child.collect(rect, child_anchor, output);
        }
    }
}

fn overlaps_inclusive(a: &Rect<f64>, b: &Rect<f64>) -> bool {
    a.min().x <= b.max().x && b.min().x <= a.max().x && a.min().y <= b.max().y && b.min().y <= a.max().y
}

/// Point quad-tree over items of type `T`, located through `point_of`
#[derive(Clone)]
pub struct PointQuadTree<T, F = fn(&T) -> Coord<f64>> {
    root: Option<Box<Node<T>>>,
    point_of: F,
    len: usize,
}

impl<T: std::fmt::Debug, F> std::fmt::Debug for PointQuadTree<T, F> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PointQuadTree")
            .field("len", &self.len)
            .field("root", &self.root)
            .finish()
    }
}

#[cfg_attr(feature = "profiling", profiling::all_functions)]
impl<T, F> PointQuadTree<T, F>
where
    F: Fn(&T) -> Coord<f64>,
{
    pub fn new(point_of: F) -> Self {
        Self {
            root: None,
            point_of,
            len: 0,
        }
    }

    pub fn len(&self) -> usize {
        self.len
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    pub fn root(&self) -> Option<&Node<T>> {
        self.root.as_deref()
    }

    /// Bounds of every point in the tree
    pub fn bounds(&self) -> Option<Rect<f64>> {
        self.root.as_ref().map(|root| root.bounds)
    }

    pub fn clear(&mut self) {
        self.root = None;
        self.len = 0;
    }

    pub fn point_of(&self, item: &T) -> Coord<f64> {
        (self.point_of)(item)
    }

    pub fn insert(&mut self, item: T) {
        let point = (self.point_of)(&item);
        match self.root.as_mut() {
            Some(root) => root.insert(item, point),
            None => self.root = Some(Box::new(Node::leaf(item, point))),
        }
        self.len += 1;
    }

    /// Remove an item equal to `item`, collapsing nodes left without content
    pub fn remove(&mut self, item: &T) -> Result<T>
    where
        T: PartialEq,
    {
        let point = (self.point_of)(item);
        let root = self.root.as_mut().ok_or(TiledImageError::ItemNotFound)?;
        let removed = root
            .remove(item, point)
            .ok_or(TiledImageError::ItemNotFound)?;
        if root.is_vacant_leaf() {
            self.root = None;
        }
        self.len -= 1;
        Ok(removed)
    }

    /// Items whose point lies inside `rect`, edges included
    pub fn collect(&self, rect: &Rect<f64>) -> Vec<&T> {
        let mut output = Vec::new();
        if let Some(root) = &self.root {
            root.collect(rect, None, &mut output);
        }
        output
    }

    /// Every item in the tree
    pub fn items(&self) -> Vec<&T> {
        self.root
            .as_ref()
            .map(|root| root.descendants())
            .unwrap_or_default()
    }
}
