//! Visibility culling of overlay items
//!
//! Each registered item is stored in a [`PointQuadTree`] as four entries, one per corner of
//! its bounding rectangle. A culling pass walks the tree against the viewport and reports
//! the items with at least one visible corner, each once, along with the changes since the
//! previous pass.

use crate::quadtree::Node;
use crate::{CullContext, ImageViewState, Intersection, PointQuadTree, Result, TiledImageError, utils};
use geo::{Coord, Rect};
use std::collections::{HashMap, HashSet};
use std::hash::Hash;

/// One corner of a registered item's bounding rectangle
#[derive(Debug, Clone, PartialEq)]
pub struct QuadTreeItem<T> {
    pub item: T,
    pub point: Coord<f64>,
}

impl<T> QuadTreeItem<T> {
    fn point_of(entry: &Self) -> Coord<f64> {
        entry.point
    }
}

/// Change of the visible item set, delivered to listeners after a culling pass.
///
/// A pass emits `CountChanged` first (only when the count differs), then `Removed`, then
/// `Added`; empty batches are not emitted.
#[derive(Debug, Clone, PartialEq)]
pub enum OverlayEvent<T> {
    CountChanged { old: usize, new: usize },
    Removed(Vec<T>),
    Added(Vec<T>),
}

type Listener<T> = Box<dyn FnMut(&OverlayEvent<T>)>;

/// Keeps track of which overlay items are visible in a view
pub struct OverlayCuller<T> {
    tree: PointQuadTree<QuadTreeItem<T>>,
    registered: HashMap<T, Rect<f64>>,
    visible: HashSet<T>,
    listeners: Vec<Listener<T>>,
}

impl<T> Default for OverlayCuller<T>
where
    T: Clone + Eq + Hash,
{
    fn default() -> Self {
        Self::new()
    }
}

#[cfg_attr(feature = "profiling", profiling::all_functions)]
impl<T> OverlayCuller<T>
where
    T: Clone + Eq + Hash,
{
    pub fn new() -> Self {
        Self {
            tree: PointQuadTree::new(QuadTreeItem::<T>::point_of as fn(&QuadTreeItem<T>) -> Coord<f64>),
            registered: HashMap::new(),
            visible: HashSet::new(),
            listeners: Vec::new(),
        }
    }

    /// Register a listener for visible set changes
    pub fn subscribe(&mut self, listener: impl FnMut(&OverlayEvent<T>) + 'static) {
        self.listeners.push(Box::new(listener));
    }

    /// Register an item covering `bounds` (world space)
    pub fn register_item(&mut self, item: T, bounds: Rect<f64>) -> Result<()> {
        if self.registered.contains_key(&item) {
            return Err(TiledImageError::ItemAlreadyRegistered);
        }
        for point in utils::rect_vertices(&bounds) {
            self.tree.insert(QuadTreeItem {
                item: item.clone(),
                point,
            });
        }
        self.registered.insert(item, bounds);
        Ok(())
    }

    /// Unregister an item, reporting it as removed if it was visible
    pub fn unregister_item(&mut self, item: &T) -> Result<()> {
        let bounds = self
            .registered
            .remove(item)
            .ok_or(TiledImageError::ItemNotRegistered)?;
        for point in utils::rect_vertices(&bounds) {
            self.tree.remove(&QuadTreeItem {
                item: item.clone(),
                point,
            })?;
        }
        if self.visible.remove(item) {
            let count = self.visible.len();
            self.emit(OverlayEvent::CountChanged {
                old: count + 1,
                new: count,
            });
            self.emit(OverlayEvent::Removed(vec![item.clone()]));
        }
        Ok(())
    }

    pub fn is_registered(&self, item: &T) -> bool {
        self.registered.contains_key(item)
    }

    pub fn registered_count(&self) -> usize {
        self.registered.len()
    }

    pub fn bounds_of(&self, item: &T) -> Option<Rect<f64>> {
        self.registered.get(item).copied()
    }

    pub fn is_visible(&self, item: &T) -> bool {
        self.visible.contains(item)
    }

    pub fn visible_count(&self) -> usize {
        self.visible.len()
    }

    pub fn visible_items(&self) -> impl Iterator<Item = &T> {
        self.visible.iter()
    }

    /// Recompute the visible items for `state`, notify listeners and return them in
    /// discovery order
    pub fn cull(&mut self, state: &ImageViewState) -> Vec<T> {
        profiling::scope!("OverlayCuller::cull");
        let context = CullContext::for_view(state);

        let mut visible = HashSet::new();
        let mut ordered = Vec::new();
        if let Some(root) = self.tree.root() {
            cull_node(&context, root, &mut |entry: &QuadTreeItem<T>| {
                if visible.insert(entry.item.clone()) {
                    ordered.push(entry.item.clone());
                }
            });
        }

        let removed: Vec<T> = self.visible.difference(&visible).cloned().collect();
        let added: Vec<T> = ordered
            .iter()
            .filter(|item| !self.visible.contains(*item))
            .cloned()
            .collect();
        let old_count = self.visible.len();
        self.visible = visible;
        tracing::trace!(
            visible = ordered.len(),
            added = added.len(),
            removed = removed.len(),
            "Overlay culling finished"
        );

        if old_count != self.visible.len() {
            self.emit(OverlayEvent::CountChanged {
                old: old_count,
                new: self.visible.len(),
            });
        }
        if !removed.is_empty() {
            self.emit(OverlayEvent::Removed(removed));
        }
        if !added.is_empty() {
            self.emit(OverlayEvent::Added(added));
        }
        ordered
    }

    fn emit(&mut self, event: OverlayEvent<T>) {
        for listener in &mut self.listeners {
            listener(&event);
        }
    }
}

fn cull_node<T>(
    context: &CullContext,
    node: &Node<QuadTreeItem<T>>,
    emit: &mut impl FnMut(&QuadTreeItem<T>),
) {
    // Closed test: a corner on the viewport edge is visible
    match context.classify_closed(&node.bounds()) {
        Intersection::Disjoint => {}
        Intersection::Contained => {
            for entry in node.descendants() {
                emit(entry);
            }
        }
        Intersection::Intersecting => {
            if let Some(entry) = node.resident()
                && context.contains_world_point(node.point())
            {
                emit(entry);
            }
            for child in node.children() {
                cull_node(context, child, emit);
            }
        }
    }
}
