//! Display topology: the ordered set of devices spanning the virtual
//! desktop, shared read-only across compositor instances.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use crate::foundation::core::DevicePoint;
use crate::foundation::geom::DeviceRect;

/// One display's placement in virtual-desktop space.
#[derive(Clone, Copy, Debug, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub struct DisplayDesc {
    /// The display's bounds in the shared virtual coordinate space.
    pub bounds: DeviceRect,
}

/// An immutable snapshot of the display configuration.
///
/// A `DisplaySet` is shared (`Arc`) between every compositor observing the
/// same desktop. The display list itself never mutates; the only mutable
/// state is the staleness flag, raised by the host when the underlying
/// configuration has changed out from under this snapshot.
///
/// **Staleness is a precondition check, not a side effect.** A caller that
/// observes [`DisplaySet::has_changed`] returning `true` must stop issuing
/// position-dependent calls until it has adopted a fresh snapshot (see
/// [`WindowCompositor::recreate`](crate::window::WindowCompositor::recreate));
/// the real configuration can legally keep changing after the check.
#[derive(Debug)]
pub struct DisplaySet {
    displays: Vec<DisplayDesc>,
    virtual_bounds: DeviceRect,
    stale: AtomicBool,
}

impl DisplaySet {
    /// Build a snapshot from an ordered display list.
    pub fn new(displays: Vec<DisplayDesc>) -> Arc<Self> {
        let virtual_bounds = displays
            .iter()
            .fold(DeviceRect::EMPTY, |acc, d| acc.union(d.bounds));
        Arc::new(Self {
            displays,
            virtual_bounds,
            stale: AtomicBool::new(false),
        })
    }

    /// Number of displays in the set.
    pub fn display_count(&self) -> usize {
        self.displays.len()
    }

    /// Bounds of one display in virtual-desktop space.
    ///
    /// Out-of-range indices yield the empty rectangle.
    pub fn display_bounds(&self, index: usize) -> DeviceRect {
        self.displays
            .get(index)
            .map_or(DeviceRect::EMPTY, |d| d.bounds)
    }

    /// Union of every display's bounds.
    pub fn virtual_bounds(&self) -> DeviceRect {
        self.virtual_bounds
    }

    /// Index of the display containing the given virtual-space point.
    pub fn display_from_point(&self, p: DevicePoint) -> Option<usize> {
        self.displays
            .iter()
            .position(|d| d.bounds.contains_point(p.x, p.y))
    }

    /// Whether the host has flagged this snapshot as stale.
    pub fn has_changed(&self) -> bool {
        self.stale.load(Ordering::Acquire)
    }

    /// Flag this snapshot as stale. Called by the host's display-change
    /// notification path.
    pub fn mark_changed(&self) {
        self.stale.store(true, Ordering::Release);
    }
}
