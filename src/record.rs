//! Per-device sub-target records.
//!
//! One [`SubTarget`] exists per device slot of a compositor. The record owns
//! its backing exclusively; the backing kind and the specialization-specific
//! extras are a tagged variant selected at construction, so window-present
//! state and bitmap-sharing state can never be confused for each other.

use crate::foundation::core::DeviceVec;
use crate::foundation::geom::DeviceRect;
use crate::target::{BitmapTarget, CompatClass, DeviceTarget};

/// Which class of backing currently serves a device.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum BackingKind {
    /// The device's accelerated rasterizer.
    Accelerated,
    /// The per-device (or shared) software rasterizer substituted after an
    /// accelerated failure.
    SoftwareFallback,
}

/// The backing slot of a record, tagged by the compositor specialization
/// that owns it.
pub(crate) enum Backing {
    /// No backing; the record is disabled.
    None,
    /// A window-attached backing. `warm_accelerated` holds the demoted
    /// accelerated target while a software fallback is active, so
    /// reactivation does not have to recreate it from scratch.
    Window {
        target: Box<dyn DeviceTarget>,
        warm_accelerated: Option<Box<dyn DeviceTarget>>,
    },
    /// An offscreen bitmap backing.
    Bitmap { target: Box<dyn BitmapTarget> },
    /// No backing of its own; this device's content lives in the record at
    /// index `of` (bitmap compositor deduplication).
    Shared { of: usize },
}

/// Per-device state: dispatch enablement, coordinate offset, the bounds
/// quartet, and the backing slot.
pub(crate) struct SubTarget {
    /// Whether this device participates in dispatch.
    pub enabled: bool,
    /// Translation from compositor space into this device's local space.
    pub offset: DeviceVec,
    /// Area of the backing store that is legal to render into (local).
    pub render_bounds: DeviceRect,
    /// Area that must hold valid content before a present (local).
    pub present_bounds: DeviceRect,
    /// This device's bounds in virtual-desktop space, or
    /// [`DeviceRect::INFINITE`] when device clipping is disabled.
    pub virtual_bounds: DeviceRect,
    /// Sub-rectangle of `render_bounds` known to hold correct pixels.
    pub valid_content: DeviceRect,
    /// Which backing class is active.
    pub kind: BackingKind,
    /// The backing slot.
    pub backing: Backing,
}

impl SubTarget {
    /// A disabled record with no backing.
    pub fn empty() -> Self {
        Self {
            enabled: false,
            offset: DeviceVec::ZERO,
            render_bounds: DeviceRect::EMPTY,
            present_bounds: DeviceRect::EMPTY,
            virtual_bounds: DeviceRect::EMPTY,
            valid_content: DeviceRect::EMPTY,
            kind: BackingKind::Accelerated,
            backing: Backing::None,
        }
    }

    /// An enabled bitmap-backed record covering `bounds` at offset zero.
    pub fn bitmap(target: Box<dyn BitmapTarget>, kind: BackingKind, bounds: DeviceRect) -> Self {
        Self {
            enabled: true,
            offset: DeviceVec::ZERO,
            render_bounds: bounds,
            present_bounds: bounds,
            virtual_bounds: DeviceRect::INFINITE,
            valid_content: DeviceRect::EMPTY,
            kind,
            backing: Backing::Bitmap { target },
        }
    }

    /// A record sharing the backing of the record at index `of`. Never
    /// dispatched to directly.
    pub fn shared(of: usize) -> Self {
        Self {
            enabled: false,
            offset: DeviceVec::ZERO,
            render_bounds: DeviceRect::EMPTY,
            present_bounds: DeviceRect::EMPTY,
            virtual_bounds: DeviceRect::INFINITE,
            valid_content: DeviceRect::EMPTY,
            kind: BackingKind::Accelerated,
            backing: Backing::Shared { of },
        }
    }

    /// The active backing as a drawable target, if any.
    pub fn backing_mut(&mut self) -> Option<&mut dyn DeviceTarget> {
        match &mut self.backing {
            Backing::Window { target, .. } => Some(target.as_mut()),
            Backing::Bitmap { target } => Some(target.as_mut()),
            Backing::None | Backing::Shared { .. } => None,
        }
    }

    /// The active backing as a read-only target, if any.
    pub fn backing_ref(&self) -> Option<&dyn DeviceTarget> {
        match &self.backing {
            Backing::Window { target, .. } => Some(target.as_ref()),
            Backing::Bitmap { target } => Some(target.as_ref()),
            Backing::None | Backing::Shared { .. } => None,
        }
    }

    /// The bitmap backing, when this record holds one.
    pub fn bitmap_ref(&self) -> Option<&dyn BitmapTarget> {
        match &self.backing {
            Backing::Bitmap { target } => Some(target.as_ref()),
            _ => None,
        }
    }

    /// Index of the record whose backing this one reuses, when shared.
    pub fn shared_from(&self) -> Option<usize> {
        match self.backing {
            Backing::Shared { of } => Some(of),
            _ => None,
        }
    }

    /// Compatibility class of the active backing, if any.
    pub fn compat_class(&self) -> Option<CompatClass> {
        self.backing_ref().map(|t| t.compat_class())
    }

    /// Release the backing (warm handle included) and clear all bounds.
    pub fn disable(&mut self) {
        self.enabled = false;
        self.backing = Backing::None;
        self.offset = DeviceVec::ZERO;
        self.render_bounds = DeviceRect::EMPTY;
        self.present_bounds = DeviceRect::EMPTY;
        self.valid_content = DeviceRect::EMPTY;
    }

    /// Record that `local` now holds correct pixels.
    pub fn mark_valid(&mut self, local: DeviceRect) {
        self.valid_content = self
            .valid_content
            .union(local.intersect(self.render_bounds));
    }
}
