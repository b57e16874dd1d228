//! Mosaic is a multi-target rendering compositor.
//!
//! One logical drawing surface is fanned out across an arbitrary number of
//! independently-backed devices — one per display of a multi-monitor
//! desktop, or one per requested bitmap realization — while callers issue
//! drawing operations exactly as if there were one target. The crate owns
//! the dispatch, adjustment, fallback, and state-tracking logic that sits
//! between a caller and the per-device backings:
//!
//! - Every primitive is dispatched to each enabled device with its
//!   coordinates, clip, bounds, and bitmap sources rewritten into that
//!   device's local space, and restored afterwards on every exit path.
//! - Each device falls back transparently from an accelerated backing to a
//!   software backing on failure.
//! - Per device, the region of the backing store holding valid content is
//!   tracked to support partial redraw and present.
//! - A window-attached specialization drives the position/resize/recreate
//!   state machine that keeps sub-targets in sync with a movable host
//!   rectangle spanning the virtual desktop.
//!
//! The concrete rasterizers are collaborators, not part of this crate:
//! hosts implement [`DeviceTarget`] and [`TargetFactory`], hand a
//! [`DisplaySet`] snapshot to a [`WindowCompositor`], and draw through
//! [`WindowCompositor::surface`].
#![forbid(unsafe_code)]
#![deny(missing_docs)]

mod adjust;
mod foundation;
mod iterate;
mod record;

pub mod compositor;
pub mod target;
pub mod topology;
pub mod window;

pub use crate::foundation::core::{Affine, DevicePoint, DeviceVec, Point, Rect, Rgba8, Vec2};
pub use crate::foundation::error::{MosaicError, MosaicResult};
pub use crate::foundation::geom::{DeviceRect, RectSet};
pub use crate::record::BackingKind;

pub use crate::compositor::{BitmapCompositor, Compositor};
pub use crate::target::{
    AntialiasMode, BitmapSource, BitmapTarget, CompatClass, DeviceTarget, DrawContext,
    EffectParams, GlyphDraw, LayerParams, PresentTransparency, Scene3dParams, TargetFactory,
    TargetFlags, TargetUsage,
};
pub use crate::topology::{DisplayDesc, DisplaySet};
pub use crate::window::{
    CompositorOpts, FallbackStats, InvalidRegions, PositionState, PresentationMode,
    WindowCompositor,
};
