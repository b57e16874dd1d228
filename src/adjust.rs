//! Per-primitive, per-device parameter adjustment.
//!
//! Every drawing call shares the same discipline: once per call, each
//! relevant adjustment decides whether it participates at all
//! (`begin_primitive`); once per enabled device, it rewrites its value into
//! that device's local space (`begin_device`); and exactly once on every
//! exit path, it restores the pre-call value (`end_primitive`, driven by the
//! iterator's `Drop`). A caller can therefore never observe a half-adjusted
//! transform or clip, even when dispatch fails midway through the device
//! loop.

use kurbo::{Rect, Vec2};

use crate::compositor::BitmapCompositor;
use crate::foundation::geom::DeviceRect;
use crate::record::SubTarget;
use crate::target::{BitmapSource, DrawContext};

/// The save/apply/restore protocol shared by all adjustments.
pub(crate) trait Adjustment {
    /// Decide whether this adjustment participates in the current call and
    /// save whatever state restoration needs. Returns the live flag.
    fn begin_primitive(&mut self, ctx: &mut DrawContext) -> bool;

    /// Rewrite the shared value into `sub`'s local space. No-op when the
    /// adjustment declared itself dead.
    fn begin_device(&mut self, ctx: &mut DrawContext, index: usize, sub: &SubTarget);

    /// Restore the shared value to its pre-call form. No-op when dead.
    fn end_primitive(&mut self, ctx: &mut DrawContext);
}

fn translate_rect(r: Rect, dx: f64, dy: f64) -> Rect {
    Rect::new(r.x0 + dx, r.y0 + dy, r.x1 + dx, r.y1 + dy)
}

fn is_full_plane(r: Rect) -> bool {
    let inf = DeviceRect::INFINITE.to_rect();
    r.x0 <= inf.x0 && r.y0 <= inf.y0 && r.x1 >= inf.x1 && r.y1 >= inf.y1
}

/// Rewrites the translation component of `ctx.transform` per device.
///
/// Dead when the owning compositor has no device offsets at all.
pub(crate) struct TransformAdjustment {
    offsets_in_use: bool,
    saved: Vec2,
    live: bool,
}

impl TransformAdjustment {
    pub fn new(offsets_in_use: bool) -> Self {
        Self {
            offsets_in_use,
            saved: Vec2::ZERO,
            live: false,
        }
    }
}

impl Adjustment for TransformAdjustment {
    fn begin_primitive(&mut self, ctx: &mut DrawContext) -> bool {
        self.live = self.offsets_in_use;
        if self.live {
            self.saved = ctx.transform.translation();
        }
        self.live
    }

    fn begin_device(&mut self, ctx: &mut DrawContext, _index: usize, sub: &SubTarget) {
        if !self.live {
            return;
        }
        let local = self.saved - Vec2::new(f64::from(sub.offset.x), f64::from(sub.offset.y));
        ctx.transform = ctx.transform.with_translation(local);
    }

    fn end_primitive(&mut self, ctx: &mut DrawContext) {
        if self.live {
            ctx.transform = ctx.transform.with_translation(self.saved);
            self.live = false;
        }
    }
}

/// Intersects `ctx.clip` with the device's virtual bounds and translates it
/// into local space.
///
/// Dead when the clip is absent, empty, or covers the full plane.
pub(crate) struct ClipAdjustment {
    saved: Option<Rect>,
    live: bool,
}

impl ClipAdjustment {
    pub fn new() -> Self {
        Self {
            saved: None,
            live: false,
        }
    }
}

impl Adjustment for ClipAdjustment {
    fn begin_primitive(&mut self, ctx: &mut DrawContext) -> bool {
        self.live = match ctx.clip {
            None => false,
            Some(r) => !(r.width() <= 0.0 || r.height() <= 0.0 || is_full_plane(r)),
        };
        if self.live {
            self.saved = ctx.clip;
        }
        self.live
    }

    fn begin_device(&mut self, ctx: &mut DrawContext, _index: usize, sub: &SubTarget) {
        if !self.live {
            return;
        }
        if let Some(saved) = self.saved {
            let clipped = saved.intersect(sub.virtual_bounds.to_rect());
            ctx.clip = Some(translate_rect(
                clipped,
                -f64::from(sub.offset.x),
                -f64::from(sub.offset.y),
            ));
        }
    }

    fn end_primitive(&mut self, ctx: &mut DrawContext) {
        if self.live {
            ctx.clip = self.saved;
            self.saved = None;
            self.live = false;
        }
    }
}

/// Redirects a caller-supplied bounds rectangle to a per-device scratch
/// value: original bounds ∩ device virtual bounds, translated local.
///
/// The original value is never mutated, so restoration holds by
/// construction; `end_primitive` only drops the live flag.
pub(crate) struct BoundsAdjustment {
    original: Rect,
    scratch: Rect,
    needed: bool,
    live: bool,
}

impl BoundsAdjustment {
    /// `needed` is false when every device sits at offset zero with
    /// unbounded virtual bounds (bitmap compositors), in which case the
    /// original rectangle passes through untouched.
    pub fn new(bounds: Rect, needed: bool) -> Self {
        Self {
            original: bounds,
            scratch: bounds,
            needed,
            live: false,
        }
    }

    /// The rectangle to hand the current device.
    pub fn adjusted(&self) -> Rect {
        self.scratch
    }
}

impl Adjustment for BoundsAdjustment {
    fn begin_primitive(&mut self, _ctx: &mut DrawContext) -> bool {
        self.live = self.needed;
        self.live
    }

    fn begin_device(&mut self, _ctx: &mut DrawContext, _index: usize, sub: &SubTarget) {
        if !self.live {
            return;
        }
        let clipped = self.original.intersect(sub.virtual_bounds.to_rect());
        self.scratch = translate_rect(
            clipped,
            -f64::from(sub.offset.x),
            -f64::from(sub.offset.y),
        );
    }

    fn end_primitive(&mut self, _ctx: &mut DrawContext) {
        self.scratch = self.original;
        self.live = false;
    }
}

/// Substitutes the per-device bitmap when the source is a composite bitmap
/// produced by this subsystem.
///
/// The substitution is a per-device selection over borrowed references, so
/// the caller's composite reference is restored by construction.
pub(crate) struct BitmapSourceAdjustment<'a> {
    original: &'a dyn BitmapSource,
    composite: Option<&'a BitmapCompositor>,
    selected: Option<&'a dyn BitmapSource>,
}

impl<'a> BitmapSourceAdjustment<'a> {
    pub fn new(source: &'a dyn BitmapSource) -> Self {
        Self {
            original: source,
            composite: None,
            selected: None,
        }
    }

    /// The source to hand the current device.
    pub fn source_for_device(&self) -> &'a dyn BitmapSource {
        self.selected.unwrap_or(self.original)
    }
}

impl Adjustment for BitmapSourceAdjustment<'_> {
    fn begin_primitive(&mut self, _ctx: &mut DrawContext) -> bool {
        self.composite = self.original.as_composite();
        self.composite.is_some()
    }

    fn begin_device(&mut self, _ctx: &mut DrawContext, index: usize, _sub: &SubTarget) {
        if let Some(composite) = self.composite {
            self.selected = composite.device_bitmap(index);
        }
    }

    fn end_primitive(&mut self, _ctx: &mut DrawContext) {
        self.composite = None;
        self.selected = None;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::foundation::core::DeviceVec;
    use kurbo::Affine;

    fn sub_at(offset_x: i32, offset_y: i32, virtual_bounds: DeviceRect) -> SubTarget {
        let mut rec = SubTarget::empty();
        rec.offset = DeviceVec::new(offset_x, offset_y);
        rec.virtual_bounds = virtual_bounds;
        rec
    }

    #[test]
    fn transform_adjustment_offsets_and_restores() {
        let mut ctx = DrawContext {
            transform: Affine::translate((100.0, 50.0)),
            clip: None,
        };
        let sub = sub_at(1920, 0, DeviceRect::new(1920, 0, 3840, 1080));

        let mut adj = TransformAdjustment::new(true);
        assert!(adj.begin_primitive(&mut ctx));
        adj.begin_device(&mut ctx, 0, &sub);
        assert_eq!(ctx.transform.translation(), Vec2::new(-1820.0, 50.0));
        adj.end_primitive(&mut ctx);
        assert_eq!(ctx.transform.translation(), Vec2::new(100.0, 50.0));
    }

    #[test]
    fn transform_adjustment_dead_without_offsets() {
        let mut ctx = DrawContext::new();
        let mut adj = TransformAdjustment::new(false);
        assert!(!adj.begin_primitive(&mut ctx));
    }

    #[test]
    fn clip_adjustment_dead_for_missing_empty_or_full_plane() {
        let mut adj = ClipAdjustment::new();

        let mut ctx = DrawContext::new();
        assert!(!adj.begin_primitive(&mut ctx));

        ctx.clip = Some(Rect::new(10.0, 10.0, 10.0, 50.0));
        assert!(!adj.begin_primitive(&mut ctx));

        ctx.clip = Some(DeviceRect::INFINITE.to_rect());
        assert!(!adj.begin_primitive(&mut ctx));
    }

    #[test]
    fn clip_adjustment_intersects_and_translates() {
        let mut ctx = DrawContext {
            transform: Affine::IDENTITY,
            clip: Some(Rect::new(1900.0, 0.0, 2100.0, 500.0)),
        };
        let sub = sub_at(1920, 0, DeviceRect::new(1920, 0, 3840, 1080));

        let mut adj = ClipAdjustment::new();
        assert!(adj.begin_primitive(&mut ctx));
        adj.begin_device(&mut ctx, 1, &sub);
        assert_eq!(ctx.clip, Some(Rect::new(0.0, 0.0, 180.0, 500.0)));
        adj.end_primitive(&mut ctx);
        assert_eq!(ctx.clip, Some(Rect::new(1900.0, 0.0, 2100.0, 500.0)));
    }

    #[test]
    fn bounds_adjustment_passes_original_through_when_not_needed() {
        let bounds = Rect::new(0.0, 0.0, 64.0, 64.0);
        let mut ctx = DrawContext::new();
        let mut adj = BoundsAdjustment::new(bounds, false);
        assert!(!adj.begin_primitive(&mut ctx));
        assert_eq!(adj.adjusted(), bounds);
    }

    #[test]
    fn bounds_adjustment_clips_to_device() {
        let mut ctx = DrawContext::new();
        let sub = sub_at(1920, 0, DeviceRect::new(1920, 0, 3840, 1080));
        let mut adj = BoundsAdjustment::new(Rect::new(1800.0, 0.0, 2000.0, 100.0), true);
        assert!(adj.begin_primitive(&mut ctx));
        adj.begin_device(&mut ctx, 1, &sub);
        assert_eq!(adj.adjusted(), Rect::new(0.0, 0.0, 80.0, 100.0));
        adj.end_primitive(&mut ctx);
        assert_eq!(adj.adjusted(), Rect::new(1800.0, 0.0, 2000.0, 100.0));
    }
}
