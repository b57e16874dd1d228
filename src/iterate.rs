//! Per-call device iteration.
//!
//! A [`PrimitiveIter`] is constructed immediately before one drawing call
//! and dropped immediately after. Construction runs `begin_primitive` on
//! each adjustment in the set; `advance` walks enabled records in index
//! order, applying `begin_device` for every live adjustment; drop runs
//! `end_primitive` in reverse order on every exit path, so the caller's
//! transform/clip/bounds/bitmap values are restored even when dispatch
//! fails partway through the device loop.

use kurbo::Rect;

use crate::adjust::{
    Adjustment, BitmapSourceAdjustment, BoundsAdjustment, ClipAdjustment, TransformAdjustment,
};
use crate::record::SubTarget;
use crate::target::{BitmapSource, DeviceTarget, DrawContext};

/// The adjustments one drawing call needs. Operations construct exactly the
/// subset relevant to their parameters and leave the rest `None`.
#[derive(Default)]
pub(crate) struct AdjustmentSet<'a> {
    pub transform: Option<TransformAdjustment>,
    pub clip: Option<ClipAdjustment>,
    pub bounds: Option<BoundsAdjustment>,
    pub bitmap: Option<BitmapSourceAdjustment<'a>>,
}

impl AdjustmentSet<'_> {
    fn begin_primitive(&mut self, ctx: &mut DrawContext) {
        if let Some(a) = &mut self.transform {
            a.begin_primitive(ctx);
        }
        if let Some(a) = &mut self.clip {
            a.begin_primitive(ctx);
        }
        if let Some(a) = &mut self.bounds {
            a.begin_primitive(ctx);
        }
        if let Some(a) = &mut self.bitmap {
            a.begin_primitive(ctx);
        }
    }

    fn begin_device(&mut self, ctx: &mut DrawContext, index: usize, sub: &SubTarget) {
        if let Some(a) = &mut self.transform {
            a.begin_device(ctx, index, sub);
        }
        if let Some(a) = &mut self.clip {
            a.begin_device(ctx, index, sub);
        }
        if let Some(a) = &mut self.bounds {
            a.begin_device(ctx, index, sub);
        }
        if let Some(a) = &mut self.bitmap {
            a.begin_device(ctx, index, sub);
        }
    }

    fn end_primitive(&mut self, ctx: &mut DrawContext) {
        // Reverse of begin order.
        if let Some(a) = &mut self.bitmap {
            a.end_primitive(ctx);
        }
        if let Some(a) = &mut self.bounds {
            a.end_primitive(ctx);
        }
        if let Some(a) = &mut self.clip {
            a.end_primitive(ctx);
        }
        if let Some(a) = &mut self.transform {
            a.end_primitive(ctx);
        }
    }
}

/// Transient per-call iterator over a compositor's enabled records.
pub(crate) struct PrimitiveIter<'a> {
    records: &'a mut [SubTarget],
    ctx: &'a mut DrawContext,
    set: AdjustmentSet<'a>,
    next: usize,
}

impl<'a> PrimitiveIter<'a> {
    pub fn new(
        records: &'a mut [SubTarget],
        ctx: &'a mut DrawContext,
        mut set: AdjustmentSet<'a>,
    ) -> Self {
        set.begin_primitive(ctx);
        Self {
            records,
            ctx,
            set,
            next: 0,
        }
    }

    /// Advance to the next enabled device and apply the live adjustments
    /// for it. Returns the device index.
    pub fn advance(&mut self) -> Option<usize> {
        while self.next < self.records.len() {
            let i = self.next;
            self.next += 1;
            if self.records[i].enabled && self.records[i].backing_ref().is_some() {
                self.set.begin_device(self.ctx, i, &self.records[i]);
                return Some(i);
            }
        }
        None
    }

    /// The bounds rectangle adjusted for the current device, when the call
    /// carries one.
    pub fn adjusted_bounds(&self) -> Option<Rect> {
        self.set.bounds.as_ref().map(|b| b.adjusted())
    }

    /// The bitmap source selected for the current device, when the call
    /// carries one.
    pub fn bitmap_source(&self) -> Option<&'a dyn BitmapSource> {
        self.set.bitmap.as_ref().map(|b| b.source_for_device())
    }

    /// The clip as currently adjusted for the device being visited.
    pub fn ctx_clip(&self) -> Option<Rect> {
        self.ctx.clip
    }

    /// Mutable access to one record, for valid-content bookkeeping after a
    /// successful device operation.
    pub fn record_mut(&mut self, index: usize) -> &mut SubTarget {
        &mut self.records[index]
    }

    /// The device's backing target plus the adjusted context, ready for the
    /// real operation.
    pub fn target_and_ctx(&mut self, index: usize) -> Option<(&mut dyn DeviceTarget, &DrawContext)> {
        match self.records[index].backing_mut() {
            Some(target) => Some((target, &*self.ctx)),
            None => None,
        }
    }
}

impl Drop for PrimitiveIter<'_> {
    fn drop(&mut self) {
        self.set.end_primitive(self.ctx);
    }
}
