//! The base multi-target engine.
//!
//! A [`Compositor`] owns one [`SubTarget`] record per device and implements
//! every drawing operation by building a [`PrimitiveIter`] with exactly the
//! adjustments the call needs, then invoking the matching operation on each
//! enabled device's backing. Begin-style brackets (`begin_scene_3d`,
//! `begin_layer`) unwind already-begun devices when a later device fails,
//! keeping every backing's begin/end pairing balanced.

use std::sync::Arc;

use kurbo::Rect;
use smallvec::SmallVec;
use tracing::warn;

use crate::adjust::{
    BitmapSourceAdjustment, BoundsAdjustment, ClipAdjustment, TransformAdjustment,
};
use crate::foundation::core::Rgba8;
use crate::foundation::error::{MosaicError, MosaicResult};
use crate::foundation::geom::DeviceRect;
use crate::iterate::{AdjustmentSet, PrimitiveIter};
use crate::record::{SubTarget, Backing};
use crate::target::{
    BitmapSource, Brush, BrushContext, CompatClass, DeviceTarget, DrawContext, Effect,
    EffectParams, GlyphDraw, LayerParams, Mesh3d, Pen, Scene3dParams, Shader, Shape, TargetFlags,
    TargetUsage, VideoSurface,
};
use crate::topology::DisplaySet;

/// Multi-target drawing engine: fans each operation out to every enabled
/// device, adjusting coordinates, clips, bounds, and bitmap sources into
/// each device's local space.
///
/// A `Compositor` with zero enabled devices accepts every drawing call as a
/// silent no-op; an occluded or off-desktop window is not an error.
pub struct Compositor {
    pub(crate) records: Vec<SubTarget>,
    pub(crate) displays: Arc<DisplaySet>,
    /// True when at least one record maps compositor space through a
    /// non-zero offset.
    pub(crate) use_offsets: bool,
    /// True for window-attached compositors, which maintain per-device
    /// valid-content bounds across `clear`.
    pub(crate) track_valid_content: bool,
}

impl Compositor {
    /// An engine with one empty, disabled record per display.
    pub(crate) fn empty_for_displays(displays: Arc<DisplaySet>, track_valid_content: bool) -> Self {
        let records = (0..displays.display_count())
            .map(|_| SubTarget::empty())
            .collect();
        Self {
            records,
            displays,
            use_offsets: false,
            track_valid_content,
        }
    }

    /// An engine over pre-built records (bitmap compositors).
    pub(crate) fn with_records(records: Vec<SubTarget>, displays: Arc<DisplaySet>) -> Self {
        let mut this = Self {
            records,
            displays,
            use_offsets: false,
            track_valid_content: false,
        };
        this.refresh_use_offsets();
        this
    }

    /// Recompute `use_offsets` after record mutation.
    pub(crate) fn refresh_use_offsets(&mut self) {
        self.use_offsets = self.records.iter().any(|r| r.enabled && !r.offset.is_zero());
    }

    /// Number of device slots (enabled or not).
    pub fn device_count(&self) -> usize {
        self.records.len()
    }

    /// Number of devices currently participating in dispatch.
    pub fn enabled_count(&self) -> usize {
        self.records
            .iter()
            .filter(|r| r.enabled && r.backing_ref().is_some())
            .count()
    }

    fn any_enabled(&self) -> bool {
        self.records
            .iter()
            .any(|r| r.enabled && r.backing_ref().is_some())
    }

    /// True when any record needs per-device bounds restriction: a non-zero
    /// offset or finite virtual bounds.
    fn bounds_adjust_needed(&self) -> bool {
        self.use_offsets
            || self
                .records
                .iter()
                .any(|r| r.enabled && r.virtual_bounds != DeviceRect::INFINITE)
    }

    /// Clear the target, honoring `ctx.clip`. Updates per-device
    /// valid-content bounds on window-attached compositors.
    pub fn clear(&mut self, ctx: &mut DrawContext, color: Option<Rgba8>) -> MosaicResult<()> {
        if !self.any_enabled() {
            return Ok(());
        }
        let track = self.track_valid_content;
        let set = AdjustmentSet {
            clip: Some(ClipAdjustment::new()),
            ..Default::default()
        };
        let mut iter = PrimitiveIter::new(&mut self.records, ctx, set);
        let mut last = Ok(());
        while let Some(i) = iter.advance() {
            let Some((target, dctx)) = iter.target_and_ctx(i) else {
                continue;
            };
            match target.clear(dctx, color) {
                Ok(()) => {
                    if track {
                        let clip = iter.ctx_clip();
                        let rec = iter.record_mut(i);
                        let local = clip
                            .map(DeviceRect::from_rect_rounded)
                            .unwrap_or(rec.render_bounds);
                        rec.mark_valid(local);
                    }
                }
                Err(e) => last = Err(e),
            }
        }
        last
    }

    /// Fill and/or stroke a shape on every enabled device.
    pub fn draw_path(
        &mut self,
        ctx: &mut DrawContext,
        brush_context: Option<&dyn BrushContext>,
        shape: &dyn Shape,
        pen: Option<&dyn Pen>,
        stroke_brush: Option<&dyn Brush>,
        fill_brush: Option<&dyn Brush>,
    ) -> MosaicResult<()> {
        let set = AdjustmentSet {
            transform: Some(TransformAdjustment::new(self.use_offsets)),
            clip: Some(ClipAdjustment::new()),
            ..Default::default()
        };
        self.dispatch(ctx, set, |target, dctx, _| {
            target.draw_path(dctx, brush_context, shape, pen, stroke_brush, fill_brush)
        })
    }

    /// Draw a bitmap source, substituting per-device bitmaps for composite
    /// sources created by this subsystem.
    pub fn draw_bitmap(
        &mut self,
        ctx: &mut DrawContext,
        source: &dyn BitmapSource,
        effect: Option<&dyn Effect>,
    ) -> MosaicResult<()> {
        let set = AdjustmentSet {
            transform: Some(TransformAdjustment::new(self.use_offsets)),
            bitmap: Some(BitmapSourceAdjustment::new(source)),
            ..Default::default()
        };
        self.dispatch(ctx, set, |target, dctx, args| {
            target.draw_bitmap(dctx, args.bitmap.unwrap_or(source), effect)
        })
    }

    /// Draw a 3-D mesh.
    pub fn draw_mesh_3d(
        &mut self,
        ctx: &mut DrawContext,
        brush_context: Option<&dyn BrushContext>,
        mesh: &dyn Mesh3d,
        shader: Option<&dyn Shader>,
        effect: Option<&dyn Effect>,
    ) -> MosaicResult<()> {
        let set = AdjustmentSet {
            transform: Some(TransformAdjustment::new(self.use_offsets)),
            clip: Some(ClipAdjustment::new()),
            ..Default::default()
        };
        self.dispatch(ctx, set, |target, dctx, _| {
            target.draw_mesh_3d(dctx, brush_context, mesh, shader, effect)
        })
    }

    /// Draw a glyph run. Only the run's bounding box needs adjustment.
    pub fn draw_glyph_run(
        &mut self,
        ctx: &mut DrawContext,
        glyphs: &GlyphDraw<'_>,
    ) -> MosaicResult<()> {
        let set = AdjustmentSet {
            bounds: Some(BoundsAdjustment::new(glyphs.bounds, self.bounds_adjust_needed())),
            ..Default::default()
        };
        let run = *glyphs;
        self.dispatch(ctx, set, |target, dctx, args| {
            let adjusted = GlyphDraw {
                bounds: args.bounds.unwrap_or(run.bounds),
                ..run
            };
            target.draw_glyph_run(dctx, &adjusted)
        })
    }

    /// Draw a video frame.
    pub fn draw_video(
        &mut self,
        ctx: &mut DrawContext,
        surface: Option<&dyn VideoSurface>,
        source: Option<&dyn BitmapSource>,
        effect: Option<&dyn Effect>,
    ) -> MosaicResult<()> {
        let set = AdjustmentSet {
            transform: Some(TransformAdjustment::new(self.use_offsets)),
            bitmap: source.map(BitmapSourceAdjustment::new),
            ..Default::default()
        };
        self.dispatch(ctx, set, |target, dctx, args| {
            target.draw_video(dctx, surface, args.bitmap.or(source), effect)
        })
    }

    /// Compose an effect into every enabled device.
    pub fn compose_effect(
        &mut self,
        ctx: &mut DrawContext,
        params: &EffectParams<'_>,
    ) -> MosaicResult<()> {
        let set = AdjustmentSet {
            transform: Some(TransformAdjustment::new(self.use_offsets)),
            bitmap: params.input.map(BitmapSourceAdjustment::new),
            ..Default::default()
        };
        let effect = params.effect;
        let input = params.input;
        self.dispatch(ctx, set, |target, dctx, args| {
            let adjusted = EffectParams {
                effect,
                input: args.bitmap.or(input),
            };
            target.compose_effect(dctx, &adjusted)
        })
    }

    /// Open a 3-D scene bracket on every enabled device, unwinding on
    /// failure.
    pub fn begin_scene_3d(
        &mut self,
        ctx: &mut DrawContext,
        bounds: Rect,
        params: &Scene3dParams,
    ) -> MosaicResult<()> {
        let set = AdjustmentSet {
            bounds: Some(BoundsAdjustment::new(bounds, self.bounds_adjust_needed())),
            ..Default::default()
        };
        self.dispatch_bracket(ctx, set, bounds, |target, local, _dctx| {
            target.begin_scene_3d(local, params)
        }, |target| target.end_scene_3d())
    }

    /// Close the current 3-D scene bracket on every enabled device.
    pub fn end_scene_3d(&mut self) -> MosaicResult<()> {
        let mut last = Ok(());
        for rec in &mut self.records {
            if !rec.enabled {
                continue;
            }
            if let Some(target) = rec.backing_mut()
                && let Err(e) = target.end_scene_3d()
            {
                last = Err(e);
            }
        }
        last
    }

    /// Open a layer bracket on every enabled device, unwinding on failure.
    pub fn begin_layer(
        &mut self,
        ctx: &mut DrawContext,
        bounds: Rect,
        params: &LayerParams<'_>,
    ) -> MosaicResult<()> {
        let set = AdjustmentSet {
            bounds: Some(BoundsAdjustment::new(bounds, self.bounds_adjust_needed())),
            ..Default::default()
        };
        self.dispatch_bracket(ctx, set, bounds, |target, local, _dctx| {
            target.begin_layer(local, params)
        }, |target| target.end_layer())
    }

    /// Close the innermost layer bracket on every enabled device.
    pub fn end_layer(&mut self) -> MosaicResult<()> {
        let mut last = Ok(());
        for rec in &mut self.records {
            if !rec.enabled {
                continue;
            }
            if let Some(target) = rec.backing_mut()
                && let Err(e) = target.end_layer()
            {
                last = Err(e);
            }
        }
        last
    }

    /// Abandon every open layer bracket on every enabled device.
    pub fn end_and_ignore_all_layers(&mut self) {
        for rec in &mut self.records {
            if !rec.enabled {
                continue;
            }
            if let Some(target) = rec.backing_mut() {
                target.end_and_ignore_all_layers();
            }
        }
    }

    /// Create a secondary multi-target bitmap compositor scaled to this
    /// compositor's device set.
    ///
    /// Devices whose backings share a compatibility class share one
    /// underlying bitmap; later records point at the earlier one instead of
    /// allocating again. `active_display_mask`, when supplied, overrides the
    /// parent's enabled set.
    pub fn create_target_bitmap(
        &mut self,
        width: u32,
        height: u32,
        usage: TargetUsage,
        flags: TargetFlags,
        active_display_mask: Option<&[bool]>,
    ) -> MosaicResult<BitmapCompositor> {
        if width == 0 || height == 0 {
            return Err(MosaicError::validation(
                "bitmap compositor dimensions must be non-zero",
            ));
        }
        let bounds = DeviceRect::from_origin_size(0, 0, width as i32, height as i32);
        let mut new_records: Vec<SubTarget> = Vec::with_capacity(self.records.len());
        let mut created: SmallVec<[(usize, CompatClass); 4]> = SmallVec::new();

        for i in 0..self.records.len() {
            let wanted = active_display_mask
                .map_or(self.records[i].enabled, |m| m.get(i).copied().unwrap_or(false));
            if !wanted || self.records[i].backing_ref().is_none() {
                new_records.push(SubTarget::empty());
                continue;
            }

            let class = match self.records[i].compat_class() {
                Some(c) => c,
                None => {
                    new_records.push(SubTarget::empty());
                    continue;
                }
            };
            if let Some(&(earlier, _)) = created.iter().find(|(_, c)| *c == class) {
                new_records.push(SubTarget::shared(earlier));
                continue;
            }

            let kind = self.records[i].kind;
            let target = match self.records[i].backing_mut() {
                Some(t) => t.create_target_bitmap(width, height, usage, flags)?,
                None => {
                    new_records.push(SubTarget::empty());
                    continue;
                }
            };
            created.push((i, class));
            new_records.push(SubTarget::bitmap(target, kind, bounds));
        }

        Ok(BitmapCompositor {
            base: Compositor::with_records(new_records, Arc::clone(&self.displays)),
            width,
            height,
        })
    }

    /// Generic continue-on-failure dispatch: visit every enabled device,
    /// remember the most recent failure, and return it after the loop.
    fn dispatch(
        &mut self,
        ctx: &mut DrawContext,
        set: AdjustmentSet<'_>,
        mut op: impl FnMut(&mut dyn DeviceTarget, &DrawContext, &DeviceArgs<'_>) -> MosaicResult<()>,
    ) -> MosaicResult<()> {
        if !self.any_enabled() {
            return Ok(());
        }
        let mut iter = PrimitiveIter::new(&mut self.records, ctx, set);
        let mut last = Ok(());
        while let Some(i) = iter.advance() {
            let args = DeviceArgs {
                bounds: iter.adjusted_bounds(),
                bitmap: iter.bitmap_source(),
            };
            let Some((target, dctx)) = iter.target_and_ctx(i) else {
                continue;
            };
            if let Err(e) = op(target, dctx, &args) {
                last = Err(e);
            }
        }
        last
    }

    /// Begin-style dispatch: stop at the first failure and unwind every
    /// device already begun, in reverse order.
    fn dispatch_bracket(
        &mut self,
        ctx: &mut DrawContext,
        set: AdjustmentSet<'_>,
        original_bounds: Rect,
        mut begin: impl FnMut(&mut dyn DeviceTarget, Rect, &DrawContext) -> MosaicResult<()>,
        mut end: impl FnMut(&mut dyn DeviceTarget) -> MosaicResult<()>,
    ) -> MosaicResult<()> {
        if !self.any_enabled() {
            return Ok(());
        }
        let mut started: SmallVec<[usize; 8]> = SmallVec::new();
        let mut failed = None;
        {
            let mut iter = PrimitiveIter::new(&mut self.records, ctx, set);
            while let Some(i) = iter.advance() {
                let local = iter.adjusted_bounds().unwrap_or(original_bounds);
                let Some((target, dctx)) = iter.target_and_ctx(i) else {
                    continue;
                };
                match begin(target, local, dctx) {
                    Ok(()) => started.push(i),
                    Err(e) => {
                        failed = Some(e);
                        break;
                    }
                }
            }
        }
        if let Some(e) = failed {
            for &i in started.iter().rev() {
                if let Some(target) = self.records[i].backing_mut()
                    && let Err(unwind_err) = end(target)
                {
                    warn!(device = i, error = %unwind_err, "bracket unwind failed");
                }
            }
            return Err(e);
        }
        Ok(())
    }
}

/// Per-device values computed by the live adjustments for one dispatch
/// step.
struct DeviceArgs<'a> {
    bounds: Option<Rect>,
    bitmap: Option<&'a dyn BitmapSource>,
}

/// A secondary multi-target bitmap: one offscreen bitmap per compatibility
/// class of the parent compositor's devices, drawable through
/// [`BitmapCompositor::surface`] and consumable as a [`BitmapSource`].
pub struct BitmapCompositor {
    base: Compositor,
    width: u32,
    height: u32,
}

impl BitmapCompositor {
    /// The drawing surface fanning out to every per-device bitmap.
    pub fn surface(&mut self) -> &mut Compositor {
        &mut self.base
    }

    /// Number of device slots.
    pub fn device_count(&self) -> usize {
        self.base.device_count()
    }

    /// Number of distinct bitmaps actually allocated.
    pub fn unique_bitmap_count(&self) -> usize {
        self.base
            .records
            .iter()
            .filter(|r| r.bitmap_ref().is_some())
            .count()
    }

    /// The single-device bitmap backing the given device slot, following
    /// shared records to their source.
    pub fn device_bitmap(&self, index: usize) -> Option<&dyn BitmapSource> {
        let rec = self.base.records.get(index)?;
        let resolved = rec.shared_from().unwrap_or(index);
        self.base
            .records
            .get(resolved)?
            .bitmap_ref()
            .map(|b| b.as_source())
    }

    /// True when `index`'s content lives in another record's bitmap.
    pub fn is_shared(&self, index: usize) -> bool {
        self.base
            .records
            .get(index)
            .is_some_and(|r| matches!(r.backing, Backing::Shared { .. }))
    }
}

impl std::fmt::Debug for BitmapCompositor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BitmapCompositor")
            .field("width", &self.width)
            .field("height", &self.height)
            .field("device_count", &self.device_count())
            .finish()
    }
}

impl BitmapSource for BitmapCompositor {
    fn size(&self) -> (u32, u32) {
        (self.width, self.height)
    }

    fn as_composite(&self) -> Option<&BitmapCompositor> {
        Some(self)
    }
}
