//! Window-attached compositor.
//!
//! A [`WindowCompositor`] keeps one sub-target per display in sync with a
//! movable, resizable host rectangle spanning the virtual desktop. It owns
//! the position/resize/recreate state machine, per-device present, partial
//! redraw bookkeeping, and the hardware→software fallback policy.

use std::sync::Arc;

use kurbo::Rect;
use tracing::{debug, warn};

use crate::compositor::Compositor;
use crate::foundation::core::{DevicePoint, DeviceVec};
use crate::foundation::error::{MosaicError, MosaicResult};
use crate::foundation::geom::{DeviceRect, RectSet};
use crate::record::{Backing, BackingKind, SubTarget};
use crate::target::{PresentTransparency, TargetFactory};
use crate::topology::DisplaySet;

/// Slack added around present bounds so small window movements can reuse
/// already-rendered pixels, in device pixels.
const RENDER_BOUNDS_MARGIN: i32 = 64;

/// How presents reach the screen.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub enum PresentationMode {
    /// Each device presents independently and falls back independently.
    #[default]
    PerDevice,
    /// Legacy presentation without partial-update support: the first
    /// successful software creation collapses the whole device set into one
    /// software target covering the full virtual desktop.
    SingleSharedSoftware,
}

/// Initialization flags gating the fallback and clipping policies.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub struct CompositorOpts {
    /// Never attempt accelerated backings.
    pub software_only: bool,
    /// Never fall back to software; accelerated failures propagate.
    pub hardware_only: bool,
    /// Do not clip sub-targets to their display: every intersecting device
    /// covers the full window.
    pub disable_display_clipping: bool,
    /// Like `disable_display_clipping`, but only when the window actually
    /// spans more than one display.
    pub disable_multi_display_clipping: bool,
    /// Layered/retained-content windows need exact backing sizes; suppress
    /// the render-bounds inflation margin.
    pub retain_contents: bool,
    /// Presentation mode selector.
    pub presentation: PresentationMode,
}

impl CompositorOpts {
    /// Reject contradictory flag combinations.
    pub fn validate(&self) -> MosaicResult<()> {
        if self.software_only && self.hardware_only {
            return Err(MosaicError::validation(
                "software_only and hardware_only are mutually exclusive",
            ));
        }
        Ok(())
    }
}

/// Position/resize/recreate state of a window compositor.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum PositionState {
    /// Sub-targets match the applied position; drawing and present are
    /// legal.
    Ready,
    /// A position pass is owed. `resize_only` is set when the mismatch was
    /// detected by a failed present rather than by a move.
    NeedSetPosition {
        /// Size-only mismatch detected by a wrong-size present failure.
        resize_only: bool,
    },
    /// The display topology is stale; every device must be torn down and
    /// reinitialized against a fresh snapshot.
    NeedRecreate,
}

/// Fallback diagnostics counters.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct FallbackStats {
    /// Accelerated create/resize failures observed.
    pub hw_failures: u64,
    /// Software backings created.
    pub sw_creations: u64,
    /// Single-shared-software collapses performed.
    pub collapses: u64,
}

/// Invalid-region report for one device, in that device's local space.
#[derive(Debug)]
pub struct InvalidRegions {
    /// Device index the report applies to.
    pub device: usize,
    /// Disjoint rectangles not currently holding valid content.
    pub rects: RectSet,
    /// True when the whole target must be repainted.
    pub whole_invalid: bool,
}

/// Per-device layout computed by a position pass, before any backing is
/// touched.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
struct DeviceLayout {
    offset: DeviceVec,
    render_bounds: DeviceRect,
    present_bounds: DeviceRect,
    virtual_bounds: DeviceRect,
}

impl DeviceLayout {
    fn size(&self) -> (u32, u32) {
        (
            self.render_bounds.width() as u32,
            self.render_bounds.height() as u32,
        )
    }
}

/// Compute one device's layout for a window at `target` (virtual space).
///
/// `present_v` is the window restricted to the display unless clipping is
/// disabled; render bounds add the slack margin, clamped back to the
/// display (the backing extent). Local space is anchored at the render
/// bounds origin so the backing is exactly render-bounds sized.
fn device_layout(
    target: DeviceRect,
    display: DeviceRect,
    margin: i32,
    unclipped: bool,
) -> Option<DeviceLayout> {
    let (present_v, render_v, virtual_bounds) = if unclipped {
        (target, target, DeviceRect::INFINITE)
    } else {
        let present_v = target.intersect(display);
        if present_v.is_empty() {
            return None;
        }
        let render_v = present_v.inflate(margin).intersect(display);
        (present_v, render_v, display)
    };

    let offset = DeviceVec::new(render_v.x0, render_v.y0);
    Some(DeviceLayout {
        offset,
        render_bounds: render_v.translate(-offset.x, -offset.y),
        present_bounds: present_v.translate(-offset.x, -offset.y),
        virtual_bounds,
    })
}

/// Multi-target compositor attached to a movable window.
pub struct WindowCompositor {
    base: Compositor,
    factory: Box<dyn TargetFactory>,
    opts: CompositorOpts,
    state: PositionState,
    /// Currently-applied window rectangle, virtual space.
    position: DeviceRect,
    transparency: PresentTransparency,
    /// Set once the record set has collapsed to one shared software target.
    collapsed: bool,
    stats: FallbackStats,
}

impl WindowCompositor {
    /// Create a compositor with one empty sub-target per display. No
    /// backings exist until the first [`set_position`](Self::set_position).
    pub fn new(
        displays: Arc<DisplaySet>,
        factory: Box<dyn TargetFactory>,
        opts: CompositorOpts,
    ) -> MosaicResult<Self> {
        opts.validate()?;
        Ok(Self {
            base: Compositor::empty_for_displays(displays, true),
            factory,
            opts,
            state: PositionState::Ready,
            position: DeviceRect::EMPTY,
            transparency: PresentTransparency::default(),
            collapsed: false,
            stats: FallbackStats::default(),
        })
    }

    /// The drawing surface fanning out to every enabled device.
    pub fn surface(&mut self) -> &mut Compositor {
        &mut self.base
    }

    /// Current state-machine state.
    pub fn state(&self) -> PositionState {
        self.state
    }

    /// The currently-applied window rectangle in virtual space.
    pub fn position(&self) -> DeviceRect {
        self.position
    }

    /// The display snapshot this compositor was built against.
    pub fn displays(&self) -> &Arc<DisplaySet> {
        &self.base.displays
    }

    /// Fallback diagnostics.
    pub fn stats(&self) -> FallbackStats {
        self.stats
    }

    /// The applied position restricted to one display, in virtual space.
    pub fn intersection_with_display(&self, index: usize) -> DeviceRect {
        self.position
            .intersect(self.base.displays.display_bounds(index))
    }

    /// Adopt a fresh display snapshot after `NeedRecreate`.
    ///
    /// Every backing is released and every record reset to 0×0. The state
    /// remains `NeedRecreate` until a subsequent successful non-empty
    /// [`set_position`](Self::set_position).
    pub fn recreate(&mut self, displays: Arc<DisplaySet>) {
        debug!(
            displays = displays.display_count(),
            "recreating against fresh display set"
        );
        for rec in &mut self.base.records {
            rec.disable();
        }
        self.base.records = (0..displays.display_count())
            .map(|_| SubTarget::empty())
            .collect();
        self.base.displays = displays;
        self.base.refresh_use_offsets();
        self.position = DeviceRect::EMPTY;
        self.collapsed = false;
        self.state = PositionState::NeedRecreate;
    }

    /// Move/resize the window to `rect` (virtual space, float), resizing,
    /// creating, and disabling sub-targets as displays gain or lose the
    /// window.
    pub fn set_position(&mut self, rect: Rect) -> MosaicResult<()> {
        let mut target = DeviceRect::from_rect_rounded(rect);

        if self.base.displays.has_changed() {
            debug!("display snapshot stale; position pass demoted to release-only");
            self.state = PositionState::NeedRecreate;
        }
        if self.state == PositionState::NeedRecreate {
            // Release-only pass: stale records must not be resized against
            // stale display bounds.
            target = DeviceRect::EMPTY;
        }

        if target == self.position && self.state == PositionState::Ready {
            return Ok(());
        }

        if let Err(e) = self.apply_position(target) {
            self.position = DeviceRect::EMPTY;
            self.state = if e.is_display_changed() {
                PositionState::NeedRecreate
            } else {
                PositionState::NeedSetPosition { resize_only: false }
            };
            return Err(e);
        }

        self.position = target;
        self.base.refresh_use_offsets();
        if !(self.state == PositionState::NeedRecreate && target.is_empty()) {
            self.state = PositionState::Ready;
        }
        Ok(())
    }

    /// Flush every enabled device's present bounds to the screen.
    ///
    /// Per-device failures are remembered (most recent wins) while
    /// remaining devices still present, except a display-changed failure,
    /// which aborts immediately, forces `NeedRecreate`, and releases every
    /// backing. A wrong-size failure promotes the state to the resize-only
    /// sub-state.
    pub fn present(&mut self) -> MosaicResult<()> {
        let mut last = Ok(());
        let mut display_changed = false;

        for i in 0..self.base.records.len() {
            let rec = &mut self.base.records[i];
            if !rec.enabled || rec.present_bounds.is_empty() {
                continue;
            }
            let local = rec.present_bounds;
            let Some(target) = rec.backing_mut() else {
                continue;
            };
            match target.present(local) {
                Ok(()) => {}
                Err(e) if e.is_display_changed() => {
                    display_changed = true;
                    break;
                }
                Err(e) => {
                    if e.is_wrong_size() {
                        self.state = PositionState::NeedSetPosition { resize_only: true };
                    }
                    warn!(device = i, error = %e, "device present failed");
                    last = Err(e);
                }
            }
        }

        if display_changed {
            self.state = PositionState::NeedRecreate;
            // Free resources now; the empty pass re-enters NeedRecreate.
            let _ = self.set_position(Rect::ZERO);
            return Err(MosaicError::DisplayChanged);
        }

        last
    }

    /// Report, per enabled device, the parts of the render bounds not
    /// currently holding valid content.
    ///
    /// Querying transfers redraw responsibility to the caller: each
    /// reported device's valid-content bounds grow to its render bounds.
    pub fn invalid_regions(&mut self) -> Vec<InvalidRegions> {
        let mut out = Vec::new();
        for (i, rec) in self.base.records.iter_mut().enumerate() {
            if !rec.enabled || rec.backing_ref().is_none() {
                continue;
            }
            if rec.valid_content.contains_rect(rec.present_bounds) {
                continue;
            }

            let valid = rec.valid_content.intersect(rec.render_bounds);
            if valid.is_empty() {
                // Nothing valid, or valid content disjoint from the render
                // bounds: the whole target is invalid. The tracked rectangle
                // grows to the smallest one containing the render bounds
                // plus any adjacent edge of the old one.
                let mut rects = RectSet::new();
                rects.push(rec.render_bounds);
                rec.valid_content = rec.render_bounds.union(rec.valid_content);
                out.push(InvalidRegions {
                    device: i,
                    rects,
                    whole_invalid: true,
                });
            } else {
                let rects = rec.render_bounds.subtract(valid);
                rec.valid_content = rec.render_bounds;
                out.push(InvalidRegions {
                    device: i,
                    rects,
                    whole_invalid: false,
                });
            }
        }
        out
    }

    /// Store presentation transparency settings and propagate them to every
    /// enabled device.
    pub fn update_present_properties(
        &mut self,
        transparency: PresentTransparency,
    ) -> MosaicResult<()> {
        self.transparency = transparency;
        let mut last = Ok(());
        for rec in &mut self.base.records {
            if !rec.enabled {
                continue;
            }
            if let Some(target) = rec.backing_mut()
                && let Err(e) = target.update_present_properties(&transparency)
            {
                last = Err(e);
            }
        }
        last
    }

    /// One full position pass over every device.
    fn apply_position(&mut self, target: DeviceRect) -> MosaicResult<()> {
        let displays = Arc::clone(&self.base.displays);
        let count = self.base.records.len();

        if self.collapsed {
            // One record covers the whole desktop; only its size can change.
            if target.is_empty() {
                if let Some(rec) = self.base.records.first_mut() {
                    rec.disable();
                }
                return Ok(());
            }
            return self.apply_collapsed_position();
        }

        let unclipped_all = self.opts.disable_display_clipping;
        let span = (0..count)
            .filter(|&i| target.intersects(displays.display_bounds(i)))
            .count();
        let unclipped = unclipped_all || (self.opts.disable_multi_display_clipping && span > 1);
        let margin = if self.opts.retain_contents || unclipped {
            0
        } else {
            RENDER_BOUNDS_MARGIN
        };

        // Decide which devices the window lands on.
        let mut layouts: Vec<Option<DeviceLayout>> = Vec::with_capacity(count);
        let mut any = false;
        for i in 0..count {
            // Unclipped devices still participate only when the window
            // actually touches their display.
            let layout = if target.is_empty()
                || !target.intersects(displays.display_bounds(i))
            {
                None
            } else {
                device_layout(target, displays.display_bounds(i), margin, unclipped)
            };
            any |= layout.is_some();
            layouts.push(layout);
        }

        // Gap rescue: a window inside the virtual desktop but between
        // display rectangles is assigned whole to the nearest display.
        if !any && !target.is_empty() && displays.virtual_bounds().intersects(target) {
            if let Some(nearest) = nearest_display(&displays, target) {
                debug!(display = nearest, "window in display gap; using nearest");
                layouts[nearest] =
                    device_layout(target, displays.display_bounds(nearest), 0, true);
            }
        }

        for i in 0..count {
            match layouts[i] {
                None => {
                    if self.base.records[i].enabled {
                        self.base.records[i].disable();
                    }
                }
                Some(layout) => {
                    self.apply_device_layout(i, layout)?;
                    if self.collapsed {
                        // A fallback inside the loop collapsed the record
                        // set; the remaining per-display work is moot.
                        return self.apply_collapsed_position();
                    }
                }
            }
        }
        Ok(())
    }

    /// Layout pass for the collapsed single-shared-software configuration.
    fn apply_collapsed_position(&mut self) -> MosaicResult<()> {
        let vb = self.base.displays.virtual_bounds();
        let layout = DeviceLayout {
            offset: DeviceVec::new(vb.x0, vb.y0),
            render_bounds: vb.translate(-vb.x0, -vb.y0),
            present_bounds: vb.translate(-vb.x0, -vb.y0),
            virtual_bounds: vb,
        };
        self.apply_device_layout(0, layout)
    }

    /// Apply one device's computed layout: resize or create the backing
    /// when needed, then update the record's bounds.
    fn apply_device_layout(&mut self, index: usize, layout: DeviceLayout) -> MosaicResult<()> {
        let (w, h) = layout.size();
        let rec = &self.base.records[index];
        let was_enabled = rec.enabled;
        let old_offset = rec.offset;
        let size_changed = rec.backing_ref().map(|t| t.size()) != Some((w, h));

        if !was_enabled || size_changed {
            self.resize_sub_target(index, w, h)?;
        }

        let rec = &mut self.base.records[index];
        if !was_enabled || size_changed {
            rec.valid_content = DeviceRect::EMPTY;
        } else {
            // Same-size move: previously-rendered slack pixels stay valid
            // where the old and new render bounds overlap.
            let dx = old_offset.x - layout.offset.x;
            let dy = old_offset.y - layout.offset.y;
            rec.valid_content = rec
                .valid_content
                .translate(dx, dy)
                .intersect(layout.render_bounds);
        }
        rec.enabled = true;
        rec.offset = layout.offset;
        rec.render_bounds = layout.render_bounds;
        rec.present_bounds = layout.present_bounds;
        rec.virtual_bounds = layout.virtual_bounds;
        Ok(())
    }

    /// Resize this device's backing to `w × h`, creating it (with fallback)
    /// when missing.
    ///
    /// The accelerated path is always attempted first: resize the active
    /// accelerated backing, else revive the kept-warm one, else create
    /// fresh. On success any software fallback is released. On failure the
    /// software path takes over unless `hardware_only` is set, honoring the
    /// single-shared-software collapse policy.
    fn resize_sub_target(&mut self, index: usize, w: u32, h: u32) -> MosaicResult<()> {
        let was_enabled = self.base.records[index].enabled;

        if self.collapsed {
            // The shared software target never migrates back to hardware.
            self.try_software(index, w, h)?;
            return self.finish_enable(index, was_enabled);
        }

        if !self.opts.software_only {
            match self.try_accelerated(index, w, h) {
                Ok(()) => return self.finish_enable(index, was_enabled),
                Err(e) if e.is_display_changed() => return Err(e),
                Err(e) if self.opts.hardware_only => return Err(e),
                Err(e) => {
                    self.stats.hw_failures += 1;
                    warn!(device = index, error = %e, "accelerated backing failed; using software");
                }
            }
        }

        if self.opts.presentation == PresentationMode::SingleSharedSoftware {
            self.collapse_to_shared_software()?;
            return Ok(());
        }

        self.try_software(index, w, h)?;
        self.finish_enable(index, was_enabled)
    }

    /// Accelerated resize-or-create for one device.
    fn try_accelerated(&mut self, index: usize, w: u32, h: u32) -> MosaicResult<()> {
        let rec = &mut self.base.records[index];

        // Resize the active backing in place when it is already accelerated.
        if rec.kind == BackingKind::Accelerated
            && let Backing::Window { target, .. } = &mut rec.backing
        {
            return target.resize(w, h);
        }

        // A software fallback is active. Revive the kept-warm accelerated
        // handle when one exists; otherwise create fresh.
        let warm = match &mut rec.backing {
            Backing::Window {
                warm_accelerated, ..
            } => warm_accelerated.take(),
            _ => None,
        };
        let hw = match warm {
            Some(mut t) => match t.resize(w, h) {
                Ok(()) => t,
                Err(_) => {
                    // Stale warm handle; one fresh creation attempt.
                    self.factory.create_accelerated(index, w, h)?
                }
            },
            None => self.factory.create_accelerated(index, w, h)?,
        };

        // Promote: the software fallback (if any) is released here.
        let rec = &mut self.base.records[index];
        rec.backing = Backing::Window {
            target: hw,
            warm_accelerated: None,
        };
        rec.kind = BackingKind::Accelerated;
        Ok(())
    }

    /// Software resize-or-create for one device. A working accelerated
    /// backing being demoted is kept warm for later reactivation.
    fn try_software(&mut self, index: usize, w: u32, h: u32) -> MosaicResult<()> {
        let rec = &mut self.base.records[index];

        if rec.kind == BackingKind::SoftwareFallback
            && let Backing::Window { target, .. } = &mut rec.backing
        {
            return target.resize(w, h);
        }

        let sw = self.factory.create_software(index, w, h)?;
        self.stats.sw_creations += 1;

        let rec = &mut self.base.records[index];
        let warm = match std::mem::replace(&mut rec.backing, Backing::None) {
            Backing::Window {
                target,
                warm_accelerated,
            } => {
                if rec.kind == BackingKind::Accelerated {
                    Some(target)
                } else {
                    warm_accelerated
                }
            }
            _ => None,
        };
        rec.backing = Backing::Window {
            target: sw,
            warm_accelerated: warm,
        };
        rec.kind = BackingKind::SoftwareFallback;
        Ok(())
    }

    /// Collapse the whole record set to one software target covering the
    /// full virtual desktop.
    fn collapse_to_shared_software(&mut self) -> MosaicResult<()> {
        let vb = self.base.displays.virtual_bounds();
        let target = self
            .factory
            .create_software(0, vb.width() as u32, vb.height() as u32)?;
        self.stats.sw_creations += 1;
        self.stats.collapses += 1;
        debug!("collapsed to single shared software target");

        for rec in &mut self.base.records {
            rec.disable();
        }
        let rec = &mut self.base.records[0];
        rec.enabled = true;
        rec.offset = DeviceVec::new(vb.x0, vb.y0);
        rec.render_bounds = vb.translate(-vb.x0, -vb.y0);
        rec.present_bounds = rec.render_bounds;
        rec.virtual_bounds = vb;
        rec.valid_content = DeviceRect::EMPTY;
        rec.kind = BackingKind::SoftwareFallback;
        rec.backing = Backing::Window {
            target,
            warm_accelerated: None,
        };
        self.collapsed = true;

        let rec = &mut self.base.records[0];
        if let Some(target) = rec.backing_mut() {
            target.update_present_properties(&self.transparency)?;
        }
        Ok(())
    }

    /// Post-resize bookkeeping shared by both backing paths: presentation
    /// properties must be (re)applied before a newly-enabled device draws.
    fn finish_enable(&mut self, index: usize, was_enabled: bool) -> MosaicResult<()> {
        if !was_enabled
            && let Some(target) = self.base.records[index].backing_mut()
        {
            target.update_present_properties(&self.transparency)?;
        }
        Ok(())
    }
}

/// The display nearest to `target`: the one containing the window's center
/// point when any does, otherwise the one whose bounds lie closest to it.
/// Used when a window falls into the gap between display rectangles.
fn nearest_display(displays: &DisplaySet, target: DeviceRect) -> Option<usize> {
    let cx = i64::from(target.x0) + i64::from(target.width()) / 2;
    let cy = i64::from(target.y0) + i64::from(target.height()) / 2;

    if let Some(i) = displays.display_from_point(DevicePoint::new(cx as i32, cy as i32)) {
        return Some(i);
    }

    let mut best: Option<(usize, i64)> = None;
    for i in 0..displays.display_count() {
        let b = displays.display_bounds(i);
        if b.is_empty() {
            continue;
        }
        let nx = cx.clamp(i64::from(b.x0), i64::from(b.x1) - 1);
        let ny = cy.clamp(i64::from(b.y0), i64::from(b.y1) - 1);
        let d = (cx - nx) * (cx - nx) + (cy - ny) * (cy - ny);
        if best.is_none_or(|(_, bd)| d < bd) {
            best = Some((i, d));
        }
    }
    best.map(|(i, _)| i)
}
