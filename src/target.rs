//! Contracts consumed from per-device collaborators.
//!
//! The compositor never rasterizes anything itself. Every drawing call is
//! fanned out to implementations of [`DeviceTarget`] — one per physical
//! device or offscreen bitmap — and new backings are obtained through a
//! [`TargetFactory`]. The geometry/brush data model is owned by the backing
//! layer; here it appears only as opaque seams the dispatch logic forwards.

use kurbo::{Affine, Rect};

use crate::compositor::BitmapCompositor;
use crate::foundation::core::Rgba8;
use crate::foundation::error::MosaicResult;
use crate::foundation::geom::DeviceRect;

/// Shared mutable drawing state threaded through every dispatch call.
///
/// Per-device adjustments rewrite the transform translation and the clip in
/// place before each device is visited and restore them before the call
/// returns, so a caller always observes its own values afterwards.
#[derive(Clone, Debug)]
pub struct DrawContext {
    /// Caller-space transform applied to the primitive.
    pub transform: Affine,
    /// Optional axis-aligned clip in caller space. `None` means unclipped.
    pub clip: Option<Rect>,
}

impl DrawContext {
    /// Identity transform, no clip.
    pub fn new() -> Self {
        Self {
            transform: Affine::IDENTITY,
            clip: None,
        }
    }
}

impl Default for DrawContext {
    fn default() -> Self {
        Self::new()
    }
}

/// Antialiasing mode requested for a layer or 3-D scene bracket.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub enum AntialiasMode {
    /// No antialiasing.
    None,
    /// Per-primitive antialiasing.
    #[default]
    PerPrimitive,
}

/// A geometric shape to fill or stroke. Opaque to the compositor.
pub trait Shape {}

/// A stroking pen. Opaque to the compositor.
pub trait Pen {}

/// A fill or stroke brush. Opaque to the compositor.
pub trait Brush {}

/// Brush realization context. Opaque to the compositor.
pub trait BrushContext {}

/// A 3-D mesh. Opaque to the compositor.
pub trait Mesh3d {}

/// A 3-D shader. Opaque to the compositor.
pub trait Shader {}

/// A positioned glyph run. Opaque to the compositor.
pub trait GlyphRun {}

/// A video surface renderer. Opaque to the compositor.
pub trait VideoSurface {}

/// An image effect. Opaque to the compositor.
pub trait Effect {}

/// A readable bitmap handed to `draw_bitmap`/`draw_video`/`compose_effect`.
///
/// The one capability the compositor itself cares about is whether a source
/// is a multi-target bitmap produced by this same subsystem; if so, each
/// device is handed the single-device bitmap matching its own backing
/// instead of the composite.
pub trait BitmapSource {
    /// Pixel dimensions of the source.
    fn size(&self) -> (u32, u32);

    /// Downcast to a composite bitmap created by
    /// [`Compositor::create_target_bitmap`](crate::compositor::Compositor::create_target_bitmap).
    fn as_composite(&self) -> Option<&BitmapCompositor> {
        None
    }
}

/// A glyph-run draw request.
///
/// `bounds` is the run's caller-space bounding box; it is the one value the
/// compositor adjusts per device before forwarding.
#[derive(Clone, Copy)]
pub struct GlyphDraw<'a> {
    /// The positioned glyphs.
    pub run: &'a dyn GlyphRun,
    /// Foreground brush, when the backing needs one.
    pub foreground: Option<&'a dyn Brush>,
    /// Caller-space bounding box of the run.
    pub bounds: Rect,
}

/// Parameters for a 3-D scene bracket. The scene bounds travel separately so
/// they can be adjusted per device.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct Scene3dParams {
    /// Antialiasing requested for the scene.
    pub antialias: AntialiasMode,
    /// Whether a depth buffer is required.
    pub use_depth_buffer: bool,
    /// Clear value for the depth buffer when one is used.
    pub depth_clear_value: f64,
}

/// Parameters for a layer bracket. The layer bounds travel separately so
/// they can be adjusted per device.
#[derive(Clone, Copy)]
pub struct LayerParams<'a> {
    /// Antialiasing requested for the layer.
    pub antialias: AntialiasMode,
    /// Optional geometric mask.
    pub mask: Option<&'a dyn Shape>,
    /// Transform applied to the mask, when present.
    pub mask_transform: Option<Affine>,
    /// Uniform alpha applied when the layer is composed back.
    pub alpha_scale: f64,
    /// Optional alpha-mask brush.
    pub alpha_mask_brush: Option<&'a dyn Brush>,
}

/// An effect composition request.
#[derive(Clone, Copy)]
pub struct EffectParams<'a> {
    /// The effect to compose.
    pub effect: &'a dyn Effect,
    /// Optional bitmap input consumed by the effect.
    pub input: Option<&'a dyn BitmapSource>,
}

/// Presentation transparency settings for a window-attached target.
///
/// `None` in both fields presents opaquely.
#[derive(Clone, Copy, Debug, Default, PartialEq)]
pub struct PresentTransparency {
    /// Constant alpha applied to the whole window at present time.
    pub constant_alpha: Option<f32>,
    /// Color treated as fully transparent at present time.
    pub color_key: Option<Rgba8>,
}

/// Intended use of a secondary bitmap target. Forwarded to backings
/// verbatim.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum TargetUsage {
    /// General intermediate surface drawn and later consumed as a bitmap.
    #[default]
    Intermediate,
    /// Surface consumed as a texture source inside a 3-D scene.
    Texture3d,
}

/// Backing-specific creation flags. Opaque to the compositor and forwarded
/// verbatim.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct TargetFlags(pub u32);

/// Compatibility class of a backing, used to decide when two devices can
/// legally share one bitmap realization.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum CompatClass {
    /// A specific accelerated backend; equal tokens mean the same backend
    /// instance.
    Accelerated(u64),
    /// Any software rasterizer. All software backings are compatible.
    Software,
}

/// The per-device backing contract.
///
/// Implementations rasterize into one device's backing store using
/// device-local coordinates; the compositor has already folded the device
/// offset into the [`DrawContext`] and any bounds it forwards.
pub trait DeviceTarget {
    /// Current backing dimensions in pixels.
    fn size(&self) -> (u32, u32);

    /// Resize the backing store.
    fn resize(&mut self, width: u32, height: u32) -> MosaicResult<()>;

    /// Compatibility class for bitmap-sharing decisions.
    fn compat_class(&self) -> CompatClass;

    /// Clear the target, honoring `ctx.clip` when present.
    fn clear(&mut self, ctx: &DrawContext, color: Option<Rgba8>) -> MosaicResult<()>;

    /// Open a 3-D scene bracket over `bounds` (device-local).
    fn begin_scene_3d(&mut self, bounds: Rect, params: &Scene3dParams) -> MosaicResult<()>;

    /// Close the current 3-D scene bracket.
    fn end_scene_3d(&mut self) -> MosaicResult<()>;

    /// Draw a bitmap source.
    fn draw_bitmap(
        &mut self,
        ctx: &DrawContext,
        source: &dyn BitmapSource,
        effect: Option<&dyn Effect>,
    ) -> MosaicResult<()>;

    /// Draw a 3-D mesh.
    fn draw_mesh_3d(
        &mut self,
        ctx: &DrawContext,
        brush_context: Option<&dyn BrushContext>,
        mesh: &dyn Mesh3d,
        shader: Option<&dyn Shader>,
        effect: Option<&dyn Effect>,
    ) -> MosaicResult<()>;

    /// Fill and/or stroke a shape.
    fn draw_path(
        &mut self,
        ctx: &DrawContext,
        brush_context: Option<&dyn BrushContext>,
        shape: &dyn Shape,
        pen: Option<&dyn Pen>,
        stroke_brush: Option<&dyn Brush>,
        fill_brush: Option<&dyn Brush>,
    ) -> MosaicResult<()>;

    /// Draw a glyph run. `glyphs.bounds` is device-local.
    fn draw_glyph_run(&mut self, ctx: &DrawContext, glyphs: &GlyphDraw<'_>) -> MosaicResult<()>;

    /// Draw a video frame from a surface renderer and/or bitmap source.
    fn draw_video(
        &mut self,
        ctx: &DrawContext,
        surface: Option<&dyn VideoSurface>,
        source: Option<&dyn BitmapSource>,
        effect: Option<&dyn Effect>,
    ) -> MosaicResult<()>;

    /// Compose an effect into the target.
    fn compose_effect(&mut self, ctx: &DrawContext, params: &EffectParams<'_>) -> MosaicResult<()>;

    /// Open a layer bracket over `bounds` (device-local).
    fn begin_layer(&mut self, bounds: Rect, params: &LayerParams<'_>) -> MosaicResult<()>;

    /// Close the innermost layer bracket.
    fn end_layer(&mut self) -> MosaicResult<()>;

    /// Abandon every open layer bracket without composing.
    fn end_and_ignore_all_layers(&mut self);

    /// Create a same-backend offscreen bitmap target.
    fn create_target_bitmap(
        &mut self,
        width: u32,
        height: u32,
        usage: TargetUsage,
        flags: TargetFlags,
    ) -> MosaicResult<Box<dyn BitmapTarget>>;

    /// Flush `local_rect` to the screen. Only window-attached backings
    /// present; offscreen backings keep the default no-op.
    fn present(&mut self, _local_rect: DeviceRect) -> MosaicResult<()> {
        Ok(())
    }

    /// Apply presentation transparency settings. Only meaningful for
    /// window-attached backings.
    fn update_present_properties(
        &mut self,
        _transparency: &PresentTransparency,
    ) -> MosaicResult<()> {
        Ok(())
    }
}

/// An offscreen bitmap target: drawable like any [`DeviceTarget`] and
/// readable back as a [`BitmapSource`].
pub trait BitmapTarget: DeviceTarget {
    /// The readable face of this bitmap.
    fn as_source(&self) -> &dyn BitmapSource;
}

/// Creates per-device backings during initialization and fallback.
///
/// `display` is the index into the compositor's
/// [`DisplaySet`](crate::topology::DisplaySet).
pub trait TargetFactory {
    /// Create an accelerated backing for one display.
    fn create_accelerated(
        &mut self,
        display: usize,
        width: u32,
        height: u32,
    ) -> MosaicResult<Box<dyn DeviceTarget>>;

    /// Create a software backing for one display.
    fn create_software(
        &mut self,
        display: usize,
        width: u32,
        height: u32,
    ) -> MosaicResult<Box<dyn DeviceTarget>>;
}
