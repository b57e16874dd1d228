//! Hand-rolled fake collaborators for integration tests: recording device
//! targets, a failure-injecting factory, and display-set builders.
#![allow(dead_code)]

use std::cell::{Cell, RefCell};
use std::rc::Rc;
use std::sync::Arc;

use mosaic::{
    BitmapSource, BitmapTarget, CompatClass, CompositorOpts, DeviceRect, DeviceTarget,
    DisplayDesc, DisplaySet, DrawContext, EffectParams, GlyphDraw, LayerParams, MosaicError,
    MosaicResult, PresentTransparency, Rect, Scene3dParams, TargetFactory, TargetFlags,
    TargetUsage, WindowCompositor,
};

/// Everything a fake did, in call order.
#[derive(Clone, Debug, PartialEq)]
pub enum Event {
    Created {
        id: u32,
        display: usize,
        accelerated: bool,
        w: u32,
        h: u32,
    },
    Resized {
        id: u32,
        w: u32,
        h: u32,
    },
    Cleared {
        id: u32,
        clip: Option<Rect>,
    },
    PathDrawn {
        id: u32,
        translation: (f64, f64),
        clip: Option<Rect>,
    },
    BitmapDrawn {
        id: u32,
        source_size: (u32, u32),
        source_is_composite: bool,
    },
    MeshDrawn {
        id: u32,
    },
    GlyphsDrawn {
        id: u32,
        bounds: Rect,
    },
    VideoDrawn {
        id: u32,
    },
    EffectComposed {
        id: u32,
        input_is_composite: Option<bool>,
    },
    SceneBegun {
        id: u32,
        bounds: Rect,
    },
    SceneEnded {
        id: u32,
    },
    LayerBegun {
        id: u32,
        bounds: Rect,
    },
    LayerEnded {
        id: u32,
    },
    LayersAbandoned {
        id: u32,
    },
    BitmapTargetCreated {
        id: u32,
        from: u32,
        w: u32,
        h: u32,
    },
    Presented {
        id: u32,
        rect: DeviceRect,
    },
    PropsApplied {
        id: u32,
    },
}

/// How an injected failure should surface.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum FailKind {
    DisplayChanged,
    WrongSize,
    Device,
}

impl FailKind {
    fn to_error(self) -> MosaicError {
        match self {
            Self::DisplayChanged => MosaicError::DisplayChanged,
            Self::WrongSize => MosaicError::WrongSize,
            Self::Device => MosaicError::device("injected failure"),
        }
    }
}

/// State shared between the factory, every target it creates, and the test.
#[derive(Default)]
pub struct Shared {
    pub events: RefCell<Vec<Event>>,
    next_id: Cell<u32>,
    /// Refuse accelerated creations.
    pub fail_hw_create: Cell<bool>,
    /// Fail resizes of accelerated targets.
    pub fail_hw_resize: Cell<bool>,
    /// Refuse software creations.
    pub fail_sw_create: Cell<bool>,
    /// Fail begin_scene_3d/begin_layer on this target id.
    pub fail_begin_on: Cell<Option<u32>>,
    /// Fail draw calls on this target id.
    pub fail_draw_on: Cell<Option<u32>>,
    /// Per-target-id present failures (persistent until cleared).
    pub present_fail: RefCell<Vec<(u32, FailKind)>>,
    /// Give every accelerated target this compat token...
    pub hw_compat: Cell<u64>,
    /// ...unless set, in which case each gets its own.
    pub distinct_hw_compat: Cell<bool>,
}

impl Shared {
    pub fn new() -> Rc<Self> {
        Rc::new(Self::default())
    }

    fn alloc_id(&self) -> u32 {
        let id = self.next_id.get();
        self.next_id.set(id + 1);
        id
    }

    fn push(&self, e: Event) {
        self.events.borrow_mut().push(e);
    }

    pub fn events(&self) -> Vec<Event> {
        self.events.borrow().clone()
    }

    pub fn clear_events(&self) {
        self.events.borrow_mut().clear();
    }

    fn present_failure_for(&self, id: u32) -> Option<FailKind> {
        self.present_fail
            .borrow()
            .iter()
            .find(|(t, _)| *t == id)
            .map(|(_, k)| *k)
    }
}

/// A recording in-memory backing target.
pub struct FakeTarget {
    pub id: u32,
    accelerated: bool,
    size: Cell<(u32, u32)>,
    compat: CompatClass,
    shared: Rc<Shared>,
}

impl FakeTarget {
    fn draw_failure(&self) -> MosaicResult<()> {
        if self.shared.fail_draw_on.get() == Some(self.id) {
            return Err(MosaicError::device("injected draw failure"));
        }
        Ok(())
    }
}

impl DeviceTarget for FakeTarget {
    fn size(&self) -> (u32, u32) {
        self.size.get()
    }

    fn resize(&mut self, width: u32, height: u32) -> MosaicResult<()> {
        if self.accelerated && self.shared.fail_hw_resize.get() {
            return Err(MosaicError::device("injected hw resize failure"));
        }
        self.size.set((width, height));
        self.shared.push(Event::Resized {
            id: self.id,
            w: width,
            h: height,
        });
        Ok(())
    }

    fn compat_class(&self) -> CompatClass {
        self.compat
    }

    fn clear(&mut self, ctx: &DrawContext, _color: Option<mosaic::Rgba8>) -> MosaicResult<()> {
        self.draw_failure()?;
        self.shared.push(Event::Cleared {
            id: self.id,
            clip: ctx.clip,
        });
        Ok(())
    }

    fn begin_scene_3d(&mut self, bounds: Rect, _params: &Scene3dParams) -> MosaicResult<()> {
        if self.shared.fail_begin_on.get() == Some(self.id) {
            return Err(MosaicError::device("injected begin failure"));
        }
        self.shared.push(Event::SceneBegun {
            id: self.id,
            bounds,
        });
        Ok(())
    }

    fn end_scene_3d(&mut self) -> MosaicResult<()> {
        self.shared.push(Event::SceneEnded { id: self.id });
        Ok(())
    }

    fn draw_bitmap(
        &mut self,
        _ctx: &DrawContext,
        source: &dyn BitmapSource,
        _effect: Option<&dyn mosaic::target::Effect>,
    ) -> MosaicResult<()> {
        self.draw_failure()?;
        self.shared.push(Event::BitmapDrawn {
            id: self.id,
            source_size: source.size(),
            source_is_composite: source.as_composite().is_some(),
        });
        Ok(())
    }

    fn draw_mesh_3d(
        &mut self,
        _ctx: &DrawContext,
        _brush_context: Option<&dyn mosaic::target::BrushContext>,
        _mesh: &dyn mosaic::target::Mesh3d,
        _shader: Option<&dyn mosaic::target::Shader>,
        _effect: Option<&dyn mosaic::target::Effect>,
    ) -> MosaicResult<()> {
        self.draw_failure()?;
        self.shared.push(Event::MeshDrawn { id: self.id });
        Ok(())
    }

    fn draw_path(
        &mut self,
        ctx: &DrawContext,
        _brush_context: Option<&dyn mosaic::target::BrushContext>,
        _shape: &dyn mosaic::target::Shape,
        _pen: Option<&dyn mosaic::target::Pen>,
        _stroke_brush: Option<&dyn mosaic::target::Brush>,
        _fill_brush: Option<&dyn mosaic::target::Brush>,
    ) -> MosaicResult<()> {
        self.draw_failure()?;
        let t = ctx.transform.translation();
        self.shared.push(Event::PathDrawn {
            id: self.id,
            translation: (t.x, t.y),
            clip: ctx.clip,
        });
        Ok(())
    }

    fn draw_glyph_run(&mut self, _ctx: &DrawContext, glyphs: &GlyphDraw<'_>) -> MosaicResult<()> {
        self.draw_failure()?;
        self.shared.push(Event::GlyphsDrawn {
            id: self.id,
            bounds: glyphs.bounds,
        });
        Ok(())
    }

    fn draw_video(
        &mut self,
        _ctx: &DrawContext,
        _surface: Option<&dyn mosaic::target::VideoSurface>,
        _source: Option<&dyn BitmapSource>,
        _effect: Option<&dyn mosaic::target::Effect>,
    ) -> MosaicResult<()> {
        self.draw_failure()?;
        self.shared.push(Event::VideoDrawn { id: self.id });
        Ok(())
    }

    fn compose_effect(&mut self, _ctx: &DrawContext, params: &EffectParams<'_>) -> MosaicResult<()> {
        self.draw_failure()?;
        self.shared.push(Event::EffectComposed {
            id: self.id,
            input_is_composite: params.input.map(|s| s.as_composite().is_some()),
        });
        Ok(())
    }

    fn begin_layer(&mut self, bounds: Rect, _params: &LayerParams<'_>) -> MosaicResult<()> {
        if self.shared.fail_begin_on.get() == Some(self.id) {
            return Err(MosaicError::device("injected begin failure"));
        }
        self.shared.push(Event::LayerBegun {
            id: self.id,
            bounds,
        });
        Ok(())
    }

    fn end_layer(&mut self) -> MosaicResult<()> {
        self.shared.push(Event::LayerEnded { id: self.id });
        Ok(())
    }

    fn end_and_ignore_all_layers(&mut self) {
        self.shared.push(Event::LayersAbandoned { id: self.id });
    }

    fn create_target_bitmap(
        &mut self,
        width: u32,
        height: u32,
        _usage: TargetUsage,
        _flags: TargetFlags,
    ) -> MosaicResult<Box<dyn BitmapTarget>> {
        let id = self.shared.alloc_id();
        self.shared.push(Event::BitmapTargetCreated {
            id,
            from: self.id,
            w: width,
            h: height,
        });
        Ok(Box::new(FakeBitmapTarget {
            inner: FakeTarget {
                id,
                accelerated: self.accelerated,
                size: Cell::new((width, height)),
                compat: self.compat,
                shared: Rc::clone(&self.shared),
            },
            source: FakeBitmap {
                size: (width, height),
            },
        }))
    }

    fn present(&mut self, local_rect: DeviceRect) -> MosaicResult<()> {
        if let Some(kind) = self.shared.present_failure_for(self.id) {
            return Err(kind.to_error());
        }
        self.shared.push(Event::Presented {
            id: self.id,
            rect: local_rect,
        });
        Ok(())
    }

    fn update_present_properties(
        &mut self,
        _transparency: &PresentTransparency,
    ) -> MosaicResult<()> {
        self.shared.push(Event::PropsApplied { id: self.id });
        Ok(())
    }
}

/// A plain readable bitmap.
pub struct FakeBitmap {
    pub size: (u32, u32),
}

impl BitmapSource for FakeBitmap {
    fn size(&self) -> (u32, u32) {
        self.size
    }
}

/// Offscreen bitmap target produced by [`FakeTarget::create_target_bitmap`].
pub struct FakeBitmapTarget {
    inner: FakeTarget,
    source: FakeBitmap,
}

impl DeviceTarget for FakeBitmapTarget {
    fn size(&self) -> (u32, u32) {
        self.inner.size()
    }

    fn resize(&mut self, width: u32, height: u32) -> MosaicResult<()> {
        self.inner.resize(width, height)
    }

    fn compat_class(&self) -> CompatClass {
        self.inner.compat_class()
    }

    fn clear(&mut self, ctx: &DrawContext, color: Option<mosaic::Rgba8>) -> MosaicResult<()> {
        self.inner.clear(ctx, color)
    }

    fn begin_scene_3d(&mut self, bounds: Rect, params: &Scene3dParams) -> MosaicResult<()> {
        self.inner.begin_scene_3d(bounds, params)
    }

    fn end_scene_3d(&mut self) -> MosaicResult<()> {
        self.inner.end_scene_3d()
    }

    fn draw_bitmap(
        &mut self,
        ctx: &DrawContext,
        source: &dyn BitmapSource,
        effect: Option<&dyn mosaic::target::Effect>,
    ) -> MosaicResult<()> {
        self.inner.draw_bitmap(ctx, source, effect)
    }

    fn draw_mesh_3d(
        &mut self,
        ctx: &DrawContext,
        brush_context: Option<&dyn mosaic::target::BrushContext>,
        mesh: &dyn mosaic::target::Mesh3d,
        shader: Option<&dyn mosaic::target::Shader>,
        effect: Option<&dyn mosaic::target::Effect>,
    ) -> MosaicResult<()> {
        self.inner.draw_mesh_3d(ctx, brush_context, mesh, shader, effect)
    }

    fn draw_path(
        &mut self,
        ctx: &DrawContext,
        brush_context: Option<&dyn mosaic::target::BrushContext>,
        shape: &dyn mosaic::target::Shape,
        pen: Option<&dyn mosaic::target::Pen>,
        stroke_brush: Option<&dyn mosaic::target::Brush>,
        fill_brush: Option<&dyn mosaic::target::Brush>,
    ) -> MosaicResult<()> {
        self.inner
            .draw_path(ctx, brush_context, shape, pen, stroke_brush, fill_brush)
    }

    fn draw_glyph_run(&mut self, ctx: &DrawContext, glyphs: &GlyphDraw<'_>) -> MosaicResult<()> {
        self.inner.draw_glyph_run(ctx, glyphs)
    }

    fn draw_video(
        &mut self,
        ctx: &DrawContext,
        surface: Option<&dyn mosaic::target::VideoSurface>,
        source: Option<&dyn BitmapSource>,
        effect: Option<&dyn mosaic::target::Effect>,
    ) -> MosaicResult<()> {
        self.inner.draw_video(ctx, surface, source, effect)
    }

    fn compose_effect(&mut self, ctx: &DrawContext, params: &EffectParams<'_>) -> MosaicResult<()> {
        self.inner.compose_effect(ctx, params)
    }

    fn begin_layer(&mut self, bounds: Rect, params: &LayerParams<'_>) -> MosaicResult<()> {
        self.inner.begin_layer(bounds, params)
    }

    fn end_layer(&mut self) -> MosaicResult<()> {
        self.inner.end_layer()
    }

    fn end_and_ignore_all_layers(&mut self) {
        self.inner.end_and_ignore_all_layers()
    }

    fn create_target_bitmap(
        &mut self,
        _width: u32,
        _height: u32,
        _usage: TargetUsage,
        _flags: TargetFlags,
    ) -> MosaicResult<Box<dyn BitmapTarget>> {
        Err(MosaicError::validation(
            "fake bitmap targets do not nest",
        ))
    }
}

impl BitmapTarget for FakeBitmapTarget {
    fn as_source(&self) -> &dyn BitmapSource {
        &self.source
    }
}

/// Factory creating [`FakeTarget`]s, with failure injection through the
/// shared state.
pub struct FakeFactory {
    pub shared: Rc<Shared>,
}

impl TargetFactory for FakeFactory {
    fn create_accelerated(
        &mut self,
        display: usize,
        width: u32,
        height: u32,
    ) -> MosaicResult<Box<dyn DeviceTarget>> {
        if self.shared.fail_hw_create.get() {
            return Err(MosaicError::device("injected hw create failure"));
        }
        let id = self.shared.alloc_id();
        self.shared.push(Event::Created {
            id,
            display,
            accelerated: true,
            w: width,
            h: height,
        });
        let token = if self.shared.distinct_hw_compat.get() {
            u64::from(id)
        } else {
            self.shared.hw_compat.get()
        };
        Ok(Box::new(FakeTarget {
            id,
            accelerated: true,
            size: Cell::new((width, height)),
            compat: CompatClass::Accelerated(token),
            shared: Rc::clone(&self.shared),
        }))
    }

    fn create_software(
        &mut self,
        display: usize,
        width: u32,
        height: u32,
    ) -> MosaicResult<Box<dyn DeviceTarget>> {
        if self.shared.fail_sw_create.get() {
            return Err(MosaicError::device("injected sw create failure"));
        }
        let id = self.shared.alloc_id();
        self.shared.push(Event::Created {
            id,
            display,
            accelerated: false,
            w: width,
            h: height,
        });
        Ok(Box::new(FakeTarget {
            id,
            accelerated: false,
            size: Cell::new((width, height)),
            compat: CompatClass::Software,
            shared: Rc::clone(&self.shared),
        }))
    }
}

/// Opaque drawing-parameter stand-ins.
pub struct TestShape;
impl mosaic::target::Shape for TestShape {}

pub struct TestBrush;
impl mosaic::target::Brush for TestBrush {}

pub struct TestMesh;
impl mosaic::target::Mesh3d for TestMesh {}

pub struct TestGlyphRun;
impl mosaic::target::GlyphRun for TestGlyphRun {}

pub struct TestEffect;
impl mosaic::target::Effect for TestEffect {}

/// A display set from plain bounds rectangles.
pub fn display_set(bounds: &[DeviceRect]) -> Arc<DisplaySet> {
    DisplaySet::new(bounds.iter().map(|&b| DisplayDesc { bounds: b }).collect())
}

/// A window compositor over fake targets plus the shared recorder.
pub fn window_rig(
    bounds: &[DeviceRect],
    opts: CompositorOpts,
) -> (WindowCompositor, Rc<Shared>) {
    let shared = Shared::new();
    let factory = FakeFactory {
        shared: Rc::clone(&shared),
    };
    let comp = WindowCompositor::new(display_set(bounds), Box::new(factory), opts)
        .expect("opts are valid");
    (comp, shared)
}
