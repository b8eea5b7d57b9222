//! Last-applied driver state and the state requested for the next draw.
//!
//! [`DrawStateSnapshot`] mirrors what the driver currently has bound. Every
//! field is optional: `None` means "unknown", so the next `apply_*` call for
//! that field always reaches the driver. The snapshot is only written next to
//! the driver call that makes it true.

use gl::types::{GLenum, GLuint};
use gl_driver::GlDriver;
use gpu_core::{
    rgba8_to_f32, BlendFunc, BlendOp, BlendState, ColorWriteMask, CullMode, DepthFunc, DepthState,
    FramebufferId, PipelineId, RasterizationState, Rect, SamplerId, TextureBufferId, TextureId,
    MAX_TEXTURE_SAMPLERS,
};

/// Texture unit used for uploads, outside the range pipelines sample from.
pub const UPDATE_TEXTURE_UNIT: u32 = MAX_TEXTURE_SAMPLERS as u32;

/// Sampling slots plus the update unit.
pub const TRACKED_TEXTURE_UNITS: usize = MAX_TEXTURE_SAMPLERS + 1;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RasterizationSnapshot {
    pub cull_enabled: Option<bool>,
    pub cull_face: Option<GLenum>,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct DepthSnapshot {
    pub test_enabled: Option<bool>,
    pub func: Option<GLenum>,
    pub write: Option<bool>,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct BlendSnapshot {
    pub enabled: Option<bool>,
    /// src rgb, dst rgb, src alpha, dst alpha
    pub factors: Option<[GLenum; 4]>,
    /// rgb, alpha
    pub equations: Option<[GLenum; 2]>,
    pub constant: Option<u32>,
    pub write_mask: Option<ColorWriteMask>,
}

/// What one texture unit has bound.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct UnitBinding {
    /// Target and name of the last texture bound on this unit.
    pub texture: Option<(GLenum, GLuint)>,
    pub sampler: Option<GLuint>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DrawStateSnapshot {
    /// Pipeline whose program, vertex array and fixed-function state were
    /// applied last. Lets a draw with the same pipeline skip those checks.
    pub pipeline: Option<PipelineId>,
    pub program: Option<GLuint>,
    pub vertex_array: Option<GLuint>,
    pub rasterization: RasterizationSnapshot,
    pub depth: DepthSnapshot,
    pub blend: BlendSnapshot,
    /// Bound draw framebuffer, 0 for the window.
    pub framebuffer: Option<GLuint>,
    pub viewport: Option<Rect>,
    pub scissor: Option<Rect>,
    pub scissor_test: Option<bool>,
    pub units: [UnitBinding; TRACKED_TEXTURE_UNITS],
    pub active_unit: Option<u32>,
}

fn set_if_changed<T: PartialEq + Copy>(slot: &mut Option<T>, value: T) -> bool {
    if *slot == Some(value) {
        false
    } else {
        *slot = Some(value);
        true
    }
}

fn toggle<D: GlDriver>(driver: &mut D, cap: GLenum, enabled: bool) {
    if enabled {
        driver.enable(cap);
    } else {
        driver.disable(cap);
    }
}

impl DrawStateSnapshot {
    /// Everything unknown.
    pub fn new() -> Self {
        Self::default()
    }

    /// Forget all driver state, e.g. after the context or surface changed.
    pub fn invalidate(&mut self) {
        *self = Self::default();
    }

    pub fn apply_program<D: GlDriver>(&mut self, driver: &mut D, program: GLuint) {
        if set_if_changed(&mut self.program, program) {
            driver.use_program(program);
        }
    }

    pub fn apply_vertex_array<D: GlDriver>(&mut self, driver: &mut D, vao: GLuint) {
        if set_if_changed(&mut self.vertex_array, vao) {
            driver.bind_vertex_array(vao);
        }
    }

    pub fn apply_rasterization_state<D: GlDriver>(
        &mut self,
        driver: &mut D,
        state: &RasterizationState,
    ) {
        let cull = state.cull_mode != CullMode::None;
        if set_if_changed(&mut self.rasterization.cull_enabled, cull) {
            toggle(driver, gl::CULL_FACE, cull);
        }
        if cull {
            let face = gl_cull_face(state.cull_mode);
            if set_if_changed(&mut self.rasterization.cull_face, face) {
                driver.cull_face(face);
            }
        }
    }

    pub fn apply_depth_state<D: GlDriver>(&mut self, driver: &mut D, state: &DepthState) {
        let test = state.test_enabled();
        if set_if_changed(&mut self.depth.test_enabled, test) {
            toggle(driver, gl::DEPTH_TEST, test);
        }
        if !test {
            return;
        }

        let func = gl_depth_func(state.func);
        if set_if_changed(&mut self.depth.func, func) {
            driver.depth_func(func);
        }
        if set_if_changed(&mut self.depth.write, state.write) {
            driver.depth_mask(state.write);
        }
    }

    pub fn apply_blend_state<D: GlDriver>(&mut self, driver: &mut D, state: &BlendState) {
        if set_if_changed(&mut self.blend.enabled, state.enable) {
            toggle(driver, gl::BLEND, state.enable);
        }

        if state.enable {
            let factors = [
                gl_blend_func(state.src_blend),
                gl_blend_func(state.dst_blend),
                gl_blend_func(state.src_alpha_blend),
                gl_blend_func(state.dst_alpha_blend),
            ];
            if set_if_changed(&mut self.blend.factors, factors) {
                driver.blend_func_separate(factors[0], factors[1], factors[2], factors[3]);
            }

            let equations = [gl_blend_op(state.blend_op), gl_blend_op(state.alpha_blend_op)];
            if set_if_changed(&mut self.blend.equations, equations) {
                driver.blend_equation_separate(equations[0], equations[1]);
            }

            if set_if_changed(&mut self.blend.constant, state.constant) {
                driver.blend_color(rgba8_to_f32(state.constant));
            }
        }

        self.apply_color_mask(driver, state.write_mask);
    }

    fn apply_color_mask<D: GlDriver>(&mut self, driver: &mut D, mask: ColorWriteMask) -> bool {
        if !set_if_changed(&mut self.blend.write_mask, mask) {
            return false;
        }
        driver.color_mask(
            mask.contains(ColorWriteMask::RED),
            mask.contains(ColorWriteMask::GREEN),
            mask.contains(ColorWriteMask::BLUE),
            mask.contains(ColorWriteMask::ALPHA),
        );
        true
    }

    /// Set the color mask outside of a pipeline, e.g. for a clear. The next
    /// draw re-applies its pipeline's state in full.
    pub fn force_color_write_mask<D: GlDriver>(&mut self, driver: &mut D, mask: ColorWriteMask) {
        if self.apply_color_mask(driver, mask) {
            self.pipeline = None;
        }
    }

    /// Set the depth mask outside of a pipeline.
    pub fn force_depth_write<D: GlDriver>(&mut self, driver: &mut D, write: bool) {
        if set_if_changed(&mut self.depth.write, write) {
            driver.depth_mask(write);
            self.pipeline = None;
        }
    }

    pub fn apply_framebuffer<D: GlDriver>(&mut self, driver: &mut D, framebuffer: GLuint) {
        if set_if_changed(&mut self.framebuffer, framebuffer) {
            driver.bind_framebuffer(gl::DRAW_FRAMEBUFFER, framebuffer);
        }
    }

    pub fn apply_viewport<D: GlDriver>(&mut self, driver: &mut D, rect: Rect) {
        if set_if_changed(&mut self.viewport, rect) {
            driver.viewport(rect.x, rect.y, rect.width as i32, rect.height as i32);
        }
    }

    pub fn apply_scissor<D: GlDriver>(&mut self, driver: &mut D, rect: Rect) {
        if set_if_changed(&mut self.scissor, rect) {
            driver.scissor(rect.x, rect.y, rect.width as i32, rect.height as i32);
        }
    }

    pub fn apply_scissor_test<D: GlDriver>(&mut self, driver: &mut D, enabled: bool) {
        if set_if_changed(&mut self.scissor_test, enabled) {
            toggle(driver, gl::SCISSOR_TEST, enabled);
        }
    }

    pub fn apply_active_unit<D: GlDriver>(&mut self, driver: &mut D, unit: u32) {
        if set_if_changed(&mut self.active_unit, unit) {
            driver.active_texture(unit);
        }
    }

    pub fn apply_texture<D: GlDriver>(
        &mut self,
        driver: &mut D,
        unit: u32,
        target: GLenum,
        texture: GLuint,
    ) {
        let Some(binding) = self.units.get(unit as usize) else {
            return;
        };
        if binding.texture == Some((target, texture)) {
            return;
        }
        self.apply_active_unit(driver, unit);
        driver.bind_texture(target, texture);
        self.units[unit as usize].texture = Some((target, texture));
    }

    pub fn apply_sampler<D: GlDriver>(&mut self, driver: &mut D, unit: u32, sampler: GLuint) {
        let Some(binding) = self.units.get_mut(unit as usize) else {
            return;
        };
        if set_if_changed(&mut binding.sampler, sampler) {
            driver.bind_sampler(unit, sampler);
        }
    }

    // ---- Unbind notifications ----
    //
    // Called before the driver object is deleted so no field keeps a name
    // the driver may hand out again.

    pub fn unbind_pipeline(&mut self, pipeline: PipelineId) {
        if self.pipeline == Some(pipeline) {
            self.pipeline = None;
        }
    }

    pub fn unbind_program<D: GlDriver>(&mut self, driver: &mut D, program: GLuint) {
        if self.program == Some(program) {
            driver.use_program(0);
            self.program = Some(0);
            self.pipeline = None;
        }
    }

    pub fn unbind_vertex_array<D: GlDriver>(&mut self, driver: &mut D, vao: GLuint) {
        if self.vertex_array == Some(vao) {
            driver.bind_vertex_array(0);
            self.vertex_array = Some(0);
            self.pipeline = None;
        }
    }

    pub fn unbind_framebuffer<D: GlDriver>(&mut self, driver: &mut D, framebuffer: GLuint) {
        if self.framebuffer == Some(framebuffer) {
            driver.bind_framebuffer(gl::DRAW_FRAMEBUFFER, 0);
            self.framebuffer = Some(0);
        }
    }

    pub fn unbind_texture<D: GlDriver>(&mut self, driver: &mut D, texture: GLuint) {
        for unit in 0..TRACKED_TEXTURE_UNITS as u32 {
            if let Some((target, bound)) = self.units[unit as usize].texture {
                if bound == texture {
                    self.apply_active_unit(driver, unit);
                    driver.bind_texture(target, 0);
                    self.units[unit as usize].texture = Some((target, 0));
                }
            }
        }
    }

    pub fn unbind_sampler<D: GlDriver>(&mut self, driver: &mut D, sampler: GLuint) {
        for (unit, binding) in self.units.iter_mut().enumerate() {
            if binding.sampler == Some(sampler) {
                driver.bind_sampler(unit as u32, 0);
                binding.sampler = Some(0);
            }
        }
    }

    /// Units that currently have `texture` bound.
    pub fn units_with_texture(&self, texture: GLuint) -> impl Iterator<Item = u32> + '_ {
        self.units
            .iter()
            .enumerate()
            .filter(move |(_, b)| matches!(b.texture, Some((_, t)) if t == texture))
            .map(|(unit, _)| unit as u32)
    }
}

/// Resource requested for a sampling slot.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum SlotResource {
    #[default]
    None,
    Texture(TextureId),
    TextureBuffer(TextureBufferId),
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct PendingSlot {
    pub resource: SlotResource,
    pub sampler: Option<SamplerId>,
}

/// Bindings requested through the `set_*` calls since the last draw.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PendingState {
    pub pipeline: Option<PipelineId>,
    /// `None` draws to the window.
    pub framebuffer: Option<FramebufferId>,
    pub slots: [PendingSlot; MAX_TEXTURE_SAMPLERS],
    pub viewport: Rect,
    pub scissor: Rect,
}

impl PendingState {
    pub fn clear_pipeline(&mut self, pipeline: PipelineId) {
        if self.pipeline == Some(pipeline) {
            self.pipeline = None;
        }
    }

    pub fn clear_framebuffer(&mut self, framebuffer: FramebufferId) {
        if self.framebuffer == Some(framebuffer) {
            self.framebuffer = None;
        }
    }

    pub fn clear_texture(&mut self, texture: TextureId) {
        for slot in &mut self.slots {
            if slot.resource == SlotResource::Texture(texture) {
                slot.resource = SlotResource::None;
            }
        }
    }

    pub fn clear_texture_buffer(&mut self, buffer: TextureBufferId) {
        for slot in &mut self.slots {
            if slot.resource == SlotResource::TextureBuffer(buffer) {
                slot.resource = SlotResource::None;
            }
        }
    }

    pub fn clear_sampler(&mut self, sampler: SamplerId) {
        for slot in &mut self.slots {
            if slot.sampler == Some(sampler) {
                slot.sampler = None;
            }
        }
    }
}

pub(crate) fn gl_cull_face(mode: CullMode) -> GLenum {
    match mode {
        CullMode::Front => gl::FRONT,
        CullMode::None | CullMode::Back => gl::BACK,
    }
}

pub(crate) fn gl_depth_func(func: DepthFunc) -> GLenum {
    match func {
        DepthFunc::Never => gl::NEVER,
        DepthFunc::Always => gl::ALWAYS,
        DepthFunc::Less => gl::LESS,
        DepthFunc::LessEqual => gl::LEQUAL,
        DepthFunc::Greater => gl::GREATER,
        DepthFunc::GreaterEqual => gl::GEQUAL,
        DepthFunc::Equal => gl::EQUAL,
    }
}

pub(crate) fn gl_blend_func(func: BlendFunc) -> GLenum {
    match func {
        BlendFunc::Zero => gl::ZERO,
        BlendFunc::One => gl::ONE,
        BlendFunc::SrcColor => gl::SRC_COLOR,
        BlendFunc::InvSrcColor => gl::ONE_MINUS_SRC_COLOR,
        BlendFunc::DstColor => gl::DST_COLOR,
        BlendFunc::InvDstColor => gl::ONE_MINUS_DST_COLOR,
        BlendFunc::SrcAlpha => gl::SRC_ALPHA,
        BlendFunc::InvSrcAlpha => gl::ONE_MINUS_SRC_ALPHA,
        BlendFunc::SrcAlpha1 => gl::SRC1_ALPHA,
        BlendFunc::InvSrcAlpha1 => gl::ONE_MINUS_SRC1_ALPHA,
        BlendFunc::DstAlpha => gl::DST_ALPHA,
        BlendFunc::InvDstAlpha => gl::ONE_MINUS_DST_ALPHA,
        BlendFunc::ConstantColor => gl::CONSTANT_COLOR,
        BlendFunc::InvConstantColor => gl::ONE_MINUS_CONSTANT_COLOR,
    }
}

pub(crate) fn gl_blend_op(op: BlendOp) -> GLenum {
    match op {
        BlendOp::Add => gl::FUNC_ADD,
        BlendOp::Subtract => gl::FUNC_SUBTRACT,
        BlendOp::ReverseSubtract => gl::FUNC_REVERSE_SUBTRACT,
        BlendOp::Min => gl::MIN,
        BlendOp::Max => gl::MAX,
    }
}
