//! Headless driver that records every call.
//!
//! [`RecordingDriver`] hands out object names, backs buffers with real memory
//! so mappings can be written, and simulates fences and timer queries whose
//! completion the caller controls. Nothing is rendered. Together with
//! [`HeadlessContext`] it runs the whole device without a GPU, which is how
//! the device is tested.

use std::collections::{BTreeMap, HashMap, HashSet};

use anyhow::{bail, Result};
use gl::types::{GLbitfield, GLenum, GLint, GLsizei, GLuint};

use crate::context::GlContext;
use crate::driver::{GlDriver, PixelSource, SyncHandle, SyncWait};

/// Kind of driver object a name belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ObjectKind {
    Shader,
    Program,
    VertexArray,
    Buffer,
    Texture,
    Sampler,
    Framebuffer,
    Query,
}

/// One recorded driver call. Pure queries are not recorded.
#[derive(Debug, Clone, PartialEq)]
pub enum GlCall {
    CreateShader { stage: GLenum, shader: GLuint },
    DeleteShader(GLuint),
    CreateProgram(GLuint),
    AttachShader { program: GLuint, shader: GLuint },
    DetachShader { program: GLuint, shader: GLuint },
    BindAttribLocation { program: GLuint, index: GLuint, name: String },
    BindFragDataLocation { program: GLuint, color: GLuint, name: String },
    LinkProgram(GLuint),
    DeleteProgram(GLuint),
    UseProgram(GLuint),
    UniformBlockBinding { program: GLuint, block: GLuint, binding: GLuint },
    Uniform1i { location: GLint, value: GLint },

    GenVertexArray(GLuint),
    DeleteVertexArray(GLuint),
    BindVertexArray(GLuint),
    EnableVertexAttribArray(GLuint),
    VertexAttribPointer { index: GLuint, size: GLint, ty: GLenum, normalized: bool, stride: GLsizei, offset: usize },
    VertexAttribIPointer { index: GLuint, size: GLint, ty: GLenum, stride: GLsizei, offset: usize },
    VertexAttribDivisor { index: GLuint, divisor: GLuint },

    GenBuffer(GLuint),
    DeleteBuffer(GLuint),
    BindBuffer { target: GLenum, buffer: GLuint },
    BufferData { target: GLenum, size: usize, usage: GLenum },
    MapBufferRange { target: GLenum, offset: usize, length: usize, access: GLbitfield },
    FlushMappedBufferRange { target: GLenum, offset: usize, length: usize },
    UnmapBuffer(GLenum),
    BindBufferRange { target: GLenum, index: GLuint, buffer: GLuint, offset: usize, size: usize },

    FenceSync(SyncHandle),
    ClientWaitSync(SyncHandle),
    DeleteSync(SyncHandle),

    GenTexture(GLuint),
    DeleteTexture(GLuint),
    ActiveTexture(u32),
    BindTexture { target: GLenum, texture: GLuint },
    TexStorage2D { target: GLenum, levels: GLsizei, internal_format: GLenum, width: GLsizei, height: GLsizei },
    TexStorage3D { target: GLenum, levels: GLsizei, internal_format: GLenum, width: GLsizei, height: GLsizei, depth: GLsizei },
    TexStorage2DMultisample { target: GLenum, samples: GLsizei, internal_format: GLenum, width: GLsizei, height: GLsizei },
    TexSubImage {
        target: GLenum,
        level: GLint,
        x: GLint,
        y: GLint,
        layer: GLint,
        width: GLsizei,
        height: GLsizei,
        format: GLenum,
        ty: GLenum,
        /// `Some(offset)` when read from the pixel unpack buffer.
        unpack_offset: Option<usize>,
    },
    TexParameter { target: GLenum, pname: GLenum, value: GLint },
    PixelStore { pname: GLenum, value: GLint },
    TexBuffer { target: GLenum, internal_format: GLenum, buffer: GLuint },

    GenSampler(GLuint),
    DeleteSampler(GLuint),
    BindSampler { unit: u32, sampler: GLuint },
    SamplerParameterI { sampler: GLuint, pname: GLenum, value: GLint },
    SamplerParameterF { sampler: GLuint, pname: GLenum, value: f32 },
    SamplerParameterFv { sampler: GLuint, pname: GLenum, value: [f32; 4] },

    GenFramebuffer(GLuint),
    DeleteFramebuffer(GLuint),
    BindFramebuffer { target: GLenum, framebuffer: GLuint },
    FramebufferTexture { target: GLenum, attachment: GLenum, texture: GLuint, level: GLint, layer: Option<GLint> },
    ReadBuffer(GLenum),
    DrawBuffer(GLenum),
    BlitFramebuffer { src: [GLint; 4], dst: [GLint; 4], mask: GLbitfield, filter: GLenum },
    ReadPixels { x: GLint, y: GLint, width: GLsizei, height: GLsizei, format: GLenum, ty: GLenum },
    ClearColor([f32; 4]),
    ClearDepth(f32),
    Clear(GLbitfield),
    InvalidateFramebuffer { target: GLenum, attachments: Vec<GLenum> },

    Enable(GLenum),
    Disable(GLenum),
    CullFace(GLenum),
    DepthFunc(GLenum),
    DepthMask(bool),
    BlendFuncSeparate { src_rgb: GLenum, dst_rgb: GLenum, src_alpha: GLenum, dst_alpha: GLenum },
    BlendEquationSeparate { rgb: GLenum, alpha: GLenum },
    BlendColor([f32; 4]),
    ColorMask([bool; 4]),
    Viewport([GLint; 4]),
    Scissor([GLint; 4]),

    DrawArrays { mode: GLenum, first: GLint, count: GLsizei },
    DrawElementsBaseVertex { mode: GLenum, count: GLsizei, ty: GLenum, offset: usize, base_vertex: GLint },

    GenQuery(GLuint),
    DeleteQuery(GLuint),
    BeginQuery { target: GLenum, query: GLuint },
    EndQuery(GLenum),

    PushDebugGroup(String),
    PopDebugGroup,
    DebugMessageInsert(String),
    Flush,
}

impl GlCall {
    /// Calls that change bound or fixed-function state a draw depends on.
    pub fn is_state_change(&self) -> bool {
        matches!(
            self,
            GlCall::UseProgram(_)
                | GlCall::BindVertexArray(_)
                | GlCall::ActiveTexture(_)
                | GlCall::BindTexture { .. }
                | GlCall::BindSampler { .. }
                | GlCall::BindFramebuffer { .. }
                | GlCall::Enable(_)
                | GlCall::Disable(_)
                | GlCall::CullFace(_)
                | GlCall::DepthFunc(_)
                | GlCall::DepthMask(_)
                | GlCall::BlendFuncSeparate { .. }
                | GlCall::BlendEquationSeparate { .. }
                | GlCall::BlendColor(_)
                | GlCall::ColorMask(_)
                | GlCall::Viewport(_)
                | GlCall::Scissor(_)
        )
    }

    pub fn is_draw(&self) -> bool {
        matches!(self, GlCall::DrawArrays { .. } | GlCall::DrawElementsBaseVertex { .. })
    }
}

#[derive(Debug, Default)]
struct QueryState {
    ended: bool,
    result: Option<u64>,
}

/// Driver double that records calls and simulates objects.
#[derive(Debug)]
pub struct RecordingDriver {
    calls: Vec<GlCall>,
    next_name: GLuint,
    live: BTreeMap<GLuint, ObjectKind>,
    invalid_deletes: Vec<(ObjectKind, GLuint)>,

    integers: HashMap<GLenum, GLint>,
    extensions: HashSet<String>,
    link_failure: Option<String>,
    framebuffer_status: GLenum,
    read_pixels_fill: u8,

    // u64 storage keeps mapped pointers 8-byte aligned.
    buffers: HashMap<GLuint, Vec<u64>>,
    buffer_sizes: HashMap<GLuint, usize>,
    bound_buffers: HashMap<GLenum, GLuint>,
    mapped: HashMap<GLenum, (GLuint, usize, usize)>,
    /// Unpack buffer bound at each client-memory texture upload.
    client_upload_unpack: Vec<GLuint>,

    next_sync: u64,
    fences: HashMap<u64, bool>,
    waits: Vec<SyncHandle>,

    queries: HashMap<GLuint, QueryState>,
    active_queries: HashMap<GLenum, GLuint>,
    blocking_query_ns: u64,
}

impl Default for RecordingDriver {
    fn default() -> Self {
        Self::new()
    }
}

impl RecordingDriver {
    /// A desktop GL 4.6 driver with debug output and timer queries.
    pub fn new() -> Self {
        let integers = HashMap::from([
            (gl::MAJOR_VERSION, 4),
            (gl::MINOR_VERSION, 6),
            (gl::MAX_TEXTURE_SIZE, 16384),
            (gl::MAX_SAMPLES, 8),
            (gl::UNIFORM_BUFFER_OFFSET_ALIGNMENT, 256),
            (gl::TEXTURE_BUFFER_OFFSET_ALIGNMENT, 16),
            (gl::MAX_TEXTURE_BUFFER_SIZE, 1 << 27),
        ]);
        let extensions = ["GL_KHR_debug", "GL_ARB_timer_query", "GL_ARB_invalidate_subdata"]
            .into_iter()
            .map(String::from)
            .collect();

        Self {
            calls: Vec::new(),
            next_name: 1,
            live: BTreeMap::new(),
            invalid_deletes: Vec::new(),
            integers,
            extensions,
            link_failure: None,
            framebuffer_status: gl::FRAMEBUFFER_COMPLETE,
            read_pixels_fill: 0,
            buffers: HashMap::new(),
            buffer_sizes: HashMap::new(),
            bound_buffers: HashMap::new(),
            mapped: HashMap::new(),
            client_upload_unpack: Vec::new(),
            next_sync: 1,
            fences: HashMap::new(),
            waits: Vec::new(),
            queries: HashMap::new(),
            active_queries: HashMap::new(),
            blocking_query_ns: 1_000_000,
        }
    }

    // ---- Inspection ----

    pub fn calls(&self) -> &[GlCall] {
        &self.calls
    }

    pub fn take_calls(&mut self) -> Vec<GlCall> {
        std::mem::take(&mut self.calls)
    }

    pub fn clear_calls(&mut self) {
        self.calls.clear();
    }

    pub fn count_calls(&self, pred: impl Fn(&GlCall) -> bool) -> usize {
        self.calls.iter().filter(|c| pred(c)).count()
    }

    pub fn is_live(&self, name: GLuint) -> bool {
        self.live.contains_key(&name)
    }

    pub fn live_count(&self, kind: ObjectKind) -> usize {
        self.live.values().filter(|k| **k == kind).count()
    }

    /// Deletes of names that were never created or already deleted.
    pub fn invalid_deletes(&self) -> &[(ObjectKind, GLuint)] {
        &self.invalid_deletes
    }

    /// Buffer currently bound to `target`, 0 when none.
    pub fn bound_buffer(&self, target: GLenum) -> GLuint {
        self.bound_buffers.get(&target).copied().unwrap_or(0)
    }

    /// For every upload from client memory so far, the buffer that was bound
    /// to `PIXEL_UNPACK_BUFFER` at the time. Anything but 0 means the driver
    /// would have read the pixels from that buffer instead.
    pub fn client_upload_unpack_bindings(&self) -> &[GLuint] {
        &self.client_upload_unpack
    }

    pub fn live_fences(&self) -> usize {
        self.fences.len()
    }

    /// Fences a client wait was issued on, in order.
    pub fn waits(&self) -> &[SyncHandle] {
        &self.waits
    }

    /// Bytes of a buffer's storage.
    pub fn buffer_contents(&self, buffer: GLuint) -> &[u8] {
        let size = self.buffer_sizes.get(&buffer).copied().unwrap_or(0);
        self.buffers
            .get(&buffer)
            .map(|words| &bytemuck::cast_slice::<u64, u8>(words)[..size])
            .unwrap_or(&[])
    }

    // ---- Behaviour knobs ----

    pub fn set_integer(&mut self, pname: GLenum, value: GLint) {
        self.integers.insert(pname, value);
    }

    pub fn add_extension(&mut self, name: &str) {
        self.extensions.insert(name.to_owned());
    }

    pub fn remove_extension(&mut self, name: &str) {
        self.extensions.remove(name);
    }

    /// Make every following link fail with `log`, or succeed again with `None`.
    pub fn set_link_failure(&mut self, log: Option<&str>) {
        self.link_failure = log.map(str::to_owned);
    }

    pub fn set_framebuffer_status(&mut self, status: GLenum) {
        self.framebuffer_status = status;
    }

    pub fn set_read_pixels_fill(&mut self, value: u8) {
        self.read_pixels_fill = value;
    }

    /// Simulate the GPU catching up with every submitted fence.
    pub fn signal_all_fences(&mut self) {
        self.fences.values_mut().for_each(|signaled| *signaled = true);
    }

    /// Finish every ended timer query with `elapsed_ns`.
    pub fn complete_queries(&mut self, elapsed_ns: u64) {
        for state in self.queries.values_mut() {
            if state.ended && state.result.is_none() {
                state.result = Some(elapsed_ns);
            }
        }
    }

    /// Result used when a blocking read hits an unfinished query.
    pub fn set_blocking_query_ns(&mut self, elapsed_ns: u64) {
        self.blocking_query_ns = elapsed_ns;
    }

    // ---- Internal helpers ----

    fn record(&mut self, call: GlCall) {
        self.calls.push(call);
    }

    fn alloc(&mut self, kind: ObjectKind) -> GLuint {
        let name = self.next_name;
        self.next_name += 1;
        self.live.insert(name, kind);
        name
    }

    fn release(&mut self, kind: ObjectKind, name: GLuint) {
        if name == 0 {
            return;
        }
        match self.live.get(&name) {
            Some(k) if *k == kind => {
                self.live.remove(&name);
            }
            _ => self.invalid_deletes.push((kind, name)),
        }
    }
}

impl GlDriver for RecordingDriver {
    fn get_integer(&mut self, pname: GLenum) -> GLint {
        if pname == gl::PIXEL_UNPACK_BUFFER_BINDING {
            return self.bound_buffer(gl::PIXEL_UNPACK_BUFFER) as GLint;
        }
        self.integers.get(&pname).copied().unwrap_or(0)
    }

    fn get_string(&mut self, name: GLenum) -> Option<String> {
        match name {
            gl::VENDOR | gl::RENDERER => Some("Recording".into()),
            gl::VERSION => {
                let major = self.get_integer(gl::MAJOR_VERSION);
                let minor = self.get_integer(gl::MINOR_VERSION);
                Some(format!("{major}.{minor}.0 Recording"))
            }
            _ => None,
        }
    }

    fn has_extension(&mut self, name: &str) -> bool {
        self.extensions.contains(name)
    }

    fn get_error(&mut self) -> GLenum {
        gl::NO_ERROR
    }

    fn flush(&mut self) {
        self.record(GlCall::Flush);
    }

    // ---- Shaders and programs ----

    fn create_shader(&mut self, stage: GLenum, source: &str) -> Result<GLuint, String> {
        if let Some(line) = source.lines().position(|l| l.trim_start().starts_with("#error")) {
            return Err(format!("ERROR: 0:{}: '#error' : compilation terminated", line + 1));
        }
        let shader = self.alloc(ObjectKind::Shader);
        self.record(GlCall::CreateShader { stage, shader });
        Ok(shader)
    }

    fn delete_shader(&mut self, shader: GLuint) {
        self.release(ObjectKind::Shader, shader);
        self.record(GlCall::DeleteShader(shader));
    }

    fn create_program(&mut self) -> GLuint {
        let program = self.alloc(ObjectKind::Program);
        self.record(GlCall::CreateProgram(program));
        program
    }

    fn attach_shader(&mut self, program: GLuint, shader: GLuint) {
        self.record(GlCall::AttachShader { program, shader });
    }

    fn detach_shader(&mut self, program: GLuint, shader: GLuint) {
        self.record(GlCall::DetachShader { program, shader });
    }

    fn bind_attrib_location(&mut self, program: GLuint, index: GLuint, name: &str) {
        self.record(GlCall::BindAttribLocation { program, index, name: name.to_owned() });
    }

    fn bind_frag_data_location(&mut self, program: GLuint, color: GLuint, name: &str) {
        self.record(GlCall::BindFragDataLocation { program, color, name: name.to_owned() });
    }

    fn link_program(&mut self, program: GLuint) -> Result<(), String> {
        self.record(GlCall::LinkProgram(program));
        match &self.link_failure {
            Some(log) => Err(log.clone()),
            None => Ok(()),
        }
    }

    fn delete_program(&mut self, program: GLuint) {
        self.release(ObjectKind::Program, program);
        self.record(GlCall::DeleteProgram(program));
    }

    fn use_program(&mut self, program: GLuint) {
        self.record(GlCall::UseProgram(program));
    }

    fn uniform_block_index(&mut self, _program: GLuint, name: &str) -> Option<GLuint> {
        (name == "UBOBlock").then_some(0)
    }

    fn uniform_block_binding(&mut self, program: GLuint, block: GLuint, binding: GLuint) {
        self.record(GlCall::UniformBlockBinding { program, block, binding });
    }

    fn uniform_location(&mut self, _program: GLuint, name: &str) -> Option<GLint> {
        // samp0..samp7 live at locations 0..7.
        name.strip_prefix("samp")?.parse::<GLint>().ok()
    }

    fn uniform_1i(&mut self, location: GLint, value: GLint) {
        self.record(GlCall::Uniform1i { location, value });
    }

    // ---- Vertex arrays ----

    fn gen_vertex_array(&mut self) -> GLuint {
        let vao = self.alloc(ObjectKind::VertexArray);
        self.record(GlCall::GenVertexArray(vao));
        vao
    }

    fn delete_vertex_array(&mut self, vao: GLuint) {
        self.release(ObjectKind::VertexArray, vao);
        self.record(GlCall::DeleteVertexArray(vao));
    }

    fn bind_vertex_array(&mut self, vao: GLuint) {
        self.record(GlCall::BindVertexArray(vao));
    }

    fn enable_vertex_attrib_array(&mut self, index: GLuint) {
        self.record(GlCall::EnableVertexAttribArray(index));
    }

    fn vertex_attrib_pointer(
        &mut self,
        index: GLuint,
        size: GLint,
        ty: GLenum,
        normalized: bool,
        stride: GLsizei,
        offset: usize,
    ) {
        self.record(GlCall::VertexAttribPointer { index, size, ty, normalized, stride, offset });
    }

    fn vertex_attrib_i_pointer(
        &mut self,
        index: GLuint,
        size: GLint,
        ty: GLenum,
        stride: GLsizei,
        offset: usize,
    ) {
        self.record(GlCall::VertexAttribIPointer { index, size, ty, stride, offset });
    }

    fn vertex_attrib_divisor(&mut self, index: GLuint, divisor: GLuint) {
        self.record(GlCall::VertexAttribDivisor { index, divisor });
    }

    // ---- Buffers ----

    fn gen_buffer(&mut self) -> GLuint {
        let buffer = self.alloc(ObjectKind::Buffer);
        self.record(GlCall::GenBuffer(buffer));
        buffer
    }

    fn delete_buffer(&mut self, buffer: GLuint) {
        self.release(ObjectKind::Buffer, buffer);
        self.buffers.remove(&buffer);
        self.buffer_sizes.remove(&buffer);
        self.bound_buffers.retain(|_, b| *b != buffer);
        self.record(GlCall::DeleteBuffer(buffer));
    }

    fn bind_buffer(&mut self, target: GLenum, buffer: GLuint) {
        self.bound_buffers.insert(target, buffer);
        self.record(GlCall::BindBuffer { target, buffer });
    }

    fn buffer_data(&mut self, target: GLenum, size: usize, usage: GLenum) {
        if let Some(&buffer) = self.bound_buffers.get(&target) {
            self.buffers.insert(buffer, vec![0u64; size.div_ceil(8)]);
            self.buffer_sizes.insert(buffer, size);
        }
        self.record(GlCall::BufferData { target, size, usage });
    }

    fn map_buffer_range(
        &mut self,
        target: GLenum,
        offset: usize,
        length: usize,
        access: GLbitfield,
    ) -> *mut u8 {
        self.record(GlCall::MapBufferRange { target, offset, length, access });

        let Some(&buffer) = self.bound_buffers.get(&target) else {
            return std::ptr::null_mut();
        };
        let size = self.buffer_sizes.get(&buffer).copied().unwrap_or(0);
        if self.mapped.contains_key(&target) || offset + length > size {
            return std::ptr::null_mut();
        }
        let Some(words) = self.buffers.get_mut(&buffer) else {
            return std::ptr::null_mut();
        };
        self.mapped.insert(target, (buffer, offset, length));
        let bytes: &mut [u8] = bytemuck::cast_slice_mut(words.as_mut_slice());
        bytes[offset..].as_mut_ptr()
    }

    fn flush_mapped_buffer_range(&mut self, target: GLenum, offset: usize, length: usize) {
        self.record(GlCall::FlushMappedBufferRange { target, offset, length });
    }

    fn unmap_buffer(&mut self, target: GLenum) {
        self.mapped.remove(&target);
        self.record(GlCall::UnmapBuffer(target));
    }

    fn bind_buffer_range(
        &mut self,
        target: GLenum,
        index: GLuint,
        buffer: GLuint,
        offset: usize,
        size: usize,
    ) {
        self.record(GlCall::BindBufferRange { target, index, buffer, offset, size });
    }

    // ---- Synchronisation ----

    fn fence_sync(&mut self) -> SyncHandle {
        let handle = SyncHandle::from_raw(self.next_sync);
        self.next_sync += 1;
        self.fences.insert(handle.into_raw(), false);
        self.record(GlCall::FenceSync(handle));
        handle
    }

    fn client_wait_sync(&mut self, sync: SyncHandle, _timeout_ns: u64) -> SyncWait {
        self.record(GlCall::ClientWaitSync(sync));
        self.waits.push(sync);
        match self.fences.get_mut(&sync.into_raw()) {
            Some(signaled) if *signaled => SyncWait::AlreadySignaled,
            Some(signaled) => {
                // The wait lasts until the GPU reaches the fence.
                *signaled = true;
                SyncWait::ConditionSatisfied
            }
            None => SyncWait::Failed,
        }
    }

    fn delete_sync(&mut self, sync: SyncHandle) {
        self.fences.remove(&sync.into_raw());
        self.record(GlCall::DeleteSync(sync));
    }

    // ---- Textures and samplers ----

    fn gen_texture(&mut self) -> GLuint {
        let texture = self.alloc(ObjectKind::Texture);
        self.record(GlCall::GenTexture(texture));
        texture
    }

    fn delete_texture(&mut self, texture: GLuint) {
        self.release(ObjectKind::Texture, texture);
        self.record(GlCall::DeleteTexture(texture));
    }

    fn active_texture(&mut self, unit: u32) {
        self.record(GlCall::ActiveTexture(unit));
    }

    fn bind_texture(&mut self, target: GLenum, texture: GLuint) {
        self.record(GlCall::BindTexture { target, texture });
    }

    fn tex_storage_2d(
        &mut self,
        target: GLenum,
        levels: GLsizei,
        internal_format: GLenum,
        width: GLsizei,
        height: GLsizei,
    ) {
        self.record(GlCall::TexStorage2D { target, levels, internal_format, width, height });
    }

    fn tex_storage_3d(
        &mut self,
        target: GLenum,
        levels: GLsizei,
        internal_format: GLenum,
        width: GLsizei,
        height: GLsizei,
        depth: GLsizei,
    ) {
        self.record(GlCall::TexStorage3D { target, levels, internal_format, width, height, depth });
    }

    fn tex_storage_2d_multisample(
        &mut self,
        target: GLenum,
        samples: GLsizei,
        internal_format: GLenum,
        width: GLsizei,
        height: GLsizei,
    ) {
        self.record(GlCall::TexStorage2DMultisample { target, samples, internal_format, width, height });
    }

    fn tex_sub_image(
        &mut self,
        target: GLenum,
        level: GLint,
        x: GLint,
        y: GLint,
        layer: GLint,
        width: GLsizei,
        height: GLsizei,
        format: GLenum,
        ty: GLenum,
        pixels: PixelSource<'_>,
    ) {
        let unpack_offset = match pixels {
            PixelSource::Client(_) => {
                let bound = self.bound_buffer(gl::PIXEL_UNPACK_BUFFER);
                self.client_upload_unpack.push(bound);
                None
            }
            PixelSource::Unpack(offset) => Some(offset),
        };
        self.record(GlCall::TexSubImage {
            target,
            level,
            x,
            y,
            layer,
            width,
            height,
            format,
            ty,
            unpack_offset,
        });
    }

    fn tex_parameter_i(&mut self, target: GLenum, pname: GLenum, value: GLint) {
        self.record(GlCall::TexParameter { target, pname, value });
    }

    fn pixel_store_i(&mut self, pname: GLenum, value: GLint) {
        self.record(GlCall::PixelStore { pname, value });
    }

    fn tex_buffer(&mut self, target: GLenum, internal_format: GLenum, buffer: GLuint) {
        self.record(GlCall::TexBuffer { target, internal_format, buffer });
    }

    fn gen_sampler(&mut self) -> GLuint {
        let sampler = self.alloc(ObjectKind::Sampler);
        self.record(GlCall::GenSampler(sampler));
        sampler
    }

    fn delete_sampler(&mut self, sampler: GLuint) {
        self.release(ObjectKind::Sampler, sampler);
        self.record(GlCall::DeleteSampler(sampler));
    }

    fn bind_sampler(&mut self, unit: u32, sampler: GLuint) {
        self.record(GlCall::BindSampler { unit, sampler });
    }

    fn sampler_parameter_i(&mut self, sampler: GLuint, pname: GLenum, value: GLint) {
        self.record(GlCall::SamplerParameterI { sampler, pname, value });
    }

    fn sampler_parameter_f(&mut self, sampler: GLuint, pname: GLenum, value: f32) {
        self.record(GlCall::SamplerParameterF { sampler, pname, value });
    }

    fn sampler_parameter_fv(&mut self, sampler: GLuint, pname: GLenum, value: [f32; 4]) {
        self.record(GlCall::SamplerParameterFv { sampler, pname, value });
    }

    // ---- Framebuffers ----

    fn gen_framebuffer(&mut self) -> GLuint {
        let framebuffer = self.alloc(ObjectKind::Framebuffer);
        self.record(GlCall::GenFramebuffer(framebuffer));
        framebuffer
    }

    fn delete_framebuffer(&mut self, framebuffer: GLuint) {
        self.release(ObjectKind::Framebuffer, framebuffer);
        self.record(GlCall::DeleteFramebuffer(framebuffer));
    }

    fn bind_framebuffer(&mut self, target: GLenum, framebuffer: GLuint) {
        self.record(GlCall::BindFramebuffer { target, framebuffer });
    }

    fn framebuffer_texture(
        &mut self,
        target: GLenum,
        attachment: GLenum,
        texture: GLuint,
        level: GLint,
        layer: Option<GLint>,
    ) {
        self.record(GlCall::FramebufferTexture { target, attachment, texture, level, layer });
    }

    fn check_framebuffer_status(&mut self, _target: GLenum) -> GLenum {
        self.framebuffer_status
    }

    fn read_buffer(&mut self, mode: GLenum) {
        self.record(GlCall::ReadBuffer(mode));
    }

    fn draw_buffer(&mut self, mode: GLenum) {
        self.record(GlCall::DrawBuffer(mode));
    }

    fn blit_framebuffer(
        &mut self,
        src: [GLint; 4],
        dst: [GLint; 4],
        mask: GLbitfield,
        filter: GLenum,
    ) {
        self.record(GlCall::BlitFramebuffer { src, dst, mask, filter });
    }

    fn read_pixels(
        &mut self,
        x: GLint,
        y: GLint,
        width: GLsizei,
        height: GLsizei,
        format: GLenum,
        ty: GLenum,
        out: &mut [u8],
    ) {
        out.fill(self.read_pixels_fill);
        self.record(GlCall::ReadPixels { x, y, width, height, format, ty });
    }

    fn clear_color(&mut self, rgba: [f32; 4]) {
        self.record(GlCall::ClearColor(rgba));
    }

    fn clear_depth(&mut self, depth: f32) {
        self.record(GlCall::ClearDepth(depth));
    }

    fn clear(&mut self, mask: GLbitfield) {
        self.record(GlCall::Clear(mask));
    }

    fn invalidate_framebuffer(&mut self, target: GLenum, attachments: &[GLenum]) {
        self.record(GlCall::InvalidateFramebuffer { target, attachments: attachments.to_vec() });
    }

    // ---- Fixed function ----

    fn enable(&mut self, cap: GLenum) {
        self.record(GlCall::Enable(cap));
    }

    fn disable(&mut self, cap: GLenum) {
        self.record(GlCall::Disable(cap));
    }

    fn cull_face(&mut self, mode: GLenum) {
        self.record(GlCall::CullFace(mode));
    }

    fn depth_func(&mut self, func: GLenum) {
        self.record(GlCall::DepthFunc(func));
    }

    fn depth_mask(&mut self, write: bool) {
        self.record(GlCall::DepthMask(write));
    }

    fn blend_func_separate(
        &mut self,
        src_rgb: GLenum,
        dst_rgb: GLenum,
        src_alpha: GLenum,
        dst_alpha: GLenum,
    ) {
        self.record(GlCall::BlendFuncSeparate { src_rgb, dst_rgb, src_alpha, dst_alpha });
    }

    fn blend_equation_separate(&mut self, rgb: GLenum, alpha: GLenum) {
        self.record(GlCall::BlendEquationSeparate { rgb, alpha });
    }

    fn blend_color(&mut self, rgba: [f32; 4]) {
        self.record(GlCall::BlendColor(rgba));
    }

    fn color_mask(&mut self, red: bool, green: bool, blue: bool, alpha: bool) {
        self.record(GlCall::ColorMask([red, green, blue, alpha]));
    }

    fn viewport(&mut self, x: GLint, y: GLint, width: GLsizei, height: GLsizei) {
        self.record(GlCall::Viewport([x, y, width, height]));
    }

    fn scissor(&mut self, x: GLint, y: GLint, width: GLsizei, height: GLsizei) {
        self.record(GlCall::Scissor([x, y, width, height]));
    }

    // ---- Draws ----

    fn draw_arrays(&mut self, mode: GLenum, first: GLint, count: GLsizei) {
        self.record(GlCall::DrawArrays { mode, first, count });
    }

    fn draw_elements_base_vertex(
        &mut self,
        mode: GLenum,
        count: GLsizei,
        ty: GLenum,
        offset: usize,
        base_vertex: GLint,
    ) {
        self.record(GlCall::DrawElementsBaseVertex { mode, count, ty, offset, base_vertex });
    }

    // ---- Timer queries ----

    fn gen_query(&mut self) -> GLuint {
        let query = self.alloc(ObjectKind::Query);
        self.queries.insert(query, QueryState::default());
        self.record(GlCall::GenQuery(query));
        query
    }

    fn delete_query(&mut self, query: GLuint) {
        self.release(ObjectKind::Query, query);
        self.queries.remove(&query);
        self.record(GlCall::DeleteQuery(query));
    }

    fn begin_query(&mut self, target: GLenum, query: GLuint) {
        if let Some(state) = self.queries.get_mut(&query) {
            *state = QueryState::default();
        }
        self.active_queries.insert(target, query);
        self.record(GlCall::BeginQuery { target, query });
    }

    fn end_query(&mut self, target: GLenum) {
        if let Some(query) = self.active_queries.remove(&target) {
            if let Some(state) = self.queries.get_mut(&query) {
                state.ended = true;
            }
        }
        self.record(GlCall::EndQuery(target));
    }

    fn query_result_available(&mut self, query: GLuint) -> bool {
        self.queries
            .get(&query)
            .is_some_and(|state| state.result.is_some())
    }

    fn query_result_u64(&mut self, query: GLuint) -> u64 {
        let blocking_ns = self.blocking_query_ns;
        match self.queries.get_mut(&query) {
            Some(state) => *state.result.get_or_insert(blocking_ns),
            None => 0,
        }
    }

    // ---- Debug annotations ----

    fn push_debug_group(&mut self, message: &str) {
        self.record(GlCall::PushDebugGroup(message.to_owned()));
    }

    fn pop_debug_group(&mut self) {
        self.record(GlCall::PopDebugGroup);
    }

    fn debug_message_insert(&mut self, message: &str) {
        self.record(GlCall::DebugMessageInsert(message.to_owned()));
    }
}

/// Window-less [`GlContext`] that counts presents.
#[derive(Debug)]
pub struct HeadlessContext {
    size: (u32, u32),
    gles: bool,
    surface: bool,
    swaps: u64,
    swap_interval: Option<i32>,
    fail_update: bool,
}

impl HeadlessContext {
    pub fn new(width: u32, height: u32) -> Self {
        Self {
            size: (width, height),
            gles: false,
            surface: true,
            swaps: 0,
            swap_interval: None,
            fail_update: false,
        }
    }

    pub fn gles(mut self) -> Self {
        self.gles = true;
        self
    }

    pub fn swaps(&self) -> u64 {
        self.swaps
    }

    pub fn swap_interval(&self) -> Option<i32> {
        self.swap_interval
    }

    /// Make the next surface recreation fail.
    pub fn fail_next_update(&mut self) {
        self.fail_update = true;
    }
}

impl GlContext for HeadlessContext {
    fn is_gles(&self) -> bool {
        self.gles
    }

    fn has_surface(&self) -> bool {
        self.surface
    }

    fn surface_size(&self) -> (u32, u32) {
        self.size
    }

    fn swap_buffers(&mut self) -> Result<()> {
        if !self.surface {
            bail!("swap_buffers without a surface");
        }
        self.swaps += 1;
        Ok(())
    }

    fn set_swap_interval(&mut self, interval: i32) -> bool {
        self.swap_interval = Some(interval);
        true
    }

    fn update_surface(&mut self) -> Result<()> {
        if std::mem::take(&mut self.fail_update) {
            bail!("surface recreation failed");
        }
        self.surface = true;
        Ok(())
    }

    fn resize_surface(&mut self, width: u32, height: u32) {
        self.size = (width, height);
    }

    fn destroy_surface(&mut self) {
        self.surface = false;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn names_are_unique_across_kinds() {
        let mut driver = RecordingDriver::new();
        let a = driver.gen_buffer();
        let b = driver.gen_texture();
        let c = driver.create_program();
        assert!(a != b && b != c && a != c);
        assert_eq!(driver.live_count(ObjectKind::Texture), 1);
    }

    #[test]
    fn double_delete_is_reported() {
        let mut driver = RecordingDriver::new();
        let tex = driver.gen_texture();
        driver.delete_texture(tex);
        driver.delete_texture(tex);
        assert_eq!(driver.invalid_deletes(), &[(ObjectKind::Texture, tex)]);
    }

    #[test]
    fn mapped_writes_land_in_buffer_storage() {
        let mut driver = RecordingDriver::new();
        let buffer = driver.gen_buffer();
        driver.bind_buffer(gl::ARRAY_BUFFER, buffer);
        driver.buffer_data(gl::ARRAY_BUFFER, 64, gl::STREAM_DRAW);

        let ptr = driver.map_buffer_range(gl::ARRAY_BUFFER, 16, 4, gl::MAP_WRITE_BIT);
        assert!(!ptr.is_null());
        unsafe { std::ptr::copy_nonoverlapping([1u8, 2, 3, 4].as_ptr(), ptr, 4) };
        driver.unmap_buffer(gl::ARRAY_BUFFER);

        assert_eq!(&driver.buffer_contents(buffer)[16..20], &[1, 2, 3, 4]);
        assert!(driver
            .map_buffer_range(gl::ARRAY_BUFFER, 60, 8, gl::MAP_WRITE_BIT)
            .is_null());
    }

    #[test]
    fn unsignaled_fence_wait_blocks_once() {
        let mut driver = RecordingDriver::new();
        let fence = driver.fence_sync();
        assert_eq!(driver.client_wait_sync(fence, u64::MAX), SyncWait::ConditionSatisfied);
        assert_eq!(driver.client_wait_sync(fence, u64::MAX), SyncWait::AlreadySignaled);

        let other = driver.fence_sync();
        driver.signal_all_fences();
        assert_eq!(driver.client_wait_sync(other, 0), SyncWait::AlreadySignaled);

        driver.delete_sync(fence);
        driver.delete_sync(other);
        assert_eq!(driver.live_fences(), 0);
    }

    #[test]
    fn queries_complete_on_demand() {
        let mut driver = RecordingDriver::new();
        let q = driver.gen_query();
        driver.begin_query(gl::TIME_ELAPSED, q);
        driver.end_query(gl::TIME_ELAPSED);
        assert!(!driver.query_result_available(q));

        driver.complete_queries(2_000_000);
        assert!(driver.query_result_available(q));
        assert_eq!(driver.query_result_u64(q), 2_000_000);
    }

    #[test]
    fn error_directive_fails_compilation() {
        let mut driver = RecordingDriver::new();
        let err = driver
            .create_shader(gl::FRAGMENT_SHADER, "void main() {}\n#error nope\n")
            .unwrap_err();
        assert!(err.contains("0:2"));
        assert_eq!(driver.live_count(ObjectKind::Shader), 0);
    }
}
