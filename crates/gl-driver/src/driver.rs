//! [`GlDriver`]: the driver entry points the device is built on.
//!
//! Every method maps onto one (occasionally two) OpenGL calls and takes the
//! same enums the C API does, so the device code reads like GL code while
//! staying testable against [`RecordingDriver`](crate::recording::RecordingDriver).

use gl::types::{GLbitfield, GLenum, GLint, GLsizei, GLuint};

/// Opaque fence object returned by [`GlDriver::fence_sync`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SyncHandle(u64);

impl SyncHandle {
    pub fn from_raw(raw: u64) -> Self {
        Self(raw)
    }

    pub fn into_raw(self) -> u64 {
        self.0
    }
}

/// Outcome of a client-side fence wait.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SyncWait {
    /// Signalled before the wait started.
    AlreadySignaled,
    /// The wait blocked until the fence signalled.
    ConditionSatisfied,
    TimeoutExpired,
    Failed,
}

impl SyncWait {
    pub fn is_signaled(self) -> bool {
        matches!(self, SyncWait::AlreadySignaled | SyncWait::ConditionSatisfied)
    }
}

/// Where `tex_sub_image` reads pixels from.
#[derive(Debug, Clone, Copy)]
pub enum PixelSource<'a> {
    /// Client memory.
    Client(&'a [u8]),
    /// Byte offset into the bound `PIXEL_UNPACK_BUFFER`.
    Unpack(usize),
}

/// Thin typed wrapper over the OpenGL calls used by the device.
///
/// Implementations assume a current context on the calling thread.
pub trait GlDriver {
    // ---- Context queries ----

    fn get_integer(&mut self, pname: GLenum) -> GLint;

    fn get_string(&mut self, name: GLenum) -> Option<String>;

    fn has_extension(&mut self, name: &str) -> bool;

    fn get_error(&mut self) -> GLenum;

    fn flush(&mut self);

    // ---- Shaders and programs ----

    /// Compile a shader. On failure the shader object is already deleted and
    /// the info log is returned.
    fn create_shader(&mut self, stage: GLenum, source: &str) -> Result<GLuint, String>;

    fn delete_shader(&mut self, shader: GLuint);

    fn create_program(&mut self) -> GLuint;

    fn attach_shader(&mut self, program: GLuint, shader: GLuint);

    fn detach_shader(&mut self, program: GLuint, shader: GLuint);

    fn bind_attrib_location(&mut self, program: GLuint, index: GLuint, name: &str);

    fn bind_frag_data_location(&mut self, program: GLuint, color: GLuint, name: &str);

    /// Link and return the info log on failure.
    fn link_program(&mut self, program: GLuint) -> Result<(), String>;

    fn delete_program(&mut self, program: GLuint);

    fn use_program(&mut self, program: GLuint);

    fn uniform_block_index(&mut self, program: GLuint, name: &str) -> Option<GLuint>;

    fn uniform_block_binding(&mut self, program: GLuint, block: GLuint, binding: GLuint);

    fn uniform_location(&mut self, program: GLuint, name: &str) -> Option<GLint>;

    fn uniform_1i(&mut self, location: GLint, value: GLint);

    // ---- Vertex arrays ----

    fn gen_vertex_array(&mut self) -> GLuint;

    fn delete_vertex_array(&mut self, vao: GLuint);

    fn bind_vertex_array(&mut self, vao: GLuint);

    fn enable_vertex_attrib_array(&mut self, index: GLuint);

    fn vertex_attrib_pointer(
        &mut self,
        index: GLuint,
        size: GLint,
        ty: GLenum,
        normalized: bool,
        stride: GLsizei,
        offset: usize,
    );

    fn vertex_attrib_i_pointer(
        &mut self,
        index: GLuint,
        size: GLint,
        ty: GLenum,
        stride: GLsizei,
        offset: usize,
    );

    fn vertex_attrib_divisor(&mut self, index: GLuint, divisor: GLuint);

    // ---- Buffers ----

    fn gen_buffer(&mut self) -> GLuint;

    fn delete_buffer(&mut self, buffer: GLuint);

    fn bind_buffer(&mut self, target: GLenum, buffer: GLuint);

    fn buffer_data(&mut self, target: GLenum, size: usize, usage: GLenum);

    /// Map a range of the buffer bound to `target`. Null on failure.
    fn map_buffer_range(
        &mut self,
        target: GLenum,
        offset: usize,
        length: usize,
        access: GLbitfield,
    ) -> *mut u8;

    fn flush_mapped_buffer_range(&mut self, target: GLenum, offset: usize, length: usize);

    fn unmap_buffer(&mut self, target: GLenum);

    fn bind_buffer_range(
        &mut self,
        target: GLenum,
        index: GLuint,
        buffer: GLuint,
        offset: usize,
        size: usize,
    );

    // ---- Synchronisation ----

    fn fence_sync(&mut self) -> SyncHandle;

    fn client_wait_sync(&mut self, sync: SyncHandle, timeout_ns: u64) -> SyncWait;

    fn delete_sync(&mut self, sync: SyncHandle);

    // ---- Textures and samplers ----

    fn gen_texture(&mut self) -> GLuint;

    fn delete_texture(&mut self, texture: GLuint);

    /// Select texture unit `unit` (zero based).
    fn active_texture(&mut self, unit: u32);

    fn bind_texture(&mut self, target: GLenum, texture: GLuint);

    fn tex_storage_2d(
        &mut self,
        target: GLenum,
        levels: GLsizei,
        internal_format: GLenum,
        width: GLsizei,
        height: GLsizei,
    );

    fn tex_storage_3d(
        &mut self,
        target: GLenum,
        levels: GLsizei,
        internal_format: GLenum,
        width: GLsizei,
        height: GLsizei,
        depth: GLsizei,
    );

    fn tex_storage_2d_multisample(
        &mut self,
        target: GLenum,
        samples: GLsizei,
        internal_format: GLenum,
        width: GLsizei,
        height: GLsizei,
    );

    /// Upload a rectangle into `layer` of `level`. Array targets use the 3D
    /// entry point.
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
    );

    fn tex_parameter_i(&mut self, target: GLenum, pname: GLenum, value: GLint);

    fn pixel_store_i(&mut self, pname: GLenum, value: GLint);

    fn tex_buffer(&mut self, target: GLenum, internal_format: GLenum, buffer: GLuint);

    fn gen_sampler(&mut self) -> GLuint;

    fn delete_sampler(&mut self, sampler: GLuint);

    fn bind_sampler(&mut self, unit: u32, sampler: GLuint);

    fn sampler_parameter_i(&mut self, sampler: GLuint, pname: GLenum, value: GLint);

    fn sampler_parameter_f(&mut self, sampler: GLuint, pname: GLenum, value: f32);

    fn sampler_parameter_fv(&mut self, sampler: GLuint, pname: GLenum, value: [f32; 4]);

    // ---- Framebuffers ----

    fn gen_framebuffer(&mut self) -> GLuint;

    fn delete_framebuffer(&mut self, framebuffer: GLuint);

    fn bind_framebuffer(&mut self, target: GLenum, framebuffer: GLuint);

    /// Attach `texture` (or detach with 0). `layer` selects an array layer.
    fn framebuffer_texture(
        &mut self,
        target: GLenum,
        attachment: GLenum,
        texture: GLuint,
        level: GLint,
        layer: Option<GLint>,
    );

    fn check_framebuffer_status(&mut self, target: GLenum) -> GLenum;

    fn read_buffer(&mut self, mode: GLenum);

    fn draw_buffer(&mut self, mode: GLenum);

    fn blit_framebuffer(
        &mut self,
        src: [GLint; 4],
        dst: [GLint; 4],
        mask: GLbitfield,
        filter: GLenum,
    );

    fn read_pixels(
        &mut self,
        x: GLint,
        y: GLint,
        width: GLsizei,
        height: GLsizei,
        format: GLenum,
        ty: GLenum,
        out: &mut [u8],
    );

    fn clear_color(&mut self, rgba: [f32; 4]);

    fn clear_depth(&mut self, depth: f32);

    fn clear(&mut self, mask: GLbitfield);

    fn invalidate_framebuffer(&mut self, target: GLenum, attachments: &[GLenum]);

    // ---- Fixed function ----

    fn enable(&mut self, cap: GLenum);

    fn disable(&mut self, cap: GLenum);

    fn cull_face(&mut self, mode: GLenum);

    fn depth_func(&mut self, func: GLenum);

    fn depth_mask(&mut self, write: bool);

    fn blend_func_separate(
        &mut self,
        src_rgb: GLenum,
        dst_rgb: GLenum,
        src_alpha: GLenum,
        dst_alpha: GLenum,
    );

    fn blend_equation_separate(&mut self, rgb: GLenum, alpha: GLenum);

    fn blend_color(&mut self, rgba: [f32; 4]);

    fn color_mask(&mut self, red: bool, green: bool, blue: bool, alpha: bool);

    fn viewport(&mut self, x: GLint, y: GLint, width: GLsizei, height: GLsizei);

    fn scissor(&mut self, x: GLint, y: GLint, width: GLsizei, height: GLsizei);

    // ---- Draws ----

    fn draw_arrays(&mut self, mode: GLenum, first: GLint, count: GLsizei);

    fn draw_elements_base_vertex(
        &mut self,
        mode: GLenum,
        count: GLsizei,
        ty: GLenum,
        offset: usize,
        base_vertex: GLint,
    );

    // ---- Timer queries ----

    fn gen_query(&mut self) -> GLuint;

    fn delete_query(&mut self, query: GLuint);

    fn begin_query(&mut self, target: GLenum, query: GLuint);

    fn end_query(&mut self, target: GLenum);

    fn query_result_available(&mut self, query: GLuint) -> bool;

    /// Blocks until the result is available.
    fn query_result_u64(&mut self, query: GLuint) -> u64;

    // ---- Debug annotations ----

    fn push_debug_group(&mut self, message: &str);

    fn pop_debug_group(&mut self);

    fn debug_message_insert(&mut self, message: &str);
}
