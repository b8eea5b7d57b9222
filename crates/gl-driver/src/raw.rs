//! [`RawGlDriver`] forwards every [`GlDriver`] call to the `gl` crate.

use std::ffi::{c_void, CStr, CString};
use std::sync::Once;

use gl::types::{GLbitfield, GLboolean, GLchar, GLenum, GLint, GLsizei, GLsync, GLuint};

use crate::driver::{GlDriver, PixelSource, SyncHandle, SyncWait};

static GL_INIT_ONCE: Once = Once::new();

/// Driver bound to whatever GL context is current on the calling thread.
///
/// GL function pointers are loaded exactly once per process via `gl_loader`.
#[derive(Debug, Default)]
pub struct RawGlDriver {
    extensions: Option<Vec<String>>,
}

impl RawGlDriver {
    /// Load GL entry points (first call only) and wrap the current context.
    ///
    /// The caller must make the target context current before issuing any
    /// driver call.
    pub fn new() -> Self {
        GL_INIT_ONCE.call_once(|| {
            gl_loader::init_gl();
            gl::load_with(|s| gl_loader::get_proc_address(s).cast());
        });

        Self { extensions: None }
    }

    fn load_extensions(&mut self) -> &[String] {
        self.extensions.get_or_insert_with(|| {
            let mut count: GLint = 0;
            unsafe { gl::GetIntegerv(gl::NUM_EXTENSIONS, &mut count) };
            let extensions: Vec<String> = (0..count.max(0) as GLuint)
                .filter_map(|i| unsafe { gl_string(gl::GetStringi(gl::EXTENSIONS, i)) })
                .collect();
            tracing::debug!("driver reports {} extensions", extensions.len());
            extensions
        })
    }
}

// ---------------------------------------------------------------------------
// Internal helpers
// ---------------------------------------------------------------------------

fn c_string(s: &str) -> CString {
    CString::new(s).unwrap_or_default()
}

fn gl_bool(value: bool) -> GLboolean {
    if value {
        gl::TRUE
    } else {
        gl::FALSE
    }
}

unsafe fn gl_string(ptr: *const u8) -> Option<String> {
    if ptr.is_null() {
        return None;
    }
    Some(CStr::from_ptr(ptr.cast()).to_string_lossy().into_owned())
}

fn sync_from_handle(handle: SyncHandle) -> GLsync {
    handle.into_raw() as usize as GLsync
}

unsafe fn shader_info_log(shader: GLuint) -> String {
    let mut len: GLint = 0;
    gl::GetShaderiv(shader, gl::INFO_LOG_LENGTH, &mut len);
    let mut buf = vec![0u8; len.max(1) as usize];
    let mut written: GLsizei = 0;
    gl::GetShaderInfoLog(shader, buf.len() as GLsizei, &mut written, buf.as_mut_ptr().cast::<GLchar>());
    buf.truncate(written.max(0) as usize);
    String::from_utf8_lossy(&buf).into_owned()
}

unsafe fn program_info_log(program: GLuint) -> String {
    let mut len: GLint = 0;
    gl::GetProgramiv(program, gl::INFO_LOG_LENGTH, &mut len);
    let mut buf = vec![0u8; len.max(1) as usize];
    let mut written: GLsizei = 0;
    gl::GetProgramInfoLog(program, buf.len() as GLsizei, &mut written, buf.as_mut_ptr().cast::<GLchar>());
    buf.truncate(written.max(0) as usize);
    String::from_utf8_lossy(&buf).into_owned()
}

// SAFETY: every method issues raw GL calls and assumes a context is current on
// this thread with function pointers loaded by `RawGlDriver::new`. Pointer
// arguments come from slices or strings that outlive the call.
impl GlDriver for RawGlDriver {
    fn get_integer(&mut self, pname: GLenum) -> GLint {
        let mut value: GLint = 0;
        unsafe { gl::GetIntegerv(pname, &mut value) };
        value
    }

    fn get_string(&mut self, name: GLenum) -> Option<String> {
        unsafe { gl_string(gl::GetString(name)) }
    }

    fn has_extension(&mut self, name: &str) -> bool {
        self.load_extensions().iter().any(|e| e == name)
    }

    fn get_error(&mut self) -> GLenum {
        unsafe { gl::GetError() }
    }

    fn flush(&mut self) {
        unsafe { gl::Flush() }
    }

    // ---- Shaders and programs ----

    fn create_shader(&mut self, stage: GLenum, source: &str) -> Result<GLuint, String> {
        unsafe {
            let shader = gl::CreateShader(stage);
            if shader == 0 {
                return Err("glCreateShader returned 0".into());
            }

            let ptr = source.as_ptr().cast::<GLchar>();
            let len = source.len() as GLint;
            gl::ShaderSource(shader, 1, &ptr, &len);
            gl::CompileShader(shader);

            let mut status: GLint = 0;
            gl::GetShaderiv(shader, gl::COMPILE_STATUS, &mut status);
            if status == GLint::from(gl::FALSE) {
                let log = shader_info_log(shader);
                gl::DeleteShader(shader);
                return Err(log);
            }
            Ok(shader)
        }
    }

    fn delete_shader(&mut self, shader: GLuint) {
        unsafe { gl::DeleteShader(shader) }
    }

    fn create_program(&mut self) -> GLuint {
        unsafe { gl::CreateProgram() }
    }

    fn attach_shader(&mut self, program: GLuint, shader: GLuint) {
        unsafe { gl::AttachShader(program, shader) }
    }

    fn detach_shader(&mut self, program: GLuint, shader: GLuint) {
        unsafe { gl::DetachShader(program, shader) }
    }

    fn bind_attrib_location(&mut self, program: GLuint, index: GLuint, name: &str) {
        let name = c_string(name);
        unsafe { gl::BindAttribLocation(program, index, name.as_ptr()) }
    }

    fn bind_frag_data_location(&mut self, program: GLuint, color: GLuint, name: &str) {
        let name = c_string(name);
        unsafe { gl::BindFragDataLocation(program, color, name.as_ptr()) }
    }

    fn link_program(&mut self, program: GLuint) -> Result<(), String> {
        unsafe {
            gl::LinkProgram(program);
            let mut status: GLint = 0;
            gl::GetProgramiv(program, gl::LINK_STATUS, &mut status);
            if status == GLint::from(gl::FALSE) {
                return Err(program_info_log(program));
            }
        }
        Ok(())
    }

    fn delete_program(&mut self, program: GLuint) {
        unsafe { gl::DeleteProgram(program) }
    }

    fn use_program(&mut self, program: GLuint) {
        unsafe { gl::UseProgram(program) }
    }

    fn uniform_block_index(&mut self, program: GLuint, name: &str) -> Option<GLuint> {
        let name = c_string(name);
        let index = unsafe { gl::GetUniformBlockIndex(program, name.as_ptr()) };
        (index != gl::INVALID_INDEX).then_some(index)
    }

    fn uniform_block_binding(&mut self, program: GLuint, block: GLuint, binding: GLuint) {
        unsafe { gl::UniformBlockBinding(program, block, binding) }
    }

    fn uniform_location(&mut self, program: GLuint, name: &str) -> Option<GLint> {
        let name = c_string(name);
        let location = unsafe { gl::GetUniformLocation(program, name.as_ptr()) };
        (location >= 0).then_some(location)
    }

    fn uniform_1i(&mut self, location: GLint, value: GLint) {
        unsafe { gl::Uniform1i(location, value) }
    }

    // ---- Vertex arrays ----

    fn gen_vertex_array(&mut self) -> GLuint {
        let mut vao: GLuint = 0;
        unsafe { gl::GenVertexArrays(1, &mut vao) };
        vao
    }

    fn delete_vertex_array(&mut self, vao: GLuint) {
        unsafe { gl::DeleteVertexArrays(1, &vao) }
    }

    fn bind_vertex_array(&mut self, vao: GLuint) {
        unsafe { gl::BindVertexArray(vao) }
    }

    fn enable_vertex_attrib_array(&mut self, index: GLuint) {
        unsafe { gl::EnableVertexAttribArray(index) }
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
        unsafe {
            gl::VertexAttribPointer(index, size, ty, gl_bool(normalized), stride, offset as *const c_void)
        }
    }

    fn vertex_attrib_i_pointer(
        &mut self,
        index: GLuint,
        size: GLint,
        ty: GLenum,
        stride: GLsizei,
        offset: usize,
    ) {
        unsafe { gl::VertexAttribIPointer(index, size, ty, stride, offset as *const c_void) }
    }

    fn vertex_attrib_divisor(&mut self, index: GLuint, divisor: GLuint) {
        unsafe { gl::VertexAttribDivisor(index, divisor) }
    }

    // ---- Buffers ----

    fn gen_buffer(&mut self) -> GLuint {
        let mut buffer: GLuint = 0;
        unsafe { gl::GenBuffers(1, &mut buffer) };
        buffer
    }

    fn delete_buffer(&mut self, buffer: GLuint) {
        unsafe { gl::DeleteBuffers(1, &buffer) }
    }

    fn bind_buffer(&mut self, target: GLenum, buffer: GLuint) {
        unsafe { gl::BindBuffer(target, buffer) }
    }

    fn buffer_data(&mut self, target: GLenum, size: usize, usage: GLenum) {
        unsafe { gl::BufferData(target, size as isize, std::ptr::null(), usage) }
    }

    fn map_buffer_range(
        &mut self,
        target: GLenum,
        offset: usize,
        length: usize,
        access: GLbitfield,
    ) -> *mut u8 {
        unsafe { gl::MapBufferRange(target, offset as isize, length as isize, access).cast() }
    }

    fn flush_mapped_buffer_range(&mut self, target: GLenum, offset: usize, length: usize) {
        unsafe { gl::FlushMappedBufferRange(target, offset as isize, length as isize) }
    }

    fn unmap_buffer(&mut self, target: GLenum) {
        unsafe {
            gl::UnmapBuffer(target);
        }
    }

    fn bind_buffer_range(
        &mut self,
        target: GLenum,
        index: GLuint,
        buffer: GLuint,
        offset: usize,
        size: usize,
    ) {
        unsafe { gl::BindBufferRange(target, index, buffer, offset as isize, size as isize) }
    }

    // ---- Synchronisation ----

    fn fence_sync(&mut self) -> SyncHandle {
        let sync = unsafe { gl::FenceSync(gl::SYNC_GPU_COMMANDS_COMPLETE, 0) };
        SyncHandle::from_raw(sync as usize as u64)
    }

    fn client_wait_sync(&mut self, sync: SyncHandle, timeout_ns: u64) -> SyncWait {
        let status = unsafe {
            gl::ClientWaitSync(sync_from_handle(sync), gl::SYNC_FLUSH_COMMANDS_BIT, timeout_ns)
        };
        match status {
            gl::ALREADY_SIGNALED => SyncWait::AlreadySignaled,
            gl::CONDITION_SATISFIED => SyncWait::ConditionSatisfied,
            gl::TIMEOUT_EXPIRED => SyncWait::TimeoutExpired,
            _ => SyncWait::Failed,
        }
    }

    fn delete_sync(&mut self, sync: SyncHandle) {
        unsafe { gl::DeleteSync(sync_from_handle(sync)) }
    }

    // ---- Textures and samplers ----

    fn gen_texture(&mut self) -> GLuint {
        let mut texture: GLuint = 0;
        unsafe { gl::GenTextures(1, &mut texture) };
        texture
    }

    fn delete_texture(&mut self, texture: GLuint) {
        unsafe { gl::DeleteTextures(1, &texture) }
    }

    fn active_texture(&mut self, unit: u32) {
        unsafe { gl::ActiveTexture(gl::TEXTURE0 + unit) }
    }

    fn bind_texture(&mut self, target: GLenum, texture: GLuint) {
        unsafe { gl::BindTexture(target, texture) }
    }

    fn tex_storage_2d(
        &mut self,
        target: GLenum,
        levels: GLsizei,
        internal_format: GLenum,
        width: GLsizei,
        height: GLsizei,
    ) {
        unsafe { gl::TexStorage2D(target, levels, internal_format, width, height) }
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
        unsafe { gl::TexStorage3D(target, levels, internal_format, width, height, depth) }
    }

    fn tex_storage_2d_multisample(
        &mut self,
        target: GLenum,
        samples: GLsizei,
        internal_format: GLenum,
        width: GLsizei,
        height: GLsizei,
    ) {
        unsafe {
            gl::TexStorage2DMultisample(target, samples, internal_format, width, height, gl::FALSE)
        }
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
        let ptr: *const c_void = match pixels {
            PixelSource::Client(data) => data.as_ptr().cast(),
            PixelSource::Unpack(offset) => offset as *const c_void,
        };
        unsafe {
            if target == gl::TEXTURE_2D_ARRAY {
                gl::TexSubImage3D(target, level, x, y, layer, width, height, 1, format, ty, ptr);
            } else {
                gl::TexSubImage2D(target, level, x, y, width, height, format, ty, ptr);
            }
        }
    }

    fn tex_parameter_i(&mut self, target: GLenum, pname: GLenum, value: GLint) {
        unsafe { gl::TexParameteri(target, pname, value) }
    }

    fn pixel_store_i(&mut self, pname: GLenum, value: GLint) {
        unsafe { gl::PixelStorei(pname, value) }
    }

    fn tex_buffer(&mut self, target: GLenum, internal_format: GLenum, buffer: GLuint) {
        unsafe { gl::TexBuffer(target, internal_format, buffer) }
    }

    fn gen_sampler(&mut self) -> GLuint {
        let mut sampler: GLuint = 0;
        unsafe { gl::GenSamplers(1, &mut sampler) };
        sampler
    }

    fn delete_sampler(&mut self, sampler: GLuint) {
        unsafe { gl::DeleteSamplers(1, &sampler) }
    }

    fn bind_sampler(&mut self, unit: u32, sampler: GLuint) {
        unsafe { gl::BindSampler(unit, sampler) }
    }

    fn sampler_parameter_i(&mut self, sampler: GLuint, pname: GLenum, value: GLint) {
        unsafe { gl::SamplerParameteri(sampler, pname, value) }
    }

    fn sampler_parameter_f(&mut self, sampler: GLuint, pname: GLenum, value: f32) {
        unsafe { gl::SamplerParameterf(sampler, pname, value) }
    }

    fn sampler_parameter_fv(&mut self, sampler: GLuint, pname: GLenum, value: [f32; 4]) {
        unsafe { gl::SamplerParameterfv(sampler, pname, value.as_ptr()) }
    }

    // ---- Framebuffers ----

    fn gen_framebuffer(&mut self) -> GLuint {
        let mut fbo: GLuint = 0;
        unsafe { gl::GenFramebuffers(1, &mut fbo) };
        fbo
    }

    fn delete_framebuffer(&mut self, framebuffer: GLuint) {
        unsafe { gl::DeleteFramebuffers(1, &framebuffer) }
    }

    fn bind_framebuffer(&mut self, target: GLenum, framebuffer: GLuint) {
        unsafe { gl::BindFramebuffer(target, framebuffer) }
    }

    fn framebuffer_texture(
        &mut self,
        target: GLenum,
        attachment: GLenum,
        texture: GLuint,
        level: GLint,
        layer: Option<GLint>,
    ) {
        unsafe {
            match layer {
                Some(layer) => gl::FramebufferTextureLayer(target, attachment, texture, level, layer),
                None => gl::FramebufferTexture(target, attachment, texture, level),
            }
        }
    }

    fn check_framebuffer_status(&mut self, target: GLenum) -> GLenum {
        unsafe { gl::CheckFramebufferStatus(target) }
    }

    fn read_buffer(&mut self, mode: GLenum) {
        unsafe { gl::ReadBuffer(mode) }
    }

    fn draw_buffer(&mut self, mode: GLenum) {
        unsafe { gl::DrawBuffers(1, &mode) }
    }

    fn blit_framebuffer(
        &mut self,
        src: [GLint; 4],
        dst: [GLint; 4],
        mask: GLbitfield,
        filter: GLenum,
    ) {
        unsafe {
            gl::BlitFramebuffer(
                src[0], src[1], src[2], src[3], dst[0], dst[1], dst[2], dst[3], mask, filter,
            )
        }
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
        unsafe { gl::ReadPixels(x, y, width, height, format, ty, out.as_mut_ptr().cast()) }
    }

    fn clear_color(&mut self, rgba: [f32; 4]) {
        unsafe { gl::ClearColor(rgba[0], rgba[1], rgba[2], rgba[3]) }
    }

    fn clear_depth(&mut self, depth: f32) {
        unsafe { gl::ClearDepthf(depth) }
    }

    fn clear(&mut self, mask: GLbitfield) {
        unsafe { gl::Clear(mask) }
    }

    fn invalidate_framebuffer(&mut self, target: GLenum, attachments: &[GLenum]) {
        unsafe {
            gl::InvalidateFramebuffer(target, attachments.len() as GLsizei, attachments.as_ptr())
        }
    }

    // ---- Fixed function ----

    fn enable(&mut self, cap: GLenum) {
        unsafe { gl::Enable(cap) }
    }

    fn disable(&mut self, cap: GLenum) {
        unsafe { gl::Disable(cap) }
    }

    fn cull_face(&mut self, mode: GLenum) {
        unsafe { gl::CullFace(mode) }
    }

    fn depth_func(&mut self, func: GLenum) {
        unsafe { gl::DepthFunc(func) }
    }

    fn depth_mask(&mut self, write: bool) {
        unsafe { gl::DepthMask(gl_bool(write)) }
    }

    fn blend_func_separate(
        &mut self,
        src_rgb: GLenum,
        dst_rgb: GLenum,
        src_alpha: GLenum,
        dst_alpha: GLenum,
    ) {
        unsafe { gl::BlendFuncSeparate(src_rgb, dst_rgb, src_alpha, dst_alpha) }
    }

    fn blend_equation_separate(&mut self, rgb: GLenum, alpha: GLenum) {
        unsafe { gl::BlendEquationSeparate(rgb, alpha) }
    }

    fn blend_color(&mut self, rgba: [f32; 4]) {
        unsafe { gl::BlendColor(rgba[0], rgba[1], rgba[2], rgba[3]) }
    }

    fn color_mask(&mut self, red: bool, green: bool, blue: bool, alpha: bool) {
        unsafe { gl::ColorMask(gl_bool(red), gl_bool(green), gl_bool(blue), gl_bool(alpha)) }
    }

    fn viewport(&mut self, x: GLint, y: GLint, width: GLsizei, height: GLsizei) {
        unsafe { gl::Viewport(x, y, width, height) }
    }

    fn scissor(&mut self, x: GLint, y: GLint, width: GLsizei, height: GLsizei) {
        unsafe { gl::Scissor(x, y, width, height) }
    }

    // ---- Draws ----

    fn draw_arrays(&mut self, mode: GLenum, first: GLint, count: GLsizei) {
        unsafe { gl::DrawArrays(mode, first, count) }
    }

    fn draw_elements_base_vertex(
        &mut self,
        mode: GLenum,
        count: GLsizei,
        ty: GLenum,
        offset: usize,
        base_vertex: GLint,
    ) {
        unsafe { gl::DrawElementsBaseVertex(mode, count, ty, offset as *const c_void, base_vertex) }
    }

    // ---- Timer queries ----

    fn gen_query(&mut self) -> GLuint {
        let mut query: GLuint = 0;
        unsafe { gl::GenQueries(1, &mut query) };
        query
    }

    fn delete_query(&mut self, query: GLuint) {
        unsafe { gl::DeleteQueries(1, &query) }
    }

    fn begin_query(&mut self, target: GLenum, query: GLuint) {
        unsafe { gl::BeginQuery(target, query) }
    }

    fn end_query(&mut self, target: GLenum) {
        unsafe { gl::EndQuery(target) }
    }

    fn query_result_available(&mut self, query: GLuint) -> bool {
        let mut available: GLuint = 0;
        unsafe { gl::GetQueryObjectuiv(query, gl::QUERY_RESULT_AVAILABLE, &mut available) };
        available != 0
    }

    fn query_result_u64(&mut self, query: GLuint) -> u64 {
        let mut result: u64 = 0;
        unsafe { gl::GetQueryObjectui64v(query, gl::QUERY_RESULT, &mut result) };
        result
    }

    // ---- Debug annotations ----

    fn push_debug_group(&mut self, message: &str) {
        unsafe {
            gl::PushDebugGroup(
                gl::DEBUG_SOURCE_APPLICATION,
                0,
                message.len() as GLsizei,
                message.as_ptr().cast(),
            )
        }
    }

    fn pop_debug_group(&mut self) {
        unsafe { gl::PopDebugGroup() }
    }

    fn debug_message_insert(&mut self, message: &str) {
        unsafe {
            gl::DebugMessageInsert(
                gl::DEBUG_SOURCE_APPLICATION,
                gl::DEBUG_TYPE_MARKER,
                0,
                gl::DEBUG_SEVERITY_NOTIFICATION,
                message.len() as GLsizei,
                message.as_ptr().cast(),
            )
        }
    }
}
