//! The backend-independent device interface.

use slotmap::new_key_type;

use crate::error::Result;
use crate::pipeline::GraphicsConfig;
use crate::types::{
    DrawIndex, Rect, RenderApi, SamplerConfig, ShaderStage, TextureBufferFormat, TextureDesc,
    TextureFormat, TextureRegion,
};

new_key_type! {
    /// A compiled shader stage.
    pub struct ShaderId;
    /// A graphics pipeline.
    pub struct PipelineId;
    pub struct TextureId;
    pub struct SamplerId;
    pub struct FramebufferId;
    pub struct TextureBufferId;
}

/// Writable window into the vertex stream.
#[derive(Debug)]
pub struct VertexMapping<'a> {
    pub data: &'a mut [u8],
    /// Vertex index of `data[0]` inside the vertex buffer.
    pub base_vertex: u32,
    /// Whole vertices that fit in `data`.
    pub space_vertices: u32,
}

/// Writable window into the index stream.
#[derive(Debug)]
pub struct IndexMapping<'a> {
    pub data: &'a mut [DrawIndex],
    pub base_index: u32,
    pub space_indices: u32,
}

/// Writable window into a texture buffer.
#[derive(Debug)]
pub struct TextureBufferMapping<'a> {
    pub data: &'a mut [u8],
    pub base_element: u32,
    pub space_elements: u32,
}

/// Texture attachment of a framebuffer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Attachment {
    pub texture: TextureId,
    pub layer: u32,
    pub level: u32,
}

impl Attachment {
    pub fn new(texture: TextureId) -> Self {
        Self {
            texture,
            layer: 0,
            level: 0,
        }
    }
}

/// Capabilities every rendering backend provides.
///
/// Binding calls (`set_*`) only record what the next draw needs. Nothing
/// reaches the driver until [`draw`](GpuDevice::draw) or
/// [`draw_indexed`](GpuDevice::draw_indexed) reconciles that request with
/// what is already bound.
pub trait GpuDevice {
    fn render_api(&self) -> RenderApi;

    /// File name stem for on-disk shader caches of this backend.
    fn shader_cache_base_name(&self, kind: &str, debug: bool) -> String;

    // ---- Surface ----

    fn has_surface(&self) -> bool;

    fn destroy_surface(&mut self);

    /// Recreate the surface after a window change. Cached driver state is
    /// forgotten, cached programs and vertex arrays are kept.
    fn update_window(&mut self) -> Result<()>;

    fn resize_window(&mut self, width: u32, height: u32);

    fn window_size(&self) -> (u32, u32);

    fn set_vsync(&mut self, enabled: bool);

    // ---- Shaders and pipelines ----

    fn create_shader_from_source(&mut self, stage: ShaderStage, source: &str) -> Result<ShaderId>;

    fn destroy_shader(&mut self, shader: ShaderId);

    fn create_pipeline(&mut self, config: &GraphicsConfig) -> Result<PipelineId>;

    fn destroy_pipeline(&mut self, pipeline: PipelineId);

    // ---- Textures ----

    /// Create a texture, optionally filling level 0 of every layer from
    /// `data` with rows `data_stride` bytes apart.
    fn create_texture(
        &mut self,
        desc: &TextureDesc,
        data: Option<&[u8]>,
        data_stride: u32,
    ) -> Result<TextureId>;

    fn destroy_texture(&mut self, texture: TextureId);

    fn update_texture(
        &mut self,
        texture: TextureId,
        region: TextureRegion,
        width: u32,
        height: u32,
        data: &[u8],
        data_stride: u32,
    ) -> Result<()>;

    fn download_texture(
        &mut self,
        texture: TextureId,
        region: TextureRegion,
        width: u32,
        height: u32,
        out: &mut [u8],
        out_stride: u32,
    ) -> Result<()>;

    fn supports_texture_format(&self, format: TextureFormat) -> bool;

    fn copy_texture_region(
        &mut self,
        dst: TextureId,
        dst_region: TextureRegion,
        src: TextureId,
        src_region: TextureRegion,
        width: u32,
        height: u32,
    ) -> Result<()>;

    /// Resolve a multisampled region into a single-sampled texture.
    fn resolve_texture_region(
        &mut self,
        dst: TextureId,
        dst_region: TextureRegion,
        src: TextureId,
        src_region: TextureRegion,
        width: u32,
        height: u32,
    ) -> Result<()>;

    /// Schedule a clear; it is applied the next time the texture is used.
    fn clear_render_target(&mut self, texture: TextureId, rgba: u32);

    fn clear_depth(&mut self, texture: TextureId, depth: f32);

    /// Declare the contents undefined so the driver may skip loading them.
    fn invalidate_render_target(&mut self, texture: TextureId);

    fn create_sampler(&mut self, config: &SamplerConfig) -> Result<SamplerId>;

    fn destroy_sampler(&mut self, sampler: SamplerId);

    fn create_texture_buffer(
        &mut self,
        format: TextureBufferFormat,
        size_in_elements: u32,
    ) -> Result<TextureBufferId>;

    fn destroy_texture_buffer(&mut self, buffer: TextureBufferId);

    fn map_texture_buffer(
        &mut self,
        buffer: TextureBufferId,
        required_elements: u32,
    ) -> Result<TextureBufferMapping<'_>>;

    fn unmap_texture_buffer(&mut self, buffer: TextureBufferId, used_elements: u32);

    // ---- Framebuffers ----

    fn create_framebuffer(
        &mut self,
        color: Option<Attachment>,
        depth: Option<Attachment>,
    ) -> Result<FramebufferId>;

    fn destroy_framebuffer(&mut self, framebuffer: FramebufferId);

    // ---- Draw submission ----

    /// `None` targets the window.
    fn set_framebuffer(&mut self, framebuffer: Option<FramebufferId>);

    fn set_pipeline(&mut self, pipeline: PipelineId);

    fn set_texture_sampler(
        &mut self,
        slot: usize,
        texture: Option<TextureId>,
        sampler: Option<SamplerId>,
    );

    fn set_texture_buffer(&mut self, slot: usize, buffer: Option<TextureBufferId>);

    fn set_viewport(&mut self, viewport: Rect);

    fn set_scissor(&mut self, scissor: Rect);

    fn map_vertex_buffer(
        &mut self,
        vertex_size: u32,
        vertex_count: u32,
    ) -> Result<VertexMapping<'_>>;

    fn unmap_vertex_buffer(&mut self, vertex_size: u32, vertex_count: u32);

    fn map_index_buffer(&mut self, index_count: u32) -> Result<IndexMapping<'_>>;

    fn unmap_index_buffer(&mut self, used_index_count: u32);

    /// Copy `data` into the uniform stream and bind it for the next draw.
    fn push_uniform_buffer(&mut self, data: &[u8]) -> Result<()>;

    fn map_uniform_buffer(&mut self, size: u32) -> Result<&mut [u8]>;

    fn unmap_uniform_buffer(&mut self, size: u32);

    fn draw(&mut self, vertex_count: u32, base_vertex: u32);

    fn draw_indexed(&mut self, index_count: u32, base_index: u32, base_vertex: u32);

    /// Forget everything known about driver state; the next draw applies
    /// all of it again.
    fn invalidate_cached_state(&mut self);

    // ---- Presentation ----

    /// Returns false when nothing should be drawn to the window this frame.
    fn begin_present(&mut self, skip_present: bool) -> bool;

    fn end_present(&mut self) -> Result<()>;

    // ---- Timing ----

    /// Returns whether timing is now active.
    fn set_gpu_timing_enabled(&mut self, enabled: bool) -> bool;

    /// Milliseconds of GPU time measured since the previous call.
    fn get_and_reset_accumulated_gpu_time(&mut self) -> f32;

    // ---- Debug annotations ----

    fn push_debug_group(&mut self, name: &str);

    fn pop_debug_group(&mut self);

    fn insert_debug_message(&mut self, message: &str);
}
