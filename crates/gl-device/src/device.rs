//! [`OpenGLDevice`], the OpenGL implementation of [`GpuDevice`].
//!
//! The device owns every driver object it hands out a handle for, the two
//! object caches, the stream buffers and the draw-state snapshot. Resource
//! creation lives in `resources.rs`, draw submission in `draw.rs`.

use gl::types::GLuint;
use gl_driver::{GlContext, GlDriver};
use gpu_core::{
    Attachment, ColorWriteMask, DeviceConfig, DeviceError, FramebufferId, GpuDevice, GraphicsConfig,
    IndexMapping, PipelineId, Rect, RenderApi, Result, SamplerConfig, SamplerId, ShaderId,
    ShaderStage, StreamBufferSizes, TextureBufferFormat, TextureBufferId, TextureBufferMapping,
    TextureDesc, TextureFormat, TextureId, TextureRegion, VertexMapping,
};
use slotmap::SlotMap;
use tracing::{debug, info, warn};

use crate::features::Features;
use crate::framebuffer::OpenGLFramebuffer;
use crate::pipeline::{OpenGLPipeline, OpenGLShader};
use crate::program_cache::ProgramCache;
use crate::state::{DrawStateSnapshot, PendingState};
use crate::stream_buffer::StreamBuffer;
use crate::texture::{OpenGLSampler, OpenGLTexture, OpenGLTextureBuffer, PendingClear};
use crate::timestamp::TimestampQueries;
use crate::vao_cache::VertexArrayCache;

/// The four per-device upload rings.
#[derive(Debug)]
pub struct StreamBuffers {
    pub vertex: StreamBuffer,
    pub index: StreamBuffer,
    pub uniform: StreamBuffer,
    /// Staging for texture uploads, read through `PIXEL_UNPACK_BUFFER`.
    pub texture: StreamBuffer,
}

impl StreamBuffers {
    fn create<D: GlDriver>(driver: &mut D, sizes: &StreamBufferSizes) -> Result<Self> {
        let specs = [
            (gl::ARRAY_BUFFER, sizes.vertex, "vertex"),
            (gl::ELEMENT_ARRAY_BUFFER, sizes.index, "index"),
            (gl::UNIFORM_BUFFER, sizes.uniform, "uniform"),
            (gl::PIXEL_UNPACK_BUFFER, sizes.texture, "texture"),
        ];

        let mut created = Vec::with_capacity(specs.len());
        for (target, size, label) in specs {
            match StreamBuffer::create(driver, target, size, label) {
                Ok(buffer) => created.push(buffer),
                Err(err) => {
                    for mut buffer in created {
                        buffer.destroy(driver);
                    }
                    return Err(err);
                }
            }
        }

        let mut buffers = created.into_iter();
        let mut next = || buffers.next().ok_or(DeviceError::Unsupported("buffer objects"));
        let streams = Self {
            vertex: next()?,
            index: next()?,
            uniform: next()?,
            texture: next()?,
        };
        // Client-memory uploads need the unpack target free.
        streams.texture.unbind(driver);
        Ok(streams)
    }

    fn destroy<D: GlDriver>(&mut self, driver: &mut D) {
        self.vertex.destroy(driver);
        self.index.destroy(driver);
        self.uniform.destroy(driver);
        self.texture.destroy(driver);
    }
}

/// Counters for the work the device has submitted.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct DeviceStats {
    pub num_draws: u64,
    pub num_uploads: u64,
    pub num_downloads: u64,
    pub num_copies: u64,
    pub num_clears: u64,
}

/// OpenGL device over a [`GlDriver`] and the [`GlContext`] it renders into.
///
/// Single threaded: the context must stay current on the thread that owns
/// the device.
#[derive(Debug)]
pub struct OpenGLDevice<D: GlDriver, C: GlContext> {
    pub(crate) driver: D,
    pub(crate) context: C,
    pub(crate) config: DeviceConfig,
    pub(crate) features: Features,
    pub(crate) window_size: (u32, u32),
    pub(crate) vsync: bool,

    pub(crate) applied: DrawStateSnapshot,
    pub(crate) pending: PendingState,

    pub(crate) program_cache: ProgramCache,
    pub(crate) vao_cache: VertexArrayCache,
    pub(crate) streams: StreamBuffers,
    /// Scratch framebuffers for blits, clears and read-backs.
    pub(crate) read_fbo: GLuint,
    pub(crate) write_fbo: GLuint,
    pub(crate) timestamps: Option<TimestampQueries>,

    pub(crate) shaders: SlotMap<ShaderId, OpenGLShader>,
    pub(crate) pipelines: SlotMap<PipelineId, OpenGLPipeline>,
    pub(crate) textures: SlotMap<TextureId, OpenGLTexture>,
    pub(crate) samplers: SlotMap<SamplerId, OpenGLSampler>,
    pub(crate) framebuffers: SlotMap<FramebufferId, OpenGLFramebuffer>,
    pub(crate) texture_buffers: SlotMap<TextureBufferId, OpenGLTextureBuffer>,

    pub(crate) stats: DeviceStats,
    shut_down: bool,
}

impl<D: GlDriver, C: GlContext> OpenGLDevice<D, C> {
    /// Create a device on the context that is current on this thread.
    pub fn new(mut driver: D, context: C, config: DeviceConfig) -> Result<Self> {
        config.validate()?;

        let features = Features::detect(&mut driver, context.is_gles());
        let mut streams = StreamBuffers::create(&mut driver, &config.stream_buffers)?;

        let read_fbo = driver.gen_framebuffer();
        let write_fbo = driver.gen_framebuffer();
        if read_fbo == 0 || write_fbo == 0 {
            for fbo in [read_fbo, write_fbo].into_iter().filter(|&fbo| fbo != 0) {
                driver.delete_framebuffer(fbo);
            }
            streams.destroy(&mut driver);
            return Err(DeviceError::Unsupported("framebuffer objects"));
        }

        // Rows of every upload and read-back are tightly packed.
        driver.pixel_store_i(gl::UNPACK_ALIGNMENT, 1);
        driver.pixel_store_i(gl::PACK_ALIGNMENT, 1);

        let window_size = context.surface_size();
        let window = Rect::from_size(window_size.0, window_size.1);
        let mut device = Self {
            driver,
            context,
            features,
            window_size,
            vsync: config.vsync,
            applied: DrawStateSnapshot::new(),
            pending: PendingState {
                viewport: window,
                scissor: window,
                ..PendingState::default()
            },
            program_cache: ProgramCache::new(),
            vao_cache: VertexArrayCache::new(),
            streams,
            read_fbo,
            write_fbo,
            timestamps: None,
            shaders: SlotMap::with_key(),
            pipelines: SlotMap::with_key(),
            textures: SlotMap::with_key(),
            samplers: SlotMap::with_key(),
            framebuffers: SlotMap::with_key(),
            texture_buffers: SlotMap::with_key(),
            stats: DeviceStats::default(),
            shut_down: false,
            config,
        };

        device.applied.apply_scissor_test(&mut device.driver, true);
        device.applied.apply_viewport(&mut device.driver, window);
        device.applied.apply_scissor(&mut device.driver, window);
        device.apply_swap_interval();
        if device.config.gpu_timing && !device.enable_timing() {
            warn!("GPU timing requested but unavailable");
        }

        info!(
            api = %device.render_api(),
            width = window_size.0,
            height = window_size.1,
            vsync = device.vsync,
            "created OpenGL device"
        );
        Ok(device)
    }

    pub fn driver(&self) -> &D {
        &self.driver
    }

    /// Direct driver access. Calls made through it are not reflected in the
    /// cached state; follow them with
    /// [`invalidate_cached_state`](GpuDevice::invalidate_cached_state).
    pub fn driver_mut(&mut self) -> &mut D {
        &mut self.driver
    }

    pub fn context(&self) -> &C {
        &self.context
    }

    pub fn context_mut(&mut self) -> &mut C {
        &mut self.context
    }

    pub fn config(&self) -> &DeviceConfig {
        &self.config
    }

    pub fn features(&self) -> &Features {
        &self.features
    }

    /// What the device believes the driver has bound.
    pub fn snapshot(&self) -> &DrawStateSnapshot {
        &self.applied
    }

    pub fn program_cache(&self) -> &ProgramCache {
        &self.program_cache
    }

    pub fn vao_cache(&self) -> &VertexArrayCache {
        &self.vao_cache
    }

    pub fn streams(&self) -> &StreamBuffers {
        &self.streams
    }

    pub fn stats(&self) -> DeviceStats {
        self.stats
    }

    pub fn pipeline(&self, pipeline: PipelineId) -> Option<&OpenGLPipeline> {
        self.pipelines.get(pipeline)
    }

    pub fn texture(&self, texture: TextureId) -> Option<&OpenGLTexture> {
        self.textures.get(texture)
    }

    pub fn sampler(&self, sampler: SamplerId) -> Option<&OpenGLSampler> {
        self.samplers.get(sampler)
    }

    pub fn framebuffer(&self, framebuffer: FramebufferId) -> Option<&OpenGLFramebuffer> {
        self.framebuffers.get(framebuffer)
    }

    pub fn texture_buffer(&self, buffer: TextureBufferId) -> Option<&OpenGLTextureBuffer> {
        self.texture_buffers.get(buffer)
    }

    fn apply_swap_interval(&mut self) {
        if !self.context.set_swap_interval(i32::from(self.vsync)) {
            debug!(vsync = self.vsync, "swap interval not changed by the context");
        }
    }

    fn enable_timing(&mut self) -> bool {
        if self.timestamps.is_some() {
            return true;
        }
        if !self.features.timer_query {
            return false;
        }
        let mut queries =
            TimestampQueries::create(&mut self.driver, self.config.timestamp_queries as usize);
        queries.kick(&mut self.driver);
        self.timestamps = Some(queries);
        true
    }

    fn debug_annotations(&self) -> bool {
        self.config.debug_device && self.features.debug_output
    }

    /// Destroy every object the device owns. Runs from `Drop`; calling it
    /// earlier leaves the device unusable.
    pub fn shutdown(&mut self) {
        if self.shut_down {
            return;
        }
        self.shut_down = true;

        let pipelines: Vec<PipelineId> = self.pipelines.keys().collect();
        for pipeline in pipelines {
            self.release_pipeline(pipeline);
        }

        let driver = &mut self.driver;
        for (_, texture) in self.textures.drain() {
            driver.delete_texture(texture.name);
        }
        for (_, sampler) in self.samplers.drain() {
            driver.delete_sampler(sampler.name);
        }
        for (_, framebuffer) in self.framebuffers.drain() {
            driver.delete_framebuffer(framebuffer.name);
        }
        for (_, mut buffer) in self.texture_buffers.drain() {
            buffer.destroy(driver);
        }
        for (_, shader) in self.shaders.drain() {
            driver.delete_shader(shader.name);
        }

        for (program, outstanding) in self.program_cache.drain() {
            if outstanding > 0 {
                warn!(program, outstanding, "program still referenced at shutdown");
            }
            driver.delete_program(program);
        }
        for (vao, outstanding) in self.vao_cache.drain() {
            if outstanding > 0 {
                warn!(vao, outstanding, "vertex array still referenced at shutdown");
            }
            driver.delete_vertex_array(vao);
        }

        if let Some(mut queries) = self.timestamps.take() {
            queries.destroy(driver);
        }
        self.streams.destroy(driver);
        driver.delete_framebuffer(self.read_fbo);
        driver.delete_framebuffer(self.write_fbo);

        self.applied.invalidate();
        self.pending = PendingState::default();
        info!(draws = self.stats.num_draws, "OpenGL device shut down");
    }
}

impl<D: GlDriver, C: GlContext> Drop for OpenGLDevice<D, C> {
    fn drop(&mut self) {
        self.shutdown();
    }
}

impl<D: GlDriver, C: GlContext> GpuDevice for OpenGLDevice<D, C> {
    fn render_api(&self) -> RenderApi {
        if self.features.gles {
            RenderApi::OpenGLES
        } else {
            RenderApi::OpenGL
        }
    }

    fn shader_cache_base_name(&self, kind: &str, debug: bool) -> String {
        let api = if self.features.gles { "opengles" } else { "opengl" };
        let suffix = if debug { "_debug" } else { "" };
        format!("{api}_{kind}{suffix}")
    }

    fn has_surface(&self) -> bool {
        self.context.has_surface()
    }

    fn destroy_surface(&mut self) {
        self.context.destroy_surface();
        self.applied.invalidate();
        info!("surface destroyed");
    }

    fn update_window(&mut self) -> Result<()> {
        self.context.update_surface()?;
        self.window_size = self.context.surface_size();
        self.applied.invalidate();
        self.apply_swap_interval();
        info!(width = self.window_size.0, height = self.window_size.1, "surface updated");
        Ok(())
    }

    fn resize_window(&mut self, width: u32, height: u32) {
        self.context.resize_surface(width, height);
        self.window_size = (width, height);
        let window = Rect::from_size(width, height);
        self.pending.viewport = window;
        self.pending.scissor = window;
    }

    fn window_size(&self) -> (u32, u32) {
        self.window_size
    }

    fn set_vsync(&mut self, enabled: bool) {
        self.vsync = enabled;
        self.apply_swap_interval();
    }

    fn create_shader_from_source(&mut self, stage: ShaderStage, source: &str) -> Result<ShaderId> {
        self.compile_shader(stage, source)
    }

    fn destroy_shader(&mut self, shader: ShaderId) {
        self.release_shader(shader);
    }

    fn create_pipeline(&mut self, config: &GraphicsConfig) -> Result<PipelineId> {
        self.build_pipeline(config)
    }

    fn destroy_pipeline(&mut self, pipeline: PipelineId) {
        if !self.release_pipeline(pipeline) {
            warn!(?pipeline, "destroy of unknown pipeline");
        }
    }

    fn create_texture(
        &mut self,
        desc: &TextureDesc,
        data: Option<&[u8]>,
        data_stride: u32,
    ) -> Result<TextureId> {
        let texture = OpenGLTexture::create(
            &mut self.driver,
            &mut self.applied,
            &self.features,
            desc,
            data,
            data_stride,
        )?;
        Ok(self.textures.insert(texture))
    }

    fn destroy_texture(&mut self, texture: TextureId) {
        self.release_texture(texture);
    }

    fn update_texture(
        &mut self,
        texture: TextureId,
        region: TextureRegion,
        width: u32,
        height: u32,
        data: &[u8],
        data_stride: u32,
    ) -> Result<()> {
        self.upload_texture(texture, region, width, height, data, data_stride)
    }

    fn download_texture(
        &mut self,
        texture: TextureId,
        region: TextureRegion,
        width: u32,
        height: u32,
        out: &mut [u8],
        out_stride: u32,
    ) -> Result<()> {
        self.read_texture(texture, region, width, height, out, out_stride)
    }

    fn supports_texture_format(&self, format: TextureFormat) -> bool {
        self.features.supports_texture_format(format)
    }

    fn copy_texture_region(
        &mut self,
        dst: TextureId,
        dst_region: TextureRegion,
        src: TextureId,
        src_region: TextureRegion,
        width: u32,
        height: u32,
    ) -> Result<()> {
        self.blit_texture(dst, dst_region, src, src_region, width, height, false)
    }

    fn resolve_texture_region(
        &mut self,
        dst: TextureId,
        dst_region: TextureRegion,
        src: TextureId,
        src_region: TextureRegion,
        width: u32,
        height: u32,
    ) -> Result<()> {
        self.blit_texture(dst, dst_region, src, src_region, width, height, true)
    }

    fn clear_render_target(&mut self, texture: TextureId, rgba: u32) {
        self.schedule_clear(texture, PendingClear::Color(rgba));
    }

    fn clear_depth(&mut self, texture: TextureId, depth: f32) {
        self.schedule_clear(texture, PendingClear::Depth(depth));
    }

    fn invalidate_render_target(&mut self, texture: TextureId) {
        self.schedule_clear(texture, PendingClear::Invalidate);
    }

    fn create_sampler(&mut self, config: &SamplerConfig) -> Result<SamplerId> {
        let sampler = OpenGLSampler::create(&mut self.driver, &self.features, config)?;
        Ok(self.samplers.insert(sampler))
    }

    fn destroy_sampler(&mut self, sampler: SamplerId) {
        self.release_sampler(sampler);
    }

    fn create_texture_buffer(
        &mut self,
        format: TextureBufferFormat,
        size_in_elements: u32,
    ) -> Result<TextureBufferId> {
        let buffer = OpenGLTextureBuffer::create(
            &mut self.driver,
            &mut self.applied,
            &self.features,
            format,
            size_in_elements,
        )?;
        Ok(self.texture_buffers.insert(buffer))
    }

    fn destroy_texture_buffer(&mut self, buffer: TextureBufferId) {
        self.release_texture_buffer(buffer);
    }

    fn map_texture_buffer(
        &mut self,
        buffer: TextureBufferId,
        required_elements: u32,
    ) -> Result<TextureBufferMapping<'_>> {
        self.texture_buffers
            .get_mut(buffer)
            .ok_or(DeviceError::InvalidHandle("texture buffer"))?
            .map(&mut self.driver, required_elements)
    }

    fn unmap_texture_buffer(&mut self, buffer: TextureBufferId, used_elements: u32) {
        match self.texture_buffers.get_mut(buffer) {
            Some(texture_buffer) => texture_buffer.unmap(&mut self.driver, used_elements),
            None => warn!(?buffer, "unmap of unknown texture buffer"),
        }
    }

    fn create_framebuffer(
        &mut self,
        color: Option<Attachment>,
        depth: Option<Attachment>,
    ) -> Result<FramebufferId> {
        let framebuffer = OpenGLFramebuffer::create(
            &mut self.driver,
            &mut self.applied,
            &self.textures,
            color,
            depth,
        )?;
        Ok(self.framebuffers.insert(framebuffer))
    }

    fn destroy_framebuffer(&mut self, framebuffer: FramebufferId) {
        self.release_framebuffer(framebuffer);
    }

    fn set_framebuffer(&mut self, framebuffer: Option<FramebufferId>) {
        self.pending.framebuffer = framebuffer;
    }

    fn set_pipeline(&mut self, pipeline: PipelineId) {
        self.pending.pipeline = Some(pipeline);
    }

    fn set_texture_sampler(
        &mut self,
        slot: usize,
        texture: Option<TextureId>,
        sampler: Option<SamplerId>,
    ) {
        self.bind_slot_texture(slot, texture, sampler);
    }

    fn set_texture_buffer(&mut self, slot: usize, buffer: Option<TextureBufferId>) {
        self.bind_slot_texture_buffer(slot, buffer);
    }

    fn set_viewport(&mut self, viewport: Rect) {
        self.pending.viewport = viewport;
    }

    fn set_scissor(&mut self, scissor: Rect) {
        self.pending.scissor = scissor;
    }

    fn map_vertex_buffer(
        &mut self,
        vertex_size: u32,
        vertex_count: u32,
    ) -> Result<VertexMapping<'_>> {
        self.map_vertices(vertex_size, vertex_count)
    }

    fn unmap_vertex_buffer(&mut self, vertex_size: u32, vertex_count: u32) {
        let used = vertex_size.saturating_mul(vertex_count);
        self.streams.vertex.unmap(&mut self.driver, used);
    }

    fn map_index_buffer(&mut self, index_count: u32) -> Result<IndexMapping<'_>> {
        self.map_indices(index_count)
    }

    fn unmap_index_buffer(&mut self, used_index_count: u32) {
        let used = used_index_count.saturating_mul(std::mem::size_of::<gpu_core::DrawIndex>() as u32);
        self.streams.index.unmap(&mut self.driver, used);
    }

    fn push_uniform_buffer(&mut self, data: &[u8]) -> Result<()> {
        let size = u32::try_from(data.len()).map_err(|_| DeviceError::StreamBufferOverflow {
            requested: u32::MAX,
            capacity: self.streams.uniform.size(),
        })?;
        self.map_uniforms(size)?.copy_from_slice(data);
        self.unmap_uniforms(size);
        Ok(())
    }

    fn map_uniform_buffer(&mut self, size: u32) -> Result<&mut [u8]> {
        self.map_uniforms(size)
    }

    fn unmap_uniform_buffer(&mut self, size: u32) {
        self.unmap_uniforms(size);
    }

    fn draw(&mut self, vertex_count: u32, base_vertex: u32) {
        self.issue_draw(vertex_count, base_vertex);
    }

    fn draw_indexed(&mut self, index_count: u32, base_index: u32, base_vertex: u32) {
        self.issue_draw_indexed(index_count, base_index, base_vertex);
    }

    fn invalidate_cached_state(&mut self) {
        self.applied.invalidate();
    }

    fn begin_present(&mut self, skip_present: bool) -> bool {
        if skip_present {
            return false;
        }
        if !self.context.has_surface() {
            // Still push out work queued for offscreen targets.
            self.driver.flush();
            return false;
        }

        let window = Rect::from_size(self.window_size.0, self.window_size.1);
        self.pending.framebuffer = None;
        self.pending.viewport = window;
        self.pending.scissor = window;

        self.applied.apply_framebuffer(&mut self.driver, 0);
        self.applied.force_color_write_mask(&mut self.driver, ColorWriteMask::all());
        self.applied.apply_scissor_test(&mut self.driver, false);
        self.driver.clear_color([0.0, 0.0, 0.0, 1.0]);
        self.driver.clear(gl::COLOR_BUFFER_BIT);
        true
    }

    fn end_present(&mut self) -> Result<()> {
        if let Some(queries) = self.timestamps.as_mut() {
            queries.pop(&mut self.driver);
        }
        let swapped = self.context.swap_buffers();
        if let Some(queries) = self.timestamps.as_mut() {
            queries.kick(&mut self.driver);
        }
        swapped?;
        Ok(())
    }

    fn set_gpu_timing_enabled(&mut self, enabled: bool) -> bool {
        if enabled {
            let active = self.enable_timing();
            if !active {
                warn!("timer queries unsupported, GPU timing stays off");
            }
            return active;
        }

        if let Some(mut queries) = self.timestamps.take() {
            queries.destroy(&mut self.driver);
        }
        false
    }

    fn get_and_reset_accumulated_gpu_time(&mut self) -> f32 {
        self.timestamps
            .as_mut()
            .map_or(0.0, TimestampQueries::take_accumulated)
    }

    fn push_debug_group(&mut self, name: &str) {
        if self.debug_annotations() {
            self.driver.push_debug_group(name);
        }
    }

    fn pop_debug_group(&mut self) {
        if self.debug_annotations() {
            self.driver.pop_debug_group();
        }
    }

    fn insert_debug_message(&mut self, message: &str) {
        if self.debug_annotations() {
            self.driver.debug_message_insert(message);
        }
    }
}
