//! Creation and destruction of device-owned objects, texture transfers and
//! deferred clears.

use gl::types::{GLenum, GLint};
use gl_driver::{GlContext, GlDriver, PixelSource};
use gpu_core::{
    rgba8_to_f32, ColorWriteMask, DeviceError, GraphicsConfig, PipelineId, Result, SamplerId,
    ShaderId, ShaderStage, TextureBufferId, TextureId, TextureRegion, FramebufferId,
    MAX_VERTEX_ATTRIBUTES,
};
use tracing::{debug, error, trace, warn};

use crate::device::OpenGLDevice;
use crate::pipeline::{gl_primitive, gl_shader_stage, OpenGLPipeline, OpenGLShader};
use crate::program_cache::{compile_program, CachedProgram, ProgramCacheKey, ShaderDigest};
use crate::state::UPDATE_TEXTURE_UNIT;
use crate::texture::{required_bytes, OpenGLTexture, PendingClear};
use crate::vao_cache::{create_vertex_array, CachedVertexArray, VertexArrayCacheKey};

/// Where a texture gets attached on the scratch framebuffers.
#[derive(Debug, Clone, Copy)]
struct AttachTarget {
    name: gl::types::GLuint,
    attachment: GLenum,
    layer: Option<GLint>,
    depth: bool,
}

impl AttachTarget {
    fn of(texture: &OpenGLTexture, layer: u32) -> Self {
        Self {
            name: texture.name,
            attachment: texture.attachment_point(),
            layer: texture.attachment_layer(layer),
            depth: texture.desc.format.is_depth(),
        }
    }

    fn attach<D: GlDriver>(&self, driver: &mut D, target: GLenum, level: u32) {
        driver.framebuffer_texture(target, self.attachment, self.name, level as GLint, self.layer);
    }

    fn detach<D: GlDriver>(&self, driver: &mut D, target: GLenum) {
        driver.framebuffer_texture(target, self.attachment, 0, 0, None);
    }
}

fn check_stride(pitch: u32, stride: u32, bytes_per_pixel: u32) -> Result<u32> {
    let stride = if stride == 0 { pitch } else { stride };
    if stride < pitch || stride % bytes_per_pixel != 0 {
        return Err(DeviceError::InvalidArgument(format!(
            "row stride {stride} does not fit a {pitch} byte row"
        )));
    }
    Ok(stride)
}

impl<D: GlDriver, C: GlContext> OpenGLDevice<D, C> {
    // ---- Shaders ----

    pub(crate) fn compile_shader(&mut self, stage: ShaderStage, source: &str) -> Result<ShaderId> {
        if stage == ShaderStage::Geometry && !self.features.geometry_shaders {
            return Err(DeviceError::Unsupported("geometry shaders"));
        }

        let name = self
            .driver
            .create_shader(gl_shader_stage(stage), source)
            .map_err(|log| {
                error!(stage = stage.name(), "Failed to compile shader: {log}");
                DeviceError::ShaderCompile { stage, log }
            })?;

        debug!(shader = name, stage = stage.name(), "compiled shader");
        Ok(self.shaders.insert(OpenGLShader {
            stage,
            name,
            digest: ShaderDigest::new(stage, source),
        }))
    }

    /// Linked programs keep working after their shaders are gone.
    pub(crate) fn release_shader(&mut self, shader: ShaderId) {
        match self.shaders.remove(shader) {
            Some(shader) => self.driver.delete_shader(shader.name),
            None => warn!(?shader, "destroy of unknown shader"),
        }
    }

    // ---- Pipelines ----

    fn check_pipeline_config(&self, config: &GraphicsConfig) -> Result<()> {
        let attributes = &config.input_layout.vertex_attributes;
        if attributes.len() > MAX_VERTEX_ATTRIBUTES {
            return Err(DeviceError::InvalidArgument(format!(
                "{} vertex attributes, at most {MAX_VERTEX_ATTRIBUTES} supported",
                attributes.len()
            )));
        }
        for attr in attributes {
            if attr.index as usize >= MAX_VERTEX_ATTRIBUTES || !(1..=4).contains(&attr.components) {
                return Err(DeviceError::InvalidArgument(format!(
                    "vertex attribute {} with {} components",
                    attr.index, attr.components
                )));
            }
        }

        let stages = [
            (Some(config.vertex_shader), ShaderStage::Vertex),
            (Some(config.fragment_shader), ShaderStage::Fragment),
            (config.geometry_shader, ShaderStage::Geometry),
        ];
        for (id, expected) in stages {
            let Some(id) = id else { continue };
            let shader = self
                .shaders
                .get(id)
                .ok_or(DeviceError::InvalidHandle("shader"))?;
            if shader.stage != expected {
                return Err(DeviceError::InvalidArgument(format!(
                    "{} shader used as the {} stage",
                    shader.stage.name(),
                    expected.name()
                )));
            }
        }
        Ok(())
    }

    /// Create a pipeline, sharing the program and vertex array with every
    /// other pipeline that has equal keys.
    pub(crate) fn build_pipeline(&mut self, config: &GraphicsConfig) -> Result<PipelineId> {
        self.check_pipeline_config(config)?;

        let program_key = ProgramCacheKey::new(config, &self.shaders)?;
        let vao_key = VertexArrayCacheKey::from_layout(&config.input_layout);

        let gles = self.features.gles;
        let restore_program = self.applied.program;
        let (driver, shaders) = (&mut self.driver, &self.shaders);
        let program = self.program_cache.acquire(&program_key, || {
            compile_program(driver, shaders, config, gles, restore_program)
        })?;

        let vertex_buffer = self.streams.vertex.name();
        let index_buffer = self.streams.index.name();
        let restore_vao = self.applied.vertex_array;
        let driver = &mut self.driver;
        let vertex_array = match self.vao_cache.acquire(&vao_key, || {
            create_vertex_array(driver, &vao_key, vertex_buffer, index_buffer, restore_vao)
        }) {
            Ok(vertex_array) => vertex_array,
            Err(err) => {
                self.release_program(program);
                return Err(err);
            }
        };

        debug!(
            program = program.name(),
            vao = vertex_array.name(),
            program_hits = self.program_cache.hits(),
            program_misses = self.program_cache.misses(),
            vao_hits = self.vao_cache.hits(),
            vao_misses = self.vao_cache.misses(),
            "created pipeline"
        );

        Ok(self.pipelines.insert(OpenGLPipeline {
            program,
            vertex_array,
            layout: config.layout,
            primitive: gl_primitive(config.primitive),
            rasterization: config.rasterization,
            depth: config.depth,
            blend: config.blend,
        }))
    }

    /// Returns false for an unknown handle.
    pub(crate) fn release_pipeline(&mut self, id: PipelineId) -> bool {
        let Some(pipeline) = self.pipelines.remove(id) else {
            return false;
        };
        self.pending.clear_pipeline(id);
        self.applied.unbind_pipeline(id);
        self.release_program(pipeline.program);
        self.release_vertex_array(pipeline.vertex_array);
        true
    }

    fn release_program(&mut self, program: CachedProgram) {
        if let Some(name) = self.program_cache.release(program) {
            self.applied.unbind_program(&mut self.driver, name);
            self.driver.delete_program(name);
            debug!(program = name, "destroyed program");
        }
    }

    fn release_vertex_array(&mut self, vertex_array: CachedVertexArray) {
        if let Some(name) = self.vao_cache.release(vertex_array) {
            self.applied.unbind_vertex_array(&mut self.driver, name);
            self.driver.delete_vertex_array(name);
            debug!(vao = name, "destroyed vertex array");
        }
    }

    // ---- Textures, samplers, framebuffers ----

    pub(crate) fn release_texture(&mut self, id: TextureId) {
        let Some(texture) = self.textures.remove(id) else {
            warn!(texture = ?id, "destroy of unknown texture");
            return;
        };
        if self
            .framebuffers
            .values()
            .any(|fb| fb.attached_textures().any(|attached| attached == id))
        {
            warn!(texture = texture.name, "destroying a texture still attached to a framebuffer");
        }

        self.pending.clear_texture(id);
        self.applied.unbind_texture(&mut self.driver, texture.name);
        self.driver.delete_texture(texture.name);
        debug!(texture = texture.name, "destroyed texture");
    }

    pub(crate) fn release_sampler(&mut self, id: SamplerId) {
        let Some(sampler) = self.samplers.remove(id) else {
            warn!(sampler = ?id, "destroy of unknown sampler");
            return;
        };
        self.pending.clear_sampler(id);
        self.applied.unbind_sampler(&mut self.driver, sampler.name);
        self.driver.delete_sampler(sampler.name);
    }

    pub(crate) fn release_texture_buffer(&mut self, id: TextureBufferId) {
        let Some(mut buffer) = self.texture_buffers.remove(id) else {
            warn!(buffer = ?id, "destroy of unknown texture buffer");
            return;
        };
        self.pending.clear_texture_buffer(id);
        self.applied.unbind_texture(&mut self.driver, buffer.texture);
        buffer.destroy(&mut self.driver);
    }

    pub(crate) fn release_framebuffer(&mut self, id: FramebufferId) {
        let Some(framebuffer) = self.framebuffers.remove(id) else {
            warn!(framebuffer = ?id, "destroy of unknown framebuffer");
            return;
        };
        self.pending.clear_framebuffer(id);
        self.applied.unbind_framebuffer(&mut self.driver, framebuffer.name);
        self.driver.delete_framebuffer(framebuffer.name);
    }

    // ---- Deferred clears ----

    pub(crate) fn schedule_clear(&mut self, id: TextureId, clear: PendingClear) {
        let Some(texture) = self.textures.get_mut(id) else {
            warn!(texture = ?id, "clear of unknown texture");
            return;
        };
        let depth = texture.desc.format.is_depth();
        let fits = match clear {
            PendingClear::Color(_) => !depth,
            PendingClear::Depth(_) => depth,
            PendingClear::None | PendingClear::Invalidate => true,
        };
        if !fits {
            warn!(texture = texture.name, ?clear, "clear does not match the texture format");
            return;
        }
        texture.pending = clear;
    }

    /// Apply the clear scheduled on `id`, if any, through the write
    /// framebuffer. Every layer of level 0 is cleared.
    pub(crate) fn commit_clear(&mut self, id: TextureId) {
        let Some(texture) = self.textures.get_mut(id) else {
            return;
        };
        let clear = std::mem::take(&mut texture.pending);
        if clear.is_none() {
            return;
        }
        let layers = texture.desc.layers;
        let base = AttachTarget::of(texture, 0);

        trace!(texture = base.name, ?clear, "committing clear");
        self.applied.apply_framebuffer(&mut self.driver, self.write_fbo);
        self.applied.apply_scissor_test(&mut self.driver, false);
        match clear {
            PendingClear::Color(rgba) => {
                self.applied.force_color_write_mask(&mut self.driver, ColorWriteMask::all());
                self.driver.clear_color(rgba8_to_f32(rgba));
            }
            PendingClear::Depth(depth) => {
                self.applied.force_depth_write(&mut self.driver, true);
                self.driver.clear_depth(depth);
            }
            PendingClear::Invalidate | PendingClear::None => {}
        }

        for layer in 0..layers {
            let target = AttachTarget {
                layer: base.layer.map(|_| layer as GLint),
                ..base
            };
            target.attach(&mut self.driver, gl::DRAW_FRAMEBUFFER, 0);
            match clear {
                PendingClear::Color(_) => self.driver.clear(gl::COLOR_BUFFER_BIT),
                PendingClear::Depth(_) => self.driver.clear(gl::DEPTH_BUFFER_BIT),
                PendingClear::Invalidate => {
                    if self.features.invalidate_framebuffer {
                        self.driver
                            .invalidate_framebuffer(gl::DRAW_FRAMEBUFFER, &[base.attachment]);
                    }
                }
                PendingClear::None => {}
            }
            if base.layer.is_none() {
                break;
            }
        }
        base.detach(&mut self.driver, gl::DRAW_FRAMEBUFFER);
        self.stats.num_clears += 1;
    }

    // ---- Transfers ----

    pub(crate) fn upload_texture(
        &mut self,
        id: TextureId,
        region: TextureRegion,
        width: u32,
        height: u32,
        data: &[u8],
        data_stride: u32,
    ) -> Result<()> {
        let texture = self
            .textures
            .get(id)
            .ok_or(DeviceError::InvalidHandle("texture"))?;
        texture.check_region(region, width, height)?;
        if texture.desc.is_multisampled() {
            return Err(DeviceError::Unsupported("uploads to multisampled textures"));
        }

        let bpp = texture.desc.format.bytes_per_pixel();
        let pitch = width * bpp;
        let stride = check_stride(pitch, data_stride, bpp)?;
        let needed = required_bytes(pitch, stride, height);
        if data.len() < needed {
            return Err(DeviceError::InvalidArgument(format!(
                "upload data is {} bytes, {needed} needed",
                data.len()
            )));
        }
        if width == 0 || height == 0 {
            return Ok(());
        }

        let (name, target, format) = (texture.name, texture.target, texture.format);
        if region.level == 0 && texture.covers_level(region, width, height) {
            // Everything the clear would have written is overwritten.
            if let Some(texture) = self.textures.get_mut(id) {
                texture.pending = PendingClear::None;
            }
        } else {
            self.commit_clear(id);
        }

        self.applied
            .apply_texture(&mut self.driver, UPDATE_TEXTURE_UNIT, target, name);

        let (x, y, layer) = (region.x as GLint, region.y as GLint, region.layer as GLint);
        let level = region.level as GLint;
        let upload_size = pitch as usize * height as usize;
        if upload_size <= self.streams.texture.size() as usize {
            let mapping = self
                .streams
                .texture
                .map(&mut self.driver, bpp, upload_size as u32)?;
            let offset = mapping.offset as usize;
            for (dst, src) in mapping
                .data
                .chunks_exact_mut(pitch as usize)
                .zip(data.chunks(stride as usize))
                .take(height as usize)
            {
                dst.copy_from_slice(&src[..pitch as usize]);
            }
            self.streams.texture.unmap(&mut self.driver, upload_size as u32);

            self.driver.tex_sub_image(
                target,
                level,
                x,
                y,
                layer,
                width as GLint,
                height as GLint,
                format.format,
                format.ty,
                PixelSource::Unpack(offset),
            );
            self.driver.bind_buffer(gl::PIXEL_UNPACK_BUFFER, 0);
        } else {
            trace!(texture = name, upload_size, "upload bypasses the texture stream");
            debug_assert_eq!(
                self.driver.get_integer(gl::PIXEL_UNPACK_BUFFER_BINDING),
                0,
                "client upload with an unpack buffer bound"
            );
            if stride != pitch {
                self.driver
                    .pixel_store_i(gl::UNPACK_ROW_LENGTH, (stride / bpp) as GLint);
            }
            self.driver.tex_sub_image(
                target,
                level,
                x,
                y,
                layer,
                width as GLint,
                height as GLint,
                format.format,
                format.ty,
                PixelSource::Client(&data[..needed]),
            );
            if stride != pitch {
                self.driver.pixel_store_i(gl::UNPACK_ROW_LENGTH, 0);
            }
        }

        self.stats.num_uploads += 1;
        Ok(())
    }

    pub(crate) fn read_texture(
        &mut self,
        id: TextureId,
        region: TextureRegion,
        width: u32,
        height: u32,
        out: &mut [u8],
        out_stride: u32,
    ) -> Result<()> {
        let texture = self
            .textures
            .get(id)
            .ok_or(DeviceError::InvalidHandle("texture"))?;
        texture.check_region(region, width, height)?;
        if texture.desc.is_multisampled() {
            return Err(DeviceError::Unsupported("downloads from multisampled textures"));
        }

        let bpp = texture.desc.format.bytes_per_pixel();
        let pitch = width * bpp;
        let stride = check_stride(pitch, out_stride, bpp)?;
        let needed = required_bytes(pitch, stride, height);
        if out.len() < needed {
            return Err(DeviceError::InvalidArgument(format!(
                "download buffer is {} bytes, {needed} needed",
                out.len()
            )));
        }
        if width == 0 || height == 0 {
            return Ok(());
        }

        let source = AttachTarget::of(texture, region.layer);
        let format = texture.format;
        self.commit_clear(id);

        let driver = &mut self.driver;
        driver.bind_framebuffer(gl::READ_FRAMEBUFFER, self.read_fbo);
        source.attach(driver, gl::READ_FRAMEBUFFER, region.level);
        if !source.depth {
            driver.read_buffer(gl::COLOR_ATTACHMENT0);
        }
        if stride != pitch {
            driver.pixel_store_i(gl::PACK_ROW_LENGTH, (stride / bpp) as GLint);
        }
        driver.read_pixels(
            region.x as GLint,
            region.y as GLint,
            width as GLint,
            height as GLint,
            format.format,
            format.ty,
            &mut out[..needed],
        );
        if stride != pitch {
            driver.pixel_store_i(gl::PACK_ROW_LENGTH, 0);
        }
        source.detach(driver, gl::READ_FRAMEBUFFER);
        driver.bind_framebuffer(gl::READ_FRAMEBUFFER, 0);

        self.stats.num_downloads += 1;
        Ok(())
    }

    /// Copy (or with `resolve`, resolve) a rectangle between two textures
    /// with a framebuffer blit.
    pub(crate) fn blit_texture(
        &mut self,
        dst: TextureId,
        dst_region: TextureRegion,
        src: TextureId,
        src_region: TextureRegion,
        width: u32,
        height: u32,
        resolve: bool,
    ) -> Result<()> {
        let src_texture = self
            .textures
            .get(src)
            .ok_or(DeviceError::InvalidHandle("texture"))?;
        let dst_texture = self
            .textures
            .get(dst)
            .ok_or(DeviceError::InvalidHandle("texture"))?;
        src_texture.check_region(src_region, width, height)?;
        dst_texture.check_region(dst_region, width, height)?;

        let (src_desc, dst_desc) = (src_texture.desc, dst_texture.desc);
        if src_desc.format != dst_desc.format {
            return Err(DeviceError::InvalidArgument(format!(
                "cannot blit {:?} into {:?}",
                src_desc.format, dst_desc.format
            )));
        }
        if resolve {
            if !src_desc.is_multisampled() || dst_desc.is_multisampled() {
                return Err(DeviceError::InvalidArgument(
                    "resolve needs a multisampled source and a single-sampled destination".into(),
                ));
            }
        } else if src_desc.samples != dst_desc.samples {
            return Err(DeviceError::InvalidArgument(format!(
                "copy between {} and {} sample textures",
                src_desc.samples, dst_desc.samples
            )));
        }
        if src == dst {
            return Err(DeviceError::InvalidArgument(
                "source and destination are the same texture".into(),
            ));
        }
        if width == 0 || height == 0 {
            return Ok(());
        }

        let source = AttachTarget::of(src_texture, src_region.layer);
        let dest = AttachTarget::of(dst_texture, dst_region.layer);
        let covers_dst = dst_region.level == 0 && dst_texture.covers_level(dst_region, width, height);

        self.commit_clear(src);
        if covers_dst {
            if let Some(texture) = self.textures.get_mut(dst) {
                texture.pending = PendingClear::None;
            }
        } else {
            self.commit_clear(dst);
        }

        self.applied.apply_scissor_test(&mut self.driver, false);
        self.driver
            .bind_framebuffer(gl::READ_FRAMEBUFFER, self.read_fbo);
        source.attach(&mut self.driver, gl::READ_FRAMEBUFFER, src_region.level);
        if !source.depth {
            self.driver.read_buffer(gl::COLOR_ATTACHMENT0);
        }
        self.applied.apply_framebuffer(&mut self.driver, self.write_fbo);
        dest.attach(&mut self.driver, gl::DRAW_FRAMEBUFFER, dst_region.level);

        let rect = |region: TextureRegion| {
            let (x, y) = (region.x as GLint, region.y as GLint);
            [x, y, x + width as GLint, y + height as GLint]
        };
        let mask = if source.depth {
            gl::DEPTH_BUFFER_BIT
        } else {
            gl::COLOR_BUFFER_BIT
        };
        self.driver
            .blit_framebuffer(rect(src_region), rect(dst_region), mask, gl::NEAREST);

        dest.detach(&mut self.driver, gl::DRAW_FRAMEBUFFER);
        source.detach(&mut self.driver, gl::READ_FRAMEBUFFER);
        self.driver.bind_framebuffer(gl::READ_FRAMEBUFFER, 0);

        self.stats.num_copies += 1;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use gl_driver::{GlCall, HeadlessContext, ObjectKind, RecordingDriver};
    use gpu_core::{
        DeviceConfig, GpuDevice, InputLayout, TextureDesc, TextureFormat, TextureUsage,
        VertexAttribute, VertexAttributeType, VertexSemantic,
    };
    use pretty_assertions::assert_eq;

    type Device = OpenGLDevice<RecordingDriver, HeadlessContext>;

    fn device() -> Device {
        let config = DeviceConfig {
            stream_buffers: gpu_core::StreamBufferSizes {
                texture: 4096,
                ..Default::default()
            },
            ..DeviceConfig::default()
        };
        OpenGLDevice::new(RecordingDriver::new(), HeadlessContext::new(320, 240), config).unwrap()
    }

    fn layout() -> InputLayout {
        InputLayout {
            vertex_attributes: vec![VertexAttribute::new(
                0,
                VertexSemantic::Position,
                0,
                VertexAttributeType::Float,
                2,
                0,
            )],
            vertex_stride: 8,
        }
    }

    fn target(dev: &mut Device, width: u32, format: TextureFormat) -> TextureId {
        let usage = if format.is_depth() {
            TextureUsage::DepthStencil
        } else {
            TextureUsage::RenderTarget
        };
        dev.create_texture(&TextureDesc::new_2d(width, width, format, usage), None, 0)
            .unwrap()
    }

    #[test]
    fn compile_error_carries_the_log() {
        let mut dev = device();
        let err = dev
            .create_shader_from_source(ShaderStage::Fragment, "#error nope")
            .unwrap_err();
        assert!(matches!(err, DeviceError::ShaderCompile { stage: ShaderStage::Fragment, .. }));
        assert_eq!(dev.driver().live_count(ObjectKind::Shader), 0);
    }

    #[test]
    fn swapped_stages_are_rejected() {
        let mut dev = device();
        let vs = dev.create_shader_from_source(ShaderStage::Vertex, "vs").unwrap();
        let fs = dev.create_shader_from_source(ShaderStage::Fragment, "fs").unwrap();

        let err = dev
            .create_pipeline(&GraphicsConfig::new(fs, vs, layout()))
            .unwrap_err();
        assert!(matches!(err, DeviceError::InvalidArgument(_)));
        assert!(dev.program_cache().is_empty());
    }

    #[test]
    fn link_failure_leaves_caches_empty() {
        let mut dev = device();
        let vs = dev.create_shader_from_source(ShaderStage::Vertex, "vs").unwrap();
        let fs = dev.create_shader_from_source(ShaderStage::Fragment, "fs").unwrap();
        dev.driver_mut().set_link_failure(Some("mismatch"));

        assert!(dev.create_pipeline(&GraphicsConfig::new(vs, fs, layout())).is_err());
        assert!(dev.program_cache().is_empty());
        assert!(dev.vao_cache().is_empty());
        assert_eq!(dev.driver().live_count(ObjectKind::Program), 0);
    }

    #[test]
    fn destroying_a_bound_sampler_unbinds_it_first() {
        let mut dev = device();
        let sampler = dev.create_sampler(&gpu_core::SamplerConfig::linear()).unwrap();
        let name = dev.sampler(sampler).unwrap().name();
        dev.applied.apply_sampler(&mut dev.driver, 2, name);
        dev.driver_mut().clear_calls();

        dev.destroy_sampler(sampler);
        assert_eq!(
            dev.driver().calls(),
            &[
                GlCall::BindSampler { unit: 2, sampler: 0 },
                GlCall::DeleteSampler(name)
            ]
        );
        assert_eq!(dev.snapshot().units[2].sampler, Some(0));
    }

    #[test]
    fn clears_wait_until_the_texture_is_used() {
        let mut dev = device();
        let color = target(&mut dev, 16, TextureFormat::Rgba8);
        dev.driver_mut().clear_calls();

        dev.clear_render_target(color, 0xFF00_00FF);
        assert!(dev.driver().calls().is_empty());
        assert_eq!(dev.texture(color).unwrap().pending_clear(), PendingClear::Color(0xFF00_00FF));

        let mut out = vec![0u8; 16 * 16 * 4];
        dev.download_texture(color, TextureRegion::origin(), 16, 16, &mut out, 0)
            .unwrap();
        let calls = dev.driver().calls();
        let clear = calls
            .iter()
            .position(|c| *c == GlCall::Clear(gl::COLOR_BUFFER_BIT))
            .unwrap();
        let read = calls
            .iter()
            .position(|c| matches!(c, GlCall::ReadPixels { .. }))
            .unwrap();
        assert!(clear < read);
        assert!(calls.contains(&GlCall::ClearColor([1.0, 0.0, 0.0, 1.0])));
        assert!(dev.texture(color).unwrap().pending_clear().is_none());
        assert_eq!(dev.stats().num_clears, 1);
    }

    #[test]
    fn depth_clear_on_color_target_is_ignored() {
        let mut dev = device();
        let color = target(&mut dev, 8, TextureFormat::Rgba8);
        dev.clear_depth(color, 1.0);
        assert!(dev.texture(color).unwrap().pending_clear().is_none());
    }

    #[test]
    fn full_upload_drops_the_pending_clear() {
        let mut dev = device();
        let color = target(&mut dev, 8, TextureFormat::Rgba8);
        dev.clear_render_target(color, 0);

        dev.update_texture(color, TextureRegion::origin(), 8, 8, &[7u8; 8 * 8 * 4], 0)
            .unwrap();
        assert_eq!(dev.driver().count_calls(|c| matches!(c, GlCall::Clear(_))), 0);
        assert!(dev.texture(color).unwrap().pending_clear().is_none());
    }

    #[test]
    fn small_upload_goes_through_the_texture_stream() {
        let mut dev = device();
        let tex = target(&mut dev, 8, TextureFormat::R8);
        let staging = dev.streams().texture.name();
        dev.driver_mut().clear_calls();

        // Two rows of four texels, eight bytes apart in the source.
        let data = [1, 2, 3, 4, 0, 0, 0, 0, 5, 6, 7, 8];
        dev.update_texture(tex, TextureRegion::at(2, 2), 4, 2, &data, 8).unwrap();

        assert_eq!(&dev.driver().buffer_contents(staging)[..8], &[1, 2, 3, 4, 5, 6, 7, 8]);
        let calls = dev.driver().calls();
        assert!(calls.contains(&GlCall::TexSubImage {
            target: gl::TEXTURE_2D,
            level: 0,
            x: 2,
            y: 2,
            layer: 0,
            width: 4,
            height: 2,
            format: gl::RED,
            ty: gl::UNSIGNED_BYTE,
            unpack_offset: Some(0)
        }));
        assert_eq!(
            calls.last(),
            Some(&GlCall::BindBuffer {
                target: gl::PIXEL_UNPACK_BUFFER,
                buffer: 0
            })
        );
        assert_eq!(dev.streams().texture.position(), 8);
    }

    #[test]
    fn large_upload_uses_client_memory() {
        let mut dev = device();
        let tex = target(&mut dev, 64, TextureFormat::Rgba8);
        dev.driver_mut().clear_calls();

        let data = vec![0u8; 64 * 64 * 4];
        dev.update_texture(tex, TextureRegion::origin(), 64, 64, &data, 0).unwrap();
        let calls = dev.driver().calls();
        assert!(calls
            .iter()
            .any(|c| matches!(c, GlCall::TexSubImage { unpack_offset: None, .. })));
        assert_eq!(dev.streams().texture.position(), 0);
    }

    #[test]
    fn upload_outside_the_texture_fails() {
        let mut dev = device();
        let tex = target(&mut dev, 8, TextureFormat::Rgba8);
        let err = dev
            .update_texture(tex, TextureRegion::at(6, 0), 4, 1, &[0; 16], 0)
            .unwrap_err();
        assert!(matches!(err, DeviceError::InvalidArgument(_)));

        let short = dev.update_texture(tex, TextureRegion::origin(), 2, 2, &[0; 8], 0);
        assert!(short.is_err());
    }

    #[test]
    fn copy_blits_through_the_scratch_framebuffers() {
        let mut dev = device();
        let src = target(&mut dev, 32, TextureFormat::Rgba8);
        let dst = target(&mut dev, 32, TextureFormat::Rgba8);
        dev.driver_mut().clear_calls();

        dev.copy_texture_region(dst, TextureRegion::at(4, 4), src, TextureRegion::origin(), 8, 8)
            .unwrap();
        assert!(dev.driver().calls().contains(&GlCall::BlitFramebuffer {
            src: [0, 0, 8, 8],
            dst: [4, 4, 12, 12],
            mask: gl::COLOR_BUFFER_BIT,
            filter: gl::NEAREST
        }));
        assert_eq!(dev.snapshot().framebuffer, Some(dev.write_fbo));
        assert_eq!(dev.stats().num_copies, 1);
    }

    #[test]
    fn resolve_needs_a_multisampled_source() {
        let mut dev = device();
        let a = target(&mut dev, 16, TextureFormat::Rgba8);
        let b = target(&mut dev, 16, TextureFormat::Rgba8);
        let err = dev
            .resolve_texture_region(a, TextureRegion::origin(), b, TextureRegion::origin(), 16, 16)
            .unwrap_err();
        assert!(matches!(err, DeviceError::InvalidArgument(_)));

        let mut desc = TextureDesc::new_2d(16, 16, TextureFormat::Rgba8, TextureUsage::RenderTarget);
        desc.samples = 4;
        let msaa = dev.create_texture(&desc, None, 0).unwrap();
        dev.resolve_texture_region(a, TextureRegion::origin(), msaa, TextureRegion::origin(), 16, 16)
            .unwrap();
    }
}
