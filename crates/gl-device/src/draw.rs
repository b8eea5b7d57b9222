//! Draw submission: stream mappings and pre-draw reconciliation.
//!
//! Reconciliation walks the pending request field by field against the
//! snapshot, so a draw that repeats the previous one touches no state at all.

use gl::types::{GLenum, GLint, GLsizei};
use gl_driver::{GlContext, GlDriver};
use gpu_core::{
    DeviceError, DrawIndex, IndexMapping, Result, SamplerId, TextureBufferId, TextureId,
    VertexMapping,
};
use tracing::{error, trace, warn};

use crate::device::OpenGLDevice;
use crate::program_cache::UNIFORM_BLOCK_BINDING;
use crate::state::{PendingSlot, SlotResource};

const INDEX_SIZE: u32 = std::mem::size_of::<DrawIndex>() as u32;

impl<D: GlDriver, C: GlContext> OpenGLDevice<D, C> {
    pub(crate) fn bind_slot_texture(
        &mut self,
        slot: usize,
        texture: Option<TextureId>,
        sampler: Option<SamplerId>,
    ) {
        let Some(pending) = self.pending.slots.get_mut(slot) else {
            warn!(slot, "texture slot out of range");
            return;
        };
        *pending = PendingSlot {
            resource: texture.map_or(SlotResource::None, SlotResource::Texture),
            sampler,
        };
    }

    pub(crate) fn bind_slot_texture_buffer(&mut self, slot: usize, buffer: Option<TextureBufferId>) {
        let Some(pending) = self.pending.slots.get_mut(slot) else {
            warn!(slot, "texture slot out of range");
            return;
        };
        *pending = PendingSlot {
            resource: buffer.map_or(SlotResource::None, SlotResource::TextureBuffer),
            sampler: None,
        };
    }

    // ---- Stream mappings ----

    pub(crate) fn map_vertices(
        &mut self,
        vertex_size: u32,
        vertex_count: u32,
    ) -> Result<VertexMapping<'_>> {
        if vertex_size == 0 {
            return Err(DeviceError::InvalidArgument("zero vertex size".into()));
        }
        let capacity = self.streams.vertex.size();
        let required = vertex_size
            .checked_mul(vertex_count)
            .ok_or(DeviceError::StreamBufferOverflow {
                requested: u32::MAX,
                capacity,
            })?;

        let mapping = self.streams.vertex.map(&mut self.driver, vertex_size, required)?;
        Ok(VertexMapping {
            base_vertex: mapping.offset / vertex_size,
            space_vertices: mapping.space / vertex_size,
            data: mapping.data,
        })
    }

    pub(crate) fn map_indices(&mut self, index_count: u32) -> Result<IndexMapping<'_>> {
        let capacity = self.streams.index.size();
        let required = index_count
            .checked_mul(INDEX_SIZE)
            .ok_or(DeviceError::StreamBufferOverflow {
                requested: u32::MAX,
                capacity,
            })?;

        let mapping = self.streams.index.map(&mut self.driver, INDEX_SIZE, required)?;
        let whole = mapping.data.len() / INDEX_SIZE as usize * INDEX_SIZE as usize;
        let (bytes, _) = mapping.data.split_at_mut(whole);
        let data = bytemuck::try_cast_slice_mut::<u8, DrawIndex>(bytes)
            .map_err(|_| DeviceError::MapFailed("index"))?;
        Ok(IndexMapping {
            base_index: mapping.offset / INDEX_SIZE,
            space_indices: mapping.space / INDEX_SIZE,
            data,
        })
    }

    pub(crate) fn map_uniforms(&mut self, size: u32) -> Result<&mut [u8]> {
        let alignment = self.features.uniform_buffer_alignment;
        let mapping = self.streams.uniform.map(&mut self.driver, alignment, size)?;
        Ok(mapping.data.split_at_mut(size as usize).0)
    }

    /// Finish the uniform mapping and bind the written range to the uniform
    /// block.
    pub(crate) fn unmap_uniforms(&mut self, size: u32) {
        let committed = self.streams.uniform.unmap(&mut self.driver, size);
        if let Some((offset, length)) = committed.filter(|&(_, length)| length > 0) {
            self.driver.bind_buffer_range(
                gl::UNIFORM_BUFFER,
                UNIFORM_BLOCK_BINDING,
                self.streams.uniform.name(),
                offset as usize,
                length as usize,
            );
        }
    }

    // ---- Reconciliation ----

    /// Commit clears scheduled on anything the next draw reads or writes.
    fn commit_draw_clears(&mut self, sampler_count: usize) {
        for slot in 0..sampler_count {
            if let SlotResource::Texture(texture) = self.pending.slots[slot].resource {
                self.commit_clear(texture);
            }
        }

        let targets = self
            .pending
            .framebuffer
            .and_then(|id| self.framebuffers.get(id))
            .map(|fb| (fb.color.map(|a| a.texture), fb.depth.map(|a| a.texture)));
        if let Some((color, depth)) = targets {
            for texture in color.into_iter().chain(depth) {
                self.commit_clear(texture);
            }
        }
    }

    /// Bring the driver in line with the pending request. Returns the
    /// primitive to draw, or `None` when the draw has to be skipped.
    pub(crate) fn pre_draw(&mut self) -> Option<GLenum> {
        debug_assert!(self.pending.pipeline.is_some(), "draw without a pipeline");
        let Some(id) = self.pending.pipeline else {
            error!("draw without a pipeline, skipped");
            return None;
        };
        let Some(sampler_count) = self.pipelines.get(id).map(|p| p.layout.sampler_count()) else {
            error!(pipeline = ?id, "draw with a destroyed pipeline, skipped");
            return None;
        };

        self.commit_draw_clears(sampler_count);

        let pipeline = self.pipelines.get(id)?;
        let driver = &mut self.driver;
        let applied = &mut self.applied;
        if applied.pipeline != Some(id) {
            trace!(pipeline = ?id, "applying pipeline state");
            applied.apply_program(driver, pipeline.program.name());
            applied.apply_vertex_array(driver, pipeline.vertex_array.name());
            applied.apply_rasterization_state(driver, &pipeline.rasterization);
            applied.apply_depth_state(driver, &pipeline.depth);
            applied.apply_blend_state(driver, &pipeline.blend);
            applied.pipeline = Some(id);
        }
        let primitive = pipeline.primitive;

        let framebuffer = self
            .pending
            .framebuffer
            .and_then(|fb| self.framebuffers.get(fb))
            .map_or(0, |fb| fb.name);
        applied.apply_framebuffer(driver, framebuffer);
        applied.apply_scissor_test(driver, true);
        applied.apply_viewport(driver, self.pending.viewport);
        applied.apply_scissor(driver, self.pending.scissor);

        for (slot, pending) in self.pending.slots.iter().enumerate().take(sampler_count) {
            let unit = slot as u32;
            let (target, name) = match pending.resource {
                SlotResource::Texture(texture) => self
                    .textures
                    .get(texture)
                    .map_or((gl::TEXTURE_2D, 0), |t| (t.target, t.name)),
                SlotResource::TextureBuffer(buffer) => (
                    gl::TEXTURE_BUFFER,
                    self.texture_buffers.get(buffer).map_or(0, |b| b.texture),
                ),
                SlotResource::None => {
                    // Unbind on whatever target the unit last used.
                    let target = applied.units[slot].texture.map_or(gl::TEXTURE_2D, |(t, _)| t);
                    (target, 0)
                }
            };
            applied.apply_texture(driver, unit, target, name);

            let sampler = pending
                .sampler
                .and_then(|s| self.samplers.get(s))
                .map_or(0, |s| s.name);
            applied.apply_sampler(driver, unit, sampler);
        }

        Some(primitive)
    }

    pub(crate) fn issue_draw(&mut self, vertex_count: u32, base_vertex: u32) {
        let Some(primitive) = self.pre_draw() else {
            return;
        };
        trace!(vertex_count, base_vertex, "draw");
        self.driver
            .draw_arrays(primitive, base_vertex as GLint, vertex_count as GLsizei);
        self.stats.num_draws += 1;
    }

    pub(crate) fn issue_draw_indexed(&mut self, index_count: u32, base_index: u32, base_vertex: u32) {
        let Some(primitive) = self.pre_draw() else {
            return;
        };
        trace!(index_count, base_index, base_vertex, "indexed draw");
        self.driver.draw_elements_base_vertex(
            primitive,
            index_count as GLsizei,
            gl::UNSIGNED_SHORT,
            base_index as usize * INDEX_SIZE as usize,
            base_vertex as GLint,
        );
        self.stats.num_draws += 1;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use gl_driver::{GlCall, HeadlessContext, RecordingDriver};
    use gpu_core::{
        DeviceConfig, GpuDevice, GraphicsConfig, InputLayout, PipelineId, PipelineLayout, Rect,
        ShaderStage, StreamBufferSizes, TextureBufferFormat, VertexAttribute, VertexAttributeType,
        VertexSemantic, MAX_TEXTURE_SAMPLERS,
    };
    use pretty_assertions::assert_eq;

    type Device = OpenGLDevice<RecordingDriver, HeadlessContext>;

    fn device() -> Device {
        let config = DeviceConfig {
            stream_buffers: StreamBufferSizes {
                vertex: 1024,
                index: 512,
                uniform: 4096,
                texture: 1024,
            },
            ..DeviceConfig::default()
        };
        OpenGLDevice::new(RecordingDriver::new(), HeadlessContext::new(100, 50), config).unwrap()
    }

    fn pipeline(dev: &mut Device, layout: PipelineLayout) -> PipelineId {
        let vs = dev.create_shader_from_source(ShaderStage::Vertex, "vs").unwrap();
        let fs = dev.create_shader_from_source(ShaderStage::Fragment, "fs").unwrap();
        let input = InputLayout {
            vertex_attributes: vec![VertexAttribute::new(
                0,
                VertexSemantic::Position,
                0,
                VertexAttributeType::Float,
                3,
                0,
            )],
            vertex_stride: 12,
        };
        let mut config = GraphicsConfig::new(vs, fs, input);
        config.layout = layout;
        dev.create_pipeline(&config).unwrap()
    }

    #[test]
    fn draw_without_pipeline_is_skipped() {
        let mut dev = device();
        dev.driver_mut().clear_calls();
        // Release builds skip the draw; debug builds trip the assertion.
        let result = std::panic::catch_unwind(std::panic::AssertUnwindSafe(|| dev.draw(3, 0)));
        assert_eq!(result.is_err(), cfg!(debug_assertions));
        assert_eq!(dev.driver().count_calls(GlCall::is_draw), 0);
        assert_eq!(dev.stats().num_draws, 0);
    }

    #[test]
    fn vertex_mapping_counts_whole_vertices() {
        let mut dev = device();
        let mapping = dev.map_vertex_buffer(12, 10).unwrap();
        assert_eq!(mapping.base_vertex, 0);
        assert_eq!(mapping.space_vertices, 1024 / 12);
        mapping.data[..4].copy_from_slice(&1.0f32.to_le_bytes());
        dev.unmap_vertex_buffer(12, 10);

        // The next mapping starts on a vertex boundary after the first ten.
        let mapping = dev.map_vertex_buffer(12, 1).unwrap();
        assert_eq!(mapping.base_vertex, 10);
        dev.unmap_vertex_buffer(12, 1);
        assert!(matches!(dev.map_vertex_buffer(0, 1), Err(DeviceError::InvalidArgument(_))));
    }

    #[test]
    fn index_mapping_is_typed() {
        let mut dev = device();
        let mapping = dev.map_index_buffer(6).unwrap();
        assert_eq!(mapping.space_indices, 256);
        mapping.data[..6].copy_from_slice(&[0, 1, 2, 2, 1, 3]);
        dev.unmap_index_buffer(6);

        let index = dev.streams().index.name();
        assert_eq!(&dev.driver().buffer_contents(index)[..4], &[0, 0, 1, 0]);
        assert_eq!(dev.map_index_buffer(1).unwrap().base_index, 6);
    }

    #[test]
    fn uniform_push_binds_the_aligned_range() {
        let mut dev = device();
        dev.push_uniform_buffer(&[1u8; 40]).unwrap();
        dev.push_uniform_buffer(&[2u8; 40]).unwrap();

        let uniform = dev.streams().uniform.name();
        let ranges: Vec<_> = dev
            .driver()
            .calls()
            .iter()
            .filter_map(|c| match c {
                GlCall::BindBufferRange { offset, size, .. } => Some((*offset, *size)),
                _ => None,
            })
            .collect();
        assert_eq!(ranges, vec![(0, 40), (256, 40)]);
        assert_eq!(dev.driver().buffer_contents(uniform)[256], 2);
    }

    #[test]
    #[cfg(not(debug_assertions))]
    fn oversized_uniform_unmap_binds_only_the_mapping() {
        let mut dev = device();
        dev.map_uniforms(40).unwrap();
        dev.unmap_uniforms(8192);

        let ranges: Vec<_> = dev
            .driver()
            .calls()
            .iter()
            .filter_map(|c| match c {
                GlCall::BindBufferRange { offset, size, .. } => Some((*offset, *size)),
                _ => None,
            })
            .collect();
        assert_eq!(ranges, vec![(0, 4096)]);
        assert_eq!(dev.streams().uniform.position(), 4096);
    }

    #[test]
    fn draw_reconciles_in_order() {
        let mut dev = device();
        let pipe = pipeline(&mut dev, PipelineLayout::SingleTextureAndUbo);
        dev.invalidate_cached_state();
        dev.driver_mut().clear_calls();

        dev.set_pipeline(pipe);
        dev.draw(3, 0);

        let calls = dev.driver().calls();
        let program = dev.pipeline(pipe).unwrap().program();
        assert_eq!(calls[0], GlCall::UseProgram(program));
        assert!(matches!(calls[1], GlCall::BindVertexArray(_)));
        assert_eq!(
            calls.last(),
            Some(&GlCall::DrawArrays {
                mode: gl::TRIANGLES,
                first: 0,
                count: 3
            })
        );
        assert!(calls.contains(&GlCall::Viewport([0, 0, 100, 50])));
        // Only slot 0 is reconciled for a single-texture layout.
        assert!(!calls.contains(&GlCall::ActiveTexture(1)));
    }

    #[test]
    fn indexed_draw_offsets_by_index_size() {
        let mut dev = device();
        let pipe = pipeline(&mut dev, PipelineLayout::SingleTextureAndUbo);
        dev.set_pipeline(pipe);
        dev.draw_indexed(6, 4, 2);

        assert_eq!(
            dev.driver().calls().last(),
            Some(&GlCall::DrawElementsBaseVertex {
                mode: gl::TRIANGLES,
                count: 6,
                ty: gl::UNSIGNED_SHORT,
                offset: 8,
                base_vertex: 2
            })
        );
    }

    #[test]
    fn viewport_and_scissor_changes_are_applied_alone() {
        let mut dev = device();
        let pipe = pipeline(&mut dev, PipelineLayout::SingleTextureAndUbo);
        dev.set_pipeline(pipe);
        dev.draw(3, 0);
        dev.driver_mut().clear_calls();

        dev.set_scissor(Rect::new(10, 10, 20, 20));
        dev.draw(3, 0);
        assert_eq!(
            dev.driver().calls(),
            &[
                GlCall::Scissor([10, 10, 20, 20]),
                GlCall::DrawArrays {
                    mode: gl::TRIANGLES,
                    first: 0,
                    count: 3
                }
            ]
        );
    }

    #[test]
    fn texture_buffer_binds_on_its_target() {
        let mut dev = device();
        let pipe = pipeline(&mut dev, PipelineLayout::MultiTextureAndUbo);
        let buffer = dev.create_texture_buffer(TextureBufferFormat::R16UI, 64).unwrap();
        let texture = dev.texture_buffer(buffer).unwrap().texture();
        dev.set_pipeline(pipe);
        dev.set_texture_buffer(1, Some(buffer));
        dev.draw(3, 0);

        assert_eq!(
            dev.snapshot().units[1].texture,
            Some((gl::TEXTURE_BUFFER, texture))
        );

        dev.destroy_texture_buffer(buffer);
        assert_eq!(dev.snapshot().units[1].texture, Some((gl::TEXTURE_BUFFER, 0)));
        dev.draw(3, 0);
        assert_eq!(dev.snapshot().units[1].texture, Some((gl::TEXTURE_BUFFER, 0)));
    }

    #[test]
    fn out_of_range_slot_is_ignored() {
        let mut dev = device();
        dev.set_texture_sampler(MAX_TEXTURE_SAMPLERS, None, None);
        assert_eq!(dev.pending.slots, [PendingSlot::default(); MAX_TEXTURE_SAMPLERS]);
    }
}
