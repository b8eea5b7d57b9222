//! Shader and pipeline objects.

use gl::types::{GLenum, GLuint};
use gpu_core::{
    BlendState, DepthState, PipelineLayout, Primitive, RasterizationState, ShaderStage,
};

use crate::program_cache::{CachedProgram, ShaderDigest};
use crate::vao_cache::CachedVertexArray;

/// A compiled shader stage, kept around until the caller destroys it so
/// pipelines created later can link against it.
#[derive(Debug)]
pub struct OpenGLShader {
    pub(crate) stage: ShaderStage,
    pub(crate) name: GLuint,
    pub(crate) digest: ShaderDigest,
}

impl OpenGLShader {
    pub fn stage(&self) -> ShaderStage {
        self.stage
    }

    pub fn name(&self) -> GLuint {
        self.name
    }

    pub fn digest(&self) -> &ShaderDigest {
        &self.digest
    }
}

/// A pipeline holds one handle into each object cache plus the fixed-function
/// state it applies at draw time.
#[derive(Debug)]
pub struct OpenGLPipeline {
    pub(crate) program: CachedProgram,
    pub(crate) vertex_array: CachedVertexArray,
    pub(crate) layout: PipelineLayout,
    pub(crate) primitive: GLenum,
    pub(crate) rasterization: RasterizationState,
    pub(crate) depth: DepthState,
    pub(crate) blend: BlendState,
}

impl OpenGLPipeline {
    pub fn program(&self) -> GLuint {
        self.program.name()
    }

    pub fn vertex_array(&self) -> GLuint {
        self.vertex_array.name()
    }

    pub fn layout(&self) -> PipelineLayout {
        self.layout
    }

    pub fn blend(&self) -> &BlendState {
        &self.blend
    }
}

pub(crate) fn gl_primitive(primitive: Primitive) -> GLenum {
    match primitive {
        Primitive::Points => gl::POINTS,
        Primitive::Lines => gl::LINES,
        Primitive::Triangles => gl::TRIANGLES,
        Primitive::TriangleStrips => gl::TRIANGLE_STRIP,
    }
}

pub(crate) fn gl_shader_stage(stage: ShaderStage) -> GLenum {
    match stage {
        ShaderStage::Vertex => gl::VERTEX_SHADER,
        ShaderStage::Fragment => gl::FRAGMENT_SHADER,
        ShaderStage::Geometry => gl::GEOMETRY_SHADER,
    }
}
