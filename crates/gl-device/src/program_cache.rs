//! Linked programs shared between pipelines with the same shader stages.

use gl::types::{GLint, GLuint};
use gl_driver::GlDriver;
use gpu_core::{
    DeviceError, GraphicsConfig, PipelineLayout, Result, ShaderId, ShaderStage, VertexSemantic,
};
use sha2::{Digest, Sha256};
use slotmap::SlotMap;
use tracing::{debug, error};

use crate::cache::{ObjectCache, SharedObject};
use crate::pipeline::OpenGLShader;

/// Uniform block binding every program's `UBOBlock` is attached to.
pub const UNIFORM_BLOCK_BINDING: GLuint = 1;

/// Identity of a shader stage: SHA-256 over the stage and full source, plus
/// the source length.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ShaderDigest {
    hash: [u8; 32],
    length: u64,
}

impl ShaderDigest {
    pub fn new(stage: ShaderStage, source: &str) -> Self {
        let mut hasher = Sha256::new();
        hasher.update(stage.name().as_bytes());
        hasher.update([0u8]);
        hasher.update(source.as_bytes());
        Self {
            hash: hasher.finalize().into(),
            length: source.len() as u64,
        }
    }
}

/// Attribute location bound at link time.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct AttributeBinding {
    pub index: u32,
    pub semantic: VertexSemantic,
    pub semantic_index: u32,
}

/// Everything the link step depends on. Compared structurally.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ProgramCacheKey {
    pub vertex: ShaderDigest,
    pub fragment: ShaderDigest,
    pub geometry: Option<ShaderDigest>,
    pub layout: PipelineLayout,
    pub attributes: Vec<AttributeBinding>,
}

impl ProgramCacheKey {
    pub fn new(config: &GraphicsConfig, shaders: &SlotMap<ShaderId, OpenGLShader>) -> Result<Self> {
        let digest = |id: ShaderId| {
            shaders
                .get(id)
                .map(|s| s.digest)
                .ok_or(DeviceError::InvalidHandle("shader"))
        };

        Ok(Self {
            vertex: digest(config.vertex_shader)?,
            fragment: digest(config.fragment_shader)?,
            geometry: config.geometry_shader.map(digest).transpose()?,
            layout: config.layout,
            attributes: config
                .input_layout
                .vertex_attributes
                .iter()
                .map(|a| AttributeBinding {
                    index: a.index,
                    semantic: a.semantic,
                    semantic_index: a.semantic_index,
                })
                .collect(),
        })
    }
}

pub type ProgramCache = ObjectCache<ProgramCacheKey>;
pub type CachedProgram = SharedObject<ProgramCacheKey>;

/// Link a program from the stages of `config`.
///
/// Binds `restore_program` (or 0 when unknown) afterwards so the caller's
/// view of the bound program stays true.
pub(crate) fn compile_program<D: GlDriver>(
    driver: &mut D,
    shaders: &SlotMap<ShaderId, OpenGLShader>,
    config: &GraphicsConfig,
    gles: bool,
    restore_program: Option<GLuint>,
) -> Result<GLuint> {
    let shader = |id: ShaderId| {
        shaders
            .get(id)
            .map(|s| s.name)
            .ok_or(DeviceError::InvalidHandle("shader"))
    };
    let mut stages = vec![shader(config.vertex_shader)?, shader(config.fragment_shader)?];
    if let Some(gs) = config.geometry_shader {
        stages.push(shader(gs)?);
    }

    let program = driver.create_program();
    if program == 0 {
        return Err(DeviceError::ProgramLink("glCreateProgram() failed".into()));
    }

    for &stage in &stages {
        driver.attach_shader(program, stage);
    }
    for attr in &config.input_layout.vertex_attributes {
        driver.bind_attrib_location(program, attr.index, &attr.shader_name());
    }
    if !gles {
        driver.bind_frag_data_location(program, 0, "o_col0");
    }

    let linked = driver.link_program(program);
    for &stage in &stages {
        driver.detach_shader(program, stage);
    }

    if let Err(log) = linked {
        error!("Failed to link program: {log}");
        driver.delete_program(program);
        return Err(DeviceError::ProgramLink(log));
    }

    if let Some(block) = driver.uniform_block_index(program, "UBOBlock") {
        driver.uniform_block_binding(program, block, UNIFORM_BLOCK_BINDING);
    }

    driver.use_program(program);
    for slot in 0..config.layout.sampler_count() {
        if let Some(location) = driver.uniform_location(program, &format!("samp{slot}")) {
            driver.uniform_1i(location, slot as GLint);
        }
    }
    driver.use_program(restore_program.unwrap_or(0));

    debug!(program, stages = stages.len(), "linked program");
    Ok(program)
}
