#![allow(clippy::too_many_arguments)]

//! OpenGL backend for [`gpu_core::GpuDevice`].
//!
//! - [`OpenGLDevice`] is the façade: it owns every driver object and
//!   reconciles requested draw state against [`DrawStateSnapshot`] so only
//!   differing state reaches the driver.
//! - [`ProgramCache`] / [`VertexArrayCache`] share linked programs and vertex
//!   arrays between pipelines with content-equal keys.
//! - [`StreamBuffer`] is the fenced ring used for vertex, index, uniform and
//!   texture uploads.
//! - [`TimestampQueries`] measures GPU time per frame.
//!
//! Everything is generic over [`gl_driver::GlDriver`], so the whole device
//! runs headless against [`gl_driver::RecordingDriver`] in tests.

pub mod cache;
pub mod device;
mod draw;
pub mod features;
pub mod framebuffer;
pub mod pipeline;
pub mod program_cache;
mod resources;
pub mod state;
pub mod stream_buffer;
pub mod texture;
pub mod timestamp;
pub mod vao_cache;

pub use cache::{CachedObject, ObjectCache, SharedObject};
pub use device::{DeviceStats, OpenGLDevice, StreamBuffers};
pub use features::Features;
pub use framebuffer::{AttachmentInfo, OpenGLFramebuffer};
pub use pipeline::{OpenGLPipeline, OpenGLShader};
pub use program_cache::{CachedProgram, ProgramCache, ProgramCacheKey, ShaderDigest};
pub use state::{DrawStateSnapshot, PendingState, UPDATE_TEXTURE_UNIT};
pub use stream_buffer::{StreamBuffer, StreamMapping};
pub use texture::{OpenGLSampler, OpenGLTexture, OpenGLTextureBuffer, PendingClear};
pub use timestamp::TimestampQueries;
pub use vao_cache::{CachedVertexArray, VertexArrayCache, VertexArrayCacheKey};
