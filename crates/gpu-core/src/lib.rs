//! API-agnostic data model for the rendering backend.
//!
//! - [`GpuDevice`] is the capability set a backend implements.
//! - [`GraphicsConfig`] and friends describe pipelines declaratively.
//! - [`TextureDesc`] / [`SamplerConfig`] describe sampled resources.
//! - [`DeviceConfig`] carries the tunables, [`DeviceError`] the failures.
//! - [`logging::init_logging`] installs a `tracing` subscriber.

pub mod config;
pub mod device;
pub mod error;
pub mod logging;
pub mod pipeline;
pub mod types;

pub use config::{DeviceConfig, StreamBufferSizes, STREAM_BUFFER_SYNC_SEGMENTS};
pub use device::{
    Attachment, FramebufferId, GpuDevice, IndexMapping, PipelineId, SamplerId, ShaderId,
    TextureBufferId, TextureBufferMapping, TextureId, VertexMapping,
};
pub use error::{DeviceError, Result};
pub use pipeline::{
    BlendFunc, BlendOp, BlendState, ColorWriteMask, CullMode, DepthFunc, DepthState,
    GraphicsConfig, InputLayout, PipelineLayout, Primitive, RasterizationState, VertexAttribute,
    VertexAttributeType, VertexSemantic,
};
pub use types::{
    rgba8_to_f32, AddressMode, DrawIndex, Filter, Rect, RenderApi, SamplerConfig, ShaderStage,
    TextureBufferFormat, TextureDesc, TextureFormat, TextureRegion, TextureUsage,
    MAX_TEXTURE_SAMPLERS, MAX_VERTEX_ATTRIBUTES,
};
