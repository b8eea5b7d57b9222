#![allow(dead_code)]

use gl_device::OpenGLDevice;
use gl_driver::{GlCall, HeadlessContext, RecordingDriver};
use gpu_core::{
    DeviceConfig, GpuDevice, GraphicsConfig, InputLayout, PipelineLayout, ShaderId, ShaderStage,
    StreamBufferSizes, VertexAttribute, VertexAttributeType, VertexSemantic,
};

pub type Device = OpenGLDevice<RecordingDriver, HeadlessContext>;

pub fn device() -> Device {
    device_with(DeviceConfig {
        stream_buffers: StreamBufferSizes {
            vertex: 4096,
            index: 2048,
            uniform: 4096,
            texture: 4096,
        },
        ..DeviceConfig::default()
    })
}

pub fn device_with(config: DeviceConfig) -> Device {
    gpu_core::logging::init_logging_with_default("warn");
    OpenGLDevice::new(RecordingDriver::new(), HeadlessContext::new(320, 240), config)
        .expect("headless device")
}

pub fn shaders(dev: &mut Device, fragment: &str) -> (ShaderId, ShaderId) {
    let vs = dev
        .create_shader_from_source(ShaderStage::Vertex, "void main() { gl_Position = a_pos0; }")
        .unwrap();
    let fs = dev.create_shader_from_source(ShaderStage::Fragment, fragment).unwrap();
    (vs, fs)
}

pub fn position_uv_layout() -> InputLayout {
    InputLayout {
        vertex_attributes: vec![
            VertexAttribute::new(0, VertexSemantic::Position, 0, VertexAttributeType::Float, 2, 0),
            VertexAttribute::new(1, VertexSemantic::TexCoord, 0, VertexAttributeType::Float, 2, 8),
        ],
        vertex_stride: 16,
    }
}

pub fn config(vs: ShaderId, fs: ShaderId, layout: PipelineLayout) -> GraphicsConfig {
    let mut config = GraphicsConfig::new(vs, fs, position_uv_layout());
    config.layout = layout;
    config
}

pub fn count(dev: &Device, pred: impl Fn(&GlCall) -> bool) -> usize {
    dev.driver().count_calls(pred)
}
