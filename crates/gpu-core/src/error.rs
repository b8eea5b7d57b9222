use crate::types::{ShaderStage, TextureFormat};

/// Failures reported by device creation and resource calls.
#[derive(Debug, thiserror::Error)]
pub enum DeviceError {
    #[error("failed to compile {} shader: {log}", stage.name())]
    ShaderCompile { stage: ShaderStage, log: String },

    #[error("failed to link program: {0}")]
    ProgramLink(String),

    #[error("texture format {0:?} is not supported by this device")]
    UnsupportedFormat(TextureFormat),

    #[error("invalid texture dimensions {width}x{height} ({layers} layers, {levels} levels, {samples} samples)")]
    InvalidDimensions {
        width: u32,
        height: u32,
        layers: u32,
        levels: u32,
        samples: u32,
    },

    #[error("framebuffer is incomplete (status {0:#06x})")]
    FramebufferIncomplete(u32),

    #[error("stream buffer request of {requested} bytes exceeds capacity of {capacity} bytes")]
    StreamBufferOverflow { requested: u32, capacity: u32 },

    #[error("failed to map {0} buffer")]
    MapFailed(&'static str),

    #[error("{0} handle is stale or unknown")]
    InvalidHandle(&'static str),

    #[error("{0} is not supported by this device")]
    Unsupported(&'static str),

    #[error("invalid argument: {0}")]
    InvalidArgument(String),

    #[error("invalid device configuration: {0}")]
    InvalidConfig(String),

    #[error("context error: {0}")]
    Context(#[from] anyhow::Error),
}

pub type Result<T> = std::result::Result<T, DeviceError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn messages_carry_diagnostics() {
        let err = DeviceError::ShaderCompile {
            stage: ShaderStage::Fragment,
            log: "0:3: syntax error".into(),
        };
        assert_eq!(err.to_string(), "failed to compile fragment shader: 0:3: syntax error");

        let err = DeviceError::StreamBufferOverflow {
            requested: 10,
            capacity: 4,
        };
        assert_eq!(
            err.to_string(),
            "stream buffer request of 10 bytes exceeds capacity of 4 bytes"
        );
    }

    #[test]
    fn context_errors_convert_from_anyhow() {
        fn fails() -> Result<()> {
            let lost: anyhow::Result<()> = Err(anyhow::anyhow!("surface lost"));
            lost?;
            Ok(())
        }
        assert!(matches!(fails(), Err(DeviceError::Context(_))));
    }
}
