//! Device configuration.
//!
//! Everything has a default, so a JSON document only needs the fields it
//! wants to change:
//!
//! ```
//! let config = gpu_core::DeviceConfig::from_json(r#"{ "vsync": true }"#).unwrap();
//! assert!(config.vsync);
//! assert_eq!(config.timestamp_queries, 3);
//! ```

use serde::{Deserialize, Serialize};

use crate::error::{DeviceError, Result};

const MIB: u32 = 1024 * 1024;

/// Number of fenced segments each stream buffer is split into.
pub const STREAM_BUFFER_SYNC_SEGMENTS: u32 = 16;

/// Capacities of the per-device stream buffers, in bytes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct StreamBufferSizes {
    pub vertex: u32,
    pub index: u32,
    pub uniform: u32,
    pub texture: u32,
}

impl Default for StreamBufferSizes {
    fn default() -> Self {
        Self {
            vertex: 8 * MIB,
            index: 4 * MIB,
            uniform: 2 * MIB,
            texture: 16 * MIB,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct DeviceConfig {
    /// Enables debug groups and messages when the driver supports them.
    pub debug_device: bool,
    pub vsync: bool,
    /// Start GPU timing as soon as the device is created.
    pub gpu_timing: bool,
    /// Size of the timer query ring.
    pub timestamp_queries: u32,
    pub stream_buffers: StreamBufferSizes,
}

impl Default for DeviceConfig {
    fn default() -> Self {
        Self {
            debug_device: false,
            vsync: false,
            gpu_timing: false,
            timestamp_queries: 3,
            stream_buffers: StreamBufferSizes::default(),
        }
    }
}

impl DeviceConfig {
    pub fn from_json(json: &str) -> Result<Self> {
        let config: Self =
            serde_json::from_str(json).map_err(|e| DeviceError::InvalidConfig(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<()> {
        if self.timestamp_queries == 0 {
            return Err(DeviceError::InvalidConfig(
                "timestamp_queries must be at least 1".into(),
            ));
        }

        let sizes = &self.stream_buffers;
        for (name, size) in [
            ("vertex", sizes.vertex),
            ("index", sizes.index),
            ("uniform", sizes.uniform),
            ("texture", sizes.texture),
        ] {
            if size < STREAM_BUFFER_SYNC_SEGMENTS {
                return Err(DeviceError::InvalidConfig(format!(
                    "{name} stream buffer of {size} bytes is smaller than its {STREAM_BUFFER_SYNC_SEGMENTS} sync segments"
                )));
            }
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn empty_document_gives_defaults() {
        let config = DeviceConfig::from_json("{}").unwrap();
        assert_eq!(config, DeviceConfig::default());
        assert_eq!(config.stream_buffers.vertex, 8 * MIB);
        assert_eq!(config.stream_buffers.texture, 16 * MIB);
    }

    #[test]
    fn partial_buffer_sizes_keep_other_defaults() {
        let config = DeviceConfig::from_json(r#"{ "stream_buffers": { "index": 65536 } }"#).unwrap();
        assert_eq!(
            config.stream_buffers,
            StreamBufferSizes {
                index: 65536,
                ..StreamBufferSizes::default()
            }
        );
    }

    #[test]
    fn zero_queries_rejected() {
        let err = DeviceConfig::from_json(r#"{ "timestamp_queries": 0 }"#).unwrap_err();
        assert!(matches!(err, DeviceError::InvalidConfig(_)));
    }

    #[test]
    fn tiny_stream_buffer_rejected() {
        let mut config = DeviceConfig::default();
        config.stream_buffers.uniform = 8;
        assert!(config.validate().is_err());
    }

    #[test]
    fn malformed_json_is_a_config_error() {
        assert!(matches!(
            DeviceConfig::from_json("{ vsync"),
            Err(DeviceError::InvalidConfig(_))
        ));
    }
}
