//! Texture, sampler and buffer descriptions shared by every backend.

use serde::{Deserialize, Serialize};

/// Number of texture/sampler slots a pipeline can read from.
pub const MAX_TEXTURE_SAMPLERS: usize = 8;

/// Maximum number of vertex attributes in one input layout.
pub const MAX_VERTEX_ATTRIBUTES: usize = 8;

/// Element type of index buffers.
pub type DrawIndex = u16;

/// Which graphics API a device drives.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum RenderApi {
    OpenGL,
    OpenGLES,
}

impl std::fmt::Display for RenderApi {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(match self {
            RenderApi::OpenGL => "OpenGL",
            RenderApi::OpenGLES => "OpenGL ES",
        })
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ShaderStage {
    Vertex,
    Fragment,
    Geometry,
}

impl ShaderStage {
    pub fn name(self) -> &'static str {
        match self {
            ShaderStage::Vertex => "vertex",
            ShaderStage::Fragment => "fragment",
            ShaderStage::Geometry => "geometry",
        }
    }
}

/// Pixel formats textures and render targets can be created with.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TextureFormat {
    Rgba8,
    Bgra8,
    Rgb565,
    Rgba5551,
    R8,
    R16,
    R16F,
    R32F,
    Rgba16F,
    Rgba32F,
    D16,
    D32F,
}

impl TextureFormat {
    pub fn bytes_per_pixel(self) -> u32 {
        match self {
            TextureFormat::R8 => 1,
            TextureFormat::Rgb565
            | TextureFormat::Rgba5551
            | TextureFormat::R16
            | TextureFormat::R16F
            | TextureFormat::D16 => 2,
            TextureFormat::Rgba8
            | TextureFormat::Bgra8
            | TextureFormat::R32F
            | TextureFormat::D32F => 4,
            TextureFormat::Rgba16F => 8,
            TextureFormat::Rgba32F => 16,
        }
    }

    pub fn is_depth(self) -> bool {
        matches!(self, TextureFormat::D16 | TextureFormat::D32F)
    }
}

/// How a texture is going to be used.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TextureUsage {
    /// Sampled only, filled by uploads.
    Texture,
    RenderTarget,
    DepthStencil,
}

/// Creation parameters for a texture.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct TextureDesc {
    pub width: u32,
    pub height: u32,
    pub layers: u32,
    pub levels: u32,
    pub samples: u32,
    pub usage: TextureUsage,
    pub format: TextureFormat,
}

impl TextureDesc {
    /// A single-level, single-layer texture.
    pub fn new_2d(width: u32, height: u32, format: TextureFormat, usage: TextureUsage) -> Self {
        Self {
            width,
            height,
            layers: 1,
            levels: 1,
            samples: 1,
            usage,
            format,
        }
    }

    pub fn is_multisampled(&self) -> bool {
        self.samples > 1
    }

    pub fn is_array(&self) -> bool {
        self.layers > 1
    }

    /// Width and height of mip `level`, never below one texel.
    pub fn level_size(&self, level: u32) -> (u32, u32) {
        ((self.width >> level).max(1), (self.height >> level).max(1))
    }

    /// Tightly packed row pitch for mip `level`.
    pub fn level_pitch(&self, level: u32) -> u32 {
        self.level_size(level).0 * self.format.bytes_per_pixel()
    }
}

/// A rectangle inside one layer/level of a texture.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct TextureRegion {
    pub x: u32,
    pub y: u32,
    pub layer: u32,
    pub level: u32,
}

impl TextureRegion {
    pub fn origin() -> Self {
        Self::default()
    }

    pub fn at(x: u32, y: u32) -> Self {
        Self {
            x,
            y,
            ..Self::default()
        }
    }
}

/// Integer rectangle in window coordinates.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct Rect {
    pub x: i32,
    pub y: i32,
    pub width: u32,
    pub height: u32,
}

impl Rect {
    pub const fn new(x: i32, y: i32, width: u32, height: u32) -> Self {
        Self {
            x,
            y,
            width,
            height,
        }
    }

    pub const fn from_size(width: u32, height: u32) -> Self {
        Self::new(0, 0, width, height)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Filter {
    Nearest,
    Linear,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum AddressMode {
    Repeat,
    ClampToEdge,
    ClampToBorder,
    MirrorRepeat,
}

/// Sampler state. `max_lod == 0` disables mipmapped minification.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct SamplerConfig {
    pub min_filter: Filter,
    pub mag_filter: Filter,
    pub mip_filter: Filter,
    pub address_u: AddressMode,
    pub address_v: AddressMode,
    pub address_w: AddressMode,
    pub anisotropy: u8,
    pub min_lod: u8,
    pub max_lod: u8,
    /// RGBA8, red in the low byte.
    pub border_color: u32,
}

impl SamplerConfig {
    pub const fn point() -> Self {
        Self {
            min_filter: Filter::Nearest,
            mag_filter: Filter::Nearest,
            mip_filter: Filter::Nearest,
            address_u: AddressMode::ClampToEdge,
            address_v: AddressMode::ClampToEdge,
            address_w: AddressMode::ClampToEdge,
            anisotropy: 1,
            min_lod: 0,
            max_lod: 0,
            border_color: 0,
        }
    }

    pub const fn linear() -> Self {
        Self {
            min_filter: Filter::Linear,
            mag_filter: Filter::Linear,
            mip_filter: Filter::Linear,
            ..Self::point()
        }
    }

    /// Border color as normalized floats.
    pub fn border_color_f32(&self) -> [f32; 4] {
        let c = self.border_color.to_le_bytes();
        [
            f32::from(c[0]) / 255.0,
            f32::from(c[1]) / 255.0,
            f32::from(c[2]) / 255.0,
            f32::from(c[3]) / 255.0,
        ]
    }
}

impl Default for SamplerConfig {
    fn default() -> Self {
        Self::point()
    }
}

/// Element formats for texture buffers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TextureBufferFormat {
    R16UI,
}

impl TextureBufferFormat {
    pub fn element_size(self) -> u32 {
        match self {
            TextureBufferFormat::R16UI => 2,
        }
    }
}

/// Unpack an RGBA8 color (red in the low byte) to floats.
pub fn rgba8_to_f32(rgba: u32) -> [f32; 4] {
    SamplerConfig {
        border_color: rgba,
        ..SamplerConfig::point()
    }
    .border_color_f32()
}
