//! Declarative pipeline description.
//!
//! A [`GraphicsConfig`] bundles shader stages, vertex layout and the
//! fixed-function state a draw runs with. Backends are free to share the
//! expensive driver objects behind content-equal parts of two configs.

use bitflags::bitflags;

use crate::device::ShaderId;
use crate::types::TextureFormat;

/// How textures and uniforms are exposed to the shaders of a pipeline.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum PipelineLayout {
    /// One sampler in slot 0, uniforms in the uniform block.
    SingleTextureAndUbo,
    /// One sampler in slot 0, uniforms pushed through the uniform stream.
    SingleTextureAndPushConstants,
    /// All [`MAX_TEXTURE_SAMPLERS`](crate::MAX_TEXTURE_SAMPLERS) samplers.
    MultiTextureAndUbo,
}

impl PipelineLayout {
    pub fn sampler_count(self) -> usize {
        match self {
            PipelineLayout::SingleTextureAndUbo | PipelineLayout::SingleTextureAndPushConstants => 1,
            PipelineLayout::MultiTextureAndUbo => crate::MAX_TEXTURE_SAMPLERS,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Primitive {
    Points,
    Lines,
    Triangles,
    TriangleStrips,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum CullMode {
    None,
    Front,
    Back,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum DepthFunc {
    Never,
    Always,
    Less,
    LessEqual,
    Greater,
    GreaterEqual,
    Equal,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum BlendFunc {
    Zero,
    One,
    SrcColor,
    InvSrcColor,
    DstColor,
    InvDstColor,
    SrcAlpha,
    InvSrcAlpha,
    SrcAlpha1,
    InvSrcAlpha1,
    DstAlpha,
    InvDstAlpha,
    ConstantColor,
    InvConstantColor,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum BlendOp {
    Add,
    Subtract,
    ReverseSubtract,
    Min,
    Max,
}

bitflags! {
    /// Color channels written by a draw.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
    pub struct ColorWriteMask: u8 {
        const RED = 1 << 0;
        const GREEN = 1 << 1;
        const BLUE = 1 << 2;
        const ALPHA = 1 << 3;
        const COLOR = Self::RED.bits() | Self::GREEN.bits() | Self::BLUE.bits();
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct RasterizationState {
    pub cull_mode: CullMode,
}

impl RasterizationState {
    pub const fn no_cull() -> Self {
        Self {
            cull_mode: CullMode::None,
        }
    }
}

impl Default for RasterizationState {
    fn default() -> Self {
        Self::no_cull()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct DepthState {
    pub func: DepthFunc,
    pub write: bool,
}

impl DepthState {
    /// Depth testing and writing both off.
    pub const fn no_test() -> Self {
        Self {
            func: DepthFunc::Always,
            write: false,
        }
    }

    /// Every fragment passes and writes its depth.
    pub const fn always_write() -> Self {
        Self {
            func: DepthFunc::Always,
            write: true,
        }
    }

    /// True when the state needs the driver's depth test enabled at all.
    pub fn test_enabled(&self) -> bool {
        self.func != DepthFunc::Always || self.write
    }
}

impl Default for DepthState {
    fn default() -> Self {
        Self::no_test()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Hash, Eq)]
pub struct BlendState {
    pub enable: bool,
    pub src_blend: BlendFunc,
    pub dst_blend: BlendFunc,
    pub blend_op: BlendOp,
    pub src_alpha_blend: BlendFunc,
    pub dst_alpha_blend: BlendFunc,
    pub alpha_blend_op: BlendOp,
    pub write_mask: ColorWriteMask,
    /// RGBA8 constant color, red in the low byte.
    pub constant: u32,
}

impl BlendState {
    pub const fn no_blending() -> Self {
        Self {
            enable: false,
            src_blend: BlendFunc::One,
            dst_blend: BlendFunc::Zero,
            blend_op: BlendOp::Add,
            src_alpha_blend: BlendFunc::One,
            dst_alpha_blend: BlendFunc::Zero,
            alpha_blend_op: BlendOp::Add,
            write_mask: ColorWriteMask::all(),
            constant: 0,
        }
    }

    pub const fn alpha_blending() -> Self {
        Self {
            enable: true,
            src_blend: BlendFunc::SrcAlpha,
            dst_blend: BlendFunc::InvSrcAlpha,
            blend_op: BlendOp::Add,
            src_alpha_blend: BlendFunc::One,
            dst_alpha_blend: BlendFunc::Zero,
            alpha_blend_op: BlendOp::Add,
            write_mask: ColorWriteMask::all(),
            constant: 0,
        }
    }

    /// Compares the parts the driver's blend function/equation consume.
    pub fn same_equation(&self, other: &BlendState) -> bool {
        self.src_blend == other.src_blend
            && self.dst_blend == other.dst_blend
            && self.blend_op == other.blend_op
            && self.src_alpha_blend == other.src_alpha_blend
            && self.dst_alpha_blend == other.dst_alpha_blend
            && self.alpha_blend_op == other.alpha_blend_op
    }
}

impl Default for BlendState {
    fn default() -> Self {
        Self::no_blending()
    }
}

/// Meaning of a vertex attribute, used to name it in the shader.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum VertexSemantic {
    Position,
    TexCoord,
    Color,
}

impl VertexSemantic {
    /// Prefix of the shader input this semantic binds to.
    pub fn attribute_prefix(self) -> &'static str {
        match self {
            VertexSemantic::Position => "a_pos",
            VertexSemantic::TexCoord => "a_tex",
            VertexSemantic::Color => "a_col",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum VertexAttributeType {
    Float,
    UInt8,
    SInt8,
    UNorm8,
    UInt16,
    SInt16,
    UNorm16,
    UInt32,
    SInt32,
}

impl VertexAttributeType {
    pub fn size(self) -> u32 {
        match self {
            VertexAttributeType::UInt8 | VertexAttributeType::SInt8 | VertexAttributeType::UNorm8 => 1,
            VertexAttributeType::UInt16 | VertexAttributeType::SInt16 | VertexAttributeType::UNorm16 => 2,
            VertexAttributeType::Float | VertexAttributeType::UInt32 | VertexAttributeType::SInt32 => 4,
        }
    }

    /// Integer attributes reach the shader unconverted.
    pub fn is_integer(self) -> bool {
        !matches!(
            self,
            VertexAttributeType::Float | VertexAttributeType::UNorm8 | VertexAttributeType::UNorm16
        )
    }

    pub fn is_normalized(self) -> bool {
        matches!(self, VertexAttributeType::UNorm8 | VertexAttributeType::UNorm16)
    }
}

/// One attribute of the vertex stream.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct VertexAttribute {
    /// Shader attribute location.
    pub index: u32,
    pub semantic: VertexSemantic,
    pub semantic_index: u32,
    pub ty: VertexAttributeType,
    pub components: u32,
    /// Byte offset inside one vertex.
    pub offset: u32,
    /// Instancing divisor, 0 for per-vertex data.
    pub divisor: u32,
}

impl VertexAttribute {
    pub const fn new(
        index: u32,
        semantic: VertexSemantic,
        semantic_index: u32,
        ty: VertexAttributeType,
        components: u32,
        offset: u32,
    ) -> Self {
        Self {
            index,
            semantic,
            semantic_index,
            ty,
            components,
            offset,
            divisor: 0,
        }
    }

    /// Shader input name, e.g. `a_tex0`.
    pub fn shader_name(&self) -> String {
        format!("{}{}", self.semantic.attribute_prefix(), self.semantic_index)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Hash, Default)]
pub struct InputLayout {
    pub vertex_attributes: Vec<VertexAttribute>,
    pub vertex_stride: u32,
}

/// Full description of a graphics pipeline.
#[derive(Debug, Clone, PartialEq)]
pub struct GraphicsConfig {
    pub layout: PipelineLayout,
    pub primitive: Primitive,
    pub input_layout: InputLayout,
    pub rasterization: RasterizationState,
    pub depth: DepthState,
    pub blend: BlendState,
    pub vertex_shader: ShaderId,
    pub fragment_shader: ShaderId,
    pub geometry_shader: Option<ShaderId>,
    pub color_format: Option<TextureFormat>,
    pub depth_format: Option<TextureFormat>,
    pub samples: u32,
    pub per_sample_shading: bool,
}

impl GraphicsConfig {
    /// Triangle list pipeline with default fixed-function state.
    pub fn new(vertex_shader: ShaderId, fragment_shader: ShaderId, input_layout: InputLayout) -> Self {
        Self {
            layout: PipelineLayout::SingleTextureAndUbo,
            primitive: Primitive::Triangles,
            input_layout,
            rasterization: RasterizationState::default(),
            depth: DepthState::default(),
            blend: BlendState::default(),
            vertex_shader,
            fragment_shader,
            geometry_shader: None,
            color_format: Some(TextureFormat::Rgba8),
            depth_format: None,
            samples: 1,
            per_sample_shading: false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn depth_test_needed_unless_always_without_write() {
        assert!(!DepthState::no_test().test_enabled());
        assert!(DepthState::always_write().test_enabled());
        assert!(DepthState {
            func: DepthFunc::Less,
            write: false
        }
        .test_enabled());
    }

    #[test]
    fn unorm_attributes_are_not_integer() {
        assert!(VertexAttributeType::UInt16.is_integer());
        assert!(!VertexAttributeType::UNorm8.is_integer());
        assert!(VertexAttributeType::UNorm8.is_normalized());
        assert!(!VertexAttributeType::Float.is_integer());
    }

    #[test]
    fn attribute_names_follow_semantic() {
        let attr = VertexAttribute::new(2, VertexSemantic::TexCoord, 1, VertexAttributeType::Float, 2, 8);
        assert_eq!(attr.shader_name(), "a_tex1");
    }

    #[test]
    fn blend_equation_ignores_write_mask() {
        let mut a = BlendState::alpha_blending();
        let b = a;
        a.write_mask = ColorWriteMask::COLOR;
        assert!(a.same_equation(&b));
        assert_ne!(a, b);
    }
}
