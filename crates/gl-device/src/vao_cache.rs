//! Vertex array objects shared between pipelines with the same vertex layout.

use gl::types::{GLenum, GLint, GLsizei, GLuint};
use gl_driver::GlDriver;
use gpu_core::{DeviceError, InputLayout, Result, VertexAttributeType};
use tracing::debug;

use crate::cache::{ObjectCache, SharedObject};

/// Layout of one attribute as the VAO records it. Semantics do not matter
/// here, only where the data sits.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct VertexArrayAttribute {
    pub index: u32,
    pub ty: VertexAttributeType,
    pub components: u32,
    pub offset: u32,
    pub divisor: u32,
}

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct VertexArrayCacheKey {
    pub attributes: Vec<VertexArrayAttribute>,
    pub stride: u32,
}

impl VertexArrayCacheKey {
    pub fn from_layout(layout: &InputLayout) -> Self {
        Self {
            attributes: layout
                .vertex_attributes
                .iter()
                .map(|a| VertexArrayAttribute {
                    index: a.index,
                    ty: a.ty,
                    components: a.components,
                    offset: a.offset,
                    divisor: a.divisor,
                })
                .collect(),
            stride: layout.vertex_stride,
        }
    }
}

pub type VertexArrayCache = ObjectCache<VertexArrayCacheKey>;
pub type CachedVertexArray = SharedObject<VertexArrayCacheKey>;

pub(crate) fn gl_attribute_type(ty: VertexAttributeType) -> GLenum {
    match ty {
        VertexAttributeType::Float => gl::FLOAT,
        VertexAttributeType::UInt8 | VertexAttributeType::UNorm8 => gl::UNSIGNED_BYTE,
        VertexAttributeType::SInt8 => gl::BYTE,
        VertexAttributeType::UInt16 | VertexAttributeType::UNorm16 => gl::UNSIGNED_SHORT,
        VertexAttributeType::SInt16 => gl::SHORT,
        VertexAttributeType::UInt32 => gl::UNSIGNED_INT,
        VertexAttributeType::SInt32 => gl::INT,
    }
}

/// Build a VAO reading `key`'s layout from the device's vertex stream, with
/// the index stream as its element buffer. Rebinds `restore_vao` (or 0 when
/// unknown) afterwards.
pub(crate) fn create_vertex_array<D: GlDriver>(
    driver: &mut D,
    key: &VertexArrayCacheKey,
    vertex_buffer: GLuint,
    index_buffer: GLuint,
    restore_vao: Option<GLuint>,
) -> Result<GLuint> {
    let vao = driver.gen_vertex_array();
    if vao == 0 {
        return Err(DeviceError::Unsupported("vertex array objects"));
    }

    driver.bind_vertex_array(vao);
    driver.bind_buffer(gl::ARRAY_BUFFER, vertex_buffer);
    driver.bind_buffer(gl::ELEMENT_ARRAY_BUFFER, index_buffer);

    let stride = key.stride as GLsizei;
    for attr in &key.attributes {
        let ty = gl_attribute_type(attr.ty);
        let components = attr.components as GLint;
        let offset = attr.offset as usize;

        driver.enable_vertex_attrib_array(attr.index);
        if attr.ty.is_integer() {
            driver.vertex_attrib_i_pointer(attr.index, components, ty, stride, offset);
        } else {
            driver.vertex_attrib_pointer(
                attr.index,
                components,
                ty,
                attr.ty.is_normalized(),
                stride,
                offset,
            );
        }
        if attr.divisor != 0 {
            driver.vertex_attrib_divisor(attr.index, attr.divisor);
        }
    }

    driver.bind_vertex_array(restore_vao.unwrap_or(0));

    debug!(vao, attributes = key.attributes.len(), stride, "created vertex array");
    Ok(vao)
}

#[cfg(test)]
mod tests {
    use super::*;
    use gl_driver::{GlCall, RecordingDriver};
    use gpu_core::{VertexAttribute, VertexSemantic};
    use pretty_assertions::assert_eq;

    fn sprite_layout() -> InputLayout {
        InputLayout {
            vertex_attributes: vec![
                VertexAttribute::new(0, VertexSemantic::Position, 0, VertexAttributeType::Float, 2, 0),
                VertexAttribute::new(1, VertexSemantic::TexCoord, 0, VertexAttributeType::UInt16, 2, 8),
                VertexAttribute::new(2, VertexSemantic::Color, 0, VertexAttributeType::UNorm8, 4, 12),
            ],
            vertex_stride: 16,
        }
    }

    #[test]
    fn semantics_do_not_split_layouts() {
        let a = sprite_layout();
        let mut b = sprite_layout();
        b.vertex_attributes[1].semantic = VertexSemantic::Color;
        b.vertex_attributes[1].semantic_index = 3;
        assert_eq!(VertexArrayCacheKey::from_layout(&a), VertexArrayCacheKey::from_layout(&b));

        let mut c = sprite_layout();
        c.vertex_stride = 20;
        assert_ne!(VertexArrayCacheKey::from_layout(&a), VertexArrayCacheKey::from_layout(&c));
    }

    #[test]
    fn vao_records_layout_and_restores_binding() {
        let mut driver = RecordingDriver::new();
        let key = VertexArrayCacheKey::from_layout(&sprite_layout());

        let vao = create_vertex_array(&mut driver, &key, 10, 11, Some(5)).unwrap();
        let calls = driver.take_calls();

        assert_eq!(calls[1], GlCall::BindVertexArray(vao));
        assert!(calls.contains(&GlCall::BindBuffer { target: gl::ELEMENT_ARRAY_BUFFER, buffer: 11 }));
        assert!(calls.contains(&GlCall::VertexAttribPointer {
            index: 0,
            size: 2,
            ty: gl::FLOAT,
            normalized: false,
            stride: 16,
            offset: 0
        }));
        assert!(calls.contains(&GlCall::VertexAttribIPointer {
            index: 1,
            size: 2,
            ty: gl::UNSIGNED_SHORT,
            stride: 16,
            offset: 8
        }));
        assert!(calls.contains(&GlCall::VertexAttribPointer {
            index: 2,
            size: 4,
            ty: gl::UNSIGNED_BYTE,
            normalized: true,
            stride: 16,
            offset: 12
        }));
        assert_eq!(calls.last(), Some(&GlCall::BindVertexArray(5)));
    }

    #[test]
    fn divisor_only_for_instanced_attributes() {
        let mut driver = RecordingDriver::new();
        let mut layout = sprite_layout();
        layout.vertex_attributes[2].divisor = 1;
        let key = VertexArrayCacheKey::from_layout(&layout);

        create_vertex_array(&mut driver, &key, 1, 2, None).unwrap();
        let divisors: Vec<_> = driver
            .calls()
            .iter()
            .filter(|c| matches!(c, GlCall::VertexAttribDivisor { .. }))
            .cloned()
            .collect();
        assert_eq!(divisors, vec![GlCall::VertexAttribDivisor { index: 2, divisor: 1 }]);
    }
}
