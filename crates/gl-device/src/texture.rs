//! Textures, samplers and texture buffers.

use gl::types::{GLenum, GLint, GLuint};
use gl_driver::{GlDriver, PixelSource};
use gpu_core::{
    AddressMode, DeviceError, Filter, Result, SamplerConfig, TextureBufferFormat,
    TextureBufferMapping, TextureDesc, TextureFormat, TextureRegion, STREAM_BUFFER_SYNC_SEGMENTS,
};
use tracing::debug;

use crate::features::Features;
use crate::state::{DrawStateSnapshot, UPDATE_TEXTURE_UNIT};
use crate::stream_buffer::StreamBuffer;

const TEXTURE_MAX_ANISOTROPY: GLenum = 0x84FE;

/// Driver enums for one [`TextureFormat`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct GlFormat {
    pub internal_format: GLenum,
    pub format: GLenum,
    pub ty: GLenum,
}

pub fn gl_format(format: TextureFormat) -> GlFormat {
    let (internal_format, format, ty) = match format {
        TextureFormat::Rgba8 => (gl::RGBA8, gl::RGBA, gl::UNSIGNED_BYTE),
        TextureFormat::Bgra8 => (gl::RGBA8, gl::BGRA, gl::UNSIGNED_BYTE),
        TextureFormat::Rgb565 => (gl::RGB565, gl::RGB, gl::UNSIGNED_SHORT_5_6_5),
        TextureFormat::Rgba5551 => (gl::RGB5_A1, gl::RGBA, gl::UNSIGNED_SHORT_5_5_5_1),
        TextureFormat::R8 => (gl::R8, gl::RED, gl::UNSIGNED_BYTE),
        TextureFormat::R16 => (gl::R16, gl::RED, gl::UNSIGNED_SHORT),
        TextureFormat::R16F => (gl::R16F, gl::RED, gl::HALF_FLOAT),
        TextureFormat::R32F => (gl::R32F, gl::RED, gl::FLOAT),
        TextureFormat::Rgba16F => (gl::RGBA16F, gl::RGBA, gl::HALF_FLOAT),
        TextureFormat::Rgba32F => (gl::RGBA32F, gl::RGBA, gl::FLOAT),
        TextureFormat::D16 => (gl::DEPTH_COMPONENT16, gl::DEPTH_COMPONENT, gl::UNSIGNED_SHORT),
        TextureFormat::D32F => (gl::DEPTH_COMPONENT32F, gl::DEPTH_COMPONENT, gl::FLOAT),
    };
    GlFormat {
        internal_format,
        format,
        ty,
    }
}

/// Clear scheduled on a texture, applied when it is next used.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub enum PendingClear {
    #[default]
    None,
    Color(u32),
    Depth(f32),
    Invalidate,
}

impl PendingClear {
    pub fn is_none(&self) -> bool {
        matches!(self, PendingClear::None)
    }
}

/// Bytes a `width` x `height` rectangle spans with rows `stride` apart.
pub(crate) fn required_bytes(pitch: u32, stride: u32, height: u32) -> usize {
    if height == 0 {
        return 0;
    }
    stride as usize * (height as usize - 1) + pitch as usize
}

#[derive(Debug)]
pub struct OpenGLTexture {
    pub(crate) name: GLuint,
    pub(crate) desc: TextureDesc,
    pub(crate) target: GLenum,
    pub(crate) format: GlFormat,
    pub(crate) pending: PendingClear,
}

impl OpenGLTexture {
    pub fn name(&self) -> GLuint {
        self.name
    }

    pub fn desc(&self) -> &TextureDesc {
        &self.desc
    }

    pub fn target(&self) -> GLenum {
        self.target
    }

    pub fn pending_clear(&self) -> PendingClear {
        self.pending
    }

    pub(crate) fn validate(desc: &TextureDesc, features: &Features) -> Result<()> {
        let invalid = || DeviceError::InvalidDimensions {
            width: desc.width,
            height: desc.height,
            layers: desc.layers,
            levels: desc.levels,
            samples: desc.samples,
        };

        if desc.width == 0 || desc.height == 0 || desc.layers == 0 || desc.levels == 0 {
            return Err(invalid());
        }
        if desc.samples == 0 || desc.samples > features.max_samples {
            return Err(invalid());
        }
        if desc.width > features.max_texture_size || desc.height > features.max_texture_size {
            return Err(invalid());
        }
        let max_levels = 32 - desc.width.max(desc.height).leading_zeros();
        if desc.levels > max_levels {
            return Err(invalid());
        }
        if desc.is_multisampled() && (desc.levels > 1 || desc.is_array()) {
            return Err(invalid());
        }
        if !features.supports_texture_format(desc.format) {
            return Err(DeviceError::UnsupportedFormat(desc.format));
        }
        Ok(())
    }

    /// Create the texture on the update unit and optionally fill level 0 of
    /// every layer from `data`.
    pub(crate) fn create<D: GlDriver>(
        driver: &mut D,
        state: &mut DrawStateSnapshot,
        features: &Features,
        desc: &TextureDesc,
        data: Option<&[u8]>,
        data_stride: u32,
    ) -> Result<Self> {
        Self::validate(desc, features)?;

        let pitch = desc.level_pitch(0);
        let stride = if data_stride == 0 { pitch } else { data_stride };
        if let Some(data) = data {
            if desc.is_multisampled() {
                return Err(DeviceError::InvalidArgument(
                    "multisampled textures cannot have initial data".into(),
                ));
            }
            if stride < pitch || stride % desc.format.bytes_per_pixel() != 0 {
                return Err(DeviceError::InvalidArgument(format!(
                    "row stride {stride} does not fit a {pitch} byte row"
                )));
            }
            let layer_size = stride as usize * desc.height as usize;
            let needed = layer_size * (desc.layers as usize - 1)
                + required_bytes(pitch, stride, desc.height);
            if data.len() < needed {
                return Err(DeviceError::InvalidArgument(format!(
                    "initial data is {} bytes, {needed} needed",
                    data.len()
                )));
            }
        }

        let target = if desc.is_multisampled() {
            gl::TEXTURE_2D_MULTISAMPLE
        } else if desc.is_array() {
            gl::TEXTURE_2D_ARRAY
        } else {
            gl::TEXTURE_2D
        };
        let format = gl_format(desc.format);

        let name = driver.gen_texture();
        if name == 0 {
            return Err(DeviceError::Unsupported("texture objects"));
        }
        state.apply_texture(driver, UPDATE_TEXTURE_UNIT, target, name);

        let (width, height) = (desc.width as GLint, desc.height as GLint);
        match target {
            gl::TEXTURE_2D_MULTISAMPLE => driver.tex_storage_2d_multisample(
                target,
                desc.samples as GLint,
                format.internal_format,
                width,
                height,
            ),
            gl::TEXTURE_2D_ARRAY => driver.tex_storage_3d(
                target,
                desc.levels as GLint,
                format.internal_format,
                width,
                height,
                desc.layers as GLint,
            ),
            _ => driver.tex_storage_2d(
                target,
                desc.levels as GLint,
                format.internal_format,
                width,
                height,
            ),
        }

        if !desc.is_multisampled() {
            driver.tex_parameter_i(target, gl::TEXTURE_BASE_LEVEL, 0);
            driver.tex_parameter_i(target, gl::TEXTURE_MAX_LEVEL, desc.levels as GLint - 1);
        }

        if let Some(data) = data {
            debug_assert_eq!(
                driver.get_integer(gl::PIXEL_UNPACK_BUFFER_BINDING),
                0,
                "client upload with an unpack buffer bound"
            );
            let row_length = stride / desc.format.bytes_per_pixel();
            if stride != pitch {
                driver.pixel_store_i(gl::UNPACK_ROW_LENGTH, row_length as GLint);
            }
            let layer_size = stride as usize * desc.height as usize;
            for layer in 0..desc.layers {
                let start = layer as usize * layer_size;
                driver.tex_sub_image(
                    target,
                    0,
                    0,
                    0,
                    layer as GLint,
                    width,
                    height,
                    format.format,
                    format.ty,
                    PixelSource::Client(&data[start..]),
                );
            }
            if stride != pitch {
                driver.pixel_store_i(gl::UNPACK_ROW_LENGTH, 0);
            }
        }

        debug!(
            texture = name,
            width = desc.width,
            height = desc.height,
            layers = desc.layers,
            levels = desc.levels,
            samples = desc.samples,
            format = ?desc.format,
            "created texture"
        );
        Ok(Self {
            name,
            desc: *desc,
            target,
            format,
            pending: PendingClear::None,
        })
    }

    /// Check that a `width` x `height` rectangle at `region` lies inside the
    /// texture.
    pub(crate) fn check_region(&self, region: TextureRegion, width: u32, height: u32) -> Result<()> {
        if region.level >= self.desc.levels || region.layer >= self.desc.layers {
            return Err(DeviceError::InvalidArgument(format!(
                "level {} layer {} is outside the texture",
                region.level, region.layer
            )));
        }
        let (level_width, level_height) = self.desc.level_size(region.level);
        let fits = |start: u32, len: u32, limit: u32| start.checked_add(len).is_some_and(|end| end <= limit);
        if !fits(region.x, width, level_width) || !fits(region.y, height, level_height) {
            return Err(DeviceError::InvalidArgument(format!(
                "{width}x{height} at ({}, {}) exceeds the {level_width}x{level_height} level",
                region.x, region.y
            )));
        }
        Ok(())
    }

    /// Whether a rectangle covers all of its level.
    pub(crate) fn covers_level(&self, region: TextureRegion, width: u32, height: u32) -> bool {
        region.x == 0
            && region.y == 0
            && (width, height) == self.desc.level_size(region.level)
            && self.desc.layers == 1
    }

    /// Framebuffer attachment point for this texture's format.
    pub(crate) fn attachment_point(&self) -> GLenum {
        if self.desc.format.is_depth() {
            gl::DEPTH_ATTACHMENT
        } else {
            gl::COLOR_ATTACHMENT0
        }
    }

    /// Layer argument for `framebuffer_texture`.
    pub(crate) fn attachment_layer(&self, layer: u32) -> Option<GLint> {
        self.desc.is_array().then_some(layer as GLint)
    }
}

#[derive(Debug)]
pub struct OpenGLSampler {
    pub(crate) name: GLuint,
    pub(crate) config: SamplerConfig,
}

fn gl_address_mode(mode: AddressMode) -> GLint {
    (match mode {
        AddressMode::Repeat => gl::REPEAT,
        AddressMode::ClampToEdge => gl::CLAMP_TO_EDGE,
        AddressMode::ClampToBorder => gl::CLAMP_TO_BORDER,
        AddressMode::MirrorRepeat => gl::MIRRORED_REPEAT,
    }) as GLint
}

fn gl_min_filter(config: &SamplerConfig) -> GLint {
    let filter = match (config.min_filter, config.max_lod > 0, config.mip_filter) {
        (Filter::Nearest, false, _) => gl::NEAREST,
        (Filter::Linear, false, _) => gl::LINEAR,
        (Filter::Nearest, true, Filter::Nearest) => gl::NEAREST_MIPMAP_NEAREST,
        (Filter::Nearest, true, Filter::Linear) => gl::NEAREST_MIPMAP_LINEAR,
        (Filter::Linear, true, Filter::Nearest) => gl::LINEAR_MIPMAP_NEAREST,
        (Filter::Linear, true, Filter::Linear) => gl::LINEAR_MIPMAP_LINEAR,
    };
    filter as GLint
}

impl OpenGLSampler {
    pub fn name(&self) -> GLuint {
        self.name
    }

    pub fn config(&self) -> &SamplerConfig {
        &self.config
    }

    pub(crate) fn create<D: GlDriver>(
        driver: &mut D,
        features: &Features,
        config: &SamplerConfig,
    ) -> Result<Self> {
        if config.min_lod > config.max_lod {
            return Err(DeviceError::InvalidArgument(format!(
                "sampler min LOD {} above max LOD {}",
                config.min_lod, config.max_lod
            )));
        }

        let name = driver.gen_sampler();
        if name == 0 {
            return Err(DeviceError::Unsupported("sampler objects"));
        }

        let mag = match config.mag_filter {
            Filter::Nearest => gl::NEAREST,
            Filter::Linear => gl::LINEAR,
        };
        driver.sampler_parameter_i(name, gl::TEXTURE_MIN_FILTER, gl_min_filter(config));
        driver.sampler_parameter_i(name, gl::TEXTURE_MAG_FILTER, mag as GLint);
        driver.sampler_parameter_i(name, gl::TEXTURE_WRAP_S, gl_address_mode(config.address_u));
        driver.sampler_parameter_i(name, gl::TEXTURE_WRAP_T, gl_address_mode(config.address_v));
        driver.sampler_parameter_i(name, gl::TEXTURE_WRAP_R, gl_address_mode(config.address_w));
        driver.sampler_parameter_f(name, gl::TEXTURE_MIN_LOD, f32::from(config.min_lod));
        driver.sampler_parameter_f(name, gl::TEXTURE_MAX_LOD, f32::from(config.max_lod));

        let uses_border = [config.address_u, config.address_v, config.address_w]
            .contains(&AddressMode::ClampToBorder);
        if uses_border {
            driver.sampler_parameter_fv(name, gl::TEXTURE_BORDER_COLOR, config.border_color_f32());
        }
        if config.anisotropy > 1 && features.anisotropic_filtering {
            driver.sampler_parameter_f(name, TEXTURE_MAX_ANISOTROPY, f32::from(config.anisotropy));
        }

        debug!(sampler = name, ?config, "created sampler");
        Ok(Self {
            name,
            config: *config,
        })
    }
}

/// A buffer texture streamed through its own ring buffer.
#[derive(Debug)]
pub struct OpenGLTextureBuffer {
    pub(crate) format: TextureBufferFormat,
    pub(crate) size_in_elements: u32,
    pub(crate) buffer: StreamBuffer,
    pub(crate) texture: GLuint,
}

fn gl_texture_buffer_format(format: TextureBufferFormat) -> GLenum {
    match format {
        TextureBufferFormat::R16UI => gl::R16UI,
    }
}

impl OpenGLTextureBuffer {
    pub fn texture(&self) -> GLuint {
        self.texture
    }

    pub fn size_in_elements(&self) -> u32 {
        self.size_in_elements
    }

    pub fn buffer(&self) -> &StreamBuffer {
        &self.buffer
    }

    pub(crate) fn create<D: GlDriver>(
        driver: &mut D,
        state: &mut DrawStateSnapshot,
        features: &Features,
        format: TextureBufferFormat,
        size_in_elements: u32,
    ) -> Result<Self> {
        if !features.texture_buffer {
            return Err(DeviceError::Unsupported("texture buffers"));
        }
        if size_in_elements == 0 || size_in_elements > features.max_texture_buffer_elements {
            return Err(DeviceError::InvalidArgument(format!(
                "texture buffer of {size_in_elements} elements (max {})",
                features.max_texture_buffer_elements
            )));
        }

        let bytes = size_in_elements
            .checked_mul(format.element_size())
            .ok_or_else(|| DeviceError::InvalidArgument("texture buffer size overflows".into()))?
            .max(STREAM_BUFFER_SYNC_SEGMENTS);
        let mut buffer = StreamBuffer::create(driver, gl::TEXTURE_BUFFER, bytes, "texture buffer")?;

        let texture = driver.gen_texture();
        if texture == 0 {
            buffer.destroy(driver);
            return Err(DeviceError::Unsupported("texture objects"));
        }
        state.apply_texture(driver, UPDATE_TEXTURE_UNIT, gl::TEXTURE_BUFFER, texture);
        driver.tex_buffer(gl::TEXTURE_BUFFER, gl_texture_buffer_format(format), buffer.name());

        debug!(texture, buffer = buffer.name(), elements = size_in_elements, "created texture buffer");
        Ok(Self {
            format,
            size_in_elements,
            buffer,
            texture,
        })
    }

    pub(crate) fn map<'a, D: GlDriver>(
        &'a mut self,
        driver: &mut D,
        required_elements: u32,
    ) -> Result<TextureBufferMapping<'a>> {
        let element_size = self.format.element_size();
        let required = required_elements.checked_mul(element_size).ok_or(
            DeviceError::StreamBufferOverflow {
                requested: u32::MAX,
                capacity: self.buffer.size(),
            },
        )?;
        let mapping = self.buffer.map(driver, element_size, required)?;

        let space_elements = mapping.space / element_size;
        let data = mapping
            .data
            .split_at_mut((space_elements * element_size) as usize)
            .0;
        Ok(TextureBufferMapping {
            data,
            base_element: mapping.offset / element_size,
            space_elements,
        })
    }

    pub(crate) fn unmap<D: GlDriver>(&mut self, driver: &mut D, used_elements: u32) {
        let used = used_elements.saturating_mul(self.format.element_size());
        self.buffer.unmap(driver, used);
    }

    pub(crate) fn destroy<D: GlDriver>(&mut self, driver: &mut D) {
        driver.delete_texture(self.texture);
        self.buffer.destroy(driver);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use gl_driver::{GlCall, ObjectKind, RecordingDriver};
    use gpu_core::TextureUsage;
    use pretty_assertions::assert_eq;

    fn setup() -> (RecordingDriver, DrawStateSnapshot, Features) {
        let mut driver = RecordingDriver::new();
        let features = Features::detect(&mut driver, false);
        driver.clear_calls();
        (driver, DrawStateSnapshot::new(), features)
    }

    #[test]
    fn texture_is_created_on_the_update_unit() {
        let (mut driver, mut state, features) = setup();
        let desc = TextureDesc::new_2d(64, 32, TextureFormat::Rgba8, TextureUsage::Texture);

        let texture = OpenGLTexture::create(&mut driver, &mut state, &features, &desc, None, 0).unwrap();

        let calls = driver.take_calls();
        assert_eq!(calls[1], GlCall::ActiveTexture(UPDATE_TEXTURE_UNIT));
        assert!(calls.contains(&GlCall::TexStorage2D {
            target: gl::TEXTURE_2D,
            levels: 1,
            internal_format: gl::RGBA8,
            width: 64,
            height: 32
        }));
        assert_eq!(
            state.units[UPDATE_TEXTURE_UNIT as usize].texture,
            Some((gl::TEXTURE_2D, texture.name()))
        );
    }

    #[test]
    fn initial_data_uses_row_length_for_padded_rows() {
        let (mut driver, mut state, features) = setup();
        let mut desc = TextureDesc::new_2d(4, 2, TextureFormat::R8, TextureUsage::Texture);
        desc.layers = 2;
        // Two layers of two 8-byte rows.
        let data = [0u8; 32];

        OpenGLTexture::create(&mut driver, &mut state, &features, &desc, Some(&data), 8).unwrap();

        let calls = driver.take_calls();
        assert!(calls.contains(&GlCall::PixelStore {
            pname: gl::UNPACK_ROW_LENGTH,
            value: 8
        }));
        let uploads = calls
            .iter()
            .filter(|c| matches!(c, GlCall::TexSubImage { target: gl::TEXTURE_2D_ARRAY, .. }))
            .count();
        assert_eq!(uploads, 2);
        assert_eq!(
            calls.last(),
            Some(&GlCall::PixelStore {
                pname: gl::UNPACK_ROW_LENGTH,
                value: 0
            })
        );
    }

    #[test]
    fn short_initial_data_creates_nothing() {
        let (mut driver, mut state, features) = setup();
        let desc = TextureDesc::new_2d(4, 4, TextureFormat::Rgba8, TextureUsage::Texture);

        let err = OpenGLTexture::create(&mut driver, &mut state, &features, &desc, Some(&[0; 60]), 0)
            .unwrap_err();
        assert!(matches!(err, DeviceError::InvalidArgument(_)));
        assert_eq!(driver.live_count(ObjectKind::Texture), 0);
    }

    #[test]
    fn invalid_descriptions_are_rejected() {
        let (mut driver, mut state, features) = setup();

        let mut desc = TextureDesc::new_2d(16, 16, TextureFormat::Rgba8, TextureUsage::RenderTarget);
        desc.samples = 4;
        desc.levels = 2;
        assert!(matches!(
            OpenGLTexture::create(&mut driver, &mut state, &features, &desc, None, 0),
            Err(DeviceError::InvalidDimensions { samples: 4, .. })
        ));

        let desc = TextureDesc::new_2d(0, 16, TextureFormat::Rgba8, TextureUsage::Texture);
        assert!(OpenGLTexture::create(&mut driver, &mut state, &features, &desc, None, 0).is_err());

        let mut desc = TextureDesc::new_2d(16, 16, TextureFormat::Rgba8, TextureUsage::Texture);
        desc.levels = 6;
        assert!(OpenGLTexture::create(&mut driver, &mut state, &features, &desc, None, 0).is_err());
        assert_eq!(driver.live_count(ObjectKind::Texture), 0);
    }

    #[test]
    fn region_checks_use_the_mip_size() {
        let (mut driver, mut state, features) = setup();
        let mut desc = TextureDesc::new_2d(16, 8, TextureFormat::Rgba8, TextureUsage::Texture);
        desc.levels = 2;
        let texture = OpenGLTexture::create(&mut driver, &mut state, &features, &desc, None, 0).unwrap();

        let level1 = TextureRegion {
            level: 1,
            ..TextureRegion::origin()
        };
        assert!(texture.check_region(level1, 8, 4).is_ok());
        assert!(texture.check_region(level1, 9, 4).is_err());
        assert!(texture.covers_level(level1, 8, 4));
        assert!(!texture.covers_level(TextureRegion::at(1, 0), 15, 8));
    }

    #[test]
    fn sampler_parameters_follow_config() {
        let (mut driver, _, features) = setup();
        let mut config = SamplerConfig::linear();
        config.max_lod = 4;
        config.address_u = AddressMode::ClampToBorder;
        config.anisotropy = 8;

        let sampler = OpenGLSampler::create(&mut driver, &features, &config).unwrap();
        let calls = driver.take_calls();

        assert!(calls.contains(&GlCall::SamplerParameterI {
            sampler: sampler.name(),
            pname: gl::TEXTURE_MIN_FILTER,
            value: gl::LINEAR_MIPMAP_LINEAR as GLint
        }));
        assert!(calls.iter().any(|c| matches!(
            c,
            GlCall::SamplerParameterFv { pname: gl::TEXTURE_BORDER_COLOR, .. }
        )));
        assert!(calls.contains(&GlCall::SamplerParameterF {
            sampler: sampler.name(),
            pname: TEXTURE_MAX_ANISOTROPY,
            value: 8.0
        }));
    }

    #[test]
    fn texture_buffer_maps_whole_elements() {
        let (mut driver, mut state, features) = setup();
        let mut buffer = OpenGLTextureBuffer::create(
            &mut driver,
            &mut state,
            &features,
            TextureBufferFormat::R16UI,
            1024,
        )
        .unwrap();
        assert!(driver.calls().contains(&GlCall::TexBuffer {
            target: gl::TEXTURE_BUFFER,
            internal_format: gl::R16UI,
            buffer: buffer.buffer().name()
        }));

        let mapping = buffer.map(&mut driver, 10).unwrap();
        assert_eq!(mapping.base_element, 0);
        assert_eq!(mapping.space_elements, 1024);
        assert_eq!(mapping.data.len(), 2048);
        buffer.unmap(&mut driver, 10);

        let mapping = buffer.map(&mut driver, 4).unwrap();
        assert_eq!(mapping.base_element, 10);
        buffer.unmap(&mut driver, 4);

        buffer.destroy(&mut driver);
        assert_eq!(driver.live_count(ObjectKind::Texture), 0);
        assert_eq!(driver.live_count(ObjectKind::Buffer), 0);
    }
}
