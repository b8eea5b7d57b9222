use gl_driver::GlDriver;
use gpu_core::TextureFormat;
use tracing::{info, warn};

/// What the current context can do, probed once at device creation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Features {
    pub gles: bool,
    pub version: (u32, u32),
    pub debug_output: bool,
    pub timer_query: bool,
    pub texture_buffer: bool,
    pub invalidate_framebuffer: bool,
    pub bgra_texture: bool,
    pub norm16: bool,
    pub geometry_shaders: bool,
    pub anisotropic_filtering: bool,
    pub max_texture_size: u32,
    pub max_samples: u32,
    pub uniform_buffer_alignment: u32,
    pub texture_buffer_alignment: u32,
    pub max_texture_buffer_elements: u32,
}

fn positive<D: GlDriver>(driver: &mut D, pname: gl::types::GLenum) -> u32 {
    driver.get_integer(pname).max(0) as u32
}

impl Features {
    pub fn detect<D: GlDriver>(driver: &mut D, gles: bool) -> Self {
        let version = (
            positive(driver, gl::MAJOR_VERSION),
            positive(driver, gl::MINOR_VERSION),
        );
        let at_least = |major: u32, minor: u32| version >= (major, minor);

        let debug_output = driver.has_extension("GL_KHR_debug")
            || if gles { at_least(3, 2) } else { at_least(4, 3) };
        let timer_query = if gles {
            driver.has_extension("GL_EXT_disjoint_timer_query")
        } else {
            at_least(3, 3) || driver.has_extension("GL_ARB_timer_query")
        };
        let texture_buffer = if gles {
            at_least(3, 2)
                || driver.has_extension("GL_OES_texture_buffer")
                || driver.has_extension("GL_EXT_texture_buffer")
        } else {
            at_least(3, 1)
        };
        let invalidate_framebuffer = if gles {
            at_least(3, 0)
        } else {
            at_least(4, 3) || driver.has_extension("GL_ARB_invalidate_subdata")
        };
        let bgra_texture = !gles || driver.has_extension("GL_EXT_texture_format_BGRA8888");
        let norm16 = !gles || driver.has_extension("GL_EXT_texture_norm16");
        let geometry_shaders = at_least(3, 2);
        let anisotropic_filtering = driver.has_extension("GL_EXT_texture_filter_anisotropic")
            || driver.has_extension("GL_ARB_texture_filter_anisotropic")
            || (!gles && at_least(4, 6));

        let features = Self {
            gles,
            version,
            debug_output,
            timer_query,
            texture_buffer,
            invalidate_framebuffer,
            bgra_texture,
            norm16,
            geometry_shaders,
            anisotropic_filtering,
            max_texture_size: positive(driver, gl::MAX_TEXTURE_SIZE),
            max_samples: positive(driver, gl::MAX_SAMPLES).max(1),
            uniform_buffer_alignment: positive(driver, gl::UNIFORM_BUFFER_OFFSET_ALIGNMENT).max(1),
            texture_buffer_alignment: positive(driver, gl::TEXTURE_BUFFER_OFFSET_ALIGNMENT).max(1),
            max_texture_buffer_elements: positive(driver, gl::MAX_TEXTURE_BUFFER_SIZE),
        };

        info!(
            api = if gles { "OpenGL ES" } else { "OpenGL" },
            version = %format!("{}.{}", version.0, version.1),
            renderer = driver.get_string(gl::RENDERER).unwrap_or_default(),
            "detected device features"
        );
        if !features.timer_query {
            warn!("timer queries unavailable, GPU timing disabled");
        }
        if !features.texture_buffer {
            warn!("texture buffers unavailable");
        }

        features
    }

    pub fn supports_texture_format(&self, format: TextureFormat) -> bool {
        match format {
            TextureFormat::Bgra8 => self.bgra_texture,
            TextureFormat::R16 => self.norm16,
            _ => true,
        }
    }
}
