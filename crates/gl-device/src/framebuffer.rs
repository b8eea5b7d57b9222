use gl::types::{GLenum, GLuint};
use gl_driver::GlDriver;
use gpu_core::{Attachment, DeviceError, Result, TextureId};
use slotmap::SlotMap;
use tracing::{debug, error};

use crate::state::DrawStateSnapshot;
use crate::texture::OpenGLTexture;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AttachmentInfo {
    pub texture: TextureId,
    pub name: GLuint,
    pub layer: u32,
    pub level: u32,
}

fn resolve(
    textures: &SlotMap<TextureId, OpenGLTexture>,
    attachment: Attachment,
    want_depth: bool,
) -> Result<(&OpenGLTexture, AttachmentInfo)> {
    let texture = textures
        .get(attachment.texture)
        .ok_or(DeviceError::InvalidHandle("texture"))?;
    if texture.desc.format.is_depth() != want_depth {
        return Err(DeviceError::InvalidArgument(format!(
            "{:?} cannot be a {} attachment",
            texture.desc.format,
            if want_depth { "depth" } else { "color" }
        )));
    }
    if attachment.layer >= texture.desc.layers || attachment.level >= texture.desc.levels {
        return Err(DeviceError::InvalidArgument(format!(
            "attachment layer {} level {} is outside the texture",
            attachment.layer, attachment.level
        )));
    }
    Ok((
        texture,
        AttachmentInfo {
            texture: attachment.texture,
            name: texture.name,
            layer: attachment.layer,
            level: attachment.level,
        },
    ))
}

#[derive(Debug)]
pub struct OpenGLFramebuffer {
    pub(crate) name: GLuint,
    pub(crate) color: Option<AttachmentInfo>,
    pub(crate) depth: Option<AttachmentInfo>,
    pub(crate) width: u32,
    pub(crate) height: u32,
}

impl OpenGLFramebuffer {
    pub fn name(&self) -> GLuint {
        self.name
    }

    pub fn size(&self) -> (u32, u32) {
        (self.width, self.height)
    }

    pub fn color(&self) -> Option<&AttachmentInfo> {
        self.color.as_ref()
    }

    pub fn depth(&self) -> Option<&AttachmentInfo> {
        self.depth.as_ref()
    }

    /// Textures attached to this framebuffer.
    pub fn attached_textures(&self) -> impl Iterator<Item = TextureId> + '_ {
        self.color.iter().chain(self.depth.iter()).map(|a| a.texture)
    }

    /// Build a framebuffer from up to one color and one depth attachment.
    /// The new framebuffer is left bound as the draw framebuffer.
    pub(crate) fn create<D: GlDriver>(
        driver: &mut D,
        state: &mut DrawStateSnapshot,
        textures: &SlotMap<TextureId, OpenGLTexture>,
        color: Option<Attachment>,
        depth: Option<Attachment>,
    ) -> Result<Self> {
        if color.is_none() && depth.is_none() {
            return Err(DeviceError::InvalidArgument(
                "framebuffer needs at least one attachment".into(),
            ));
        }

        let color = color.map(|a| resolve(textures, a, false)).transpose()?;
        let depth = depth.map(|a| resolve(textures, a, true)).transpose()?;

        let sizes: Vec<(u32, u32)> = color
            .iter()
            .chain(depth.iter())
            .map(|(texture, info)| texture.desc.level_size(info.level))
            .collect();
        let (width, height) = sizes[0];
        if sizes.iter().any(|&size| size != (width, height)) {
            return Err(DeviceError::InvalidArgument(format!(
                "attachment sizes differ: {sizes:?}"
            )));
        }

        let name = driver.gen_framebuffer();
        if name == 0 {
            return Err(DeviceError::Unsupported("framebuffer objects"));
        }
        state.apply_framebuffer(driver, name);

        for (texture, info) in color.iter().chain(depth.iter()) {
            driver.framebuffer_texture(
                gl::DRAW_FRAMEBUFFER,
                texture.attachment_point(),
                info.name,
                info.level as i32,
                texture.attachment_layer(info.layer),
            );
        }
        if color.is_none() {
            driver.draw_buffer(gl::NONE);
            driver.read_buffer(gl::NONE);
        }

        let status: GLenum = driver.check_framebuffer_status(gl::DRAW_FRAMEBUFFER);
        if status != gl::FRAMEBUFFER_COMPLETE {
            error!(framebuffer = name, status = format!("{status:#06x}"), "framebuffer is incomplete");
            state.unbind_framebuffer(driver, name);
            driver.delete_framebuffer(name);
            return Err(DeviceError::FramebufferIncomplete(status));
        }

        debug!(framebuffer = name, width, height, "created framebuffer");
        Ok(Self {
            name,
            color: color.map(|(_, info)| info),
            depth: depth.map(|(_, info)| info),
            width,
            height,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::features::Features;
    use gl_driver::{GlCall, ObjectKind, RecordingDriver};
    use gpu_core::{TextureDesc, TextureFormat, TextureUsage};

    struct Fixture {
        driver: RecordingDriver,
        state: DrawStateSnapshot,
        textures: SlotMap<TextureId, OpenGLTexture>,
        features: Features,
    }

    impl Fixture {
        fn new() -> Self {
            let mut driver = RecordingDriver::new();
            let features = Features::detect(&mut driver, false);
            Self {
                driver,
                state: DrawStateSnapshot::new(),
                textures: SlotMap::with_key(),
                features,
            }
        }

        fn texture(&mut self, width: u32, format: TextureFormat) -> TextureId {
            let usage = if format.is_depth() {
                TextureUsage::DepthStencil
            } else {
                TextureUsage::RenderTarget
            };
            let desc = TextureDesc::new_2d(width, 64, format, usage);
            let texture =
                OpenGLTexture::create(&mut self.driver, &mut self.state, &self.features, &desc, None, 0)
                    .unwrap();
            self.textures.insert(texture)
        }

        fn create(&mut self, color: Option<Attachment>, depth: Option<Attachment>) -> Result<OpenGLFramebuffer> {
            OpenGLFramebuffer::create(&mut self.driver, &mut self.state, &self.textures, color, depth)
        }
    }

    #[test]
    fn color_and_depth_attach_to_the_draw_target() {
        let mut fx = Fixture::new();
        let color = fx.texture(64, TextureFormat::Rgba8);
        let depth = fx.texture(64, TextureFormat::D32F);
        fx.driver.clear_calls();

        let fb = fx.create(Some(Attachment::new(color)), Some(Attachment::new(depth))).unwrap();
        assert_eq!(fb.size(), (64, 64));
        assert_eq!(fx.state.framebuffer, Some(fb.name()));
        assert!(fx.driver.calls().contains(&GlCall::FramebufferTexture {
            target: gl::DRAW_FRAMEBUFFER,
            attachment: gl::DEPTH_ATTACHMENT,
            texture: fx.textures[depth].name(),
            level: 0,
            layer: None
        }));
        assert_eq!(fb.attached_textures().collect::<Vec<_>>(), vec![color, depth]);
    }

    #[test]
    fn depth_only_framebuffer_disables_color_output() {
        let mut fx = Fixture::new();
        let depth = fx.texture(32, TextureFormat::D16);

        fx.create(None, Some(Attachment::new(depth))).unwrap();
        assert!(fx.driver.calls().contains(&GlCall::DrawBuffer(gl::NONE)));
    }

    #[test]
    fn mismatched_sizes_and_formats_are_rejected() {
        let mut fx = Fixture::new();
        let color = fx.texture(64, TextureFormat::Rgba8);
        let small_depth = fx.texture(32, TextureFormat::D16);

        assert!(fx
            .create(Some(Attachment::new(color)), Some(Attachment::new(small_depth)))
            .is_err());
        assert!(fx.create(Some(Attachment::new(small_depth)), None).is_err());
        assert!(fx.create(None, None).is_err());
        assert_eq!(fx.driver.live_count(ObjectKind::Framebuffer), 0);
    }

    #[test]
    fn incomplete_framebuffer_is_deleted() {
        let mut fx = Fixture::new();
        let color = fx.texture(64, TextureFormat::Rgba8);
        fx.driver.set_framebuffer_status(gl::FRAMEBUFFER_UNSUPPORTED);

        let err = fx.create(Some(Attachment::new(color)), None).unwrap_err();
        assert!(matches!(err, DeviceError::FramebufferIncomplete(gl::FRAMEBUFFER_UNSUPPORTED)));
        assert_eq!(fx.driver.live_count(ObjectKind::Framebuffer), 0);
        assert_eq!(fx.state.framebuffer, Some(0));
    }
}
