//! [`GlContext`]: the window surface collaborator.
//!
//! Creating contexts and surfaces belongs to the windowing layer. The device
//! only needs to present, resize and learn when the surface went away.

use anyhow::{bail, Result};

/// Surface and presentation operations on the current GL context.
pub trait GlContext {
    /// True for OpenGL ES contexts.
    fn is_gles(&self) -> bool;

    fn has_surface(&self) -> bool;

    /// Surface size in pixels.
    fn surface_size(&self) -> (u32, u32);

    fn swap_buffers(&mut self) -> Result<()>;

    /// Returns false when the platform refused the interval.
    fn set_swap_interval(&mut self, interval: i32) -> bool;

    /// Recreate the surface for the current window.
    fn update_surface(&mut self) -> Result<()>;

    fn resize_surface(&mut self, width: u32, height: u32);

    fn destroy_surface(&mut self);
}

/// Context owned by a host application that has already made it current
/// and presents on its own.
///
/// Swapping is the host's job, so `swap_buffers` only checks the surface is
/// still there.
#[derive(Debug)]
pub struct HostGlContext {
    size: (u32, u32),
    gles: bool,
    surface: bool,
}

impl HostGlContext {
    pub fn new(size: (u32, u32), gles: bool) -> Self {
        Self {
            size,
            gles,
            surface: true,
        }
    }
}

impl GlContext for HostGlContext {
    fn is_gles(&self) -> bool {
        self.gles
    }

    fn has_surface(&self) -> bool {
        self.surface
    }

    fn surface_size(&self) -> (u32, u32) {
        self.size
    }

    fn swap_buffers(&mut self) -> Result<()> {
        if !self.surface {
            bail!("no surface to present to");
        }
        Ok(())
    }

    fn set_swap_interval(&mut self, _interval: i32) -> bool {
        false
    }

    fn update_surface(&mut self) -> Result<()> {
        self.surface = true;
        Ok(())
    }

    fn resize_surface(&mut self, width: u32, height: u32) {
        self.size = (width, height);
    }

    fn destroy_surface(&mut self) {
        self.surface = false;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn host_context_tracks_surface_lifetime() {
        let mut ctx = HostGlContext::new((640, 480), false);
        assert!(ctx.swap_buffers().is_ok());

        ctx.destroy_surface();
        assert!(!ctx.has_surface());
        assert!(ctx.swap_buffers().is_err());

        ctx.update_surface().unwrap();
        ctx.resize_surface(800, 600);
        assert_eq!(ctx.surface_size(), (800, 600));
        assert!(ctx.has_surface());
    }
}
