#![allow(clippy::too_many_arguments)]

//! OpenGL driver seam for the device layer.
//!
//! - [`GlDriver`] is the set of GL entry points the device calls.
//! - [`RawGlDriver`] forwards them to the `gl` crate on the current context.
//! - [`GlContext`] is the surface/presentation collaborator, with
//!   [`HostGlContext`] for contexts owned by a host application.
//! - [`recording`] provides a headless driver and context that record every
//!   call.

pub mod context;
pub mod driver;
pub mod raw;
pub mod recording;

pub use context::{GlContext, HostGlContext};
pub use driver::{GlDriver, PixelSource, SyncHandle, SyncWait};
pub use raw::RawGlDriver;
pub use recording::{GlCall, HeadlessContext, ObjectKind, RecordingDriver};

/// Re-export of the GL bindings so callers use the same enum values.
pub use gl;
