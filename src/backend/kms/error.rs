//! Error types of the KMS backend.

use std::fmt;
use std::io;
use std::path::PathBuf;

use smithay::backend::allocator::Fourcc;
use smithay::reexports::drm::control::{connector, encoder};

/// Initialization stage an [`InitError`] originates from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InitStage {
    Locator,
    Allocator,
    RenderContext,
    WindowSurface,
}

impl fmt::Display for InitStage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            InitStage::Locator => "display device locator",
            InitStage::Allocator => "graphics surface allocator",
            InitStage::RenderContext => "render context",
            InitStage::WindowSurface => "window surface",
        };
        f.write_str(name)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SurfaceKind {
    Allocator,
    Window,
}

#[derive(Debug, thiserror::Error)]
pub enum InitError {
    #[error("error opening display device {path:?}")]
    DeviceOpen {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
    #[error("error querying display resources")]
    ResourceQuery(#[source] io::Error),
    #[error("no connected output")]
    NoConnectedOutput,
    #[error("connector {0:?} has no bound encoder")]
    NoEncoder(connector::Handle),
    #[error("encoder {0:?} is not bound to a display controller")]
    NoController(encoder::Handle),
    #[error("connector {0:?} advertises no modes")]
    NoMode(connector::Handle),
    #[error("no rendering config matches pixel format {format}")]
    ConfigMatch { format: Fourcc },
    #[error("error creating rendering context")]
    ContextCreate(#[source] anyhow::Error),
    #[error("error creating {kind:?} surface")]
    SurfaceCreate {
        kind: SurfaceKind,
        #[source]
        source: anyhow::Error,
    },
    #[error("requested OpenGL ES {requested}, but this build targets OpenGL ES {built}")]
    ApiVersionMismatch { requested: u32, built: u32 },
}

impl InitError {
    pub fn stage(&self) -> InitStage {
        match self {
            InitError::DeviceOpen { .. }
            | InitError::ResourceQuery(_)
            | InitError::NoConnectedOutput
            | InitError::NoEncoder(_)
            | InitError::NoController(_)
            | InitError::NoMode(_) => InitStage::Locator,
            InitError::SurfaceCreate {
                kind: SurfaceKind::Allocator,
                ..
            } => InitStage::Allocator,
            InitError::ConfigMatch { .. }
            | InitError::ContextCreate(_)
            | InitError::ApiVersionMismatch { .. } => InitStage::RenderContext,
            InitError::SurfaceCreate {
                kind: SurfaceKind::Window,
                ..
            } => InitStage::WindowSurface,
        }
    }
}

/// A frame could not be presented.
///
/// The frame is skipped; the previously shown frame stays on screen and its buffer stays
/// queued for retirement.
#[derive(Debug, thiserror::Error)]
pub enum PresentationError {
    #[error("display is not initialized")]
    NotInitialized,
    #[error("error submitting the rendered frame")]
    Submit(#[source] anyhow::Error),
    #[error("error locking the front buffer")]
    LockFrontBuffer(#[source] anyhow::Error),
    #[error("error adding framebuffer")]
    FramebufferAdd(#[source] io::Error),
    #[error("error setting display controller")]
    Modeset(#[source] io::Error),
}
