//! Video backend interface exposed to the host application.

use smithay::utils::{Physical, Size};
use tracing::debug;

pub mod kms;

use self::kms::{
    InitError, KmsDisplay, Platform, PresentationError, TeardownReport, GLES_VERSION,
};

/// Request to bring up a rendering context.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ContextRequest {
    /// OpenGL ES major version the caller renders with.
    pub api_version: u32,
    /// Size the caller would like. The display always uses the connector's mode.
    pub size: Size<i32, Physical>,
}

/// Operations the host application drives the display through.
pub trait VideoBackend {
    /// Checks that the native libraries are loadable. Call before anything else.
    fn probe(&self) -> anyhow::Result<()>;
    /// Current screen size, 0x0 until a context exists.
    fn screen_size(&self) -> Size<i32, Physical>;
    fn create_context(&mut self, request: ContextRequest) -> Result<(), InitError>;
    fn make_current(&mut self) -> anyhow::Result<()>;
    fn release_current(&mut self) -> anyhow::Result<()>;
    fn swap_buffers(&mut self) -> Result<(), PresentationError>;
    fn set_use_vsync(&mut self, vsync: bool);
    fn is_using_vsync(&self) -> bool;
    fn cleanup(&mut self) -> TeardownReport;
}

impl<P: Platform> VideoBackend for KmsDisplay<P> {
    fn probe(&self) -> anyhow::Result<()> {
        KmsDisplay::probe(self)
    }

    fn screen_size(&self) -> Size<i32, Physical> {
        KmsDisplay::screen_size(self)
    }

    fn create_context(&mut self, request: ContextRequest) -> Result<(), InitError> {
        let built = GLES_VERSION.major();
        if request.api_version != built {
            return Err(InitError::ApiVersionMismatch {
                requested: request.api_version,
                built,
            });
        }

        self.initialize()?;

        let size = KmsDisplay::screen_size(self);
        if request.size != size {
            debug!(
                "requested {}x{}, using the mode size {}x{}",
                request.size.w, request.size.h, size.w, size.h
            );
        }
        Ok(())
    }

    fn make_current(&mut self) -> anyhow::Result<()> {
        KmsDisplay::make_current(self)
    }

    fn release_current(&mut self) -> anyhow::Result<()> {
        KmsDisplay::release_current(self)
    }

    fn swap_buffers(&mut self) -> Result<(), PresentationError> {
        KmsDisplay::swap_buffers(self)
    }

    fn set_use_vsync(&mut self, vsync: bool) {
        KmsDisplay::set_use_vsync(self, vsync)
    }

    fn is_using_vsync(&self) -> bool {
        KmsDisplay::is_using_vsync(self)
    }

    fn cleanup(&mut self) -> TeardownReport {
        self.teardown()
    }
}
