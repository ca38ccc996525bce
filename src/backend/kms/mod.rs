//! KMS backend: direct-to-hardware display without a windowing system.
//!
//! The backend is split by concern:
//! - `locator` - opens the device and picks the connector, encoder and controller
//! - `allocator` - creates the GBM allocator and the scanout surface
//! - `context` - the EGL rendering context bound to that surface
//! - `swapchain` - turns each rendered buffer into the framebuffer on screen
//! - `teardown` - ordered, best-effort cleanup
//!
//! `KmsDisplay` sequences them: initialization runs once, then every frame is submitted by
//! the render context and presented by the swapchain, and teardown runs once, restoring the
//! controller to what it showed before.
//!
//! Everything is single-threaded. Device calls must come from the thread that holds the
//! context current, and the next frame must not be submitted before the previous
//! presentation returned.

mod allocator;
mod context;
mod egl;
mod error;
mod gbm;
mod locator;
mod platform;
mod probe;
mod swapchain;
mod teardown;
mod types;

#[cfg(test)]
mod testing;

use std::io;

use anyhow::Context as _;
use smithay::utils::{Physical, Size};
use tracing::{debug, info, warn};

pub use context::{match_config_to_pixel_format, RenderContext};
pub use egl::EglApi;
pub use error::{InitError, InitStage, PresentationError, SurfaceKind};
pub use gbm::GbmPlatform;
pub use platform::{BufferPool, KmsDevice, Platform, RenderApi};
pub use probe::probe_libraries;
pub use swapchain::{PresentedFrame, Swapchain};
pub use teardown::{TeardownReport, TeardownStep, TeardownWarning};
pub use types::{
    ConfigAttributes, ConnectorInfo, CrtcState, DeviceSelection, DisplayConfig,
    DisplayResources, DisplayTarget, GlesVersion, GLES_VERSION, SCANOUT_BPP, SCANOUT_DEPTH,
    SCANOUT_FORMAT,
};

use self::teardown::restore_controller;

/// Everything created during initialization.
///
/// Fields fill in as initialization progresses, so a failed initialization can be torn down
/// the same way as a complete one.
struct Session<P: Platform> {
    device: Option<P::Device>,
    target: Option<DisplayTarget>,
    allocator: Option<P::Allocator>,
    surface: Option<P::Surface>,
    render: Option<RenderContext<P::Render>>,
    swapchain: Option<Swapchain<P::Buffer>>,
}

impl<P: Platform> Session<P> {
    fn new() -> Self {
        Self {
            device: None,
            target: None,
            allocator: None,
            surface: None,
            render: None,
            swapchain: None,
        }
    }

    fn present(&mut self) -> Result<(), PresentationError> {
        let (Some(device), Some(surface), Some(render), Some(swapchain)) = (
            &self.device,
            &mut self.surface,
            &self.render,
            &mut self.swapchain,
        ) else {
            return Err(PresentationError::NotInitialized);
        };

        render.submit_frame().map_err(PresentationError::Submit)?;
        swapchain.present(device, surface)
    }

    fn teardown(self, platform: &P) -> TeardownReport {
        let _span = tracy_client::span!("Session::teardown");

        let Session {
            device,
            target,
            allocator,
            mut surface,
            mut render,
            mut swapchain,
        } = self;
        let mut report = TeardownReport::default();

        if let Some(render) = render.as_mut().filter(|r| r.is_current()) {
            report.run(TeardownStep::ReleaseCurrent, || render.release_current());
        }

        if let (Some(device), Some(target), Some(swapchain)) = (&device, &target, &swapchain) {
            if swapchain.frames_presented() > 0 {
                report.run(TeardownStep::RestoreController, || {
                    restore_controller(device, target)
                });
            }
        }

        if let Some(frame) = swapchain.as_mut().and_then(|s| s.take_pending()) {
            report.run(TeardownStep::RetirePendingFrame, || {
                let (Some(device), Some(pool)) = (&device, surface.as_mut()) else {
                    anyhow::bail!("device or allocator surface already gone");
                };
                swapchain::retire(device, pool, frame).context("error removing framebuffer")
            });
        }
        drop(swapchain);

        if let Some(render) = render.as_mut().filter(|r| r.has_surface()) {
            report.run(TeardownStep::DestroyWindowSurface, || render.destroy_surface());
        }

        if let Some(mut render) = render.take() {
            report.run(TeardownStep::DestroyRenderContext, || {
                let res = render.destroy_context();
                drop(render);
                res
            });
        }

        if let Some(surface) = surface.take() {
            report.run(TeardownStep::DestroyAllocatorSurface, || {
                platform.destroy_surface(surface)
            });
        }

        if let Some(allocator) = allocator {
            report.run(TeardownStep::DestroyAllocatorDevice, || {
                platform.destroy_allocator(allocator)
            });
        }

        if let Some(device) = device {
            report.run(TeardownStep::CloseDevice, || platform.close_device(device));
        }

        report
    }
}

/// Lifecycle manager of the display.
pub struct KmsDisplay<P: Platform = GbmPlatform> {
    platform: P,
    config: DisplayConfig,
    session: Option<Session<P>>,
    screen_size: Size<i32, Physical>,
    vsync: bool,
}

impl KmsDisplay<GbmPlatform> {
    pub fn with_config(config: DisplayConfig) -> Self {
        Self::new(GbmPlatform, config)
    }
}

impl<P: Platform> KmsDisplay<P> {
    pub fn new(platform: P, config: DisplayConfig) -> Self {
        let vsync = config.vsync;
        Self {
            platform,
            config,
            session: None,
            screen_size: Size::from((0, 0)),
            vsync,
        }
    }

    pub fn probe(&self) -> anyhow::Result<()> {
        self.platform.probe()
    }

    pub fn is_initialized(&self) -> bool {
        self.session.is_some()
    }

    /// Brings up the display: locator, allocator, render context, window surface.
    ///
    /// Nothing is shown until the first [`swap_buffers`](Self::swap_buffers). If any stage
    /// fails, everything created so far is torn down and the error names the stage.
    pub fn initialize(&mut self) -> Result<(), InitError> {
        let _span = tracy_client::span!("KmsDisplay::initialize");

        if self.session.is_some() {
            debug!("display is already initialized");
            return Ok(());
        }

        let mut session = Session::new();
        if let Err(err) = self.init_session(&mut session) {
            warn!("error initializing {}: {err:?}", err.stage());
            let report = session.teardown(&self.platform);
            debug!(
                "cleaned up after failed initialization with {} warnings",
                report.warnings.len()
            );
            return Err(err);
        }

        if let Some(render) = &session.render {
            let interval = i32::from(self.vsync);
            if let Err(err) = render.set_swap_interval(interval) {
                warn!("error setting swap interval {interval}: {err:?}");
            }
        }

        if let Some(target) = &session.target {
            let (w, h) = target.size();
            self.screen_size = Size::from((w as i32, h as i32));
        }
        info!(
            "display initialized at {}x{}",
            self.screen_size.w, self.screen_size.h
        );

        self.session = Some(session);
        Ok(())
    }

    fn init_session(&self, session: &mut Session<P>) -> Result<(), InitError> {
        let (device, target) = self.open_and_locate()?;
        session.swapchain = Some(Swapchain::new(&target));
        let device = session.device.insert(device);
        let target = session.target.insert(target);

        let allocator = session
            .allocator
            .insert(allocator::create_allocator(&self.platform, device)?);
        let surface = session.surface.insert(allocator::create_scanout_surface(
            &self.platform,
            allocator,
            target,
        )?);

        let api = self
            .platform
            .create_render_api(allocator)
            .map_err(InitError::ContextCreate)?;
        let render = session
            .render
            .insert(RenderContext::new(api, GLES_VERSION)?);

        render.create_window_surface(surface)?;
        render.make_current().map_err(InitError::ContextCreate)?;

        Ok(())
    }

    fn open_and_locate(&self) -> Result<(P::Device, DisplayTarget), InitError> {
        let mut last_err = None;

        for path in locator::candidate_devices(&self.config.device) {
            let device = match locator::open_device(&self.platform, &path) {
                Ok(device) => device,
                Err(err) => {
                    debug!("{err}");
                    last_err = Some(err);
                    continue;
                }
            };

            match locator::locate(&device) {
                Ok(target) => {
                    info!("using display device {path:?}");
                    return Ok((device, target));
                }
                Err(err) => {
                    debug!("skipping display device {path:?}: {err}");
                    if let Err(err) = self.platform.close_device(device) {
                        warn!("error closing {path:?}: {err:?}");
                    }
                    last_err = Some(err);
                }
            }
        }

        Err(last_err.unwrap_or_else(|| {
            let (DeviceSelection::Fixed(path) | DeviceSelection::Probe(path)) = &self.config.device;
            InitError::DeviceOpen {
                path: path.clone(),
                source: io::Error::new(io::ErrorKind::NotFound, "no display device nodes"),
            }
        }))
    }

    /// Submits the rendered frame and shows it.
    ///
    /// On error the frame is skipped and the previous frame stays on screen.
    pub fn swap_buffers(&mut self) -> Result<(), PresentationError> {
        let session = self
            .session
            .as_mut()
            .ok_or(PresentationError::NotInitialized)?;
        session.present()
    }

    pub fn make_current(&mut self) -> anyhow::Result<()> {
        self.render_mut()?.make_current()
    }

    pub fn release_current(&mut self) -> anyhow::Result<()> {
        self.render_mut()?.release_current()
    }

    fn render_mut(&mut self) -> anyhow::Result<&mut RenderContext<P::Render>> {
        self.session
            .as_mut()
            .and_then(|s| s.render.as_mut())
            .ok_or_else(|| anyhow::anyhow!("display is not initialized"))
    }

    pub fn set_use_vsync(&mut self, vsync: bool) {
        self.vsync = vsync;

        if let Some(render) = self.session.as_ref().and_then(|s| s.render.as_ref()) {
            let interval = i32::from(vsync);
            if let Err(err) = render.set_swap_interval(interval) {
                warn!("error setting swap interval {interval}: {err:?}");
            }
        }
    }

    pub fn is_using_vsync(&self) -> bool {
        self.vsync
    }

    /// Size of the active mode, or 0x0 when not initialized.
    pub fn screen_size(&self) -> Size<i32, Physical> {
        self.screen_size
    }

    pub fn frames_presented(&self) -> u64 {
        self.session
            .as_ref()
            .and_then(|s| s.swapchain.as_ref())
            .map_or(0, |s| s.frames_presented())
    }

    /// Connector, controller and mode in use.
    pub fn target(&self) -> Option<&DisplayTarget> {
        self.session.as_ref().and_then(|s| s.target.as_ref())
    }

    pub fn render_api(&self) -> Option<&P::Render> {
        self.session
            .as_ref()
            .and_then(|s| s.render.as_ref())
            .map(|r| r.api())
    }

    /// Tears the display down and restores the original controller configuration.
    ///
    /// Calling it again, or before initialization, does nothing.
    pub fn teardown(&mut self) -> TeardownReport {
        let Some(session) = self.session.take() else {
            return TeardownReport::default();
        };

        let report = session.teardown(&self.platform);
        self.screen_size = Size::from((0, 0));

        if report.is_clean() {
            info!("display torn down");
        } else {
            warn!(
                "display torn down with {} warnings",
                report.warnings.len()
            );
        }
        report
    }
}

impl<P: Platform> Drop for KmsDisplay<P> {
    fn drop(&mut self) {
        if self.session.is_some() {
            self.teardown();
        }
    }
}
