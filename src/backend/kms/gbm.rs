//! The real platform: DRM device nodes, GBM buffers and EGL on top of them.

use std::fs::OpenOptions;
use std::io;
use std::os::fd::OwnedFd;
use std::os::unix::fs::OpenOptionsExt;
use std::path::Path;

use anyhow::Context as _;
use smithay::backend::allocator::gbm::{GbmBufferFlags, GbmDevice};
use smithay::backend::allocator::Fourcc;
use smithay::backend::drm::DrmDeviceFd;
use smithay::reexports::drm::control::{
    self, connector, crtc, encoder, framebuffer, Device as _, Mode,
};
use smithay::reexports::gbm;
use smithay::utils::DeviceFd;

use super::egl::EglApi;
use super::platform::{BufferPool, KmsDevice, Platform};
use super::probe::probe_libraries;
use super::types::{ConnectorInfo, CrtcState, DisplayResources};

pub type GbmSurface = gbm::Surface<()>;
pub type GbmBuffer = gbm::BufferObject<()>;

/// Platform backed by the kernel DRM interface, libgbm and libEGL.
#[derive(Debug, Default, Clone, Copy)]
pub struct GbmPlatform;

impl Platform for GbmPlatform {
    type Buffer = GbmBuffer;
    type Device = DrmDeviceFd;
    type Allocator = GbmDevice<DrmDeviceFd>;
    type Surface = GbmSurface;
    type Render = EglApi;

    fn probe(&self) -> anyhow::Result<()> {
        probe_libraries()
    }

    fn open_device(&self, path: &Path) -> io::Result<DrmDeviceFd> {
        let file = OpenOptions::new()
            .read(true)
            .write(true)
            .custom_flags(libc::O_CLOEXEC | libc::O_NOCTTY)
            .open(path)?;
        let fd = OwnedFd::from(file);
        Ok(DrmDeviceFd::new(DeviceFd::from(fd)))
    }

    fn create_allocator(&self, device: &DrmDeviceFd) -> anyhow::Result<GbmDevice<DrmDeviceFd>> {
        GbmDevice::new(device.clone()).context("error creating GBM device")
    }

    fn create_surface(
        &self,
        allocator: &GbmDevice<DrmDeviceFd>,
        width: u32,
        height: u32,
        format: Fourcc,
        usage: GbmBufferFlags,
    ) -> anyhow::Result<GbmSurface> {
        allocator
            .create_surface::<()>(width, height, format, usage)
            .with_context(|| format!("error creating {width}x{height} {format} GBM surface"))
    }

    fn create_render_api(&self, allocator: &GbmDevice<DrmDeviceFd>) -> anyhow::Result<EglApi> {
        EglApi::new(allocator)
    }
}

impl KmsDevice for DrmDeviceFd {
    type Buffer = GbmBuffer;

    fn fetch_resources(&self) -> io::Result<DisplayResources> {
        let res = self.resource_handles()?;
        Ok(DisplayResources {
            connectors: res.connectors().to_vec(),
            encoders: res.encoders().to_vec(),
            crtcs: res.crtcs().to_vec(),
        })
    }

    fn connector(&self, handle: connector::Handle) -> io::Result<ConnectorInfo> {
        let info = self.get_connector(handle, false)?;
        Ok(ConnectorInfo {
            handle,
            connected: info.state() == connector::State::Connected,
            modes: info.modes().to_vec(),
            encoder: info.current_encoder(),
        })
    }

    fn encoder_controller(&self, handle: encoder::Handle) -> io::Result<Option<crtc::Handle>> {
        Ok(self.get_encoder(handle)?.crtc())
    }

    fn controller_state(&self, handle: crtc::Handle) -> io::Result<CrtcState> {
        let info = self.get_crtc(handle)?;
        Ok(CrtcState {
            handle,
            framebuffer: info.framebuffer(),
            position: info.position(),
            mode: info.mode(),
        })
    }

    fn register_framebuffer(
        &self,
        buffer: &GbmBuffer,
        depth: u32,
        bpp: u32,
    ) -> io::Result<framebuffer::Handle> {
        self.add_framebuffer(buffer, depth, bpp)
    }

    fn remove_framebuffer(&self, framebuffer: framebuffer::Handle) -> io::Result<()> {
        self.destroy_framebuffer(framebuffer)
    }

    fn set_controller(
        &self,
        crtc: crtc::Handle,
        framebuffer: Option<framebuffer::Handle>,
        position: (u32, u32),
        connectors: &[connector::Handle],
        mode: Option<Mode>,
    ) -> io::Result<()> {
        control::Device::set_crtc(self, crtc, framebuffer, position, connectors, mode)
    }
}

impl BufferPool for GbmSurface {
    type Buffer = GbmBuffer;

    fn lock_front_buffer(&mut self) -> anyhow::Result<GbmBuffer> {
        // SAFETY: called once after every successful eglSwapBuffers on this surface.
        unsafe { gbm::Surface::lock_front_buffer(self) }
            .map_err(|err| anyhow::anyhow!("error locking front buffer: {err:?}"))
    }

    fn release_buffer(&mut self, buffer: GbmBuffer) {
        // Dropping a surface buffer object hands it back to the surface.
        drop(buffer);
    }
}
