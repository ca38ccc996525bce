//! Seams between the backend core and the hardware.
//!
//! The core (locator, swapchain, render context, lifecycle) only talks to these traits. The
//! real implementation lives in `gbm.rs` and `egl.rs`.

use std::fmt;
use std::io;
use std::path::Path;

use smithay::backend::allocator::gbm::GbmBufferFlags;
use smithay::backend::allocator::Fourcc;
use smithay::reexports::drm::control::{connector, crtc, encoder, framebuffer, Mode};

use super::types::{ConfigAttributes, ConnectorInfo, CrtcState, DisplayResources, GlesVersion};

/// Kernel mode-setting calls made through the device handle.
pub trait KmsDevice {
    /// Buffer type that can be registered as a framebuffer.
    type Buffer;

    fn fetch_resources(&self) -> io::Result<DisplayResources>;
    fn connector(&self, handle: connector::Handle) -> io::Result<ConnectorInfo>;
    /// Display controller the encoder currently drives.
    fn encoder_controller(&self, handle: encoder::Handle) -> io::Result<Option<crtc::Handle>>;
    fn controller_state(&self, handle: crtc::Handle) -> io::Result<CrtcState>;

    fn register_framebuffer(
        &self,
        buffer: &Self::Buffer,
        depth: u32,
        bpp: u32,
    ) -> io::Result<framebuffer::Handle>;
    fn remove_framebuffer(&self, framebuffer: framebuffer::Handle) -> io::Result<()>;

    /// Points the controller at a framebuffer. Blocks until the kernel has applied it.
    fn set_controller(
        &self,
        crtc: crtc::Handle,
        framebuffer: Option<framebuffer::Handle>,
        position: (u32, u32),
        connectors: &[connector::Handle],
        mode: Option<Mode>,
    ) -> io::Result<()>;
}

/// The allocator surface's pool of rendered buffers.
pub trait BufferPool {
    type Buffer;

    /// Takes the most recently rendered buffer out of the pool.
    ///
    /// Must be called exactly once per submitted frame. Fails when the pool has no rendered
    /// buffer or its locked-buffer limit is reached.
    fn lock_front_buffer(&mut self) -> anyhow::Result<Self::Buffer>;

    /// Hands a locked buffer back to the pool for rendering.
    fn release_buffer(&mut self, buffer: Self::Buffer);
}

/// Rendering API (EGL) operations.
pub trait RenderApi {
    type Config: Copy + fmt::Debug;
    type Context;
    type Surface;
    /// Native window the render surface is bound to.
    type Window;

    /// Number of configs the display offers.
    fn config_count(&self) -> anyhow::Result<usize>;
    fn choose_configs(
        &self,
        attributes: &ConfigAttributes,
        max: usize,
    ) -> anyhow::Result<Vec<Self::Config>>;
    fn native_visual_id(&self, config: Self::Config) -> Option<u32>;

    fn create_context(
        &self,
        config: Self::Config,
        version: GlesVersion,
    ) -> anyhow::Result<Self::Context>;
    fn create_window_surface(
        &self,
        config: Self::Config,
        window: &Self::Window,
    ) -> anyhow::Result<Self::Surface>;

    fn make_current(&self, surface: &Self::Surface, context: &Self::Context)
        -> anyhow::Result<()>;
    fn release_current(&self) -> anyhow::Result<()>;
    fn set_swap_interval(&self, interval: i32) -> anyhow::Result<()>;
    /// Finishes rendering into the current back buffer and queues it in the window's pool.
    fn swap_buffers(&self, surface: &Self::Surface) -> anyhow::Result<()>;

    fn destroy_surface(&self, surface: Self::Surface) -> anyhow::Result<()>;
    fn destroy_context(&self, context: Self::Context) -> anyhow::Result<()>;
}

/// Factory for every hardware object the backend owns.
pub trait Platform {
    type Buffer;
    type Device: KmsDevice<Buffer = Self::Buffer>;
    type Allocator;
    type Surface: BufferPool<Buffer = Self::Buffer>;
    type Render: RenderApi<Window = Self::Surface>;

    /// Checks that the native libraries the platform needs are loadable.
    fn probe(&self) -> anyhow::Result<()>;

    fn open_device(&self, path: &Path) -> io::Result<Self::Device>;
    fn create_allocator(&self, device: &Self::Device) -> anyhow::Result<Self::Allocator>;
    fn create_surface(
        &self,
        allocator: &Self::Allocator,
        width: u32,
        height: u32,
        format: Fourcc,
        usage: GbmBufferFlags,
    ) -> anyhow::Result<Self::Surface>;
    fn create_render_api(&self, allocator: &Self::Allocator) -> anyhow::Result<Self::Render>;

    fn destroy_surface(&self, surface: Self::Surface) -> anyhow::Result<()> {
        drop(surface);
        Ok(())
    }

    fn destroy_allocator(&self, allocator: Self::Allocator) -> anyhow::Result<()> {
        drop(allocator);
        Ok(())
    }

    fn close_device(&self, device: Self::Device) -> anyhow::Result<()> {
        drop(device);
        Ok(())
    }
}
