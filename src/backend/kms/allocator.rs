//! Buffer allocation on top of the display device.

use smithay::backend::allocator::gbm::GbmBufferFlags;
use tracing::debug;

use super::error::{InitError, SurfaceKind};
use super::platform::Platform;
use super::types::{DisplayTarget, SCANOUT_FORMAT};

/// Buffers must be both renderable and scannable by the display controller.
pub fn scanout_usage() -> GbmBufferFlags {
    GbmBufferFlags::SCANOUT | GbmBufferFlags::RENDERING
}

pub fn create_allocator<P: Platform>(
    platform: &P,
    device: &P::Device,
) -> Result<P::Allocator, InitError> {
    platform
        .create_allocator(device)
        .map_err(|source| InitError::SurfaceCreate {
            kind: SurfaceKind::Allocator,
            source: source.context("error creating allocator device"),
        })
}

/// Creates the surface the rendering context draws into, sized to the active mode.
pub fn create_scanout_surface<P: Platform>(
    platform: &P,
    allocator: &P::Allocator,
    target: &DisplayTarget,
) -> Result<P::Surface, InitError> {
    let (width, height) = target.size();
    debug!("creating {width}x{height} {SCANOUT_FORMAT} surface");

    platform
        .create_surface(allocator, width, height, SCANOUT_FORMAT, scanout_usage())
        .map_err(|source| InitError::SurfaceCreate {
            kind: SurfaceKind::Allocator,
            source,
        })
}
