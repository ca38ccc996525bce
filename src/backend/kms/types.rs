//! Data model of the KMS backend.
//!
//! Kernel resource structures are copied into these plain values right after the query, so
//! nothing kernel-owned outlives the call that fetched it.

use std::path::PathBuf;

use scanout_config::Config;
use smithay::backend::allocator::Fourcc;
use smithay::reexports::drm::control::{connector, crtc, encoder, framebuffer, Mode};

// =============================================================================
// Build-time Parameters
// =============================================================================

/// The only pixel format scanned out: 32-bit packed XRGB.
pub const SCANOUT_FORMAT: Fourcc = Fourcc::Xrgb8888;

/// Color depth the framebuffer is registered with.
pub const SCANOUT_DEPTH: u32 = 24;

/// Bits per pixel the framebuffer is registered with.
pub const SCANOUT_BPP: u32 = 32;

/// OpenGL ES major version the rendering context is built for.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GlesVersion {
    Gles2,
    Gles3,
}

impl GlesVersion {
    pub const fn major(self) -> u32 {
        match self {
            GlesVersion::Gles2 => 2,
            GlesVersion::Gles3 => 3,
        }
    }
}

#[cfg(not(feature = "gles3"))]
pub const GLES_VERSION: GlesVersion = GlesVersion::Gles2;
#[cfg(feature = "gles3")]
pub const GLES_VERSION: GlesVersion = GlesVersion::Gles3;

/// Requirements a rendering configuration must satisfy.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ConfigAttributes {
    pub red_size: u8,
    pub green_size: u8,
    pub blue_size: u8,
    pub alpha_size: u8,
    pub window_surface: bool,
    pub api: GlesVersion,
}

impl ConfigAttributes {
    /// Attributes matching [`SCANOUT_FORMAT`]: 8 bits per color channel, no alpha.
    pub const fn scanout(api: GlesVersion) -> Self {
        Self {
            red_size: 8,
            green_size: 8,
            blue_size: 8,
            alpha_size: 0,
            window_surface: true,
            api,
        }
    }
}

// =============================================================================
// Kernel Resources
// =============================================================================

/// Handles enumerated from the kernel in one resource query.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DisplayResources {
    pub connectors: Vec<connector::Handle>,
    pub encoders: Vec<encoder::Handle>,
    pub crtcs: Vec<crtc::Handle>,
}

/// The fields of a connector the backend cares about.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConnectorInfo {
    pub handle: connector::Handle,
    pub connected: bool,
    /// Modes in the order the driver lists them.
    pub modes: Vec<Mode>,
    /// Encoder currently bound to the connector.
    pub encoder: Option<encoder::Handle>,
}

/// Live configuration of a display controller.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CrtcState {
    pub handle: crtc::Handle,
    pub framebuffer: Option<framebuffer::Handle>,
    pub position: (u32, u32),
    pub mode: Option<Mode>,
}

/// Everything the locator picked for presentation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DisplayTarget {
    pub connector: connector::Handle,
    pub crtc: crtc::Handle,
    /// The connector's first listed mode, used as the active mode.
    pub mode: Mode,
    /// Controller configuration captured before anything was changed, for restoration.
    pub original: CrtcState,
}

impl DisplayTarget {
    pub fn size(&self) -> (u32, u32) {
        let (w, h) = self.mode.size();
        (u32::from(w), u32::from(h))
    }
}

// =============================================================================
// Runtime Configuration
// =============================================================================

/// How the display device node is chosen.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DeviceSelection {
    /// Use exactly this device node.
    Fixed(PathBuf),
    /// Try every `cardN` node under the directory in numeric order.
    Probe(PathBuf),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DisplayConfig {
    pub device: DeviceSelection,
    pub vsync: bool,
}

impl DisplayConfig {
    pub fn from_config(config: &Config) -> Self {
        let device = if config.output.probe_device {
            DeviceSelection::Probe(PathBuf::from("/dev/dri"))
        } else {
            DeviceSelection::Fixed(config.output.device_path().to_owned())
        };

        Self {
            device,
            vsync: config.vsync,
        }
    }
}

impl Default for DisplayConfig {
    fn default() -> Self {
        Self::from_config(&Config::default())
    }
}
