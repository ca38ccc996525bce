//! Configuration for the scanout display backend.
//!
//! The config is a small KDL document:
//!
//! ```kdl
//! output {
//!     device "/dev/dri/card1"
//!     // probe-device
//! }
//! vsync true
//! ```

use std::ffi::OsStr;
use std::path::{Path, PathBuf};

use miette::{Context, IntoDiagnostic};
use tracing::debug;

/// Device node used when the config names none.
///
/// This is a fixed secondary card index rather than a probed primary device. Boards such as
/// the Raspberry Pi 4 expose their display controller there.
pub const DEFAULT_DEVICE_PATH: &str = "/dev/dri/card1";

#[derive(knuffel::Decode, Debug, Clone, PartialEq)]
pub struct Config {
    #[knuffel(child, default)]
    pub output: Output,
    #[knuffel(child, unwrap(argument), default = true)]
    pub vsync: bool,
}

#[derive(knuffel::Decode, Debug, Default, Clone, PartialEq, Eq)]
pub struct Output {
    #[knuffel(child, unwrap(argument))]
    pub device: Option<PathBuf>,
    /// Scan `/dev/dri/card*` instead of using a fixed device node.
    #[knuffel(child)]
    pub probe_device: bool,
}

impl Output {
    pub fn device_path(&self) -> &Path {
        self.device
            .as_deref()
            .unwrap_or_else(|| Path::new(DEFAULT_DEVICE_PATH))
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            output: Output::default(),
            vsync: true,
        }
    }
}

impl Config {
    pub fn load(path: &Path) -> miette::Result<Self> {
        let _span = tracy_client::span!("Config::load");

        let contents = std::fs::read_to_string(path)
            .into_diagnostic()
            .with_context(|| format!("error reading {path:?}"))?;

        let filename = path
            .file_name()
            .and_then(OsStr::to_str)
            .unwrap_or("config.kdl");
        let config = Self::parse(filename, &contents).context("error parsing")?;
        debug!("loaded config from {path:?}");
        Ok(config)
    }

    pub fn parse(filename: &str, text: &str) -> Result<Self, knuffel::Error> {
        let _span = tracy_client::span!("Config::parse");
        knuffel::parse(filename, text)
    }
}
