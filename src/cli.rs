//! Command line of the demo binary.

use std::ffi::OsString;
use std::path::PathBuf;

use clap::{Parser, Subcommand};

#[derive(Parser)]
#[command(author, version, about, long_about = None)]
#[command(subcommand_value_name = "SUBCOMMAND")]
#[command(subcommand_help_heading = "Subcommands")]
pub struct Cli {
    /// Path to config file (default: `$XDG_CONFIG_HOME/scanout/config.kdl`).
    ///
    /// This can also be set with the `SCANOUT_CONFIG` environment variable. If both are set,
    /// the command line argument takes precedence.
    #[arg(short, long)]
    pub config: Option<PathBuf>,
    /// Display device node to use instead of the configured one.
    #[arg(short, long)]
    pub device: Option<PathBuf>,

    #[command(subcommand)]
    pub subcommand: Sub,
}

#[derive(Subcommand)]
pub enum Sub {
    /// Check that the native libraries can be loaded.
    Probe,
    /// Bring up the display, print what was picked, and tear it down.
    Info,
    /// Show a color-cycling test pattern.
    Run {
        /// Number of frames to present.
        #[arg(short, long, default_value_t = 300)]
        frames: u64,
        /// Present without waiting for vertical blank.
        #[arg(long)]
        no_vsync: bool,
    },
}

/// Where the config file comes from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConfigPath {
    /// Given explicitly; it must exist.
    Explicit(PathBuf),
    /// The default location; a missing file means the default config.
    Default(PathBuf),
}

impl ConfigPath {
    pub fn resolve(
        cli: Option<PathBuf>,
        env: Option<OsString>,
        config_dir: Option<PathBuf>,
    ) -> Option<Self> {
        if let Some(path) = cli {
            return Some(Self::Explicit(path));
        }
        if let Some(path) = env.filter(|p| !p.is_empty()) {
            return Some(Self::Explicit(PathBuf::from(path)));
        }
        config_dir.map(|dir| Self::Default(dir.join("config.kdl")))
    }

    pub fn path(&self) -> &PathBuf {
        match self {
            ConfigPath::Explicit(path) | ConfigPath::Default(path) => path,
        }
    }
}
