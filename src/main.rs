use std::env;

use anyhow::Context as _;
use clap::Parser;
use directories::ProjectDirs;
use scanout::backend::kms::{DeviceSelection, DisplayConfig, KmsDisplay, GLES_VERSION};
use scanout::backend::{ContextRequest, VideoBackend};
use scanout::cli::{Cli, ConfigPath, Sub};
use scanout::pattern::clear_color;
use scanout_config::Config;
use smithay::backend::egl::get_proc_address;
use smithay::backend::renderer::gles::ffi::{self, Gles2};
use smithay::utils::Size;
use tracing::{debug, info, warn};
use tracing_subscriber::EnvFilter;

fn main() -> anyhow::Result<()> {
    let directives = env::var("RUST_LOG").unwrap_or_else(|_| "scanout=debug".to_owned());
    let env_filter = EnvFilter::builder().parse_lossy(directives);
    tracing_subscriber::fmt()
        .compact()
        .with_env_filter(env_filter)
        .init();

    let cli = Cli::parse();

    let config = load_config(&cli);
    let mut display_config = DisplayConfig::from_config(&config);
    if let Some(device) = cli.device {
        display_config.device = DeviceSelection::Fixed(device);
    }

    match cli.subcommand {
        Sub::Probe => {
            let display = KmsDisplay::with_config(display_config);
            VideoBackend::probe(&display)?;
            info!("all native libraries are loadable");
            Ok(())
        }
        Sub::Info => info(display_config),
        Sub::Run { frames, no_vsync } => {
            if no_vsync {
                display_config.vsync = false;
            }
            run(display_config, frames)
        }
    }
}

fn load_config(cli: &Cli) -> Config {
    let config_dir = ProjectDirs::from("", "", "scanout").map(|dirs| dirs.config_dir().to_owned());
    let path = ConfigPath::resolve(cli.config.clone(), env::var_os("SCANOUT_CONFIG"), config_dir);

    let Some(path) = path else {
        debug!("no config directory, using the default config");
        return Config::default();
    };

    if let ConfigPath::Default(path) = &path {
        if !path.exists() {
            debug!("{path:?} does not exist, using the default config");
            return Config::default();
        }
    }

    match Config::load(path.path()) {
        Ok(config) => config,
        Err(err) => {
            warn!("{err:?}");
            Config::default()
        }
    }
}

fn start(config: DisplayConfig) -> anyhow::Result<KmsDisplay> {
    let mut display = KmsDisplay::with_config(config);
    VideoBackend::probe(&display).context("native libraries are missing")?;

    display
        .create_context(ContextRequest {
            api_version: GLES_VERSION.major(),
            size: Size::from((0, 0)),
        })
        .context("error initializing the display")?;
    Ok(display)
}

fn info(config: DisplayConfig) -> anyhow::Result<()> {
    let mut display = start(config)?;

    if let Some(target) = display.target() {
        let size = display.screen_size();
        println!("connector: {:?}", target.connector);
        println!("controller: {:?}", target.crtc);
        println!(
            "mode: {}x{}@{} {:?}",
            size.w,
            size.h,
            target.mode.vrefresh(),
            target.mode.name()
        );
        if let Some(mode) = target.original.mode {
            let (w, h) = mode.size();
            println!("previous mode: {w}x{h}@{}", mode.vrefresh());
        }
    }

    let report = display.cleanup();
    for warning in &report.warnings {
        warn!("{warning:?}");
    }
    Ok(())
}

fn run(config: DisplayConfig, frames: u64) -> anyhow::Result<()> {
    let mut display = start(config)?;
    // SAFETY: the display's EGL context has been created and made current.
    let gl = Gles2::load_with(|symbol| unsafe { get_proc_address(symbol) });

    let mut skipped = 0;
    for frame in 0..frames {
        let [r, g, b] = clear_color(frame);
        // SAFETY: the display's context is current on this thread.
        unsafe {
            gl.ClearColor(r, g, b, 1.);
            gl.Clear(ffi::COLOR_BUFFER_BIT);
        }

        if let Err(err) = display.swap_buffers() {
            warn!("skipping frame {frame}: {err:?}");
            skipped += 1;
        }
    }
    let presented = display.frames_presented();
    info!("presented {presented} frames, skipped {skipped}");

    let report = display.cleanup();
    for warning in &report.warnings {
        warn!("{warning:?}");
    }
    Ok(())
}
