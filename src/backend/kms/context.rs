//! Rendering context bound to the allocator surface.

use anyhow::Context as _;
use smithay::backend::allocator::Fourcc;
use tracing::{debug, trace};

use super::error::{InitError, SurfaceKind};
use super::platform::RenderApi;
use super::types::{ConfigAttributes, GlesVersion, SCANOUT_FORMAT};

/// The rendering context and its window surface.
///
/// The context is current on the calling thread between [`make_current`] and
/// [`release_current`]; it must be released before the surface or context are destroyed.
///
/// [`make_current`]: RenderContext::make_current
/// [`release_current`]: RenderContext::release_current
pub struct RenderContext<R: RenderApi> {
    config: R::Config,
    config_index: usize,
    context: Option<R::Context>,
    surface: Option<R::Surface>,
    current: bool,
    // Dropped last: the API owns the display connection.
    api: R,
}

impl<R: RenderApi> RenderContext<R> {
    /// Picks a config matching the scanout format and creates the context.
    pub fn new(api: R, version: GlesVersion) -> Result<Self, InitError> {
        let _span = tracy_client::span!("RenderContext::new");

        let available = api
            .config_count()
            .context("error enumerating configs")
            .map_err(InitError::ContextCreate)?;
        trace!("{available} configs available");

        let attributes = ConfigAttributes::scanout(version);
        let configs = api
            .choose_configs(&attributes, available)
            .context("error choosing config")
            .map_err(InitError::ContextCreate)?;

        let visual_ids = configs.iter().map(|config| api.native_visual_id(*config));
        let config_index = match_config_to_pixel_format(visual_ids, SCANOUT_FORMAT)?;
        let config = configs[config_index];
        debug!(
            "using config {config_index} of {} ({config:?}) for OpenGL ES {}",
            configs.len(),
            version.major()
        );

        let context = api
            .create_context(config, version)
            .map_err(InitError::ContextCreate)?;

        Ok(Self {
            config,
            config_index,
            context: Some(context),
            surface: None,
            current: false,
            api,
        })
    }

    pub fn config_index(&self) -> usize {
        self.config_index
    }

    pub fn is_current(&self) -> bool {
        self.current
    }

    pub fn create_window_surface(&mut self, window: &R::Window) -> Result<(), InitError> {
        let surface = self
            .api
            .create_window_surface(self.config, window)
            .map_err(|source| InitError::SurfaceCreate {
                kind: SurfaceKind::Window,
                source,
            })?;
        self.surface = Some(surface);
        Ok(())
    }

    pub fn make_current(&mut self) -> anyhow::Result<()> {
        let (Some(surface), Some(context)) = (&self.surface, &self.context) else {
            anyhow::bail!("no window surface to make current");
        };
        self.api.make_current(surface, context)?;
        self.current = true;
        Ok(())
    }

    pub fn release_current(&mut self) -> anyhow::Result<()> {
        if !self.current {
            return Ok(());
        }
        self.api.release_current()?;
        self.current = false;
        Ok(())
    }

    pub fn set_swap_interval(&self, interval: i32) -> anyhow::Result<()> {
        anyhow::ensure!(self.current, "context is not current");
        self.api.set_swap_interval(interval)
    }

    /// Finishes rendering of the current frame into the allocator surface's pool.
    ///
    /// This does not show the frame; the swapchain does that.
    pub fn submit_frame(&self) -> anyhow::Result<()> {
        anyhow::ensure!(self.current, "context is not current");
        let surface = self.surface.as_ref().context("no window surface")?;
        self.api.swap_buffers(surface)
    }

    pub fn destroy_surface(&mut self) -> anyhow::Result<()> {
        match self.surface.take() {
            Some(surface) => self.api.destroy_surface(surface),
            None => Ok(()),
        }
    }

    pub fn destroy_context(&mut self) -> anyhow::Result<()> {
        match self.context.take() {
            Some(context) => self.api.destroy_context(context),
            None => Ok(()),
        }
    }

    pub fn has_surface(&self) -> bool {
        self.surface.is_some()
    }

    pub fn api(&self) -> &R {
        &self.api
    }
}

/// Index of the first config whose native visual is exactly `format`.
///
/// There is no fallback format.
pub fn match_config_to_pixel_format(
    visual_ids: impl IntoIterator<Item = Option<u32>>,
    format: Fourcc,
) -> Result<usize, InitError> {
    visual_ids
        .into_iter()
        .position(|id| id == Some(format as u32))
        .ok_or(InitError::ConfigMatch { format })
}
