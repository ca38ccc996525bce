//! EGL on a GBM device.
//!
//! Smithay's `EGLDisplay` loads libEGL and owns the display connection; everything past
//! that goes through the raw EGL entry points, since the context and window surface are
//! managed explicitly here rather than by a smithay renderer.

use std::os::raw::c_void;
use std::ptr;

use anyhow::{bail, ensure, Context as _};
use smithay::backend::allocator::gbm::GbmDevice;
use smithay::backend::drm::DrmDeviceFd;
use smithay::backend::egl::ffi::egl;
use smithay::backend::egl::ffi::egl::types::{
    EGLBoolean, EGLConfig, EGLContext, EGLNativeWindowType, EGLSurface, EGLint,
};
use smithay::backend::egl::EGLDisplay;
use smithay::reexports::gbm::AsRaw;

use super::gbm::GbmSurface;
use super::platform::RenderApi;
use super::types::{ConfigAttributes, GlesVersion};

#[derive(Debug)]
pub struct EglContext(EGLContext);

#[derive(Debug)]
pub struct EglSurface(EGLSurface);

/// EGL display opened on a GBM device.
pub struct EglApi {
    display: EGLDisplay,
}

impl EglApi {
    pub fn new(gbm: &GbmDevice<DrmDeviceFd>) -> anyhow::Result<Self> {
        // SAFETY: the GBM device outlives the display, which is dropped in teardown
        // before the allocator.
        let display = unsafe { EGLDisplay::new(gbm.clone()) }.context("error creating EGL display")?;

        let api = Self { display };
        // SAFETY: the display is initialized.
        let ok = unsafe { egl::BindAPI(egl::OPENGL_ES_API) };
        api.check(ok, "eglBindAPI")?;
        Ok(api)
    }

    pub fn display(&self) -> &EGLDisplay {
        &self.display
    }

    fn raw(&self) -> egl::types::EGLDisplay {
        **self.display.get_display_handle()
    }

    fn check(&self, ok: EGLBoolean, call: &str) -> anyhow::Result<()> {
        if ok == egl::FALSE as EGLBoolean {
            bail!("{call} failed: {}", last_error());
        }
        Ok(())
    }
}

fn last_error() -> String {
    // SAFETY: eglGetError has no preconditions.
    let code = unsafe { egl::GetError() };
    format!("EGL error 0x{code:x}")
}

/// Attribute list for `eglChooseConfig`.
pub fn config_attrib_list(attributes: &ConfigAttributes) -> Vec<EGLint> {
    let renderable = match attributes.api {
        GlesVersion::Gles2 => egl::OPENGL_ES2_BIT,
        GlesVersion::Gles3 => egl::OPENGL_ES3_BIT,
    };

    let mut list = vec![
        egl::RED_SIZE as EGLint,
        EGLint::from(attributes.red_size),
        egl::GREEN_SIZE as EGLint,
        EGLint::from(attributes.green_size),
        egl::BLUE_SIZE as EGLint,
        EGLint::from(attributes.blue_size),
        egl::ALPHA_SIZE as EGLint,
        EGLint::from(attributes.alpha_size),
        egl::RENDERABLE_TYPE as EGLint,
        renderable as EGLint,
    ];
    if attributes.window_surface {
        list.extend([egl::SURFACE_TYPE as EGLint, egl::WINDOW_BIT as EGLint]);
    }
    list.push(egl::NONE as EGLint);
    list
}

impl RenderApi for EglApi {
    type Config = EGLConfig;
    type Context = EglContext;
    type Surface = EglSurface;
    type Window = GbmSurface;

    fn config_count(&self) -> anyhow::Result<usize> {
        let mut count = 0;
        // SAFETY: a null config array only queries the count.
        let ok = unsafe { egl::GetConfigs(self.raw(), ptr::null_mut(), 0, &mut count) };
        self.check(ok, "eglGetConfigs")?;
        Ok(usize::try_from(count).unwrap_or(0))
    }

    fn choose_configs(
        &self,
        attributes: &ConfigAttributes,
        max: usize,
    ) -> anyhow::Result<Vec<EGLConfig>> {
        let attribs = config_attrib_list(attributes);
        let mut configs: Vec<EGLConfig> = vec![ptr::null(); max];
        let mut count = 0;
        let size = EGLint::try_from(max).context("too many configs")?;

        // SAFETY: `configs` has room for `size` entries and `attribs` is NONE-terminated.
        let ok = unsafe {
            egl::ChooseConfig(
                self.raw(),
                attribs.as_ptr(),
                configs.as_mut_ptr(),
                size,
                &mut count,
            )
        };
        self.check(ok, "eglChooseConfig")?;

        configs.truncate(usize::try_from(count).unwrap_or(0));
        Ok(configs)
    }

    fn native_visual_id(&self, config: EGLConfig) -> Option<u32> {
        let mut value = 0;
        // SAFETY: `config` came from eglChooseConfig on this display.
        let ok = unsafe {
            egl::GetConfigAttrib(
                self.raw(),
                config,
                egl::NATIVE_VISUAL_ID as EGLint,
                &mut value,
            )
        };
        if ok == egl::FALSE as EGLBoolean {
            return None;
        }
        u32::try_from(value).ok()
    }

    fn create_context(&self, config: EGLConfig, version: GlesVersion) -> anyhow::Result<EglContext> {
        let attribs = [
            egl::CONTEXT_CLIENT_VERSION as EGLint,
            version.major() as EGLint,
            egl::NONE as EGLint,
        ];

        // SAFETY: `attribs` is NONE-terminated.
        let context =
            unsafe { egl::CreateContext(self.raw(), config, ptr::null(), attribs.as_ptr()) };
        ensure!(
            !context.is_null(),
            "eglCreateContext failed: {}",
            last_error()
        );
        Ok(EglContext(context))
    }

    fn create_window_surface(
        &self,
        config: EGLConfig,
        window: &GbmSurface,
    ) -> anyhow::Result<EglSurface> {
        let native = window.as_raw() as *const c_void as EGLNativeWindowType;
        let attribs = [egl::NONE as EGLint];

        // SAFETY: the GBM surface outlives the EGL surface, which is destroyed first in
        // teardown.
        let surface =
            unsafe { egl::CreateWindowSurface(self.raw(), config, native, attribs.as_ptr()) };
        ensure!(
            !surface.is_null(),
            "eglCreateWindowSurface failed: {}",
            last_error()
        );
        Ok(EglSurface(surface))
    }

    fn make_current(&self, surface: &EglSurface, context: &EglContext) -> anyhow::Result<()> {
        // SAFETY: both objects belong to this display.
        let ok = unsafe { egl::MakeCurrent(self.raw(), surface.0, surface.0, context.0) };
        self.check(ok, "eglMakeCurrent")
    }

    fn release_current(&self) -> anyhow::Result<()> {
        // SAFETY: unbinding is always valid on an initialized display.
        let ok =
            unsafe { egl::MakeCurrent(self.raw(), ptr::null(), ptr::null(), ptr::null()) };
        self.check(ok, "eglMakeCurrent")
    }

    fn set_swap_interval(&self, interval: i32) -> anyhow::Result<()> {
        // SAFETY: a context is current on this thread.
        let ok = unsafe { egl::SwapInterval(self.raw(), interval) };
        self.check(ok, "eglSwapInterval")
    }

    fn swap_buffers(&self, surface: &EglSurface) -> anyhow::Result<()> {
        let _span = tracy_client::span!("eglSwapBuffers");

        // SAFETY: the surface belongs to this display.
        let ok = unsafe { egl::SwapBuffers(self.raw(), surface.0) };
        self.check(ok, "eglSwapBuffers")
    }

    fn destroy_surface(&self, surface: EglSurface) -> anyhow::Result<()> {
        // SAFETY: the surface is not current.
        let ok = unsafe { egl::DestroySurface(self.raw(), surface.0) };
        self.check(ok, "eglDestroySurface")
    }

    fn destroy_context(&self, context: EglContext) -> anyhow::Result<()> {
        // SAFETY: the context is not current.
        let ok = unsafe { egl::DestroyContext(self.raw(), context.0) };
        self.check(ok, "eglDestroyContext")
    }
}
