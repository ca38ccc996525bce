//! Checks that the native libraries behind the platform can be loaded.

use std::ffi::CString;
use std::os::unix::ffi::OsStrExt as _;
use std::path::{Path, PathBuf};

use anyhow::{bail, Context as _};
use tracing::debug;

pub const GBM_LIBRARY: &str = "libgbm.so.1";
pub const DRM_LIBRARY: &str = "libdrm.so.2";
pub const EGL_LIBRARY: &str = "libEGL.so.1";
pub const GLES_LIBRARY: &str = "libGLESv2.so.2";

/// Directory of the legacy Raspberry Pi GL blobs, which do not work with KMS.
const LEGACY_VC_DIR: &str = "/opt/vc/lib";

/// Multiarch library directory to load GL libraries from when the legacy blobs are
/// installed, so the dynamic linker does not pick them up.
fn multiarch_dir(arch: &str) -> Option<&'static str> {
    match arch {
        "arm" => Some("/usr/lib/arm-linux-gnueabihf"),
        "aarch64" => Some("/usr/lib/aarch64-linux-gnu"),
        _ => None,
    }
}

/// Path to load a GL library from on `arch`.
fn gl_library_path(name: &str, arch: &str, exists: impl Fn(&Path) -> bool) -> PathBuf {
    if let Some(dir) = multiarch_dir(arch) {
        if exists(&Path::new(LEGACY_VC_DIR).join(name)) {
            return Path::new(dir).join(name);
        }
    }
    PathBuf::from(name)
}

/// Libraries to check, in order.
fn libraries(arch: &str, exists: impl Fn(&Path) -> bool) -> Vec<PathBuf> {
    vec![
        PathBuf::from(GBM_LIBRARY),
        PathBuf::from(DRM_LIBRARY),
        gl_library_path(EGL_LIBRARY, arch, &exists),
        gl_library_path(GLES_LIBRARY, arch, &exists),
    ]
}

fn can_load(path: &Path) -> anyhow::Result<bool> {
    let name = CString::new(path.as_os_str().as_bytes()).context("library path contains NUL")?;

    // SAFETY: the name is NUL-terminated and the handle is closed right away.
    unsafe {
        let handle = libc::dlopen(name.as_ptr(), libc::RTLD_LAZY);
        if handle.is_null() {
            return Ok(false);
        }
        libc::dlclose(handle);
    }
    Ok(true)
}

/// Fails with the first library that cannot be loaded.
pub fn probe_libraries() -> anyhow::Result<()> {
    let _span = tracy_client::span!("probe_libraries");

    for lib in libraries(std::env::consts::ARCH, |p| p.exists()) {
        if !can_load(&lib)? {
            bail!("failed to load {}", lib.display());
        }
        debug!("found {}", lib.display());
    }
    Ok(())
}
