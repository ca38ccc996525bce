//! In-memory platform for exercising the backend without a GPU.
//!
//! All objects share one [`Hardware`] record which tracks what is registered with the
//! "kernel", which buffers are locked out of the pool, and the order of every call.

use std::cell::RefCell;
use std::collections::{BTreeSet, HashMap};
use std::io;
use std::path::{Path, PathBuf};
use std::rc::Rc;

use anyhow::{anyhow, bail, ensure};
use smithay::backend::allocator::gbm::GbmBufferFlags;
use smithay::backend::allocator::Fourcc;
use smithay::reexports::drm::control::{
    connector, crtc, encoder, framebuffer, Mode, RawResourceHandle,
};

use super::platform::{BufferPool, KmsDevice, Platform, RenderApi};
use super::types::{
    ConfigAttributes, ConnectorInfo, CrtcState, DisplayResources, GlesVersion, SCANOUT_BPP,
    SCANOUT_DEPTH, SCANOUT_FORMAT,
};

pub const CARD: &str = "/dev/dri/card1";
pub const ORIGINAL_FB: u32 = 99;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Call {
    OpenDevice(PathBuf),
    CloseDevice,
    FetchResources,
    CreateAllocator,
    DestroyAllocator,
    CreateSurface(u32, u32),
    DestroySurface,
    CreateRenderApi,
    TerminateRenderApi,
    CreateContext(u32),
    DestroyContext,
    CreateWindowSurface,
    DestroyWindowSurface,
    MakeCurrent,
    ReleaseCurrent,
    SwapInterval(i32),
    SwapBuffers,
    LockFrontBuffer(u32),
    ReleaseBuffer(u32),
    AddFramebuffer(u32),
    RemoveFramebuffer(u32),
    SetController(Option<u32>),
}

pub fn handle<T: From<RawResourceHandle>>(id: u32) -> T {
    T::from(RawResourceHandle::new(id).unwrap())
}

pub fn mode(width: u16, height: u16) -> Mode {
    Mode::from(drm_ffi::drm_mode_modeinfo {
        clock: 148500,
        hdisplay: width,
        hsync_start: width + 88,
        hsync_end: width + 132,
        htotal: width + 280,
        hskew: 0,
        vdisplay: height,
        vsync_start: height + 4,
        vsync_end: height + 9,
        vtotal: height + 45,
        vscan: 0,
        vrefresh: 60,
        flags: 0,
        type_: 0,
        name: [0; 32],
    })
}

#[derive(Debug)]
pub struct Hardware {
    pub calls: Vec<Call>,
    /// Protocol violations, such as releasing a buffer twice.
    pub violations: Vec<String>,

    pub devices: BTreeSet<PathBuf>,
    pub open_devices: usize,
    pub fail_resources: bool,
    pub connectors: Vec<ConnectorInfo>,
    pub encoders: HashMap<encoder::Handle, Option<crtc::Handle>>,
    pub crtcs: HashMap<crtc::Handle, CrtcState>,

    pub fail_allocator_surface: bool,
    pub pool_capacity: usize,
    pub queued: Vec<u32>,
    pub locked: BTreeSet<u32>,
    next_buffer: u32,

    /// Native visual ids of the configs `choose_configs` returns.
    pub visual_ids: Vec<Option<u32>>,
    pub fail_context: bool,
    pub fail_window_surface: bool,
    pub fail_submit: bool,
    pub current: bool,
    pub swap_interval: Option<i32>,

    pub registered: BTreeSet<u32>,
    next_framebuffer: u32,
    pub framebuffer_attempts: usize,
    pub fail_framebuffer_at: BTreeSet<usize>,
    pub modeset_attempts: usize,
    pub fail_modeset_at: BTreeSet<usize>,
    pub lock_attempts: usize,
    pub fail_lock_at: BTreeSet<usize>,
    pub fail_restore: bool,
}

impl Hardware {
    /// One disconnected connector followed by a connected one driving CRTC 30.
    pub fn kiosk() -> Self {
        let crtc: crtc::Handle = handle(30);
        let original = CrtcState {
            handle: crtc,
            framebuffer: Some(handle(ORIGINAL_FB)),
            position: (0, 0),
            mode: Some(mode(1280, 720)),
        };

        Self {
            calls: Vec::new(),
            violations: Vec::new(),
            devices: BTreeSet::from([PathBuf::from(CARD)]),
            open_devices: 0,
            fail_resources: false,
            connectors: vec![
                ConnectorInfo {
                    handle: handle(9),
                    connected: false,
                    modes: Vec::new(),
                    encoder: None,
                },
                ConnectorInfo {
                    handle: handle(10),
                    connected: true,
                    modes: vec![mode(1920, 1080), mode(1280, 720)],
                    encoder: Some(handle(20)),
                },
            ],
            encoders: HashMap::from([(handle(20), Some(crtc))]),
            crtcs: HashMap::from([(crtc, original)]),
            fail_allocator_surface: false,
            pool_capacity: 3,
            queued: Vec::new(),
            locked: BTreeSet::new(),
            next_buffer: 1,
            visual_ids: vec![Some(Fourcc::Argb8888 as u32), Some(SCANOUT_FORMAT as u32)],
            fail_context: false,
            fail_window_surface: false,
            fail_submit: false,
            current: false,
            swap_interval: None,
            registered: BTreeSet::new(),
            next_framebuffer: 100,
            framebuffer_attempts: 0,
            fail_framebuffer_at: BTreeSet::new(),
            modeset_attempts: 0,
            fail_modeset_at: BTreeSet::new(),
            lock_attempts: 0,
            fail_lock_at: BTreeSet::new(),
            fail_restore: false,
        }
    }

    /// Queues a newly rendered buffer in the pool, as a completed buffer swap does.
    pub fn render(&mut self) -> u32 {
        let id = self.next_buffer;
        self.next_buffer += 1;
        self.queued.push(id);
        id
    }

    pub fn crtc(&self) -> CrtcState {
        self.crtcs[&handle(30)]
    }

    /// Index of the first recorded call equal to `call`.
    pub fn position(&self, call: &Call) -> Option<usize> {
        self.calls.iter().position(|c| c == call)
    }
}

pub type SharedHardware = Rc<RefCell<Hardware>>;

pub fn shared(hw: Hardware) -> SharedHardware {
    Rc::new(RefCell::new(hw))
}

pub struct MockPlatform {
    pub hw: SharedHardware,
}

pub struct MockDevice {
    hw: SharedHardware,
}

pub struct MockAllocator {
    hw: SharedHardware,
}

pub struct MockSurface {
    hw: SharedHardware,
}

#[derive(Debug, PartialEq, Eq)]
pub struct MockBuffer(pub u32);

pub struct MockRender {
    hw: SharedHardware,
}

#[derive(Debug)]
pub struct MockContext;

#[derive(Debug)]
pub struct MockWindowSurface;

impl Platform for MockPlatform {
    type Buffer = MockBuffer;
    type Device = MockDevice;
    type Allocator = MockAllocator;
    type Surface = MockSurface;
    type Render = MockRender;

    fn probe(&self) -> anyhow::Result<()> {
        Ok(())
    }

    fn open_device(&self, path: &Path) -> io::Result<MockDevice> {
        let mut hw = self.hw.borrow_mut();
        if !hw.devices.contains(path) {
            return Err(io::Error::from(io::ErrorKind::NotFound));
        }
        hw.open_devices += 1;
        hw.calls.push(Call::OpenDevice(path.to_owned()));
        Ok(MockDevice {
            hw: self.hw.clone(),
        })
    }

    fn create_allocator(&self, _device: &MockDevice) -> anyhow::Result<MockAllocator> {
        self.hw.borrow_mut().calls.push(Call::CreateAllocator);
        Ok(MockAllocator {
            hw: self.hw.clone(),
        })
    }

    fn create_surface(
        &self,
        _allocator: &MockAllocator,
        width: u32,
        height: u32,
        format: Fourcc,
        usage: GbmBufferFlags,
    ) -> anyhow::Result<MockSurface> {
        let mut hw = self.hw.borrow_mut();
        ensure!(format == SCANOUT_FORMAT, "unexpected format {format}");
        ensure!(
            usage.contains(GbmBufferFlags::SCANOUT | GbmBufferFlags::RENDERING),
            "surface must be usable for scanout and rendering"
        );
        if hw.fail_allocator_surface {
            bail!("injected allocator surface failure");
        }
        hw.calls.push(Call::CreateSurface(width, height));
        Ok(MockSurface {
            hw: self.hw.clone(),
        })
    }

    fn create_render_api(&self, _allocator: &MockAllocator) -> anyhow::Result<MockRender> {
        self.hw.borrow_mut().calls.push(Call::CreateRenderApi);
        Ok(MockRender {
            hw: self.hw.clone(),
        })
    }

    fn destroy_surface(&self, surface: MockSurface) -> anyhow::Result<()> {
        surface.hw.borrow_mut().calls.push(Call::DestroySurface);
        Ok(())
    }

    fn destroy_allocator(&self, allocator: MockAllocator) -> anyhow::Result<()> {
        allocator.hw.borrow_mut().calls.push(Call::DestroyAllocator);
        Ok(())
    }

    fn close_device(&self, device: MockDevice) -> anyhow::Result<()> {
        let mut hw = device.hw.borrow_mut();
        if hw.open_devices == 0 {
            hw.violations.push("device closed twice".to_owned());
        } else {
            hw.open_devices -= 1;
        }
        hw.calls.push(Call::CloseDevice);
        Ok(())
    }
}

impl KmsDevice for MockDevice {
    type Buffer = MockBuffer;

    fn fetch_resources(&self) -> io::Result<DisplayResources> {
        let mut hw = self.hw.borrow_mut();
        hw.calls.push(Call::FetchResources);
        if hw.fail_resources {
            return Err(io::Error::other("not a KMS device"));
        }
        Ok(DisplayResources {
            connectors: hw.connectors.iter().map(|c| c.handle).collect(),
            encoders: hw.encoders.keys().copied().collect(),
            crtcs: hw.crtcs.keys().copied().collect(),
        })
    }

    fn connector(&self, handle: connector::Handle) -> io::Result<ConnectorInfo> {
        let hw = self.hw.borrow();
        hw.connectors
            .iter()
            .find(|c| c.handle == handle)
            .cloned()
            .ok_or_else(|| io::Error::from(io::ErrorKind::NotFound))
    }

    fn encoder_controller(&self, handle: encoder::Handle) -> io::Result<Option<crtc::Handle>> {
        let hw = self.hw.borrow();
        hw.encoders
            .get(&handle)
            .copied()
            .ok_or_else(|| io::Error::from(io::ErrorKind::NotFound))
    }

    fn controller_state(&self, handle: crtc::Handle) -> io::Result<CrtcState> {
        let hw = self.hw.borrow();
        hw.crtcs
            .get(&handle)
            .copied()
            .ok_or_else(|| io::Error::from(io::ErrorKind::NotFound))
    }

    fn register_framebuffer(
        &self,
        buffer: &MockBuffer,
        depth: u32,
        bpp: u32,
    ) -> io::Result<framebuffer::Handle> {
        let mut hw = self.hw.borrow_mut();
        hw.framebuffer_attempts += 1;
        if depth != SCANOUT_DEPTH || bpp != SCANOUT_BPP {
            return Err(io::Error::from(io::ErrorKind::InvalidInput));
        }
        if !hw.locked.contains(&buffer.0) {
            hw.violations
                .push(format!("framebuffer for unlocked buffer {}", buffer.0));
        }
        let attempt = hw.framebuffer_attempts;
        if hw.fail_framebuffer_at.contains(&attempt) {
            return Err(io::Error::other("injected framebuffer failure"));
        }
        let id = hw.next_framebuffer;
        hw.next_framebuffer += 1;
        hw.registered.insert(id);
        hw.calls.push(Call::AddFramebuffer(id));
        Ok(handle(id))
    }

    fn remove_framebuffer(&self, framebuffer: framebuffer::Handle) -> io::Result<()> {
        let mut hw = self.hw.borrow_mut();
        let id = u32::from(framebuffer);
        if !hw.registered.remove(&id) {
            hw.violations.push(format!("removed unknown framebuffer {id}"));
            return Err(io::Error::from(io::ErrorKind::NotFound));
        }
        hw.calls.push(Call::RemoveFramebuffer(id));
        Ok(())
    }

    fn set_controller(
        &self,
        crtc: crtc::Handle,
        framebuffer: Option<framebuffer::Handle>,
        position: (u32, u32),
        connectors: &[connector::Handle],
        mode: Option<Mode>,
    ) -> io::Result<()> {
        let mut hw = self.hw.borrow_mut();
        let fb = framebuffer.map(u32::from);
        let restoring = fb.map_or(true, |fb| !hw.registered.contains(&fb));

        if restoring {
            if hw.fail_restore {
                return Err(io::Error::other("injected restore failure"));
            }
        } else {
            hw.modeset_attempts += 1;
            let attempt = hw.modeset_attempts;
            if hw.fail_modeset_at.contains(&attempt) {
                return Err(io::Error::other("injected modeset failure"));
            }
        }

        if connectors.len() != 1 {
            hw.violations
                .push(format!("set_controller with {} connectors", connectors.len()));
        }

        let state = hw
            .crtcs
            .get_mut(&crtc)
            .ok_or_else(|| io::Error::from(io::ErrorKind::NotFound))?;
        state.framebuffer = framebuffer;
        state.position = position;
        state.mode = mode;
        hw.calls.push(Call::SetController(fb));
        Ok(())
    }
}

impl BufferPool for MockSurface {
    type Buffer = MockBuffer;

    fn lock_front_buffer(&mut self) -> anyhow::Result<MockBuffer> {
        let mut hw = self.hw.borrow_mut();
        hw.lock_attempts += 1;
        let attempt = hw.lock_attempts;
        if hw.fail_lock_at.contains(&attempt) {
            // The rendered buffer goes back to the pool unlocked.
            hw.queued.pop();
            bail!("injected lock failure");
        }
        ensure!(
            hw.locked.len() < hw.pool_capacity,
            "all {} buffers are locked",
            hw.pool_capacity
        );
        let id = hw
            .queued
            .pop()
            .ok_or_else(|| anyhow!("no rendered buffer"))?;
        hw.locked.insert(id);
        hw.calls.push(Call::LockFrontBuffer(id));
        Ok(MockBuffer(id))
    }

    fn release_buffer(&mut self, buffer: MockBuffer) {
        let mut hw = self.hw.borrow_mut();
        if !hw.locked.remove(&buffer.0) {
            hw.violations
                .push(format!("released unlocked buffer {}", buffer.0));
        }
        hw.calls.push(Call::ReleaseBuffer(buffer.0));
    }
}

impl RenderApi for MockRender {
    type Config = usize;
    type Context = MockContext;
    type Surface = MockWindowSurface;
    type Window = MockSurface;

    fn config_count(&self) -> anyhow::Result<usize> {
        Ok(self.hw.borrow().visual_ids.len() + 2)
    }

    fn choose_configs(
        &self,
        attributes: &ConfigAttributes,
        max: usize,
    ) -> anyhow::Result<Vec<usize>> {
        ensure!(attributes.window_surface, "window surface bit missing");
        let hw = self.hw.borrow();
        Ok((0..hw.visual_ids.len()).take(max).collect())
    }

    fn native_visual_id(&self, config: usize) -> Option<u32> {
        self.hw.borrow().visual_ids.get(config).copied().flatten()
    }

    fn create_context(&self, _config: usize, version: GlesVersion) -> anyhow::Result<MockContext> {
        let mut hw = self.hw.borrow_mut();
        if hw.fail_context {
            bail!("injected context failure");
        }
        hw.calls.push(Call::CreateContext(version.major()));
        Ok(MockContext)
    }

    fn create_window_surface(
        &self,
        _config: usize,
        _window: &MockSurface,
    ) -> anyhow::Result<MockWindowSurface> {
        let mut hw = self.hw.borrow_mut();
        if hw.fail_window_surface {
            bail!("injected window surface failure");
        }
        hw.calls.push(Call::CreateWindowSurface);
        Ok(MockWindowSurface)
    }

    fn make_current(&self, _surface: &MockWindowSurface, _context: &MockContext) -> anyhow::Result<()> {
        let mut hw = self.hw.borrow_mut();
        hw.current = true;
        hw.calls.push(Call::MakeCurrent);
        Ok(())
    }

    fn release_current(&self) -> anyhow::Result<()> {
        let mut hw = self.hw.borrow_mut();
        hw.current = false;
        hw.calls.push(Call::ReleaseCurrent);
        Ok(())
    }

    fn set_swap_interval(&self, interval: i32) -> anyhow::Result<()> {
        let mut hw = self.hw.borrow_mut();
        ensure!(hw.current, "no current context");
        hw.swap_interval = Some(interval);
        hw.calls.push(Call::SwapInterval(interval));
        Ok(())
    }

    fn swap_buffers(&self, _surface: &MockWindowSurface) -> anyhow::Result<()> {
        let mut hw = self.hw.borrow_mut();
        ensure!(hw.current, "no current context");
        if hw.fail_submit {
            bail!("injected submit failure");
        }
        hw.render();
        hw.calls.push(Call::SwapBuffers);
        Ok(())
    }

    fn destroy_surface(&self, _surface: MockWindowSurface) -> anyhow::Result<()> {
        let mut hw = self.hw.borrow_mut();
        if hw.current {
            hw.violations
                .push("window surface destroyed while current".to_owned());
        }
        hw.calls.push(Call::DestroyWindowSurface);
        Ok(())
    }

    fn destroy_context(&self, _context: MockContext) -> anyhow::Result<()> {
        let mut hw = self.hw.borrow_mut();
        if hw.current {
            hw.violations.push("context destroyed while current".to_owned());
        }
        hw.calls.push(Call::DestroyContext);
        Ok(())
    }
}

impl Drop for MockRender {
    fn drop(&mut self) {
        self.hw.borrow_mut().calls.push(Call::TerminateRenderApi);
    }
}
