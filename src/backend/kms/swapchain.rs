//! Turning rendered buffers into what the display controller shows.
//!
//! Every frame the newest buffer is locked out of the pool, registered as a framebuffer and
//! set on the controller. The frame that was on screen before is retired only after the new
//! one is up, so at most two framebuffers are registered at any time and exactly one once a
//! presentation has completed.

use std::io;

use smithay::reexports::drm::control::{connector, crtc, framebuffer, Mode};
use tracing::{trace, warn};

use super::error::PresentationError;
use super::platform::{BufferPool, KmsDevice};
use super::types::{DisplayTarget, SCANOUT_BPP, SCANOUT_DEPTH};

/// A buffer the controller is scanning out, and its framebuffer registration.
#[derive(Debug)]
pub struct PresentedFrame<B> {
    pub framebuffer: framebuffer::Handle,
    pub buffer: B,
}

#[derive(Debug)]
pub struct Swapchain<B> {
    crtc: crtc::Handle,
    connector: connector::Handle,
    mode: Mode,
    /// The frame currently on screen. It is retired by the next successful presentation.
    previous: Option<PresentedFrame<B>>,
    frames_presented: u64,
}

impl<B> Swapchain<B> {
    pub fn new(target: &DisplayTarget) -> Self {
        Self {
            crtc: target.crtc,
            connector: target.connector,
            mode: target.mode,
            previous: None,
            frames_presented: 0,
        }
    }

    /// Shows the most recently submitted frame.
    ///
    /// Blocks until the controller scans out the new framebuffer. On error the frame is
    /// skipped: its buffer goes back to the pool and the frame on screen stays queued for
    /// retirement.
    pub fn present<D, S>(&mut self, device: &D, pool: &mut S) -> Result<(), PresentationError>
    where
        D: KmsDevice<Buffer = B>,
        S: BufferPool<Buffer = B>,
    {
        let _span = tracy_client::span!("Swapchain::present");

        let buffer = pool
            .lock_front_buffer()
            .map_err(PresentationError::LockFrontBuffer)?;

        let framebuffer = match device.register_framebuffer(&buffer, SCANOUT_DEPTH, SCANOUT_BPP) {
            Ok(framebuffer) => framebuffer,
            Err(err) => {
                pool.release_buffer(buffer);
                return Err(PresentationError::FramebufferAdd(err));
            }
        };

        if let Err(err) = device.set_controller(
            self.crtc,
            Some(framebuffer),
            (0, 0),
            &[self.connector],
            Some(self.mode),
        ) {
            if let Err(err) = device.remove_framebuffer(framebuffer) {
                warn!("error removing framebuffer {framebuffer:?}: {err:?}");
            }
            pool.release_buffer(buffer);
            return Err(PresentationError::Modeset(err));
        }

        let frame = PresentedFrame {
            framebuffer,
            buffer,
        };
        if let Some(previous) = self.previous.replace(frame) {
            if let Err(err) = retire(device, pool, previous) {
                warn!("error retiring previous frame: {err:?}");
            }
        }

        self.frames_presented += 1;
        trace!("presented frame {} on {framebuffer:?}", self.frames_presented);
        Ok(())
    }

    /// Removes the frame on screen from the bookkeeping, leaving retirement to the caller.
    pub fn take_pending(&mut self) -> Option<PresentedFrame<B>> {
        self.previous.take()
    }

    pub fn current_framebuffer(&self) -> Option<framebuffer::Handle> {
        self.previous.as_ref().map(|frame| frame.framebuffer)
    }

    pub fn frames_presented(&self) -> u64 {
        self.frames_presented
    }
}

/// Deregisters the frame's framebuffer and returns its buffer to the pool.
///
/// The buffer is released even if the framebuffer could not be removed.
pub fn retire<B, D, S>(device: &D, pool: &mut S, frame: PresentedFrame<B>) -> io::Result<()>
where
    D: KmsDevice<Buffer = B>,
    S: BufferPool<Buffer = B>,
{
    let PresentedFrame {
        framebuffer,
        buffer,
    } = frame;
    let res = device.remove_framebuffer(framebuffer);
    pool.release_buffer(buffer);
    res
}
