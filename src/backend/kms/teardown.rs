//! Ordered, best-effort teardown.
//!
//! Each step runs regardless of whether earlier steps failed; failures are collected into a
//! [`TeardownReport`] instead of cutting teardown short.

use std::fmt;

use anyhow::Context;
use tracing::warn;

use super::platform::KmsDevice;
use super::types::DisplayTarget;

/// Teardown steps, in the order they run.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TeardownStep {
    ReleaseCurrent,
    RestoreController,
    RetirePendingFrame,
    DestroyWindowSurface,
    DestroyRenderContext,
    DestroyAllocatorSurface,
    DestroyAllocatorDevice,
    CloseDevice,
}

impl fmt::Display for TeardownStep {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            TeardownStep::ReleaseCurrent => "release current context",
            TeardownStep::RestoreController => "restore original crtc",
            TeardownStep::RetirePendingFrame => "retire pending frame",
            TeardownStep::DestroyWindowSurface => "destroy window surface",
            TeardownStep::DestroyRenderContext => "destroy render context",
            TeardownStep::DestroyAllocatorSurface => "destroy allocator surface",
            TeardownStep::DestroyAllocatorDevice => "destroy allocator device",
            TeardownStep::CloseDevice => "close device",
        };
        f.write_str(name)
    }
}

/// A teardown step failed. Later steps still ran.
#[derive(Debug, thiserror::Error)]
#[error("teardown step `{step}` failed")]
pub struct TeardownWarning {
    pub step: TeardownStep,
    #[source]
    pub error: anyhow::Error,
}

#[derive(Debug, Default)]
pub struct TeardownReport {
    /// Steps that ran, in order.
    pub steps: Vec<TeardownStep>,
    pub warnings: Vec<TeardownWarning>,
}

impl TeardownReport {
    pub fn run(&mut self, step: TeardownStep, f: impl FnOnce() -> anyhow::Result<()>) {
        self.steps.push(step);
        if let Err(error) = f() {
            warn!("error during teardown step `{step}`: {error:?}");
            self.warnings.push(TeardownWarning { step, error });
        }
    }

    pub fn is_clean(&self) -> bool {
        self.warnings.is_empty()
    }

    pub fn failed(&self, step: TeardownStep) -> bool {
        self.warnings.iter().any(|w| w.step == step)
    }
}

/// Puts back what the controller showed before initialization, on the same connector.
pub fn restore_controller<D: KmsDevice>(device: &D, target: &DisplayTarget) -> anyhow::Result<()> {
    let original = &target.original;
    device
        .set_controller(
            original.handle,
            original.framebuffer,
            original.position,
            &[target.connector],
            original.mode,
        )
        .context("error restoring original crtc state")
}
