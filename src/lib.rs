//! Direct-to-KMS display backend.
//!
//! Brings up a display on a machine without a windowing system: the kernel mode-setting
//! interface drives the output, GBM allocates the buffers and EGL renders into them.

pub mod backend;
pub mod cli;
pub mod pattern;
