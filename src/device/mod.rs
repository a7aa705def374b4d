//! Device control for MEmu emulator instances.
//!
//! This module provides:
//! - The `DeviceController` seam used by the dismissal loop (screenshot, tap, back)
//! - An adb-backed implementation (`AdbDevice`)
//! - Thin emulator start/stop glue over memuc

pub mod adb;
pub mod memu;

pub use adb::AdbDevice;

use std::time::Duration;
use thiserror::Error;

/// Errors raised by adb/memuc invocations.
#[derive(Debug, Error)]
pub enum DeviceError {
    #[error("Command not found: {program}")]
    CommandNotFound { program: String },

    #[error("Command failed ({code}): {command}\nSTDOUT:{stdout}\nSTDERR:{stderr}")]
    CommandFailed {
        command: String,
        code: i32,
        stdout: String,
        stderr: String,
    },

    #[error("Command timed out after {timeout:?}: {command}")]
    Timeout { command: String, timeout: Duration },

    #[error("Screenshot failed: {0}")]
    Screenshot(String),

    #[error("Timed out waiting for device {serial}")]
    DeviceNotReady { serial: String },

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// The operations the dismissal loop needs from a live device.
///
/// Every call blocks until the device has answered. Failures are reported but
/// callers in the loop treat them as transient.
pub trait DeviceController {
    /// Captures the current screen as encoded PNG bytes.
    fn capture_screenshot(&mut self) -> Result<Vec<u8>, DeviceError>;

    /// Taps at a pixel position.
    fn tap(&mut self, x: i32, y: i32) -> Result<(), DeviceError>;

    /// Sends the Android back key.
    fn back(&mut self) -> Result<(), DeviceError>;
}
