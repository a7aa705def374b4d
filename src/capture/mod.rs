//! Screenshot capture from a device.
//!
//! This module provides:
//! - The `Screenshot` frame type (pixels + capture time + optional file)
//! - Capture-and-decode (`capture_screenshot`) with optional persistence

pub mod screenshot;

pub use screenshot::{Screenshot, capture_screenshot, screenshot_file_name};
