//! Screenshot capture through a `DeviceController`.

use chrono::{DateTime, Local};
use image::RgbaImage;
use std::path::{Path, PathBuf};

use tracing::{debug, warn};

use crate::device::{DeviceController, DeviceError};

/// A captured frame.
#[derive(Debug, Clone)]
pub struct Screenshot {
    /// Decoded pixels
    pub image: RgbaImage,
    /// When the frame was captured
    pub captured_at: DateTime<Local>,
    /// Where the frame was written, if it was persisted
    pub path: Option<PathBuf>,
}

impl Screenshot {
    pub fn new(image: RgbaImage) -> Self {
        Self {
            image,
            captured_at: Local::now(),
            path: None,
        }
    }

    pub fn width(&self) -> u32 {
        self.image.width()
    }

    pub fn height(&self) -> u32 {
        self.image.height()
    }

    /// Short label for log lines.
    pub fn describe(&self) -> String {
        match &self.path {
            Some(path) => path.display().to_string(),
            None => format!(
                "<unsaved {}x{} frame @ {}>",
                self.width(),
                self.height(),
                self.captured_at.format("%H:%M:%S")
            ),
        }
    }
}

/// Builds a file name like `memu-59-check-start-3-20251018_142501.png`.
pub fn screenshot_file_name(index: u32, suffix: &str) -> String {
    let stamp = Local::now().format("%Y%m%d_%H%M%S");
    format!("memu-{}-{}-{}.png", index, suffix, stamp)
}

/// Captures, decodes and optionally saves a frame.
///
/// Empty or undecodable data is a capture error. A failed save is only
/// logged, the frame is still returned.
pub fn capture_screenshot(
    device: &mut dyn DeviceController,
    save_to: Option<&Path>,
) -> Result<Screenshot, DeviceError> {
    let bytes = device.capture_screenshot()?;
    if bytes.is_empty() {
        return Err(DeviceError::Screenshot("device returned no data".to_string()));
    }

    let image = image::load_from_memory(&bytes)
        .map_err(|e| DeviceError::Screenshot(format!("could not decode frame: {}", e)))?
        .to_rgba8();
    let mut shot = Screenshot::new(image);

    if let Some(path) = save_to {
        if let Some(parent) = path.parent() {
            let _ = std::fs::create_dir_all(parent);
        }
        match std::fs::write(path, &bytes) {
            Ok(()) => {
                debug!("Screenshot saved to {}", path.display());
                shot.path = Some(path.to_path_buf());
            }
            Err(e) => warn!("Failed to save screenshot {}: {}", path.display(), e),
        }
    }

    Ok(shot)
}
