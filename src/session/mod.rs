//! Per-instance session: start the emulator, launch the game, reach the
//! Alliance Logs page, capture and OCR it, write reports, stop the emulator.

pub mod registry;

pub use registry::{CleanupGuard, SessionEntry, SessionRegistry, install_interrupt_handler};

use anyhow::{Context, Result, anyhow};
use chrono::Local;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use tracing::{error, info, warn};

use crate::automation::clock::{Clock, SystemClock};
use crate::automation::config::{AppConfig, NavigationConfig};
use crate::automation::report::{OcrReport, write_reports};
use crate::automation::resolver::Resolver;
use crate::capture::{Screenshot, capture_screenshot, screenshot_file_name};
use crate::device::{AdbDevice, DeviceController, memu};
use crate::geometry::Point;
use crate::ocr::{OcrEngine, ocr_text};
use crate::paths::{get_ocr_dir, get_screenshots_dir};
use crate::vision::ScreenOracle;

/// Package auto-discovery prefers this one.
const PREFERRED_PACKAGE: &str = "com.readygo.barrel.gp";
/// Launch activity of the preferred package.
const PREFERRED_ACTIVITY: &str = "com.im30.aps.debug.UnityPlayerActivityCustom";

/// Picks the package to launch: the configured one, else the preferred
/// package, else the first installed package containing a `z`.
pub fn select_package(configured: Option<&str>, installed: &[String]) -> Option<String> {
    if let Some(package) = configured.filter(|p| !p.trim().is_empty()) {
        return Some(package.to_string());
    }
    if installed.iter().any(|p| p == PREFERRED_PACKAGE) {
        return Some(PREFERRED_PACKAGE.to_string());
    }
    installed
        .iter()
        .find(|p| p.to_lowercase().contains('z'))
        .cloned()
}

/// Known launch activity for a package.
pub fn launch_activity(package: &str) -> Option<&'static str> {
    (package == PREFERRED_PACKAGE).then_some(PREFERRED_ACTIVITY)
}

/// What one instance produced.
#[derive(Debug, Clone, PartialEq)]
pub enum SessionOutcome {
    Captured {
        screenshot: Option<PathBuf>,
        text_report: PathBuf,
        csv_report: PathBuf,
    },
    TargetNotReached {
        /// Diagnostic frame, if it could be captured
        screenshot: Option<PathBuf>,
    },
}

/// Taps through to the logs page, captures it, OCRs it and writes reports.
///
/// A failed capture or OCR run is recorded in the report text instead of
/// aborting.
#[allow(clippy::too_many_arguments)]
pub fn capture_logs(
    device: &mut dyn DeviceController,
    ocr: &dyn OcrEngine,
    clock: &dyn Clock,
    navigation: &NavigationConfig,
    alliance: Point,
    index: u32,
    serial: &str,
    report_root: &Path,
) -> Result<SessionOutcome> {
    info!("Navigating to Alliance Logs...");
    tap_logged(device, alliance, "Alliance");
    clock.sleep(navigation.delay());
    tap_logged(device, navigation.logs_tap, "Logs");
    clock.sleep(navigation.delay());

    let shot_path = get_screenshots_dir(report_root).join(screenshot_file_name(index, "logs"));
    let (shot, text) = match capture_screenshot(device, Some(&shot_path)) {
        Ok(shot) => {
            let text = ocr_text(ocr, &shot.image)
                .unwrap_or_else(|e| format!("(OCR failed: {:#})", e));
            (Some(shot), text)
        }
        Err(e) => {
            warn!("Logs screenshot failed: {}", e);
            (None, format!("(OCR failed: {})", e))
        }
    };
    let screenshot = shot.and_then(|s: Screenshot| s.path);

    let report = OcrReport {
        index,
        serial,
        screenshot: screenshot.as_deref(),
        text: &text,
        created_at: Local::now(),
    };
    let (text_report, csv_report) = write_reports(&get_ocr_dir(report_root), &report)?;
    info!("Report saved to {}", text_report.display());
    info!("CSV saved to {}", csv_report.display());

    Ok(SessionOutcome::Captured {
        screenshot,
        text_report,
        csv_report,
    })
}

fn tap_logged(device: &mut dyn DeviceController, point: Point, label: &str) {
    if let Err(e) = device.tap(point.x, point.y) {
        warn!("{} tap at {} failed: {}", label, point, e);
    }
}

/// Runs sessions for the configured instances one after another.
pub struct Orchestrator<'a> {
    config: &'a AppConfig,
    oracle: &'a dyn ScreenOracle,
    ocr: &'a dyn OcrEngine,
    registry: Arc<SessionRegistry>,
}

impl<'a> Orchestrator<'a> {
    pub fn new(
        config: &'a AppConfig,
        oracle: &'a dyn ScreenOracle,
        ocr: &'a dyn OcrEngine,
        registry: Arc<SessionRegistry>,
    ) -> Self {
        Self {
            config,
            oracle,
            ocr,
            registry,
        }
    }

    /// Processes every configured index. A failed session does not stop the run.
    ///
    /// Returns the number of instances whose logs were captured.
    pub fn run(&self) -> usize {
        let total = self.config.indexes.len();
        let mut captured = 0;

        for (i, &index) in self.config.indexes.iter().enumerate() {
            info!("=== Instance {} ({}/{}) ===", index, i + 1, total);
            match self.process_index(index) {
                Ok(SessionOutcome::Captured { .. }) => captured += 1,
                Ok(SessionOutcome::TargetNotReached { .. }) => {
                    warn!("Instance {}: Alliance screen not reached", index)
                }
                Err(e) => error!("Instance {} failed: {:#}", index, e),
            }
        }

        info!("Done: {}/{} instances captured", captured, total);
        captured
    }

    /// Full session for one instance. The instance is stopped afterwards
    /// unless `leave_running` is set.
    pub fn process_index(&self, index: u32) -> Result<SessionOutcome> {
        let config = self.config;
        self.check_instance_dir(index);

        let serial = memu::start_instance(index, &config.memu_root)
            .with_context(|| format!("Failed to start instance {}", index))?;
        self.registry.register(SessionEntry {
            index,
            serial: serial.clone(),
            memu_root: config.memu_root.clone(),
            should_stop: !config.leave_running,
        });

        let result = self.run_session(index, &serial);

        if !config.leave_running {
            if let Err(e) = memu::stop_instance(index, &config.memu_root) {
                warn!("Failed to stop instance {}: {}", index, e);
            }
        }
        self.registry.unregister(index, &serial);
        result
    }

    fn run_session(&self, index: u32, serial: &str) -> Result<SessionOutcome> {
        let config = self.config;
        let clock = SystemClock;
        let mut device = AdbDevice::new(&config.memu_root, serial, config.tap_pause());

        clock.sleep(Duration::from_secs(config.initial_start_wait_seconds));
        device
            .wait_for_device(Duration::from_secs(config.device_boot_timeout_seconds))
            .with_context(|| format!("Device {} never came online", serial))?;
        clock.sleep(Duration::from_secs(config.post_start_wait_seconds));

        device.unlock();
        let installed = if config.target_package.is_some() {
            Vec::new()
        } else {
            device.installed_packages().unwrap_or_else(|e| {
                warn!("Could not list packages: {}", e);
                Vec::new()
            })
        };
        match select_package(config.target_package.as_deref(), &installed) {
            Some(package) => {
                info!("Launching {}...", package);
                device.launch_app(&package, launch_activity(&package));
            }
            None => warn!("No target package found to launch."),
        }
        clock.sleep(config.after_launch_delay());

        let screenshots_dir = get_screenshots_dir(&config.report_root);
        let outcome = Resolver::new(&config.resolve, &clock)
            .save_screenshots(index, &screenshots_dir)
            .resolve(&mut device, self.oracle);

        if !outcome.success {
            warn!("Could not find Alliance button after dismissing pop-ups.");
            let path = screenshots_dir.join(screenshot_file_name(index, "fail"));
            let screenshot = match capture_screenshot(&mut device, Some(&path)) {
                Ok(shot) => shot.path,
                Err(e) => {
                    warn!("Diagnostic screenshot failed: {}", e);
                    None
                }
            };
            return Ok(SessionOutcome::TargetNotReached { screenshot });
        }

        let alliance = config
            .navigation
            .alliance_tap
            .or_else(|| outcome.target.location())
            .ok_or_else(|| anyhow!("Target found without a location"))?;
        info!("Alliance button found at {}", alliance);

        capture_logs(
            &mut device,
            self.ocr,
            &clock,
            &config.navigation,
            alliance,
            index,
            serial,
            &config.report_root,
        )
    }

    /// Warns when the VM directory of an instance is missing.
    fn check_instance_dir(&self, index: u32) {
        let root = &self.config.instance_root;
        if !root.is_dir() {
            return;
        }
        let name = if index == 0 {
            "MEmu".to_string()
        } else {
            format!("MEmu_{}", index)
        };
        if !root.join(&name).exists() {
            warn!("No VM directory {} under {}", name, root.display());
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::automation::clock::fake::FakeClock;
    use crate::device::DeviceError;
    use crate::ocr::engine::OcrWord;
    use image::{DynamicImage, ImageFormat, Rgba, RgbaImage};
    use std::io::Cursor;
    use tempfile::tempdir;

    struct LogsDevice {
        fail_capture: bool,
        taps: Vec<Point>,
    }

    impl DeviceController for LogsDevice {
        fn capture_screenshot(&mut self) -> Result<Vec<u8>, DeviceError> {
            if self.fail_capture {
                return Err(DeviceError::Screenshot("offline".to_string()));
            }
            let mut bytes = Vec::new();
            RgbaImage::from_pixel(8, 8, Rgba([0, 0, 0, 255]))
                .write_to(&mut Cursor::new(&mut bytes), ImageFormat::Png)
                .unwrap();
            Ok(bytes)
        }
        fn tap(&mut self, x: i32, y: i32) -> Result<(), DeviceError> {
            self.taps.push(Point::new(x, y));
            Ok(())
        }
        fn back(&mut self) -> Result<(), DeviceError> {
            Ok(())
        }
    }

    struct FixedOcr(Option<&'static str>);

    impl OcrEngine for FixedOcr {
        fn extract_text(&self, _img: &DynamicImage) -> anyhow::Result<String> {
            self.0
                .map(str::to_string)
                .ok_or_else(|| anyhow!("tesseract not found"))
        }
        fn extract_word_layout(&self, _img: &DynamicImage) -> anyhow::Result<Vec<OcrWord>> {
            Ok(Vec::new())
        }
    }

    #[test]
    fn test_select_package() {
        let installed = vec![
            "com.android.settings".to_string(),
            "com.lazy.game".to_string(),
            PREFERRED_PACKAGE.to_string(),
        ];
        assert_eq!(
            select_package(Some("org.example"), &installed).as_deref(),
            Some("org.example")
        );
        assert_eq!(select_package(None, &installed).as_deref(), Some(PREFERRED_PACKAGE));
        assert_eq!(
            select_package(None, &installed[..2]).as_deref(),
            Some("com.lazy.game")
        );
        assert_eq!(select_package(Some("  "), &[]), None);
    }

    #[test]
    fn test_launch_activity() {
        assert_eq!(launch_activity(PREFERRED_PACKAGE), Some(PREFERRED_ACTIVITY));
        assert_eq!(launch_activity("com.lazy.game"), None);
    }

    #[test]
    fn test_capture_logs_writes_reports() {
        let dir = tempdir().unwrap();
        let mut device = LogsDevice {
            fail_capture: false,
            taps: Vec::new(),
        };
        let clock = FakeClock::new();
        let navigation = NavigationConfig::default();

        let outcome = capture_logs(
            &mut device,
            &FixedOcr(Some("Alpha joined\n\nBeta left\n")),
            &clock,
            &navigation,
            Point::new(100, 900),
            59,
            "127.0.0.1:21559",
            dir.path(),
        )
        .unwrap();

        assert_eq!(device.taps, vec![Point::new(100, 900), navigation.logs_tap]);
        assert_eq!(clock.elapsed(), navigation.delay() * 2);
        match outcome {
            SessionOutcome::Captured {
                screenshot,
                csv_report,
                ..
            } => {
                assert!(screenshot.unwrap().exists());
                let csv = std::fs::read_to_string(csv_report).unwrap();
                assert_eq!(csv, "Line\nAlpha joined\nBeta left\n");
            }
            other => panic!("unexpected {:?}", other),
        }
    }

    #[test]
    fn test_capture_logs_records_ocr_failure() {
        let dir = tempdir().unwrap();
        let mut device = LogsDevice {
            fail_capture: false,
            taps: Vec::new(),
        };

        let outcome = capture_logs(
            &mut device,
            &FixedOcr(None),
            &FakeClock::new(),
            &NavigationConfig::default(),
            Point::new(1, 1),
            3,
            "emulator-5554",
            dir.path(),
        )
        .unwrap();

        let SessionOutcome::Captured { text_report, .. } = outcome else {
            panic!("expected a report");
        };
        let text = std::fs::read_to_string(text_report).unwrap();
        assert!(text.contains("---- OCR ----\n(OCR failed: tesseract not found)"));
    }

    #[test]
    fn test_capture_logs_without_screenshot() {
        let dir = tempdir().unwrap();
        let mut device = LogsDevice {
            fail_capture: true,
            taps: Vec::new(),
        };

        let outcome = capture_logs(
            &mut device,
            &FixedOcr(Some("unused")),
            &FakeClock::new(),
            &NavigationConfig::default(),
            Point::new(1, 1),
            3,
            "emulator-5554",
            dir.path(),
        )
        .unwrap();

        let SessionOutcome::Captured {
            screenshot,
            text_report,
            ..
        } = outcome
        else {
            panic!("expected a report");
        };
        assert!(screenshot.is_none());
        let text = std::fs::read_to_string(text_report).unwrap();
        assert!(text.contains("Screenshot: (none)"));
        assert!(text.contains("(OCR failed: Screenshot failed: offline)"));
    }
}
