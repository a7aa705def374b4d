//! Configuration types for automation.
//!
//! Loaded from config.json at startup; every field falls back to a default so
//! a partial file is fine. CLI flags are applied on top by `main`.

use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::geometry::Point;

/// Complete application configuration.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    /// MEmu instance indexes to process, in order
    pub indexes: Vec<u32>,
    /// Directory holding the MEmu VM images (informational)
    pub instance_root: PathBuf,
    /// MEmu install directory containing adb.exe and memuc.exe
    pub memu_root: PathBuf,
    /// Root output directory for screenshots and OCR reports
    pub report_root: PathBuf,
    /// Package to launch; auto-discovered when unset
    pub target_package: Option<String>,
    /// Delay after launching the app before the first screenshot (seconds)
    pub after_launch_delay_seconds: u64,
    /// Maximum time to wait for adb to report the device (seconds)
    pub device_boot_timeout_seconds: u64,
    /// Wait right after `memuc start` (seconds)
    pub initial_start_wait_seconds: u64,
    /// Extra wait once the device is reachable (seconds)
    pub post_start_wait_seconds: u64,
    /// Pause after every tap (milliseconds)
    pub tap_pause_ms: u64,
    /// Leave instances running after capture
    pub leave_running: bool,
    pub ocr: OcrConfig,
    pub vision: VisionConfig,
    pub resolve: ResolveConfig,
    pub navigation: NavigationConfig,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            indexes: vec![59, 57, 173],
            instance_root: PathBuf::from(r"Z:\Program Files\Microvirt\MEmu\MemuHyperv VMs"),
            memu_root: PathBuf::from(r"Z:\Program Files\Microvirt\MEmu"),
            report_root: PathBuf::from("reports"),
            target_package: None,
            after_launch_delay_seconds: 8,
            device_boot_timeout_seconds: 180,
            initial_start_wait_seconds: 45,
            post_start_wait_seconds: 10,
            tap_pause_ms: 700,
            leave_running: false,
            ocr: OcrConfig::default(),
            vision: VisionConfig::default(),
            resolve: ResolveConfig::default(),
            navigation: NavigationConfig::default(),
        }
    }
}

impl AppConfig {
    pub fn after_launch_delay(&self) -> Duration {
        Duration::from_secs(self.after_launch_delay_seconds)
    }

    pub fn tap_pause(&self) -> Duration {
        Duration::from_millis(self.tap_pause_ms)
    }
}

/// Tesseract settings.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(default)]
pub struct OcrConfig {
    /// Explicit tesseract executable; searched on PATH and common install dirs when unset
    pub tesseract_path: Option<PathBuf>,
    /// Explicit tessdata directory
    pub tessdata_dir: Option<PathBuf>,
    /// Recognition language
    pub language: String,
    /// Page segmentation mode (6 = single uniform block of text)
    pub psm: u8,
}

impl Default for OcrConfig {
    fn default() -> Self {
        Self {
            tesseract_path: None,
            tessdata_dir: None,
            language: "eng".to_string(),
            psm: 6,
        }
    }
}

/// Screen classification settings.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(default)]
pub struct VisionConfig {
    /// Phrase that marks the target UI
    pub target_phrase: String,
    /// Close-control labels, in priority order
    pub dismiss_phrases: Vec<String>,
    /// Enables the template fallback for the target
    pub use_template: bool,
    /// Reference image of the target button
    pub template_path: Option<PathBuf>,
    /// Minimum correlation score for a template hit (0.0-1.0)
    pub match_threshold: f32,
    /// Pixel stride of the coarse template search
    pub template_sample_step: u32,
    /// Upscale factor applied to heuristic regions before OCR
    pub region_upscale: f32,
    /// Binarization levels tried after the raw region, as fractions of max intensity
    pub threshold_levels: Vec<f32>,
}

impl Default for VisionConfig {
    fn default() -> Self {
        Self {
            target_phrase: "Alliance".to_string(),
            dismiss_phrases: ["X", "x", "Close", "Skip"]
                .iter()
                .map(|s| s.to_string())
                .collect(),
            use_template: true,
            template_path: None,
            match_threshold: 0.78,
            template_sample_step: 2,
            region_upscale: 2.0,
            threshold_levels: vec![0.3, 0.4, 0.5, 0.6, 0.7],
        }
    }
}

/// Pop-up dismissal loop settings.
///
/// The loop is attempt-bounded with a capped number of close taps. Setting
/// `max_popup_clears` to null removes the cap, `dismiss_timeout_seconds` adds a
/// wall-clock budget and `recheck_after_tap` re-checks the target right after
/// every close tap.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(default)]
pub struct ResolveConfig {
    /// Maximum number of screenshots to inspect
    pub max_attempts: u32,
    /// Maximum number of close taps; null = unlimited
    pub max_popup_clears: Option<u32>,
    /// Wall-clock budget for the whole loop (seconds); null = attempts only
    pub dismiss_timeout_seconds: Option<u64>,
    /// Capture and check for the target immediately after a close tap
    pub recheck_after_tap: bool,
    /// Settle delay after a close tap (seconds)
    pub tap_after_close_wait_seconds: u64,
    /// Delay between attempts without a close tap (seconds)
    pub wait_retry_seconds: u64,
    /// Tap position used by the stuck fallback
    pub fallback_tap: Point,
}

impl Default for ResolveConfig {
    fn default() -> Self {
        Self {
            max_attempts: 20,
            max_popup_clears: Some(2),
            dismiss_timeout_seconds: None,
            recheck_after_tap: false,
            tap_after_close_wait_seconds: 5,
            wait_retry_seconds: 2,
            // Top-center of a 540px wide screen
            fallback_tap: Point::new(270, 100),
        }
    }
}

impl ResolveConfig {
    pub fn settle_delay(&self) -> Duration {
        Duration::from_secs(self.tap_after_close_wait_seconds)
    }

    pub fn retry_delay(&self) -> Duration {
        Duration::from_secs(self.wait_retry_seconds)
    }

    pub fn time_budget(&self) -> Option<Duration> {
        self.dismiss_timeout_seconds.map(Duration::from_secs)
    }
}

/// Taps that lead from the main screen to the Alliance Logs page.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(default)]
pub struct NavigationConfig {
    /// Alliance button; the detected target location is used when unset
    pub alliance_tap: Option<Point>,
    /// Logs entry inside the Alliance menu
    pub logs_tap: Point,
    /// Wait after each navigation tap (seconds)
    pub delay_seconds: u64,
}

impl Default for NavigationConfig {
    fn default() -> Self {
        Self {
            alliance_tap: None,
            logs_tap: Point::new(270, 860),
            delay_seconds: 3,
        }
    }
}

impl NavigationConfig {
    pub fn delay(&self) -> Duration {
        Duration::from_secs(self.delay_seconds)
    }
}

/// Loads configuration from `path` or returns defaults.
pub fn load_config(path: &Path) -> AppConfig {
    tracing::info!("Looking for config at: {}", path.display());

    if !path.exists() {
        tracing::info!("{} not found. Using default config.", path.display());
        return AppConfig::default();
    }

    match fs::read_to_string(path) {
        Ok(contents) => match serde_json::from_str(&contents) {
            Ok(config) => {
                tracing::info!("Config loaded from {}", path.display());
                config
            }
            Err(e) => {
                tracing::warn!(
                    "Failed to parse {}: {}. Using defaults.",
                    path.display(),
                    e
                );
                AppConfig::default()
            }
        },
        Err(e) => {
            tracing::warn!("Failed to read {}: {}. Using defaults.", path.display(), e);
            AppConfig::default()
        }
    }
}
