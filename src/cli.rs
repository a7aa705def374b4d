//! Command-line interface.
//!
//! Flags given on the command line override values from config.json.

use clap::{Args, Parser, Subcommand};
use std::path::PathBuf;

use crate::automation::config::AppConfig;

#[derive(Parser, Debug)]
#[command(name = "alliance-logs")]
#[command(about = "Captures the Alliance Logs screen of MEmu instances and extracts its text", long_about = None)]
#[command(version)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,

    /// Config file (defaults to config.json next to the executable)
    #[arg(short, long, global = true)]
    pub config: Option<PathBuf>,

    /// Enable debug logging
    #[arg(short, long, global = true)]
    pub verbose: bool,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Start each instance, reach Alliance Logs, OCR it and write reports
    Run(RunArgs),

    /// Run only the pop-up dismissal loop against a running device
    Resolve {
        /// adb serial, e.g. 127.0.0.1:21503
        #[arg(short, long)]
        serial: String,

        #[command(flatten)]
        overrides: RunArgs,
    },

    /// Run both screen detections on an image file
    Detect {
        image: PathBuf,

        #[command(flatten)]
        overrides: RunArgs,
    },

    /// Print the OCR text of an image file
    Ocr {
        image: PathBuf,

        #[command(flatten)]
        overrides: RunArgs,
    },
}

/// Overrides for config.json values.
#[derive(Args, Debug, Default, Clone)]
pub struct RunArgs {
    /// MEmu instance indexes
    #[arg(long, num_args = 1.., value_delimiter = ',')]
    pub indexes: Option<Vec<u32>>,

    /// MEmu install directory containing adb.exe and memuc.exe
    #[arg(long)]
    pub memu_root: Option<PathBuf>,

    /// Directory holding the MEmu VMs
    #[arg(long)]
    pub instance_root: Option<PathBuf>,

    /// Root output directory for screenshots and OCR reports
    #[arg(long)]
    pub report_root: Option<PathBuf>,

    /// Package to launch
    #[arg(long)]
    pub target_package: Option<String>,

    /// Seconds to wait after launching the app
    #[arg(long)]
    pub after_launch_delay: Option<u64>,

    /// Seconds to wait for adb to see the device
    #[arg(long)]
    pub device_boot_timeout: Option<u64>,

    /// Seconds to wait right after `memuc start`
    #[arg(long)]
    pub initial_start_wait: Option<u64>,

    /// Extra seconds to wait once the device is reachable
    #[arg(long)]
    pub post_start_wait: Option<u64>,

    /// Wall-clock budget of the pop-up dismissal loop in seconds
    #[arg(long)]
    pub dismiss_timeout: Option<u64>,

    /// Seconds to wait after tapping a close control
    #[arg(long)]
    pub tap_after_close_wait: Option<u64>,

    /// Seconds between attempts without a close control
    #[arg(long)]
    pub wait_retry_seconds: Option<u64>,

    /// Path to tesseract(.exe)
    #[arg(long)]
    pub tesseract_path: Option<PathBuf>,

    /// Reference image of the Alliance button
    #[arg(long)]
    pub alliance_template: Option<PathBuf>,

    /// Disable template matching for the Alliance button
    #[arg(long)]
    pub no_template: bool,

    /// Leave instances running after capture
    #[arg(long)]
    pub leave_running: bool,
}

impl RunArgs {
    /// Applies every flag that was given on top of `config`.
    pub fn apply(&self, config: &mut AppConfig) {
        if let Some(indexes) = &self.indexes {
            config.indexes = indexes.clone();
        }
        if let Some(path) = &self.memu_root {
            config.memu_root = path.clone();
        }
        if let Some(path) = &self.instance_root {
            config.instance_root = path.clone();
        }
        if let Some(path) = &self.report_root {
            config.report_root = path.clone();
        }
        if let Some(package) = &self.target_package {
            config.target_package = Some(package.clone());
        }
        if let Some(secs) = self.after_launch_delay {
            config.after_launch_delay_seconds = secs;
        }
        if let Some(secs) = self.device_boot_timeout {
            config.device_boot_timeout_seconds = secs;
        }
        if let Some(secs) = self.initial_start_wait {
            config.initial_start_wait_seconds = secs;
        }
        if let Some(secs) = self.post_start_wait {
            config.post_start_wait_seconds = secs;
        }
        if let Some(secs) = self.dismiss_timeout {
            config.resolve.dismiss_timeout_seconds = Some(secs);
        }
        if let Some(secs) = self.tap_after_close_wait {
            config.resolve.tap_after_close_wait_seconds = secs;
        }
        if let Some(secs) = self.wait_retry_seconds {
            config.resolve.wait_retry_seconds = secs;
        }
        if let Some(path) = &self.tesseract_path {
            config.ocr.tesseract_path = Some(path.clone());
        }
        if let Some(path) = &self.alliance_template {
            config.vision.template_path = Some(path.clone());
        }
        if self.no_template {
            config.vision.use_template = false;
        }
        if self.leave_running {
            config.leave_running = true;
        }
    }
}

impl Commands {
    pub fn overrides(&self) -> &RunArgs {
        match self {
            Commands::Run(args) => args,
            Commands::Resolve { overrides, .. }
            | Commands::Detect { overrides, .. }
            | Commands::Ocr { overrides, .. } => overrides,
        }
    }
}
