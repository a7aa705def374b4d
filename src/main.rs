//! Alliance Logs capture tool
//!
//! Starts MEmu emulator instances, clears pop-ups until the in-game Alliance
//! button is visible, opens Alliance Logs and extracts the log text with
//! Tesseract OCR.

mod automation;
mod capture;
mod cli;
mod device;
mod geometry;
mod logging;
mod ocr;
mod paths;
mod session;
mod vision;

use anyhow::{Context, Result, anyhow};
use clap::Parser;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use tracing::{info, warn};

use crate::automation::{AppConfig, load_config, resolve};
use crate::capture::{Screenshot, capture_screenshot, screenshot_file_name};
use crate::cli::{Cli, Commands};
use crate::device::AdbDevice;
use crate::ocr::setup::TesseractPaths;
use crate::ocr::{Tesseract, ensure_tesseract, ocr_text};
use crate::session::{CleanupGuard, Orchestrator, SessionRegistry, install_interrupt_handler};
use crate::vision::{ScreenOracle, VisionOracle};

/// Template file looked up in `resources/template/` when none is configured.
const DEFAULT_TEMPLATE_NAME: &str = "alliance.png";

fn main() -> Result<()> {
    let cli = Cli::parse();

    logging::install_panic_hook();
    let _log_guard = logging::init(cli.verbose)?;

    let config_path = cli
        .config
        .clone()
        .unwrap_or_else(paths::get_default_config_path);
    let mut config = load_config(&config_path);
    cli.command.overrides().apply(&mut config);
    if config.vision.template_path.is_none() {
        let default_template = paths::get_template_dir().join(DEFAULT_TEMPLATE_NAME);
        if default_template.exists() {
            config.vision.template_path = Some(default_template);
        }
    }

    match &cli.command {
        Commands::Run(_) => run(&config),
        Commands::Resolve { serial, .. } => resolve_device(&config, serial),
        Commands::Detect { image, .. } => detect_file(&config, image),
        Commands::Ocr { image, .. } => ocr_file(&config, image),
    }
}

/// Builds the OCR engine. A failed setup only disables OCR.
fn build_engine(config: &AppConfig) -> Tesseract {
    match ensure_tesseract(&config.ocr) {
        Ok(paths) => Tesseract::new(paths, config.ocr.language.clone(), config.ocr.psm),
        Err(e) => {
            warn!("Failed to setup Tesseract: {:#}", e);
            warn!("OCR features may not work correctly.");
            let paths = TesseractPaths {
                executable: PathBuf::from("tesseract"),
                tessdata: None,
            };
            Tesseract::new(paths, config.ocr.language.clone(), config.ocr.psm)
        }
    }
}

fn run(config: &AppConfig) -> Result<()> {
    paths::ensure_report_directories(&config.report_root).with_context(|| {
        format!("Failed to create report directories under {}", config.report_root.display())
    })?;

    let oracle = VisionOracle::new(build_engine(config), config.vision.clone());
    if config.vision.use_template && !oracle.has_template() {
        info!("No Alliance template loaded, relying on OCR only");
    }

    let registry = Arc::new(SessionRegistry::new());
    let _cleanup = CleanupGuard::new(Arc::clone(&registry));
    if let Err(e) = install_interrupt_handler(Arc::clone(&registry)) {
        warn!("Ctrl+C cleanup unavailable: {:#}", e);
    }

    let orchestrator = Orchestrator::new(config, &oracle, oracle.engine(), registry);
    let captured = orchestrator.run();
    if captured == 0 && !config.indexes.is_empty() {
        return Err(anyhow!("No instance reached the Alliance Logs screen"));
    }
    Ok(())
}

fn resolve_device(config: &AppConfig, serial: &str) -> Result<()> {
    let oracle = VisionOracle::new(build_engine(config), config.vision.clone());
    let mut device = AdbDevice::new(&config.memu_root, serial, config.tap_pause());

    let outcome = resolve(&mut device, &oracle, &config.resolve);

    println!(
        "success={} attempts={} taps={} elapsed={:.1}s",
        outcome.success,
        outcome.attempts,
        outcome.taps,
        outcome.elapsed.as_secs_f32()
    );
    println!("target: {}", outcome.target);

    if let Some(shot) = outcome.screenshot {
        let dir = paths::get_screenshots_dir(&config.report_root);
        std::fs::create_dir_all(&dir)?;
        let path = dir.join(screenshot_file_name(0, "resolve"));
        shot.image
            .save(&path)
            .with_context(|| format!("Failed to save {}", path.display()))?;
        println!("last frame: {}", path.display());
    } else {
        // Still try to leave a diagnostic frame behind
        let path = paths::get_screenshots_dir(&config.report_root).join(screenshot_file_name(0, "fail"));
        if let Ok(shot) = capture_screenshot(&mut device, Some(&path)) {
            println!("diagnostic frame: {}", shot.describe());
        }
    }
    Ok(())
}

fn load_image(path: &Path) -> Result<Screenshot> {
    let image = image::open(path)
        .with_context(|| format!("Failed to open image {}", path.display()))?
        .to_rgba8();
    let mut shot = Screenshot::new(image);
    shot.path = Some(path.to_path_buf());
    Ok(shot)
}

fn detect_file(config: &AppConfig, path: &Path) -> Result<()> {
    let shot = load_image(path)?;
    let oracle = VisionOracle::new(Tesseract::from_config(&config.ocr)?, config.vision.clone());

    println!("image: {} ({}x{})", shot.describe(), shot.width(), shot.height());
    println!("target: {}", oracle.detect_target(&shot.image));
    println!("close control: {}", oracle.detect_dismiss_control(&shot.image));
    Ok(())
}

fn ocr_file(config: &AppConfig, path: &Path) -> Result<()> {
    let shot = load_image(path)?;
    let engine = Tesseract::from_config(&config.ocr)?;
    let text = ocr_text(&engine, &shot.image)?;
    println!("{}", text);
    Ok(())
}
