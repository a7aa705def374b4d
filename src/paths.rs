use std::path::{Path, PathBuf};
use std::sync::OnceLock;

static EXE_DIR: OnceLock<PathBuf> = OnceLock::new();

/// Returns the directory containing the executable.
pub fn get_exe_dir() -> &'static PathBuf {
    EXE_DIR.get_or_init(|| {
        std::env::current_exe()
            .ok()
            .and_then(|p| p.parent().map(|p| p.to_path_buf()))
            .unwrap_or_else(|| PathBuf::from("."))
    })
}

/// Returns the logs directory: `<exe_dir>/logs/`
pub fn get_logs_dir() -> PathBuf {
    get_exe_dir().join("logs")
}

/// Returns the template directory: `<exe_dir>/resources/template/`
pub fn get_template_dir() -> PathBuf {
    get_exe_dir().join("resources").join("template")
}

/// Returns the default config file: `<exe_dir>/config.json`
pub fn get_default_config_path() -> PathBuf {
    get_exe_dir().join("config.json")
}

/// Returns the screenshots directory under a report root: `<report_root>/screenshots/`
pub fn get_screenshots_dir(report_root: &Path) -> PathBuf {
    report_root.join("screenshots")
}

/// Returns the OCR output directory under a report root: `<report_root>/ocr/`
pub fn get_ocr_dir(report_root: &Path) -> PathBuf {
    report_root.join("ocr")
}

/// Ensures the log directory exists. Call before logging is initialized.
pub fn ensure_log_directory() -> std::io::Result<()> {
    std::fs::create_dir_all(get_logs_dir())
}

/// Ensures all report directories exist under `report_root`.
pub fn ensure_report_directories(report_root: &Path) -> std::io::Result<()> {
    std::fs::create_dir_all(report_root)?;
    std::fs::create_dir_all(get_screenshots_dir(report_root))?;
    std::fs::create_dir_all(get_ocr_dir(report_root))?;
    Ok(())
}
