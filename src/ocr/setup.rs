use anyhow::{Result, anyhow};
use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};

use tracing::{info, warn};

use crate::automation::config::OcrConfig;

const TESSDATA_REPO: &str = "https://github.com/tesseract-ocr/tessdata/raw/main";

const COMMON_EXECUTABLES: &[&str] = &[
    r"C:\Program Files\Tesseract-OCR\tesseract.exe",
    r"C:\Program Files (x86)\Tesseract-OCR\tesseract.exe",
    "/usr/bin/tesseract",
    "/usr/local/bin/tesseract",
    "/opt/homebrew/bin/tesseract",
];

const COMMON_TESSDATA_DIRS: &[&str] = &[
    r"C:\Program Files\Tesseract-OCR\tessdata",
    r"C:\Program Files (x86)\Tesseract-OCR\tessdata",
    "/usr/share/tesseract-ocr/5/tessdata",
    "/usr/share/tesseract-ocr/4.00/tessdata",
    "/usr/share/tessdata",
    "/usr/local/share/tessdata",
    "/opt/homebrew/share/tessdata",
];

#[derive(Debug, Clone)]
pub struct TesseractPaths {
    pub executable: PathBuf,
    /// None lets tesseract fall back to its built-in tessdata location
    pub tessdata: Option<PathBuf>,
}

/// Returns the directory for storing downloaded Tesseract files
pub fn get_tesseract_dir() -> PathBuf {
    dirs::data_local_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join("alliance-logs")
        .join("tesseract")
}

/// Finds the executable and tessdata without touching the network.
pub fn locate_tesseract(config: &OcrConfig) -> Result<TesseractPaths> {
    let executable = find_tesseract_executable(config.tesseract_path.as_deref())?;
    let tessdata = find_tessdata_dir(config.tessdata_dir.as_deref(), &config.language);
    Ok(TesseractPaths {
        executable,
        tessdata,
    })
}

/// Ensures Tesseract is usable. Downloads the trained data if it is nowhere to be found.
pub fn ensure_tesseract(config: &OcrConfig) -> Result<TesseractPaths> {
    let executable = find_tesseract_executable(config.tesseract_path.as_deref())?;
    info!("Tesseract found at: {}", executable.display());

    if let Some(tessdata) = find_tessdata_dir(config.tessdata_dir.as_deref(), &config.language) {
        info!("tessdata found at: {}", tessdata.display());
        return Ok(TesseractPaths {
            executable,
            tessdata: Some(tessdata),
        });
    }

    let tessdata_dir = get_tesseract_dir().join("tessdata");
    match download_tessdata(&tessdata_dir, &config.language) {
        Ok(()) => Ok(TesseractPaths {
            executable,
            tessdata: Some(tessdata_dir),
        }),
        Err(e) => {
            warn!(
                "Could not download {}.traineddata: {}. Relying on tesseract's default tessdata.",
                config.language, e
            );
            Ok(TesseractPaths {
                executable,
                tessdata: None,
            })
        }
    }
}

/// Downloads `<language>.traineddata` into `tessdata_dir`
fn download_tessdata(tessdata_dir: &Path, language: &str) -> Result<()> {
    fs::create_dir_all(tessdata_dir)?;
    let url = format!("{}/{}.traineddata", TESSDATA_REPO, language);
    let target = tessdata_dir.join(format!("{}.traineddata", language));

    info!("Downloading {}...", url);

    let client = reqwest::blocking::Client::builder()
        .timeout(std::time::Duration::from_secs(300))
        .build()?;

    let response = client
        .get(&url)
        .header("User-Agent", "alliance-logs")
        .send()?;

    if !response.status().is_success() {
        return Err(anyhow!(
            "Failed to download {}.traineddata: HTTP {}",
            language,
            response.status()
        ));
    }

    let bytes = response.bytes()?;
    let mut file = fs::File::create(&target)?;
    file.write_all(&bytes)?;

    info!("Downloaded {} ({} bytes)", target.display(), bytes.len());

    Ok(())
}

/// Finds the Tesseract executable: configured path, local dir, PATH, then common install paths
pub fn find_tesseract_executable(configured: Option<&Path>) -> Result<PathBuf> {
    if let Some(path) = configured {
        if path.exists() {
            return Ok(path.to_path_buf());
        }
        warn!("Configured tesseract not found at {}", path.display());
    }

    let local_dir = get_tesseract_dir();
    for name in ["tesseract.exe", "tesseract"] {
        let local_exe = local_dir.join(name);
        if local_exe.exists() {
            return Ok(local_exe);
        }
    }

    if let Ok(output) = std::process::Command::new("tesseract")
        .arg("--version")
        .output()
    {
        if output.status.success() {
            return Ok(PathBuf::from("tesseract"));
        }
    }

    COMMON_EXECUTABLES
        .iter()
        .map(PathBuf::from)
        .find(|p| p.exists())
        .ok_or_else(|| anyhow!("Tesseract not found. Please install Tesseract-OCR."))
}

/// Finds a tessdata directory holding `<language>.traineddata`
pub fn find_tessdata_dir(configured: Option<&Path>, language: &str) -> Option<PathBuf> {
    let traineddata = format!("{}.traineddata", language);

    let mut candidates: Vec<PathBuf> = Vec::new();
    if let Some(path) = configured {
        candidates.push(path.to_path_buf());
    }
    candidates.push(get_tesseract_dir().join("tessdata"));
    if let Ok(prefix) = std::env::var("TESSDATA_PREFIX") {
        candidates.push(PathBuf::from(&prefix));
        candidates.push(PathBuf::from(&prefix).join("tessdata"));
    }
    candidates.extend(COMMON_TESSDATA_DIRS.iter().map(PathBuf::from));

    candidates
        .into_iter()
        .find(|dir| dir.join(&traineddata).exists())
}
