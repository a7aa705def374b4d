//! OCR report files for one captured Alliance Logs page.
//!
//! Each session writes a plain-text report and a one-column CSV with one row
//! per non-empty OCR line.

use anyhow::{Context, Result};
use chrono::{DateTime, Local};
use std::fs::File;
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};

/// CSV header row.
const CSV_HEADER: &str = "Line";

/// Everything that goes into a report.
#[derive(Debug, Clone)]
pub struct OcrReport<'a> {
    pub index: u32,
    pub serial: &'a str,
    pub screenshot: Option<&'a Path>,
    pub text: &'a str,
    pub created_at: DateTime<Local>,
}

/// Report paths `memu-<index>-<stamp>.txt` and `.csv` inside `ocr_dir`.
pub fn report_paths(ocr_dir: &Path, index: u32, created_at: &DateTime<Local>) -> (PathBuf, PathBuf) {
    let stem = format!("memu-{}-{}", index, created_at.format("%Y%m%d_%H%M%S"));
    (
        ocr_dir.join(format!("{}.txt", stem)),
        ocr_dir.join(format!("{}.csv", stem)),
    )
}

/// Writes the text report: a small header block, then the raw OCR text.
pub fn write_text_report(path: &Path, report: &OcrReport) -> Result<()> {
    let file = File::create(path).context("Failed to create text report")?;
    let mut out = BufWriter::new(file);

    let screenshot = report
        .screenshot
        .map(|p| p.display().to_string())
        .unwrap_or_else(|| "(none)".to_string());

    writeln!(out, "Timestamp: {}", report.created_at.format("%Y-%m-%d %H:%M:%S"))?;
    writeln!(out, "Index: {}", report.index)?;
    writeln!(out, "ADB: {}", report.serial)?;
    writeln!(out, "Screenshot: {}", screenshot)?;
    writeln!(out)?;
    writeln!(out, "---- OCR ----")?;
    write!(out, "{}", report.text)?;
    out.flush().context("Failed to write text report")?;
    Ok(())
}

/// Writes the OCR lines as a one-column CSV.
///
/// Lines are trimmed and empty lines dropped.
pub fn write_csv(path: &Path, text: &str) -> Result<()> {
    let file = File::create(path).context("Failed to create CSV report")?;
    let mut out = BufWriter::new(file);

    writeln!(out, "{}", CSV_HEADER).context("Failed to write CSV header")?;
    for line in text.lines().map(str::trim).filter(|l| !l.is_empty()) {
        writeln!(out, "{}", quote_field(line)).context("Failed to write CSV row")?;
    }
    out.flush().context("Failed to write CSV report")?;
    Ok(())
}

/// Writes both report files and returns their paths.
pub fn write_reports(ocr_dir: &Path, report: &OcrReport) -> Result<(PathBuf, PathBuf)> {
    std::fs::create_dir_all(ocr_dir)
        .with_context(|| format!("Failed to create {}", ocr_dir.display()))?;
    let (txt, csv) = report_paths(ocr_dir, report.index, &report.created_at);
    write_text_report(&txt, report)?;
    write_csv(&csv, report.text)?;
    Ok((txt, csv))
}

/// Quotes a field when it contains a delimiter, quote or line break.
fn quote_field(field: &str) -> String {
    if field.contains([',', '"', '\n', '\r']) {
        format!("\"{}\"", field.replace('"', "\"\""))
    } else {
        field.to_string()
    }
}
