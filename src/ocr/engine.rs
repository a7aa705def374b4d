use anyhow::{Context, Result, anyhow};
use image::DynamicImage;
use std::path::PathBuf;
use std::process::Command;
use tempfile::NamedTempFile;

use super::setup::{TesseractPaths, locate_tesseract};
use crate::automation::config::OcrConfig;
use crate::geometry::BoundingBox;

/// Identifies the text line a word belongs to: (block, paragraph, line).
pub type LineId = (u32, u32, u32);

/// A single word from OCR with its position and confidence score.
#[derive(Debug, Clone, PartialEq)]
pub struct OcrWord {
    pub text: String,
    pub bbox: BoundingBox,
    pub confidence: f32,
    pub line: LineId,
}

/// Text recognition backend.
pub trait OcrEngine {
    /// Returns the plain text found in the image.
    fn extract_text(&self, img: &DynamicImage) -> Result<String>;

    /// Returns every recognized word in reading order.
    fn extract_word_layout(&self, img: &DynamicImage) -> Result<Vec<OcrWord>>;
}

/// Tesseract driven as an external process.
#[derive(Debug, Clone)]
pub struct Tesseract {
    executable: PathBuf,
    tessdata: Option<PathBuf>,
    language: String,
    psm: u8,
}

impl Tesseract {
    pub fn new(paths: TesseractPaths, language: impl Into<String>, psm: u8) -> Self {
        Self {
            executable: paths.executable,
            tessdata: paths.tessdata,
            language: language.into(),
            psm,
        }
    }

    /// Locates the executable and tessdata described by `config`.
    pub fn from_config(config: &OcrConfig) -> Result<Self> {
        let paths = locate_tesseract(config)?;
        Ok(Self::new(paths, config.language.clone(), config.psm))
    }

    /// Saves `img` to a temporary PNG and runs tesseract on it with `output` as
    /// the output base (or `stdout`), followed by `extra` args.
    fn run(&self, img: &DynamicImage, output: &str, extra: &[&str]) -> Result<Vec<u8>> {
        let temp_input = NamedTempFile::with_suffix(".png")?;
        img.save(temp_input.path())
            .context("Failed to write OCR input image")?;

        let mut cmd = Command::new(&self.executable);
        cmd.arg(temp_input.path()).arg(output);
        if let Some(tessdata) = &self.tessdata {
            cmd.arg("--tessdata-dir").arg(tessdata);
        }
        cmd.arg("-l")
            .arg(&self.language)
            .arg("--psm")
            .arg(self.psm.to_string())
            .args(extra);

        let result = cmd
            .output()
            .with_context(|| format!("Failed to run {}", self.executable.display()))?;

        if !result.status.success() {
            let stderr = String::from_utf8_lossy(&result.stderr);
            return Err(anyhow!("Tesseract failed: {}", stderr));
        }

        Ok(result.stdout)
    }
}

impl OcrEngine for Tesseract {
    fn extract_text(&self, img: &DynamicImage) -> Result<String> {
        let stdout = self.run(img, "stdout", &[])?;
        Ok(String::from_utf8_lossy(&stdout).to_string())
    }

    fn extract_word_layout(&self, img: &DynamicImage) -> Result<Vec<OcrWord>> {
        // Tesseract appends .tsv to the output base
        let temp_output = NamedTempFile::new()?;
        let output_base = temp_output.path().to_string_lossy().to_string();

        self.run(img, &output_base, &["tsv"])?;

        let tsv_path = format!("{}.tsv", output_base);
        let tsv_content = std::fs::read_to_string(&tsv_path)
            .map_err(|e| anyhow!("Failed to read Tesseract output: {}", e))?;
        let _ = std::fs::remove_file(&tsv_path);

        parse_tsv_output(&tsv_content)
    }
}

/// Parses Tesseract TSV output into the word stream.
///
/// Only word rows (level 5) are kept. Words with empty text stay in the
/// stream so they still separate their neighbours.
pub fn parse_tsv_output(tsv: &str) -> Result<Vec<OcrWord>> {
    let mut words = Vec::new();
    let mut lines = tsv.lines();

    match lines.next() {
        Some(header) if header.starts_with("level") => {}
        Some(_) => return Err(anyhow!("Unexpected Tesseract TSV header")),
        None => return Ok(words),
    }

    for line in lines {
        // TSV fields: level, page_num, block_num, par_num, line_num, word_num,
        //             left, top, width, height, conf, text
        let fields: Vec<&str> = line.split('\t').collect();
        if fields.len() < 11 {
            continue;
        }

        let level: i32 = fields[0].parse().unwrap_or(-1);
        if level != 5 {
            continue;
        }

        let num = |i: usize| -> u32 { fields[i].trim().parse().unwrap_or(0) };
        let coord = |i: usize| -> i32 { fields[i].trim().parse().unwrap_or(0) };

        words.push(OcrWord {
            text: fields.get(11).map(|t| t.trim()).unwrap_or("").to_string(),
            bbox: BoundingBox::new(coord(6), coord(7), coord(8), coord(9)),
            confidence: fields[10].trim().parse().unwrap_or(-1.0),
            line: (num(2), num(3), num(4)),
        });
    }

    Ok(words)
}

#[cfg(test)]
mod tests {
    use super::*;

    const HEADER: &str =
        "level\tpage_num\tblock_num\tpar_num\tline_num\tword_num\tleft\ttop\twidth\theight\tconf\ttext";

    #[test]
    fn test_parse_tsv_keeps_only_words() {
        let tsv = format!(
            "{}\n\
             1\t1\t0\t0\t0\t0\t0\t0\t540\t960\t-1\t\n\
             4\t1\t1\t1\t1\t0\t20\t30\t200\t20\t-1\t\n\
             5\t1\t1\t1\t1\t1\t20\t30\t90\t20\t96.5\tAlliance\n\
             5\t1\t1\t1\t1\t2\t120\t30\t60\t20\t91.0\tLogs\n",
            HEADER
        );

        let words = parse_tsv_output(&tsv).unwrap();

        assert_eq!(words.len(), 2);
        assert_eq!(words[0].text, "Alliance");
        assert_eq!(words[0].bbox, BoundingBox::new(20, 30, 90, 20));
        assert_eq!(words[0].confidence, 96.5);
        assert_eq!(words[1].line, (1, 1, 1));
    }

    #[test]
    fn test_parse_tsv_keeps_empty_word_rows() {
        let tsv = format!(
            "{}\n5\t1\t1\t1\t1\t1\t0\t0\t10\t10\t-1\t \n5\t1\t1\t1\t1\t2\t20\t0\t10\t10\t80\tX\n",
            HEADER
        );

        let words = parse_tsv_output(&tsv).unwrap();

        assert_eq!(words.len(), 2);
        assert_eq!(words[0].text, "");
        assert_eq!(words[1].text, "X");
    }

    #[test]
    fn test_parse_tsv_empty_output() {
        assert!(parse_tsv_output("").unwrap().is_empty());
    }

    #[test]
    fn test_parse_tsv_rejects_garbage() {
        assert!(parse_tsv_output("this is not tsv\n1\t2").is_err());
    }
}
