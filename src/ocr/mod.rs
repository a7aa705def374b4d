pub mod engine;
pub mod phrase;
pub mod preprocess;
pub mod setup;

pub use engine::{OcrEngine, Tesseract};
pub use phrase::{PhraseMatch, find_phrase};
pub use setup::ensure_tesseract;

use anyhow::Result;
use image::{DynamicImage, RgbaImage};

/// High-level function: screenshot → plain text of the whole frame.
pub fn ocr_text(engine: &dyn OcrEngine, img: &RgbaImage) -> Result<String> {
    engine.extract_text(&DynamicImage::ImageRgba8(img.clone()))
}

/// High-level function: screenshot → location of `phrase`, if present.
pub fn find_phrase_in_image(
    engine: &dyn OcrEngine,
    img: &RgbaImage,
    phrase: &str,
) -> Result<Option<PhraseMatch>> {
    let words = engine.extract_word_layout(&DynamicImage::ImageRgba8(img.clone()))?;
    Ok(find_phrase(&words, phrase))
}
