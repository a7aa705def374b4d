//! Exact phrase lookup in an OCR word stream.

use super::engine::OcrWord;
use crate::geometry::{BoundingBox, Point};

/// Where a phrase was found.
#[derive(Debug, Clone, PartialEq)]
pub struct PhraseMatch {
    /// Union of the matched word boxes
    pub bbox: BoundingBox,
    /// Center of `bbox`
    pub center: Point,
    /// Mean word confidence (0-100)
    pub confidence: f32,
}

/// Splits a phrase into lower-cased whitespace tokens.
pub fn tokenize(phrase: &str) -> Vec<String> {
    phrase.split_whitespace().map(|w| w.to_lowercase()).collect()
}

/// Finds the first contiguous run of words equal to the phrase tokens.
///
/// Comparison is exact after trimming and lower-casing. The run must stay on
/// one text line. Returns None for an empty phrase.
pub fn find_phrase(words: &[OcrWord], phrase: &str) -> Option<PhraseMatch> {
    let tokens = tokenize(phrase);
    if tokens.is_empty() || tokens.len() > words.len() {
        return None;
    }

    words.windows(tokens.len()).find_map(|run| {
        let line = run[0].line;
        let matches = run
            .iter()
            .zip(&tokens)
            .all(|(word, token)| word.line == line && word.text.trim().to_lowercase() == *token);
        if !matches {
            return None;
        }

        let bbox = run[1..]
            .iter()
            .fold(run[0].bbox, |acc, word| acc.union(&word.bbox));
        let confidence = run.iter().map(|w| w.confidence).sum::<f32>() / run.len() as f32;

        Some(PhraseMatch {
            bbox,
            center: bbox.center(),
            confidence,
        })
    })
}
