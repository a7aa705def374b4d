//! Screen classification: is the target UI visible, is a close control visible.
//!
//! Both queries prefer an exact OCR phrase hit because it gives a precise tap
//! position. The target falls back to template matching, close controls fall
//! back to OCR over two fixed screen regions, which only localizes to the
//! region center.

use image::{DynamicImage, RgbaImage};
use std::iter;

use tracing::{debug, warn};

use super::detection::{Detection, DetectionMethod, DismissRegion};
use super::template::correlate;
use crate::automation::config::VisionConfig;
use crate::ocr::preprocess::{binarize, crop_pixels, upscale};
use crate::ocr::{OcrEngine, find_phrase, find_phrase_in_image};

/// The two questions the dismissal loop asks about a frame.
pub trait ScreenOracle {
    fn detect_target(&self, img: &RgbaImage) -> Detection;
    fn detect_dismiss_control(&self, img: &RgbaImage) -> Detection;
}

/// Looks for the target phrase, then for the reference template.
///
/// OCR errors count as "phrase not found".
pub fn detect_target(
    img: &RgbaImage,
    engine: &dyn OcrEngine,
    config: &VisionConfig,
    template: Option<&RgbaImage>,
) -> Detection {
    match find_phrase_in_image(engine, img, &config.target_phrase) {
        Ok(Some(m)) => {
            return Detection::found(
                m.center,
                m.confidence,
                DetectionMethod::Phrase {
                    phrase: config.target_phrase.clone(),
                },
            );
        }
        Ok(None) => {}
        Err(e) => warn!("Target OCR failed: {:#}", e),
    }

    if !config.use_template {
        return Detection::NotFound;
    }
    let Some(template) = template else {
        return Detection::NotFound;
    };

    match correlate(img, template, config.template_sample_step) {
        Some(m) if m.score >= config.match_threshold => {
            Detection::found(m.center(), m.score, DetectionMethod::Template)
        }
        Some(m) => {
            debug!(
                "Best template score {:.3} below threshold {:.3}",
                m.score, config.match_threshold
            );
            Detection::NotFound
        }
        None => {
            debug!("Template does not fit in the frame");
            Detection::NotFound
        }
    }
}

/// Looks for a close-control label, then runs the region heuristic.
///
/// Labels are tried in configured order and the first hit wins. The heuristic
/// exhausts every binarization level of the top-right region before moving to
/// the bottom-center region.
pub fn detect_dismiss_control(
    img: &RgbaImage,
    engine: &dyn OcrEngine,
    config: &VisionConfig,
) -> Detection {
    match engine.extract_word_layout(&DynamicImage::ImageRgba8(img.clone())) {
        Ok(words) => {
            for phrase in &config.dismiss_phrases {
                if let Some(m) = find_phrase(&words, phrase) {
                    return Detection::found(
                        m.center,
                        m.confidence,
                        DetectionMethod::Phrase {
                            phrase: phrase.clone(),
                        },
                    );
                }
            }
        }
        Err(e) => warn!("Close-control OCR failed: {:#}", e),
    }

    let (width, height) = img.dimensions();
    for region in DismissRegion::ALL {
        let (x, y, w, h) = region.pixel_rect(width, height);
        if w == 0 || h == 0 {
            continue;
        }
        let scaled = upscale(&crop_pixels(img, x, y, w, h), config.region_upscale);

        let levels = iter::once(None).chain(config.threshold_levels.iter().copied().map(Some));
        for level in levels {
            let candidate = match level {
                None => DynamicImage::ImageRgba8(scaled.clone()),
                Some(level) => DynamicImage::ImageLuma8(binarize(&scaled, level)),
            };
            match engine.extract_text(&candidate) {
                Ok(text) if region.text_matches(&text) => {
                    return Detection::found(
                        region.center(width, height),
                        0.0,
                        DetectionMethod::RegionHeuristic { region, level },
                    );
                }
                Ok(_) => {}
                Err(e) => debug!("Region OCR failed ({}, {:?}): {:#}", region, level, e),
            }
        }
    }

    Detection::NotFound
}

/// `ScreenOracle` backed by an OCR engine and an optional target template.
pub struct VisionOracle<E: OcrEngine> {
    engine: E,
    config: VisionConfig,
    template: Option<RgbaImage>,
}

impl<E: OcrEngine> VisionOracle<E> {
    /// Builds the oracle, loading the template if one is configured.
    ///
    /// A missing or unreadable template only disables the template fallback.
    pub fn new(engine: E, config: VisionConfig) -> Self {
        let template = if config.use_template {
            config.template_path.as_deref().and_then(|path| {
                if !path.exists() {
                    warn!("Template not found at {}", path.display());
                    return None;
                }
                match image::open(path) {
                    Ok(img) => Some(img.to_rgba8()),
                    Err(e) => {
                        warn!("Failed to load template {}: {}", path.display(), e);
                        None
                    }
                }
            })
        } else {
            None
        };

        Self {
            engine,
            config,
            template,
        }
    }

    pub fn engine(&self) -> &E {
        &self.engine
    }

    pub fn has_template(&self) -> bool {
        self.template.is_some()
    }
}

impl<E: OcrEngine> ScreenOracle for VisionOracle<E> {
    fn detect_target(&self, img: &RgbaImage) -> Detection {
        detect_target(img, &self.engine, &self.config, self.template.as_ref())
    }

    fn detect_dismiss_control(&self, img: &RgbaImage) -> Detection {
        detect_dismiss_control(img, &self.engine, &self.config)
    }
}
