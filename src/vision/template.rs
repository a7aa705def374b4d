//! Template matching by zero-mean normalized cross-correlation.
//!
//! Scores follow the usual TM_CCOEFF_NORMED definition, clamped to 0.0-1.0.
//! The search runs on a coarse grid first (positions and pixels sampled every
//! `step`), then exactly around the best coarse hit.

use image::{GrayImage, RgbaImage, imageops};

use crate::geometry::Point;

/// Best placement of a template inside an image.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct TemplateMatch {
    /// Correlation score (0.0-1.0)
    pub score: f32,
    /// Top-left corner of the matched region
    pub x: u32,
    pub y: u32,
    pub width: u32,
    pub height: u32,
}

impl TemplateMatch {
    pub fn center(&self) -> Point {
        Point::new(
            (self.x + self.width / 2) as i32,
            (self.y + self.height / 2) as i32,
        )
    }
}

/// Finds the best placement of `template` in `image`.
///
/// Returns None when the template is empty or larger than the image.
pub fn correlate(image: &RgbaImage, template: &RgbaImage, step: u32) -> Option<TemplateMatch> {
    let image = imageops::grayscale(image);
    let template = imageops::grayscale(template);
    let (iw, ih) = image.dimensions();
    let (tw, th) = template.dimensions();
    if tw == 0 || th == 0 || tw > iw || th > ih {
        return None;
    }

    let step = step.max(1);
    let max_x = iw - tw;
    let max_y = ih - th;

    let coarse = Correlator::new(&image, &template, step);
    let mut best = (0u32, 0u32, f32::MIN);
    for y in (0..=max_y).step_by(step as usize) {
        for x in (0..=max_x).step_by(step as usize) {
            let score = coarse.score_at(x, y);
            if score > best.2 {
                best = (x, y, score);
            }
        }
    }

    let exact = Correlator::new(&image, &template, 1);
    let (bx, by, _) = best;
    let mut refined = (bx, by, exact.score_at(bx, by));
    for y in by.saturating_sub(step)..=(by + step).min(max_y) {
        for x in bx.saturating_sub(step)..=(bx + step).min(max_x) {
            let score = exact.score_at(x, y);
            if score > refined.2 {
                refined = (x, y, score);
            }
        }
    }

    Some(TemplateMatch {
        score: refined.2.clamp(0.0, 1.0),
        x: refined.0,
        y: refined.1,
        width: tw,
        height: th,
    })
}

/// Precomputed zero-mean template samples for one sampling stride.
struct Correlator<'a> {
    image: &'a GrayImage,
    /// (dx, dy, template value minus template mean)
    samples: Vec<(u32, u32, f64)>,
    template_energy: f64,
}

impl<'a> Correlator<'a> {
    fn new(image: &'a GrayImage, template: &GrayImage, stride: u32) -> Self {
        let (tw, th) = template.dimensions();
        let mut raw = Vec::new();
        for dy in (0..th).step_by(stride as usize) {
            for dx in (0..tw).step_by(stride as usize) {
                raw.push((dx, dy, template.get_pixel(dx, dy)[0] as f64));
            }
        }
        let mean = raw.iter().map(|s| s.2).sum::<f64>() / raw.len() as f64;
        let samples: Vec<(u32, u32, f64)> =
            raw.into_iter().map(|(dx, dy, v)| (dx, dy, v - mean)).collect();
        let template_energy = samples.iter().map(|s| s.2 * s.2).sum();

        Self {
            image,
            samples,
            template_energy,
        }
    }

    fn score_at(&self, x: u32, y: u32) -> f32 {
        let n = self.samples.len() as f64;
        let mut sum = 0.0;
        let mut sum_sq = 0.0;
        let mut cross = 0.0;
        for &(dx, dy, t) in &self.samples {
            let v = self.image.get_pixel(x + dx, y + dy)[0] as f64;
            sum += v;
            sum_sq += v * v;
            cross += v * t;
        }
        let image_energy = sum_sq - sum * sum / n;
        let denom = (image_energy * self.template_energy).sqrt();
        if denom <= f64::EPSILON {
            return 0.0;
        }
        (cross / denom) as f32
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::Rgba;

    /// Dark frame with a bright round blob centered at (cx, cy).
    fn blob_image(width: u32, height: u32, cx: f32, cy: f32) -> RgbaImage {
        RgbaImage::from_fn(width, height, |x, y| {
            let d2 = (x as f32 - cx).powi(2) + (y as f32 - cy).powi(2);
            let v = (255.0 * (-d2 / (2.0 * 8.0 * 8.0)).exp()) as u8;
            Rgba([v, v, v, 255])
        })
    }

    #[test]
    fn test_exact_crop_is_found() {
        let img = RgbaImage::from_fn(80, 60, |x, y| {
            let v = ((x * 7 + y * 13 + x * y) % 251) as u8;
            Rgba([v, v / 2, 255 - v, 255])
        });
        let template = imageops::crop_imm(&img, 37, 21, 16, 12).to_image();

        let m = correlate(&img, &template, 1).unwrap();

        assert_eq!((m.x, m.y), (37, 21));
        assert!(m.score > 0.999, "score was {}", m.score);
        assert_eq!(m.center(), Point::new(45, 27));
    }

    #[test]
    fn test_coarse_search_refines_to_odd_offset() {
        let img = blob_image(120, 90, 72.0, 44.0);
        // 31x31 crop centered on the blob, top-left at (57, 29)
        let template = imageops::crop_imm(&img, 57, 29, 31, 31).to_image();

        let m = correlate(&img, &template, 2).unwrap();

        assert_eq!((m.x, m.y), (57, 29));
        assert!(m.score > 0.99);
    }

    #[test]
    fn test_flat_image_scores_zero() {
        let img = RgbaImage::from_pixel(50, 50, Rgba([90, 90, 90, 255]));
        let template = blob_image(10, 10, 5.0, 5.0);

        let m = correlate(&img, &template, 2).unwrap();

        assert_eq!(m.score, 0.0);
    }

    #[test]
    fn test_template_larger_than_image() {
        let img = RgbaImage::new(10, 10);
        let template = RgbaImage::new(11, 5);
        assert!(correlate(&img, &template, 1).is_none());
    }
}
