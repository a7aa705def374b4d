//! Results of screen queries.

use std::fmt;

use crate::geometry::Point;

/// Fixed screen areas searched by the close-control heuristic.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DismissRegion {
    /// Last 30% of the width, top 30% of the height
    TopRight,
    /// Middle 60% of the width, bottom 15% of the height
    BottomCenter,
}

impl DismissRegion {
    /// Search order of the heuristic.
    pub const ALL: [DismissRegion; 2] = [DismissRegion::TopRight, DismissRegion::BottomCenter];

    /// Pixel rectangle (x, y, width, height) for a frame of the given size.
    pub fn pixel_rect(&self, width: u32, height: u32) -> (u32, u32, u32, u32) {
        match self {
            DismissRegion::TopRight => {
                let crop_w = (width as f32 * 0.30) as u32;
                let crop_h = (height as f32 * 0.30) as u32;
                (width - crop_w, 0, crop_w, crop_h)
            }
            DismissRegion::BottomCenter => {
                let crop_w = (width as f32 * 0.60) as u32;
                let crop_h = (height as f32 * 0.15) as u32;
                ((width - crop_w) / 2, height - crop_h, crop_w, crop_h)
            }
        }
    }

    /// Tap target for a hit: the center of the whole region.
    pub fn center(&self, width: u32, height: u32) -> Point {
        let (x, y, w, h) = self.pixel_rect(width, height);
        Point::new((x + w / 2) as i32, (y + h / 2) as i32)
    }

    /// Whether OCR text from this region shows a close control.
    pub fn text_matches(&self, text: &str) -> bool {
        match self {
            DismissRegion::TopRight => text.contains(['+', 'X', 'x']),
            DismissRegion::BottomCenter => {
                let lower = text.to_lowercase();
                lower.contains("close") || lower.contains('x')
            }
        }
    }
}

impl fmt::Display for DismissRegion {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DismissRegion::TopRight => write!(f, "top-right"),
            DismissRegion::BottomCenter => write!(f, "bottom-center"),
        }
    }
}

/// Which strategy produced a hit.
#[derive(Debug, Clone, PartialEq)]
pub enum DetectionMethod {
    /// Exact phrase in the OCR word layout
    Phrase { phrase: String },
    /// Normalized cross-correlation against a reference image
    Template,
    /// OCR on a fixed region; `level` is None for the raw crop
    RegionHeuristic {
        region: DismissRegion,
        level: Option<f32>,
    },
}

impl fmt::Display for DetectionMethod {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DetectionMethod::Phrase { phrase } => write!(f, "ocr:{}", phrase),
            DetectionMethod::Template => write!(f, "template"),
            DetectionMethod::RegionHeuristic { region, level } => match level {
                Some(level) => write!(f, "crop-{} level={}", region, level),
                None => write!(f, "crop-{} level=raw", region),
            },
        }
    }
}

/// Outcome of one vision query. Created fresh per query.
#[derive(Debug, Clone, PartialEq)]
pub enum Detection {
    NotFound,
    Found {
        location: Point,
        /// Phrase: mean OCR confidence (0-100); template: correlation (0-1); heuristic: 0
        confidence: f32,
        method: DetectionMethod,
    },
}

impl Detection {
    pub fn found(location: Point, confidence: f32, method: DetectionMethod) -> Self {
        Detection::Found {
            location,
            confidence,
            method,
        }
    }

    pub fn is_found(&self) -> bool {
        matches!(self, Detection::Found { .. })
    }

    pub fn location(&self) -> Option<Point> {
        match self {
            Detection::Found { location, .. } => Some(*location),
            Detection::NotFound => None,
        }
    }
}

impl fmt::Display for Detection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Detection::NotFound => write!(f, "not found"),
            Detection::Found {
                location,
                confidence,
                method,
            } => write!(f, "found via {} at {} (score {:.2})", method, location, confidence),
        }
    }
}
