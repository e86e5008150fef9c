// OCR engines: image in, text fragments out
use image::DynamicImage;

use crate::error::ExtractionError;

pub mod ppocr;
pub mod tesseract;

pub use ppocr::PpOcrEngine;
pub use tesseract::TesseractEngine;

/// One piece of recognized text.
#[derive(Debug, Clone, PartialEq)]
pub struct TextFragment {
    pub text: String,
    pub confidence: f32,
    pub bbox: Option<BBox>,
}

/// Axis-aligned box in source image pixels.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct BBox {
    pub x0: f32,
    pub y0: f32,
    pub x1: f32,
    pub y1: f32,
}

impl BBox {
    pub fn width(&self) -> f32 {
        self.x1 - self.x0
    }

    pub fn height(&self) -> f32 {
        self.y1 - self.y0
    }
}

impl TextFragment {
    pub fn new(text: impl Into<String>, confidence: f32) -> Self {
        Self {
            text: text.into(),
            confidence,
            bbox: None,
        }
    }
}

/// An OCR backend.
///
/// Fragments come back in the engine's own reading order. Engines hold loaded
/// models or probed binaries, so they are built once and reused; `&mut self`
/// keeps use single-call-at-a-time.
pub trait OcrEngine: Send {
    /// Engine identifier used in logs and errors.
    fn name(&self) -> &'static str;

    fn recognize(&mut self, image: &DynamicImage) -> Result<Vec<TextFragment>, ExtractionError>;
}
