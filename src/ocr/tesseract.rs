// Tesseract OCR through its command line interface
use image::{DynamicImage, ImageFormat};
use std::path::PathBuf;
use std::process::Command;
use tempfile::TempDir;
use tracing::{debug, instrument};

use super::{OcrEngine, TextFragment};
use crate::config::{DocQaConfig, OCR_LANGUAGE};
use crate::error::{ExtractionError, InitError};

const ENGINE_NAME: &str = "tesseract";

/// Runs `tesseract <image> stdout -l eng --psm <mode>` once per image.
///
/// Plain-text mode reports no confidence, so the single fragment it yields
/// carries 1.0.
pub struct TesseractEngine {
    binary: PathBuf,
    page_segmentation_mode: u8,
}

impl TesseractEngine {
    pub fn new(binary: impl Into<PathBuf>, page_segmentation_mode: u8) -> Self {
        Self {
            binary: binary.into(),
            page_segmentation_mode,
        }
    }

    /// Build from config and check that the binary runs and has English data.
    pub fn from_config(config: &DocQaConfig) -> Result<Self, InitError> {
        let engine = Self::new(&config.pdf.tesseract, config.pdf.page_segmentation_mode);
        engine.probe()?;
        Ok(engine)
    }

    pub fn probe(&self) -> Result<(), InitError> {
        let backend_error = |reason: String| InitError::Backend {
            binary: self.binary.clone(),
            reason,
        };

        let output = Command::new(&self.binary)
            .arg("--list-langs")
            .output()
            .map_err(|e| backend_error(e.to_string()))?;
        if !output.status.success() {
            return Err(backend_error(String::from_utf8_lossy(&output.stderr).trim().to_string()));
        }

        let listing = String::from_utf8_lossy(&output.stdout);
        if !lists_language(&listing, OCR_LANGUAGE) {
            return Err(backend_error(format!("language data `{OCR_LANGUAGE}` is not installed")));
        }
        debug!(binary = %self.binary.display(), "tesseract available");
        Ok(())
    }
}

impl OcrEngine for TesseractEngine {
    fn name(&self) -> &'static str {
        ENGINE_NAME
    }

    #[instrument(name = "tesseract", skip_all, fields(width = image.width(), height = image.height()))]
    fn recognize(&mut self, image: &DynamicImage) -> Result<Vec<TextFragment>, ExtractionError> {
        let temp_dir = TempDir::new()?;
        let input = temp_dir.path().join("page.png");
        image.save_with_format(&input, ImageFormat::Png)?;

        let output = Command::new(&self.binary)
            .arg(&input)
            .arg("stdout")
            .args(["-l", OCR_LANGUAGE])
            .args(["--psm", &self.page_segmentation_mode.to_string()])
            .output()
            .map_err(|e| ExtractionError::Ocr {
                engine: ENGINE_NAME,
                reason: format!("failed to run {}: {e}", self.binary.display()),
            })?;

        if !output.status.success() {
            return Err(ExtractionError::Ocr {
                engine: ENGINE_NAME,
                reason: String::from_utf8_lossy(&output.stderr).trim().to_string(),
            });
        }

        let text = page_text(&String::from_utf8_lossy(&output.stdout));
        debug!(chars = text.len(), "tesseract finished");
        if text.trim().is_empty() {
            return Ok(Vec::new());
        }
        Ok(vec![TextFragment::new(text, 1.0)])
    }
}

/// Drop the form feed tesseract appends after each page.
fn page_text(raw: &str) -> String {
    raw.trim_end_matches('\x0c').to_string()
}

fn lists_language(listing: &str, language: &str) -> bool {
    listing.lines().any(|line| line.trim() == language)
}
