// Text extraction from images and PDFs
use image::DynamicImage;
use std::path::Path;
use tracing::{debug, info};

use crate::error::ExtractionError;
use crate::ocr::{OcrEngine, TextFragment};
use crate::pdf::PageRasterizer;

/// OCR for an in-memory image. Fragments are joined with single spaces in
/// the order the engine returns them.
pub struct ImageTextExtractor {
    engine: Box<dyn OcrEngine>,
}

impl ImageTextExtractor {
    pub fn new(engine: Box<dyn OcrEngine>) -> Self {
        Self { engine }
    }

    pub fn extract(&mut self, image: &DynamicImage) -> Result<String, ExtractionError> {
        let fragments = self.engine.recognize(image)?;
        debug!(engine = self.engine.name(), fragments = fragments.len(), "image recognized");
        Ok(join_fragments(&fragments, " "))
    }
}

/// Rasterize every page of a PDF and OCR it.
///
/// Pages run strictly in ascending order and their text is appended with no
/// separator. The first failing page aborts the whole document.
pub struct PdfTextExtractor {
    rasterizer: Box<dyn PageRasterizer>,
    engine: Box<dyn OcrEngine>,
}

impl PdfTextExtractor {
    pub fn new(rasterizer: Box<dyn PageRasterizer>, engine: Box<dyn OcrEngine>) -> Self {
        Self { rasterizer, engine }
    }

    pub fn extract(&mut self, path: &Path) -> Result<String, ExtractionError> {
        let pages = self.rasterizer.page_count(path)?;
        info!(pdf = %path.display(), pages, "extracting text from PDF");

        let mut text = String::new();
        for index in 0..pages {
            let page = self.rasterizer.render_page(path, index)?;
            let fragments = self.engine.recognize(&page)?;
            let page_text = join_fragments(&fragments, "\n");
            debug!(page = index, chars = page_text.len(), "page recognized");
            text.push_str(&page_text);
        }
        Ok(text)
    }
}

fn join_fragments(fragments: &[TextFragment], separator: &str) -> String {
    fragments
        .iter()
        .map(|f| f.text.as_str())
        .collect::<Vec<_>>()
        .join(separator)
}
