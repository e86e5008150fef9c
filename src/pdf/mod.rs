// PDF page access: counting pages and rasterizing them for OCR
use image::DynamicImage;
use std::path::Path;

use crate::error::ExtractionError;

pub mod poppler;

pub use poppler::PopplerRasterizer;

/// Turns PDF pages into images.
///
/// `page_count` doubles as the open/validate step: a missing or unparsable
/// file fails there with `ExtractionError::PdfOpen`.
pub trait PageRasterizer: Send {
    fn page_count(&self, path: &Path) -> Result<usize, ExtractionError>;

    /// Render page `index` (0-based) at the rasterizer's resolution.
    fn render_page(&self, path: &Path, index: usize) -> Result<DynamicImage, ExtractionError>;
}
