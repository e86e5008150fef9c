// Document inputs accepted by the QA pipeline
use image::DynamicImage;
use std::path::{Path, PathBuf};

use crate::error::{DocQaError, ExtractionError};

/// Raster formats `Document::open` will decode from disk.
const IMAGE_EXTENSIONS: &[&str] = &["png", "jpg", "jpeg", "bmp", "tif", "tiff", "webp", "gif"];

/// A single document to ask a question about.
///
/// Either an in-memory raster image or the path of a PDF on disk. Nothing else
/// can be represented, so routing in `DocumentQa` is an exhaustive match.
#[derive(Debug, Clone)]
pub enum Document {
    Image(DynamicImage),
    Pdf(PathBuf),
}

impl Document {
    /// Accept `path` as a PDF document if it ends in `.pdf` (any case).
    pub fn pdf(path: impl Into<PathBuf>) -> Result<Self, DocQaError> {
        let path = path.into();
        if has_suffix(&path, &["pdf"]) {
            Ok(Document::Pdf(path))
        } else {
            Err(DocQaError::UnsupportedInputType(path.display().to_string()))
        }
    }

    /// Decode an encoded image (PNG, JPEG, ...) held in memory.
    pub fn from_image_bytes(bytes: &[u8]) -> Result<Self, DocQaError> {
        image::load_from_memory(bytes)
            .map(Document::Image)
            .map_err(|e| DocQaError::UnsupportedInputType(format!("undecodable image bytes ({e})")))
    }

    /// Open a file from disk: PDFs stay on disk, raster images are decoded into memory.
    ///
    /// Paths with any other suffix are rejected without touching the filesystem.
    /// An image file that cannot be read or decoded is an extraction failure.
    pub fn open(path: impl AsRef<Path>) -> Result<Self, DocQaError> {
        let path = path.as_ref();
        if has_suffix(path, &["pdf"]) {
            return Ok(Document::Pdf(path.to_path_buf()));
        }
        if !has_suffix(path, IMAGE_EXTENSIONS) {
            return Err(DocQaError::UnsupportedInputType(path.display().to_string()));
        }
        let image = image::open(path).map_err(ExtractionError::Image)?;
        Ok(Document::Image(image))
    }

    /// Short label for logs.
    pub fn kind(&self) -> &'static str {
        match self {
            Document::Image(_) => "image",
            Document::Pdf(_) => "pdf",
        }
    }
}

/// Suffix test on the raw path string: `scans/.pdf` matches, `report.pdf/` does not.
fn has_suffix(path: &Path, allowed: &[&str]) -> bool {
    let name = path.as_os_str().to_string_lossy().to_ascii_lowercase();
    allowed.iter().any(|ext| {
        name.strip_suffix(ext)
            .is_some_and(|stem| stem.ends_with('.'))
    })
}

impl From<DynamicImage> for Document {
    fn from(image: DynamicImage) -> Self {
        Document::Image(image)
    }
}

impl TryFrom<&Path> for Document {
    type Error = DocQaError;

    fn try_from(path: &Path) -> Result<Self, Self::Error> {
        Document::pdf(path)
    }
}

impl TryFrom<PathBuf> for Document {
    type Error = DocQaError;

    fn try_from(path: PathBuf) -> Result<Self, Self::Error> {
        Document::pdf(path)
    }
}

impl TryFrom<&str> for Document {
    type Error = DocQaError;

    fn try_from(path: &str) -> Result<Self, Self::Error> {
        Document::pdf(path)
    }
}
