// Page rasterizer: lopdf opens and counts pages, pdftoppm renders them
use image::DynamicImage;
use lopdf::Document;
use std::path::{Path, PathBuf};
use std::process::Command;
use tempfile::TempDir;
use tracing::debug;

use super::PageRasterizer;
use crate::config::DocQaConfig;
use crate::error::{ExtractionError, InitError};

pub struct PopplerRasterizer {
    pdftoppm: PathBuf,
    dpi: u32,
}

impl PopplerRasterizer {
    pub fn new(pdftoppm: impl Into<PathBuf>, dpi: u32) -> Self {
        Self {
            pdftoppm: pdftoppm.into(),
            dpi: dpi.max(1),
        }
    }

    /// Build from config and check that `pdftoppm` can be spawned.
    pub fn from_config(config: &DocQaConfig) -> Result<Self, InitError> {
        let rasterizer = Self::new(&config.pdf.pdftoppm, config.pdf.render_dpi);
        rasterizer.probe()?;
        Ok(rasterizer)
    }

    pub fn probe(&self) -> Result<(), InitError> {
        // `pdftoppm -v` exits non-zero on some poppler versions; spawning is enough.
        Command::new(&self.pdftoppm)
            .arg("-v")
            .output()
            .map(|_| ())
            .map_err(|e| InitError::Backend {
                binary: self.pdftoppm.clone(),
                reason: e.to_string(),
            })
    }
}

impl PageRasterizer for PopplerRasterizer {
    fn page_count(&self, path: &Path) -> Result<usize, ExtractionError> {
        let document = Document::load(path).map_err(|e| ExtractionError::PdfOpen {
            path: path.to_path_buf(),
            reason: e.to_string(),
        })?;
        Ok(document.get_pages().len())
    }

    fn render_page(&self, path: &Path, index: usize) -> Result<DynamicImage, ExtractionError> {
        let render_error = |reason: String| ExtractionError::Render { page: index, reason };

        let temp_dir = TempDir::new()?;
        let prefix = temp_dir.path().join("page");
        // pdftoppm numbers pages from 1
        let page = (index + 1).to_string();

        let output = Command::new(&self.pdftoppm)
            .arg("-png")
            .args(["-r", &self.dpi.to_string()])
            .args(["-f", &page, "-l", &page])
            .arg("-singlefile")
            .arg(path)
            .arg(&prefix)
            .output()
            .map_err(|e| render_error(format!("failed to run {}: {e}", self.pdftoppm.display())))?;

        if !output.status.success() {
            return Err(render_error(String::from_utf8_lossy(&output.stderr).trim().to_string()));
        }

        let rendered = prefix.with_extension("png");
        let image = image::open(&rendered).map_err(|e| render_error(e.to_string()))?;
        debug!(page = index, width = image.width(), height = image.height(), "page rendered");
        Ok(image)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use lopdf::dictionary;
    use lopdf::{Object, Stream};

    /// Minimal document with `pages` empty pages.
    fn write_pdf(path: &Path, pages: usize) {
        let mut doc = Document::with_version("1.5");
        let pages_id = doc.new_object_id();
        let kids: Vec<Object> = (0..pages)
            .map(|_| {
                let content_id = doc.add_object(Stream::new(dictionary! {}, Vec::new()));
                doc.add_object(dictionary! {
                    "Type" => "Page",
                    "Parent" => pages_id,
                    "MediaBox" => vec![0.into(), 0.into(), 612.into(), 792.into()],
                    "Contents" => content_id,
                })
                .into()
            })
            .collect();
        doc.objects.insert(
            pages_id,
            Object::Dictionary(dictionary! {
                "Type" => "Pages",
                "Kids" => kids,
                "Count" => pages as i64,
            }),
        );
        let catalog_id = doc.add_object(dictionary! {
            "Type" => "Catalog",
            "Pages" => pages_id,
        });
        doc.trailer.set("Root", catalog_id);
        doc.save(path).unwrap();
    }

    #[test]
    fn counts_pages() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("three.pdf");
        write_pdf(&path, 3);

        let rasterizer = PopplerRasterizer::new("pdftoppm", 72);
        assert_eq!(rasterizer.page_count(&path).unwrap(), 3);
    }

    #[test]
    fn missing_file_fails_to_open() {
        let rasterizer = PopplerRasterizer::new("pdftoppm", 72);
        let err = rasterizer.page_count(Path::new("/no/such/file.pdf")).unwrap_err();
        assert!(matches!(err, ExtractionError::PdfOpen { .. }));
    }

    #[test]
    fn garbage_fails_to_open() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("garbage.pdf");
        std::fs::write(&path, b"not a pdf at all").unwrap();

        let rasterizer = PopplerRasterizer::new("pdftoppm", 72);
        assert!(matches!(
            rasterizer.page_count(&path),
            Err(ExtractionError::PdfOpen { .. })
        ));
    }

    #[test]
    fn missing_binary_fails_render() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("one.pdf");
        write_pdf(&path, 1);

        let rasterizer = PopplerRasterizer::new("/definitely/not/pdftoppm", 72);
        assert!(matches!(
            rasterizer.render_page(&path, 0),
            Err(ExtractionError::Render { page: 0, .. })
        ));
        assert!(rasterizer.probe().is_err());
    }
}
