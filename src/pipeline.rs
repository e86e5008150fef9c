// Document QA orchestration: route the document to an extractor, then ask the QA model
use std::path::Path;
use tracing::{debug, info, instrument};

use crate::config::DocQaConfig;
use crate::document::Document;
use crate::error::{DocQaError, InitError};
use crate::extract::{ImageTextExtractor, PdfTextExtractor};
use crate::ocr::{OcrEngine, PpOcrEngine, TesseractEngine};
use crate::pdf::{PageRasterizer, PopplerRasterizer};
use crate::qa::{OnnxQuestionAnswerer, QuestionAnswerer};

/// Answers questions about images and PDFs.
///
/// Holds every loaded engine. Invocations share no state, so the same
/// document and question always go through the same steps.
pub struct DocumentQa {
    image: ImageTextExtractor,
    pdf: PdfTextExtractor,
    qa: Box<dyn QuestionAnswerer>,
}

impl DocumentQa {
    /// Assemble from already-built engines.
    pub fn new(
        image_ocr: Box<dyn OcrEngine>,
        page_rasterizer: Box<dyn PageRasterizer>,
        page_ocr: Box<dyn OcrEngine>,
        qa: Box<dyn QuestionAnswerer>,
    ) -> Self {
        Self {
            image: ImageTextExtractor::new(image_ocr),
            pdf: PdfTextExtractor::new(page_rasterizer, page_ocr),
            qa,
        }
    }

    /// Load models and probe backend binaries. Nothing is loaded lazily, so a
    /// missing asset fails here rather than on the first question.
    pub fn from_config(config: &DocQaConfig) -> Result<Self, InitError> {
        info!(model_dir = %config.model_dir.display(), "initializing document QA");
        let image_ocr = PpOcrEngine::from_config(config)?;
        let rasterizer = PopplerRasterizer::from_config(config)?;
        let page_ocr = TesseractEngine::from_config(config)?;
        let qa = OnnxQuestionAnswerer::from_config(config)?;

        Ok(Self::new(
            Box::new(image_ocr),
            Box::new(rasterizer),
            Box::new(page_ocr),
            Box::new(qa),
        ))
    }

    /// Extract the document's text and return the QA model's answer to `question`.
    #[instrument(skip_all, fields(kind = document.kind()))]
    pub fn answer(&mut self, document: &Document, question: &str) -> Result<String, DocQaError> {
        let text = self.extract_text(document)?;
        let answer = self.qa.answer(&text, question)?;
        info!(score = answer.score, chars = answer.text.len(), "question answered");
        Ok(answer.text)
    }

    /// Like `answer`, for a path. Only `.pdf` paths are accepted; anything
    /// else fails before an engine is touched.
    pub fn answer_path(&mut self, path: impl AsRef<Path>, question: &str) -> Result<String, DocQaError> {
        let document = Document::try_from(path.as_ref())?;
        self.answer(&document, question)
    }

    /// The extraction half of `answer`.
    pub fn extract_text(&mut self, document: &Document) -> Result<String, DocQaError> {
        let text = match document {
            Document::Image(image) => self.image.extract(image)?,
            Document::Pdf(path) => self.pdf.extract(path)?,
        };
        debug!(chars = text.len(), "text extracted");
        Ok(text)
    }
}
