// Recording fakes for the OCR engines, rasterizer and QA model
#![allow(dead_code)]

use docqa::error::{ExtractionError, QaError};
use docqa::ocr::{OcrEngine, TextFragment};
use docqa::pdf::PageRasterizer;
use docqa::qa::{QaAnswer, QuestionAnswerer};
use docqa::DocumentQa;
use image::DynamicImage;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};

#[derive(Debug, Clone, PartialEq)]
pub enum Call {
    ImageOcr,
    Open(PathBuf),
    Render(usize),
    PageOcr(usize),
    Qa { context: String, question: String },
}

#[derive(Clone, Default)]
pub struct CallLog(Arc<Mutex<Vec<Call>>>);

impl CallLog {
    pub fn push(&self, call: Call) {
        self.0.lock().unwrap().push(call);
    }

    pub fn calls(&self) -> Vec<Call> {
        self.0.lock().unwrap().clone()
    }

    pub fn clear(&self) {
        self.0.lock().unwrap().clear();
    }

    pub fn qa_contexts(&self) -> Vec<String> {
        self.calls()
            .into_iter()
            .filter_map(|c| match c {
                Call::Qa { context, .. } => Some(context),
                _ => None,
            })
            .collect()
    }
}

/// Image OCR returning a fixed list of fragments.
pub struct FakeImageOcr {
    pub log: CallLog,
    pub fragments: Vec<&'static str>,
}

impl OcrEngine for FakeImageOcr {
    fn name(&self) -> &'static str {
        "fake-image"
    }

    fn recognize(&mut self, _image: &DynamicImage) -> Result<Vec<TextFragment>, ExtractionError> {
        self.log.push(Call::ImageOcr);
        Ok(self.fragments.iter().map(|t| TextFragment::new(*t, 0.99)).collect())
    }
}

/// Renders page `i` as an image `i + 1` pixels wide so the page OCR fake can
/// tell pages apart.
pub struct FakeRasterizer {
    pub log: CallLog,
    pub pages: usize,
    pub fail_render_at: Option<usize>,
}

impl PageRasterizer for FakeRasterizer {
    fn page_count(&self, path: &Path) -> Result<usize, ExtractionError> {
        self.log.push(Call::Open(path.to_path_buf()));
        Ok(self.pages)
    }

    fn render_page(&self, _path: &Path, index: usize) -> Result<DynamicImage, ExtractionError> {
        self.log.push(Call::Render(index));
        if self.fail_render_at == Some(index) {
            return Err(ExtractionError::Render {
                page: index,
                reason: "corrupt page".to_string(),
            });
        }
        Ok(DynamicImage::new_rgb8(index as u32 + 1, 1))
    }
}

/// Page OCR answering `page texts[i]` for the page `i + 1` pixels wide.
pub struct FakePageOcr {
    pub log: CallLog,
    pub page_texts: Vec<&'static str>,
}

impl OcrEngine for FakePageOcr {
    fn name(&self) -> &'static str {
        "fake-page"
    }

    fn recognize(&mut self, image: &DynamicImage) -> Result<Vec<TextFragment>, ExtractionError> {
        let page = image.width() as usize - 1;
        self.log.push(Call::PageOcr(page));
        let text = self.page_texts.get(page).copied().unwrap_or_default();
        Ok(vec![TextFragment::new(text, 0.9)])
    }
}

/// QA model that answers with the first word of the context.
pub struct FakeQa {
    pub log: CallLog,
}

impl QuestionAnswerer for FakeQa {
    fn answer(&mut self, context: &str, question: &str) -> Result<QaAnswer, QaError> {
        self.log.push(Call::Qa {
            context: context.to_string(),
            question: question.to_string(),
        });
        let Some(word) = context.split_whitespace().next() else {
            return Ok(QaAnswer::empty());
        };
        let start = context.find(word).unwrap_or(0);
        Ok(QaAnswer {
            text: word.to_string(),
            score: 0.5,
            start,
            end: start + word.len(),
        })
    }
}

pub struct Fixture {
    pub qa: DocumentQa,
    pub log: CallLog,
}

pub fn fixture(image_fragments: Vec<&'static str>, page_texts: Vec<&'static str>) -> Fixture {
    fixture_failing_at(image_fragments, page_texts, None)
}

pub fn fixture_failing_at(
    image_fragments: Vec<&'static str>,
    page_texts: Vec<&'static str>,
    fail_render_at: Option<usize>,
) -> Fixture {
    let log = CallLog::default();
    let qa = DocumentQa::new(
        Box::new(FakeImageOcr {
            log: log.clone(),
            fragments: image_fragments,
        }),
        Box::new(FakeRasterizer {
            log: log.clone(),
            pages: page_texts.len(),
            fail_render_at,
        }),
        Box::new(FakePageOcr {
            log: log.clone(),
            page_texts,
        }),
        Box::new(FakeQa { log: log.clone() }),
    );
    Fixture { qa, log }
}
