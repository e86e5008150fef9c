// Extractive question answering
use serde::Serialize;

use crate::error::QaError;

pub mod onnx;
pub mod span;

pub use onnx::OnnxQuestionAnswerer;

/// Answer selected from the context.
///
/// `start..end` are byte offsets of `text` inside the context it came from.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct QaAnswer {
    pub text: String,
    pub score: f32,
    pub start: usize,
    pub end: usize,
}

impl QaAnswer {
    /// No answer: empty text, zero score.
    pub fn empty() -> Self {
        Self {
            text: String::new(),
            score: 0.0,
            start: 0,
            end: 0,
        }
    }

    pub fn is_empty(&self) -> bool {
        self.text.is_empty()
    }
}

/// `(context, question) -> answer`, no state kept between calls.
pub trait QuestionAnswerer: Send {
    fn answer(&mut self, context: &str, question: &str) -> Result<QaAnswer, QaError>;
}
