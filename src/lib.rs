// docqa: question answering over images and PDFs via OCR and an extractive QA model
pub mod config;
pub mod document;
pub mod error;
pub mod extract;
pub mod logging;
pub mod ocr;
pub mod pdf;
pub mod pipeline;
pub mod qa;

mod runtime;

pub use config::DocQaConfig;
pub use document::Document;
pub use error::{ConfigError, DocQaError, ExtractionError, InitError, QaError};
pub use pipeline::DocumentQa;
pub use qa::QaAnswer;
