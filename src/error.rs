// Error types for document question answering
use std::path::PathBuf;
use thiserror::Error;

/// Failure of a single `DocumentQa` invocation.
#[derive(Debug, Error)]
pub enum DocQaError {
    /// The input is neither an in-memory image nor a `.pdf` path.
    /// Raised before any extraction work starts.
    #[error("unsupported input type: {0} (provide an image or a PDF file)")]
    UnsupportedInputType(String),

    #[error(transparent)]
    Extraction(#[from] ExtractionError),

    #[error(transparent)]
    Qa(#[from] QaError),
}

/// OCR, rasterization or PDF parsing failed.
#[derive(Debug, Error)]
pub enum ExtractionError {
    #[error("failed to open PDF {}: {reason}", path.display())]
    PdfOpen { path: PathBuf, reason: String },

    #[error("failed to render page {page}: {reason}")]
    Render { page: usize, reason: String },

    #[error("OCR engine `{engine}` failed: {reason}")]
    Ocr { engine: &'static str, reason: String },

    #[error("I/O error during extraction: {0}")]
    Io(#[from] std::io::Error),

    #[error("image error during extraction: {0}")]
    Image(#[from] image::ImageError),

    #[error("ONNX runtime error during extraction: {0}")]
    Onnx(#[from] ort::Error),
}

/// The QA model failed during inference.
#[derive(Debug, Error)]
pub enum QaError {
    #[error("tokenizer error: {0}")]
    Tokenizer(String),

    #[error("question is {tokens} tokens long, the model accepts at most {limit}")]
    QuestionTooLong { tokens: usize, limit: usize },

    #[error("QA inference failed: {0}")]
    Inference(#[from] ort::Error),

    #[error("unexpected QA model output: {0}")]
    MalformedOutput(String),
}

/// Engine or model loading failed while building a `DocumentQa`.
#[derive(Debug, Error)]
pub enum InitError {
    #[error("{what} not found at {}", path.display())]
    MissingAsset { what: &'static str, path: PathBuf },

    #[error("failed to load ONNX model {}: {reason}", path.display())]
    Model { path: PathBuf, reason: String },

    #[error("failed to load tokenizer {}: {reason}", path.display())]
    Tokenizer { path: PathBuf, reason: String },

    #[error("`{}` is not usable: {reason}", binary.display())]
    Backend { binary: PathBuf, reason: String },

    #[error("character dictionary {} is invalid: {reason}", path.display())]
    Dictionary { path: PathBuf, reason: String },
}

/// Configuration file could not be read or parsed.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read config {}: {source}", path.display())]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to parse config {}: {source}", path.display())]
    Parse {
        path: PathBuf,
        #[source]
        source: toml::de::Error,
    },
}
