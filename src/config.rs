// Configuration for docqa: model locations, engine knobs, backend binaries
use serde::{Deserialize, Serialize};
use std::env;
use std::fs;
use std::path::{Path, PathBuf};

use crate::error::ConfigError;

/// OCR runs in English only.
pub const OCR_LANGUAGE: &str = "eng";

pub const CONFIG_FILE_NAME: &str = "docqa.toml";

pub const ENV_MODEL_DIR: &str = "DOCQA_MODEL_DIR";
pub const ENV_TESSERACT: &str = "DOCQA_TESSERACT";
pub const ENV_PDFTOPPM: &str = "DOCQA_PDFTOPPM";

#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct DocQaConfig {
    /// Base directory for relative model paths.
    pub model_dir: PathBuf,
    pub image_ocr: ImageOcrConfig,
    pub pdf: PdfConfig,
    pub qa: QaConfig,
}

/// PP-OCR detector/recognizer used for in-memory images.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct ImageOcrConfig {
    pub detection_model: PathBuf,
    pub recognition_model: PathBuf,
    pub character_dict: PathBuf,
    /// Pixel probability above which a pixel counts as text.
    pub det_threshold: f32,
    /// Mean probability a detected box needs to be kept.
    pub box_threshold: f32,
    pub unclip_ratio: f32,
    /// Longest image side fed to the detector.
    pub max_side_len: u32,
    pub rec_height: u32,
    pub rec_min_width: u32,
    /// Recognized fragments scoring below this are dropped.
    pub drop_score: f32,
    pub intra_threads: usize,
}

/// Rasterization and OCR of PDF pages.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct PdfConfig {
    pub pdftoppm: PathBuf,
    pub tesseract: PathBuf,
    /// 72 renders one pixel per PDF point.
    pub render_dpi: u32,
    pub page_segmentation_mode: u8,
}

/// Extractive QA model.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct QaConfig {
    pub model: PathBuf,
    pub tokenizer: PathBuf,
    pub max_seq_len: usize,
    pub doc_stride: usize,
    pub max_answer_len: usize,
    pub intra_threads: usize,
}

impl Default for DocQaConfig {
    fn default() -> Self {
        Self {
            model_dir: PathBuf::from("models"),
            image_ocr: ImageOcrConfig::default(),
            pdf: PdfConfig::default(),
            qa: QaConfig::default(),
        }
    }
}

impl Default for ImageOcrConfig {
    fn default() -> Self {
        Self {
            detection_model: PathBuf::from("ppocrv4_mobile_det.onnx"),
            recognition_model: PathBuf::from("en_ppocrv4_mobile_rec.onnx"),
            character_dict: PathBuf::from("en_dict.txt"),
            det_threshold: 0.3,
            box_threshold: 0.6,
            unclip_ratio: 1.5,
            max_side_len: 960,
            rec_height: 48,
            rec_min_width: 320,
            drop_score: 0.5,
            intra_threads: 4,
        }
    }
}

impl Default for PdfConfig {
    fn default() -> Self {
        Self {
            pdftoppm: PathBuf::from("pdftoppm"),
            tesseract: PathBuf::from("tesseract"),
            render_dpi: 72,
            page_segmentation_mode: 3,
        }
    }
}

impl Default for QaConfig {
    fn default() -> Self {
        Self {
            model: PathBuf::from("roberta-base-squad2/model.onnx"),
            tokenizer: PathBuf::from("roberta-base-squad2/tokenizer.json"),
            max_seq_len: 384,
            doc_stride: 128,
            max_answer_len: 15,
            intra_threads: 4,
        }
    }
}

impl DocQaConfig {
    /// Load configuration.
    ///
    /// An explicit path must exist. Without one, `./docqa.toml` and then
    /// `<config dir>/docqa/config.toml` are tried, falling back to defaults.
    /// Environment overrides are applied last.
    pub fn load(explicit: Option<&Path>) -> Result<Self, ConfigError> {
        let mut config = match explicit {
            Some(path) => Self::from_file(path)?,
            None => match Self::default_locations().into_iter().find(|p| p.is_file()) {
                Some(path) => Self::from_file(&path)?,
                None => Self::default(),
            },
        };
        config.apply_env_overrides(|key| env::var(key).ok());
        Ok(config)
    }

    pub fn from_file(path: &Path) -> Result<Self, ConfigError> {
        let content = fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_toml(&content).map_err(|source| ConfigError::Parse {
            path: path.to_path_buf(),
            source,
        })
    }

    pub fn from_toml(content: &str) -> Result<Self, toml::de::Error> {
        toml::from_str(content)
    }

    fn default_locations() -> Vec<PathBuf> {
        let mut paths = vec![PathBuf::from(CONFIG_FILE_NAME)];
        if let Some(dir) = dirs::config_dir() {
            paths.push(dir.join("docqa").join("config.toml"));
        }
        paths
    }

    fn apply_env_overrides<F>(&mut self, lookup: F)
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(dir) = lookup(ENV_MODEL_DIR) {
            self.model_dir = PathBuf::from(dir);
        }
        if let Some(bin) = lookup(ENV_TESSERACT) {
            self.pdf.tesseract = PathBuf::from(bin);
        }
        if let Some(bin) = lookup(ENV_PDFTOPPM) {
            self.pdf.pdftoppm = PathBuf::from(bin);
        }
    }

    /// Resolve a model path against `model_dir`. Absolute paths are kept.
    pub fn model_path(&self, path: &Path) -> PathBuf {
        self.model_dir.join(path)
    }
}
