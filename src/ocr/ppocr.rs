// PP-OCR text detection + recognition on ONNX Runtime
//
// Detection: DB-style probability map, thresholded into connected regions,
// boxed, expanded and sorted into reading order.
// Recognition: each box is cropped, resized to a fixed height and decoded
// with greedy CTC against the character dictionary.
use image::imageops::{self, FilterType};
use image::{DynamicImage, RgbImage};
use ort::{inputs, session::Session, value::Value};
use std::fs;
use std::path::Path;
use tracing::{debug, instrument, warn};

use super::{BBox, OcrEngine, TextFragment};
use crate::config::{DocQaConfig, ImageOcrConfig};
use crate::error::{ExtractionError, InitError};
use crate::runtime::load_session;

const ENGINE_NAME: &str = "ppocr";

// Detector input normalization, applied in BGR channel order.
const DET_MEAN: [f32; 3] = [0.485, 0.456, 0.406];
const DET_STD: [f32; 3] = [0.229, 0.224, 0.225];

const MIN_BOX_SIDE: f32 = 3.0;
/// Boxes whose tops differ by less than this many pixels share a line.
const LINE_TOLERANCE: f32 = 10.0;
/// Crops at least this much taller than wide are rotated before recognition.
const VERTICAL_RATIO: f32 = 1.5;
const CTC_BLANK: usize = 0;

pub struct PpOcrEngine {
    detector: Session,
    recognizer: Session,
    charset: Vec<String>,
    params: ImageOcrConfig,
}

impl PpOcrEngine {
    pub fn from_config(config: &DocQaConfig) -> Result<Self, InitError> {
        let params = config.image_ocr.clone();
        let detector = load_session(
            &config.model_path(&params.detection_model),
            "text detection model",
            params.intra_threads,
        )?;
        let recognizer = load_session(
            &config.model_path(&params.recognition_model),
            "text recognition model",
            params.intra_threads,
        )?;
        let charset = load_charset(&config.model_path(&params.character_dict))?;
        debug!(characters = charset.len(), "character dictionary loaded");

        Ok(Self {
            detector,
            recognizer,
            charset,
            params,
        })
    }

    fn detect(&mut self, rgb: &RgbImage) -> Result<Vec<BBox>, ExtractionError> {
        let (det_w, det_h) = detection_size(rgb.width(), rgb.height(), self.params.max_side_len);
        let resized = imageops::resize(rgb, det_w, det_h, FilterType::Triangle);
        let tensor = bgr_chw(&resized, DET_MEAN, DET_STD);
        let input = Value::from_array(([1_usize, 3, det_h as usize, det_w as usize], tensor.into_boxed_slice()))?;

        let map = {
            let outputs = self.detector.run(inputs![input])?;
            let (shape, data) = outputs[0].try_extract_tensor::<f32>()?;
            if shape.len() < 2 {
                return Err(malformed(format!("detector output shape {shape:?}")));
            }
            let height = shape[shape.len() - 2] as usize;
            let width = shape[shape.len() - 1] as usize;
            if width * height != data.len() {
                return Err(malformed(format!("detector output shape {shape:?} for {} values", data.len())));
            }
            ProbabilityMap {
                width,
                height,
                data: data.to_vec(),
            }
        };

        let scale_x = rgb.width() as f32 / map.width as f32;
        let scale_y = rgb.height() as f32 / map.height as f32;
        let boxes = text_regions(
            &map,
            self.params.det_threshold,
            self.params.box_threshold,
            self.params.unclip_ratio,
        )
        .into_iter()
        .map(|b| BBox {
            x0: (b.x0 * scale_x).clamp(0.0, rgb.width() as f32),
            y0: (b.y0 * scale_y).clamp(0.0, rgb.height() as f32),
            x1: (b.x1 * scale_x).clamp(0.0, rgb.width() as f32),
            y1: (b.y1 * scale_y).clamp(0.0, rgb.height() as f32),
        })
        .collect();

        Ok(sort_reading_order(boxes))
    }

    fn read_line(&mut self, crop: &RgbImage) -> Result<(String, f32), ExtractionError> {
        let rec_h = self.params.rec_height.max(1);
        let ratio = crop.width() as f32 / crop.height().max(1) as f32;
        let resized_w = ((rec_h as f32 * ratio).ceil() as u32).max(1);
        let target_w = resized_w.max(self.params.rec_min_width);
        let resized = imageops::resize(crop, resized_w, rec_h, FilterType::Triangle);

        // Right-hand padding stays zero in normalized space.
        let plane = (rec_h * target_w) as usize;
        let mut tensor = vec![0.0_f32; 3 * plane];
        for (x, y, pixel) in resized.enumerate_pixels() {
            let offset = (y * target_w + x) as usize;
            for c in 0..3 {
                tensor[c * plane + offset] = (pixel[2 - c] as f32 / 255.0 - 0.5) / 0.5;
            }
        }

        let input = Value::from_array(([1_usize, 3, rec_h as usize, target_w as usize], tensor.into_boxed_slice()))?;
        let outputs = self.recognizer.run(inputs![input])?;
        let (shape, data) = outputs[0].try_extract_tensor::<f32>()?;
        if shape.len() != 3 {
            return Err(malformed(format!("recognizer output shape {shape:?}")));
        }
        let steps = shape[1] as usize;
        let classes = shape[2] as usize;
        if steps * classes != data.len() {
            return Err(malformed(format!("recognizer output shape {shape:?} for {} values", data.len())));
        }

        Ok(ctc_greedy_decode(data, steps, classes, &self.charset))
    }
}

impl OcrEngine for PpOcrEngine {
    fn name(&self) -> &'static str {
        ENGINE_NAME
    }

    #[instrument(name = "ppocr", skip_all, fields(width = image.width(), height = image.height()))]
    fn recognize(&mut self, image: &DynamicImage) -> Result<Vec<TextFragment>, ExtractionError> {
        let rgb = image.to_rgb8();
        if rgb.width() == 0 || rgb.height() == 0 {
            return Ok(Vec::new());
        }

        let boxes = self.detect(&rgb)?;
        debug!(boxes = boxes.len(), "text regions detected");

        let mut fragments = Vec::with_capacity(boxes.len());
        for bbox in boxes {
            let crop = crop_line(&rgb, &bbox);
            let (text, confidence) = self.read_line(&crop)?;
            if text.trim().is_empty() || confidence < self.params.drop_score {
                debug!(%text, confidence, "dropping low-confidence fragment");
                continue;
            }
            fragments.push(TextFragment {
                text,
                confidence,
                bbox: Some(bbox),
            });
        }
        Ok(fragments)
    }
}

fn malformed(reason: String) -> ExtractionError {
    ExtractionError::Ocr {
        engine: ENGINE_NAME,
        reason,
    }
}

/// Dictionary lines map to classes 1..=N; class 0 is the CTC blank and a
/// trailing space class follows the file's entries.
fn load_charset(path: &Path) -> Result<Vec<String>, InitError> {
    if !path.is_file() {
        return Err(InitError::MissingAsset {
            what: "character dictionary",
            path: path.to_path_buf(),
        });
    }
    let content = fs::read_to_string(path).map_err(|e| InitError::Dictionary {
        path: path.to_path_buf(),
        reason: e.to_string(),
    })?;
    let charset = parse_charset(&content);
    if charset.len() <= 1 {
        return Err(InitError::Dictionary {
            path: path.to_path_buf(),
            reason: "no characters".to_string(),
        });
    }
    Ok(charset)
}

fn parse_charset(content: &str) -> Vec<String> {
    let mut charset: Vec<String> = content
        .lines()
        .map(|line| line.trim_end_matches('\r').to_string())
        .collect();
    if charset.iter().any(|c| c.is_empty()) {
        warn!("character dictionary contains empty lines");
    }
    charset.push(" ".to_string());
    charset
}

/// Scale so the longest side is at most `max_side`, then snap both sides to
/// multiples of 32.
fn detection_size(width: u32, height: u32, max_side: u32) -> (u32, u32) {
    let longest = width.max(height) as f32;
    let ratio = if max_side > 0 && longest > max_side as f32 {
        max_side as f32 / longest
    } else {
        1.0
    };
    let snap = |v: f32| (((v / 32.0).round() as u32) * 32).max(32);
    (snap(width as f32 * ratio), snap(height as f32 * ratio))
}

/// RGB pixels to a normalized CHW tensor in BGR channel order.
fn bgr_chw(image: &RgbImage, mean: [f32; 3], std: [f32; 3]) -> Vec<f32> {
    let width = image.width();
    let plane = (width * image.height()) as usize;
    let mut out = vec![0.0_f32; 3 * plane];
    for (x, y, pixel) in image.enumerate_pixels() {
        let offset = (y * width + x) as usize;
        for c in 0..3 {
            out[c * plane + offset] = (pixel[2 - c] as f32 / 255.0 - mean[c]) / std[c];
        }
    }
    out
}

struct ProbabilityMap {
    width: usize,
    height: usize,
    data: Vec<f32>,
}

impl ProbabilityMap {
    fn mean_in(&self, x0: usize, y0: usize, x1: usize, y1: usize) -> f32 {
        let mut sum = 0.0;
        for y in y0..=y1 {
            let row = &self.data[y * self.width..(y + 1) * self.width];
            sum += row[x0..=x1].iter().sum::<f32>();
        }
        sum / ((x1 - x0 + 1) * (y1 - y0 + 1)) as f32
    }
}

/// Connected regions of the thresholded map, boxed, scored and expanded.
/// Coordinates are in map pixels.
fn text_regions(map: &ProbabilityMap, det_threshold: f32, box_threshold: f32, unclip_ratio: f32) -> Vec<BBox> {
    let (w, h) = (map.width, map.height);
    let mut visited = vec![false; w * h];
    let mut stack = Vec::new();
    let mut boxes = Vec::new();

    for start in 0..w * h {
        if visited[start] || map.data[start] <= det_threshold {
            continue;
        }
        visited[start] = true;
        stack.push(start);

        let (mut x0, mut y0, mut x1, mut y1) = (usize::MAX, usize::MAX, 0, 0);
        while let Some(i) = stack.pop() {
            let (x, y) = (i % w, i / w);
            x0 = x0.min(x);
            y0 = y0.min(y);
            x1 = x1.max(x);
            y1 = y1.max(y);

            let mut visit = |n: usize| {
                if !visited[n] && map.data[n] > det_threshold {
                    visited[n] = true;
                    stack.push(n);
                }
            };
            if x > 0 {
                visit(i - 1);
            }
            if x + 1 < w {
                visit(i + 1);
            }
            if y > 0 {
                visit(i - w);
            }
            if y + 1 < h {
                visit(i + w);
            }
        }

        let box_w = (x1 - x0 + 1) as f32;
        let box_h = (y1 - y0 + 1) as f32;
        if box_w.min(box_h) < MIN_BOX_SIDE {
            continue;
        }
        if map.mean_in(x0, y0, x1, y1) < box_threshold {
            continue;
        }

        let distance = box_w * box_h * unclip_ratio / (2.0 * (box_w + box_h));
        let expanded = BBox {
            x0: (x0 as f32 - distance).max(0.0),
            y0: (y0 as f32 - distance).max(0.0),
            x1: ((x1 + 1) as f32 + distance).min(w as f32),
            y1: ((y1 + 1) as f32 + distance).min(h as f32),
        };
        if expanded.width().min(expanded.height()) < MIN_BOX_SIDE + 2.0 {
            continue;
        }
        boxes.push(expanded);
    }

    boxes
}

/// Top-to-bottom, then left-to-right within a line.
fn sort_reading_order(mut boxes: Vec<BBox>) -> Vec<BBox> {
    boxes.sort_by(|a, b| a.y0.total_cmp(&b.y0).then(a.x0.total_cmp(&b.x0)));
    for i in 0..boxes.len().saturating_sub(1) {
        for j in (0..=i).rev() {
            if (boxes[j + 1].y0 - boxes[j].y0).abs() < LINE_TOLERANCE && boxes[j + 1].x0 < boxes[j].x0 {
                boxes.swap(j, j + 1);
            } else {
                break;
            }
        }
    }
    boxes
}

fn crop_line(image: &RgbImage, bbox: &BBox) -> RgbImage {
    let x = (bbox.x0.floor().max(0.0) as u32).min(image.width() - 1);
    let y = (bbox.y0.floor().max(0.0) as u32).min(image.height() - 1);
    let x_end = (bbox.x1.ceil() as u32).clamp(x + 1, image.width());
    let y_end = (bbox.y1.ceil() as u32).clamp(y + 1, image.height());

    let crop = imageops::crop_imm(image, x, y, x_end - x, y_end - y).to_image();
    if crop.height() as f32 / crop.width() as f32 >= VERTICAL_RATIO {
        imageops::rotate270(&crop)
    } else {
        crop
    }
}

/// Greedy CTC: best class per step, collapse repeats, drop blanks.
/// Confidence is the mean probability of the emitted characters.
fn ctc_greedy_decode(probs: &[f32], steps: usize, classes: usize, charset: &[String]) -> (String, f32) {
    let mut text = String::new();
    let mut confidences = Vec::new();
    let mut previous = None;

    for step in probs.chunks_exact(classes).take(steps) {
        let (index, prob) = step
            .iter()
            .copied()
            .enumerate()
            .fold((CTC_BLANK, f32::NEG_INFINITY), |best, (i, p)| if p > best.1 { (i, p) } else { best });

        if index != CTC_BLANK && previous != Some(index) {
            if let Some(ch) = charset.get(index - 1) {
                text.push_str(ch);
                confidences.push(prob);
            }
        }
        previous = Some(index);
    }

    let confidence = if confidences.is_empty() {
        0.0
    } else {
        confidences.iter().sum::<f32>() / confidences.len() as f32
    };
    (text, confidence)
}
