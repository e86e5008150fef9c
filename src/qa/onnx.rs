// Span-extraction QA model (SQuAD2-style) run through ONNX Runtime
use ort::{inputs, session::Session, value::Value};
use tokenizers::{
    Encoding, PostProcessor, Tokenizer, TruncationDirection, TruncationParams, TruncationStrategy,
};
use tracing::{debug, info, instrument};

use super::span::{best_span, Span};
use super::{QaAnswer, QuestionAnswerer};
use crate::config::{DocQaConfig, QaConfig};
use crate::error::{InitError, QaError};
use crate::runtime::load_session;

pub struct OnnxQuestionAnswerer {
    session: Session,
    tokenizer: Tokenizer,
    uses_token_type_ids: bool,
    params: QaConfig,
}

/// Winning span of one window, already mapped to context byte offsets.
#[derive(Debug, Clone, Copy, PartialEq)]
struct Candidate {
    start: usize,
    end: usize,
    score: f32,
}

impl OnnxQuestionAnswerer {
    pub fn from_config(config: &DocQaConfig) -> Result<Self, InitError> {
        let params = config.qa.clone();
        let session = load_session(&config.model_path(&params.model), "QA model", params.intra_threads)?;

        let tokenizer_path = config.model_path(&params.tokenizer);
        if !tokenizer_path.is_file() {
            return Err(InitError::MissingAsset {
                what: "QA tokenizer",
                path: tokenizer_path,
            });
        }
        let mut tokenizer = Tokenizer::from_file(&tokenizer_path).map_err(|e| InitError::Tokenizer {
            path: tokenizer_path.clone(),
            reason: e.to_string(),
        })?;
        tokenizer.with_padding(None);

        let uses_token_type_ids = session.inputs.iter().any(|input| input.name == "token_type_ids");
        info!(
            tokenizer = %tokenizer_path.display(),
            uses_token_type_ids,
            "QA tokenizer loaded"
        );

        Ok(Self {
            session,
            tokenizer,
            uses_token_type_ids,
            params,
        })
    }

    /// Run the model on one window and return `(start_logits, end_logits)`.
    fn run_window(&mut self, encoding: &Encoding) -> Result<(Vec<f32>, Vec<f32>), QaError> {
        let len = encoding.len();
        let as_i64 = |values: &[u32]| values.iter().map(|&v| v as i64).collect::<Vec<_>>();

        let input_ids = Value::from_array(([1_usize, len], as_i64(encoding.get_ids()).into_boxed_slice()))?;
        let attention_mask =
            Value::from_array(([1_usize, len], as_i64(encoding.get_attention_mask()).into_boxed_slice()))?;

        let outputs = if self.uses_token_type_ids {
            let token_type_ids =
                Value::from_array(([1_usize, len], as_i64(encoding.get_type_ids()).into_boxed_slice()))?;
            self.session.run(inputs![
                "input_ids" => input_ids,
                "attention_mask" => attention_mask,
                "token_type_ids" => token_type_ids
            ])?
        } else {
            self.session.run(inputs![
                "input_ids" => input_ids,
                "attention_mask" => attention_mask
            ])?
        };

        if outputs.len() < 2 {
            return Err(QaError::MalformedOutput(format!(
                "expected start and end logits, model returned {} outputs",
                outputs.len()
            )));
        }
        let (_, start) = outputs[0].try_extract_tensor::<f32>()?;
        let (_, end) = outputs[1].try_extract_tensor::<f32>()?;
        if start.len() != len || end.len() != len {
            return Err(QaError::MalformedOutput(format!(
                "logits of length {}/{} for a window of {len} tokens",
                start.len(),
                end.len()
            )));
        }
        Ok((start.to_vec(), end.to_vec()))
    }

    fn best_in_window(&self, encoding: &Encoding, start_logits: &[f32], end_logits: &[f32]) -> Option<Candidate> {
        let allowed = context_tokens(&encoding.get_sequence_ids());
        let cls_index = (encoding.get_special_tokens_mask().first() == Some(&1)).then_some(0);
        let span = best_span(
            start_logits,
            end_logits,
            &allowed,
            cls_index,
            self.params.max_answer_len,
        )?;
        to_candidate(span, encoding.get_offsets())
    }
}

impl QuestionAnswerer for OnnxQuestionAnswerer {
    #[instrument(skip_all, fields(context_len = context.len()))]
    fn answer(&mut self, context: &str, question: &str) -> Result<QaAnswer, QaError> {
        let Some(question) = answerable_question(context, question) else {
            debug!("empty context or question, model not run");
            return Ok(QaAnswer::empty());
        };

        let windows = encode_windows(&mut self.tokenizer, &self.params, context, question)?;
        debug!(windows = windows.len(), "context encoded");

        let mut best: Option<Candidate> = None;
        for (index, window) in windows.iter().enumerate() {
            let (start_logits, end_logits) = self.run_window(window)?;
            let candidate = self.best_in_window(window, &start_logits, &end_logits);
            debug!(window = index, ?candidate, "window decoded");
            if let Some(c) = candidate {
                if best.map_or(true, |b| c.score > b.score) {
                    best = Some(c);
                }
            }
        }

        let Some(best) = best else {
            return Ok(QaAnswer::empty());
        };
        let text = context.get(best.start..best.end).ok_or_else(|| {
            QaError::MalformedOutput(format!(
                "answer offsets {}..{} do not fall on the context",
                best.start, best.end
            ))
        })?;
        info!(score = best.score, answer = text, "answer selected");

        Ok(QaAnswer {
            text: text.to_string(),
            score: best.score,
            start: best.start,
            end: best.end,
        })
    }
}

/// The question with leading whitespace removed, or `None` when either side
/// is blank and there is nothing to answer.
fn answerable_question<'q>(context: &str, question: &'q str) -> Option<&'q str> {
    let question = question.trim_start();
    (!context.trim().is_empty() && !question.trim().is_empty()).then_some(question)
}

/// Encode `(question, context)` into one or more overlapping windows.
///
/// Truncation is reset before the question is measured, so no setting from a
/// previous call leaks into this one.
fn encode_windows(
    tokenizer: &mut Tokenizer,
    params: &QaConfig,
    context: &str,
    question: &str,
) -> Result<Vec<Encoding>, QaError> {
    let tokenizer_error = |e: tokenizers::Error| QaError::Tokenizer(e.to_string());

    tokenizer.with_truncation(None).map_err(tokenizer_error)?;
    let question_tokens = tokenizer.encode(question, false).map_err(tokenizer_error)?.len();
    let added = tokenizer
        .get_post_processor()
        .map_or(0, |p| p.added_tokens(true));
    let stride = window_stride(params, question_tokens, added)?;

    tokenizer
        .with_truncation(Some(TruncationParams {
            max_length: params.max_seq_len,
            strategy: TruncationStrategy::OnlySecond,
            stride,
            direction: TruncationDirection::Right,
        }))
        .map_err(tokenizer_error)?;

    let mut first = tokenizer.encode((question, context), true).map_err(tokenizer_error)?;
    let overflowing = first.take_overflowing();
    Ok(std::iter::once(first).chain(overflowing).collect())
}

/// Overlap between windows, shrunk so that a long question still leaves each
/// window room to advance through the context.
fn window_stride(params: &QaConfig, question_tokens: usize, added_tokens: usize) -> Result<usize, QaError> {
    let room = params
        .max_seq_len
        .saturating_sub(question_tokens)
        .saturating_sub(added_tokens);
    if room == 0 {
        return Err(QaError::QuestionTooLong {
            tokens: question_tokens,
            limit: params.max_seq_len.saturating_sub(added_tokens),
        });
    }
    Ok(params.doc_stride.min(room / 2))
}

fn context_tokens(sequence_ids: &[Option<usize>]) -> Vec<bool> {
    sequence_ids.iter().map(|id| *id == Some(1)).collect()
}

fn to_candidate(span: Span, offsets: &[(usize, usize)]) -> Option<Candidate> {
    let start = offsets.get(span.start)?.0;
    let end = offsets.get(span.end)?.1;
    (start < end).then_some(Candidate {
        start,
        end,
        score: span.score,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::str::FromStr;
    use tempfile::TempDir;

    /// Whitespace word-level tokenizer over `a`..`z`, no special tokens.
    fn letter_tokenizer() -> Tokenizer {
        let vocab: Vec<String> = std::iter::once("\"[UNK]\": 0".to_string())
            .chain(('a'..='z').enumerate().map(|(i, c)| format!("\"{c}\": {}", i + 1)))
            .collect();
        let json = format!(
            r#"{{
                "version": "1.0",
                "truncation": null,
                "padding": null,
                "added_tokens": [],
                "normalizer": null,
                "pre_tokenizer": {{ "type": "Whitespace" }},
                "post_processor": null,
                "decoder": null,
                "model": {{ "type": "WordLevel", "vocab": {{ {} }}, "unk_token": "[UNK]" }}
            }}"#,
            vocab.join(", ")
        );
        Tokenizer::from_str(&json).unwrap()
    }

    fn words(n: usize) -> String {
        (0..n)
            .map(|i| char::from(b'a' + (i % 26) as u8).to_string())
            .collect::<Vec<_>>()
            .join(" ")
    }

    #[test]
    fn blank_context_or_question_is_not_answerable() {
        assert_eq!(answerable_question("", "what?"), None);
        assert_eq!(answerable_question(" \n\t", "what?"), None);
        assert_eq!(answerable_question("Palm oil", ""), None);
        assert_eq!(answerable_question("Palm oil", "   "), None);
    }

    #[test]
    fn question_loses_leading_whitespace_only() {
        assert_eq!(answerable_question("Palm oil", "  which oil? "), Some("which oil? "));
    }

    #[test]
    fn long_context_is_split_into_windows() {
        let mut tokenizer = letter_tokenizer();
        let params = QaConfig {
            max_seq_len: 8,
            ..QaConfig::default()
        };
        let windows = encode_windows(&mut tokenizer, &params, &words(20), "a b").unwrap();
        assert!(windows.len() > 1);
        assert!(windows.iter().all(|w| w.len() <= 8));
    }

    #[test]
    fn long_question_fails_the_same_way_on_every_call() {
        let mut tokenizer = letter_tokenizer();
        let params = QaConfig {
            max_seq_len: 8,
            ..QaConfig::default()
        };
        let long_question = words(10);

        for _ in 0..2 {
            let err = encode_windows(&mut tokenizer, &params, &words(4), &long_question).unwrap_err();
            assert!(matches!(err, QaError::QuestionTooLong { tokens: 10, limit: 8 }));
            // Leaves truncation configured for the next call
            encode_windows(&mut tokenizer, &params, &words(20), "a b").unwrap();
        }
    }

    #[test]
    fn questions_that_fit_are_never_rejected() {
        let mut tokenizer = letter_tokenizer();
        let params = QaConfig::default();
        let windows = encode_windows(&mut tokenizer, &params, &words(30), &words(100)).unwrap();
        assert!(!windows.is_empty());
    }

    #[test]
    fn stride_defaults_to_configured_overlap() {
        let params = QaConfig::default();
        assert_eq!(window_stride(&params, 6, 4).unwrap(), 128);
    }

    #[test]
    fn stride_shrinks_for_long_questions() {
        let params = QaConfig {
            max_seq_len: 64,
            ..QaConfig::default()
        };
        // 64 - 30 - 4 leaves 30 context tokens per window
        assert_eq!(window_stride(&params, 30, 4).unwrap(), 15);
    }

    #[test]
    fn no_room_for_context_is_rejected() {
        let params = QaConfig {
            max_seq_len: 16,
            ..QaConfig::default()
        };
        let err = window_stride(&params, 12, 4).unwrap_err();
        assert!(matches!(err, QaError::QuestionTooLong { tokens: 12, limit: 12 }));
    }

    #[test]
    fn only_second_sequence_is_answerable() {
        let ids = [None, Some(0), Some(0), None, None, Some(1), Some(1), None];
        assert_eq!(
            context_tokens(&ids),
            vec![false, false, false, false, false, true, true, false]
        );
    }

    #[test]
    fn span_maps_to_context_byte_offsets() {
        // "Palm oil is the most efficient"
        let offsets = [(0, 0), (0, 4), (5, 8), (9, 11)];
        let span = Span {
            start: 1,
            end: 2,
            score: 0.8,
        };
        let candidate = to_candidate(span, &offsets).unwrap();
        assert_eq!((candidate.start, candidate.end), (0, 8));
        assert_eq!(&"Palm oil is the most efficient"[candidate.start..candidate.end], "Palm oil");
    }

    #[test]
    fn empty_or_out_of_range_offsets_give_no_candidate() {
        let span = Span {
            start: 0,
            end: 0,
            score: 0.5,
        };
        assert_eq!(to_candidate(span, &[(0, 0)]), None);
        let span = Span {
            start: 3,
            end: 4,
            score: 0.5,
        };
        assert_eq!(to_candidate(span, &[(0, 2)]), None);
    }

    #[test]
    fn missing_model_is_reported_at_construction() {
        let dir = TempDir::new().unwrap();
        let config = DocQaConfig {
            model_dir: dir.path().to_path_buf(),
            ..DocQaConfig::default()
        };
        match OnnxQuestionAnswerer::from_config(&config) {
            Err(InitError::MissingAsset { what, path }) => {
                assert_eq!(what, "QA model");
                assert!(path.starts_with(dir.path()));
            }
            Err(other) => panic!("unexpected error: {other}"),
            Ok(_) => panic!("construction should fail without a model"),
        }
    }
}
