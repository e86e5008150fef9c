// Answer span selection from start/end logits
//
// Tokens outside the context are pushed to a large negative logit before
// the softmax. The leading classifier token takes part in the softmax and is
// then zeroed, so a "no answer" prediction is never returned as a span.

const MASKED_LOGIT: f32 = -10_000.0;

/// Best `(start, end)` token pair of one window.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Span {
    pub start: usize,
    pub end: usize,
    pub score: f32,
}

/// Pick the span maximizing `p_start * p_end` with `start <= end` and at most
/// `max_answer_len` tokens. `allowed[i]` marks context tokens.
///
/// Returns `None` when no token is allowed.
pub fn best_span(
    start_logits: &[f32],
    end_logits: &[f32],
    allowed: &[bool],
    cls_index: Option<usize>,
    max_answer_len: usize,
) -> Option<Span> {
    let len = start_logits.len().min(end_logits.len()).min(allowed.len());
    if len == 0 || max_answer_len == 0 {
        return None;
    }

    let keep = |i: usize| allowed[i] || cls_index == Some(i);
    let mut p_start = softmax(&masked(&start_logits[..len], keep));
    let mut p_end = softmax(&masked(&end_logits[..len], keep));
    if let Some(cls) = cls_index.filter(|&c| c < len) {
        p_start[cls] = 0.0;
        p_end[cls] = 0.0;
    }

    let mut best: Option<Span> = None;
    for start in (0..len).filter(|&i| allowed[i]) {
        let last = (start + max_answer_len).min(len);
        for end in (start..last).filter(|&j| allowed[j]) {
            let score = p_start[start] * p_end[end];
            if best.map_or(true, |b| score > b.score) {
                best = Some(Span { start, end, score });
            }
        }
    }
    best
}

fn masked(logits: &[f32], keep: impl Fn(usize) -> bool) -> Vec<f32> {
    logits
        .iter()
        .enumerate()
        .map(|(i, &l)| if keep(i) { l } else { MASKED_LOGIT })
        .collect()
}

fn softmax(logits: &[f32]) -> Vec<f32> {
    let max = logits.iter().copied().fold(f32::NEG_INFINITY, f32::max);
    let exps: Vec<f32> = logits.iter().map(|&l| (l - max).exp()).collect();
    let sum: f32 = exps.iter().sum();
    exps.into_iter().map(|e| e / sum).collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    // <s> what oil </s> </s> palm oil is best </s>
    const ALLOWED: [bool; 10] = [false, false, false, false, false, true, true, true, true, false];

    fn logits_peaking_at(peaks: &[(usize, f32)]) -> Vec<f32> {
        let mut logits = vec![0.0; ALLOWED.len()];
        for &(i, v) in peaks {
            logits[i] = v;
        }
        logits
    }

    #[test]
    fn picks_highest_joint_probability() {
        let start = logits_peaking_at(&[(5, 8.0)]);
        let end = logits_peaking_at(&[(6, 8.0)]);
        let span = best_span(&start, &end, &ALLOWED, Some(0), 15).unwrap();
        assert_eq!((span.start, span.end), (5, 6));
        assert!(span.score > 0.9);
    }

    #[test]
    fn question_tokens_never_win() {
        // Strongest logits sit on question tokens
        let start = logits_peaking_at(&[(1, 20.0), (7, 2.0)]);
        let end = logits_peaking_at(&[(2, 20.0), (8, 2.0)]);
        let span = best_span(&start, &end, &ALLOWED, Some(0), 15).unwrap();
        assert_eq!((span.start, span.end), (7, 8));
    }

    #[test]
    fn end_before_start_is_rejected() {
        let start = logits_peaking_at(&[(8, 10.0), (5, 1.0)]);
        let end = logits_peaking_at(&[(6, 10.0), (8, 3.0)]);
        let span = best_span(&start, &end, &ALLOWED, None, 15).unwrap();
        assert!(span.start <= span.end);
        assert_eq!((span.start, span.end), (8, 8));
    }

    #[test]
    fn spans_are_capped_by_max_answer_len() {
        let start = logits_peaking_at(&[(5, 10.0)]);
        let end = logits_peaking_at(&[(8, 6.0)]);
        let span = best_span(&start, &end, &ALLOWED, Some(0), 2).unwrap();
        assert_eq!(span.start, 5);
        assert!(span.end <= 6);
    }

    #[test]
    fn classifier_token_is_not_an_answer() {
        let start = logits_peaking_at(&[(0, 30.0)]);
        let end = logits_peaking_at(&[(0, 30.0)]);
        let span = best_span(&start, &end, &ALLOWED, Some(0), 15).unwrap();
        assert!(span.start >= 5);
        // Most of the mass went to the classifier token
        assert!(span.score < 1e-6);
    }

    #[test]
    fn nothing_allowed_is_none() {
        let logits = vec![1.0; 4];
        assert_eq!(best_span(&logits, &logits, &[false; 4], Some(0), 15), None);
        assert_eq!(best_span(&[], &[], &[], None, 15), None);
    }

    #[test]
    fn softmax_sums_to_one() {
        let probs = softmax(&[1.0, 2.0, 3.0]);
        assert!((probs.iter().sum::<f32>() - 1.0).abs() < 1e-6);
        assert!(probs[2] > probs[1] && probs[1] > probs[0]);
    }
}
