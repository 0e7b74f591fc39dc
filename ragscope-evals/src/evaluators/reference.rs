// Copyright 2025 Sushanth (https://github.com/sushanthpy)
//
// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at
//
//     http://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an "AS IS" BASIS,
// WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
// See the License for the specific language governing permissions and
// limitations under the License.

//! Reference-Based Lexical Metrics
//!
//! Deterministic scores comparing a generated answer with its reference.
//! No network calls.
//!
//! - **BLEU**: sentence BLEU over whitespace tokens (case preserved), up to
//!   4-grams with uniform weights, brevity penalty and epsilon smoothing
//! - **ROUGE-1/2/L**: F-measure over lowercase alphanumeric tokens, words
//!   longer than three characters Porter-stemmed
//! - **Levenshtein**: character edit distance
//! - **Exact match**: equality after trimming and lowercasing
//!
//! The batch forms average the per-pair scores.

use ragscope_core::{Batch, EvalError, MetricTable, Result};
use rust_stemmers::{Algorithm, Stemmer};
use std::collections::HashMap;
use std::time::Instant;
use tracing::info;

const BLEU_MAX_N: usize = 4;
const BLEU_EPSILON: f64 = 0.1;
const ROUGE_STEM_MIN_LEN: usize = 4;

/// Per-pair ROUGE F-measures
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct RougeScores {
    pub rouge1: f64,
    pub rouge2: f64,
    pub rouge_l: f64,
}

/// BLEU tokens: whitespace split, case preserved
fn bleu_tokens(text: &str) -> Vec<&str> {
    text.split_whitespace().collect()
}

/// ROUGE tokens: lowercase, anything outside `[a-z0-9]` separates tokens.
/// Short words are kept as-is, longer ones are stemmed.
fn rouge_tokens(text: &str, stemmer: &Stemmer) -> Vec<String> {
    text.to_lowercase()
        .split(|c: char| !c.is_ascii_alphanumeric())
        .filter(|s| !s.is_empty())
        .map(|token| {
            if token.len() >= ROUGE_STEM_MIN_LEN {
                stemmer.stem(token).into_owned()
            } else {
                token.to_string()
            }
        })
        .collect()
}

/// Count n-grams of a token sequence
fn ngram_counts<T: AsRef<str>>(tokens: &[T], n: usize) -> HashMap<Vec<&str>, usize> {
    let mut counts = HashMap::new();
    if n == 0 || tokens.len() < n {
        return counts;
    }
    for window in tokens.windows(n) {
        let gram: Vec<&str> = window.iter().map(AsRef::as_ref).collect();
        *counts.entry(gram).or_insert(0) += 1;
    }
    counts
}

/// Clipped overlap between candidate and reference n-gram counts
fn clipped_overlap(cand: &HashMap<Vec<&str>, usize>, reference: &HashMap<Vec<&str>, usize>) -> usize {
    cand.iter()
        .map(|(gram, count)| (*count).min(reference.get(gram).copied().unwrap_or(0)))
        .sum()
}

/// Sentence BLEU of `prediction` against a single `reference`
pub fn sentence_bleu(prediction: &str, reference: &str) -> f64 {
    let cand = bleu_tokens(prediction);
    let refs = bleu_tokens(reference);

    let mut log_sum = 0.0;
    let weight = 1.0 / BLEU_MAX_N as f64;

    for n in 1..=BLEU_MAX_N {
        let cand_counts = ngram_counts(&cand, n);
        let ref_counts = ngram_counts(&refs, n);
        let matches = clipped_overlap(&cand_counts, &ref_counts);
        let total = cand.len().saturating_sub(n - 1).max(1);

        // No unigram overlap at all scores zero
        if n == 1 && matches == 0 {
            return 0.0;
        }

        let precision = if matches == 0 {
            BLEU_EPSILON / total as f64
        } else {
            matches as f64 / total as f64
        };
        log_sum += weight * precision.ln();
    }

    let c = cand.len() as f64;
    let r = refs.len() as f64;
    let bp = if c > r {
        1.0
    } else {
        (1.0 - r / c).exp()
    };

    bp * log_sum.exp()
}

fn f_measure(overlap: usize, cand_total: usize, ref_total: usize) -> f64 {
    if overlap == 0 || cand_total == 0 || ref_total == 0 {
        return 0.0;
    }
    let precision = overlap as f64 / cand_total as f64;
    let recall = overlap as f64 / ref_total as f64;
    2.0 * precision * recall / (precision + recall)
}

fn rouge_n_tokens(cand: &[String], refs: &[String], n: usize) -> f64 {
    let cand_counts = ngram_counts(cand, n);
    let ref_counts = ngram_counts(refs, n);
    let overlap = clipped_overlap(&cand_counts, &ref_counts);
    f_measure(
        overlap,
        cand_counts.values().sum(),
        ref_counts.values().sum(),
    )
}

/// LCS length using DP with space optimization
fn lcs_length<T: PartialEq>(a: &[T], b: &[T]) -> usize {
    let (short, long) = if a.len() < b.len() { (a, b) } else { (b, a) };

    let mut prev = vec![0usize; short.len() + 1];
    let mut curr = vec![0usize; short.len() + 1];

    for i in 1..=long.len() {
        for j in 1..=short.len() {
            curr[j] = if long[i - 1] == short[j - 1] {
                prev[j - 1] + 1
            } else {
                prev[j].max(curr[j - 1])
            };
        }
        std::mem::swap(&mut prev, &mut curr);
    }

    prev[short.len()]
}

/// ROUGE-1, ROUGE-2 and ROUGE-L F-measures for one pair
pub fn rouge_pair(prediction: &str, reference: &str) -> RougeScores {
    let stemmer = Stemmer::create(Algorithm::English);
    let cand = rouge_tokens(prediction, &stemmer);
    let refs = rouge_tokens(reference, &stemmer);

    RougeScores {
        rouge1: rouge_n_tokens(&cand, &refs, 1),
        rouge2: rouge_n_tokens(&cand, &refs, 2),
        rouge_l: f_measure(lcs_length(&cand, &refs), cand.len(), refs.len()),
    }
}

/// Character-level Levenshtein distance (Unicode scalar values)
pub fn levenshtein(a: &str, b: &str) -> usize {
    let a: Vec<char> = a.chars().collect();
    let b: Vec<char> = b.chars().collect();
    if a.is_empty() {
        return b.len();
    }

    let mut prev: Vec<usize> = (0..=b.len()).collect();
    let mut curr = vec![0usize; b.len() + 1];

    for i in 1..=a.len() {
        curr[0] = i;
        for j in 1..=b.len() {
            let cost = usize::from(a[i - 1] != b[j - 1]);
            curr[j] = (prev[j] + 1).min(curr[j - 1] + 1).min(prev[j - 1] + cost);
        }
        std::mem::swap(&mut prev, &mut curr);
    }

    prev[b.len()]
}

pub fn is_exact_match(prediction: &str, reference: &str) -> bool {
    prediction.trim().to_lowercase() == reference.trim().to_lowercase()
}

fn check_pairs(predictions: &[String], references: &[String]) -> Result<()> {
    if predictions.len() != references.len() {
        return Err(EvalError::InvalidInput(format!(
            "{} predictions but {} references",
            predictions.len(),
            references.len()
        )));
    }
    if predictions.is_empty() {
        return Err(EvalError::InvalidInput(
            "no prediction/reference pairs".to_string(),
        ));
    }
    Ok(())
}

fn average<F>(predictions: &[String], references: &[String], score: F) -> Result<f64>
where
    F: Fn(&str, &str) -> f64,
{
    check_pairs(predictions, references)?;
    let total: f64 = predictions
        .iter()
        .zip(references)
        .map(|(p, r)| score(p, r))
        .sum();
    Ok(total / predictions.len() as f64)
}

/// Average sentence BLEU
pub fn bleu(predictions: &[String], references: &[String]) -> Result<f64> {
    average(predictions, references, sentence_bleu)
}

/// Average ROUGE F-measures
pub fn rouge(predictions: &[String], references: &[String]) -> Result<RougeScores> {
    check_pairs(predictions, references)?;
    let n = predictions.len() as f64;
    let sum = predictions
        .iter()
        .zip(references)
        .map(|(p, r)| rouge_pair(p, r))
        .fold(RougeScores::default(), |acc, s| RougeScores {
            rouge1: acc.rouge1 + s.rouge1,
            rouge2: acc.rouge2 + s.rouge2,
            rouge_l: acc.rouge_l + s.rouge_l,
        });
    Ok(RougeScores {
        rouge1: sum.rouge1 / n,
        rouge2: sum.rouge2 / n,
        rouge_l: sum.rouge_l / n,
    })
}

/// Average raw Levenshtein distance
pub fn edit_distance(predictions: &[String], references: &[String]) -> Result<f64> {
    average(predictions, references, |p, r| levenshtein(p, r) as f64)
}

/// Fraction of exact matches
pub fn exact_match(predictions: &[String], references: &[String]) -> Result<f64> {
    average(predictions, references, |p, r| {
        if is_exact_match(p, r) {
            1.0
        } else {
            0.0
        }
    })
}

/// Per-row lexical scores of answers against ground truths
#[derive(Debug, Clone, Default)]
pub struct LexicalEvaluator;

impl LexicalEvaluator {
    pub const METRICS: [&'static str; 6] =
        ["bleu", "rouge1", "rouge2", "rougeL", "levenshtein", "exact_match"];

    pub fn new() -> Self {
        Self
    }

    pub fn evaluate(&self, batch: &Batch) -> Result<MetricTable> {
        let start = Instant::now();
        let rows = batch.len();

        let mut bleu_col = Vec::with_capacity(rows);
        let mut rouge1_col = Vec::with_capacity(rows);
        let mut rouge2_col = Vec::with_capacity(rows);
        let mut rouge_l_col = Vec::with_capacity(rows);
        let mut lev_col = Vec::with_capacity(rows);
        let mut exact_col = Vec::with_capacity(rows);

        for (answer, truth) in batch.answers().iter().zip(batch.ground_truths()) {
            let rouge = rouge_pair(answer, truth);
            bleu_col.push(Some(sentence_bleu(answer, truth)));
            rouge1_col.push(Some(rouge.rouge1));
            rouge2_col.push(Some(rouge.rouge2));
            rouge_l_col.push(Some(rouge.rouge_l));
            lev_col.push(Some(levenshtein(answer, truth) as f64));
            exact_col.push(Some(if is_exact_match(answer, truth) { 1.0 } else { 0.0 }));
        }

        let table = MetricTable::from_columns(
            rows,
            Self::METRICS.into_iter().zip([
                bleu_col,
                rouge1_col,
                rouge2_col,
                rouge_l_col,
                lev_col,
                exact_col,
            ]),
        )?;

        info!(
            rows,
            duration_ms = start.elapsed().as_millis() as u64,
            "Lexical metrics computed"
        );
        Ok(table)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn strings(values: &[&str]) -> Vec<String> {
        values.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn test_exact_match() {
        assert_eq!(exact_match(&strings(&["Paris"]), &strings(&["paris"])).unwrap(), 1.0);
        assert_eq!(exact_match(&strings(&["Paris"]), &strings(&["London"])).unwrap(), 0.0);
        assert_eq!(
            exact_match(&strings(&["  Paris ", "Rome"]), &strings(&["paris", "Milan"])).unwrap(),
            0.5
        );
    }

    #[test]
    fn test_batch_forms_reject_bad_lengths() {
        assert!(matches!(
            bleu(&strings(&["a"]), &strings(&["a", "b"])),
            Err(EvalError::InvalidInput(_))
        ));
        assert!(matches!(exact_match(&[], &[]), Err(EvalError::InvalidInput(_))));
    }

    #[test]
    fn test_levenshtein() {
        assert_eq!(levenshtein("kitten", "sitting"), 3);
        assert_eq!(levenshtein("", "abc"), 3);
        assert_eq!(levenshtein("abc", ""), 3);
        assert_eq!(levenshtein("café", "cafe"), 1);
        assert_eq!(
            edit_distance(&strings(&["kitten", "same"]), &strings(&["sitting", "same"])).unwrap(),
            1.5
        );
    }

    #[test]
    fn test_bleu_identical_is_one() {
        let s = "the quick brown fox jumps over the lazy dog";
        assert!((sentence_bleu(s, s) - 1.0).abs() < 1e-12);
    }

    #[test]
    fn test_bleu_no_overlap_is_zero() {
        assert_eq!(sentence_bleu("alpha beta", "gamma delta"), 0.0);
        // case is preserved for BLEU
        assert_eq!(sentence_bleu("Paris", "paris"), 0.0);
    }

    #[test]
    fn test_bleu_smoothing_for_short_hypothesis() {
        // one token, matching: p1 = 1, p2..p4 = 0.1 / 1
        let score = sentence_bleu("Paris", "Paris");
        let expected = (0.25 * 0.1f64.ln() * 3.0).exp();
        assert!((score - expected).abs() < 1e-12);
    }

    #[test]
    fn test_bleu_brevity_penalty() {
        // four matching tokens against an eight-token reference
        let score = sentence_bleu("a b c d", "a b c d e f g h");
        let expected = (1.0f64 - 2.0).exp();
        assert!((score - expected).abs() < 1e-12);
    }

    #[test]
    fn test_rouge_scores() {
        let scores = rouge_pair("The cat sat on the mat.", "the cat was on the mat");
        // unigrams: cand {the:2, cat, sat, on, mat} ref {the:2, cat, was, on, mat}
        assert!((scores.rouge1 - 5.0 / 6.0).abs() < 1e-12);
        // bigrams overlap: "the cat", "on the", "the mat" -> 3 of 5
        assert!((scores.rouge2 - 0.6).abs() < 1e-12);
        // lcs: the cat on the mat -> 5 of 6
        assert!((scores.rouge_l - 5.0 / 6.0).abs() < 1e-12);
    }

    #[test]
    fn test_rouge_matches_inflected_forms() {
        let scores = rouge_pair("The cats are running", "the cat is runs");
        // the / cat / run match after stemming, are / is do not
        assert!((scores.rouge1 - 0.75).abs() < 1e-12);
        assert!((scores.rouge2 - 1.0 / 3.0).abs() < 1e-12);
        assert!((scores.rouge_l - 0.75).abs() < 1e-12);
    }

    #[test]
    fn test_rouge_empty_is_zero() {
        assert_eq!(rouge_pair("", "something"), RougeScores::default());
        assert_eq!(rouge_pair("!!!", "..."), RougeScores::default());
    }

    #[test]
    fn test_metrics_are_deterministic() {
        let p = strings(&["Paris is the capital of France", "Berlin"]);
        let r = strings(&["The capital of France is Paris", "Berlin is in Germany"]);
        assert_eq!(bleu(&p, &r).unwrap(), bleu(&p, &r).unwrap());
        assert_eq!(rouge(&p, &r).unwrap(), rouge(&p, &r).unwrap());
    }

    #[test]
    fn test_lexical_evaluator_columns() {
        let batch = Batch::new(
            strings(&["q1", "q2"]),
            strings(&["Paris", "the cat sat"]),
            strings(&["paris", "the cat sat"]),
            vec![vec![], vec![]],
        )
        .unwrap();

        let table = LexicalEvaluator::new().evaluate(&batch).unwrap();

        assert_eq!(table.rows(), 2);
        assert_eq!(table.names(), LexicalEvaluator::METRICS.to_vec());
        assert_eq!(table.value(0, "exact_match"), Some(1.0));
        assert_eq!(table.value(0, "levenshtein"), Some(1.0));
        assert_eq!(table.value(1, "rougeL"), Some(1.0));
        assert_eq!(table.present_cells(), table.cells());
    }
}
