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

//! Evaluation batches
//!
//! A [`Batch`] is four index-aligned sequences. Position is the only join key
//! across the pipeline, so the batch is validated once at construction and is
//! immutable afterwards.

use serde::{Deserialize, Serialize};

use crate::error::{EvalError, Result};
use crate::report::Column;

/// One unit under test
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EvaluationItem {
    pub question: String,
    pub answer: String,
    pub ground_truth: String,
    pub contexts: Vec<String>,
}

/// Index-aligned questions, answers, ground truths and retrieved contexts
#[derive(Debug, Clone, PartialEq)]
pub struct Batch {
    questions: Vec<String>,
    answers: Vec<String>,
    ground_truths: Vec<String>,
    contexts: Vec<Vec<String>>,
}

impl Batch {
    /// Build a batch, rejecting misaligned or empty input
    pub fn new(
        questions: Vec<String>,
        answers: Vec<String>,
        ground_truths: Vec<String>,
        contexts: Vec<Vec<String>>,
    ) -> Result<Self> {
        let n = questions.len();
        if answers.len() != n || ground_truths.len() != n || contexts.len() != n {
            return Err(EvalError::InvalidInput(format!(
                "misaligned batch: {} questions, {} answers, {} ground truths, {} contexts",
                n,
                answers.len(),
                ground_truths.len(),
                contexts.len()
            )));
        }
        if n == 0 {
            return Err(EvalError::InvalidInput("batch is empty".to_string()));
        }

        Ok(Self {
            questions,
            answers,
            ground_truths,
            contexts,
        })
    }

    /// Build a batch from per-item records
    pub fn from_items(items: Vec<EvaluationItem>) -> Result<Self> {
        let mut questions = Vec::with_capacity(items.len());
        let mut answers = Vec::with_capacity(items.len());
        let mut ground_truths = Vec::with_capacity(items.len());
        let mut contexts = Vec::with_capacity(items.len());

        for item in items {
            questions.push(item.question);
            answers.push(item.answer);
            ground_truths.push(item.ground_truth);
            contexts.push(item.contexts);
        }

        Self::new(questions, answers, ground_truths, contexts)
    }

    pub fn len(&self) -> usize {
        self.questions.len()
    }

    /// Always false for a constructed batch; kept for API symmetry with `len`
    pub fn is_empty(&self) -> bool {
        self.questions.is_empty()
    }

    pub fn questions(&self) -> &[String] {
        &self.questions
    }

    pub fn answers(&self) -> &[String] {
        &self.answers
    }

    pub fn ground_truths(&self) -> &[String] {
        &self.ground_truths
    }

    pub fn contexts(&self) -> &[Vec<String>] {
        &self.contexts
    }

    /// Borrow row `index` as an item view
    pub fn item(&self, index: usize) -> Option<EvaluationItem> {
        if index >= self.len() {
            return None;
        }
        Some(EvaluationItem {
            question: self.questions[index].clone(),
            answer: self.answers[index].clone(),
            ground_truth: self.ground_truths[index].clone(),
            contexts: self.contexts[index].clone(),
        })
    }

    /// Iterate rows in input order
    pub fn iter(&self) -> impl Iterator<Item = EvaluationItem> + '_ {
        (0..self.len()).filter_map(move |i| self.item(i))
    }

    /// The batch fields as report base columns. Contexts are stored as a JSON array.
    pub fn base_columns(&self) -> Vec<Column> {
        let contexts = self
            .contexts
            .iter()
            .map(|c| serde_json::to_string(c).ok())
            .collect();

        vec![
            Column::text("question", self.questions.iter().cloned().map(Some).collect()),
            Column::text("answer", self.answers.iter().cloned().map(Some).collect()),
            Column::text(
                "ground_truth",
                self.ground_truths.iter().cloned().map(Some).collect(),
            ),
            Column::text("contexts", contexts),
        ]
    }
}
