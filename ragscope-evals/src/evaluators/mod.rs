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

//! Built-in metric families

pub mod g_eval;
pub mod ragas;
pub mod reference;
pub mod runner;
pub mod safety;
pub mod toxicity;

#[cfg(test)]
pub(crate) mod test_doubles;

pub use g_eval::{RubricMetric, RubricSpec, CONCISENESS};
pub use ragas::{average_precision, RagSample, RetrievalQualityEvaluator};
pub use reference::{
    bleu, edit_distance, exact_match, is_exact_match, levenshtein, rouge, rouge_pair,
    sentence_bleu, LexicalEvaluator, RougeScores,
};
pub use runner::{Cell, CellResults, CellRunner};
pub use safety::{
    statement_relevancy, PassRule, SafetyMetricKind, SafetyMetricSpec, SafetyQualityEvaluator,
    SafetyTestCase, TestCaseField, SAFETY_METRICS,
};
pub use toxicity::{extract_opinions, opinion_score, OpinionCheck};
