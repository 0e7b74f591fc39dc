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

//! RAGAS (Retrieval-Augmented Generation Assessment) metrics
//!
//! Retrieval and generation quality of a RAG system, one score per row:
//! - Faithfulness: share of the answer's claims supported by the contexts
//! - Answer Relevancy: similarity of reverse-generated questions to the question
//! - Context Precision: rank-weighted usefulness of the retrieved contexts
//! - Context Recall: share of ground-truth sentences attributable to the contexts

use ragscope_core::{Batch, EvalError, MetricFamily, MetricTable, Result};
use std::sync::Arc;
use std::time::Instant;
use tracing::info;

use crate::evaluators::runner::CellRunner;
use crate::llm_client::{cosine_similarity, with_timeout, EmbeddingClient, GenerationParams, JudgeClient};
use crate::EvalConfig;

/// One row of a retrieval-quality evaluation
#[derive(Debug, Clone, PartialEq)]
pub struct RagSample {
    pub question: String,
    pub answer: String,
    pub ground_truth: String,
    pub contexts: Vec<String>,
}

impl RagSample {
    pub fn from_batch(batch: &Batch) -> Vec<RagSample> {
        batch
            .iter()
            .map(|item| RagSample {
                question: item.question,
                answer: item.answer,
                ground_truth: item.ground_truth,
                contexts: item.contexts,
            })
            .collect()
    }

    fn joined_contexts(&self) -> String {
        self.contexts
            .iter()
            .enumerate()
            .map(|(i, c)| format!("[Context {}]: {}", i, c))
            .collect::<Vec<_>>()
            .join("\n\n")
    }
}

const CLAIM_EXTRACTION_PROMPT: &str = r#"Extract all atomic factual claims from the following answer.

QUESTION:
{question}

ANSWER:
{answer}

Rules:
- Extract ONLY factual claims (not opinions, hedged statements, or questions)
- Each claim should be self-contained and independently verifiable
- Decompose compound claims into atomic parts

Respond in JSON:
{
  "claims": ["<factual statement>", ...]
}

If there are no factual claims, respond with: {"claims": []}
"#;

const CLAIM_VERIFICATION_PROMPT: &str = r#"Verify each claim against the provided context.

CONTEXT:
{context}

CLAIMS TO VERIFY:
{claims}

For each claim, in the given order, answer 1 if the claim can be directly
inferred from the context and 0 otherwise.

Respond in JSON:
{
  "verdicts": [
    {"claim": "<the claim>", "verdict": 1, "reason": "<short reason>"},
    ...
  ]
}
"#;

const CONTEXT_RECALL_PROMPT: &str = r#"Given a question, a context and a reference answer, analyze each sentence of the reference answer and classify whether it can be attributed to the context.

QUESTION:
{question}

CONTEXT:
{context}

REFERENCE ANSWER:
{ground_truth}

Respond in JSON:
{
  "classifications": [
    {"statement": "<sentence from the reference answer>", "attributed": 1, "reason": "..."},
    ...
  ]
}
Use 1 when the sentence is supported by the context and 0 otherwise.
"#;

/// Retrieval/generation quality evaluator (family `rag`)
pub struct RetrievalQualityEvaluator {
    judge: JudgeClient,
    embeddings: Arc<dyn EmbeddingClient>,
    config: EvalConfig,
    params: GenerationParams,
    question_count: usize,
}

impl RetrievalQualityEvaluator {
    pub const METRICS: [&'static str; 4] = [
        "faithfulness",
        "answer_relevancy",
        "context_precision",
        "context_recall",
    ];

    pub fn new(judge: JudgeClient, embeddings: Arc<dyn EmbeddingClient>, config: EvalConfig) -> Self {
        Self {
            judge,
            embeddings,
            config,
            params: GenerationParams::retrieval(),
            question_count: 3,
        }
    }

    /// Number of reverse-generated questions for answer relevancy
    pub fn with_question_count(mut self, count: usize) -> Self {
        self.question_count = count.max(1);
        self
    }

    pub fn with_params(mut self, params: GenerationParams) -> Self {
        self.params = params;
        self
    }

    /// Score every row. A family-level judge outage is returned as an error;
    /// any other per-item failure becomes a missing value.
    pub async fn evaluate(&self, batch: &Batch) -> Result<MetricTable> {
        let start = Instant::now();
        let samples = RagSample::from_batch(batch);
        let samples = &samples;
        info!(rows = samples.len(), judge = self.judge.model_name(), "Running retrieval-quality metrics");

        let runner = CellRunner::new(MetricFamily::Rag, &self.config);
        let results = runner
            .run(samples.len(), &Self::METRICS, |cell| async move {
                self.score(&samples[cell.row], cell.metric).await
            })
            .await;

        let failed = results.failed();
        let table = results.into_table()?;
        info!(
            rows = table.rows(),
            failed,
            duration_ms = start.elapsed().as_millis() as u64,
            "Retrieval-quality metrics complete"
        );
        Ok(table)
    }

    pub async fn score(&self, sample: &RagSample, metric: &str) -> Result<f64> {
        match metric {
            "faithfulness" => self.faithfulness(sample).await,
            "answer_relevancy" => self.answer_relevancy(sample).await,
            "context_precision" => self.context_precision(sample).await,
            "context_recall" => self.context_recall(sample).await,
            other => Err(EvalError::InvalidInput(format!("unknown rag metric '{}'", other))),
        }
    }

    async fn judge_json(&self, prompt: &str) -> Result<serde_json::Value> {
        self.judge.a_generate_json(prompt, self.params).await
    }

    /// Supported claims / claims; an answer without claims is faithful
    pub async fn faithfulness(&self, sample: &RagSample) -> Result<f64> {
        let prompt = CLAIM_EXTRACTION_PROMPT
            .replace("{question}", &sample.question)
            .replace("{answer}", &sample.answer);
        let claims = string_list(&self.judge_json(&prompt).await?, "claims")?;
        if claims.is_empty() {
            return Ok(1.0);
        }

        let claims_formatted = claims
            .iter()
            .enumerate()
            .map(|(i, c)| format!("{}. {}", i + 1, c))
            .collect::<Vec<_>>()
            .join("\n");
        let prompt = CLAIM_VERIFICATION_PROMPT
            .replace("{context}", &sample.joined_contexts())
            .replace("{claims}", &claims_formatted);
        let verdicts = binary_verdicts(&self.judge_json(&prompt).await?, "verdicts", "verdict")?;

        let supported = verdicts.iter().take(claims.len()).filter(|v| **v).count();
        Ok(supported as f64 / claims.len() as f64)
    }

    /// Mean cosine similarity between the question and questions generated
    /// back from the answer; 0 for a non-committal answer
    pub async fn answer_relevancy(&self, sample: &RagSample) -> Result<f64> {
        let prompt = format!(
            r#"Generate {n} different questions that the given answer would respond to, and identify whether the answer is noncommittal. An answer is noncommittal when it is evasive, vague or ambiguous, e.g. "I don't know" or "I'm not sure".

ANSWER:
{answer}

Respond in JSON:
{{
  "questions": ["<question>", ...],
  "noncommittal": <0 or 1>
}}"#,
            n = self.question_count,
            answer = sample.answer
        );
        let json = self.judge_json(&prompt).await?;
        let noncommittal = flag(&json["noncommittal"]);
        let questions = string_list(&json, "questions")?;
        if questions.is_empty() {
            return Err(EvalError::JudgeResponse(
                "judge generated no questions".to_string(),
            ));
        }
        if noncommittal {
            return Ok(0.0);
        }

        let timeout = self.judge.timeout();
        let original = with_timeout(timeout, "embedding", self.embeddings.embed(&sample.question)).await?;
        let generated =
            with_timeout(timeout, "embedding", self.embeddings.embed_batch(&questions)).await?;

        let total: f64 = generated
            .iter()
            .map(|q| cosine_similarity(&original, q))
            .sum();
        Ok(total / generated.len() as f64)
    }

    /// Σ_k precision@k · v_k over the relevant contexts, in retrieval order
    pub async fn context_precision(&self, sample: &RagSample) -> Result<f64> {
        if sample.contexts.is_empty() {
            return Ok(0.0);
        }

        let prompt = format!(
            r#"Given a question, a reference answer and retrieved contexts, verify for each context whether it was useful in arriving at the reference answer.

QUESTION:
{question}

REFERENCE ANSWER:
{ground_truth}

RETRIEVED CONTEXTS (in order):
{contexts}

Respond in JSON with exactly one verdict per context, in the same order:
{{
  "verdicts": [
    {{"index": 0, "useful": 1, "reason": "..."}},
    ...
  ]
}}
Use 1 when the context was useful and 0 otherwise."#,
            question = sample.question,
            ground_truth = sample.ground_truth,
            contexts = sample.joined_contexts()
        );
        let verdicts = binary_verdicts(&self.judge_json(&prompt).await?, "verdicts", "useful")?;
        if verdicts.is_empty() {
            return Err(EvalError::JudgeResponse(
                "judge returned no context verdicts".to_string(),
            ));
        }

        Ok(average_precision(
            &verdicts[..verdicts.len().min(sample.contexts.len())],
        ))
    }

    /// Attributed ground-truth sentences / ground-truth sentences
    pub async fn context_recall(&self, sample: &RagSample) -> Result<f64> {
        let prompt = CONTEXT_RECALL_PROMPT
            .replace("{question}", &sample.question)
            .replace("{context}", &sample.joined_contexts())
            .replace("{ground_truth}", &sample.ground_truth);
        let attributed =
            binary_verdicts(&self.judge_json(&prompt).await?, "classifications", "attributed")?;
        if attributed.is_empty() {
            return Err(EvalError::JudgeResponse(
                "judge classified no ground-truth sentences".to_string(),
            ));
        }

        let hits = attributed.iter().filter(|v| **v).count();
        Ok(hits as f64 / attributed.len() as f64)
    }
}

/// Rank-aware precision: Σ_k (precision@k · v_k) / relevant, 0 when none relevant
pub fn average_precision(verdicts: &[bool]) -> f64 {
    let relevant = verdicts.iter().filter(|v| **v).count();
    if relevant == 0 {
        return 0.0;
    }

    let mut hits = 0usize;
    let mut sum = 0.0;
    for (k, useful) in verdicts.iter().enumerate() {
        if *useful {
            hits += 1;
            sum += hits as f64 / (k + 1) as f64;
        }
    }
    sum / relevant as f64
}

/// Accepts 1/0, true/false and "yes"/"no" style verdicts
fn flag(value: &serde_json::Value) -> bool {
    match value {
        serde_json::Value::Bool(b) => *b,
        serde_json::Value::Number(n) => n.as_f64().map(|f| f >= 0.5).unwrap_or(false),
        serde_json::Value::String(s) => {
            matches!(s.trim().to_lowercase().as_str(), "1" | "yes" | "true")
        }
        _ => false,
    }
}

fn string_list(json: &serde_json::Value, key: &str) -> Result<Vec<String>> {
    let items = json[key]
        .as_array()
        .ok_or_else(|| EvalError::JudgeResponse(format!("Missing {} array", key)))?;
    Ok(items
        .iter()
        .filter_map(|c| c.as_str())
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(str::to_string)
        .collect())
}

fn binary_verdicts(json: &serde_json::Value, key: &str, field: &str) -> Result<Vec<bool>> {
    let items = json[key]
        .as_array()
        .ok_or_else(|| EvalError::JudgeResponse(format!("Missing {} array", key)))?;
    Ok(items.iter().map(|item| flag(&item[field])).collect())
}
