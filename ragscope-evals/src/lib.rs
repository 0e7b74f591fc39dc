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

//! # RAGScope Evaluation Framework
//!
//! Scores question-answering batches with three metric families:
//!
//! - **rag**: faithfulness, answer relevancy, context precision and recall
//!   judged by an LLM plus an embedding model
//! - **safety**: bias, toxicity, statement relevancy and a rubric metric
//! - **nlp**: BLEU, ROUGE, Levenshtein and exact match, computed locally
//!
//! ## Example
//!
//! ```rust,ignore
//! use ragscope_core::Batch;
//! use ragscope_evals::{EvalOptions, EvalSettings, EvaluationOrchestrator};
//!
//! #[tokio::main]
//! async fn main() -> anyhow::Result<()> {
//!     let settings = EvalSettings::load(None)?;
//!     let options = EvalOptions::default();
//!     let orchestrator = EvaluationOrchestrator::from_settings(&settings, options)?;
//!
//!     let batch = Batch::new(questions, answers, ground_truths, contexts)?;
//!     let report = orchestrator.evaluate_all(&batch, options).await?;
//!     println!("{}", serde_json::to_string_pretty(&report.summary())?);
//!     Ok(())
//! }
//! ```

use serde::{Deserialize, Serialize};
use std::time::Duration;

pub mod bedrock;
pub mod config;
pub mod evaluators;
pub mod llm_client;
pub mod orchestrator;
pub mod retry;

pub use bedrock::{
    bedrock_client, AwsCredentials, BedrockEmbeddings, BedrockJudge, DEFAULT_EMBEDDING_MODEL,
    DEFAULT_JUDGE_MODEL, DEFAULT_REGION,
};
pub use config::{EmbeddingSettings, EvalSettings, JudgeSettings, Provider};
pub use evaluators::{
    LexicalEvaluator, RetrievalQualityEvaluator, SafetyQualityEvaluator, SAFETY_METRICS,
};
pub use llm_client::{
    cosine_similarity, extract_json, AnthropicClient, EmbeddingClient, GenerationParams,
    JudgeBackend, JudgeClient, LLMResponse, OpenAIClient, TokenUsage,
};
pub use orchestrator::{EvalOptions, EvaluationOrchestrator};
pub use retry::RetryPolicy;

/// Configuration for evaluation execution
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EvalConfig {
    /// Maximum number of concurrent judge calls per family
    pub max_concurrent: usize,

    /// Timeout per judge or embedding request in seconds
    pub request_timeout_secs: u64,

    /// Whether to retry transient failures
    pub retry_on_failure: bool,

    /// Maximum number of retries
    pub max_retries: u32,

    /// Delay before the first retry in milliseconds
    pub retry_initial_delay_ms: u64,
}

impl EvalConfig {
    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs)
    }

    pub fn retry_initial_delay(&self) -> Duration {
        Duration::from_millis(self.retry_initial_delay_ms)
    }
}

impl Default for EvalConfig {
    fn default() -> Self {
        Self {
            max_concurrent: 4,
            request_timeout_secs: 60,
            retry_on_failure: true,
            max_retries: 2,
            retry_initial_delay_ms: 500,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_eval_config_default() {
        let config = EvalConfig::default();
        assert_eq!(config.max_concurrent, 4);
        assert_eq!(config.request_timeout(), Duration::from_secs(60));
        assert_eq!(config.retry_initial_delay(), Duration::from_millis(500));
        assert!(config.retry_on_failure);
    }

    #[test]
    fn test_eval_config_partial_toml() {
        let config: EvalConfig = toml::from_str("max_concurrent = 8").unwrap();
        assert_eq!(config.max_concurrent, 8);
        assert_eq!(config.max_retries, 2);
    }
}
