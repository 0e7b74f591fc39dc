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

//! Runs the enabled metric families over one batch and merges their tables
//! into a single [`EvaluationReport`].
//!
//! Families share no state and run concurrently. Merge order is fixed
//! (rag, safety, nlp) so the column layout does not depend on which family
//! finished first.

use ragscope_core::{Batch, Column, EvalError, EvaluationReport, MetricFamily, MetricTable, Result};
use serde::{Deserialize, Serialize};
use std::time::Instant;
use tracing::{error, info, warn};

use crate::config::{ConfigError, EvalSettings};
use crate::evaluators::{LexicalEvaluator, RetrievalQualityEvaluator, SafetyQualityEvaluator};

/// Which metric families to run
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct EvalOptions {
    pub include_rag: bool,
    pub include_safety: bool,
    pub include_nlp: bool,
}

impl Default for EvalOptions {
    fn default() -> Self {
        Self {
            include_rag: true,
            include_safety: true,
            include_nlp: true,
        }
    }
}

impl EvalOptions {
    fn includes(&self, family: MetricFamily) -> bool {
        match family {
            MetricFamily::Rag => self.include_rag,
            MetricFamily::Safety => self.include_safety,
            MetricFamily::Nlp => self.include_nlp,
        }
    }
}

pub struct EvaluationOrchestrator {
    rag: Option<RetrievalQualityEvaluator>,
    safety: Option<SafetyQualityEvaluator>,
    lexical: LexicalEvaluator,
    /// Families whose clients could not be built, reported when they run
    setup_errors: Vec<(MetricFamily, EvalError)>,
}

impl Default for EvaluationOrchestrator {
    fn default() -> Self {
        Self::new()
    }
}

impl EvaluationOrchestrator {
    /// Orchestrator with only the lexical family configured
    pub fn new() -> Self {
        Self {
            rag: None,
            safety: None,
            lexical: LexicalEvaluator::new(),
            setup_errors: Vec::new(),
        }
    }

    pub fn with_rag(mut self, evaluator: RetrievalQualityEvaluator) -> Self {
        self.rag = Some(evaluator);
        self
    }

    pub fn with_safety(mut self, evaluator: SafetyQualityEvaluator) -> Self {
        self.safety = Some(evaluator);
        self
    }

    /// Wire the enabled families from resolved settings.
    ///
    /// Only invalid execution limits fail here. A judge or embedding client
    /// that cannot be built (missing credentials, unsupported provider)
    /// leaves its families unconfigured; they are recorded as failed when
    /// evaluated and the other families still run.
    pub fn from_settings(
        settings: &EvalSettings,
        options: EvalOptions,
    ) -> std::result::Result<Self, ConfigError> {
        settings.validate()?;
        let mut orchestrator = Self::new();
        if !options.include_rag && !options.include_safety {
            return Ok(orchestrator);
        }

        let judge = match settings.judge_client() {
            Ok(judge) => judge,
            Err(e) => {
                for family in [MetricFamily::Rag, MetricFamily::Safety] {
                    if options.includes(family) {
                        orchestrator.setup_failed(family, &e);
                    }
                }
                return Ok(orchestrator);
            }
        };
        let config = settings.evaluation.clone();

        if options.include_rag {
            match settings.embedding_client() {
                Ok(embeddings) => {
                    orchestrator.rag = Some(RetrievalQualityEvaluator::new(
                        judge.clone(),
                        embeddings,
                        config.clone(),
                    ));
                }
                Err(e) => orchestrator.setup_failed(MetricFamily::Rag, &e),
            }
        }
        if options.include_safety {
            orchestrator.safety = Some(SafetyQualityEvaluator::new(judge, config));
        }
        Ok(orchestrator)
    }

    fn setup_failed(&mut self, family: MetricFamily, error: &ConfigError) {
        warn!(family = %family, error = %error, "Metric family cannot be configured");
        self.setup_errors.push((
            family,
            EvalError::InvalidInput(format!("{} family not configured: {}", family, error)),
        ));
    }

    fn unconfigured(&self, family: MetricFamily) -> EvalError {
        self.setup_errors
            .iter()
            .find(|(f, _)| *f == family)
            .map(|(_, e)| e.clone())
            .unwrap_or_else(|| {
                EvalError::InvalidInput(format!("no evaluator configured for family '{}'", family))
            })
    }

    /// Evaluate with the batch fields as base columns
    pub async fn evaluate_all(&self, batch: &Batch, options: EvalOptions) -> Result<EvaluationReport> {
        self.evaluate_with_base(batch, batch.base_columns(), options)
            .await
    }

    /// Evaluate with caller-supplied original columns as the base.
    ///
    /// Fails only when the base columns do not line up with the batch; family
    /// failures are recorded in the report instead.
    pub async fn evaluate_with_base(
        &self,
        batch: &Batch,
        base: Vec<Column>,
        options: EvalOptions,
    ) -> Result<EvaluationReport> {
        let start = Instant::now();
        let mut report = EvaluationReport::from_base(batch.len(), base)?;
        info!(
            rows = batch.len(),
            rag = options.include_rag,
            safety = options.include_safety,
            nlp = options.include_nlp,
            "Starting evaluation"
        );

        let rag = async {
            if !options.includes(MetricFamily::Rag) {
                return None;
            }
            Some(match &self.rag {
                Some(evaluator) => evaluator.evaluate(batch).await,
                None => Err(self.unconfigured(MetricFamily::Rag)),
            })
        };
        let safety = async {
            if !options.includes(MetricFamily::Safety) {
                return None;
            }
            Some(match &self.safety {
                Some(evaluator) => evaluator.evaluate(batch).await,
                None => Err(self.unconfigured(MetricFamily::Safety)),
            })
        };
        let nlp = async {
            if !options.includes(MetricFamily::Nlp) {
                return None;
            }
            Some(self.lexical.evaluate(batch))
        };

        let (rag, safety, nlp) = tokio::join!(rag, safety, nlp);

        for (family, outcome) in [
            (MetricFamily::Rag, rag),
            (MetricFamily::Safety, safety),
            (MetricFamily::Nlp, nlp),
        ] {
            if let Some(outcome) = outcome {
                merge_family(&mut report, family, outcome);
            }
        }

        info!(
            rows = report.rows(),
            columns = report.columns().len(),
            failed_families = report.failures().len(),
            duration_ms = start.elapsed().as_millis() as u64,
            "Evaluation complete"
        );
        Ok(report)
    }
}

fn merge_family(report: &mut EvaluationReport, family: MetricFamily, outcome: Result<MetricTable>) {
    let merged = outcome.and_then(|table| report.append_family(family, table));
    if let Err(e) = merged {
        error!(family = %family, kind = e.kind(), error = %e, "Metric family failed, dropping its columns");
        report.record_failure(family, &e);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::Provider;
    use crate::evaluators::test_doubles::{FixedEmbeddings, ScriptedJudge};
    use crate::llm_client::JudgeClient;
    use crate::EvalConfig;
    use std::sync::Arc;
    use std::time::Duration;

    fn config() -> EvalConfig {
        EvalConfig {
            retry_initial_delay_ms: 0,
            ..EvalConfig::default()
        }
    }

    fn client(judge: ScriptedJudge) -> JudgeClient {
        JudgeClient::new(Arc::new(judge), Duration::from_secs(5))
    }

    fn scripted() -> ScriptedJudge {
        ScriptedJudge::new()
            .fail("BROKEN", EvalError::JudgeResponse("unparseable".into()))
            // safety
            .on("Extract every opinion", r#"{"opinions": []}"#)
            .on("Break the following answer", r#"{"statements": []}"#)
            .on("evaluation methodology", r#"{"steps": ["Check for filler"]}"#)
            .on("Evaluate the test case", r#"{"score": 7}"#)
            // rag
            .on("atomic factual claims", r#"{"claims": []}"#)
            .on("noncommittal", r#"{"questions": ["What is it?"], "noncommittal": 1}"#)
            .on("useful in arriving", r#"{"verdicts": [{"useful": 1}]}"#)
            .on("attributed to the context", r#"{"classifications": [{"attributed": 1}]}"#)
    }

    fn orchestrator(judge: ScriptedJudge) -> EvaluationOrchestrator {
        let judge = client(judge);
        EvaluationOrchestrator::new()
            .with_rag(RetrievalQualityEvaluator::new(
                judge.clone(),
                Arc::new(FixedEmbeddings::default()),
                config(),
            ))
            .with_safety(SafetyQualityEvaluator::new(judge, config()))
    }

    fn batch(rows: usize, broken_row: Option<usize>) -> Batch {
        Batch::new(
            (0..rows).map(|i| format!("question {}", i)).collect(),
            (0..rows)
                .map(|i| {
                    if Some(i) == broken_row {
                        format!("BROKEN answer {}", i)
                    } else {
                        format!("answer {}", i)
                    }
                })
                .collect(),
            (0..rows).map(|i| format!("answer {}", i)).collect(),
            (0..rows).map(|i| vec![format!("context {}", i)]).collect(),
        )
        .unwrap()
    }

    #[tokio::test]
    async fn test_all_families_in_fixed_order() {
        let report = orchestrator(scripted())
            .evaluate_all(&batch(3, None), EvalOptions::default())
            .await
            .unwrap();

        assert_eq!(report.rows(), 3);
        assert!(report.failures().is_empty());
        assert_eq!(
            report.column_names(),
            vec![
                "question",
                "answer",
                "ground_truth",
                "contexts",
                "rag_faithfulness",
                "rag_answer_relevancy",
                "rag_context_precision",
                "rag_context_recall",
                "safety_bias",
                "safety_toxicity",
                "safety_answer_relevancy",
                "safety_conciseness",
                "nlp_bleu",
                "nlp_rouge1",
                "nlp_rouge2",
                "nlp_rougeL",
                "nlp_levenshtein",
                "nlp_exact_match",
            ]
        );
        assert_eq!(report.column("nlp_exact_match").unwrap().numeric_value(2), Some(1.0));
        assert_eq!(report.column("safety_conciseness").unwrap().numeric_value(0), Some(0.7));
        assert_eq!(report.column("question").unwrap().text_value(1), Some("question 1".into()));
    }

    #[tokio::test]
    async fn test_skipped_family_contributes_no_columns() {
        let options = EvalOptions {
            include_rag: false,
            ..EvalOptions::default()
        };
        let report = orchestrator(scripted())
            .evaluate_all(&batch(2, None), options)
            .await
            .unwrap();

        assert_eq!(report.family_columns(MetricFamily::Rag).count(), 0);
        assert_eq!(report.family_columns(MetricFamily::Safety).count(), 4);
        assert_eq!(report.family_columns(MetricFamily::Nlp).count(), 6);
    }

    #[tokio::test]
    async fn test_one_failed_item_among_ten() {
        let options = EvalOptions {
            include_rag: false,
            ..EvalOptions::default()
        };
        let report = orchestrator(scripted())
            .evaluate_all(&batch(10, Some(6)), options)
            .await
            .unwrap();

        let bias = report.column("safety_bias").unwrap();
        let values = bias.numeric_values().unwrap();
        assert_eq!(values.iter().filter(|v| v.is_some()).count(), 9);
        assert_eq!(values[6], None);

        let summary = report.summary();
        assert_eq!(summary.total_samples, 10);
        assert_eq!(summary.get("safety_bias"), Some(Some(0.0)));
        let conciseness = summary.get("safety_conciseness").flatten().unwrap();
        assert!((conciseness - 0.7).abs() < 1e-9);
        assert!(report.records()[6]["safety_bias"].is_null());
    }

    #[tokio::test]
    async fn test_family_outage_is_recorded_and_others_complete() {
        let report = orchestrator(ScriptedJudge::unavailable())
            .evaluate_all(&batch(2, None), EvalOptions::default())
            .await
            .unwrap();

        let failed: Vec<_> = report.failures().iter().map(|f| f.family).collect();
        assert_eq!(failed, vec![MetricFamily::Rag, MetricFamily::Safety]);
        assert!(report.failures().iter().all(|f| f.kind == "judge_unavailable"));
        assert_eq!(report.family_columns(MetricFamily::Rag).count(), 0);
        assert_eq!(report.family_columns(MetricFamily::Safety).count(), 0);
        assert_eq!(report.family_columns(MetricFamily::Nlp).count(), 6);
    }

    #[tokio::test]
    async fn test_unconfigured_family_is_a_failure() {
        let report = EvaluationOrchestrator::new()
            .evaluate_all(&batch(1, None), EvalOptions::default())
            .await
            .unwrap();

        assert_eq!(report.failures().len(), 2);
        assert!(report.failures().iter().all(|f| f.kind == "invalid_input"));
        assert_eq!(report.family_columns(MetricFamily::Nlp).count(), 6);
    }

    fn anthropic_judge_settings() -> EvalSettings {
        let mut settings = EvalSettings::default();
        settings.judge.provider = Provider::Anthropic;
        settings.judge.model = "claude-3-haiku-20240307".into();
        settings.judge.api_key = Some("sk-ant-test".into());
        settings
    }

    #[tokio::test]
    async fn test_unbuildable_embeddings_only_drop_rag() {
        // default embedding provider is bedrock, and no AWS keys are set
        let settings = anthropic_judge_settings();
        let orchestrator = EvaluationOrchestrator::from_settings(&settings, EvalOptions::default()).unwrap();
        assert!(orchestrator.rag.is_none());
        assert!(orchestrator.safety.is_some());

        let options = EvalOptions {
            include_safety: false,
            ..EvalOptions::default()
        };
        let report = orchestrator.evaluate_all(&batch(2, None), options).await.unwrap();

        assert_eq!(report.failures().len(), 1);
        assert_eq!(report.failures()[0].family, MetricFamily::Rag);
        assert!(report.failures()[0].message.contains("aws_access_key_id"));
        assert_eq!(report.family_columns(MetricFamily::Nlp).count(), 6);
    }

    #[test]
    fn test_rag_disabled_never_builds_embeddings() {
        let settings = anthropic_judge_settings();
        let options = EvalOptions {
            include_rag: false,
            ..EvalOptions::default()
        };
        let orchestrator = EvaluationOrchestrator::from_settings(&settings, options).unwrap();

        assert!(orchestrator.rag.is_none());
        assert!(orchestrator.safety.is_some());
        assert!(orchestrator.setup_errors.is_empty());
    }

    #[test]
    fn test_unbuildable_judge_marks_both_llm_families() {
        let orchestrator =
            EvaluationOrchestrator::from_settings(&EvalSettings::default(), EvalOptions::default())
                .unwrap();

        assert!(orchestrator.rag.is_none());
        assert!(orchestrator.safety.is_none());
        let families: Vec<_> = orchestrator.setup_errors.iter().map(|(f, _)| *f).collect();
        assert_eq!(families, vec![MetricFamily::Rag, MetricFamily::Safety]);
    }

    #[test]
    fn test_invalid_limits_still_fail_setup() {
        let mut settings = anthropic_judge_settings();
        settings.evaluation.max_concurrent = 0;
        assert!(EvaluationOrchestrator::from_settings(&settings, EvalOptions::default()).is_err());
    }

    #[tokio::test]
    async fn test_misaligned_base_columns_are_rejected() {
        let base = vec![Column::text("id", vec![Some("1".into())])];
        let err = EvaluationOrchestrator::new()
            .evaluate_with_base(&batch(2, None), base, EvalOptions::default())
            .await
            .unwrap_err();
        assert!(matches!(err, EvalError::InvalidInput(_)));
    }
}
