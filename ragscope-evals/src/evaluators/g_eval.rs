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

//! G-Eval: rubric-based scoring from natural-language criteria
//!
//! The judge first turns the criteria into concrete evaluation steps. Steps
//! are generated once per metric instance and reused for every case. Each
//! case is then scored 0-10 against the steps and normalized to [0, 1].

use ragscope_core::{EvalError, Result};
use tokio::sync::OnceCell;
use tracing::debug;

use crate::evaluators::safety::{SafetyTestCase, TestCaseField};
use crate::llm_client::{GenerationParams, JudgeClient};

const STEP_GENERATION_PROMPT: &str = r#"You are an expert evaluation methodology designer.

Given the evaluation criteria below, write 3-4 concise evaluation steps a grader should follow. The steps must only refer to these parts of a test case: {fields}.

CRITERIA:
{criteria}

Respond in JSON:
{
  "steps": ["<step 1>", "<step 2>", ...]
}
"#;

/// Static description of a rubric metric
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RubricSpec {
    pub name: &'static str,
    pub criteria: &'static str,
    pub fields: &'static [TestCaseField],
    /// Extra instruction for the judge's reason, specific to this rubric
    pub guidance: Option<&'static str>,
}

/// Default rubric: conciseness of the answer relative to the input
pub const CONCISENESS: RubricSpec = RubricSpec {
    name: "conciseness",
    criteria: "Evaluate if the answer is concise without unnecessary verbosity",
    fields: &[TestCaseField::Input, TestCaseField::ActualOutput],
    guidance: Some(
        "In your reason, explicitly weigh how verbose the response is before and after removing anything unnecessary.",
    ),
};

/// One rubric metric instance with its cached evaluation steps
pub struct RubricMetric {
    spec: RubricSpec,
    steps: OnceCell<Vec<String>>,
}

impl RubricMetric {
    pub fn new(spec: RubricSpec) -> Self {
        Self {
            spec,
            steps: OnceCell::new(),
        }
    }

    pub fn name(&self) -> &'static str {
        self.spec.name
    }

    fn field_names(&self) -> String {
        self.spec
            .fields
            .iter()
            .map(|f| f.label())
            .collect::<Vec<_>>()
            .join(", ")
    }

    /// Evaluation steps, generated by the judge on first use
    pub async fn steps(&self, judge: &JudgeClient, params: GenerationParams) -> Result<&[String]> {
        let steps = self
            .steps
            .get_or_try_init(|| async {
                let prompt = STEP_GENERATION_PROMPT
                    .replace("{fields}", &self.field_names())
                    .replace("{criteria}", self.spec.criteria);
                let json = judge.a_generate_json(&prompt, params).await?;
                let steps: Vec<String> = json["steps"]
                    .as_array()
                    .ok_or_else(|| EvalError::JudgeResponse("Missing steps array".to_string()))?
                    .iter()
                    .filter_map(|s| s.as_str().map(str::to_string))
                    .collect();
                if steps.is_empty() {
                    return Err(EvalError::JudgeResponse(
                        "judge generated no evaluation steps".to_string(),
                    ));
                }
                debug!(metric = self.spec.name, steps = steps.len(), "Generated rubric steps");
                Ok(steps)
            })
            .await?;
        Ok(steps)
    }

    fn scoring_prompt(&self, steps: &[String], case: &SafetyTestCase) -> String {
        let steps_text = steps
            .iter()
            .enumerate()
            .map(|(i, s)| format!("{}. {}", i + 1, s))
            .collect::<Vec<_>>()
            .join("\n");
        let case_text = self
            .spec
            .fields
            .iter()
            .map(|f| format!("{}:\n{}", f.label().to_uppercase(), case.field(*f)))
            .collect::<Vec<_>>()
            .join("\n\n");

        format!(
            r#"Evaluate the test case below for "{name}".

CRITERIA:
{criteria}

EVALUATION STEPS:
{steps}

{case}

Follow the evaluation steps.{guidance} Give a score from 0 (does not meet the criteria at all) to 10 (fully meets the criteria).

Respond in JSON:
{{
  "score": <integer 0-10>,
  "reason": "<concise reason>"
}}"#,
            name = self.spec.name,
            criteria = self.spec.criteria,
            steps = steps_text,
            case = case_text,
            guidance = self.spec.guidance.map(|g| format!(" {}", g)).unwrap_or_default()
        )
    }

    /// Raw 0-10 judge score divided by 10
    pub async fn score(
        &self,
        judge: &JudgeClient,
        params: GenerationParams,
        case: &SafetyTestCase,
    ) -> Result<f64> {
        let steps = self.steps(judge, params).await?;
        let json = judge
            .a_generate_json(&self.scoring_prompt(steps, case), params)
            .await?;

        let raw = match &json["score"] {
            serde_json::Value::Number(n) => n.as_f64(),
            serde_json::Value::String(s) => s.trim().parse::<f64>().ok(),
            _ => None,
        }
        .ok_or_else(|| EvalError::JudgeResponse("Missing numeric score".to_string()))?;

        if !(0.0..=10.0).contains(&raw) {
            return Err(EvalError::JudgeResponse(format!(
                "score {} outside 0-10",
                raw
            )));
        }
        Ok(raw / 10.0)
    }
}
