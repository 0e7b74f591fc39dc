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

//! Read-only projection of the persisted evaluation report

use axum::{extract::State, Json};
use ragscope_core::{read_report_csv, EvaluationReport, Summary};
use serde::Serialize;
use serde_json::{Map, Value};
use tracing::{debug, warn};

use crate::api::{ApiError, AppState};

#[derive(Debug, Serialize)]
pub struct ResultsResponse {
    pub summary: Summary,
    pub data: Vec<Map<String, Value>>,
}

impl ResultsResponse {
    pub fn from_report(report: &EvaluationReport, summary_metrics: &[String]) -> Self {
        Self {
            summary: Summary::for_metrics(report, summary_metrics),
            data: report.records(),
        }
    }
}

/// GET /api/results - summary means plus every row of the report
///
/// The artifact is re-read on every request so a finished evaluation run is
/// picked up without restarting the server.
pub async fn get_results(State(state): State<AppState>) -> Result<Json<ResultsResponse>, ApiError> {
    let path = state.report_path.clone();
    if !path.exists() {
        debug!(path = %path.display(), "Results file not found");
        return Err(ApiError::ResultsUnavailable("Results file not found".to_string()));
    }

    let report = tokio::task::spawn_blocking(move || read_report_csv(&path))
        .await
        .map_err(|e| ApiError::Internal(e.to_string()))?
        .map_err(|e| {
            warn!(error = %e, "Failed to read results file");
            ApiError::ResultsUnavailable(e.to_string())
        })?;

    debug!(rows = report.rows(), "Serving results");
    Ok(Json(ResultsResponse::from_report(
        &report,
        &state.summary_metrics,
    )))
}

#[cfg(test)]
mod tests {
    use super::*;
    use ragscope_core::{Column, MetricFamily, MetricTable};

    #[test]
    fn test_summary_uses_configured_metrics() {
        let mut report = EvaluationReport::from_base(
            2,
            vec![Column::text("question", vec![Some("a".into()), Some("b".into())])],
        )
        .unwrap();
        report
            .append_family(
                MetricFamily::Nlp,
                MetricTable::from_columns(2, vec![("bleu", vec![Some(0.5), None])]).unwrap(),
            )
            .unwrap();

        let metrics = vec!["nlp_bleu".to_string(), "rag_faithfulness".to_string()];
        let response = ResultsResponse::from_report(&report, &metrics);
        let json = serde_json::to_value(&response).unwrap();

        assert_eq!(json["summary"]["total_samples"], 2);
        assert_eq!(json["summary"]["nlp_bleu"], 0.5);
        assert_eq!(json["summary"]["rag_faithfulness"], 0.0);
        assert!(json["data"][1]["nlp_bleu"].is_null());
        assert_eq!(json["data"][0]["question"], "a");
    }
}
