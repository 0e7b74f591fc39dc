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

// Integration tests for the results API

use axum::{
    body::Body,
    http::{header, Request, StatusCode},
    Router,
};
use ragscope_core::{write_report_csv, Column, EvaluationReport, MetricFamily, MetricTable};
use ragscope_server::{api::AppState, build_router, config::DEFAULT_SUMMARY_METRICS};
use serde_json::Value;
use std::path::Path;
use tower::ServiceExt;

fn app(report_path: &Path) -> Router {
    let metrics = DEFAULT_SUMMARY_METRICS.iter().map(|m| m.to_string()).collect();
    build_router(AppState::new(report_path.to_path_buf(), metrics), true)
}

async fn get_json(app: Router, uri: &str) -> (StatusCode, Value) {
    let response = app
        .oneshot(Request::builder().uri(uri).body(Body::empty()).unwrap())
        .await
        .unwrap();
    let status = response.status();
    let body = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap();
    (status, serde_json::from_slice(&body).unwrap())
}

/// Ten rows, one of which lost its faithfulness score
fn sample_report() -> EvaluationReport {
    let rows = 10;
    let mut report = EvaluationReport::from_base(
        rows,
        vec![Column::text(
            "question",
            (0..rows).map(|i| Some(format!("question {}", i))).collect(),
        )],
    )
    .unwrap();

    let faithfulness: Vec<Option<f64>> = (0..rows)
        .map(|i| if i == 6 { None } else { Some(0.9) })
        .collect();
    report
        .append_family(
            MetricFamily::Rag,
            MetricTable::from_columns(rows, vec![("faithfulness", faithfulness)]).unwrap(),
        )
        .unwrap();
    report
        .append_family(
            MetricFamily::Nlp,
            MetricTable::from_columns(
                rows,
                vec![
                    ("bleu", vec![Some(0.25); rows]),
                    ("rougeL", vec![Some(0.5); rows]),
                ],
            )
            .unwrap(),
        )
        .unwrap();
    report
}

#[tokio::test]
async fn test_results_summary_and_rows() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("output_results.csv");
    write_report_csv(&path, &sample_report()).unwrap();

    let (status, json) = get_json(app(&path), "/api/results").await;
    assert_eq!(status, StatusCode::OK);

    let summary = &json["summary"];
    assert_eq!(summary["total_samples"], 10);
    assert!((summary["rag_faithfulness"].as_f64().unwrap() - 0.9).abs() < 1e-12);
    assert_eq!(summary["nlp_bleu"], 0.25);
    assert_eq!(summary["nlp_rougeL"], 0.5);
    // not computed in this run
    assert_eq!(summary["safety_toxicity"], 0.0);
    assert_eq!(summary["rag_context_recall"], 0.0);

    let data = json["data"].as_array().unwrap();
    assert_eq!(data.len(), 10);
    assert_eq!(data[3]["question"], "question 3");
    assert!(data[6]["rag_faithfulness"].is_null());
    assert_eq!(data[5]["rag_faithfulness"], 0.9);
}

#[tokio::test]
async fn test_missing_report_is_error_payload() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("output_results.csv");

    let (status, json) = get_json(app(&path), "/api/results").await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(json, serde_json::json!({"error": "Results file not found"}));
}

#[tokio::test]
async fn test_deleted_report_is_error_payload() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("output_results.csv");
    write_report_csv(&path, &sample_report()).unwrap();

    let (_, json) = get_json(app(&path), "/api/results").await;
    assert!(json.get("summary").is_some());

    std::fs::remove_file(&path).unwrap();
    let (status, json) = get_json(app(&path), "/api/results").await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(json["error"], "Results file not found");
}

#[tokio::test]
async fn test_unparseable_report_is_error_payload() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("output_results.csv");
    std::fs::write(&path, "question,nlp_bleu\nq,not-a-number\n").unwrap();

    let (status, json) = get_json(app(&path), "/api/results").await;
    assert_eq!(status, StatusCode::OK);
    assert!(json["error"].as_str().unwrap().contains("nlp_bleu"));
}

#[tokio::test]
async fn test_health() {
    let dir = tempfile::tempdir().unwrap();
    let (status, json) = get_json(app(&dir.path().join("missing.csv")), "/health").await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(json["status"], "healthy");
    assert_eq!(json["report_available"], false);
}

#[tokio::test]
async fn test_cors_allows_any_origin() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("output_results.csv");
    write_report_csv(&path, &sample_report()).unwrap();

    let response = app(&path)
        .oneshot(
            Request::builder()
                .uri("/api/results")
                .header(header::ORIGIN, "http://dashboard.example.com")
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(
        response.headers().get(header::ACCESS_CONTROL_ALLOW_ORIGIN).unwrap(),
        "*"
    );
}

#[tokio::test]
async fn test_cors_disabled_sends_no_allow_origin() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("output_results.csv");
    let metrics = DEFAULT_SUMMARY_METRICS.iter().map(|m| m.to_string()).collect();
    let app = build_router(AppState::new(path, metrics), false);

    let response = app
        .oneshot(
            Request::builder()
                .uri("/health")
                .header(header::ORIGIN, "http://dashboard.example.com")
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();

    assert!(response
        .headers()
        .get(header::ACCESS_CONTROL_ALLOW_ORIGIN)
        .is_none());
}
