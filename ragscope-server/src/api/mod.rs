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

//! HTTP API handlers

pub mod health;
pub mod results;

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde::Serialize;
use std::path::PathBuf;
use std::sync::Arc;
use thiserror::Error;

pub use health::health_check;
pub use results::get_results;

/// API error type
///
/// Every variant renders as `{"error": "..."}`. Dashboard clients poll the
/// results endpoint and branch on the payload, so errors keep HTTP 200.
#[derive(Error, Debug)]
pub enum ApiError {
    #[error("{0}")]
    ResultsUnavailable(String),

    #[error("Internal server error: {0}")]
    Internal(String),
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        (
            StatusCode::OK,
            Json(ErrorResponse {
                error: self.to_string(),
            }),
        )
            .into_response()
    }
}

#[derive(Serialize)]
struct ErrorResponse {
    error: String,
}

/// Shared application state
#[derive(Clone)]
pub struct AppState {
    pub report_path: PathBuf,
    pub summary_metrics: Arc<Vec<String>>,
}

impl AppState {
    pub fn new(report_path: PathBuf, summary_metrics: Vec<String>) -> Self {
        Self {
            report_path,
            summary_metrics: Arc::new(summary_metrics),
        }
    }
}
