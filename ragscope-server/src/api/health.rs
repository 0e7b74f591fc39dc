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

use axum::{extract::State, response::IntoResponse, Json};
use serde::Serialize;
use tracing::debug;

use crate::api::AppState;

/// Health check response structure
#[derive(Debug, Serialize)]
pub struct HealthResponse {
    pub status: &'static str,
    pub service: &'static str,
    pub version: &'static str,
    pub report_available: bool,
}

/// GET /health - liveness; reports whether a results artifact exists
pub async fn health_check(State(state): State<AppState>) -> impl IntoResponse {
    debug!("Health check requested");
    Json(HealthResponse {
        status: "healthy",
        service: "ragscope-server",
        version: env!("CARGO_PKG_VERSION"),
        report_available: state.report_path.exists(),
    })
}
