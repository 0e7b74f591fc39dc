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

use anyhow::Result;
use serde::{Deserialize, Serialize};
use std::net::SocketAddr;
use std::path::{Path, PathBuf};

/// Metrics summarized by `GET /api/results` unless configured otherwise
pub const DEFAULT_SUMMARY_METRICS: [&str; 9] = [
    "rag_faithfulness",
    "rag_answer_relevancy",
    "rag_context_precision",
    "rag_context_recall",
    "nlp_bleu",
    "nlp_rougeL",
    "safety_bias",
    "safety_toxicity",
    "safety_conciseness",
];

/// Ragscope Server Configuration
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct ServerConfig {
    #[serde(default)]
    pub server: HttpServerConfig,
    #[serde(default)]
    pub report: ReportConfig,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct HttpServerConfig {
    /// HTTP API listen address (e.g., "127.0.0.1:8000")
    #[serde(default = "default_http_addr")]
    pub listen_addr: String,

    /// Enable CORS (allows every origin)
    #[serde(default = "default_enable_cors")]
    pub enable_cors: bool,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct ReportConfig {
    /// Path of the persisted evaluation report
    #[serde(default = "default_report_path")]
    pub path: PathBuf,

    /// Columns averaged into the summary, in response order
    #[serde(default = "default_summary_metrics")]
    pub summary_metrics: Vec<String>,
}

// Default values
fn default_http_addr() -> String {
    "127.0.0.1:8000".to_string()
}

fn default_enable_cors() -> bool {
    true
}

fn default_report_path() -> PathBuf {
    PathBuf::from("output_results.csv")
}

fn default_summary_metrics() -> Vec<String> {
    DEFAULT_SUMMARY_METRICS.iter().map(|m| m.to_string()).collect()
}

impl Default for HttpServerConfig {
    fn default() -> Self {
        Self {
            listen_addr: default_http_addr(),
            enable_cors: default_enable_cors(),
        }
    }
}

impl Default for ReportConfig {
    fn default() -> Self {
        Self {
            path: default_report_path(),
            summary_metrics: default_summary_metrics(),
        }
    }
}

impl ServerConfig {
    /// Load configuration from TOML file
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let content = std::fs::read_to_string(path)?;
        let config: Self = toml::from_str(&content)?;
        Ok(config)
    }

    /// Load configuration with priority: env > file > defaults
    pub fn load(config_file: Option<PathBuf>) -> Result<Self> {
        let mut config = if let Some(path) = config_file {
            if path.exists() {
                tracing::info!("Loading configuration from file: {:?}", path);
                Self::from_file(&path)?
            } else {
                tracing::warn!("Config file not found: {:?}, using defaults", path);
                Self::default()
            }
        } else {
            Self::default()
        };

        config.merge_with_env(|key| std::env::var(key).ok());
        Ok(config)
    }

    /// Override values from environment variables
    ///
    /// Supported environment variables:
    /// - RAGSCOPE_HTTP_ADDR: HTTP listen address (default: 127.0.0.1:8000)
    /// - RAGSCOPE_REPORT_PATH: Report artifact path (default: output_results.csv)
    /// - RAGSCOPE_ENABLE_CORS: Enable CORS (default: true)
    pub fn merge_with_env<F>(&mut self, lookup: F)
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(addr) = lookup("RAGSCOPE_HTTP_ADDR") {
            self.server.listen_addr = addr;
        }
        if let Some(path) = lookup("RAGSCOPE_REPORT_PATH") {
            self.report.path = PathBuf::from(path);
        }
        if let Some(cors) = lookup("RAGSCOPE_ENABLE_CORS") {
            self.server.enable_cors = cors.parse().unwrap_or(true);
        }
    }

    /// Parse listen address as SocketAddr
    pub fn socket_addr(&self) -> Result<SocketAddr> {
        Ok(self.server.listen_addr.parse()?)
    }

    /// Validate configuration
    pub fn validate(&self) -> Result<()> {
        self.socket_addr()?;

        if self.report.path.as_os_str().is_empty() {
            anyhow::bail!("Report path is empty");
        }
        if self.report.summary_metrics.iter().any(|m| m.trim().is_empty()) {
            anyhow::bail!("Summary metric names must not be empty");
        }

        Ok(())
    }
}
