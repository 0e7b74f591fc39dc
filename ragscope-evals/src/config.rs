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

//! Evaluation settings: judge, embedding model and execution limits
//!
//! Settings are read once, at the binary boundary, from an optional TOML file
//! and `RAGSCOPE_*` environment variables. Components only ever receive the
//! resolved values.

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::str::FromStr;
use std::sync::Arc;
use thiserror::Error;

use crate::bedrock::{
    bedrock_client, AwsCredentials, BedrockEmbeddings, BedrockJudge, DEFAULT_EMBEDDING_MODEL,
    DEFAULT_JUDGE_MODEL, DEFAULT_REGION,
};
use crate::llm_client::{AnthropicClient, EmbeddingClient, JudgeBackend, JudgeClient, OpenAIClient};
use crate::EvalConfig;

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Failed to read config file: {0}")]
    Io(#[from] std::io::Error),

    #[error("Failed to parse config file: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("Invalid configuration: {0}")]
    Invalid(String),
}

/// Model provider behind the judge or the embedding model
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Provider {
    #[default]
    Bedrock,
    Anthropic,
    OpenAI,
}

impl FromStr for Provider {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "bedrock" => Ok(Provider::Bedrock),
            "anthropic" => Ok(Provider::Anthropic),
            "openai" => Ok(Provider::OpenAI),
            other => Err(ConfigError::Invalid(format!("unknown provider '{}'", other))),
        }
    }
}

/// `[judge]` table
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct JudgeSettings {
    pub provider: Provider,
    pub model: String,
    /// AWS region for Bedrock
    pub region: String,
    /// API key for Anthropic or OpenAI
    pub api_key: Option<String>,
    pub aws_access_key_id: Option<String>,
    pub aws_secret_access_key: Option<String>,
    pub aws_session_token: Option<String>,
    /// Override the provider's API endpoint
    pub base_url: Option<String>,
}

impl Default for JudgeSettings {
    fn default() -> Self {
        Self {
            provider: Provider::Bedrock,
            model: DEFAULT_JUDGE_MODEL.to_string(),
            region: DEFAULT_REGION.to_string(),
            api_key: None,
            aws_access_key_id: None,
            aws_secret_access_key: None,
            aws_session_token: None,
            base_url: None,
        }
    }
}

/// `[embedding]` table. Region and AWS credentials are shared with the judge.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EmbeddingSettings {
    pub provider: Provider,
    pub model: String,
    /// Falls back to the judge's key when unset
    pub api_key: Option<String>,
    pub base_url: Option<String>,
}

impl Default for EmbeddingSettings {
    fn default() -> Self {
        Self {
            provider: Provider::Bedrock,
            model: DEFAULT_EMBEDDING_MODEL.to_string(),
            api_key: None,
            base_url: None,
        }
    }
}

/// Complete evaluation settings
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EvalSettings {
    pub judge: JudgeSettings,
    pub embedding: EmbeddingSettings,
    pub evaluation: EvalConfig,
}

impl EvalSettings {
    /// Load settings from a TOML file
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path)?;
        Ok(toml::from_str(&content)?)
    }

    /// Load settings with priority: env > file > defaults
    pub fn load(config_file: Option<PathBuf>) -> Result<Self, ConfigError> {
        let mut settings = match config_file {
            Some(path) if path.exists() => {
                tracing::info!("Loading evaluation settings from file: {:?}", path);
                Self::from_file(&path)?
            }
            Some(path) => {
                tracing::warn!("Config file not found: {:?}, using defaults", path);
                Self::default()
            }
            None => Self::default(),
        };

        settings.apply_env(|key| std::env::var(key).ok())?;
        Ok(settings)
    }

    /// Override settings from `RAGSCOPE_*` variables
    ///
    /// Supported variables:
    /// - RAGSCOPE_JUDGE_PROVIDER: bedrock | anthropic | openai
    /// - RAGSCOPE_JUDGE_MODEL, RAGSCOPE_JUDGE_BASE_URL
    /// - RAGSCOPE_EMBEDDING_PROVIDER, RAGSCOPE_EMBEDDING_MODEL
    /// - RAGSCOPE_REGION
    /// - RAGSCOPE_API_KEY
    /// - RAGSCOPE_AWS_ACCESS_KEY_ID, RAGSCOPE_AWS_SECRET_ACCESS_KEY, RAGSCOPE_AWS_SESSION_TOKEN
    /// - RAGSCOPE_MAX_CONCURRENT, RAGSCOPE_REQUEST_TIMEOUT (seconds), RAGSCOPE_MAX_RETRIES
    pub fn apply_env<F>(&mut self, lookup: F) -> Result<(), ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(provider) = lookup("RAGSCOPE_JUDGE_PROVIDER") {
            self.judge.provider = provider.parse()?;
        }
        if let Some(model) = lookup("RAGSCOPE_JUDGE_MODEL") {
            self.judge.model = model;
        }
        if let Some(url) = lookup("RAGSCOPE_JUDGE_BASE_URL") {
            self.judge.base_url = Some(url);
        }
        if let Some(provider) = lookup("RAGSCOPE_EMBEDDING_PROVIDER") {
            self.embedding.provider = provider.parse()?;
        }
        if let Some(model) = lookup("RAGSCOPE_EMBEDDING_MODEL") {
            self.embedding.model = model;
        }
        if let Some(region) = lookup("RAGSCOPE_REGION") {
            self.judge.region = region;
        }
        if let Some(key) = lookup("RAGSCOPE_API_KEY") {
            self.judge.api_key = Some(key);
        }
        if let Some(id) = lookup("RAGSCOPE_AWS_ACCESS_KEY_ID") {
            self.judge.aws_access_key_id = Some(id);
        }
        if let Some(secret) = lookup("RAGSCOPE_AWS_SECRET_ACCESS_KEY") {
            self.judge.aws_secret_access_key = Some(secret);
        }
        if let Some(token) = lookup("RAGSCOPE_AWS_SESSION_TOKEN") {
            self.judge.aws_session_token = Some(token);
        }
        if let Some(value) = lookup("RAGSCOPE_MAX_CONCURRENT") {
            self.evaluation.max_concurrent = parse_number("RAGSCOPE_MAX_CONCURRENT", &value)?;
        }
        if let Some(value) = lookup("RAGSCOPE_REQUEST_TIMEOUT") {
            self.evaluation.request_timeout_secs = parse_number("RAGSCOPE_REQUEST_TIMEOUT", &value)?;
        }
        if let Some(value) = lookup("RAGSCOPE_MAX_RETRIES") {
            self.evaluation.max_retries = parse_number("RAGSCOPE_MAX_RETRIES", &value)?;
        }
        Ok(())
    }

    /// Validate settings
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.evaluation.max_concurrent == 0 {
            return Err(ConfigError::Invalid("max_concurrent must be at least 1".into()));
        }
        if self.evaluation.request_timeout_secs == 0 {
            return Err(ConfigError::Invalid("request_timeout_secs must be at least 1".into()));
        }
        if self.judge.model.trim().is_empty() {
            return Err(ConfigError::Invalid("judge model is empty".into()));
        }
        Ok(())
    }

    fn aws_credentials(&self) -> Result<AwsCredentials, ConfigError> {
        match (&self.judge.aws_access_key_id, &self.judge.aws_secret_access_key) {
            (Some(id), Some(secret)) => Ok(AwsCredentials {
                access_key_id: id.clone(),
                secret_access_key: secret.clone(),
                session_token: self.judge.aws_session_token.clone(),
            }),
            _ => Err(ConfigError::Invalid(
                "bedrock requires aws_access_key_id and aws_secret_access_key".into(),
            )),
        }
    }

    fn judge_api_key(&self) -> Result<String, ConfigError> {
        self.judge.api_key.clone().ok_or_else(|| {
            ConfigError::Invalid(format!("{:?} judge requires an api_key", self.judge.provider))
        })
    }

    /// Build the judge client described by `[judge]`
    pub fn judge_client(&self) -> Result<JudgeClient, ConfigError> {
        let judge = &self.judge;
        let backend: Arc<dyn JudgeBackend> = match judge.provider {
            Provider::Bedrock => {
                let client = bedrock_client(&judge.region, self.aws_credentials()?);
                Arc::new(BedrockJudge::new(client, judge.model.clone()))
            }
            Provider::Anthropic => {
                let mut client = AnthropicClient::new(self.judge_api_key()?, judge.model.clone());
                if let Some(url) = &judge.base_url {
                    client = client.with_base_url(url.clone());
                }
                Arc::new(client)
            }
            Provider::OpenAI => {
                let mut client = OpenAIClient::new(self.judge_api_key()?, judge.model.clone());
                if let Some(url) = &judge.base_url {
                    client = client.with_base_url(url.clone());
                }
                Arc::new(client)
            }
        };
        Ok(JudgeClient::new(backend, self.evaluation.request_timeout()))
    }

    /// Build the embedding client described by `[embedding]`
    pub fn embedding_client(&self) -> Result<Arc<dyn EmbeddingClient>, ConfigError> {
        let embedding = &self.embedding;
        match embedding.provider {
            Provider::Bedrock => {
                let client = bedrock_client(&self.judge.region, self.aws_credentials()?);
                Ok(Arc::new(BedrockEmbeddings::new(client, embedding.model.clone())))
            }
            Provider::OpenAI => {
                let key = match embedding.api_key.clone() {
                    Some(key) => key,
                    None => self.judge_api_key()?,
                };
                let mut client = OpenAIClient::new(key, embedding.model.clone());
                if let Some(url) = &embedding.base_url {
                    client = client.with_base_url(url.clone());
                }
                Ok(Arc::new(client))
            }
            Provider::Anthropic => Err(ConfigError::Invalid(
                "anthropic does not provide an embedding model".into(),
            )),
        }
    }
}

fn parse_number<T: FromStr>(key: &str, value: &str) -> Result<T, ConfigError> {
    value
        .trim()
        .parse()
        .map_err(|_| ConfigError::Invalid(format!("{} must be a number, got '{}'", key, value)))
}
