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

//! AWS Bedrock backends: Anthropic-on-Bedrock judge and Titan embeddings
//!
//! Region and credentials are passed in explicitly; nothing here consults
//! the process environment or the shared AWS config files.

use async_trait::async_trait;
use aws_sdk_bedrockruntime::config::{BehaviorVersion, Credentials, Region};
use aws_sdk_bedrockruntime::error::{DisplayErrorContext, SdkError};
use aws_sdk_bedrockruntime::operation::invoke_model::InvokeModelError;
use aws_sdk_bedrockruntime::primitives::Blob;
use ragscope_core::{EvalError, Result};
use tracing::debug;

use crate::llm_client::{EmbeddingClient, GenerationParams, JudgeBackend, LLMResponse, TokenUsage};

pub const DEFAULT_JUDGE_MODEL: &str = "anthropic.claude-3-sonnet-20240229-v1:0";
pub const DEFAULT_EMBEDDING_MODEL: &str = "amazon.titan-embed-text-v2:0";
pub const DEFAULT_REGION: &str = "us-east-1";

const ANTHROPIC_BEDROCK_VERSION: &str = "bedrock-2023-05-31";

/// Static AWS credentials
#[derive(Debug, Clone)]
pub struct AwsCredentials {
    pub access_key_id: String,
    pub secret_access_key: String,
    pub session_token: Option<String>,
}

/// Build a Bedrock runtime client from explicit settings
pub fn bedrock_client(
    region: &str,
    credentials: AwsCredentials,
) -> aws_sdk_bedrockruntime::Client {
    let credentials = Credentials::new(
        credentials.access_key_id,
        credentials.secret_access_key,
        credentials.session_token,
        None,
        "ragscope",
    );
    let config = aws_sdk_bedrockruntime::Config::builder()
        .behavior_version(BehaviorVersion::latest())
        .region(Region::new(region.to_string()))
        .credentials_provider(credentials)
        .build();
    aws_sdk_bedrockruntime::Client::from_conf(config)
}

/// Validation errors are the request's fault; everything else (throttling,
/// access denied, timeouts, dispatch failures) is infrastructure.
fn invoke_error<R>(err: SdkError<InvokeModelError, R>) -> EvalError
where
    R: std::fmt::Debug,
{
    let message = format!("{}", DisplayErrorContext(&err));
    match err.as_service_error() {
        Some(service) if service.is_validation_exception() => EvalError::JudgeResponse(message),
        _ => EvalError::JudgeUnavailable(message),
    }
}

async fn invoke_json(
    client: &aws_sdk_bedrockruntime::Client,
    model_id: &str,
    body: &serde_json::Value,
) -> Result<serde_json::Value> {
    let bytes = serde_json::to_vec(body)
        .map_err(|e| EvalError::InvalidInput(format!("unserializable request body: {}", e)))?;

    let output = client
        .invoke_model()
        .model_id(model_id)
        .content_type("application/json")
        .accept("application/json")
        .body(Blob::new(bytes))
        .send()
        .await
        .map_err(invoke_error)?;

    serde_json::from_slice(output.body().as_ref())
        .map_err(|e| EvalError::JudgeResponse(format!("Bedrock returned invalid JSON: {}", e)))
}

/// Anthropic messages body sent through Bedrock `InvokeModel`
pub fn anthropic_request_body(prompt: &str, params: GenerationParams) -> serde_json::Value {
    serde_json::json!({
        "anthropic_version": ANTHROPIC_BEDROCK_VERSION,
        "max_tokens": params.max_tokens,
        "temperature": params.temperature,
        "messages": [
            {
                "role": "user",
                "content": prompt
            }
        ]
    })
}

/// Text of `content[0].text` in an Anthropic messages response
pub fn anthropic_response_text(body: &serde_json::Value) -> Result<String> {
    body["content"][0]["text"]
        .as_str()
        .map(str::to_string)
        .ok_or_else(|| EvalError::JudgeResponse("Missing content[0].text".to_string()))
}

/// Judge backed by an Anthropic model on Bedrock
pub struct BedrockJudge {
    client: aws_sdk_bedrockruntime::Client,
    model_id: String,
}

impl BedrockJudge {
    pub fn new(client: aws_sdk_bedrockruntime::Client, model_id: impl Into<String>) -> Self {
        Self {
            client,
            model_id: model_id.into(),
        }
    }
}

#[async_trait]
impl JudgeBackend for BedrockJudge {
    async fn invoke(&self, prompt: &str, params: GenerationParams) -> Result<LLMResponse> {
        let body = anthropic_request_body(prompt, params);
        let response = invoke_json(&self.client, &self.model_id, &body).await?;
        let content = anthropic_response_text(&response)?;

        let usage_data = &response["usage"];
        let input = usage_data["input_tokens"].as_u64().unwrap_or(0);
        let output = usage_data["output_tokens"].as_u64().unwrap_or(0);
        debug!(model = %self.model_id, input, output, "Bedrock judge call");

        Ok(LLMResponse {
            content,
            usage: TokenUsage {
                prompt_tokens: input as u32,
                completion_tokens: output as u32,
                total_tokens: (input + output) as u32,
            },
            model: self.model_id.clone(),
        })
    }

    fn model_name(&self) -> &str {
        &self.model_id
    }
}

/// Titan text embeddings on Bedrock
pub struct BedrockEmbeddings {
    client: aws_sdk_bedrockruntime::Client,
    model_id: String,
}

impl BedrockEmbeddings {
    pub fn new(client: aws_sdk_bedrockruntime::Client, model_id: impl Into<String>) -> Self {
        Self {
            client,
            model_id: model_id.into(),
        }
    }
}

/// `embedding` array of a Titan response
pub fn titan_embedding(body: &serde_json::Value) -> Result<Vec<f64>> {
    let values = body["embedding"]
        .as_array()
        .ok_or_else(|| EvalError::JudgeResponse("Missing embedding array".to_string()))?;
    let vector: Vec<f64> = values.iter().filter_map(|v| v.as_f64()).collect();
    if vector.is_empty() {
        return Err(EvalError::JudgeResponse("Empty embedding".to_string()));
    }
    Ok(vector)
}

#[async_trait]
impl EmbeddingClient for BedrockEmbeddings {
    async fn embed(&self, text: &str) -> Result<Vec<f64>> {
        let body = serde_json::json!({ "inputText": text });
        let response = invoke_json(&self.client, &self.model_id, &body).await?;
        titan_embedding(&response)
    }

    fn model_name(&self) -> &str {
        &self.model_id
    }
}
