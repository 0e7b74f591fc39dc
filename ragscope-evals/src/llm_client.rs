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

//! LLM judge and embedding client abstractions
//!
//! Backends implement [`JudgeBackend`] / [`EmbeddingClient`]. Evaluators talk
//! to a [`JudgeClient`], which adds the request timeout and the blocking
//! entry point on top of any backend.

use async_trait::async_trait;
use ragscope_core::{EvalError, Result};
use serde::{Deserialize, Serialize};
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;
use tokio::runtime::{Handle, RuntimeFlavor};

/// Sampling parameters for one judge call
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct GenerationParams {
    pub temperature: f32,
    pub max_tokens: u32,
}

impl GenerationParams {
    /// Safety judging: temperature 0.1, up to 2000 output tokens
    pub fn safety() -> Self {
        Self {
            temperature: 0.1,
            max_tokens: 2000,
        }
    }

    /// Retrieval-quality judging: temperature 0.1, up to 1000 output tokens
    pub fn retrieval() -> Self {
        Self {
            temperature: 0.1,
            max_tokens: 1000,
        }
    }
}

impl Default for GenerationParams {
    fn default() -> Self {
        Self::safety()
    }
}

/// Token usage information
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct TokenUsage {
    pub prompt_tokens: u32,
    pub completion_tokens: u32,
    pub total_tokens: u32,
}

/// Response from a judge backend
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LLMResponse {
    pub content: String,
    pub usage: TokenUsage,
    pub model: String,
}

impl LLMResponse {
    /// First JSON object in the response text
    pub fn as_json(&self) -> Result<serde_json::Value> {
        extract_json(&self.content)
    }
}

/// A remote LLM that turns a prompt into text
#[async_trait]
pub trait JudgeBackend: Send + Sync {
    async fn invoke(&self, prompt: &str, params: GenerationParams) -> Result<LLMResponse>;

    /// Get model name
    fn model_name(&self) -> &str;
}

/// Trait for embedding clients used in evaluations
#[async_trait]
pub trait EmbeddingClient: Send + Sync {
    /// Embed a single text string
    async fn embed(&self, text: &str) -> Result<Vec<f64>>;

    /// Embed a batch of texts
    async fn embed_batch(&self, texts: &[String]) -> Result<Vec<Vec<f64>>> {
        let mut results = Vec::with_capacity(texts.len());
        for text in texts {
            results.push(self.embed(text).await?);
        }
        Ok(results)
    }

    fn model_name(&self) -> &str;
}

/// Uniform `generate(prompt) -> text` over any backend, with a request timeout.
///
/// No retries happen here; evaluators decide whether to retry.
#[derive(Clone)]
pub struct JudgeClient {
    backend: Arc<dyn JudgeBackend>,
    timeout: Duration,
}

impl JudgeClient {
    pub fn new(backend: Arc<dyn JudgeBackend>, timeout: Duration) -> Self {
        Self { backend, timeout }
    }

    pub fn model_name(&self) -> &str {
        self.backend.model_name()
    }

    pub fn timeout(&self) -> Duration {
        self.timeout
    }

    /// Awaited generation
    pub async fn a_generate(&self, prompt: &str, temperature: f32, max_tokens: u32) -> Result<String> {
        let params = GenerationParams {
            temperature,
            max_tokens,
        };
        let response = with_timeout(self.timeout, "judge", self.backend.invoke(prompt, params)).await?;
        if response.content.trim().is_empty() {
            return Err(EvalError::JudgeResponse(format!(
                "{} returned an empty completion",
                self.backend.model_name()
            )));
        }
        Ok(response.content)
    }

    /// Blocking generation. Drives [`a_generate`](Self::a_generate) on the
    /// current runtime, or on a private current-thread runtime when called
    /// outside one.
    pub fn generate(&self, prompt: &str, temperature: f32, max_tokens: u32) -> Result<String> {
        let fut = self.a_generate(prompt, temperature, max_tokens);
        match Handle::try_current() {
            Ok(handle) if handle.runtime_flavor() == RuntimeFlavor::MultiThread => {
                tokio::task::block_in_place(|| handle.block_on(fut))
            }
            // block_in_place is unavailable on a current-thread runtime
            Ok(_) => std::thread::scope(|scope| {
                scope
                    .spawn(|| block_on_private(fut))
                    .join()
                    .unwrap_or_else(|_| {
                        Err(EvalError::JudgeUnavailable("judge thread panicked".to_string()))
                    })
            }),
            Err(_) => block_on_private(fut),
        }
    }

    /// Generate with explicit params and parse the first JSON object of the reply
    pub async fn a_generate_json(
        &self,
        prompt: &str,
        params: GenerationParams,
    ) -> Result<serde_json::Value> {
        let text = self
            .a_generate(prompt, params.temperature, params.max_tokens)
            .await?;
        extract_json(&text)
    }
}

fn block_on_private<F: Future<Output = Result<String>>>(fut: F) -> Result<String> {
    let rt = tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()
        .map_err(|e| EvalError::JudgeUnavailable(format!("failed to start runtime: {}", e)))?;
    rt.block_on(fut)
}

/// Bound a remote call; expiry is reported as `JudgeUnavailable`
pub async fn with_timeout<T, F>(timeout: Duration, what: &str, fut: F) -> Result<T>
where
    F: Future<Output = Result<T>>,
{
    match tokio::time::timeout(timeout, fut).await {
        Ok(result) => result,
        Err(_) => Err(EvalError::JudgeUnavailable(format!(
            "{} call timed out after {}s",
            what,
            timeout.as_secs_f64()
        ))),
    }
}

/// Extract the first JSON object embedded in judge text.
///
/// Tolerates Markdown fences and prose around the object.
pub fn extract_json(text: &str) -> Result<serde_json::Value> {
    for (start, _) in text.match_indices('{') {
        let mut stream =
            serde_json::Deserializer::from_str(&text[start..]).into_iter::<serde_json::Value>();
        if let Some(Ok(value)) = stream.next() {
            if value.is_object() {
                return Ok(value);
            }
        }
    }
    let preview: String = text.chars().take(120).collect();
    Err(EvalError::JudgeResponse(format!(
        "no JSON object in judge response: {}",
        preview
    )))
}

/// Map an HTTP status to the error taxonomy
pub(crate) fn status_error(status: reqwest::StatusCode, body: String) -> EvalError {
    let message = format!("HTTP {}: {}", status.as_u16(), body);
    if status == reqwest::StatusCode::UNAUTHORIZED
        || status == reqwest::StatusCode::FORBIDDEN
        || status == reqwest::StatusCode::TOO_MANY_REQUESTS
        || status == reqwest::StatusCode::REQUEST_TIMEOUT
        || status.is_server_error()
    {
        EvalError::JudgeUnavailable(message)
    } else {
        EvalError::JudgeResponse(message)
    }
}

pub(crate) fn transport_error(e: reqwest::Error) -> EvalError {
    if e.is_decode() {
        EvalError::JudgeResponse(format!("undecodable response: {}", e))
    } else {
        EvalError::JudgeUnavailable(e.to_string())
    }
}

/// OpenAI-compatible chat completions and embeddings client
pub struct OpenAIClient {
    api_key: String,
    model: String,
    base_url: String,
    client: reqwest::Client,
}

impl OpenAIClient {
    pub fn new(api_key: String, model: String) -> Self {
        Self {
            api_key,
            model,
            base_url: "https://api.openai.com/v1".to_string(),
            client: reqwest::Client::new(),
        }
    }

    pub fn with_base_url(mut self, base_url: String) -> Self {
        self.base_url = base_url.trim_end_matches('/').to_string();
        self
    }

    async fn post(&self, path: &str, request: &serde_json::Value) -> Result<serde_json::Value> {
        let response = self
            .client
            .post(format!("{}/{}", self.base_url, path))
            .header("Authorization", format!("Bearer {}", self.api_key))
            .header("Content-Type", "application/json")
            .json(request)
            .send()
            .await
            .map_err(transport_error)?;

        if !response.status().is_success() {
            let status = response.status();
            let error_text = response.text().await.unwrap_or_default();
            return Err(status_error(status, error_text));
        }

        response.json().await.map_err(transport_error)
    }
}

#[async_trait]
impl JudgeBackend for OpenAIClient {
    async fn invoke(&self, prompt: &str, params: GenerationParams) -> Result<LLMResponse> {
        let request = serde_json::json!({
            "model": self.model,
            "messages": [
                {
                    "role": "user",
                    "content": prompt
                }
            ],
            "temperature": params.temperature,
            "max_tokens": params.max_tokens
        });

        let response_data = self.post("chat/completions", &request).await?;

        let content = response_data["choices"][0]["message"]["content"]
            .as_str()
            .ok_or_else(|| EvalError::JudgeResponse("Missing content".to_string()))?
            .to_string();

        let usage_data = &response_data["usage"];
        let usage = TokenUsage {
            prompt_tokens: usage_data["prompt_tokens"].as_u64().unwrap_or(0) as u32,
            completion_tokens: usage_data["completion_tokens"].as_u64().unwrap_or(0) as u32,
            total_tokens: usage_data["total_tokens"].as_u64().unwrap_or(0) as u32,
        };

        Ok(LLMResponse {
            content,
            usage,
            model: self.model.clone(),
        })
    }

    fn model_name(&self) -> &str {
        &self.model
    }
}

#[async_trait]
impl EmbeddingClient for OpenAIClient {
    async fn embed(&self, text: &str) -> Result<Vec<f64>> {
        let embeddings = self.embed_batch(&[text.to_string()]).await?;
        embeddings
            .into_iter()
            .next()
            .ok_or_else(|| EvalError::JudgeResponse("No embedding returned".to_string()))
    }

    async fn embed_batch(&self, texts: &[String]) -> Result<Vec<Vec<f64>>> {
        let request = serde_json::json!({
            "model": self.model,
            "input": texts
        });

        let response_data = self.post("embeddings", &request).await?;

        let mut embeddings = Vec::new();
        if let Some(data) = response_data["data"].as_array() {
            for item in data {
                if let Some(embedding_vec) = item["embedding"].as_array() {
                    let vec: Vec<f64> = embedding_vec.iter().filter_map(|v| v.as_f64()).collect();
                    embeddings.push(vec);
                }
            }
        }

        if embeddings.len() != texts.len() {
            return Err(EvalError::JudgeResponse(format!(
                "Expected {} embeddings, got {}",
                texts.len(),
                embeddings.len()
            )));
        }

        Ok(embeddings)
    }

    fn model_name(&self) -> &str {
        &self.model
    }
}

/// Anthropic Messages API client
pub struct AnthropicClient {
    api_key: String,
    model: String,
    base_url: String,
    client: reqwest::Client,
}

impl AnthropicClient {
    pub fn new(api_key: String, model: String) -> Self {
        Self {
            api_key,
            model,
            base_url: "https://api.anthropic.com/v1".to_string(),
            client: reqwest::Client::new(),
        }
    }

    pub fn with_base_url(mut self, base_url: String) -> Self {
        self.base_url = base_url.trim_end_matches('/').to_string();
        self
    }
}

#[async_trait]
impl JudgeBackend for AnthropicClient {
    async fn invoke(&self, prompt: &str, params: GenerationParams) -> Result<LLMResponse> {
        let request = serde_json::json!({
            "model": self.model,
            "max_tokens": params.max_tokens,
            "messages": [
                {
                    "role": "user",
                    "content": prompt
                }
            ],
            "temperature": params.temperature
        });

        let response = self
            .client
            .post(format!("{}/messages", self.base_url))
            .header("x-api-key", &self.api_key)
            .header("anthropic-version", "2023-06-01")
            .header("Content-Type", "application/json")
            .json(&request)
            .send()
            .await
            .map_err(transport_error)?;

        if !response.status().is_success() {
            let status = response.status();
            let error_text = response.text().await.unwrap_or_default();
            return Err(status_error(status, error_text));
        }

        let response_data: serde_json::Value = response.json().await.map_err(transport_error)?;

        let content = response_data["content"][0]["text"]
            .as_str()
            .ok_or_else(|| EvalError::JudgeResponse("Missing content".to_string()))?
            .to_string();

        let usage_data = &response_data["usage"];
        let usage = TokenUsage {
            prompt_tokens: usage_data["input_tokens"].as_u64().unwrap_or(0) as u32,
            completion_tokens: usage_data["output_tokens"].as_u64().unwrap_or(0) as u32,
            total_tokens: (usage_data["input_tokens"].as_u64().unwrap_or(0)
                + usage_data["output_tokens"].as_u64().unwrap_or(0)) as u32,
        };

        Ok(LLMResponse {
            content,
            usage,
            model: self.model.clone(),
        })
    }

    fn model_name(&self) -> &str {
        &self.model
    }
}

/// Cosine similarity; 0 for empty, mismatched or zero-norm vectors
pub fn cosine_similarity(a: &[f64], b: &[f64]) -> f64 {
    if a.len() != b.len() || a.is_empty() {
        return 0.0;
    }

    let dot_product: f64 = a.iter().zip(b.iter()).map(|(x, y)| x * y).sum();
    let norm_a: f64 = a.iter().map(|x| x * x).sum::<f64>().sqrt();
    let norm_b: f64 = b.iter().map(|x| x * x).sum::<f64>().sqrt();

    if norm_a == 0.0 || norm_b == 0.0 {
        return 0.0;
    }

    dot_product / (norm_a * norm_b)
}

#[cfg(test)]
mod tests {
    use super::*;

    struct SlowBackend;

    #[async_trait]
    impl JudgeBackend for SlowBackend {
        async fn invoke(&self, _prompt: &str, _params: GenerationParams) -> Result<LLMResponse> {
            tokio::time::sleep(Duration::from_secs(5)).await;
            Ok(LLMResponse {
                content: "late".to_string(),
                usage: TokenUsage::default(),
                model: "slow".to_string(),
            })
        }

        fn model_name(&self) -> &str {
            "slow"
        }
    }

    struct EchoBackend;

    #[async_trait]
    impl JudgeBackend for EchoBackend {
        async fn invoke(&self, prompt: &str, params: GenerationParams) -> Result<LLMResponse> {
            Ok(LLMResponse {
                content: format!("{}|{}", prompt, params.max_tokens),
                usage: TokenUsage::default(),
                model: "echo".to_string(),
            })
        }

        fn model_name(&self) -> &str {
            "echo"
        }
    }

    #[test]
    fn test_extract_json_tolerates_fences_and_prose() {
        let text = "Here you go:\n```json\n{\"verdict\": \"yes\", \"n\": 2}\n```\nThanks";
        let value = extract_json(text).unwrap();
        assert_eq!(value["verdict"], "yes");
        assert_eq!(value["n"], 2);
    }

    #[test]
    fn test_extract_json_skips_broken_braces() {
        let value = extract_json("{not json} then {\"ok\": true}").unwrap();
        assert_eq!(value["ok"], true);
    }

    #[test]
    fn test_extract_json_without_object_is_response_error() {
        let err = extract_json("I cannot help with that").unwrap_err();
        assert!(matches!(err, EvalError::JudgeResponse(_)));
    }

    #[test]
    fn test_status_mapping() {
        assert!(status_error(reqwest::StatusCode::FORBIDDEN, String::new()).is_transient());
        assert!(status_error(reqwest::StatusCode::TOO_MANY_REQUESTS, String::new()).is_transient());
        assert!(status_error(reqwest::StatusCode::BAD_GATEWAY, String::new()).is_transient());
        assert!(!status_error(reqwest::StatusCode::BAD_REQUEST, String::new()).is_transient());
    }

    #[test]
    fn test_cosine_similarity() {
        assert!((cosine_similarity(&[1.0, 0.0], &[1.0, 0.0]) - 1.0).abs() < 1e-12);
        assert_eq!(cosine_similarity(&[1.0, 0.0], &[0.0, 1.0]), 0.0);
        assert_eq!(cosine_similarity(&[0.0, 0.0], &[1.0, 1.0]), 0.0);
        assert_eq!(cosine_similarity(&[1.0], &[1.0, 2.0]), 0.0);
    }

    #[tokio::test]
    async fn test_timeout_is_judge_unavailable() {
        let client = JudgeClient::new(Arc::new(SlowBackend), Duration::from_millis(50));
        let err = client.a_generate("hi", 0.1, 10).await.unwrap_err();
        assert!(matches!(err, EvalError::JudgeUnavailable(msg) if msg.contains("timed out")));
    }

    #[test]
    fn test_blocking_generate_outside_runtime() {
        let client = JudgeClient::new(Arc::new(EchoBackend), Duration::from_secs(5));
        assert_eq!(client.generate("ping", 0.1, 7).unwrap(), "ping|7");
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn test_blocking_generate_inside_multi_thread_runtime() {
        let client = JudgeClient::new(Arc::new(EchoBackend), Duration::from_secs(5));
        assert_eq!(client.generate("ping", 0.1, 9).unwrap(), "ping|9");
    }

    #[tokio::test]
    async fn test_blocking_generate_inside_current_thread_runtime() {
        let client = JudgeClient::new(Arc::new(EchoBackend), Duration::from_secs(5));
        assert_eq!(client.generate("ping", 0.1, 3).unwrap(), "ping|3");
    }

    #[tokio::test]
    async fn test_openai_backend_against_mock_server() {
        let mut server = mockito::Server::new_async().await;
        let mock = server
            .mock("POST", "/chat/completions")
            .with_status(200)
            .with_header("content-type", "application/json")
            .with_body(
                r#"{"choices":[{"message":{"content":"{\"score\": 7}"}}],"usage":{"prompt_tokens":3,"completion_tokens":2,"total_tokens":5}}"#,
            )
            .create_async()
            .await;

        let backend = OpenAIClient::new("key".into(), "gpt-4o-mini".into()).with_base_url(server.url());
        let client = JudgeClient::new(Arc::new(backend), Duration::from_secs(5));
        let value = client
            .a_generate_json("score it", GenerationParams::safety())
            .await
            .unwrap();

        assert_eq!(value["score"], 7);
        mock.assert_async().await;
    }

    #[tokio::test]
    async fn test_anthropic_forbidden_is_unavailable() {
        let mut server = mockito::Server::new_async().await;
        let _mock = server
            .mock("POST", "/messages")
            .with_status(403)
            .with_body("Forbidden")
            .create_async()
            .await;

        let backend =
            AnthropicClient::new("key".into(), "claude-3-5-haiku-20241022".into()).with_base_url(server.url());
        let err = backend
            .invoke("hi", GenerationParams::retrieval())
            .await
            .unwrap_err();

        assert!(matches!(err, EvalError::JudgeUnavailable(msg) if msg.contains("403")));
    }

    #[tokio::test]
    async fn test_anthropic_missing_text_is_response_error() {
        let mut server = mockito::Server::new_async().await;
        let _mock = server
            .mock("POST", "/messages")
            .with_status(200)
            .with_header("content-type", "application/json")
            .with_body(r#"{"content":[]}"#)
            .create_async()
            .await;

        let backend = AnthropicClient::new("key".into(), "claude".into()).with_base_url(server.url());
        let err = backend
            .invoke("hi", GenerationParams::retrieval())
            .await
            .unwrap_err();

        assert!(matches!(err, EvalError::JudgeResponse(_)));
    }

    #[tokio::test]
    async fn test_openai_embeddings_against_mock_server() {
        let mut server = mockito::Server::new_async().await;
        let _mock = server
            .mock("POST", "/embeddings")
            .with_status(200)
            .with_header("content-type", "application/json")
            .with_body(r#"{"data":[{"embedding":[0.5,0.25]}]}"#)
            .create_async()
            .await;

        let client = OpenAIClient::new("key".into(), "text-embedding-3-small".into())
            .with_base_url(server.url());
        let vector = client.embed("hello").await.unwrap();
        assert_eq!(vector, vec![0.5, 0.25]);
    }
}
