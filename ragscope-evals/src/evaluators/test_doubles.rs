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

//! Scripted judge and embedding doubles for evaluator tests

use async_trait::async_trait;
use ragscope_core::{EvalError, Result};
use std::sync::atomic::{AtomicUsize, Ordering};

use crate::llm_client::{EmbeddingClient, GenerationParams, JudgeBackend, LLMResponse, TokenUsage};

enum Reply {
    Text(String),
    Fail(EvalError),
}

/// Answers a prompt with the first rule whose key occurs in it
pub struct ScriptedJudge {
    rules: Vec<(String, Reply)>,
    fallback: Option<EvalError>,
    calls: AtomicUsize,
}

impl ScriptedJudge {
    pub fn new() -> Self {
        Self {
            rules: Vec::new(),
            fallback: None,
            calls: AtomicUsize::new(0),
        }
    }

    /// Every call fails as if the service refused the credentials
    pub fn unavailable() -> Self {
        Self {
            fallback: Some(EvalError::JudgeUnavailable(
                "HTTP 403: The security token included in the request is invalid".to_string(),
            )),
            ..Self::new()
        }
    }

    pub fn on(mut self, key: &str, reply: &str) -> Self {
        self.rules.push((key.to_string(), Reply::Text(reply.to_string())));
        self
    }

    pub fn fail(mut self, key: &str, error: EvalError) -> Self {
        self.rules.push((key.to_string(), Reply::Fail(error)));
        self
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl JudgeBackend for ScriptedJudge {
    async fn invoke(&self, prompt: &str, _params: GenerationParams) -> Result<LLMResponse> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if let Some(err) = &self.fallback {
            return Err(err.clone());
        }

        let reply = self
            .rules
            .iter()
            .find(|(key, _)| prompt.contains(key.as_str()))
            .map(|(_, reply)| reply);

        match reply {
            Some(Reply::Text(text)) => Ok(LLMResponse {
                content: text.clone(),
                usage: TokenUsage::default(),
                model: "scripted".to_string(),
            }),
            Some(Reply::Fail(err)) => Err(err.clone()),
            None => Err(EvalError::JudgeResponse("no scripted reply".to_string())),
        }
    }

    fn model_name(&self) -> &str {
        "scripted"
    }
}

/// Letter-frequency embeddings: similar wording gives similar vectors
#[derive(Default)]
pub struct FixedEmbeddings;

#[async_trait]
impl EmbeddingClient for FixedEmbeddings {
    async fn embed(&self, text: &str) -> Result<Vec<f64>> {
        let mut vector = vec![0.0; 26];
        for c in text.to_lowercase().chars().filter(|c| c.is_ascii_lowercase()) {
            vector[(c as u8 - b'a') as usize] += 1.0;
        }
        Ok(vector)
    }

    fn model_name(&self) -> &str {
        "letters"
    }
}
