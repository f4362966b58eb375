//! The model-provider contract.
//!
//! Only the [`LlmClient`] trait is part of the core; the bundled HTTP
//! client targets a generic chat-completions endpoint and can be swapped
//! for any other provider. Inference internals are out of scope.

use std::collections::VecDeque;
use std::sync::Mutex;
use std::time::Duration;

use async_trait::async_trait;
use serde::Deserialize;
use serde_json::json;
use tracing::debug;

use parley_types::LLM_TIMEOUT;

use crate::error::{AnalysisError, AnalysisResult};

/// The instructions prepended to every extraction call.
pub(crate) const EXTRACTION_SYSTEM_PROMPT: &str = "\
You are a conversation analyst. Answer the user's message, then analyze it.\n\
Reply in EXACTLY this bracketed schema and nothing else:\n\
[response]\nyour reply to the message\n[/response]\n\
[analysis]\n\
[subject name=\"theme name\" isNew=\"true|false\"]\n\
one-line description\n\
[keyword term=\"word\" confidence=\"0.0-1.0\"/]\n\
[/subject]\n\
[summaryUpdate]\nupdated running summary, only when it changed\n[/summaryUpdate]\n\
[/analysis]\n\
Repeat [subject] blocks as needed. Omit [summaryUpdate] when nothing changed. \
Omit the whole [analysis] section when the message has no analyzable content.";

/// A language-model provider.
#[async_trait]
pub trait LlmClient: Send + Sync {
    /// Complete a prompt. Implementations enforce their own transport
    /// behavior; the caller enforces the protocol-level timeout.
    async fn complete(&self, system: &str, user: &str) -> AnalysisResult<String>;
}

/// Chat-completions HTTP client.
pub struct HttpLlmClient {
    endpoint: String,
    api_key: Option<String>,
    model: String,
    client: reqwest::Client,
}

#[derive(Deserialize)]
struct ChatResponse {
    choices: Vec<ChatChoice>,
}

#[derive(Deserialize)]
struct ChatChoice {
    message: ChatMessageBody,
}

#[derive(Deserialize)]
struct ChatMessageBody {
    content: String,
}

impl HttpLlmClient {
    /// Create a client for a chat-completions endpoint.
    pub fn new(
        endpoint: impl Into<String>,
        model: impl Into<String>,
        api_key: Option<String>,
    ) -> AnalysisResult<Self> {
        let client = reqwest::Client::builder()
            .timeout(LLM_TIMEOUT)
            .build()
            .map_err(|e| AnalysisError::Llm(e.to_string()))?;
        Ok(Self { endpoint: endpoint.into(), api_key, model: model.into(), client })
    }

    /// Override the request timeout, e.g. for slow local models.
    pub fn with_timeout(mut self, timeout: Duration) -> AnalysisResult<Self> {
        self.client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| AnalysisError::Llm(e.to_string()))?;
        Ok(self)
    }
}

#[async_trait]
impl LlmClient for HttpLlmClient {
    async fn complete(&self, system: &str, user: &str) -> AnalysisResult<String> {
        let body = json!({
            "model": self.model,
            "messages": [
                { "role": "system", "content": system },
                { "role": "user", "content": user },
            ],
        });
        let mut request = self.client.post(&self.endpoint).json(&body);
        if let Some(key) = &self.api_key {
            request = request.bearer_auth(key);
        }

        debug!(model = %self.model, "llm request");
        let response = request.send().await.map_err(|e| {
            if e.is_timeout() {
                AnalysisError::LlmTimeout
            } else {
                AnalysisError::Llm(e.to_string())
            }
        })?;
        if !response.status().is_success() {
            return Err(AnalysisError::Llm(format!("provider returned {}", response.status())));
        }
        let parsed: ChatResponse =
            response.json().await.map_err(|e| AnalysisError::Llm(e.to_string()))?;
        parsed
            .choices
            .into_iter()
            .next()
            .map(|choice| choice.message.content)
            .ok_or_else(|| AnalysisError::Llm("provider returned no choices".into()))
    }
}

/// Test client replaying canned outputs in order.
pub struct ScriptedLlmClient {
    replies: Mutex<VecDeque<String>>,
}

impl ScriptedLlmClient {
    /// Create a client that answers with `replies`, in order.
    pub fn new(replies: impl IntoIterator<Item = String>) -> Self {
        Self { replies: Mutex::new(replies.into_iter().collect()) }
    }
}

#[async_trait]
impl LlmClient for ScriptedLlmClient {
    async fn complete(&self, _system: &str, _user: &str) -> AnalysisResult<String> {
        self.replies
            .lock()
            .expect("replies lock")
            .pop_front()
            .ok_or_else(|| AnalysisError::Llm("scripted client exhausted".into()))
    }
}
