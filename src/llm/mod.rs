//! LLM 클라이언트
//!
//! 모델 키("api", "local")로 백엔드를 고릅니다.
//! - `OpenAiClient`: OpenAI 호환 `/v1/chat/completions`
//! - `OllamaClient`: Ollama `/api/generate`

use std::collections::HashMap;
use std::sync::Arc;

use anyhow::{Context, Result};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::config::{LlmBackendConfig, LlmConfig, LlmProvider};
use crate::http;

// ============================================================================
// LlmClient Trait
// ============================================================================

/// 프롬프트 → 답변
#[async_trait]
pub trait LlmClient: Send + Sync {
    async fn complete(&self, prompt: &str) -> Result<String>;

    /// 실제 모델 이름
    fn model_name(&self) -> &str;
}

// ============================================================================
// Prompt
// ============================================================================

/// 문서 기반 답변 프롬프트
pub fn build_prompt(context: &str, question: &str) -> String {
    format!(
        "당신은 문서 기반 질문 답변 시스템입니다.\n\
         주어진 문서 내용을 바탕으로 사용자의 질문에 정확하고 도움이 되는 답변을 제공하세요.\n\
         \n\
         ## 원칙\n\
         1. 문서에 명시된 내용만을 바탕으로 답변합니다.\n\
         2. 문서의 표는 markdown 표로 재현합니다.\n\
         3. 핵심 답변을 먼저 쓰고 출처가 된 부분을 밝힙니다.\n\
         4. 문서에 없는 내용이면 모른다고 답합니다.\n\
         \n\
         ## 문서 내용\n\
         {}\n\
         \n\
         ## 질문\n\
         {}\n\
         \n\
         ## 답변\n",
        context, question
    )
}

// ============================================================================
// OpenAI
// ============================================================================

/// OpenAI 호환 chat completions 클라이언트
pub struct OpenAiClient {
    client: reqwest::Client,
    url: String,
    api_key: Option<String>,
    model: String,
    temperature: f32,
    max_tokens: u32,
}

#[derive(Debug, Serialize)]
struct ChatRequest<'a> {
    model: &'a str,
    messages: Vec<ChatMessage<'a>>,
    temperature: f32,
    max_tokens: u32,
}

#[derive(Debug, Serialize)]
struct ChatMessage<'a> {
    role: &'a str,
    content: &'a str,
}

#[derive(Debug, Deserialize)]
struct ChatResponse {
    choices: Vec<ChatChoice>,
}

#[derive(Debug, Deserialize)]
struct ChatChoice {
    message: ChatReply,
}

#[derive(Debug, Deserialize)]
struct ChatReply {
    content: Option<String>,
}

impl OpenAiClient {
    pub fn new(config: &LlmBackendConfig) -> Result<Self> {
        Ok(Self {
            client: http::build_client(config.timeout_secs)?,
            url: format!(
                "{}/v1/chat/completions",
                config.base_url.trim_end_matches('/')
            ),
            api_key: config.api_key.clone(),
            model: config.model_name.clone(),
            temperature: config.temperature,
            max_tokens: config.max_tokens,
        })
    }
}

#[async_trait]
impl LlmClient for OpenAiClient {
    async fn complete(&self, prompt: &str) -> Result<String> {
        let api_key = self
            .api_key
            .as_deref()
            .filter(|k| !k.is_empty())
            .ok_or_else(|| anyhow::anyhow!("OPENAI_API_KEY not set"))?;

        let request = ChatRequest {
            model: &self.model,
            messages: vec![ChatMessage {
                role: "user",
                content: prompt,
            }],
            temperature: self.temperature,
            max_tokens: self.max_tokens,
        };

        let body = http::post_json(&self.client, &self.url, Some(api_key), &request, "OpenAI")
            .await?;
        let response: ChatResponse =
            serde_json::from_str(&body).context("Failed to parse chat completion response")?;

        response
            .choices
            .into_iter()
            .next()
            .and_then(|c| c.message.content)
            .map(|s| s.trim().to_string())
            .ok_or_else(|| anyhow::anyhow!("Empty chat completion response"))
    }

    fn model_name(&self) -> &str {
        &self.model
    }
}

// ============================================================================
// Ollama
// ============================================================================

/// Ollama generate 클라이언트
pub struct OllamaClient {
    client: reqwest::Client,
    url: String,
    model: String,
    temperature: f32,
    max_tokens: u32,
}

#[derive(Debug, Serialize)]
struct GenerateRequest<'a> {
    model: &'a str,
    prompt: &'a str,
    stream: bool,
    options: GenerateOptions,
}

#[derive(Debug, Serialize)]
struct GenerateOptions {
    temperature: f32,
    num_predict: u32,
}

#[derive(Debug, Deserialize)]
struct GenerateResponse {
    response: String,
}

impl OllamaClient {
    pub fn new(config: &LlmBackendConfig) -> Result<Self> {
        Ok(Self {
            client: http::build_client(config.timeout_secs)?,
            url: format!("{}/api/generate", config.base_url.trim_end_matches('/')),
            model: config.model_name.clone(),
            temperature: config.temperature,
            max_tokens: config.max_tokens,
        })
    }
}

#[async_trait]
impl LlmClient for OllamaClient {
    async fn complete(&self, prompt: &str) -> Result<String> {
        let request = GenerateRequest {
            model: &self.model,
            prompt,
            stream: false,
            options: GenerateOptions {
                temperature: self.temperature,
                num_predict: self.max_tokens,
            },
        };

        let body = http::post_json(&self.client, &self.url, None, &request, "Ollama").await?;
        let response: GenerateResponse =
            serde_json::from_str(&body).context("Failed to parse Ollama response")?;
        Ok(response.response.trim().to_string())
    }

    fn model_name(&self) -> &str {
        &self.model
    }
}

// ============================================================================
// Factory Function
// ============================================================================

/// 모델 키 → 클라이언트
pub type LlmRegistry = HashMap<String, Arc<dyn LlmClient>>;

/// 설정의 모든 백엔드로 클라이언트 생성
pub fn create_llm_clients(config: &LlmConfig) -> Result<LlmRegistry> {
    let mut clients: LlmRegistry = HashMap::new();

    for backend in &config.backends {
        let client: Arc<dyn LlmClient> = match backend.provider {
            LlmProvider::OpenAi => Arc::new(OpenAiClient::new(backend)?),
            LlmProvider::Ollama => Arc::new(OllamaClient::new(backend)?),
        };
        tracing::debug!(
            "LLM backend '{}': {:?} {}",
            backend.key,
            backend.provider,
            backend.model_name
        );
        clients.insert(backend.key.clone(), client);
    }

    Ok(clients)
}

// ============================================================================
// Tests
// ============================================================================
