//! 임베딩 모듈 - 임베딩 서버를 통한 텍스트 벡터화
//!
//! Ollama 호환 `/api/embeddings` 엔드포인트를 사용합니다 (기본 모델 bge-m3, 1024차원).
//!
//! ## 사용법
//! ```rust,ignore
//! let embedder = OllamaEmbedding::new(&config.embedding)?;
//! let embedding = embedder.embed("BC카드 발급 절차").await?;
//! ```

use anyhow::{Context, Result};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::config::EmbeddingConfig;
use crate::http;

// ============================================================================
// EmbeddingProvider Trait
// ============================================================================

/// 임베딩 프로바이더 트레이트
#[async_trait]
pub trait EmbeddingProvider: Send + Sync {
    /// 단일 텍스트 임베딩
    async fn embed(&self, text: &str) -> Result<Vec<f32>>;

    /// 배치 임베딩 (기본 구현: 순차 호출)
    async fn embed_batch(&self, texts: &[String]) -> Result<Vec<Vec<f32>>> {
        let mut results = Vec::with_capacity(texts.len());
        for (i, text) in texts.iter().enumerate() {
            tracing::debug!("Embedding {}/{}", i + 1, texts.len());
            results.push(self.embed(text).await?);
        }
        Ok(results)
    }

    /// 임베딩 차원 수
    fn dimension(&self) -> usize;

    /// 프로바이더 이름
    fn name(&self) -> &str;
}

// ============================================================================
// Ollama Embedding
// ============================================================================

/// Ollama 임베딩 구현체
#[derive(Debug)]
pub struct OllamaEmbedding {
    client: reqwest::Client,
    url: String,
    model: String,
    dimension: usize,
}

#[derive(Debug, Serialize)]
struct EmbedRequest<'a> {
    model: &'a str,
    prompt: &'a str,
}

#[derive(Debug, Deserialize)]
struct EmbedResponse {
    embedding: Vec<f32>,
}

impl OllamaEmbedding {
    pub fn new(config: &EmbeddingConfig) -> Result<Self> {
        if config.dimension == 0 {
            anyhow::bail!("Embedding dimension must be positive");
        }

        Ok(Self {
            client: http::build_client(config.timeout_secs)?,
            url: format!("{}/api/embeddings", config.base_url.trim_end_matches('/')),
            model: config.model.clone(),
            dimension: config.dimension,
        })
    }

    pub fn endpoint(&self) -> &str {
        &self.url
    }
}

#[async_trait]
impl EmbeddingProvider for OllamaEmbedding {
    async fn embed(&self, text: &str) -> Result<Vec<f32>> {
        // 빈 텍스트는 서버 호출 없이 영벡터
        if text.trim().is_empty() {
            return Ok(vec![0.0; self.dimension]);
        }

        let request = EmbedRequest {
            model: &self.model,
            prompt: text,
        };
        let body = http::post_json(&self.client, &self.url, None, &request, "Embedding").await?;
        let response: EmbedResponse =
            serde_json::from_str(&body).context("Failed to parse embedding response")?;

        if response.embedding.len() != self.dimension {
            anyhow::bail!(
                "Embedding dimension mismatch: model {} returned {}, expected {}",
                self.model,
                response.embedding.len(),
                self.dimension
            );
        }

        Ok(response.embedding)
    }

    fn dimension(&self) -> usize {
        self.dimension
    }

    fn name(&self) -> &str {
        &self.model
    }
}

// ============================================================================
// Factory Function
// ============================================================================

/// 설정으로 임베딩 프로바이더 생성
pub fn create_embedder(config: &EmbeddingConfig) -> Result<OllamaEmbedding> {
    let embedder = OllamaEmbedding::new(config)?;
    tracing::info!(
        "Using embedding model {} at {} (dimension: {})",
        config.model,
        embedder.endpoint(),
        embedder.dimension()
    );
    Ok(embedder)
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_endpoint_from_config() {
        let config = EmbeddingConfig {
            base_url: "http://embed.local:11434/".to_string(),
            ..Default::default()
        };
        let embedder = OllamaEmbedding::new(&config).unwrap();
        assert_eq!(embedder.endpoint(), "http://embed.local:11434/api/embeddings");
        assert_eq!(embedder.dimension(), 1024);
        assert_eq!(embedder.name(), "bge-m3");
    }

    #[test]
    fn test_zero_dimension_rejected() {
        let config = EmbeddingConfig {
            dimension: 0,
            ..Default::default()
        };
        assert!(OllamaEmbedding::new(&config).is_err());
    }

    #[tokio::test]
    async fn test_empty_text_is_zero_vector() {
        let embedder = OllamaEmbedding::new(&EmbeddingConfig::default()).unwrap();
        let v = embedder.embed("   ").await.unwrap();
        assert_eq!(v.len(), 1024);
        assert!(v.iter().all(|x| *x == 0.0));
    }
}
