//! 설정 모듈
//!
//! 임계값, TTL, 인기 질문 기준 등 모든 옵션을 타입이 있는 구조체로 정의합니다.
//! 기본값 위에 환경변수(`RAG_QA_*`)를 덮어씁니다.

use std::path::PathBuf;

use serde::{Deserialize, Serialize};

use crate::error::{QaError, QaResult};

// ============================================================================
// Data Directory
// ============================================================================

/// 데이터 디렉토리 경로 (~/.rag-qa/)
pub fn get_data_dir() -> PathBuf {
    dirs::data_local_dir()
        .or_else(dirs::home_dir)
        .unwrap_or_else(|| PathBuf::from("."))
        .join(".rag-qa")
}

// ============================================================================
// Sections
// ============================================================================

/// 유사도 라우터 설정
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RouterConfig {
    /// 일반/카드 질문 임계값
    pub default_threshold: f32,
    /// 개인화 질문 임계값 (default_threshold보다 작아야 함)
    pub personal_threshold: f32,
    /// 컨텍스트에 넣을 상위 결과 수
    pub context_top_k: usize,
    /// 추천 질문 최대 개수
    pub max_suggestions: usize,
}

impl Default for RouterConfig {
    fn default() -> Self {
        Self {
            default_threshold: 0.75,
            personal_threshold: 0.65,
            context_top_k: 3,
            max_suggestions: 5,
        }
    }
}

/// 계층형 캐시 설정
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CacheConfig {
    /// 빠른 계층 엔트리 TTL (초)
    pub fast_ttl_secs: u64,
    /// 조회수 카운터 TTL (초)
    pub counter_ttl_secs: u64,
    /// 영구 계층 승격 기준 조회수
    pub popular_threshold: u32,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            fast_ttl_secs: 24 * 60 * 60,
            counter_ttl_secs: 30 * 24 * 60 * 60,
            popular_threshold: 5,
        }
    }
}

/// 검색 설정
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SearchConfig {
    /// 컬렉션별 검색 개수
    pub k: usize,
    /// 검색에 사용할 확장 질의 수 (원본 포함)
    pub max_variants: usize,
}

impl Default for SearchConfig {
    fn default() -> Self {
        Self { k: 5, max_variants: 3 }
    }
}

/// 청킹 설정
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChunkingConfig {
    /// basic 컬렉션 청크 크기 (문자 수)
    pub basic_chunk_size: usize,
    /// basic 컬렉션 오버랩 (문자 수)
    pub basic_overlap: usize,
    /// custom 컬렉션 구분자
    pub custom_delimiter: String,
}

impl Default for ChunkingConfig {
    fn default() -> Self {
        Self {
            basic_chunk_size: 1000,
            basic_overlap: 200,
            custom_delimiter: "/$$/".to_string(),
        }
    }
}

/// 임베딩 서버 설정
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EmbeddingConfig {
    pub base_url: String,
    pub model: String,
    pub dimension: usize,
    pub timeout_secs: u64,
}

impl Default for EmbeddingConfig {
    fn default() -> Self {
        Self {
            base_url: "http://localhost:11434".to_string(),
            model: "bge-m3".to_string(),
            dimension: 1024,
            timeout_secs: 30,
        }
    }
}

/// LLM 프로바이더 종류
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LlmProvider {
    /// OpenAI 호환 chat completions
    OpenAi,
    /// Ollama generate API
    Ollama,
}

/// LLM 백엔드 하나의 설정
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LlmBackendConfig {
    /// 요청에서 사용하는 모델 키 ("api", "local")
    pub key: String,
    pub provider: LlmProvider,
    pub base_url: String,
    pub model_name: String,
    pub api_key: Option<String>,
    pub temperature: f32,
    pub max_tokens: u32,
    pub timeout_secs: u64,
}

/// LLM 설정
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LlmConfig {
    pub backends: Vec<LlmBackendConfig>,
    /// 모델 키 생략 시 사용
    pub default_model: String,
}

impl Default for LlmConfig {
    fn default() -> Self {
        Self {
            backends: vec![
                LlmBackendConfig {
                    key: "api".to_string(),
                    provider: LlmProvider::OpenAi,
                    base_url: "https://api.openai.com".to_string(),
                    model_name: "gpt-3.5-turbo".to_string(),
                    api_key: None,
                    temperature: 0.0,
                    max_tokens: 2000,
                    timeout_secs: 120,
                },
                LlmBackendConfig {
                    key: "local".to_string(),
                    provider: LlmProvider::Ollama,
                    base_url: "http://localhost:11434".to_string(),
                    model_name: "llama3.2".to_string(),
                    api_key: None,
                    temperature: 0.0,
                    max_tokens: 2000,
                    timeout_secs: 300,
                },
            ],
            default_model: "local".to_string(),
        }
    }
}

impl LlmConfig {
    /// 모델 키로 백엔드 설정 조회
    pub fn backend(&self, key: &str) -> Option<&LlmBackendConfig> {
        self.backends.iter().find(|b| b.key == key)
    }

    fn backend_mut(&mut self, key: &str) -> Option<&mut LlmBackendConfig> {
        self.backends.iter_mut().find(|b| b.key == key)
    }
}

// ============================================================================
// AppConfig
// ============================================================================

/// 애플리케이션 전체 설정
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AppConfig {
    /// 데이터 저장 위치
    pub data_dir: PathBuf,
    /// 분류/동의어 사전 파일 (없으면 내장 사전)
    pub lexicon_path: Option<PathBuf>,
    pub router: RouterConfig,
    pub cache: CacheConfig,
    pub search: SearchConfig,
    pub chunking: ChunkingConfig,
    pub embedding: EmbeddingConfig,
    pub llm: LlmConfig,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            data_dir: get_data_dir(),
            lexicon_path: None,
            router: RouterConfig::default(),
            cache: CacheConfig::default(),
            search: SearchConfig::default(),
            chunking: ChunkingConfig::default(),
            embedding: EmbeddingConfig::default(),
            llm: LlmConfig::default(),
        }
    }
}

impl AppConfig {
    /// 기본값 + 환경변수
    pub fn from_env() -> QaResult<Self> {
        let mut config = Self::default();
        config.apply_env(|name| std::env::var(name).ok());
        config.validate()?;
        Ok(config)
    }

    /// 환경변수 조회 함수를 받아 덮어쓰기
    fn apply_env<F>(&mut self, var: F)
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(dir) = var("RAG_QA_DATA_DIR") {
            self.data_dir = PathBuf::from(dir);
        }
        if let Some(path) = var("RAG_QA_LEXICON") {
            self.lexicon_path = Some(PathBuf::from(path));
        }

        parse_into(&var, "RAG_QA_THRESHOLD", &mut self.router.default_threshold);
        parse_into(
            &var,
            "RAG_QA_PERSONAL_THRESHOLD",
            &mut self.router.personal_threshold,
        );
        parse_into(&var, "RAG_QA_CACHE_TTL_SECS", &mut self.cache.fast_ttl_secs);
        parse_into(
            &var,
            "RAG_QA_POPULAR_THRESHOLD",
            &mut self.cache.popular_threshold,
        );
        parse_into(&var, "RAG_QA_SEARCH_K", &mut self.search.k);
        parse_into(&var, "RAG_QA_CHUNK_SIZE", &mut self.chunking.basic_chunk_size);
        parse_into(&var, "RAG_QA_CHUNK_OVERLAP", &mut self.chunking.basic_overlap);

        if let Some(url) = var("EMBEDDING_BASE_URL") {
            self.embedding.base_url = url;
        }
        if let Some(model) = var("EMBEDDING_MODEL") {
            self.embedding.model = model;
        }
        parse_into(&var, "EMBEDDING_DIM", &mut self.embedding.dimension);

        if let Some(api) = self.llm.backend_mut("api") {
            if let Some(key) = var("OPENAI_API_KEY") {
                api.api_key = Some(key);
            }
            if let Some(model) = var("API_LLM_MODEL") {
                api.model_name = model;
            }
        }
        if let Some(local) = self.llm.backend_mut("local") {
            if let Some(url) = var("OLLAMA_BASE_URL") {
                local.base_url = url;
            }
            if let Some(model) = var("LOCAL_LLM_MODEL") {
                local.model_name = model;
            }
        }
        if let Some(model) = var("RAG_QA_DEFAULT_MODEL") {
            self.llm.default_model = model;
        }
    }

    /// 설정 검증
    pub fn validate(&self) -> QaResult<()> {
        let r = &self.router;
        for (name, value) in [
            ("default_threshold", r.default_threshold),
            ("personal_threshold", r.personal_threshold),
        ] {
            if !(0.0..=1.0).contains(&value) {
                return Err(QaError::Config(format!(
                    "{} must be within [0, 1], got {}",
                    name, value
                )));
            }
        }
        if r.personal_threshold >= r.default_threshold {
            return Err(QaError::Config(format!(
                "personal_threshold ({}) must be lower than default_threshold ({})",
                r.personal_threshold, r.default_threshold
            )));
        }
        if r.max_suggestions == 0 || r.context_top_k == 0 {
            return Err(QaError::Config(
                "max_suggestions and context_top_k must be positive".to_string(),
            ));
        }
        if self.cache.popular_threshold == 0 {
            return Err(QaError::Config("popular_threshold must be positive".to_string()));
        }
        if self.chunking.basic_overlap >= self.chunking.basic_chunk_size {
            return Err(QaError::Config(format!(
                "chunk overlap ({}) must be smaller than chunk size ({})",
                self.chunking.basic_overlap, self.chunking.basic_chunk_size
            )));
        }
        if self.chunking.custom_delimiter.is_empty() {
            return Err(QaError::Config("custom_delimiter must not be empty".to_string()));
        }
        if self.llm.backend(&self.llm.default_model).is_none() {
            return Err(QaError::Config(format!(
                "default model '{}' has no backend",
                self.llm.default_model
            )));
        }
        Ok(())
    }

    /// 빠른 계층 DB 경로
    pub fn fast_cache_path(&self) -> PathBuf {
        self.data_dir.join("cache").join("fast_cache.db")
    }

    /// 인기 질문 DB 경로
    pub fn popular_cache_path(&self) -> PathBuf {
        self.data_dir.join("cache").join("popular_cache.db")
    }

    /// 문서 레지스트리 DB 경로
    pub fn registry_path(&self) -> PathBuf {
        self.data_dir.join("documents.db")
    }

    /// LanceDB 경로
    pub fn vector_path(&self) -> PathBuf {
        self.data_dir.join("vectors.lance")
    }
}

/// 환경변수 값을 파싱해 대상에 넣기 (파싱 실패 시 경고 후 무시)
fn parse_into<F, T>(var: &F, name: &str, target: &mut T)
where
    F: Fn(&str) -> Option<String>,
    T: std::str::FromStr,
{
    if let Some(raw) = var(name) {
        match raw.trim().parse() {
            Ok(v) => *target = v,
            Err(_) => tracing::warn!("Ignoring invalid {}={}", name, raw),
        }
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn env_from(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |name| map.get(name).cloned()
    }

    #[test]
    fn test_defaults_are_valid() {
        let config = AppConfig::default();
        assert!(config.validate().is_ok());
        assert_eq!(config.router.default_threshold, 0.75);
        assert_eq!(config.router.personal_threshold, 0.65);
        assert_eq!(config.cache.popular_threshold, 5);
        assert_eq!(config.cache.fast_ttl_secs, 86400);
    }

    #[test]
    fn test_env_overrides() {
        let mut config = AppConfig::default();
        config.apply_env(env_from(&[
            ("RAG_QA_DATA_DIR", "/tmp/qa"),
            ("RAG_QA_THRESHOLD", "0.8"),
            ("RAG_QA_POPULAR_THRESHOLD", "3"),
            ("LOCAL_LLM_MODEL", "qwen2.5"),
        ]));

        assert_eq!(config.data_dir, PathBuf::from("/tmp/qa"));
        assert_eq!(config.router.default_threshold, 0.8);
        assert_eq!(config.cache.popular_threshold, 3);
        assert_eq!(config.llm.backend("local").map(|b| b.model_name.as_str()), Some("qwen2.5"));
        assert_eq!(config.fast_cache_path(), PathBuf::from("/tmp/qa/cache/fast_cache.db"));
    }

    #[test]
    fn test_invalid_env_value_is_ignored() {
        let mut config = AppConfig::default();
        config.apply_env(env_from(&[("RAG_QA_SEARCH_K", "many")]));
        assert_eq!(config.search.k, 5);
    }

    #[test]
    fn test_personal_threshold_must_be_lower() {
        let mut config = AppConfig::default();
        config.router.personal_threshold = 0.8;
        assert!(matches!(config.validate(), Err(QaError::Config(_))));
    }

    #[test]
    fn test_unknown_default_model_rejected() {
        let mut config = AppConfig::default();
        config.llm.default_model = "gpt-9".to_string();
        assert!(config.validate().is_err());
    }
}
