//! rag-qa - 한국어 문서 QA 시스템
//!
//! 두 벡터 컬렉션(basic/custom)을 검색한 뒤 최고 유사도가 질문 분류별 임계값을
//! 넘을 때만 LLM으로 답변하고, 넘지 못하면 추천 질문을 돌려줍니다.
//! 답변은 빠른 계층(TTL)과 인기 질문 계층으로 나뉜 캐시에 저장됩니다.

pub mod assembler;
pub mod cache;
pub mod cli;
pub mod collector;
pub mod config;
pub mod embedding;
pub mod error;
pub mod extractor;
pub mod http;
pub mod ingest;
pub mod knowledge;
pub mod lexicon;
pub mod llm;
pub mod query;
pub mod router;
pub mod service;
pub mod sqlite;

// Re-exports
pub use assembler::{ResponsePayload, SimilarityInfo};
pub use cache::{CacheEntry, CacheStats, TieredCache};
pub use config::AppConfig;
pub use embedding::{EmbeddingProvider, OllamaEmbedding};
pub use error::{QaError, QaResult};
pub use ingest::{IngestReport, Ingestor};
pub use knowledge::{Chunk, ChunkSearch, Collection, LanceChunkStore, SearchResult};
pub use llm::{LlmClient, LlmRegistry};
pub use router::{Category, RouteOutcome, RoutingDecision, SimilarityRouter};
pub use service::QaService;
