//! Knowledge 모듈 - 청크 컬렉션과 문서 레지스트리
//!
//! - LanceDB: `basic` / `custom` 두 컬렉션의 벡터 검색
//! - Chunker: 고정 크기 / 구분자 기반 분할
//! - Registry: SQLite 문서 체크섬 기록

mod chunk;
mod chunker;
mod lance;
mod registry;
mod search;

// Re-exports
pub use chunk::{
    score_from_distance, sort_by_score, Chunk, ChunkMetadata, Collection, SearchResult,
};
pub use chunker::{ChunkPiece, Chunker, DelimiterChunker, FixedSizeChunker};
pub use lance::LanceChunkStore;
pub use registry::{checksum, DocumentRecord, DocumentRegistry, DocumentStatus, RegistryStats};
pub use search::{ChunkSearch, SemanticSearcher};
