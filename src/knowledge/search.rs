//! 컬렉션 검색 경계
//!
//! 서비스는 `ChunkSearch`만 알고, 실제 구현은 임베딩 + LanceDB 조합입니다.

use std::sync::Arc;

use async_trait::async_trait;

use super::chunk::{Collection, SearchResult};
use super::lance::LanceChunkStore;
use crate::embedding::EmbeddingProvider;
use crate::error::{QaError, QaResult};

/// 질의 문자열로 컬렉션 검색
#[async_trait]
pub trait ChunkSearch: Send + Sync {
    /// 점수 내림차순 상위 k개
    async fn search(
        &self,
        query: &str,
        collection: Collection,
        k: usize,
    ) -> QaResult<Vec<SearchResult>>;
}

/// 질의를 임베딩한 뒤 LanceDB에서 최근접 검색
pub struct SemanticSearcher {
    embedder: Arc<dyn EmbeddingProvider>,
    store: Arc<LanceChunkStore>,
}

impl SemanticSearcher {
    pub fn new(embedder: Arc<dyn EmbeddingProvider>, store: Arc<LanceChunkStore>) -> Self {
        Self { embedder, store }
    }
}

#[async_trait]
impl ChunkSearch for SemanticSearcher {
    async fn search(
        &self,
        query: &str,
        collection: Collection,
        k: usize,
    ) -> QaResult<Vec<SearchResult>> {
        let unavailable = |e: anyhow::Error| QaError::SearchServiceUnavailable {
            collection: collection.to_string(),
            reason: format!("{:#}", e),
        };

        let embedding = self.embedder.embed(query).await.map_err(unavailable)?;
        self.store
            .search(collection, &embedding, k)
            .await
            .map_err(unavailable)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::knowledge::{Chunk, ChunkMetadata};
    use anyhow::Result;
    use tempfile::TempDir;

    /// 키워드 포함 여부로 축을 고르는 테스트용 임베딩
    struct KeywordEmbedding;

    #[async_trait]
    impl EmbeddingProvider for KeywordEmbedding {
        async fn embed(&self, text: &str) -> Result<Vec<f32>> {
            Ok(if text.contains("연회비") {
                vec![0.0, 1.0, 0.0]
            } else {
                vec![1.0, 0.0, 0.0]
            })
        }

        fn dimension(&self) -> usize {
            3
        }

        fn name(&self) -> &str {
            "keyword"
        }
    }

    struct BrokenEmbedding;

    #[async_trait]
    impl EmbeddingProvider for BrokenEmbedding {
        async fn embed(&self, _text: &str) -> Result<Vec<f32>> {
            anyhow::bail!("connection refused")
        }

        fn dimension(&self) -> usize {
            3
        }

        fn name(&self) -> &str {
            "broken"
        }
    }

    #[tokio::test]
    async fn test_semantic_search() {
        let dir = TempDir::new().unwrap();
        let store = Arc::new(
            LanceChunkStore::open(&dir.path().join("s.lance"), 3)
                .await
                .unwrap(),
        );
        let chunks = vec![
            Chunk::new("발급 안내", "a.md", Collection::Basic, ChunkMetadata::default()),
            Chunk::new("연회비 안내", "a.md", Collection::Basic, ChunkMetadata::default()),
        ];
        store
            .insert(
                Collection::Basic,
                &chunks,
                &[vec![1.0, 0.0, 0.0], vec![0.0, 1.0, 0.0]],
            )
            .await
            .unwrap();

        let searcher = SemanticSearcher::new(Arc::new(KeywordEmbedding), store);
        let results = searcher
            .search("연회비 얼마", Collection::Basic, 1)
            .await
            .unwrap();
        assert_eq!(results.len(), 1);
        assert_eq!(results[0].chunk.content, "연회비 안내");
    }

    #[tokio::test]
    async fn test_embedding_failure_maps_to_unavailable() {
        let dir = TempDir::new().unwrap();
        let store = Arc::new(
            LanceChunkStore::open(&dir.path().join("s.lance"), 3)
                .await
                .unwrap(),
        );
        let searcher = SemanticSearcher::new(Arc::new(BrokenEmbedding), store);

        let err = searcher
            .search("질문", Collection::Custom, 5)
            .await
            .unwrap_err();
        assert!(matches!(
            err,
            QaError::SearchServiceUnavailable { ref collection, .. } if collection == "custom"
        ));
    }
}
