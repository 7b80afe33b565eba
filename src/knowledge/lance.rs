//! LanceDB 청크 저장소
//!
//! 컬렉션마다 테이블 하나 (`basic_chunks`, `custom_chunks`).
//! 코사인 거리로 검색하고 `1 - distance`를 유사도로 돌려줍니다.
//! ref: https://lancedb.github.io/lancedb/

use std::path::Path;
use std::sync::Arc;

use anyhow::{Context, Result};
use arrow_array::{
    Array, FixedSizeListArray, Float32Array, RecordBatch, RecordBatchIterator, StringArray,
};
use arrow_schema::{DataType, Field, Schema};
use futures::TryStreamExt;
use lancedb::connection::Connection;
use lancedb::query::{ExecutableQuery, QueryBase};
use lancedb::DistanceType;

use super::chunk::{score_from_distance, Chunk, ChunkMetadata, Collection, SearchResult};

// ============================================================================
// LanceChunkStore
// ============================================================================

/// LanceDB 청크 저장소
pub struct LanceChunkStore {
    db: Connection,
    dimension: usize,
}

impl LanceChunkStore {
    /// 저장소 열기
    ///
    /// # Arguments
    /// * `path` - .lance 디렉토리 경로
    /// * `dimension` - 임베딩 차원
    pub async fn open(path: &Path, dimension: usize) -> Result<Self> {
        if let Some(parent) = path.parent() {
            if !parent.exists() {
                tokio::fs::create_dir_all(parent)
                    .await
                    .context("Failed to create LanceDB directory")?;
            }
        }

        let path_str = path
            .to_str()
            .ok_or_else(|| anyhow::anyhow!("Invalid path encoding"))?;

        let db = lancedb::connect(path_str)
            .execute()
            .await
            .context("Failed to connect to LanceDB")?;

        Ok(Self { db, dimension })
    }

    pub fn dimension(&self) -> usize {
        self.dimension
    }

    fn schema(&self) -> Schema {
        Schema::new(vec![
            Field::new("id", DataType::Utf8, false),
            Field::new("content", DataType::Utf8, false),
            Field::new("source_file", DataType::Utf8, false),
            Field::new("metadata", DataType::Utf8, false),
            Field::new(
                "embedding",
                DataType::FixedSizeList(
                    Arc::new(Field::new("item", DataType::Float32, true)),
                    self.dimension as i32,
                ),
                false,
            ),
        ])
    }

    /// 청크 + 임베딩 → RecordBatch
    fn to_batch(&self, chunks: &[Chunk], embeddings: &[Vec<f32>]) -> Result<RecordBatch> {
        if chunks.len() != embeddings.len() {
            anyhow::bail!(
                "Chunk/embedding count mismatch: {} vs {}",
                chunks.len(),
                embeddings.len()
            );
        }
        if let Some(bad) = embeddings.iter().find(|e| e.len() != self.dimension) {
            anyhow::bail!(
                "Embedding dimension mismatch: expected {}, got {}",
                self.dimension,
                bad.len()
            );
        }

        let ids: Vec<&str> = chunks.iter().map(|c| c.id.as_str()).collect();
        let contents: Vec<&str> = chunks.iter().map(|c| c.content.as_str()).collect();
        let sources: Vec<&str> = chunks.iter().map(|c| c.source_file.as_str()).collect();
        let metadata: Vec<String> = chunks
            .iter()
            .map(|c| serde_json::to_string(&c.metadata))
            .collect::<std::result::Result<_, _>>()
            .context("Failed to serialize chunk metadata")?;

        let flat: Vec<f32> = embeddings.iter().flat_map(|e| e.iter().copied()).collect();
        let field = Arc::new(Field::new("item", DataType::Float32, true));
        let embedding_list = FixedSizeListArray::try_new(
            field,
            self.dimension as i32,
            Arc::new(Float32Array::from(flat)) as Arc<dyn Array>,
            None,
        )
        .context("Failed to create embedding array")?;

        RecordBatch::try_new(
            Arc::new(self.schema()),
            vec![
                Arc::new(StringArray::from(ids)),
                Arc::new(StringArray::from(contents)),
                Arc::new(StringArray::from(sources)),
                Arc::new(StringArray::from(metadata)),
                Arc::new(embedding_list),
            ],
        )
        .context("Failed to create RecordBatch")
    }

    async fn table_exists(&self, collection: Collection) -> bool {
        self.db
            .table_names()
            .execute()
            .await
            .map(|names| names.iter().any(|n| n == collection.table_name()))
            .unwrap_or(false)
    }

    async fn open_table(&self, collection: Collection) -> Result<Option<lancedb::table::Table>> {
        if !self.table_exists(collection).await {
            return Ok(None);
        }
        let table = self
            .db
            .open_table(collection.table_name())
            .execute()
            .await
            .with_context(|| format!("Failed to open table {}", collection.table_name()))?;
        Ok(Some(table))
    }

    /// 청크 삽입 (테이블이 없으면 생성)
    pub async fn insert(
        &self,
        collection: Collection,
        chunks: &[Chunk],
        embeddings: &[Vec<f32>],
    ) -> Result<usize> {
        if chunks.is_empty() {
            return Ok(0);
        }

        let batch = self.to_batch(chunks, embeddings)?;
        let schema = batch.schema();
        let batches = RecordBatchIterator::new(vec![Ok(batch)], schema);

        match self.open_table(collection).await? {
            Some(table) => {
                table
                    .add(batches)
                    .execute()
                    .await
                    .context("Failed to add chunks to table")?;
            }
            None => {
                self.db
                    .create_table(collection.table_name(), batches)
                    .execute()
                    .await
                    .context("Failed to create table")?;
            }
        }

        tracing::debug!("Inserted {} chunks into {}", chunks.len(), collection);
        Ok(chunks.len())
    }

    /// 최근접 검색 (점수 내림차순)
    pub async fn search(
        &self,
        collection: Collection,
        query_embedding: &[f32],
        limit: usize,
    ) -> Result<Vec<SearchResult>> {
        let Some(table) = self.open_table(collection).await? else {
            return Ok(vec![]);
        };

        let stream = table
            .vector_search(query_embedding.to_vec())
            .context("Failed to create vector search")?
            .distance_type(DistanceType::Cosine)
            .limit(limit)
            .execute()
            .await
            .context("Failed to execute vector search")?;

        let batches: Vec<RecordBatch> = stream.try_collect().await?;
        let mut results = Vec::new();

        for batch in batches {
            let ids = string_column(&batch, "id")?;
            let contents = string_column(&batch, "content")?;
            let sources = string_column(&batch, "source_file")?;
            let metadata = string_column(&batch, "metadata")?;
            // _distance 컬럼 (LanceDB가 자동 추가)
            let distances = batch
                .column_by_name("_distance")
                .and_then(|c| c.as_any().downcast_ref::<Float32Array>())
                .ok_or_else(|| anyhow::anyhow!("Missing _distance column"))?;

            for i in 0..batch.num_rows() {
                let meta: ChunkMetadata =
                    serde_json::from_str(metadata.value(i)).unwrap_or_default();
                let chunk = Chunk {
                    id: ids.value(i).to_string(),
                    content: contents.value(i).to_string(),
                    source_file: sources.value(i).to_string(),
                    collection,
                    metadata: meta,
                };
                results.push(SearchResult::new(chunk, score_from_distance(distances.value(i))));
            }
        }

        super::chunk::sort_by_score(&mut results);
        Ok(results)
    }

    /// 원본 파일의 청크 삭제
    pub async fn delete_by_source(&self, collection: Collection, source_file: &str) -> Result<usize> {
        let Some(table) = self.open_table(collection).await? else {
            return Ok(0);
        };

        let filter = format!("source_file = '{}'", source_file.replace('\'', "''"));
        let before = table
            .count_rows(Some(filter.clone()))
            .await
            .context("Failed to count rows for source")?;
        if before == 0 {
            return Ok(0);
        }

        table
            .delete(&filter)
            .await
            .context("Failed to delete chunks")?;

        tracing::debug!("Deleted {} chunks of {} from {}", before, source_file, collection);
        Ok(before)
    }

    /// 청크 개수
    pub async fn count(&self, collection: Collection) -> Result<usize> {
        let Some(table) = self.open_table(collection).await? else {
            return Ok(0);
        };
        table.count_rows(None).await.context("Failed to count rows")
    }

    /// 컬렉션 초기화 (테이블 삭제)
    pub async fn reset(&self, collection: Collection) -> Result<()> {
        if self.table_exists(collection).await {
            self.db
                .drop_table(collection.table_name())
                .await
                .with_context(|| format!("Failed to drop table {}", collection.table_name()))?;
            tracing::info!("Reset collection {}", collection);
        }
        Ok(())
    }
}

fn string_column<'a>(batch: &'a RecordBatch, name: &str) -> Result<&'a StringArray> {
    batch
        .column_by_name(name)
        .and_then(|c| c.as_any().downcast_ref::<StringArray>())
        .ok_or_else(|| anyhow::anyhow!("Missing {} column", name))
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    const DIM: usize = 4;

    fn chunk(content: &str, source: &str, collection: Collection) -> Chunk {
        Chunk::new(content, source, collection, ChunkMetadata::default())
    }

    async fn create_test_store() -> (TempDir, LanceChunkStore) {
        let dir = TempDir::new().unwrap();
        let store = LanceChunkStore::open(&dir.path().join("test.lance"), DIM)
            .await
            .unwrap();
        (dir, store)
    }

    #[tokio::test]
    async fn test_insert_and_count_per_collection() {
        let (_dir, store) = create_test_store().await;
        assert_eq!(store.count(Collection::Basic).await.unwrap(), 0);

        let chunks = vec![
            chunk("a", "a.md", Collection::Basic),
            chunk("b", "a.md", Collection::Basic),
        ];
        let embeddings = vec![vec![1.0, 0.0, 0.0, 0.0], vec![0.0, 1.0, 0.0, 0.0]];
        assert_eq!(
            store.insert(Collection::Basic, &chunks, &embeddings).await.unwrap(),
            2
        );

        assert_eq!(store.count(Collection::Basic).await.unwrap(), 2);
        assert_eq!(store.count(Collection::Custom).await.unwrap(), 0);
    }

    #[tokio::test]
    async fn test_search_scores_by_cosine() {
        let (_dir, store) = create_test_store().await;

        let mut meta = ChunkMetadata::default();
        meta.section = Some("발급".to_string());
        let chunks = vec![
            Chunk::new("발급 절차", "guide.md", Collection::Custom, meta),
            chunk("연회비", "guide.md", Collection::Custom),
        ];
        let embeddings = vec![vec![1.0, 0.0, 0.0, 0.0], vec![0.0, 1.0, 0.0, 0.0]];
        store
            .insert(Collection::Custom, &chunks, &embeddings)
            .await
            .unwrap();

        let results = store
            .search(Collection::Custom, &[1.0, 0.0, 0.0, 0.0], 2)
            .await
            .unwrap();

        assert_eq!(results.len(), 2);
        assert_eq!(results[0].chunk.content, "발급 절차");
        assert!((results[0].score - 1.0).abs() < 1e-4);
        assert!(results[1].score < 0.01);
        assert_eq!(results[0].chunk.metadata.section.as_deref(), Some("발급"));
        assert_eq!(results[0].chunk.collection, Collection::Custom);
    }

    #[tokio::test]
    async fn test_search_missing_table_is_empty() {
        let (_dir, store) = create_test_store().await;
        let results = store
            .search(Collection::Basic, &[1.0, 0.0, 0.0, 0.0], 5)
            .await
            .unwrap();
        assert!(results.is_empty());
    }

    #[tokio::test]
    async fn test_delete_by_source() {
        let (_dir, store) = create_test_store().await;
        let chunks = vec![
            chunk("a1", "a.md", Collection::Basic),
            chunk("a2", "a.md", Collection::Basic),
            chunk("b1", "b's.md", Collection::Basic),
        ];
        let embeddings = vec![vec![0.5; DIM]; 3];
        store
            .insert(Collection::Basic, &chunks, &embeddings)
            .await
            .unwrap();

        assert_eq!(store.delete_by_source(Collection::Basic, "a.md").await.unwrap(), 2);
        assert_eq!(store.delete_by_source(Collection::Basic, "b's.md").await.unwrap(), 1);
        assert_eq!(store.count(Collection::Basic).await.unwrap(), 0);
    }

    #[tokio::test]
    async fn test_dimension_mismatch_rejected() {
        let (_dir, store) = create_test_store().await;
        let chunks = vec![chunk("a", "a.md", Collection::Basic)];
        let err = store
            .insert(Collection::Basic, &chunks, &[vec![1.0, 2.0]])
            .await
            .unwrap_err();
        assert!(err.to_string().contains("dimension"));
    }

    #[tokio::test]
    async fn test_reset() {
        let (_dir, store) = create_test_store().await;
        let chunks = vec![chunk("a", "a.md", Collection::Basic)];
        store
            .insert(Collection::Basic, &chunks, &[vec![0.1; DIM]])
            .await
            .unwrap();

        store.reset(Collection::Basic).await.unwrap();
        assert_eq!(store.count(Collection::Basic).await.unwrap(), 0);
        // 없는 테이블 초기화도 성공
        store.reset(Collection::Custom).await.unwrap();
    }
}
