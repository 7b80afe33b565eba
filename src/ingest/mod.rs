//! 문서 수집 파이프라인
//!
//! 수집 → 텍스트 추출 → 체크섬 비교 → 두 전략으로 청킹 → 임베딩 → 저장 → 레지스트리 기록
//!
//! 내용이 바뀐 문서는 이전 청크를 두 컬렉션에서 지우고 다시 넣은 뒤,
//! 오래된 답변이 남지 않도록 빠른 캐시 계층을 비웁니다.

use std::path::Path;
use std::sync::Arc;

use anyhow::{Context, Result};
use chrono::Utc;
use serde::Serialize;

use crate::cache::TieredCache;
use crate::collector::{CollectedFile, CollectionStats, FileCollector};
use crate::config::ChunkingConfig;
use crate::embedding::EmbeddingProvider;
use crate::extractor::ContentExtractor;
use crate::knowledge::{
    checksum, Chunk, Chunker, Collection, DelimiterChunker, DocumentRecord, DocumentRegistry,
    DocumentStatus, FixedSizeChunker, LanceChunkStore,
};

// ============================================================================
// Report Types
// ============================================================================

/// 파일 하나의 처리 결과
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IngestOutcome {
    /// 처음 수집
    Ingested { basic: usize, custom: usize },
    /// 내용이 바뀌어 다시 수집
    Updated { basic: usize, custom: usize },
    /// 체크섬 동일
    Unchanged,
    /// 추출된 텍스트 없음
    Empty,
}

/// 경로 전체 수집 결과
#[derive(Debug, Default, Clone, Serialize)]
pub struct IngestReport {
    pub files_seen: usize,
    pub ingested: usize,
    pub updated: usize,
    pub unchanged: usize,
    pub empty: usize,
    pub failed: usize,
    pub basic_chunks: usize,
    pub custom_chunks: usize,
}

impl IngestReport {
    fn record(&mut self, outcome: IngestOutcome) {
        match outcome {
            IngestOutcome::Ingested { basic, custom } => {
                self.ingested += 1;
                self.basic_chunks += basic;
                self.custom_chunks += custom;
            }
            IngestOutcome::Updated { basic, custom } => {
                self.updated += 1;
                self.basic_chunks += basic;
                self.custom_chunks += custom;
            }
            IngestOutcome::Unchanged => self.unchanged += 1,
            IngestOutcome::Empty => self.empty += 1,
        }
    }
}

// ============================================================================
// Ingestor
// ============================================================================

pub struct Ingestor {
    collector: FileCollector,
    extractor: ContentExtractor,
    chunkers: Vec<Box<dyn Chunker>>,
    embedder: Arc<dyn EmbeddingProvider>,
    store: Arc<LanceChunkStore>,
    registry: Arc<DocumentRegistry>,
    cache: Arc<TieredCache>,
}

impl Ingestor {
    pub fn new(
        chunking: &ChunkingConfig,
        embedder: Arc<dyn EmbeddingProvider>,
        store: Arc<LanceChunkStore>,
        registry: Arc<DocumentRegistry>,
        cache: Arc<TieredCache>,
    ) -> Result<Self> {
        if embedder.dimension() != store.dimension() {
            anyhow::bail!(
                "Embedding dimension ({}) does not match vector store ({})",
                embedder.dimension(),
                store.dimension()
            );
        }

        let chunkers: Vec<Box<dyn Chunker>> = vec![
            Box::new(FixedSizeChunker::new(
                chunking.basic_chunk_size,
                chunking.basic_overlap,
            )?),
            Box::new(DelimiterChunker::new(chunking.custom_delimiter.clone())?),
        ];

        Ok(Self {
            collector: FileCollector::with_defaults(),
            extractor: ContentExtractor::new(),
            chunkers,
            embedder,
            store,
            registry,
            cache,
        })
    }

    /// 파일 또는 폴더 수집. 개별 파일 실패는 기록만 하고 계속 진행
    pub async fn ingest_path(&self, path: &Path, force: bool) -> Result<IngestReport> {
        let files = self.collector.collect(path)?;
        let stats = CollectionStats::from_files(&files);
        tracing::info!(
            "Ingesting {} files ({} text, {} pdf, {} docx, {} bytes)",
            stats.total_files,
            stats.text_files,
            stats.pdf_files,
            stats.docx_files,
            stats.total_size
        );

        let mut report = IngestReport {
            files_seen: files.len(),
            ..Default::default()
        };

        for file in &files {
            match self.ingest_file(file, force).await {
                Ok(outcome) => report.record(outcome),
                Err(e) => {
                    tracing::error!("Failed to ingest {:?}: {:#}", file.path, e);
                    report.failed += 1;
                }
            }
        }

        Ok(report)
    }

    /// 파일 하나 수집
    pub async fn ingest_file(&self, file: &CollectedFile, force: bool) -> Result<IngestOutcome> {
        let source = file.source_name();
        let text = self.extractor.extract(&file.path, file.file_type).await?;
        if text.trim().is_empty() {
            tracing::warn!("No text in {}, skipping", source);
            return Ok(IngestOutcome::Empty);
        }

        let sum = checksum(&text);
        let status = self.registry.status(&source, &sum)?;
        if status == DocumentStatus::Unchanged && !force {
            tracing::debug!("Unchanged: {}", source);
            return Ok(IngestOutcome::Unchanged);
        }

        // 미등록 문서라도 이전 실패가 남긴 청크가 있을 수 있음
        for collection in Collection::ALL {
            let removed = self.store.delete_by_source(collection, &source).await?;
            if removed > 0 {
                tracing::debug!("Removed {} old chunks of {} from {}", removed, source, collection);
            }
        }

        let mut basic = 0;
        let mut custom = 0;
        for chunker in &self.chunkers {
            let inserted = self.write_chunks(chunker.as_ref(), &text, &source).await?;
            match chunker.collection() {
                Collection::Basic => basic += inserted,
                Collection::Custom => custom += inserted,
            }
        }

        self.registry.upsert(&DocumentRecord {
            source_file: source.clone(),
            checksum: sum,
            basic_chunks: basic,
            custom_chunks: custom,
            ingested_at: Utc::now(),
        })?;

        tracing::info!("Ingested {} (basic {}, custom {})", source, basic, custom);

        if status == DocumentStatus::Changed {
            if let Err(e) = self.cache.clear_all() {
                tracing::warn!("Failed to invalidate fast cache after update: {}", e);
            }
        }

        if status == DocumentStatus::New {
            Ok(IngestOutcome::Ingested { basic, custom })
        } else {
            Ok(IngestOutcome::Updated { basic, custom })
        }
    }

    async fn write_chunks(&self, chunker: &dyn Chunker, text: &str, source: &str) -> Result<usize> {
        let collection = chunker.collection();
        let chunks: Vec<Chunk> = chunker
            .chunk(text)
            .into_iter()
            .map(|piece| Chunk::new(piece.content, source, collection, piece.metadata))
            .collect();
        if chunks.is_empty() {
            return Ok(0);
        }

        let contents: Vec<String> = chunks.iter().map(|c| c.content.clone()).collect();
        let embeddings = self
            .embedder
            .embed_batch(&contents)
            .await
            .with_context(|| format!("Failed to embed {} chunks ({})", source, chunker.name()))?;

        self.store.insert(collection, &chunks, &embeddings).await
    }

    /// 두 컬렉션과 레지스트리를 비움 (캐시도 함께 무효화)
    pub async fn reset_collections(&self) -> Result<usize> {
        for collection in Collection::ALL {
            self.store.reset(collection).await?;
        }
        let removed = self.registry.clear()?;
        if let Err(e) = self.cache.clear_all() {
            tracing::warn!("Failed to clear fast cache after reset: {}", e);
        }
        tracing::info!("Reset collections ({} documents unregistered)", removed);
        Ok(removed)
    }
}

// ============================================================================
// Tests
// ============================================================================
