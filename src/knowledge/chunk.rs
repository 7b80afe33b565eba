//! 청크 / 컬렉션 / 검색 결과 타입

use serde::{Deserialize, Serialize};

// ============================================================================
// Collection
// ============================================================================

/// 청크 컬렉션
///
/// - `Basic`: 고정 크기 청킹
/// - `Custom`: 구분자 기반 청킹
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Collection {
    Basic,
    Custom,
}

impl Collection {
    /// 검색 순서대로 전체 컬렉션
    pub const ALL: [Collection; 2] = [Collection::Basic, Collection::Custom];

    pub fn as_str(&self) -> &'static str {
        match self {
            Collection::Basic => "basic",
            Collection::Custom => "custom",
        }
    }

    /// LanceDB 테이블 이름
    pub fn table_name(&self) -> &'static str {
        match self {
            Collection::Basic => "basic_chunks",
            Collection::Custom => "custom_chunks",
        }
    }
}

impl std::fmt::Display for Collection {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for Collection {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "basic" => Ok(Collection::Basic),
            "custom" => Ok(Collection::Custom),
            other => anyhow::bail!("Unknown collection: {}", other),
        }
    }
}

// ============================================================================
// Chunk
// ============================================================================

/// 청크 메타데이터 (LanceDB에는 JSON 문자열로 저장)
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ChunkMetadata {
    /// 문서 내 순번 (0-based)
    pub chunk_index: usize,
    /// 섹션 제목 (custom 청크의 첫 줄)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub section: Option<String>,
    /// 분할에 사용한 구분자
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub delimiter: Option<String>,
    /// `![..](ref)` 이미지 참조
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub images: Vec<String>,
}

/// 저장 단위 청크
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Chunk {
    pub id: String,
    pub content: String,
    pub source_file: String,
    pub collection: Collection,
    pub metadata: ChunkMetadata,
}

impl Chunk {
    pub fn new(
        content: impl Into<String>,
        source_file: impl Into<String>,
        collection: Collection,
        metadata: ChunkMetadata,
    ) -> Self {
        Self {
            id: uuid::Uuid::new_v4().to_string(),
            content: content.into(),
            source_file: source_file.into(),
            collection,
            metadata,
        }
    }
}

/// 검색 결과 (청크 + 유사도)
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SearchResult {
    pub chunk: Chunk,
    /// 코사인 유사도 (0.0 ~ 1.0)
    pub score: f32,
}

impl SearchResult {
    pub fn new(chunk: Chunk, score: f32) -> Self {
        Self { chunk, score }
    }
}

/// 코사인 거리 → 유사도 ([0, 1]로 제한)
pub fn score_from_distance(distance: f32) -> f32 {
    if distance.is_nan() {
        return 0.0;
    }
    (1.0 - distance).clamp(0.0, 1.0)
}

/// 점수 내림차순 정렬 (같은 점수는 기존 순서 유지)
pub fn sort_by_score(results: &mut [SearchResult]) {
    results.sort_by(|a, b| b.score.total_cmp(&a.score));
}
