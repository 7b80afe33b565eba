//! 계층형 캐시
//!
//! - 빠른 계층 (`FastTier`): TTL이 있는 키-값 저장소. 답변 엔트리와 조회수 카운터를 둡니다.
//! - 영구 계층 (`DurableTier`): 인기 질문 테이블. 조회수가 기준에 닿은 엔트리만 승격됩니다.
//!
//! 한 키는 동시에 한 계층에만 존재합니다.
//! 두 계층 모두 SQLite 구현을 기본으로 제공합니다.

mod durable;
mod fast;
mod tiered;

use std::time::Duration;

use anyhow::Result;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

pub use durable::SqlitePopularStore;
pub use fast::{open_fast_tier, SqliteFastTier, UnavailableFastTier};
pub use tiered::{CacheHit, CacheLookup, CacheStats, PutOutcome, TieredCache};

// ============================================================================
// Types
// ============================================================================

/// 캐시 엔트리
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CacheEntry {
    /// `cache_key(question, model)`
    pub key: String,
    pub question: String,
    pub model: String,
    /// 응답 페이로드 (JSON)
    pub answer: serde_json::Value,
    pub hit_count: u64,
    pub created_at: DateTime<Utc>,
    pub last_accessed: DateTime<Utc>,
}

impl CacheEntry {
    pub fn new(question: &str, model: &str, answer: serde_json::Value) -> Self {
        let now = Utc::now();
        Self {
            key: cache_key(question, model),
            question: question.trim().to_string(),
            model: model.to_string(),
            answer,
            hit_count: 0,
            created_at: now,
            last_accessed: now,
        }
    }
}

/// 엔트리를 제공한 계층
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CacheTier {
    Fast,
    Durable,
}

impl CacheTier {
    pub fn as_str(&self) -> &'static str {
        match self {
            CacheTier::Fast => "fast",
            CacheTier::Durable => "durable",
        }
    }
}

// ============================================================================
// Tier Traits
// ============================================================================

/// 빠른 계층 (TTL 키-값)
pub trait FastTier: Send + Sync {
    /// 만료되지 않은 값
    fn get(&self, key: &str) -> Result<Option<String>>;

    fn set_with_ttl(&self, key: &str, value: &str, ttl: Duration) -> Result<()>;

    /// 삭제 여부 반환
    fn delete(&self, key: &str) -> Result<bool>;

    /// 원자적 증가 후 값 반환 (새 키는 1, TTL은 처음 생성 시에만 설정)
    fn increment(&self, key: &str, ttl: Duration) -> Result<u64>;

    /// 전체 삭제
    fn clear(&self) -> Result<usize>;

    /// 접두사로 시작하는 살아있는 키 수
    fn count_prefix(&self, prefix: &str) -> Result<usize>;
}

/// 영구 계층 (인기 질문)
pub trait DurableTier: Send + Sync {
    /// 키가 이미 있으면 무시, 새로 들어갔으면 true
    fn insert(&self, entry: &CacheEntry) -> Result<bool>;

    fn select_by_key(&self, key: &str) -> Result<Option<CacheEntry>>;

    /// hit_count + 1, last_accessed 갱신
    fn touch(&self, key: &str) -> Result<()>;

    /// hit_count 내림차순
    fn select_ordered_by_hits(&self, limit: usize) -> Result<Vec<CacheEntry>>;

    fn delete_all(&self) -> Result<usize>;

    fn count(&self) -> Result<usize>;
}

// ============================================================================
// Key Functions
// ============================================================================

/// 캐시 키: SHA-256(lower(trim(question)) + ":" + model)
pub fn cache_key(question: &str, model: &str) -> String {
    let normalized = format!("{}:{}", question.trim().to_lowercase(), model);
    format!("{:x}", Sha256::digest(normalized.as_bytes()))
}

/// 빠른 계층 엔트리 키 접두사
pub(crate) const ENTRY_PREFIX: &str = "entry:";
/// 조회수 카운터 키 접두사
pub(crate) const COUNTER_PREFIX: &str = "hits:";

pub(crate) fn entry_key(key: &str) -> String {
    format!("{}{}", ENTRY_PREFIX, key)
}

pub(crate) fn counter_key(key: &str) -> String {
    format!("{}{}", COUNTER_PREFIX, key)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cache_key_normalizes_question() {
        assert_eq!(
            cache_key("  BC카드 발급 ", "local"),
            cache_key("bc카드 발급", "local")
        );
        assert_ne!(cache_key("BC카드 발급", "local"), cache_key("BC카드 발급", "api"));
        assert_eq!(cache_key("q", "m").len(), 64);
    }

    #[test]
    fn test_entry_serialization() {
        let entry = CacheEntry::new(" 질문 ", "api", serde_json::json!({"answer": "답"}));
        assert_eq!(entry.question, "질문");

        let raw = serde_json::to_string(&entry).unwrap();
        let back: CacheEntry = serde_json::from_str(&raw).unwrap();
        assert_eq!(back, entry);
    }
}
