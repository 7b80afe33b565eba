//! 계층형 캐시 오케스트레이션
//!
//! `get`은 매번 조회수를 올리고 빠른 계층 → 영구 계층 순으로 찾은 뒤 승격을 시도합니다.
//! `put`은 빠른 계층에만 씁니다. 영구 계층에는 승격으로만 들어갑니다.
//!
//! 저장소 장애는 밖으로 내보내지 않고 `degraded` 플래그로 알립니다.

use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use serde::Serialize;

use super::{counter_key, entry_key, CacheEntry, CacheTier, DurableTier, FastTier, ENTRY_PREFIX};
use crate::config::CacheConfig;
use crate::error::{QaError, QaResult};

// ============================================================================
// Types
// ============================================================================

/// 캐시 적중
#[derive(Debug, Clone, PartialEq)]
pub struct CacheHit {
    pub entry: CacheEntry,
    pub tier: CacheTier,
}

/// `get` 결과
#[derive(Debug, Clone, PartialEq, Default)]
pub struct CacheLookup {
    pub hit: Option<CacheHit>,
    /// 한 계층 이상이 응답하지 않음
    pub degraded: bool,
}

/// `put` 결과
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct PutOutcome {
    /// 빠른 계층에 기록됨
    pub stored: bool,
    pub degraded: bool,
}

/// 캐시 통계
#[derive(Debug, Clone, Serialize)]
pub struct CacheStats {
    pub fast_entries: usize,
    pub durable_entries: usize,
    pub popular_threshold: u32,
    pub fast_ttl_secs: u64,
    pub degraded: bool,
}

// ============================================================================
// TieredCache
// ============================================================================

pub struct TieredCache {
    fast: Arc<dyn FastTier>,
    durable: Arc<dyn DurableTier>,
    config: CacheConfig,
}

impl TieredCache {
    pub fn new(fast: Arc<dyn FastTier>, durable: Arc<dyn DurableTier>, config: CacheConfig) -> Self {
        Self {
            fast,
            durable,
            config,
        }
    }

    fn fast_ttl(&self) -> Duration {
        Duration::from_secs(self.config.fast_ttl_secs)
    }

    fn counter_ttl(&self) -> Duration {
        Duration::from_secs(self.config.counter_ttl_secs)
    }

    /// 캐시 조회
    pub fn get(&self, question: &str, model: &str) -> CacheLookup {
        let key = super::cache_key(question, model);
        let mut lookup = CacheLookup::default();

        // 1. 조회수 (적중 여부와 무관하게)
        let hits = match self.fast.increment(&counter_key(&key), self.counter_ttl()) {
            Ok(n) => Some(n),
            Err(e) => {
                tracing::warn!("{}", QaError::fast_tier(format!("{:#}", e)));
                lookup.degraded = true;
                None
            }
        };

        // 2. 빠른 계층
        if !lookup.degraded {
            match self.read_fast(&key) {
                Ok(Some(entry)) => {
                    lookup.hit = Some(CacheHit {
                        entry,
                        tier: CacheTier::Fast,
                    })
                }
                Ok(None) => {}
                Err(e) => {
                    tracing::warn!("{}", e);
                    lookup.degraded = true;
                }
            }
        }

        // 3. 영구 계층
        if lookup.hit.is_none() {
            match self.durable.select_by_key(&key) {
                Ok(Some(mut entry)) => {
                    if let Err(e) = self.durable.touch(&key) {
                        tracing::warn!("Failed to update popular question hits: {:#}", e);
                    }
                    entry.hit_count += 1;
                    entry.last_accessed = Utc::now();
                    lookup.hit = Some(CacheHit {
                        entry,
                        tier: CacheTier::Durable,
                    });
                }
                Ok(None) => {}
                Err(e) => {
                    tracing::warn!("{}", QaError::durable_tier(format!("{:#}", e)));
                    lookup.degraded = true;
                }
            }
        }

        // 4. 승격
        if let (Some(hits), Some(hit)) = (hits, &lookup.hit) {
            if hit.tier == CacheTier::Fast && hits >= u64::from(self.config.popular_threshold) {
                if let Err(e) = self.promote(&hit.entry, hits) {
                    tracing::warn!("Promotion skipped: {}", e);
                    lookup.degraded = true;
                }
            }
        }

        tracing::debug!(
            "Cache get: hit={:?}, hits={:?}, degraded={}",
            lookup.hit.as_ref().map(|h| h.tier),
            hits,
            lookup.degraded
        );
        lookup
    }

    /// 빠른 계층에 저장 (이미 영구 계층에 있으면 아무것도 하지 않음)
    ///
    /// 영구 계층을 확인할 수 없으면 두 계층에 같은 키가 생기지 않도록 쓰지 않습니다.
    /// 저장 후 조회수가 기준 이상이면 바로 승격합니다.
    pub fn put(&self, question: &str, model: &str, answer: serde_json::Value) -> PutOutcome {
        let entry = CacheEntry::new(question, model, answer);
        let mut outcome = PutOutcome::default();

        match self.durable.select_by_key(&entry.key) {
            Ok(Some(_)) => {
                tracing::debug!("Cache put skipped: already popular");
                return outcome;
            }
            Ok(None) => {}
            Err(e) => {
                tracing::warn!("{}", QaError::durable_tier(format!("{:#}", e)));
                outcome.degraded = true;
                return outcome;
            }
        }

        let raw = match serde_json::to_string(&entry) {
            Ok(raw) => raw,
            Err(e) => {
                tracing::warn!("Failed to serialize cache entry: {}", e);
                return outcome;
            }
        };

        match self
            .fast
            .set_with_ttl(&entry_key(&entry.key), &raw, self.fast_ttl())
        {
            Ok(()) => outcome.stored = true,
            Err(e) => {
                tracing::warn!("{}", QaError::fast_tier(format!("{:#}", e)));
                outcome.degraded = true;
                return outcome;
            }
        }

        if let Err(e) = self.promote_if_popular(question, model) {
            tracing::warn!("Promotion skipped: {}", e);
            outcome.degraded = true;
        }

        outcome
    }

    /// 조회수가 기준 이상이고 빠른 계층에 엔트리가 있으면 영구 계층으로 승격
    ///
    /// 여러 번 호출해도 영구 계층에는 한 행만 남습니다.
    /// 요청 경로(`get`/`put`/승격) 중 유일하게 저장소 장애를 `BackingStoreUnavailable` 에러로 돌려줍니다.
    /// `get`/`put` 안에서 호출될 때는 이 에러가 `degraded` 플래그로 바뀝니다.
    pub fn promote_if_popular(&self, question: &str, model: &str) -> QaResult<bool> {
        let key = super::cache_key(question, model);

        let hits: u64 = self
            .fast
            .get(&counter_key(&key))
            .map_err(QaError::fast_tier)?
            .and_then(|raw| raw.parse().ok())
            .unwrap_or(0);
        if hits < u64::from(self.config.popular_threshold) {
            return Ok(false);
        }

        match self.read_fast(&key)? {
            Some(entry) => self.promote(&entry, hits),
            None => Ok(false),
        }
    }

    fn promote(&self, entry: &CacheEntry, hits: u64) -> QaResult<bool> {
        let mut popular = entry.clone();
        popular.hit_count = hits;
        popular.last_accessed = Utc::now();

        let inserted = self.durable.insert(&popular).map_err(QaError::durable_tier)?;
        self.fast
            .delete(&entry_key(&entry.key))
            .map_err(QaError::fast_tier)?;

        if inserted {
            tracing::info!("Promoted popular question ({} hits): {}", hits, entry.question);
        }
        Ok(inserted)
    }

    fn read_fast(&self, key: &str) -> QaResult<Option<CacheEntry>> {
        let raw = self.fast.get(&entry_key(key)).map_err(QaError::fast_tier)?;
        Ok(raw.and_then(|raw| match serde_json::from_str(&raw) {
            Ok(entry) => Some(entry),
            Err(e) => {
                tracing::warn!("Discarding unreadable cache entry {}: {}", key, e);
                None
            }
        }))
    }

    /// 빠른 계층 비우기 (엔트리 + 카운터). 영구 계층은 유지
    pub fn clear_all(&self) -> QaResult<usize> {
        let removed = self.fast.clear().map_err(QaError::fast_tier)?;
        tracing::info!("Cleared fast cache tier ({} keys)", removed);
        Ok(removed)
    }

    /// 두 계층 모두 비우기
    pub fn full_reset(&self) -> QaResult<(usize, usize)> {
        let fast = self.clear_all()?;
        let durable = self.durable.delete_all().map_err(QaError::durable_tier)?;
        tracing::info!("Cleared popular questions ({} rows)", durable);
        Ok((fast, durable))
    }

    pub fn stats(&self) -> CacheStats {
        let mut degraded = false;
        let fast_entries = self.fast.count_prefix(ENTRY_PREFIX).unwrap_or_else(|e| {
            tracing::warn!("{}", QaError::fast_tier(format!("{:#}", e)));
            degraded = true;
            0
        });
        let durable_entries = self.durable.count().unwrap_or_else(|e| {
            tracing::warn!("{}", QaError::durable_tier(format!("{:#}", e)));
            degraded = true;
            0
        });

        CacheStats {
            fast_entries,
            durable_entries,
            popular_threshold: self.config.popular_threshold,
            fast_ttl_secs: self.config.fast_ttl_secs,
            degraded,
        }
    }

    /// 인기 질문 (조회수 내림차순)
    pub fn popular(&self, limit: usize) -> QaResult<Vec<CacheEntry>> {
        self.durable
            .select_ordered_by_hits(limit)
            .map_err(QaError::durable_tier)
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cache::{SqliteFastTier, SqlitePopularStore, UnavailableFastTier};
    use anyhow::Result;
    use serde_json::json;
    use tempfile::TempDir;

    struct Fixture {
        _dir: TempDir,
        fast: Arc<SqliteFastTier>,
        durable: Arc<SqlitePopularStore>,
        cache: TieredCache,
    }

    fn fixture() -> Fixture {
        let dir = TempDir::new().unwrap();
        let fast = Arc::new(SqliteFastTier::open(&dir.path().join("fast.db")).unwrap());
        let durable = Arc::new(SqlitePopularStore::open(&dir.path().join("popular.db")).unwrap());
        let cache = TieredCache::new(fast.clone(), durable.clone(), CacheConfig::default());
        Fixture {
            _dir: dir,
            fast,
            durable,
            cache,
        }
    }

    /// 항상 실패하는 영구 계층
    struct DownDurableTier;

    impl DurableTier for DownDurableTier {
        fn insert(&self, _entry: &CacheEntry) -> Result<bool> {
            anyhow::bail!("database is locked")
        }
        fn select_by_key(&self, _key: &str) -> Result<Option<CacheEntry>> {
            anyhow::bail!("database is locked")
        }
        fn touch(&self, _key: &str) -> Result<()> {
            anyhow::bail!("database is locked")
        }
        fn select_ordered_by_hits(&self, _limit: usize) -> Result<Vec<CacheEntry>> {
            anyhow::bail!("database is locked")
        }
        fn delete_all(&self) -> Result<usize> {
            anyhow::bail!("database is locked")
        }
        fn count(&self) -> Result<usize> {
            anyhow::bail!("database is locked")
        }
    }

    #[test]
    fn test_put_then_get_round_trip() {
        let f = fixture();
        let answer = json!({"answer": "발급은 영업점에서 가능합니다."});

        let put = f.cache.put("BC카드 발급", "local", answer.clone());
        assert!(put.stored);
        assert!(!put.degraded);

        let lookup = f.cache.get("  bc카드 발급 ", "local");
        let hit = lookup.hit.unwrap();
        assert_eq!(hit.tier, CacheTier::Fast);
        assert_eq!(hit.entry.answer, answer);
        assert!(!lookup.degraded);

        // 모델이 다르면 다른 키
        assert!(f.cache.get("BC카드 발급", "api").hit.is_none());
    }

    #[test]
    fn test_miss_still_counts() {
        let f = fixture();
        f.cache.get("연회비", "local");
        f.cache.get("연회비", "local");

        let key = crate::cache::cache_key("연회비", "local");
        assert_eq!(f.fast.get(&counter_key(&key)).unwrap().as_deref(), Some("2"));
    }

    #[test]
    fn test_fifth_get_promotes() {
        let f = fixture();
        f.cache.put("연회비", "local", json!({"answer": "1만원"}));

        for _ in 0..4 {
            assert_eq!(f.cache.get("연회비", "local").hit.unwrap().tier, CacheTier::Fast);
        }
        assert_eq!(f.durable.count().unwrap(), 0);

        // 5번째 조회에서 승격
        let fifth = f.cache.get("연회비", "local");
        assert_eq!(fifth.hit.unwrap().tier, CacheTier::Fast);
        assert_eq!(f.durable.count().unwrap(), 1);
        assert_eq!(f.fast.count_prefix(ENTRY_PREFIX).unwrap(), 0);

        // 이후에는 영구 계층에서
        let sixth = f.cache.get("연회비", "local").hit.unwrap();
        assert_eq!(sixth.tier, CacheTier::Durable);
        assert_eq!(sixth.entry.hit_count, 6);
    }

    #[test]
    fn test_double_promotion_leaves_one_row() {
        let f = fixture();
        let key = crate::cache::cache_key("연회비", "local");
        f.cache.put("연회비", "local", json!({"answer": "1만원"}));
        f.fast
            .set_with_ttl(&counter_key(&key), "9", Duration::from_secs(60))
            .unwrap();

        assert!(f.cache.promote_if_popular("연회비", "local").unwrap());
        // 엔트리를 다시 빠른 계층에 넣어 경합을 흉내
        f.fast
            .set_with_ttl(
                &entry_key(&key),
                &serde_json::to_string(&CacheEntry::new("연회비", "local", json!({}))).unwrap(),
                Duration::from_secs(60),
            )
            .unwrap();
        assert!(!f.cache.promote_if_popular("연회비", "local").unwrap());

        assert_eq!(f.durable.count().unwrap(), 1);
        assert_eq!(
            f.durable.select_by_key(&key).unwrap().unwrap().answer,
            json!({"answer": "1만원"})
        );
    }

    #[test]
    fn test_below_threshold_not_promoted() {
        let f = fixture();
        f.cache.put("연회비", "local", json!({}));
        f.cache.get("연회비", "local");
        assert!(!f.cache.promote_if_popular("연회비", "local").unwrap());
        assert_eq!(f.durable.count().unwrap(), 0);
    }

    #[test]
    fn test_put_is_noop_for_popular_key() {
        let f = fixture();
        let popular = CacheEntry::new("연회비", "local", json!({"answer": "old"}));
        f.durable.insert(&popular).unwrap();

        let put = f.cache.put("연회비", "local", json!({"answer": "new"}));
        assert!(!put.stored);
        assert_eq!(f.fast.count_prefix(ENTRY_PREFIX).unwrap(), 0);

        let hit = f.cache.get("연회비", "local").hit.unwrap();
        assert_eq!(hit.tier, CacheTier::Durable);
        assert_eq!(hit.entry.answer, json!({"answer": "old"}));
    }

    #[test]
    fn test_put_promotes_when_misses_reached_threshold() {
        let f = fixture();
        for _ in 0..5 {
            assert!(f.cache.get("연회비", "local").hit.is_none());
        }

        let put = f.cache.put("연회비", "local", json!({"answer": "1만원"}));
        assert!(put.stored);
        assert!(!put.degraded);

        assert_eq!(f.durable.count().unwrap(), 1);
        assert_eq!(f.fast.count_prefix(ENTRY_PREFIX).unwrap(), 0);
        let hit = f.cache.get("연회비", "local").hit.unwrap();
        assert_eq!(hit.tier, CacheTier::Durable);
        assert_eq!(hit.entry.answer, json!({"answer": "1만원"}));
    }

    #[test]
    fn test_put_skips_fast_write_when_durable_unreadable() {
        let dir = TempDir::new().unwrap();
        let fast = Arc::new(SqliteFastTier::open(&dir.path().join("fast.db")).unwrap());
        let cache = TieredCache::new(fast.clone(), Arc::new(DownDurableTier), CacheConfig::default());

        let put = cache.put("연회비", "local", json!({"answer": "1만원"}));
        assert!(put.degraded);
        assert!(!put.stored);
        assert_eq!(fast.count_prefix(ENTRY_PREFIX).unwrap(), 0);

        let lookup = cache.get("연회비", "local");
        assert!(lookup.degraded);
        assert!(lookup.hit.is_none());
        assert!(matches!(
            cache.popular(10),
            Err(QaError::BackingStoreUnavailable { tier: "durable", .. })
        ));
    }

    #[test]
    fn test_clear_all_keeps_durable() {
        let f = fixture();
        f.durable
            .insert(&CacheEntry::new("인기 질문", "local", json!({"answer": "p"})))
            .unwrap();
        f.cache.put("일반 질문", "local", json!({"answer": "f"}));

        f.cache.clear_all().unwrap();

        assert!(f.cache.get("일반 질문", "local").hit.is_none());
        assert_eq!(
            f.cache.get("인기 질문", "local").hit.unwrap().tier,
            CacheTier::Durable
        );
    }

    #[test]
    fn test_full_reset_clears_both() {
        let f = fixture();
        f.durable
            .insert(&CacheEntry::new("인기 질문", "local", json!({})))
            .unwrap();
        f.cache.put("일반 질문", "local", json!({}));

        let (_, durable) = f.cache.full_reset().unwrap();
        assert_eq!(durable, 1);
        let stats = f.cache.stats();
        assert_eq!(stats.fast_entries, 0);
        assert_eq!(stats.durable_entries, 0);
    }

    #[test]
    fn test_degraded_fast_tier_uses_durable_only() {
        let dir = TempDir::new().unwrap();
        let durable = Arc::new(SqlitePopularStore::open(&dir.path().join("popular.db")).unwrap());
        durable
            .insert(&CacheEntry::new("인기 질문", "local", json!({"answer": "p"})))
            .unwrap();
        let cache = TieredCache::new(
            Arc::new(UnavailableFastTier::new("connection refused")),
            durable.clone(),
            CacheConfig::default(),
        );

        let lookup = cache.get("인기 질문", "local");
        assert!(lookup.degraded);
        assert_eq!(lookup.hit.unwrap().tier, CacheTier::Durable);

        let miss = cache.get("새 질문", "local");
        assert!(miss.degraded);
        assert!(miss.hit.is_none());

        let put = cache.put("새 질문", "local", json!({}));
        assert!(put.degraded);
        assert!(!put.stored);
        // 영구 계층에 대신 쓰지 않음
        assert_eq!(durable.count().unwrap(), 1);

        assert!(cache.stats().degraded);
        assert!(matches!(
            cache.clear_all(),
            Err(QaError::BackingStoreUnavailable { tier: "fast", .. })
        ));
    }

    #[test]
    fn test_popular_ordering() {
        let f = fixture();
        let mut a = CacheEntry::new("a", "local", json!({}));
        a.hit_count = 5;
        let mut b = CacheEntry::new("b", "local", json!({}));
        b.hit_count = 9;
        f.durable.insert(&a).unwrap();
        f.durable.insert(&b).unwrap();

        let popular = f.cache.popular(10).unwrap();
        assert_eq!(popular[0].question, "b");
        assert_eq!(popular.len(), 2);
    }
}
