//! SQLite 기반 빠른 계층 (TTL 키-값)
//!
//! 만료 시각(밀리초)을 함께 저장하고, 읽을 때 만료된 값은 없는 것으로 봅니다.

use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use chrono::Utc;
use rusqlite::{params, OptionalExtension};

use super::FastTier;
use crate::sqlite::{self, SharedConnection};

pub struct SqliteFastTier {
    conn: SharedConnection,
}

impl SqliteFastTier {
    /// 저장소 열기 (없으면 생성)
    pub fn open(path: &Path) -> Result<Self> {
        let tier = Self {
            conn: sqlite::open(path)?,
        };
        tier.initialize()?;
        Ok(tier)
    }

    fn initialize(&self) -> Result<()> {
        let conn = sqlite::lock(&self.conn)?;
        conn.execute(
            "CREATE TABLE IF NOT EXISTS kv (
                key TEXT PRIMARY KEY,
                value TEXT NOT NULL,
                expires_at INTEGER NOT NULL
            )",
            [],
        )
        .context("Failed to create kv table")?;
        Ok(())
    }

    /// 만료된 키 정리
    pub fn purge_expired(&self) -> Result<usize> {
        let conn = sqlite::lock(&self.conn)?;
        let rows = conn
            .execute("DELETE FROM kv WHERE expires_at <= ?1", params![now_ms()])
            .context("Failed to purge expired keys")?;
        Ok(rows)
    }
}

impl FastTier for SqliteFastTier {
    fn get(&self, key: &str) -> Result<Option<String>> {
        let conn = sqlite::lock(&self.conn)?;
        let value = conn
            .query_row(
                "SELECT value FROM kv WHERE key = ?1 AND expires_at > ?2",
                params![key, now_ms()],
                |row| row.get(0),
            )
            .optional()
            .context("Failed to read fast tier")?;
        Ok(value)
    }

    fn set_with_ttl(&self, key: &str, value: &str, ttl: Duration) -> Result<()> {
        let conn = sqlite::lock(&self.conn)?;
        conn.execute(
            "INSERT INTO kv (key, value, expires_at) VALUES (?1, ?2, ?3)
             ON CONFLICT(key) DO UPDATE SET value = excluded.value, expires_at = excluded.expires_at",
            params![key, value, expires_at(ttl)],
        )
        .context("Failed to write fast tier")?;
        Ok(())
    }

    fn delete(&self, key: &str) -> Result<bool> {
        let conn = sqlite::lock(&self.conn)?;
        let rows = conn
            .execute("DELETE FROM kv WHERE key = ?1", params![key])
            .context("Failed to delete from fast tier")?;
        Ok(rows > 0)
    }

    fn increment(&self, key: &str, ttl: Duration) -> Result<u64> {
        let conn = sqlite::lock(&self.conn)?;
        let now = now_ms();
        // 만료된 카운터는 1부터 다시 시작
        let value: String = conn
            .query_row(
                "INSERT INTO kv (key, value, expires_at) VALUES (?1, '1', ?2)
                 ON CONFLICT(key) DO UPDATE SET
                    value = CASE WHEN kv.expires_at <= ?3 THEN '1'
                                 ELSE CAST(CAST(kv.value AS INTEGER) + 1 AS TEXT) END,
                    expires_at = CASE WHEN kv.expires_at <= ?3 THEN excluded.expires_at
                                      ELSE kv.expires_at END
                 RETURNING value",
                params![key, expires_at(ttl), now],
                |row| row.get(0),
            )
            .context("Failed to increment counter")?;

        value
            .parse()
            .with_context(|| format!("Counter {} is not a number: {}", key, value))
    }

    fn clear(&self) -> Result<usize> {
        let conn = sqlite::lock(&self.conn)?;
        let rows = conn
            .execute("DELETE FROM kv", [])
            .context("Failed to clear fast tier")?;
        Ok(rows)
    }

    fn count_prefix(&self, prefix: &str) -> Result<usize> {
        let conn = sqlite::lock(&self.conn)?;
        let count: i64 = conn
            .query_row(
                "SELECT COUNT(*) FROM kv WHERE substr(key, 1, ?1) = ?2 AND expires_at > ?3",
                params![prefix.len() as i64, prefix, now_ms()],
                |row| row.get(0),
            )
            .context("Failed to count fast tier keys")?;
        Ok(count as usize)
    }
}

// ============================================================================
// Unavailable Tier
// ============================================================================

/// 열 수 없는 빠른 계층 자리에 두는 구현 (모든 연산 실패)
///
/// `TieredCache`가 이를 장애로 보고 영구 계층만으로 동작합니다.
pub struct UnavailableFastTier {
    reason: String,
}

impl UnavailableFastTier {
    pub fn new(reason: impl Into<String>) -> Self {
        Self {
            reason: reason.into(),
        }
    }

    fn fail<T>(&self) -> Result<T> {
        anyhow::bail!("fast tier unavailable: {}", self.reason)
    }
}

impl FastTier for UnavailableFastTier {
    fn get(&self, _key: &str) -> Result<Option<String>> {
        self.fail()
    }

    fn set_with_ttl(&self, _key: &str, _value: &str, _ttl: Duration) -> Result<()> {
        self.fail()
    }

    fn delete(&self, _key: &str) -> Result<bool> {
        self.fail()
    }

    fn increment(&self, _key: &str, _ttl: Duration) -> Result<u64> {
        self.fail()
    }

    fn clear(&self) -> Result<usize> {
        self.fail()
    }

    fn count_prefix(&self, _prefix: &str) -> Result<usize> {
        self.fail()
    }
}

/// SQLite 빠른 계층 열기 (만료 키 정리 포함)
///
/// 열 수 없으면 경고를 남기고 `UnavailableFastTier`로 대체합니다.
pub fn open_fast_tier(path: &Path) -> Arc<dyn FastTier> {
    match SqliteFastTier::open(path) {
        Ok(tier) => {
            match tier.purge_expired() {
                Ok(purged) if purged > 0 => tracing::debug!("Purged {} expired cache keys", purged),
                Ok(_) => {}
                Err(e) => tracing::warn!("Failed to purge expired cache keys: {:#}", e),
            }
            Arc::new(tier)
        }
        Err(e) => {
            tracing::warn!("Fast cache tier unavailable, continuing degraded: {:#}", e);
            Arc::new(UnavailableFastTier::new(format!("{:#}", e)))
        }
    }
}

fn now_ms() -> i64 {
    Utc::now().timestamp_millis()
}

fn expires_at(ttl: Duration) -> i64 {
    now_ms().saturating_add(ttl.as_millis().min(i64::MAX as u128) as i64)
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    const HOUR: Duration = Duration::from_secs(3600);

    fn create_test_tier() -> (TempDir, SqliteFastTier) {
        let dir = TempDir::new().unwrap();
        let tier = SqliteFastTier::open(&dir.path().join("fast.db")).unwrap();
        (dir, tier)
    }

    #[test]
    fn test_set_get_delete() {
        let (_dir, tier) = create_test_tier();

        tier.set_with_ttl("k", "v1", HOUR).unwrap();
        assert_eq!(tier.get("k").unwrap().as_deref(), Some("v1"));

        tier.set_with_ttl("k", "v2", HOUR).unwrap();
        assert_eq!(tier.get("k").unwrap().as_deref(), Some("v2"));

        assert!(tier.delete("k").unwrap());
        assert!(!tier.delete("k").unwrap());
        assert!(tier.get("k").unwrap().is_none());
    }

    #[test]
    fn test_expired_value_is_absent() {
        let (_dir, tier) = create_test_tier();
        tier.set_with_ttl("k", "v", Duration::ZERO).unwrap();
        assert!(tier.get("k").unwrap().is_none());
        assert_eq!(tier.count_prefix("k").unwrap(), 0);
        assert_eq!(tier.purge_expired().unwrap(), 1);
    }

    #[test]
    fn test_increment() {
        let (_dir, tier) = create_test_tier();
        assert_eq!(tier.increment("hits:a", HOUR).unwrap(), 1);
        assert_eq!(tier.increment("hits:a", HOUR).unwrap(), 2);
        assert_eq!(tier.increment("hits:a", HOUR).unwrap(), 3);
        assert_eq!(tier.increment("hits:b", HOUR).unwrap(), 1);
    }

    #[test]
    fn test_expired_counter_restarts() {
        let (_dir, tier) = create_test_tier();
        tier.increment("hits:a", Duration::ZERO).unwrap();
        assert_eq!(tier.increment("hits:a", HOUR).unwrap(), 1);
        assert_eq!(tier.increment("hits:a", HOUR).unwrap(), 2);
    }

    #[test]
    fn test_open_fast_tier_falls_back_when_unopenable() {
        let dir = TempDir::new().unwrap();
        // 부모 경로가 파일이라 DB를 만들 수 없음
        let blocker = dir.path().join("cache");
        std::fs::write(&blocker, "not a directory").unwrap();

        let tier = open_fast_tier(&blocker.join("fast_cache.db"));
        let err = tier.increment("hits:a", HOUR).unwrap_err();
        assert!(err.to_string().contains("fast tier unavailable"));
        assert!(tier.get("entry:a").is_err());
    }

    #[test]
    fn test_open_fast_tier_opens_sqlite() {
        let dir = TempDir::new().unwrap();
        let tier = open_fast_tier(&dir.path().join("cache").join("fast_cache.db"));
        assert_eq!(tier.increment("hits:a", HOUR).unwrap(), 1);
    }

    #[test]
    fn test_count_prefix_and_clear() {
        let (_dir, tier) = create_test_tier();
        tier.set_with_ttl("entry:1", "a", HOUR).unwrap();
        tier.set_with_ttl("entry:2", "b", HOUR).unwrap();
        tier.increment("hits:1", HOUR).unwrap();

        assert_eq!(tier.count_prefix("entry:").unwrap(), 2);
        assert_eq!(tier.count_prefix("hits:").unwrap(), 1);

        assert_eq!(tier.clear().unwrap(), 3);
        assert_eq!(tier.count_prefix("entry:").unwrap(), 0);
    }
}
