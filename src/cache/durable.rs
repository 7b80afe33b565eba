//! SQLite 기반 영구 계층 - 인기 질문 저장소
//!
//! 저장 위치: ~/.rag-qa/cache/popular_cache.db

use std::path::Path;

use anyhow::{Context, Result};
use chrono::Utc;
use rusqlite::{params, OptionalExtension};

use super::{CacheEntry, DurableTier};
use crate::sqlite::{self, SharedConnection};

pub struct SqlitePopularStore {
    conn: SharedConnection,
}

impl SqlitePopularStore {
    /// 저장소 열기 (없으면 생성)
    pub fn open(path: &Path) -> Result<Self> {
        let store = Self {
            conn: sqlite::open(path)?,
        };
        store.initialize()?;
        Ok(store)
    }

    fn initialize(&self) -> Result<()> {
        let conn = sqlite::lock(&self.conn)?;
        conn.execute(
            "CREATE TABLE IF NOT EXISTS popular_questions (
                query_hash TEXT PRIMARY KEY,
                question TEXT NOT NULL,
                model TEXT NOT NULL,
                answer TEXT NOT NULL,
                hit_count INTEGER NOT NULL DEFAULT 0,
                created_at TEXT NOT NULL,
                last_accessed TEXT NOT NULL
            )",
            [],
        )
        .context("Failed to create popular_questions table")?;

        conn.execute(
            "CREATE INDEX IF NOT EXISTS idx_popular_hits ON popular_questions(hit_count DESC)",
            [],
        )
        .context("Failed to create hit_count index")?;

        Ok(())
    }
}

const SELECT_COLUMNS: &str =
    "SELECT query_hash, question, model, answer, hit_count, created_at, last_accessed
     FROM popular_questions";

impl DurableTier for SqlitePopularStore {
    fn insert(&self, entry: &CacheEntry) -> Result<bool> {
        let conn = sqlite::lock(&self.conn)?;
        let answer =
            serde_json::to_string(&entry.answer).context("Failed to serialize cached answer")?;

        let rows = conn
            .execute(
                "INSERT OR IGNORE INTO popular_questions
                    (query_hash, question, model, answer, hit_count, created_at, last_accessed)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)",
                params![
                    entry.key,
                    entry.question,
                    entry.model,
                    answer,
                    entry.hit_count as i64,
                    entry.created_at.to_rfc3339(),
                    entry.last_accessed.to_rfc3339(),
                ],
            )
            .context("Failed to insert popular question")?;

        Ok(rows > 0)
    }

    fn select_by_key(&self, key: &str) -> Result<Option<CacheEntry>> {
        let conn = sqlite::lock(&self.conn)?;
        let entry = conn
            .query_row(
                &format!("{} WHERE query_hash = ?1", SELECT_COLUMNS),
                params![key],
                row_to_entry,
            )
            .optional()
            .context("Failed to query popular question")?;
        Ok(entry)
    }

    fn touch(&self, key: &str) -> Result<()> {
        let conn = sqlite::lock(&self.conn)?;
        conn.execute(
            "UPDATE popular_questions
             SET hit_count = hit_count + 1, last_accessed = ?2
             WHERE query_hash = ?1",
            params![key, Utc::now().to_rfc3339()],
        )
        .context("Failed to update popular question")?;
        Ok(())
    }

    fn select_ordered_by_hits(&self, limit: usize) -> Result<Vec<CacheEntry>> {
        let conn = sqlite::lock(&self.conn)?;
        let mut stmt = conn.prepare(&format!(
            "{} ORDER BY hit_count DESC, last_accessed DESC LIMIT ?1",
            SELECT_COLUMNS
        ))?;
        let entries = stmt
            .query_map(params![limit as i64], row_to_entry)?
            .filter_map(|r| r.ok())
            .collect();
        Ok(entries)
    }

    fn delete_all(&self) -> Result<usize> {
        let conn = sqlite::lock(&self.conn)?;
        let rows = conn
            .execute("DELETE FROM popular_questions", [])
            .context("Failed to clear popular questions")?;
        Ok(rows)
    }

    fn count(&self) -> Result<usize> {
        let conn = sqlite::lock(&self.conn)?;
        let count: i64 = conn
            .query_row("SELECT COUNT(*) FROM popular_questions", [], |row| row.get(0))
            .context("Failed to count popular questions")?;
        Ok(count as usize)
    }
}

fn row_to_entry(row: &rusqlite::Row<'_>) -> rusqlite::Result<CacheEntry> {
    let answer: String = row.get(3)?;
    Ok(CacheEntry {
        key: row.get(0)?,
        question: row.get(1)?,
        model: row.get(2)?,
        answer: serde_json::from_str(&answer).unwrap_or(serde_json::Value::String(answer)),
        hit_count: row.get::<_, i64>(4)?.max(0) as u64,
        created_at: sqlite::parse_datetime(&row.get::<_, String>(5)?),
        last_accessed: sqlite::parse_datetime(&row.get::<_, String>(6)?),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn create_test_store() -> (TempDir, SqlitePopularStore) {
        let dir = TempDir::new().unwrap();
        let store = SqlitePopularStore::open(&dir.path().join("popular.db")).unwrap();
        (dir, store)
    }

    fn entry(question: &str, hits: u64) -> CacheEntry {
        let mut e = CacheEntry::new(question, "local", serde_json::json!({ "answer": question }));
        e.hit_count = hits;
        e
    }

    #[test]
    fn test_insert_or_ignore() {
        let (_dir, store) = create_test_store();
        let e = entry("연회비", 5);

        assert!(store.insert(&e).unwrap());
        assert!(!store.insert(&e).unwrap());
        assert_eq!(store.count().unwrap(), 1);

        let stored = store.select_by_key(&e.key).unwrap().unwrap();
        assert_eq!(stored.answer, e.answer);
        assert_eq!(stored.hit_count, 5);
    }

    #[test]
    fn test_touch_increments_hits() {
        let (_dir, store) = create_test_store();
        let e = entry("연회비", 5);
        store.insert(&e).unwrap();

        store.touch(&e.key).unwrap();
        store.touch(&e.key).unwrap();
        assert_eq!(store.select_by_key(&e.key).unwrap().unwrap().hit_count, 7);
    }

    #[test]
    fn test_ordered_by_hits() {
        let (_dir, store) = create_test_store();
        store.insert(&entry("a", 5)).unwrap();
        store.insert(&entry("b", 12)).unwrap();
        store.insert(&entry("c", 8)).unwrap();

        let top: Vec<String> = store
            .select_ordered_by_hits(2)
            .unwrap()
            .into_iter()
            .map(|e| e.question)
            .collect();
        assert_eq!(top, vec!["b", "c"]);

        assert_eq!(store.delete_all().unwrap(), 3);
        assert_eq!(store.count().unwrap(), 0);
    }
}
