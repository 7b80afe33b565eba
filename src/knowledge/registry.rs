//! 문서 레지스트리 - 수집한 문서의 체크섬 기록
//!
//! 같은 내용의 문서를 다시 수집하지 않고, 바뀐 문서를 감지합니다.
//! 저장 위치: ~/.rag-qa/documents.db

use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use rusqlite::{params, OptionalExtension};
use serde::Serialize;
use sha2::{Digest, Sha256};

use crate::sqlite::{self, SharedConnection};

// ============================================================================
// Types
// ============================================================================

/// 등록된 문서
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DocumentRecord {
    pub source_file: String,
    /// 추출 텍스트의 SHA-256
    pub checksum: String,
    pub basic_chunks: usize,
    pub custom_chunks: usize,
    pub ingested_at: DateTime<Utc>,
}

/// 체크섬 비교 결과
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DocumentStatus {
    New,
    Unchanged,
    Changed,
}

/// 레지스트리 통계
#[derive(Debug, Clone, Serialize)]
pub struct RegistryStats {
    pub document_count: usize,
    pub basic_chunks: usize,
    pub custom_chunks: usize,
    pub db_path: PathBuf,
}

// ============================================================================
// DocumentRegistry
// ============================================================================

pub struct DocumentRegistry {
    conn: SharedConnection,
    db_path: PathBuf,
}

impl DocumentRegistry {
    /// 레지스트리 열기 (없으면 생성)
    pub fn open(path: &Path) -> Result<Self> {
        let registry = Self {
            conn: sqlite::open(path)?,
            db_path: path.to_path_buf(),
        };
        registry.initialize()?;
        Ok(registry)
    }

    fn initialize(&self) -> Result<()> {
        let conn = sqlite::lock(&self.conn)?;
        conn.execute(
            "CREATE TABLE IF NOT EXISTS documents (
                source_file TEXT PRIMARY KEY,
                checksum TEXT NOT NULL,
                basic_chunks INTEGER NOT NULL DEFAULT 0,
                custom_chunks INTEGER NOT NULL DEFAULT 0,
                ingested_at TEXT NOT NULL
            )",
            [],
        )
        .context("Failed to create documents table")?;

        tracing::debug!("Document registry initialized at {:?}", self.db_path);
        Ok(())
    }

    /// 체크섬 비교
    pub fn status(&self, source_file: &str, checksum: &str) -> Result<DocumentStatus> {
        let status = match self.get(source_file)? {
            None => DocumentStatus::New,
            Some(record) if record.checksum == checksum => DocumentStatus::Unchanged,
            Some(_) => DocumentStatus::Changed,
        };
        Ok(status)
    }

    /// 문서 조회
    pub fn get(&self, source_file: &str) -> Result<Option<DocumentRecord>> {
        let conn = sqlite::lock(&self.conn)?;
        let record = conn
            .query_row(
                "SELECT source_file, checksum, basic_chunks, custom_chunks, ingested_at
                 FROM documents WHERE source_file = ?1",
                params![source_file],
                row_to_record,
            )
            .optional()
            .context("Failed to query document")?;
        Ok(record)
    }

    /// 등록 또는 갱신
    pub fn upsert(&self, record: &DocumentRecord) -> Result<()> {
        let conn = sqlite::lock(&self.conn)?;
        conn.execute(
            "INSERT INTO documents (source_file, checksum, basic_chunks, custom_chunks, ingested_at)
             VALUES (?1, ?2, ?3, ?4, ?5)
             ON CONFLICT(source_file) DO UPDATE SET
                checksum = excluded.checksum,
                basic_chunks = excluded.basic_chunks,
                custom_chunks = excluded.custom_chunks,
                ingested_at = excluded.ingested_at",
            params![
                record.source_file,
                record.checksum,
                record.basic_chunks as i64,
                record.custom_chunks as i64,
                record.ingested_at.to_rfc3339(),
            ],
        )
        .context("Failed to upsert document")?;
        Ok(())
    }

    /// 최근 수집 순 목록
    pub fn list(&self) -> Result<Vec<DocumentRecord>> {
        let conn = sqlite::lock(&self.conn)?;
        let mut stmt = conn.prepare(
            "SELECT source_file, checksum, basic_chunks, custom_chunks, ingested_at
             FROM documents ORDER BY ingested_at DESC",
        )?;
        let records = stmt
            .query_map([], row_to_record)?
            .filter_map(|r| r.ok())
            .collect();
        Ok(records)
    }

    /// 전체 삭제 (컬렉션 초기화와 함께 사용)
    pub fn clear(&self) -> Result<usize> {
        let conn = sqlite::lock(&self.conn)?;
        let rows = conn
            .execute("DELETE FROM documents", [])
            .context("Failed to clear documents")?;
        Ok(rows)
    }

    pub fn stats(&self) -> Result<RegistryStats> {
        let conn = sqlite::lock(&self.conn)?;
        let (count, basic, custom): (i64, i64, i64) = conn
            .query_row(
                "SELECT COUNT(*), COALESCE(SUM(basic_chunks), 0), COALESCE(SUM(custom_chunks), 0)
                 FROM documents",
                [],
                |row| Ok((row.get(0)?, row.get(1)?, row.get(2)?)),
            )
            .context("Failed to read registry stats")?;

        Ok(RegistryStats {
            document_count: count as usize,
            basic_chunks: basic as usize,
            custom_chunks: custom as usize,
            db_path: self.db_path.clone(),
        })
    }
}

// ============================================================================
// Helper Functions
// ============================================================================

fn row_to_record(row: &rusqlite::Row<'_>) -> rusqlite::Result<DocumentRecord> {
    Ok(DocumentRecord {
        source_file: row.get(0)?,
        checksum: row.get(1)?,
        basic_chunks: row.get::<_, i64>(2)? as usize,
        custom_chunks: row.get::<_, i64>(3)? as usize,
        ingested_at: sqlite::parse_datetime(&row.get::<_, String>(4)?),
    })
}

/// 텍스트 체크섬 (SHA-256 hex)
pub fn checksum(text: &str) -> String {
    format!("{:x}", Sha256::digest(text.as_bytes()))
}

// ============================================================================
// Tests
// ============================================================================
