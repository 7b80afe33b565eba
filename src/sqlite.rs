//! SQLite 공용 헬퍼
//!
//! 레지스트리와 캐시 두 계층이 같은 방식으로 연결을 엽니다.

use std::path::Path;
use std::sync::{Arc, Mutex, MutexGuard};

use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use rusqlite::{Connection, OpenFlags};

/// 공유 연결
pub type SharedConnection = Arc<Mutex<Connection>>;

/// DB 파일 열기 (부모 디렉토리 생성)
pub fn open(path: &Path) -> Result<SharedConnection> {
    if let Some(parent) = path.parent() {
        if !parent.as_os_str().is_empty() && !parent.exists() {
            std::fs::create_dir_all(parent).context("Failed to create database directory")?;
        }
    }

    let conn = Connection::open_with_flags(
        path,
        OpenFlags::SQLITE_OPEN_READ_WRITE
            | OpenFlags::SQLITE_OPEN_CREATE
            | OpenFlags::SQLITE_OPEN_NO_MUTEX,
    )
    .with_context(|| format!("Failed to open SQLite database: {:?}", path))?;

    Ok(Arc::new(Mutex::new(conn)))
}

/// 메모리 DB (테스트용)
#[cfg(test)]
pub fn open_in_memory() -> Result<SharedConnection> {
    let conn = Connection::open_in_memory().context("Failed to open in-memory database")?;
    Ok(Arc::new(Mutex::new(conn)))
}

/// 잠금 획득
pub fn lock(conn: &SharedConnection) -> Result<MutexGuard<'_, Connection>> {
    conn.lock().map_err(|e| anyhow::anyhow!("Lock error: {}", e))
}

/// RFC3339 문자열을 DateTime<Utc>로 파싱
pub fn parse_datetime(s: &str) -> DateTime<Utc> {
    DateTime::parse_from_rfc3339(s)
        .map(|dt| dt.with_timezone(&Utc))
        .unwrap_or_else(|_| Utc::now())
}
