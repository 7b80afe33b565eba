//! 콘텐츠 추출 모듈
//!
//! - 텍스트/마크다운: 직접 읽기
//! - PDF: pdf-extract로 텍스트 추출
//! - DOCX: zip + quick-xml로 본문 추출

pub mod docx;
pub mod pdf;

use std::path::Path;

use anyhow::{Context, Result};

use crate::collector::FileType;

/// 콘텐츠 추출기
#[derive(Debug, Default)]
pub struct ContentExtractor;

impl ContentExtractor {
    pub fn new() -> Self {
        Self
    }

    /// 파일 전체 텍스트 추출
    pub async fn extract(&self, path: &Path, file_type: FileType) -> Result<String> {
        let text = match file_type {
            FileType::Text => tokio::fs::read_to_string(path)
                .await
                .with_context(|| format!("Failed to read text file: {:?}", path))?,
            FileType::Pdf => {
                // PDF 추출은 CPU 바운드이므로 spawn_blocking 사용
                let path = path.to_path_buf();
                tokio::task::spawn_blocking(move || pdf::extract_text_from_pdf(&path))
                    .await
                    .context("PDF extraction task failed")??
            }
            FileType::Docx => {
                let path = path.to_path_buf();
                tokio::task::spawn_blocking(move || docx::extract_text_from_docx(&path))
                    .await
                    .context("DOCX extraction task failed")??
            }
        };

        Ok(normalize_newlines(&text))
    }
}

/// CRLF → LF
fn normalize_newlines(text: &str) -> String {
    text.replace("\r\n", "\n")
}
