//! PDF 텍스트 추출
//!
//! pdf-extract 크레이트를 사용합니다. 페이지 구분(폼피드)은 빈 줄로 바꿉니다.

use std::path::Path;

use anyhow::{Context, Result};

/// PDF에서 전체 텍스트 추출
pub fn extract_text_from_pdf(path: &Path) -> Result<String> {
    let bytes = std::fs::read(path).with_context(|| format!("Failed to read PDF: {:?}", path))?;

    let text = pdf_extract::extract_text_from_mem(&bytes)
        .with_context(|| format!("Failed to extract text from PDF: {:?}", path))?;

    if text.trim().is_empty() {
        tracing::warn!(
            "No text extracted from PDF: {:?}. It might be a scanned document.",
            path
        );
    }

    Ok(join_pages(&text))
}

/// 폼피드로 나뉜 페이지를 빈 줄로 연결
fn join_pages(text: &str) -> String {
    text.split('\x0c')
        .map(str::trim)
        .filter(|page| !page.is_empty())
        .collect::<Vec<_>>()
        .join("\n\n")
}
