//! DOCX 텍스트 추출
//!
//! zip 아카이브의 `word/document.xml`을 quick-xml로 읽습니다.
//! 문단은 줄바꿈, 탭/줄바꿈 요소는 각각 `\t`/`\n`으로 바꾸므로
//! 본문에 적힌 `/$$/` 구분자가 그대로 남습니다.

use std::io::Read;
use std::path::Path;

use anyhow::{Context, Result};
use quick_xml::events::Event;
use quick_xml::Reader;

const DOCUMENT_XML: &str = "word/document.xml";

/// DOCX에서 전체 텍스트 추출
pub fn extract_text_from_docx(path: &Path) -> Result<String> {
    let file =
        std::fs::File::open(path).with_context(|| format!("Failed to open DOCX: {:?}", path))?;
    let mut archive = zip::ZipArchive::new(file)
        .with_context(|| format!("Not a valid DOCX archive: {:?}", path))?;

    let mut xml = String::new();
    archive
        .by_name(DOCUMENT_XML)
        .with_context(|| format!("Missing {} in {:?}", DOCUMENT_XML, path))?
        .read_to_string(&mut xml)
        .with_context(|| format!("Failed to read {} in {:?}", DOCUMENT_XML, path))?;

    let text = document_text(&xml).with_context(|| format!("Malformed DOCX body: {:?}", path))?;
    if text.trim().is_empty() {
        tracing::warn!("No text extracted from DOCX: {:?}", path);
    }
    Ok(text)
}

/// document.xml 본문에서 텍스트만 뽑기
fn document_text(xml: &str) -> Result<String> {
    let mut reader = Reader::from_str(xml);
    let mut out = String::new();
    let mut in_text = false;
    // 문단 속성의 w:tab(탭 정지 위치)은 무시하고 런 안의 것만 본문으로
    let mut run_depth = 0usize;

    loop {
        match reader.read_event()? {
            Event::Start(e) => match e.name().as_ref() {
                b"w:r" => run_depth += 1,
                b"w:t" => in_text = true,
                _ => {}
            },
            Event::End(e) => match e.name().as_ref() {
                b"w:r" => run_depth = run_depth.saturating_sub(1),
                b"w:t" => in_text = false,
                b"w:p" => out.push('\n'),
                _ => {}
            },
            Event::Empty(e) if run_depth > 0 => match e.name().as_ref() {
                b"w:tab" => out.push('\t'),
                b"w:br" | b"w:cr" => out.push('\n'),
                _ => {}
            },
            Event::Text(t) if in_text => out.push_str(&t.unescape()?),
            Event::Eof => break,
            _ => {}
        }
    }

    Ok(out.trim_end().to_string())
}
