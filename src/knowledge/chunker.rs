//! 텍스트 청킹
//!
//! 컬렉션마다 다른 전략을 씁니다.
//! - `FixedSizeChunker` (basic): 문자 수 기준 윈도우 + 오버랩, 윈도우 후반부의 줄바꿈에서 끊기
//! - `DelimiterChunker` (custom): 문서 작성자가 넣은 구분자(`/$$/`)로 분할

use anyhow::{Context, Result};
use regex::Regex;

use super::chunk::{ChunkMetadata, Collection};

// ============================================================================
// Chunker Trait
// ============================================================================

/// 청킹 결과 한 조각
#[derive(Debug, Clone, PartialEq)]
pub struct ChunkPiece {
    pub content: String,
    pub metadata: ChunkMetadata,
}

/// 텍스트 청킹 전략 트레이트
pub trait Chunker: Send + Sync {
    /// 텍스트를 청크로 분할 (빈 조각은 제외)
    fn chunk(&self, text: &str) -> Vec<ChunkPiece>;

    /// 결과가 저장될 컬렉션
    fn collection(&self) -> Collection;

    /// 청커 이름
    fn name(&self) -> &'static str;
}

// ============================================================================
// FixedSizeChunker
// ============================================================================

/// 고정 크기 청커 (문자 수 기준)
pub struct FixedSizeChunker {
    chunk_size: usize,
    overlap: usize,
}

impl FixedSizeChunker {
    pub fn new(chunk_size: usize, overlap: usize) -> Result<Self> {
        if chunk_size == 0 {
            anyhow::bail!("chunk_size must be positive");
        }
        if overlap >= chunk_size {
            anyhow::bail!(
                "overlap ({}) must be smaller than chunk_size ({})",
                overlap,
                chunk_size
            );
        }
        Ok(Self {
            chunk_size,
            overlap,
        })
    }
}

impl Chunker for FixedSizeChunker {
    fn chunk(&self, text: &str) -> Vec<ChunkPiece> {
        if text.trim().is_empty() {
            return vec![];
        }

        // 문자 경계의 바이트 오프셋 (마지막은 text.len())
        let bounds: Vec<usize> = text
            .char_indices()
            .map(|(i, _)| i)
            .chain(std::iter::once(text.len()))
            .collect();
        let char_count = bounds.len() - 1;

        let mut pieces = Vec::new();
        let mut start = 0;

        while start < char_count {
            let mut end = (start + self.chunk_size).min(char_count);

            // 윈도우 후반부에 줄바꿈이 있으면 그 뒤에서 끊기
            if end < char_count {
                let half = start + self.chunk_size / 2;
                if let Some(pos) = text[bounds[half]..bounds[end]].rfind('\n') {
                    let newline_byte = bounds[half] + pos;
                    if let Ok(idx) = bounds.binary_search(&newline_byte) {
                        end = idx + 1;
                    }
                }
            }

            let content = text[bounds[start]..bounds[end]].trim();
            if !content.is_empty() {
                pieces.push(ChunkPiece {
                    content: content.to_string(),
                    metadata: ChunkMetadata {
                        chunk_index: pieces.len(),
                        ..Default::default()
                    },
                });
            }

            if end >= char_count {
                break;
            }
            start = end.saturating_sub(self.overlap).max(start + 1);
        }

        pieces
    }

    fn collection(&self) -> Collection {
        Collection::Basic
    }

    fn name(&self) -> &'static str {
        "FixedSizeChunker"
    }
}

// ============================================================================
// DelimiterChunker
// ============================================================================

/// 구분자 기반 청커
///
/// 구분자가 없으면 문서 전체가 하나의 청크가 됩니다.
/// 각 청크의 첫 줄을 섹션 제목으로, `![..](ref)`를 이미지 참조로 기록합니다.
pub struct DelimiterChunker {
    delimiter: String,
    image_re: Regex,
}

impl DelimiterChunker {
    pub fn new(delimiter: impl Into<String>) -> Result<Self> {
        let delimiter = delimiter.into();
        if delimiter.is_empty() {
            anyhow::bail!("delimiter must not be empty");
        }
        let image_re =
            Regex::new(r"!\[[^\]]*\]\(([^)\s]+)\)").context("Failed to build image pattern")?;
        Ok(Self {
            delimiter,
            image_re,
        })
    }

    fn images_in(&self, content: &str) -> Vec<String> {
        self.image_re
            .captures_iter(content)
            .filter_map(|c| c.get(1).map(|m| m.as_str().to_string()))
            .collect()
    }
}

impl Chunker for DelimiterChunker {
    fn chunk(&self, text: &str) -> Vec<ChunkPiece> {
        text.split(self.delimiter.as_str())
            .map(str::trim)
            .filter(|s| !s.is_empty())
            .enumerate()
            .map(|(i, content)| ChunkPiece {
                content: content.to_string(),
                metadata: ChunkMetadata {
                    chunk_index: i,
                    section: section_title(content),
                    delimiter: Some(self.delimiter.clone()),
                    images: self.images_in(content),
                },
            })
            .collect()
    }

    fn collection(&self) -> Collection {
        Collection::Custom
    }

    fn name(&self) -> &'static str {
        "DelimiterChunker"
    }
}

// ============================================================================
// Helper Functions
// ============================================================================

/// 첫 번째 비어있지 않은 줄 (Markdown 헤더 기호 제거)
fn section_title(content: &str) -> Option<String> {
    content
        .lines()
        .map(|l| l.trim().trim_start_matches('#').trim())
        .find(|l| !l.is_empty())
        .map(str::to_string)
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_fixed_empty() {
        let chunker = FixedSizeChunker::new(10, 2).unwrap();
        assert!(chunker.chunk("   \n ").is_empty());
    }

    #[test]
    fn test_fixed_small_text_single_chunk() {
        let chunker = FixedSizeChunker::new(1000, 200).unwrap();
        let pieces = chunker.chunk("BC카드 발급 안내");
        assert_eq!(pieces.len(), 1);
        assert_eq!(pieces[0].content, "BC카드 발급 안내");
        assert_eq!(pieces[0].metadata.chunk_index, 0);
    }

    #[test]
    fn test_fixed_counts_characters_not_bytes() {
        // 한글 20자, 크기 10 / 오버랩 0 → 정확히 2개
        let text = "가나다라마바사아자차카타파하가나다라마바";
        let chunker = FixedSizeChunker::new(10, 0).unwrap();
        let pieces = chunker.chunk(text);

        assert_eq!(pieces.len(), 2);
        assert_eq!(pieces[0].content.chars().count(), 10);
        assert_eq!(pieces[1].content, "카타파하가나다라마바");
    }

    #[test]
    fn test_fixed_overlap() {
        let text = "abcdefghijklmnopqrst";
        let chunker = FixedSizeChunker::new(10, 4).unwrap();
        let pieces = chunker.chunk(text);

        assert_eq!(pieces[0].content, "abcdefghij");
        assert_eq!(pieces[1].content, "ghijklmnop");
        assert_eq!(pieces.last().unwrap().content, "mnopqrst");
    }

    #[test]
    fn test_fixed_prefers_newline() {
        let text = "첫째 줄입니다\n둘째 줄은 조금 더 깁니다 정말로";
        let chunker = FixedSizeChunker::new(12, 0).unwrap();
        let pieces = chunker.chunk(text);

        assert_eq!(pieces[0].content, "첫째 줄입니다");
        assert!(pieces[1].content.starts_with("둘째"));
    }

    #[test]
    fn test_fixed_rejects_bad_overlap() {
        assert!(FixedSizeChunker::new(100, 100).is_err());
        assert!(FixedSizeChunker::new(0, 0).is_err());
    }

    #[test]
    fn test_delimiter_split_and_metadata() {
        let chunker = DelimiterChunker::new("/$$/").unwrap();
        let text = "# 발급 절차\n1. 신청서 작성\n![신청서](images/form.png)\n/$$/\n\n## 연회비\n국내 전용 1만원\n/$$/   ";
        let pieces = chunker.chunk(text);

        assert_eq!(pieces.len(), 2);
        assert_eq!(pieces[0].metadata.section.as_deref(), Some("발급 절차"));
        assert_eq!(pieces[0].metadata.images, vec!["images/form.png".to_string()]);
        assert_eq!(pieces[0].metadata.delimiter.as_deref(), Some("/$$/"));
        assert_eq!(pieces[1].metadata.section.as_deref(), Some("연회비"));
        assert_eq!(pieces[1].metadata.chunk_index, 1);
        assert!(pieces[1].metadata.images.is_empty());
    }

    #[test]
    fn test_delimiter_absent_whole_document() {
        let chunker = DelimiterChunker::new("/$$/").unwrap();
        let pieces = chunker.chunk("구분자 없는 문서\n두 번째 줄");
        assert_eq!(pieces.len(), 1);
        assert_eq!(pieces[0].content, "구분자 없는 문서\n두 번째 줄");
        assert_eq!(chunker.collection(), Collection::Custom);
    }
}
