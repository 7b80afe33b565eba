//! 응답 조립
//!
//! 라우팅 결과, 검색 결과, LLM 답변을 하나의 응답 페이로드로 묶습니다.

use serde::{Deserialize, Serialize};

use crate::cache::{CacheHit, CacheTier};
use crate::knowledge::SearchResult;
use crate::router::{self, Category, RouteOutcome};

/// 유사도 정보에 넣을 상위 결과 수
const SIMILARITY_INFO_TOP_K: usize = 3;
/// 미리보기 최대 문자 수
const PREVIEW_CHARS: usize = 100;

// ============================================================================
// Types
// ============================================================================

/// 검색 결과 요약
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SimilarityInfo {
    /// 1부터 시작
    pub rank: usize,
    /// "85.0%"
    pub score: String,
    pub score_raw: f32,
    pub source: String,
    pub preview: String,
}

/// 최종 응답
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ResponsePayload {
    pub answer: String,
    pub similarity_info: Vec<SimilarityInfo>,
    pub threshold_met: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub suggested_questions: Option<Vec<String>>,
    pub cached: bool,
    pub max_similarity: f32,
    pub effective_threshold: f32,
    pub category: Category,
    pub model: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cache_source: Option<CacheTier>,
    #[serde(default)]
    pub cache_degraded: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
}

impl ResponsePayload {
    /// 캐시 엔트리에서 복원 (cached = true)
    pub fn from_cache(hit: CacheHit, degraded: bool) -> anyhow::Result<Self> {
        let mut payload: ResponsePayload = serde_json::from_value(hit.entry.answer)?;
        payload.cached = true;
        payload.cache_source = Some(hit.tier);
        payload.cache_degraded = degraded;
        Ok(payload)
    }
}

// ============================================================================
// Assembly
// ============================================================================

/// 라우팅 결과로 응답 조립
///
/// ANSWERABLE이면 `llm_answer`를 답변으로, LOW_CONFIDENCE면 안내 메시지와
/// 번호 붙은 추천 질문을 답변으로 씁니다.
pub fn assemble(
    outcome: &RouteOutcome,
    results: &[SearchResult],
    llm_answer: Option<String>,
    model: &str,
) -> ResponsePayload {
    let decision = outcome.decision();

    let (answer, suggested_questions, message) = match outcome {
        RouteOutcome::Answerable { .. } => (llm_answer.unwrap_or_default(), None, None),
        RouteOutcome::LowConfidence {
            suggestions,
            message,
            ..
        } => (
            router::render_suggestions(message, suggestions),
            Some(suggestions.clone()),
            Some(message.clone()),
        ),
    };

    ResponsePayload {
        answer,
        similarity_info: similarity_info(results),
        threshold_met: decision.threshold_met,
        suggested_questions,
        cached: false,
        max_similarity: decision.max_similarity,
        effective_threshold: decision.effective_threshold,
        category: decision.category,
        model: model.to_string(),
        cache_source: None,
        cache_degraded: false,
        message,
    }
}

/// 상위 3개 검색 결과 요약
pub fn similarity_info(results: &[SearchResult]) -> Vec<SimilarityInfo> {
    router::top_results(results, SIMILARITY_INFO_TOP_K)
        .into_iter()
        .enumerate()
        .map(|(i, r)| SimilarityInfo {
            rank: i + 1,
            score: router::format_percent(r.score),
            score_raw: r.score,
            source: r.chunk.source_file.clone(),
            preview: preview(&r.chunk.content),
        })
        .collect()
}

/// 앞 100자 + "..."
fn preview(content: &str) -> String {
    match content.char_indices().nth(PREVIEW_CHARS) {
        Some((cut, _)) => format!("{}...", &content[..cut]),
        None => content.to_string(),
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cache::CacheEntry;
    use crate::knowledge::{Chunk, ChunkMetadata, Collection};
    use crate::router::RoutingDecision;

    fn result(content: &str, score: f32) -> SearchResult {
        SearchResult::new(
            Chunk::new(content, "guide.md", Collection::Basic, ChunkMetadata::default()),
            score,
        )
    }

    fn decision(met: bool, max: f32) -> RoutingDecision {
        RoutingDecision {
            threshold_met: met,
            effective_threshold: 0.75,
            category: Category::Card,
            max_similarity: max,
        }
    }

    #[test]
    fn test_preview_truncates_by_characters() {
        let long = "가".repeat(150);
        let p = preview(&long);
        assert_eq!(p.chars().count(), 103);
        assert!(p.ends_with("..."));

        assert_eq!(preview("짧은 내용"), "짧은 내용");
        assert_eq!(preview(&"a".repeat(100)), "a".repeat(100));
    }

    #[test]
    fn test_similarity_info_top3() {
        let results = vec![
            result("a", 0.70),
            result("b", 0.853),
            result("c", 0.60),
            result("d", 0.80),
        ];
        let info = similarity_info(&results);

        assert_eq!(info.len(), 3);
        assert_eq!(info[0].rank, 1);
        assert_eq!(info[0].score, "85.3%");
        assert_eq!(info[0].preview, "b");
        assert_eq!(info[2].preview, "a");
        assert_eq!(info[0].source, "guide.md");
    }

    #[test]
    fn test_assemble_answerable() {
        let outcome = RouteOutcome::Answerable {
            decision: decision(true, 0.85),
            context: "ctx".to_string(),
        };
        let payload = assemble(
            &outcome,
            &[result("발급", 0.85)],
            Some("영업점에서 신청하세요.".to_string()),
            "local",
        );

        assert!(payload.threshold_met);
        assert_eq!(payload.answer, "영업점에서 신청하세요.");
        assert!(payload.suggested_questions.is_none());
        assert!(!payload.cached);
        assert_eq!(payload.model, "local");
    }

    #[test]
    fn test_assemble_low_confidence() {
        let outcome = RouteOutcome::LowConfidence {
            decision: decision(false, 0.42),
            suggestions: vec!["BC카드 연회비는 어떻게 되나요?".to_string()],
            message: router::low_confidence_message(0.42),
        };
        let payload = assemble(&outcome, &[], None, "api");

        assert!(!payload.threshold_met);
        assert_eq!(payload.suggested_questions.as_ref().unwrap().len(), 1);
        assert!(payload.answer.contains("1. BC카드 연회비는 어떻게 되나요?"));
        assert!(payload.message.unwrap().contains("42.0%"));
        assert!(payload.similarity_info.is_empty());
    }

    #[test]
    fn test_from_cache_marks_cached() {
        let outcome = RouteOutcome::Answerable {
            decision: decision(true, 0.9),
            context: String::new(),
        };
        let payload = assemble(&outcome, &[], Some("답".to_string()), "local");
        let json = serde_json::to_value(&payload).unwrap();
        assert!(json.get("suggested_questions").is_none());

        let hit = CacheHit {
            entry: CacheEntry::new("q", "local", json),
            tier: CacheTier::Durable,
        };
        let restored = ResponsePayload::from_cache(hit, true).unwrap();
        assert!(restored.cached);
        assert_eq!(restored.cache_source, Some(CacheTier::Durable));
        assert!(restored.cache_degraded);
        assert_eq!(restored.answer, "답");
    }
}
