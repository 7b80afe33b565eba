//! 유사도 임계값 라우터
//!
//! 질문을 분류하고 카테고리별 임계값과 최고 유사도를 비교해
//! ANSWERABLE(LLM 답변) 또는 LOW_CONFIDENCE(추천 질문)로 분기합니다.
//!
//! 에러를 내지 않습니다. 검색 결과가 없으면 최고 유사도 0.0으로 취급합니다.

use std::cmp::Reverse;
use std::sync::Arc;

use serde::{Deserialize, Serialize};

use crate::config::RouterConfig;
use crate::error::{QaError, QaResult};
use crate::knowledge::SearchResult;
use crate::lexicon::Lexicon;

// ============================================================================
// Types
// ============================================================================

/// 질문 카테고리
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Category {
    /// 등록된 인명을 포함하는 질문
    Personal,
    /// 카드/발급 키워드를 포함하는 질문
    Card,
    General,
}

impl Category {
    pub fn as_str(&self) -> &'static str {
        match self {
            Category::Personal => "personal",
            Category::Card => "card",
            Category::General => "general",
        }
    }
}

impl std::fmt::Display for Category {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// 라우팅 판단 결과
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct RoutingDecision {
    pub threshold_met: bool,
    pub effective_threshold: f32,
    pub category: Category,
    pub max_similarity: f32,
}

/// 라우팅 결과
#[derive(Debug, Clone, PartialEq)]
pub enum RouteOutcome {
    /// 임계값 충족: 상위 결과로 만든 컨텍스트
    Answerable {
        decision: RoutingDecision,
        context: String,
    },
    /// 임계값 미달: 추천 질문과 안내 메시지
    LowConfidence {
        decision: RoutingDecision,
        suggestions: Vec<String>,
        message: String,
    },
}

impl RouteOutcome {
    pub fn decision(&self) -> &RoutingDecision {
        match self {
            RouteOutcome::Answerable { decision, .. } => decision,
            RouteOutcome::LowConfidence { decision, .. } => decision,
        }
    }

    pub fn is_answerable(&self) -> bool {
        matches!(self, RouteOutcome::Answerable { .. })
    }
}

// ============================================================================
// SimilarityRouter
// ============================================================================

/// 유사도 라우터
pub struct SimilarityRouter {
    config: RouterConfig,
    lexicon: Arc<Lexicon>,
}

impl SimilarityRouter {
    /// 생성 (개인화 임계값이 기본 임계값보다 작지 않으면 거부)
    pub fn new(config: RouterConfig, lexicon: Arc<Lexicon>) -> QaResult<Self> {
        if config.personal_threshold >= config.default_threshold {
            return Err(QaError::Config(format!(
                "personal_threshold ({}) must be lower than default_threshold ({})",
                config.personal_threshold, config.default_threshold
            )));
        }
        Ok(Self { config, lexicon })
    }

    /// 질문 분류: 인명 > 카드 키워드 > 일반
    pub fn classify(&self, question: &str) -> Category {
        if self.lexicon.mentions_known_name(question) {
            Category::Personal
        } else if self.lexicon.mentions_card(question) {
            Category::Card
        } else {
            Category::General
        }
    }

    /// 카테고리별 임계값
    pub fn effective_threshold(&self, category: Category) -> f32 {
        match category {
            Category::Personal => self.config.personal_threshold,
            Category::Card | Category::General => self.config.default_threshold,
        }
    }

    /// 검색 결과로 분기 결정
    pub fn decide(&self, question: &str, results: &[SearchResult]) -> RouteOutcome {
        let category = self.classify(question);
        let effective_threshold = self.effective_threshold(category);
        let max_similarity = results.iter().map(|r| r.score).fold(0.0_f32, f32::max);

        let decision = RoutingDecision {
            threshold_met: max_similarity >= effective_threshold,
            effective_threshold,
            category,
            max_similarity,
        };

        tracing::debug!(
            "Routing: category={}, max={:.3}, threshold={:.2}, met={}",
            category,
            max_similarity,
            effective_threshold,
            decision.threshold_met
        );

        if decision.threshold_met {
            RouteOutcome::Answerable {
                decision,
                context: self.build_context(results),
            }
        } else {
            RouteOutcome::LowConfidence {
                decision,
                suggestions: self.suggest(question, category),
                message: low_confidence_message(max_similarity),
            }
        }
    }

    /// 상위 결과로 LLM 컨텍스트 생성
    ///
    /// 각 결과 앞에 `[유사도: 85.0%] `를 붙이고 빈 줄로 연결합니다.
    pub fn build_context(&self, results: &[SearchResult]) -> String {
        top_results(results, self.config.context_top_k)
            .into_iter()
            .map(|r| format!("[유사도: {}] {}", format_percent(r.score), r.chunk.content))
            .collect::<Vec<_>>()
            .join("\n\n")
    }

    /// 카테고리 추천 질문 (질문과 겹치는 중요 키워드 수로 정렬)
    pub fn suggest(&self, question: &str, category: Category) -> Vec<String> {
        let keywords = self.lexicon.keywords_in(question);
        let mut scored: Vec<(usize, &String)> = self
            .lexicon
            .suggestions
            .for_category(category)
            .iter()
            .map(|s| {
                let overlap = keywords.iter().filter(|k| s.contains(**k)).count();
                (overlap, s)
            })
            .collect();

        // 안정 정렬이라 동점은 목록 순서 유지
        scored.sort_by_key(|(overlap, _)| Reverse(*overlap));

        scored
            .into_iter()
            .take(self.config.max_suggestions)
            .map(|(_, s)| s.clone())
            .collect()
    }
}

// ============================================================================
// Helper Functions
// ============================================================================

/// 점수 내림차순 상위 n개 (입력 순서를 가정하지 않음)
pub fn top_results(results: &[SearchResult], n: usize) -> Vec<&SearchResult> {
    let mut sorted: Vec<&SearchResult> = results.iter().collect();
    sorted.sort_by(|a, b| b.score.total_cmp(&a.score));
    sorted.truncate(n);
    sorted
}

/// 0.853 → "85.3%"
pub fn format_percent(score: f32) -> String {
    format!("{:.1}%", score * 100.0)
}

/// 저신뢰 안내 메시지
pub fn low_confidence_message(max_similarity: f32) -> String {
    format!(
        "죄송합니다. 질문과 정확히 일치하는 정보를 찾지 못했습니다 (최고 유사도: {}).",
        format_percent(max_similarity)
    )
}

/// 안내 메시지 + 번호 붙은 추천 질문
pub fn render_suggestions(message: &str, suggestions: &[String]) -> String {
    let mut text = format!("{}\n\n아래와 같은 질문들은 어떠신가요?\n\n", message);
    for (i, s) in suggestions.iter().enumerate() {
        text.push_str(&format!("{}. {}\n", i + 1, s));
    }
    text
}

// ============================================================================
// Tests
// ============================================================================
