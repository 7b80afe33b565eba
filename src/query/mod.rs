//! 질의 확장
//!
//! 동의어 사전, 은행 별칭, 개인명 패턴으로 질문을 여러 변형으로 바꿔
//! 최근접 검색의 재현율을 높입니다. 순수 함수이며 부작용이 없습니다.

use std::sync::Arc;

use anyhow::{Context, Result};
use regex::Regex;

use crate::lexicon::Lexicon;

/// 확장 결과 최대 개수 (원본 포함)
pub const MAX_VARIANTS: usize = 8;

/// 한 변형에서 사용하는 최대 대체어 수
const REPLACEMENTS_PER_TERM: usize = 2;

/// 가중치가 붙은 확장 질의
#[derive(Debug, Clone, PartialEq)]
pub struct WeightedQuery {
    pub text: String,
    /// 원본 1.0, 확장은 순서대로 감소
    pub weight: f32,
}

/// 질의 확장기
pub struct QueryExpander {
    lexicon: Arc<Lexicon>,
    name_pattern: Regex,
}

impl QueryExpander {
    /// 사전으로 생성
    pub fn new(lexicon: Arc<Lexicon>) -> Result<Self> {
        let honorifics = lexicon
            .honorifics
            .iter()
            .map(|h| regex::escape(h))
            .collect::<Vec<_>>()
            .join("|");

        // 공백/문장 시작 뒤의 2~4음절 한글 + 호칭
        let name_pattern = Regex::new(&format!(r"(?:^|\s)([가-힣]{{2,4}})\s*(?:{})", honorifics))
            .context("Failed to build name pattern")?;

        Ok(Self {
            lexicon,
            name_pattern,
        })
    }

    /// 질문을 최대 8개의 변형으로 확장
    ///
    /// 순서: 원본, 동의어 치환, 은행 별칭 치환, 개인화 변형
    pub fn expand(&self, question: &str) -> Vec<String> {
        let mut variants = vec![question.to_string()];

        // 1. 동의어
        for entry in &self.lexicon.synonyms {
            if !question.contains(entry.term.as_str()) {
                continue;
            }
            for synonym in entry.synonyms.iter().take(REPLACEMENTS_PER_TERM) {
                push_unique(&mut variants, question.replace(entry.term.as_str(), synonym));
            }
        }

        // 2. 은행 별칭
        for group in &self.lexicon.bank_aliases {
            for alias in &group.aliases {
                if !question.contains(alias.as_str()) {
                    continue;
                }
                for alternative in group.aliases.iter().take(REPLACEMENTS_PER_TERM) {
                    push_unique(&mut variants, question.replace(alias.as_str(), alternative));
                }
            }
        }

        // 3. 개인화
        for name in self.detect_names(question) {
            for phrase in &self.lexicon.personal_phrases {
                push_unique(&mut variants, format!("{} {}", name, phrase));
            }
        }

        variants.truncate(MAX_VARIANTS);
        variants
    }

    /// 가중치 포함 확장
    pub fn weighted(&self, question: &str) -> Vec<WeightedQuery> {
        self.expand(question)
            .into_iter()
            .enumerate()
            .map(|(i, text)| WeightedQuery {
                text,
                weight: variant_weight(i),
            })
            .collect()
    }

    /// 질문에서 인명 탐지
    ///
    /// 등록된 인명을 먼저, 그 다음 "이름 + 호칭" 패턴을 찾습니다.
    /// 카드 키워드나 은행 별칭이 섞인 토큰은 인명으로 보지 않습니다.
    pub fn detect_names(&self, question: &str) -> Vec<String> {
        let mut names: Vec<String> = self
            .lexicon
            .known_names
            .iter()
            .filter(|n| question.contains(n.as_str()))
            .cloned()
            .collect();

        for caps in self.name_pattern.captures_iter(question) {
            let Some(candidate) = caps.get(1).map(|m| m.as_str()) else {
                continue;
            };
            if self.is_not_a_name(candidate) {
                continue;
            }
            // 등록 인명을 포함하는 토큰 (예: "김철수고") 중복 방지
            if names.iter().any(|n| candidate.contains(n.as_str())) {
                continue;
            }
            names.push(candidate.to_string());
        }

        names
    }

    fn is_not_a_name(&self, token: &str) -> bool {
        let lex = &self.lexicon;
        lex.card_keywords.iter().any(|k| token.contains(k.as_str()))
            || lex.honorifics.iter().any(|h| h.as_str() == token)
            || lex
                .bank_aliases
                .iter()
                .any(|g| g.bank == token || g.aliases.iter().any(|a| token.contains(a.as_str())))
            || lex.synonyms.iter().any(|s| s.term == token)
    }
}

/// i번째 변형의 가중치
fn variant_weight(index: usize) -> f32 {
    if index == 0 {
        1.0
    } else {
        (0.8 - 0.1 * index as f32).max(0.1)
    }
}

fn push_unique(variants: &mut Vec<String>, candidate: String) {
    if !variants.contains(&candidate) {
        variants.push(candidate);
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    fn expander() -> QueryExpander {
        QueryExpander::new(Arc::new(Lexicon::builtin().unwrap())).unwrap()
    }

    #[test]
    fn test_no_match_returns_original_only() {
        let variants = expander().expand("오늘 날씨 어때");
        assert_eq!(variants, vec!["오늘 날씨 어때".to_string()]);
    }

    #[test]
    fn test_expansion_is_capped_and_starts_with_original() {
        let question = "BC카드 발급 절차를 알려주세요";
        let variants = expander().expand(question);

        assert_eq!(variants.len(), MAX_VARIANTS);
        assert_eq!(variants[0], question);
        assert!(variants.contains(&"BC신용카드 발급 절차를 알려주세요".to_string()));
        assert!(variants.contains(&"BC카드 신청 절차를 알려주세요".to_string()));
    }

    #[test]
    fn test_bank_alias_expansion() {
        let variants = expander().expand("국민은행 연회비");
        assert!(variants.contains(&"KB국민 연회비".to_string()));
        // 자기 자신으로의 치환은 원본과 같으므로 중복 제거
        assert_eq!(variants.iter().filter(|v| *v == "국민은행 연회비").count(), 1);
    }

    #[test]
    fn test_personalized_variants() {
        let variants = expander().expand("홍길동 고객 연회비");
        assert!(variants.contains(&"홍길동 맞춤 카드 추천".to_string()));
        assert!(variants.contains(&"홍길동 고객 카드 발급 안내".to_string()));
    }

    #[test]
    fn test_detect_names() {
        let e = expander();
        assert_eq!(e.detect_names("김철수 고객 추천 카드"), vec!["김철수".to_string()]);
        assert_eq!(e.detect_names("홍길동님 안녕하세요"), vec!["홍길동".to_string()]);
        assert!(e.detect_names("신용카드 회원 혜택").is_empty());
        assert!(e.detect_names("BC카드 회원 혜택").is_empty());
    }

    #[test]
    fn test_weights_decrease() {
        let weighted = expander().weighted("BC카드 발급 절차");
        assert_eq!(weighted[0].weight, 1.0);
        assert!(weighted[1].weight < weighted[0].weight);
        assert!(weighted.windows(2).skip(1).all(|w| w[1].weight <= w[0].weight));
        assert!(weighted.iter().all(|w| w.weight >= 0.1));
    }
}
