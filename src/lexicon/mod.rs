//! 분류/확장 사전
//!
//! 인명, 카드 키워드, 동의어, 은행 별칭, 추천 질문 목록을 코드가 아닌
//! 데이터(JSON)로 관리합니다. 시작 시 한 번 로드합니다.
//!
//! 파일을 지정하지 않으면 `data/lexicon.json`이 내장 기본값으로 쓰입니다.

use std::path::Path;

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};

use crate::router::Category;

/// 내장 기본 사전
const DEFAULT_LEXICON: &str = include_str!("../../data/lexicon.json");

// ============================================================================
// Types
// ============================================================================

/// 동의어 항목 (순서 유지를 위해 배열로 저장)
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SynonymEntry {
    pub term: String,
    pub synonyms: Vec<String>,
}

/// 은행 별칭 그룹
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AliasGroup {
    pub bank: String,
    pub aliases: Vec<String>,
}

/// 카테고리별 추천 질문
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SuggestionTable {
    pub personal: Vec<String>,
    pub card: Vec<String>,
    pub general: Vec<String>,
}

impl SuggestionTable {
    /// 카테고리의 추천 질문 목록
    pub fn for_category(&self, category: Category) -> &[String] {
        match category {
            Category::Personal => &self.personal,
            Category::Card => &self.card,
            Category::General => &self.general,
        }
    }
}

/// 사전 전체
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Lexicon {
    /// 개인화 질문으로 분류할 인명
    pub known_names: Vec<String>,
    /// 인명 뒤에 붙는 호칭 (인명 패턴 탐지용)
    pub honorifics: Vec<String>,
    /// 카드 카테고리 키워드
    pub card_keywords: Vec<String>,
    /// 추천 질문 점수 계산용 키워드
    pub important_keywords: Vec<String>,
    pub synonyms: Vec<SynonymEntry>,
    pub bank_aliases: Vec<AliasGroup>,
    /// 개인화 확장 질의에 붙일 일반 행동 문구
    pub personal_phrases: Vec<String>,
    pub suggestions: SuggestionTable,
}

impl Lexicon {
    /// 파일에서 로드 (None이면 내장 사전)
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let lexicon = match path {
            Some(p) => {
                let raw = std::fs::read_to_string(p)
                    .with_context(|| format!("Failed to read lexicon: {:?}", p))?;
                let lexicon = Self::from_json(&raw)
                    .with_context(|| format!("Invalid lexicon file: {:?}", p))?;
                tracing::info!("Loaded lexicon from {:?}", p);
                lexicon
            }
            None => Self::builtin()?,
        };
        Ok(lexicon)
    }

    /// 내장 사전
    pub fn builtin() -> Result<Self> {
        Self::from_json(DEFAULT_LEXICON).context("Invalid built-in lexicon")
    }

    /// JSON 문자열에서 파싱 + 검증
    pub fn from_json(raw: &str) -> Result<Self> {
        let lexicon: Lexicon = serde_json::from_str(raw).context("Failed to parse lexicon JSON")?;
        lexicon.validate()?;
        Ok(lexicon)
    }

    /// 추천 질문 목록이 비어 있으면 저신뢰 응답이 빈 목록을 내므로 거부
    fn validate(&self) -> Result<()> {
        for category in [Category::Personal, Category::Card, Category::General] {
            if self.suggestions.for_category(category).is_empty() {
                anyhow::bail!("Suggestion list for '{}' is empty", category.as_str());
            }
        }
        if self.honorifics.iter().any(|h| h.trim().is_empty()) {
            anyhow::bail!("Honorifics must not contain empty entries");
        }
        Ok(())
    }

    /// 질문에 등록된 인명이 있는지
    pub fn mentions_known_name(&self, question: &str) -> bool {
        self.known_names.iter().any(|n| question.contains(n.as_str()))
    }

    /// 질문에 카드 키워드가 있는지
    pub fn mentions_card(&self, question: &str) -> bool {
        self.card_keywords.iter().any(|k| question.contains(k.as_str()))
    }

    /// 질문에 포함된 중요 키워드
    pub fn keywords_in<'a>(&'a self, question: &str) -> Vec<&'a str> {
        self.important_keywords
            .iter()
            .filter(|k| question.contains(k.as_str()))
            .map(|k| k.as_str())
            .collect()
    }
}

// ============================================================================
// Tests
// ============================================================================
