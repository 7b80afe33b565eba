//! QA 서비스 - 질문 하나를 처리하는 전체 흐름
//!
//! 검증 → 모델 확인 → 캐시 → 질의 확장 + 두 컬렉션 검색 → 라우팅 → LLM → 조립 → 캐시 저장
//!
//! 모든 협력 객체는 생성자로 주입합니다.

use std::collections::HashMap;
use std::sync::Arc;

use futures::future::join_all;

use crate::assembler::{self, ResponsePayload};
use crate::cache::TieredCache;
use crate::config::SearchConfig;
use crate::error::{QaError, QaResult};
use crate::knowledge::{sort_by_score, ChunkSearch, Collection, SearchResult};
use crate::llm::{build_prompt, LlmRegistry};
use crate::query::QueryExpander;
use crate::router::{RouteOutcome, SimilarityRouter};

pub struct QaService {
    searcher: Arc<dyn ChunkSearch>,
    expander: QueryExpander,
    router: SimilarityRouter,
    cache: Arc<TieredCache>,
    llms: LlmRegistry,
    search: SearchConfig,
}

impl QaService {
    pub fn new(
        searcher: Arc<dyn ChunkSearch>,
        expander: QueryExpander,
        router: SimilarityRouter,
        cache: Arc<TieredCache>,
        llms: LlmRegistry,
        search: SearchConfig,
    ) -> Self {
        Self {
            searcher,
            expander,
            router,
            cache,
            llms,
            search,
        }
    }

    pub fn cache(&self) -> &TieredCache {
        &self.cache
    }

    /// 질문에 답하기
    pub async fn route_and_respond(&self, question: &str, model: &str) -> QaResult<ResponsePayload> {
        let question = question.trim();
        if question.is_empty() {
            return Err(QaError::MalformedQuestion);
        }

        let llm = self
            .llms
            .get(model)
            .cloned()
            .ok_or_else(|| QaError::UnknownModel(model.to_string()))?;

        // 캐시
        let lookup = self.cache.get(question, model);
        if let Some(hit) = lookup.hit {
            let tier = hit.tier;
            match ResponsePayload::from_cache(hit, lookup.degraded) {
                Ok(payload) => {
                    tracing::info!("Cache hit ({}): {}", tier.as_str(), question);
                    return Ok(payload);
                }
                Err(e) => tracing::warn!("Ignoring unreadable cached payload: {}", e),
            }
        }

        // 검색
        let results = self.retrieve(question).await;

        // 라우팅 + 생성
        let outcome = self.router.decide(question, &results);
        let llm_answer = match &outcome {
            RouteOutcome::Answerable { context, .. } => {
                let prompt = build_prompt(context, question);
                let answer = llm
                    .complete(&prompt)
                    .await
                    .map_err(|e| QaError::Llm(format!("{:#}", e)))?;
                Some(answer)
            }
            RouteOutcome::LowConfidence { .. } => None,
        };

        let mut payload = assembler::assemble(&outcome, &results, llm_answer, model);
        payload.cache_degraded = lookup.degraded;

        // 답변 가능한 응답만 캐시
        if payload.threshold_met {
            match serde_json::to_value(&payload) {
                Ok(value) => {
                    let put = self.cache.put(question, model, value);
                    payload.cache_degraded |= put.degraded;
                }
                Err(e) => tracing::warn!("Failed to serialize payload for cache: {}", e),
            }
        }

        tracing::info!(
            "Answered: category={}, max={:.3}, threshold_met={}",
            payload.category,
            payload.max_similarity,
            payload.threshold_met
        );
        Ok(payload)
    }

    /// 확장 질의로 두 컬렉션을 검색해 병합
    ///
    /// 확장 질의의 점수에는 가중치를 곱하고, 같은 내용은 가장 높은 점수만 남깁니다.
    /// 검색 실패한 컬렉션은 빈 결과로 취급합니다.
    pub async fn retrieve(&self, question: &str) -> Vec<SearchResult> {
        let variants: Vec<_> = self
            .expander
            .weighted(question)
            .into_iter()
            .take(self.search.max_variants.max(1))
            .collect();

        let searches = variants.iter().flat_map(|variant| {
            Collection::ALL.into_iter().map(move |collection| async move {
                let result = self
                    .searcher
                    .search(&variant.text, collection, self.search.k)
                    .await;
                (variant.weight, result)
            })
        });

        let mut merged: Vec<SearchResult> = Vec::new();
        let mut index: HashMap<String, usize> = HashMap::new();

        for (weight, result) in join_all(searches).await {
            let results = match result {
                Ok(results) => results,
                Err(e) => {
                    tracing::warn!("{}", e);
                    continue;
                }
            };

            for mut r in results {
                r.score = (r.score * weight).clamp(0.0, 1.0);
                match index.get(&r.chunk.content) {
                    Some(&i) if merged[i].score >= r.score => {}
                    Some(&i) => merged[i] = r,
                    None => {
                        index.insert(r.chunk.content.clone(), merged.len());
                        merged.push(r);
                    }
                }
            }
        }

        sort_by_score(&mut merged);
        tracing::debug!(
            "Retrieved {} results from {} variants",
            merged.len(),
            variants.len()
        );
        merged
    }
}

// ============================================================================
// Tests
// ============================================================================
