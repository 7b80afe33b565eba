//! CLI 모듈
//!
//! rag-qa 명령어 정의 및 구현

use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand};

use crate::cache::{open_fast_tier, SqlitePopularStore, TieredCache};
use crate::config::AppConfig;
use crate::embedding::{create_embedder, EmbeddingProvider};
use crate::ingest::Ingestor;
use crate::knowledge::{Collection, DocumentRegistry, LanceChunkStore, SemanticSearcher};
use crate::lexicon::Lexicon;
use crate::llm::create_llm_clients;
use crate::query::QueryExpander;
use crate::router::SimilarityRouter;
use crate::service::QaService;

/// status에 표시할 최근 문서 수
const STATUS_DOCUMENT_LIMIT: usize = 10;

// ============================================================================
// CLI Definition
// ============================================================================

#[derive(Parser)]
#[command(name = "rag-qa")]
#[command(version, about = "한국어 문서 QA - 유사도 임계값 라우팅", long_about = None)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// 파일 또는 폴더를 두 컬렉션에 수집
    Ingest {
        /// 수집할 파일/폴더 경로
        path: PathBuf,

        /// 체크섬이 같아도 다시 수집
        #[arg(long)]
        force: bool,
    },

    /// 질문하기
    Ask {
        /// 질문
        question: String,

        /// 모델 키 ("api", "local")
        #[arg(short, long)]
        model: Option<String>,

        /// 응답 페이로드를 JSON으로 출력
        #[arg(long)]
        json: bool,
    },

    /// 캐시 관리
    Cache {
        #[command(subcommand)]
        action: CacheAction,
    },

    /// 인기 질문 목록
    Popular {
        /// 결과 개수 제한
        #[arg(short, long, default_value = "10")]
        limit: usize,
    },

    /// 두 컬렉션과 문서 레지스트리 초기화
    ResetCollections,

    /// 상태 확인
    Status,
}

#[derive(Subcommand)]
pub enum CacheAction {
    /// 캐시 통계
    Stats,
    /// 빠른 계층 비우기 (인기 질문 유지)
    Clear,
    /// 두 계층 모두 비우기
    Reset,
}

// ============================================================================
// CLI Runner
// ============================================================================

/// CLI 명령어 실행
pub async fn run(cli: Cli) -> Result<()> {
    let config = AppConfig::from_env().context("설정 로드 실패")?;

    match cli.command {
        Commands::Ingest { path, force } => cmd_ingest(&config, &path, force).await,
        Commands::Ask {
            question,
            model,
            json,
        } => cmd_ask(&config, &question, model, json).await,
        Commands::Cache { action } => cmd_cache(&config, action),
        Commands::Popular { limit } => cmd_popular(&config, limit),
        Commands::ResetCollections => cmd_reset_collections(&config).await,
        Commands::Status => cmd_status(&config).await,
    }
}

// ============================================================================
// Component Wiring
// ============================================================================

fn open_cache(config: &AppConfig) -> Result<Arc<TieredCache>> {
    // 빠른 계층은 열지 못해도 저하 모드로 계속
    let fast = open_fast_tier(&config.fast_cache_path());
    let durable =
        SqlitePopularStore::open(&config.popular_cache_path()).context("인기 질문 저장소 열기 실패")?;
    Ok(Arc::new(TieredCache::new(
        fast,
        Arc::new(durable),
        config.cache.clone(),
    )))
}

async fn open_store(config: &AppConfig) -> Result<Arc<LanceChunkStore>> {
    let store = LanceChunkStore::open(&config.vector_path(), config.embedding.dimension)
        .await
        .context("벡터 저장소 열기 실패")?;
    Ok(Arc::new(store))
}

fn open_embedder(config: &AppConfig) -> Result<Arc<dyn EmbeddingProvider>> {
    Ok(Arc::new(
        create_embedder(&config.embedding).context("임베딩 클라이언트 생성 실패")?,
    ))
}

async fn open_ingestor(config: &AppConfig) -> Result<Ingestor> {
    let registry =
        DocumentRegistry::open(&config.registry_path()).context("문서 레지스트리 열기 실패")?;
    Ingestor::new(
        &config.chunking,
        open_embedder(config)?,
        open_store(config).await?,
        Arc::new(registry),
        open_cache(config)?,
    )
}

async fn open_service(config: &AppConfig) -> Result<QaService> {
    let lexicon = Arc::new(Lexicon::load(config.lexicon_path.as_deref())?);
    let searcher = SemanticSearcher::new(open_embedder(config)?, open_store(config).await?);

    Ok(QaService::new(
        Arc::new(searcher),
        QueryExpander::new(lexicon.clone())?,
        SimilarityRouter::new(config.router.clone(), lexicon)?,
        open_cache(config)?,
        create_llm_clients(&config.llm)?,
        config.search.clone(),
    ))
}

// ============================================================================
// Command Implementations
// ============================================================================

/// 문서 수집 명령어 (ingest)
async fn cmd_ingest(config: &AppConfig, path: &Path, force: bool) -> Result<()> {
    let ingestor = open_ingestor(config).await?;

    println!("[*] 수집 중: {}", path.display());
    let report = ingestor.ingest_path(path, force).await?;

    if report.files_seen == 0 {
        println!("[!] 수집할 파일이 없습니다. (지원 형식: txt, md, markdown, pdf, docx)");
        return Ok(());
    }

    println!(
        "[OK] 완료: 신규 {}, 갱신 {}, 변경 없음 {}, 빈 문서 {}, 실패 {}",
        report.ingested, report.updated, report.unchanged, report.empty, report.failed
    );
    println!(
        "     청크: basic {}, custom {}",
        report.basic_chunks, report.custom_chunks
    );
    if report.updated > 0 {
        println!("     (변경된 문서가 있어 빠른 캐시를 비웠습니다)");
    }

    Ok(())
}

/// 질문 명령어 (ask)
async fn cmd_ask(config: &AppConfig, question: &str, model: Option<String>, json: bool) -> Result<()> {
    validate_question(question)?;
    let service = open_service(config).await?;
    let model = model.unwrap_or_else(|| config.llm.default_model.clone());

    let payload = service.route_and_respond(question, &model).await?;

    if json {
        println!("{}", serde_json::to_string_pretty(&payload)?);
        return Ok(());
    }

    println!("{}", payload.answer);
    println!();

    let marker = if payload.threshold_met { "[OK]" } else { "[!]" };
    println!(
        "{} 분류: {} | 최고 유사도: {:.1}% | 임계값: {:.1}%",
        marker,
        payload.category,
        payload.max_similarity * 100.0,
        payload.effective_threshold * 100.0
    );
    if let Some(tier) = payload.cache_source {
        println!("     캐시 응답 ({})", tier.as_str());
    }
    if payload.cache_degraded {
        println!("[!] 캐시 저장소 일부를 사용할 수 없어 저하 모드로 응답했습니다.");
    }

    for info in &payload.similarity_info {
        println!(
            "  {}. [{}] {} - {}",
            info.rank,
            info.score,
            info.source,
            truncate_text(&info.preview, 60)
        );
    }

    Ok(())
}

/// 캐시 명령어 (cache)
fn cmd_cache(config: &AppConfig, action: CacheAction) -> Result<()> {
    let cache = open_cache(config)?;

    match action {
        CacheAction::Stats => {
            let stats = cache.stats();
            println!("[*] 빠른 계층: {} 건 (TTL {}초)", stats.fast_entries, stats.fast_ttl_secs);
            println!(
                "[*] 인기 질문: {} 건 (승격 기준 {}회)",
                stats.durable_entries, stats.popular_threshold
            );
            if stats.degraded {
                println!("[!] 일부 캐시 저장소에 접근할 수 없습니다.");
            }
        }
        CacheAction::Clear => {
            let removed = cache.clear_all()?;
            println!("[OK] 빠른 계층 비움 ({} 키). 인기 질문은 유지됩니다.", removed);
        }
        CacheAction::Reset => {
            let (fast, durable) = cache.full_reset()?;
            println!("[OK] 캐시 초기화: 빠른 계층 {} 키, 인기 질문 {} 건", fast, durable);
        }
    }

    Ok(())
}

/// 인기 질문 명령어 (popular)
fn cmd_popular(config: &AppConfig, limit: usize) -> Result<()> {
    let entries = open_cache(config)?.popular(limit)?;

    if entries.is_empty() {
        println!("[!] 인기 질문이 없습니다.");
        return Ok(());
    }

    println!("[OK] 인기 질문 ({} 건):\n", entries.len());
    for (i, entry) in entries.iter().enumerate() {
        println!(
            "  {:>2}. [{}회] [{}] {}",
            i + 1,
            entry.hit_count,
            entry.model,
            truncate_text(&entry.question, 60)
        );
        println!(
            "      최근 조회: {}",
            entry.last_accessed.format("%Y-%m-%d %H:%M")
        );
    }

    Ok(())
}

/// 컬렉션 초기화 명령어 (reset-collections)
async fn cmd_reset_collections(config: &AppConfig) -> Result<()> {
    let ingestor = open_ingestor(config).await?;
    let removed = ingestor.reset_collections().await?;
    println!("[OK] 컬렉션 초기화 완료 (등록 해제된 문서 {} 건)", removed);
    Ok(())
}

/// 상태 명령어 (status)
async fn cmd_status(config: &AppConfig) -> Result<()> {
    println!("rag-qa v{}", env!("CARGO_PKG_VERSION"));
    println!();

    println!("[*] 데이터 디렉토리: {}", config.data_dir.display());
    println!(
        "[*] 임계값: 기본 {:.2}, 개인화 {:.2}",
        config.router.default_threshold, config.router.personal_threshold
    );
    println!(
        "[*] 임베딩: {} ({}차원) @ {}",
        config.embedding.model, config.embedding.dimension, config.embedding.base_url
    );

    for backend in &config.llm.backends {
        let default_mark = if backend.key == config.llm.default_model {
            " (기본)"
        } else {
            ""
        };
        println!(
            "[*] 모델 '{}'{}: {}",
            backend.key, default_mark, backend.model_name
        );
    }

    match DocumentRegistry::open(&config.registry_path()) {
        Ok(registry) => {
            match registry.stats() {
                Ok(stats) => println!(
                    "[OK] 등록 문서: {} 건 (basic {}, custom {} 청크)",
                    stats.document_count, stats.basic_chunks, stats.custom_chunks
                ),
                Err(e) => println!("[!] 문서 레지스트리 조회 실패: {}", e),
            }
            for record in registry.list()?.iter().take(STATUS_DOCUMENT_LIMIT) {
                println!(
                    "     {} | {} | basic {}, custom {}",
                    record.ingested_at.format("%Y-%m-%d %H:%M"),
                    truncate_text(&record.source_file, 50),
                    record.basic_chunks,
                    record.custom_chunks
                );
            }
        }
        Err(e) => println!("[!] 문서 레지스트리 열기 실패: {}", e),
    }

    match open_store(config).await {
        Ok(store) => {
            for collection in Collection::ALL {
                match store.count(collection).await {
                    Ok(count) => println!("[OK] {} 컬렉션: {} 청크", collection, count),
                    Err(e) => tracing::debug!("{} 컬렉션 조회 실패: {}", collection, e),
                }
            }
        }
        Err(e) => println!("[!] 벡터 저장소 열기 실패: {}", e),
    }

    match open_cache(config) {
        Ok(cache) => {
            let stats = cache.stats();
            println!(
                "[OK] 캐시: 빠른 계층 {} 건, 인기 질문 {} 건",
                stats.fast_entries, stats.durable_entries
            );
        }
        Err(e) => println!("[!] 캐시 열기 실패: {}", e),
    }

    if config.llm.backend("api").map_or(false, |b| b.api_key.is_none()) {
        println!("[!] OPENAI_API_KEY 미설정: 'api' 모델을 사용할 수 없습니다.");
    }

    Ok(())
}

// ============================================================================
// Helper Functions
// ============================================================================

/// 텍스트 자르기 (UTF-8 안전)
fn truncate_text(text: &str, max_chars: usize) -> String {
    let cleaned = text.replace('\n', " ").replace('\r', "");
    let cleaned = cleaned.trim();

    if cleaned.chars().count() <= max_chars {
        cleaned.to_string()
    } else {
        let truncated: String = cleaned.chars().take(max_chars).collect();
        format!("{}...", truncated)
    }
}

/// 빈 질문은 서비스를 열기 전에 거절
pub fn validate_question(question: &str) -> Result<()> {
    if question.trim().is_empty() {
        bail!("질문을 입력해 주세요.");
    }
    Ok(())
}

// ============================================================================
// Tests
// ============================================================================
