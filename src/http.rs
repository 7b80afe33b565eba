//! HTTP 공용 헬퍼 - JSON POST + 재시도
//!
//! 임베딩 서버와 LLM 백엔드가 같은 재시도 정책을 씁니다.
//! 전송 실패, 429, 5xx는 지수 백오프로 재시도하고 그 외 상태 코드는 즉시 실패합니다.

use std::time::Duration;

use anyhow::{Context, Result};
use serde::Serialize;

/// 최대 재시도 횟수
pub const MAX_RETRIES: u32 = 3;
/// 재시도 시 초기 백오프 (ms)
const INITIAL_BACKOFF_MS: u64 = 500;

/// 타임아웃이 있는 클라이언트
pub fn build_client(timeout_secs: u64) -> Result<reqwest::Client> {
    reqwest::Client::builder()
        .timeout(Duration::from_secs(timeout_secs))
        .build()
        .context("Failed to create HTTP client")
}

/// JSON 본문 POST, 성공 시 응답 본문 반환
///
/// # Arguments
/// * `label` - 로그/에러 메시지에 쓸 대상 이름
/// * `bearer` - Authorization 헤더 토큰
pub async fn post_json<T>(
    client: &reqwest::Client,
    url: &str,
    bearer: Option<&str>,
    body: &T,
    label: &str,
) -> Result<String>
where
    T: Serialize + ?Sized,
{
    let mut last_error: Option<anyhow::Error> = None;

    for attempt in 0..=MAX_RETRIES {
        if attempt > 0 {
            let backoff = Duration::from_millis(INITIAL_BACKOFF_MS * 2u64.pow(attempt - 1));
            tracing::warn!(
                "{} request failed, retrying in {:?} (attempt {}/{})",
                label,
                backoff,
                attempt,
                MAX_RETRIES
            );
            tokio::time::sleep(backoff).await;
        }

        let mut request = client.post(url).json(body);
        if let Some(token) = bearer {
            request = request.bearer_auth(token);
        }

        let response = match request.send().await {
            Ok(resp) => resp,
            Err(e) => {
                last_error = Some(anyhow::anyhow!("Failed to send {} request: {}", label, e));
                continue;
            }
        };

        let status = response.status();
        let text = response
            .text()
            .await
            .with_context(|| format!("Failed to read {} response body", label))?;

        if status.is_success() {
            return Ok(text);
        }

        if status.as_u16() == 429 || status.is_server_error() {
            last_error = Some(anyhow::anyhow!("{} error ({}): {}", label, status, text));
            continue;
        }

        anyhow::bail!("{} error ({}): {}", label, status, text);
    }

    Err(last_error
        .unwrap_or_else(|| anyhow::anyhow!("{} failed after {} retries", label, MAX_RETRIES)))
}
