//! 에러 타입
//!
//! 라우터/캐시 경계에서 사용하는 에러 분류입니다.
//! 저장소·클라이언트 내부는 anyhow를 쓰고, 경계에서 이 타입으로 변환합니다.

use thiserror::Error;

/// QA 코어 에러
#[derive(Debug, Error)]
pub enum QaError {
    /// 캐시 저장소(빠른 계층 또는 영구 계층) 접근 불가
    #[error("캐시 저장소 사용 불가 ({tier}): {reason}")]
    BackingStoreUnavailable { tier: &'static str, reason: String },

    /// 벡터 검색 서비스 접근 불가 (빈 결과로 취급)
    #[error("검색 서비스 사용 불가 ({collection}): {reason}")]
    SearchServiceUnavailable { collection: String, reason: String },

    /// 빈 질문
    #[error("질문을 입력해 주세요.")]
    MalformedQuestion,

    /// 등록되지 않은 모델 키
    #[error("알 수 없는 모델: {0}")]
    UnknownModel(String),

    /// LLM 호출 실패
    #[error("LLM 응답 생성 실패: {0}")]
    Llm(String),

    /// 설정/사전 오류
    #[error("설정 오류: {0}")]
    Config(String),
}

impl QaError {
    /// 빠른 계층 장애
    pub fn fast_tier(err: impl std::fmt::Display) -> Self {
        Self::BackingStoreUnavailable {
            tier: "fast",
            reason: err.to_string(),
        }
    }

    /// 영구 계층 장애
    pub fn durable_tier(err: impl std::fmt::Display) -> Self {
        Self::BackingStoreUnavailable {
            tier: "durable",
            reason: err.to_string(),
        }
    }
}

pub type QaResult<T> = std::result::Result<T, QaError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_tier_constructors() {
        let err = QaError::fast_tier("connection refused");
        assert!(matches!(
            err,
            QaError::BackingStoreUnavailable { tier: "fast", .. }
        ));
        assert!(err.to_string().contains("connection refused"));

        let err = QaError::durable_tier("locked");
        assert!(err.to_string().contains("durable"));
    }

    #[test]
    fn test_malformed_question_message() {
        assert_eq!(QaError::MalformedQuestion.to_string(), "질문을 입력해 주세요.");
    }
}
