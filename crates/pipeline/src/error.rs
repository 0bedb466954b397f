//! 수집 파이프라인 에러 타입
//!
//! [`LogPipelineError`]는 파싱, 규칙, 수집기, 정책 설정 등 파이프라인 내부의
//! 모든 에러를 표현합니다. `From<LogPipelineError> for LogshipError` 변환으로
//! 상위 레이어에서 `?` 연산자로 전파할 수 있습니다.

use logship_core::error::{ConfigError, LogshipError, PipelineError};
use logship_store::StoreError;

/// 수집 파이프라인 도메인 에러
#[derive(Debug, thiserror::Error)]
pub enum LogPipelineError {
    /// 입력 파싱 실패
    #[error("parse error: {format} at offset {offset}: {reason}")]
    Parse {
        /// 입력 형식 (syslog, json)
        format: String,
        /// 실패 위치
        offset: usize,
        /// 실패 사유
        reason: String,
    },

    /// 규칙 시드 파일 로딩 실패
    #[error("rule load error: {path}: {reason}")]
    RuleLoad {
        /// 규칙 파일 경로
        path: String,
        /// 로딩 실패 사유
        reason: String,
    },

    /// 규칙 유효성 검증 실패 (잘못된 정규식 포함)
    #[error("rule validation error: rule '{rule}': {reason}")]
    RuleValidation {
        /// 문제가 된 규칙 이름
        rule: String,
        /// 검증 실패 사유
        reason: String,
    },

    /// 수집기 에러 (바인드 실패 등)
    #[error("collector error: {source_type}: {reason}")]
    Collector {
        /// 수집 소스 유형 (syslog-udp, syslog-tcp, file)
        source_type: String,
        /// 에러 사유
        reason: String,
    },

    /// 설정 에러
    #[error("config error: {field}: {reason}")]
    Config {
        /// 설정 필드명
        field: String,
        /// 에러 사유
        reason: String,
    },

    /// 채널 통신 에러
    #[error("channel error: {0}")]
    Channel(String),

    /// 스토어 에러
    #[error("store error: {0}")]
    Store(#[from] StoreError),

    /// I/O 에러
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    /// 정규식 컴파일 에러
    #[error("regex error: {0}")]
    Regex(#[from] regex::Error),
}

impl LogPipelineError {
    /// 클라이언트 입력 때문에 발생한 에러인지 확인합니다.
    ///
    /// HTTP 계층은 이 값으로 400과 500을 구분합니다.
    pub fn is_client_error(&self) -> bool {
        matches!(
            self,
            Self::Parse { .. } | Self::RuleValidation { .. } | Self::Regex(_)
        )
    }
}

impl From<LogPipelineError> for LogshipError {
    fn from(err: LogPipelineError) -> Self {
        match err {
            LogPipelineError::Store(e) => e.into(),
            LogPipelineError::Config { field, reason } => {
                ConfigError::InvalidValue { field, reason }.into()
            }
            LogPipelineError::Io(e) => LogshipError::Io(e),
            LogPipelineError::Channel(reason) => PipelineError::ChannelSend(reason).into(),
            other => PipelineError::InitFailed(other.to_string()).into(),
        }
    }
}
