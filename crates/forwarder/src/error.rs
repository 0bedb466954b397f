//! 포워더 에러 타입
//!
//! [`ForwarderError`]는 포워딩 중 발생하는 에러를 표현합니다.
//! `From<ForwarderError> for LogshipError` 변환으로 상위 레이어에 전파됩니다.

use logship_core::error::{ConfigError, ForwardError, LogshipError};
use logship_store::StoreError;

/// 포워더 도메인 에러
#[derive(Debug, thiserror::Error)]
pub enum ForwarderError {
    /// HTTP 클라이언트 또는 목적지 헤더 구성 실패
    #[error("client setup failed for {destination}: {reason}")]
    Client {
        /// 목적지 이름
        destination: String,
        /// 실패 사유
        reason: String,
    },

    /// 요청 전송 실패 (연결, 타임아웃)
    #[error("request to {destination} failed: {reason}")]
    Request {
        /// 목적지 이름
        destination: String,
        /// 실패 사유
        reason: String,
    },

    /// 2xx가 아닌 응답
    #[error("destination {destination} responded with status {status}")]
    Status {
        /// 목적지 이름
        destination: String,
        /// HTTP 상태 코드
        status: u16,
    },

    /// 스토어 에러
    #[error("store error: {0}")]
    Store(#[from] StoreError),
}

impl From<ForwarderError> for LogshipError {
    fn from(err: ForwarderError) -> Self {
        match err {
            ForwarderError::Client {
                destination,
                reason,
            } => LogshipError::Config(ConfigError::InvalidValue {
                field: format!("forward.destinations.{destination}"),
                reason,
            }),
            ForwarderError::Request {
                destination,
                reason,
            } => LogshipError::Forward(ForwardError::Request {
                destination,
                reason,
            }),
            ForwarderError::Status {
                destination,
                status,
            } => LogshipError::Forward(ForwardError::Status {
                destination,
                status,
            }),
            ForwarderError::Store(e) => e.into(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn status_error_maps_to_forward() {
        let err = ForwarderError::Status {
            destination: "siem".to_owned(),
            status: 503,
        };
        assert_eq!(err.to_string(), "destination siem responded with status 503");
        let top: LogshipError = err.into();
        assert!(matches!(
            top,
            LogshipError::Forward(ForwardError::Status { status: 503, .. })
        ));
    }

    #[test]
    fn client_error_maps_to_config() {
        let top: LogshipError = ForwarderError::Client {
            destination: "siem".to_owned(),
            reason: "invalid header name".to_owned(),
        }
        .into();
        assert!(matches!(top, LogshipError::Config(_)));
    }

    #[test]
    fn store_error_maps_to_storage() {
        let top: LogshipError = ForwarderError::Store(StoreError::Task("gone".to_owned())).into();
        assert!(matches!(top, LogshipError::Storage(_)));
    }
}
