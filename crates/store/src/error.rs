//! 스토어 에러 타입
//!
//! [`StoreError`]는 SQLite 접근 중 발생하는 모든 에러를 표현합니다.
//! `From<StoreError> for LogshipError` 변환이 구현되어 있어
//! 상위 레이어에서 `?` 연산자로 전파할 수 있습니다.

use logship_core::error::{LogshipError, StorageError};

/// 스토어 도메인 에러
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    /// DB 열기 실패 (경로 생성, 권한, pragma)
    #[error("failed to open store at {path}: {reason}")]
    Open {
        /// DB 파일 경로
        path: String,
        /// 실패 사유
        reason: String,
    },

    /// SQLite 에러
    #[error("sqlite error: {0}")]
    Sqlite(#[from] rusqlite::Error),

    /// 직렬화 에러 (drop 미리보기 등)
    #[error("serialize error: {0}")]
    Serialize(#[from] serde_json::Error),

    /// blocking 태스크 실패 또는 잠금 오염
    #[error("store task failed: {0}")]
    Task(String),
}

impl From<StoreError> for LogshipError {
    fn from(err: StoreError) -> Self {
        match err {
            StoreError::Open { .. } => LogshipError::Storage(StorageError::Connection(err.to_string())),
            other => LogshipError::Storage(StorageError::Query(other.to_string())),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn open_error_maps_to_connection() {
        let err = StoreError::Open {
            path: "/nope/logship.db".to_owned(),
            reason: "permission denied".to_owned(),
        };
        assert!(err.to_string().contains("/nope/logship.db"));
        let top: LogshipError = err.into();
        assert!(matches!(top, LogshipError::Storage(StorageError::Connection(_))));
    }

    #[test]
    fn task_error_maps_to_query() {
        let top: LogshipError = StoreError::Task("poisoned".to_owned()).into();
        assert!(matches!(top, LogshipError::Storage(StorageError::Query(_))));
    }
}
