//! 에러 타입 -- 도메인별 에러 정의

/// logship 최상위 에러 타입
#[derive(Debug, thiserror::Error)]
pub enum LogshipError {
    /// 설정 관련 에러
    #[error("config error: {0}")]
    Config(#[from] ConfigError),

    /// 파이프라인 처리 에러
    #[error("pipeline error: {0}")]
    Pipeline(#[from] PipelineError),

    /// 스토리지 에러
    #[error("storage error: {0}")]
    Storage(#[from] StorageError),

    /// 포워딩 에러
    #[error("forward error: {0}")]
    Forward(#[from] ForwardError),

    /// I/O 에러
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}

/// 설정 관련 에러
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    /// 설정 파일을 찾을 수 없음
    #[error("config file not found: {path}")]
    FileNotFound { path: String },

    /// 설정 파싱 실패
    #[error("failed to parse config: {reason}")]
    ParseFailed { reason: String },

    /// 유효하지 않은 설정 값
    #[error("invalid config value for '{field}': {reason}")]
    InvalidValue { field: String, reason: String },
}

/// 파이프라인 처리 에러
#[derive(Debug, thiserror::Error)]
pub enum PipelineError {
    /// 채널 전송 실패
    #[error("channel send failed: {0}")]
    ChannelSend(String),

    /// 채널 수신 실패
    #[error("channel receive failed: {0}")]
    ChannelRecv(String),

    /// 파이프라인 초기화 실패
    #[error("pipeline init failed: {0}")]
    InitFailed(String),

    /// 이미 실행 중
    #[error("pipeline already running")]
    AlreadyRunning,

    /// 실행 중이 아님
    #[error("pipeline not running")]
    NotRunning,
}

/// 스토리지 에러
#[derive(Debug, thiserror::Error)]
pub enum StorageError {
    /// 연결 실패
    #[error("connection failed: {0}")]
    Connection(String),

    /// 쿼리 실패
    #[error("query failed: {0}")]
    Query(String),
}

/// 포워딩 에러
#[derive(Debug, thiserror::Error)]
pub enum ForwardError {
    /// 요청 전송 실패 (네트워크, 타임아웃)
    #[error("request to {destination} failed: {reason}")]
    Request { destination: String, reason: String },

    /// 2xx가 아닌 응답
    #[error("destination {destination} responded with status {status}")]
    Status { destination: String, status: u16 },
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn config_error_converts_to_logship_error() {
        let err: LogshipError = ConfigError::InvalidValue {
            field: "server.listen".to_owned(),
            reason: "bad address".to_owned(),
        }
        .into();
        assert!(matches!(err, LogshipError::Config(_)));
        assert!(err.to_string().contains("server.listen"));
    }

    #[test]
    fn forward_status_display() {
        let err = ForwardError::Status {
            destination: "sink-a".to_owned(),
            status: 503,
        };
        let msg = err.to_string();
        assert!(msg.contains("sink-a"));
        assert!(msg.contains("503"));
    }

    #[test]
    fn io_error_converts() {
        let io = std::io::Error::new(std::io::ErrorKind::AddrInUse, "in use");
        let err: LogshipError = io.into();
        assert!(matches!(err, LogshipError::Io(_)));
    }
}
