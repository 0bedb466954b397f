//! 설정 관리 -- logship.toml 파싱 및 런타임 설정
//!
//! [`LogshipConfig`]는 모든 모듈의 설정을 담는 최상위 구조체입니다.
//!
//! # 설정 로딩 우선순위
//! 1. CLI 인자 (최고 우선)
//! 2. 환경변수 (`LOGSHIP_SYSLOG_UDP_BIND=0.0.0.0:514` 형식)
//! 3. 설정 파일 (`logship.toml`)
//! 4. 기본값 (`Default` 구현)
//!
//! # 사용 예시
//! ```no_run
//! # async fn example() -> Result<(), logship_core::error::LogshipError> {
//! use logship_core::config::LogshipConfig;
//!
//! // 파일에서 로드 + 환경변수 오버라이드
//! let config = LogshipConfig::load("logship.toml").await?;
//!
//! // TOML 문자열에서 직접 파싱
//! let config = LogshipConfig::parse("[general]\nlog_level = \"debug\"")?;
//! # Ok(())
//! # }
//! ```

use std::collections::BTreeMap;
use std::fmt;
use std::net::SocketAddr;
use std::path::{Path, PathBuf};
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use tracing::warn;

use crate::error::{ConfigError, LogshipError};

/// 기본 DB 파일 이름
pub const DEFAULT_DB_FILE: &str = "logship.db";

/// logship 통합 설정
///
/// `logship.toml` 파일의 최상위 구조를 나타냅니다.
/// 각 모듈은 자기 섹션만 읽어 사용합니다.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct LogshipConfig {
    /// 일반 설정
    #[serde(default)]
    pub general: GeneralConfig,
    /// HTTP 서버 설정
    #[serde(default)]
    pub server: ServerConfig,
    /// syslog 수신 설정
    #[serde(default)]
    pub syslog: SyslogConfig,
    /// 파일 tail 설정
    #[serde(default)]
    pub file_tail: FileTailConfig,
    /// IP 허용/차단 정책
    #[serde(default)]
    pub ip_policy: IpPolicyConfig,
    /// 규칙 엔진 설정
    #[serde(default)]
    pub rules: RulesConfig,
    /// 스토리지 설정
    #[serde(default)]
    pub storage: StorageConfig,
    /// 포워딩 설정
    #[serde(default)]
    pub forward: ForwardConfig,
    /// 수집 파이프라인 설정
    #[serde(default)]
    pub pipeline: PipelineSettings,
    /// 메트릭 설정
    #[serde(default)]
    pub metrics: MetricsConfig,
}

impl LogshipConfig {
    /// TOML 파일에서 설정을 로드하고 환경변수 오버라이드를 적용합니다.
    ///
    /// 설정 로딩 순서:
    /// 1. TOML 파일 파싱
    /// 2. 환경변수 오버라이드 적용
    /// 3. 유효성 검증
    pub async fn load(path: impl AsRef<Path>) -> Result<Self, LogshipError> {
        let mut config = Self::from_file(path).await?;
        config.apply_env_overrides();
        config.validate()?;
        Ok(config)
    }

    /// TOML 파일에서 설정을 로드합니다 (환경변수 오버라이드 없음).
    pub async fn from_file(path: impl AsRef<Path>) -> Result<Self, LogshipError> {
        let path = path.as_ref();
        let content = tokio::fs::read_to_string(path).await.map_err(|e| {
            if e.kind() == std::io::ErrorKind::NotFound {
                LogshipError::Config(ConfigError::FileNotFound {
                    path: path.display().to_string(),
                })
            } else {
                LogshipError::Io(e)
            }
        })?;
        Self::parse(&content)
    }

    /// TOML 문자열에서 설정을 파싱합니다.
    pub fn parse(toml_str: &str) -> Result<Self, LogshipError> {
        toml::from_str(toml_str).map_err(|e| {
            LogshipError::Config(ConfigError::ParseFailed {
                reason: e.to_string(),
            })
        })
    }

    /// 환경변수로 설정값을 오버라이드합니다.
    ///
    /// 환경변수 네이밍 규칙: `LOGSHIP_{SECTION}_{FIELD}`
    /// 예: `LOGSHIP_STORAGE_MAX_ROWS=100000`
    pub fn apply_env_overrides(&mut self) {
        // General
        override_string(&mut self.general.log_level, "LOGSHIP_GENERAL_LOG_LEVEL");
        override_string(&mut self.general.log_format, "LOGSHIP_GENERAL_LOG_FORMAT");
        override_string(&mut self.general.pid_file, "LOGSHIP_GENERAL_PID_FILE");

        // Server
        override_string(&mut self.server.listen, "LOGSHIP_SERVER_LISTEN");
        override_usize(
            &mut self.server.max_body_bytes,
            "LOGSHIP_SERVER_MAX_BODY_BYTES",
        );
        override_u64(
            &mut self.server.body_timeout_secs,
            "LOGSHIP_SERVER_BODY_TIMEOUT_SECS",
        );

        // Syslog
        override_bool(&mut self.syslog.udp_enabled, "LOGSHIP_SYSLOG_UDP_ENABLED");
        override_string(&mut self.syslog.udp_bind, "LOGSHIP_SYSLOG_UDP_BIND");
        override_bool(&mut self.syslog.tcp_enabled, "LOGSHIP_SYSLOG_TCP_ENABLED");
        override_string(&mut self.syslog.tcp_bind, "LOGSHIP_SYSLOG_TCP_BIND");
        override_usize(
            &mut self.syslog.tcp_max_connections,
            "LOGSHIP_SYSLOG_TCP_MAX_CONNECTIONS",
        );

        // File tail
        override_bool(&mut self.file_tail.enabled, "LOGSHIP_FILE_TAIL_ENABLED");
        override_csv(&mut self.file_tail.paths, "LOGSHIP_FILE_TAIL_PATHS");
        override_string(&mut self.file_tail.glob, "LOGSHIP_FILE_TAIL_GLOB");

        // IP policy
        override_csv(&mut self.ip_policy.allow, "LOGSHIP_IP_POLICY_ALLOW");
        override_csv(&mut self.ip_policy.deny, "LOGSHIP_IP_POLICY_DENY");
        override_bool(
            &mut self.ip_policy.default_allow,
            "LOGSHIP_IP_POLICY_DEFAULT_ALLOW",
        );
        override_parsed(&mut self.ip_policy.order, "LOGSHIP_IP_POLICY_ORDER");

        // Rules
        override_parsed(&mut self.rules.match_policy, "LOGSHIP_RULES_MATCH_POLICY");
        override_string(&mut self.rules.seed_dir, "LOGSHIP_RULES_SEED_DIR");

        // Storage
        override_string(&mut self.storage.data_dir, "LOGSHIP_STORAGE_DATA_DIR");
        override_string(&mut self.storage.db_path, "LOGSHIP_STORAGE_DB_PATH");
        override_u64(&mut self.storage.max_rows, "LOGSHIP_STORAGE_MAX_ROWS");
        override_u64(&mut self.storage.max_db_mb, "LOGSHIP_STORAGE_MAX_DB_MB");
        override_u64(
            &mut self.storage.trim_interval_secs,
            "LOGSHIP_STORAGE_TRIM_INTERVAL_SECS",
        );

        // Forward
        override_u64(
            &mut self.forward.interval_secs,
            "LOGSHIP_FORWARD_INTERVAL_SECS",
        );
        if let Ok(url) = std::env::var("LOGSHIP_FORWARD_URL") {
            // 단일 목적지 단축 설정: 파일에 정의된 목적지를 대체합니다.
            self.forward.destinations = vec![ForwardDestination {
                url,
                ..ForwardDestination::default()
            }];
        }

        // Pipeline
        override_usize(
            &mut self.pipeline.channel_capacity,
            "LOGSHIP_PIPELINE_CHANNEL_CAPACITY",
        );

        // Metrics
        override_bool(&mut self.metrics.enabled, "LOGSHIP_METRICS_ENABLED");
        override_string(&mut self.metrics.listen_addr, "LOGSHIP_METRICS_LISTEN_ADDR");
        override_u16(&mut self.metrics.port, "LOGSHIP_METRICS_PORT");
    }

    /// 설정값의 유효성을 검증합니다.
    pub fn validate(&self) -> Result<(), LogshipError> {
        // log_level 검증
        let valid_levels = ["trace", "debug", "info", "warn", "error"];
        if !valid_levels.contains(&self.general.log_level.as_str()) {
            return Err(invalid(
                "general.log_level",
                format!("must be one of: {}", valid_levels.join(", ")),
            ));
        }

        // log_format 검증
        let valid_formats = ["json", "pretty"];
        if !valid_formats.contains(&self.general.log_format.as_str()) {
            return Err(invalid(
                "general.log_format",
                format!("must be one of: {}", valid_formats.join(", ")),
            ));
        }

        // 서버
        validate_socket_addr("server.listen", &self.server.listen)?;
        if self.server.max_body_bytes == 0 {
            return Err(invalid("server.max_body_bytes", "must be greater than 0"));
        }
        if self.server.body_timeout_secs == 0 {
            return Err(invalid("server.body_timeout_secs", "must be greater than 0"));
        }

        // syslog
        if self.syslog.udp_enabled {
            validate_socket_addr("syslog.udp_bind", &self.syslog.udp_bind)?;
            if !(512..=65_535).contains(&self.syslog.udp_buffer_size) {
                return Err(invalid("syslog.udp_buffer_size", "must be 512-65535"));
            }
        }
        if self.syslog.tcp_enabled {
            validate_socket_addr("syslog.tcp_bind", &self.syslog.tcp_bind)?;
            if self.syslog.tcp_max_connections == 0 {
                return Err(invalid(
                    "syslog.tcp_max_connections",
                    "must be greater than 0",
                ));
            }
            if self.syslog.tcp_idle_timeout_secs == 0 {
                return Err(invalid(
                    "syslog.tcp_idle_timeout_secs",
                    "must be greater than 0",
                ));
            }
        }
        if self.syslog.max_message_size == 0 {
            return Err(invalid("syslog.max_message_size", "must be greater than 0"));
        }

        // 파일 tail
        if self.file_tail.enabled {
            if self.file_tail.paths.is_empty() && self.file_tail.glob.is_empty() {
                return Err(invalid(
                    "file_tail.paths",
                    "at least one path or a glob is required when file_tail is enabled",
                ));
            }
            if self.file_tail.poll_interval_ms == 0 {
                return Err(invalid("file_tail.poll_interval_ms", "must be greater than 0"));
            }
        }

        // 스토리지
        if self.storage.data_dir.is_empty() && self.storage.db_path.is_empty() {
            return Err(invalid(
                "storage.data_dir",
                "data_dir or db_path must be set",
            ));
        }
        if self.storage.trim_interval_secs == 0 {
            return Err(invalid("storage.trim_interval_secs", "must be greater than 0"));
        }

        // 포워딩
        if self.forward.interval_secs == 0 {
            return Err(invalid("forward.interval_secs", "must be greater than 0"));
        }
        for (idx, dest) in self.forward.destinations.iter().enumerate() {
            dest.validate()
                .map_err(|reason| invalid(format!("forward.destinations[{idx}]"), reason))?;
        }

        // 파이프라인
        if self.pipeline.channel_capacity == 0 {
            return Err(invalid("pipeline.channel_capacity", "must be greater than 0"));
        }

        // 메트릭
        if self.metrics.enabled && self.metrics.endpoint != "/metrics" {
            return Err(invalid("metrics.endpoint", "only '/metrics' is supported"));
        }

        Ok(())
    }
}

fn invalid(field: impl Into<String>, reason: impl Into<String>) -> LogshipError {
    ConfigError::InvalidValue {
        field: field.into(),
        reason: reason.into(),
    }
    .into()
}

fn validate_socket_addr(field: &str, value: &str) -> Result<(), LogshipError> {
    value
        .parse::<SocketAddr>()
        .map(|_| ())
        .map_err(|e| invalid(field, format!("'{value}' is not a socket address: {e}")))
}

// Default는 derive 매크로로 자동 생성 (각 필드가 Default를 구현하므로)

/// 일반 설정
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct GeneralConfig {
    /// 로그 레벨 (trace, debug, info, warn, error)
    pub log_level: String,
    /// 로그 형식 (json, pretty)
    pub log_format: String,
    /// PID 파일 경로 (빈 문자열이면 사용 안 함)
    pub pid_file: String,
}

impl Default for GeneralConfig {
    fn default() -> Self {
        Self {
            log_level: "info".to_owned(),
            log_format: "json".to_owned(),
            pid_file: String::new(),
        }
    }
}

/// HTTP 서버 설정 (수집 엔드포인트 + 조회 API)
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    /// 바인드 주소
    pub listen: String,
    /// 요청 본문 최대 크기 (바이트)
    pub max_body_bytes: usize,
    /// 요청 본문 수신 제한 시간 (초)
    pub body_timeout_secs: u64,
    /// 종료 시 진행 중 요청 대기 시간 (초)
    pub shutdown_grace_secs: u64,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            listen: "0.0.0.0:8080".to_owned(),
            max_body_bytes: 1024 * 1024, // 1MB
            body_timeout_secs: 10,
            shutdown_grace_secs: 10,
        }
    }
}

/// syslog 수신 설정
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SyslogConfig {
    /// UDP 수신 활성화
    pub udp_enabled: bool,
    /// UDP 바인드 주소
    pub udp_bind: String,
    /// UDP 수신 버퍼 크기 (바이트, 데이터그램 최대 크기)
    pub udp_buffer_size: usize,
    /// TCP 수신 활성화
    pub tcp_enabled: bool,
    /// TCP 바인드 주소
    pub tcp_bind: String,
    /// 최대 동시 TCP 연결 수
    pub tcp_max_connections: usize,
    /// TCP 연결 유휴 제한 시간 (초)
    pub tcp_idle_timeout_secs: u64,
    /// 최대 메시지 크기 (바이트)
    pub max_message_size: usize,
}

impl Default for SyslogConfig {
    fn default() -> Self {
        Self {
            udp_enabled: true,
            udp_bind: "0.0.0.0:5514".to_owned(),
            udp_buffer_size: 8192,
            tcp_enabled: true,
            tcp_bind: "0.0.0.0:5514".to_owned(),
            tcp_max_connections: 256,
            tcp_idle_timeout_secs: 300,
            max_message_size: 64 * 1024, // 64KB
        }
    }
}

/// 파일 tail 설정
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct FileTailConfig {
    /// 활성화 여부
    pub enabled: bool,
    /// 감시할 파일 경로 목록
    pub paths: Vec<String>,
    /// 추가 glob 패턴 (마지막 경로 요소에 `*`, `?` 허용)
    pub glob: String,
    /// 폴링 주기 (밀리초)
    pub poll_interval_ms: u64,
    /// 최대 라인 길이 (바이트)
    pub max_line_length: usize,
}

impl Default for FileTailConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            paths: Vec::new(),
            glob: String::new(),
            poll_interval_ms: 500,
            max_line_length: 64 * 1024,
        }
    }
}

/// IP 정책 평가 순서
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PolicyOrder {
    /// 차단 목록 우선 (기본값)
    #[default]
    DenyFirst,
    /// 허용 목록 우선
    AllowFirst,
}

impl FromStr for PolicyOrder {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "deny_first" => Ok(Self::DenyFirst),
            "allow_first" => Ok(Self::AllowFirst),
            other => Err(format!("unknown policy order '{other}'")),
        }
    }
}

/// IP 허용/차단 정책 설정
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct IpPolicyConfig {
    /// 허용 CIDR 목록 (비어 있으면 모두 허용)
    pub allow: Vec<String>,
    /// 차단 CIDR 목록
    pub deny: Vec<String>,
    /// 주소를 해석할 수 없을 때의 기본 정책
    pub default_allow: bool,
    /// 평가 순서
    pub order: PolicyOrder,
}

impl Default for IpPolicyConfig {
    fn default() -> Self {
        Self {
            allow: Vec::new(),
            deny: Vec::new(),
            default_allow: true,
            order: PolicyOrder::DenyFirst,
        }
    }
}

/// 규칙 매칭 정책
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MatchPolicy {
    /// 첫 번째 매칭 규칙 적용 (기본값)
    #[default]
    First,
    /// 마지막 매칭 규칙 적용
    Last,
}

impl FromStr for MatchPolicy {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "first" => Ok(Self::First),
            "last" => Ok(Self::Last),
            other => Err(format!("unknown match policy '{other}'")),
        }
    }
}

impl fmt::Display for MatchPolicy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::First => f.write_str("first"),
            Self::Last => f.write_str("last"),
        }
    }
}

/// 규칙 엔진 설정
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct RulesConfig {
    /// 매칭 정책
    pub match_policy: MatchPolicy,
    /// 시작 시 로드할 YAML 규칙 디렉토리 (빈 문자열이면 사용 안 함)
    pub seed_dir: String,
}

/// 스토리지 설정
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct StorageConfig {
    /// 데이터 디렉토리
    pub data_dir: String,
    /// DB 파일 경로 (빈 문자열이면 `<data_dir>/logship.db`)
    pub db_path: String,
    /// 최대 보존 행 수 (0이면 제한 없음)
    pub max_rows: u64,
    /// 최대 DB 크기 (MB, 0이면 제한 없음)
    pub max_db_mb: u64,
    /// 보존 정리 주기 (초)
    pub trim_interval_secs: u64,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            data_dir: "/var/lib/logship".to_owned(),
            db_path: String::new(),
            max_rows: 500_000,
            max_db_mb: 512,
            trim_interval_secs: 30,
        }
    }
}

impl StorageConfig {
    /// 실제 DB 파일 경로를 계산합니다.
    ///
    /// `db_path`가 비어 있으면 `data_dir` 아래 기본 파일을, 디렉토리를 가리키면
    /// 그 아래 기본 파일을 사용합니다.
    pub fn resolved_db_path(&self) -> PathBuf {
        if self.db_path.is_empty() {
            return Path::new(&self.data_dir).join(DEFAULT_DB_FILE);
        }
        let path = Path::new(&self.db_path);
        if self.db_path.ends_with('/') || path.is_dir() {
            path.join(DEFAULT_DB_FILE)
        } else {
            path.to_path_buf()
        }
    }
}

/// 포워딩 목적지
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ForwardDestination {
    /// 로그용 이름
    pub name: String,
    /// POST 대상 URL
    pub url: String,
    /// 고정 헤더
    pub headers: BTreeMap<String, String>,
    /// 배치 최대 이벤트 수
    pub batch_size: usize,
    /// 요청 제한 시간 (초)
    pub timeout_secs: u64,
}

/// 목적지 배치 크기 상한
pub const MAX_FORWARD_BATCH_SIZE: usize = 10_000;

impl Default for ForwardDestination {
    fn default() -> Self {
        Self {
            name: "default".to_owned(),
            url: String::new(),
            headers: BTreeMap::new(),
            batch_size: 500,
            timeout_secs: 15,
        }
    }
}

impl ForwardDestination {
    fn validate(&self) -> Result<(), String> {
        if !(self.url.starts_with("http://") || self.url.starts_with("https://")) {
            return Err(format!("url '{}' must be http:// or https://", self.url));
        }
        if self.batch_size == 0 || self.batch_size > MAX_FORWARD_BATCH_SIZE {
            return Err(format!("batch_size must be 1-{MAX_FORWARD_BATCH_SIZE}"));
        }
        if self.timeout_secs == 0 {
            return Err("timeout_secs must be greater than 0".to_owned());
        }
        Ok(())
    }
}

/// 포워딩 설정
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ForwardConfig {
    /// 틱 주기 (초)
    pub interval_secs: u64,
    /// 목적지 목록 (비어 있으면 포워딩 안 함)
    pub destinations: Vec<ForwardDestination>,
}

impl Default for ForwardConfig {
    fn default() -> Self {
        Self {
            interval_secs: 2,
            destinations: Vec::new(),
        }
    }
}

/// 수집 파이프라인 설정
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct PipelineSettings {
    /// 수집기 -> 처리 태스크 채널 용량
    pub channel_capacity: usize,
}

impl Default for PipelineSettings {
    fn default() -> Self {
        Self {
            channel_capacity: 4096,
        }
    }
}

/// 메트릭 설정
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct MetricsConfig {
    /// 활성화 여부
    pub enabled: bool,
    /// 바인드 주소
    pub listen_addr: String,
    /// 포트
    pub port: u16,
    /// 엔드포인트 경로
    pub endpoint: String,
}

impl Default for MetricsConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            listen_addr: "127.0.0.1".to_owned(),
            port: 9100,
            endpoint: "/metrics".to_owned(),
        }
    }
}

// --- 환경변수 오버라이드 헬퍼 ---

fn override_string(target: &mut String, env_key: &str) {
    if let Ok(val) = std::env::var(env_key) {
        *target = val;
    }
}

fn override_bool(target: &mut bool, env_key: &str) {
    if let Ok(val) = std::env::var(env_key) {
        match val.parse::<bool>() {
            Ok(parsed) => *target = parsed,
            Err(_) => warn!(
                env_key,
                value = val.as_str(),
                "failed to parse bool from env var, ignoring"
            ),
        }
    }
}

fn override_usize(target: &mut usize, env_key: &str) {
    if let Ok(val) = std::env::var(env_key) {
        match val.parse::<usize>() {
            Ok(parsed) => *target = parsed,
            Err(_) => warn!(
                env_key,
                value = val.as_str(),
                "failed to parse usize from env var, ignoring"
            ),
        }
    }
}

fn override_u16(target: &mut u16, env_key: &str) {
    if let Ok(val) = std::env::var(env_key) {
        match val.parse::<u16>() {
            Ok(parsed) => *target = parsed,
            Err(_) => warn!(
                env_key,
                value = val.as_str(),
                "failed to parse u16 from env var, ignoring"
            ),
        }
    }
}

fn override_u64(target: &mut u64, env_key: &str) {
    if let Ok(val) = std::env::var(env_key) {
        match val.parse::<u64>() {
            Ok(parsed) => *target = parsed,
            Err(_) => warn!(
                env_key,
                value = val.as_str(),
                "failed to parse u64 from env var, ignoring"
            ),
        }
    }
}

fn override_parsed<T: FromStr>(target: &mut T, env_key: &str) {
    if let Ok(val) = std::env::var(env_key) {
        match val.parse::<T>() {
            Ok(parsed) => *target = parsed,
            Err(_) => warn!(
                env_key,
                value = val.as_str(),
                "failed to parse value from env var, ignoring"
            ),
        }
    }
}

fn override_csv(target: &mut Vec<String>, env_key: &str) {
    if let Ok(val) = std::env::var(env_key) {
        *target = val
            .split(',')
            .map(|s| s.trim().to_owned())
            .filter(|s| !s.is_empty())
            .collect();
    }
}
