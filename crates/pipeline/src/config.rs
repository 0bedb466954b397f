//! 수집 파이프라인 설정
//!
//! [`PipelineConfig`]는 core의 [`LogshipConfig`]에서 수집기 관련 설정만 추려
//! 실행 가능한 형태(활성화된 수집기만 `Some`)로 변환합니다.
//!
//! # 사용 예시
//! ```
//! use logship_core::config::LogshipConfig;
//! use logship_pipeline::config::PipelineConfig;
//!
//! let core = LogshipConfig::default();
//! let config = PipelineConfig::from_core(&core).unwrap();
//! assert!(config.udp_bind.is_some());
//! ```

use std::path::{Component, Path};

use logship_core::config::LogshipConfig;

use crate::collector::{FileTailSettings, SyslogTcpSettings};
use crate::error::LogPipelineError;

/// 최대 채널 용량
const MAX_CHANNEL_CAPACITY: usize = 1_000_000;

/// 수집 파이프라인 설정
#[derive(Debug, Clone)]
pub struct PipelineConfig {
    /// UDP syslog 바인드 주소 (None이면 비활성)
    pub udp_bind: Option<String>,
    /// UDP 수신 버퍼 크기
    pub udp_buffer_size: usize,
    /// TCP syslog 바인드 주소 (None이면 비활성)
    pub tcp_bind: Option<String>,
    /// TCP 연결 처리 설정
    pub tcp: SyslogTcpSettings,
    /// 파일 tail 설정 (None이면 비활성)
    pub file_tail: Option<FileTailSettings>,
    /// syslog 파서 최대 입력 크기
    pub max_message_size: usize,
    /// 수집기 -> 처리 태스크 채널 용량
    pub channel_capacity: usize,
}

impl Default for PipelineConfig {
    /// 수집기가 하나도 없는 설정
    fn default() -> Self {
        Self {
            udp_bind: None,
            udp_buffer_size: 8192,
            tcp_bind: None,
            tcp: SyslogTcpSettings::default(),
            file_tail: None,
            max_message_size: 64 * 1024,
            channel_capacity: 4096,
        }
    }
}

impl PipelineConfig {
    /// core 설정에서 파이프라인 설정을 생성합니다.
    pub fn from_core(core: &LogshipConfig) -> Result<Self, LogPipelineError> {
        let file_tail = if core.file_tail.enabled {
            Some(FileTailSettings::from_config(&core.file_tail)?)
        } else {
            None
        };

        let config = Self {
            udp_bind: core.syslog.udp_enabled.then(|| core.syslog.udp_bind.clone()),
            udp_buffer_size: core.syslog.udp_buffer_size,
            tcp_bind: core.syslog.tcp_enabled.then(|| core.syslog.tcp_bind.clone()),
            tcp: SyslogTcpSettings::from(&core.syslog),
            file_tail,
            max_message_size: core.syslog.max_message_size,
            channel_capacity: core.pipeline.channel_capacity,
        };
        config.validate()?;
        Ok(config)
    }

    /// 파일 경로가 안전한지 검증합니다 (path traversal 방지).
    fn validate_tail_path(path: &Path) -> Result<(), LogPipelineError> {
        if path.as_os_str().is_empty() {
            return Err(LogPipelineError::Config {
                field: "file_tail.paths".to_owned(),
                reason: "path must not be empty".to_owned(),
            });
        }
        if path.components().any(|c| c == Component::ParentDir) {
            return Err(LogPipelineError::Config {
                field: "file_tail.paths".to_owned(),
                reason: format!("path '{}' contains '..'", path.display()),
            });
        }
        Ok(())
    }

    /// 설정값의 유효성을 검증합니다.
    pub fn validate(&self) -> Result<(), LogPipelineError> {
        if self.channel_capacity == 0 || self.channel_capacity > MAX_CHANNEL_CAPACITY {
            return Err(LogPipelineError::Config {
                field: "pipeline.channel_capacity".to_owned(),
                reason: format!("must be 1-{MAX_CHANNEL_CAPACITY}"),
            });
        }
        if self.udp_bind.is_some() && self.udp_buffer_size == 0 {
            return Err(LogPipelineError::Config {
                field: "syslog.udp_buffer_size".to_owned(),
                reason: "must be greater than 0".to_owned(),
            });
        }
        if self.tcp_bind.is_some() && self.tcp.max_connections == 0 {
            return Err(LogPipelineError::Config {
                field: "syslog.tcp_max_connections".to_owned(),
                reason: "must be greater than 0".to_owned(),
            });
        }
        if let Some(tail) = &self.file_tail {
            for path in &tail.paths {
                Self::validate_tail_path(path)?;
            }
            if let Some(glob) = &tail.glob {
                Self::validate_tail_path(glob)?;
            }
        }
        Ok(())
    }

    /// 활성화된 수집기 수
    pub fn collector_count(&self) -> usize {
        usize::from(self.udp_bind.is_some())
            + usize::from(self.tcp_bind.is_some())
            + usize::from(self.file_tail.is_some())
    }
}

/// 파이프라인 설정 빌더
#[derive(Default)]
pub struct PipelineConfigBuilder {
    config: PipelineConfig,
}

impl PipelineConfigBuilder {
    /// 새 빌더를 생성합니다.
    pub fn new() -> Self {
        Self::default()
    }

    /// UDP 수집기를 활성화합니다.
    pub fn udp(mut self, bind: impl Into<String>) -> Self {
        self.config.udp_bind = Some(bind.into());
        self
    }

    /// TCP 수집기를 활성화합니다.
    pub fn tcp(mut self, bind: impl Into<String>) -> Self {
        self.config.tcp_bind = Some(bind.into());
        self
    }

    /// TCP 연결 처리 설정을 지정합니다.
    pub fn tcp_settings(mut self, settings: SyslogTcpSettings) -> Self {
        self.config.tcp = settings;
        self
    }

    /// 파일 tail 수집기를 활성화합니다.
    pub fn file_tail(mut self, settings: FileTailSettings) -> Self {
        self.config.file_tail = Some(settings);
        self
    }

    /// 채널 용량을 설정합니다.
    pub fn channel_capacity(mut self, capacity: usize) -> Self {
        self.config.channel_capacity = capacity;
        self
    }

    /// 설정을 검증하고 `PipelineConfig`를 생성합니다.
    pub fn build(self) -> Result<PipelineConfig, LogPipelineError> {
        self.config.validate()?;
        Ok(self.config)
    }
}
