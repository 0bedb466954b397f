//! # logship-pipeline
//!
//! 로그 수집, 정규화, IP 정책, keep/drop 규칙 평가를 담당하는 수집 파이프라인입니다.
//!
//! # 모듈 구성
//!
//! - [`collector`]: syslog UDP/TCP, 파일 tail 수집기
//! - [`parser`]: Syslog RFC 5424/3164 파서와 `POST /ingest` JSON 디코더
//! - [`policy`]: CIDR 기반 소스 IP 허용/거부 정책
//! - [`rule`]: 우선순위 기반 keep/drop 규칙 엔진
//! - [`ingest`]: 정규화 -> 정책 -> 규칙 -> 저장 경로
//! - [`pipeline`]: 수집기와 처리 태스크 오케스트레이션 (Pipeline trait 구현)
//! - [`config`]: 파이프라인 설정 (core 설정에서 변환)
//! - [`error`]: 도메인 에러 타입
//!
//! # 아키텍처
//!
//! ```text
//! Collectors -> mpsc<RawLog> -> Ingestor -> Store
//!                                  |
//!                      IpPolicy -> RuleEngine
//! ```

pub mod config;
pub mod error;
pub mod ingest;
pub mod pipeline;
pub mod policy;

pub mod collector;
pub mod parser;
pub mod rule;

// --- 주요 타입 re-export ---

// 파이프라인
pub use pipeline::{LogPipeline, LogPipelineBuilder};

// 설정
pub use config::{PipelineConfig, PipelineConfigBuilder};

// 에러
pub use error::LogPipelineError;

// 처리 경로
pub use ingest::Ingestor;
pub use policy::IpPolicy;

// 파서
pub use parser::{ParseOutcome, SyslogParser, decode_ingest_body};

// 규칙 엔진
pub use rule::{PreviewMatch, RuleEngine, RulePreview, RuleSnapshot};

// 수집기
pub use collector::RawLog;
