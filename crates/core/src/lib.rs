//! logship 공통 크레이트 -- 도메인 타입, 에러, 설정, 생명주기 trait
//!
//! 모든 logship 크레이트가 공유하는 정의를 모아 둡니다.
//!
//! - [`types`]: `Event`, `Rule`, `Decision` 등 도메인 타입
//! - [`error`]: 최상위 에러 [`LogshipError`]와 도메인별 에러
//! - [`config`]: `logship.toml` 설정 ([`LogshipConfig`])
//! - [`pipeline`]: 백그라운드 모듈 생명주기 trait ([`Pipeline`])
//! - [`metrics`]: Prometheus 메트릭 이름 상수

pub mod config;
pub mod error;
pub mod metrics;
pub mod pipeline;
pub mod types;

// --- 주요 타입 re-export ---

// 에러
pub use error::{ConfigError, ForwardError, LogshipError, PipelineError, StorageError};

// 설정
pub use config::LogshipConfig;

// 파이프라인 trait
pub use pipeline::{DynPipeline, HealthStatus, Pipeline};

// 도메인 타입
pub use types::{
    Action, Decision, Event, NewEvent, Predicate, PredicateField, PredicateKind, Rule, RuleSpec,
    Transport,
};
