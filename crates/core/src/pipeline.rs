//! 파이프라인 trait -- 백그라운드 모듈 생명주기 정의
//!
//! 수집 파이프라인, 포워더, 보존 정리 태스크는 모두 [`Pipeline`]을 구현하여
//! 데몬에서 동일한 방식(start/stop/health_check)으로 관리됩니다.

use std::future::Future;
use std::pin::Pin;

use serde::Serialize;

use crate::error::LogshipError;

/// 모듈 건강 상태
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "status", content = "reason", rename_all = "lowercase")]
pub enum HealthStatus {
    /// 정상
    Healthy,
    /// 동작 중이지만 성능 저하
    Degraded(String),
    /// 동작 불가
    Unhealthy(String),
}

impl HealthStatus {
    /// 정상 상태인지 확인합니다.
    pub fn is_healthy(&self) -> bool {
        matches!(self, Self::Healthy)
    }

    /// 동작 불가 상태인지 확인합니다.
    pub fn is_unhealthy(&self) -> bool {
        matches!(self, Self::Unhealthy(_))
    }
}

/// 백그라운드 모듈 생명주기 trait
///
/// `start`는 필요한 소켓을 바인드하고 태스크를 스폰한 뒤 즉시 반환합니다.
/// 바인드 실패 등 시작 에러는 호출자에게 전파되어야 합니다.
pub trait Pipeline: Send + Sync {
    /// 모듈을 시작합니다.
    fn start(&mut self) -> impl Future<Output = Result<(), LogshipError>> + Send;

    /// 모듈을 정지합니다. 실행 중인 태스크가 종료될 때까지 기다립니다.
    fn stop(&mut self) -> impl Future<Output = Result<(), LogshipError>> + Send;

    /// 모듈의 건강 상태를 확인합니다.
    fn health_check(&self) -> impl Future<Output = HealthStatus> + Send;
}

/// `Pin<Box<dyn Future>>` 별칭
pub type BoxFuture<'a, T> = Pin<Box<dyn Future<Output = T> + Send + 'a>>;

/// dyn-compatible 파이프라인 trait
///
/// `Pipeline`은 RPITIT를 사용하므로 `dyn Pipeline`이 불가합니다.
/// `DynPipeline`은 `BoxFuture`를 반환하여 `Vec<Box<dyn DynPipeline>>`으로
/// 모듈을 동적 관리할 수 있게 합니다.
pub trait DynPipeline: Send + Sync {
    /// 모듈을 시작합니다.
    fn start(&mut self) -> BoxFuture<'_, Result<(), LogshipError>>;

    /// 모듈을 정지합니다.
    fn stop(&mut self) -> BoxFuture<'_, Result<(), LogshipError>>;

    /// 모듈의 건강 상태를 확인합니다.
    fn health_check(&self) -> BoxFuture<'_, HealthStatus>;
}

/// Pipeline을 구현한 타입은 자동으로 DynPipeline도 구현됩니다.
impl<T: Pipeline> DynPipeline for T {
    fn start(&mut self) -> BoxFuture<'_, Result<(), LogshipError>> {
        Box::pin(Pipeline::start(self))
    }

    fn stop(&mut self) -> BoxFuture<'_, Result<(), LogshipError>> {
        Box::pin(Pipeline::stop(self))
    }

    fn health_check(&self) -> BoxFuture<'_, HealthStatus> {
        Box::pin(Pipeline::health_check(self))
    }
}
