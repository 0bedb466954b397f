//! 주기적 포워딩 태스크
//!
//! [`ForwarderTask`]는 `forward.interval_secs`마다 [`Forwarder::tick`]을 실행합니다.
//! 한 번에 하나의 틱만 실행되며 밀린 틱은 건너뜁니다.

use std::time::Duration;

use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use logship_core::config::ForwardConfig;
use logship_core::error::{LogshipError, PipelineError};
use logship_core::pipeline::{HealthStatus, Pipeline};
use logship_store::Store;

use crate::error::ForwarderError;
use crate::forwarder::{Forwarder, TickOutcome};

/// 태스크 실행 상태
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum TaskState {
    Initialized,
    Running,
    Stopped,
}

/// 포워딩 태스크
pub struct ForwarderTask {
    forwarder: Forwarder,
    interval: Duration,
    state: TaskState,
    cancel: CancellationToken,
    handle: Option<JoinHandle<()>>,
}

impl ForwarderTask {
    /// 새 태스크를 생성합니다.
    pub fn new(forwarder: Forwarder, interval: Duration) -> Self {
        Self {
            forwarder,
            interval: interval.max(Duration::from_millis(10)),
            state: TaskState::Initialized,
            cancel: CancellationToken::new(),
            handle: None,
        }
    }

    /// 설정에서 태스크를 생성합니다.
    pub fn from_config(store: Store, config: &ForwardConfig) -> Result<Self, ForwarderError> {
        let forwarder = Forwarder::new(store, &config.destinations)?;
        Ok(Self::new(forwarder, Duration::from_secs(config.interval_secs)))
    }

    /// 내부 포워더
    pub fn forwarder(&self) -> &Forwarder {
        &self.forwarder
    }
}

impl Pipeline for ForwarderTask {
    async fn start(&mut self) -> Result<(), LogshipError> {
        if self.state == TaskState::Running {
            return Err(PipelineError::AlreadyRunning.into());
        }
        if self.forwarder.destination_count() == 0 {
            info!("no forward destinations configured, forwarding disabled");
        }

        self.cancel = CancellationToken::new();
        let cancel = self.cancel.clone();
        let forwarder = self.forwarder.clone();
        let period = self.interval;

        self.handle = Some(tokio::spawn(async move {
            let mut ticker = tokio::time::interval(period);
            ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);
            loop {
                tokio::select! {
                    _ = cancel.cancelled() => break,
                    _ = ticker.tick() => {
                        match forwarder.tick().await {
                            Ok(TickOutcome::Retrying { events, failed_destinations }) => {
                                warn!(events, failed_destinations, "batch left pending for retry");
                            }
                            Ok(_) => {}
                            Err(e) => warn!(error = %e, "forward tick failed"),
                        }
                    }
                }
            }
            debug!("forwarder task exited");
        }));

        self.state = TaskState::Running;
        info!(
            destinations = self.forwarder.destination_count(),
            batch_size = self.forwarder.batch_size(),
            interval_secs = self.interval.as_secs(),
            "forwarder task started"
        );
        Ok(())
    }

    async fn stop(&mut self) -> Result<(), LogshipError> {
        if self.state != TaskState::Running {
            return Err(PipelineError::NotRunning.into());
        }
        self.cancel.cancel();
        if let Some(handle) = self.handle.take() {
            if let Err(e) = handle.await {
                warn!(error = %e, "forwarder task join failed");
            }
        }
        self.state = TaskState::Stopped;
        info!("forwarder task stopped");
        Ok(())
    }

    async fn health_check(&self) -> HealthStatus {
        match self.state {
            TaskState::Running => match &self.handle {
                Some(h) if h.is_finished() => HealthStatus::Unhealthy("forwarder task exited".to_owned()),
                _ => HealthStatus::Healthy,
            },
            TaskState::Initialized => HealthStatus::Unhealthy("not started".to_owned()),
            TaskState::Stopped => HealthStatus::Unhealthy("stopped".to_owned()),
        }
    }
}
