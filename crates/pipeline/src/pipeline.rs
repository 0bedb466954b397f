//! 파이프라인 오케스트레이션 -- 수집기와 처리 태스크의 생명주기를 관리합니다.
//!
//! [`LogPipeline`]은 core의 [`Pipeline`] trait을 구현하여
//! `logship-daemon`에서 다른 모듈과 동일한 생명주기로 관리됩니다.
//!
//! # 내부 아키텍처
//! ```text
//! UDP / TCP / file-tail -> mpsc<RawLog> -> processing task -> Ingestor -> Store
//! ```
//!
//! 정지 시 수집기는 취소 토큰으로 멈추고, 처리 태스크는 채널에 남은
//! 로그를 모두 저장한 뒤 종료합니다.

use std::net::SocketAddr;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use logship_core::error::{LogshipError, PipelineError};
use logship_core::pipeline::{HealthStatus, Pipeline};

use crate::collector::{FileTailCollector, RawLog, SyslogTcpCollector, SyslogUdpCollector};
use crate::config::PipelineConfig;
use crate::error::LogPipelineError;
use crate::ingest::Ingestor;
use crate::parser::SyslogParser;

/// 파이프라인 실행 상태
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum PipelineState {
    /// 초기화됨, 아직 시작하지 않음
    Initialized,
    /// 실행 중
    Running,
    /// 정지됨
    Stopped,
}

/// 처리 카운터
#[derive(Debug, Default)]
struct Counters {
    processed: AtomicU64,
    failed: AtomicU64,
}

/// 수집 파이프라인
///
/// # 사용 예시
/// ```ignore
/// use logship_pipeline::{LogPipeline, PipelineConfig};
///
/// let mut pipeline = LogPipeline::new(PipelineConfig::from_core(&config)?, ingestor);
/// pipeline.start().await?;
/// ```
pub struct LogPipeline {
    config: PipelineConfig,
    ingestor: Ingestor,
    state: PipelineState,
    cancel: CancellationToken,
    collector_tasks: Vec<JoinHandle<()>>,
    processor: Option<JoinHandle<()>>,
    udp_addr: Option<SocketAddr>,
    tcp_addr: Option<SocketAddr>,
    counters: Arc<Counters>,
}

impl LogPipeline {
    /// 새 파이프라인을 생성합니다. 소켓은 `start`에서 바인드합니다.
    pub fn new(config: PipelineConfig, ingestor: Ingestor) -> Self {
        let parser = SyslogParser::new().with_max_input_size(config.max_message_size);
        Self {
            ingestor: ingestor.with_parser(parser),
            config,
            state: PipelineState::Initialized,
            cancel: CancellationToken::new(),
            collector_tasks: Vec::new(),
            processor: None,
            udp_addr: None,
            tcp_addr: None,
            counters: Arc::new(Counters::default()),
        }
    }

    /// 현재 상태 이름
    pub fn state_name(&self) -> &str {
        match self.state {
            PipelineState::Initialized => "initialized",
            PipelineState::Running => "running",
            PipelineState::Stopped => "stopped",
        }
    }

    /// 공유 처리기
    pub fn ingestor(&self) -> &Ingestor {
        &self.ingestor
    }

    /// UDP 수집기가 실제로 바인드된 주소
    pub fn udp_addr(&self) -> Option<SocketAddr> {
        self.udp_addr
    }

    /// TCP 수집기가 실제로 바인드된 주소
    pub fn tcp_addr(&self) -> Option<SocketAddr> {
        self.tcp_addr
    }

    /// 처리 태스크가 저장한 이벤트 수
    pub fn processed_count(&self) -> u64 {
        self.counters.processed.load(Ordering::Relaxed)
    }

    /// 처리 태스크의 저장 실패 수
    pub fn failed_count(&self) -> u64 {
        self.counters.failed.load(Ordering::Relaxed)
    }

    /// 채널을 순서대로 소비하며 이벤트를 저장합니다.
    ///
    /// 저장 실패는 기록만 하고 계속 진행합니다.
    async fn process(ingestor: Ingestor, mut rx: mpsc::Receiver<RawLog>, counters: Arc<Counters>) {
        while let Some(raw) = rx.recv().await {
            let peer = raw.peer.clone();
            match ingestor.ingest_raw(raw).await {
                Ok(_) => {
                    counters.processed.fetch_add(1, Ordering::Relaxed);
                }
                Err(e) => {
                    counters.failed.fetch_add(1, Ordering::Relaxed);
                    warn!(peer = %peer, error = %e, "dropping collected log after storage failure");
                }
            }
        }
        info!("processing task drained");
    }
}

impl Pipeline for LogPipeline {
    async fn start(&mut self) -> Result<(), LogshipError> {
        if self.state == PipelineState::Running {
            return Err(PipelineError::AlreadyRunning.into());
        }

        info!(collectors = self.config.collector_count(), "starting log pipeline");

        // 1. 소켓 바인드 (실패 시 아무 태스크도 스폰하지 않음)
        let udp = match &self.config.udp_bind {
            Some(bind) => Some(SyslogUdpCollector::bind(bind, self.config.udp_buffer_size).await?),
            None => None,
        };
        let tcp = match &self.config.tcp_bind {
            Some(bind) => Some(SyslogTcpCollector::bind(bind, self.config.tcp.clone()).await?),
            None => None,
        };
        let file = match &self.config.file_tail {
            Some(settings) => Some(FileTailCollector::new(settings.clone()).await),
            None => None,
        };

        // 2. 채널과 처리 태스크
        self.cancel = CancellationToken::new();
        let (tx, rx) = mpsc::channel(self.config.channel_capacity);
        self.processor = Some(tokio::spawn(Self::process(
            self.ingestor.clone(),
            rx,
            Arc::clone(&self.counters),
        )));

        // 3. 수집기 태스크
        if let Some(udp) = udp {
            self.udp_addr = Some(udp.local_addr());
            self.collector_tasks
                .push(tokio::spawn(udp.run(tx.clone(), self.cancel.clone())));
        }
        if let Some(tcp) = tcp {
            self.tcp_addr = Some(tcp.local_addr());
            self.collector_tasks
                .push(tokio::spawn(tcp.run(tx.clone(), self.cancel.clone())));
        }
        if let Some(file) = file {
            self.collector_tasks
                .push(tokio::spawn(file.run(tx.clone(), self.cancel.clone())));
        }
        drop(tx);

        self.state = PipelineState::Running;
        info!("log pipeline started");
        Ok(())
    }

    async fn stop(&mut self) -> Result<(), LogshipError> {
        if self.state != PipelineState::Running {
            return Err(PipelineError::NotRunning.into());
        }

        info!("stopping log pipeline");
        self.cancel.cancel();

        for task in self.collector_tasks.drain(..) {
            if let Err(e) = task.await {
                warn!(error = %e, "collector task ended abnormally");
            }
        }
        // 모든 송신측이 닫히면 처리 태스크가 남은 로그를 저장하고 종료
        if let Some(processor) = self.processor.take() {
            if let Err(e) = processor.await {
                warn!(error = %e, "processing task ended abnormally");
            }
        }

        self.state = PipelineState::Stopped;
        info!(
            processed = self.processed_count(),
            failed = self.failed_count(),
            "log pipeline stopped"
        );
        Ok(())
    }

    async fn health_check(&self) -> HealthStatus {
        match self.state {
            PipelineState::Running => {
                let processor_alive = self.processor.as_ref().is_some_and(|h| !h.is_finished());
                if !processor_alive {
                    HealthStatus::Unhealthy("processing task exited".to_owned())
                } else if self.collector_tasks.iter().any(JoinHandle::is_finished) {
                    HealthStatus::Degraded("a collector task exited".to_owned())
                } else {
                    HealthStatus::Healthy
                }
            }
            PipelineState::Initialized => HealthStatus::Unhealthy("not started".to_owned()),
            PipelineState::Stopped => HealthStatus::Unhealthy("stopped".to_owned()),
        }
    }
}

/// 파이프라인 빌더
///
/// # 사용 예시
/// ```ignore
/// let pipeline = LogPipelineBuilder::new()
///     .config(config)
///     .ingestor(ingestor)
///     .build()?;
/// ```
#[derive(Default)]
pub struct LogPipelineBuilder {
    config: PipelineConfig,
    ingestor: Option<Ingestor>,
}

impl LogPipelineBuilder {
    /// 새 빌더를 생성합니다.
    pub fn new() -> Self {
        Self::default()
    }

    /// 파이프라인 설정을 지정합니다.
    pub fn config(mut self, config: PipelineConfig) -> Self {
        self.config = config;
        self
    }

    /// 평가-저장 처리기를 지정합니다.
    pub fn ingestor(mut self, ingestor: Ingestor) -> Self {
        self.ingestor = Some(ingestor);
        self
    }

    /// 설정을 검증하고 파이프라인을 생성합니다.
    pub fn build(self) -> Result<LogPipeline, LogPipelineError> {
        self.config.validate()?;
        let ingestor = self.ingestor.ok_or_else(|| LogPipelineError::Config {
            field: "ingestor".to_owned(),
            reason: "an ingestor is required".to_owned(),
        })?;
        Ok(LogPipeline::new(self.config, ingestor))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::PipelineConfigBuilder;
    use crate::policy::IpPolicy;
    use crate::rule::RuleEngine;
    use logship_core::config::MatchPolicy;
    use logship_store::{EventFilter, Store};
    use std::time::Duration;
    use tokio::io::AsyncWriteExt;

    async fn ingestor() -> Ingestor {
        let store = Store::open_in_memory().unwrap();
        let rules = RuleEngine::load(store.clone(), MatchPolicy::First).await.unwrap();
        Ingestor::new(store, Arc::new(IpPolicy::default()), Arc::new(rules))
    }

    #[tokio::test]
    async fn builder_requires_ingestor() {
        assert!(LogPipelineBuilder::new().build().is_err());
        let pipeline = LogPipelineBuilder::new()
            .ingestor(ingestor().await)
            .build()
            .unwrap();
        assert_eq!(pipeline.state_name(), "initialized");
    }

    #[tokio::test]
    async fn pipeline_lifecycle() {
        let config = PipelineConfigBuilder::new().build().unwrap();
        let mut pipeline = LogPipeline::new(config, ingestor().await);
        assert_eq!(pipeline.state_name(), "initialized");
        assert!(pipeline.health_check().await.is_unhealthy());
        assert!(pipeline.stop().await.is_err());

        pipeline.start().await.unwrap();
        assert!(pipeline.health_check().await.is_healthy());
        assert!(pipeline.start().await.is_err());

        pipeline.stop().await.unwrap();
        assert_eq!(pipeline.state_name(), "stopped");
        assert!(pipeline.health_check().await.is_unhealthy());
    }

    #[tokio::test]
    async fn bind_failure_fails_start() {
        let config = PipelineConfigBuilder::new().udp("256.0.0.1:1").build().unwrap();
        let mut pipeline = LogPipeline::new(config, ingestor().await);
        assert!(pipeline.start().await.is_err());
        assert_eq!(pipeline.state_name(), "initialized");
    }

    #[tokio::test]
    async fn tcp_lines_are_stored_and_drained_on_stop() {
        let config = PipelineConfigBuilder::new().tcp("127.0.0.1:0").build().unwrap();
        let mut pipeline = LogPipeline::new(config, ingestor().await);
        pipeline.start().await.unwrap();
        let addr = pipeline.tcp_addr().unwrap();

        let mut client = tokio::net::TcpStream::connect(addr).await.unwrap();
        client
            .write_all(b"<13>Jan 15 12:00:00 web-1 app: one\n<13>Jan 15 12:00:01 web-1 app: two\n")
            .await
            .unwrap();
        client.shutdown().await.unwrap();

        let store = pipeline.ingestor().store().clone();
        for _ in 0..50 {
            if store.count().await.unwrap() == 2 {
                break;
            }
            tokio::time::sleep(Duration::from_millis(20)).await;
        }
        pipeline.stop().await.unwrap();

        let events = store.query(EventFilter::default()).await.unwrap();
        let messages: Vec<_> = events.iter().rev().map(|e| e.message.as_str()).collect();
        assert_eq!(messages, vec!["one", "two"]);
        assert_eq!(events[0].host, "web-1");
        assert_eq!(pipeline.processed_count(), 2);
    }

    #[tokio::test]
    async fn storage_failure_is_counted_and_processing_continues() {
        let dir = tempfile::tempdir().unwrap();
        let db = dir.path().join("logship.db");
        let store = Store::open(&db).unwrap();
        rusqlite::Connection::open(&db)
            .unwrap()
            .execute_batch(
                "CREATE TRIGGER reject_poison BEFORE INSERT ON events
                 WHEN NEW.message = 'poison'
                 BEGIN SELECT RAISE(FAIL, 'disk I/O error'); END;",
            )
            .unwrap();
        let rules = RuleEngine::load(store.clone(), MatchPolicy::First).await.unwrap();
        let ingestor = Ingestor::new(store.clone(), Arc::new(IpPolicy::default()), Arc::new(rules));

        let config = PipelineConfigBuilder::new().tcp("127.0.0.1:0").build().unwrap();
        let mut pipeline = LogPipeline::new(config, ingestor);
        pipeline.start().await.unwrap();
        let addr = pipeline.tcp_addr().unwrap();

        let mut client = tokio::net::TcpStream::connect(addr).await.unwrap();
        client.write_all(b"one\npoison\nthree\n").await.unwrap();
        client.shutdown().await.unwrap();

        for _ in 0..50 {
            if pipeline.processed_count() + pipeline.failed_count() == 3 {
                break;
            }
            tokio::time::sleep(Duration::from_millis(20)).await;
        }
        pipeline.stop().await.unwrap();

        assert_eq!(pipeline.failed_count(), 1);
        assert_eq!(pipeline.processed_count(), 2);
        let events = store.query(EventFilter::default()).await.unwrap();
        let messages: Vec<_> = events.iter().rev().map(|e| e.message.as_str()).collect();
        assert_eq!(messages, vec!["one", "three"]);
    }
}
