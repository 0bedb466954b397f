//! 보존 정리 -- 행 수/DB 크기 상한 유지
//!
//! [`trim`]은 가장 오래된 이벤트부터 삭제합니다. [`RetentionTask`]는 core의
//! [`Pipeline`] trait을 구현하여 데몬에서 주기적으로 실행됩니다.

use std::time::Duration;

use rusqlite::Connection;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use logship_core::config::StorageConfig;
use logship_core::error::{LogshipError, PipelineError};
use logship_core::metrics as m;
use logship_core::pipeline::{HealthStatus, Pipeline};

use crate::error::StoreError;
use crate::store::Store;

/// 크기 초과 시 한 번에 삭제하는 비율 (가장 오래된 5%)
const SIZE_TRIM_FRACTION: i64 = 20;

/// 보존 정책
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetentionPolicy {
    /// 최대 행 수 (0이면 제한 없음)
    pub max_rows: u64,
    /// 최대 DB 크기 (MB, 0이면 제한 없음)
    pub max_db_mb: u64,
}

impl From<&StorageConfig> for RetentionPolicy {
    fn from(config: &StorageConfig) -> Self {
        Self {
            max_rows: config.max_rows,
            max_db_mb: config.max_db_mb,
        }
    }
}

/// 테이블을 `max_rows` 이하로 줄입니다. 삭제된 행 수를 반환합니다.
fn trim_rows(conn: &Connection, table: &str, max_rows: u64) -> Result<u64, StoreError> {
    let count: i64 = conn.query_row(&format!("SELECT COUNT(*) FROM {table}"), [], |row| {
        row.get(0)
    })?;
    let max_rows = i64::try_from(max_rows).unwrap_or(i64::MAX);
    if count <= max_rows {
        return Ok(0);
    }

    // max_rows번째로 최신인 ID 미만을 모두 삭제
    let cutoff: i64 = conn.query_row(
        &format!("SELECT id FROM {table} ORDER BY id DESC LIMIT 1 OFFSET ?1"),
        [max_rows - 1],
        |row| row.get(0),
    )?;
    let deleted = conn.execute(&format!("DELETE FROM {table} WHERE id < ?1"), [cutoff])?;
    Ok(deleted as u64)
}

/// 가장 오래된 5% (최소 1행)를 삭제합니다.
fn trim_oldest_fraction(conn: &Connection, table: &str) -> Result<u64, StoreError> {
    let count: i64 = conn.query_row(&format!("SELECT COUNT(*) FROM {table}"), [], |row| {
        row.get(0)
    })?;
    if count == 0 {
        return Ok(0);
    }
    let n = (count / SIZE_TRIM_FRACTION).max(1);
    let deleted = conn.execute(
        &format!(
            "DELETE FROM {table} WHERE id IN (SELECT id FROM {table} ORDER BY id ASC LIMIT ?1)"
        ),
        [n],
    )?;
    Ok(deleted as u64)
}

/// 사용 중인 페이지 크기 (freelist 제외, 바이트)
fn used_bytes(conn: &Connection) -> Result<u64, StoreError> {
    let used: i64 = conn.query_row(
        "SELECT (page_count - freelist_count) * page_size
         FROM pragma_page_count(), pragma_freelist_count(), pragma_page_size()",
        [],
        |row| row.get(0),
    )?;
    Ok(used.max(0) as u64)
}

/// 보존 정책을 적용합니다. 삭제된 이벤트 수를 반환합니다.
pub(crate) fn trim(conn: &mut Connection, policy: &RetentionPolicy) -> Result<u64, StoreError> {
    let tx = conn.transaction()?;
    let mut deleted = 0;

    if policy.max_rows > 0 {
        deleted += trim_rows(&tx, "events", policy.max_rows)?;
        trim_rows(&tx, "drops", policy.max_rows)?;
    }

    if policy.max_db_mb > 0 {
        let limit = policy.max_db_mb.saturating_mul(1024 * 1024);
        let used = used_bytes(&tx)?;
        if used > limit {
            debug!(used, limit, "database above size budget");
            deleted += trim_oldest_fraction(&tx, "events")?;
            trim_oldest_fraction(&tx, "drops")?;
        }
    }

    tx.commit()?;
    Ok(deleted)
}

/// 보존 정리 태스크 실행 상태
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum TaskState {
    Initialized,
    Running,
    Stopped,
}

/// 주기적 보존 정리 태스크
pub struct RetentionTask {
    store: Store,
    policy: RetentionPolicy,
    interval: Duration,
    state: TaskState,
    cancel: CancellationToken,
    handle: Option<JoinHandle<()>>,
}

impl RetentionTask {
    /// 새 태스크를 생성합니다.
    pub fn new(store: Store, policy: RetentionPolicy, interval: Duration) -> Self {
        Self {
            store,
            policy,
            interval,
            state: TaskState::Initialized,
            cancel: CancellationToken::new(),
            handle: None,
        }
    }

    /// 설정에서 태스크를 생성합니다.
    pub fn from_config(store: Store, config: &StorageConfig) -> Self {
        Self::new(
            store,
            RetentionPolicy::from(config),
            Duration::from_secs(config.trim_interval_secs),
        )
    }

    /// 정리를 한 번 실행합니다.
    pub async fn run_once(&self) -> Result<u64, StoreError> {
        run_once(&self.store, self.policy).await
    }
}

async fn run_once(store: &Store, policy: RetentionPolicy) -> Result<u64, StoreError> {
    let deleted = store.trim(policy).await?;
    if deleted > 0 {
        metrics::counter!(m::RETENTION_DELETED_TOTAL).increment(deleted);
        info!(deleted, "retention trimmed old events");
    }
    Ok(deleted)
}

impl Pipeline for RetentionTask {
    async fn start(&mut self) -> Result<(), LogshipError> {
        if self.state == TaskState::Running {
            return Err(PipelineError::AlreadyRunning.into());
        }
        if self.policy.max_rows == 0 && self.policy.max_db_mb == 0 {
            info!("retention disabled (no row or size limit)");
        }

        self.cancel = CancellationToken::new();
        let cancel = self.cancel.clone();
        let store = self.store.clone();
        let policy = self.policy;
        let period = self.interval;

        self.handle = Some(tokio::spawn(async move {
            let mut ticker = tokio::time::interval(period);
            ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);
            loop {
                tokio::select! {
                    _ = cancel.cancelled() => break,
                    _ = ticker.tick() => {
                        if let Err(e) = run_once(&store, policy).await {
                            warn!(error = %e, "retention trim failed");
                        }
                    }
                }
            }
            debug!("retention task exited");
        }));

        self.state = TaskState::Running;
        info!(
            max_rows = self.policy.max_rows,
            max_db_mb = self.policy.max_db_mb,
            interval_secs = self.interval.as_secs(),
            "retention task started"
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
                warn!(error = %e, "retention task join failed");
            }
        }
        self.state = TaskState::Stopped;
        info!("retention task stopped");
        Ok(())
    }

    async fn health_check(&self) -> HealthStatus {
        match self.state {
            TaskState::Running => HealthStatus::Healthy,
            TaskState::Initialized => HealthStatus::Unhealthy("not started".to_owned()),
            TaskState::Stopped => HealthStatus::Unhealthy("stopped".to_owned()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::schema;
    use logship_core::types::{NewEvent, Transport};

    fn conn_with(n: usize) -> Connection {
        let mut conn = Connection::open_in_memory().unwrap();
        schema::initialize(&conn).unwrap();
        for i in 0..n {
            let ev = NewEvent::from_raw(Transport::SyslogUdp, "10.0.0.1", format!("m{i}"));
            crate::events::insert(&mut conn, &ev).unwrap();
        }
        conn
    }

    #[test]
    fn trim_noop_under_limit() {
        let mut conn = conn_with(10);
        let policy = RetentionPolicy {
            max_rows: 10,
            max_db_mb: 0,
        };
        assert_eq!(trim(&mut conn, &policy).unwrap(), 0);
    }

    #[test]
    fn trim_keeps_newest_rows() {
        let mut conn = conn_with(25);
        let policy = RetentionPolicy {
            max_rows: 10,
            max_db_mb: 0,
        };
        assert_eq!(trim(&mut conn, &policy).unwrap(), 15);

        let min_id: i64 = conn
            .query_row("SELECT MIN(id) FROM events", [], |r| r.get(0))
            .unwrap();
        assert_eq!(min_id, 16);
    }

    #[test]
    fn zero_limits_disable_trim() {
        let mut conn = conn_with(5);
        let policy = RetentionPolicy {
            max_rows: 0,
            max_db_mb: 0,
        };
        assert_eq!(trim(&mut conn, &policy).unwrap(), 0);
    }

    #[test]
    fn trim_oldest_fraction_removes_at_least_one() {
        let conn = conn_with(3);
        assert_eq!(trim_oldest_fraction(&conn, "events").unwrap(), 1);
        let conn = conn_with(100);
        assert_eq!(trim_oldest_fraction(&conn, "events").unwrap(), 5);
    }

    #[test]
    fn trim_also_bounds_drops() {
        let mut conn = Connection::open_in_memory().unwrap();
        schema::initialize(&conn).unwrap();
        for i in 0..8 {
            let mut ev = NewEvent::from_raw(Transport::Http, "10.0.0.1", format!("d{i}"));
            ev.block_by_policy();
            crate::events::insert(&mut conn, &ev).unwrap();
        }
        let policy = RetentionPolicy {
            max_rows: 3,
            max_db_mb: 0,
        };
        trim(&mut conn, &policy).unwrap();
        let drops: i64 = conn
            .query_row("SELECT COUNT(*) FROM drops", [], |r| r.get(0))
            .unwrap();
        assert_eq!(drops, 3);
    }

    #[tokio::test]
    async fn task_lifecycle() {
        let store = Store::open_in_memory().unwrap();
        let mut task = RetentionTask::new(
            store,
            RetentionPolicy {
                max_rows: 1,
                max_db_mb: 0,
            },
            Duration::from_secs(60),
        );
        assert!(task.health_check().await.is_unhealthy());
        task.start().await.unwrap();
        assert!(task.health_check().await.is_healthy());
        assert!(task.start().await.is_err());
        task.stop().await.unwrap();
        assert!(task.stop().await.is_err());
    }
}
