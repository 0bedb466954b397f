//! 스토어 핸들 -- SQLite 연결 소유 및 비동기 래퍼
//!
//! [`Store`]는 뮤텍스로 보호되는 단일 연결을 공유합니다. 모든 비동기 메서드는
//! `spawn_blocking`에서 연결을 잠그고 동기 쿼리를 실행합니다.
//! 복제 비용이 낮으므로 각 모듈은 `Store`를 clone하여 보관합니다.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};

use rusqlite::Connection;
use tracing::info;

use logship_core::types::{Event, NewEvent, Rule, RuleSpec};

use crate::error::StoreError;
use crate::events::{self, DropRecord, PendingEvent, Stats};
use crate::filter::EventFilter;
use crate::retention::{self, RetentionPolicy};
use crate::rules;
use crate::schema;

/// SQLite 이벤트 저장소
#[derive(Clone)]
pub struct Store {
    conn: Arc<Mutex<Connection>>,
    path: Option<PathBuf>,
}

impl std::fmt::Debug for Store {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Store").field("path", &self.path).finish()
    }
}

impl Store {
    /// 파일 DB를 열거나 생성합니다. 상위 디렉토리가 없으면 만듭니다.
    pub fn open(path: impl AsRef<Path>) -> Result<Self, StoreError> {
        let path = path.as_ref();
        let open_err = |reason: String| StoreError::Open {
            path: path.display().to_string(),
            reason,
        };

        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent).map_err(|e| open_err(e.to_string()))?;
        }

        let conn = Connection::open(path).map_err(|e| open_err(e.to_string()))?;
        schema::initialize(&conn).map_err(|e| open_err(e.to_string()))?;

        info!(path = %path.display(), "event store opened");

        Ok(Self {
            conn: Arc::new(Mutex::new(conn)),
            path: Some(path.to_path_buf()),
        })
    }

    /// 메모리 DB를 엽니다 (테스트용).
    pub fn open_in_memory() -> Result<Self, StoreError> {
        let conn = Connection::open_in_memory()?;
        schema::initialize(&conn)?;
        Ok(Self {
            conn: Arc::new(Mutex::new(conn)),
            path: None,
        })
    }

    /// DB 파일 경로 (메모리 DB면 None)
    pub fn path(&self) -> Option<&Path> {
        self.path.as_deref()
    }

    /// blocking 스레드에서 연결을 잠그고 `f`를 실행합니다.
    async fn with_conn<F, T>(&self, f: F) -> Result<T, StoreError>
    where
        F: FnOnce(&mut Connection) -> Result<T, StoreError> + Send + 'static,
        T: Send + 'static,
    {
        let conn = Arc::clone(&self.conn);
        tokio::task::spawn_blocking(move || {
            let mut guard = conn
                .lock()
                .map_err(|_| StoreError::Task("store mutex poisoned".to_owned()))?;
            f(&mut guard)
        })
        .await
        .map_err(|e| StoreError::Task(e.to_string()))?
    }

    // --- 이벤트 ---

    /// 이벤트를 저장하고 시퀀스 ID를 반환합니다.
    ///
    /// drop된 이벤트는 같은 트랜잭션에서 drop 미리보기도 기록합니다.
    pub async fn insert(&self, event: NewEvent) -> Result<i64, StoreError> {
        self.with_conn(move |conn| events::insert(conn, &event)).await
    }

    /// 필터 조건에 맞는 이벤트를 최신순으로 조회합니다.
    pub async fn query(&self, filter: EventFilter) -> Result<Vec<Event>, StoreError> {
        self.with_conn(move |conn| events::query(conn, &filter)).await
    }

    /// 집계 통계
    pub async fn stats(&self) -> Result<Stats, StoreError> {
        self.with_conn(|conn| events::stats(conn)).await
    }

    /// 전체 이벤트 수
    pub async fn count(&self) -> Result<u64, StoreError> {
        self.with_conn(|conn| events::count(conn)).await
    }

    /// 포워딩 대기 중인 가장 오래된 이벤트를 오름차순으로 가져옵니다.
    pub async fn fetch_unforwarded(&self, limit: usize) -> Result<Vec<PendingEvent>, StoreError> {
        self.with_conn(move |conn| events::fetch_unforwarded(conn, limit))
            .await
    }

    /// 이벤트를 전달 완료로 표시합니다. 새로 표시된 행 수를 반환합니다.
    pub async fn mark_forwarded(&self, ids: Vec<i64>) -> Result<usize, StoreError> {
        self.with_conn(move |conn| events::mark_forwarded(conn, &ids))
            .await
    }

    /// 아직 전달되지 않은 이벤트의 재시도 횟수를 증가시킵니다.
    pub async fn bump_retry(&self, ids: Vec<i64>) -> Result<usize, StoreError> {
        self.with_conn(move |conn| events::bump_retry(conn, &ids)).await
    }

    /// 최근 drop 미리보기
    pub async fn recent_drops(&self, limit: usize) -> Result<Vec<DropRecord>, StoreError> {
        self.with_conn(move |conn| events::recent_drops(conn, limit))
            .await
    }

    // --- 보존 ---

    /// 보존 정책을 적용하고 삭제된 이벤트 수를 반환합니다.
    pub async fn trim(&self, policy: RetentionPolicy) -> Result<u64, StoreError> {
        self.with_conn(move |conn| retention::trim(conn, &policy)).await
    }

    // --- 규칙 ---

    /// 규칙을 저장합니다. 정규식 유효성은 호출자가 먼저 확인해야 합니다.
    pub async fn insert_rule(&self, spec: RuleSpec) -> Result<Rule, StoreError> {
        self.with_conn(move |conn| rules::insert_rule(conn, &spec)).await
    }

    /// 저장된 모든 규칙을 ID 순으로 반환합니다.
    pub async fn list_rules(&self) -> Result<Vec<Rule>, StoreError> {
        self.with_conn(|conn| rules::list_rules(conn)).await
    }

    /// 이름으로 규칙을 찾습니다.
    pub async fn rule_by_name(&self, name: String) -> Result<Option<Rule>, StoreError> {
        self.with_conn(move |conn| rules::rule_by_name(conn, &name))
            .await
    }

    // --- 설정 ---

    /// 설정 값을 조회합니다.
    pub async fn get_setting(&self, key: String) -> Result<Option<String>, StoreError> {
        self.with_conn(move |conn| rules::get_setting(conn, &key)).await
    }

    /// 설정 값을 저장합니다 (upsert).
    pub async fn put_setting(&self, key: String, value: String) -> Result<(), StoreError> {
        self.with_conn(move |conn| rules::put_setting(conn, &key, &value))
            .await
    }

    /// 모든 설정
    pub async fn list_settings(&self) -> Result<BTreeMap<String, String>, StoreError> {
        self.with_conn(|conn| rules::list_settings(conn)).await
    }
}
