//! 이벤트 조회 필터
//!
//! 선택적 조건들로 파라미터화된 WHERE 절을 동적으로 만듭니다.
//! 모든 조건은 AND로 결합되며 `None`인 필드는 무시됩니다.

use rusqlite::types::ToSql;
use serde::Deserialize;

use logship_core::types::Transport;

use crate::schema::FOLD_CASE_FN;

/// 기본 조회 개수
pub const DEFAULT_QUERY_LIMIT: usize = 100;
/// 최대 조회 개수
pub const MAX_QUERY_LIMIT: usize = 1000;

/// 이벤트 조회 필터
///
/// `Default::default()`는 모든 이벤트에 매칭됩니다 (최신 100건).
#[derive(Debug, Default, Clone, Deserialize)]
#[serde(default)]
pub struct EventFilter {
    /// 이 시각 이후 (Unix ms, 포함)
    pub from: Option<i64>,
    /// 이 시각 이전 (Unix ms, 포함)
    pub to: Option<i64>,
    /// 레벨 (대소문자 무시 정확 일치)
    pub level: Option<String>,
    /// 전송 경로
    pub source: Option<Transport>,
    /// 소스 주소 정확 일치
    pub source_ip: Option<String>,
    /// message/raw 부분 문자열 검색 (대소문자 무시)
    pub q: Option<String>,
    /// drop 여부
    pub dropped: Option<bool>,
    /// 최대 개수 (1..=1000으로 보정)
    pub limit: Option<usize>,
    /// 건너뛸 개수
    pub offset: Option<usize>,
}

/// WHERE 절과 위치 파라미터
pub(crate) struct SqlFragment {
    /// "WHERE" 키워드를 제외한 조건절 (조건이 없으면 빈 문자열)
    pub where_clause: String,
    /// 위치 파라미터 값
    pub params: Vec<Box<dyn ToSql>>,
    /// 보정된 LIMIT
    pub limit: usize,
    /// OFFSET
    pub offset: usize,
}

impl EventFilter {
    /// 보정된 LIMIT 값을 반환합니다.
    pub fn effective_limit(&self) -> usize {
        self.limit
            .unwrap_or(DEFAULT_QUERY_LIMIT)
            .clamp(1, MAX_QUERY_LIMIT)
    }

    /// WHERE 절과 파라미터 목록을 만듭니다. 파라미터는 `?1`부터 시작합니다.
    pub(crate) fn to_sql(&self) -> SqlFragment {
        let mut conditions: Vec<String> = Vec::new();
        let mut params: Vec<Box<dyn ToSql>> = Vec::new();

        if let Some(from) = self.from {
            params.push(Box::new(from));
            conditions.push(format!("ts >= ?{}", params.len()));
        }

        if let Some(to) = self.to {
            params.push(Box::new(to));
            conditions.push(format!("ts <= ?{}", params.len()));
        }

        if let Some(ref level) = self.level {
            params.push(Box::new(level.clone()));
            conditions.push(format!("level = ?{} COLLATE NOCASE", params.len()));
        }

        if let Some(source) = self.source {
            params.push(Box::new(source.as_str()));
            conditions.push(format!("transport = ?{}", params.len()));
        }

        if let Some(ref source_ip) = self.source_ip {
            params.push(Box::new(source_ip.clone()));
            conditions.push(format!("source_addr = ?{}", params.len()));
        }

        if let Some(ref q) = self.q {
            // LIKE 와일드카드를 피하기 위해 instr 사용
            params.push(Box::new(q.to_lowercase()));
            let idx = params.len();
            conditions.push(format!(
                "(instr({FOLD_CASE_FN}(message), ?{idx}) > 0 OR instr({FOLD_CASE_FN}(raw), ?{idx}) > 0)"
            ));
        }

        if let Some(dropped) = self.dropped {
            params.push(Box::new(dropped));
            conditions.push(format!("dropped = ?{}", params.len()));
        }

        SqlFragment {
            where_clause: conditions.join(" AND "),
            params,
            limit: self.effective_limit(),
            offset: self.offset.unwrap_or(0),
        }
    }
}
