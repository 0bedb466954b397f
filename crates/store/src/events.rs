//! 이벤트 테이블 연산 -- 저장, 조회, 통계, 포워딩 기록

use std::collections::BTreeMap;
use std::str::FromStr;

use rusqlite::types::Type;
use rusqlite::{Connection, Row, params, params_from_iter};
use serde::Serialize;

use logship_core::types::{Event, NewEvent, now_millis};

use crate::error::StoreError;
use crate::filter::EventFilter;

/// drop 미리보기 메시지 최대 길이 (문자)
const PREVIEW_MAX_CHARS: usize = 200;

const EVENT_COLUMNS: &str = "id, ts, transport, source_addr, level, host, app, message, raw, \
     payload, parse_error, dropped, matched_rule, drop_reason, forwarded, retry_count";

/// 포워딩 대기 이벤트
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PendingEvent {
    /// 시퀀스 ID
    pub id: i64,
    /// 전송 본문 (`payload`가 있으면 payload, 없으면 raw)
    pub body: String,
}

/// 집계 통계
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct Stats {
    /// 전체 이벤트 수
    pub total: u64,
    /// keep 이벤트 수
    pub kept: u64,
    /// drop 이벤트 수
    pub dropped: u64,
    /// 전달 완료 이벤트 수
    pub forwarded: u64,
    /// 전달 대기 이벤트 수 (keep 이면서 미전달)
    pub pending: u64,
    /// 레벨별 개수 (빈 레벨은 `unknown`)
    pub by_level: BTreeMap<String, u64>,
    /// 전송 경로별 개수
    pub by_transport: BTreeMap<String, u64>,
    /// DB 파일 크기 (바이트)
    pub db_size_bytes: u64,
}

/// drop 미리보기 레코드
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DropRecord {
    /// 레코드 ID
    pub id: i64,
    /// 원본 이벤트 ID
    pub event_id: i64,
    /// 이벤트 시각 (Unix ms)
    pub ts: i64,
    /// 소스 주소
    pub source: String,
    /// drop 사유
    pub reason: String,
    /// `{host, level, message}` 미리보기
    pub preview: serde_json::Value,
}

/// 텍스트 컬럼을 `FromStr` 타입으로 변환합니다.
pub(crate) fn parse_text<T>(row: &Row<'_>, idx: usize) -> rusqlite::Result<T>
where
    T: FromStr<Err = String>,
{
    let text: String = row.get(idx)?;
    text.parse::<T>().map_err(|reason| {
        rusqlite::Error::FromSqlConversionFailure(
            idx,
            Type::Text,
            Box::new(std::io::Error::other(reason)),
        )
    })
}

fn row_to_event(row: &Row<'_>) -> rusqlite::Result<Event> {
    Ok(Event {
        id: row.get(0)?,
        ts: row.get(1)?,
        transport: parse_text(row, 2)?,
        source_addr: row.get(3)?,
        level: row.get(4)?,
        host: row.get(5)?,
        app: row.get(6)?,
        message: row.get(7)?,
        raw: row.get(8)?,
        payload: row.get(9)?,
        parse_error: row.get(10)?,
        dropped: row.get(11)?,
        matched_rule: row.get(12)?,
        drop_reason: row.get(13)?,
        forwarded: row.get(14)?,
        retry_count: row.get(15)?,
    })
}

fn preview_of(event: &NewEvent) -> serde_json::Value {
    let message: String = event.message.chars().take(PREVIEW_MAX_CHARS).collect();
    serde_json::json!({
        "host": event.host,
        "level": event.level,
        "message": message,
    })
}

pub(crate) fn insert(conn: &mut Connection, event: &NewEvent) -> Result<i64, StoreError> {
    let ts = event.ts.unwrap_or_else(now_millis);
    let tx = conn.transaction()?;

    tx.execute(
        "INSERT INTO events (ts, transport, source_addr, level, host, app, message, raw,
                             payload, parse_error, dropped, matched_rule, drop_reason)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13)",
        params![
            ts,
            event.transport.as_str(),
            event.source_addr,
            event.level,
            event.host,
            event.app,
            event.message,
            event.raw,
            event.payload,
            event.parse_error,
            event.dropped,
            event.matched_rule,
            event.drop_reason,
        ],
    )?;
    let id = tx.last_insert_rowid();

    if event.dropped {
        let preview = serde_json::to_string(&preview_of(event))?;
        tx.execute(
            "INSERT INTO drops (event_id, ts, source, reason, preview) VALUES (?1, ?2, ?3, ?4, ?5)",
            params![
                id,
                ts,
                event.source_addr,
                event.drop_reason.as_deref().unwrap_or("rule"),
                preview,
            ],
        )?;
    }

    tx.commit()?;
    Ok(id)
}

pub(crate) fn query(conn: &Connection, filter: &EventFilter) -> Result<Vec<Event>, StoreError> {
    let fragment = filter.to_sql();
    let mut sql = format!("SELECT {EVENT_COLUMNS} FROM events");
    if !fragment.where_clause.is_empty() {
        sql.push_str(" WHERE ");
        sql.push_str(&fragment.where_clause);
    }
    sql.push_str(&format!(
        " ORDER BY id DESC LIMIT {} OFFSET {}",
        fragment.limit, fragment.offset
    ));

    let mut stmt = conn.prepare(&sql)?;
    let rows = stmt.query_map(
        params_from_iter(fragment.params.iter().map(|p| p.as_ref())),
        row_to_event,
    )?;
    Ok(rows.collect::<Result<Vec<_>, _>>()?)
}

pub(crate) fn count(conn: &Connection) -> Result<u64, StoreError> {
    let n: i64 = conn.query_row("SELECT COUNT(*) FROM events", [], |row| row.get(0))?;
    Ok(n.max(0) as u64)
}

/// 현재 DB 파일 크기 (바이트)
pub(crate) fn db_size_bytes(conn: &Connection) -> Result<u64, StoreError> {
    let size: i64 = conn.query_row(
        "SELECT page_count * page_size FROM pragma_page_count(), pragma_page_size()",
        [],
        |row| row.get(0),
    )?;
    Ok(size.max(0) as u64)
}

fn group_counts(conn: &Connection, column: &str) -> Result<BTreeMap<String, u64>, StoreError> {
    let mut stmt = conn.prepare(&format!(
        "SELECT {column}, COUNT(*) FROM events GROUP BY {column}"
    ))?;
    let rows = stmt.query_map([], |row| {
        let key: String = row.get(0)?;
        let n: i64 = row.get(1)?;
        Ok((key, n.max(0) as u64))
    })?;

    let mut out = BTreeMap::new();
    for row in rows {
        let (key, n) = row?;
        let key = if key.is_empty() { "unknown".to_owned() } else { key };
        *out.entry(key).or_insert(0) += n;
    }
    Ok(out)
}

pub(crate) fn stats(conn: &Connection) -> Result<Stats, StoreError> {
    let (total, dropped, forwarded, pending): (i64, i64, i64, i64) = conn.query_row(
        "SELECT COUNT(*),
                COALESCE(SUM(dropped = 1), 0),
                COALESCE(SUM(forwarded = 1), 0),
                COALESCE(SUM(dropped = 0 AND forwarded = 0), 0)
         FROM events",
        [],
        |row| Ok((row.get(0)?, row.get(1)?, row.get(2)?, row.get(3)?)),
    )?;

    let total = total.max(0) as u64;
    let dropped = dropped.max(0) as u64;
    Ok(Stats {
        total,
        kept: total.saturating_sub(dropped),
        dropped,
        forwarded: forwarded.max(0) as u64,
        pending: pending.max(0) as u64,
        by_level: group_counts(conn, "level")?,
        by_transport: group_counts(conn, "transport")?,
        db_size_bytes: db_size_bytes(conn)?,
    })
}

pub(crate) fn fetch_unforwarded(
    conn: &Connection,
    limit: usize,
) -> Result<Vec<PendingEvent>, StoreError> {
    if limit == 0 {
        return Ok(Vec::new());
    }
    let mut stmt = conn.prepare(
        "SELECT id, COALESCE(payload, raw) FROM events
         WHERE dropped = 0 AND forwarded = 0
         ORDER BY id ASC LIMIT ?1",
    )?;
    let limit = i64::try_from(limit).unwrap_or(i64::MAX);
    let rows = stmt.query_map([limit], |row| {
        Ok(PendingEvent {
            id: row.get(0)?,
            body: row.get(1)?,
        })
    })?;
    Ok(rows.collect::<Result<Vec<_>, _>>()?)
}

pub(crate) fn mark_forwarded(conn: &mut Connection, ids: &[i64]) -> Result<usize, StoreError> {
    if ids.is_empty() {
        return Ok(0);
    }
    let tx = conn.transaction()?;
    let mut changed = 0;
    {
        let mut stmt =
            tx.prepare("UPDATE events SET forwarded = 1 WHERE id = ?1 AND forwarded = 0")?;
        for id in ids {
            changed += stmt.execute([id])?;
        }
    }
    tx.commit()?;
    Ok(changed)
}

pub(crate) fn bump_retry(conn: &mut Connection, ids: &[i64]) -> Result<usize, StoreError> {
    if ids.is_empty() {
        return Ok(0);
    }
    let tx = conn.transaction()?;
    let mut changed = 0;
    {
        let mut stmt = tx.prepare(
            "UPDATE events SET retry_count = retry_count + 1 WHERE id = ?1 AND forwarded = 0",
        )?;
        for id in ids {
            changed += stmt.execute([id])?;
        }
    }
    tx.commit()?;
    Ok(changed)
}

pub(crate) fn recent_drops(conn: &Connection, limit: usize) -> Result<Vec<DropRecord>, StoreError> {
    let limit = i64::try_from(limit.clamp(1, crate::filter::MAX_QUERY_LIMIT)).unwrap_or(1);
    let mut stmt = conn.prepare(
        "SELECT id, event_id, ts, source, reason, preview FROM drops ORDER BY id DESC LIMIT ?1",
    )?;
    let rows = stmt.query_map([limit], |row| {
        let preview: String = row.get(5)?;
        Ok(DropRecord {
            id: row.get(0)?,
            event_id: row.get(1)?,
            ts: row.get(2)?,
            source: row.get(3)?,
            reason: row.get(4)?,
            preview: serde_json::from_str(&preview)
                .unwrap_or(serde_json::Value::String(preview)),
        })
    })?;
    Ok(rows.collect::<Result<Vec<_>, _>>()?)
}

#[cfg(test)]
pub(crate) fn get(conn: &Connection, id: i64) -> Result<Option<Event>, StoreError> {
    use rusqlite::OptionalExtension;

    let sql = format!("SELECT {EVENT_COLUMNS} FROM events WHERE id = ?1");
    Ok(conn.query_row(&sql, [id], row_to_event).optional()?)
}
