//! 스키마 정의 및 연결 초기화

use rusqlite::Connection;
use rusqlite::functions::FunctionFlags;

/// 유니코드 소문자 변환 SQL 함수 이름 (내장 `lower()`는 ASCII만 변환)
pub(crate) const FOLD_CASE_FN: &str = "fold_case";

/// 테이블/인덱스 생성 SQL
const SCHEMA: &str = "
CREATE TABLE IF NOT EXISTS events (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    ts INTEGER NOT NULL,
    transport TEXT NOT NULL,
    source_addr TEXT NOT NULL,
    level TEXT NOT NULL DEFAULT '',
    host TEXT NOT NULL DEFAULT '',
    app TEXT NOT NULL DEFAULT '',
    message TEXT NOT NULL,
    raw TEXT NOT NULL,
    payload TEXT,
    parse_error TEXT,
    dropped INTEGER NOT NULL DEFAULT 0,
    matched_rule INTEGER,
    drop_reason TEXT,
    forwarded INTEGER NOT NULL DEFAULT 0,
    retry_count INTEGER NOT NULL DEFAULT 0
);
CREATE INDEX IF NOT EXISTS idx_events_ts ON events(ts);
CREATE INDEX IF NOT EXISTS idx_events_level ON events(level);
CREATE INDEX IF NOT EXISTS idx_events_source_addr ON events(source_addr);
CREATE INDEX IF NOT EXISTS idx_events_pending ON events(id) WHERE dropped = 0 AND forwarded = 0;

CREATE TABLE IF NOT EXISTS rules (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    name TEXT NOT NULL,
    enabled INTEGER NOT NULL DEFAULT 1,
    priority INTEGER NOT NULL DEFAULT 100,
    source TEXT,
    action TEXT NOT NULL,
    predicate_type TEXT NOT NULL,
    predicate_field TEXT NOT NULL,
    expression TEXT NOT NULL,
    created_at INTEGER NOT NULL
);
CREATE INDEX IF NOT EXISTS idx_rules_name ON rules(name);

CREATE TABLE IF NOT EXISTS settings (
    key TEXT PRIMARY KEY,
    value TEXT NOT NULL,
    updated_at INTEGER NOT NULL
);

CREATE TABLE IF NOT EXISTS drops (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    event_id INTEGER NOT NULL,
    ts INTEGER NOT NULL,
    source TEXT NOT NULL,
    reason TEXT NOT NULL,
    preview TEXT NOT NULL
);
";

/// pragma를 설정하고 스키마를 생성합니다.
pub(crate) fn initialize(conn: &Connection) -> rusqlite::Result<()> {
    // in-memory DB는 WAL을 지원하지 않으므로 결과 모드는 확인하지 않음
    conn.pragma_update(None, "journal_mode", "WAL")?;
    conn.pragma_update(None, "synchronous", "NORMAL")?;
    conn.busy_timeout(std::time::Duration::from_millis(5000))?;
    register_functions(conn)?;
    conn.execute_batch(SCHEMA)
}

fn register_functions(conn: &Connection) -> rusqlite::Result<()> {
    conn.create_scalar_function(
        FOLD_CASE_FN,
        1,
        FunctionFlags::SQLITE_UTF8 | FunctionFlags::SQLITE_DETERMINISTIC,
        |ctx| {
            let value: Option<String> = ctx.get(0)?;
            Ok(value.map(|s| s.to_lowercase()))
        },
    )
}
