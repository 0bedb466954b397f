//! 규칙/설정 테이블 연산

use std::collections::BTreeMap;

use rusqlite::{Connection, OptionalExtension, Row, params};

use logship_core::types::{Predicate, Rule, RuleSpec, now_millis};

use crate::error::StoreError;
use crate::events::parse_text;

const RULE_COLUMNS: &str =
    "id, name, enabled, priority, source, action, predicate_type, predicate_field, expression, created_at";

fn row_to_rule(row: &Row<'_>) -> rusqlite::Result<Rule> {
    let source: Option<String> = row.get(4)?;
    let source = match source.filter(|s| !s.is_empty()) {
        Some(_) => Some(parse_text(row, 4)?),
        None => None,
    };
    Ok(Rule {
        id: row.get(0)?,
        name: row.get(1)?,
        enabled: row.get(2)?,
        priority: row.get(3)?,
        source,
        action: parse_text(row, 5)?,
        predicate: Predicate {
            kind: parse_text(row, 6)?,
            field: parse_text(row, 7)?,
            expression: row.get(8)?,
        },
        created_at: row.get(9)?,
    })
}

pub(crate) fn insert_rule(conn: &Connection, spec: &RuleSpec) -> Result<Rule, StoreError> {
    let created_at = now_millis();
    conn.execute(
        "INSERT INTO rules (name, enabled, priority, source, action, predicate_type, predicate_field, expression, created_at)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9)",
        params![
            spec.name,
            spec.enabled,
            spec.priority,
            spec.source.map(|t| t.as_str()),
            spec.action.as_str(),
            spec.predicate.kind.as_str(),
            spec.predicate.field.as_str(),
            spec.predicate.expression,
            created_at,
        ],
    )?;

    Ok(Rule {
        id: conn.last_insert_rowid(),
        name: spec.name.clone(),
        enabled: spec.enabled,
        priority: spec.priority,
        source: spec.source,
        action: spec.action,
        predicate: spec.predicate.clone(),
        created_at,
    })
}

pub(crate) fn list_rules(conn: &Connection) -> Result<Vec<Rule>, StoreError> {
    let mut stmt = conn.prepare(&format!("SELECT {RULE_COLUMNS} FROM rules ORDER BY id ASC"))?;
    let rows = stmt.query_map([], row_to_rule)?;
    Ok(rows.collect::<Result<Vec<_>, _>>()?)
}

pub(crate) fn rule_by_name(conn: &Connection, name: &str) -> Result<Option<Rule>, StoreError> {
    Ok(conn
        .query_row(
            &format!("SELECT {RULE_COLUMNS} FROM rules WHERE name = ?1 ORDER BY id ASC LIMIT 1"),
            [name],
            row_to_rule,
        )
        .optional()?)
}

pub(crate) fn get_setting(conn: &Connection, key: &str) -> Result<Option<String>, StoreError> {
    Ok(conn
        .query_row("SELECT value FROM settings WHERE key = ?1", [key], |row| {
            row.get(0)
        })
        .optional()?)
}

pub(crate) fn put_setting(conn: &Connection, key: &str, value: &str) -> Result<(), StoreError> {
    conn.execute(
        "INSERT INTO settings (key, value, updated_at) VALUES (?1, ?2, ?3)
         ON CONFLICT(key) DO UPDATE SET value = excluded.value, updated_at = excluded.updated_at",
        params![key, value, now_millis()],
    )?;
    Ok(())
}

pub(crate) fn list_settings(conn: &Connection) -> Result<BTreeMap<String, String>, StoreError> {
    let mut stmt = conn.prepare("SELECT key, value FROM settings ORDER BY key")?;
    let rows = stmt.query_map([], |row| Ok((row.get(0)?, row.get(1)?)))?;
    Ok(rows.collect::<Result<BTreeMap<_, _>, _>>()?)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::schema;
    use logship_core::types::{Action, PredicateField, PredicateKind, Transport};

    fn conn() -> Connection {
        let conn = Connection::open_in_memory().unwrap();
        schema::initialize(&conn).unwrap();
        conn
    }

    fn spec(name: &str, source: Option<Transport>) -> RuleSpec {
        RuleSpec {
            name: name.to_owned(),
            enabled: true,
            priority: 10,
            source,
            action: Action::Drop,
            predicate: Predicate {
                kind: PredicateKind::Regex,
                field: PredicateField::Host,
                expression: "^lb-".to_owned(),
            },
        }
    }

    #[test]
    fn insert_then_list_roundtrips_all_fields() {
        let conn = conn();
        let inserted = insert_rule(&conn, &spec("drop-lb", Some(Transport::SyslogTcp))).unwrap();
        let listed = list_rules(&conn).unwrap();
        assert_eq!(listed, vec![inserted]);
        assert_eq!(listed[0].source, Some(Transport::SyslogTcp));
        assert_eq!(listed[0].predicate.field, PredicateField::Host);
    }

    #[test]
    fn rules_list_in_insertion_order() {
        let conn = conn();
        let a = insert_rule(&conn, &spec("a", None)).unwrap();
        let b = insert_rule(&conn, &spec("b", None)).unwrap();
        assert!(b.id > a.id);
        let names: Vec<_> = list_rules(&conn).unwrap().into_iter().map(|r| r.name).collect();
        assert_eq!(names, vec!["a", "b"]);
    }

    #[test]
    fn rule_by_name_finds_first() {
        let conn = conn();
        assert!(rule_by_name(&conn, "missing").unwrap().is_none());
        let a = insert_rule(&conn, &spec("dup", None)).unwrap();
        insert_rule(&conn, &spec("dup", None)).unwrap();
        assert_eq!(rule_by_name(&conn, "dup").unwrap().unwrap().id, a.id);
    }

    #[test]
    fn settings_upsert() {
        let conn = conn();
        assert!(get_setting(&conn, "theme").unwrap().is_none());
        put_setting(&conn, "theme", "dark").unwrap();
        put_setting(&conn, "theme", "light").unwrap();
        put_setting(&conn, "alpha", "1").unwrap();
        assert_eq!(get_setting(&conn, "theme").unwrap().as_deref(), Some("light"));

        let all = list_settings(&conn).unwrap();
        assert_eq!(all.len(), 2);
        assert_eq!(all.keys().next().map(String::as_str), Some("alpha"));
    }
}
