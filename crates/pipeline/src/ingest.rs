//! 평가-저장 경로 -- 정규화, IP 정책, 규칙 평가, 저장
//!
//! 모든 전송 경로가 같은 [`Ingestor`]를 거칩니다.
//!
//! ```text
//! RawLog / HTTP body -> normalize -> IpPolicy -> RuleEngine -> Store.insert
//! ```
//!
//! 차단된 소스의 이벤트는 규칙을 평가하지 않고 `ip_policy` 사유로
//! drop 표시되어 저장됩니다. 어떤 이벤트든 keep/drop 중 정확히 하나로
//! 한 번만 결정됩니다.

use std::sync::Arc;
use std::time::Instant;

use tracing::{debug, error};

use logship_core::metrics as m;
use logship_core::types::{NewEvent, Transport};
use logship_store::Store;

use crate::collector::RawLog;
use crate::error::LogPipelineError;
use crate::parser::{ParseOutcome, SyslogParser, decode_ingest_body};
use crate::policy::IpPolicy;
use crate::rule::RuleEngine;

/// 평가-저장 처리기
///
/// 복제 비용이 작아 HTTP 핸들러와 처리 태스크가 공유합니다.
#[derive(Clone)]
pub struct Ingestor {
    store: Store,
    policy: Arc<IpPolicy>,
    rules: Arc<RuleEngine>,
    parser: SyslogParser,
}

impl Ingestor {
    /// 새 처리기를 생성합니다.
    pub fn new(store: Store, policy: Arc<IpPolicy>, rules: Arc<RuleEngine>) -> Self {
        Self {
            store,
            policy,
            rules,
            parser: SyslogParser::new(),
        }
    }

    /// syslog 파서를 교체합니다 (최대 입력 크기 조정용).
    pub fn with_parser(mut self, parser: SyslogParser) -> Self {
        self.parser = parser;
        self
    }

    /// 스토어 핸들
    pub fn store(&self) -> &Store {
        &self.store
    }

    /// 규칙 엔진
    pub fn rules(&self) -> &Arc<RuleEngine> {
        &self.rules
    }

    /// IP 정책
    pub fn policy(&self) -> &IpPolicy {
        &self.policy
    }

    /// 수집기 원시 로그를 정규화된 이벤트로 변환합니다.
    ///
    /// syslog 파싱 실패는 전송 실패가 아니며, 원본 라인을 메시지로 두고
    /// `parse_error`에 사유를 기록합니다.
    pub fn normalize(&self, raw: &RawLog) -> NewEvent {
        let text = String::from_utf8_lossy(&raw.data).into_owned();
        let mut event = match raw.transport {
            Transport::SyslogUdp | Transport::SyslogTcp => match self.parser.parse(&raw.data) {
                ParseOutcome::Parsed(record) => {
                    let mut event = NewEvent::from_raw(raw.transport, raw.peer.clone(), text);
                    event.host = record.host;
                    event.level = record.level;
                    event.app = record.app;
                    event.message = record.message;
                    event
                }
                ParseOutcome::Unparsed { raw_line, reason } => {
                    let mut event = NewEvent::from_raw(raw.transport, raw.peer.clone(), text);
                    event.message = raw_line;
                    event.parse_error = Some(reason);
                    event
                }
            },
            Transport::Http | Transport::File => {
                NewEvent::from_raw(raw.transport, raw.peer.clone(), text)
            }
        };
        event.ts = Some(raw.received_at);
        event
    }

    /// IP 정책과 규칙으로 keep/drop을 결정합니다.
    pub fn classify(&self, event: &mut NewEvent) {
        if !self.policy.allowed(&event.source_addr) {
            event.block_by_policy();
            return;
        }
        let decision = self.rules.evaluate(event);
        event.apply_decision(&decision);
    }

    /// 이벤트를 분류하고 저장합니다. 저장된 이벤트 ID를 반환합니다.
    pub async fn ingest(&self, mut event: NewEvent) -> Result<i64, LogPipelineError> {
        let started = Instant::now();
        self.classify(&mut event);

        let transport = event.transport.as_str();
        let dropped_reason = event.dropped.then(|| {
            if event.matched_rule.is_some() { "rule" } else { "ip_policy" }
        });
        let parse_failed = event.parse_error.is_some();

        let id = match self.store.insert(event).await {
            Ok(id) => id,
            Err(e) => {
                metrics::counter!(m::STORE_ERRORS_TOTAL).increment(1);
                error!(transport, error = %e, "failed to store event");
                return Err(e.into());
            }
        };

        metrics::counter!(m::EVENTS_INGESTED_TOTAL, m::LABEL_TRANSPORT => transport).increment(1);
        if let Some(reason) = dropped_reason {
            metrics::counter!(m::EVENTS_DROPPED_TOTAL, m::LABEL_REASON => reason).increment(1);
        }
        if parse_failed {
            metrics::counter!(m::PARSE_ERRORS_TOTAL, m::LABEL_TRANSPORT => transport).increment(1);
        }
        metrics::histogram!(m::INGEST_DURATION_SECONDS).record(started.elapsed().as_secs_f64());

        debug!(id, transport, dropped = dropped_reason.is_some(), "event stored");
        Ok(id)
    }

    /// 수집기 원시 로그를 처리합니다.
    pub async fn ingest_raw(&self, raw: RawLog) -> Result<i64, LogPipelineError> {
        let event = self.normalize(&raw);
        self.ingest(event).await
    }

    /// `POST /ingest` 본문을 처리합니다. 저장된 이벤트 수를 반환합니다.
    ///
    /// 본문 전체를 먼저 디코딩하므로 잘못된 본문은 아무것도 저장하지 않습니다.
    pub async fn ingest_http(&self, body: &[u8], peer: &str) -> Result<usize, LogPipelineError> {
        let records = decode_ingest_body(body)?;
        let count = records.len();
        for record in records {
            self.ingest(record.into_new_event(peer)).await?;
        }
        Ok(count)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use bytes::Bytes;
    use logship_core::config::{IpPolicyConfig, MatchPolicy};
    use logship_core::types::{Action, DROP_REASON_IP_POLICY, Predicate, PredicateField, PredicateKind, RuleSpec};
    use logship_store::EventFilter;

    async fn ingestor(deny: &[&str]) -> Ingestor {
        let store = Store::open_in_memory().unwrap();
        let policy = IpPolicy::from_config(&IpPolicyConfig {
            deny: deny.iter().map(|s| s.to_string()).collect(),
            ..Default::default()
        })
        .unwrap();
        let rules = RuleEngine::load(store.clone(), MatchPolicy::First).await.unwrap();
        Ingestor::new(store, Arc::new(policy), Arc::new(rules))
    }

    fn drop_rule(name: &str, expr: &str) -> RuleSpec {
        RuleSpec {
            name: name.to_owned(),
            enabled: true,
            priority: 10,
            source: None,
            action: Action::Drop,
            predicate: Predicate {
                kind: PredicateKind::Substring,
                field: PredicateField::Message,
                expression: expr.to_owned(),
            },
        }
    }

    #[tokio::test]
    async fn syslog_is_parsed_into_fields() {
        let ing = ingestor(&[]).await;
        let raw = RawLog::new(
            Transport::SyslogUdp,
            "192.0.2.1",
            Bytes::from_static(b"<34>1 2024-01-15T12:00:00Z web-1 sshd 42 - - login failed"),
        );
        let event = ing.normalize(&raw);
        assert_eq!(event.host, "web-1");
        assert_eq!(event.level, "crit");
        assert_eq!(event.app, "sshd");
        assert_eq!(event.message, "login failed");
        assert_eq!(event.ts, Some(raw.received_at));
        assert!(event.parse_error.is_none());
        assert!(event.raw.starts_with("<34>1"));
    }

    #[tokio::test]
    async fn unparsable_syslog_keeps_raw_line_as_message() {
        let ing = ingestor(&[]).await;
        let raw = RawLog::new(Transport::SyslogTcp, "192.0.2.1", Bytes::from_static(b"plain text line"));
        let event = ing.normalize(&raw);
        assert_eq!(event.message, "plain text line");
        assert!(event.parse_error.is_some());

        let id = ing.ingest(event).await.unwrap();
        let stored = ing.store().query(EventFilter::default()).await.unwrap();
        assert_eq!(stored[0].id, id);
        assert!(stored[0].parse_error.is_some());
    }

    #[tokio::test]
    async fn file_lines_are_stored_verbatim() {
        let ing = ingestor(&[]).await;
        let raw = RawLog::new(Transport::File, "file:/var/log/app.log", Bytes::from_static(b"<34>looks like syslog"));
        let event = ing.normalize(&raw);
        assert_eq!(event.message, "<34>looks like syslog");
        assert!(event.parse_error.is_none());
        assert_eq!(event.source_addr, "file:/var/log/app.log");
    }

    #[tokio::test]
    async fn denied_source_is_stored_dropped_without_rule() {
        let ing = ingestor(&["10.0.0.0/8"]).await;
        ing.rules().add(drop_rule("never", "x")).await.unwrap();

        let mut event = NewEvent::from_raw(Transport::Http, "10.1.2.3", "x marks the spot");
        ing.classify(&mut event);
        assert!(event.dropped);
        assert_eq!(event.matched_rule, None);
        assert_eq!(event.drop_reason.as_deref(), Some(DROP_REASON_IP_POLICY));

        let mut outside = NewEvent::from_raw(Transport::Http, "8.8.8.8", "hello");
        ing.classify(&mut outside);
        assert!(!outside.dropped);
    }

    #[tokio::test]
    async fn rule_drop_records_rule_id() {
        let ing = ingestor(&[]).await;
        let rule = ing.rules().add(drop_rule("drop-health", "healthcheck")).await.unwrap();

        ing.ingest(NewEvent::from_raw(Transport::Http, "192.0.2.9", "GET /healthcheck"))
            .await
            .unwrap();
        ing.ingest(NewEvent::from_raw(Transport::Http, "192.0.2.9", "GET /login"))
            .await
            .unwrap();

        let events = ing.store().query(EventFilter::default()).await.unwrap();
        let login = events.iter().find(|e| e.message == "GET /login").unwrap();
        let health = events.iter().find(|e| e.message == "GET /healthcheck").unwrap();
        assert!(!login.dropped);
        assert!(health.dropped);
        assert_eq!(health.matched_rule, Some(rule.id));

        let drops = ing.store().recent_drops(10).await.unwrap();
        assert_eq!(drops.len(), 1);
        assert_eq!(drops[0].reason, "rule:drop-health");
    }

    #[tokio::test]
    async fn http_body_decodes_and_stores_each_object() {
        let ing = ingestor(&[]).await;
        let n = ing
            .ingest_http(br#"[{"message":"a","level":"info"},{"raw":"b"}]"#, "203.0.113.4")
            .await
            .unwrap();
        assert_eq!(n, 2);
        assert_eq!(ing.store().count().await.unwrap(), 2);
    }

    #[tokio::test]
    async fn malformed_http_body_stores_nothing() {
        let ing = ingestor(&[]).await;
        let err = ing
            .ingest_http(br#"[{"message":"a"}, "oops"]"#, "203.0.113.4")
            .await
            .unwrap_err();
        assert!(err.is_client_error());
        assert_eq!(ing.store().count().await.unwrap(), 0);
    }
}
