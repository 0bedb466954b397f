//! keep/drop 규칙 엔진
//!
//! 활성 규칙 집합은 `(priority, id)` 오름차순으로 정렬된 불변 스냅샷
//! ([`RuleSnapshot`])이며 `RwLock<Arc<_>>` 뒤에서 통째로 교체됩니다.
//! 평가하는 쪽은 `Arc`만 복제하므로 규칙 추가와 경합하지 않습니다.
//!
//! # 규칙 형식
//! ```yaml
//! name: drop-healthchecks
//! priority: 10
//! action: drop
//! predicate:
//!   type: substring
//!   field: message
//!   expression: healthcheck
//! ```
//!
//! # 아키텍처
//! - [`RuleEngine`]: 스냅샷 관리, 규칙 추가(영속화 포함), 평가
//! - [`RuleEngine::preview`]: 후보 술어를 최근 이벤트에 시험 적용 (저장하지 않음)
//! - [`loader`]: YAML 시드 파일 로딩
//! - [`matcher`]: 술어 컴파일과 매칭

pub mod loader;
pub mod matcher;

pub use loader::RuleLoader;
pub use matcher::{CompiledRule, Matcher};

use std::path::Path;
use std::sync::{Arc, PoisonError, RwLock};

use serde::Serialize;
use tracing::{debug, info, warn};

use logship_core::config::MatchPolicy;
use logship_core::types::{Decision, NewEvent, Predicate, Rule, RuleSpec, Transport};
use logship_store::{EventFilter, Store};

use crate::error::LogPipelineError;

/// 미리보기에 쓰이는 최근 이벤트 수
pub const PREVIEW_SAMPLE_SIZE: usize = 200;

/// 미리보기에서 술어와 매칭된 이벤트
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PreviewMatch {
    /// 샘플 내 위치 (0 = 가장 최근)
    pub index: usize,
    /// 이벤트 ID
    pub id: i64,
    /// 수집 시각 (Unix ms)
    pub ts: i64,
    /// 소스 태그
    pub source: String,
    /// 호스트
    pub host: String,
    /// 메시지
    pub message: String,
}

/// 후보 술어 미리보기 결과
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RulePreview {
    /// 최신순 매칭 목록
    pub matches: Vec<PreviewMatch>,
    /// 매칭 수
    pub count: usize,
}

/// 정렬된 컴파일 규칙 스냅샷
#[derive(Debug, Clone, Default)]
pub struct RuleSnapshot {
    rules: Vec<CompiledRule>,
}

impl RuleSnapshot {
    /// 규칙을 평가 순서로 정렬하여 스냅샷을 만듭니다.
    pub fn new(mut rules: Vec<CompiledRule>) -> Self {
        rules.sort_by_key(CompiledRule::sort_key);
        Self { rules }
    }

    /// 규칙 수
    pub fn len(&self) -> usize {
        self.rules.len()
    }

    /// 비어 있는지 확인합니다.
    pub fn is_empty(&self) -> bool {
        self.rules.is_empty()
    }

    /// 평가 순서대로 규칙을 순회합니다.
    pub fn iter(&self) -> impl Iterator<Item = &Rule> {
        self.rules.iter().map(CompiledRule::rule)
    }

    /// 이벤트를 평가합니다. 매칭 규칙이 없으면 keep입니다.
    pub fn evaluate(&self, event: &NewEvent, policy: MatchPolicy) -> Decision {
        let mut applicable = self.rules.iter().filter(|r| r.applies_to(event));
        let hit = match policy {
            MatchPolicy::First => applicable.next(),
            MatchPolicy::Last => applicable.last(),
        };
        hit.map_or_else(Decision::default_keep, |r| Decision::matched(r.rule()))
    }

    fn with(&self, rule: CompiledRule) -> Self {
        let mut rules = self.rules.clone();
        rules.push(rule);
        Self::new(rules)
    }
}

/// 규칙 엔진
///
/// # 사용 예시
/// ```no_run
/// # async fn example() -> Result<(), logship_pipeline::LogPipelineError> {
/// use logship_core::config::MatchPolicy;
/// use logship_pipeline::RuleEngine;
/// use logship_store::Store;
///
/// let store = Store::open("/var/lib/logship/logship.db")?;
/// let engine = RuleEngine::load(store, MatchPolicy::First).await?;
/// let decision = engine.test_message("GET /healthcheck");
/// # Ok(())
/// # }
/// ```
pub struct RuleEngine {
    store: Store,
    match_policy: MatchPolicy,
    snapshot: RwLock<Arc<RuleSnapshot>>,
}

impl RuleEngine {
    /// 스토어에 저장된 규칙으로 엔진을 생성합니다.
    ///
    /// 컴파일에 실패한 저장 규칙은 경고 후 건너뜁니다.
    pub async fn load(store: Store, match_policy: MatchPolicy) -> Result<Self, LogPipelineError> {
        let stored = store.list_rules().await?;
        let mut compiled = Vec::with_capacity(stored.len());
        for rule in stored {
            let name = rule.name.clone();
            match CompiledRule::compile(rule) {
                Ok(c) => compiled.push(c),
                Err(e) => warn!(rule = %name, error = %e, "skipping stored rule that no longer compiles"),
            }
        }

        info!(count = compiled.len(), policy = %match_policy, "rule engine loaded");
        Ok(Self {
            store,
            match_policy,
            snapshot: RwLock::new(Arc::new(RuleSnapshot::new(compiled))),
        })
    }

    /// 현재 스냅샷
    pub fn snapshot(&self) -> Arc<RuleSnapshot> {
        Arc::clone(&self.snapshot.read().unwrap_or_else(PoisonError::into_inner))
    }

    /// 매칭 정책
    pub fn match_policy(&self) -> MatchPolicy {
        self.match_policy
    }

    /// 이벤트를 평가합니다.
    pub fn evaluate(&self, event: &NewEvent) -> Decision {
        self.snapshot().evaluate(event, self.match_policy)
    }

    /// 합성 이벤트로 규칙을 시험합니다 (저장하지 않음).
    pub fn test_message(&self, message: &str) -> Decision {
        self.evaluate(&NewEvent::from_raw(Transport::Http, "", message))
    }

    /// 후보 술어를 최근 [`PREVIEW_SAMPLE_SIZE`]개 이벤트에 적용해 봅니다.
    ///
    /// 활성 규칙 집합과 저장소는 변경하지 않습니다. `source`가 있으면 해당
    /// 전송 경로의 이벤트만 검사하고, `limit`이 0이 아니면 그 수에서 멈춥니다.
    pub async fn preview(
        &self,
        predicate: &Predicate,
        source: Option<Transport>,
        limit: usize,
    ) -> Result<RulePreview, LogPipelineError> {
        let matcher = Matcher::compile("preview", predicate)?;
        let samples = self
            .store
            .query(EventFilter {
                limit: Some(PREVIEW_SAMPLE_SIZE),
                ..Default::default()
            })
            .await?;

        let mut matches = Vec::new();
        for (index, event) in samples.iter().enumerate() {
            if source.is_some_and(|s| s != event.transport) {
                continue;
            }
            if !matcher.is_match(event.field(predicate.field)) {
                continue;
            }
            matches.push(PreviewMatch {
                index,
                id: event.id,
                ts: event.ts,
                source: event.source_tag().to_owned(),
                host: event.host.clone(),
                message: event.message.clone(),
            });
            if limit > 0 && matches.len() >= limit {
                break;
            }
        }

        debug!(samples = samples.len(), matched = matches.len(), "rule preview evaluated");
        Ok(RulePreview {
            count: matches.len(),
            matches,
        })
    }

    /// 평가 순서의 활성 규칙 목록
    pub fn rules(&self) -> Vec<Rule> {
        self.snapshot().iter().cloned().collect()
    }

    /// 규칙을 추가합니다.
    ///
    /// 컴파일은 잠금 밖에서 수행하고, 영속화가 성공한 뒤에만
    /// 새 스냅샷을 한 번에 게시합니다.
    pub async fn add(&self, spec: RuleSpec) -> Result<Rule, LogPipelineError> {
        spec.validate()
            .map_err(|reason| LogPipelineError::RuleValidation {
                rule: spec.name.clone(),
                reason,
            })?;
        // 저장 전에 술어를 검증하여 잘못된 정규식이 영속화되지 않도록 함
        let matcher = Matcher::compile(&spec.name, &spec.predicate)?;

        let rule = self.store.insert_rule(spec).await?;
        let compiled = CompiledRule::from_parts(rule.clone(), matcher);

        let mut guard = self.snapshot.write().unwrap_or_else(PoisonError::into_inner);
        let next = guard.with(compiled);
        *guard = Arc::new(next);
        drop(guard);

        info!(rule_id = rule.id, rule = %rule.name, action = %rule.action, priority = rule.priority, "rule added");
        Ok(rule)
    }

    /// 디렉토리의 YAML 시드 규칙을 추가합니다.
    ///
    /// 같은 이름의 규칙이 이미 저장되어 있으면 건너뜁니다.
    /// 추가된 규칙 수를 반환합니다.
    pub async fn seed_from_dir(&self, dir: impl AsRef<Path>) -> Result<usize, LogPipelineError> {
        let specs = RuleLoader::load_directory(dir).await?;
        let mut added = 0;
        for spec in specs {
            if self.store.rule_by_name(spec.name.clone()).await?.is_some() {
                debug!(rule = %spec.name, "seed rule already present, skipping");
                continue;
            }
            match self.add(spec).await {
                Ok(_) => added += 1,
                Err(e) if e.is_client_error() => {
                    warn!(error = %e, "invalid seed rule, skipping");
                }
                Err(e) => return Err(e),
            }
        }
        Ok(added)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use logship_core::types::{Action, Predicate, PredicateField, PredicateKind};

    fn spec(name: &str, priority: i64, action: Action, expr: &str) -> RuleSpec {
        RuleSpec {
            name: name.to_owned(),
            enabled: true,
            priority,
            source: None,
            action,
            predicate: Predicate {
                kind: PredicateKind::Substring,
                field: PredicateField::Message,
                expression: expr.to_owned(),
            },
        }
    }

    async fn engine(policy: MatchPolicy) -> RuleEngine {
        let store = Store::open_in_memory().unwrap();
        RuleEngine::load(store, policy).await.unwrap()
    }

    fn http(message: &str) -> NewEvent {
        NewEvent::from_raw(Transport::Http, "192.0.2.1", message)
    }

    #[tokio::test]
    async fn empty_engine_keeps_everything() {
        let e = engine(MatchPolicy::First).await;
        let d = e.evaluate(&http("anything"));
        assert_eq!(d, Decision::default_keep());
    }

    #[tokio::test]
    async fn healthcheck_dropped_login_kept() {
        let e = engine(MatchPolicy::First).await;
        let rule = e
            .add(spec("drop-health", 10, Action::Drop, "healthcheck"))
            .await
            .unwrap();

        let d = e.evaluate(&http("GET /healthcheck 200"));
        assert!(d.is_drop());
        assert_eq!(d.rule_id, Some(rule.id));

        let d = e.evaluate(&http("GET /login 200"));
        assert_eq!(d.action, Action::Keep);
        assert_eq!(d.rule_id, None);
    }

    #[tokio::test]
    async fn lower_priority_wins_then_lower_id() {
        let e = engine(MatchPolicy::First).await;
        e.add(spec("late", 50, Action::Keep, "x")).await.unwrap();
        let early = e.add(spec("early", 5, Action::Drop, "x")).await.unwrap();
        e.add(spec("tie-later-id", 5, Action::Keep, "x")).await.unwrap();

        let d = e.evaluate(&http("xyz"));
        assert_eq!(d.rule_id, Some(early.id));

        let names: Vec<_> = e.rules().into_iter().map(|r| r.name).collect();
        assert_eq!(names, vec!["early", "tie-later-id", "late"]);
    }

    #[tokio::test]
    async fn last_policy_takes_last_match() {
        let e = engine(MatchPolicy::Last).await;
        e.add(spec("first", 1, Action::Drop, "x")).await.unwrap();
        let last = e.add(spec("second", 2, Action::Keep, "x")).await.unwrap();
        let d = e.evaluate(&http("x"));
        assert_eq!(d.rule_id, Some(last.id));
        assert_eq!(d.action, Action::Keep);
    }

    #[tokio::test]
    async fn invalid_regex_is_rejected_and_not_persisted() {
        let e = engine(MatchPolicy::First).await;
        let mut bad = spec("bad", 1, Action::Drop, "(");
        bad.predicate.kind = PredicateKind::Regex;
        let err = e.add(bad).await.unwrap_err();
        assert!(err.is_client_error());
        assert!(e.rules().is_empty());
        assert!(e.store.list_rules().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn empty_name_is_rejected() {
        let e = engine(MatchPolicy::First).await;
        let err = e.add(spec("  ", 1, Action::Drop, "x")).await.unwrap_err();
        assert!(matches!(err, LogPipelineError::RuleValidation { .. }));
    }

    #[tokio::test]
    async fn rules_reload_from_store() {
        let store = Store::open_in_memory().unwrap();
        {
            let e = RuleEngine::load(store.clone(), MatchPolicy::First).await.unwrap();
            e.add(spec("persisted", 1, Action::Drop, "noise")).await.unwrap();
        }
        let e = RuleEngine::load(store, MatchPolicy::First).await.unwrap();
        assert_eq!(e.rules().len(), 1);
        assert!(e.test_message("some NOISE here").is_drop());
    }

    #[tokio::test]
    async fn old_snapshot_is_unaffected_by_add() {
        let e = engine(MatchPolicy::First).await;
        let before = e.snapshot();
        e.add(spec("r", 1, Action::Drop, "x")).await.unwrap();
        assert!(before.is_empty());
        assert_eq!(e.snapshot().len(), 1);
    }

    #[tokio::test]
    async fn preview_matches_recent_events_without_adding_rule() {
        let store = Store::open_in_memory().unwrap();
        for msg in ["GET /healthcheck", "login ok", "GET /healthcheck?deep=1"] {
            store.insert(http(msg)).await.unwrap();
        }
        store
            .insert(NewEvent::from_raw(Transport::SyslogUdp, "10.0.0.5", "healthcheck from syslog"))
            .await
            .unwrap();
        let e = RuleEngine::load(store, MatchPolicy::First).await.unwrap();

        let predicate = Predicate {
            kind: PredicateKind::Regex,
            field: PredicateField::Message,
            expression: "^GET /health".to_owned(),
        };
        let preview = e.preview(&predicate, None, 0).await.unwrap();
        assert_eq!(preview.count, 2);
        assert_eq!(preview.matches[0].message, "GET /healthcheck?deep=1");
        assert_eq!(preview.matches[0].index, 1);
        assert_eq!(preview.matches[0].source, "http");
        assert!(e.rules().is_empty());

        let substring = Predicate {
            kind: PredicateKind::Substring,
            field: PredicateField::Message,
            expression: "HEALTHCHECK".to_owned(),
        };
        let only_syslog = e.preview(&substring, Some(Transport::SyslogUdp), 0).await.unwrap();
        assert_eq!(only_syslog.count, 1);
        assert_eq!(only_syslog.matches[0].source, "syslog-udp");

        let limited = e.preview(&substring, None, 1).await.unwrap();
        assert_eq!(limited.count, 1);
        assert_eq!(limited.matches[0].message, "healthcheck from syslog");
    }

    #[tokio::test]
    async fn preview_rejects_invalid_regex() {
        let e = engine(MatchPolicy::First).await;
        let predicate = Predicate {
            kind: PredicateKind::Regex,
            field: PredicateField::Message,
            expression: "(".to_owned(),
        };
        let err = e.preview(&predicate, None, 0).await.unwrap_err();
        assert!(err.is_client_error());
    }

    #[tokio::test]
    async fn seed_dir_skips_existing_names() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(
            dir.path().join("health.yml"),
            "name: drop-health\naction: drop\npriority: 10\npredicate:\n  type: substring\n  expression: healthcheck\n",
        )
        .unwrap();
        std::fs::write(
            dir.path().join("bad.yaml"),
            "name: bad-regex\naction: drop\npredicate:\n  type: regex\n  expression: \"(\"\n",
        )
        .unwrap();

        let e = engine(MatchPolicy::First).await;
        assert_eq!(e.seed_from_dir(dir.path()).await.unwrap(), 1);
        assert_eq!(e.seed_from_dir(dir.path()).await.unwrap(), 0);
        assert_eq!(e.rules().len(), 1);
    }

    mod proptests {
        use super::*;
        use proptest::prelude::*;

        fn compiled(id: i64, priority: i64, enabled: bool) -> CompiledRule {
            CompiledRule::compile(Rule {
                id,
                name: format!("r{id}"),
                enabled,
                priority,
                source: None,
                action: Action::Drop,
                predicate: Predicate {
                    kind: PredicateKind::Substring,
                    field: PredicateField::Message,
                    expression: "x".to_owned(),
                },
                created_at: 0,
            })
            .unwrap()
        }

        proptest! {
            #[test]
            fn first_match_is_lowest_priority_then_id(
                specs in prop::collection::vec((0i64..10, any::<bool>()), 0..20)
            ) {
                let rules: Vec<_> = specs
                    .iter()
                    .enumerate()
                    .map(|(i, (p, en))| compiled(i as i64 + 1, *p, *en))
                    .collect();
                let expected = specs
                    .iter()
                    .enumerate()
                    .filter(|(_, (_, en))| *en)
                    .map(|(i, (p, _))| (*p, i as i64 + 1))
                    .min()
                    .map(|(_, id)| id);

                let snapshot = RuleSnapshot::new(rules);
                let d = snapshot.evaluate(&http("x"), MatchPolicy::First);
                prop_assert_eq!(d.rule_id, expected);
            }
        }
    }
}
