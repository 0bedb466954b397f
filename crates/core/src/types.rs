//! 도메인 타입 -- 시스템 전역에서 사용되는 공통 타입
//!
//! 수집기, 규칙 엔진, 스토어, 포워더가 주고받는 데이터 구조를 정의합니다.
//!
//! - [`NewEvent`]: 수집 직후 정규화된 이벤트 (아직 저장되지 않음)
//! - [`Event`]: 스토어에 저장된 이벤트 (시퀀스 ID와 전달 상태 포함)
//! - [`Rule`] / [`RuleSpec`]: keep/drop 필터링 규칙
//! - [`Decision`]: 규칙 평가 결과

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

/// 현재 시각을 Unix 밀리초로 반환합니다.
pub fn now_millis() -> i64 {
    chrono::Utc::now().timestamp_millis()
}

/// 이벤트가 들어온 전송 경로
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum Transport {
    /// UDP syslog
    SyslogUdp,
    /// TCP syslog (개행 구분)
    SyslogTcp,
    /// HTTP `POST /ingest`
    Http,
    /// 파일 tail
    File,
}

impl Transport {
    /// 저장/필터에 쓰이는 태그 문자열
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::SyslogUdp => "syslog-udp",
            Self::SyslogTcp => "syslog-tcp",
            Self::Http => "http",
            Self::File => "file",
        }
    }
}

impl fmt::Display for Transport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Transport {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "syslog-udp" => Ok(Self::SyslogUdp),
            "syslog-tcp" => Ok(Self::SyslogTcp),
            "http" => Ok(Self::Http),
            "file" => Ok(Self::File),
            other => Err(format!("unknown transport '{other}'")),
        }
    }
}

/// 규칙 액션
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Action {
    /// 저장 후 포워딩 대상 (기본값)
    #[default]
    #[serde(alias = "allow")]
    Keep,
    /// 저장하되 포워딩하지 않음
    Drop,
}

impl Action {
    /// 저장용 문자열
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Keep => "keep",
            Self::Drop => "drop",
        }
    }
}

impl fmt::Display for Action {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Action {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "keep" | "allow" => Ok(Self::Keep),
            "drop" => Ok(Self::Drop),
            other => Err(format!("invalid action '{other}': expected keep or drop")),
        }
    }
}

/// 술어 매칭 방식
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PredicateKind {
    /// 대소문자 무시 부분 문자열 포함
    Substring,
    /// 정규식 매칭
    Regex,
}

/// 술어가 검사하는 이벤트 필드
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PredicateField {
    /// 정규화된 메시지 (기본값)
    #[default]
    Message,
    /// 호스트명
    Host,
    /// 레벨
    Level,
    /// 소스 태그 (`syslog-udp`, `http`, 파일은 `file:<path>`)
    Source,
    /// 소스 주소 (피어 IP 또는 `file:<path>`)
    #[serde(rename = "source_ip")]
    SourceIp,
    /// 애플리케이션 이름 (syslog APP-NAME / tag)
    App,
}

impl PredicateKind {
    /// 저장용 문자열
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Substring => "substring",
            Self::Regex => "regex",
        }
    }
}

impl FromStr for PredicateKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "substring" => Ok(Self::Substring),
            "regex" => Ok(Self::Regex),
            other => Err(format!(
                "invalid predicate type '{other}': expected substring or regex"
            )),
        }
    }
}

impl PredicateField {
    /// 저장용 문자열
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Message => "message",
            Self::Host => "host",
            Self::Level => "level",
            Self::Source => "source",
            Self::SourceIp => "source_ip",
            Self::App => "app",
        }
    }
}

impl FromStr for PredicateField {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "message" => Ok(Self::Message),
            "host" => Ok(Self::Host),
            "level" => Ok(Self::Level),
            "source" => Ok(Self::Source),
            "source_ip" => Ok(Self::SourceIp),
            "app" => Ok(Self::App),
            other => Err(format!("invalid predicate field '{other}'")),
        }
    }
}

/// 단일 필드에 대한 매칭 조건
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Predicate {
    /// 매칭 방식
    #[serde(rename = "type")]
    pub kind: PredicateKind,
    /// 대상 필드
    #[serde(default)]
    pub field: PredicateField,
    /// 부분 문자열 또는 정규식
    pub expression: String,
}

/// 새 규칙 생성 요청 -- API와 YAML 시드 파일이 공유하는 형식
///
/// ```yaml
/// name: drop-healthchecks
/// priority: 10
/// action: drop
/// source: http
/// predicate:
///   type: substring
///   field: message
///   expression: healthcheck
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RuleSpec {
    /// 규칙 이름
    pub name: String,
    /// 활성화 여부
    #[serde(default = "default_enabled")]
    pub enabled: bool,
    /// 평가 우선순위 (낮을수록 먼저)
    #[serde(default = "default_priority")]
    pub priority: i64,
    /// 적용 대상 전송 경로 (None = 전체)
    #[serde(default)]
    pub source: Option<Transport>,
    /// 매칭 시 액션
    pub action: Action,
    /// 매칭 조건
    pub predicate: Predicate,
}

fn default_enabled() -> bool {
    true
}

/// 규칙 기본 우선순위
pub const DEFAULT_RULE_PRIORITY: i64 = 100;

fn default_priority() -> i64 {
    DEFAULT_RULE_PRIORITY
}

/// 규칙 이름 최대 길이
const MAX_RULE_NAME_LEN: usize = 256;
/// 술어 표현식 최대 길이
const MAX_EXPRESSION_LEN: usize = 4096;

impl RuleSpec {
    /// 구조적 유효성을 검증합니다. 정규식 컴파일은 규칙 엔진이 담당합니다.
    pub fn validate(&self) -> Result<(), String> {
        if self.name.trim().is_empty() {
            return Err("rule name must not be empty".to_owned());
        }
        if self.name.len() > MAX_RULE_NAME_LEN {
            return Err(format!(
                "rule name must not exceed {MAX_RULE_NAME_LEN} characters"
            ));
        }
        if self.predicate.expression.is_empty() {
            return Err("predicate expression must not be empty".to_owned());
        }
        if self.predicate.expression.len() > MAX_EXPRESSION_LEN {
            return Err(format!(
                "predicate expression must not exceed {MAX_EXPRESSION_LEN} characters"
            ));
        }
        Ok(())
    }
}

/// 저장된 규칙
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Rule {
    /// 규칙 ID (삽입 순서)
    pub id: i64,
    /// 규칙 이름
    pub name: String,
    /// 활성화 여부
    pub enabled: bool,
    /// 평가 우선순위
    pub priority: i64,
    /// 적용 대상 전송 경로
    pub source: Option<Transport>,
    /// 매칭 시 액션
    pub action: Action,
    /// 매칭 조건
    pub predicate: Predicate,
    /// 생성 시각 (Unix ms)
    pub created_at: i64,
}

/// 규칙 평가 결과
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Decision {
    /// 최종 액션
    pub action: Action,
    /// 결정을 내린 규칙 ID (기본 keep이면 None)
    pub rule_id: Option<i64>,
    /// 결정을 내린 규칙 이름
    pub rule_name: Option<String>,
}

impl Decision {
    /// 매칭 규칙이 없을 때의 기본 결정
    pub fn default_keep() -> Self {
        Self {
            action: Action::Keep,
            rule_id: None,
            rule_name: None,
        }
    }

    /// 규칙 매칭 결과
    pub fn matched(rule: &Rule) -> Self {
        Self {
            action: rule.action,
            rule_id: Some(rule.id),
            rule_name: Some(rule.name.clone()),
        }
    }

    /// drop 결정인지 확인합니다.
    pub fn is_drop(&self) -> bool {
        self.action == Action::Drop
    }
}

/// IP 정책으로 차단된 이벤트의 drop 사유
pub const DROP_REASON_IP_POLICY: &str = "ip_policy";

/// 정규화된 신규 이벤트
///
/// 수집기가 생성하고 결정(keep/drop)이 적용된 뒤 한 번만 저장됩니다.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NewEvent {
    /// 수집 시각 (Unix ms). None이면 저장 시 현재 시각
    pub ts: Option<i64>,
    /// 전송 경로
    pub transport: Transport,
    /// 소스 주소 (IP, host 또는 `file:<path>`)
    pub source_addr: String,
    /// 레벨 (빈 문자열 가능)
    pub level: String,
    /// 호스트 (빈 문자열 가능)
    pub host: String,
    /// 애플리케이션 이름 (빈 문자열 가능)
    pub app: String,
    /// 정규화된 메시지
    pub message: String,
    /// 원본 페이로드
    pub raw: String,
    /// 변환된 JSON 페이로드 (있으면 포워딩 시 우선)
    pub payload: Option<String>,
    /// 구조화 파싱 실패 사유
    pub parse_error: Option<String>,
    /// drop 여부
    pub dropped: bool,
    /// 결정을 내린 규칙 ID
    pub matched_rule: Option<i64>,
    /// drop 사유 (`rule:<name>` 또는 `ip_policy`)
    pub drop_reason: Option<String>,
}

impl NewEvent {
    /// 원본 라인만으로 이벤트를 생성합니다. 메시지는 원본과 같습니다.
    pub fn from_raw(transport: Transport, source_addr: impl Into<String>, raw: impl Into<String>) -> Self {
        let raw = raw.into();
        Self {
            ts: None,
            transport,
            source_addr: source_addr.into(),
            level: String::new(),
            host: String::new(),
            app: String::new(),
            message: raw.clone(),
            raw,
            payload: None,
            parse_error: None,
            dropped: false,
            matched_rule: None,
            drop_reason: None,
        }
    }

    /// 소스 태그. 파일 이벤트는 경로까지 포함한 `file:<path>`입니다.
    pub fn source_tag(&self) -> &str {
        source_tag(self.transport, &self.source_addr)
    }

    /// 술어 대상 필드 값을 반환합니다.
    pub fn field(&self, field: PredicateField) -> &str {
        match field {
            PredicateField::Message => &self.message,
            PredicateField::Host => &self.host,
            PredicateField::Level => &self.level,
            PredicateField::Source => self.source_tag(),
            PredicateField::SourceIp => &self.source_addr,
            PredicateField::App => &self.app,
        }
    }

    /// 규칙 평가 결과를 반영합니다.
    pub fn apply_decision(&mut self, decision: &Decision) {
        self.dropped = decision.is_drop();
        self.matched_rule = decision.rule_id;
        self.drop_reason = match (&decision.rule_name, self.dropped) {
            (Some(name), true) => Some(format!("rule:{name}")),
            (None, true) => Some("rule".to_owned()),
            _ => None,
        };
    }

    /// IP 정책 차단을 반영합니다. 규칙은 평가하지 않습니다.
    pub fn block_by_policy(&mut self) {
        self.dropped = true;
        self.matched_rule = None;
        self.drop_reason = Some(DROP_REASON_IP_POLICY.to_owned());
    }
}

/// 저장된 이벤트
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Event {
    /// 시퀀스 ID
    pub id: i64,
    /// 수집 시각 (Unix ms, UTC)
    pub ts: i64,
    /// 전송 경로
    pub transport: Transport,
    /// 소스 주소
    pub source_addr: String,
    /// 레벨
    pub level: String,
    /// 호스트
    pub host: String,
    /// 애플리케이션 이름
    pub app: String,
    /// 메시지
    pub message: String,
    /// 원본 페이로드
    pub raw: String,
    /// 변환된 JSON 페이로드
    pub payload: Option<String>,
    /// 파싱 실패 사유
    pub parse_error: Option<String>,
    /// drop 여부
    pub dropped: bool,
    /// 결정을 내린 규칙 ID
    pub matched_rule: Option<i64>,
    /// drop 사유
    pub drop_reason: Option<String>,
    /// 포워딩 완료 여부 (false -> true 단방향)
    pub forwarded: bool,
    /// 실패한 포워딩 시도 수 (참고용)
    pub retry_count: i64,
}

impl Event {
    /// 소스 태그 ([`NewEvent::source_tag`]와 동일)
    pub fn source_tag(&self) -> &str {
        source_tag(self.transport, &self.source_addr)
    }

    /// 술어 대상 필드 값을 반환합니다.
    pub fn field(&self, field: PredicateField) -> &str {
        match field {
            PredicateField::Message => &self.message,
            PredicateField::Host => &self.host,
            PredicateField::Level => &self.level,
            PredicateField::Source => self.source_tag(),
            PredicateField::SourceIp => &self.source_addr,
            PredicateField::App => &self.app,
        }
    }
}

fn source_tag(transport: Transport, source_addr: &str) -> &str {
    match transport {
        Transport::File => source_addr,
        other => other.as_str(),
    }
}
