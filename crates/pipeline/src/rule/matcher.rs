//! 규칙 매칭 로직 -- 술어 컴파일과 평가
//!
//! [`CompiledRule`]은 저장된 [`Rule`]과 미리 컴파일된 [`Matcher`]를 묶습니다.
//! 정규식은 규칙 추가 시 한 번만 컴파일되며, 잘못된 정규식은
//! 활성 규칙 집합에 들어가지 못합니다.

use regex::Regex;

use logship_core::types::{NewEvent, Predicate, PredicateKind, Rule};

use crate::error::LogPipelineError;

/// 컴파일된 술어
#[derive(Debug, Clone)]
pub enum Matcher {
    /// 대소문자 무시 부분 문자열 (needle은 소문자로 저장)
    Substring(String),
    /// 정규식
    Regex(Regex),
}

impl Matcher {
    /// 술어를 컴파일합니다.
    ///
    /// `rule_name`은 에러 메시지에만 사용됩니다.
    pub fn compile(rule_name: &str, predicate: &Predicate) -> Result<Self, LogPipelineError> {
        match predicate.kind {
            PredicateKind::Substring => Ok(Self::Substring(predicate.expression.to_lowercase())),
            PredicateKind::Regex => Regex::new(&predicate.expression)
                .map(Self::Regex)
                .map_err(|e| LogPipelineError::RuleValidation {
                    rule: rule_name.to_owned(),
                    reason: format!("invalid regex '{}': {e}", predicate.expression),
                }),
        }
    }

    /// 값이 술어와 매칭되는지 확인합니다.
    pub fn is_match(&self, value: &str) -> bool {
        match self {
            Self::Substring(needle) => {
                if value.is_ascii() && needle.is_ascii() {
                    contains_ascii_ci(value, needle)
                } else {
                    value.to_lowercase().contains(needle.as_str())
                }
            }
            Self::Regex(re) => re.is_match(value),
        }
    }
}

/// ASCII 전용 대소문자 무시 포함 검사 (할당 없음)
fn contains_ascii_ci(haystack: &str, needle_lower: &str) -> bool {
    let needle = needle_lower.as_bytes();
    if needle.is_empty() {
        return true;
    }
    haystack
        .as_bytes()
        .windows(needle.len())
        .any(|w| w.eq_ignore_ascii_case(needle))
}

/// 컴파일된 규칙
#[derive(Debug, Clone)]
pub struct CompiledRule {
    rule: Rule,
    matcher: Matcher,
}

impl CompiledRule {
    /// 저장된 규칙을 컴파일합니다.
    pub fn compile(rule: Rule) -> Result<Self, LogPipelineError> {
        let matcher = Matcher::compile(&rule.name, &rule.predicate)?;
        Ok(Self { rule, matcher })
    }

    /// 이미 컴파일된 술어로 규칙을 구성합니다.
    pub(crate) fn from_parts(rule: Rule, matcher: Matcher) -> Self {
        Self { rule, matcher }
    }

    /// 원본 규칙
    pub fn rule(&self) -> &Rule {
        &self.rule
    }

    /// 정렬 키 (priority, id)
    pub fn sort_key(&self) -> (i64, i64) {
        (self.rule.priority, self.rule.id)
    }

    /// 활성화 여부와 전송 경로 필터를 포함하여 이벤트에 적용되는지 확인합니다.
    pub fn applies_to(&self, event: &NewEvent) -> bool {
        if !self.rule.enabled {
            return false;
        }
        if let Some(source) = self.rule.source {
            if source != event.transport {
                return false;
            }
        }
        self.matcher.is_match(event.field(self.rule.predicate.field))
    }
}
