//! Rule management handlers.

use axum::Json;
use axum::body::Bytes;
use axum::extract::State;
use axum::http::StatusCode;
use serde::{Deserialize, Serialize};
use serde::de::DeserializeOwned;

use logship_core::types::{
    Action, DEFAULT_RULE_PRIORITY, Decision, NewEvent, Predicate, PredicateField, PredicateKind, Rule,
    RuleSpec, Transport,
};
use logship_pipeline::RulePreview;

use super::{ApiError, AppState};

/// Body of `POST /api/rules`.
///
/// `pattern` is shorthand for a regex predicate on the message.
#[derive(Debug, Deserialize)]
pub(super) struct CreateRuleRequest {
    name: String,
    action: String,
    #[serde(default)]
    pattern: Option<String>,
    #[serde(default)]
    predicate: Option<Predicate>,
    #[serde(default)]
    priority: Option<i64>,
    #[serde(default)]
    enabled: Option<bool>,
    #[serde(default)]
    source: Option<String>,
}

impl CreateRuleRequest {
    fn into_spec(self) -> Result<RuleSpec, ApiError> {
        let action: Action = self.action.parse().map_err(ApiError::BadRequest)?;
        let source = parse_transport(self.source)?;
        let predicate = match (self.predicate, self.pattern) {
            (Some(predicate), _) => predicate,
            (None, Some(pattern)) => Predicate {
                kind: PredicateKind::Regex,
                field: PredicateField::Message,
                expression: pattern,
            },
            (None, None) => {
                return Err(ApiError::BadRequest(
                    "rule requires a pattern or a predicate".to_owned(),
                ));
            }
        };

        Ok(RuleSpec {
            name: self.name,
            enabled: self.enabled.unwrap_or(true),
            priority: self.priority.unwrap_or(DEFAULT_RULE_PRIORITY),
            source,
            action,
            predicate,
        })
    }
}

/// Body of `POST /api/rules/test`.
///
/// A `predicate` is dry-run against recent stored events; a bare `message`
/// is evaluated against the active rule set.
#[derive(Debug, Deserialize)]
#[serde(untagged)]
pub(super) enum TestRuleRequest {
    Candidate(CandidateRequest),
    Sample(SampleRequest),
}

#[derive(Debug, Deserialize)]
pub(super) struct CandidateRequest {
    predicate: Predicate,
    #[serde(default)]
    source: Option<String>,
    #[serde(default)]
    limit: Option<usize>,
}

#[derive(Debug, Deserialize)]
pub(super) struct SampleRequest {
    message: String,
    #[serde(default)]
    host: Option<String>,
    #[serde(default)]
    level: Option<String>,
    #[serde(default)]
    source: Option<String>,
}

impl SampleRequest {
    fn into_event(self) -> Result<NewEvent, ApiError> {
        let transport = parse_transport(self.source)?.unwrap_or(Transport::Http);
        let mut event = NewEvent::from_raw(transport, "", self.message);
        if let Some(host) = self.host {
            event.host = host;
        }
        if let Some(level) = self.level {
            event.level = level;
        }
        Ok(event)
    }
}

/// Response of `POST /api/rules/test`.
#[derive(Debug, Serialize)]
#[serde(untagged)]
pub(super) enum TestRuleResponse {
    Preview(RulePreview),
    Decision(Decision),
}

fn parse_transport(value: Option<String>) -> Result<Option<Transport>, ApiError> {
    value
        .filter(|s| !s.is_empty())
        .map(|s| s.parse::<Transport>())
        .transpose()
        .map_err(ApiError::BadRequest)
}

/// Decode a JSON body, reporting failures as 400 with the serde message.
pub(super) fn decode_json<T: DeserializeOwned>(body: &[u8]) -> Result<T, ApiError> {
    serde_json::from_slice(body).map_err(|e| ApiError::BadRequest(format!("invalid JSON body: {e}")))
}

pub(super) async fn list_handler(State(state): State<AppState>) -> Json<Vec<Rule>> {
    Json(state.rules.rules())
}

pub(super) async fn create_handler(
    State(state): State<AppState>,
    body: Bytes,
) -> Result<(StatusCode, Json<Rule>), ApiError> {
    let spec = decode_json::<CreateRuleRequest>(&body)?.into_spec()?;
    let rule = state.rules.add(spec).await?;
    tracing::info!(rule_id = rule.id, name = %rule.name, action = rule.action.as_str(), "rule created");
    Ok((StatusCode::CREATED, Json(rule)))
}

pub(super) async fn test_handler(
    State(state): State<AppState>,
    body: Bytes,
) -> Result<Json<TestRuleResponse>, ApiError> {
    match decode_json::<TestRuleRequest>(&body)? {
        TestRuleRequest::Candidate(request) => {
            let source = parse_transport(request.source)?;
            let preview = state
                .rules
                .preview(&request.predicate, source, request.limit.unwrap_or(0))
                .await?;
            Ok(Json(TestRuleResponse::Preview(preview)))
        }
        TestRuleRequest::Sample(request) => {
            let event = request.into_event()?;
            Ok(Json(TestRuleResponse::Decision(state.rules.evaluate(&event))))
        }
    }
}
