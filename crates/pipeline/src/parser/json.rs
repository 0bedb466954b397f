//! HTTP 수집 본문 디코더
//!
//! `POST /ingest` 본문은 JSON 객체 하나 또는 객체 배열입니다.
//! 각 객체는 경계에서 [`IngestRecord`]로 디코딩되며, 알 수 없는 필드는
//! 저장되는 원본(raw) 텍스트에 그대로 남습니다.
//!
//! ```text
//! {"host":"web-1","level":"info","message":"GET /","event":{...},"ts":1700000000000,"trace":"x"}
//! ```
//!
//! # 사용 예시
//! ```
//! use logship_pipeline::parser::decode_ingest_body;
//!
//! let records = decode_ingest_body(br#"[{"message":"a"},{"raw":"b"}]"#).unwrap();
//! assert_eq!(records.len(), 2);
//! ```

use serde::Deserialize;
use serde_json::Value;

use logship_core::types::{NewEvent, Transport};

use crate::error::LogPipelineError;

/// 타입이 지정된 수집 레코드
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
pub struct IngestRecord {
    /// 호스트명
    #[serde(default)]
    pub host: Option<String>,
    /// 레벨
    #[serde(default)]
    pub level: Option<String>,
    /// 메시지
    #[serde(default)]
    pub message: Option<String>,
    /// 원본 라인
    #[serde(default)]
    pub raw: Option<String>,
    /// 변환된 이벤트 (임의 JSON, 포워딩 시 우선)
    #[serde(default)]
    pub event: Option<Value>,
    /// 발생 시각 (Unix ms)
    #[serde(default)]
    pub ts: Option<i64>,
}

/// 디코딩된 레코드와 객체 원문
#[derive(Debug, Clone, PartialEq)]
pub struct DecodedRecord {
    /// 타입이 지정된 필드
    pub record: IngestRecord,
    /// 객체 전체의 JSON 텍스트 (알 수 없는 필드 포함)
    pub verbatim: String,
}

impl DecodedRecord {
    /// 정규화된 이벤트로 변환합니다.
    ///
    /// 메시지가 없으면 `raw`, 그것도 없으면 객체 원문을 메시지로 사용합니다.
    pub fn into_new_event(self, source_addr: &str) -> NewEvent {
        let DecodedRecord { record, verbatim } = self;
        let message = record
            .message
            .or_else(|| record.raw.clone())
            .unwrap_or_else(|| verbatim.clone());

        let mut event = NewEvent::from_raw(Transport::Http, source_addr, verbatim);
        event.message = message;
        event.host = record.host.unwrap_or_default();
        event.level = record.level.unwrap_or_default();
        event.payload = record.event.map(|v| v.to_string());
        event.ts = record.ts;
        event
    }
}

fn invalid(offset: usize, reason: impl Into<String>) -> LogPipelineError {
    LogPipelineError::Parse {
        format: "json".to_owned(),
        offset,
        reason: reason.into(),
    }
}

fn decode_object(index: usize, value: Value) -> Result<DecodedRecord, LogPipelineError> {
    if !value.is_object() {
        return Err(invalid(index, format!("item {index} is not a JSON object")));
    }
    let verbatim = value.to_string();
    let record: IngestRecord = serde_json::from_value(value)
        .map_err(|e| invalid(index, format!("item {index}: {e}")))?;
    Ok(DecodedRecord { record, verbatim })
}

/// 수집 본문을 디코딩합니다. 하나라도 잘못되면 전체가 거부됩니다.
pub fn decode_ingest_body(body: &[u8]) -> Result<Vec<DecodedRecord>, LogPipelineError> {
    let value: Value = serde_json::from_slice(body).map_err(|e| invalid(e.column(), e.to_string()))?;

    match value {
        Value::Array(items) => items
            .into_iter()
            .enumerate()
            .map(|(i, item)| decode_object(i, item))
            .collect(),
        obj @ Value::Object(_) => Ok(vec![decode_object(0, obj)?]),
        _ => Err(invalid(0, "body must be a JSON object or an array of objects")),
    }
}
