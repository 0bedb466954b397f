//! 배치 포워더 -- 미전달 이벤트를 모든 목적지로 POST 합니다.
//!
//! # 한 틱의 흐름
//! ```text
//! fetch_unforwarded(min batch_size) -> JSON 배열 -> 목적지별 동시 POST
//!     모두 2xx  -> mark_forwarded
//!     하나라도 실패 -> bump_retry (다음 틱에 재전송)
//! ```
//!
//! 성공한 목적지도 다른 목적지 실패 시 같은 배치를 다시 받을 수 있습니다
//! (at-least-once).

use std::time::Duration;

use bytes::Bytes;
use reqwest::header::{CONTENT_TYPE, HeaderMap, HeaderName, HeaderValue};
use serde_json::Value;
use tokio::task::JoinSet;
use tracing::{debug, info, warn};

use logship_core::config::{ForwardDestination, MAX_FORWARD_BATCH_SIZE};
use logship_core::metrics as m;
use logship_store::{PendingEvent, Store};

use crate::error::ForwarderError;

/// 배치 상관관계 헤더
pub const BATCH_HEADER: &str = "X-Logship-Batch";

/// 요청 준비가 끝난 목적지
#[derive(Debug, Clone)]
struct Destination {
    name: String,
    url: String,
    headers: HeaderMap,
    timeout: Duration,
}

impl Destination {
    fn prepare(dest: &ForwardDestination) -> Result<Self, ForwarderError> {
        let client_err = |reason: String| ForwarderError::Client {
            destination: dest.name.clone(),
            reason,
        };

        let mut headers = HeaderMap::new();
        headers.insert(CONTENT_TYPE, HeaderValue::from_static("application/json"));
        for (key, value) in &dest.headers {
            let name = HeaderName::from_bytes(key.as_bytes())
                .map_err(|e| client_err(format!("invalid header name '{key}': {e}")))?;
            let value = HeaderValue::from_str(value)
                .map_err(|e| client_err(format!("invalid value for header '{key}': {e}")))?;
            headers.insert(name, value);
        }

        Ok(Self {
            name: dest.name.clone(),
            url: dest.url.clone(),
            headers,
            timeout: Duration::from_secs(dest.timeout_secs),
        })
    }
}

/// 한 틱의 결과
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TickOutcome {
    /// 목적지가 없거나 미전달 이벤트가 없음
    Idle,
    /// 모든 목적지가 2xx로 응답하여 전달 표시됨
    Delivered {
        /// 전달된 이벤트 수
        events: usize,
    },
    /// 하나 이상의 목적지가 실패하여 배치가 대기 상태로 남음
    Retrying {
        /// 배치 이벤트 수
        events: usize,
        /// 실패한 목적지 수
        failed_destinations: usize,
    },
}

/// 이벤트 포워더
#[derive(Debug, Clone)]
pub struct Forwarder {
    store: Store,
    client: reqwest::Client,
    destinations: Vec<Destination>,
    batch_size: usize,
}

impl Forwarder {
    /// 목적지 목록으로 포워더를 생성합니다.
    ///
    /// 헤더 이름/값이 유효하지 않으면 `ForwarderError::Client`를 반환합니다.
    pub fn new(store: Store, destinations: &[ForwardDestination]) -> Result<Self, ForwarderError> {
        let client = reqwest::Client::builder()
            .build()
            .map_err(|e| ForwarderError::Client {
                destination: "*".to_owned(),
                reason: e.to_string(),
            })?;

        let prepared = destinations
            .iter()
            .map(Destination::prepare)
            .collect::<Result<Vec<_>, _>>()?;

        let batch_size = destinations
            .iter()
            .map(|d| d.batch_size)
            .min()
            .unwrap_or(0)
            .clamp(1, MAX_FORWARD_BATCH_SIZE);

        Ok(Self {
            store,
            client,
            destinations: prepared,
            batch_size,
        })
    }

    /// 목적지 수
    pub fn destination_count(&self) -> usize {
        self.destinations.len()
    }

    /// 틱당 최대 이벤트 수 (목적지 batch_size의 최솟값)
    pub fn batch_size(&self) -> usize {
        self.batch_size
    }

    /// 한 배치를 전달합니다.
    ///
    /// 목적지 실패는 에러가 아니라 [`TickOutcome::Retrying`]으로 보고되며,
    /// 스토어 에러만 `Err`로 전파됩니다.
    pub async fn tick(&self) -> Result<TickOutcome, ForwarderError> {
        if self.destinations.is_empty() {
            return Ok(TickOutcome::Idle);
        }

        let batch = self.store.fetch_unforwarded(self.batch_size).await?;
        if batch.is_empty() {
            return Ok(TickOutcome::Idle);
        }

        let ids: Vec<i64> = batch.iter().map(|e| e.id).collect();
        let body = encode_batch(batch);
        let batch_id = uuid::Uuid::new_v4().to_string();
        debug!(batch = %batch_id, events = ids.len(), "forwarding batch");

        let mut set = JoinSet::new();
        for dest in &self.destinations {
            set.spawn(send(
                self.client.clone(),
                dest.clone(),
                body.clone(),
                batch_id.clone(),
            ));
        }

        let mut failed = 0usize;
        for joined in set.join_all().await {
            if let Err(e) = joined {
                warn!(batch = %batch_id, error = %e, "forward attempt failed");
                failed += 1;
            }
        }

        let events = ids.len();
        if failed == 0 {
            self.store.mark_forwarded(ids).await?;
            metrics::counter!(m::FORWARD_BATCHES_TOTAL, m::LABEL_RESULT => "success").increment(1);
            metrics::counter!(m::EVENTS_FORWARDED_TOTAL).increment(events as u64);
            info!(batch = %batch_id, events, "batch forwarded");
            Ok(TickOutcome::Delivered { events })
        } else {
            self.store.bump_retry(ids).await?;
            metrics::counter!(m::FORWARD_BATCHES_TOTAL, m::LABEL_RESULT => "failure").increment(1);
            Ok(TickOutcome::Retrying {
                events,
                failed_destinations: failed,
            })
        }
    }
}

/// 이벤트 본문을 JSON 배열로 직렬화합니다.
///
/// 유효한 JSON 본문은 그대로, 그 외는 JSON 문자열로 들어갑니다.
pub fn encode_batch(batch: Vec<PendingEvent>) -> Bytes {
    let items = batch
        .into_iter()
        .map(|event| serde_json::from_str::<Value>(&event.body).unwrap_or(Value::String(event.body)))
        .collect();
    Bytes::from(Value::Array(items).to_string())
}

/// 단일 목적지로 POST 합니다.
async fn send(
    client: reqwest::Client,
    dest: Destination,
    body: Bytes,
    batch_id: String,
) -> Result<(), ForwarderError> {
    let response = client
        .post(&dest.url)
        .headers(dest.headers)
        .header(BATCH_HEADER, batch_id)
        .timeout(dest.timeout)
        .body(body)
        .send()
        .await
        .map_err(|e| ForwarderError::Request {
            destination: dest.name.clone(),
            reason: e.to_string(),
        })?;

    let status = response.status();
    if !status.is_success() {
        return Err(ForwarderError::Status {
            destination: dest.name,
            status: status.as_u16(),
        });
    }
    Ok(())
}
