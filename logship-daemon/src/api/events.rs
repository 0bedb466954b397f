//! Event query, statistics and drop preview handlers.

use axum::Json;
use axum::extract::rejection::QueryRejection;
use axum::extract::{Query, State};
use serde::Deserialize;

use logship_core::types::{Event, Transport};
use logship_store::{DropRecord, EventFilter, MAX_QUERY_LIMIT, Stats};

use super::{ApiError, AppState};

const DEFAULT_DROPS_LIMIT: usize = 50;

/// Query string for `GET /api/events`.
#[derive(Debug, Default, Deserialize)]
pub(super) struct EventsParams {
    limit: Option<usize>,
    offset: Option<usize>,
    level: Option<String>,
    source: Option<String>,
    source_ip: Option<String>,
    q: Option<String>,
    dropped: Option<bool>,
    from: Option<i64>,
    to: Option<i64>,
}

impl EventsParams {
    fn into_filter(self) -> Result<EventFilter, ApiError> {
        let source = self
            .source
            .filter(|s| !s.is_empty())
            .map(|s| s.parse::<Transport>())
            .transpose()
            .map_err(ApiError::BadRequest)?;

        Ok(EventFilter {
            from: self.from,
            to: self.to,
            level: self.level.filter(|s| !s.is_empty()),
            source,
            source_ip: self.source_ip.filter(|s| !s.is_empty()),
            q: self.q.filter(|s| !s.is_empty()),
            dropped: self.dropped,
            limit: self.limit,
            offset: self.offset,
        })
    }
}

pub(super) async fn events_handler(
    State(state): State<AppState>,
    params: Result<Query<EventsParams>, QueryRejection>,
) -> Result<Json<Vec<Event>>, ApiError> {
    let Query(params) = params.map_err(|e| ApiError::BadRequest(e.body_text()))?;
    let filter = params.into_filter()?;
    Ok(Json(state.store.query(filter).await?))
}

pub(super) async fn stats_handler(State(state): State<AppState>) -> Result<Json<Stats>, ApiError> {
    Ok(Json(state.store.stats().await?))
}

#[derive(Debug, Deserialize)]
pub(super) struct DropsParams {
    limit: Option<usize>,
}

pub(super) async fn drops_handler(
    State(state): State<AppState>,
    params: Result<Query<DropsParams>, QueryRejection>,
) -> Result<Json<Vec<DropRecord>>, ApiError> {
    let Query(params) = params.map_err(|e| ApiError::BadRequest(e.body_text()))?;
    let limit = params
        .limit
        .unwrap_or(DEFAULT_DROPS_LIMIT)
        .clamp(1, MAX_QUERY_LIMIT);
    Ok(Json(state.store.recent_drops(limit).await?))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_params_become_empty_filter() {
        let filter = EventsParams {
            level: Some(String::new()),
            source: Some(String::new()),
            ..Default::default()
        }
        .into_filter()
        .unwrap();
        assert!(filter.level.is_none());
        assert!(filter.source.is_none());
    }

    #[test]
    fn source_is_parsed_as_transport() {
        let filter = EventsParams {
            source: Some("syslog-tcp".to_owned()),
            ..Default::default()
        }
        .into_filter()
        .unwrap();
        assert_eq!(filter.source, Some(Transport::SyslogTcp));
    }

    #[test]
    fn unknown_source_is_rejected() {
        let err = EventsParams {
            source: Some("carrier-pigeon".to_owned()),
            ..Default::default()
        }
        .into_filter()
        .unwrap_err();
        assert!(matches!(err, ApiError::BadRequest(_)));
    }
}
