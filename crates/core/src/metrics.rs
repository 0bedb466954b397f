//! 메트릭 상수 및 설명 등록
//!
//! 모든 Prometheus 메트릭의 이름과 설명을 중앙에서 정의합니다.
//! 각 모듈은 이 상수를 사용하여 `metrics::counter!()`, `metrics::gauge!()`,
//! `metrics::histogram!()` 매크로를 호출합니다.
//!
//! # 네이밍 컨벤션
//!
//! - 접두어: `logship_`
//! - 접미어: `_total` (counter), `_seconds` (histogram/latency), 없음 (gauge)
//!
//! # 사용 예시
//!
//! ```ignore
//! use metrics::counter;
//!
//! counter!(logship_core::metrics::EVENTS_INGESTED_TOTAL,
//!     logship_core::metrics::LABEL_TRANSPORT => "http").increment(1);
//! ```

// ─── 레이블 키 상수 ────────────────────────────────────────────────

/// 전송 경로 레이블 키 (syslog-udp, syslog-tcp, http, file)
pub const LABEL_TRANSPORT: &str = "transport";

/// drop 사유 레이블 키 (rule, ip_policy)
pub const LABEL_REASON: &str = "reason";

/// 결과 레이블 키 (success, failure)
pub const LABEL_RESULT: &str = "result";

// ─── 수집 파이프라인 메트릭 ──────────────────────────────────────────

/// 저장된 전체 이벤트 수 (counter, label: transport)
pub const EVENTS_INGESTED_TOTAL: &str = "logship_events_ingested_total";

/// drop 처리된 이벤트 수 (counter, label: reason)
pub const EVENTS_DROPPED_TOTAL: &str = "logship_events_dropped_total";

/// 구조화 파싱 실패 수 (counter, label: transport)
pub const PARSE_ERRORS_TOTAL: &str = "logship_parse_errors_total";

/// 이벤트 처리 지연 시간 (histogram, 초)
pub const INGEST_DURATION_SECONDS: &str = "logship_ingest_duration_seconds";

// ─── 스토어 메트릭 ──────────────────────────────────────────────────

/// 스토어 쓰기 실패 수 (counter)
pub const STORE_ERRORS_TOTAL: &str = "logship_store_errors_total";

/// 보존 정책으로 삭제된 이벤트 수 (counter)
pub const RETENTION_DELETED_TOTAL: &str = "logship_retention_deleted_total";

// ─── 포워더 메트릭 ──────────────────────────────────────────────────

/// 전송된 배치 수 (counter, label: result)
pub const FORWARD_BATCHES_TOTAL: &str = "logship_forward_batches_total";

/// 전달 완료로 표시된 이벤트 수 (counter)
pub const EVENTS_FORWARDED_TOTAL: &str = "logship_events_forwarded_total";

// ─── Daemon 메트릭 ──────────────────────────────────────────────────

/// Daemon: 가동 시간 (gauge, 초)
pub const DAEMON_UPTIME_SECONDS: &str = "logship_daemon_uptime_seconds";

/// Daemon: 빌드 정보 (gauge, 항상 1, label: version)
pub const DAEMON_BUILD_INFO: &str = "logship_daemon_build_info";

// ─── 히스토그램 버킷 정의 ────────────────────────────────────────────

/// 이벤트 처리 지연 시간 히스토그램 버킷 (초)
///
/// 100us ~ 10s 범위, 로그 단위 분포
pub const PROCESSING_DURATION_BUCKETS: [f64; 10] = [
    0.0001, 0.0005, 0.001, 0.005, 0.01, 0.05, 0.1, 0.5, 1.0, 10.0,
];

// ─── 설명 등록 함수 ─────────────────────────────────────────────────

/// 모든 메트릭의 설명(description)을 등록합니다.
///
/// 이 함수는 전역 레코더 설치 후 한 번만 호출해야 합니다.
/// 일반적으로 `logship-daemon`의 시작 시점에서 호출합니다.
pub fn describe_all() {
    use metrics::{describe_counter, describe_gauge, describe_histogram};

    // 수집
    describe_counter!(
        EVENTS_INGESTED_TOTAL,
        "Total number of events stored, by transport"
    );
    describe_counter!(
        EVENTS_DROPPED_TOTAL,
        "Total number of events marked dropped, by reason"
    );
    describe_counter!(
        PARSE_ERRORS_TOTAL,
        "Total number of events stored with a structured parse error"
    );
    describe_histogram!(
        INGEST_DURATION_SECONDS,
        "Time to evaluate and store a single event in seconds"
    );

    // 스토어
    describe_counter!(STORE_ERRORS_TOTAL, "Total number of failed store writes");
    describe_counter!(
        RETENTION_DELETED_TOTAL,
        "Total number of events deleted by retention"
    );

    // 포워더
    describe_counter!(
        FORWARD_BATCHES_TOTAL,
        "Total number of forward batches attempted, by result"
    );
    describe_counter!(
        EVENTS_FORWARDED_TOTAL,
        "Total number of events marked forwarded"
    );

    // Daemon
    describe_gauge!(DAEMON_UPTIME_SECONDS, "logship daemon uptime in seconds");
    describe_gauge!(DAEMON_BUILD_INFO, "Build information (always 1, with version label)");
}
