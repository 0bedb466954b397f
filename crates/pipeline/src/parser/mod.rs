//! 파싱 모듈 -- syslog 라인과 HTTP 수집 본문
//!
//! - [`SyslogParser`]: RFC 5424 / RFC 3164, 결과는 [`ParseOutcome`]
//! - [`decode_ingest_body`]: `POST /ingest` JSON 본문 디코더

pub mod json;
pub mod syslog;

pub use json::{DecodedRecord, IngestRecord, decode_ingest_body};
pub use syslog::{ParseOutcome, SyslogParser, SyslogRecord, severity_name};
