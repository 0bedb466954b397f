//! logship-forwarder -- 보존된 이벤트를 HTTP 목적지로 전달
//!
//! # 모듈 구성
//! - [`forwarder`]: 배치 조회, JSON 직렬화, 목적지별 동시 POST, 전달 표시
//! - [`task`]: 주기 실행 [`ForwarderTask`] (Pipeline trait 구현)
//! - [`error`]: [`ForwarderError`]
//!
//! 전달 보장은 at-least-once 입니다. 모든 목적지가 2xx로 응답해야
//! 배치가 전달 완료로 표시되고, 그 외에는 다음 틱에 재전송됩니다.

pub mod error;
pub mod forwarder;
pub mod task;

pub use error::ForwarderError;
pub use forwarder::{BATCH_HEADER, Forwarder, TickOutcome, encode_batch};
pub use task::ForwarderTask;
