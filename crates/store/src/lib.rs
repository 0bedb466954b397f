//! logship-store -- SQLite 기반 이벤트 저장소
//!
//! 이벤트, 규칙, 설정, drop 미리보기를 하나의 SQLite 파일(WAL)에 저장합니다.
//!
//! # 모듈 구성
//! - [`store`]: [`Store`] 핸들 (비동기 API)
//! - [`filter`]: 조회 필터 [`EventFilter`]
//! - [`retention`]: 보존 정리와 [`RetentionTask`]
//! - [`error`]: [`StoreError`]
//!
//! # 사용 예시
//! ```no_run
//! # async fn example() -> Result<(), logship_store::StoreError> {
//! use logship_core::types::{NewEvent, Transport};
//! use logship_store::{EventFilter, Store};
//!
//! let store = Store::open("/var/lib/logship/logship.db")?;
//! store.insert(NewEvent::from_raw(Transport::Http, "10.0.0.1", "hello")).await?;
//! let latest = store.query(EventFilter::default()).await?;
//! # Ok(())
//! # }
//! ```

pub mod error;
mod events;
pub mod filter;
pub mod retention;
mod rules;
mod schema;
pub mod store;

pub use error::StoreError;
pub use events::{DropRecord, PendingEvent, Stats};
pub use filter::{DEFAULT_QUERY_LIMIT, EventFilter, MAX_QUERY_LIMIT};
pub use retention::{RetentionPolicy, RetentionTask};
pub use store::Store;
