//! 로그 수집 모듈 -- 전송 경로별 원시 로그 수집
//!
//! # 수집 소스
//! - [`SyslogUdpCollector`]: 데이터그램 하나가 메시지 하나
//! - [`SyslogTcpCollector`]: 연결당 태스크, 개행 구분 프레이밍
//! - [`FileTailCollector`]: 파일 끝에서부터 폴링 tail, 로테이션 감지
//!
//! # 아키텍처
//! 각 수집기는 `bind`/`new` 단계에서 소켓을 열고(실패 시 시작 에러),
//! 이후 자체 tokio 태스크에서 [`RawLog`]를 `mpsc::Sender<RawLog>`로 보냅니다.
//! 처리 태스크 하나가 채널을 순서대로 소비하므로 연결별/파일별 순서가 유지됩니다.

pub mod file;
pub mod syslog_tcp;
pub mod syslog_udp;

pub use file::{FileTailCollector, FileTailSettings};
pub use syslog_tcp::{SyslogTcpCollector, SyslogTcpSettings};
pub use syslog_udp::SyslogUdpCollector;

use bytes::Bytes;

use logship_core::types::{Transport, now_millis};

/// 수집된 원시 로그 데이터
///
/// 수집기가 생성하고, 처리 태스크가 정규화하는 중간 데이터 형식입니다.
#[derive(Debug, Clone)]
pub struct RawLog {
    /// 전송 경로
    pub transport: Transport,
    /// 송신자 식별자 (IP 또는 `file:<path>`)
    pub peer: String,
    /// 원시 로그 바이트 (줄 끝 CR/LF 제거됨)
    pub data: Bytes,
    /// 수집 시각 (Unix ms)
    pub received_at: i64,
}

impl RawLog {
    /// 현재 시각으로 새 RawLog를 생성합니다.
    pub fn new(transport: Transport, peer: impl Into<String>, data: impl Into<Bytes>) -> Self {
        Self {
            transport,
            peer: peer.into(),
            data: data.into(),
            received_at: now_millis(),
        }
    }
}

/// 줄 끝의 CR/LF를 제거합니다.
pub(crate) fn trim_line_end(mut line: &[u8]) -> &[u8] {
    while let [rest @ .., b'\r' | b'\n'] = line {
        line = rest;
    }
    line
}

/// 공백만으로 이루어진 줄인지 확인합니다.
pub(crate) fn is_blank(line: &[u8]) -> bool {
    line.iter().all(u8::is_ascii_whitespace)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn raw_log_creation() {
        let raw = RawLog::new(Transport::File, "file:/var/log/syslog", Bytes::from_static(b"test log"));
        assert_eq!(raw.peer, "file:/var/log/syslog");
        assert_eq!(raw.transport, Transport::File);
        assert!(raw.received_at > 0);
    }

    #[test]
    fn trims_any_mix_of_line_endings() {
        assert_eq!(trim_line_end(b"msg\r\n"), b"msg");
        assert_eq!(trim_line_end(b"msg\n\n"), b"msg");
        assert_eq!(trim_line_end(b"msg"), b"msg");
        assert_eq!(trim_line_end(b"\r\n"), b"");
    }

    #[test]
    fn blank_detection() {
        assert!(is_blank(b""));
        assert!(is_blank(b" \t "));
        assert!(!is_blank(b" x "));
    }
}
