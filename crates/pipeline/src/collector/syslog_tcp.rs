//! TCP Syslog 수집기
//!
//! 개행 구분(newline-delimited) 프레이밍으로 syslog 메시지를 수신합니다.
//! 각 TCP 연결은 별도의 tokio 태스크에서 처리되며, 동시 연결 수는
//! 세마포어로 제한됩니다. 초과 연결은 즉시 닫힙니다.

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use bytes::Bytes;
use tokio::io::{AsyncBufReadExt, AsyncReadExt, BufReader};
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::{Semaphore, mpsc};
use tokio::time::timeout;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use logship_core::config::SyslogConfig;
use logship_core::types::Transport;

use super::{RawLog, is_blank, trim_line_end};
use crate::error::LogPipelineError;

/// TCP syslog 연결 처리 설정
#[derive(Debug, Clone)]
pub struct SyslogTcpSettings {
    /// 최대 동시 연결 수
    pub max_connections: usize,
    /// 읽기 유휴 타임아웃
    pub idle_timeout: Duration,
    /// 최대 라인 길이 (바이트). 초과 시 연결을 닫습니다.
    pub max_line_length: usize,
}

impl Default for SyslogTcpSettings {
    fn default() -> Self {
        Self {
            max_connections: 256,
            idle_timeout: Duration::from_secs(300),
            max_line_length: 64 * 1024,
        }
    }
}

impl From<&SyslogConfig> for SyslogTcpSettings {
    fn from(config: &SyslogConfig) -> Self {
        Self {
            max_connections: config.tcp_max_connections,
            idle_timeout: Duration::from_secs(config.tcp_idle_timeout_secs),
            max_line_length: config.max_message_size,
        }
    }
}

/// TCP Syslog 수집기
pub struct SyslogTcpCollector {
    listener: TcpListener,
    local_addr: SocketAddr,
    settings: SyslogTcpSettings,
}

/// 한 줄 읽기 결과
enum LineRead {
    Line,
    Eof,
    TooLong,
}

impl SyslogTcpCollector {
    /// 리스너를 바인드합니다. 바인드 실패는 시작 에러입니다.
    pub async fn bind(
        bind_addr: &str,
        settings: SyslogTcpSettings,
    ) -> Result<Self, LogPipelineError> {
        let collector_err = |reason: String| LogPipelineError::Collector {
            source_type: Transport::SyslogTcp.to_string(),
            reason,
        };

        let listener = TcpListener::bind(bind_addr)
            .await
            .map_err(|e| collector_err(format!("failed to bind to {bind_addr}: {e}")))?;
        let local_addr = listener
            .local_addr()
            .map_err(|e| collector_err(format!("failed to read local address: {e}")))?;

        info!(addr = %local_addr, max_connections = settings.max_connections, "TCP syslog collector listening");
        Ok(Self {
            listener,
            local_addr,
            settings,
        })
    }

    /// 실제 바인드된 주소
    pub fn local_addr(&self) -> SocketAddr {
        self.local_addr
    }

    /// 취소될 때까지 연결을 수락합니다.
    pub async fn run(self, tx: mpsc::Sender<RawLog>, cancel: CancellationToken) {
        let semaphore = Arc::new(Semaphore::new(self.settings.max_connections));

        loop {
            tokio::select! {
                result = self.listener.accept() => {
                    let (stream, peer) = match result {
                        Ok(v) => v,
                        Err(e) => {
                            warn!(error = %e, "TCP accept error");
                            continue;
                        }
                    };

                    let Ok(permit) = Arc::clone(&semaphore).try_acquire_owned() else {
                        warn!(peer = %peer, "max connections reached, rejecting connection");
                        drop(stream);
                        continue;
                    };

                    debug!(peer = %peer, "accepted syslog connection");
                    let tx = tx.clone();
                    let settings = self.settings.clone();
                    let cancel = cancel.clone();
                    tokio::spawn(async move {
                        handle_connection(stream, peer, tx, settings, cancel).await;
                        drop(permit);
                    });
                }
                _ = cancel.cancelled() => break,
            }
        }

        info!(addr = %self.local_addr, "TCP syslog collector stopped");
    }
}

/// 최대 `max + 2`바이트(CRLF 포함)까지 한 줄을 읽습니다.
async fn read_bounded_line(
    reader: &mut BufReader<TcpStream>,
    buf: &mut Vec<u8>,
    max: usize,
) -> std::io::Result<LineRead> {
    buf.clear();
    let limit = u64::try_from(max).unwrap_or(u64::MAX).saturating_add(2);
    let n = (&mut *reader).take(limit).read_until(b'\n', buf).await?;
    if n == 0 {
        return Ok(LineRead::Eof);
    }
    if buf.last() != Some(&b'\n') && buf.len() > max {
        return Ok(LineRead::TooLong);
    }
    if trim_line_end(buf).len() > max {
        return Ok(LineRead::TooLong);
    }
    Ok(LineRead::Line)
}

/// 단일 TCP 연결을 처리합니다.
async fn handle_connection(
    stream: TcpStream,
    peer: SocketAddr,
    tx: mpsc::Sender<RawLog>,
    settings: SyslogTcpSettings,
    cancel: CancellationToken,
) {
    let peer_ip = peer.ip().to_string();
    let mut reader = BufReader::new(stream);
    let mut buf = Vec::with_capacity(1024);

    loop {
        let read = tokio::select! {
            result = timeout(settings.idle_timeout, read_bounded_line(&mut reader, &mut buf, settings.max_line_length)) => result,
            _ = cancel.cancelled() => break,
        };

        match read {
            Ok(Ok(LineRead::Line)) => {
                let line = trim_line_end(&buf);
                if is_blank(line) {
                    continue;
                }
                let raw = RawLog::new(Transport::SyslogTcp, peer_ip.clone(), Bytes::copy_from_slice(line));
                if tx.send(raw).await.is_err() {
                    break;
                }
            }
            Ok(Ok(LineRead::Eof)) => {
                debug!(peer = %peer, "connection closed by peer");
                break;
            }
            Ok(Ok(LineRead::TooLong)) => {
                warn!(
                    peer = %peer,
                    max = settings.max_line_length,
                    "line exceeds max message size, closing connection"
                );
                break;
            }
            Ok(Err(e)) => {
                warn!(peer = %peer, error = %e, "read error, closing connection");
                break;
            }
            Err(_) => {
                debug!(peer = %peer, "idle timeout, closing connection");
                break;
            }
        }
    }
}
