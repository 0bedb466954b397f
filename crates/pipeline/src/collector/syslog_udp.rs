//! UDP Syslog 수집기
//!
//! 설정된 주소에 UDP 소켓을 바인드하고 각 데이터그램을 하나의 메시지로 취급합니다.
//! 줄 끝 CR/LF는 제거하며 빈 데이터그램은 무시합니다.

use std::net::SocketAddr;

use bytes::Bytes;
use tokio::net::UdpSocket;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use logship_core::types::Transport;

use super::{RawLog, is_blank, trim_line_end};
use crate::error::LogPipelineError;

/// UDP Syslog 수집기
pub struct SyslogUdpCollector {
    socket: UdpSocket,
    local_addr: SocketAddr,
    buffer_size: usize,
}

impl SyslogUdpCollector {
    /// 소켓을 바인드합니다. 바인드 실패는 시작 에러입니다.
    pub async fn bind(bind_addr: &str, buffer_size: usize) -> Result<Self, LogPipelineError> {
        let collector_err = |reason: String| LogPipelineError::Collector {
            source_type: Transport::SyslogUdp.to_string(),
            reason,
        };

        let socket = UdpSocket::bind(bind_addr)
            .await
            .map_err(|e| collector_err(format!("failed to bind to {bind_addr}: {e}")))?;
        let local_addr = socket
            .local_addr()
            .map_err(|e| collector_err(format!("failed to read local address: {e}")))?;

        info!(addr = %local_addr, "UDP syslog collector listening");
        Ok(Self {
            socket,
            local_addr,
            buffer_size,
        })
    }

    /// 실제 바인드된 주소 (포트 0 바인드 시 유용)
    pub fn local_addr(&self) -> SocketAddr {
        self.local_addr
    }

    /// 취소될 때까지 데이터그램을 수신합니다.
    pub async fn run(self, tx: mpsc::Sender<RawLog>, cancel: CancellationToken) {
        let mut buf = vec![0u8; self.buffer_size];

        loop {
            let (len, peer) = tokio::select! {
                result = self.socket.recv_from(&mut buf) => match result {
                    Ok(v) => v,
                    Err(e) => {
                        // ICMP port unreachable 등 일시적 에러는 무시
                        warn!(addr = %self.local_addr, error = %e, "UDP receive error");
                        continue;
                    }
                },
                _ = cancel.cancelled() => break,
            };

            let line = trim_line_end(&buf[..len]);
            if is_blank(line) {
                continue;
            }

            let raw = RawLog::new(
                Transport::SyslogUdp,
                peer.ip().to_string(),
                Bytes::copy_from_slice(line),
            );
            if tx.send(raw).await.is_err() {
                debug!("processing channel closed, stopping UDP collector");
                break;
            }
        }

        info!(addr = %self.local_addr, "UDP syslog collector stopped");
    }
}
