//! 파일 기반 로그 수집기
//!
//! 설정된 파일을 주기적으로 폴링하며 새로 추가된 라인을 수집합니다.
//! `tail -F`와 유사하게 동작합니다.
//!
//! - 시작 시점에 존재하는 파일은 현재 끝에서부터 읽습니다.
//! - 이후에 나타난 파일(새 glob 매칭 포함)은 처음부터 읽습니다.
//! - inode 변경(로테이션) 또는 크기 축소(truncation) 시 처음부터 다시 읽습니다.
//! - 개행으로 끝나지 않은 마지막 부분 라인은 완성될 때까지 보관합니다.

use std::collections::BTreeMap;
use std::io::SeekFrom;
use std::path::{Path, PathBuf};
use std::time::Duration;

use bytes::Bytes;
use tokio::io::{AsyncReadExt, AsyncSeekExt};
use tokio::sync::mpsc;
use tokio::time::{MissedTickBehavior, interval};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use logship_core::config::FileTailConfig;
use logship_core::types::Transport;

use super::{RawLog, is_blank, trim_line_end};
use crate::error::LogPipelineError;

/// 폴링 1회당 파일별 최대 읽기 바이트
const MAX_READ_PER_POLL: u64 = 4 * 1024 * 1024;

/// 파일 수집기 설정
#[derive(Debug, Clone)]
pub struct FileTailSettings {
    /// 명시적 파일 경로 목록
    pub paths: Vec<PathBuf>,
    /// 마지막 경로 요소에 `*`/`?`를 쓰는 glob 패턴 (없으면 None)
    pub glob: Option<PathBuf>,
    /// 폴링 주기
    pub poll_interval: Duration,
    /// 최대 라인 길이 (바이트). 초과한 부분 라인은 강제로 잘라 전송합니다.
    pub max_line_length: usize,
}

impl Default for FileTailSettings {
    fn default() -> Self {
        Self {
            paths: Vec::new(),
            glob: None,
            poll_interval: Duration::from_millis(500),
            max_line_length: 64 * 1024,
        }
    }
}

impl FileTailSettings {
    /// core 설정에서 파일 수집 설정을 생성합니다.
    pub fn from_config(config: &FileTailConfig) -> Result<Self, LogPipelineError> {
        let glob = if config.glob.is_empty() {
            None
        } else {
            let glob = PathBuf::from(&config.glob);
            let parent_has_wildcard = glob
                .parent()
                .is_some_and(|p| p.to_string_lossy().contains(['*', '?']));
            if parent_has_wildcard {
                return Err(LogPipelineError::Config {
                    field: "file_tail.glob".to_owned(),
                    reason: "wildcards are only supported in the final path component".to_owned(),
                });
            }
            Some(glob)
        };

        Ok(Self {
            paths: config.paths.iter().map(PathBuf::from).collect(),
            glob,
            poll_interval: Duration::from_millis(config.poll_interval_ms.max(1)),
            max_line_length: config.max_line_length.max(1),
        })
    }
}

/// `*`(0개 이상)와 `?`(정확히 1개) 와일드카드 매칭
pub fn wildcard_match(pattern: &str, name: &str) -> bool {
    let p: Vec<char> = pattern.chars().collect();
    let n: Vec<char> = name.chars().collect();
    let (mut pi, mut ni) = (0, 0);
    let mut star: Option<(usize, usize)> = None;

    while ni < n.len() {
        if pi < p.len() && (p[pi] == '?' || p[pi] == n[ni]) {
            pi += 1;
            ni += 1;
        } else if pi < p.len() && p[pi] == '*' {
            star = Some((pi, ni));
            pi += 1;
        } else if let Some((sp, sn)) = star {
            pi = sp + 1;
            ni = sn + 1;
            star = Some((sp, sn + 1));
        } else {
            return false;
        }
    }
    p[pi..].iter().all(|c| *c == '*')
}

/// 파일별 추적 상태
#[derive(Debug, Default)]
struct FileState {
    /// 다음 읽기 위치
    offset: u64,
    /// 현재 파일의 inode
    inode: Option<u64>,
    /// 개행을 기다리는 부분 라인
    pending: Vec<u8>,
}

#[cfg(unix)]
fn inode_of(meta: &std::fs::Metadata) -> Option<u64> {
    use std::os::unix::fs::MetadataExt;
    Some(meta.ino())
}

#[cfg(not(unix))]
fn inode_of(_meta: &std::fs::Metadata) -> Option<u64> {
    None
}

/// 파일 기반 로그 수집기
pub struct FileTailCollector {
    settings: FileTailSettings,
    files: BTreeMap<PathBuf, FileState>,
}

impl FileTailCollector {
    /// 새 수집기를 생성하고 현재 존재하는 파일의 끝 위치를 기록합니다.
    pub async fn new(settings: FileTailSettings) -> Self {
        let mut collector = Self {
            settings,
            files: BTreeMap::new(),
        };
        for path in collector.discover().await {
            if let Ok(meta) = tokio::fs::metadata(&path).await {
                collector.files.insert(
                    path,
                    FileState {
                        offset: meta.len(),
                        inode: inode_of(&meta),
                        pending: Vec::new(),
                    },
                );
            }
        }
        info!(files = collector.files.len(), "file tail collector initialized");
        collector
    }

    /// 추적 중인 파일 수
    pub fn tracked_files(&self) -> usize {
        self.files.len()
    }

    /// 감시 대상 경로 목록 (명시적 경로 + glob 매칭)
    async fn discover(&self) -> Vec<PathBuf> {
        let mut targets = self.settings.paths.clone();
        let Some(glob) = &self.settings.glob else {
            return targets;
        };

        let dir = glob
            .parent()
            .filter(|p| !p.as_os_str().is_empty())
            .unwrap_or_else(|| Path::new("."));
        let Some(pattern) = glob.file_name().map(|n| n.to_string_lossy().into_owned()) else {
            return targets;
        };

        match tokio::fs::read_dir(dir).await {
            Ok(mut entries) => {
                while let Ok(Some(entry)) = entries.next_entry().await {
                    let name = entry.file_name();
                    let is_file = entry.file_type().await.is_ok_and(|t| t.is_file());
                    if is_file && wildcard_match(&pattern, &name.to_string_lossy()) {
                        let path = entry.path();
                        if !targets.contains(&path) {
                            targets.push(path);
                        }
                    }
                }
            }
            Err(e) => debug!(dir = %dir.display(), error = %e, "glob directory not readable"),
        }
        targets
    }

    /// 한 번 폴링하여 모든 대상 파일의 새 라인을 전송합니다.
    ///
    /// 채널이 닫혔으면 `Err`를 반환합니다.
    pub async fn poll_once(&mut self, tx: &mpsc::Sender<RawLog>) -> Result<(), LogPipelineError> {
        for path in self.discover().await {
            let lines = match self.read_new_lines(&path).await {
                Ok(lines) => lines,
                Err(e) => {
                    warn!(path = %path.display(), error = %e, "failed to read tailed file");
                    continue;
                }
            };

            let peer = format!("file:{}", path.display());
            for line in lines {
                tx.send(RawLog::new(Transport::File, peer.clone(), line))
                    .await
                    .map_err(|e| LogPipelineError::Channel(e.to_string()))?;
            }
        }
        Ok(())
    }

    /// 단일 파일에서 새로 완성된 라인을 읽습니다.
    async fn read_new_lines(&mut self, path: &Path) -> Result<Vec<Bytes>, LogPipelineError> {
        let meta = match tokio::fs::metadata(path).await {
            Ok(meta) => meta,
            // 로테이션 직후처럼 잠시 없는 파일은 다음 폴링에서 다시 확인
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => return Err(e.into()),
        };

        let inode = inode_of(&meta);
        let len = meta.len();
        let state = self.files.entry(path.to_path_buf()).or_insert_with(|| {
            debug!(path = %path.display(), "new file discovered, reading from start");
            FileState {
                inode,
                ..Default::default()
            }
        });

        let rotated = inode.is_some() && state.inode.is_some() && inode != state.inode;
        if rotated || len < state.offset {
            info!(path = %path.display(), rotated, "file rotated or truncated, reading from start");
            state.offset = 0;
            state.pending.clear();
        }
        state.inode = inode;

        if len <= state.offset {
            return Ok(Vec::new());
        }

        let to_read = (len - state.offset).min(MAX_READ_PER_POLL);
        let mut file = tokio::fs::File::open(path).await?;
        file.seek(SeekFrom::Start(state.offset)).await?;
        let mut chunk = Vec::with_capacity(usize::try_from(to_read).unwrap_or(0));
        let read = file.take(to_read).read_to_end(&mut chunk).await?;
        state.offset += read as u64;
        state.pending.extend_from_slice(&chunk);

        Ok(split_lines(&mut state.pending, self.settings.max_line_length))
    }

    /// 취소될 때까지 폴링합니다.
    pub async fn run(mut self, tx: mpsc::Sender<RawLog>, cancel: CancellationToken) {
        let mut ticker = interval(self.settings.poll_interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);

        loop {
            tokio::select! {
                _ = ticker.tick() => {
                    if self.poll_once(&tx).await.is_err() {
                        debug!("processing channel closed, stopping file tail collector");
                        break;
                    }
                }
                _ = cancel.cancelled() => break,
            }
        }

        info!("file tail collector stopped");
    }
}

/// 완성된 라인을 잘라내고 부분 라인은 `pending`에 남깁니다.
///
/// 개행 없이 `max_line_length`를 넘은 부분 라인은 강제로 잘라 냅니다.
fn split_lines(pending: &mut Vec<u8>, max_line_length: usize) -> Vec<Bytes> {
    let mut lines = Vec::new();
    let mut start = 0;

    while let Some(pos) = pending[start..].iter().position(|b| *b == b'\n') {
        let line = trim_line_end(&pending[start..start + pos]);
        if !is_blank(line) {
            lines.push(Bytes::copy_from_slice(line));
        }
        start += pos + 1;
    }
    pending.drain(..start);

    while pending.len() > max_line_length {
        let head: Vec<u8> = pending.drain(..max_line_length).collect();
        lines.push(Bytes::from(head));
    }
    lines
}
