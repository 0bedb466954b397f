//! Syslog 파서 -- RFC 5424 우선, RFC 3164 fallback
//!
//! [RFC 5424](https://tools.ietf.org/html/rfc5424) 형식을 먼저 시도하고,
//! 버전 필드가 없으면 BSD syslog (RFC 3164) 형식으로 최선 노력 파싱합니다.
//!
//! # RFC 5424 메시지 형식
//! ```text
//! <PRI>VERSION TIMESTAMP HOSTNAME APP-NAME PROCID MSGID STRUCTURED-DATA MSG
//! ```
//!
//! 파싱 결과는 항상 [`ParseOutcome`]입니다. 파싱 실패는 전송 실패가 아니며,
//! 수집기는 `Unparsed`인 경우 원본 라인을 메시지로 저장합니다.
//!
//! # 사용 예시
//! ```
//! use logship_pipeline::parser::{ParseOutcome, SyslogParser};
//!
//! let parser = SyslogParser::new();
//! match parser.parse(b"<34>1 2024-01-15T12:00:00Z host sshd 1234 - - Failed password") {
//!     ParseOutcome::Parsed(record) => assert_eq!(record.app, "sshd"),
//!     ParseOutcome::Unparsed { .. } => unreachable!(),
//! }
//! ```

use chrono::{DateTime, Datelike, NaiveDateTime, Utc};

use crate::error::LogPipelineError;

/// RFC 5424에서 유효한 최대 PRI 값
/// facility 최댓값 23 * 8 + severity 최댓값 7 = 191
const MAX_SYSLOG_PRI: u8 = 191;

/// severity 번호(0-7)에 대응하는 이름
const SEVERITY_NAMES: [&str; 8] = [
    "emerg", "alert", "crit", "err", "warning", "notice", "info", "debug",
];

/// syslog severity 번호를 레벨 이름으로 변환합니다.
///
/// 범위를 벗어난 값은 `debug`로 취급합니다.
pub fn severity_name(severity: u8) -> &'static str {
    SEVERITY_NAMES
        .get(usize::from(severity))
        .copied()
        .unwrap_or("debug")
}

/// 구조화 파싱에 성공한 syslog 레코드
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SyslogRecord {
    /// HOSTNAME (없으면 빈 문자열)
    pub host: String,
    /// severity 이름 (`err`, `info` 등)
    pub level: String,
    /// APP-NAME 또는 RFC 3164 tag
    pub app: String,
    /// 메시지 본문
    pub message: String,
    /// 메시지에 기록된 시각 (Unix ms, 해석 불가하면 None)
    pub timestamp: Option<i64>,
    /// facility 번호
    pub facility: u8,
    /// severity 번호
    pub severity: u8,
    /// 부가 필드 (pid, msgid, `sd_{id}_{param}`)
    pub fields: Vec<(String, String)>,
}

/// 파싱 결과
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ParseOutcome {
    /// 구조화 파싱 성공
    Parsed(SyslogRecord),
    /// 구조화 파싱 실패 -- 원본 라인과 사유
    Unparsed {
        /// 공백이 정리된 원본 라인
        raw_line: String,
        /// 실패 사유
        reason: String,
    },
}

impl ParseOutcome {
    /// 파싱 성공 여부
    pub fn is_parsed(&self) -> bool {
        matches!(self, Self::Parsed(_))
    }
}

/// Syslog 파서
///
/// ## 지원 기능
/// - PRI 필드에서 facility/severity 디코딩
/// - RFC 3339 / BSD 타임스탬프 파싱
/// - Structured Data (SD) 추출
/// - NILVALUE (`-`) 처리
#[derive(Debug, Clone)]
pub struct SyslogParser {
    /// 최대 허용 입력 크기 (바이트)
    max_input_size: usize,
}

impl SyslogParser {
    /// 기본 설정으로 새 파서를 생성합니다.
    pub fn new() -> Self {
        Self {
            max_input_size: 64 * 1024, // 64KB
        }
    }

    /// 최대 입력 크기를 설정합니다.
    pub fn with_max_input_size(mut self, size: usize) -> Self {
        self.max_input_size = size;
        self
    }

    /// 원시 메시지를 파싱합니다. 어떤 입력에도 패닉하지 않습니다.
    pub fn parse(&self, raw: &[u8]) -> ParseOutcome {
        match self.parse_syslog(raw) {
            Ok(record) => ParseOutcome::Parsed(record),
            Err(e) => ParseOutcome::Unparsed {
                raw_line: String::from_utf8_lossy(raw).trim().to_owned(),
                reason: match e {
                    LogPipelineError::Parse { reason, .. } => reason,
                    other => other.to_string(),
                },
            },
        }
    }

    /// PRI 값에서 facility와 severity를 분리합니다.
    ///
    /// PRI = facility * 8 + severity
    fn decode_pri(pri: u8) -> (u8, u8) {
        let facility = pri / 8;
        let severity = pri % 8;
        (facility, severity)
    }

    fn parse_error(offset: usize, reason: impl Into<String>) -> LogPipelineError {
        LogPipelineError::Parse {
            format: "syslog".to_owned(),
            offset,
            reason: reason.into(),
        }
    }

    fn parse_syslog(&self, raw: &[u8]) -> Result<SyslogRecord, LogPipelineError> {
        if raw.len() > self.max_input_size {
            return Err(Self::parse_error(
                0,
                format!(
                    "input too large: {} bytes (max: {})",
                    raw.len(),
                    self.max_input_size
                ),
            ));
        }

        let input = String::from_utf8_lossy(raw);
        let input = input.trim();

        if input.is_empty() {
            return Err(Self::parse_error(0, "empty input"));
        }

        // PRI 파싱: <NNN>
        if !input.starts_with('<') {
            return Err(Self::parse_error(0, "missing PRI field (expected '<')"));
        }

        let pri_end = input
            .find('>')
            .ok_or_else(|| Self::parse_error(0, "unterminated PRI field"))?;

        let pri_str = &input[1..pri_end];
        let pri: u8 = pri_str
            .parse()
            .map_err(|_| Self::parse_error(1, format!("invalid PRI value: '{pri_str}'")))?;

        if pri > MAX_SYSLOG_PRI {
            return Err(Self::parse_error(
                1,
                format!("PRI value {pri} out of valid range (0-{MAX_SYSLOG_PRI})"),
            ));
        }

        let (facility, severity) = Self::decode_pri(pri);
        let remainder = &input[pri_end + 1..];

        let body = if let Some(body) = remainder.strip_prefix("1 ") {
            Self::parse_rfc5424_body(body)?
        } else {
            Self::parse_rfc3164_body(remainder)
        };

        Ok(SyslogRecord {
            host: body.host,
            level: severity_name(severity).to_owned(),
            app: body.app,
            message: body.message,
            timestamp: body.timestamp,
            facility,
            severity,
            fields: body.fields,
        })
    }

    /// RFC 5424 메시지 본문을 파싱합니다.
    ///
    /// 형식: `TIMESTAMP HOSTNAME APP-NAME PROCID MSGID STRUCTURED-DATA MSG`
    fn parse_rfc5424_body(body: &str) -> Result<Body, LogPipelineError> {
        let parts: Vec<&str> = body.splitn(6, ' ').collect();

        if parts.len() < 6 {
            return Err(Self::parse_error(
                0,
                format!(
                    "RFC 5424 requires at least 6 fields after version, got {}",
                    parts.len()
                ),
            ));
        }

        let timestamp_str = Self::nilvalue_to_empty(parts[0]);
        let timestamp = if timestamp_str.is_empty() {
            None
        } else {
            Some(Self::parse_rfc3339(timestamp_str)?)
        };

        let host = Self::nilvalue_to_empty(parts[1]).to_owned();
        let app = Self::nilvalue_to_empty(parts[2]).to_owned();
        let proc_id = Self::nilvalue_to_empty(parts[3]);
        let msg_id = Self::nilvalue_to_empty(parts[4]);

        let mut fields = Vec::new();
        if !proc_id.is_empty() {
            fields.push(("pid".to_owned(), proc_id.to_owned()));
        }
        if !msg_id.is_empty() {
            fields.push(("msgid".to_owned(), msg_id.to_owned()));
        }

        let sd_and_msg = parts[5];
        let (message, sd_fields) = if sd_and_msg.starts_with('[') {
            let (sd_part, msg_part) = Self::split_sd_and_message(sd_and_msg);
            (msg_part.to_owned(), Self::parse_structured_data(sd_part)?)
        } else if let Some(msg) = sd_and_msg.strip_prefix("- ") {
            (msg.to_owned(), Vec::new())
        } else if sd_and_msg == "-" {
            (String::new(), Vec::new())
        } else {
            (sd_and_msg.to_owned(), Vec::new())
        };

        fields.extend(sd_fields);

        Ok(Body {
            timestamp,
            host,
            app,
            message,
            fields,
        })
    }

    /// RFC 3164 (BSD syslog) 메시지 본문을 최선 노력으로 파싱합니다.
    ///
    /// 형식: `MMM DD HH:MM:SS hostname tag: message`
    fn parse_rfc3164_body(body: &str) -> Body {
        let Some((month, day, time, remainder)) = Self::split_bsd_header(body) else {
            return Body::message_only(body);
        };

        let timestamp_str = format!("{month} {day} {time}");
        let Ok(timestamp) = Self::parse_bsd_timestamp(&timestamp_str) else {
            // 타임스탬프가 없으면 본문 전체가 메시지
            return Body::message_only(body);
        };

        let Some((host, tag_and_msg)) = remainder.split_once(' ') else {
            return Body {
                timestamp: Some(timestamp),
                ..Body::message_only(remainder)
            };
        };

        let (app, message, fields) = match tag_and_msg.split_once(':') {
            Some((tag, msg)) => {
                let (app, pid) = Self::split_tag_pid(tag);
                let fields = pid
                    .map(|p| vec![("pid".to_owned(), p.to_owned())])
                    .unwrap_or_default();
                (app.to_owned(), msg.trim_start().to_owned(), fields)
            }
            None => (String::new(), tag_and_msg.to_owned(), Vec::new()),
        };

        Body {
            timestamp: Some(timestamp),
            host: host.to_owned(),
            app,
            message,
            fields,
        }
    }

    /// `MMM DD HH:MM:SS rest`를 분리합니다.
    ///
    /// 한 자리 일자는 공백으로 채워지므로 (`Oct  5`) 월 뒤의 연속 공백을 허용합니다.
    fn split_bsd_header(body: &str) -> Option<(&str, &str, &str, &str)> {
        let (month, rest) = body.split_once(' ')?;
        let (day, rest) = rest.trim_start_matches(' ').split_once(' ')?;
        let (time, rest) = rest.split_once(' ')?;
        Some((month, day, time, rest))
    }

    /// `sshd[1234]` 형식 tag를 이름과 pid로 분리합니다.
    fn split_tag_pid(tag: &str) -> (&str, Option<&str>) {
        match tag.split_once('[') {
            Some((name, rest)) => (name, rest.strip_suffix(']')),
            None => (tag, None),
        }
    }

    /// NILVALUE (`-`)를 빈 문자열로 변환합니다.
    fn nilvalue_to_empty(value: &str) -> &str {
        if value == "-" { "" } else { value }
    }

    /// RFC 3339 타임스탬프를 Unix ms로 파싱합니다.
    fn parse_rfc3339(timestamp: &str) -> Result<i64, LogPipelineError> {
        DateTime::parse_from_rfc3339(timestamp)
            .map(|dt| dt.timestamp_millis())
            .map_err(|e| {
                Self::parse_error(0, format!("invalid RFC 3339 timestamp '{timestamp}': {e}"))
            })
    }

    /// BSD syslog 타임스탬프를 파싱합니다.
    ///
    /// 형식: `MMM DD HH:MM:SS` (예: `Jan 15 12:00:00`)
    /// 연도 정보가 없으므로 현재 연도를 가정합니다.
    fn parse_bsd_timestamp(timestamp: &str) -> Result<i64, LogPipelineError> {
        let current_year = Utc::now().year();
        let timestamp_with_year = format!("{current_year} {timestamp}");

        let dt = NaiveDateTime::parse_from_str(&timestamp_with_year, "%Y %b %d %H:%M:%S")
            .map_err(|e| {
                Self::parse_error(0, format!("invalid BSD timestamp '{timestamp}': {e}"))
            })?;

        Ok(DateTime::<Utc>::from_naive_utc_and_offset(dt, Utc).timestamp_millis())
    }

    /// Structured Data 부분과 메시지 부분을 분리합니다.
    ///
    /// SD는 하나 이상의 `[...]` 블록으로 구성되며, 그 이후가 메시지입니다.
    fn split_sd_and_message(input: &str) -> (&str, &str) {
        let mut depth = 0usize;
        let mut in_quote = false;
        let mut escaped = false;

        for (idx, ch) in input.char_indices() {
            if escaped {
                escaped = false;
                continue;
            }

            match ch {
                '\\' if in_quote => escaped = true,
                '"' => in_quote = !in_quote,
                '[' if !in_quote => depth += 1,
                ']' if !in_quote => {
                    depth = depth.saturating_sub(1);
                    if depth == 0 {
                        let end = idx + ch.len_utf8();
                        // 다음 블록이 바로 이어지면 계속
                        if input[end..].starts_with('[') {
                            continue;
                        }
                        return (&input[..end], input[end..].trim_start());
                    }
                }
                _ => {}
            }
        }

        // 닫히지 않은 SD가 있으면 전체를 SD로 간주
        (input, "")
    }

    /// RFC 5424 Structured Data를 파싱합니다.
    ///
    /// 형식: `[sd-id param1="value1" param2="value2"][sd-id2 ...]`
    /// 추출된 파라미터는 `sd_{id}_{param}` 형식의 키로 반환됩니다.
    fn parse_structured_data(sd: &str) -> Result<Vec<(String, String)>, LogPipelineError> {
        let mut fields = Vec::new();
        let mut chars = sd.chars().peekable();

        while chars.peek().is_some() {
            if chars.next() != Some('[') {
                break;
            }

            let mut sd_id = String::new();
            while let Some(&ch) = chars.peek() {
                if ch == ']' || ch == ' ' {
                    break;
                }
                sd_id.push(ch);
                chars.next();
            }

            if sd_id.is_empty() {
                return Err(Self::parse_error(0, "empty SD-ID in structured data"));
            }

            while let Some(&ch) = chars.peek() {
                if ch == ']' {
                    chars.next();
                    break;
                }

                if ch == ' ' {
                    chars.next();
                    continue;
                }

                let mut param_name = String::new();
                while let Some(&ch) = chars.peek() {
                    if ch == '=' {
                        break;
                    }
                    param_name.push(ch);
                    chars.next();
                }

                if chars.next() != Some('=') {
                    break;
                }

                if chars.next() != Some('"') {
                    return Err(Self::parse_error(0, "SD-PARAM value must be quoted"));
                }

                let mut param_value = String::new();
                let mut escaped = false;
                for ch in chars.by_ref() {
                    if escaped {
                        param_value.push(ch);
                        escaped = false;
                    } else if ch == '\\' {
                        escaped = true;
                    } else if ch == '"' {
                        break;
                    } else {
                        param_value.push(ch);
                    }
                }

                fields.push((format!("sd_{sd_id}_{param_name}"), param_value));
            }
        }

        Ok(fields)
    }
}

impl Default for SyslogParser {
    fn default() -> Self {
        Self::new()
    }
}

/// PRI 이후 본문 파싱 결과
struct Body {
    timestamp: Option<i64>,
    host: String,
    app: String,
    message: String,
    fields: Vec<(String, String)>,
}

impl Body {
    fn message_only(message: &str) -> Self {
        Self {
            timestamp: None,
            host: String::new(),
            app: String::new(),
            message: message.to_owned(),
            fields: Vec::new(),
        }
    }
}
