//! logship.toml 통합 설정 테스트
//!
//! - logship.toml.example 파싱 테스트
//! - 부분 설정 (일부 섹션만) 로딩 테스트
//! - 환경변수 우선순위 테스트
//! - 빈 파일 / 잘못된 형식 에러 테스트

use logship_core::config::{LogshipConfig, MatchPolicy, PolicyOrder};
use logship_core::error::{ConfigError, LogshipError};

// =============================================================================
// logship.toml.example 파싱 테스트
// =============================================================================

#[test]
fn example_config_parses_successfully() {
    let content = include_str!("../../../logship.toml.example");
    let config = LogshipConfig::parse(content).expect("example config should parse");

    assert_eq!(config.general.log_level, "info");
    assert_eq!(config.general.log_format, "json");
    assert_eq!(config.general.pid_file, "/var/run/logship/logship.pid");
}

#[test]
fn example_config_passes_validation() {
    let content = include_str!("../../../logship.toml.example");
    let config = LogshipConfig::parse(content).expect("should parse");
    config
        .validate()
        .expect("example config should pass validation");
}

#[test]
fn example_config_has_forward_destination() {
    let content = include_str!("../../../logship.toml.example");
    let config = LogshipConfig::parse(content).expect("should parse");

    assert_eq!(config.forward.interval_secs, 2);
    assert_eq!(config.forward.destinations.len(), 1);
    let dest = &config.forward.destinations[0];
    assert_eq!(dest.name, "primary");
    assert_eq!(dest.batch_size, 500);
    assert_eq!(
        dest.headers.get("Authorization").map(String::as_str),
        Some("Bearer change-me")
    );
}

#[test]
fn example_config_matches_code_defaults() {
    let content = include_str!("../../../logship.toml.example");
    let example = LogshipConfig::parse(content).expect("should parse");
    let defaults = LogshipConfig::default();

    assert_eq!(example.server.listen, defaults.server.listen);
    assert_eq!(example.server.max_body_bytes, defaults.server.max_body_bytes);
    assert_eq!(example.syslog.udp_bind, defaults.syslog.udp_bind);
    assert_eq!(
        example.syslog.tcp_max_connections,
        defaults.syslog.tcp_max_connections
    );
    assert_eq!(example.storage.max_rows, defaults.storage.max_rows);
    assert_eq!(example.storage.max_db_mb, defaults.storage.max_db_mb);
    assert_eq!(example.rules.match_policy, defaults.rules.match_policy);
    assert_eq!(example.ip_policy.order, defaults.ip_policy.order);
    assert_eq!(
        example.pipeline.channel_capacity,
        defaults.pipeline.channel_capacity
    );
}

// =============================================================================
// 부분 설정 테스트
// =============================================================================

#[test]
fn partial_config_general_only() {
    let toml = r#"
[general]
log_level = "debug"
log_format = "pretty"
"#;
    let config = LogshipConfig::parse(toml).expect("should parse");
    assert_eq!(config.general.log_level, "debug");
    assert_eq!(config.general.log_format, "pretty");
    // 나머지는 기본값
    assert_eq!(config.storage.data_dir, "/var/lib/logship");
    assert!(config.syslog.udp_enabled);
    config.validate().expect("should validate");
}

#[test]
fn partial_config_rules_and_policy() {
    let toml = r#"
[rules]
match_policy = "last"
seed_dir = "/etc/logship/rules"

[ip_policy]
allow = ["10.0.0.0/8"]
order = "allow_first"
"#;
    let config = LogshipConfig::parse(toml).expect("should parse");
    assert_eq!(config.rules.match_policy, MatchPolicy::Last);
    assert_eq!(config.rules.seed_dir, "/etc/logship/rules");
    assert_eq!(config.ip_policy.order, PolicyOrder::AllowFirst);
    assert!(config.ip_policy.deny.is_empty());
}

#[test]
fn partial_config_storage_section_only() {
    let toml = r#"
[storage]
db_path = "/tmp/logship-test.db"
max_rows = 100
"#;
    let config = LogshipConfig::parse(toml).expect("should parse");
    assert_eq!(config.storage.max_rows, 100);
    assert_eq!(config.storage.trim_interval_secs, 30);
    assert_eq!(
        config.storage.resolved_db_path(),
        std::path::PathBuf::from("/tmp/logship-test.db")
    );
}

// =============================================================================
// 에러 테스트
// =============================================================================

#[test]
fn empty_file_uses_all_defaults() {
    let config = LogshipConfig::parse("").expect("empty string should parse");
    assert_eq!(config.general.log_level, "info");
    config.validate().expect("defaults should validate");
}

#[test]
fn malformed_toml_returns_parse_error() {
    let err = LogshipConfig::parse("[server\nlisten = ").unwrap_err();
    assert!(matches!(
        err,
        LogshipError::Config(ConfigError::ParseFailed { .. })
    ));
}

#[test]
fn wrong_type_returns_parse_error() {
    let err = LogshipConfig::parse("[storage]\nmax_rows = \"many\"").unwrap_err();
    assert!(matches!(
        err,
        LogshipError::Config(ConfigError::ParseFailed { .. })
    ));
}

#[test]
fn invalid_value_reports_field() {
    let toml = r#"
[forward]
interval_secs = 0
"#;
    let config = LogshipConfig::parse(toml).expect("should parse");
    let err = config.validate().unwrap_err();
    match err {
        LogshipError::Config(ConfigError::InvalidValue { field, .. }) => {
            assert_eq!(field, "forward.interval_secs");
        }
        other => panic!("unexpected error: {other}"),
    }
}

// =============================================================================
// 환경변수 우선순위 테스트
// =============================================================================

#[test]
#[serial_test::serial]
fn env_override_takes_precedence_over_toml() {
    let toml = r#"
[general]
log_level = "info"
"#;

    let original = std::env::var("LOGSHIP_GENERAL_LOG_LEVEL").ok();
    // SAFETY: serial 테스트로 직렬화되어 환경변수 조작이 안전합니다.
    unsafe {
        std::env::set_var("LOGSHIP_GENERAL_LOG_LEVEL", "error");
    }

    let mut config = LogshipConfig::parse(toml).expect("should parse");
    config.apply_env_overrides();
    let result = config.general.log_level.clone();

    // SAFETY: 테스트 정리
    unsafe {
        match original {
            Some(val) => std::env::set_var("LOGSHIP_GENERAL_LOG_LEVEL", val),
            None => std::env::remove_var("LOGSHIP_GENERAL_LOG_LEVEL"),
        }
    }

    assert_eq!(result, "error");
}

#[test]
#[serial_test::serial]
fn env_override_csv_for_deny_list() {
    let original = std::env::var("LOGSHIP_IP_POLICY_DENY").ok();
    // SAFETY: serial 테스트로 직렬화되어 환경변수 조작이 안전합니다.
    unsafe {
        std::env::set_var("LOGSHIP_IP_POLICY_DENY", "10.0.0.0/8, 192.168.1.1");
    }

    let mut config = LogshipConfig::default();
    config.apply_env_overrides();
    let result = config.ip_policy.deny.clone();

    // SAFETY: 테스트 정리
    unsafe {
        match original {
            Some(val) => std::env::set_var("LOGSHIP_IP_POLICY_DENY", val),
            None => std::env::remove_var("LOGSHIP_IP_POLICY_DENY"),
        }
    }

    assert_eq!(result, vec!["10.0.0.0/8", "192.168.1.1"]);
}

#[test]
#[serial_test::serial]
fn env_override_numeric_field() {
    let original = std::env::var("LOGSHIP_STORAGE_MAX_ROWS").ok();
    // SAFETY: serial 테스트로 직렬화되어 환경변수 조작이 안전합니다.
    unsafe {
        std::env::set_var("LOGSHIP_STORAGE_MAX_ROWS", "1234");
    }

    let mut config = LogshipConfig::default();
    config.apply_env_overrides();
    let result = config.storage.max_rows;

    // SAFETY: 테스트 정리
    unsafe {
        match original {
            Some(val) => std::env::set_var("LOGSHIP_STORAGE_MAX_ROWS", val),
            None => std::env::remove_var("LOGSHIP_STORAGE_MAX_ROWS"),
        }
    }

    assert_eq!(result, 1234);
}

#[test]
#[serial_test::serial]
fn env_forward_url_replaces_destinations() {
    let toml = r#"
[[forward.destinations]]
name = "a"
url = "http://a.example.com"

[[forward.destinations]]
name = "b"
url = "http://b.example.com"
"#;
    let original = std::env::var("LOGSHIP_FORWARD_URL").ok();
    // SAFETY: serial 테스트로 직렬화되어 환경변수 조작이 안전합니다.
    unsafe {
        std::env::set_var("LOGSHIP_FORWARD_URL", "http://override.example.com/in");
    }

    let mut config = LogshipConfig::parse(toml).expect("should parse");
    config.apply_env_overrides();
    let destinations = config.forward.destinations.clone();

    // SAFETY: 테스트 정리
    unsafe {
        match original {
            Some(val) => std::env::set_var("LOGSHIP_FORWARD_URL", val),
            None => std::env::remove_var("LOGSHIP_FORWARD_URL"),
        }
    }

    assert_eq!(destinations.len(), 1);
    assert_eq!(destinations[0].url, "http://override.example.com/in");
    assert_eq!(destinations[0].batch_size, 500);
}

#[tokio::test]
#[serial_test::serial]
async fn load_from_file_applies_validation() {
    let dir = std::env::temp_dir().join(format!("logship-cfg-{}", std::process::id()));
    tokio::fs::create_dir_all(&dir).await.expect("mkdir");
    let path = dir.join("bad.toml");
    tokio::fs::write(&path, "[general]\nlog_format = \"xml\"\n")
        .await
        .expect("write");

    let result = LogshipConfig::load(&path).await;
    let _ = tokio::fs::remove_dir_all(&dir).await;

    let err = result.unwrap_err();
    assert!(err.to_string().contains("log_format"));
}
