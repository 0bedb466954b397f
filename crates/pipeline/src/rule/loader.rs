//! 규칙 시드 로더 -- YAML 규칙 파일을 디스크에서 로드합니다.
//!
//! 규칙 디렉토리 내의 `.yml`/`.yaml` 파일 하나에 규칙 하나를 담습니다.
//! 개별 파일 파싱 실패는 경고 로그를 남기고 건너뜁니다.
//! 파일 이름 순으로 처리하므로 같은 우선순위의 시드 규칙 ID 순서가 안정적입니다.

use std::collections::HashSet;
use std::path::{Path, PathBuf};

use logship_core::types::RuleSpec;

use crate::error::LogPipelineError;

/// 규칙 파일 최대 크기
const MAX_RULE_FILE_SIZE: u64 = 1024 * 1024; // 1MB
/// 디렉토리당 최대 규칙 수
const MAX_RULES_COUNT: usize = 10_000;

/// 규칙 파일 로더
pub struct RuleLoader;

impl RuleLoader {
    /// 디렉토리에서 모든 YAML 규칙 파일을 로드합니다.
    ///
    /// # Errors
    /// - 디렉토리를 읽을 수 없는 경우
    /// - 규칙 수가 `MAX_RULES_COUNT`를 초과하는 경우
    pub async fn load_directory(dir: impl AsRef<Path>) -> Result<Vec<RuleSpec>, LogPipelineError> {
        let dir = dir.as_ref();
        let dir_err = |reason: String| LogPipelineError::RuleLoad {
            path: dir.display().to_string(),
            reason,
        };

        let mut entries = tokio::fs::read_dir(dir)
            .await
            .map_err(|e| dir_err(format!("failed to read directory: {e}")))?;

        let mut paths: Vec<PathBuf> = Vec::new();
        while let Some(entry) = entries
            .next_entry()
            .await
            .map_err(|e| dir_err(format!("failed to read directory entry: {e}")))?
        {
            let path = entry.path();
            let is_yaml = path
                .extension()
                .is_some_and(|ext| ext == "yml" || ext == "yaml");
            if is_yaml {
                paths.push(path);
            }
        }
        paths.sort();

        if paths.len() > MAX_RULES_COUNT {
            return Err(dir_err(format!("too many rules: max {MAX_RULES_COUNT}")));
        }

        let mut specs = Vec::with_capacity(paths.len());
        let mut seen = HashSet::new();
        for path in paths {
            match Self::load_file(&path).await {
                Ok(spec) => {
                    if !seen.insert(spec.name.clone()) {
                        tracing::warn!(
                            rule = %spec.name,
                            path = %path.display(),
                            "duplicate rule name, skipping"
                        );
                        continue;
                    }
                    specs.push(spec);
                }
                Err(e) => {
                    tracing::warn!(
                        path = %path.display(),
                        error = %e,
                        "failed to load rule file, skipping"
                    );
                }
            }
        }

        tracing::info!(dir = %dir.display(), count = specs.len(), "loaded seed rules");
        Ok(specs)
    }

    /// 단일 YAML 파일에서 규칙을 로드합니다.
    pub async fn load_file(path: impl AsRef<Path>) -> Result<RuleSpec, LogPipelineError> {
        let path = path.as_ref();
        let file_err = |reason: String| LogPipelineError::RuleLoad {
            path: path.display().to_string(),
            reason,
        };

        let metadata = tokio::fs::metadata(path)
            .await
            .map_err(|e| file_err(format!("failed to read file metadata: {e}")))?;
        if metadata.len() > MAX_RULE_FILE_SIZE {
            return Err(file_err(format!(
                "file too large: {} bytes (max: {MAX_RULE_FILE_SIZE})",
                metadata.len()
            )));
        }

        let content = tokio::fs::read_to_string(path)
            .await
            .map_err(|e| file_err(format!("failed to read file: {e}")))?;

        Self::parse_yaml(&content, &path.display().to_string())
    }

    /// YAML 문자열을 규칙 명세로 파싱하고 구조를 검증합니다.
    pub fn parse_yaml(yaml_str: &str, source: &str) -> Result<RuleSpec, LogPipelineError> {
        let spec: RuleSpec = serde_yaml::from_str(yaml_str).map_err(|e| LogPipelineError::RuleLoad {
            path: source.to_owned(),
            reason: format!("YAML parse error: {e}"),
        })?;

        spec.validate().map_err(|reason| LogPipelineError::RuleLoad {
            path: source.to_owned(),
            reason,
        })?;

        Ok(spec)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use logship_core::types::{Action, PredicateField, PredicateKind, Transport};

    #[test]
    fn parse_valid_yaml() {
        let yaml = r#"
name: drop-udp-debug
priority: 20
action: drop
source: syslog-udp
predicate:
  type: regex
  field: level
  expression: "^debug$"
"#;
        let spec = RuleLoader::parse_yaml(yaml, "debug.yml").unwrap();
        assert_eq!(spec.name, "drop-udp-debug");
        assert_eq!(spec.priority, 20);
        assert_eq!(spec.action, Action::Drop);
        assert_eq!(spec.source, Some(Transport::SyslogUdp));
        assert_eq!(spec.predicate.kind, PredicateKind::Regex);
        assert_eq!(spec.predicate.field, PredicateField::Level);
        assert!(spec.enabled);
    }

    #[test]
    fn allow_is_alias_for_keep() {
        let yaml = "name: k\naction: allow\npredicate:\n  type: substring\n  expression: login\n";
        let spec = RuleLoader::parse_yaml(yaml, "k.yml").unwrap();
        assert_eq!(spec.action, Action::Keep);
        assert_eq!(spec.priority, logship_core::types::DEFAULT_RULE_PRIORITY);
    }

    #[test]
    fn parse_invalid_yaml_returns_error() {
        let result = RuleLoader::parse_yaml("not: [valid: yaml: {{{", "bad.yml");
        assert!(matches!(result, Err(LogPipelineError::RuleLoad { .. })));
    }

    #[test]
    fn missing_predicate_is_rejected() {
        let result = RuleLoader::parse_yaml("name: x\naction: drop\n", "x.yml");
        assert!(result.is_err());
    }

    #[test]
    fn empty_expression_is_rejected() {
        let yaml = "name: x\naction: drop\npredicate:\n  type: substring\n  expression: \"\"\n";
        assert!(RuleLoader::parse_yaml(yaml, "x.yml").is_err());
    }

    #[tokio::test]
    async fn load_directory_dedupes_and_skips_non_yaml() {
        let dir = tempfile::tempdir().unwrap();
        let rule = "name: same\naction: drop\npredicate:\n  type: substring\n  expression: a\n";
        std::fs::write(dir.path().join("a.yml"), rule).unwrap();
        std::fs::write(dir.path().join("b.yaml"), rule).unwrap();
        std::fs::write(dir.path().join("notes.txt"), "ignored").unwrap();
        std::fs::write(dir.path().join("broken.yml"), ":::").unwrap();

        let specs = RuleLoader::load_directory(dir.path()).await.unwrap();
        assert_eq!(specs.len(), 1);
        assert_eq!(specs[0].name, "same");
    }

    #[tokio::test]
    async fn load_nonexistent_directory_returns_error() {
        let result = RuleLoader::load_directory("/nonexistent/path/rules").await;
        assert!(result.is_err());
    }
}
