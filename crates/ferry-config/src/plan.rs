//! Build plan parsing.

use crate::{ConfigError, ConfigResult, params};
use ferry_core::plan::{BuildPlan, PlanParser};
use std::collections::HashMap;

/// Parse a `.drone.yml` document after injecting repository parameters.
pub fn parse_build(data: &[u8], params: &HashMap<String, String>) -> ConfigResult<BuildPlan> {
    let text = std::str::from_utf8(data)?;
    let text = params::inject(text, params);

    let plan: BuildPlan = serde_yaml::from_str(&text)?;

    if plan.image.trim().is_empty() {
        return Err(ConfigError::MissingField("image".to_string()));
    }

    if plan.script.is_empty() {
        return Err(ConfigError::MissingField("script".to_string()));
    }

    for entry in &plan.env {
        if entry.starts_with('=') {
            return Err(ConfigError::InvalidValue {
                field: "env".to_string(),
                message: format!("entry '{}' has no name", entry),
            });
        }
    }

    Ok(plan)
}

/// [`PlanParser`] for YAML build configurations.
#[derive(Debug, Clone, Copy, Default)]
pub struct YamlParser;

impl PlanParser for YamlParser {
    fn parse(
        &self,
        data: &[u8],
        params: &HashMap<String, String>,
    ) -> ferry_core::Result<BuildPlan> {
        parse_build(data, params).map_err(|e| ferry_core::Error::ConfigParse(e.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_simple_build() {
        let yaml = br#"
image: golang:1.22
env:
  - GOPATH=/go
script:
  - go build
  - go test ./...
services:
  - redis
"#;

        let plan = parse_build(yaml, &HashMap::new()).unwrap();
        assert_eq!(plan.image, "golang:1.22");
        assert_eq!(plan.script, vec!["go build", "go test ./..."]);
        assert_eq!(plan.services, vec!["redis"]);
        assert_eq!(plan.env, vec!["GOPATH=/go"]);
        assert!(plan.hosts.is_empty());
    }

    #[test]
    fn test_params_are_injected_before_parsing() {
        let yaml = b"image: node\nscript:\n  - npm publish --token $$NPM_TOKEN\n";
        let mut params = HashMap::new();
        params.insert("NPM_TOKEN".to_string(), "abc123".to_string());

        let plan = parse_build(yaml, &params).unwrap();
        assert_eq!(plan.script, vec!["npm publish --token abc123"]);
    }

    #[test]
    fn test_unknown_keys_are_ignored() {
        let yaml = b"image: rust\nscript:\n  - cargo test\nnotify:\n  email: [a@b.c]\n";
        assert!(parse_build(yaml, &HashMap::new()).is_ok());
    }

    #[test]
    fn test_missing_image() {
        let result = parse_build(b"script:\n  - make\n", &HashMap::new());
        assert!(matches!(result, Err(ConfigError::MissingField(f)) if f == "image"));
    }

    #[test]
    fn test_missing_script() {
        let result = parse_build(b"image: alpine\n", &HashMap::new());
        assert!(matches!(result, Err(ConfigError::MissingField(f)) if f == "script"));
    }

    #[test]
    fn test_invalid_yaml() {
        let result = parse_build(b"image: [unterminated\n", &HashMap::new());
        assert!(matches!(result, Err(ConfigError::Yaml(_))));
    }

    #[test]
    fn test_invalid_utf8() {
        let result = parse_build(&[0xff, 0xfe, 0x00], &HashMap::new());
        assert!(matches!(result, Err(ConfigError::Utf8(_))));
    }

    #[test]
    fn test_nameless_env_entry() {
        let yaml = b"image: alpine\nenv:\n  - =oops\nscript:\n  - make\n";
        let result = parse_build(yaml, &HashMap::new());
        assert!(matches!(result, Err(ConfigError::InvalidValue { .. })));
    }

    #[test]
    fn test_yaml_parser_reports_diagnostic() {
        let err = YamlParser
            .parse(b"image: alpine\n", &HashMap::new())
            .unwrap_err();
        match err {
            ferry_core::Error::ConfigParse(message) => {
                assert_eq!(message, "missing required field: script");
            }
            other => panic!("Expected ConfigParse, got {:?}", other),
        }
    }
}
