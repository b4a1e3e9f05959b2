//! Configuration loading from disk, environment and command line.

use std::fs;
use std::path::Path;

use thiserror::Error;

use crate::config::schema::ProxyConfig;
use crate::config::validation::{validate_config, ValidationError};
use crate::error::RuleError;
use crate::routing::RawRuleSet;

/// Error type for configuration loading.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Parse error: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("Validation failed: {}", join_errors(.0))]
    Validation(Vec<ValidationError>),

    /// A `origin=target` argument without `=`.
    #[error("Rule `{0}` must have the form origin=TYPE:value")]
    RuleArgument(String),

    #[error(transparent)]
    Rules(#[from] RuleError),
}

fn join_errors(errors: &[ValidationError]) -> String {
    errors.iter().map(ToString::to_string).collect::<Vec<_>>().join(", ")
}

/// Load and validate configuration from a TOML file.
pub fn load_config(path: &Path) -> Result<ProxyConfig, ConfigError> {
    let content = fs::read_to_string(path)?;
    let config: ProxyConfig = toml::from_str(&content)?;

    validate_config(&config).map_err(ConfigError::Validation)?;

    Ok(config)
}

/// Split a `origin=target` argument at the first `=`.
pub fn parse_rule_arg(arg: &str) -> Result<(String, String), ConfigError> {
    let (origin, target) = arg
        .split_once('=')
        .ok_or_else(|| ConfigError::RuleArgument(arg.to_string()))?;
    Ok((origin.trim().to_string(), target.trim().to_string()))
}

/// Collect `RULE_1`, `RULE_2`, … from an environment lookup.
///
/// Scanning stops at the first missing index.
pub fn collect_env_rules<F>(lookup: F) -> Result<RawRuleSet, ConfigError>
where
    F: Fn(&str) -> Option<String>,
{
    let mut rules = RawRuleSet::new();
    for idx in 1.. {
        let Some(value) = lookup(&format!("RULE_{}", idx)) else {
            break;
        };
        let (origin, target) = parse_rule_arg(&value)?;
        rules.insert(origin, target);
    }
    Ok(rules)
}

/// Collect rules given as command-line arguments.
pub fn collect_arg_rules<S: AsRef<str>>(args: &[S]) -> Result<RawRuleSet, ConfigError> {
    let mut rules = RawRuleSet::new();
    for arg in args {
        let (origin, target) = parse_rule_arg(arg.as_ref())?;
        rules.insert(origin, target);
    }
    Ok(rules)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;
    use std::io::Write;

    #[test]
    fn splits_rule_argument() {
        assert_eq!(
            parse_rule_arg(" example.com = PROXY:localhost:3000 ").unwrap(),
            ("example.com".to_string(), "PROXY:localhost:3000".to_string())
        );
        // Only the first `=` separates.
        assert_eq!(
            parse_rule_arg("a.com=REDIRECT:b.com/?x=1").unwrap().1,
            "REDIRECT:b.com/?x=1"
        );
        assert!(matches!(parse_rule_arg("a.com"), Err(ConfigError::RuleArgument(_))));
    }

    #[test]
    fn env_rules_stop_at_gap() {
        let env: HashMap<String, String> = [
            ("RULE_1", "a.com=PROXY:a:1"),
            ("RULE_2", "b.com=PROXY:b:1"),
            ("RULE_4", "d.com=PROXY:d:1"),
        ]
        .into_iter()
        .map(|(k, v)| (k.to_string(), v.to_string()))
        .collect();

        let rules = collect_env_rules(|key| env.get(key).cloned()).unwrap();
        let origins: Vec<_> = rules.iter().map(|(o, _)| o).collect();
        assert_eq!(origins, vec!["a.com", "b.com"]);
    }

    #[test]
    fn later_arguments_overwrite() {
        let rules = collect_arg_rules(&["a.com=PROXY:one:1", "a.com=PROXY:two:1"]).unwrap();
        assert_eq!(rules.len(), 1);
        assert_eq!(rules.iter().next().unwrap().1, "PROXY:two:1");
    }

    #[test]
    fn loads_and_validates_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(
            file,
            "[listener]\nhttp_port = 8080\n\n[rules]\n\"a.com\" = \"PROXY:localhost:3000\""
        )
        .unwrap();
        let config = load_config(file.path()).unwrap();
        assert_eq!(config.listener.http_port, 8080);
        assert_eq!(config.rules.len(), 1);

        let mut bad = tempfile::NamedTempFile::new().unwrap();
        writeln!(bad, "[listener]\nhttp_port = 0").unwrap();
        assert!(matches!(load_config(bad.path()), Err(ConfigError::Validation(_))));
    }

    #[test]
    fn validation_error_lists_every_problem() {
        let err = ConfigError::Validation(vec![
            ValidationError {
                field: "listener.http_port",
                message: "must be non-zero".to_string(),
            },
            ValidationError {
                field: "proxy.reaction_timeout_ms",
                message: "must be non-zero".to_string(),
            },
        ]);
        assert_eq!(
            err.to_string(),
            "Validation failed: listener.http_port: must be non-zero, proxy.reaction_timeout_ms: must be non-zero"
        );

        let missing = load_config(Path::new("/nonexistent/proxy.toml")).unwrap_err();
        assert!(matches!(missing, ConfigError::Io(_)));
        assert!(std::error::Error::source(&missing).is_some());
    }

    #[test]
    fn file_rules_keep_definition_order() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(
            file,
            "[rules]\n\"z.com\" = \"PROXY:z:1\"\n\"a.com\" = \"PROXY:a:1\"\n\"m.com\" = \"PROXY:m:1\""
        )
        .unwrap();
        let config = load_config(file.path()).unwrap();
        let origins: Vec<_> = config.rules.iter().map(|(o, _)| o).collect();
        assert_eq!(origins, vec!["z.com", "a.com", "m.com"]);
    }
}
