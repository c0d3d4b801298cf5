//! Configuration loading from disk.

use std::fs;
use std::path::Path;
use thiserror::Error;

use crate::config::schema::AppConfig;
use crate::config::validation::{validate_config, ValidationError};

/// Error type for configuration loading.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Parse error: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("Validation failed: {}", join_errors(.0))]
    Validation(Vec<ValidationError>),
}

fn join_errors(errors: &[ValidationError]) -> String {
    errors
        .iter()
        .map(ToString::to_string)
        .collect::<Vec<_>>()
        .join(", ")
}

/// Load and validate configuration from a TOML file.
pub fn load_config(path: &Path) -> Result<AppConfig, ConfigError> {
    let content = fs::read_to_string(path)?;
    let config = parse_config(&content)?;
    tracing::info!(path = %path.display(), app = %config.app.name, "Configuration loaded");
    Ok(config)
}

/// Parse and validate configuration from TOML text.
pub fn parse_config(content: &str) -> Result<AppConfig, ConfigError> {
    let config: AppConfig = toml::from_str(content)?;
    validate_config(&config).map_err(ConfigError::Validation)?;
    Ok(config)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    const SAMPLE: &str = r#"
[app]
name = "shop"
max_forward_hops = 4

[engines.session]
type = "simple"

[engines.session.options.Simple]
cookie_name = "shop.session"

[engines.serializer]
type = "json"
options = { pretty = true }

[mime.types]
webmanifest = "application/manifest+json"
"#;

    #[test]
    fn test_parse_sample() {
        let config = parse_config(SAMPLE).unwrap();
        assert_eq!(config.app.name, "shop");
        assert_eq!(config.app.max_forward_hops, 4);

        let session = config.engines.session.as_ref().unwrap();
        assert_eq!(session.kind, "simple");
        assert_eq!(session.scoped_options()["cookie_name"], "shop.session");

        let serializer = config.engines.serializer.as_ref().unwrap();
        assert_eq!(serializer.scoped_options()["pretty"], true);
        assert_eq!(
            config.mime.types.get("webmanifest").map(String::as_str),
            Some("application/manifest+json")
        );
    }

    #[test]
    fn test_parse_rejects_unknown_engine() {
        let err = parse_config("[engines.logger]\ntype = \"syslog\"\n").unwrap_err();
        assert!(matches!(err, ConfigError::Validation(ref errs) if errs.len() == 1));
        assert!(err.to_string().contains("syslog"));
    }

    #[test]
    fn test_load_from_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        file.write_all(SAMPLE.as_bytes()).unwrap();
        let config = load_config(file.path()).unwrap();
        assert_eq!(config.app.name, "shop");
    }

    #[test]
    fn test_load_missing_file() {
        let err = load_config(Path::new("/definitely/not/here.toml")).unwrap_err();
        assert!(matches!(err, ConfigError::Io(_)));
    }
}
