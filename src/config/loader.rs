//! Configuration loading from ~/.sbx-settings.json and the control fd.

use std::path::{Path, PathBuf};

use crate::config::schema::SandboxHostConfig;
use crate::error::{ConfigError, SandboxError};

const DEFAULT_SETTINGS_FILE: &str = ".sbx-settings.json";

/// Get the default settings file path.
pub fn default_settings_path() -> Option<PathBuf> {
    dirs::home_dir().map(|home| home.join(DEFAULT_SETTINGS_FILE))
}

/// Load configuration from a file path.
pub fn load_config(path: &Path) -> Result<SandboxHostConfig, SandboxError> {
    if !path.exists() {
        return Err(ConfigError::FileNotFound(path.display().to_string()).into());
    }

    let content = std::fs::read_to_string(path)
        .map_err(|e| ConfigError::ParseError(format!("failed to read config file: {e}")))?;

    parse_config(&content)
}

/// Load configuration from the default path, or the default (unrestricted)
/// config if the file does not exist.
pub fn load_default_config() -> Result<SandboxHostConfig, SandboxError> {
    match default_settings_path() {
        Some(path) if path.exists() => load_config(&path),
        _ => Ok(SandboxHostConfig::default()),
    }
}

/// Parse and validate configuration from a JSON string.
pub fn parse_config(json: &str) -> Result<SandboxHostConfig, SandboxError> {
    let config: SandboxHostConfig = serde_json::from_str(json)
        .map_err(|e| ConfigError::ParseError(format!("failed to parse config JSON: {e}")))?;

    config.validate()?;
    Ok(config)
}

/// Parse a config update line from the control fd (JSON lines protocol).
/// Returns None for empty lines, invalid JSON, or validation failures.
pub fn load_config_from_string(content: &str) -> Option<SandboxHostConfig> {
    let trimmed = content.trim();
    if trimmed.is_empty() {
        return None;
    }

    match parse_config(trimmed) {
        Ok(config) => Some(config),
        Err(e) => {
            tracing::debug!("Failed to parse config update: {}", e);
            None
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_minimal_config() {
        let config = parse_config("{}").unwrap();
        assert!(config.network.is_none());
        assert!(config.filesystem.is_none());
    }

    #[test]
    fn test_parse_full_config() {
        let json = r#"{
            "network": {
                "allowedDomains": ["github.com", "*.npmjs.org"],
                "deniedDomains": ["metadata.google.internal"],
                "unrestrictedNetwork": false
            },
            "filesystem": {
                "denyRead": ["/etc/passwd", "/home/**/.ssh"],
                "allowWrite": ["/tmp"],
                "denyWrite": ["/tmp/secret"]
            }
        }"#;

        let config = parse_config(json).unwrap();
        let network = config.network.unwrap();
        assert_eq!(network.allowed_domains.len(), 2);
        assert_eq!(network.denied_domains.len(), 1);
        assert_eq!(network.unrestricted_network, Some(false));

        let fs = config.filesystem.unwrap();
        assert_eq!(fs.deny_read.unwrap().len(), 2);
        assert_eq!(fs.allow_write.unwrap(), vec!["/tmp".to_string()]);
        assert_eq!(fs.deny_write, vec!["/tmp/secret".to_string()]);
    }

    #[test]
    fn test_empty_allowed_domains_survive_parsing() {
        // An explicit empty list is deny-all, not "no restriction", so the
        // parsed shape must preserve the present-but-empty block.
        let json = r#"{"network": {"allowedDomains": []}}"#;
        let config = parse_config(json).unwrap();
        let network = config.network.unwrap();
        assert!(network.allowed_domains.is_empty());
    }

    #[test]
    fn test_invalid_host_pattern_rejected() {
        let json = r#"{"network": {"allowedDomains": ["bad host"]}}"#;
        assert!(parse_config(json).is_err());
    }

    #[test]
    fn test_load_config_from_string() {
        let json = r#"{"network": {"allowedDomains": ["example.com"]}}"#;
        let config = load_config_from_string(json).unwrap();
        assert_eq!(
            config.network.unwrap().allowed_domains,
            vec!["example.com".to_string()]
        );

        assert!(load_config_from_string("").is_none());
        assert!(load_config_from_string("   ").is_none());
        assert!(load_config_from_string("not json").is_none());
        assert!(load_config_from_string(r#"{"filesystem": {"denyRead": [], "allowRead": []}}"#).is_none());
    }
}
