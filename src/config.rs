//! Configuration loader and validator for the notebook client.
use reqwest::Url;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::Path;
use std::time::Duration;
use thiserror::Error;

/// Overrides `api.base_url` when set.
pub const ENV_API_URL: &str = "NOTEBOOK_API_URL";
/// Overrides `api.token` when set.
pub const ENV_API_TOKEN: &str = "NOTEBOOK_API_TOKEN";

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
    #[error("YAML parse error: {0}")]
    Parse(#[from] serde_yaml::Error),
    #[error("Invalid configuration: {0}")]
    Invalid(&'static str),
}

/// Root configuration struct mirroring the YAML schema.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Config {
    pub api: Api,
    #[serde(default)]
    pub autosave: Autosave,
}

/// Backend connection settings.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Api {
    pub base_url: String,
    #[serde(default)]
    pub token: Option<String>,
    #[serde(default = "default_request_timeout")]
    pub request_timeout_secs: u64,
    /// Creating a notebook from documents can take minutes on the backend.
    #[serde(default = "default_create_timeout")]
    pub create_timeout_secs: u64,
}

/// Page content autosave settings.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Autosave {
    pub debounce_ms: u64,
}

impl Default for Autosave {
    fn default() -> Self {
        Self { debounce_ms: 500 }
    }
}

fn default_request_timeout() -> u64 {
    30
}

fn default_create_timeout() -> u64 {
    180
}

impl Api {
    /// Bearer token, with blank strings treated as absent.
    pub fn bearer_token(&self) -> Option<&str> {
        self.token.as_deref().map(str::trim).filter(|t| !t.is_empty())
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs)
    }

    pub fn create_timeout(&self) -> Duration {
        Duration::from_secs(self.create_timeout_secs)
    }
}

impl Autosave {
    pub fn debounce(&self) -> Duration {
        Duration::from_millis(self.debounce_ms)
    }
}

impl Config {
    /// Apply `NOTEBOOK_API_URL` / `NOTEBOOK_API_TOKEN` on top of the file values.
    pub fn apply_env(&mut self) {
        self.apply_overrides(
            std::env::var(ENV_API_URL).ok(),
            std::env::var(ENV_API_TOKEN).ok(),
        );
    }

    fn apply_overrides(&mut self, base_url: Option<String>, token: Option<String>) {
        if let Some(url) = base_url.filter(|u| !u.trim().is_empty()) {
            self.api.base_url = url;
        }
        if let Some(token) = token {
            self.api.token = Some(token);
        }
    }
}

/// Load configuration from a YAML file, apply environment overrides and
/// validate it.
/// - If `path` is None, uses `config.yaml` in the current working directory.
pub fn load(path: Option<&Path>) -> Result<Config, ConfigError> {
    let path = path.unwrap_or_else(|| Path::new("config.yaml"));
    let content = fs::read_to_string(path)?;
    let mut cfg: Config = serde_yaml::from_str(&content)?;
    cfg.apply_env();
    validate(&cfg)?;
    Ok(cfg)
}

/// Validate a configuration instance.
pub fn validate(cfg: &Config) -> Result<(), ConfigError> {
    if cfg.api.base_url.trim().is_empty() {
        return Err(ConfigError::Invalid("api.base_url must be non-empty"));
    }
    match Url::parse(cfg.api.base_url.trim()) {
        Ok(url) if url.cannot_be_a_base() => {
            return Err(ConfigError::Invalid("api.base_url must be an http(s) URL"))
        }
        Ok(url) if url.scheme() != "http" && url.scheme() != "https" => {
            return Err(ConfigError::Invalid("api.base_url must be an http(s) URL"))
        }
        Ok(_) => {}
        Err(_) => return Err(ConfigError::Invalid("api.base_url is not a valid URL")),
    }
    if cfg.api.request_timeout_secs == 0 {
        return Err(ConfigError::Invalid("api.request_timeout_secs must be > 0"));
    }
    if cfg.api.create_timeout_secs == 0 {
        return Err(ConfigError::Invalid("api.create_timeout_secs must be > 0"));
    }
    if cfg.autosave.debounce_ms == 0 {
        return Err(ConfigError::Invalid("autosave.debounce_ms must be > 0"));
    }
    Ok(())
}

/// Example configuration file.
pub fn example() -> &'static str {
    r#"api:
  base_url: "http://localhost:8000"
  token: ""
  request_timeout_secs: 30
  create_timeout_secs: 180

autosave:
  debounce_ms: 500
"#
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn parse_example_ok() {
        let cfg: Config = serde_yaml::from_str(example()).unwrap();
        validate(&cfg).unwrap();
        assert_eq!(cfg.api.bearer_token(), None);
        assert_eq!(cfg.api.create_timeout(), Duration::from_secs(180));
        assert_eq!(cfg.autosave.debounce(), Duration::from_millis(500));
    }

    #[test]
    fn defaults_fill_optional_sections() {
        let cfg: Config = serde_yaml::from_str("api:\n  base_url: \"https://notes.example\"\n").unwrap();
        validate(&cfg).unwrap();
        assert_eq!(cfg.api.request_timeout_secs, 30);
        assert_eq!(cfg.api.create_timeout_secs, 180);
        assert_eq!(cfg.autosave.debounce_ms, 500);
    }

    #[test]
    fn invalid_base_url() {
        let mut cfg: Config = serde_yaml::from_str(example()).unwrap();
        cfg.api.base_url = "".into();
        let err = validate(&cfg).unwrap_err();
        match err {
            ConfigError::Invalid(msg) => assert!(msg.contains("api.base_url")),
            _ => panic!("wrong error"),
        }

        cfg.api.base_url = "not a url".into();
        assert!(matches!(validate(&cfg), Err(ConfigError::Invalid(_))));

        cfg.api.base_url = "ftp://files.example".into();
        assert!(matches!(validate(&cfg), Err(ConfigError::Invalid(_))));
    }

    #[test]
    fn invalid_timeouts() {
        let mut cfg: Config = serde_yaml::from_str(example()).unwrap();
        cfg.api.create_timeout_secs = 0;
        let err = validate(&cfg).unwrap_err();
        match err {
            ConfigError::Invalid(msg) => assert!(msg.contains("create_timeout")),
            _ => panic!("wrong error"),
        }

        let mut cfg: Config = serde_yaml::from_str(example()).unwrap();
        cfg.autosave.debounce_ms = 0;
        assert!(matches!(validate(&cfg), Err(ConfigError::Invalid(_))));
    }

    #[test]
    fn overrides_replace_file_values() {
        let mut cfg: Config = serde_yaml::from_str(example()).unwrap();
        cfg.apply_overrides(Some("https://api.example".into()), Some("secret".into()));
        assert_eq!(cfg.api.base_url, "https://api.example");
        assert_eq!(cfg.api.bearer_token(), Some("secret"));

        cfg.apply_overrides(Some("  ".into()), None);
        assert_eq!(cfg.api.base_url, "https://api.example");
    }

    #[test]
    fn load_from_file_ok() {
        let td = tempdir().unwrap();
        let p = td.path().join("config.yaml");
        fs::write(&p, "api:\n  base_url: \"http://localhost:9000\"\n  token: \"abc\"\n").unwrap();
        let cfg = load(Some(&p)).unwrap();
        assert!(!cfg.api.base_url.is_empty());
    }
}
