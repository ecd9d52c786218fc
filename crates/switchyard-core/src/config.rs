//! switchyard.toml configuration parser.

use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Problems found while validating a loaded configuration.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum ConfigError {
    #[error("missing required setting `{0}`")]
    Missing(&'static str),

    #[error("invalid setting `{key}`: {reason}")]
    Invalid { key: &'static str, reason: String },

    #[error("env var `{var}` referenced by `{key}` is not set")]
    UnsetEnv { key: &'static str, var: String },
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SwitchyardConfig {
    #[serde(default)]
    pub server: ServerConfig,
    #[serde(default)]
    pub workflows: WorkflowsConfig,
    #[serde(default)]
    pub notify: NotifyConfig,
    #[serde(default)]
    pub monitor: MonitorConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    pub port: u16,
    pub data_dir: PathBuf,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            port: 8080,
            data_dir: PathBuf::from("/var/lib/switchyard"),
        }
    }
}

/// Connection settings for the remote workflow management API.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct WorkflowsConfig {
    pub base_url: Option<String>,
    /// Client-credentials token endpoint. When unset, `api_token` is sent as-is.
    pub token_url: Option<String>,
    pub client_id: Option<String>,
    pub client_secret: Option<String>,
    pub api_token: Option<String>,
    pub timeout_secs: u64,
}

impl Default for WorkflowsConfig {
    fn default() -> Self {
        Self {
            base_url: None,
            token_url: None,
            client_id: None,
            client_secret: None,
            api_token: None,
            timeout_secs: 30,
        }
    }
}

impl WorkflowsConfig {
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }
}

/// Text-message gateway used for alerts.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct NotifyConfig {
    pub url: Option<String>,
    /// Fixed recipient (phone number or channel id).
    pub destination: Option<String>,
    pub auth_token: Option<String>,
}

/// Cadence and windows used by the cutover engine.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct MonitorConfig {
    pub interval_secs: u64,
    pub lookback_minutes: u32,
    pub dedup_window_minutes: u32,
    pub start_grace_minutes: u32,
}

impl Default for MonitorConfig {
    fn default() -> Self {
        Self {
            interval_secs: 300,
            lookback_minutes: 30,
            dedup_window_minutes: 30,
            start_grace_minutes: 10,
        }
    }
}

impl MonitorConfig {
    pub fn interval(&self) -> Duration {
        Duration::from_secs(self.interval_secs)
    }
}

impl SwitchyardConfig {
    pub fn from_file(path: &Path) -> anyhow::Result<Self> {
        let content = std::fs::read_to_string(path)?;
        let config: SwitchyardConfig = toml::from_str(&content)?;
        Ok(config)
    }

    pub fn to_toml_string(&self) -> anyhow::Result<String> {
        Ok(toml::to_string_pretty(self)?)
    }

    /// Check that every setting the daemon cannot run without is present.
    pub fn validate(&self) -> Result<(), ConfigError> {
        require_url("workflows.base_url", self.workflows.base_url.as_deref())?;
        require_url("notify.url", self.notify.url.as_deref())?;
        if blank(self.notify.destination.as_deref()) {
            return Err(ConfigError::Missing("notify.destination"));
        }

        if self.workflows.token_url.is_some()
            && (blank(self.workflows.client_id.as_deref())
                || blank(self.workflows.client_secret.as_deref()))
        {
            return Err(ConfigError::Invalid {
                key: "workflows.token_url",
                reason: "client_id and client_secret are required with token_url".to_string(),
            });
        }
        if self.workflows.timeout_secs == 0 {
            return Err(ConfigError::Invalid {
                key: "workflows.timeout_secs",
                reason: "must be greater than zero".to_string(),
            });
        }
        if self.monitor.interval_secs == 0 {
            return Err(ConfigError::Invalid {
                key: "monitor.interval_secs",
                reason: "must be greater than zero".to_string(),
            });
        }
        if self.monitor.lookback_minutes == 0 {
            return Err(ConfigError::Invalid {
                key: "monitor.lookback_minutes",
                reason: "must be greater than zero".to_string(),
            });
        }
        Ok(())
    }

    /// Replace `${VAR}` references in credential fields with environment values.
    pub fn resolve_env(&mut self) -> Result<(), ConfigError> {
        let fields: [(&'static str, &mut Option<String>); 4] = [
            ("workflows.client_secret", &mut self.workflows.client_secret),
            ("workflows.api_token", &mut self.workflows.api_token),
            ("workflows.client_id", &mut self.workflows.client_id),
            ("notify.auth_token", &mut self.notify.auth_token),
        ];
        for (key, field) in fields {
            let resolved = match field.as_deref() {
                Some(raw) => Some(resolve_env_vars(key, raw)?),
                None => None,
            };
            *field = resolved;
        }
        Ok(())
    }

    /// Scaffold a config with placeholder endpoints.
    pub fn scaffold() -> Self {
        Self {
            workflows: WorkflowsConfig {
                base_url: Some("https://workflows.example.internal/api".to_string()),
                api_token: Some("${WORKFLOWS_TOKEN}".to_string()),
                ..WorkflowsConfig::default()
            },
            notify: NotifyConfig {
                url: Some("https://sms.example.internal/messages".to_string()),
                destination: Some("+15550100".to_string()),
                auth_token: None,
            },
            ..Self::default()
        }
    }
}

fn blank(value: Option<&str>) -> bool {
    value.map(str::trim).is_none_or(str::is_empty)
}

fn resolve_env_vars(key: &'static str, input: &str) -> Result<String, ConfigError> {
    let mut result = String::with_capacity(input.len());
    let mut rest = input;
    while let Some(start) = rest.find("${") {
        result.push_str(&rest[..start]);
        let after = &rest[start + 2..];
        let Some(end) = after.find('}') else {
            return Err(ConfigError::Invalid {
                key,
                reason: "unclosed ${ reference".to_string(),
            });
        };
        let var = &after[..end];
        let value = std::env::var(var).map_err(|_| ConfigError::UnsetEnv {
            key,
            var: var.to_string(),
        })?;
        result.push_str(&value);
        rest = &after[end + 1..];
    }
    result.push_str(rest);
    Ok(result)
}

fn require_url(key: &'static str, value: Option<&str>) -> Result<(), ConfigError> {
    let Some(url) = value.map(str::trim).filter(|v| !v.is_empty()) else {
        return Err(ConfigError::Missing(key));
    };
    if !(url.starts_with("http://") || url.starts_with("https://")) {
        return Err(ConfigError::Invalid {
            key,
            reason: format!("expected an http(s) URL, got {url}"),
        });
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    const MINIMAL: &str = r#"
[workflows]
base_url = "https://wf.example/api"

[notify]
url = "https://sms.example/send"
destination = "+15550100"
"#;

    #[test]
    fn parse_minimal_applies_defaults() {
        let config: SwitchyardConfig = toml::from_str(MINIMAL).unwrap();
        assert_eq!(config.server.port, 8080);
        assert_eq!(config.monitor, MonitorConfig::default());
        assert_eq!(config.workflows.timeout_secs, 30);
        config.validate().unwrap();
    }

    #[test]
    fn empty_config_is_missing_base_url() {
        let config: SwitchyardConfig = toml::from_str("").unwrap();
        assert_eq!(
            config.validate(),
            Err(ConfigError::Missing("workflows.base_url"))
        );
    }

    #[test]
    fn missing_destination_is_fatal() {
        let mut config: SwitchyardConfig = toml::from_str(MINIMAL).unwrap();
        config.notify.destination = Some("   ".to_string());
        assert_eq!(
            config.validate(),
            Err(ConfigError::Missing("notify.destination"))
        );
    }

    #[test]
    fn token_url_requires_client_credentials() {
        let mut config: SwitchyardConfig = toml::from_str(MINIMAL).unwrap();
        config.workflows.token_url = Some("https://login.example/token".to_string());
        assert!(matches!(
            config.validate(),
            Err(ConfigError::Invalid { key: "workflows.token_url", .. })
        ));

        config.workflows.client_id = Some("id".to_string());
        config.workflows.client_secret = Some("secret".to_string());
        config.validate().unwrap();
    }

    #[test]
    fn rejects_non_http_url() {
        let mut config: SwitchyardConfig = toml::from_str(MINIMAL).unwrap();
        config.notify.url = Some("ftp://sms.example".to_string());
        assert!(matches!(
            config.validate(),
            Err(ConfigError::Invalid { key: "notify.url", .. })
        ));
    }

    #[test]
    fn rejects_zero_interval() {
        let mut config: SwitchyardConfig = toml::from_str(MINIMAL).unwrap();
        config.monitor.interval_secs = 0;
        assert!(config.validate().is_err());
    }

    #[test]
    fn scaffold_round_trips_through_toml() {
        let toml_str = SwitchyardConfig::scaffold().to_toml_string().unwrap();
        let back: SwitchyardConfig = toml::from_str(&toml_str).unwrap();
        back.validate().unwrap();
    }

    #[test]
    fn resolve_env_substitutes_tokens() {
        // SAFETY: test-local variable name, no other thread reads it.
        unsafe { std::env::set_var("SWITCHYARD_TEST_NOTIFY_TOKEN", "s3cret") };
        let mut config: SwitchyardConfig = toml::from_str(MINIMAL).unwrap();
        config.notify.auth_token = Some("Bearer ${SWITCHYARD_TEST_NOTIFY_TOKEN}".to_string());
        config.resolve_env().unwrap();
        assert_eq!(config.notify.auth_token.as_deref(), Some("Bearer s3cret"));
    }

    #[test]
    fn resolve_env_reports_unset_variable() {
        let mut config: SwitchyardConfig = toml::from_str(MINIMAL).unwrap();
        config.workflows.api_token = Some("${SWITCHYARD_TEST_DEFINITELY_UNSET}".to_string());
        assert_eq!(
            config.resolve_env(),
            Err(ConfigError::UnsetEnv {
                key: "workflows.api_token",
                var: "SWITCHYARD_TEST_DEFINITELY_UNSET".to_string(),
            })
        );
    }

    #[test]
    fn from_file_reads_disk() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("switchyard.toml");
        std::fs::write(&path, MINIMAL).unwrap();
        let config = SwitchyardConfig::from_file(&path).unwrap();
        assert_eq!(config.notify.destination.as_deref(), Some("+15550100"));
    }
}
