use serde::Deserialize;
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::error::{ProxyError, Result};

pub const MIN_SESSION_SECRET_LEN: usize = 32;
pub const MAX_UPSTREAM_TIMEOUT_SECS: u64 = 600;
pub const MAX_SESSION_IDLE_TIMEOUT_SECS: u64 = 30 * 24 * 60 * 60;

/// How the upstream client decides whether to trust the upstream certificate.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum TlsTrust {
    #[default]
    System,
    CustomCa,
    AcceptInvalid,
}

impl TlsTrust {
    fn parse(raw: &str) -> Result<Self> {
        match raw.trim().to_ascii_lowercase().as_str() {
            "system" => Ok(TlsTrust::System),
            "custom-ca" => Ok(TlsTrust::CustomCa),
            "accept-invalid" => Ok(TlsTrust::AcceptInvalid),
            other => Err(ProxyError::Config(format!(
                "Unknown TLS trust policy '{}'",
                other
            ))),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct GatewayConfig {
    pub server_host: String,
    pub server_port: u16,
    pub upstream_base_url: String,
    pub tenant_id: String,
    pub tenant_header: String,
    pub upstream_timeout_secs: u64,
    pub tls_trust: TlsTrust,
    pub ca_cert_path: Option<PathBuf>,
    pub session_store_url: Option<String>,
    pub session_secret: String,
    pub session_idle_timeout_secs: u64,
    pub cookie_name: String,
    pub cookie_secure: bool,
    pub forward_upstream_status: bool,
    pub login_max_attempts: usize,
    pub login_window_secs: u64,
}

impl Default for GatewayConfig {
    fn default() -> Self {
        Self {
            server_host: "0.0.0.0".to_string(),
            server_port: 8080,
            upstream_base_url: String::new(),
            tenant_id: String::new(),
            tenant_header: "Fineract-Platform-TenantId".to_string(),
            upstream_timeout_secs: 30,
            tls_trust: TlsTrust::System,
            ca_cert_path: None,
            session_store_url: None,
            session_secret: String::new(),
            session_idle_timeout_secs: 3600,
            cookie_name: "admin_session".to_string(),
            cookie_secure: true,
            forward_upstream_status: false,
            login_max_attempts: 10,
            login_window_secs: 60,
        }
    }
}

impl GatewayConfig {
    pub fn load_from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let content = fs::read_to_string(path)
            .map_err(|e| ProxyError::Config(format!("Failed to read config file: {}", e)))?;

        Self::from_toml(&content)
    }

    pub fn from_toml(content: &str) -> Result<Self> {
        toml::from_str(content)
            .map_err(|e| ProxyError::Config(format!("Failed to parse config file: {}", e)))
    }

    /// Loads the optional `CONFIG_PATH` file, applies environment overrides
    /// and validates the result.
    pub fn load() -> Result<Self> {
        let mut config = match std::env::var("CONFIG_PATH") {
            Ok(path) => Self::load_from_file(path)?,
            Err(_) => Self::default(),
        };

        config.apply_env_overrides()?;
        config.validate()?;
        Ok(config)
    }

    pub fn apply_env_overrides(&mut self) -> Result<()> {
        if let Some(v) = env_string("SERVER_HOST") {
            self.server_host = v;
        }
        if let Some(v) = env_parsed("SERVER_PORT")? {
            self.server_port = v;
        }
        if let Some(v) = env_string("UPSTREAM_BASE_URL") {
            self.upstream_base_url = v;
        }
        if let Some(v) = env_string("UPSTREAM_TENANT_ID") {
            self.tenant_id = v;
        }
        if let Some(v) = env_string("UPSTREAM_TENANT_HEADER") {
            self.tenant_header = v;
        }
        if let Some(v) = env_parsed("UPSTREAM_TIMEOUT_SECS")? {
            self.upstream_timeout_secs = v;
        }
        if let Some(v) = env_string("UPSTREAM_TLS_TRUST") {
            self.tls_trust = TlsTrust::parse(&v)?;
        }
        if let Some(v) = env_string("UPSTREAM_CA_CERT") {
            self.ca_cert_path = Some(PathBuf::from(v));
        }
        if let Some(v) = env_string("SESSION_STORE_URL") {
            self.session_store_url = Some(v);
        }
        if let Some(v) = env_string("SESSION_SECRET") {
            self.session_secret = v;
        }
        if let Some(v) = env_parsed("SESSION_IDLE_TIMEOUT_SECS")? {
            self.session_idle_timeout_secs = v;
        }
        if let Some(v) = env_string("SESSION_COOKIE_NAME") {
            self.cookie_name = v;
        }
        if let Some(v) = env_flag("SESSION_COOKIE_SECURE") {
            self.cookie_secure = v;
        }
        if let Some(v) = env_flag("FORWARD_UPSTREAM_STATUS") {
            self.forward_upstream_status = v;
        }
        if let Some(v) = env_parsed("LOGIN_MAX_ATTEMPTS")? {
            self.login_max_attempts = v;
        }
        if let Some(v) = env_parsed("LOGIN_WINDOW_SECS")? {
            self.login_window_secs = v;
        }
        Ok(())
    }

    pub fn validate(&self) -> Result<()> {
        if self.upstream_base_url.trim().is_empty() {
            return Err(ProxyError::Config("UPSTREAM_BASE_URL is required".to_string()));
        }
        if self.tenant_id.trim().is_empty() {
            return Err(ProxyError::Config("UPSTREAM_TENANT_ID is required".to_string()));
        }
        if self.session_secret.len() < MIN_SESSION_SECRET_LEN {
            return Err(ProxyError::Config(format!(
                "SESSION_SECRET must be at least {} bytes",
                MIN_SESSION_SECRET_LEN
            )));
        }
        if self.tls_trust == TlsTrust::CustomCa && self.ca_cert_path.is_none() {
            return Err(ProxyError::Config(
                "custom-ca trust policy requires UPSTREAM_CA_CERT".to_string(),
            ));
        }
        check_range(
            "UPSTREAM_TIMEOUT_SECS",
            self.upstream_timeout_secs,
            MAX_UPSTREAM_TIMEOUT_SECS,
        )?;
        check_range(
            "SESSION_IDLE_TIMEOUT_SECS",
            self.session_idle_timeout_secs,
            MAX_SESSION_IDLE_TIMEOUT_SECS,
        )?;
        check_range("LOGIN_WINDOW_SECS", self.login_window_secs, u64::MAX)?;
        if self.login_max_attempts == 0 {
            return Err(ProxyError::Config(
                "LOGIN_MAX_ATTEMPTS must be at least 1".to_string(),
            ));
        }
        Ok(())
    }

    pub fn upstream_timeout(&self) -> Duration {
        Duration::from_secs(self.upstream_timeout_secs)
    }

    pub fn session_idle_timeout(&self) -> Duration {
        Duration::from_secs(self.session_idle_timeout_secs)
    }

    pub fn login_window(&self) -> Duration {
        Duration::from_secs(self.login_window_secs)
    }
}

fn env_string(key: &str) -> Option<String> {
    std::env::var(key).ok().filter(|v| !v.trim().is_empty())
}

fn env_parsed<T: std::str::FromStr>(key: &str) -> Result<Option<T>> {
    match env_string(key) {
        Some(raw) => raw
            .trim()
            .parse()
            .map(Some)
            .map_err(|_| ProxyError::Config(format!("Invalid value for {}: '{}'", key, raw))),
        None => Ok(None),
    }
}

fn check_range(key: &str, value: u64, max: u64) -> Result<()> {
    if value == 0 || value > max {
        return Err(ProxyError::Config(format!(
            "{} must be between 1 and {} (got {})",
            key, max, value
        )));
    }
    Ok(())
}

fn env_flag(key: &str) -> Option<bool> {
    env_string(key).map(|v| matches!(v.to_ascii_lowercase().as_str(), "1" | "true" | "yes" | "on"))
}

#[cfg(test)]
mod tests {
    use super::*;

    const SECRET: &str = "0123456789abcdef0123456789abcdef";

    #[test]
    fn test_parse_valid_config() {
        let toml_content = format!(
            r#"
upstream_base_url = "https://localhost:8443/fineract-provider/api/v1"
tenant_id = "default"
tls_trust = "accept-invalid"
session_secret = "{SECRET}"
cookie_secure = false
        "#
        );

        let config = GatewayConfig::from_toml(&toml_content).unwrap();
        assert_eq!(config.tenant_id, "default");
        assert_eq!(config.tls_trust, TlsTrust::AcceptInvalid);
        assert!(!config.cookie_secure);
        assert_eq!(config.server_port, 8080);
        assert_eq!(config.session_idle_timeout(), Duration::from_secs(3600));
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_missing_required_fields() {
        let config = GatewayConfig::default();
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_short_secret_rejected() {
        let config = GatewayConfig {
            upstream_base_url: "https://upstream".to_string(),
            tenant_id: "default".to_string(),
            session_secret: "short".to_string(),
            ..GatewayConfig::default()
        };
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_custom_ca_requires_path() {
        let config = GatewayConfig {
            upstream_base_url: "https://upstream".to_string(),
            tenant_id: "default".to_string(),
            session_secret: SECRET.to_string(),
            tls_trust: TlsTrust::CustomCa,
            ..GatewayConfig::default()
        };
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_zero_and_oversized_durations_rejected() {
        let base = GatewayConfig {
            upstream_base_url: "https://upstream".to_string(),
            tenant_id: "default".to_string(),
            session_secret: SECRET.to_string(),
            ..GatewayConfig::default()
        };
        assert!(base.validate().is_ok());

        let zero_timeout = GatewayConfig {
            upstream_timeout_secs: 0,
            ..base.clone()
        };
        assert!(zero_timeout.validate().is_err());

        let zero_idle = GatewayConfig {
            session_idle_timeout_secs: 0,
            ..base.clone()
        };
        assert!(zero_idle.validate().is_err());

        let huge_idle = GatewayConfig {
            session_idle_timeout_secs: u64::MAX,
            ..base.clone()
        };
        assert!(huge_idle.validate().is_err());

        let no_attempts = GatewayConfig {
            login_max_attempts: 0,
            ..base.clone()
        };
        assert!(no_attempts.validate().is_err());

        let zero_window = GatewayConfig {
            login_window_secs: 0,
            ..base
        };
        assert!(zero_window.validate().is_err());
    }

    #[test]
    fn test_tls_trust_parse() {
        assert_eq!(TlsTrust::parse("System").unwrap(), TlsTrust::System);
        assert_eq!(TlsTrust::parse("custom-ca").unwrap(), TlsTrust::CustomCa);
        assert!(TlsTrust::parse("yolo").is_err());
    }
}
