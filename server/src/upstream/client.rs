use async_trait::async_trait;
use reqwest::{header, Client};
use std::fs;
use std::time::Duration;

use super::{Upstream, UpstreamError, UpstreamRequest, UpstreamResponse};
use crate::config::{GatewayConfig, TlsTrust};
use crate::error::{ProxyError, Result};

const CONNECT_TIMEOUT: Duration = Duration::from_secs(10);
const MAX_LOGGED_ERROR_BODY: usize = 512;

/// reqwest-backed upstream client with a pooled connection set.
pub struct HttpUpstream {
    http_client: Client,
    base_url: String,
}

impl HttpUpstream {
    pub fn from_config(config: &GatewayConfig) -> Result<Self> {
        let mut builder = Client::builder()
            .connect_timeout(CONNECT_TIMEOUT)
            .timeout(config.upstream_timeout())
            .pool_max_idle_per_host(16)
            .pool_idle_timeout(Duration::from_secs(90))
            .tcp_keepalive(Duration::from_secs(60))
            .user_agent(concat!("console-gateway/", env!("CARGO_PKG_VERSION")));

        match config.tls_trust {
            TlsTrust::System => {}
            TlsTrust::CustomCa => {
                let path = config.ca_cert_path.as_ref().ok_or_else(|| {
                    ProxyError::Config("custom-ca trust policy requires a CA path".to_string())
                })?;
                let pem = fs::read(path).map_err(|e| {
                    ProxyError::Config(format!("Failed to read CA certificate: {}", e))
                })?;
                let certificate = reqwest::Certificate::from_pem(&pem).map_err(|e| {
                    ProxyError::Config(format!("Failed to parse CA certificate: {}", e))
                })?;
                builder = builder.add_root_certificate(certificate);
                log::info!("Upstream TLS trusts additional CA {}", path.display());
            }
            TlsTrust::AcceptInvalid => {
                log::warn!("Upstream TLS certificate validation is DISABLED (development only)");
                builder = builder.danger_accept_invalid_certs(true);
            }
        }

        let http_client = builder
            .build()
            .map_err(|e| ProxyError::Config(format!("Failed to create HTTP client: {}", e)))?;

        Ok(Self {
            http_client,
            base_url: config.upstream_base_url.trim_end_matches('/').to_string(),
        })
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    pub fn url_for(&self, path: &str) -> String {
        join_url(&self.base_url, path)
    }
}

fn join_url(base_url: &str, path: &str) -> String {
    format!(
        "{}/{}",
        base_url.trim_end_matches('/'),
        path.trim_start_matches('/')
    )
}

fn transport_error(err: reqwest::Error) -> UpstreamError {
    if err.is_timeout() {
        UpstreamError::Transport("upstream request timed out".to_string())
    } else {
        UpstreamError::Transport(err.to_string())
    }
}

#[async_trait]
impl Upstream for HttpUpstream {
    async fn invoke(
        &self,
        request: UpstreamRequest,
    ) -> std::result::Result<UpstreamResponse, UpstreamError> {
        let url = self.url_for(&request.path);

        let mut builder = self
            .http_client
            .request(request.method.clone(), &url)
            .headers(request.headers);
        if let Some(body) = request.body {
            builder = builder.body(body);
        }

        let response = builder.send().await.map_err(|err| {
            log::error!("{} {} failed: {}", request.method, url, err);
            transport_error(err)
        })?;

        let status = response.status();
        if !status.is_success() {
            // Error bodies are logged for operators but never relayed.
            if log::log_enabled!(log::Level::Debug) {
                let body = response.text().await.unwrap_or_default();
                let shown: String = body.chars().take(MAX_LOGGED_ERROR_BODY).collect();
                log::debug!("{} {} -> {} body: {}", request.method, url, status, shown);
            }
            log::warn!("{} {} -> {}", request.method, url, status);
            return Err(UpstreamError::Status {
                status: status.as_u16(),
            });
        }

        let content_type = response
            .headers()
            .get(header::CONTENT_TYPE)
            .and_then(|value| value.to_str().ok())
            .map(str::to_string);

        let body = response.bytes().await.map_err(transport_error)?.to_vec();

        log::debug!("{} {} -> {} ({} bytes)", request.method, url, status, body.len());

        Ok(UpstreamResponse {
            status: status.as_u16(),
            content_type,
            body,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn test_config(base_url: &str) -> GatewayConfig {
        GatewayConfig {
            upstream_base_url: base_url.to_string(),
            tenant_id: "default".to_string(),
            session_secret: "0123456789abcdef0123456789abcdef".to_string(),
            ..GatewayConfig::default()
        }
    }

    #[test]
    fn test_join_url() {
        assert_eq!(
            join_url("https://host/api/v1/", "/clients?limit=10"),
            "https://host/api/v1/clients?limit=10"
        );
        assert_eq!(join_url("https://host/api/v1", "loans/1"), "https://host/api/v1/loans/1");
    }

    #[test]
    fn test_client_trims_base_url() {
        let upstream =
            HttpUpstream::from_config(&test_config("https://localhost:8443/api/v1/")).unwrap();
        assert_eq!(upstream.base_url(), "https://localhost:8443/api/v1");
        assert_eq!(
            upstream.url_for("/authentication"),
            "https://localhost:8443/api/v1/authentication"
        );
    }

    #[test]
    fn test_accept_invalid_builds() {
        let mut config = test_config("https://localhost:8443/api/v1");
        config.tls_trust = TlsTrust::AcceptInvalid;
        assert!(HttpUpstream::from_config(&config).is_ok());
    }

    #[test]
    fn test_custom_ca_missing_file() {
        let mut config = test_config("https://localhost:8443/api/v1");
        config.tls_trust = TlsTrust::CustomCa;
        config.ca_cert_path = Some("/nonexistent/ca.pem".into());
        assert!(HttpUpstream::from_config(&config).is_err());
    }

    #[actix_web::test]
    async fn test_unreachable_upstream_is_transport_error() {
        let upstream = HttpUpstream::from_config(&test_config("http://127.0.0.1:1")).unwrap();
        let result = upstream
            .invoke(UpstreamRequest::new(reqwest::Method::GET, "/clients"))
            .await;

        assert!(matches!(result, Err(UpstreamError::Transport(_))));
    }
}
