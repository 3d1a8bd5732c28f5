//! Login exchange against the upstream `authentication` endpoint.

use reqwest::header::{HeaderValue, ACCEPT, CONTENT_TYPE};
use reqwest::Method;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::fmt;

use crate::error::{ProxyError, Result};
use crate::upstream::{TenantHeader, Upstream, UpstreamError, UpstreamRequest};

pub const AUTHENTICATION_PATH: &str = "/authentication";

#[derive(Debug, Deserialize, Default)]
pub struct LoginRequest {
    #[serde(default)]
    pub username: Option<Value>,
    #[serde(default)]
    pub password: Option<Value>,
}

impl LoginRequest {
    /// Both fields must be non-empty strings.
    pub fn credentials(&self) -> Result<(&str, &str)> {
        let username = non_empty_str(self.username.as_ref());
        let password = non_empty_str(self.password.as_ref());

        match (username, password) {
            (Some(username), Some(password)) => Ok((username, password)),
            _ => Err(ProxyError::BadRequest(
                "Username and password are required".to_string(),
            )),
        }
    }
}

fn non_empty_str(value: Option<&Value>) -> Option<&str> {
    value
        .and_then(Value::as_str)
        .filter(|value| !value.is_empty())
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("upstream login response field `{field}` {problem}")]
pub struct ContractViolation {
    pub field: &'static str,
    pub problem: &'static str,
}

impl ContractViolation {
    fn new(field: &'static str, problem: &'static str) -> Self {
        Self { field, problem }
    }
}

/// The non-secret part of a successful login, safe to send to the browser.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct LoginProfile {
    pub username: String,
    pub roles: Vec<Map<String, Value>>,
    pub permissions: Vec<String>,
}

/// A validated upstream login response.
#[derive(Clone, PartialEq)]
pub struct UpstreamLogin {
    pub profile: LoginProfile,
    pub credential: String,
}

impl fmt::Debug for UpstreamLogin {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("UpstreamLogin")
            .field("profile", &self.profile)
            .field("credential", &"<redacted>")
            .finish()
    }
}

/// Checks the upstream login body field by field.
pub fn validate_login_response(body: &Value) -> std::result::Result<UpstreamLogin, ContractViolation> {
    let object = body
        .as_object()
        .ok_or_else(|| ContractViolation::new("<root>", "is not an object"))?;

    let username = required_string(object, "username")?;
    let credential = required_string(object, "base64EncodedAuthenticationKey")?;

    let roles = match object.get("roles") {
        Some(Value::Array(items)) => items
            .iter()
            .map(|item| match item {
                Value::Object(role) => Ok(role.clone()),
                _ => Err(ContractViolation::new("roles", "contains a non-object entry")),
            })
            .collect::<std::result::Result<Vec<_>, _>>()?,
        Some(_) => return Err(ContractViolation::new("roles", "is not an array")),
        None => return Err(ContractViolation::new("roles", "is missing")),
    };

    let permissions = match object.get("permissions") {
        Some(Value::Array(items)) => items
            .iter()
            .map(|item| match item {
                Value::String(permission) => Ok(permission.clone()),
                _ => Err(ContractViolation::new(
                    "permissions",
                    "contains a non-string entry",
                )),
            })
            .collect::<std::result::Result<Vec<_>, _>>()?,
        Some(_) => return Err(ContractViolation::new("permissions", "is not an array")),
        None => return Err(ContractViolation::new("permissions", "is missing")),
    };

    Ok(UpstreamLogin {
        profile: LoginProfile {
            username,
            roles,
            permissions,
        },
        credential,
    })
}

fn required_string(
    object: &Map<String, Value>,
    field: &'static str,
) -> std::result::Result<String, ContractViolation> {
    match object.get(field) {
        Some(Value::String(value)) if !value.is_empty() => Ok(value.clone()),
        Some(Value::String(_)) => Err(ContractViolation::new(field, "is empty")),
        Some(_) => Err(ContractViolation::new(field, "is not a string")),
        None => Err(ContractViolation::new(field, "is missing")),
    }
}

/// Sends the credentials upstream and validates what comes back.
pub async fn exchange_credentials(
    upstream: &dyn Upstream,
    tenant: &TenantHeader,
    username: &str,
    password: &str,
) -> Result<UpstreamLogin> {
    let body = serde_json::to_vec(&serde_json::json!({
        "username": username,
        "password": password,
    }))
    .map_err(|e| ProxyError::Internal(format!("Failed to encode login body: {}", e)))?;

    let mut request = UpstreamRequest::new(Method::POST, AUTHENTICATION_PATH);
    tenant.apply(&mut request.headers);
    request
        .headers
        .insert(CONTENT_TYPE, HeaderValue::from_static("application/json"));
    request
        .headers
        .insert(ACCEPT, HeaderValue::from_static("application/json"));
    request.body = Some(body);

    let response = match upstream.invoke(request).await {
        Ok(response) => response,
        Err(UpstreamError::Status { status }) => {
            log::warn!("Upstream rejected login for {} ({})", username, status);
            return Err(ProxyError::InvalidCredentials { status });
        }
        Err(UpstreamError::Transport(message)) => {
            log::error!("Upstream login unreachable: {}", message);
            return Err(ProxyError::TransportFailure);
        }
    };

    let body: Value = serde_json::from_slice(&response.body).map_err(|_| {
        log::error!("Upstream login response is not JSON");
        ContractViolation::new("<root>", "is not valid JSON")
    })?;

    let login = validate_login_response(&body).map_err(|violation| {
        log::error!("Upstream login contract violation: {}", violation);
        violation
    })?;

    Ok(login)
}
