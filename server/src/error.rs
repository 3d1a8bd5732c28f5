use actix_web::{error::ResponseError, http::StatusCode, HttpResponse};
use serde::Serialize;

use crate::auth::ContractViolation;
use crate::session::SessionError;

#[derive(Debug, thiserror::Error)]
pub enum ProxyError {
    #[error("{0}")]
    BadRequest(String),

    #[error("Not authenticated")]
    NotAuthenticated,

    #[error("Invalid credentials")]
    InvalidCredentials { status: u16 },

    #[error("Session expired")]
    SessionExpired,

    #[error("Unexpected response from upstream authentication")]
    UpstreamContractViolation(#[from] ContractViolation),

    #[error("{message}")]
    UpstreamFailure {
        status: u16,
        message: String,
        forward_status: bool,
    },

    #[error("Unknown error")]
    TransportFailure,

    #[error("Too many requests")]
    RateLimitExceeded,

    #[error("Session error: {0}")]
    Session(#[from] SessionError),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Internal server error")]
    Internal(String),
}

#[derive(Serialize)]
struct ErrorResponse {
    message: String,
}

impl ResponseError for ProxyError {
    fn status_code(&self) -> StatusCode {
        match self {
            ProxyError::BadRequest(_) => StatusCode::BAD_REQUEST,
            ProxyError::NotAuthenticated => StatusCode::UNAUTHORIZED,
            ProxyError::InvalidCredentials { status } => {
                StatusCode::from_u16(*status).unwrap_or(StatusCode::UNAUTHORIZED)
            }
            ProxyError::SessionExpired => StatusCode::UNAUTHORIZED,
            ProxyError::UpstreamContractViolation(_) => StatusCode::INTERNAL_SERVER_ERROR,
            ProxyError::UpstreamFailure {
                status,
                forward_status: true,
                ..
            } => StatusCode::from_u16(*status).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR),
            ProxyError::UpstreamFailure { .. } => StatusCode::INTERNAL_SERVER_ERROR,
            ProxyError::TransportFailure => StatusCode::INTERNAL_SERVER_ERROR,
            ProxyError::RateLimitExceeded => StatusCode::TOO_MANY_REQUESTS,
            ProxyError::Session(_) => StatusCode::INTERNAL_SERVER_ERROR,
            ProxyError::Config(_) => StatusCode::INTERNAL_SERVER_ERROR,
            ProxyError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    fn error_response(&self) -> HttpResponse {
        let status = self.status_code();

        // Internal details stay in the log.
        let message = match self {
            ProxyError::Session(_) | ProxyError::Config(_) | ProxyError::Internal(_) => {
                log::error!("{}", self);
                "Internal server error".to_string()
            }
            other => other.to_string(),
        };

        HttpResponse::build(status).json(ErrorResponse { message })
    }
}

pub type Result<T> = std::result::Result<T, ProxyError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn invalid_credentials_keeps_upstream_status() {
        let err = ProxyError::InvalidCredentials { status: 403 };
        assert_eq!(err.status_code(), StatusCode::FORBIDDEN);

        let err = ProxyError::InvalidCredentials { status: 42 };
        assert_eq!(err.status_code(), StatusCode::UNAUTHORIZED);
    }

    #[test]
    fn upstream_failure_is_flat_500_unless_forwarding() {
        let flat = ProxyError::UpstreamFailure {
            status: 404,
            message: "Request failed with status code 404".to_string(),
            forward_status: false,
        };
        assert_eq!(flat.status_code(), StatusCode::INTERNAL_SERVER_ERROR);

        let forwarded = ProxyError::UpstreamFailure {
            status: 404,
            message: "Request failed with status code 404".to_string(),
            forward_status: true,
        };
        assert_eq!(forwarded.status_code(), StatusCode::NOT_FOUND);
    }

    #[test]
    fn internal_errors_hide_details() {
        let err = ProxyError::Internal("redis exploded".to_string());
        let resp = err.error_response();
        assert_eq!(resp.status(), StatusCode::INTERNAL_SERVER_ERROR);
    }
}
