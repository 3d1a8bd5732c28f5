use actix_web::{
    body::MessageBody,
    dev::{ServiceRequest, ServiceResponse},
    middleware::Next,
    web, HttpMessage,
};

use crate::error::ProxyError;
use crate::session::{Session, SessionManager};

async fn authenticated_session(req: &ServiceRequest) -> Result<Session, ProxyError> {
    let session_manager = req
        .app_data::<web::Data<SessionManager>>()
        .cloned()
        .ok_or_else(|| ProxyError::Internal("Session manager not available".to_string()))?;

    // Resolving the session also renews its idle window.
    match session_manager.get(req.request()).await? {
        Some(session) if session.is_authenticated() => Ok(session),
        Some(session) => {
            log::debug!("Session {} has no upstream credential", session.session_id);
            Err(ProxyError::NotAuthenticated)
        }
        None => Err(ProxyError::NotAuthenticated),
    }
}

/// Rejects requests without an authenticated session and hands the resolved
/// [`Session`] to the handler via request extensions.
pub async fn require_session(
    req: ServiceRequest,
    next: Next<impl MessageBody + 'static>,
) -> Result<ServiceResponse<impl MessageBody>, actix_web::Error> {
    match authenticated_session(&req).await {
        Ok(session) => {
            req.extensions_mut().insert(session);
            next.call(req).await.map(ServiceResponse::map_into_left_body)
        }
        Err(err) => Ok(req.error_response(err).map_into_right_body()),
    }
}
