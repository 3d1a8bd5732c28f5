use actix_web::{post, web, HttpRequest, HttpResponse};
use serde::Serialize;

use crate::{
    auth::{exchange_credentials, LoginRequest},
    error::{ProxyError, Result},
    session::SessionManager,
    upstream::Upstream,
};

use super::proxy::ProxySettings;

pub async fn login(
    req: HttpRequest,
    body: web::Bytes,
    session_manager: web::Data<SessionManager>,
    upstream: web::Data<dyn Upstream>,
    settings: web::Data<ProxySettings>,
) -> Result<HttpResponse> {
    let login_request: LoginRequest = serde_json::from_slice(&body)
        .map_err(|_| ProxyError::BadRequest("Username and password are required".to_string()))?;
    let (username, password) = login_request.credentials()?;

    log::info!("Login attempt for user: {}", username);

    let login = exchange_credentials(upstream.get_ref(), &settings.tenant, username, password).await?;

    // Only a validated upstream response gets a usable session, and always a new id.
    let session = session_manager.regenerate(&req).await?;
    session_manager
        .set_credential(&session.session_id, &login.credential)
        .await?;

    log::info!(
        "Successful login for user: {} (session: {})",
        login.profile.username,
        session.session_id
    );

    let cookie = session_manager.session_cookie(&session)?;

    Ok(HttpResponse::Ok().cookie(cookie).json(login.profile))
}

#[derive(Debug, Serialize)]
pub struct LogoutResponse {
    pub success: bool,
}

#[post("/logout")]
pub async fn logout(
    req: HttpRequest,
    session_manager: web::Data<SessionManager>,
) -> Result<HttpResponse> {
    let cookie = match session_manager.destroy(&req).await {
        Ok(cookie) => cookie,
        Err(err) => {
            log::error!("Failed to destroy session on logout: {}", err);
            session_manager.removal_cookie()
        }
    };

    log::info!("User logged out");

    Ok(HttpResponse::Ok()
        .cookie(cookie)
        .json(LogoutResponse { success: true }))
}
