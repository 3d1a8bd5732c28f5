use actix_web::{get, web, HttpResponse};
use serde::Serialize;

use crate::{error::Result, session::SessionManager};

#[derive(Debug, Serialize)]
pub struct HealthCheckResponse {
    pub status: String,
    pub session_store: String,
}

#[get("/health")]
pub async fn health_check(session_manager: web::Data<SessionManager>) -> Result<HttpResponse> {
    let response = HealthCheckResponse {
        status: "healthy".to_string(),
        session_store: session_manager.store_backend().to_string(),
    };

    Ok(HttpResponse::Ok().json(response))
}
