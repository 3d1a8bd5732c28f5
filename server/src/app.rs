use actix_web::{middleware::from_fn, web};
use std::sync::Arc;

use crate::handlers::{self, ProxySettings};
use crate::middleware::{rate_limit_middleware, require_session, RateLimiter};
use crate::session::SessionManager;
use crate::upstream::Upstream;

/// Everything the HTTP surface needs, cloned into each worker.
#[derive(Clone)]
pub struct GatewayState {
    pub session_manager: SessionManager,
    pub upstream: Arc<dyn Upstream>,
    pub proxy_settings: ProxySettings,
    pub rate_limiter: RateLimiter,
}

impl GatewayState {
    /// Registers shared state and routes on an `App` or scope.
    pub fn configure(self, cfg: &mut web::ServiceConfig) {
        cfg.app_data(web::Data::new(self.session_manager))
            .app_data(web::Data::from(self.upstream))
            .app_data(web::Data::new(self.proxy_settings))
            .app_data(web::Data::new(self.rate_limiter))
            // Public routes
            .service(handlers::health_check)
            .service(
                web::resource("/login")
                    .wrap(from_fn(rate_limit_middleware))
                    .route(web::post().to(handlers::login)),
            )
            .service(handlers::logout)
            // Session-protected upstream passthrough
            .service(
                web::scope(handlers::proxy::PROXY_PREFIX)
                    .wrap(from_fn(require_session))
                    .route("/{tail:.*}", web::route().to(handlers::forward)),
            );
    }
}
