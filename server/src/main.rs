use actix_web::{middleware as actix_middleware, App, HttpServer};
use anyhow::Context;
use std::sync::Arc;
use std::time::Duration;
use tokio::time;

use console_gateway::app::GatewayState;
use console_gateway::config::GatewayConfig;
use console_gateway::handlers::ProxySettings;
use console_gateway::middleware::RateLimiter;
use console_gateway::session::{
    CookieSigner, MemorySessionStore, RedisSessionStore, SessionManager, SessionSettings,
    SessionStore,
};
use console_gateway::upstream::{HttpUpstream, TenantHeader, Upstream};

#[actix_web::main]
async fn main() -> anyhow::Result<()> {
    // Load .env file if it exists (for development)
    // Try loading from current directory first, then from server/ directory
    if dotenvy::dotenv().is_err() {
        dotenvy::from_filename("server/.env").ok();
    }

    env_logger::init_from_env(env_logger::Env::default().default_filter_or("info"));

    log::info!("Starting console gateway...");

    let config = GatewayConfig::load().context("Failed to load gateway configuration")?;
    log::info!("Upstream API: {}", config.upstream_base_url);

    let store: Arc<dyn SessionStore> = match &config.session_store_url {
        Some(url) => {
            log::info!("Connecting to session store at {}...", url);
            Arc::new(
                RedisSessionStore::connect(url)
                    .await
                    .context("Failed to connect to session store")?,
            )
        }
        None => {
            log::warn!("SESSION_STORE_URL not set; sessions are kept in process memory");
            Arc::new(MemorySessionStore::new())
        }
    };

    let signer = CookieSigner::new(config.session_secret.clone().into_bytes())
        .context("Invalid session secret")?;

    if !config.cookie_secure {
        log::warn!("Session cookie is not marked Secure (local development only)");
    }

    let session_manager = SessionManager::new(
        store,
        signer,
        SessionSettings {
            cookie_name: config.cookie_name.clone(),
            cookie_secure: config.cookie_secure,
            idle_timeout: config.session_idle_timeout(),
        },
    );
    log::info!(
        "Session idle timeout set to {} seconds",
        config.session_idle_timeout_secs
    );

    let upstream: Arc<dyn Upstream> =
        Arc::new(HttpUpstream::from_config(&config).context("Failed to build upstream client")?);

    let proxy_settings = ProxySettings {
        tenant: TenantHeader::new(&config.tenant_header, &config.tenant_id)
            .context("Invalid tenant header")?,
        forward_upstream_status: config.forward_upstream_status,
    };

    let rate_limiter = RateLimiter::new(config.login_max_attempts, config.login_window());

    // Spawn background cleanup tasks
    let session_manager_clone = session_manager.clone();
    tokio::spawn(async move {
        let mut interval = time::interval(Duration::from_secs(60));
        loop {
            interval.tick().await;
            let removed = session_manager_clone.purge_expired();
            if removed > 0 {
                log::info!("Background cleanup: removed {} expired sessions", removed);
            }
        }
    });

    let rate_limiter_clone = rate_limiter.clone();
    tokio::spawn(async move {
        let mut interval = time::interval(Duration::from_secs(300)); // Every 5 minutes
        loop {
            interval.tick().await;
            rate_limiter_clone.cleanup_old_entries();
            log::debug!(
                "Background cleanup: rate limiter tracking {} clients",
                rate_limiter_clone.tracked_clients()
            );
        }
    });

    let state = GatewayState {
        session_manager,
        upstream,
        proxy_settings,
        rate_limiter,
    };

    log::info!(
        "Starting HTTP server at {}:{}...",
        config.server_host,
        config.server_port
    );

    HttpServer::new(move || {
        let state = state.clone();
        App::new()
            .wrap(actix_middleware::Logger::default())
            .wrap(actix_middleware::Compress::default())
            .configure(|cfg| state.configure(cfg))
    })
    .bind((config.server_host.clone(), config.server_port))?
    .run()
    .await?;

    Ok(())
}
