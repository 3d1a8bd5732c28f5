use actix_web::{
    body::MessageBody,
    dev::{ServiceRequest, ServiceResponse},
    middleware::Next,
};
use dashmap::DashMap;
use std::net::{IpAddr, Ipv4Addr};
use std::sync::Arc;
use std::time::{Duration, Instant};

use crate::error::ProxyError;

const DEFAULT_MAX_REQUESTS: usize = 10;
const DEFAULT_WINDOW: Duration = Duration::from_secs(60);

/// Sliding-window limiter keyed by client IP, used in front of `/login`.
#[derive(Clone)]
pub struct RateLimiter {
    requests: Arc<DashMap<IpAddr, Vec<Instant>>>,
    max_requests: usize,
    window: Duration,
}

impl RateLimiter {
    pub fn new(max_requests: usize, window: Duration) -> Self {
        Self {
            requests: Arc::new(DashMap::new()),
            max_requests,
            window,
        }
    }

    pub fn check_rate_limit(&self, ip: IpAddr) -> bool {
        let now = Instant::now();

        let mut entry = self.requests.entry(ip).or_default();

        // Remove old entries
        entry.retain(|&timestamp| now.duration_since(timestamp) < self.window);

        if entry.len() >= self.max_requests {
            return false;
        }

        entry.push(now);
        true
    }

    pub fn cleanup_old_entries(&self) {
        let now = Instant::now();

        self.requests.retain(|_, timestamps| {
            timestamps.retain(|&timestamp| now.duration_since(timestamp) < self.window);
            !timestamps.is_empty()
        });
    }

    pub fn tracked_clients(&self) -> usize {
        self.requests.len()
    }
}

impl Default for RateLimiter {
    fn default() -> Self {
        Self::new(DEFAULT_MAX_REQUESTS, DEFAULT_WINDOW)
    }
}

pub async fn rate_limit_middleware(
    req: ServiceRequest,
    next: Next<impl MessageBody + 'static>,
) -> Result<ServiceResponse<impl MessageBody>, actix_web::Error> {
    // Requests without a peer address share one bucket.
    let ip = req
        .peer_addr()
        .map(|addr| addr.ip())
        .unwrap_or(IpAddr::V4(Ipv4Addr::UNSPECIFIED));

    let allowed = match req.app_data::<actix_web::web::Data<RateLimiter>>() {
        Some(rate_limiter) => rate_limiter.check_rate_limit(ip),
        None => {
            log::error!("Rate limiter not available");
            true
        }
    };

    if allowed {
        next.call(req).await.map(ServiceResponse::map_into_left_body)
    } else {
        log::warn!("Rate limit exceeded for IP: {}", ip);
        Ok(req
            .error_response(ProxyError::RateLimitExceeded)
            .map_into_right_body())
    }
}
