#![allow(dead_code)]

use actix_web::cookie::Cookie;
use actix_web::dev::ServiceResponse;
use async_trait::async_trait;
use console_gateway::app::GatewayState;
use console_gateway::handlers::ProxySettings;
use console_gateway::middleware::RateLimiter;
use console_gateway::session::{CookieSigner, MemorySessionStore, SessionManager, SessionSettings};
use console_gateway::upstream::{
    TenantHeader, Upstream, UpstreamError, UpstreamRequest, UpstreamResponse,
};
use serde_json::{json, Value};
use std::collections::VecDeque;
use std::sync::{Arc, Mutex};
use std::time::Duration;

pub const COOKIE_NAME: &str = "admin_session";
pub const MIFOS_KEY: &str = "bWlmb3M6cGFzc3dvcmQ=";

type Scripted = Result<UpstreamResponse, UpstreamError>;

/// Upstream stand-in that replays scripted outcomes and records every request.
#[derive(Default)]
pub struct FakeUpstream {
    responses: Mutex<VecDeque<Scripted>>,
    requests: Mutex<Vec<UpstreamRequest>>,
}

impl FakeUpstream {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn push(&self, outcome: Scripted) {
        self.responses.lock().unwrap().push_back(outcome);
    }

    pub fn push_json(&self, body: Value) {
        self.push(Ok(json_response(body)));
    }

    pub fn push_status(&self, status: u16) {
        self.push(Err(UpstreamError::Status { status }));
    }

    pub fn requests(&self) -> Vec<UpstreamRequest> {
        self.requests.lock().unwrap().clone()
    }

    pub fn request_count(&self) -> usize {
        self.requests.lock().unwrap().len()
    }
}

#[async_trait]
impl Upstream for FakeUpstream {
    async fn invoke(&self, request: UpstreamRequest) -> Result<UpstreamResponse, UpstreamError> {
        self.requests.lock().unwrap().push(request);
        self.responses
            .lock()
            .unwrap()
            .pop_front()
            .unwrap_or_else(|| Err(UpstreamError::Transport("no scripted response".into())))
    }
}

pub fn json_response(body: Value) -> UpstreamResponse {
    UpstreamResponse {
        status: 200,
        content_type: Some("application/json".to_string()),
        body: serde_json::to_vec(&body).unwrap(),
    }
}

pub fn mifos_login() -> Value {
    json!({
        "username": "mifos",
        "userId": 1,
        "base64EncodedAuthenticationKey": MIFOS_KEY,
        "authenticated": true,
        "roles": [{"id": 1, "name": "Super user"}],
        "permissions": ["ALL_FUNCTIONS"]
    })
}

pub struct TestGateway {
    pub state: GatewayState,
    pub store: MemorySessionStore,
}

pub fn gateway(upstream: Arc<FakeUpstream>) -> TestGateway {
    gateway_with(upstream, false)
}

pub fn gateway_with(upstream: Arc<FakeUpstream>, forward_upstream_status: bool) -> TestGateway {
    let store = MemorySessionStore::new();
    let signer = CookieSigner::new(b"test-secret-test-secret-test-secret".to_vec()).unwrap();
    let session_manager = SessionManager::new(
        Arc::new(store.clone()),
        signer,
        SessionSettings {
            cookie_name: COOKIE_NAME.to_string(),
            cookie_secure: false,
            idle_timeout: Duration::from_secs(3600),
        },
    );

    let state = GatewayState {
        session_manager,
        upstream,
        proxy_settings: ProxySettings {
            tenant: TenantHeader::new("Fineract-Platform-TenantId", "default").unwrap(),
            forward_upstream_status,
        },
        rate_limiter: RateLimiter::new(5, Duration::from_secs(60)),
    };

    TestGateway { state, store }
}

pub fn session_cookie<B>(resp: &ServiceResponse<B>) -> Option<Cookie<'static>> {
    resp.response()
        .cookies()
        .find(|c| c.name() == COOKIE_NAME)
        .map(|c| c.into_owned())
}

/// Creates a session directly in the store, bypassing `/login`.
pub async fn seeded_cookie(gw: &TestGateway, credential: Option<&str>) -> Cookie<'static> {
    let manager = &gw.state.session_manager;
    let session = manager
        .establish(&actix_web::test::TestRequest::default().to_http_request())
        .await
        .unwrap();
    if let Some(credential) = credential {
        manager
            .set_credential(&session.session_id, credential)
            .await
            .unwrap();
    }
    manager.session_cookie(&session).unwrap()
}
