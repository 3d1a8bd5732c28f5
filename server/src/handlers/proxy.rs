use actix_web::{http::header::ContentType, web, HttpRequest, HttpResponse, ResponseError};
use reqwest::header::{HeaderValue, ACCEPT, AUTHORIZATION, CONTENT_TYPE};
use reqwest::Method;

use crate::{
    error::{ProxyError, Result},
    session::{Session, SessionManager},
    upstream::{TenantHeader, Upstream, UpstreamError, UpstreamRequest, UpstreamResponse},
};

pub const PROXY_PREFIX: &str = "/proxy";

#[derive(Debug, Clone)]
pub struct ProxySettings {
    pub tenant: TenantHeader,
    /// Relay the upstream status for non-401 failures instead of a flat 500.
    pub forward_upstream_status: bool,
}

fn is_mutating(method: &Method) -> bool {
    *method == Method::POST || *method == Method::PUT || *method == Method::PATCH
}

/// True when any path segment is `.` or `..`, literal or percent-encoded.
/// The upstream URL parser resolves those and would walk out of the base path.
fn has_dot_segment(path: &str) -> bool {
    path.split(['/', '\\']).any(|segment| {
        let decoded = segment.to_ascii_lowercase().replace("%2e", ".");
        decoded == "." || decoded == ".."
    })
}

/// Upstream path for an incoming `/proxy/...` request, query string included.
pub fn upstream_path(path: &str, query: &str) -> String {
    let tail = path.strip_prefix(PROXY_PREFIX).unwrap_or(path);
    let tail = if tail.is_empty() { "/" } else { tail };

    if query.is_empty() {
        tail.to_string()
    } else {
        format!("{}?{}", tail, query)
    }
}

pub fn build_upstream_request(
    req: &HttpRequest,
    body: &[u8],
    credential: &str,
    settings: &ProxySettings,
) -> Result<UpstreamRequest> {
    let method = Method::from_bytes(req.method().as_str().as_bytes())
        .map_err(|_| ProxyError::BadRequest("Unsupported method".to_string()))?;

    if has_dot_segment(req.path()) {
        return Err(ProxyError::BadRequest("Invalid proxy path".to_string()));
    }

    let mut request = UpstreamRequest::new(
        method,
        upstream_path(req.path(), req.query_string()),
    );

    let authorization = HeaderValue::from_str(&format!("Basic {}", credential))
        .map_err(|_| ProxyError::Internal("Stored credential is not a valid header".to_string()))?;
    request.headers.insert(AUTHORIZATION, authorization);
    request
        .headers
        .insert(ACCEPT, HeaderValue::from_static("application/json"));
    settings.tenant.apply(&mut request.headers);

    if is_mutating(&request.method) {
        let body = if body.is_empty() {
            b"{}".to_vec()
        } else {
            serde_json::from_slice::<serde::de::IgnoredAny>(body)
                .map_err(|_| ProxyError::BadRequest("Request body must be JSON".to_string()))?;
            body.to_vec()
        };
        request
            .headers
            .insert(CONTENT_TYPE, HeaderValue::from_static("application/json"));
        request.body = Some(body);
    }

    Ok(request)
}

fn relay(response: UpstreamResponse) -> HttpResponse {
    if response.is_json() {
        return HttpResponse::Ok()
            .content_type(ContentType::json())
            .body(response.body);
    }

    let content_type = response
        .content_type
        .unwrap_or_else(|| "text/plain; charset=utf-8".to_string());
    HttpResponse::Ok()
        .content_type(content_type)
        .body(response.body)
}

/// Forwards any request under `/proxy/` to the upstream API with the session's
/// credential injected.
pub async fn forward(
    req: HttpRequest,
    body: web::Bytes,
    session: web::ReqData<Session>,
    session_manager: web::Data<SessionManager>,
    upstream: web::Data<dyn Upstream>,
    settings: web::Data<ProxySettings>,
) -> Result<HttpResponse> {
    let session = session.into_inner();
    let credential = session.credential().ok_or(ProxyError::NotAuthenticated)?;

    let request = build_upstream_request(&req, &body, credential, &settings)?;
    let method = request.method.clone();
    let path = request.path.clone();

    match upstream.invoke(request).await {
        Ok(response) => {
            let mut http_response = relay(response);
            http_response
                .add_cookie(&session_manager.session_cookie(&session)?)
                .map_err(|e| ProxyError::Internal(format!("Failed to set cookie: {}", e)))?;
            Ok(http_response)
        }
        Err(UpstreamError::Status { status: 401 }) => {
            // The credential is dead; drop the session before answering.
            session_manager.destroy_session(&session.session_id).await?;
            log::warn!(
                "Upstream rejected credential on {} {}; session {} destroyed",
                method,
                path,
                session.session_id
            );

            let mut http_response = ProxyError::SessionExpired.error_response();
            http_response
                .add_cookie(&session_manager.removal_cookie())
                .map_err(|e| ProxyError::Internal(format!("Failed to clear cookie: {}", e)))?;
            Ok(http_response)
        }
        Err(err @ UpstreamError::Status { .. }) => Err(ProxyError::UpstreamFailure {
            status: err.status().unwrap_or(500),
            message: err.to_string(),
            forward_status: settings.forward_upstream_status,
        }),
        Err(UpstreamError::Transport(message)) => {
            log::error!("{} {} transport failure: {}", method, path, message);
            Err(ProxyError::TransportFailure)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use actix_web::test::TestRequest;

    fn settings() -> ProxySettings {
        ProxySettings {
            tenant: TenantHeader::new("Fineract-Platform-TenantId", "default").unwrap(),
            forward_upstream_status: false,
        }
    }

    #[test]
    fn test_upstream_path() {
        assert_eq!(upstream_path("/proxy/clients", ""), "/clients");
        assert_eq!(
            upstream_path("/proxy/loans/12", "associations=all&limit=5"),
            "/loans/12?associations=all&limit=5"
        );
        assert_eq!(upstream_path("/proxy", ""), "/");
    }

    #[test]
    fn test_dot_segments_detected() {
        assert!(has_dot_segment("/proxy/../admin"));
        assert!(has_dot_segment("/proxy/clients/./1"));
        assert!(has_dot_segment("/proxy/%2e%2e/admin"));
        assert!(has_dot_segment("/proxy/.%2E/admin"));
        assert!(has_dot_segment("/proxy/..\\admin"));
        assert!(!has_dot_segment("/proxy/clients/1"));
        assert!(!has_dot_segment("/proxy/files/report..pdf"));
        assert!(!has_dot_segment("/proxy/.well-known"));
    }

    #[test]
    fn test_dot_segment_path_rejected() {
        let req = TestRequest::get()
            .uri("/proxy/%2e%2e/%2e%2e/admin")
            .to_http_request();
        let result = build_upstream_request(&req, b"", "abc=", &settings());
        assert!(matches!(result, Err(ProxyError::BadRequest(_))));
    }

    #[test]
    fn test_get_has_no_body() {
        let req = TestRequest::get()
            .uri("/proxy/clients?limit=1")
            .to_http_request();

        let request = build_upstream_request(&req, b"", "abc=", &settings()).unwrap();
        assert_eq!(request.method, Method::GET);
        assert_eq!(request.path, "/clients?limit=1");
        assert!(request.body.is_none());
        assert!(request.headers.get(CONTENT_TYPE).is_none());
        assert_eq!(request.headers.get(AUTHORIZATION).unwrap(), "Basic abc=");
        assert_eq!(
            request.headers.get("fineract-platform-tenantid").unwrap(),
            "default"
        );
    }

    #[test]
    fn test_post_carries_body_verbatim() {
        let req = TestRequest::post().uri("/proxy/clients").to_http_request();
        let body = br#"{"firstname":"Ada","active":true}"#;

        let request = build_upstream_request(&req, body, "abc=", &settings()).unwrap();
        assert_eq!(request.body.as_deref(), Some(&body[..]));
        assert_eq!(request.headers.get(CONTENT_TYPE).unwrap(), "application/json");
    }

    #[test]
    fn test_empty_mutating_body_becomes_empty_object() {
        let req = TestRequest::put().uri("/proxy/clients/1").to_http_request();
        let request = build_upstream_request(&req, b"", "abc=", &settings()).unwrap();
        assert_eq!(request.body.as_deref(), Some(&b"{}"[..]));
    }

    #[test]
    fn test_delete_drops_body() {
        let req = TestRequest::delete().uri("/proxy/clients/1").to_http_request();
        let request = build_upstream_request(&req, b"{\"x\":1}", "abc=", &settings()).unwrap();
        assert!(request.body.is_none());
    }

    #[test]
    fn test_non_json_body_rejected() {
        let req = TestRequest::patch().uri("/proxy/clients/1").to_http_request();
        let result = build_upstream_request(&req, b"firstname=Ada", "abc=", &settings());
        assert!(matches!(result, Err(ProxyError::BadRequest(_))));
    }
}
