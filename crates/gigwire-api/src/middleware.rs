//! API middleware
//!
//! Rate limiting and security headers; the rest of the stack (tracing,
//! request ids, CORS, compression) comes from tower-http layers in
//! `create_router`.

use axum::{
    extract::{Request, State},
    http::HeaderMap,
    middleware::Next,
    response::{IntoResponse, Response},
};
use std::sync::Arc;

use crate::error::ApiError;
use crate::state::AppState;

/// Bucket for requests whose client cannot be identified
const UNKNOWN_CLIENT: &str = "unknown";

/// Per-IP rate limiting
pub async fn rate_limit_middleware(
    State(state): State<Arc<AppState>>,
    req: Request,
    next: Next,
) -> Result<Response, Response> {
    let key = client_key(req.headers(), &state.client_ip_headers);
    match state.limiter.check(&key).await {
        Ok(()) => Ok(next.run(req).await),
        Err(e) => {
            tracing::debug!(client = %key, "request rate limited");
            Err(ApiError::from(e).into_response())
        }
    }
}

/// Resolve the rate-limit key for a request.
///
/// Walks the configured proxy headers in trust order and takes the first
/// non-empty address; a forwarding chain lists the original client
/// first. Addresses are case-folded so one client cannot split its
/// budget across header spellings. Requests with none of the headers
/// share the unknown bucket.
fn client_key(headers: &HeaderMap, trusted_headers: &[String]) -> String {
    trusted_headers
        .iter()
        .filter_map(|name| headers.get(name.as_str()))
        .filter_map(|value| value.to_str().ok())
        .flat_map(|value| value.split(','))
        .map(str::trim)
        .find(|addr| !addr.is_empty())
        .map(|addr| addr.to_ascii_lowercase())
        .unwrap_or_else(|| UNKNOWN_CLIENT.to_string())
}

/// Security headers on every response
pub async fn security_headers_middleware(req: Request, next: Next) -> Response {
    let mut response = next.run(req).await;

    let headers = response.headers_mut();
    headers.insert("X-Frame-Options", "DENY".parse().unwrap());
    headers.insert("X-Content-Type-Options", "nosniff".parse().unwrap());
    headers.insert(
        "Referrer-Policy",
        "strict-origin-when-cross-origin".parse().unwrap(),
    );

    response
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::state::default_client_ip_headers;

    fn headers(pairs: &[(&str, &str)]) -> HeaderMap {
        let mut map = HeaderMap::new();
        for (name, value) in pairs {
            map.insert(
                axum::http::HeaderName::from_bytes(name.as_bytes()).unwrap(),
                value.parse().unwrap(),
            );
        }
        map
    }

    #[test]
    fn first_configured_header_wins() {
        let trusted = default_client_ip_headers();
        let map = headers(&[
            ("X-Forwarded-For", "1.2.3.4, 5.6.7.8"),
            ("X-Real-IP", "10.0.0.1"),
        ]);
        assert_eq!(client_key(&map, &trusted), "10.0.0.1");
    }

    #[test]
    fn forwarding_chain_yields_original_client() {
        let trusted = default_client_ip_headers();
        let map = headers(&[("X-Forwarded-For", " 1.2.3.4 , 5.6.7.8")]);
        assert_eq!(client_key(&map, &trusted), "1.2.3.4");
    }

    #[test]
    fn addresses_are_case_folded() {
        let trusted = default_client_ip_headers();
        let map = headers(&[("X-Real-IP", "2001:DB8::1")]);
        assert_eq!(client_key(&map, &trusted), "2001:db8::1");
    }

    #[test]
    fn empty_entries_are_skipped() {
        let trusted = default_client_ip_headers();
        let map = headers(&[("X-Real-IP", " , "), ("X-Forwarded-For", "9.9.9.9")]);
        assert_eq!(client_key(&map, &trusted), "9.9.9.9");
    }

    #[test]
    fn missing_headers_fall_to_unknown_bucket() {
        let trusted = default_client_ip_headers();
        assert_eq!(client_key(&HeaderMap::new(), &trusted), UNKNOWN_CLIENT);

        // An operator who trusts no proxy headers pools everything
        assert_eq!(
            client_key(&headers(&[("X-Real-IP", "1.1.1.1")]), &[]),
            UNKNOWN_CLIENT
        );
    }
}
