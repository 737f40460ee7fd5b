use axum::{
    extract::State,
    http::{HeaderMap, Request},
    middleware::Next,
    response::Response,
};

use crate::handlers::ErrorResponse;
use crate::state::AppState;

/// Check the shared application key carried in `header_name`
pub fn check_api_key(
    headers: &HeaderMap,
    header_name: &str,
    expected: &str,
) -> Result<(), ErrorResponse> {
    let presented = headers
        .get(header_name)
        .and_then(|h| h.to_str().ok())
        .ok_or_else(|| ErrorResponse::new("unauthorized", format!("Missing {} header", header_name)))?;

    if presented != expected {
        tracing::warn!(header = header_name, "Invalid application key");
        return Err(ErrorResponse::new("unauthorized", "Invalid application key"));
    }

    Ok(())
}

/// Authentication middleware that validates the shared application key
#[tracing::instrument(skip(state, req, next))]
pub async fn api_key_middleware(
    State(state): State<AppState>,
    req: Request<axum::body::Body>,
    next: Next,
) -> Result<Response, ErrorResponse> {
    check_api_key(
        req.headers(),
        &state.config.auth.header_name,
        &state.config.auth.api_key,
    )?;

    Ok(next.run(req).await)
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::{HeaderName, HeaderValue, StatusCode};

    #[test]
    fn test_accepts_matching_key() {
        let mut headers = HeaderMap::new();
        headers.insert("x-app-key", HeaderValue::from_static("dev-key"));
        assert!(check_api_key(&headers, "x-app-key", "dev-key").is_ok());
    }

    #[test]
    fn test_header_name_is_case_insensitive() {
        let mut headers = HeaderMap::new();
        let name = HeaderName::from_bytes(b"X-App-Key").unwrap();
        headers.insert(name, HeaderValue::from_static("dev-key"));
        assert!(check_api_key(&headers, "x-app-key", "dev-key").is_ok());
    }

    #[test]
    fn test_rejects_missing_or_wrong_key() {
        let headers = HeaderMap::new();
        let err = check_api_key(&headers, "x-app-key", "dev-key").unwrap_err();
        assert_eq!(err.status(), StatusCode::UNAUTHORIZED);

        let mut headers = HeaderMap::new();
        headers.insert("x-app-key", HeaderValue::from_static("nope"));
        let err = check_api_key(&headers, "x-app-key", "dev-key").unwrap_err();
        assert_eq!(err.error, "unauthorized");
    }
}
