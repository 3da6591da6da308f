use axum::http::HeaderMap;

use crate::auth::{extract_bearer, CLIENT_ID_HEADER};

/// Header conventions shared by the request-response transports
/// (`/_push`, `/_call`): the bearer token used for header-based auth on the
/// one-way push connect request, and the client-generated node identity.
pub fn extract_token_from_headers(headers: &HeaderMap) -> Option<String> {
    headers
        .get("authorization")
        .and_then(|v| v.to_str().ok())
        .and_then(extract_bearer)
        .map(ToOwned::to_owned)
}

pub fn extract_client_id(headers: &HeaderMap) -> Option<String> {
    headers
        .get(CLIENT_ID_HEADER)
        .and_then(|v| v.to_str().ok())
        .map(ToOwned::to_owned)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn extract_token_from_headers_handles_missing_malformed_and_valid_bearer() {
        let missing = HeaderMap::new();
        assert_eq!(extract_token_from_headers(&missing), None);

        let mut malformed = HeaderMap::new();
        malformed.insert(
            "authorization",
            axum::http::HeaderValue::from_static("Basic abc123"),
        );
        assert_eq!(extract_token_from_headers(&malformed), None);

        let mut valid = HeaderMap::new();
        valid.insert(
            "authorization",
            axum::http::HeaderValue::from_static("Bearer token-123"),
        );
        assert_eq!(
            extract_token_from_headers(&valid),
            Some("token-123".to_owned())
        );
    }

    #[test]
    fn extract_client_id_reads_the_configured_header() {
        let mut headers = HeaderMap::new();
        headers.insert(
            CLIENT_ID_HEADER,
            axum::http::HeaderValue::from_static("n1"),
        );
        assert_eq!(extract_client_id(&headers), Some("n1".to_owned()));
        assert_eq!(extract_client_id(&HeaderMap::new()), None);
    }
}
