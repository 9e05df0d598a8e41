//! Helpers for reading how the client reached us.

use axum::http::{header, HeaderMap};

/// Scheme and host as seen by the client, honouring reverse-proxy headers.
pub fn external_origin(headers: &HeaderMap) -> String {
    let scheme = first_header_value(headers, "x-forwarded-proto").unwrap_or("http");
    let host = first_header_value(headers, "x-forwarded-host")
        .or_else(|| first_header_value(headers, header::HOST.as_str()))
        .unwrap_or("localhost");

    format!("{}://{}", scheme, host)
}

/// Whether a browser navigation (rather than an API call) made this request.
pub fn wants_redirect(headers: &HeaderMap, redirect_flag: bool) -> bool {
    redirect_flag
        || headers
            .get(header::ACCEPT)
            .and_then(|v| v.to_str().ok())
            .is_some_and(|accept| accept.contains("text/html"))
}

// Proxies may append; the left-most entry is the client-facing one.
fn first_header_value<'a>(headers: &'a HeaderMap, name: &str) -> Option<&'a str> {
    headers
        .get(name)
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.split(',').next())
        .map(str::trim)
        .filter(|v| !v.is_empty())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_forwarded_headers_take_precedence() {
        let mut headers = HeaderMap::new();
        headers.insert(header::HOST, "internal:8080".parse().unwrap());
        headers.insert("x-forwarded-proto", "https".parse().unwrap());
        headers.insert("x-forwarded-host", "app.example.com, proxy".parse().unwrap());

        assert_eq!(external_origin(&headers), "https://app.example.com");
    }

    #[test]
    fn test_falls_back_to_host_and_http() {
        let mut headers = HeaderMap::new();
        headers.insert(header::HOST, "localhost:8080".parse().unwrap());

        assert_eq!(external_origin(&headers), "http://localhost:8080");
    }

    #[test]
    fn test_wants_redirect() {
        let mut headers = HeaderMap::new();
        assert!(!wants_redirect(&headers, false));
        assert!(wants_redirect(&headers, true));
        headers.insert(header::ACCEPT, "text/html,application/xhtml+xml".parse().unwrap());
        assert!(wants_redirect(&headers, false));
    }
}
