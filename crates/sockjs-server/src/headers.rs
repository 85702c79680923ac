//! Response headers shared by every endpoint: content types, caching, CORS
//! and the sticky-session cookie.

use axum::extract::Request;
use axum::http::{HeaderMap, HeaderValue, Method, StatusCode, header};
use axum::middleware::Next;
use axum::response::{IntoResponse, Response};
use chrono::{DateTime, Duration as ChronoDuration, Utc};

/// Cache header on every dynamic response.
pub const CACHE_CONTROL_NO_CACHE: &str = "no-store, no-cache, no-transform, must-revalidate, max-age=0";
/// One year, in seconds.
pub const ONE_YEAR_SECS: i64 = 31_536_000;
/// `text/plain; charset=UTF-8`.
pub const TEXT_PLAIN: &str = "text/plain; charset=UTF-8";
/// `application/json; charset=UTF-8`.
pub const APPLICATION_JSON: &str = "application/json; charset=UTF-8";
/// `application/javascript; charset=UTF-8`.
pub const APPLICATION_JAVASCRIPT: &str = "application/javascript; charset=UTF-8";
/// `text/event-stream; charset=UTF-8`.
pub const TEXT_EVENT_STREAM: &str = "text/event-stream; charset=UTF-8";
/// `text/html; charset=UTF-8`.
pub const TEXT_HTML: &str = "text/html; charset=UTF-8";

const SESSION_COOKIE: &str = "JSESSIONID";

/// RFC 1123 date, as used by `Expires`.
pub fn http_date(at: DateTime<Utc>) -> String {
    at.format("%a, %d %b %Y %H:%M:%S GMT").to_string()
}

/// Headers that let a response be cached for a year.
pub fn cache_for_one_year(headers: &mut HeaderMap) {
    let _ = headers.insert(
        header::CACHE_CONTROL,
        HeaderValue::from_static("public, max-age=31536000"),
    );
    let expires = http_date(Utc::now() + ChronoDuration::seconds(ONE_YEAR_SECS));
    if let Ok(value) = HeaderValue::from_str(&expires) {
        let _ = headers.insert(header::EXPIRES, value);
    }
}

/// `204` answer to an `OPTIONS` request listing the allowed verbs.
pub fn options_response(methods: &[Method]) -> Response {
    let mut allowed = String::from("OPTIONS");
    for method in methods {
        allowed.push_str(", ");
        allowed.push_str(method.as_str());
    }

    let mut response = StatusCode::NO_CONTENT.into_response();
    let headers = response.headers_mut();
    cache_for_one_year(headers);
    let _ = headers.insert(
        header::ACCESS_CONTROL_MAX_AGE,
        HeaderValue::from(ONE_YEAR_SECS),
    );
    if let Ok(value) = HeaderValue::from_str(&allowed) {
        let _ = headers.insert(header::ACCESS_CONTROL_ALLOW_METHODS, value);
    }
    response
}

/// Mark a response as uncacheable.
pub fn no_cache(headers: &mut HeaderMap) {
    let _ = headers.insert(
        header::CACHE_CONTROL,
        HeaderValue::from_static(CACHE_CONTROL_NO_CACHE),
    );
}

/// `Set-Cookie` value echoing the client's `JSESSIONID`, or `dummy`.
pub fn session_cookie(request: &HeaderMap) -> HeaderValue {
    let existing = request
        .get_all(header::COOKIE)
        .iter()
        .filter_map(|v| v.to_str().ok())
        .flat_map(|v| v.split(';'))
        .filter_map(|pair| pair.trim().split_once('='))
        .find(|(name, _)| *name == SESSION_COOKIE)
        .map(|(_, value)| value.to_string());

    let value = existing.unwrap_or_else(|| "dummy".to_string());
    HeaderValue::from_str(&format!("{SESSION_COOKIE}={value}; Path=/"))
        .unwrap_or_else(|_| HeaderValue::from_static("JSESSIONID=dummy; Path=/"))
}

/// CORS middleware: mirror the origin (or `*`), allow credentials, and
/// mirror requested headers.
pub async fn cors(request: Request, next: Next) -> Response {
    let origin = request
        .headers()
        .get(header::ORIGIN)
        .filter(|v| v.as_bytes() != b"null")
        .cloned()
        .unwrap_or_else(|| HeaderValue::from_static("*"));
    let requested_headers = request
        .headers()
        .get(header::ACCESS_CONTROL_REQUEST_HEADERS)
        .cloned();

    let mut response = next.run(request).await;
    let headers = response.headers_mut();
    let _ = headers.insert(header::ACCESS_CONTROL_ALLOW_ORIGIN, origin);
    let _ = headers.insert(
        header::ACCESS_CONTROL_ALLOW_CREDENTIALS,
        HeaderValue::from_static("true"),
    );
    if let Some(requested) = requested_headers {
        let _ = headers.insert(header::ACCESS_CONTROL_ALLOW_HEADERS, requested);
    }
    response
}
