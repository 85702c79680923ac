//! Hidden iframe page used by the iframe-based transports.
//!
//! The body only depends on the client library URL, so it is rendered once
//! per endpoint together with its strong `ETag`.

use std::fmt::Write as _;
use std::sync::Arc;

use axum::extract::{Path, State};
use axum::http::{HeaderMap, HeaderValue, StatusCode, header};
use axum::response::{IntoResponse, Response};
use sha2::{Digest, Sha256};

use crate::endpoint::EndpointState;
use crate::errors::TransportError;
use crate::headers::{TEXT_HTML, cache_for_one_year};

/// Rendered iframe page.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct IframePage {
    body: String,
    etag: String,
}

impl IframePage {
    /// Render the page for a client library URL.
    pub fn new(sockjs_url: &str) -> Self {
        let body = format!(
            r#"<!DOCTYPE html>
<html>
<head>
  <meta http-equiv="X-UA-Compatible" content="IE=edge" />
  <meta http-equiv="Content-Type" content="text/html; charset=UTF-8" />
  <script src="{sockjs_url}"></script>
  <script>
    document.domain = document.domain;
    SockJS.bootstrap_iframe();
  </script>
</head>
<body>
  <h2>Don't panic!</h2>
  <p>This is a SockJS hidden iframe. It's used for cross domain magic.</p>
</body>
</html>"#
        );
        let digest = Sha256::digest(body.as_bytes());
        let mut etag = String::with_capacity(digest.len() * 2 + 2);
        etag.push('"');
        for byte in digest {
            let _ = write!(etag, "{byte:02x}");
        }
        etag.push('"');
        Self { body, etag }
    }

    /// Page body.
    pub fn body(&self) -> &str {
        &self.body
    }

    /// Quoted strong entity tag.
    pub fn etag(&self) -> &str {
        &self.etag
    }

    /// Whether `If-None-Match` already names this page.
    pub fn matches(&self, request: &HeaderMap) -> bool {
        request
            .get(header::IF_NONE_MATCH)
            .and_then(|v| v.to_str().ok())
            .is_some_and(|v| v.split(',').any(|tag| tag.trim() == self.etag))
    }
}

/// Whether a path segment names the iframe page (`iframe.html`,
/// `iframe-<version>.html`, ...).
pub fn is_iframe_file(name: &str) -> bool {
    name.starts_with("iframe") && name.ends_with(".html") && name.len() >= "iframe.html".len()
}

/// `GET <prefix>/iframe*.html`.
pub async fn iframe(
    State(state): State<Arc<EndpointState>>,
    Path(file): Path<String>,
    request: HeaderMap,
) -> Result<Response, TransportError> {
    if !is_iframe_file(&file) {
        return Err(TransportError::NotFound);
    }
    let page = &state.iframe;

    let mut response = if page.matches(&request) {
        StatusCode::NOT_MODIFIED.into_response()
    } else {
        (
            StatusCode::OK,
            [(header::CONTENT_TYPE, TEXT_HTML)],
            page.body().to_owned(),
        )
            .into_response()
    };
    let headers = response.headers_mut();
    cache_for_one_year(headers);
    if let Ok(etag) = HeaderValue::from_str(page.etag()) {
        let _ = headers.insert(header::ETAG, etag);
    }
    Ok(response)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn page_embeds_library_url() {
        let page = IframePage::new("http://localhost/sockjs.js");
        assert!(page.body().contains(r#"<script src="http://localhost/sockjs.js"></script>"#));
        assert!(page.body().contains("SockJS.bootstrap_iframe();"));
    }

    #[test]
    fn etag_is_quoted_sha256_hex() {
        let page = IframePage::new("x");
        assert_eq!(page.etag().len(), 64 + 2);
        assert!(page.etag().starts_with('"') && page.etag().ends_with('"'));
        assert_eq!(page, IframePage::new("x"));
        assert_ne!(page.etag(), IframePage::new("y").etag());
    }

    #[test]
    fn if_none_match() {
        let page = IframePage::new("x");
        let mut headers = HeaderMap::new();
        assert!(!page.matches(&headers));
        let _ = headers.insert(
            header::IF_NONE_MATCH,
            HeaderValue::from_str(page.etag()).unwrap(),
        );
        assert!(page.matches(&headers));
    }

    #[test]
    fn iframe_file_names() {
        assert!(is_iframe_file("iframe.html"));
        assert!(is_iframe_file("iframe-a.html"));
        assert!(is_iframe_file("iframe0.3.3.html"));
        assert!(!is_iframe_file("iframe.htm"));
        assert!(!is_iframe_file("info"));
        assert!(!is_iframe_file("xiframe.html"));
    }
}
