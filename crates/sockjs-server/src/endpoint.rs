//! One SockJS endpoint: a URL prefix, its session registry and its routes.

use std::sync::Arc;

use axum::Router;
use axum::http::header;
use axum::middleware;
use axum::response::IntoResponse;
use axum::routing::{get, post};
use sockjs_core::{SessionRegistry, SessionService};

use crate::config::EndpointOptions;
use crate::headers::{self, TEXT_PLAIN};
use crate::iframe::{self, IframePage};
use crate::info;
use crate::transport::{polling, send, streaming, websocket};

const GREETING: &str = "Welcome to SockJS!\n";

/// State shared by every handler of one endpoint.
pub struct EndpointState {
    /// URL prefix without a trailing slash (`""` for the root).
    pub prefix: String,
    /// Sessions of this endpoint.
    pub registry: Arc<SessionRegistry>,
    /// Protocol options.
    pub options: EndpointOptions,
    /// Pre-rendered iframe page.
    pub iframe: IframePage,
}

/// A mounted SockJS service.
#[derive(Clone)]
pub struct Endpoint {
    state: Arc<EndpointState>,
}

impl Endpoint {
    /// Create an endpoint serving `service` under `prefix`.
    pub fn new(prefix: &str, service: Arc<dyn SessionService>, options: EndpointOptions) -> Self {
        let prefix = normalize_prefix(prefix);
        let registry = Arc::new(SessionRegistry::new(service, options.registry_config()));
        let iframe = IframePage::new(&options.sockjs_url);
        Self {
            state: Arc::new(EndpointState {
                prefix,
                registry,
                options,
                iframe,
            }),
        }
    }

    /// URL prefix.
    pub fn prefix(&self) -> &str {
        &self.state.prefix
    }

    /// Session registry.
    pub fn registry(&self) -> &Arc<SessionRegistry> {
        &self.state.registry
    }

    /// Protocol options.
    pub fn options(&self) -> &EndpointOptions {
        &self.state.options
    }

    /// Routes of this endpoint, with CORS applied.
    pub fn router(&self) -> Router {
        let p = self.state.prefix.as_str();
        let session = |transport: &str| format!("{p}/{{server}}/{{session}}/{transport}");

        let greeting_routes: Router<Arc<EndpointState>> = if p.is_empty() {
            Router::new().route("/", get(greeting))
        } else {
            Router::new()
                .route(p, get(greeting))
                .route(&format!("{p}/"), get(greeting))
        };

        Router::new()
            .merge(greeting_routes)
            .route(
                &format!("{p}/info"),
                get(info::info).options(info::info_options),
            )
            .route(&format!("{p}/{{server}}"), get(iframe::iframe))
            .route(&format!("{p}/websocket"), get(websocket::raw_websocket))
            .route(
                &session("xhr"),
                post(polling::xhr).options(polling::xhr_options),
            )
            .route(
                &session("xhr_send"),
                post(send::xhr_send).options(send::xhr_send_options),
            )
            .route(
                &session("xhr_streaming"),
                post(streaming::xhr_streaming).options(streaming::xhr_streaming_options),
            )
            .route(&session("eventsource"), get(streaming::eventsource))
            .route(&session("htmlfile"), get(streaming::htmlfile))
            .route(&session("jsonp"), get(polling::jsonp))
            .route(&session("jsonp_send"), post(send::jsonp_send))
            .route(&session("websocket"), get(websocket::websocket))
            .layer(middleware::from_fn(headers::cors))
            .with_state(Arc::clone(&self.state))
    }
}

impl std::fmt::Debug for Endpoint {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Endpoint")
            .field("prefix", &self.state.prefix)
            .field("sessions", &self.state.registry.len())
            .finish_non_exhaustive()
    }
}

/// `"/echo/"` → `"/echo"`, `"echo"` → `"/echo"`, `"/"` → `""`.
fn normalize_prefix(prefix: &str) -> String {
    let trimmed = prefix.trim_matches('/');
    if trimmed.is_empty() {
        String::new()
    } else {
        format!("/{trimmed}")
    }
}

/// `GET <prefix>` and `GET <prefix>/`.
async fn greeting() -> impl IntoResponse {
    ([(header::CONTENT_TYPE, TEXT_PLAIN)], GREETING)
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use axum::body::Body;
    use axum::http::{Method, Request, StatusCode};
    use sockjs_core::Session;
    use tower::ServiceExt;

    struct Echo;

    #[async_trait]
    impl SessionService for Echo {
        async fn on_message(&self, session: &Arc<Session>, message: String) {
            let _ = session.send(message);
        }
    }

    fn endpoint() -> Endpoint {
        Endpoint::new("/echo", Arc::new(Echo), EndpointOptions::default())
    }

    async fn call(endpoint: &Endpoint, method: Method, uri: &str, body: &str) -> (StatusCode, String) {
        let req = Request::builder()
            .method(method)
            .uri(uri)
            .body(Body::from(body.to_owned()))
            .unwrap();
        let resp = endpoint.router().oneshot(req).await.unwrap();
        let status = resp.status();
        let bytes = axum::body::to_bytes(resp.into_body(), usize::MAX).await.unwrap();
        (status, String::from_utf8(bytes.to_vec()).unwrap())
    }

    #[test]
    fn prefixes_are_normalized() {
        assert_eq!(normalize_prefix("/echo/"), "/echo");
        assert_eq!(normalize_prefix("echo"), "/echo");
        assert_eq!(normalize_prefix("/"), "");
    }

    #[tokio::test]
    async fn greeting_with_and_without_slash() {
        let ep = endpoint();
        for uri in ["/echo", "/echo/"] {
            let (status, body) = call(&ep, Method::GET, uri, "").await;
            assert_eq!(status, StatusCode::OK);
            assert_eq!(body, "Welcome to SockJS!\n");
        }
    }

    #[tokio::test]
    async fn info_reports_websocket() {
        let ep = endpoint();
        let (status, body) = call(&ep, Method::GET, "/echo/info", "").await;
        assert_eq!(status, StatusCode::OK);
        let json: serde_json::Value = serde_json::from_str(&body).unwrap();
        assert_eq!(json["websocket"], true);
        assert_eq!(json["origins"][0], "*:*");
    }

    #[tokio::test]
    async fn xhr_opens_then_echoes() {
        let ep = endpoint();
        let (status, body) = call(&ep, Method::POST, "/echo/000/s1/xhr", "").await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body, "o\n");

        let (status, _) = call(&ep, Method::POST, "/echo/000/s1/xhr_send", r#"["x"]"#).await;
        assert_eq!(status, StatusCode::NO_CONTENT);

        // Echo runs on the dispatcher task.
        tokio::time::sleep(std::time::Duration::from_millis(50)).await;
        let (_, body) = call(&ep, Method::POST, "/echo/000/s1/xhr", "").await;
        assert_eq!(body, "a[\"x\"]\n");
    }

    #[tokio::test]
    async fn single_slot_conduit_still_delivers_open_after_prelude() {
        let options = EndpointOptions {
            conduit_capacity: 1,
            ..EndpointOptions::default()
        }
        .with_response_limit(1);
        let ep = Endpoint::new("/tight", Arc::new(Echo), options);

        let (status, body) = call(&ep, Method::POST, "/tight/000/s1/xhr_streaming", "").await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body.len(), 2049 + 2);
        assert!(body.ends_with("h\no\n"));
        let session = ep.registry().get(&sockjs_core::SessionId::from_raw("s1")).unwrap();
        assert_eq!(session.state(), sockjs_core::SessionState::Open);
    }

    #[tokio::test]
    async fn send_to_unknown_session_is_404() {
        let ep = endpoint();
        let (status, body) = call(&ep, Method::POST, "/echo/000/nope/xhr_send", r#"["x"]"#).await;
        assert_eq!(status, StatusCode::NOT_FOUND);
        assert!(body.is_empty());
    }

    #[tokio::test]
    async fn dotted_session_is_404() {
        let ep = endpoint();
        let (status, _) = call(&ep, Method::POST, "/echo/000/a.b/xhr", "").await;
        assert_eq!(status, StatusCode::NOT_FOUND);
        assert!(ep.registry().is_empty());
    }

    #[tokio::test]
    async fn websocket_without_upgrade_is_400() {
        let ep = endpoint();
        let (status, body) = call(&ep, Method::GET, "/echo/000/s1/websocket", "").await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(body, "Can \"Upgrade\" only to \"WebSocket\".");
    }

    #[tokio::test]
    async fn websocket_disabled_is_404() {
        let ep = Endpoint::new(
            "/disabled",
            Arc::new(Echo),
            EndpointOptions::default().without_websocket(),
        );
        let (status, _) = call(&ep, Method::GET, "/disabled/websocket", "").await;
        assert_eq!(status, StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn iframe_is_served_and_unknown_segment_404s() {
        let ep = endpoint();
        let (status, body) = call(&ep, Method::GET, "/echo/iframe.html", "").await;
        assert_eq!(status, StatusCode::OK);
        assert!(body.contains("SockJS.bootstrap_iframe();"));

        let (status, _) = call(&ep, Method::GET, "/echo/nothing", "").await;
        assert_eq!(status, StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn cors_mirrors_origin() {
        let ep = endpoint();
        let req = Request::builder()
            .method(Method::OPTIONS)
            .uri("/echo/000/s1/xhr")
            .header(header::ORIGIN, "https://example.com")
            .header(header::ACCESS_CONTROL_REQUEST_HEADERS, "x-test")
            .body(Body::empty())
            .unwrap();
        let resp = ep.router().oneshot(req).await.unwrap();
        assert_eq!(resp.status(), StatusCode::NO_CONTENT);
        let headers = resp.headers();
        assert_eq!(headers[header::ACCESS_CONTROL_ALLOW_ORIGIN], "https://example.com");
        assert_eq!(headers[header::ACCESS_CONTROL_ALLOW_CREDENTIALS], "true");
        assert_eq!(headers[header::ACCESS_CONTROL_ALLOW_HEADERS], "x-test");
        assert_eq!(headers[header::ACCESS_CONTROL_ALLOW_METHODS], "OPTIONS, POST");
    }
}
