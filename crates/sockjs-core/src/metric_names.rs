//! Metric names recorded through the `metrics` facade.

/// Sessions created (counter).
pub const SESSIONS_CREATED_TOTAL: &str = "sockjs_sessions_created_total";
/// Sessions currently registered (gauge).
pub const SESSIONS_ACTIVE: &str = "sockjs_sessions_active";
/// Sessions reclaimed by the idle sweep (counter).
pub const SESSIONS_EXPIRED_TOTAL: &str = "sockjs_sessions_expired_total";
/// Transport requests (counter, labels: transport).
pub const TRANSPORT_REQUESTS_TOTAL: &str = "sockjs_transport_requests_total";
/// Requests rejected at the HTTP boundary (counter, labels: kind).
pub const TRANSPORT_ERRORS_TOTAL: &str = "sockjs_transport_errors_total";
/// Sender write failures (counter).
pub const SENDER_ERRORS_TOTAL: &str = "sockjs_sender_errors_total";
