//! # sockjs-server
//!
//! Axum HTTP and WebSocket surface for SockJS endpoints.
//!
//! An [`Endpoint`] binds one [`SessionService`](sockjs_core::SessionService)
//! to a URL prefix and serves the greeting, `info`, the iframe page, every
//! polling and streaming transport, the send endpoints and both WebSocket
//! flavours. [`SockJsServer`] mounts any number of endpoints on one listener
//! next to `/health` and `/metrics`, and runs their heartbeat and sweep loops.

#![deny(unsafe_code)]

pub mod config;
pub mod endpoint;
pub mod errors;
pub mod headers;
pub mod health;
pub mod iframe;
pub mod info;
pub mod metrics;
pub mod server;
pub mod shutdown;
pub mod transport;

pub use config::{EndpointOptions, ServerConfig};
pub use endpoint::{Endpoint, EndpointState};
pub use errors::TransportError;
pub use server::SockJsServer;
pub use shutdown::ShutdownCoordinator;
pub use transport::TransportKind;
