//! Core proxy engine: request handling, health-aware dispatch and
//! failover orchestration.
//!
//! Components:
//! - `ProxyServer`: listener, connection handling, graceful shutdown
//! - `ProxyHandler`: per-request entry point (tenant resolution, WebSocket
//!   branch, body materialization)
//! - `FailoverOrchestrator`: candidate walk with last-resort policy
//! - `Dispatcher`: one timeout-bounded attempt against one server
//! - `upstream`: shared pooled HTTP client

pub mod context;
pub mod dispatcher;
pub mod handler;
pub mod orchestrator;
pub mod server;
pub mod upstream;
pub mod websocket;

pub use context::RequestContext;
pub use dispatcher::{DispatchFailure, Dispatcher};
pub use handler::ProxyHandler;
pub use orchestrator::FailoverOrchestrator;
pub use server::ProxyServer;
