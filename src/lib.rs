//! # Shunt - health-aware HTTP failover proxy
//!
//! Shunt routes inbound HTTP(S) requests across a small set of backend
//! servers, typically a primary and a backup. Unhealthy backends are
//! detected from live traffic and steered around automatically; traffic
//! returns when they recover.
//!
//! ## Core pieces
//!
//! - **Health tracking**: per-server failure streaks, rolling latency
//!   averages and a circuit breaker, plus a short-TTL down cache for
//!   fast-path failover
//! - **Selection**: failover, weighted and health-adaptive ("smart")
//!   candidate ordering over a tenant's server set
//! - **Dispatch**: timeout-bounded attempts with header rewriting and a
//!   replayable request body
//! - **Orchestration**: sequential candidate walk with a last-resort
//!   bypass attempt and synthetic 503/404 responses
//!
//! ## Usage
//!
//! ```rust,no_run
//! use shunt::config::Config;
//! use shunt::proxy::ProxyServer;
//! use std::net::SocketAddr;
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let config = Config::from_file_with_env("config.toml").await?;
//!     let bind: SocketAddr = config.server.bind.parse()?;
//!     ProxyServer::new(&config, bind).run().await?;
//!     Ok(())
//! }
//! ```

pub mod balancer;
pub mod config;
pub mod error;
pub mod health;
pub mod proxy;

pub use error::{ErrorSeverity, ShuntError, ShuntResult};
pub use health::{CircuitState, HealthRecord, HealthStore};
pub use proxy::{DispatchFailure, Dispatcher, FailoverOrchestrator, ProxyHandler, ProxyServer};
