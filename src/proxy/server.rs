use anyhow::Result;
use hyper::server::conn::AddrStream;
use hyper::service::{make_service_fn, service_fn};
use hyper::Server;
use std::convert::Infallible;
use std::net::SocketAddr;
use tracing::info;

use crate::config::Config;
use crate::proxy::handler::ProxyHandler;

/// Listener wrapper: binds the configured address, stamps each request
/// with its client address, and serves until a shutdown signal arrives.
pub struct ProxyServer {
    handler: ProxyHandler,
    bind: SocketAddr,
}

impl ProxyServer {
    pub fn new(config: &Config, bind: SocketAddr) -> Self {
        Self {
            handler: ProxyHandler::from_config(config),
            bind,
        }
    }

    pub async fn run(self) -> Result<()> {
        let handler = self.handler;

        let make_svc = make_service_fn(move |conn: &AddrStream| {
            let handler = handler.clone();
            let remote_addr = conn.remote_addr();
            async move {
                Ok::<_, Infallible>(service_fn(move |mut req| {
                    let handler = handler.clone();
                    async move {
                        req.extensions_mut().insert(remote_addr);
                        handler.handle_request(req).await
                    }
                }))
            }
        });

        let server = Server::bind(&self.bind).serve(make_svc);
        info!("Listening on {}", self.bind);

        server.with_graceful_shutdown(shutdown_signal()).await?;
        info!("Server stopped");
        Ok(())
    }
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::warn!("Failed to listen for shutdown signal: {}", e);
        return;
    }
    info!("Shutdown signal received");
}
