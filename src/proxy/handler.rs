use hyper::header::HOST;
use hyper::{Body, Request, Response, StatusCode};
use std::convert::Infallible;
use std::net::SocketAddr;
use std::sync::Arc;
use tracing::{debug, warn};
use uuid::Uuid;

use crate::config::{Config, TenantRouter};
use crate::health::HealthStore;
use crate::proxy::context::RequestContext;
use crate::proxy::orchestrator::{self, FailoverOrchestrator};
use crate::proxy::websocket;

/// Per-request entry point.
///
/// Resolves the tenant from the inbound Host header, branches WebSocket
/// upgrades to the pass-through tunnel, and hands everything else to the
/// failover orchestrator. Infallible towards hyper: every outcome is a
/// well-formed response.
#[derive(Clone)]
pub struct ProxyHandler {
    router: Arc<TenantRouter>,
    orchestrator: Arc<FailoverOrchestrator>,
}

impl ProxyHandler {
    pub fn new(router: TenantRouter, orchestrator: FailoverOrchestrator) -> Self {
        Self {
            router: Arc::new(router),
            orchestrator: Arc::new(orchestrator),
        }
    }

    /// Wire a handler from loaded configuration with a fresh health store
    pub fn from_config(config: &Config) -> Self {
        let engine = Arc::new(config.engine.clone());
        let store = Arc::new(HealthStore::new(
            engine.failure_threshold,
            engine.circuit_reset(),
            engine.down_ttl(),
        ));
        Self::new(
            TenantRouter::new(config.tenants.clone()),
            FailoverOrchestrator::new(store, engine),
        )
    }

    /// Access the health store (observability, tests)
    pub fn store(&self) -> &Arc<HealthStore> {
        self.orchestrator.store()
    }

    pub async fn handle_request(&self, req: Request<Body>) -> Result<Response<Body>, Infallible> {
        match self.process_request(req).await {
            Ok(response) => Ok(response),
            Err(e) => {
                warn!("Request processing error: {}", e);
                Ok(Response::builder()
                    .status(StatusCode::INTERNAL_SERVER_ERROR)
                    .body(Body::from("Internal server error"))
                    .unwrap_or_else(|_| Response::new(Body::empty())))
            }
        }
    }

    async fn process_request(&self, req: Request<Body>) -> anyhow::Result<Response<Body>> {
        let request_id = Uuid::new_v4();
        let client_addr = req.extensions().get::<SocketAddr>().copied();

        let host = req
            .headers()
            .get(HOST)
            .and_then(|h| h.to_str().ok())
            .unwrap_or("unknown")
            .to_string();

        debug!(%request_id, host = %host, path = %req.uri().path(), "Request received");

        let set = match self.router.resolve(&host) {
            Some(set) => set.to_vec(),
            None => {
                warn!(%request_id, host = %host, "No tenant configured for host");
                return Ok(orchestrator::tenant_not_found());
            }
        };

        if websocket::is_upgrade_request(&req) {
            debug!(%request_id, host = %host, "WebSocket upgrade detected");
            let candidates = match self.orchestrator.candidates(&set) {
                Ok(candidates) => candidates,
                Err(e) => {
                    warn!(%request_id, error = %e, "Selection failed for upgrade");
                    return Ok(orchestrator::tenant_not_found());
                }
            };
            return Ok(websocket::tunnel(
                req,
                &candidates,
                self.orchestrator.store(),
                self.orchestrator.config(),
            )
            .await);
        }

        let ctx = RequestContext::from_request(req, client_addr.map(|a| a.ip())).await?;
        let response = self.orchestrator.dispatch(&ctx, &set).await;

        debug!(
            %request_id,
            status = %response.status(),
            served_by = response
                .headers()
                .get(orchestrator::SERVED_BY_HEADER)
                .and_then(|v| v.to_str().ok())
                .unwrap_or("-"),
            "Request completed"
        );

        Ok(response)
    }
}
