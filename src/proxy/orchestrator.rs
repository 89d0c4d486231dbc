use hyper::header::{HeaderValue, CONTENT_TYPE};
use hyper::{Body, Response, StatusCode};
use std::sync::Arc;
use tracing::{debug, info, warn};

use crate::balancer::ServerSelector;
use crate::config::{EngineConfig, ServerDescriptor};
use crate::error::ShuntResult;
use crate::health::HealthStore;
use crate::proxy::context::RequestContext;
use crate::proxy::dispatcher::Dispatcher;

/// Fixed body returned when every candidate has failed
const UNAVAILABLE_BODY: &str = "<html><body>\
<h1>503 Service Unavailable</h1>\
<p>The service is temporarily unavailable. Please try again shortly.</p>\
</body></html>";

/// Fixed body returned when no tenant matches the inbound hostname
const NOT_FOUND_BODY: &str = "<html><body>\
<h1>404 Not Found</h1>\
<p>No backend is configured for this host.</p>\
</body></html>";

/// Response header naming the server that produced the response
pub const SERVED_BY_HEADER: &str = "x-served-by";

/// Top-level control loop: asks the selector for an ordering, walks it
/// until one attempt succeeds or the list is exhausted, then applies the
/// last-resort policy. Nothing propagates past this boundary: the
/// caller always gets a well-formed response.
#[derive(Debug, Clone)]
pub struct FailoverOrchestrator {
    selector: ServerSelector,
    dispatcher: Dispatcher,
    store: Arc<HealthStore>,
    config: Arc<EngineConfig>,
}

impl FailoverOrchestrator {
    pub fn new(store: Arc<HealthStore>, config: Arc<EngineConfig>) -> Self {
        Self {
            selector: ServerSelector::new(Arc::clone(&config)),
            dispatcher: Dispatcher::new(Arc::clone(&store), Arc::clone(&config)),
            store,
            config,
        }
    }

    /// Candidate ordering for the configured policy. Exposed for the
    /// WebSocket handshake path, which walks at most two candidates.
    pub fn candidates(&self, set: &[ServerDescriptor]) -> ShuntResult<Vec<ServerDescriptor>> {
        self.selector.select(set, &self.store, &mut rand::thread_rng())
    }

    pub fn store(&self) -> &Arc<HealthStore> {
        &self.store
    }

    pub fn config(&self) -> &Arc<EngineConfig> {
        &self.config
    }

    /// Walk the candidate ordering for one request. Attempts are strictly
    /// sequential; the first success wins and remaining candidates are
    /// never tried.
    pub async fn dispatch(&self, ctx: &RequestContext, set: &[ServerDescriptor]) -> Response<Body> {
        let candidates = match self.candidates(set) {
            Ok(candidates) => candidates,
            Err(e) => {
                warn!(host = %ctx.original_host, error = %e, "Selection failed");
                return tenant_not_found();
            }
        };

        for candidate in &candidates {
            if self.config.down_cache && self.store.is_marked_down(&candidate.name) {
                debug!(server = %candidate.name, "Skipping server in down cache");
                continue;
            }

            match self.dispatcher.dispatch(candidate, ctx).await {
                Ok(response) => return annotate(response, &candidate.name),
                Err(failure) => {
                    info!(
                        server = %candidate.name,
                        failure = %failure,
                        "Candidate failed, moving to next"
                    );
                }
            }
        }

        // Last resort: one bypass attempt against the first candidate of
        // the original set with the down-cache check skipped, covering a
        // server that recovered inside its cache entry's lifetime. This
        // mirrors the configured-primary preference rather than any
        // health-derived ordering.
        if self.config.down_cache {
            if let Some(first) = set.first() {
                debug!(server = %first.name, "Bypassing down cache for last-resort attempt");
                if let Ok(response) = self.dispatcher.attempt(first, ctx).await {
                    return annotate(response, &first.name);
                }
            }
        }

        warn!(host = %ctx.original_host, "All candidates exhausted");
        service_unavailable()
    }
}

fn annotate(mut response: Response<Body>, server: &str) -> Response<Body> {
    if let Ok(value) = HeaderValue::from_str(server) {
        response.headers_mut().insert(SERVED_BY_HEADER, value);
    }
    response
}

/// Synthetic response when every candidate failed
pub fn service_unavailable() -> Response<Body> {
    Response::builder()
        .status(StatusCode::SERVICE_UNAVAILABLE)
        .header(CONTENT_TYPE, "text/html")
        .body(Body::from(UNAVAILABLE_BODY))
        .unwrap_or_else(|_| Response::new(Body::empty()))
}

/// Synthetic response for an unconfigured hostname
pub fn tenant_not_found() -> Response<Body> {
    Response::builder()
        .status(StatusCode::NOT_FOUND)
        .header(CONTENT_TYPE, "text/html")
        .body(Body::from(NOT_FOUND_BODY))
        .unwrap_or_else(|_| Response::new(Body::empty()))
}
