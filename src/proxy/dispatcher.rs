use hyper::header::{HeaderValue, HOST};
use hyper::{Body, Request, Response, StatusCode, Uri};
use std::sync::Arc;
use std::time::Instant;
use tracing::{debug, warn};

use crate::config::{EngineConfig, ServerDescriptor};
use crate::error::{ShuntError, ShuntResult};
use crate::health::HealthStore;
use crate::proxy::context::RequestContext;
use crate::proxy::upstream;

/// Why a single dispatch attempt failed
#[derive(Debug, Clone)]
pub enum DispatchFailure {
    /// Connect failure or local timeout; the backend never answered
    Unreachable { reason: String },
    /// The backend answered with a 5xx; its response is discarded
    Upstream { status: StatusCode },
}

impl std::fmt::Display for DispatchFailure {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            DispatchFailure::Unreachable { reason } => write!(f, "unreachable: {}", reason),
            DispatchFailure::Upstream { status } => write!(f, "upstream status {}", status),
        }
    }
}

/// Executes bounded attempts against one server and reports outcomes
/// into the health store.
///
/// Failover is triggered by transport failure or 5xx only: redirects and
/// 4xx are successful attempts whose responses pass through verbatim.
#[derive(Debug, Clone)]
pub struct Dispatcher {
    store: Arc<HealthStore>,
    config: Arc<EngineConfig>,
}

impl Dispatcher {
    pub fn new(store: Arc<HealthStore>, config: Arc<EngineConfig>) -> Self {
        Self { store, config }
    }

    /// One attempt, possibly repeated against the same server up to the
    /// configured retry count. The smart policy disables same-server
    /// retries and relies on health-gated selection instead.
    pub async fn dispatch(
        &self,
        descriptor: &ServerDescriptor,
        ctx: &RequestContext,
    ) -> Result<Response<Body>, DispatchFailure> {
        let attempts = 1 + self.config.effective_retries();
        let mut last_failure = None;

        for attempt in 0..attempts {
            match self.attempt(descriptor, ctx).await {
                Ok(response) => return Ok(response),
                Err(failure) => {
                    debug!(
                        server = %descriptor.name,
                        attempt = attempt + 1,
                        attempts,
                        failure = %failure,
                        "Dispatch attempt failed"
                    );
                    last_failure = Some(failure);
                }
            }
        }

        Err(last_failure.unwrap_or_else(|| DispatchFailure::Unreachable {
            reason: "no attempt executed".to_string(),
        }))
    }

    /// Execute exactly one timeout-bounded attempt and record the outcome.
    pub async fn attempt(
        &self,
        descriptor: &ServerDescriptor,
        ctx: &RequestContext,
    ) -> Result<Response<Body>, DispatchFailure> {
        let outbound = match build_outbound_request(descriptor, ctx) {
            Ok(req) => req,
            Err(e) => {
                // A malformed target is indistinguishable from an
                // unreachable one from the caller's point of view.
                self.report_failure(descriptor);
                return Err(DispatchFailure::Unreachable {
                    reason: e.to_string(),
                });
            }
        };

        let started = Instant::now();
        let deadline = self.config.dispatch_timeout();

        let result = tokio::time::timeout(deadline, upstream::client().request(outbound)).await;
        let latency_ms = started.elapsed().as_secs_f64() * 1000.0;

        match result {
            Err(_) => {
                warn!(server = %descriptor.name, timeout = ?deadline, "Dispatch timed out");
                self.report_failure(descriptor);
                Err(DispatchFailure::Unreachable {
                    reason: format!("timed out after {:?}", deadline),
                })
            }
            Ok(Err(e)) => {
                warn!(server = %descriptor.name, error = %e, "Dispatch failed");
                self.report_failure(descriptor);
                Err(DispatchFailure::Unreachable {
                    reason: e.to_string(),
                })
            }
            Ok(Ok(response)) if response.status().is_server_error() => {
                let status = response.status();
                warn!(server = %descriptor.name, status = %status, "Backend returned server error");
                self.report_failure(descriptor);
                Err(DispatchFailure::Upstream { status })
            }
            Ok(Ok(response)) => {
                debug!(
                    server = %descriptor.name,
                    status = %response.status(),
                    latency_ms = latency_ms as u64,
                    "Dispatch succeeded"
                );
                self.store.record_success(&descriptor.name, latency_ms);
                self.store.mark_up(&descriptor.name);
                Ok(response)
            }
        }
    }

    fn report_failure(&self, descriptor: &ServerDescriptor) {
        self.store.record_failure(&descriptor.name);
        if self.config.down_cache {
            self.store.mark_down(&descriptor.name);
        }
    }
}

/// Build the outbound request: substitute the server's host into the
/// inbound path and query, strip hop-by-hop headers, rewrite Host, and
/// inject the forwarding headers the backend relies on.
fn build_outbound_request(
    descriptor: &ServerDescriptor,
    ctx: &RequestContext,
) -> ShuntResult<Request<Body>> {
    let base: Uri = descriptor.base_url().parse()?;
    let scheme = base.scheme_str().unwrap_or("https");
    let authority = base
        .authority()
        .ok_or_else(|| ShuntError::config(format!("target missing authority: {}", descriptor.host)))?;

    let uri: Uri = format!("{}://{}{}", scheme, authority, ctx.path_and_query).parse()?;

    let mut builder = Request::builder().method(ctx.method.clone()).uri(uri);

    let mut headers = ctx.headers.clone();
    upstream::strip_hop_by_hop_headers(&mut headers);
    headers.insert(HOST, authority.as_str().parse().map_err(|_| {
        ShuntError::config(format!("invalid authority: {}", authority))
    })?);

    // Forwarding headers are overwritten, not merely defaulted: the
    // backend must see this engine's view, not whatever arrived inbound.
    headers.insert(
        "x-forwarded-host",
        HeaderValue::from_str(&ctx.original_host)
            .unwrap_or_else(|_| HeaderValue::from_static("unknown")),
    );
    headers.insert(
        "x-forwarded-proto",
        HeaderValue::from_static(if scheme == "https" { "https" } else { "http" }),
    );
    if let Some(ip) = ctx.client_ip {
        let forwarded = match ctx.headers.get("x-forwarded-for").and_then(|v| v.to_str().ok()) {
            Some(existing) => format!("{}, {}", existing, ip),
            None => ip.to_string(),
        };
        if let Ok(value) = HeaderValue::from_str(&forwarded) {
            headers.insert("x-forwarded-for", value);
        }
        if let Ok(value) = HeaderValue::from_str(&ip.to_string()) {
            headers.insert("x-real-ip", value);
        }
    }

    if let Some(h) = builder.headers_mut() {
        *h = headers;
    }

    Ok(builder.body(Body::from(ctx.body.clone()))?)
}
