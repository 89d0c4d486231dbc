use hyper::header::{HeaderValue, HOST, UPGRADE};
use hyper::{Body, Request, Response, StatusCode, Uri};
use std::time::Instant;
use tracing::{debug, warn};

use crate::config::{EngineConfig, ServerDescriptor};
use crate::health::HealthStore;
use crate::proxy::orchestrator;
use crate::proxy::upstream;

/// Detect a WebSocket upgrade request: Connection lists "upgrade" and
/// Upgrade names "websocket".
pub fn is_upgrade_request(req: &Request<Body>) -> bool {
    let headers = req.headers();

    headers
        .get("connection")
        .and_then(|h| h.to_str().ok())
        .map(|s| s.to_ascii_lowercase().contains("upgrade"))
        .unwrap_or(false)
        && headers
            .get(UPGRADE)
            .and_then(|h| h.to_str().ok())
            .map(|s| s.eq_ignore_ascii_case("websocket"))
            .unwrap_or(false)
}

/// Pass-through tunnel: forward the upgrade handshake to the selected
/// server and, on 101, bridge both upgraded connections byte-for-byte.
///
/// Only the initial handshake may fail over, and at most once; once the
/// tunnel is up no retry or health scoring applies mid-stream. Handshake
/// outcomes still feed the health store.
pub async fn tunnel(
    inbound: Request<Body>,
    candidates: &[ServerDescriptor],
    store: &HealthStore,
    config: &EngineConfig,
) -> Response<Body> {
    for descriptor in candidates.iter().take(2) {
        let handshake = match build_handshake_request(descriptor, &inbound) {
            Ok(req) => req,
            Err(e) => {
                warn!(server = %descriptor.name, error = %e, "Invalid handshake target");
                record_failure(store, config, &descriptor.name);
                continue;
            }
        };

        let started = Instant::now();
        let result =
            tokio::time::timeout(config.dispatch_timeout(), upstream::client().request(handshake))
                .await;

        let upstream_response = match result {
            Ok(Ok(response)) if response.status().is_server_error() => {
                warn!(
                    server = %descriptor.name,
                    status = %response.status(),
                    "Handshake rejected with server error"
                );
                record_failure(store, config, &descriptor.name);
                continue;
            }
            Ok(Ok(response)) => response,
            Ok(Err(e)) => {
                warn!(server = %descriptor.name, error = %e, "Handshake failed");
                record_failure(store, config, &descriptor.name);
                continue;
            }
            Err(_) => {
                warn!(server = %descriptor.name, "Handshake timed out");
                record_failure(store, config, &descriptor.name);
                continue;
            }
        };

        let latency_ms = started.elapsed().as_secs_f64() * 1000.0;
        store.record_success(&descriptor.name, latency_ms);
        store.mark_up(&descriptor.name);

        if upstream_response.status() != StatusCode::SWITCHING_PROTOCOLS {
            // Backend declined the upgrade (auth failure, bad subprotocol,
            // ...). Not a server fault: pass the refusal through verbatim.
            debug!(
                server = %descriptor.name,
                status = %upstream_response.status(),
                "Backend declined upgrade"
            );
            return upstream_response;
        }

        return bridge(inbound, upstream_response, &descriptor.name);
    }

    orchestrator::service_unavailable()
}

/// Answer the client with the backend's 101 and splice both upgraded
/// connections together in a background task.
fn bridge(
    inbound: Request<Body>,
    upstream_response: Response<Body>,
    server: &str,
) -> Response<Body> {
    let mut builder = Response::builder().status(StatusCode::SWITCHING_PROTOCOLS);
    for (name, value) in upstream_response.headers() {
        builder = builder.header(name, value);
    }
    let client_response = match builder.body(Body::empty()) {
        Ok(response) => response,
        Err(e) => {
            warn!(server = %server, error = %e, "Failed to mirror upgrade response");
            return orchestrator::service_unavailable();
        }
    };

    let server = server.to_string();
    tokio::spawn(async move {
        let upgrades = tokio::try_join!(
            hyper::upgrade::on(inbound),
            hyper::upgrade::on(upstream_response)
        );
        match upgrades {
            Ok((mut client_io, mut server_io)) => {
                match tokio::io::copy_bidirectional(&mut client_io, &mut server_io).await {
                    Ok((tx, rx)) => {
                        debug!(server = %server, tx_bytes = tx, rx_bytes = rx, "Tunnel closed")
                    }
                    Err(e) => debug!(server = %server, error = %e, "Tunnel ended with error"),
                }
            }
            Err(e) => warn!(server = %server, error = %e, "Upgrade completion failed"),
        }
    });

    client_response
}

/// The handshake keeps the client's headers (including the hop-by-hop
/// upgrade negotiation set) and only rewrites Host and the forwarding
/// markers.
fn build_handshake_request(
    descriptor: &ServerDescriptor,
    inbound: &Request<Body>,
) -> anyhow::Result<Request<Body>> {
    let base: Uri = descriptor.base_url().parse()?;
    let scheme = base.scheme_str().unwrap_or("https");
    let authority = base
        .authority()
        .ok_or_else(|| anyhow::anyhow!("target missing authority: {}", descriptor.host))?;

    let path_and_query = inbound
        .uri()
        .path_and_query()
        .map(|pq| pq.as_str())
        .unwrap_or("/");
    let uri: Uri = format!("{}://{}{}", scheme, authority, path_and_query).parse()?;

    let original_host = inbound
        .headers()
        .get(HOST)
        .and_then(|h| h.to_str().ok())
        .unwrap_or("unknown")
        .to_string();

    let mut builder = Request::builder().method(inbound.method().clone()).uri(uri);

    let mut headers = inbound.headers().clone();
    headers.insert(HOST, authority.as_str().parse()?);
    headers.insert(
        "x-forwarded-host",
        HeaderValue::from_str(&original_host)
            .unwrap_or_else(|_| HeaderValue::from_static("unknown")),
    );

    if let Some(h) = builder.headers_mut() {
        *h = headers;
    }

    Ok(builder.body(Body::empty())?)
}

fn record_failure(store: &HealthStore, config: &EngineConfig, name: &str) {
    store.record_failure(name);
    if config.down_cache {
        store.mark_down(name);
    }
}
