use hyper::client::HttpConnector;
use hyper::{Body, Client};
use once_cell::sync::Lazy;
use std::time::Duration;

/// Shared hyper client with connection pooling (HTTP/HTTPS via rustls).
///
/// A single client instance is reused across requests so upstream
/// connections are pooled instead of churned per attempt. Supports both
/// http and https targets.
static SHARED_CLIENT: Lazy<Client<hyper_rustls::HttpsConnector<HttpConnector>, Body>> =
    Lazy::new(build_client);

/// Get the shared pooled client
pub fn client() -> &'static Client<hyper_rustls::HttpsConnector<HttpConnector>, Body> {
    &SHARED_CLIENT
}

fn build_client() -> Client<hyper_rustls::HttpsConnector<HttpConnector>, Body> {
    let mut http = HttpConnector::new();
    http.enforce_http(false); // allow https targets through the base connector
    http.set_nodelay(true);

    let https = hyper_rustls::HttpsConnectorBuilder::new()
        .with_webpki_roots()
        .https_or_http()
        .enable_http1()
        .wrap_connector(http);

    Client::builder()
        .pool_idle_timeout(Duration::from_secs(90))
        .pool_max_idle_per_host(32)
        .build::<_, Body>(https)
}

/// Check if a header is hop-by-hop per RFC 7230
pub fn is_hop_by_hop_header(name: &str) -> bool {
    matches!(
        name.to_ascii_lowercase().as_str(),
        "connection"
            | "keep-alive"
            | "proxy-authenticate"
            | "proxy-authorization"
            | "te"
            | "trailers"
            | "transfer-encoding"
            | "upgrade"
    )
}

/// Remove hop-by-hop headers, including any extras named by Connection
pub fn strip_hop_by_hop_headers(headers: &mut hyper::HeaderMap) {
    // Names listed in the Connection header are hop-by-hop too
    let extra: Vec<String> = headers
        .get("connection")
        .and_then(|v| v.to_str().ok())
        .map(|v| v.split(',').map(|s| s.trim().to_ascii_lowercase()).collect())
        .unwrap_or_default();

    const HOP_HEADERS: &[&str] = &[
        "connection",
        "keep-alive",
        "proxy-authenticate",
        "proxy-authorization",
        "te",
        "trailers",
        "transfer-encoding",
        "upgrade",
    ];
    for h in HOP_HEADERS {
        headers.remove(*h);
    }
    for name in extra {
        headers.remove(name.as_str());
    }
}
