use anyhow::Result;
use bytes::Bytes;
use hyper::header::HOST;
use hyper::{Body, HeaderMap, Method, Request};
use std::net::IpAddr;

/// Everything the engine needs to replay one inbound request across
/// failover attempts.
///
/// The body is materialized once into an immutable byte buffer rather
/// than kept as a single-consumption stream: failover requires sending
/// the same body to a different backend.
#[derive(Debug, Clone)]
pub struct RequestContext {
    pub method: Method,
    /// Path plus query, e.g. "/api/items?page=2"
    pub path_and_query: String,
    pub headers: HeaderMap,
    pub body: Bytes,
    /// Inbound Host header value, forwarded for multi-tenant dispatch
    pub original_host: String,
    pub client_ip: Option<IpAddr>,
}

impl RequestContext {
    /// Materialize an inbound hyper request. Consumes the request; the
    /// body is buffered fully so every attempt sees an identical copy.
    pub async fn from_request(req: Request<Body>, client_ip: Option<IpAddr>) -> Result<Self> {
        let (parts, body) = req.into_parts();

        let original_host = parts
            .headers
            .get(HOST)
            .and_then(|h| h.to_str().ok())
            .unwrap_or("unknown")
            .to_string();

        let path_and_query = parts
            .uri
            .path_and_query()
            .map(|pq| pq.as_str().to_string())
            .unwrap_or_else(|| "/".to_string());

        let body = hyper::body::to_bytes(body).await?;

        Ok(Self {
            method: parts.method,
            path_and_query,
            headers: parts.headers,
            body,
            original_host,
            client_ip,
        })
    }
}
