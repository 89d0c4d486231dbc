//! WebSocket pass-through: upgrade handshake forwarding, single
//! handshake failover, and the raw byte tunnel.

use hyper::header::{HOST, UPGRADE};
use hyper::service::{make_service_fn, service_fn};
use hyper::{Body, Client, Request, Response, Server, StatusCode};
use std::convert::Infallible;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;
use tokio::io::{AsyncReadExt, AsyncWriteExt};

use shunt::config::{EngineConfig, ServerDescriptor, TenantConfig, TenantRouter};
use shunt::health::HealthStore;
use shunt::proxy::{FailoverOrchestrator, ProxyHandler};

/// Backend that accepts the upgrade and echoes the first frame of bytes
async fn spawn_ws_echo_backend() -> SocketAddr {
    let make_svc = make_service_fn(|_| async {
        Ok::<_, Infallible>(service_fn(|mut req: Request<Body>| async move {
            if req.headers().contains_key(UPGRADE) {
                tokio::spawn(async move {
                    if let Ok(mut upgraded) = hyper::upgrade::on(&mut req).await {
                        let mut buf = vec![0u8; 64];
                        if let Ok(n) = upgraded.read(&mut buf).await {
                            let _ = upgraded.write_all(&buf[..n]).await;
                        }
                    }
                });
                Ok::<_, Infallible>(
                    Response::builder()
                        .status(StatusCode::SWITCHING_PROTOCOLS)
                        .header("connection", "upgrade")
                        .header("upgrade", "websocket")
                        .header("sec-websocket-accept", "s3pPLMBiTxaQ9kYGzzhZRbK+xOo=")
                        .body(Body::empty())
                        .unwrap(),
                )
            } else {
                Ok(Response::new(Body::from("not a websocket endpoint")))
            }
        }))
    });
    let server = Server::bind(&"127.0.0.1:0".parse().unwrap()).serve(make_svc);
    let addr = server.local_addr();
    tokio::spawn(server);
    addr
}

/// Bind the proxy handler on an ephemeral port
async fn spawn_proxy(servers: Vec<(&str, SocketAddr)>) -> SocketAddr {
    let engine = Arc::new(EngineConfig {
        dispatch_timeout_secs: 2,
        retries: 0,
        ..Default::default()
    });
    let store = Arc::new(HealthStore::new(
        engine.failure_threshold,
        engine.circuit_reset(),
        engine.down_ttl(),
    ));
    let tenants = vec![TenantConfig {
        hostname: "app.example.com".to_string(),
        servers: servers
            .into_iter()
            .map(|(name, addr)| ServerDescriptor {
                name: name.to_string(),
                host: format!("http://{}", addr),
                weight: 50,
            })
            .collect(),
    }];
    let handler = ProxyHandler::new(
        TenantRouter::new(tenants),
        FailoverOrchestrator::new(store, engine),
    );

    let make_svc = make_service_fn(move |_| {
        let handler = handler.clone();
        async move {
            Ok::<_, Infallible>(service_fn(move |req| {
                let handler = handler.clone();
                async move { handler.handle_request(req).await }
            }))
        }
    });
    let server = Server::bind(&"127.0.0.1:0".parse().unwrap()).serve(make_svc);
    let addr = server.local_addr();
    tokio::spawn(server);
    addr
}

fn upgrade_request(proxy: SocketAddr) -> Request<Body> {
    Request::builder()
        .method("GET")
        .uri(format!("http://{}/ws", proxy))
        .header(HOST, "app.example.com")
        .header("Connection", "Upgrade")
        .header("Upgrade", "websocket")
        .header("Sec-WebSocket-Key", "dGhlIHNhbXBsZSBub25jZQ==")
        .header("Sec-WebSocket-Version", "13")
        .body(Body::empty())
        .unwrap()
}

#[tokio::test]
async fn test_upgrade_tunnels_bytes_end_to_end() {
    tokio::time::timeout(Duration::from_secs(15), async {
        let backend = spawn_ws_echo_backend().await;
        let proxy = spawn_proxy(vec![("primary", backend)]).await;

        let response = Client::new().request(upgrade_request(proxy)).await.unwrap();
        assert_eq!(response.status(), StatusCode::SWITCHING_PROTOCOLS);
        assert_eq!(
            response.headers().get("sec-websocket-accept").unwrap(),
            "s3pPLMBiTxaQ9kYGzzhZRbK+xOo="
        );

        let mut upgraded = hyper::upgrade::on(response).await.unwrap();
        upgraded.write_all(b"ping").await.unwrap();

        let mut buf = [0u8; 4];
        upgraded.read_exact(&mut buf).await.unwrap();
        assert_eq!(&buf, b"ping");
    })
    .await
    .expect("test_upgrade_tunnels_bytes_end_to_end timed out");
}

#[tokio::test]
async fn test_handshake_fails_over_once_to_backup() {
    tokio::time::timeout(Duration::from_secs(15), async {
        // First candidate: nothing listening
        let dead = {
            let l = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
            l.local_addr().unwrap()
        };
        let backend = spawn_ws_echo_backend().await;
        let proxy = spawn_proxy(vec![("primary", dead), ("backup", backend)]).await;

        let response = Client::new().request(upgrade_request(proxy)).await.unwrap();
        assert_eq!(response.status(), StatusCode::SWITCHING_PROTOCOLS);

        let mut upgraded = hyper::upgrade::on(response).await.unwrap();
        upgraded.write_all(b"over").await.unwrap();

        let mut buf = [0u8; 4];
        upgraded.read_exact(&mut buf).await.unwrap();
        assert_eq!(&buf, b"over");
    })
    .await
    .expect("test_handshake_fails_over_once_to_backup timed out");
}

#[tokio::test]
async fn test_both_handshakes_fail_yields_503() {
    tokio::time::timeout(Duration::from_secs(15), async {
        let dead_a = {
            let l = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
            l.local_addr().unwrap()
        };
        let dead_b = {
            let l = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
            l.local_addr().unwrap()
        };
        let proxy = spawn_proxy(vec![("primary", dead_a), ("backup", dead_b)]).await;

        let response = Client::new().request(upgrade_request(proxy)).await.unwrap();
        assert_eq!(response.status(), StatusCode::SERVICE_UNAVAILABLE);
    })
    .await
    .expect("test_both_handshakes_fail_yields_503 timed out");
}
