//! Filtering HTTP/HTTPS proxy.
//!
//! The sole egress path for sandboxed processes when network restriction is
//! active. Terminates `CONNECT` tunnels and plain HTTP requests, consults
//! the current host filter for every connection, and records denies in the
//! violation store.

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use bytes::Bytes;
use http_body_util::{combinators::BoxBody, BodyExt, Empty, Full};
use hyper::server::conn::http1;
use hyper::service::service_fn;
use hyper::{Method, Request, Response, StatusCode};
use hyper_util::rt::TokioIo;
use parking_lot::RwLock;
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::oneshot;

use crate::error::SandboxError;
use crate::proxy::filter::{AskCallback, HostDecision, HostFilter};
use crate::violation::{ViolationKind, ViolationRecord, ViolationStore};

/// Body of every deny response. Tests match on this phrase.
const DENY_BODY: &str = "blocked by network allowlist";

/// How long an ask callback may deliberate before the answer is deny.
const ASK_TIMEOUT: Duration = Duration::from_secs(30);

/// Live host-filter cell shared between the manager and proxy tasks.
///
/// Readers clone the inner `Arc` under a short read lock; updates swap the
/// pointer under a write lock. In-flight connections decide against the
/// snapshot current at decision time, not accept time.
#[derive(Default)]
pub struct FilterHandle {
    inner: RwLock<Arc<HostFilter>>,
}

impl FilterHandle {
    pub fn new(filter: HostFilter) -> Self {
        Self {
            inner: RwLock::new(Arc::new(filter)),
        }
    }

    pub fn current(&self) -> Arc<HostFilter> {
        self.inner.read().clone()
    }

    pub fn replace(&self, filter: HostFilter) {
        *self.inner.write() = Arc::new(filter);
    }
}

/// Shared per-proxy context.
struct ProxyContext {
    filter: Arc<FilterHandle>,
    violations: Arc<ViolationStore>,
    ask: Option<AskCallback>,
}

impl ProxyContext {
    /// Full decision for a `(host, port)`: static rules, then the ask
    /// callback when the rules alone would deny. Ask results are never
    /// cached, so a policy update invalidates them for free.
    async fn decide(&self, host: &str, port: u16) -> Decision {
        let decision = self.filter.current().evaluate(host, port);
        match decision {
            HostDecision::Allow => Decision::Allow,
            HostDecision::DeniedByRule(rule) => Decision::Deny(Some(rule)),
            HostDecision::NotAllowed => match &self.ask {
                Some(ask) => {
                    match tokio::time::timeout(ASK_TIMEOUT, ask(host, port)).await {
                        Ok(true) => Decision::Allow,
                        Ok(false) => Decision::Deny(None),
                        Err(_) => {
                            tracing::debug!("Ask callback timed out for {}:{}", host, port);
                            Decision::Deny(None)
                        }
                    }
                }
                None => Decision::Deny(None),
            },
        }
    }

    fn record_deny(&self, host: &str, matched_rule: Option<String>) {
        let mut record = ViolationRecord::new(ViolationKind::Network, host);
        if let Some(rule) = matched_rule {
            record = record.with_rule(rule);
        }
        self.violations.record(record);
    }
}

enum Decision {
    Allow,
    Deny(Option<String>),
}

/// Filtering proxy server bound to an ephemeral loopback port.
pub struct HttpProxy {
    listener: Option<TcpListener>,
    port: u16,
    context: Arc<ProxyContext>,
    shutdown_tx: Option<oneshot::Sender<()>>,
}

impl HttpProxy {
    /// Bind the proxy on localhost. The port is stable until the proxy is
    /// dropped or stopped.
    pub async fn bind(
        filter: Arc<FilterHandle>,
        violations: Arc<ViolationStore>,
        ask: Option<AskCallback>,
    ) -> Result<Self, SandboxError> {
        let listener = TcpListener::bind("127.0.0.1:0")
            .await
            .map_err(|e| SandboxError::ProxyBindFailed(e.to_string()))?;
        let port = listener
            .local_addr()
            .map_err(|e| SandboxError::ProxyBindFailed(e.to_string()))?
            .port();

        tracing::debug!("Filtering proxy listening on port {}", port);

        Ok(Self {
            listener: Some(listener),
            port,
            context: Arc::new(ProxyContext {
                filter,
                violations,
                ask,
            }),
            shutdown_tx: None,
        })
    }

    pub fn port(&self) -> u16 {
        self.port
    }

    /// Start the accept loop. Each connection is handled on its own task;
    /// per-connection faults never take the listener down.
    pub fn start(&mut self) -> Result<(), SandboxError> {
        let listener = self
            .listener
            .take()
            .ok_or_else(|| SandboxError::ProxyBindFailed("proxy already started".to_string()))?;

        let context = self.context.clone();
        let (shutdown_tx, mut shutdown_rx) = oneshot::channel();
        self.shutdown_tx = Some(shutdown_tx);

        tokio::spawn(async move {
            loop {
                tokio::select! {
                    accept_result = listener.accept() => {
                        match accept_result {
                            Ok((stream, addr)) => {
                                let context = context.clone();
                                tokio::spawn(async move {
                                    if let Err(e) = handle_connection(stream, addr, context).await {
                                        tracing::debug!("Connection error from {}: {}", addr, e);
                                    }
                                });
                            }
                            Err(e) => {
                                tracing::error!("Accept error: {}", e);
                            }
                        }
                    }
                    _ = &mut shutdown_rx => {
                        tracing::debug!("Filtering proxy shutting down");
                        break;
                    }
                }
            }
        });

        Ok(())
    }

    /// Stop the proxy. In-flight connections are dropped without drain.
    pub fn stop(&mut self) {
        if let Some(tx) = self.shutdown_tx.take() {
            let _ = tx.send(());
        }
    }
}

async fn handle_connection(
    stream: TcpStream,
    _addr: SocketAddr,
    context: Arc<ProxyContext>,
) -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
    let io = TokioIo::new(stream);

    http1::Builder::new()
        .preserve_header_case(true)
        .title_case_headers(true)
        .serve_connection(
            io,
            service_fn(move |req| {
                let context = context.clone();
                async move { handle_request(req, context).await }
            }),
        )
        .with_upgrades()
        .await?;

    Ok(())
}

async fn handle_request(
    req: Request<hyper::body::Incoming>,
    context: Arc<ProxyContext>,
) -> Result<Response<BoxBody<Bytes, hyper::Error>>, hyper::Error> {
    if req.method() == Method::CONNECT {
        handle_connect(req, context).await
    } else {
        handle_http(req, context).await
    }
}

/// Handle a `CONNECT host:port` tunnel request.
async fn handle_connect(
    req: Request<hyper::body::Incoming>,
    context: Arc<ProxyContext>,
) -> Result<Response<BoxBody<Bytes, hyper::Error>>, hyper::Error> {
    let host = req.uri().host().unwrap_or_default().to_string();
    let port = req.uri().port_u16().unwrap_or(443);

    if host.is_empty() {
        return Ok(status_response(StatusCode::BAD_REQUEST, "missing CONNECT target"));
    }

    tracing::debug!("CONNECT {}:{}", host, port);

    match context.decide(&host, port).await {
        Decision::Deny(rule) => {
            tracing::debug!("Denied CONNECT to {}:{}", host, port);
            context.record_deny(&host, rule);
            return Ok(deny_response());
        }
        Decision::Allow => {}
    }

    // Establish upstream before answering so a failed connect is a clean
    // 502 rather than a dead tunnel.
    let upstream = match TcpStream::connect((host.as_str(), port)).await {
        Ok(stream) => stream,
        Err(e) => {
            tracing::debug!("Upstream connect to {}:{} failed: {}", host, port, e);
            return Ok(status_response(
                StatusCode::BAD_GATEWAY,
                "failed to connect to target",
            ));
        }
    };

    tokio::spawn(async move {
        match hyper::upgrade::on(req).await {
            Ok(upgraded) => {
                if let Err(e) = tunnel(upgraded, upstream).await {
                    tracing::debug!("Tunnel error for {}:{}: {}", host, port, e);
                }
            }
            Err(e) => {
                tracing::debug!("Upgrade error: {}", e);
            }
        }
    });

    Ok(Response::new(empty_body()))
}

/// Splice bytes both ways until either side closes.
async fn tunnel(
    upgraded: hyper::upgrade::Upgraded,
    upstream: TcpStream,
) -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
    let mut upgraded = TokioIo::new(upgraded);
    let (mut upstream_read, mut upstream_write) = upstream.into_split();
    let (mut client_read, mut client_write) = tokio::io::split(&mut upgraded);

    let client_to_server = tokio::io::copy(&mut client_read, &mut upstream_write);
    let server_to_client = tokio::io::copy(&mut upstream_read, &mut client_write);

    tokio::try_join!(client_to_server, server_to_client)?;

    Ok(())
}

/// Handle a plain HTTP request (absolute-form URI or `Host:` header).
async fn handle_http(
    req: Request<hyper::body::Incoming>,
    context: Arc<ProxyContext>,
) -> Result<Response<BoxBody<Bytes, hyper::Error>>, hyper::Error> {
    let host = req
        .uri()
        .host()
        .map(str::to_string)
        .or_else(|| {
            req.headers()
                .get(hyper::header::HOST)
                .and_then(|h| h.to_str().ok())
                .map(|h| h.split(':').next().unwrap_or(h).to_string())
        })
        .unwrap_or_default();

    if host.is_empty() {
        return Ok(status_response(StatusCode::BAD_REQUEST, "missing host"));
    }

    let port = req.uri().port_u16().unwrap_or(80);

    tracing::debug!("HTTP {} {}:{}", req.method(), host, port);

    match context.decide(&host, port).await {
        Decision::Deny(rule) => {
            tracing::debug!("Denied HTTP to {}:{}", host, port);
            context.record_deny(&host, rule);
            return Ok(deny_response());
        }
        Decision::Allow => {}
    }

    forward_http(req, &host, port).await
}

/// Forward a plain HTTP request verbatim and stream the response back.
async fn forward_http(
    req: Request<hyper::body::Incoming>,
    host: &str,
    port: u16,
) -> Result<Response<BoxBody<Bytes, hyper::Error>>, hyper::Error> {
    let stream = match TcpStream::connect((host, port)).await {
        Ok(s) => s,
        Err(e) => {
            tracing::debug!("Failed to connect to {}:{}: {}", host, port, e);
            return Ok(status_response(
                StatusCode::BAD_GATEWAY,
                "failed to connect to target",
            ));
        }
    };

    let io = TokioIo::new(stream);

    let (mut sender, conn) = match hyper::client::conn::http1::handshake(io).await {
        Ok(c) => c,
        Err(e) => {
            tracing::debug!("Handshake with {}:{} failed: {}", host, port, e);
            return Ok(status_response(StatusCode::BAD_GATEWAY, "handshake failed"));
        }
    };

    tokio::spawn(async move {
        if let Err(e) = conn.await {
            tracing::debug!("Upstream connection error: {}", e);
        }
    });

    match sender.send_request(req).await {
        Ok(resp) => Ok(resp.map(|b| b.boxed())),
        Err(e) => {
            tracing::debug!("Upstream request error: {}", e);
            Ok(status_response(StatusCode::BAD_GATEWAY, "request failed"))
        }
    }
}

fn deny_response() -> Response<BoxBody<Bytes, hyper::Error>> {
    Response::builder()
        .status(StatusCode::FORBIDDEN)
        .header(hyper::header::CONTENT_LENGTH, DENY_BODY.len())
        .body(full_body(DENY_BODY))
        .unwrap()
}

fn status_response(
    status: StatusCode,
    body: &str,
) -> Response<BoxBody<Bytes, hyper::Error>> {
    Response::builder()
        .status(status)
        .body(full_body(body))
        .unwrap()
}

fn empty_body() -> BoxBody<Bytes, hyper::Error> {
    Empty::<Bytes>::new().map_err(|never| match never {}).boxed()
}

fn full_body(s: &str) -> BoxBody<Bytes, hyper::Error> {
    Full::new(Bytes::from(s.to_string()))
        .map_err(|never| match never {})
        .boxed()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::policy::NetworkRestriction;
    use tokio::io::{AsyncReadExt, AsyncWriteExt};

    fn restriction(allowed: &[&str], denied: &[&str]) -> NetworkRestriction {
        NetworkRestriction {
            allowed_hosts: allowed.iter().map(|s| s.to_string()).collect(),
            denied_hosts: denied.iter().map(|s| s.to_string()).collect(),
        }
    }

    async fn start_proxy(
        filter: HostFilter,
        ask: Option<AskCallback>,
    ) -> (HttpProxy, Arc<FilterHandle>, Arc<ViolationStore>) {
        let handle = Arc::new(FilterHandle::new(filter));
        let violations = Arc::new(ViolationStore::new());
        let mut proxy = HttpProxy::bind(handle.clone(), violations.clone(), ask)
            .await
            .unwrap();
        proxy.start().unwrap();
        (proxy, handle, violations)
    }

    async fn send_connect(port: u16, target: &str) -> String {
        let mut stream = TcpStream::connect(("127.0.0.1", port)).await.unwrap();
        let request = format!("CONNECT {target} HTTP/1.1\r\nHost: {target}\r\n\r\n");
        stream.write_all(request.as_bytes()).await.unwrap();

        let mut buf = vec![0u8; 4096];
        let n = stream.read(&mut buf).await.unwrap();
        String::from_utf8_lossy(&buf[..n]).to_string()
    }

    #[tokio::test]
    async fn test_connect_denied_host_gets_403() {
        let filter =
            HostFilter::from_restriction(&restriction(&["example.com"], &[]));
        let (proxy, _handle, violations) = start_proxy(filter, None).await;
        let port = proxy.port();

        let response = send_connect(port, "other.com:443").await;
        assert!(response.starts_with("HTTP/1.1 403"), "got: {response}");
        assert!(response.contains("blocked by network allowlist"));

        let recorded = violations.recent(None);
        assert_eq!(recorded.len(), 1);
        assert_eq!(recorded[0].target, "other.com");
        assert_eq!(recorded[0].kind, ViolationKind::Network);
    }

    #[tokio::test]
    async fn test_connect_allowed_host_gets_200() {
        // Loopback upstream stands in for the remote host.
        let upstream = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let upstream_port = upstream.local_addr().unwrap().port();
        tokio::spawn(async move {
            let _ = upstream.accept().await;
        });

        let filter = HostFilter::from_restriction(&restriction(&["127.0.0.1"], &[]));
        let (proxy, _handle, violations) = start_proxy(filter, None).await;
        let port = proxy.port();

        let response = send_connect(port, &format!("127.0.0.1:{upstream_port}")).await;
        assert!(response.starts_with("HTTP/1.1 200"), "got: {response}");
        assert_eq!(violations.count(), 0);
    }

    #[tokio::test]
    async fn test_live_filter_update_opens_access() {
        let upstream = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let upstream_port = upstream.local_addr().unwrap().port();
        tokio::spawn(async move {
            loop {
                if upstream.accept().await.is_err() {
                    break;
                }
            }
        });

        // Empty allow list: deny-all, but the proxy stays up.
        let (proxy, handle, _violations) =
            start_proxy(HostFilter::deny_all(), None).await;
        let port = proxy.port();

        let target = format!("127.0.0.1:{upstream_port}");
        let denied = send_connect(port, &target).await;
        assert!(denied.starts_with("HTTP/1.1 403"));

        // Same port, new snapshot.
        handle.replace(HostFilter::from_restriction(&restriction(
            &["127.0.0.1"],
            &[],
        )));

        let allowed = send_connect(port, &target).await;
        assert!(allowed.starts_with("HTTP/1.1 200"), "got: {allowed}");
    }

    #[tokio::test]
    async fn test_plain_http_denied_gets_403_with_phrase() {
        let filter = HostFilter::deny_all();
        let (proxy, _handle, _violations) = start_proxy(filter, None).await;
        let port = proxy.port();

        let mut stream = TcpStream::connect(("127.0.0.1", port)).await.unwrap();
        stream
            .write_all(b"GET http://blocked.example/ HTTP/1.1\r\nHost: blocked.example\r\n\r\n")
            .await
            .unwrap();

        let mut buf = vec![0u8; 4096];
        let n = stream.read(&mut buf).await.unwrap();
        let response = String::from_utf8_lossy(&buf[..n]);
        assert!(response.starts_with("HTTP/1.1 403"), "got: {response}");
        assert!(response.contains("blocked by network allowlist"));
    }

    #[tokio::test]
    async fn test_connect_unreachable_upstream_gets_502() {
        // Bind-then-drop to find a port with nothing listening.
        let probe = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let dead_port = probe.local_addr().unwrap().port();
        drop(probe);

        let filter = HostFilter::from_restriction(&restriction(&["127.0.0.1"], &[]));
        let (proxy, _handle, _violations) = start_proxy(filter, None).await;
        let port = proxy.port();

        let response = send_connect(port, &format!("127.0.0.1:{dead_port}")).await;
        assert!(response.starts_with("HTTP/1.1 502"), "got: {response}");
    }

    #[tokio::test]
    async fn test_ask_callback_grants_access() {
        let upstream = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let upstream_port = upstream.local_addr().unwrap().port();
        tokio::spawn(async move {
            let _ = upstream.accept().await;
        });

        let ask: AskCallback =
            Arc::new(|host: &str, _port: u16| {
                let grant = host == "127.0.0.1";
                Box::pin(async move { grant })
            });

        let (proxy, _handle, _violations) =
            start_proxy(HostFilter::deny_all(), Some(ask)).await;
        let port = proxy.port();

        let response = send_connect(port, &format!("127.0.0.1:{upstream_port}")).await;
        assert!(response.starts_with("HTTP/1.1 200"), "got: {response}");
    }

    #[tokio::test]
    async fn test_ask_callback_not_consulted_for_denied_rule() {
        let ask: AskCallback =
            Arc::new(|_host: &str, _port: u16| Box::pin(async { true }));

        let filter =
            HostFilter::from_restriction(&restriction(&["*"], &["127.0.0.1"]));
        let (proxy, _handle, violations) = start_proxy(filter, Some(ask)).await;
        let port = proxy.port();

        let response = send_connect(port, "127.0.0.1:9").await;
        assert!(response.starts_with("HTTP/1.1 403"), "got: {response}");
        assert_eq!(
            violations.recent(None)[0].matched_rule.as_deref(),
            Some("127.0.0.1")
        );
    }
}
