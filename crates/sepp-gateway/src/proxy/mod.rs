//! SBI forwarding proxy.
//!
//! Every request accepted on the SBI listener is relayed to the peer that is
//! currently negotiated.  The route (target URL + mutual-TLS client) is built
//! lazily and cached; it is rebuilt only when the negotiated peer changes.

pub mod route;

pub use route::{MutualTlsRouteBuilder, ProxyRoute, RouteBuilder, resolve_target};

use crate::context::SeppContext;
use crate::error::ProxyError;
use crate::tls::PeerCertificates;
use axum::{
    Router,
    body::{Body, Bytes},
    extract::{Request, State},
    http::{HeaderMap, HeaderName, header},
    response::{IntoResponse, Response},
};
use http_body_util::{BodyExt, LengthLimitError, Limited};
use std::collections::HashSet;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;
use tokio::sync::Mutex;
use tracing::{info, instrument, warn};

/// Largest request body relayed upstream.
pub const MAX_BODY_BYTES: usize = 16 * 1024 * 1024;

/// Upper bound on one upstream exchange, response body included.
pub const UPSTREAM_TIMEOUT: Duration = Duration::from_secs(30);

fn is_hop_by_hop(name: &HeaderName) -> bool {
    matches!(
        name.as_str(),
        "connection"
            | "keep-alive"
            | "proxy-authenticate"
            | "proxy-authorization"
            | "te"
            | "trailer"
            | "transfer-encoding"
            | "upgrade"
    )
}

pub struct ForwardingProxy {
    ctx: Arc<SeppContext>,
    builder: Box<dyn RouteBuilder>,
    route: Mutex<Option<ProxyRoute>>,
    rebuilds: AtomicU64,
    upstream_timeout: Duration,
    body_limit: usize,
}

impl ForwardingProxy {
    pub fn new(ctx: Arc<SeppContext>, builder: impl RouteBuilder + 'static) -> Self {
        Self {
            ctx,
            builder: Box::new(builder),
            route: Mutex::new(None),
            rebuilds: AtomicU64::new(0),
            upstream_timeout: UPSTREAM_TIMEOUT,
            body_limit: MAX_BODY_BYTES,
        }
    }

    pub fn with_upstream_timeout(mut self, timeout: Duration) -> Self {
        self.upstream_timeout = timeout;
        self
    }

    pub fn with_body_limit(mut self, limit: usize) -> Self {
        self.body_limit = limit;
        self
    }

    /// How many times a route has been built.
    pub fn rebuild_count(&self) -> u64 {
        self.rebuilds.load(Ordering::Relaxed)
    }

    /// Relay one request to the negotiated peer.
    #[instrument(skip_all, fields(method = %request.method(), uri = %request.uri()))]
    pub async fn forward(&self, request: Request) -> Result<Response, ProxyError> {
        if request.extensions().get::<PeerCertificates>().is_none() {
            return Err(ProxyError::Unauthenticated);
        }

        let peer = self
            .ctx
            .remote_fqdn()
            .filter(|peer| !peer.is_empty())
            .ok_or(ProxyError::NotNegotiated)?;
        let target = resolve_target(&peer)?;

        let (parts, body) = request.into_parts();
        let body = read_body(body, self.body_limit).await?;

        // Held across the send: route swaps and forwards are serialized, and
        // a silent peer holds the slot for at most `upstream_timeout`.
        let mut slot = self.route.lock().await;
        let route = match slot.take() {
            Some(route) if route.target == target => route,
            previous => {
                let route = self.builder.build(&target)?;
                self.rebuilds.fetch_add(1, Ordering::Relaxed);
                info!(
                    target = %target,
                    previous = previous.as_ref().map(|r| r.target.as_str()),
                    "forwarding route rebuilt"
                );
                route
            }
        };
        let route = slot.insert(route);

        let mut url = route.target.clone();
        let base = route.target.path().trim_end_matches('/');
        url.set_path(&format!("{base}{}", parts.uri.path()));
        url.set_query(parts.uri.query());

        let upstream = route
            .client
            .request(parts.method, url)
            .headers(strip_hop_by_hop(&parts.headers, true))
            .body(body)
            .timeout(self.upstream_timeout)
            .send()
            .await
            .map_err(|e| ProxyError::Upstream(e.to_string()))?;
        drop(slot);

        let status = upstream.status();
        let headers = strip_hop_by_hop(upstream.headers(), false);
        let bytes = upstream
            .bytes()
            .await
            .map_err(|e| ProxyError::Upstream(e.to_string()))?;

        let mut response = Response::new(Body::from(bytes));
        *response.status_mut() = status;
        *response.headers_mut() = headers;
        Ok(response)
    }
}

async fn read_body(body: Body, limit: usize) -> Result<Bytes, ProxyError> {
    match Limited::new(body, limit).collect().await {
        Ok(collected) => Ok(collected.to_bytes()),
        Err(e) if e.is::<LengthLimitError>() => Err(ProxyError::PayloadTooLarge(limit)),
        Err(e) => Err(ProxyError::InvalidRequest(e.to_string())),
    }
}

/// Copy `headers` minus hop-by-hop fields, including any the `Connection`
/// header names.  Outbound requests also drop `host` and `content-length`,
/// which the client recomputes.
fn strip_hop_by_hop(headers: &HeaderMap, outbound: bool) -> HeaderMap {
    let listed: HashSet<String> = headers
        .get_all(header::CONNECTION)
        .iter()
        .filter_map(|value| value.to_str().ok())
        .flat_map(|value| value.split(','))
        .map(|token| token.trim().to_ascii_lowercase())
        .filter(|token| !token.is_empty())
        .collect();

    let mut out = HeaderMap::with_capacity(headers.len());
    for (name, value) in headers {
        if is_hop_by_hop(name) || listed.contains(name.as_str()) {
            continue;
        }
        if outbound && (*name == header::HOST || *name == header::CONTENT_LENGTH) {
            continue;
        }
        out.append(name.clone(), value.clone());
    }
    out
}

pub async fn proxy_handler(
    State(proxy): State<Arc<ForwardingProxy>>,
    request: Request,
) -> Response {
    match proxy.forward(request).await {
        Ok(response) => response,
        Err(e) => {
            warn!(error = %e, status = %e.status(), "forwarding failed");
            e.into_response()
        }
    }
}

/// Every path on the SBI listener is forwarded.
pub fn sbi_router(proxy: Arc<ForwardingProxy>) -> Router {
    Router::new().fallback(proxy_handler).with_state(proxy)
}
