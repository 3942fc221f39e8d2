//! Forwarding routes and how they are built.

use crate::error::ProxyError;
use crate::tls::ClientTlsMaterial;
use reqwest::Url;
use sepp_kernel::n32::Fqdn;

/// A ready-to-use upstream: where to send and which client to send with.
#[derive(Debug, Clone)]
pub struct ProxyRoute {
    pub target: Url,
    pub client: reqwest::Client,
}

/// Builds the route for a new target.
pub trait RouteBuilder: Send + Sync {
    fn build(&self, target: &Url) -> Result<ProxyRoute, ProxyError>;
}

/// Routes that present this gateway's client identity to the peer.
#[derive(Debug, Clone)]
pub struct MutualTlsRouteBuilder {
    material: ClientTlsMaterial,
}

impl MutualTlsRouteBuilder {
    pub fn new(material: ClientTlsMaterial) -> Self {
        Self { material }
    }
}

impl RouteBuilder for MutualTlsRouteBuilder {
    fn build(&self, target: &Url) -> Result<ProxyRoute, ProxyError> {
        let client = self
            .material
            .http_client()
            .map_err(|e| ProxyError::RouteBuild(e.to_string()))?;
        Ok(ProxyRoute {
            target: target.clone(),
            client,
        })
    }
}

/// Upstream URL for a negotiated peer.
///
/// A bare FQDN (optionally with a port) becomes `https://<fqdn>`; an identity
/// that already carries a scheme is used as-is.
pub fn resolve_target(peer: &Fqdn) -> Result<Url, ProxyError> {
    let raw = peer.as_str().trim();
    let raw = if raw.contains("://") {
        raw.to_string()
    } else {
        format!("https://{raw}")
    };
    let url = Url::parse(&raw).map_err(|e| ProxyError::InvalidTarget(format!("{raw}: {e}")))?;
    if url.host_str().is_none_or(str::is_empty) {
        return Err(ProxyError::InvalidTarget(format!("{raw}: missing host")));
    }
    Ok(url)
}
