//! Gateway error types

use axum::{
    Json,
    http::StatusCode,
    response::{IntoResponse, Response},
};
use sepp_kernel::config::ConfigError;
use sepp_kernel::n32::SecurityCapability;
use serde_json::json;
use thiserror::Error;

/// Fatal startup / runtime errors of the gateway process.
#[derive(Debug, Error)]
pub enum SeppError {
    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error(transparent)]
    Tls(#[from] TlsError),

    #[error(transparent)]
    Handshake(#[from] HandshakeError),

    #[error("failed to bind {listener} listener on {addr}: {source}")]
    Bind {
        listener: &'static str,
        addr: String,
        #[source]
        source: std::io::Error,
    },

    #[error("{0} task failed: {1}")]
    Task(&'static str, String),
}

/// Loading PEM material or assembling a rustls configuration.
#[derive(Debug, Error)]
pub enum TlsError {
    #[error("failed to read {path}: {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("invalid PEM in {path}: {message}")]
    Pem { path: String, message: String },

    #[error("no certificates found in {0}")]
    NoCertificates(String),

    #[error("client certificate verifier: {0}")]
    Verifier(String),

    #[error("client identity: {0}")]
    ClientIdentity(String),

    #[error(transparent)]
    Rustls(#[from] rustls::Error),
}

/// Failure of a single initiator attempt.
#[derive(Debug, Error)]
pub enum HandshakeError {
    #[error("transport error: {0}")]
    Transport(#[from] reqwest::Error),

    #[error("unexpected response status: {status}")]
    Status { status: u16, body: String },

    #[error("invalid response: {0}")]
    InvalidResponse(String),

    #[error("peer selected unsupported capability {0}")]
    UnsupportedSelection(SecurityCapability),

    #[error(transparent)]
    Tls(#[from] TlsError),
}

/// Per-request forwarding failure, rendered as a JSON error body.
#[derive(Debug, Error)]
pub enum ProxyError {
    #[error("client certificate required")]
    Unauthenticated,

    #[error("peer not yet negotiated")]
    NotNegotiated,

    #[error("invalid forwarding target: {0}")]
    InvalidTarget(String),

    #[error("failed to build route: {0}")]
    RouteBuild(String),

    #[error("invalid request: {0}")]
    InvalidRequest(String),

    #[error("request body exceeds {0} bytes")]
    PayloadTooLarge(usize),

    #[error("upstream request failed: {0}")]
    Upstream(String),
}

impl ProxyError {
    pub fn status(&self) -> StatusCode {
        match self {
            ProxyError::Unauthenticated => StatusCode::UNAUTHORIZED,
            ProxyError::NotNegotiated => StatusCode::SERVICE_UNAVAILABLE,
            ProxyError::InvalidTarget(_) | ProxyError::RouteBuild(_) => {
                StatusCode::INTERNAL_SERVER_ERROR
            }
            ProxyError::InvalidRequest(_) => StatusCode::BAD_REQUEST,
            ProxyError::PayloadTooLarge(_) => StatusCode::PAYLOAD_TOO_LARGE,
            ProxyError::Upstream(_) => StatusCode::BAD_GATEWAY,
        }
    }

    fn code(&self) -> &'static str {
        match self {
            ProxyError::Unauthenticated => "UNAUTHENTICATED",
            ProxyError::NotNegotiated => "PEER_NOT_NEGOTIATED",
            ProxyError::InvalidTarget(_) => "INVALID_TARGET",
            ProxyError::RouteBuild(_) => "ROUTE_BUILD_FAILED",
            ProxyError::InvalidRequest(_) => "INVALID_REQUEST",
            ProxyError::PayloadTooLarge(_) => "PAYLOAD_TOO_LARGE",
            ProxyError::Upstream(_) => "UPSTREAM_FAILED",
        }
    }
}

impl IntoResponse for ProxyError {
    fn into_response(self) -> Response {
        let body = Json(json!({
            "error": {
                "code": self.code(),
                "message": self.to_string(),
            }
        }));

        (self.status(), body).into_response()
    }
}

pub type SeppResult<T> = Result<T, SeppError>;
