//! Kernel error types.
//!
//! Every variant here is detected *before* any network I/O or state mutation:
//! malformed configuration at startup, malformed negotiation requests and
//! malformed mapping queries on the control plane.  Runtime failures
//! (connection refused, TLS handshake failure, upstream timeout, …) belong in
//! `sepp-gateway`.

use thiserror::Error;

/// Configuration validation error, one variant per rule checked by
/// [`SeppConfig::validate`](crate::settings::SeppConfig::validate).
#[derive(Debug, Error, PartialEq, Eq)]
#[non_exhaustive]
pub enum SettingsError {
    // ── Local N32 ───────────────────────────────────────────────────────────
    #[error("missing FQDN")]
    MissingFqdn,

    #[error("missing host")]
    MissingHost,

    #[error("missing port")]
    MissingPort,

    #[error("missing TLS cert")]
    MissingTlsCert,

    #[error("missing TLS key")]
    MissingTlsKey,

    #[error("missing TLS CA")]
    MissingTlsCa,

    // ── Local SBI ───────────────────────────────────────────────────────────
    #[error("missing SBI host")]
    MissingSbiHost,

    #[error("missing SBI port")]
    MissingSbiPort,

    #[error("missing SBI TLS {0}")]
    MissingSbiTls(&'static str),

    // ── Local Nsepp (optional listener) ─────────────────────────────────────
    #[error("nsepp listener is configured but {0} is missing")]
    IncompleteNsepp(&'static str),

    // ── Remote ──────────────────────────────────────────────────────────────
    #[error("missing remote TLS cert")]
    MissingRemoteTlsCert,

    #[error("missing remote TLS key")]
    MissingRemoteTlsKey,

    #[error("missing remote TLS CA")]
    MissingRemoteTlsCa,

    #[error("remote url '{0}' must be an absolute http(s) URL")]
    InvalidRemoteUrl(String),

    // ── Policy ──────────────────────────────────────────────────────────────
    #[error("unsupported security capability '{0}'")]
    UnsupportedCapability(String),

    #[error("handshake retry interval must be greater than 0 seconds")]
    InvalidRetryInterval,
}

/// A capability-negotiation request that fails the structural checks.
///
/// Both variants are client errors; neither reaches the negotiated state.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum NegotiationError {
    #[error("Sender is required")]
    MissingSender,

    #[error("SupportedSecCapabilityList is required")]
    MissingCapabilityList,
}

/// A telescopic mapping query that does not carry exactly one lookup key.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum MappingQueryError {
    #[error("Either 'foreign-fqdn' or 'telescopic-label' must be provided, but not both.")]
    NeitherProvided,

    #[error("Either 'foreign-fqdn' or 'telescopic-label' must be provided, but not both.")]
    BothProvided,
}
