//! SEPP kernel contract.
//!
//! This crate defines the *wire types, configuration tree and validation
//! rules* for the SEPP interconnect gateway.  No network I/O lives here;
//! listeners, the handshake state machine and the forwarding proxy belong in
//! `sepp-gateway`.
//!
//! # Architecture mapping
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────┐
//! │              sepp-kernel  (this crate)                      │
//! │  n32: SecNegotiateReqData / SecNegotiateRspData             │
//! │  telescopic: TelescopicMapping, MappingQuery, mask()        │
//! │  config: multi-format loader    settings: SeppConfig        │
//! │  error: SettingsError / NegotiationError / MappingQueryError│
//! └──────────────────────────┬──────────────────────────────────┘
//!                            │  depends on
//! ┌──────────────────────────▼──────────────────────────────────┐
//! │              sepp-gateway  (runtime crate)                  │
//! │  SeppContext (negotiated state + lock)                      │
//! │  handshake responder / initiator                            │
//! │  TopologyMapper   ForwardingProxy   TLS listeners           │
//! └─────────────────────────────────────────────────────────────┘
//! ```
//!
//! # Quick start
//!
//! ```rust,no_run
//! use sepp_kernel::settings::SeppConfig;
//!
//! let config = SeppConfig::load("config.yaml").expect("valid sepp config");
//! println!("local N32 FQDN: {}", config.local_fqdn());
//! ```

pub mod config;
pub mod error;
pub mod n32;
pub mod settings;
pub mod telescopic;

// ── Flat re-exports ────────────────────────────────────────────────────────

pub use error::{MappingQueryError, NegotiationError, SettingsError};
pub use n32::{Fqdn, SecNegotiateReqData, SecNegotiateRspData, SecurityCapability};
pub use settings::SeppConfig;
pub use telescopic::{MappingLookup, MappingQuery, TelescopicMapping};
