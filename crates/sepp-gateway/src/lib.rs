//! SEPP interconnect gateway.
//!
//! ```text
//!                 ┌──────────────────────── SeppServer ────────────────────────┐
//!   peer SEPP ───►│ N32 (mTLS)   handshake::responder ──┐                      │
//!                 │                                     ▼                      │
//!                 │ handshake::initiator ───────► SeppContext ◄── telescopic   │◄── Nsepp
//!                 │                                     │                      │
//!   local NFs ───►│ SBI (mTLS)   proxy::ForwardingProxy ┴──► peer SEPP (mTLS)  │
//!                 └────────────────────────────────────────────────────────────┘
//! ```
//!
//! The two handshake roles agree on a security capability with exactly one
//! peer and record it in the shared [`SeppContext`]; the forwarding proxy and
//! the telescopic mapper only read it.

pub mod context;
pub mod error;
pub mod handshake;
pub mod proxy;
pub mod server;
pub mod telescopic;
pub mod tls;

pub use context::{NegotiatedState, PeerBinding, SeppContext};
pub use error::{HandshakeError, ProxyError, SeppError, SeppResult, TlsError};
pub use server::SeppServer;
