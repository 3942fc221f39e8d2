//! N32-c capability handshake.
//!
//! Both roles run at the same time on every gateway:
//!
//! - [`responder`] answers `POST /n32c-handshake/v1/exchange-capability`
//!   from the peer.
//! - [`initiator`] keeps offering our capabilities to the configured peer
//!   until one attempt succeeds or the process shuts down.
//!
//! Whichever completes first (or last) writes the shared
//! [`NegotiatedState`](crate::context::NegotiatedState).

pub mod client;
pub mod initiator;
pub mod responder;

pub use client::{CapabilityExchange, N32cClient};
pub use initiator::{HandshakeInitiator, InitiatorOutcome, InitiatorPhase};
pub use responder::{HandshakeRejection, ResponderState, exchange_capability, n32c_router};
