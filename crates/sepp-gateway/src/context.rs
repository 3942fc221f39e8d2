//! Negotiated state shared by every gateway component.
//!
//! A single [`SeppContext`] is created at startup and handed out as
//! `Arc<SeppContext>`.  The local identity is immutable; the peer binding is
//! guarded by one `parking_lot::Mutex` and is only ever written by the two
//! handshake roles (responder and initiator) through the crate-private
//! [`SeppContext::commit`].
//!
//! The peer FQDN and the agreed capability live in one `Option`, so readers
//! see either nothing or a complete binding, never half of one.  The lock is
//! never held across an `.await`.

use parking_lot::Mutex;
use sepp_kernel::n32::{Fqdn, SecurityCapability};
use tracing::info;

/// The outcome of a successful capability exchange.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PeerBinding {
    pub fqdn: Fqdn,
    pub capability: SecurityCapability,
}

impl PeerBinding {
    pub fn new(fqdn: impl Into<Fqdn>, capability: SecurityCapability) -> Self {
        Self {
            fqdn: fqdn.into(),
            capability,
        }
    }
}

/// Snapshot of what has been negotiated so far.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct NegotiatedState {
    pub peer: Option<PeerBinding>,
}

#[derive(Debug)]
pub struct SeppContext {
    local_fqdn: Fqdn,
    negotiated: Mutex<NegotiatedState>,
}

impl SeppContext {
    /// Fresh context: local identity set, nothing negotiated.
    pub fn new(local_fqdn: impl Into<Fqdn>) -> Self {
        Self {
            local_fqdn: local_fqdn.into(),
            negotiated: Mutex::new(NegotiatedState::default()),
        }
    }

    pub fn local_fqdn(&self) -> &Fqdn {
        &self.local_fqdn
    }

    pub fn snapshot(&self) -> NegotiatedState {
        self.negotiated.lock().clone()
    }

    /// FQDN of the negotiated peer, if any.
    pub fn remote_fqdn(&self) -> Option<Fqdn> {
        self.negotiated.lock().peer.as_ref().map(|p| p.fqdn.clone())
    }

    /// Capability agreed with the peer, if any.
    pub fn security_capability(&self) -> Option<SecurityCapability> {
        self.negotiated.lock().peer.as_ref().map(|p| p.capability)
    }

    pub fn is_negotiated(&self) -> bool {
        self.negotiated.lock().peer.is_some()
    }

    /// Record a completed handshake.  Last writer wins.
    ///
    /// Returns the binding it replaced.
    pub(crate) fn commit(&self, binding: PeerBinding) -> Option<PeerBinding> {
        let previous = {
            let mut state = self.negotiated.lock();
            state.peer.replace(binding.clone())
        };
        if previous.as_ref() != Some(&binding) {
            info!(
                peer = %binding.fqdn,
                capability = %binding.capability,
                previous_peer = previous.as_ref().map(|p| p.fqdn.as_str()),
                "negotiated state updated"
            );
        }
        previous
    }
}
