//! Initiator side: offer our capabilities until the peer agrees.
//!
//! ```text
//!  Idle ──► Attempting(n) ──ok──► Succeeded
//!               │   ▲
//!           err │   │ retry_interval
//!               ▼   │
//!           BackingOff(n)
//!
//!  cancel (any non-terminal phase) ──► Cancelled
//! ```
//!
//! Both the in-flight attempt and the backoff wait race against the
//! cancellation token, so shutdown never waits for a full retry cycle.

use super::client::CapabilityExchange;
use crate::context::{PeerBinding, SeppContext};
use crate::error::HandshakeError;
use sepp_kernel::n32::{SecNegotiateReqData, SecNegotiateRspData, SecurityCapability};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum InitiatorPhase {
    Idle,
    Attempting { attempt: u32 },
    BackingOff { attempt: u32, delay: Duration },
    Succeeded(PeerBinding),
    Cancelled,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum InitiatorOutcome {
    Negotiated(PeerBinding),
    Cancelled { attempts: u32 },
}

pub struct HandshakeInitiator {
    ctx: Arc<SeppContext>,
    transport: Arc<dyn CapabilityExchange>,
    supported: Vec<SecurityCapability>,
    retry_interval: Duration,
    phase: watch::Sender<InitiatorPhase>,
}

impl HandshakeInitiator {
    pub fn new(
        ctx: Arc<SeppContext>,
        transport: Arc<dyn CapabilityExchange>,
        supported: Vec<SecurityCapability>,
        retry_interval: Duration,
    ) -> Self {
        let (phase, _) = watch::channel(InitiatorPhase::Idle);
        Self {
            ctx,
            transport,
            supported,
            retry_interval,
            phase,
        }
    }

    pub fn subscribe(&self) -> watch::Receiver<InitiatorPhase> {
        self.phase.subscribe()
    }

    pub fn phase(&self) -> InitiatorPhase {
        self.phase.borrow().clone()
    }

    /// Retry until an exchange succeeds or `cancel` fires.
    pub async fn run(&self, cancel: CancellationToken) -> InitiatorOutcome {
        let request = SecNegotiateReqData::new(self.ctx.local_fqdn().clone(), self.supported.clone());
        let mut attempt: u32 = 0;

        loop {
            attempt += 1;
            self.phase.send_replace(InitiatorPhase::Attempting { attempt });
            debug!(attempt, "starting N32-c handshake attempt");

            let result = tokio::select! {
                biased;
                _ = cancel.cancelled() => return self.cancelled(attempt - 1),
                result = self.attempt(&request) => result,
            };

            match result {
                Ok(binding) => {
                    self.ctx.commit(binding.clone());
                    info!(
                        attempt,
                        peer = %binding.fqdn,
                        capability = %binding.capability,
                        "N32-c handshake completed"
                    );
                    self.phase
                        .send_replace(InitiatorPhase::Succeeded(binding.clone()));
                    return InitiatorOutcome::Negotiated(binding);
                }
                Err(e) => {
                    warn!(
                        attempt,
                        error = %e,
                        retry_in = ?self.retry_interval,
                        "N32-c handshake failed"
                    );
                }
            }

            self.phase.send_replace(InitiatorPhase::BackingOff {
                attempt,
                delay: self.retry_interval,
            });
            tokio::select! {
                biased;
                _ = cancel.cancelled() => return self.cancelled(attempt),
                _ = tokio::time::sleep(self.retry_interval) => {}
            }
        }
    }

    async fn attempt(&self, request: &SecNegotiateReqData) -> Result<PeerBinding, HandshakeError> {
        let response = self.transport.exchange(request).await?;
        validate_response(&response, &self.supported)
    }

    fn cancelled(&self, attempts: u32) -> InitiatorOutcome {
        info!(attempts, "N32-c handshake initiator cancelled");
        self.phase.send_replace(InitiatorPhase::Cancelled);
        InitiatorOutcome::Cancelled { attempts }
    }
}

/// Accept a peer's answer only if it names itself and picked something we offered.
pub fn validate_response(
    response: &SecNegotiateRspData,
    supported: &[SecurityCapability],
) -> Result<PeerBinding, HandshakeError> {
    if response.sender.is_empty() {
        return Err(HandshakeError::InvalidResponse(
            "response is missing Sender".to_string(),
        ));
    }
    let selected = response.selected_sec_capability;
    if selected == SecurityCapability::Unknown || !supported.contains(&selected) {
        return Err(HandshakeError::UnsupportedSelection(selected));
    }
    Ok(PeerBinding::new(response.sender.clone(), selected))
}
