//! Responder side of the capability exchange.

use crate::context::{PeerBinding, SeppContext};
use axum::{
    Router,
    body::Bytes,
    extract::State,
    http::{StatusCode, header},
    response::{IntoResponse, Response},
    routing::post,
};
use sepp_kernel::n32::{
    EXCHANGE_CAPABILITY_PATH, SecNegotiateReqData, SecNegotiateRspData, SecurityCapability,
    select_capability,
};
use std::sync::Arc;
use tracing::{debug, error, info, warn};

/// Why a capability exchange request was refused.  Always a `400`.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum HandshakeRejection {
    /// Undecodable body or a missing mandatory field.
    #[error("{0}")]
    Malformed(String),

    /// Well-formed, but nothing in common with our supported set.
    #[error("Bad SecurityCapability - Only {supported} is supported")]
    Incompatible {
        offered: Vec<SecurityCapability>,
        supported: String,
    },
}

impl IntoResponse for HandshakeRejection {
    fn into_response(self) -> Response {
        (StatusCode::BAD_REQUEST, self.to_string()).into_response()
    }
}

#[derive(Clone)]
pub struct ResponderState {
    pub ctx: Arc<SeppContext>,
    pub supported: Arc<[SecurityCapability]>,
}

impl ResponderState {
    pub fn new(ctx: Arc<SeppContext>, supported: Vec<SecurityCapability>) -> Self {
        Self {
            ctx,
            supported: supported.into(),
        }
    }
}

/// Decide on a raw request body.
///
/// Checks run in a fixed order: decode, `Sender`, capability list,
/// intersection.  Only an accepted exchange touches `ctx`.
pub fn exchange_capability(
    ctx: &SeppContext,
    supported: &[SecurityCapability],
    body: &[u8],
) -> Result<SecNegotiateRspData, HandshakeRejection> {
    let request: SecNegotiateReqData = serde_json::from_slice(body).map_err(|e| {
        debug!(error = %e, "undecodable capability exchange body");
        HandshakeRejection::Malformed("Invalid request body".to_string())
    })?;

    request
        .validate()
        .map_err(|e| HandshakeRejection::Malformed(e.to_string()))?;

    let offered = request.supported_sec_capability_list;
    let chosen = select_capability(&offered, supported).ok_or_else(|| {
        HandshakeRejection::Incompatible {
            offered: offered.clone(),
            supported: supported
                .iter()
                .map(SecurityCapability::as_str)
                .collect::<Vec<_>>()
                .join(", "),
        }
    })?;

    ctx.commit(PeerBinding::new(request.sender.clone(), chosen));

    Ok(SecNegotiateRspData {
        sender: ctx.local_fqdn().clone(),
        selected_sec_capability: chosen,
    })
}

pub async fn post_exchange_capability(
    State(state): State<ResponderState>,
    body: Bytes,
) -> Response {
    match exchange_capability(&state.ctx, &state.supported, &body) {
        Ok(rsp) => match serde_json::to_vec(&rsp) {
            Ok(bytes) => {
                info!(
                    peer = %state.ctx.remote_fqdn().unwrap_or_default(),
                    capability = %rsp.selected_sec_capability,
                    "accepted N32-c handshake"
                );
                (
                    StatusCode::OK,
                    [(header::CONTENT_TYPE, "application/json")],
                    bytes,
                )
                    .into_response()
            }
            Err(e) => {
                error!(error = %e, "failed to encode handshake response");
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    "Failed to encode response",
                )
                    .into_response()
            }
        },
        Err(rejection) => {
            warn!(reason = %rejection, "rejected N32-c handshake");
            rejection.into_response()
        }
    }
}

/// Routes of the N32-c handshake API.
pub fn n32c_router(state: ResponderState) -> Router {
    Router::new()
        .route(EXCHANGE_CAPABILITY_PATH, post(post_exchange_capability))
        .with_state(state)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::context::PeerBinding;
    use axum::body::{Body, to_bytes};
    use axum::http::Request;
    use tower::ServiceExt;

    fn state() -> ResponderState {
        ResponderState::new(
            Arc::new(SeppContext::new("local-sepp.example.com")),
            vec![SecurityCapability::Tls],
        )
    }

    async fn post_body(state: ResponderState, body: &'static str) -> (StatusCode, String, String) {
        let response = n32c_router(state)
            .oneshot(
                Request::builder()
                    .method("POST")
                    .uri(EXCHANGE_CAPABILITY_PATH)
                    .header("content-type", "application/json")
                    .body(Body::from(body))
                    .unwrap(),
            )
            .await
            .unwrap();

        let status = response.status();
        let content_type = response
            .headers()
            .get(header::CONTENT_TYPE)
            .map(|v| v.to_str().unwrap().to_string())
            .unwrap_or_default();
        let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        (status, content_type, String::from_utf8(bytes.to_vec()).unwrap())
    }

    #[tokio::test]
    async fn accepts_tls_and_records_peer() {
        let state = state();
        let (status, content_type, body) = post_body(
            state.clone(),
            r#"{"Sender":"remote-sepp.example.com","SupportedSecCapabilityList":["TLS"]}"#,
        )
        .await;

        assert_eq!(status, StatusCode::OK);
        assert_eq!(content_type, "application/json");
        let rsp: SecNegotiateRspData = serde_json::from_str(&body).unwrap();
        assert_eq!(rsp.sender.as_str(), "local-sepp.example.com");
        assert_eq!(rsp.selected_sec_capability, SecurityCapability::Tls);

        assert_eq!(
            state.ctx.remote_fqdn().unwrap().as_str(),
            "remote-sepp.example.com"
        );
        assert_eq!(state.ctx.security_capability(), Some(SecurityCapability::Tls));
    }

    #[tokio::test]
    async fn picks_tls_out_of_a_mixed_offer() {
        let state = state();
        let (status, _, body) = post_body(
            state,
            r#"{"Sender":"remote-sepp.example.com","SupportedSecCapabilityList":["PRINS","ALS","TLS"]}"#,
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        assert!(body.contains(r#""SelectedSecCapability":"TLS""#));
    }

    #[tokio::test]
    async fn rejects_missing_sender() {
        let state = state();
        let (status, content_type, body) =
            post_body(state.clone(), r#"{"SupportedSecCapabilityList":["TLS"]}"#).await;

        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert!(content_type.starts_with("text/plain"));
        assert_eq!(body, "Sender is required");
        assert!(!state.ctx.is_negotiated());
    }

    #[tokio::test]
    async fn rejects_missing_capability_list() {
        let (status, _, body) = post_body(state(), r#"{"Sender":"remote-sepp.example.com"}"#).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(body, "SupportedSecCapabilityList is required");
    }

    #[tokio::test]
    async fn rejects_undecodable_body() {
        let (status, _, body) = post_body(state(), "{not json").await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(body, "Invalid request body");
    }

    #[tokio::test]
    async fn rejects_offer_without_tls() {
        let state = state();
        let (status, _, body) = post_body(
            state.clone(),
            r#"{"Sender":"remote-sepp.example.com","SupportedSecCapabilityList":["ALS"]}"#,
        )
        .await;

        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(body, "Bad SecurityCapability - Only TLS is supported");
        assert_eq!(state.ctx.remote_fqdn(), None);
    }

    #[tokio::test]
    async fn rejected_requests_leave_existing_binding_untouched() {
        let state = state();
        state.ctx.commit(PeerBinding::new(
            "bound-sepp.example.com",
            SecurityCapability::Tls,
        ));
        let before = state.ctx.snapshot();

        let rejected = [
            r#"{"Sender":"other-sepp.example.com","SupportedSecCapabilityList":["ALS"]}"#,
            r#"{"Sender":"other-sepp.example.com","SupportedSecCapabilityList":[]}"#,
            r#"{"SupportedSecCapabilityList":["TLS"]}"#,
            r#"{"Sender":"","SupportedSecCapabilityList":["TLS"]}"#,
            r#"{"Sender":"other-sepp.example.com"}"#,
            "{not json",
        ];
        for _ in 0..3 {
            for body in rejected {
                let (status, _, _) = post_body(state.clone(), body).await;
                assert_eq!(status, StatusCode::BAD_REQUEST, "{body}");
                assert_eq!(state.ctx.snapshot(), before, "{body}");
            }
        }
        assert_eq!(
            state.ctx.remote_fqdn().unwrap().as_str(),
            "bound-sepp.example.com"
        );
    }

    #[test]
    fn decision_reports_what_was_offered() {
        let ctx = SeppContext::new("local-sepp.example.com");
        let err = exchange_capability(
            &ctx,
            &[SecurityCapability::Tls],
            br#"{"Sender":"x","SupportedSecCapabilityList":["ALS"]}"#,
        )
        .unwrap_err();
        assert_eq!(
            err,
            HandshakeRejection::Incompatible {
                offered: vec![SecurityCapability::Als],
                supported: "TLS".to_string(),
            }
        );
    }

    #[tokio::test]
    async fn get_is_not_allowed() {
        let response = n32c_router(state())
            .oneshot(
                Request::builder()
                    .uri(EXCHANGE_CAPABILITY_PATH)
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::METHOD_NOT_ALLOWED);
    }
}
