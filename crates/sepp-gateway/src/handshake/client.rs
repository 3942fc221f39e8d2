//! Outbound capability exchange.

use crate::error::HandshakeError;
use crate::tls::ClientTlsMaterial;
use async_trait::async_trait;
use reqwest::StatusCode;
use sepp_kernel::n32::{EXCHANGE_CAPABILITY_PATH, SecNegotiateReqData, SecNegotiateRspData};
use std::time::Duration;
use tracing::{debug, instrument};

const REQUEST_TIMEOUT: Duration = Duration::from_secs(10);

/// One capability exchange with the peer.
#[async_trait]
pub trait CapabilityExchange: Send + Sync {
    async fn exchange(
        &self,
        request: &SecNegotiateReqData,
    ) -> Result<SecNegotiateRspData, HandshakeError>;
}

/// `reqwest` transport posting to the peer's N32-c endpoint.
#[derive(Debug, Clone)]
pub struct N32cClient {
    http: reqwest::Client,
    endpoint: String,
}

impl N32cClient {
    pub fn new(http: reqwest::Client, remote_url: &str) -> Self {
        Self {
            http,
            endpoint: format!(
                "{}{}",
                remote_url.trim_end_matches('/'),
                EXCHANGE_CAPABILITY_PATH
            ),
        }
    }

    /// Client presenting `material` and trusting only its CA.
    pub fn with_mutual_tls(
        remote_url: &str,
        material: &ClientTlsMaterial,
    ) -> Result<Self, HandshakeError> {
        Ok(Self::new(material.http_client()?, remote_url))
    }

    pub fn endpoint(&self) -> &str {
        &self.endpoint
    }
}

#[async_trait]
impl CapabilityExchange for N32cClient {
    #[instrument(skip(self, request), fields(endpoint = %self.endpoint))]
    async fn exchange(
        &self,
        request: &SecNegotiateReqData,
    ) -> Result<SecNegotiateRspData, HandshakeError> {
        let response = self
            .http
            .post(&self.endpoint)
            .timeout(REQUEST_TIMEOUT)
            .json(request)
            .send()
            .await?;

        let status = response.status();
        if status != StatusCode::OK {
            let body = response.text().await.unwrap_or_default();
            debug!(%status, %body, "peer refused capability exchange");
            return Err(HandshakeError::Status {
                status: status.as_u16(),
                body,
            });
        }

        let bytes = response.bytes().await?;
        serde_json::from_slice(&bytes).map_err(|e| HandshakeError::InvalidResponse(e.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::{Router, http::StatusCode as AxumStatus, routing::post};
    use sepp_kernel::n32::SecurityCapability;

    async fn spawn_peer(router: Router) -> String {
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            axum::serve(listener, router).await.unwrap();
        });
        format!("http://{addr}/")
    }

    fn request() -> SecNegotiateReqData {
        SecNegotiateReqData::new("local-sepp.example.com", vec![SecurityCapability::Tls])
    }

    #[test]
    fn endpoint_joins_without_double_slash() {
        let client = N32cClient::new(reqwest::Client::new(), "https://peer.example:1234/");
        assert_eq!(
            client.endpoint(),
            "https://peer.example:1234/n32c-handshake/v1/exchange-capability"
        );
    }

    #[tokio::test]
    async fn decodes_successful_exchange() {
        let router = Router::new().route(
            EXCHANGE_CAPABILITY_PATH,
            post(|axum::Json(req): axum::Json<SecNegotiateReqData>| async move {
                assert_eq!(req.sender.as_str(), "local-sepp.example.com");
                axum::Json(SecNegotiateRspData {
                    sender: "remote-sepp.example.com".into(),
                    selected_sec_capability: SecurityCapability::Tls,
                })
            }),
        );
        let url = spawn_peer(router).await;

        let rsp = N32cClient::new(reqwest::Client::new(), &url)
            .exchange(&request())
            .await
            .unwrap();
        assert_eq!(rsp.sender.as_str(), "remote-sepp.example.com");
        assert_eq!(rsp.selected_sec_capability, SecurityCapability::Tls);
    }

    #[tokio::test]
    async fn non_200_is_an_error() {
        let router = Router::new().route(
            EXCHANGE_CAPABILITY_PATH,
            post(|| async { (AxumStatus::BAD_REQUEST, "Sender is required") }),
        );
        let url = spawn_peer(router).await;

        let err = N32cClient::new(reqwest::Client::new(), &url)
            .exchange(&request())
            .await
            .unwrap_err();
        match err {
            HandshakeError::Status { status, body } => {
                assert_eq!(status, 400);
                assert_eq!(body, "Sender is required");
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[tokio::test]
    async fn garbage_body_is_invalid_response() {
        let router = Router::new().route(EXCHANGE_CAPABILITY_PATH, post(|| async { "ok" }));
        let url = spawn_peer(router).await;

        let err = N32cClient::new(reqwest::Client::new(), &url)
            .exchange(&request())
            .await
            .unwrap_err();
        assert!(matches!(err, HandshakeError::InvalidResponse(_)));
    }
}
