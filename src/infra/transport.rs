//! HTTP transport for the remote highlighting service.

use std::time::Duration;

use async_trait::async_trait;
use reqwest::{Client, Url, header::AUTHORIZATION};

use crate::application::highlight::{
    GatewayError, HighlightRequest, HighlightResponse, HighlightTransport,
};

use super::error::InfraError;

/// Posts highlight batches as JSON with a bearer token.
#[derive(Clone, Debug)]
pub struct ReqwestTransport {
    client: Client,
    endpoint: Url,
    token: String,
}

impl ReqwestTransport {
    pub fn new(
        endpoint: Url,
        token: impl Into<String>,
        timeout: Duration,
    ) -> Result<Self, InfraError> {
        let client = Client::builder()
            .user_agent(Self::user_agent())
            .timeout(timeout)
            .build()
            .map_err(|err| InfraError::http(err.to_string()))?;

        Ok(Self {
            client,
            endpoint,
            token: token.into(),
        })
    }

    pub fn user_agent() -> &'static str {
        concat!("fenceline/", env!("CARGO_PKG_VERSION"))
    }
}

#[async_trait]
impl HighlightTransport for ReqwestTransport {
    async fn send(&self, request: &HighlightRequest) -> Result<HighlightResponse, GatewayError> {
        let resp = self
            .client
            .post(self.endpoint.clone())
            .header(AUTHORIZATION, format!("Bearer {}", self.token))
            .json(request)
            .send()
            .await
            .map_err(map_send_error)?;

        let status = resp.status();
        let bytes = resp.bytes().await.map_err(map_send_error)?;
        if !status.is_success() {
            return Err(GatewayError::Status {
                status: status.as_u16(),
                body: String::from_utf8_lossy(&bytes).into_owned(),
            });
        }

        serde_json::from_slice(&bytes).map_err(|err| GatewayError::decode(err.to_string()))
    }
}

fn map_send_error(err: reqwest::Error) -> GatewayError {
    if err.is_timeout() {
        GatewayError::transport(format!("request timed out: {err}"))
    } else {
        GatewayError::transport(err.to_string())
    }
}
